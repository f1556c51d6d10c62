//! Warm Storage Service
//!
//! Coordinates proof-of-data-possession with streaming payments for data
//! sets stored by approved providers:
//! - **Lifecycle**: creation, piece additions and removals, termination and
//!   deletion, driven by proof verifier callbacks
//! - **Proving**: per data set proving periods, challenge windows and fault
//!   accounting
//! - **Arbitration**: settlement of the storage rail pays proven epochs only
//! - **CDN**: fixed-lockup egress rails topped up by the payer and settled by
//!   the CDN controller
//!
//! # Call flow
//!
//! ```text
//!  proof verifier ──on_*──►┌─────────────────────┐──create/modify/terminate──► payments ledger
//!                          │ WarmStorageService  │
//!  payments ledger ─arbitrate/on_rail_terminated─►│◄── provider registry, session keys
//!                          └─────────────────────┘
//!                                    │
//!                             ServiceEvent log
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod arbitration;
pub mod data_set;
pub mod error;
pub mod events;
pub mod ledger;
pub mod proving;
pub mod registry;
pub mod service;
pub mod state;
pub mod views;

pub use arbitration::{ProvenEpochs, ValidationOutcome, find_proven_epochs};
pub use data_set::{DataSet, NonceRegistry, NonceUsage};
pub use error::{Result, ServiceError};
pub use events::ServiceEvent;
pub use ledger::{
    AccountView, InMemoryPayments, LedgerError, OperatorApproval, PaymentsLedger, RailParams,
    RailView,
};
pub use proving::{AdvanceKind, PeriodAdvance, ProvenPeriods, ProvingState};
pub use registry::{InMemoryProviderRegistry, ProviderInfo, ProviderRegistry};
pub use service::{AddPiecesRequest, CallContext, CreateDataSetRequest, WarmStorageService};
pub use state::{DataSetV1, ServiceState, ServiceStateV1, StateSnapshot};
pub use views::ProvingStatus;
