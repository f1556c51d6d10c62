//! Warm Storage Authorization
//!
//! Payers authorize data set creation, piece additions and piece removals by
//! signing EIP-712 typed data. A signature is accepted when the recovered
//! signer is the payer, or a session key the payer delegated for that message
//! type and whose expiry has not passed.
//!
//! ```text
//!  message ──► eip712 signing hash ──► recover(r, s, v) ──► signer
//!                                                             │
//!                         signer == payer ◄───────────────────┤
//!                                                             │
//!   session_keys.expiry(payer, signer, type_hash) >= epoch ◄──┘
//! ```

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod messages;
pub mod session;
pub mod signature;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use messages::{
    AddPieces, Cid, CreateDataSet, CreateDataSetWithCdn, PayerAuthenticator, PieceMetadata,
    SchedulePieceRemovals, add_pieces_message, create_data_set_message,
    create_data_set_with_cdn_message, schedule_removals_message, type_hash,
};
pub use session::{InMemorySessionKeys, SessionKeyRegistry};
pub use signature::{SECP256K1_HALF_ORDER, SIGNATURE_LENGTH, parse_signature, recover_signer};

use alloy_primitives::Address;
use thiserror::Error;
use warm_storage_primitives::Epoch;

/// Authorization errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Signature is not 65 bytes
    #[error("Invalid signature length {0}, expected {SIGNATURE_LENGTH}")]
    InvalidSignatureLength(usize),

    /// Recovery byte outside `{0, 1, 27, 28}`
    #[error("Unsupported signature recovery id {0}")]
    UnsupportedRecoveryId(u8),

    /// `s` lies in the upper half of the curve order
    #[error("Non-canonical signature: s exceeds half the curve order")]
    NonCanonicalSignature,

    /// Curve recovery failed
    #[error("Signature recovery failed: {0}")]
    RecoveryFailed(String),

    /// Recovered signer is neither the payer nor a live delegate
    #[error("Invalid signer {recovered} for payer {payer}")]
    InvalidSigner {
        /// Expected payer
        payer: Address,
        /// Address recovered from the signature
        recovered: Address,
    },

    /// Delegate session key exists but expired
    #[error("Session key {signer} for payer {payer} expired at epoch {expiry}")]
    SessionKeyExpired {
        /// Payer that delegated
        payer: Address,
        /// Delegate signer
        signer: Address,
        /// Expiry epoch
        expiry: Epoch,
    },
}
