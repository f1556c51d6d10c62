//! `arbitrate` subcommand

use alloy_primitives::U256;
use clap::Args;
use std::path::PathBuf;
use tracing::info;
use warm_storage_primitives::{Epoch, RailId};

use crate::snapshot::load_state;

#[derive(Debug, Args)]
pub(crate) struct ArbitrateArgs {
    /// Path to a JSON state snapshot
    #[arg(long, short = 's')]
    snapshot: PathBuf,

    /// JSON provider list used to migrate legacy snapshots
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Rail being settled
    #[arg(long)]
    rail: RailId,

    /// Proposed settlement amount in base units
    #[arg(long)]
    amount: U256,

    /// Exclusive start of the settlement range
    #[arg(long)]
    from: Epoch,

    /// Inclusive end of the settlement range
    #[arg(long)]
    to: Epoch,

    /// Current epoch
    #[arg(long)]
    epoch: Epoch,

    /// Rail payment rate per epoch
    #[arg(long, default_value = "0")]
    rate: U256,
}

impl ArbitrateArgs {
    pub(crate) fn run(self) -> eyre::Result<()> {
        let state = load_state(&self.snapshot, self.registry.as_deref())?;
        let outcome = state.arbitrate(self.rail, self.amount, self.from, self.to, self.rate, self.epoch)?;
        info!(
            target: "warm_storage::cli",
            rail = self.rail,
            proposed = %self.amount,
            modified = %outcome.modified_amount,
            settle_up_to = outcome.settle_up_to,
            "arbitration dry run"
        );
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        Ok(())
    }
}
