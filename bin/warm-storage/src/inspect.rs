//! `inspect` subcommand

use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use warm_storage_primitives::{DataSetId, Epoch};
use warm_storage_service::{DataSet, ProvingStatus, ServiceState};

use crate::snapshot::load_state;

#[derive(Debug, Args)]
pub(crate) struct InspectArgs {
    /// Path to a JSON state snapshot
    #[arg(long, short = 's')]
    snapshot: PathBuf,

    /// JSON provider list used to migrate legacy snapshots
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Data set to show, all data sets when omitted
    #[arg(long)]
    data_set: Option<DataSetId>,

    /// Epoch the proving status is evaluated at
    #[arg(long, default_value = "0")]
    epoch: Epoch,
}

#[derive(Debug, Serialize)]
struct DataSetReport<'a> {
    data_set: &'a DataSet,
    proving: Option<ProvingStatus>,
}

impl InspectArgs {
    pub(crate) fn run(self) -> eyre::Result<()> {
        let state = load_state(&self.snapshot, self.registry.as_deref())?;
        let reports = reports(&state, self.data_set, self.epoch)?;
        println!("{}", serde_json::to_string_pretty(&reports)?);
        Ok(())
    }
}

fn reports(
    state: &ServiceState,
    data_set_id: Option<DataSetId>,
    epoch: Epoch,
) -> eyre::Result<Vec<DataSetReport<'_>>> {
    match data_set_id {
        Some(id) => {
            let data_set =
                state.data_set(id).ok_or_else(|| eyre::eyre!("data set {id} not found"))?;
            Ok(vec![report(state, data_set, epoch)])
        }
        None => Ok(state.data_sets.values().map(|data_set| report(state, data_set, epoch)).collect()),
    }
}

fn report<'a>(state: &ServiceState, data_set: &'a DataSet, epoch: Epoch) -> DataSetReport<'a> {
    DataSetReport { data_set, proving: state.proving_status(data_set.id, epoch) }
}
