//! `schedule` subcommand

use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use warm_storage_primitives::{ChallengeWindow, Epoch, PeriodSchedule, ProvingParams};

use crate::config::load_or_default;

#[derive(Debug, Args)]
pub(crate) struct ScheduleArgs {
    /// Path to the TOML configuration, defaults apply when omitted
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Epoch the first proving period started
    #[arg(long)]
    activation: Epoch,

    /// Number of periods to print
    #[arg(long, short = 'n', default_value = "4")]
    periods: u64,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

/// One proving period of a schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct PeriodRow {
    period: u64,
    first_epoch: Epoch,
    deadline: Epoch,
    window: ChallengeWindow,
}

impl ScheduleArgs {
    pub(crate) fn run(self) -> eyre::Result<()> {
        eyre::ensure!(self.activation > 0, "activation epoch must be non-zero");
        let config = load_or_default(self.config.as_deref())?;
        let rows = schedule_rows(self.activation, config.proving, self.periods);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&rows)?);
            return Ok(());
        }

        println!("{:>8} {:>12} {:>12}  window", "period", "first", "deadline");
        for row in rows {
            println!("{:>8} {:>12} {:>12}  {}", row.period, row.first_epoch, row.deadline, row.window);
        }
        Ok(())
    }
}

fn schedule_rows(activation: Epoch, params: ProvingParams, periods: u64) -> Vec<PeriodRow> {
    let schedule = PeriodSchedule::new(activation, params);
    (0..periods)
        .map(|period| {
            let deadline = schedule.period_deadline(period);
            PeriodRow {
                period,
                first_epoch: schedule.period_start(period) + 1,
                deadline,
                window: schedule.window(deadline),
            }
        })
        .collect()
}
