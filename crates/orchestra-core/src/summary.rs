use crate::{RunRecord, RunStatus};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub total: usize,
    pub completed: usize,
    pub running: usize,
    pub failed: usize,
}

impl RunSummary {
    pub fn from_runs<'a>(runs: impl IntoIterator<Item = &'a RunRecord>) -> Self {
        runs.into_iter().fold(Self::default(), |mut summary, run| {
            summary.total += 1;
            match run.status {
                RunStatus::Completed => summary.completed += 1,
                RunStatus::Running => summary.running += 1,
                RunStatus::Failed => summary.failed += 1,
            }
            summary
        })
    }
}
