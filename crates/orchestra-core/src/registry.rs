use crate::{RunRecord, RunStatus};

pub const RUN_REGISTRY_CAPACITY: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Updated { index: usize },
    Inserted,
}

/// Runs ordered newest-first, unique by `run_id`, never longer than its capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRegistry {
    runs: Vec<RunRecord>,
    capacity: usize,
}

impl Default for RunRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::with_capacity(RUN_REGISTRY_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            runs: Vec::with_capacity(capacity.min(RUN_REGISTRY_CAPACITY)),
            capacity,
        }
    }

    /// Seeds are given newest-first, the same order the registry keeps. The first
    /// occurrence of a `run_id` wins.
    pub fn with_seed(seed: impl IntoIterator<Item = RunRecord>) -> Self {
        let mut registry = Self::new();
        for record in seed {
            if registry.runs.len() >= registry.capacity {
                break;
            }
            if registry.position(&record.run_id).is_none() {
                registry.runs.push(record);
            }
        }
        registry
    }

    pub fn upsert(&mut self, record: RunRecord) -> Upsert {
        if let Some(index) = self.position(&record.run_id) {
            self.runs[index].merge_from(record);
            return Upsert::Updated { index };
        }
        self.runs.insert(0, record);
        self.runs.truncate(self.capacity);
        Upsert::Inserted
    }

    pub fn position(&self, run_id: &str) -> Option<usize> {
        self.runs.iter().position(|run| run.run_id == run_id)
    }

    pub fn get(&self, run_id: &str) -> Option<&RunRecord> {
        self.runs.iter().find(|run| run.run_id == run_id)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RunRecord> {
        self.runs.iter()
    }

    pub fn to_vec(&self) -> Vec<RunRecord> {
        self.runs.clone()
    }
}

/// Placeholder runs shown when the console is started without a daemon.
pub fn demo_runs() -> Vec<RunRecord> {
    vec![
        RunRecord::new(
            "c87a3d00",
            "droid",
            "Create User model",
            RunStatus::Completed,
            "2m ago",
        ),
        RunRecord::new(
            "41d9ba27",
            "cursor",
            "Ship dashboard header",
            RunStatus::Running,
            "45s ago",
        ),
        RunRecord::new(
            "555dc78d",
            "aider",
            "Refactor auth checks",
            RunStatus::Completed,
            "10m ago",
        ),
    ]
}
