use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobResult {
    Success,
    Error,
}

/// Snapshot of one job: a user-visible status string plus a 0-100 progress
/// marker. Terminal states always carry progress 100 and a result.
#[derive(Debug, Clone)]
pub struct JobState {
    pub status: String,
    pub progress: u8,
    pub result: Option<JobResult>,
    pub updated_at: DateTime<Utc>,
}

/// Narrow job-state interface so the store can be swapped (memory, database,
/// distributed cache) without touching pipeline code. Pipelines themselves
/// stay pure; only the orchestrator writes here between stages.
pub trait JobStore: Send + Sync {
    fn create(&self, id: &str);
    fn update(&self, id: &str, status: &str, progress: u8);
    fn finish(&self, id: &str, result: JobResult, status: &str);
    fn get(&self, id: &str) -> Option<JobState>;
}

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    inner: Mutex<HashMap<String, JobState>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, id: &str, status: &str, progress: u8, result: Option<JobResult>) {
        let mut inner = self.inner.lock().expect("job store poisoned");
        inner.insert(
            id.to_string(),
            JobState {
                status: status.to_string(),
                progress,
                result,
                updated_at: Utc::now(),
            },
        );
    }
}

impl JobStore for MemoryJobStore {
    fn create(&self, id: &str) {
        self.set(id, "task created", 0, None);
    }

    fn update(&self, id: &str, status: &str, progress: u8) {
        info!("[{id}] {status} ({progress}%)");
        self.set(id, status, progress, None);
    }

    fn finish(&self, id: &str, result: JobResult, status: &str) {
        info!("[{id}] {status}");
        self.set(id, status, 100, Some(result));
    }

    fn get(&self, id: &str) -> Option<JobState> {
        self.inner.lock().expect("job store poisoned").get(id).cloned()
    }
}

/// Settle a job from its pipeline outcome. Failures record the error chain
/// as the terminal status, so an early return can never leave a job stuck
/// at its last progress marker.
pub fn finalize<T>(
    store: &dyn JobStore,
    id: &str,
    result: anyhow::Result<T>,
    success_status: &str,
) -> anyhow::Result<T> {
    match &result {
        Ok(_) => store.finish(id, JobResult::Success, success_status),
        Err(e) => store.finish(id, JobResult::Error, &format!("{e:#}")),
    }
    result
}
