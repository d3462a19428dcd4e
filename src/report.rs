use std::fmt;

use serde::{Deserialize, Serialize};

/// How a run ended.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The event stream was exhausted without cancellation or fatal error.
    Completed,
    /// The run terminated early without a fatal error.
    Canceled,
    /// The runner or dispatcher stored a fatal error.
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Canceled => write!(f, "canceled"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Per-consumer diagnostics from a run.
///
/// Counters are monotonic. `errors` is the ordered capture of failures that
/// did not halt the worker; a fatal failure under the `Raise` policy is
/// reported through [`RunError`](crate::RunError) instead.
#[derive(Debug, Default)]
pub struct ConsumerReport {
    pub name: String,
    pub submitted: u64,
    pub processed: u64,
    pub dropped: u64,
    pub errors: Vec<anyhow::Error>,
}

impl ConsumerReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Structured outcome of a run. Produced exactly once per run.
#[derive(Debug)]
pub struct RunReport {
    pub status: RunStatus,
    /// Unix epoch milliseconds at dispatcher creation.
    pub started_at: u64,
    /// Unix epoch milliseconds at close.
    pub finished_at: u64,
    pub consumer_reports: Vec<ConsumerReport>,
}

impl RunReport {
    /// Look up a consumer's report by registration name.
    pub fn consumer(&self, name: &str) -> Option<&ConsumerReport> {
        self.consumer_reports.iter().find(|r| r.name == name)
    }
}
