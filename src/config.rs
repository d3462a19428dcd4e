use serde::{Deserialize, Serialize};

/// What to do when a critical consumer fails.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticalErrorPolicy {
    /// Abort the run promptly and propagate the failure to the caller after
    /// `close()` has produced the report.
    Raise,
    /// Stop acquiring, finish cleanly, do not propagate.
    Cancel,
    /// Record the failure and keep going.
    Continue,
}

/// What to do when a non-critical consumer fails.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NonCriticalErrorPolicy {
    /// Log the failure, keep delivering.
    Log,
    /// Stop delivering to this consumer; subsequent submissions are dropped.
    Disconnect,
}

/// What `submit` does when a consumer's queue is full.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackpressurePolicy {
    /// Block the runner thread until the queue has space. Creates natural
    /// upstream backpressure to the engine.
    Block,
    /// Evict the oldest queued frame to make room.
    DropOldest,
    /// Drop the incoming frame.
    DropNewest,
    /// Fail the run with a queue-full error.
    Fail,
}

/// Error handling and backpressure knobs for one run.
/// Keeps the policy surface small and explicit; capacities below 1 are
/// clamped to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunPolicy {
    /// How critical-consumer failures are handled.
    #[serde(default = "default_critical_error")]
    pub critical_error: CriticalErrorPolicy,

    /// How non-critical consumer failures are handled.
    #[serde(default = "default_noncritical_error")]
    pub noncritical_error: NonCriticalErrorPolicy,

    /// What `submit` does when a queue is full.
    #[serde(default = "default_backpressure")]
    pub backpressure: BackpressurePolicy,

    /// Queue capacity for critical consumers.
    #[serde(default = "default_queue")]
    pub critical_queue: usize,

    /// Queue capacity for non-critical consumers.
    #[serde(default = "default_queue")]
    pub observer_queue: usize,
}

fn default_critical_error() -> CriticalErrorPolicy {
    CriticalErrorPolicy::Raise
}

fn default_noncritical_error() -> NonCriticalErrorPolicy {
    NonCriticalErrorPolicy::Log
}

fn default_backpressure() -> BackpressurePolicy {
    BackpressurePolicy::Block
}

fn default_queue() -> usize {
    256
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            critical_error: default_critical_error(),
            noncritical_error: default_noncritical_error(),
            backpressure: default_backpressure(),
            critical_queue: default_queue(),
            observer_queue: default_queue(),
        }
    }
}

impl RunPolicy {
    /// Effective queue capacity for a critical consumer.
    #[inline]
    pub fn critical_capacity(&self) -> usize {
        self.critical_queue.max(1)
    }

    /// Effective queue capacity for a non-critical consumer.
    #[inline]
    pub fn observer_capacity(&self) -> usize {
        self.observer_queue.max(1)
    }
}
