mod queue;
mod worker;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{CriticalErrorPolicy, NonCriticalErrorPolicy, RunPolicy};
use crate::consumer::ConsumerSpec;
use crate::error::{ConsumerFailure, ConsumerPhase, RunError};
use crate::event::{Frame, Meta, Sequence};
use crate::report::{ConsumerReport, RunReport, RunStatus};
use crate::utils::{AtomicFlag, now_millis};

use worker::ConsumerWorker;

/// Generous bound on worker drain at close; a worker that exceeds it is a
/// reported anomaly, not a kill target.
const JOIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Fan-out machine between the runner and the consumer workers.
///
/// Runs consumer `setup`/`finish` synchronously on the runner thread and
/// delivers frames through one bounded queue + worker thread per surviving
/// consumer. Workers share no state with each other, and the dispatcher
/// never mutates the frame payload.
///
/// `add_consumer`, `start`, `submit` and `close` belong to the runner
/// thread; `should_cancel` and `queue_status` are cheap reads that may be
/// slightly stale.
pub struct FrameDispatcher {
    policy: RunPolicy,
    specs: Vec<ConsumerSpec>,
    workers: Vec<ConsumerWorker>,
    /// Report stubs for consumers excluded at setup.
    excluded: Vec<ConsumerReport>,
    cancel_requested: AtomicFlag,
    fatal: Option<ConsumerFailure>,
    started_at: u64,
}

impl FrameDispatcher {
    pub fn new(policy: RunPolicy) -> Self {
        Self {
            policy,
            specs: Vec::new(),
            workers: Vec::new(),
            excluded: Vec::new(),
            cancel_requested: AtomicFlag::new(),
            fatal: None,
            started_at: now_millis(),
        }
    }

    /// Register a consumer. Must be called before `start`.
    pub fn add_consumer(&mut self, spec: ConsumerSpec) {
        self.specs.push(spec);
    }

    /// Run `setup` on every registered consumer, then spawn one worker per
    /// survivor. Setup failures are routed through the policy matrix and
    /// never propagate from here.
    pub fn start(&mut self, sequence: &Sequence, summary: &Meta) {
        for mut spec in std::mem::take(&mut self.specs) {
            match spec.consumer.setup(sequence, summary) {
                Ok(()) => self.workers.push(ConsumerWorker::spawn(spec, &self.policy)),
                Err(err) => {
                    if self.handle_setup_error(&spec.name, spec.critical, err) {
                        self.workers.push(ConsumerWorker::spawn(spec, &self.policy));
                    }
                }
            }
        }
    }

    /// Setup-failure policy matrix. Returns true when the consumer stays in
    /// the active set.
    fn handle_setup_error(&mut self, name: &str, critical: bool, err: anyhow::Error) -> bool {
        if critical {
            match self.policy.critical_error {
                CriticalErrorPolicy::Raise => {
                    tracing::error!(
                        consumer = %name,
                        "[FrameDispatcher] critical consumer setup error (raising): {err:#}"
                    );
                    let failure = ConsumerFailure::new(name, ConsumerPhase::Setup, err);
                    if self.fatal.is_none() {
                        self.fatal = Some(failure);
                    }
                    self.excluded.push(ConsumerReport::new(name));
                }
                CriticalErrorPolicy::Cancel => {
                    tracing::error!(
                        consumer = %name,
                        "[FrameDispatcher] critical consumer setup error (canceling): {err:#}"
                    );
                    self.cancel_requested.set();
                    let mut report = ConsumerReport::new(name);
                    report.errors.push(err);
                    self.excluded.push(report);
                }
                CriticalErrorPolicy::Continue => {
                    tracing::error!(
                        consumer = %name,
                        "[FrameDispatcher] critical consumer setup error (continuing): {err:#}"
                    );
                    let mut report = ConsumerReport::new(name);
                    report.errors.push(err);
                    self.excluded.push(report);
                }
            }
            false
        } else {
            match self.policy.noncritical_error {
                NonCriticalErrorPolicy::Log => {
                    // Frame deliveries may still succeed; keep it.
                    tracing::warn!(
                        consumer = %name,
                        "[FrameDispatcher] non-critical consumer setup error: {err:#}"
                    );
                    true
                }
                NonCriticalErrorPolicy::Disconnect => {
                    tracing::warn!(
                        consumer = %name,
                        "[FrameDispatcher] non-critical consumer disconnected on setup: {err:#}"
                    );
                    let mut report = ConsumerReport::new(name);
                    report.errors.push(err);
                    self.excluded.push(report);
                    false
                }
            }
        }
    }

    /// Fan one frame out to every worker. Called from the runner hot loop.
    /// The payload is shared by reference; only the `Fail` backpressure
    /// policy can make this return an error.
    pub fn submit(&mut self, frame: Frame) -> Result<(), RunError> {
        let msg = Arc::new(frame);
        let bp = self.policy.backpressure;
        for w in &mut self.workers {
            w.submit(&msg, bp)?;
        }
        Ok(())
    }

    /// True once the run should stop: a lifecycle failure under the
    /// `Cancel` policy, a stored fatal (prompt abort, deferred raise), or a
    /// critical worker's stop request.
    pub fn should_cancel(&self) -> bool {
        self.cancel_requested.get()
            || self.fatal.is_some()
            || self
                .workers
                .iter()
                .any(|w| w.critical && (w.stop_requested() || w.has_fatal()))
    }

    /// True when a fatal error is stored anywhere in the dispatcher.
    pub fn has_fatal(&self) -> bool {
        self.fatal.is_some() || self.workers.iter().any(|w| w.has_fatal())
    }

    /// Per-worker `(pending, capacity)` snapshot, keyed by consumer name.
    pub fn queue_status(&self) -> BTreeMap<String, (usize, usize)> {
        self.workers
            .iter()
            .map(|w| (w.name.clone(), w.queue_status()))
            .collect()
    }

    /// Stop and drain every worker, run `finish` on every surviving
    /// consumer, and assemble the run report. The first stored fatal stays
    /// behind for [`take_fatal`](Self::take_fatal).
    pub fn close(&mut self, sequence: &Sequence, status: RunStatus) -> RunReport {
        for w in &mut self.workers {
            w.stop();
        }

        let deadline = Instant::now() + JOIN_TIMEOUT;
        let mut finishers = Vec::with_capacity(self.workers.len());
        for (idx, w) in self.workers.iter_mut().enumerate() {
            match w.join_within(deadline) {
                Some(consumer) => finishers.push((idx, consumer)),
                None => tracing::warn!(
                    consumer = %w.name,
                    "[FrameDispatcher] skipping finish for unrecovered consumer"
                ),
            }
        }

        // Promote the earliest worker fatal if setup did not already store one.
        if self.fatal.is_none() {
            for w in &mut self.workers {
                if let Some(f) = w.take_fatal() {
                    self.fatal = Some(f);
                    break;
                }
            }
        }

        // Every survivor gets its finish call, even after an earlier failure.
        for (idx, mut consumer) in finishers {
            if let Err(err) = consumer.finish(sequence, status) {
                let (name, critical) = {
                    let w = &self.workers[idx];
                    (w.name.clone(), w.critical)
                };
                let recorded = self.handle_finish_error(&name, critical, err);
                if let Some(err) = recorded {
                    self.workers[idx].record_error(err);
                }
            }
        }

        let mut consumer_reports: Vec<ConsumerReport> =
            self.workers.iter_mut().map(|w| w.report()).collect();
        consumer_reports.append(&mut self.excluded);

        let report = RunReport {
            status,
            started_at: self.started_at,
            finished_at: now_millis(),
            consumer_reports,
        };

        tracing::info!(
            status = %report.status,
            consumers = report.consumer_reports.len(),
            "[FrameDispatcher] closed"
        );

        report
    }

    /// Finish-failure policy matrix. Returns the error when it should be
    /// recorded in the consumer's report.
    fn handle_finish_error(
        &mut self,
        name: &str,
        critical: bool,
        err: anyhow::Error,
    ) -> Option<anyhow::Error> {
        if self.fatal.is_some() {
            tracing::error!(
                consumer = %name,
                "[FrameDispatcher] consumer finish error (after prior failure): {err:#}"
            );
            return Some(err);
        }

        if critical {
            match self.policy.critical_error {
                CriticalErrorPolicy::Raise => {
                    tracing::error!(
                        consumer = %name,
                        "[FrameDispatcher] critical consumer finish error (raising): {err:#}"
                    );
                    self.fatal = Some(ConsumerFailure::new(name, ConsumerPhase::Finish, err));
                    None
                }
                CriticalErrorPolicy::Cancel => {
                    tracing::error!(
                        consumer = %name,
                        "[FrameDispatcher] critical consumer finish error (canceling): {err:#}"
                    );
                    self.cancel_requested.set();
                    Some(err)
                }
                CriticalErrorPolicy::Continue => {
                    tracing::error!(
                        consumer = %name,
                        "[FrameDispatcher] critical consumer finish error (continuing): {err:#}"
                    );
                    Some(err)
                }
            }
        } else {
            tracing::warn!(
                consumer = %name,
                "[FrameDispatcher] non-critical consumer finish error: {err:#}"
            );
            Some(err)
        }
    }

    /// Take the first stored fatal, if any. The runner re-raises it under
    /// the `Raise` policy once the report exists.
    pub fn take_fatal(&mut self) -> Option<ConsumerFailure> {
        self.fatal.take()
    }
}
