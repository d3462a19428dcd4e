use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::anyhow;
use crossbeam::channel::Receiver;
use parking_lot::Mutex;

use crate::config::{BackpressurePolicy, CriticalErrorPolicy, NonCriticalErrorPolicy, RunPolicy};
use crate::consumer::{Consumer, ConsumerSpec};
use crate::error::{ConsumerFailure, ConsumerPhase, RunError};
use crate::event::Frame;
use crate::report::ConsumerReport;
use crate::utils::AtomicFlag;
use crate::{error_throttled, warn_throttled};

use super::queue::{FrameQueue, SubmitOutcome, WorkerMsg};

const ERROR_LOG_INTERVAL: Duration = Duration::from_secs(1);

/// State written by the worker thread and read by the dispatcher.
pub(crate) struct WorkerShared {
    processed: AtomicU64,
    stop_requested: AtomicFlag,
    disconnected: AtomicFlag,
    errors: Mutex<Vec<anyhow::Error>>,
    fatal: Mutex<Option<ConsumerFailure>>,
}

impl WorkerShared {
    fn new() -> Self {
        Self {
            processed: AtomicU64::new(0),
            stop_requested: AtomicFlag::new(),
            disconnected: AtomicFlag::new(),
            errors: Mutex::new(Vec::new()),
            fatal: Mutex::new(None),
        }
    }

    /// True once the worker stopped pulling frames for any reason.
    #[inline]
    fn halted(&self) -> bool {
        self.stop_requested.get() || self.disconnected.get()
    }
}

/// One consumer worker: a thread draining a bounded queue, plus the
/// submit-side bookkeeping the dispatcher needs.
///
/// `submitted`/`dropped` are written only by the runner thread;
/// `processed`/`errors`/`fatal` only by the worker, through [`WorkerShared`],
/// so a report can be produced even for a worker that never honored stop.
pub(crate) struct ConsumerWorker {
    pub name: String,
    pub critical: bool,
    queue: FrameQueue,
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<Box<dyn Consumer>>>,
    submitted: u64,
    dropped: u64,
    join_timed_out: bool,
}

impl ConsumerWorker {
    pub fn spawn(spec: ConsumerSpec, policy: &RunPolicy) -> Self {
        let ConsumerSpec {
            name,
            consumer,
            critical,
        } = spec;

        let capacity = if critical {
            policy.critical_capacity()
        } else {
            policy.observer_capacity()
        };
        let (queue, rx) = FrameQueue::bounded(capacity);

        let shared = Arc::new(WorkerShared::new());
        let handle = {
            let shared = shared.clone();
            let name = name.clone();
            let policy = policy.clone();
            thread::Builder::new()
                .name(format!("acq-{name}"))
                .spawn(move || worker_loop(rx, consumer, shared, name, critical, policy))
                .expect("failed to spawn consumer worker thread")
        };

        Self {
            name,
            critical,
            queue,
            shared,
            handle: Some(handle),
            submitted: 0,
            dropped: 0,
            join_timed_out: false,
        }
    }

    /// Enqueue one frame per the backpressure policy. Called from the runner
    /// thread only.
    pub fn submit(&mut self, msg: &Arc<Frame>, bp: BackpressurePolicy) -> Result<(), RunError> {
        if self.shared.disconnected.get() {
            self.dropped += 1;
            return Ok(());
        }
        if self.shared.stop_requested.get() {
            return Ok(());
        }

        self.submitted += 1;
        match bp {
            BackpressurePolicy::Block => {
                let outcome = self
                    .queue
                    .send_blocking(msg.clone(), || self.shared.halted());
                if outcome != SubmitOutcome::Enqueued {
                    self.dropped += 1;
                }
            }
            BackpressurePolicy::DropNewest => {
                if self.queue.send_drop_newest(msg.clone()) != SubmitOutcome::Enqueued {
                    self.dropped += 1;
                }
            }
            BackpressurePolicy::DropOldest => {
                let (outcome, evicted) = self.queue.send_drop_oldest(msg.clone());
                self.dropped += evicted;
                if outcome != SubmitOutcome::Enqueued {
                    self.dropped += 1;
                }
            }
            BackpressurePolicy::Fail => match self.queue.send_or_full(msg.clone()) {
                SubmitOutcome::Enqueued => {}
                SubmitOutcome::Full => {
                    self.dropped += 1;
                    return Err(RunError::queue_full(&self.name, self.queue.capacity()));
                }
                SubmitOutcome::Dropped => {
                    self.dropped += 1;
                }
            },
        }
        Ok(())
    }

    /// Signal the worker to exit after draining its queue.
    pub fn stop(&mut self) {
        self.dropped += self.queue.push_stop();
    }

    /// Wait for the worker thread until `deadline`, returning the consumer
    /// for its `finish` call. A worker that never honors stop is left
    /// running and reported, not killed.
    pub fn join_within(&mut self, deadline: Instant) -> Option<Box<dyn Consumer>> {
        let handle = self.handle.take()?;

        while !handle.is_finished() {
            if Instant::now() >= deadline {
                self.join_timed_out = true;
                self.handle = Some(handle);
                tracing::warn!(
                    consumer = %self.name,
                    "[FrameDispatcher] worker did not honor stop within the close deadline"
                );
                return None;
            }
            thread::sleep(Duration::from_millis(10));
        }

        match handle.join() {
            Ok(consumer) => Some(consumer),
            Err(_) => {
                tracing::error!(consumer = %self.name, "[FrameDispatcher] worker thread panicked");
                self.shared
                    .errors
                    .lock()
                    .push(anyhow!("worker thread panicked"));
                None
            }
        }
    }

    #[inline]
    pub fn stop_requested(&self) -> bool {
        self.shared.stop_requested.get()
    }

    #[inline]
    pub fn has_fatal(&self) -> bool {
        self.shared.fatal.lock().is_some()
    }

    pub fn take_fatal(&mut self) -> Option<ConsumerFailure> {
        self.shared.fatal.lock().take()
    }

    /// Record a failure from this consumer's synchronous `finish` call.
    pub fn record_error(&mut self, err: anyhow::Error) {
        self.shared.errors.lock().push(err);
    }

    #[inline]
    pub fn queue_status(&self) -> (usize, usize) {
        (self.queue.pending(), self.queue.capacity())
    }

    pub fn report(&mut self) -> ConsumerReport {
        let mut errors = std::mem::take(&mut *self.shared.errors.lock());
        if self.join_timed_out {
            errors.push(anyhow!("worker did not finish within the close deadline"));
        }
        ConsumerReport {
            name: self.name.clone(),
            submitted: self.submitted,
            processed: self.shared.processed.load(Ordering::Relaxed),
            dropped: self.dropped,
            errors,
        }
    }
}

/// Thread body: pull messages in order, invoke the consumer, apply the
/// error policy. Returns the consumer so the dispatcher can run `finish`
/// on the runner thread.
fn worker_loop(
    rx: Receiver<WorkerMsg>,
    mut consumer: Box<dyn Consumer>,
    shared: Arc<WorkerShared>,
    name: String,
    critical: bool,
    policy: RunPolicy,
) -> Box<dyn Consumer> {
    loop {
        match rx.recv() {
            Ok(WorkerMsg::Frame(frame)) => match consumer.frame(&frame) {
                Ok(()) => {
                    shared.processed.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    if handle_frame_error(&shared, &name, critical, &policy, err) {
                        break;
                    }
                }
            },
            Ok(WorkerMsg::Stop) | Err(_) => break,
        }
    }
    consumer
}

/// Policy matrix for a failed `frame` call. Returns true when the worker
/// must exit.
fn handle_frame_error(
    shared: &WorkerShared,
    name: &str,
    critical: bool,
    policy: &RunPolicy,
    err: anyhow::Error,
) -> bool {
    if critical {
        match policy.critical_error {
            CriticalErrorPolicy::Raise => {
                tracing::error!(
                    consumer = %name,
                    "[FrameDispatcher] critical consumer error (raising): {err:#}"
                );
                *shared.fatal.lock() =
                    Some(ConsumerFailure::new(name, ConsumerPhase::Frame, err));
                shared.stop_requested.set();
                true
            }
            CriticalErrorPolicy::Cancel => {
                tracing::error!(
                    consumer = %name,
                    "[FrameDispatcher] critical consumer error (canceling): {err:#}"
                );
                shared.errors.lock().push(err);
                shared.stop_requested.set();
                true
            }
            CriticalErrorPolicy::Continue => {
                error_throttled!(
                    ERROR_LOG_INTERVAL,
                    consumer = %name,
                    "[FrameDispatcher] critical consumer error (continuing): {err:#}"
                );
                shared.errors.lock().push(err);
                false
            }
        }
    } else {
        match policy.noncritical_error {
            NonCriticalErrorPolicy::Log => {
                warn_throttled!(
                    ERROR_LOG_INTERVAL,
                    consumer = %name,
                    "[FrameDispatcher] non-critical consumer error: {err:#}"
                );
                shared.errors.lock().push(err);
                false
            }
            NonCriticalErrorPolicy::Disconnect => {
                tracing::warn!(
                    consumer = %name,
                    "[FrameDispatcher] non-critical consumer disconnected after error: {err:#}"
                );
                shared.errors.lock().push(err);
                shared.disconnected.set();
                true
            }
        }
    }
}
