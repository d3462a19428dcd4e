use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::adapters::{Output, SignalRelay, WriterFactory};
use crate::config::RunPolicy;
use crate::consumer::ConsumerSpec;
use crate::dispatch::FrameDispatcher;
use crate::engine::{Engine, EventStream, IterSignal};
use crate::error::RunError;
use crate::event::{Event, RUNNER_TIME_MS, Sequence};
use crate::report::{RunReport, RunStatus};
use crate::signals::SignalHub;
use crate::utils::AtomicFlag;

/// Registration name of the internal frame-ready relay consumer.
pub const SIGNAL_RELAY_NAME: &str = "signal-relay";

/// Sleep granularity for timed waits and pause servicing.
const WAIT_TICK: Duration = Duration::from_millis(50);

/// Run clock: monotonic time since the run-start reference, excluding
/// accumulated paused time. Pause spans are recorded with `Instant`
/// timestamps, so the accounting is exact rather than estimated from sleep
/// ticks.
struct RunClock {
    t0: Mutex<Instant>,
    paused_accum: Mutex<Duration>,
    pause_started: Mutex<Option<Instant>>,
}

impl RunClock {
    fn new() -> Self {
        Self {
            t0: Mutex::new(Instant::now()),
            paused_accum: Mutex::new(Duration::ZERO),
            pause_started: Mutex::new(None),
        }
    }

    /// Reset the run-start reference to now. An in-progress pause span
    /// restarts so it cannot reach back past the reference.
    fn reset(&self) {
        *self.t0.lock() = Instant::now();
        *self.paused_accum.lock() = Duration::ZERO;
        let mut span = self.pause_started.lock();
        if span.is_some() {
            *span = Some(Instant::now());
        }
    }

    fn clear_pause(&self) {
        *self.pause_started.lock() = None;
        *self.paused_accum.lock() = Duration::ZERO;
    }

    fn pause_begin(&self) {
        *self.pause_started.lock() = Some(Instant::now());
    }

    fn pause_end(&self) {
        if let Some(started) = self.pause_started.lock().take() {
            *self.paused_accum.lock() += started.elapsed();
        }
    }

    fn elapsed(&self) -> Duration {
        let since_t0 = self.t0.lock().elapsed();
        let mut paused = *self.paused_accum.lock();
        if let Some(started) = *self.pause_started.lock() {
            paused += started.elapsed();
        }
        since_t0.checked_sub(paused).unwrap_or_default()
    }

    #[inline]
    fn seconds(&self) -> f64 {
        self.elapsed().as_secs_f64()
    }

    #[inline]
    fn millis(&self) -> f64 {
        self.elapsed().as_secs_f64() * 1e3
    }
}

/// Shared pause/cancel flags and the run clock. `canceled` is monotonic
/// within a run; all cancellation paths converge on it.
struct RunControl {
    canceled: AtomicFlag,
    paused: AtomicFlag,
    running: AtomicFlag,
    clock: RunClock,
}

impl RunControl {
    fn new() -> Self {
        Self {
            canceled: AtomicFlag::new(),
            paused: AtomicFlag::new(),
            running: AtomicFlag::new(),
            clock: RunClock::new(),
        }
    }
}

/// Cheap clonable handle for controlling and observing a run from any
/// thread while `Runner::run` blocks its caller.
#[derive(Clone)]
pub struct RunnerHandle {
    ctl: Arc<RunControl>,
    hub: SignalHub,
}

impl RunnerHandle {
    /// Request cancellation. Idempotent, safe from any thread. The runner
    /// observes the flag at its next safe point.
    pub fn cancel(&self) {
        self.ctl.canceled.set();
    }

    /// Toggle the paused state. No-op when no run is underway. Paused time
    /// is excluded from `min_start_time` reckoning.
    pub fn toggle_pause(&self) {
        if !self.ctl.running.get() {
            return;
        }
        let paused = self.ctl.paused.toggle();
        if paused {
            self.ctl.clock.pause_begin();
        } else {
            self.ctl.clock.pause_end();
        }
        tracing::info!(paused, "[AcqRunner] pause toggled");
        self.hub.emit_pause_toggled(paused);
    }

    /// Whether a run is underway: true between the `sequence_started` and
    /// `sequence_finished` signals, including while paused.
    #[inline]
    pub fn is_running(&self) -> bool {
        self.ctl.running.get()
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.ctl.paused.get()
    }

    /// Monotonic seconds since the run-start reference, minus accumulated
    /// paused time.
    #[inline]
    pub fn seconds_elapsed(&self) -> f64 {
        self.ctl.clock.seconds()
    }
}

/// Drives a multi-dimensional acquisition: waits for each event's scheduled
/// time, lets the engine turn the event into frames, and fans every frame
/// out through a [`FrameDispatcher`].
///
/// The runner thread is the sole producer. A `Runner` is reusable: after a
/// run finishes it returns to idle and `run` may be called again.
pub struct Runner {
    hub: SignalHub,
    ctl: Arc<RunControl>,
    writer_factory: Option<Arc<dyn WriterFactory>>,
}

impl Runner {
    pub fn new() -> Self {
        Self {
            hub: SignalHub::new(),
            ctl: Arc::new(RunControl::new()),
            writer_factory: None,
        }
    }

    /// The signal hub. Connect listeners before calling `run`.
    pub fn signals(&self) -> &SignalHub {
        &self.hub
    }

    /// Handle for cross-thread control of this runner.
    pub fn handle(&self) -> RunnerHandle {
        RunnerHandle {
            ctl: self.ctl.clone(),
            hub: self.hub.clone(),
        }
    }

    /// Factory used to coerce [`Output::Path`] outputs into writers.
    pub fn set_writer_factory(&mut self, factory: Arc<dyn WriterFactory>) {
        self.writer_factory = Some(factory);
    }

    pub fn cancel(&self) {
        self.handle().cancel();
    }

    pub fn toggle_pause(&self) {
        self.handle().toggle_pause();
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.ctl.running.get()
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.ctl.paused.get()
    }

    #[inline]
    pub fn seconds_elapsed(&self) -> f64 {
        self.ctl.clock.seconds()
    }

    /// Run the acquisition defined by `events`, blocking the calling thread
    /// until every submitted frame has been delivered and every consumer has
    /// been told how the run ended.
    pub fn run<E, I>(
        &mut self,
        engine: &mut E,
        sequence: Sequence,
        events: I,
        consumers: Vec<ConsumerSpec>,
        policy: RunPolicy,
    ) -> Result<RunReport, RunError>
    where
        E: Engine,
        I: IntoIterator<Item = Event>,
        I::IntoIter: Send + 'static,
    {
        self.run_with_outputs(engine, sequence, events, consumers, policy, Vec::new())
    }

    /// Like [`run`](Self::run), with additional outputs coerced into
    /// critical consumer specs (paths through the registered writer
    /// factory, legacy handlers through the arity adapter).
    pub fn run_with_outputs<E, I>(
        &mut self,
        engine: &mut E,
        sequence: Sequence,
        events: I,
        consumers: Vec<ConsumerSpec>,
        policy: RunPolicy,
        outputs: Vec<Output>,
    ) -> Result<RunReport, RunError>
    where
        E: Engine,
        I: IntoIterator<Item = Event>,
        I::IntoIter: Send + 'static,
    {
        // Idle -> Preparing: fresh flags and clocks for this run.
        self.ctl.canceled.clear();
        self.ctl.paused.clear();
        self.ctl.clock.clear_pause();
        self.ctl.clock.reset();

        let mut dispatcher = FrameDispatcher::new(policy);
        dispatcher.add_consumer(ConsumerSpec::observer(
            SIGNAL_RELAY_NAME,
            SignalRelay::new(self.hub.clone()),
        ));
        for spec in consumers {
            dispatcher.add_consumer(spec);
        }
        for output in outputs {
            dispatcher.add_consumer(self.coerce_output(output)?);
        }

        tracing::info!(sequence = %sequence.uid, "[AcqRunner] sequence starting");
        let summary = match engine.setup_sequence(&sequence) {
            Ok(summary) => summary,
            Err(err) => {
                // Aborts pre-start: no consumer receives setup.
                tracing::error!("[AcqRunner] engine sequence setup failed: {err:#}");
                let report = dispatcher.close(&sequence, RunStatus::Failed);
                self.hub.emit_sequence_finished(&sequence);
                return Err(RunError::engine(err).with_report(report));
            }
        };

        // Preparing -> Running.
        dispatcher.start(&sequence, &summary);
        self.ctl.running.set();
        self.hub.emit_sequence_started(&sequence, &summary);

        let events: EventStream = engine.event_iterator(Box::new(events.into_iter()));
        self.ctl.clock.reset();

        let loop_error = self.event_loop(engine, &mut dispatcher, events).err();

        // Running -> Closing.
        let failed = loop_error.is_some() || dispatcher.has_fatal();
        let status = if failed {
            RunStatus::Failed
        } else if self.ctl.canceled.get() {
            RunStatus::Canceled
        } else {
            RunStatus::Completed
        };

        if status == RunStatus::Canceled {
            tracing::warn!(sequence = %sequence.uid, "[AcqRunner] sequence canceled");
            self.hub.emit_sequence_canceled(&sequence);
        }

        let mut report = dispatcher.close(&sequence, status);
        let consumer_fatal = dispatcher.take_fatal();
        // A fatal may first surface while close() drains the queues; the
        // report never claims a clean completion when one is stored.
        if consumer_fatal.is_some() {
            report.status = RunStatus::Failed;
        }

        // Closing -> Finished -> Idle.
        if let Err(err) = engine.teardown_sequence(&sequence) {
            tracing::warn!("[AcqRunner] engine sequence teardown failed: {err:#}");
        }
        self.ctl.running.clear();
        self.ctl.paused.clear();
        self.ctl.clock.clear_pause();

        tracing::info!(
            sequence = %sequence.uid,
            status = %report.status,
            "[AcqRunner] sequence finished"
        );
        self.hub.emit_sequence_finished(&sequence);

        if let Some(err) = loop_error {
            return Err(err.with_report(report));
        }
        if let Some(failure) = consumer_fatal {
            return Err(RunError::consumer(failure).with_report(report));
        }
        Ok(report)
    }

    fn coerce_output(&self, output: Output) -> Result<ConsumerSpec, RunError> {
        match output {
            Output::Spec(spec) => Ok(spec),
            Output::Handler(handler) => {
                Ok(ConsumerSpec::new("legacy-handler", Box::new(handler), true))
            }
            Output::Path(path) => {
                let Some(factory) = &self.writer_factory else {
                    return Err(RunError::output(format!(
                        "no writer factory registered for path output {}",
                        path.display()
                    )));
                };
                let writer = factory.for_path(&path).map_err(|err| {
                    RunError::output(format!("{}: {err:#}", path.display()))
                })?;
                Ok(ConsumerSpec::new(path.display().to_string(), writer, true))
            }
        }
    }

    fn event_loop<E: Engine>(
        &self,
        engine: &mut E,
        dispatcher: &mut FrameDispatcher,
        events: EventStream,
    ) -> Result<(), RunError> {
        for event in events {
            if event.reset_event_timer {
                self.ctl.clock.reset();
            }
            if self.wait_until_start(&event) {
                break;
            }

            self.hub.emit_event_started(&event);
            let exec_result = self.run_event(engine, dispatcher, &event);
            // Event teardown runs even when execution failed.
            let teardown_result = engine.teardown_event(&event);
            exec_result?;
            teardown_result.map_err(RunError::engine)?;

            // Between events is a safe point for both cancellation paths.
            if dispatcher.should_cancel() {
                self.ctl.canceled.set();
            }
            if self.ctl.canceled.get() {
                break;
            }
        }
        Ok(())
    }

    /// Execute one event: engine setup, then the frame stream with the
    /// cooperative signal protocol, decorating and submitting each frame.
    fn run_event<E: Engine>(
        &self,
        engine: &mut E,
        dispatcher: &mut FrameDispatcher,
        event: &Event,
    ) -> Result<(), RunError> {
        engine.setup_event(event).map_err(RunError::engine)?;

        let Some(mut stream) = engine.exec_event(event).map_err(RunError::engine)? else {
            return Ok(());
        };

        let mut sent_cancel = false;
        loop {
            let signal = if self.ctl.canceled.get() {
                if sent_cancel {
                    break;
                }
                sent_cancel = true;
                Some(IterSignal::Cancel)
            } else if self.ctl.paused.get() {
                Some(IterSignal::Pause)
            } else {
                None
            };

            let Some(mut frame) = stream.resume(signal) else {
                break;
            };
            if sent_cancel {
                // Canceled mid-burst: nothing enters a queue any more.
                break;
            }

            if !frame.meta.contains_key(RUNNER_TIME_MS) {
                frame
                    .meta
                    .insert(RUNNER_TIME_MS.into(), self.ctl.clock.millis().into());
            }
            dispatcher.submit(frame)?;

            if dispatcher.should_cancel() {
                self.ctl.canceled.set();
                break;
            }
        }
        Ok(())
    }

    /// Wait until `seconds_elapsed >= event.min_start_time`, servicing pause
    /// and breaking immediately on cancel. Returns true when canceled.
    fn wait_until_start(&self, event: &Event) -> bool {
        let mut announced = false;
        loop {
            if self.ctl.canceled.get() {
                return true;
            }
            if self.ctl.paused.get() {
                thread::sleep(WAIT_TICK);
                continue;
            }

            let Some(min_start) = event.min_start_time else {
                return false;
            };
            let remaining = min_start - self.ctl.clock.seconds();
            if remaining <= 0.0 {
                return false;
            }
            if !announced {
                self.hub.emit_awaiting_event(event, remaining);
                announced = true;
            }
            thread::sleep(WAIT_TICK.min(Duration::from_secs_f64(remaining)));
        }
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}
