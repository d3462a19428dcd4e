use std::sync::Arc;

use parking_lot::RwLock;

use crate::event::{Event, Frame, Meta, Sequence};

/// Observational hooks emitted by the runner during a run.
///
/// All methods default to no-ops; implement the ones you care about.
/// Listeners must be thread-safe: `frame_ready` fires on the signal-relay
/// consumer's worker thread, `sequence_pause_toggled` on whichever thread
/// toggled the pause, and the rest on the runner thread.
pub trait RunnerSignals: Send + Sync {
    /// Emitted after engine sequence setup, before the first event.
    fn sequence_started(&self, _sequence: &Sequence, _summary: &Meta) {}

    /// Emitted whenever the paused state flips.
    fn sequence_pause_toggled(&self, _paused: bool) {}

    /// Emitted once when the runner observes cancellation.
    fn sequence_canceled(&self, _sequence: &Sequence) {}

    /// Emitted exactly once per run, even on failure.
    fn sequence_finished(&self, _sequence: &Sequence) {}

    /// Emitted before the engine sets up each event.
    fn event_started(&self, _event: &Event) {}

    /// Emitted once per event that requires a timed wait, with the
    /// remaining seconds at the moment the wait begins.
    fn awaiting_event(&self, _event: &Event, _remaining_s: f64) {}

    /// Emitted for every frame produced by the engine. No ordering
    /// guarantee against consumer deliveries.
    fn frame_ready(&self, _frame: &Frame) {}
}

/// Fan-out point for [`RunnerSignals`] listeners.
///
/// Cheap to clone; the listener list is shared. Connect listeners before
/// calling `run`. Emission is synchronous on the emitting thread.
#[derive(Clone, Default)]
pub struct SignalHub {
    listeners: Arc<RwLock<Vec<Arc<dyn RunnerSignals>>>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, listener: Arc<dyn RunnerSignals>) {
        self.listeners.write().push(listener);
    }

    /// Number of connected listeners.
    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub(crate) fn emit_sequence_started(&self, sequence: &Sequence, summary: &Meta) {
        for l in self.listeners.read().iter() {
            l.sequence_started(sequence, summary);
        }
    }

    pub(crate) fn emit_pause_toggled(&self, paused: bool) {
        for l in self.listeners.read().iter() {
            l.sequence_pause_toggled(paused);
        }
    }

    pub(crate) fn emit_sequence_canceled(&self, sequence: &Sequence) {
        for l in self.listeners.read().iter() {
            l.sequence_canceled(sequence);
        }
    }

    pub(crate) fn emit_sequence_finished(&self, sequence: &Sequence) {
        for l in self.listeners.read().iter() {
            l.sequence_finished(sequence);
        }
    }

    pub(crate) fn emit_event_started(&self, event: &Event) {
        for l in self.listeners.read().iter() {
            l.event_started(event);
        }
    }

    pub(crate) fn emit_awaiting_event(&self, event: &Event, remaining_s: f64) {
        for l in self.listeners.read().iter() {
            l.awaiting_event(event, remaining_s);
        }
    }

    pub(crate) fn emit_frame_ready(&self, frame: &Frame) {
        for l in self.listeners.read().iter() {
            l.frame_ready(frame);
        }
    }
}
