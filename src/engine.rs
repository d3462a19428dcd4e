use anyhow::Result;

use crate::event::{Event, Frame, Meta, Sequence};

/// Stream of events feeding a run. Finite or unbounded.
pub type EventStream = Box<dyn Iterator<Item = Event> + Send>;

/// Cooperative signal delivered into a [`FrameStream`] between yields.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IterSignal {
    /// Terminate the current inner sequence promptly. For hardware-sequenced
    /// acquisitions this entails halting the hardware sequence; after
    /// honoring it, the stream ends.
    Cancel,
    /// The run is paused. Only meaningful between inner frames that are
    /// under software control; hardware-triggered streams should log that
    /// pause is not applicable and continue.
    Pause,
}

/// Per-event frame producer with a reverse signal channel.
///
/// `resume` is the runner's only way to advance the stream: it carries the
/// signal chosen since the previous yield (or `None` to advance plainly) and
/// returns the next frame, or `None` when the stream is exhausted.
///
/// Every plain `Iterator<Item = Frame>` is a `FrameStream` that ignores
/// signals, so engines without inner sequencing can return e.g.
/// `vec.into_iter()` boxed. Engines driving hardware bursts implement the
/// trait directly and honor `Cancel`.
pub trait FrameStream {
    fn resume(&mut self, signal: Option<IterSignal>) -> Option<Frame>;
}

impl<I: Iterator<Item = Frame>> FrameStream for I {
    #[inline]
    fn resume(&mut self, _signal: Option<IterSignal>) -> Option<Frame> {
        self.next()
    }
}

/// The object that turns events into frames by driving instrumentation.
///
/// The engine never references the runner; all communication flows through
/// event inputs, the yielded frame stream and the [`IterSignal`] channel.
pub trait Engine {
    /// Called once before the first event. Returns the summary metadata
    /// handed to every consumer's `setup`.
    fn setup_sequence(&mut self, _sequence: &Sequence) -> Result<Meta> {
        Ok(Meta::new())
    }

    /// Prepare system state (hardware, etc.) for `event`. Any waits required
    /// for state changes to settle happen here.
    fn setup_event(&mut self, event: &Event) -> Result<()>;

    /// Execute `event`, producing zero or more frames. `None` is treated as
    /// an empty stream.
    fn exec_event(&mut self, event: &Event) -> Result<Option<Box<dyn FrameStream + '_>>>;

    /// Cleanup after `event`. Called even when execution failed.
    fn teardown_event(&mut self, _event: &Event) -> Result<()> {
        Ok(())
    }

    /// Cleanup after the last event.
    fn teardown_sequence(&mut self, _sequence: &Sequence) -> Result<()> {
        Ok(())
    }

    /// Optionally replace the raw event stream, e.g. to merge events that
    /// can be sequenced in hardware. The default is the identity.
    fn event_iterator(&mut self, events: EventStream) -> EventStream {
        events
    }
}
