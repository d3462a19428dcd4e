use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::consumer::{Consumer, ConsumerSpec};
use crate::event::{Event, Frame, ImageBuf, Meta, Sequence};
use crate::report::RunStatus;
use crate::signals::SignalHub;

/// Arity forms for a legacy `sequenceStarted` callback.
pub enum SequenceStartedFn {
    Full(Box<dyn FnMut(&Sequence, &Meta) + Send>),
    Sequence(Box<dyn FnMut(&Sequence) + Send>),
    Plain(Box<dyn FnMut() + Send>),
}

/// Arity forms for a legacy `frameReady` callback.
pub enum FrameReadyFn {
    Full(Box<dyn FnMut(&ImageBuf, &Event, &Meta) + Send>),
    ImageEvent(Box<dyn FnMut(&ImageBuf, &Event) + Send>),
    Image(Box<dyn FnMut(&ImageBuf) + Send>),
    Plain(Box<dyn FnMut() + Send>),
}

/// Arity forms for a legacy `sequenceFinished` callback.
pub enum SequenceFinishedFn {
    Sequence(Box<dyn FnMut(&Sequence) + Send>),
    Plain(Box<dyn FnMut() + Send>),
}

/// Adapter wrapping a historical handler as a [`Consumer`].
///
/// Legacy handlers exposed some subset of `sequenceStarted` / `frameReady` /
/// `sequenceFinished`, with varying signatures. Each callback is registered
/// in one of a bounded set of arity forms, resolved once here rather than
/// discovered per delivery. Handlers are treated as critical by default when
/// coerced through [`Output::Handler`].
#[derive(Default)]
pub struct LegacyHandler {
    sequence_started: Option<SequenceStartedFn>,
    frame_ready: Option<FrameReadyFn>,
    sequence_finished: Option<SequenceFinishedFn>,
}

impl LegacyHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_sequence_started(mut self, cb: SequenceStartedFn) -> Self {
        self.sequence_started = Some(cb);
        self
    }

    pub fn on_frame_ready(mut self, cb: FrameReadyFn) -> Self {
        self.frame_ready = Some(cb);
        self
    }

    pub fn on_sequence_finished(mut self, cb: SequenceFinishedFn) -> Self {
        self.sequence_finished = Some(cb);
        self
    }
}

impl Consumer for LegacyHandler {
    fn setup(&mut self, sequence: &Sequence, summary: &Meta) -> Result<()> {
        match &mut self.sequence_started {
            Some(SequenceStartedFn::Full(cb)) => cb(sequence, summary),
            Some(SequenceStartedFn::Sequence(cb)) => cb(sequence),
            Some(SequenceStartedFn::Plain(cb)) => cb(),
            None => {}
        }
        Ok(())
    }

    fn frame(&mut self, frame: &Frame) -> Result<()> {
        match &mut self.frame_ready {
            Some(FrameReadyFn::Full(cb)) => cb(&frame.image, &frame.event, &frame.meta),
            Some(FrameReadyFn::ImageEvent(cb)) => cb(&frame.image, &frame.event),
            Some(FrameReadyFn::Image(cb)) => cb(&frame.image),
            Some(FrameReadyFn::Plain(cb)) => cb(),
            None => {}
        }
        Ok(())
    }

    fn finish(&mut self, sequence: &Sequence, _status: RunStatus) -> Result<()> {
        match &mut self.sequence_finished {
            Some(SequenceFinishedFn::Sequence(cb)) => cb(sequence),
            Some(SequenceFinishedFn::Plain(cb)) => cb(),
            None => {}
        }
        Ok(())
    }
}

/// Maps filesystem paths to writer consumers, typically by extension.
/// Writers themselves live outside this crate.
pub trait WriterFactory: Send + Sync {
    fn for_path(&self, path: &Path) -> Result<Box<dyn Consumer>>;
}

/// One output passed to `run_with_outputs`, coerced into a critical
/// consumer spec before the run starts.
pub enum Output {
    /// Mapped through the runner's registered [`WriterFactory`].
    Path(PathBuf),
    /// Wrapped by the legacy arity adapter.
    Handler(LegacyHandler),
    /// Used as-is.
    Spec(ConsumerSpec),
}

impl From<PathBuf> for Output {
    fn from(path: PathBuf) -> Self {
        Output::Path(path)
    }
}

impl From<&str> for Output {
    fn from(path: &str) -> Self {
        Output::Path(PathBuf::from(path))
    }
}

impl From<LegacyHandler> for Output {
    fn from(handler: LegacyHandler) -> Self {
        Output::Handler(handler)
    }
}

impl From<ConsumerSpec> for Output {
    fn from(spec: ConsumerSpec) -> Self {
        Output::Spec(spec)
    }
}

/// Internal non-critical consumer that emits the runner's `frame_ready`
/// signal from its worker thread, keeping the hot loop down to `submit`.
pub(crate) struct SignalRelay {
    hub: SignalHub,
}

impl SignalRelay {
    pub(crate) fn new(hub: SignalHub) -> Self {
        Self { hub }
    }
}

impl Consumer for SignalRelay {
    fn frame(&mut self, frame: &Frame) -> Result<()> {
        self.hub.emit_frame_ready(frame);
        Ok(())
    }
}
