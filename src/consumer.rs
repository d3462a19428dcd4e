use std::fmt;

use anyhow::Result;

use crate::event::{Frame, Meta, Sequence};
use crate::report::RunStatus;

/// An object that receives frames and lifecycle notifications.
///
/// `setup` and `finish` run synchronously on the runner thread; `frame` runs
/// on the consumer's own worker thread, in submission order. The frame
/// payload is shared with every other worker and must be treated as
/// read-only.
pub trait Consumer: Send {
    fn setup(&mut self, _sequence: &Sequence, _summary: &Meta) -> Result<()> {
        Ok(())
    }

    fn frame(&mut self, frame: &Frame) -> Result<()>;

    fn finish(&mut self, _sequence: &Sequence, _status: RunStatus) -> Result<()> {
        Ok(())
    }
}

/// Registration record for one consumer. Stable for the duration of a run.
///
/// Critical sinks can halt the run; non-critical observers cannot. The name
/// need not be unique but is used in reports and logs.
pub struct ConsumerSpec {
    pub name: String,
    pub consumer: Box<dyn Consumer>,
    pub critical: bool,
}

impl ConsumerSpec {
    pub fn new(name: impl Into<String>, consumer: Box<dyn Consumer>, critical: bool) -> Self {
        Self {
            name: name.into(),
            consumer,
            critical,
        }
    }

    /// A critical sink (writer): its failures can halt the run.
    pub fn critical(name: impl Into<String>, consumer: impl Consumer + 'static) -> Self {
        Self::new(name, Box::new(consumer), true)
    }

    /// A non-critical observer (viewer, metrics): its failures cannot.
    pub fn observer(name: impl Into<String>, consumer: impl Consumer + 'static) -> Self {
        Self::new(name, Box::new(consumer), false)
    }
}

impl fmt::Debug for ConsumerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerSpec")
            .field("name", &self.name)
            .field("critical", &self.critical)
            .finish_non_exhaustive()
    }
}
