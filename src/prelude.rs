pub use crate::adapters::{LegacyHandler, Output, WriterFactory};
pub use crate::config::{
    BackpressurePolicy, CriticalErrorPolicy, NonCriticalErrorPolicy, RunPolicy,
};
pub use crate::consumer::{Consumer, ConsumerSpec};
pub use crate::engine::{Engine, EventStream, FrameStream, IterSignal};
pub use crate::error::{ConsumerFailure, RunError, RunErrorKind};
pub use crate::event::{Event, Frame, ImageBuf, Meta, Sequence};
pub use crate::report::{ConsumerReport, RunReport, RunStatus};
pub use crate::runner::{Runner, RunnerHandle};
pub use crate::signals::{RunnerSignals, SignalHub};
