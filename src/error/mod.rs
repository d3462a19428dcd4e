use std::{error::Error, fmt};

use crate::report::RunReport;

const ERR_MSG_QUEUE_FULL: &str = "consumer queue is full";
const ERR_MSG_ENGINE: &str = "engine failure";
const ERR_MSG_OUTPUT: &str = "output coercion failed";

/// Lifecycle phase in which a consumer failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ConsumerPhase {
    Setup,
    Frame,
    Finish,
}

impl fmt::Display for ConsumerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConsumerPhase::Setup => write!(f, "setup"),
            ConsumerPhase::Frame => write!(f, "frame"),
            ConsumerPhase::Finish => write!(f, "finish"),
        }
    }
}

/// Captured failure of a critical consumer.
#[derive(Debug)]
pub struct ConsumerFailure {
    pub name: String,
    pub phase: ConsumerPhase,
    pub source: anyhow::Error,
}

impl ConsumerFailure {
    pub fn new(name: impl Into<String>, phase: ConsumerPhase, source: anyhow::Error) -> Self {
        Self {
            name: name.into(),
            phase,
            source,
        }
    }
}

impl fmt::Display for ConsumerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "critical consumer {:?} failed during {}: {}",
            self.name, self.phase, self.source
        )
    }
}

impl Error for ConsumerFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// The kinds of fatal failure a run can end with.
#[derive(Debug)]
pub enum RunErrorKind {
    /// The engine failed during sequence setup or event execution.
    Engine(anyhow::Error),
    /// A critical consumer failed under the `Raise` policy.
    Consumer(ConsumerFailure),
    /// A queue filled up under the `Fail` backpressure policy.
    QueueFull { name: String, capacity: usize },
    /// An output could not be coerced into a consumer.
    Output(String),
}

/// Fatal outcome of `Runner::run`.
///
/// Carries the run report whenever one was produced, so the caller still
/// sees per-consumer counters and the sibling error list after a failure.
#[derive(Debug)]
pub struct RunError {
    pub kind: RunErrorKind,
    pub report: Option<RunReport>,
}

impl RunError {
    pub fn engine(source: anyhow::Error) -> Self {
        Self {
            kind: RunErrorKind::Engine(source),
            report: None,
        }
    }

    pub fn consumer(failure: ConsumerFailure) -> Self {
        Self {
            kind: RunErrorKind::Consumer(failure),
            report: None,
        }
    }

    pub fn queue_full(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            kind: RunErrorKind::QueueFull {
                name: name.into(),
                capacity,
            },
            report: None,
        }
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self {
            kind: RunErrorKind::Output(msg.into()),
            report: None,
        }
    }

    pub fn with_report(mut self, report: RunReport) -> Self {
        self.report = Some(report);
        self
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            RunErrorKind::Engine(e) => write!(f, "{ERR_MSG_ENGINE}: {e}"),
            RunErrorKind::Consumer(c) => write!(f, "{c}"),
            RunErrorKind::QueueFull { name, capacity } => {
                write!(f, "{ERR_MSG_QUEUE_FULL}: {name:?} ({capacity} items)")
            }
            RunErrorKind::Output(msg) => write!(f, "{ERR_MSG_OUTPUT}: {msg}"),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            RunErrorKind::Engine(e) => Some(e.as_ref()),
            RunErrorKind::Consumer(c) => Some(c),
            _ => None,
        }
    }
}
