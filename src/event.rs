use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque metadata mapping passed between the engine, the runner and the
/// consumers. The core never interprets its contents beyond the
/// `runner_time_ms` key it may add to frame metadata.
pub type Meta = serde_json::Map<String, serde_json::Value>;

/// Key the runner adds to frame metadata when the engine left it absent.
pub const RUNNER_TIME_MS: &str = "runner_time_ms";

/// Opaque multi-dimensional numeric buffer.
///
/// The payload is a [`Bytes`] handle, so cloning an `ImageBuf` shares the
/// underlying allocation. Consumers receive frames by shared reference and
/// must treat the pixel data as read-only.
#[derive(Debug, Clone, Default)]
pub struct ImageBuf {
    data: Bytes,
    shape: Vec<usize>,
    bytes_per_pixel: usize,
}

impl ImageBuf {
    pub fn new(data: Bytes, shape: Vec<usize>, bytes_per_pixel: usize) -> Self {
        Self {
            data,
            shape,
            bytes_per_pixel,
        }
    }

    #[inline]
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn bytes_per_pixel(&self) -> usize {
        self.bytes_per_pixel
    }

    /// Total number of pixels across all dimensions.
    #[inline]
    pub fn pixel_count(&self) -> usize {
        if self.shape.is_empty() {
            0
        } else {
            self.shape.iter().product()
        }
    }
}

/// One unit of acquisition intent.
///
/// The core reads only `min_start_time`, `reset_event_timer` and `metadata`;
/// everything else is passed through to the engine untouched. Events have
/// identity by position in the input stream.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Event {
    /// Axis name to index, e.g. `{"t": 3, "z": 0}`.
    #[serde(default)]
    pub index: BTreeMap<String, usize>,
    /// Channel preset to configure before execution.
    #[serde(default)]
    pub channel: Option<String>,
    /// Exposure in milliseconds.
    #[serde(default)]
    pub exposure_ms: Option<f64>,
    /// Minimum start time in seconds from the run-start reference.
    #[serde(default)]
    pub min_start_time: Option<f64>,
    /// Reset the run-start reference to "now" before waiting on this event.
    #[serde(default)]
    pub reset_event_timer: bool,
    /// Arbitrary per-event metadata.
    #[serde(default)]
    pub metadata: Meta,
}

impl Event {
    /// Event scheduled at `min_start_time` seconds from the reference.
    pub fn at(min_start_time: f64) -> Self {
        Self {
            min_start_time: Some(min_start_time),
            ..Self::default()
        }
    }
}

/// Descriptor for the ordered input to a run, distinct from the iterator of
/// events the runner consumes.
#[derive(Debug, Clone)]
pub struct Sequence {
    pub uid: Uuid,
    pub metadata: Meta,
}

impl Sequence {
    pub fn new() -> Self {
        Self {
            uid: Uuid::new_v4(),
            metadata: Meta::new(),
        }
    }

    pub fn with_metadata(metadata: Meta) -> Self {
        Self {
            uid: Uuid::new_v4(),
            metadata,
        }
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new()
    }
}

/// The `(image, event, meta)` triple produced by the engine for an event.
///
/// Owned by the engine until yielded, by the runner while it decorates the
/// metadata, then shared read-only across all consumer workers.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: ImageBuf,
    pub event: Event,
    pub meta: Meta,
}

impl Frame {
    pub fn new(image: ImageBuf, event: Event, meta: Meta) -> Self {
        Self { image, event, meta }
    }
}
