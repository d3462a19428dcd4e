use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use crossbeam::utils::Backoff;

use crate::event::Frame;

/// Message on a worker queue. `Stop` is distinct from any valid frame and is
/// never reordered past queued frames.
pub(crate) enum WorkerMsg {
    Frame(Arc<Frame>),
    Stop,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub(crate) enum SubmitOutcome {
    Enqueued,
    /// The message was discarded (worker halted, or drop policy applied).
    Dropped,
    /// The queue was full under the `Fail` policy.
    Full,
}

/// Bounded frame queue between the runner thread and one consumer worker.
///
/// The submit side keeps a receiver clone so the drop-oldest policy can
/// evict the head; it also means the channel never disconnects while the
/// dispatcher is alive.
pub(crate) struct FrameQueue {
    tx: Sender<WorkerMsg>,
    probe: Receiver<WorkerMsg>,
    capacity: usize,
}

impl FrameQueue {
    pub fn bounded(capacity: usize) -> (Self, Receiver<WorkerMsg>) {
        let (tx, rx) = channel::bounded(capacity);
        let probe = rx.clone();
        (
            Self {
                tx,
                probe,
                capacity,
            },
            rx,
        )
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn pending(&self) -> usize {
        self.tx.len()
    }

    /// Block until the frame fits, aborting when `halted` turns true so a
    /// worker that exited mid-enqueue cannot deadlock the runner.
    pub fn send_blocking(&self, msg: Arc<Frame>, halted: impl Fn() -> bool) -> SubmitOutcome {
        let backoff = Backoff::new();
        let mut spins: u32 = 0;
        let mut m = WorkerMsg::Frame(msg);

        loop {
            if halted() {
                return SubmitOutcome::Dropped;
            }

            match self.tx.try_send(m) {
                Ok(()) => return SubmitOutcome::Enqueued,
                Err(TrySendError::Full(v)) => {
                    m = v;
                    spins = spins.saturating_add(1);
                    if spins < 64 {
                        backoff.spin();
                    } else if spins < 256 {
                        backoff.snooze();
                    } else {
                        thread::sleep(Duration::from_micros(2));
                    }
                }
                Err(TrySendError::Disconnected(_)) => return SubmitOutcome::Dropped,
            }
        }
    }

    /// Non-blocking put; a full queue drops the incoming frame.
    pub fn send_drop_newest(&self, msg: Arc<Frame>) -> SubmitOutcome {
        match self.tx.try_send(WorkerMsg::Frame(msg)) {
            Ok(()) => SubmitOutcome::Enqueued,
            Err(_) => SubmitOutcome::Dropped,
        }
    }

    /// Evict the head until the frame fits. Returns the outcome and how many
    /// queued frames were evicted. The worker only drains, so one eviction
    /// normally frees a slot; the retry bound covers the consume race.
    pub fn send_drop_oldest(&self, msg: Arc<Frame>) -> (SubmitOutcome, u64) {
        let mut evicted: u64 = 0;
        let mut m = WorkerMsg::Frame(msg);

        for _ in 0..4 {
            match self.tx.try_send(m) {
                Ok(()) => return (SubmitOutcome::Enqueued, evicted),
                Err(TrySendError::Full(v)) => {
                    m = v;
                    if let Ok(WorkerMsg::Frame(_)) = self.probe.try_recv() {
                        evicted += 1;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return (SubmitOutcome::Dropped, evicted),
            }
        }
        (SubmitOutcome::Dropped, evicted)
    }

    /// Non-blocking put; a full queue is the caller's error under `Fail`.
    pub fn send_or_full(&self, msg: Arc<Frame>) -> SubmitOutcome {
        match self.tx.try_send(WorkerMsg::Frame(msg)) {
            Ok(()) => SubmitOutcome::Enqueued,
            Err(TrySendError::Full(_)) => SubmitOutcome::Full,
            Err(TrySendError::Disconnected(_)) => SubmitOutcome::Dropped,
        }
    }

    /// Enqueue the stop sentinel, evicting queued frames if the queue is
    /// full. Returns the number of frames evicted. Eviction can only pop
    /// frames: stop is enqueued once, by the same thread that submits.
    pub fn push_stop(&self) -> u64 {
        let mut evicted: u64 = 0;
        let mut m = WorkerMsg::Stop;

        loop {
            match self.tx.try_send(m) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(v)) => {
                    m = v;
                    if let Ok(WorkerMsg::Frame(_)) = self.probe.try_recv() {
                        evicted += 1;
                    }
                }
                Err(TrySendError::Disconnected(_)) => return evicted,
            }
        }
    }
}
