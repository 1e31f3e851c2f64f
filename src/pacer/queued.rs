use std::sync::Arc;

use log::{debug, info};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::{PacerStats, Schedule, TimeReference};
use crate::av::{Packet, PacketPool};
use crate::config::PacerConfig;
use crate::error::{FlowError, Result};

/// Pacer with a bounded queue between a producer and a consumer task.
///
/// The producer's [`push`](AsyncPacer::push) stamps each frame with its
/// due instant and copies it into a pooled buffer; [`pop`](AsyncPacer::pop)
/// returns frames in order, each no earlier than its due instant. The
/// pacer keeps a reference to the last popped frame until the next `pop`,
/// so a consumer may hold on to the buffer for that long without copying.
///
/// ```rust
/// use bytes::Bytes;
/// use tsflow::config::PacerConfig;
/// use tsflow::format::rtp::RTPPacket;
/// use tsflow::pacer::{AsyncPacer, RTPSchedule};
///
/// # #[tokio::main(flavor = "current_thread", start_paused = true)]
/// # async fn main() -> tsflow::Result<()> {
/// let config = PacerConfig::default();
/// let pacer = AsyncPacer::new(RTPSchedule::new(&config), &config);
///
/// let frame = RTPPacket::new(33, 1, 0, 1, false, Bytes::from_static(b"ts")).to_bytes();
/// pacer.push(&frame).await?;
/// assert_eq!(&pacer.pop().await?[..], &frame[..]);
///
/// pacer.shutdown("done");
/// assert!(pacer.pop().await.is_err());
/// # Ok(())
/// # }
/// ```
pub struct AsyncPacer<S> {
    shared: Arc<Shared<S>>,
}

struct Shared<S> {
    schedule: Mutex<S>,
    pool: PacketPool,
    tx: mpsc::Sender<Entry>,
    consumer: tokio::sync::Mutex<Consumer>,
    cancel: CancellationToken,
    cause: Mutex<Option<String>>,
}

struct Entry {
    due: Instant,
    packet: Packet,
}

struct Consumer {
    rx: mpsc::Receiver<Entry>,
    last: Option<Packet>,
}

impl Consumer {
    // Releases every queued frame and the held one.
    fn drain(&mut self) {
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        self.last = None;
        if dropped > 0 {
            debug!("released {} queued frames", dropped);
        }
    }
}

impl<S> Clone for AsyncPacer<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Schedule + 'static> AsyncPacer<S> {
    pub fn new(schedule: S, config: &PacerConfig) -> Self {
        let depth = config.queue_depth.max(1);
        let (tx, rx) = mpsc::channel(depth);
        Self {
            shared: Arc::new(Shared {
                schedule: Mutex::new(schedule),
                pool: PacketPool::new(config.buffer_size, depth + 2),
                tx,
                consumer: tokio::sync::Mutex::new(Consumer { rx, last: None }),
                cancel: CancellationToken::new(),
                cause: Mutex::new(None),
            }),
        }
    }

    /// Queues a copy of `frame`, waiting while the queue is full.
    pub async fn push(&self, frame: &[u8]) -> Result<()> {
        if self.shared.cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        let max = self.shared.pool.buffer_size();
        if frame.len() > max {
            return Err(FlowError::FrameTooLarge {
                len: frame.len(),
                max,
            });
        }

        let now = Instant::now();
        let target = self.shared.schedule.lock().target(frame, now.into_std());
        let entry = Entry {
            due: target.map_or(now, Instant::from_std),
            packet: self.shared.pool.copy_from(frame),
        };

        tokio::select! {
            biased;
            _ = self.shared.cancel.cancelled() => Err(self.cancelled()),
            sent = self.shared.tx.send(entry) => sent.map_err(|_| self.cancelled()),
        }
    }

    /// Waits for the next frame and for its due instant.
    pub async fn pop(&self) -> Result<Packet> {
        let cancel = &self.shared.cancel;
        let mut consumer = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.release_queued();
                return Err(self.cancelled());
            }
            guard = self.shared.consumer.lock() => guard,
        };
        consumer.last = None;

        let entry = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            entry = consumer.rx.recv() => entry,
        };
        let entry = match entry {
            Some(entry) => entry,
            None => {
                consumer.drain();
                return Err(self.cancelled());
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                drop(entry);
                consumer.drain();
                return Err(self.cancelled());
            }
            _ = sleep_until(entry.due) => {}
        }

        consumer.last = Some(entry.packet.clone());
        Ok(entry.packet)
    }

    /// Stops the pacer. Pending and later `push`/`pop` calls fail with
    /// the first cause given; queued frames go back to the pool.
    pub fn shutdown(&self, cause: impl Into<String>) {
        {
            let mut slot = self.shared.cause.lock();
            if slot.is_none() {
                let cause = cause.into();
                info!("pacer shutting down: {}", cause);
                *slot = Some(cause);
            }
        }
        self.shared.cancel.cancel();
        self.release_queued();
    }

    // A consumer busy in pop drains on its own; whatever it leaves behind
    // is released by the next pop.
    fn release_queued(&self) {
        if let Ok(mut consumer) = self.shared.consumer.try_lock() {
            consumer.rx.close();
            consumer.drain();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.cancel.is_cancelled()
    }

    pub fn stats(&self) -> PacerStats {
        self.shared.schedule.lock().stats()
    }

    pub fn reference(&self) -> Option<TimeReference> {
        self.shared.schedule.lock().reference()
    }

    pub fn pool(&self) -> &PacketPool {
        &self.shared.pool
    }

    fn cancelled(&self) -> FlowError {
        let cause = self.shared.cause.lock().clone();
        FlowError::Cancelled(cause.unwrap_or_else(|| "pacer closed".to_string()))
    }
}
