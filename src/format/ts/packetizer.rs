use bytes::Bytes;
use log::{debug, warn};

use super::types::{SYNC_BYTE, TS_PACKET_SIZE};
use crate::config::{SyncMode, TSPacketizerConfig};
use crate::error::Result;
use crate::format::{Packetizer, Reframer};
use crate::timing::{Clock, SystemClock};
use crate::utils::Throttle;

const RESYNC_LOG_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Groups a TS byte stream into frames of `packets_per_frame` packets.
///
/// ```rust
/// use bytes::Bytes;
/// use tsflow::config::TSPacketizerConfig;
/// use tsflow::format::{Packetizer, TSPacketizer};
/// use tsflow::format::ts::null_packet;
///
/// let mut packetizer = TSPacketizer::new(TSPacketizerConfig {
///     packets_per_frame: 2,
///     ..Default::default()
/// });
/// let stream: Vec<u8> = (0..3).flat_map(|_| null_packet()).collect();
/// packetizer.write(Bytes::from(stream)).unwrap();
///
/// assert_eq!(packetizer.next().unwrap().map(|f| f.len()), Some(376));
/// assert_eq!(packetizer.next().unwrap().map(|f| f.len()), Some(188));
/// assert!(packetizer.next().unwrap().is_none());
/// ```
#[derive(Debug)]
pub struct TSPacketizer<C: Clock = SystemClock> {
    frame: Reframer,
    config: TSPacketizerConfig,
    frame_size: usize,
    synced: bool,
    skipped: u64,
    clock: C,
    throttle: Throttle,
}

impl TSPacketizer<SystemClock> {
    pub fn new(config: TSPacketizerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> TSPacketizer<C> {
    pub fn with_clock(config: TSPacketizerConfig, clock: C) -> Self {
        let frame_size = config.packets_per_frame.max(1) * TS_PACKET_SIZE;
        // room for a full frame behind a partially read one, and for the
        // three-packet lookahead of the sync hunt
        let capacity = (frame_size * 2).max(TS_PACKET_SIZE * 4);
        Self {
            frame: Reframer::new(capacity),
            config,
            frame_size,
            synced: false,
            skipped: 0,
            clock,
            throttle: Throttle::new(RESYNC_LOG_INTERVAL),
        }
    }

    /// Size of a complete output frame in bytes.
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// Total bytes dropped while hunting for sync.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn reset(&mut self) {
        self.frame.reset();
        self.synced = false;
    }

    fn needs_sync(&self) -> bool {
        match self.config.sync {
            SyncMode::Modulo => false,
            SyncMode::Once => !self.synced,
            SyncMode::Continuous => self.frame.ring.peek(1) != [SYNC_BYTE],
        }
    }

    /// Drops bytes until the ring starts on a sync byte that is confirmed
    /// by the packets after it. Returns false when more input is needed.
    fn hunt(&mut self) -> bool {
        let buffered = self.frame.ring.peek(self.frame.ring.len());
        let found = (0..buffered.len()).find(|&i| {
            buffered[i] == SYNC_BYTE
                && (1..=2).all(|k| {
                    buffered
                        .get(i + k * TS_PACKET_SIZE)
                        .map_or(true, |&b| b == SYNC_BYTE)
                })
        });

        let (skip, locked) = match found {
            // a lone candidate is only trusted once no more bytes are queued
            Some(i) if i + TS_PACKET_SIZE < buffered.len() || self.frame.drained() => (i, true),
            Some(i) => (i, false),
            None => (buffered.len(), false),
        };

        if skip > 0 {
            self.frame.ring.skip(skip);
            self.skipped += skip as u64;
            match self.config.sync {
                SyncMode::Continuous => {
                    if let Some(suppressed) = self.throttle.ready(self.clock.now()) {
                        warn!(
                            "TS sync lost, skipped {} bytes ({} total, {} reports suppressed)",
                            skip, self.skipped, suppressed
                        );
                    }
                }
                _ => debug!("skipped {} bytes before first TS sync byte", skip),
            }
        }
        if locked {
            self.synced = true;
        }
        locked
    }

    // In continuous mode a frame stops in front of the first packet that
    // does not start with a sync byte.
    fn aligned_len(&self, n: usize) -> usize {
        if self.config.sync != SyncMode::Continuous {
            return n;
        }
        let data = self.frame.ring.peek(n);
        let packets = data
            .chunks(TS_PACKET_SIZE)
            .take_while(|p| p[0] == SYNC_BYTE)
            .count();
        (packets * TS_PACKET_SIZE).min(n)
    }
}

impl<C: Clock> Packetizer for TSPacketizer<C> {
    fn write(&mut self, data: Bytes) -> Result<()> {
        self.frame.write(data)
    }

    fn next(&mut self) -> Result<Option<&[u8]>> {
        loop {
            self.frame.fill();
            if !self.needs_sync() {
                break;
            }
            if !self.hunt() {
                // hunting frees ring space; retry while input is queued
                if self.frame.drained() {
                    return Ok(None);
                }
                continue;
            }
            break;
        }

        let buffered = self.frame.ring.len();
        let n = if buffered >= self.frame_size {
            self.frame_size
        } else if !self.config.exact && self.frame.drained() && buffered >= TS_PACKET_SIZE {
            buffered / TS_PACKET_SIZE * TS_PACKET_SIZE
        } else {
            return Ok(None);
        };

        let n = self.aligned_len(n);
        Ok(Some(self.frame.take(n)))
    }
}
