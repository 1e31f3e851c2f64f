use std::collections::BTreeMap;
use std::time::Instant;

use log::{debug, info};
use thiserror::Error;

use super::parser::{parse_adaptation_field, parse_pat, parse_pmt, payload_offset};
use super::psi::SectionAccumulator;
use super::types::*;
use crate::config::TrackerConfig;
use crate::error::FlowError;
use crate::stats::Histogram;
use crate::timing::{
    Clock, GapError, SystemClock, Unwrapper, WallClockEstimator, PCR_HZ, PCR_RANGE,
};
use crate::utils::Throttle;

/// A problem found while validating one packet.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("packet {index}: bad sync byte 0x{found:02x}")]
    SyncByte { index: usize, found: u8 },

    #[error("trailing {len} bytes do not form a TS packet")]
    ShortPacket { len: usize },

    #[error("pid {pid}: transport error indicator set")]
    TransportError { pid: u16 },

    #[error("pid {pid}: {reason}")]
    AdaptationLength { pid: u16, reason: String },

    #[error("pid {pid}: continuity counter {found}, expected {expected}")]
    Continuity { pid: u16, expected: u8, found: u8 },

    #[error("pid {pid}: {reason}")]
    Psi { pid: u16, reason: String },

    #[error("rtp: {0}")]
    Rtp(String),

    #[error("rtp gap: {0}")]
    Gap(#[from] GapError),
}

/// Outcome of one `track` call. Validation errors never abort the call;
/// they are collected here up to the configured ceiling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackReport {
    pub packets: usize,
    pub errors: Vec<ValidationError>,
}

impl TrackReport {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-PID counters of a [`TSStats`] snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PidStats {
    pub packets: u64,
    pub errors: u64,
    pub continuity_errors: u64,
    pub duplicates: u64,
    pub discontinuities: u64,
    pub stream_type: Option<u8>,
    pub last_pcr: Option<u64>,
    pub pcr_jitter: Histogram,
}

/// Copy of the tracker counters at the time of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TSStats {
    pub packets: u64,
    pub errors: u64,
    pub psi_errors: u64,
    pub pmt_complete: bool,
    pub pids: BTreeMap<u16, PidStats>,
}

#[derive(Debug, Default)]
struct PidState {
    stats: PidStats,
    last_cc: Option<u8>,
    duplicate: bool,
    pcr: Option<PcrState>,
}

#[derive(Debug)]
struct PcrState {
    unwrapper: Unwrapper,
    /// Highest unwrapped PCR recorded so far.
    newest: Option<i64>,
    estimator: WallClockEstimator,
}

impl PcrState {
    fn new() -> Self {
        Self {
            unwrapper: Unwrapper::new(PCR_RANGE),
            newest: None,
            estimator: WallClockEstimator::new(PCR_HZ),
        }
    }
}

/// Validates TS packets and gathers per-PID statistics.
#[derive(Debug)]
pub struct TSTracker<C: Clock = SystemClock> {
    config: TrackerConfig,
    clock: C,
    pids: BTreeMap<u16, PidState>,
    pat: SectionAccumulator,
    pat_seen: bool,
    pmts: BTreeMap<u16, SectionAccumulator>,
    /// PID to stream type, from the PMT. Kept across `reset`.
    stream_types: BTreeMap<u16, u8>,
    packets: u64,
    errors: u64,
    psi_errors: u64,
    throttle: Throttle,
}

impl TSTracker<SystemClock> {
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_clock(config, SystemClock)
    }
}

impl<C: Clock> TSTracker<C> {
    pub fn with_clock(config: TrackerConfig, clock: C) -> Self {
        let throttle = Throttle::new(config.log_interval);
        Self {
            config,
            clock,
            pids: BTreeMap::new(),
            pat: SectionAccumulator::new(),
            pat_seen: false,
            pmts: BTreeMap::new(),
            stream_types: BTreeMap::new(),
            packets: 0,
            errors: 0,
            psi_errors: 0,
            throttle,
        }
    }

    /// Validates every 188-byte packet of `frame`.
    pub fn track(&mut self, frame: &[u8]) -> TrackReport {
        let now = self.clock.now();
        self.track_at(frame, now)
    }

    pub(crate) fn track_at(&mut self, frame: &[u8], now: Instant) -> TrackReport {
        let mut report = TrackReport::default();
        let mut packets = frame.chunks_exact(TS_PACKET_SIZE);

        for (index, packet) in (&mut packets).enumerate() {
            report.packets += 1;
            self.packets += 1;
            // past the ceiling packets are only counted
            if report.errors.len() >= self.config.max_errors {
                continue;
            }
            let before = report.errors.len();
            self.inspect(index, packet, now, &mut report.errors);
            self.errors += (report.errors.len() - before) as u64;
        }

        let rest = packets.remainder();
        if !rest.is_empty() {
            self.errors += 1;
            if report.errors.len() < self.config.max_errors {
                report.errors.push(ValidationError::ShortPacket { len: rest.len() });
            }
        }

        self.log_stats_at(now);
        report
    }

    fn inspect(
        &mut self,
        index: usize,
        packet: &[u8],
        now: Instant,
        errors: &mut Vec<ValidationError>,
    ) {
        let header = match TSHeader::parse(packet) {
            Ok(header) => header,
            Err(_) => {
                errors.push(ValidationError::SyncByte {
                    index,
                    found: packet[0],
                });
                return;
            }
        };
        let pid = header.pid;
        let state = self.pids.entry(pid).or_default();
        state.stats.packets += 1;

        if header.transport_error {
            state.stats.errors += 1;
            errors.push(ValidationError::TransportError { pid });
            return;
        }

        let adaptation = match parse_adaptation_field(packet) {
            Ok(field) => field,
            Err(e) => {
                state.stats.errors += 1;
                errors.push(ValidationError::AdaptationLength {
                    pid,
                    reason: e.to_string(),
                });
                return;
            }
        };
        let discontinuity = adaptation.as_ref().map_or(false, |a| a.discontinuity);
        if discontinuity {
            state.stats.discontinuities += 1;
        }

        let mut duplicate = false;
        if pid != PID_NULL {
            match check_continuity(state, &header, discontinuity) {
                Continuity::Ok => {}
                Continuity::Duplicate => duplicate = true,
                Continuity::Broken { expected } => {
                    state.stats.errors += 1;
                    state.stats.continuity_errors += 1;
                    errors.push(ValidationError::Continuity {
                        pid,
                        expected,
                        found: header.continuity_counter,
                    });
                }
            }
        }

        if let Some(pcr) = adaptation.and_then(|a| a.pcr) {
            record_pcr(state, pcr, now);
        }

        if !duplicate && !self.pmt_complete() && header.scrambling_control == 0 {
            if let Err(reason) = self.collect_psi(packet, &header) {
                self.psi_errors += 1;
                if let Some(state) = self.pids.get_mut(&pid) {
                    state.stats.errors += 1;
                }
                errors.push(ValidationError::Psi { pid, reason });
            }
        }
    }

    // PSI is parsed until every PMT announced by the PAT has been seen.
    fn collect_psi(&mut self, packet: &[u8], header: &TSHeader) -> Result<(), String> {
        let pid = header.pid;
        let is_pat = pid == PID_PAT;
        if !is_pat && !self.pmts.contains_key(&pid) {
            return Ok(());
        }
        let offset = match payload_offset(packet, header).map_err(|e| e.to_string())? {
            Some(offset) => offset,
            None => return Ok(()),
        };
        let payload = &packet[offset..];

        let accumulator = if is_pat {
            &mut self.pat
        } else {
            match self.pmts.get_mut(&pid) {
                Some(acc) => acc,
                None => return Ok(()),
            }
        };
        let sections = accumulator
            .push(header.payload_unit_start, payload)
            .map_err(describe)?;

        for section in sections {
            if is_pat {
                let pat = parse_pat(&section).map_err(describe)?;
                debug!("PAT v{} with {} programs", pat.version, pat.entries.len());
                self.pat_seen = true;
                for pmt_pid in pat.pmt_pids() {
                    self.pmts.entry(pmt_pid).or_default();
                }
            } else if section.first() == Some(&TABLE_ID_PMT) {
                let pmt = parse_pmt(&section).map_err(describe)?;
                for es in &pmt.elementary_stream_infos {
                    debug!(
                        "program {} pid {}: {}",
                        pmt.program_number,
                        es.elementary_pid,
                        stream_type_name(es.stream_type)
                    );
                    self.stream_types.insert(es.elementary_pid, es.stream_type);
                }
                self.pmts.remove(&pid);
                break;
            }
        }
        Ok(())
    }

    /// True once the PAT and every PMT it lists have been parsed.
    pub fn pmt_complete(&self) -> bool {
        self.pat_seen && self.pmts.is_empty()
    }

    /// Number of elementary streams discovered through the PMT.
    pub fn stream_count(&self) -> usize {
        self.stream_types.len()
    }

    pub fn stream_type(&self, pid: u16) -> Option<u8> {
        self.stream_types.get(&pid).copied()
    }

    pub fn stats(&self) -> TSStats {
        let pids = self
            .pids
            .iter()
            .map(|(&pid, state)| {
                let mut stats = state.stats.clone();
                stats.stream_type = self.stream_type(pid);
                (pid, stats)
            })
            .collect();
        TSStats {
            packets: self.packets,
            errors: self.errors,
            psi_errors: self.psi_errors,
            pmt_complete: self.pmt_complete(),
            pids,
        }
    }

    /// Clears counters and PSI state. Discovered stream types are kept.
    pub fn reset(&mut self) {
        self.pids.clear();
        self.pat.reset();
        self.pat_seen = false;
        self.pmts.clear();
        self.packets = 0;
        self.errors = 0;
        self.psi_errors = 0;
    }

    /// Emits one statistics line, at most once per log interval.
    pub fn log_stats(&mut self) {
        let now = self.clock.now();
        self.log_stats_at(now);
    }

    fn log_stats_at(&mut self, now: Instant) {
        let suppressed = match self.throttle.ready(now) {
            Some(n) => n,
            None => return,
        };
        info!(
            "ts: {} packets, {} errors ({} psi), {} pids, {} streams",
            self.packets,
            self.errors,
            self.psi_errors,
            self.pids.len(),
            self.stream_types.len()
        );
        for (pid, state) in &self.pids {
            if state.stats.pcr_jitter.total() > 0 {
                info!("ts: pid {} pcr jitter {}", pid, state.stats.pcr_jitter);
            }
        }
        if suppressed > 0 {
            debug!("ts: {} stats reports skipped", suppressed);
        }
    }
}

fn describe(e: FlowError) -> String {
    match e {
        FlowError::Parser(msg) | FlowError::InvalidData(msg) => msg,
        other => other.to_string(),
    }
}

enum Continuity {
    Ok,
    Duplicate,
    Broken { expected: u8 },
}

fn check_continuity(state: &mut PidState, header: &TSHeader, discontinuity: bool) -> Continuity {
    let cc = header.continuity_counter;
    let last = match state.last_cc.replace(cc) {
        Some(last) if !discontinuity => last,
        _ => {
            state.duplicate = false;
            return Continuity::Ok;
        }
    };

    if !header.contains_payload {
        return if cc == last {
            Continuity::Ok
        } else {
            Continuity::Broken { expected: last }
        };
    }

    let expected = (last + 1) & 0x0F;
    if cc == expected {
        state.duplicate = false;
        Continuity::Ok
    } else if cc == last && !state.duplicate {
        state.duplicate = true;
        state.stats.duplicates += 1;
        Continuity::Duplicate
    } else {
        state.duplicate = false;
        Continuity::Broken { expected }
    }
}

fn record_pcr(state: &mut PidState, pcr: u64, now: Instant) {
    let clock = state.pcr.get_or_insert_with(PcrState::new);
    let unwrapped = clock.unwrapper.unwrap(pcr);
    if clock.newest.is_some_and(|newest| unwrapped < newest) {
        // encoder noise or reordering, on either side of a wrap
        return;
    }
    clock.newest = Some(unwrapped);
    state.stats.last_pcr = Some(pcr);

    let estimate = clock.estimator.observe(now, unwrapped);
    state.stats.pcr_jitter.record(estimate.jitter);
}
