use crate::error::{FlowError, Result};

// Constants
pub const TS_PACKET_SIZE: usize = 188;
pub const TS_HEADER_SIZE: usize = 4;
pub const SYNC_BYTE: u8 = 0x47;

// PIDs
pub const PID_PAT: u16 = 0x0000;
pub const PID_NULL: u16 = 0x1FFF;

// Table IDs
pub const TABLE_ID_PAT: u8 = 0x00;
pub const TABLE_ID_PMT: u8 = 0x02;
pub const MAX_SECTION_LENGTH: usize = 1021;

// Elementary Stream Types
pub const STREAM_TYPE_MPEG2_VIDEO: u8 = 0x02;
pub const STREAM_TYPE_MPEG1_AUDIO: u8 = 0x03;
pub const STREAM_TYPE_MPEG2_AUDIO: u8 = 0x04;
pub const STREAM_TYPE_PRIVATE_PES: u8 = 0x06;
pub const STREAM_TYPE_AAC: u8 = 0x0f;
pub const STREAM_TYPE_H264: u8 = 0x1b;
pub const STREAM_TYPE_H265: u8 = 0x24;
pub const STREAM_TYPE_AC3: u8 = 0x81;

/// Human-readable name of a PMT stream type, for logs.
pub fn stream_type_name(stream_type: u8) -> &'static str {
    match stream_type {
        STREAM_TYPE_MPEG2_VIDEO => "mpeg2-video",
        STREAM_TYPE_MPEG1_AUDIO => "mpeg1-audio",
        STREAM_TYPE_MPEG2_AUDIO => "mpeg2-audio",
        STREAM_TYPE_PRIVATE_PES => "private-pes",
        STREAM_TYPE_AAC => "aac",
        STREAM_TYPE_H264 => "h264",
        STREAM_TYPE_H265 => "h265",
        STREAM_TYPE_AC3 => "ac3",
        _ => "unknown",
    }
}

/// A null packet: PID 0x1FFF, payload only, all stuffing.
pub fn null_packet() -> [u8; TS_PACKET_SIZE] {
    let mut packet = [0xFF; TS_PACKET_SIZE];
    packet[..TS_HEADER_SIZE].copy_from_slice(&[SYNC_BYTE, 0x1F, 0xFF, 0x10]);
    packet
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TSHeader {
    pub transport_error: bool,
    pub payload_unit_start: bool,
    pub transport_priority: bool,
    pub pid: u16,
    pub scrambling_control: u8,
    pub adaptation_field_exists: bool,
    pub contains_payload: bool,
    pub continuity_counter: u8,
}

impl TSHeader {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < TS_HEADER_SIZE {
            return Err(FlowError::InvalidData("TS packet too short".into()));
        }

        if data[0] != SYNC_BYTE {
            return Err(FlowError::InvalidData(format!(
                "invalid sync byte 0x{:02x}",
                data[0]
            )));
        }

        Ok(TSHeader {
            transport_error: (data[1] & 0x80) != 0,
            payload_unit_start: (data[1] & 0x40) != 0,
            transport_priority: (data[1] & 0x20) != 0,
            pid: (((data[1] & 0x1F) as u16) << 8) | data[2] as u16,
            scrambling_control: (data[3] >> 6) & 0x03,
            adaptation_field_exists: (data[3] & 0x20) != 0,
            contains_payload: (data[3] & 0x10) != 0,
            continuity_counter: data[3] & 0x0F,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdaptationField {
    /// Value of the adaptation_field_length byte.
    pub length: usize,
    pub discontinuity: bool,
    pub random_access: bool,
    pub es_priority: bool,
    /// 27 MHz program clock reference (base x 300 + extension).
    pub pcr: Option<u64>,
    pub opcr: Option<u64>,
    pub splice_countdown: Option<i8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PATEntry {
    pub program_number: u16,
    /// Network PID when `program_number` is 0, PMT PID otherwise.
    pub pid: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PAT {
    pub transport_stream_id: u16,
    pub version: u8,
    pub entries: Vec<PATEntry>,
}

impl PAT {
    /// PIDs carrying program map tables.
    pub fn pmt_pids(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries
            .iter()
            .filter(|e| e.program_number != 0)
            .map(|e| e.pid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    pub tag: u8,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementaryStreamInfo {
    pub stream_type: u8,
    pub elementary_pid: u16,
    pub descriptors: Vec<Descriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PMT {
    pub program_number: u16,
    pub version: u8,
    pub pcr_pid: u16,
    pub program_descriptors: Vec<Descriptor>,
    pub elementary_stream_infos: Vec<ElementaryStreamInfo>,
}

/// PTS/DTS pair from a PES header, 90 kHz ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PESTimestamps {
    pub pts: Option<u64>,
    pub dts: Option<u64>,
}

impl PESTimestamps {
    /// Decode timestamp if present, presentation timestamp otherwise.
    pub fn decode_time(&self) -> Option<u64> {
        self.dts.or(self.pts)
    }
}
