use super::types::*;
use crate::error::{FlowError, Result};
use crate::utils::section_crc_ok;

/// Parses the adaptation field of a complete TS packet.
///
/// Returns `Ok(None)` when the packet has no adaptation field or it is
/// empty. Declared lengths running past the packet are errors.
pub fn parse_adaptation_field(packet: &[u8]) -> Result<Option<AdaptationField>> {
    if packet.len() < TS_PACKET_SIZE {
        return Err(FlowError::InvalidData("TS packet too short".into()));
    }
    if (packet[3] & 0x20) == 0 {
        return Ok(None);
    }

    let length = packet[TS_HEADER_SIZE] as usize;
    // with a payload the field may take at most 182 bytes, without one 183
    let limit = if (packet[3] & 0x10) != 0 { 182 } else { 183 };
    if length > limit {
        return Err(FlowError::InvalidData(format!(
            "adaptation field length {} exceeds {}",
            length, limit
        )));
    }
    if length == 0 {
        return Ok(None);
    }

    let field_end = TS_HEADER_SIZE + 1 + length;
    let flags = packet[TS_HEADER_SIZE + 1];
    let mut field = AdaptationField {
        length,
        discontinuity: (flags & 0x80) != 0,
        random_access: (flags & 0x40) != 0,
        es_priority: (flags & 0x20) != 0,
        ..Default::default()
    };

    let mut pos = TS_HEADER_SIZE + 2;

    if (flags & 0x10) != 0 {
        if field_end < pos + 6 {
            return Err(FlowError::InvalidData("PCR data too short".into()));
        }
        field.pcr = Some(read_pcr(&packet[pos..pos + 6]));
        pos += 6;
    }

    if (flags & 0x08) != 0 {
        if field_end < pos + 6 {
            return Err(FlowError::InvalidData("OPCR data too short".into()));
        }
        field.opcr = Some(read_pcr(&packet[pos..pos + 6]));
        pos += 6;
    }

    if (flags & 0x04) != 0 {
        if field_end < pos + 1 {
            return Err(FlowError::InvalidData("Splice countdown too short".into()));
        }
        field.splice_countdown = Some(packet[pos] as i8);
    }

    Ok(Some(field))
}

fn read_pcr(data: &[u8]) -> u64 {
    let base = ((data[0] as u64) << 25)
        | ((data[1] as u64) << 17)
        | ((data[2] as u64) << 9)
        | ((data[3] as u64) << 1)
        | ((data[4] & 0x80) as u64 >> 7);
    let ext = (((data[4] & 0x01) as u64) << 8) | (data[5] as u64);
    base * 300 + ext
}

/// Offset of the payload inside a complete packet, or `None` when the
/// packet carries no payload.
pub fn payload_offset(packet: &[u8], header: &TSHeader) -> Result<Option<usize>> {
    if !header.contains_payload {
        return Ok(None);
    }
    let offset = if header.adaptation_field_exists {
        TS_HEADER_SIZE + 1 + packet[TS_HEADER_SIZE] as usize
    } else {
        TS_HEADER_SIZE
    };
    if offset >= TS_PACKET_SIZE {
        return Err(FlowError::InvalidData(
            "adaptation field leaves no room for payload".into(),
        ));
    }
    Ok(Some(offset))
}

/// Splits a complete PSI section into its declared body, checking the
/// length and CRC. Returns the bytes between the 8-byte long-form header
/// and the CRC.
fn section_body(section: &[u8], table_id: u8) -> Result<&[u8]> {
    if section.len() < 3 {
        return Err(FlowError::Parser("section header truncated".into()));
    }
    if section[0] != table_id {
        return Err(FlowError::Parser(format!(
            "unexpected table id 0x{:02x}, wanted 0x{:02x}",
            section[0], table_id
        )));
    }
    let length = (((section[1] & 0x0F) as usize) << 8) | section[2] as usize;
    if length > MAX_SECTION_LENGTH {
        return Err(FlowError::Parser(format!("section length {} too large", length)));
    }
    if length < 9 {
        return Err(FlowError::Parser(format!("section length {} too small", length)));
    }
    let total = 3 + length;
    if section.len() < total {
        return Err(FlowError::Parser(format!(
            "section truncated: {} of {} bytes",
            section.len(),
            total
        )));
    }
    if !section_crc_ok(&section[..total]) {
        return Err(FlowError::Parser(format!(
            "CRC mismatch in table 0x{:02x}",
            table_id
        )));
    }
    Ok(&section[8..total - 4])
}

pub fn parse_pat(section: &[u8]) -> Result<PAT> {
    let body = section_body(section, TABLE_ID_PAT)?;
    let mut pat = PAT {
        transport_stream_id: ((section[3] as u16) << 8) | section[4] as u16,
        version: (section[5] >> 1) & 0x1F,
        entries: Vec::with_capacity(body.len() / 4),
    };

    for entry in body.chunks_exact(4) {
        pat.entries.push(PATEntry {
            program_number: ((entry[0] as u16) << 8) | entry[1] as u16,
            pid: (((entry[2] & 0x1F) as u16) << 8) | entry[3] as u16,
        });
    }

    Ok(pat)
}

pub fn parse_pmt(section: &[u8]) -> Result<PMT> {
    let body = section_body(section, TABLE_ID_PMT)?;
    let mut pmt = PMT {
        program_number: ((section[3] as u16) << 8) | section[4] as u16,
        version: (section[5] >> 1) & 0x1F,
        ..Default::default()
    };

    if body.len() < 4 {
        return Err(FlowError::Parser("PMT too short for PCR PID".into()));
    }
    pmt.pcr_pid = (((body[0] & 0x1F) as u16) << 8) | body[1] as u16;

    let program_info_length = (((body[2] & 0x0F) as usize) << 8) | body[3] as usize;
    let mut pos = 4;
    if pos + program_info_length > body.len() {
        return Err(FlowError::Parser("Program info data too short".into()));
    }
    pmt.program_descriptors = parse_descriptors(&body[pos..pos + program_info_length])?;
    pos += program_info_length;

    while pos + 5 <= body.len() {
        let stream_type = body[pos];
        let elementary_pid = (((body[pos + 1] & 0x1F) as u16) << 8) | body[pos + 2] as u16;
        let es_info_length = (((body[pos + 3] & 0x0F) as usize) << 8) | body[pos + 4] as usize;
        pos += 5;

        if pos + es_info_length > body.len() {
            return Err(FlowError::Parser("ES info data too short".into()));
        }

        let descriptors = parse_descriptors(&body[pos..pos + es_info_length])?;
        pos += es_info_length;

        pmt.elementary_stream_infos.push(ElementaryStreamInfo {
            stream_type,
            elementary_pid,
            descriptors,
        });
    }

    if pos != body.len() {
        return Err(FlowError::Parser("trailing bytes in PMT".into()));
    }

    Ok(pmt)
}

fn parse_descriptors(data: &[u8]) -> Result<Vec<Descriptor>> {
    let mut descriptors = Vec::new();
    let mut pos = 0;

    while pos + 2 <= data.len() {
        let tag = data[pos];
        let length = data[pos + 1] as usize;
        pos += 2;

        if pos + length > data.len() {
            return Err(FlowError::Parser("Descriptor data too short".into()));
        }

        descriptors.push(Descriptor {
            tag,
            data: data[pos..pos + length].to_vec(),
        });
        pos += length;
    }

    Ok(descriptors)
}

/// Reads PTS/DTS from the start of a PES packet.
///
/// Returns `None` for payloads that are not a PES start or for stream ids
/// without the optional PES header.
pub fn parse_pes_timestamps(payload: &[u8]) -> Option<PESTimestamps> {
    if payload.len() < 9 || payload[..3] != [0x00, 0x00, 0x01] {
        return None;
    }
    match payload[3] {
        // program_stream_map, padding, private_stream_2, ECM, EMM,
        // directory, DSMCC, H.222.1 type E
        0xBC | 0xBE | 0xBF | 0xF0 | 0xF1 | 0xFF | 0xF2 | 0xF8 => return None,
        _ => {}
    }
    if payload[6] & 0xC0 != 0x80 {
        return None;
    }

    let flags = payload[7] >> 6;
    let mut timestamps = PESTimestamps::default();
    if flags & 0b10 != 0 && payload.len() >= 14 {
        timestamps.pts = Some(read_timestamp(&payload[9..14]));
    }
    if flags == 0b11 && payload.len() >= 19 {
        timestamps.dts = Some(read_timestamp(&payload[14..19]));
    }
    Some(timestamps)
}

fn read_timestamp(data: &[u8]) -> u64 {
    (((data[0] & 0x0E) as u64) << 29)
        | ((data[1] as u64) << 22)
        | (((data[2] & 0xFE) as u64) << 14)
        | ((data[3] as u64) << 7)
        | ((data[4] & 0xFE) as u64 >> 1)
}
