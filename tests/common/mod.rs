#![allow(dead_code)]

use std::collections::HashMap;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tsflow::format::rtp::RTPPacket;
use tsflow::format::ts::{null_packet, SYNC_BYTE, TS_PACKET_SIZE};
use tsflow::utils::crc32_mpeg2;

pub const PMT_PID: u16 = 0x1000;
pub const PCR_PID: u16 = 0x100;

/// (stream type, PID) of every elementary stream in the fixture program.
pub const STREAMS: [(u8, u16); 5] = [
    (0x1B, 0x100), // H.264
    (0x24, 0x101), // HEVC
    (0x0F, 0x102), // AAC
    (0x03, 0x103), // MPEG-1 audio
    (0x06, 0x104), // private data
];

pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.gen()).collect()
}

/// Splits `data` into chunks of random length between 1 and `max`.
pub fn random_chunks(rng: &mut StdRng, data: &[u8], max: usize) -> Vec<Bytes> {
    let mut chunks = Vec::new();
    let mut rest = data;
    while !rest.is_empty() {
        let n = rng.gen_range(1..=max).min(rest.len());
        chunks.push(Bytes::copy_from_slice(&rest[..n]));
        rest = &rest[n..];
    }
    chunks
}

#[derive(Default)]
pub struct StreamWriter {
    counters: HashMap<u16, u8>,
}

impl StreamWriter {
    fn next_cc(&mut self, pid: u16) -> u8 {
        let cc = self.counters.entry(pid).or_insert(0x0F);
        *cc = (*cc + 1) & 0x0F;
        *cc
    }

    pub fn payload(&mut self, pid: u16, pusi: bool, payload: &[u8]) -> [u8; TS_PACKET_SIZE] {
        let cc = self.next_cc(pid);
        let mut packet = [0xFFu8; TS_PACKET_SIZE];
        packet[0] = SYNC_BYTE;
        packet[1] = ((pid >> 8) as u8 & 0x1F) | if pusi { 0x40 } else { 0 };
        packet[2] = pid as u8;
        packet[3] = 0x10 | cc;
        let n = payload.len().min(TS_PACKET_SIZE - 4);
        packet[4..4 + n].copy_from_slice(&payload[..n]);
        packet
    }

    pub fn section(&mut self, pid: u16, section: &[u8]) -> [u8; TS_PACKET_SIZE] {
        let mut payload = vec![0x00];
        payload.extend_from_slice(section);
        self.payload(pid, true, &payload)
    }

    /// Adaptation-only packet; the continuity counter stays put.
    pub fn pcr(&mut self, pid: u16, pcr: u64) -> [u8; TS_PACKET_SIZE] {
        let cc = self.counters.get(&pid).copied().unwrap_or(0x0F);
        let mut packet = [0xFFu8; TS_PACKET_SIZE];
        packet[..4].copy_from_slice(&[SYNC_BYTE, (pid >> 8) as u8 & 0x1F, pid as u8, 0x20 | cc]);
        packet[4] = 183;
        packet[5] = 0x10;
        packet[6..12].copy_from_slice(&encode_pcr(pcr));
        packet
    }

    pub fn pes(&mut self, pid: u16, pts: u64, dts: u64) -> [u8; TS_PACKET_SIZE] {
        let mut pes = vec![0x00, 0x00, 0x01, 0xE0, 0x00, 0x00, 0x80, 0xC0, 0x0A];
        pes.extend_from_slice(&encode_timestamp(0x3, pts));
        pes.extend_from_slice(&encode_timestamp(0x1, dts));
        pes.resize(TS_PACKET_SIZE - 4, 0xA5);
        self.payload(pid, true, &pes)
    }
}

pub fn encode_pcr(pcr: u64) -> [u8; 6] {
    let base = pcr / 300;
    let ext = pcr % 300;
    [
        (base >> 25) as u8,
        (base >> 17) as u8,
        (base >> 9) as u8,
        (base >> 1) as u8,
        ((base & 1) << 7) as u8 | 0x7E | (ext >> 8) as u8,
        ext as u8,
    ]
}

pub fn encode_timestamp(prefix: u8, ts: u64) -> [u8; 5] {
    [
        (prefix << 4) | (((ts >> 30) as u8 & 0x07) << 1) | 1,
        (ts >> 22) as u8,
        (((ts >> 15) as u8) << 1) | 1,
        (ts >> 7) as u8,
        ((ts as u8) << 1) | 1,
    ]
}

fn with_crc(mut section: Vec<u8>) -> Vec<u8> {
    let length = section.len() + 1;
    section[1] = 0xB0 | (length >> 8) as u8;
    section[2] = length as u8;
    let crc = crc32_mpeg2(&section);
    section.extend_from_slice(&crc.to_be_bytes());
    section
}

pub fn pat_section() -> Vec<u8> {
    with_crc(vec![
        0x00, 0, 0, 0x00, 0x01, 0xC1, 0x00, 0x00,
        0x00, 0x01, 0xE0 | (PMT_PID >> 8) as u8, PMT_PID as u8,
    ])
}

pub fn pmt_section() -> Vec<u8> {
    let mut section = vec![
        0x02, 0, 0, 0x00, 0x01, 0xC1, 0x00, 0x00,
        0xE0 | (PCR_PID >> 8) as u8, PCR_PID as u8, 0xF0, 0x00,
    ];
    for (stream_type, pid) in STREAMS {
        section.extend_from_slice(&[stream_type, 0xE0 | (pid >> 8) as u8, pid as u8, 0xF0, 0x00]);
    }
    with_crc(section)
}

/// PAT and PMT followed by `rounds` rounds of one PCR packet, then per
/// elementary stream a PES start and two continuation packets. Rounds
/// are 40 ms apart.
pub fn program_stream(rounds: u64) -> Vec<[u8; TS_PACKET_SIZE]> {
    let mut w = StreamWriter::default();
    let mut packets = vec![
        w.section(0x0000, &pat_section()),
        w.section(PMT_PID, &pmt_section()),
    ];
    for round in 0..rounds {
        let pts = 90_000 + round * 3_600;
        packets.push(w.pcr(PCR_PID, pts * 300));
        for (_, pid) in STREAMS {
            packets.push(w.pes(pid, pts + 3_600, pts));
            packets.push(w.payload(pid, false, &[round as u8; 32]));
            packets.push(w.payload(pid, false, &[!(round as u8); 32]));
        }
    }
    packets
}

/// Packs TS packets into RTP frames of `per_frame` packets, padding the
/// last frame with null packets.
pub fn rtp_frames(packets: &[[u8; TS_PACKET_SIZE]], per_frame: usize, first_seq: u16) -> Vec<Bytes> {
    packets
        .chunks(per_frame)
        .enumerate()
        .map(|(i, group)| {
            let mut payload: Vec<u8> = group.concat();
            while payload.len() < per_frame * TS_PACKET_SIZE {
                payload.extend_from_slice(&null_packet());
            }
            RTPPacket::new(
                33,
                first_seq.wrapping_add(i as u16),
                (i as u32).wrapping_mul(3_000),
                0x5EED,
                false,
                Bytes::from(payload),
            )
            .to_bytes()
        })
        .collect()
}
