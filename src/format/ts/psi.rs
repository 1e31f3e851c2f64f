use log::debug;

use super::types::MAX_SECTION_LENGTH;
use crate::error::{FlowError, Result};

/// Reassembles PSI sections spread over the payloads of one PID.
///
/// A section starts in a packet with the payload unit start indicator set,
/// after the pointer field, and is complete once `section_length + 3`
/// bytes are collected.
#[derive(Debug, Default)]
pub struct SectionAccumulator {
    buf: Vec<u8>,
    collecting: bool,
}

impl SectionAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one packet payload and returns every section it completes.
    pub fn push(&mut self, payload_unit_start: bool, payload: &[u8]) -> Result<Vec<Vec<u8>>> {
        let mut done = Vec::new();

        let data = if payload_unit_start {
            let pointer = match payload.first() {
                Some(&p) => p as usize,
                None => {
                    self.reset();
                    return Err(FlowError::Parser("missing pointer field".into()));
                }
            };
            if 1 + pointer > payload.len() {
                self.reset();
                return Err(FlowError::Parser(format!(
                    "pointer field {} runs past payload",
                    pointer
                )));
            }
            if self.collecting {
                self.buf.extend_from_slice(&payload[1..1 + pointer]);
                self.extract(&mut done)?;
                if !self.buf.is_empty() {
                    debug!("dropping {} bytes of unfinished section", self.buf.len());
                }
            }
            self.buf.clear();
            self.collecting = true;
            &payload[1 + pointer..]
        } else if self.collecting {
            payload
        } else {
            return Ok(done);
        };

        self.buf.extend_from_slice(data);
        self.extract(&mut done)?;
        Ok(done)
    }

    fn extract(&mut self, done: &mut Vec<Vec<u8>>) -> Result<()> {
        while self.buf.len() >= 3 {
            // table id 0xFF: the rest of the packet is stuffing
            if self.buf[0] == 0xFF {
                self.reset();
                break;
            }
            let length = (((self.buf[1] & 0x0F) as usize) << 8) | self.buf[2] as usize;
            if length > MAX_SECTION_LENGTH {
                self.reset();
                return Err(FlowError::Parser(format!(
                    "section length {} too large",
                    length
                )));
            }
            if self.buf.len() < 3 + length {
                break;
            }
            done.push(self.buf.drain(..3 + length).collect());
        }
        if self.buf.is_empty() {
            self.collecting = false;
        }
        Ok(())
    }

    /// True while a section has been started but not completed.
    pub fn in_progress(&self) -> bool {
        self.collecting
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.collecting = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_single_packet_section() {
        let mut acc = SectionAccumulator::new();
        let mut payload = vec![0x00, 0x00, 0xB0, 0x03, 0xAA, 0xBB, 0xCC];
        payload.extend_from_slice(&[0xFF; 20]);

        let sections = acc.push(true, &payload).unwrap();
        assert_eq!(sections, vec![vec![0x00, 0xB0, 0x03, 0xAA, 0xBB, 0xCC]]);
        assert!(!acc.in_progress());
    }

    #[test]
    fn test_section_spans_packets() {
        let mut acc = SectionAccumulator::new();
        // continuation before any start is ignored
        assert!(acc.push(false, &[1, 2, 3]).unwrap().is_empty());

        assert!(acc.push(true, &[0x00, 0x02, 0xB0, 0x05, 1, 2]).unwrap().is_empty());
        assert!(acc.in_progress());
        let sections = acc.push(false, &[3, 4, 5, 0xFF, 0xFF]).unwrap();
        assert_eq!(sections, vec![vec![0x02, 0xB0, 0x05, 1, 2, 3, 4, 5]]);
    }

    #[test]
    fn test_pointer_field_finishes_previous_section() {
        let mut acc = SectionAccumulator::new();
        acc.push(true, &[0x00, 0x02, 0xB0, 0x03, 1]).unwrap();
        let sections = acc
            .push(true, &[0x02, 2, 3, 0x00, 0xB0, 0x01, 9])
            .unwrap();
        assert_eq!(
            sections,
            vec![vec![0x02, 0xB0, 0x03, 1, 2, 3], vec![0x00, 0xB0, 0x01, 9]]
        );
    }

    #[test]
    fn test_rejects_oversized_section() {
        let mut acc = SectionAccumulator::new();
        assert!(acc.push(true, &[0x00, 0x02, 0xB3, 0xFF, 0]).is_err());
        assert!(!acc.in_progress());
        assert!(acc.push(true, &[0x05, 0x00]).is_err());
    }
}
