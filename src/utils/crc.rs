//! MPEG-2 CRC32 (ITU-T H.222.0 / ISO/IEC 13818-1) used to validate PSI sections.
//!
//! Polynomial 0x04C11DB7, initial value 0xFFFFFFFF, no reflection, no final XOR.
//! A section including its trailing CRC field checksums to zero.

const POLY: u32 = 0x04C1_1DB7;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Computes the MPEG-2 CRC32 of `data`.
///
/// ```
/// use tsflow::utils::crc32_mpeg2;
///
/// assert_eq!(crc32_mpeg2(&[0x01, 0x01]), 0xD66F_B816);
/// ```
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    data.iter().fold(0xFFFF_FFFF, |crc, &byte| {
        (crc << 8) ^ TABLE[(((crc >> 24) ^ byte as u32) & 0xFF) as usize]
    })
}

/// True when `section` (table bytes followed by their CRC32) is intact.
pub fn section_crc_ok(section: &[u8]) -> bool {
    section.len() >= 4 && crc32_mpeg2(section) == 0
}
