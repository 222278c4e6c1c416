//! CRC Calculation
//!
//! Reflected CRC-32 (polynomial `0xEDB88320`) without the final inversion, seeded by the caller.
//! `COMPTYPE` `LZFu` streams carry it over the bytes following the header.

const fn build_table() -> [u32; 256] {
    let mut table = [0_u32; 256];
    let mut index = 0;
    while index < table.len() {
        let mut crc = index as u32;
        let mut round = 0;
        while round < 8 {
            crc = (crc >> 1) ^ (0xEDB8_8320 & 0_u32.wrapping_sub(crc & 1));
            round += 1;
        }
        table[index] = crc;
        index += 1;
    }
    table
}

static TABLE: [u32; 256] = build_table();

pub fn compute_crc(mut crc: u32, data: &[u8]) -> u32 {
    for &byte in data {
        crc = TABLE[usize::from(crc as u8 ^ byte)] ^ (crc >> 8);
    }
    crc
}
