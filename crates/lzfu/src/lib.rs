#![doc = include_str!("../README.md")]

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use std::io::{self, Cursor};
use thiserror::Error;

mod crc;
mod dictionary;

use dictionary::{Dictionary, Reference};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0:?}")]
    Io(#[from] io::Error),
    #[error("Compressed RTF header truncated: {0} bytes")]
    HeaderTooShort(usize),
    #[error("COMPSIZE exceeds buffer: 0x{0:08X}")]
    CompressedSizeMismatch(u32),
    #[error("RAWSIZE mismatch: expected {expected}, decoded {actual}")]
    RawSizeMismatch { expected: u32, actual: usize },
    #[error("COMPRESSED CRC mismatch: 0x{0:08X}")]
    CompressedCrcMismatch(u32),
    #[error("Invalid COMPTYPE: 0x{0:08X}")]
    InvalidCompressionType(u32),
}

pub type Result<T> = std::result::Result<T, Error>;

const HEADER_SIZE: usize = 16;

/// `COMPTYPE` for LZFu compressed content.
const COMPRESSED: u32 = u32::from_le_bytes(*b"LZFu");
/// `COMPTYPE` for stored content.
const UNCOMPRESSED: u32 = u32::from_le_bytes(*b"MELA");

/// Decompress a `PidTagRtfCompressed` stream into raw RTF bytes.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < HEADER_SIZE {
        return Err(Error::HeaderTooShort(data.len()));
    }

    let mut cursor = Cursor::new(&data[..HEADER_SIZE]);
    // COMPSIZE
    let compressed_size = cursor.read_u32::<LittleEndian>()?;
    // RAWSIZE
    let raw_size = cursor.read_u32::<LittleEndian>()?;
    // COMPTYPE
    let compression_type = cursor.read_u32::<LittleEndian>()?;
    // CRC
    let crc = cursor.read_u32::<LittleEndian>()?;

    // COMPSIZE counts everything after itself.
    let end = compressed_size as usize + 4;
    if end < HEADER_SIZE || end > data.len() {
        return Err(Error::CompressedSizeMismatch(compressed_size));
    }
    let payload = &data[HEADER_SIZE..end];

    let output = match compression_type {
        COMPRESSED => {
            if crc != crc::compute_crc(0, payload) {
                return Err(Error::CompressedCrcMismatch(crc));
            }
            expand(payload, raw_size as usize)?
        }
        UNCOMPRESSED => payload.to_vec(),
        invalid => return Err(Error::InvalidCompressionType(invalid)),
    };

    if output.len() < raw_size as usize {
        return Err(Error::RawSizeMismatch {
            expected: raw_size,
            actual: output.len(),
        });
    }
    Ok(output[..raw_size as usize].to_vec())
}

/// Decompress and map each RTF byte to a `char`. RTF escapes anything outside 7-bit ASCII,
/// so the byte-to-char mapping is lossless for well-formed input.
pub fn decompress_to_string(data: &[u8]) -> Result<String> {
    Ok(decompress(data)?.into_iter().map(char::from).collect())
}

fn expand(payload: &[u8], raw_size: usize) -> Result<Vec<u8>> {
    let mut dictionary = Dictionary::default();
    let mut output = Vec::with_capacity(raw_size);
    let mut cursor = Cursor::new(payload);

    'runs: while let Ok(control) = cursor.read_u8() {
        for bit in 0..8 {
            if control & (1 << bit) == 0 {
                let Ok(byte) = cursor.read_u8() else {
                    break 'runs;
                };
                output.push(byte);
                dictionary.push(byte);
            } else {
                let Ok(reference) = cursor.read_u16::<BigEndian>() else {
                    break 'runs;
                };
                if !dictionary.expand(Reference::from(reference), &mut output) {
                    break 'runs;
                }
            }
        }
    }

    Ok(output)
}
