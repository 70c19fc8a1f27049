//! Checksum and raw deflate primitives.
//!
//! The compression level and CRC variant are defined here and nowhere else.

use std::io::{self, Write};

use flate2::Compression;
use flate2::write::DeflateEncoder;

/// zlib CRC-32 (ISO 3309 polynomial) of `data`.
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
}

/// Raw deflate stream at the maximum level, with no zlib or gzip framing.
pub fn deflate_raw(data: &[u8]) -> io::Result<Vec<u8>> {
    let buf = Vec::with_capacity(data.len() / 2 + 16);
    let mut encoder = DeflateEncoder::new(buf, Compression::best());
    encoder.write_all(data)?;
    encoder.finish()
}
