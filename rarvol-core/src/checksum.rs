//! CRC helpers shared by block framing, the recovery record and the manifest.
//!
//! Everything is plain zlib CRC32 (`crc32fast`). The 16-bit header CRCs are
//! the low half of a CRC32; recovery sector CRCs are the inverted low half.

use crc32fast::Hasher as Crc32;
use std::io::Read;

/// Streaming buffer size used for every bulk copy and rescan.
pub const STREAM_BUF: usize = 0x10000;

/// Seed of the CRC32 that covers a recovery record's sector CRCs and parity.
pub const RR_CRC_SEED: u32 = 0xF000_0000;

/// CRC32 of `data`, continuing from a previous CRC value (zlib `crc32(data, prev)`).
pub fn crc32_continue(prev: u32, data: &[u8]) -> u32 {
    let mut h = Crc32::new_with_initial(prev);
    h.update(data);
    h.finalize()
}

/// Low 16 bits of CRC32 over the concatenation of `parts`.
pub fn crc16(parts: &[&[u8]]) -> u16 {
    let mut h = Crc32::new();
    for p in parts {
        h.update(p);
    }
    (h.finalize() & 0xFFFF) as u16
}

/// Recovery-record sector CRC: inverted low 16 bits of CRC32.
pub fn sector_crc(sector: &[u8]) -> u16 {
    let mut h = Crc32::new();
    h.update(sector);
    (!h.finalize() & 0xFFFF) as u16
}

/// CRC32 of exactly `len` bytes pulled from `reader`.
pub fn crc32_reader<R: Read>(reader: &mut R, len: u64) -> std::io::Result<u32> {
    let mut h = Crc32::new();
    let mut buf = vec![0u8; STREAM_BUF];
    let mut left = len;
    while left > 0 {
        let n = left.min(STREAM_BUF as u64) as usize;
        reader.read_exact(&mut buf[..n])?;
        h.update(&buf[..n]);
        left -= n as u64;
    }
    Ok(h.finalize())
}
