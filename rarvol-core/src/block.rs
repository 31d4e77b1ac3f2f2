//! Structural block framing.
//!
//! Every logical unit of a volume is a block: a 7-byte header
//! `crc u16 | type u8 | flags u16 | size u16` followed by a type-specific
//! body. `size` counts the whole header (CRC field included) plus the body.
//! Long blocks (`LONG_BLOCK`) are followed by a data area whose length is the
//! first u32 of the body; that area is not covered by the header CRC.

use crate::checksum::crc16;
use crate::error::{Error, Result};

/// Archive marker written at offset 0 of every volume.
pub const MARKER: &[u8; 7] = b"Rar!\x1a\x07\x00";

pub const BLOCK_MAIN: u8 = 0x73;
pub const BLOCK_FILE: u8 = 0x74;
pub const BLOCK_SUB: u8 = 0x7a;
pub const BLOCK_ENDARC: u8 = 0x7b;

pub const LONG_BLOCK: u16 = 0x8000;
pub const SKIP_IF_UNKNOWN: u16 = 0x4000;

pub const MAIN_VOLUME: u16 = 0x0001;
pub const MAIN_RECOVERY: u16 = 0x0040;
pub const MAIN_FIRST_VOLUME: u16 = 0x0100;

pub const FILE_SPLIT_BEFORE: u16 = 0x0001;
pub const FILE_SPLIT_AFTER: u16 = 0x0002;
pub const FILE_DICT4096: u16 = 0x00c0;
pub const FILE_UNICODE: u16 = 0x0200;
pub const FILE_EXTTIME: u16 = 0x1000;

pub const ENDARC_NEXT_VOLUME: u16 = 0x0001;
pub const ENDARC_DATACRC: u16 = 0x0002;
pub const ENDARC_REVSPACE: u16 = 0x0004;
pub const ENDARC_VOLNR: u16 = 0x0008;

pub const OS_WIN32: u8 = 2;

/// Size of the common block header, CRC field included.
pub const BLOCK_HEADER_SIZE: usize = 7;

/// Serialize one block: CRC16, type, flags, size, then the concatenated body.
pub fn write_block(kind: u8, flags: u16, body: &[&[u8]]) -> Vec<u8> {
    let body_len: usize = body.iter().map(|p| p.len()).sum();
    let size = (BLOCK_HEADER_SIZE + body_len) as u16;

    let mut header = [0u8; 5];
    header[0] = kind;
    header[1..3].copy_from_slice(&flags.to_le_bytes());
    header[3..5].copy_from_slice(&size.to_le_bytes());

    let mut out = Vec::with_capacity(BLOCK_HEADER_SIZE + body_len);
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&header);
    for part in body {
        out.extend_from_slice(part);
    }
    let crc = crc16(&[&out[2..]]);
    out[..2].copy_from_slice(&crc.to_le_bytes());
    out
}

/// A parsed block header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub crc: u16,
    pub kind: u8,
    pub flags: u16,
    pub size: u16,
    /// Length of the data area following a long block.
    pub add_size: Option<u32>,
}

impl BlockHeader {
    /// Parse the header at the start of `buf`.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() < BLOCK_HEADER_SIZE {
            return Err(Error::Malformed(format!("block header truncated ({} bytes)", buf.len())));
        }
        let crc = u16::from_le_bytes([buf[0], buf[1]]);
        let kind = buf[2];
        let flags = u16::from_le_bytes([buf[3], buf[4]]);
        let size = u16::from_le_bytes([buf[5], buf[6]]);
        if (size as usize) < BLOCK_HEADER_SIZE {
            return Err(Error::Malformed(format!("block size {size} below header size")));
        }
        let add_size = if flags & LONG_BLOCK != 0 {
            if buf.len() < BLOCK_HEADER_SIZE + 4 || (size as usize) < BLOCK_HEADER_SIZE + 4 {
                return Err(Error::Malformed("long block without data size".into()));
            }
            let b = &buf[BLOCK_HEADER_SIZE..BLOCK_HEADER_SIZE + 4];
            Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        } else {
            None
        };
        Ok(Self { crc, kind, flags, size, add_size })
    }

    /// Header plus data area length.
    pub fn total_len(&self) -> u64 {
        self.size as u64 + self.add_size.unwrap_or(0) as u64
    }

    /// Recompute the header CRC over `buf` (which starts at this block).
    pub fn verify_crc(&self, buf: &[u8]) -> bool {
        let end = self.size as usize;
        buf.len() >= end && crc16(&[&buf[2..end]]) == self.crc
    }
}
