//! Main header, file header and end-of-archive marker builders.

use crate::block::{
    write_block, BLOCK_ENDARC, BLOCK_FILE, BLOCK_HEADER_SIZE, BLOCK_MAIN, ENDARC_DATACRC,
    ENDARC_NEXT_VOLUME, ENDARC_REVSPACE, ENDARC_VOLNR, FILE_DICT4096, FILE_EXTTIME,
    FILE_SPLIT_AFTER, FILE_SPLIT_BEFORE, FILE_UNICODE, LONG_BLOCK, MAIN_FIRST_VOLUME,
    MAIN_RECOVERY, MAIN_VOLUME, OS_WIN32, SKIP_IF_UNKNOWN,
};
use crate::error::{Error, Result};
use crate::name::NameField;
use crate::timestamp::{ExtTime, Timestamp};

const MAIN_RESERVED: usize = 2 + 4;
const END_RESERVED: usize = 7;

pub const MAIN_HEADER_SIZE: u64 = (BLOCK_HEADER_SIZE + MAIN_RESERVED) as u64;
pub const END_MARKER_SIZE: u64 = (BLOCK_HEADER_SIZE + 4 + 2 + END_RESERVED) as u64;

/// Fixed part of a file header body (everything before the name).
pub const FILE_FIELDS_SIZE: usize = 25;

const UNPACK_VERSION: u8 = 20;
pub(crate) const METHOD_STORE: u8 = b'0';
const ATTR_ARCHIVE: u32 = 1 << 5;

/// The fixed file-header fields, shared with the recovery sub-block preamble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFields {
    pub pack_size: u32,
    pub unp_size: u32,
    pub host_os: u8,
    pub crc: u32,
    pub dos_time: u32,
    pub unp_ver: u8,
    pub method: u8,
    pub name_size: u16,
    pub attr: u32,
}

impl FileFields {
    pub fn to_bytes(&self) -> [u8; FILE_FIELDS_SIZE] {
        let mut b = [0u8; FILE_FIELDS_SIZE];
        b[0..4].copy_from_slice(&self.pack_size.to_le_bytes());
        b[4..8].copy_from_slice(&self.unp_size.to_le_bytes());
        b[8] = self.host_os;
        b[9..13].copy_from_slice(&self.crc.to_le_bytes());
        b[13..17].copy_from_slice(&self.dos_time.to_le_bytes());
        b[17] = self.unp_ver;
        b[18] = self.method;
        b[19..21].copy_from_slice(&self.name_size.to_le_bytes());
        b[21..25].copy_from_slice(&self.attr.to_le_bytes());
        b
    }

    pub fn parse(b: &[u8]) -> Result<Self> {
        if b.len() < FILE_FIELDS_SIZE {
            return Err(Error::Malformed("file header fields truncated".into()));
        }
        let u32_at = |i: usize| u32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        Ok(Self {
            pack_size: u32_at(0),
            unp_size: u32_at(4),
            host_os: b[8],
            crc: u32_at(9),
            dos_time: u32_at(13),
            unp_ver: b[17],
            method: b[18],
            name_size: u16::from_le_bytes([b[19], b[20]]),
            attr: u32_at(21),
        })
    }
}

pub fn main_header(is_first: bool) -> Vec<u8> {
    let mut flags = MAIN_VOLUME | MAIN_RECOVERY;
    if is_first {
        flags |= MAIN_FIRST_VOLUME;
    }
    write_block(BLOCK_MAIN, flags, &[&[0u8; MAIN_RESERVED]])
}

/// The one file stored in the volume set, with its encoded name and time fields.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub name: NameField,
    pub dos_time: u32,
    pub ext_time: Option<ExtTime>,
    pub size: u32,
}

impl FileEntry {
    pub fn new(name: &str, mtime: &Timestamp, size: u64) -> Result<Self> {
        let size = u32::try_from(size).map_err(|_| {
            Error::InvalidArgument(format!("data file of {size} bytes needs 64-bit size fields"))
        })?;
        let entry = Self {
            name: NameField::encode(name)?,
            dos_time: mtime.dos_time(),
            ext_time: mtime.extended_time(),
            size,
        };
        if entry.header_size() > u16::MAX as u64 {
            return Err(Error::InvalidArgument(format!(
                "file header for {name:?} exceeds {} bytes",
                u16::MAX
            )));
        }
        Ok(entry)
    }

    /// Size of this entry's file header block (the data area excluded).
    pub fn header_size(&self) -> u64 {
        let ext = self.ext_time.as_ref().map_or(0, |x| x.len());
        (BLOCK_HEADER_SIZE + FILE_FIELDS_SIZE + self.name.len() + ext) as u64
    }

    /// File header for one part of the split file. `data_crc` is the part CRC
    /// for parts that continue, or the whole-file CRC for the final part.
    pub fn header(
        &self,
        split_before: bool,
        split_after: bool,
        pack_size: u32,
        data_crc: u32,
    ) -> Vec<u8> {
        let mut flags = LONG_BLOCK | FILE_DICT4096 | FILE_UNICODE;
        if split_before {
            flags |= FILE_SPLIT_BEFORE;
        }
        if split_after {
            flags |= FILE_SPLIT_AFTER;
        }
        let fields = FileFields {
            pack_size,
            unp_size: self.size,
            host_os: OS_WIN32,
            crc: data_crc,
            dos_time: self.dos_time,
            unp_ver: UNPACK_VERSION,
            method: METHOD_STORE,
            name_size: self.name.len() as u16,
            attr: ATTR_ARCHIVE,
        }
        .to_bytes();
        match &self.ext_time {
            Some(x) => write_block(
                BLOCK_FILE,
                flags | FILE_EXTTIME,
                &[&fields, self.name.as_bytes(), x.as_bytes()],
            ),
            None => write_block(BLOCK_FILE, flags, &[&fields, self.name.as_bytes()]),
        }
    }
}

/// End-of-archive marker. `volume_crc` is the CRC32 of every preceding byte
/// of the volume.
pub fn end_marker(volume_crc: u32, volume_index: u16, has_next: bool) -> Vec<u8> {
    let mut flags = SKIP_IF_UNKNOWN | ENDARC_DATACRC | ENDARC_REVSPACE | ENDARC_VOLNR;
    if has_next {
        flags |= ENDARC_NEXT_VOLUME;
    }
    write_block(
        BLOCK_ENDARC,
        flags,
        &[&volume_crc.to_le_bytes(), &volume_index.to_le_bytes(), &[0u8; END_RESERVED]],
    )
}
