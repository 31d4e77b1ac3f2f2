//! Recovery record: per-sector CRCs plus XOR parity over every byte of a
//! volume that precedes the record.
//!
//! The protected bytes are cut into 512-byte sectors (the last one zero
//! padded). Sector `i` is XORed into parity sector `i % N`, so one damaged
//! sector per residue class can be rebuilt from the parity and the other
//! members of its class. The per-sector CRCs tell which sectors are damaged.
//!
//! On disk the record is a long `SUB` block named `RR` with the `Protect+`
//! tag, followed by the CRC list and then the N parity sectors.

use std::io::{self, Read, Write};

use crate::block::{
    write_block, BlockHeader, BLOCK_HEADER_SIZE, BLOCK_SUB, LONG_BLOCK, MARKER, OS_WIN32,
    SKIP_IF_UNKNOWN,
};
use crate::checksum::{sector_crc, RR_CRC_SEED, STREAM_BUF};
use crate::error::{Error, Result};
use crate::header::{FileFields, FILE_FIELDS_SIZE, METHOD_STORE};

pub const RR_SECTOR_SIZE: usize = 512;
pub const RR_CRC_SIZE: u64 = 2;
/// One sector of protected data plus its CRC.
pub const RR_QUANTUM: u64 = RR_SECTOR_SIZE as u64 + RR_CRC_SIZE;
pub const RR_MAX_SECTORS: u32 = 524_288;

const RR_NAME: &[u8; 2] = b"RR";
const RR_PROTECT: &[u8; 8] = b"Protect+";
const RR_UNPACK_VERSION: u8 = 29;

/// Size of the recovery sub-block header (data area excluded).
pub const RR_HEADER_SIZE: u64 =
    (BLOCK_HEADER_SIZE + FILE_FIELDS_SIZE + RR_NAME.len() + RR_PROTECT.len() + 4 + 8) as u64;

/// Number of 512-byte sectors needed to cover `len` protected bytes.
pub fn protected_sectors(len: u64) -> u64 {
    len.div_ceil(RR_SECTOR_SIZE as u64)
}

/// One 512-byte parity accumulator.
#[derive(Clone, PartialEq, Eq)]
pub struct ParitySector(Box<[u8; RR_SECTOR_SIZE]>);

impl ParitySector {
    pub fn zeroed() -> Self {
        Self(Box::new([0u8; RR_SECTOR_SIZE]))
    }

    pub fn xor_in(&mut self, sector: &[u8; RR_SECTOR_SIZE]) {
        for (d, s) in self.0.chunks_exact_mut(8).zip(sector.chunks_exact(8)) {
            let mut a = [0u8; 8];
            let mut b = [0u8; 8];
            a.copy_from_slice(d);
            b.copy_from_slice(s);
            d.copy_from_slice(&(u64::from_ne_bytes(a) ^ u64::from_ne_bytes(b)).to_ne_bytes());
        }
    }

    pub fn as_bytes(&self) -> &[u8; RR_SECTOR_SIZE] {
        &self.0
    }
}

impl std::fmt::Debug for ParitySector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ParitySector({:02x?}..)", &self.0[..8])
    }
}

/// Streaming builder: feed the volume's bytes from offset 0, then `finish`.
pub struct RecoveryBuilder {
    parity: Vec<ParitySector>,
    crcs: Vec<u16>,
    pending: [u8; RR_SECTOR_SIZE],
    pending_len: usize,
    protected: u64,
}

impl RecoveryBuilder {
    pub fn new(sector_count: u32) -> Self {
        let n = sector_count.max(1) as usize;
        Self {
            parity: (0..n).map(|_| ParitySector::zeroed()).collect(),
            crcs: Vec::new(),
            pending: [0u8; RR_SECTOR_SIZE],
            pending_len: 0,
            protected: 0,
        }
    }

    pub fn update(&mut self, mut data: &[u8]) {
        self.protected += data.len() as u64;
        while !data.is_empty() {
            let take = (RR_SECTOR_SIZE - self.pending_len).min(data.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];
            if self.pending_len == RR_SECTOR_SIZE {
                self.push_sector();
            }
        }
    }

    fn push_sector(&mut self) {
        let slot = self.crcs.len() % self.parity.len();
        self.crcs.push(sector_crc(&self.pending));
        self.parity[slot].xor_in(&self.pending);
        self.pending = [0u8; RR_SECTOR_SIZE];
        self.pending_len = 0;
    }

    pub fn finish(mut self) -> RecoveryBlock {
        if self.pending_len > 0 {
            self.push_sector();
        }
        RecoveryBlock { protected_size: self.protected, sector_crcs: self.crcs, parity: self.parity }
    }
}

/// A computed recovery record ready to be appended to its volume.
#[derive(Debug, Clone)]
pub struct RecoveryBlock {
    pub protected_size: u64,
    pub sector_crcs: Vec<u16>,
    pub parity: Vec<ParitySector>,
}

impl RecoveryBlock {
    /// Build from exactly `protected_size` bytes of `reader` (the volume from offset 0).
    pub fn from_reader<R: Read>(
        reader: &mut R,
        protected_size: u64,
        sector_count: u32,
    ) -> io::Result<Self> {
        let mut builder = RecoveryBuilder::new(sector_count);
        let mut buf = vec![0u8; STREAM_BUF];
        let mut left = protected_size;
        while left > 0 {
            let n = left.min(STREAM_BUF as u64) as usize;
            reader.read_exact(&mut buf[..n])?;
            builder.update(&buf[..n]);
            left -= n as u64;
        }
        Ok(builder.finish())
    }

    pub fn sector_count(&self) -> u32 {
        self.parity.len() as u32
    }

    fn crc_bytes(&self) -> Vec<u8> {
        self.sector_crcs.iter().flat_map(|c| c.to_le_bytes()).collect()
    }

    /// Length of the data area that follows the sub-block header.
    pub fn data_len(&self) -> u64 {
        self.sector_crcs.len() as u64 * RR_CRC_SIZE
            + self.parity.len() as u64 * RR_SECTOR_SIZE as u64
    }

    /// Total bytes appended to the volume.
    pub fn encoded_len(&self) -> u64 {
        RR_HEADER_SIZE + self.data_len()
    }

    /// CRC32 seeded with `RR_CRC_SEED` over the CRC list and then each parity sector.
    pub fn record_crc(&self) -> u32 {
        let mut h = crc32fast::Hasher::new_with_initial(RR_CRC_SEED);
        h.update(&self.crc_bytes());
        for p in &self.parity {
            h.update(p.as_bytes());
        }
        h.finalize()
    }

    pub fn header(&self) -> Vec<u8> {
        let size = self.data_len() as u32;
        let fields = FileFields {
            pack_size: size,
            unp_size: size,
            host_os: OS_WIN32,
            crc: self.record_crc(),
            dos_time: 0,
            unp_ver: RR_UNPACK_VERSION,
            method: METHOD_STORE,
            name_size: RR_NAME.len() as u16,
            attr: 0,
        }
        .to_bytes();
        write_block(
            BLOCK_SUB,
            LONG_BLOCK | SKIP_IF_UNKNOWN,
            &[
                &fields,
                RR_NAME,
                RR_PROTECT,
                &self.sector_count().to_le_bytes(),
                &(self.sector_crcs.len() as u64).to_le_bytes(),
            ],
        )
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.header())?;
        w.write_all(&self.crc_bytes())?;
        for p in &self.parity {
            w.write_all(p.as_bytes())?;
        }
        Ok(())
    }
}

/// Location and shape of a recovery record inside an existing volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryRecord {
    /// Offset of the sub-block header; equals the number of protected bytes.
    pub offset: u64,
    pub sector_count: u32,
    pub protected_sectors: u64,
    pub stored_crc: u32,
}

impl RecoveryRecord {
    /// Find the record in `volume`. Walks the block chain first; if a damaged
    /// header breaks the walk, falls back to searching for the `Protect+` tag.
    pub fn locate(volume: &[u8]) -> Result<Self> {
        if let Some(rr) = Self::walk(volume) {
            return Ok(rr);
        }
        let tag_at = BLOCK_HEADER_SIZE + FILE_FIELDS_SIZE + RR_NAME.len();
        let mut end = volume.len();
        while let Some(i) = volume[..end].windows(RR_PROTECT.len()).rposition(|w| w == RR_PROTECT) {
            if i >= tag_at {
                if let Ok(rr) = Self::parse_at(volume, i - tag_at) {
                    return Ok(rr);
                }
            }
            end = i + RR_PROTECT.len() - 1;
        }
        Err(Error::Malformed("no recovery record found".into()))
    }

    fn walk(volume: &[u8]) -> Option<Self> {
        if volume.len() < MARKER.len() || &volume[..MARKER.len()] != MARKER {
            return None;
        }
        let mut pos = MARKER.len();
        while pos < volume.len() {
            let hdr = BlockHeader::parse(&volume[pos..]).ok()?;
            if !hdr.verify_crc(&volume[pos..]) {
                return None;
            }
            if hdr.kind == BLOCK_SUB {
                if let Ok(rr) = Self::parse_at(volume, pos) {
                    return Some(rr);
                }
            }
            pos = pos.checked_add(hdr.total_len() as usize)?;
        }
        None
    }

    fn parse_at(volume: &[u8], pos: usize) -> Result<Self> {
        let buf = &volume[pos..];
        let hdr = BlockHeader::parse(buf)?;
        if hdr.kind != BLOCK_SUB || hdr.size as u64 != RR_HEADER_SIZE || !hdr.verify_crc(buf) {
            return Err(Error::Malformed(format!("no recovery header at offset {pos}")));
        }
        let fields = FileFields::parse(&buf[BLOCK_HEADER_SIZE..])?;
        let mut at = BLOCK_HEADER_SIZE + FILE_FIELDS_SIZE;
        if &buf[at..at + 2] != RR_NAME || &buf[at + 2..at + 10] != RR_PROTECT {
            return Err(Error::Malformed(format!("sub-block at offset {pos} is not a recovery record")));
        }
        at += 10;
        let sector_count = u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]]);
        let mut q = [0u8; 8];
        q.copy_from_slice(&buf[at + 4..at + 12]);
        let protected = u64::from_le_bytes(q);

        let offset = pos as u64;
        if sector_count == 0 || protected != protected_sectors(offset) {
            return Err(Error::Malformed(format!(
                "recovery record at offset {pos} covers {protected} sectors with {sector_count} parity sectors"
            )));
        }
        let rr = Self { offset, sector_count, protected_sectors: protected, stored_crc: fields.crc };
        if fields.pack_size as u64 != rr.data_len() || rr.data_end() > volume.len() as u64 {
            return Err(Error::Malformed(format!("recovery data at offset {pos} is truncated")));
        }
        Ok(rr)
    }

    pub fn data_len(&self) -> u64 {
        self.protected_sectors * RR_CRC_SIZE + self.sector_count as u64 * RR_SECTOR_SIZE as u64
    }

    fn crc_start(&self) -> u64 {
        self.offset + RR_HEADER_SIZE
    }

    fn parity_start(&self) -> u64 {
        self.crc_start() + self.protected_sectors * RR_CRC_SIZE
    }

    fn data_end(&self) -> u64 {
        self.crc_start() + self.data_len()
    }

    /// Stored CRC of protected sector `i`.
    pub fn sector_crc(&self, volume: &[u8], i: u64) -> u16 {
        let at = (self.crc_start() + i * RR_CRC_SIZE) as usize;
        u16::from_le_bytes([volume[at], volume[at + 1]])
    }

    /// Parity sector `k` as stored in the volume.
    pub fn parity<'a>(&self, volume: &'a [u8], k: u32) -> &'a [u8] {
        let at = (self.parity_start() + k as u64 * RR_SECTOR_SIZE as u64) as usize;
        &volume[at..at + RR_SECTOR_SIZE]
    }

    /// Whether the CRC list and parity sectors still match the stored record CRC.
    pub fn is_intact(&self, volume: &[u8]) -> bool {
        let mut h = crc32fast::Hasher::new_with_initial(RR_CRC_SEED);
        h.update(&volume[self.crc_start() as usize..self.data_end() as usize]);
        h.finalize() == self.stored_crc
    }
}

/// Protected sector `i` of `volume`, zero padded past the protected range.
pub fn read_sector(volume: &[u8], protected_size: u64, i: u64) -> [u8; RR_SECTOR_SIZE] {
    let start = i * RR_SECTOR_SIZE as u64;
    let end = (start + RR_SECTOR_SIZE as u64).min(protected_size);
    let mut sector = [0u8; RR_SECTOR_SIZE];
    if start < end {
        sector[..(end - start) as usize].copy_from_slice(&volume[start as usize..end as usize]);
    }
    sector
}
