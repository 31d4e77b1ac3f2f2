//! Volume naming and the writer that assembles one volume.

use std::io::{self, Read, Seek, SeekFrom, Write};

use serde::Serialize;
use tracing::debug;

use crate::block::MARKER;
use crate::checksum::{crc32_continue, crc32_reader, STREAM_BUF};
use crate::error::{Error, Result};
use crate::header::{end_marker, main_header, FileEntry, END_MARKER_SIZE};
use crate::planner::VolumeSpec;
use crate::recovery::RecoveryBlock;

/// How volume files are named.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum VolumeNaming {
    /// `<base>.rar`, `<base>.r00` .. `<base>.r99`, `<base>.s00` .. and so on.
    #[default]
    Legacy,
    /// `<base>.partNNN.rar`, digits sized to the volume count. Not supported
    /// yet: selecting it fails with `InvalidArgument`.
    Numbered,
}

impl VolumeNaming {
    /// File name of volume `index` (0-based) in a set of `count` volumes.
    pub fn volume_name(self, base: &str, index: u32, count: u32) -> Result<String> {
        match self {
            VolumeNaming::Legacy => legacy_name(base, index),
            VolumeNaming::Numbered => Err(Error::InvalidArgument(format!(
                "numbered volume naming is not supported ({count} volumes requested)"
            ))),
        }
    }
}

fn legacy_name(base: &str, index: u32) -> Result<String> {
    if index == 0 {
        return Ok(format!("{base}.rar"));
    }
    let n = index - 1;
    let letter = b'r' as u32 + n / 100;
    if letter > b'z' as u32 {
        return Err(Error::InvalidArgument(format!(
            "volume {index} is past the last legacy name ({base}.z99)"
        )));
    }
    Ok(format!("{base}.{}{:02}", letter as u8 as char, n % 100))
}

/// Running CRC32 of the split file's data across all parts written so far.
#[derive(Debug, Clone, Copy, Default)]
pub struct SplitCrc {
    whole: u32,
}

impl SplitCrc {
    pub fn value(&self) -> u32 {
        self.whole
    }
}

fn sink(e: io::Error) -> Error {
    Error::SinkWrite(e)
}

/// One volume under construction. Created per volume, consumed by `finish`.
pub struct Volume<'a, W> {
    spec: &'a VolumeSpec,
    out: W,
    len: u64,
}

impl<'a, W: Read + Write + Seek> Volume<'a, W> {
    /// Start a volume: archive marker and main header.
    pub fn begin(spec: &'a VolumeSpec, mut out: W) -> Result<Self> {
        out.write_all(MARKER).map_err(sink)?;
        let main = main_header(spec.is_first);
        out.write_all(&main).map_err(sink)?;
        debug!(volume = %spec.name, first = spec.is_first, "main header");
        Ok(Self { spec, out, len: (MARKER.len() + main.len()) as u64 })
    }

    /// File header plus this volume's slice of the data file, copied from
    /// `source`'s current position. The header goes in after the data, once
    /// the CRC is known.
    pub fn write_file_part<R: Read>(
        &mut self,
        entry: &FileEntry,
        source: &mut R,
        split: &mut SplitCrc,
    ) -> Result<()> {
        let spec = self.spec;
        let split_after = !spec.is_last;
        let header_size = entry.header_size();
        let header_at = self.len;
        self.out.seek(SeekFrom::Start(header_at + header_size)).map_err(sink)?;

        let mut crc = if split_after { 0 } else { split.whole };
        let mut buf = vec![0u8; STREAM_BUF];
        let mut left = spec.payload_size;
        while left > 0 {
            let n = left.min(STREAM_BUF as u64) as usize;
            source.read_exact(&mut buf[..n]).map_err(Error::SourceRead)?;
            self.out.write_all(&buf[..n]).map_err(sink)?;
            crc = crc32_continue(crc, &buf[..n]);
            if split_after {
                split.whole = crc32_continue(split.whole, &buf[..n]);
            }
            left -= n as u64;
        }

        let header = entry.header(!spec.is_first, split_after, spec.payload_size as u32, crc);
        debug_assert_eq!(header.len() as u64, header_size);
        self.out.seek(SeekFrom::Start(header_at)).map_err(sink)?;
        self.out.write_all(&header).map_err(sink)?;
        self.len = header_at + header_size + spec.payload_size;
        self.out.seek(SeekFrom::Start(self.len)).map_err(sink)?;
        debug!(volume = %spec.name, bytes = spec.payload_size, crc = %format!("{crc:08x}"), "file part");
        Ok(())
    }

    /// Rescan everything written so far and append the recovery record.
    pub fn write_recovery(&mut self) -> Result<RecoveryBlock> {
        self.out.seek(SeekFrom::Start(0)).map_err(sink)?;
        let rr = RecoveryBlock::from_reader(&mut self.out, self.len, self.spec.recovery_sectors)
            .map_err(sink)?;
        self.out.seek(SeekFrom::Start(self.len)).map_err(sink)?;
        rr.write_to(&mut self.out).map_err(sink)?;
        self.len += rr.encoded_len();
        debug!(
            volume = %self.spec.name,
            sectors = rr.sector_crcs.len(),
            parity = rr.sector_count(),
            "recovery record"
        );
        Ok(rr)
    }

    /// Append the end marker and return the CRC32 of the finished volume.
    ///
    /// The marker carries the CRC of every byte before it; the returned CRC
    /// continues that value over the marker bytes as read back from the sink.
    pub fn finish(mut self) -> Result<(u32, W)> {
        self.out.seek(SeekFrom::Start(0)).map_err(sink)?;
        let pre_crc = crc32_reader(&mut self.out, self.len).map_err(sink)?;
        let volume_index = self.spec.index as u16;
        let marker = end_marker(pre_crc, volume_index, !self.spec.is_last);
        self.out.write_all(&marker).map_err(sink)?;

        self.out.seek(SeekFrom::Current(-(END_MARKER_SIZE as i64))).map_err(sink)?;
        let mut tail = [0u8; END_MARKER_SIZE as usize];
        self.out.read_exact(&mut tail).map_err(sink)?;
        let crc = crc32_continue(pre_crc, &tail);
        self.len += END_MARKER_SIZE;
        self.out.flush().map_err(sink)?;
        debug!(volume = %self.spec.name, index = volume_index, next = !self.spec.is_last, "end marker");
        debug_assert_eq!(self.len, self.spec.total_size);
        Ok((crc, self.out))
    }
}
