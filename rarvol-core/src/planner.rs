//! Volume sizing: how many recovery sectors a volume gets, how much file
//! data fits next to them, and the resulting list of volumes.

use serde::Serialize;

use crate::block::MARKER;
use crate::error::{Error, Result};
use crate::header::{FileEntry, END_MARKER_SIZE, MAIN_HEADER_SIZE};
use crate::manifest::latin1_name;
use crate::recovery::{
    protected_sectors, RR_CRC_SIZE, RR_HEADER_SIZE, RR_MAX_SECTORS, RR_QUANTUM, RR_SECTOR_SIZE,
};
use crate::volume::VolumeNaming;

/// Default target volume size (15 MB, decimal).
pub const DEFAULT_VOLUME_SIZE: u64 = 15_000_000;

/// Recovery sectors for a volume of `total` bytes: about 0.6% of the size,
/// odd once there are six or more.
pub fn max_recovery_sectors(total: u64) -> u32 {
    if total < RR_SECTOR_SIZE as u64 {
        return 1;
    }
    let rr = total.saturating_mul(6) / RR_SECTOR_SIZE as u64 / 1000 + 2;
    if rr >= RR_MAX_SECTORS as u64 {
        return RR_MAX_SECTORS;
    }
    let rr = rr as u32;
    if rr < 6 {
        rr
    } else {
        rr | 1
    }
}

/// Bytes available for recovery-protected data (marker, headers and file
/// data) in a volume of `volume_size` carrying `sector_count` parity sectors.
pub fn usable_payload(volume_size: u64, sector_count: u32) -> Result<u64> {
    let overhead =
        RR_HEADER_SIZE + sector_count as u64 * RR_SECTOR_SIZE as u64 + END_MARKER_SIZE;
    let too_small = || {
        Error::InvalidArgument(format!("volume size {volume_size} leaves no room for data"))
    };
    let mut space = volume_size.checked_sub(overhead).filter(|&s| s > 0).ok_or_else(too_small)?;

    // A final quantum that can hold its CRC but no data is useless.
    let last = (space - 1) % RR_QUANTUM + 1;
    if last <= RR_CRC_SIZE {
        space -= last;
    }
    let usable = space - space.div_ceil(RR_QUANTUM) * RR_CRC_SIZE;
    if usable == 0 {
        return Err(too_small());
    }
    Ok(usable)
}

/// Number of volumes for `file_size` bytes at `per_volume` bytes each.
pub fn plan_volumes(file_size: u64, per_volume: u64) -> u64 {
    if per_volume == 0 {
        return 0;
    }
    file_size.div_ceil(per_volume)
}

/// Bytes preceding the file data in every volume.
pub fn volume_prefix_size(entry: &FileEntry) -> u64 {
    MARKER.len() as u64 + MAIN_HEADER_SIZE + entry.header_size()
}

/// Exact size of a finished volume whose recovery record protects `pre` bytes.
pub fn finished_volume_size(pre: u64, sector_count: u32) -> u64 {
    pre + RR_HEADER_SIZE
        + protected_sectors(pre) * RR_CRC_SIZE
        + sector_count as u64 * RR_SECTOR_SIZE as u64
        + END_MARKER_SIZE
}

/// Everything known about one volume before it is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeSpec {
    pub index: u32,
    pub name: String,
    pub is_first: bool,
    pub is_last: bool,
    /// Offset of this volume's data slice within the source file.
    pub data_offset: u64,
    pub payload_size: u64,
    pub recovery_sectors: u32,
    pub total_size: u64,
}

/// The whole volume set for one data file.
#[derive(Debug, Clone, Serialize)]
pub struct VolumePlan {
    pub file_size: u64,
    pub volume_size: u64,
    /// Recovery sectors of every volume but the last.
    pub max_recovery_sectors: u32,
    /// File data carried by every volume but the last.
    pub max_payload: u64,
    pub volumes: Vec<VolumeSpec>,
    pub manifest_name: String,
    pub manifest_size: u64,
}

impl VolumePlan {
    pub fn new(
        entry: &FileEntry,
        volume_size: u64,
        base: &str,
        naming: VolumeNaming,
    ) -> Result<Self> {
        let file_size = entry.size as u64;
        if file_size == 0 {
            return Err(Error::InvalidArgument("data file is empty".into()));
        }
        let rr_max = max_recovery_sectors(volume_size);
        let prefix = volume_prefix_size(entry);
        let max_payload = usable_payload(volume_size, rr_max)?
            .checked_sub(prefix)
            .filter(|&p| p > 0)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "volume size {volume_size} cannot hold the {prefix}-byte headers and any data"
                ))
            })?;

        let count = plan_volumes(file_size, max_payload);
        if count > u16::MAX as u64 + 1 {
            return Err(Error::InvalidArgument(format!(
                "{count} volumes exceed the 16-bit volume number"
            )));
        }

        let mut volumes = Vec::with_capacity(count as usize);
        let mut left = file_size;
        let mut index = 0u32;
        while left > 0 {
            let is_last = left <= max_payload;
            let payload_size = if is_last { left } else { max_payload };
            let pre = prefix + payload_size;
            let recovery_sectors = if is_last { max_recovery_sectors(pre) } else { rr_max };
            volumes.push(VolumeSpec {
                index,
                name: naming.volume_name(base, index, count as u32)?,
                is_first: index == 0,
                is_last,
                data_offset: file_size - left,
                payload_size,
                recovery_sectors,
                total_size: finished_volume_size(pre, recovery_sectors),
            });
            left -= payload_size;
            index += 1;
        }

        let manifest_name = format!("{base}.sfv");
        for name in volumes.iter().map(|v| &v.name).chain([&manifest_name]) {
            latin1_name(name)?;
        }
        let manifest_size = volumes.iter().map(|v| v.name.chars().count() as u64 + 1 + 8 + 2).sum();
        Ok(Self {
            file_size,
            volume_size,
            max_recovery_sectors: rr_max,
            max_payload,
            volumes,
            manifest_name,
            manifest_size,
        })
    }
}
