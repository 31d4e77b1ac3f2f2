//! Detect and rebuild damaged sectors of a volume from its own recovery record.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::Path;

use memmap2::{Mmap, MmapMut};
use serde::Serialize;
use tracing::{info, warn};

use crate::checksum::sector_crc;
use crate::error::{Error, Result};
use crate::recovery::{read_sector, ParitySector, RecoveryRecord, RR_SECTOR_SIZE};

#[derive(Debug, Clone, Serialize)]
pub struct SectorReport {
    pub protected_sectors: u64,
    pub parity_sectors: u32,
    /// The CRC list and parity still match the record's own CRC.
    pub record_intact: bool,
    pub damaged: Vec<u64>,
    /// Damaged sectors that cannot be rebuilt: a second damaged sector in the
    /// same residue class, or a damaged recovery record.
    pub unrepairable: Vec<u64>,
}

impl SectorReport {
    pub fn is_clean(&self) -> bool {
        self.damaged.is_empty() && self.record_intact
    }

    pub fn is_repairable(&self) -> bool {
        self.unrepairable.is_empty()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    pub repaired: Vec<u64>,
    pub unrepairable: Vec<u64>,
}

/// Inspect `volume` bytes: find the recovery record and the damaged sectors.
pub fn scan(volume: &[u8]) -> Result<(RecoveryRecord, SectorReport)> {
    let rr = RecoveryRecord::locate(volume)?;
    let record_intact = rr.is_intact(volume);
    let n = rr.sector_count as u64;

    let damaged: Vec<u64> = (0..rr.protected_sectors)
        .filter(|&i| sector_crc(&read_sector(volume, rr.offset, i)) != rr.sector_crc(volume, i))
        .collect();

    let mut per_class: HashMap<u64, usize> = HashMap::new();
    for &i in &damaged {
        *per_class.entry(i % n).or_default() += 1;
    }
    let unrepairable = damaged
        .iter()
        .copied()
        .filter(|&i| !record_intact || per_class[&(i % n)] > 1)
        .collect();

    let report = SectorReport {
        protected_sectors: rr.protected_sectors,
        parity_sectors: rr.sector_count,
        record_intact,
        damaged,
        unrepairable,
    };
    Ok((rr, report))
}

/// Rebuild protected sector `i` from its parity sector and the other
/// members of its residue class.
pub fn rebuild_sector(volume: &[u8], rr: &RecoveryRecord, i: u64) -> [u8; RR_SECTOR_SIZE] {
    let n = rr.sector_count as u64;
    let k = (i % n) as u32;
    let mut acc = ParitySector::zeroed();
    let mut parity = [0u8; RR_SECTOR_SIZE];
    parity.copy_from_slice(rr.parity(volume, k));
    acc.xor_in(&parity);
    let mut j = k as u64;
    while j < rr.protected_sectors {
        if j != i {
            acc.xor_in(&read_sector(volume, rr.offset, j));
        }
        j += n;
    }
    *acc.as_bytes()
}

/// Empty files cannot be mapped and hold no recovery record.
fn ensure_not_empty(f: &File, path: &Path) -> Result<()> {
    if f.metadata().map_err(Error::SourceRead)?.len() == 0 {
        return Err(Error::Malformed(format!("{} is empty", path.display())));
    }
    Ok(())
}

/// Report damaged sectors of the volume at `path` without modifying it.
pub fn check_volume(path: &Path) -> Result<SectorReport> {
    let f = File::open(path).map_err(Error::SourceRead)?;
    ensure_not_empty(&f, path)?;
    // SAFETY: read-only mapping, dropped before returning.
    let map = unsafe { Mmap::map(&f).map_err(Error::SourceRead)? };
    let (_, report) = scan(&map)?;
    for &i in &report.damaged {
        warn!(volume = %path.display(), sector = i, "damaged sector");
    }
    Ok(report)
}

/// Rebuild every repairable damaged sector of the volume at `path` in place.
pub fn repair_volume(path: &Path) -> Result<RepairReport> {
    let f = OpenOptions::new().read(true).write(true).open(path).map_err(Error::SourceRead)?;
    ensure_not_empty(&f, path)?;
    // SAFETY: the file is opened read-write and the mapping does not outlive it.
    let mut map = unsafe { MmapMut::map_mut(&f).map_err(Error::SourceRead)? };
    let (rr, report) = scan(&map)?;

    let mut repaired = Vec::new();
    let mut unrepairable = report.unrepairable.clone();
    for &i in report.damaged.iter().filter(|i| !report.unrepairable.contains(i)) {
        let sector = rebuild_sector(&map, &rr, i);
        if sector_crc(&sector) != rr.sector_crc(&map, i) {
            warn!(volume = %path.display(), sector = i, "rebuilt sector fails its CRC");
            unrepairable.push(i);
            continue;
        }
        let start = i * RR_SECTOR_SIZE as u64;
        let end = (start + RR_SECTOR_SIZE as u64).min(rr.offset);
        map[start as usize..end as usize].copy_from_slice(&sector[..(end - start) as usize]);
        repaired.push(i);
    }
    map.flush().map_err(Error::SinkWrite)?;
    unrepairable.sort_unstable();
    info!(
        volume = %path.display(),
        repaired = repaired.len(),
        unrepairable = unrepairable.len(),
        "repair finished"
    );
    Ok(RepairReport { repaired, unrepairable })
}
