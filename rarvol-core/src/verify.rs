use std::fs::File;
use std::path::{Component, Path, PathBuf};

use memmap2::Mmap;
use serde::Serialize;
use tracing::warn;

use crate::checksum::crc32_continue;
use crate::error::{Error, Result};
use crate::manifest::Manifest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum VolumeStatus {
    Ok,
    Mismatch { actual: u32 },
    Missing,
}

#[derive(Debug, Clone, Serialize)]
pub struct VolumeCheck {
    pub name: String,
    pub expected: u32,
    pub status: VolumeStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub volumes: Vec<VolumeCheck>,
}

impl VerifyReport {
    pub fn ok(&self) -> usize {
        self.count(|s| *s == VolumeStatus::Ok)
    }

    pub fn bad(&self) -> usize {
        self.count(|s| matches!(s, VolumeStatus::Mismatch { .. }))
    }

    pub fn missing(&self) -> usize {
        self.count(|s| *s == VolumeStatus::Missing)
    }

    pub fn all_ok(&self) -> bool {
        self.ok() == self.volumes.len()
    }

    fn count(&self, pred: impl Fn(&VolumeStatus) -> bool) -> usize {
        self.volumes.iter().filter(|v| pred(&v.status)).count()
    }
}

/// CRC32 of a whole file.
pub fn file_crc32(path: &Path) -> std::io::Result<u32> {
    let f = File::open(path)?;
    if f.metadata()?.len() == 0 {
        return Ok(0);
    }
    // SAFETY: the mapping is read-only and dropped before returning.
    let map = unsafe { Mmap::map(&f)? };
    Ok(crc32_continue(0, &map))
}

/// `name` joined to `dir`. SFV entries must be bare file names in the SFV's
/// own directory.
fn volume_path(dir: &Path, name: &str) -> Result<PathBuf> {
    let mut parts = Path::new(name).components();
    match (parts.next(), parts.next()) {
        (Some(Component::Normal(_)), None) if !name.contains(['/', '\\']) => Ok(dir.join(name)),
        _ => Err(Error::Malformed(format!("SFV entry {name:?} is not a plain file name"))),
    }
}

/// Recompute the CRC32 of every volume listed in an SFV file. Volume names
/// resolve relative to the SFV's directory.
pub fn verify(sfv_path: &Path) -> Result<VerifyReport> {
    let text = std::fs::read(sfv_path).map_err(Error::SourceRead)?;
    let manifest = Manifest::parse(&text)?;
    let dir = sfv_path.parent().unwrap_or_else(|| Path::new("."));

    let mut volumes = Vec::with_capacity(manifest.len());
    for (name, expected) in manifest.iter() {
        let path = volume_path(dir, name)?;
        let status = match file_crc32(&path) {
            Ok(actual) if actual == expected => VolumeStatus::Ok,
            Ok(actual) => {
                warn!(volume = name, expected = %format!("{expected:08x}"), actual = %format!("{actual:08x}"), "CRC mismatch");
                VolumeStatus::Mismatch { actual }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(volume = name, "missing");
                VolumeStatus::Missing
            }
            Err(e) => return Err(Error::SourceRead(e)),
        };
        volumes.push(VolumeCheck { name: name.to_owned(), expected, status });
    }
    Ok(VerifyReport { volumes })
}
