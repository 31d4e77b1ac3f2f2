use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::header::FileEntry;
use crate::manifest::Manifest;
use crate::planner::{VolumePlan, DEFAULT_VOLUME_SIZE};
use crate::timestamp::Timestamp;
use crate::volume::{SplitCrc, Volume, VolumeNaming};

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub data_file: PathBuf,
    pub volume_size: u64,
    pub naming: VolumeNaming,
    /// Name stored inside the volumes; defaults to the data file's name.
    pub stored_name: Option<String>,
    /// Output base name; defaults to the data file's stem.
    pub base: Option<String>,
    pub output_dir: PathBuf,
    /// Overrides the data file's modification time.
    pub mtime: Option<Timestamp>,
    pub dry_run: bool,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            data_file: PathBuf::new(),
            volume_size: DEFAULT_VOLUME_SIZE,
            naming: VolumeNaming::Legacy,
            stored_name: None,
            base: None,
            output_dir: PathBuf::from("."),
            mtime: None,
            dry_run: false,
        }
    }
}

impl EncoderConfig {
    pub fn new(data_file: impl Into<PathBuf>) -> Self {
        Self { data_file: data_file.into(), ..Self::default() }
    }
}

#[derive(Debug, Clone)]
pub struct EncodeReport {
    pub plan: VolumePlan,
    /// `None` for a dry run.
    pub manifest: Option<Manifest>,
}

/// The data file being split, as seen when planning.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: Timestamp,
}

impl SourceFile {
    /// Stat `path`; `mtime` overrides the filesystem modification time.
    pub fn stat(path: &Path, mtime: Option<Timestamp>) -> Result<Self> {
        let meta = fs::metadata(path).map_err(Error::SourceRead)?;
        if !meta.is_file() {
            return Err(Error::InvalidArgument(format!("{} is not a regular file", path.display())));
        }
        let mtime = match mtime {
            Some(t) => t,
            None => Timestamp::from_system_time(meta.modified().map_err(Error::SourceRead)?)?,
        };
        Ok(Self { path: path.to_path_buf(), size: meta.len(), mtime })
    }
}

pub struct Encoder;

impl Encoder {
    /// Stat the data file and lay out the volume set without writing anything.
    pub fn plan(cfg: &EncoderConfig) -> Result<(FileEntry, VolumePlan)> {
        let source = SourceFile::stat(&cfg.data_file, cfg.mtime)?;
        let stored_name = match &cfg.stored_name {
            Some(n) => n.clone(),
            None => file_part(&cfg.data_file, Path::file_name)?,
        };
        let base = match &cfg.base {
            Some(b) => b.clone(),
            None => file_part(&cfg.data_file, Path::file_stem)?,
        };

        let entry = FileEntry::new(&stored_name, &source.mtime, source.size)?;
        let plan = VolumePlan::new(&entry, cfg.volume_size, &base, cfg.naming)?;
        info!(
            file = %source.path.display(),
            size = plan.file_size,
            volumes = plan.volumes.len(),
            per_volume = plan.max_payload,
            recovery_sectors = plan.max_recovery_sectors,
            "planned volume set"
        );
        Ok((entry, plan))
    }

    /// Write every volume and the SFV manifest (or only plan, for a dry run).
    pub fn encode(cfg: &EncoderConfig) -> Result<EncodeReport> {
        let (entry, plan) = Self::plan(cfg)?;
        if cfg.dry_run {
            for v in &plan.volumes {
                debug!(volume = %v.name, size = v.total_size, "dry run");
            }
            return Ok(EncodeReport { plan, manifest: None });
        }

        fs::create_dir_all(&cfg.output_dir).map_err(Error::SinkWrite)?;
        let mut source = File::open(&cfg.data_file).map_err(Error::SourceRead)?;
        let mut split = SplitCrc::default();
        let mut manifest = Manifest::new();

        for spec in &plan.volumes {
            let path = cfg.output_dir.join(&spec.name);
            let out = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .map_err(Error::SinkWrite)?;

            let mut volume = Volume::begin(spec, out)?;
            volume.write_file_part(&entry, &mut source, &mut split)?;
            volume.write_recovery()?;
            let (crc, _) = volume.finish()?;

            info!(
                volume = %spec.name,
                size = spec.total_size,
                crc = %format!("{crc:08X}"),
                "volume written"
            );
            manifest.insert(spec.name.clone(), crc);
        }

        let sfv = cfg.output_dir.join(&plan.manifest_name);
        manifest.write_file(&sfv)?;
        info!(manifest = %sfv.display(), size = plan.manifest_size, "manifest written");
        Ok(EncodeReport { plan, manifest: Some(manifest) })
    }
}

fn file_part(path: &Path, part: fn(&Path) -> Option<&std::ffi::OsStr>) -> Result<String> {
    part(path)
        .and_then(|s| s.to_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            Error::InvalidArgument(format!("cannot derive a name from {}", path.display()))
        })
}
