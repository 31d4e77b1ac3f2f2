//! SFV checksum manifest: one `"<volume name> <crc32>"` line per volume.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::{Error, Result};

/// `name` as one byte per character, as SFV lines and volume files need it.
pub fn latin1_name(name: &str) -> Result<Vec<u8>> {
    name.chars()
        .map(|ch| match u32::from(ch) {
            code @ 0..=0xff => Ok(code as u8),
            _ => Err(Error::UnsupportedName { name: name.to_owned(), ch }),
        })
        .collect()
}

/// Volume name → CRC32 of the finished volume, kept sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, u32>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, crc: u32) {
        self.entries.insert(name.into(), crc);
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        self.entries.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.entries.iter().map(|(n, c)| (n.as_str(), *c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The manifest text, one byte per character, CRLF line endings.
    pub fn render(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for (name, crc) in &self.entries {
            out.extend_from_slice(&latin1_name(name)?);
            out.extend_from_slice(format!(" {crc:08x}\r\n").as_bytes());
        }
        Ok(out)
    }

    pub fn write_file(&self, path: &Path) -> Result<()> {
        let text = self.render()?;
        let mut f = File::create(path).map_err(Error::SinkWrite)?;
        f.write_all(&text).map_err(Error::SinkWrite)?;
        Ok(())
    }

    /// Parse SFV text. Blank lines and `;` comments are skipped; the CRC is
    /// the last whitespace-separated field so names may contain spaces.
    pub fn parse(text: &[u8]) -> Result<Self> {
        let text: String = text.iter().map(|&b| char::from(b)).collect();
        let mut manifest = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim_end_matches('\r').trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let bad = || Error::Malformed(format!("SFV line {}: {line:?}", lineno + 1));
            let (name, crc) = line.rsplit_once(char::is_whitespace).ok_or_else(bad)?;
            let crc = u32::from_str_radix(crc, 16).map_err(|_| bad())?;
            manifest.insert(name.trim_end(), crc);
        }
        Ok(manifest)
    }
}
