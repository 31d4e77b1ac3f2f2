//! Modification time encoding: the 32-bit DOS date/time stored in every file
//! header, plus the optional extended-time field for what DOS time drops
//! (the odd second and the sub-second fraction, in 100 ns ticks).

use chrono::{DateTime, Datelike, Local, NaiveDateTime, Timelike};
use std::time::SystemTime;

use crate::error::{Error, Result};

/// 100 ns ticks per second.
pub const TICKS_PER_SEC: u32 = 10_000_000;

const FLAG_VALID: u8 = 0b1000;
const FLAG_ODD_SECOND: u8 = 0b0100;
const FRAC_BYTES: u8 = 3;
/// Slot of the modification time within the 16-bit flags word
/// (slots are mtime, ctime, atime, arctime from the top nibble down).
const MTIME_SHIFT: u32 = 12;

/// A local wall-clock modification time with 100 ns resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub time: NaiveDateTime,
}

impl Timestamp {
    pub fn new(time: NaiveDateTime) -> Result<Self> {
        if !(1980..=2107).contains(&time.year()) {
            return Err(Error::InvalidArgument(format!(
                "timestamp year {} outside the DOS time range 1980..=2107",
                time.year()
            )));
        }
        Ok(Self { time })
    }

    /// Local time of a filesystem modification instant.
    pub fn from_system_time(t: SystemTime) -> Result<Self> {
        Self::new(DateTime::<Local>::from(t).naive_local())
    }

    /// Sub-second fraction in 100 ns ticks (leap-second nanos are clamped).
    pub fn ticks(&self) -> u32 {
        (self.time.nanosecond() / 100).min(TICKS_PER_SEC - 1)
    }

    /// Packed DOS date/time. Seconds are stored halved, so odd seconds lose a bit.
    pub fn dos_time(&self) -> u32 {
        let t = &self.time;
        (t.second() >> 1)
            | t.minute() << 5
            | t.hour() << 11
            | t.day() << 16
            | t.month() << 21
            | (t.year() as u32 - 1980) << 25
    }

    /// Extended-time field, or `None` when DOS time alone is exact.
    pub fn extended_time(&self) -> Option<ExtTime> {
        let odd = self.time.second() & 1 == 1;
        let ticks = self.ticks();
        if !odd && ticks == 0 {
            return None;
        }
        Some(ExtTime::new(odd, ticks))
    }
}

/// The encoded extended-time field for the modification time only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtTime {
    bytes: Vec<u8>,
}

impl ExtTime {
    fn new(odd_second: bool, ticks: u32) -> Self {
        let mut frac = ticks;
        let mut precision = FRAC_BYTES;
        while precision > 0 && frac & 0xff == 0 {
            frac >>= 8;
            precision -= 1;
        }
        let mut flags = FLAG_VALID | precision;
        if odd_second {
            flags |= FLAG_ODD_SECOND;
        }
        let word = (flags as u16) << MTIME_SHIFT;
        let mut bytes = word.to_le_bytes().to_vec();
        for _ in 0..precision {
            bytes.push((frac & 0xff) as u8);
            frac >>= 8;
        }
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of fraction bytes kept.
    pub fn precision(&self) -> u8 {
        self.flags() & 3
    }

    fn flags(&self) -> u8 {
        (u16::from_le_bytes([self.bytes[0], self.bytes[1]]) >> MTIME_SHIFT) as u8
    }

    /// Read the field back: `(odd_second, ticks)`.
    pub fn decode(field: &[u8]) -> Result<(bool, u32)> {
        if field.len() < 2 {
            return Err(Error::Malformed("extended time truncated".into()));
        }
        let flags = (u16::from_le_bytes([field[0], field[1]]) >> MTIME_SHIFT) as u8;
        if flags & FLAG_VALID == 0 {
            return Ok((false, 0));
        }
        let count = (flags & 3) as usize;
        let data = field
            .get(2..2 + count)
            .ok_or_else(|| Error::Malformed("extended time fraction truncated".into()))?;
        let mut rem = 0u32;
        for &b in data {
            rem = (b as u32) << 16 | rem >> 8;
        }
        Ok((flags & FLAG_ODD_SECOND != 0, rem))
    }
}
