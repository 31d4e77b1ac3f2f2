//! File name field: the single-byte name, a NUL, then a compressed
//! "Unicode" form that readers prefer when `FILE_UNICODE` is set.
//!
//! The compressed form is a sequence of groups: one control byte holding up
//! to four 2-bit opcodes (high bits first), followed by each opcode's data
//! bytes. Only two opcodes are produced here: copy runs of the plain name
//! (opcode 3) and a literal byte for a final lone character (opcode 0).

use crate::error::{Error, Result};

const OP_8BIT: u8 = 0;
const OP_HIGH_BYTE: u8 = 1;
const OP_16BIT: u8 = 2;
const OP_COPY: u8 = 3;

const OP_BITS: u32 = 2;
const COPY_LEN_MIN: usize = 2;
const COPY_LEN_MAX: usize = COPY_LEN_MIN + 0x7f;
const COPY_CORRECTION: u8 = 0x80;

/// High byte observed in the wild for names that never use it.
const DEFAULT_HIGH_BYTE: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameField {
    bytes: Vec<u8>,
}

impl NameField {
    /// Encode `name`. Every character must fit in one byte (U+0000..=U+00FF).
    pub fn encode(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Err(Error::InvalidArgument("stored file name is empty".into()));
        }
        let mut raw = Vec::with_capacity(name.len());
        for ch in name.chars() {
            let code = u32::from(ch);
            if code > 0xff {
                return Err(Error::UnsupportedName { name: name.to_owned(), ch });
            }
            if code == 0 {
                return Err(Error::InvalidArgument(format!("NUL in stored file name {name:?}")));
            }
            raw.push(code as u8);
        }

        let mut bytes = raw.clone();
        bytes.push(0);
        bytes.push(DEFAULT_HIGH_BYTE);

        let mut pos = 0usize;
        let mut left = raw.len();
        while left > 0 {
            let mut control = 0u8;
            let mut slot = 8u32;
            let mut data = Vec::with_capacity(4);
            while slot >= OP_BITS && left > 0 {
                slot -= OP_BITS;
                let op = if left == 1 {
                    data.push(raw[pos]);
                    pos += 1;
                    left = 0;
                    OP_8BIT
                } else {
                    let run = left.min(COPY_LEN_MAX);
                    data.push((run - COPY_LEN_MIN) as u8);
                    pos += run;
                    left -= run;
                    OP_COPY
                };
                control |= op << slot;
            }
            bytes.push(control);
            bytes.extend_from_slice(&data);
        }
        Ok(Self { bytes })
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
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn byte(&mut self) -> Result<u8> {
        let b = *self.buf.get(self.pos).ok_or_else(truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn at_end(&self) -> bool {
        self.pos >= self.buf.len()
    }
}

fn truncated() -> Error {
    Error::Malformed("name field truncated".into())
}

/// Decode a name field (plain name, NUL, compressed form) the way readers do.
///
/// Fields without a NUL are plain single-byte names.
pub fn decode_name(field: &[u8]) -> Result<String> {
    let Some(nul) = field.iter().position(|&b| b == 0) else {
        return Ok(field.iter().map(|&b| char::from(b)).collect());
    };
    let plain = &field[..nul];
    let mut rd = Reader { buf: &field[nul + 1..], pos: 0 };
    let high = rd.byte()?;

    let mut out: Vec<u16> = Vec::with_capacity(plain.len());
    let mut control = 0u8;
    let mut slots = 0u32;
    while !rd.at_end() {
        if slots == 0 {
            control = rd.byte()?;
            slots = 8;
        }
        slots -= OP_BITS;
        match (control >> slots) & 3 {
            OP_8BIT => out.push(rd.byte()? as u16),
            OP_HIGH_BYTE => out.push(((high as u16) << 8) | rd.byte()? as u16),
            OP_16BIT => {
                let lo = rd.byte()? as u16;
                let hi = rd.byte()? as u16;
                out.push((hi << 8) | lo);
            }
            _ => {
                let n = rd.byte()?;
                let run = (n & 0x7f) as usize + COPY_LEN_MIN;
                let correction = if n & COPY_CORRECTION != 0 { Some(rd.byte()?) } else { None };
                for _ in 0..run {
                    let b = *plain.get(out.len()).ok_or_else(truncated)?;
                    out.push(match correction {
                        Some(c) => ((high as u16) << 8) | b.wrapping_add(c) as u16,
                        None => b as u16,
                    });
                }
            }
        }
    }
    String::from_utf16(&out).map_err(|_| Error::Malformed("name is not valid UTF-16".into()))
}
