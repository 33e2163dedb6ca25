//! Little-endian integer framing shared by the binary trace readers.
//!
//! The on-disk format is explicitly not endian-portable (it mirrors what the
//! recording side writes on the host); these helpers pin little-endian so
//! the common platforms agree.

use std::io::{Read, Write};

use crate::error::{Error, Result};

/// Reads one little-endian `i32`, naming the record on failure.
pub fn read_i32(r: &mut impl Read, what: &str) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_exact_or_eof(r, &mut buf, what)?;
    Ok(i32::from_le_bytes(buf))
}

/// Writes one little-endian `i32`.
pub fn write_i32(w: &mut impl Write, value: i32) -> Result<()> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

/// Like `read_exact`, but maps a short read to a truncated-trace error
/// naming the record being read.
pub fn read_exact_or_eof(r: &mut impl Read, buf: &mut [u8], what: &str) -> Result<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::truncated(what)
        } else {
            Error::from(e)
        }
    })
}

/// Returns true if the reader is at end of input, consuming nothing
/// otherwise (requires a peekable byte source; used with buffered readers).
pub fn at_eof(r: &mut impl std::io::BufRead) -> Result<bool> {
    Ok(r.fill_buf()?.is_empty())
}
