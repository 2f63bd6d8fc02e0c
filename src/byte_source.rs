// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Bounds-checked, read-only view over a whole file image.
//!
//! Every other layer of the decoder reads through [`ByteSource`] instead of
//! indexing the buffer directly. It is the single place that enforces
//! bounds-safety against untrusted input: a short read never panics, it
//! just returns [`ShortRead`].

use binrw::{io::Cursor, BinRead};
use std::fmt;

/// Returned when a read would run past the end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShortRead;

impl fmt::Display for ShortRead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "read would run past the end of the buffer")
    }
}

impl std::error::Error for ShortRead {}

/// A bounded, read-only view over an in-memory file image.
///
/// `ByteSource` owns the loaded bytes and never exposes a way to index them
/// without a bounds check, which makes it safe to hand arbitrary,
/// adversarial offsets to it.
#[derive(Debug, Clone)]
pub struct ByteSource<'a> {
    data: &'a [u8],
}

impl<'a> ByteSource<'a> {
    /// Wraps `data` for bounds-checked access.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Total size of the underlying buffer, in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrows `n` contiguous bytes starting at `off`.
    pub fn slice(&self, off: usize, n: usize) -> Result<&'a [u8], ShortRead> {
        let end = off.checked_add(n).ok_or(ShortRead)?;
        self.data.get(off..end).ok_or(ShortRead)
    }

    /// Reads a single byte at `off`.
    pub fn u8_at(&self, off: usize) -> Result<u8, ShortRead> {
        self.data.get(off).copied().ok_or(ShortRead)
    }

    /// Reads a little-endian `u16` at `off`.
    pub fn u16le_at(&self, off: usize) -> Result<u16, ShortRead> {
        let bytes = self.slice(off, 2)?;
        let mut cursor = Cursor::new(bytes);
        u16::read_le(&mut cursor).map_err(|_| ShortRead)
    }

    /// Reads a little-endian `u32` at `off`.
    pub fn u32le_at(&self, off: usize) -> Result<u32, ShortRead> {
        let bytes = self.slice(off, 4)?;
        let mut cursor = Cursor::new(bytes);
        u32::read_le(&mut cursor).map_err(|_| ShortRead)
    }

    /// A `binrw`-compatible cursor over the whole buffer, for callers that
    /// parse structured records via `binrw`'s derive machinery rather than
    /// through the raw accessors above.
    #[must_use]
    pub fn cursor(&self) -> Cursor<&'a [u8]> {
        Cursor::new(self.data)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_within_bounds() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05];
        let src = ByteSource::new(&data);
        assert_eq!(src.u8_at(0), Ok(0x01));
        assert_eq!(src.u16le_at(1), Ok(0x0302));
        assert_eq!(src.u32le_at(1), Ok(0x0504_0302));
        assert_eq!(src.slice(1, 3), Ok(&data[1..4]));
    }

    #[test]
    fn rejects_out_of_bounds_reads() {
        let data = [0x01, 0x02];
        let src = ByteSource::new(&data);
        assert_eq!(src.u8_at(2), Err(ShortRead));
        assert_eq!(src.u16le_at(1), Err(ShortRead));
        assert_eq!(src.u32le_at(0), Err(ShortRead));
        assert_eq!(src.slice(0, 10), Err(ShortRead));
    }

    #[test]
    fn rejects_offset_overflow() {
        let data = [0x01, 0x02];
        let src = ByteSource::new(&data);
        assert_eq!(src.slice(usize::MAX, 1), Err(ShortRead));
    }
}
