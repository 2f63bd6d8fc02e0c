// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! The "device string" encoding: a single tag byte multiplexes three
//! incompatible variable-length text encodings.
//!
//! See spec §4.2. Binary framing is resolved by `binrw`'s derive machinery
//! (tag dispatch via `#[br(magic = ...)]`, length-prefixed bodies via
//! sibling-field `count`), the same way the teacher's `DeviceSQLString`
//! decodes its own three-tag layout. A decode error anywhere in this module
//! degrades to [`DeviceString::Empty`] rather than propagating, since a
//! corrupt trailing string should never taint the rest of an otherwise-valid
//! row — the `parse_with` helpers below never return `Err`.

use binrw::io::{Read, Seek, SeekFrom};
use binrw::{binread, BinRead, BinResult, Endian};

use crate::byte_source::ByteSource;

const LONG_MIN_LEN: u16 = 4;
const SHORT_MIN_HEADER: u8 = 3;

/// Track string-offset slots above this value are treated as implausible
/// and skipped rather than followed (spec §4.4).
pub(crate) const MAX_PLAUSIBLE_STRING_OFFSET: u16 = 10_000;

/// A decoded device string, tagged by which of the three encodings produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceString {
    /// Short ASCII form (`length = tag >> 1`).
    Short(String),
    /// Long ASCII form (`tag == 0x40`).
    Long(String),
    /// Long UTF-16LE form (`tag == 0x90`).
    Wide(String),
    /// No string could be decoded at this offset (unknown tag, or any bounds
    /// or validation failure).
    Empty,
}

impl DeviceString {
    /// Extracts the decoded text, discarding which encoding produced it.
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::Short(s) | Self::Long(s) | Self::Wide(s) => s,
            Self::Empty => String::new(),
        }
    }

    /// `true` if decoding failed (as opposed to legitimately decoding to an
    /// empty short string).
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Raw on-disk shape of the three device-string encodings. A tag byte
/// multiplexes the variant; `Short`'s header doubles as both tag and length,
/// `Long`/`Wide` carry an explicit `u16` length after their magic byte.
#[binread]
#[derive(Debug, Clone)]
#[br(little)]
enum DeviceStringBody {
    #[br(magic = 0x40u8)]
    Long {
        #[br(temp, assert(length >= LONG_MIN_LEN))]
        length: u16,
        #[br(temp)]
        _reserved: u8,
        #[br(count = length - 4)]
        content: Vec<u8>,
    },
    #[br(magic = 0x90u8)]
    Wide {
        #[br(temp, assert(length >= LONG_MIN_LEN))]
        length: u16,
        #[br(temp)]
        _reserved: u8,
        #[br(count = (length - 4) / 2)]
        content: Vec<u16>,
    },
    Short {
        #[br(temp, assert(header & 1 == 1 && header >= SHORT_MIN_HEADER))]
        header: u8,
        #[br(count = (header >> 1) - 1)]
        content: Vec<u8>,
    },
}

impl From<DeviceStringBody> for DeviceString {
    fn from(body: DeviceStringBody) -> Self {
        match body {
            DeviceStringBody::Long { content } => {
                String::from_utf8(content).map_or(Self::Empty, Self::Long)
            }
            DeviceStringBody::Wide { content } => Self::Wide(String::from_utf16_lossy(&content)),
            DeviceStringBody::Short { content } => {
                if content.is_ascii() {
                    String::from_utf8(content).map_or(Self::Empty, Self::Short)
                } else {
                    Self::Empty
                }
            }
        }
    }
}

fn read_device_string<R: Read + Seek>(reader: &mut R, endian: Endian) -> DeviceString {
    DeviceStringBody::read_options(reader, endian, ())
        .map(DeviceString::from)
        .unwrap_or(DeviceString::Empty)
}

/// Decodes a device string at byte offset `offset` within `src`.
///
/// Never fails outwardly: any bounds violation, invalid tag, or invalid
/// length/encoding yields [`DeviceString::Empty`].
#[must_use]
pub fn decode(src: &ByteSource<'_>, offset: usize) -> DeviceString {
    let mut cursor = src.cursor();
    match cursor.seek(SeekFrom::Start(offset as u64)) {
        Ok(_) => read_device_string(&mut cursor, Endian::Little),
        Err(_) => DeviceString::Empty,
    }
}

/// Reads a device string at the reader's current position. Used for row
/// layouts where the string is stored inline rather than behind an offset
/// pointer (genre/label, key, playlist-tree rows).
pub(crate) fn parse_device_string_lenient<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    _args: (),
) -> BinResult<DeviceString> {
    Ok(read_device_string(reader, endian))
}

fn read_device_string_at<R: Read + Seek>(reader: &mut R, endian: Endian, pos: u64) -> DeviceString {
    let Ok(restore) = reader.stream_position() else {
        return DeviceString::Empty;
    };
    let result = reader
        .seek(SeekFrom::Start(pos))
        .map(|_| read_device_string(reader, endian))
        .unwrap_or(DeviceString::Empty);
    let _ = reader.seek(SeekFrom::Start(restore));
    result
}

/// Reads a `u8` offset relative to `base_offset`, then decodes the device
/// string found there, restoring the stream position afterward — the near
/// (one-byte-offset) form of the artist/album name pointer, mirroring the
/// teacher's `FilePtr8`, adapted to degrade instead of propagate a failure.
pub(crate) fn parse_ptr8_device_string<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    args: (u64,),
) -> BinResult<DeviceString> {
    let (base_offset,) = args;
    let offset = u8::read_options(reader, endian, ())?;
    Ok(read_device_string_at(reader, endian, base_offset + u64::from(offset)))
}

/// As [`parse_ptr8_device_string`], but the relative offset is a `u16` — the
/// long form of the artist/album name pointer.
pub(crate) fn parse_ptr16_device_string<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    args: (u64,),
) -> BinResult<DeviceString> {
    let (base_offset,) = args;
    let offset = u16::read_options(reader, endian, ())?;
    Ok(read_device_string_at(reader, endian, base_offset + u64::from(offset)))
}

/// Reads one slot of a track's string-offset table: a `u16` offset relative
/// to `base_offset`, where `0` means "no string" and anything above
/// [`MAX_PLAUSIBLE_STRING_OFFSET`] is treated the same way (spec §4.4).
pub(crate) fn parse_track_string_slot<R: Read + Seek>(
    reader: &mut R,
    endian: Endian,
    args: (u64,),
) -> BinResult<DeviceString> {
    let (base_offset,) = args;
    let offset = u16::read_options(reader, endian, ())?;
    if offset == 0 || offset > MAX_PLAUSIBLE_STRING_OFFSET {
        return Ok(DeviceString::Empty);
    }
    Ok(read_device_string_at(reader, endian, base_offset + u64::from(offset)))
}

#[cfg(test)]
mod test {
    use super::*;

    fn src(bytes: &[u8]) -> ByteSource<'_> {
        ByteSource::new(bytes)
    }

    #[test]
    fn short_ascii() {
        // tag = 0x09 -> length = 4, payload = 3 bytes "foo"
        let data = [0x09, b'f', b'o', b'o'];
        assert_eq!(decode(&src(&data), 0).into_text(), "foo".to_string());
    }

    #[test]
    fn short_ascii_length_one_is_empty() {
        // length == 1 means zero payload bytes.
        let data = [0x03];
        assert_eq!(decode(&src(&data), 0).into_text(), "");
    }

    #[test]
    fn long_ascii() {
        let mut data = vec![0x40, 0x08, 0x00, 0x00];
        data.extend_from_slice(b"hi");
        assert_eq!(decode(&src(&data), 0).into_text(), "hi".to_string());
    }

    #[test]
    fn long_ascii_length_exactly_four_is_empty() {
        let data = [0x40, 0x04, 0x00, 0x00];
        assert_eq!(decode(&src(&data), 0).into_text(), "");
    }

    #[test]
    fn utf16le() {
        // "AB" -> 0x0041, 0x0042
        let data = [0x90, 0x08, 0x00, 0x00, 0x41, 0x00, 0x42, 0x00];
        assert_eq!(decode(&src(&data), 0).into_text(), "AB".to_string());
    }

    #[test]
    fn utf16le_odd_byte_count_truncates() {
        let data = [0x90, 0x07, 0x00, 0x00, 0x41, 0x00, 0x42];
        assert_eq!(decode(&src(&data), 0).into_text(), "A".to_string());
    }

    #[test]
    fn unknown_tag_is_empty() {
        let data = [0x02, 0xff, 0xff];
        let d = decode(&src(&data), 0);
        assert!(d.is_error());
        assert_eq!(d.into_text(), "");
    }

    #[test]
    fn out_of_bounds_is_empty_not_panic() {
        let data = [0x40, 0xff, 0xff, 0x00];
        let d = decode(&src(&data), 0);
        assert!(d.is_error());
    }
}
