// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Per-table-kind row layouts and decoders (spec §4.4).
//!
//! Each decoder receives the row's base offset and either produces a typed
//! record or drops the row. The binary layouts are `#[binread]` structs
//! parsed over a `Cursor` positioned at the row's base, the same way the
//! teacher's `Row::Track` resolves its fields; the polymorphic layouts
//! (artist/album rows, whose name offset width depends on a subtype bit) are
//! resolved up front into a single variant rather than modeled as dynamic
//! objects, per spec §9.

use binrw::io::{Read, Seek, SeekFrom};
use binrw::{binread, BinRead, BinResult, Endian};

use crate::builder::Diagnostics;
use crate::byte_source::ByteSource;
use crate::string::{
    parse_device_string_lenient, parse_ptr16_device_string, parse_ptr8_device_string,
    parse_track_string_slot, DeviceString,
};

const SUBTYPE_LONG_NAME: u16 = 0x04;

const MAX_TEMPO_CENTIBPM: u32 = 50_000;
const MAX_DURATION_S: u16 = 36_000;
const MAX_BITRATE_KBPS: u32 = 10_000;

/// A decoded `id -> name` lookup row (artist, album, genre, key, or label).
#[derive(Debug, Clone)]
pub struct LookupRow {
    /// Row id. Always non-zero for a kept row.
    pub id: u32,
    /// Resolved, non-empty name.
    pub name: String,
}

/// A decoded playlist/folder tree node.
#[derive(Debug, Clone)]
pub struct PlaylistNodeRow {
    /// Row id.
    pub id: u32,
    /// Parent node id, or `0` for a root.
    pub parent_id: u32,
    /// Sibling ordering key among nodes sharing a parent.
    pub sort_order: u32,
    /// `true` if this node is a folder rather than a playlist.
    pub is_folder: bool,
    /// Display name.
    pub name: String,
}

/// A decoded track-to-playlist link.
#[derive(Debug, Clone, Copy)]
pub struct PlaylistEntryRow {
    /// Playlist this entry belongs to.
    pub playlist_id: u32,
    /// Track referenced at this position.
    pub track_id: u32,
    /// Ordering position within the playlist.
    pub position: u32,
}

/// A decoded track row, with foreign keys still unresolved.
#[derive(Debug, Clone)]
pub struct TrackRow {
    /// Row id.
    pub id: u32,
    /// Track title, or empty if absent.
    pub title: String,
    /// Artist lookup id, or `0` if unset.
    pub artist_id: u32,
    /// Album lookup id, or `0` if unset.
    pub album_id: u32,
    /// Genre lookup id, or `0` if unset.
    pub genre_id: u32,
    /// Key lookup id, or `0` if unset.
    pub key_id: u32,
    /// Playback duration in seconds.
    pub duration_s: u16,
    /// Tempo in hundredths of a BPM.
    pub tempo_centibpm: u32,
    /// User rating.
    pub rating: u8,
    /// Bitrate in kbps.
    pub bitrate_kbps: u32,
    /// Path to the audio file, or empty if absent.
    pub file_path: String,
    /// Opaque, unparsed date-added text.
    pub date_added: String,
}

/// Captures the reader's current stream position without consuming any
/// bytes, so later `FilePtr`-style fields can resolve their offsets relative
/// to the row's start (mirrors the teacher's `current_offset` in `pdb/mod.rs`).
fn current_offset<R: Read + Seek>(reader: &mut R, _endian: Endian, _args: ()) -> BinResult<u64> {
    reader.stream_position().map_err(binrw::Error::Io)
}

fn resolve_string(value: DeviceString, diagnostics: &mut Diagnostics) -> String {
    if value.is_error() {
        diagnostics.invalid_strings += 1;
    }
    value.into_text()
}

fn cursor_at<'a>(src: &ByteSource<'a>, row_base: usize) -> Option<binrw::io::Cursor<&'a [u8]>> {
    let mut cursor = src.cursor();
    cursor.seek(SeekFrom::Start(row_base as u64)).ok()?;
    Some(cursor)
}

#[binread]
#[derive(Debug, Clone)]
#[br(little)]
struct GenreOrLabelRowRaw {
    id: u32,
    #[br(parse_with = parse_device_string_lenient)]
    name: DeviceString,
}

/// Decodes a genre or label row (table kinds `Genres`/`Labels`, types 1 and 4).
pub fn decode_genre_or_label(
    src: &ByteSource<'_>,
    row_base: usize,
    diagnostics: &mut Diagnostics,
) -> Option<LookupRow> {
    let mut cursor = cursor_at(src, row_base)?;
    let raw = match GenreOrLabelRowRaw::read_options(&mut cursor, Endian::Little, ()) {
        Ok(raw) => raw,
        Err(_) => {
            diagnostics.malformed_records += 1;
            return None;
        }
    };
    let name = resolve_string(raw.name, diagnostics);
    if raw.id == 0 || name.is_empty() {
        diagnostics.malformed_records += 1;
        return None;
    }
    Some(LookupRow { id: raw.id, name })
}

#[binread]
#[derive(Debug, Clone)]
#[br(little)]
struct KeyRowRaw {
    id: u32,
    /// No documented meaning; ignored (spec §9).
    #[br(temp)]
    _secondary_id: u32,
    #[br(parse_with = parse_device_string_lenient)]
    name: DeviceString,
}

/// Decodes a key row (table kind `Keys`, type 5).
///
/// The second id at `+4` has no documented meaning and is ignored (spec §9).
pub fn decode_key(
    src: &ByteSource<'_>,
    row_base: usize,
    diagnostics: &mut Diagnostics,
) -> Option<LookupRow> {
    let mut cursor = cursor_at(src, row_base)?;
    let raw = match KeyRowRaw::read_options(&mut cursor, Endian::Little, ()) {
        Ok(raw) => raw,
        Err(_) => {
            diagnostics.malformed_records += 1;
            return None;
        }
    };
    let name = resolve_string(raw.name, diagnostics);
    if raw.id == 0 || name.is_empty() {
        diagnostics.malformed_records += 1;
        return None;
    }
    Some(LookupRow { id: raw.id, name })
}

#[binread]
#[derive(Debug, Clone)]
#[br(little)]
struct PlaylistNodeRowRaw {
    parent_id: u32,
    #[br(pad_before = 4)]
    sort_order: u32,
    id: u32,
    raw_is_folder: u32,
    #[br(parse_with = parse_device_string_lenient)]
    name: DeviceString,
}

/// Decodes a playlist-tree row (table kind `PlaylistTree`, type 7).
pub fn decode_playlist_node(
    src: &ByteSource<'_>,
    row_base: usize,
    diagnostics: &mut Diagnostics,
) -> Option<PlaylistNodeRow> {
    let mut cursor = cursor_at(src, row_base)?;
    let raw = match PlaylistNodeRowRaw::read_options(&mut cursor, Endian::Little, ()) {
        Ok(raw) => raw,
        Err(_) => {
            diagnostics.malformed_records += 1;
            return None;
        }
    };
    let name = resolve_string(raw.name, diagnostics);
    if raw.id == 0 || name.is_empty() {
        diagnostics.malformed_records += 1;
        return None;
    }
    Some(PlaylistNodeRow {
        id: raw.id,
        parent_id: raw.parent_id,
        sort_order: raw.sort_order,
        is_folder: raw.raw_is_folder != 0,
        name,
    })
}

#[binread]
#[derive(Debug, Clone, Copy)]
#[br(little)]
struct PlaylistEntryRowRaw {
    position: u32,
    track_id: u32,
    playlist_id: u32,
}

/// Decodes a playlist-entry row (table kind `PlaylistEntries`, type 8).
pub fn decode_playlist_entry(
    src: &ByteSource<'_>,
    row_base: usize,
    diagnostics: &mut Diagnostics,
) -> Option<PlaylistEntryRow> {
    let mut cursor = cursor_at(src, row_base)?;
    let raw = match PlaylistEntryRowRaw::read_options(&mut cursor, Endian::Little, ()) {
        Ok(raw) => raw,
        Err(_) => {
            diagnostics.malformed_records += 1;
            return None;
        }
    };
    if raw.track_id == 0 || raw.playlist_id == 0 {
        diagnostics.malformed_records += 1;
        return None;
    }
    Some(PlaylistEntryRow {
        playlist_id: raw.playlist_id,
        track_id: raw.track_id,
        position: raw.position,
    })
}

#[binread]
#[derive(Debug, Clone)]
#[br(little)]
struct ArtistRowRaw {
    #[br(temp, parse_with = current_offset)]
    base_offset: u64,

    subtype: u16,
    #[br(pad_before = 2)]
    id: u32,

    #[br(
        if(subtype & SUBTYPE_LONG_NAME == 0),
        pad_before = 1,
        parse_with = parse_ptr8_device_string,
        args(base_offset)
    )]
    name_near: Option<DeviceString>,
    #[br(
        if(subtype & SUBTYPE_LONG_NAME != 0),
        pad_before = 2,
        parse_with = parse_ptr16_device_string,
        args(base_offset)
    )]
    name_long: Option<DeviceString>,
}

/// Decodes an artist row (table kind `Artists`, type 2).
pub fn decode_artist(
    src: &ByteSource<'_>,
    row_base: usize,
    diagnostics: &mut Diagnostics,
) -> Option<LookupRow> {
    let mut cursor = cursor_at(src, row_base)?;
    let raw = match ArtistRowRaw::read_options(&mut cursor, Endian::Little, ()) {
        Ok(raw) => raw,
        Err(_) => {
            diagnostics.malformed_records += 1;
            return None;
        }
    };
    let name_value = raw.name_near.or(raw.name_long).unwrap_or(DeviceString::Empty);
    let name = resolve_string(name_value, diagnostics);
    if raw.id == 0 || name.is_empty() {
        diagnostics.malformed_records += 1;
        return None;
    }
    Some(LookupRow { id: raw.id, name })
}

#[binread]
#[derive(Debug, Clone)]
#[br(little)]
struct AlbumRowRaw {
    #[br(temp, parse_with = current_offset)]
    base_offset: u64,

    subtype: u16,
    #[br(pad_before = 10)]
    id: u32,

    #[br(
        if(subtype & SUBTYPE_LONG_NAME == 0),
        pad_before = 1,
        parse_with = parse_ptr8_device_string,
        args(base_offset)
    )]
    name_near: Option<DeviceString>,
    #[br(
        if(subtype & SUBTYPE_LONG_NAME != 0),
        pad_before = 6,
        parse_with = parse_ptr16_device_string,
        args(base_offset)
    )]
    name_long: Option<DeviceString>,
}

/// Decodes an album row (table kind `Albums`, type 3).
pub fn decode_album(
    src: &ByteSource<'_>,
    row_base: usize,
    diagnostics: &mut Diagnostics,
) -> Option<LookupRow> {
    let mut cursor = cursor_at(src, row_base)?;
    let raw = match AlbumRowRaw::read_options(&mut cursor, Endian::Little, ()) {
        Ok(raw) => raw,
        Err(_) => {
            diagnostics.malformed_records += 1;
            return None;
        }
    };
    let name_value = raw.name_near.or(raw.name_long).unwrap_or(DeviceString::Empty);
    let name = resolve_string(name_value, diagnostics);
    if raw.id == 0 || name.is_empty() {
        diagnostics.malformed_records += 1;
        return None;
    }
    Some(LookupRow { id: raw.id, name })
}

#[binread]
#[derive(Debug, Clone)]
#[br(little)]
struct TrackRowRaw {
    #[br(temp, parse_with = current_offset)]
    base_offset: u64,

    #[br(pad_before = 0x20)]
    key_id: u32,
    #[br(pad_before = 0x0C)]
    bitrate_kbps: u32,
    #[br(pad_before = 0x04)]
    tempo_centibpm: u32,
    genre_id: u32,
    album_id: u32,
    artist_id: u32,
    id: u32,
    #[br(pad_before = 0x08)]
    duration_s: u16,
    #[br(pad_before = 0x03)]
    rating: u8,

    #[br(pad_before = 0x18, parse_with = parse_track_string_slot, args(base_offset))]
    date_added: DeviceString,
    #[br(pad_before = 0x0C, parse_with = parse_track_string_slot, args(base_offset))]
    title: DeviceString,
    #[br(pad_before = 0x04, parse_with = parse_track_string_slot, args(base_offset))]
    file_path: DeviceString,
}

/// Decodes a track row (table kind `Tracks`, type 0).
pub fn decode_track(
    src: &ByteSource<'_>,
    row_base: usize,
    diagnostics: &mut Diagnostics,
) -> Option<TrackRow> {
    let mut cursor = cursor_at(src, row_base)?;
    let raw = match TrackRowRaw::read_options(&mut cursor, Endian::Little, ()) {
        Ok(raw) => raw,
        Err(_) => {
            diagnostics.malformed_records += 1;
            return None;
        }
    };

    if raw.id == 0
        || raw.tempo_centibpm > MAX_TEMPO_CENTIBPM
        || raw.duration_s > MAX_DURATION_S
        || raw.bitrate_kbps > MAX_BITRATE_KBPS
    {
        diagnostics.malformed_records += 1;
        return None;
    }

    let title = resolve_string(raw.title, diagnostics);
    let file_path = resolve_string(raw.file_path, diagnostics);
    let date_added = resolve_string(raw.date_added, diagnostics);

    Some(TrackRow {
        id: raw.id,
        title,
        artist_id: raw.artist_id,
        album_id: raw.album_id,
        genre_id: raw.genre_id,
        key_id: raw.key_id,
        duration_s: raw.duration_s,
        tempo_centibpm: raw.tempo_centibpm,
        rating: raw.rating,
        bitrate_kbps: raw.bitrate_kbps,
        file_path,
        date_added,
    })
}

#[cfg(test)]
mod test {
    use super::*;

    const TRACK_ROW_MIN_LEN: usize = 0x88;
    const TRACK_STRING_TABLE_OFFSET: usize = 0x5E;
    const TRACK_STRING_SLOT_TITLE: usize = 17;

    fn src(bytes: &[u8]) -> ByteSource<'_> {
        ByteSource::new(bytes)
    }

    fn short_ascii(s: &str) -> Vec<u8> {
        let mut v = vec![(((s.len() + 1) << 1) | 1) as u8];
        v.extend_from_slice(s.as_bytes());
        v
    }

    #[test]
    fn artist_near_name() {
        // subtype without the long-name bit, id=7, near name offset = 10.
        let mut data = vec![0u8; 10];
        data[0..2].copy_from_slice(&0u16.to_le_bytes());
        data[4..8].copy_from_slice(&7u32.to_le_bytes());
        data[9] = 10;
        data.extend(short_ascii("DJ A"));
        let mut diag = Diagnostics::default();
        let row = decode_artist(&src(&data), 0, &mut diag).unwrap();
        assert_eq!(row.id, 7);
        assert_eq!(row.name, "DJ A");
    }

    #[test]
    fn artist_long_name() {
        let mut data = vec![0u8; 12];
        data[0..2].copy_from_slice(&SUBTYPE_LONG_NAME.to_le_bytes());
        data[4..8].copy_from_slice(&9u32.to_le_bytes());
        data[0x0A..0x0C].copy_from_slice(&12u16.to_le_bytes());
        data.extend(short_ascii("DJ B"));
        let mut diag = Diagnostics::default();
        let row = decode_artist(&src(&data), 0, &mut diag).unwrap();
        assert_eq!(row.id, 9);
        assert_eq!(row.name, "DJ B");
    }

    #[test]
    fn artist_dropped_when_name_missing() {
        let mut data = vec![0u8; 10];
        data[4..8].copy_from_slice(&7u32.to_le_bytes());
        data[9] = 9; // points past the (empty) row, decodes to empty
        let mut diag = Diagnostics::default();
        assert!(decode_artist(&src(&data), 0, &mut diag).is_none());
        assert_eq!(diag.malformed_records, 1);
    }

    #[test]
    fn artist_dropped_when_row_too_short() {
        let data = vec![0u8; 5];
        let mut diag = Diagnostics::default();
        assert!(decode_artist(&src(&data), 0, &mut diag).is_none());
        assert_eq!(diag.malformed_records, 1);
    }

    #[test]
    fn album_near_name() {
        let mut data = vec![0u8; 18];
        data[12..16].copy_from_slice(&3u32.to_le_bytes());
        data[17] = 18;
        data.extend(short_ascii("Greatest Hits"));
        let mut diag = Diagnostics::default();
        let row = decode_album(&src(&data), 0, &mut diag).unwrap();
        assert_eq!(row.id, 3);
        assert_eq!(row.name, "Greatest Hits");
    }

    #[test]
    fn genre_or_label_requires_name() {
        let mut data = vec![0u8; 4];
        data[0..4].copy_from_slice(&5u32.to_le_bytes());
        let mut diag = Diagnostics::default();
        assert!(decode_genre_or_label(&src(&data), 0, &mut diag).is_none());
        assert_eq!(diag.malformed_records, 1);
    }

    #[test]
    fn key_ignores_secondary_id() {
        let mut data = vec![0u8; 8];
        data[0..4].copy_from_slice(&11u32.to_le_bytes());
        data[4..8].copy_from_slice(&0xDEAD_BEEFu32.to_le_bytes());
        data.extend(short_ascii("Am"));
        let mut diag = Diagnostics::default();
        let row = decode_key(&src(&data), 0, &mut diag).unwrap();
        assert_eq!(row.id, 11);
        assert_eq!(row.name, "Am");
    }

    #[test]
    fn playlist_node_decodes_folder_flag() {
        let mut data = vec![0u8; 20];
        data[0..4].copy_from_slice(&1u32.to_le_bytes()); // parent_id
        data[8..12].copy_from_slice(&2u32.to_le_bytes()); // sort_order
        data[12..16].copy_from_slice(&5u32.to_le_bytes()); // id
        data[16..20].copy_from_slice(&1u32.to_le_bytes()); // raw_is_folder
        data.extend(short_ascii("Favorites"));
        let mut diag = Diagnostics::default();
        let row = decode_playlist_node(&src(&data), 0, &mut diag).unwrap();
        assert_eq!(row.id, 5);
        assert_eq!(row.parent_id, 1);
        assert!(row.is_folder);
        assert_eq!(row.name, "Favorites");
    }

    #[test]
    fn playlist_entry_requires_both_ids() {
        let mut data = vec![0u8; 12];
        data[0..4].copy_from_slice(&1u32.to_le_bytes());
        data[4..8].copy_from_slice(&0u32.to_le_bytes()); // track_id = 0
        data[8..12].copy_from_slice(&5u32.to_le_bytes());
        let mut diag = Diagnostics::default();
        assert!(decode_playlist_entry(&src(&data), 0, &mut diag).is_none());
        assert_eq!(diag.malformed_records, 1);
    }

    #[test]
    fn track_dropped_when_duration_out_of_range() {
        let mut data = vec![0u8; TRACK_ROW_MIN_LEN];
        data[0x48..0x4C].copy_from_slice(&100u32.to_le_bytes()); // id
        data[0x54..0x56].copy_from_slice(&36001u16.to_le_bytes()); // duration
        let mut diag = Diagnostics::default();
        assert!(decode_track(&src(&data), 0, &mut diag).is_none());
        assert_eq!(diag.malformed_records, 1);
    }

    #[test]
    fn track_dropped_when_tempo_out_of_range() {
        let mut data = vec![0u8; TRACK_ROW_MIN_LEN];
        data[0x48..0x4C].copy_from_slice(&100u32.to_le_bytes());
        data[0x38..0x3C].copy_from_slice(&50001u32.to_le_bytes());
        let mut diag = Diagnostics::default();
        assert!(decode_track(&src(&data), 0, &mut diag).is_none());
    }

    #[test]
    fn track_dropped_when_id_zero() {
        let data = vec![0u8; TRACK_ROW_MIN_LEN];
        let mut diag = Diagnostics::default();
        assert!(decode_track(&src(&data), 0, &mut diag).is_none());
    }

    #[test]
    fn track_dropped_when_row_too_short() {
        let data = vec![0u8; TRACK_ROW_MIN_LEN - 1];
        let mut diag = Diagnostics::default();
        assert!(decode_track(&src(&data), 0, &mut diag).is_none());
        assert_eq!(diag.malformed_records, 1);
    }

    #[test]
    fn track_decodes_title_from_string_table() {
        let mut data = vec![0u8; TRACK_ROW_MIN_LEN];
        data[0x48..0x4C].copy_from_slice(&100u32.to_le_bytes()); // id
        data[0x44..0x48].copy_from_slice(&2u32.to_le_bytes()); // artist_id
        data[0x38..0x3C].copy_from_slice(&12800u32.to_le_bytes()); // tempo
        data[0x54..0x56].copy_from_slice(&180u16.to_le_bytes()); // duration

        let title_offset = data.len();
        data[TRACK_STRING_TABLE_OFFSET + TRACK_STRING_SLOT_TITLE * 2
            ..TRACK_STRING_TABLE_OFFSET + TRACK_STRING_SLOT_TITLE * 2 + 2]
            .copy_from_slice(&(title_offset as u16).to_le_bytes());
        data.extend(short_ascii("Intro"));

        let mut diag = Diagnostics::default();
        let row = decode_track(&src(&data), 0, &mut diag).unwrap();
        assert_eq!(row.id, 100);
        assert_eq!(row.title, "Intro");
        assert_eq!(row.artist_id, 2);
        assert_eq!(row.tempo_centibpm, 12800);
        assert_eq!(row.duration_s, 180);
    }
}
