// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! The public, normalized output of a decode: [`Track`], [`Playlist`], and
//! [`Library`] (spec §3).

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A single track with all foreign keys already resolved to text.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Track {
    /// Row id, unique within a [`Library`].
    pub id: u32,
    /// Track title, or `"Unknown Title"` if absent.
    pub title: String,
    /// Resolved artist name, or `"Unknown Artist"` if unset/unresolved.
    pub artist: String,
    /// Resolved album name, or `"Unknown Album"` if unset/unresolved.
    pub album: String,
    /// Resolved genre name, or empty if unset/unresolved.
    pub genre: String,
    /// Resolved musical key name, or empty if unset/unresolved.
    pub key: String,
    /// Playback duration in seconds.
    pub duration_s: u16,
    /// Tempo in beats per minute (`tempo_centiBPM / 100.0`).
    pub bpm: f64,
    /// User rating.
    pub rating: u8,
    /// Bitrate in kbps.
    pub bitrate: u32,
    /// Path to the audio file, or empty if absent.
    pub file_path: String,
    /// Opaque, unparsed date-added text (spec §9: no documented format).
    pub date_added: String,
}

/// A node in the playlist/folder forest.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Playlist {
    /// Row id.
    pub id: u32,
    /// Display name.
    pub name: String,
    /// Parent node id, or `None` for a root.
    pub parent_id: Option<u32>,
    /// `true` if this node is a folder rather than a playlist.
    pub is_folder: bool,
    /// Child nodes, in tree-table iteration order.
    pub children: Vec<Playlist>,
    /// Track ids referenced by this playlist, sorted by ascending position.
    ///
    /// An id here may not correspond to any [`Track`] in the owning
    /// [`Library`] — spec §3 explicitly tolerates dangling references.
    pub track_ids: Vec<u32>,
}

/// The normalized result of a decode: all tracks plus the playlist forest.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Library {
    /// Tracks in decode order, with duplicate ids collapsed last-writer-wins.
    pub tracks: Vec<Track>,
    /// Root playlists, ordered by ascending `sort_order`.
    pub playlists: Vec<Playlist>,
}

impl Library {
    /// Looks up a track by id.
    #[must_use]
    pub fn track(&self, id: u32) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn track_lookup_by_id() {
        let library = Library {
            tracks: vec![Track {
                id: 7,
                title: "Intro".into(),
                artist: "DJ A".into(),
                album: "Unknown Album".into(),
                genre: String::new(),
                key: String::new(),
                duration_s: 180,
                bpm: 128.0,
                rating: 0,
                bitrate: 320,
                file_path: String::new(),
                date_added: String::new(),
            }],
            playlists: Vec::new(),
        };
        assert!(library.track(7).is_some());
        assert!(library.track(8).is_none());
    }
}
