// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Fills gaps in a primary library's BPM and genre fields from a secondary
//! one, matched by track id (spec §4.6).

use std::collections::HashMap;

use crate::library::{Library, Track};

/// Combines a primary decoded library with a secondary one, by track id.
#[derive(Debug, Default, Clone, Copy)]
pub struct Merger;

impl Merger {
    /// Creates a merger.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Returns a library equal to `primary`, except that any track also
    /// present in `secondary` (matched by id) has its `bpm` filled from
    /// `secondary` when `primary`'s is `<= 0`, and its `genre` filled when
    /// `primary`'s is empty. All other fields, and playlists, come
    /// exclusively from `primary`. Tracks present only in `secondary` are
    /// ignored.
    #[must_use]
    pub fn merge(&self, primary: &Library, secondary: &Library) -> Library {
        let secondary_by_id: HashMap<u32, &Track> =
            secondary.tracks.iter().map(|t| (t.id, t)).collect();

        let tracks = primary
            .tracks
            .iter()
            .map(|track| match secondary_by_id.get(&track.id) {
                Some(other) => merge_track(track, other),
                None => track.clone(),
            })
            .collect();

        Library {
            tracks,
            playlists: primary.playlists.clone(),
        }
    }
}

fn merge_track(primary: &Track, secondary: &Track) -> Track {
    let mut merged = primary.clone();
    if merged.bpm <= 0.0 {
        merged.bpm = secondary.bpm;
    }
    if merged.genre.is_empty() {
        merged.genre = secondary.genre.clone();
    }
    merged
}
