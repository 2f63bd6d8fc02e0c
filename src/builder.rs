// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Orchestrates the four decode passes and assembles the normalized
//! [`Library`](crate::library::Library) (spec §4.5).
//!
//! Cross-table references are resolved through local maps owned by a single
//! [`DatabaseBuilder::build`] call; nothing is shared across decode
//! invocations.

use std::collections::HashMap;

use crate::byte_source::ByteSource;
use crate::library::{Library, Playlist, Track};
use crate::page::{PageWalker, TableDescriptor, TableKind};
use crate::row;

const UNKNOWN_ARTIST: &str = "Unknown Artist";
const UNKNOWN_ALBUM: &str = "Unknown Album";
const UNKNOWN_TITLE: &str = "Unknown Title";

/// Counts of recoverable, per-site problems encountered during a decode.
///
/// None of these abort the decode; spec §7 treats them as local and
/// swallowed at the site they occur, with the occurrence tallied here
/// instead of surfaced as an [`crate::error::Error`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Diagnostics {
    /// Page headers, row headers, or row fields that failed bounds/sanity
    /// checks and were skipped.
    pub malformed_records: u64,
    /// Device strings that failed to decode and were treated as empty.
    pub invalid_strings: u64,
    /// `next_page` chains found to cycle back on an already-visited page.
    pub cycles_detected: u64,
    /// Page-chain walks that were cut off by the page cap.
    pub page_caps_exceeded: u64,
}

impl Diagnostics {
    fn absorb_walk_stats(&mut self, stats: crate::page::WalkStats) {
        self.malformed_records += stats.malformed_pages;
        self.cycles_detected += stats.cycles_detected;
        self.page_caps_exceeded += stats.page_caps_exceeded;
    }
}

/// Intermediate playlist-tree node, before forest assembly.
struct NodeBuilder {
    parent_id: u32,
    sort_order: u32,
    is_folder: bool,
    name: String,
    entries: Vec<(u32, u32)>, // (track_id, position)
}

/// Orchestrates the four sequential decode passes and builds a [`Library`].
pub struct DatabaseBuilder<'a> {
    src: &'a ByteSource<'a>,
    page_len: u32,
}

impl<'a> DatabaseBuilder<'a> {
    /// Creates a builder over `src`, whose pages are `page_len` bytes.
    #[must_use]
    pub fn new(src: &'a ByteSource<'a>, page_len: u32) -> Self {
        Self { src, page_len }
    }

    /// Runs all four passes and assembles the normalized library.
    pub fn build(&self, tables: &[TableDescriptor]) -> (Library, Diagnostics) {
        let mut diagnostics = Diagnostics::default();
        let walker = PageWalker::new(self.src, self.page_len);

        log::debug!("pass 1/4: lookups");
        let mut artists = HashMap::new();
        let mut albums = HashMap::new();
        let mut genres = HashMap::new();
        let mut keys = HashMap::new();
        let mut labels = HashMap::new();
        for table in tables {
            match table.kind {
                TableKind::Artists => {
                    self.walk_lookup(&walker, table, &mut artists, &mut diagnostics, row::decode_artist)
                }
                TableKind::Albums => {
                    self.walk_lookup(&walker, table, &mut albums, &mut diagnostics, row::decode_album)
                }
                TableKind::Genres => self.walk_lookup(
                    &walker,
                    table,
                    &mut genres,
                    &mut diagnostics,
                    row::decode_genre_or_label,
                ),
                TableKind::Labels => self.walk_lookup(
                    &walker,
                    table,
                    &mut labels,
                    &mut diagnostics,
                    row::decode_genre_or_label,
                ),
                TableKind::Keys => {
                    self.walk_lookup(&walker, table, &mut keys, &mut diagnostics, row::decode_key)
                }
                _ => {}
            }
        }
        let _ = &labels; // label names aren't surfaced on the public Track (spec §3)

        log::debug!("pass 2/4: playlist tree");
        let mut nodes: HashMap<u32, NodeBuilder> = HashMap::new();
        let mut node_order: Vec<u32> = Vec::new();
        for table in tables {
            if table.kind != TableKind::PlaylistTree {
                continue;
            }
            let (rows, stats) = walker.walk(table);
            diagnostics.absorb_walk_stats(stats);
            for row_base in rows {
                match row::decode_playlist_node(self.src, row_base, &mut diagnostics) {
                    Some(decoded) => {
                        if nodes.insert(
                            decoded.id,
                            NodeBuilder {
                                parent_id: decoded.parent_id,
                                sort_order: decoded.sort_order,
                                is_folder: decoded.is_folder,
                                name: decoded.name,
                                entries: Vec::new(),
                            },
                        )
                        .is_none()
                        {
                            node_order.push(decoded.id);
                        }
                    }
                    None => continue,
                }
            }
        }

        log::debug!("pass 3/4: playlist entries");
        for table in tables {
            if table.kind != TableKind::PlaylistEntries {
                continue;
            }
            let (rows, stats) = walker.walk(table);
            diagnostics.absorb_walk_stats(stats);
            for row_base in rows {
                if let Some(entry) = row::decode_playlist_entry(self.src, row_base, &mut diagnostics) {
                    if let Some(node) = nodes.get_mut(&entry.playlist_id) {
                        node.entries.push((entry.track_id, entry.position));
                    }
                }
            }
        }

        log::debug!("pass 4/4: tracks");
        let mut tracks_by_id: HashMap<u32, Track> = HashMap::new();
        let mut track_order: Vec<u32> = Vec::new();
        for table in tables {
            if table.kind != TableKind::Tracks {
                continue;
            }
            let (rows, stats) = walker.walk(table);
            diagnostics.absorb_walk_stats(stats);
            for row_base in rows {
                let Some(decoded) = row::decode_track(self.src, row_base, &mut diagnostics) else {
                    continue;
                };
                let track = Track {
                    id: decoded.id,
                    title: non_empty_or(decoded.title, UNKNOWN_TITLE),
                    artist: resolve_or_default(&artists, decoded.artist_id, UNKNOWN_ARTIST),
                    album: resolve_or_default(&albums, decoded.album_id, UNKNOWN_ALBUM),
                    genre: resolve_or_empty(&genres, decoded.genre_id),
                    key: resolve_or_empty(&keys, decoded.key_id),
                    duration_s: decoded.duration_s,
                    bpm: f64::from(decoded.tempo_centibpm) / 100.0,
                    rating: decoded.rating,
                    bitrate: decoded.bitrate_kbps,
                    file_path: decoded.file_path,
                    date_added: decoded.date_added,
                };
                if tracks_by_id.insert(track.id, track).is_none() {
                    track_order.push(decoded.id);
                }
                // Last-writer-wins: a repeated id keeps its original position
                // in `track_order` but the newest decoded fields (spec §4.5).
            }
        }

        let library = Library {
            tracks: track_order
                .into_iter()
                .filter_map(|id| tracks_by_id.remove(&id))
                .collect(),
            playlists: assemble_forest(nodes, node_order),
        };

        (library, diagnostics)
    }

    fn walk_lookup(
        &self,
        walker: &PageWalker<'_>,
        table: &TableDescriptor,
        map: &mut HashMap<u32, String>,
        diagnostics: &mut Diagnostics,
        decode_one: impl Fn(&ByteSource<'_>, usize, &mut Diagnostics) -> Option<row::LookupRow>,
    ) {
        let (rows, stats) = walker.walk(table);
        diagnostics.absorb_walk_stats(stats);
        for row_base in rows {
            if let Some(decoded) = decode_one(self.src, row_base, diagnostics) {
                map.insert(decoded.id, decoded.name);
            }
        }
    }
}

fn non_empty_or(value: String, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}

fn resolve_or_default(map: &HashMap<u32, String>, id: u32, default: &str) -> String {
    map.get(&id).cloned().unwrap_or_else(|| default.to_string())
}

fn resolve_or_empty(map: &HashMap<u32, String>, id: u32) -> String {
    map.get(&id).cloned().unwrap_or_default()
}

/// Two-step forest assembly (spec §9): collect nodes by id, then attach each
/// child to its parent by id. Nodes with `parent_id == 0`, or whose parent
/// was dropped during decoding, become roots.
fn assemble_forest(mut nodes: HashMap<u32, NodeBuilder>, order: Vec<u32>) -> Vec<Playlist> {
    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut roots: Vec<u32> = Vec::new();

    for &id in &order {
        let Some(node) = nodes.get(&id) else { continue };
        if node.parent_id != 0 && nodes.contains_key(&node.parent_id) {
            children.entry(node.parent_id).or_default().push(id);
        } else {
            roots.push(id);
        }
    }

    fn build(id: u32, nodes: &mut HashMap<u32, NodeBuilder>, children: &HashMap<u32, Vec<u32>>) -> Playlist {
        let node = nodes.remove(&id).expect("id came from the node map");
        let mut entries = node.entries;
        entries.sort_by_key(|&(_, position)| position);
        let track_ids = entries.into_iter().map(|(track_id, _)| track_id).collect();

        let kid_ids = children.get(&id).cloned().unwrap_or_default();
        let kids = kid_ids
            .into_iter()
            .map(|kid| build(kid, nodes, children))
            .collect();

        Playlist {
            id,
            name: node.name,
            parent_id: if node.parent_id == 0 {
                None
            } else {
                Some(node.parent_id)
            },
            is_folder: node.is_folder,
            children: kids,
            track_ids,
        }
    }

    roots.sort_by_key(|id| nodes.get(id).map_or(0, |n| n.sort_order));
    roots
        .into_iter()
        .map(|id| build(id, &mut nodes, &children))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn non_empty_or_falls_back() {
        assert_eq!(non_empty_or(String::new(), "x"), "x");
        assert_eq!(non_empty_or("y".to_string(), "x"), "y");
    }

    #[test]
    fn forest_orders_roots_by_sort_order_and_drops_orphan_parents() {
        let mut nodes = HashMap::new();
        nodes.insert(
            2,
            NodeBuilder {
                parent_id: 0,
                sort_order: 5,
                is_folder: false,
                name: "B".into(),
                entries: Vec::new(),
            },
        );
        nodes.insert(
            1,
            NodeBuilder {
                parent_id: 0,
                sort_order: 1,
                is_folder: false,
                name: "A".into(),
                entries: Vec::new(),
            },
        );
        nodes.insert(
            3,
            NodeBuilder {
                parent_id: 999, // parent never decoded -> becomes a root
                sort_order: 2,
                is_folder: false,
                name: "C".into(),
                entries: Vec::new(),
            },
        );
        let playlists = assemble_forest(nodes, vec![2, 1, 3]);
        let names: Vec<_> = playlists.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "C", "B"]);
    }

    #[test]
    fn forest_attaches_children_and_sorts_entries_by_position() {
        let mut nodes = HashMap::new();
        nodes.insert(
            1,
            NodeBuilder {
                parent_id: 0,
                sort_order: 0,
                is_folder: true,
                name: "Sets".into(),
                entries: Vec::new(),
            },
        );
        nodes.insert(
            2,
            NodeBuilder {
                parent_id: 1,
                sort_order: 1,
                is_folder: false,
                name: "Warmup".into(),
                entries: vec![(10, 2), (11, 1)],
            },
        );
        let playlists = assemble_forest(nodes, vec![1, 2]);
        assert_eq!(playlists.len(), 1);
        assert_eq!(playlists[0].children.len(), 1);
        assert_eq!(playlists[0].children[0].track_ids, vec![11, 10]);
    }
}
