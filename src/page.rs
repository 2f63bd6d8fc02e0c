// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! File header, table descriptors, and the page walker.
//!
//! This is the hard part of the format: pages are chained via `next_page`
//! links that a hostile file can turn into a cycle, and the row index for
//! each page grows *backward* from the page's tail in groups of sixteen.

use crate::byte_source::ByteSource;
use crate::error::{Error, Result};
use bitflags::bitflags;

/// Byte length of the file header proper, before the table descriptors.
const HEADER_LEN: usize = 28;
/// Byte length of a single table descriptor.
const TABLE_DESCRIPTOR_LEN: usize = 16;
/// Byte length of a page header.
const PAGE_HEADER_LEN: usize = 40;
/// Byte stride of a single 16-row group in the reverse-growing row index.
const ROW_GROUP_STRIDE: usize = 0x24;
/// Number of rows described by one full row group.
const ROWS_PER_GROUP: u16 = 16;

const MIN_PAGE_LEN: u32 = 512;
const MAX_PAGE_LEN: u32 = 1 << 20;
const MAX_TABLES: u32 = 1000;
const MAX_ROW_OFFSETS: u16 = 2000;
/// Paranoia cap on the number of pages walked for a single table.
const MAX_PAGES_PER_TABLE: usize = 10_000;

bitflags! {
    /// Flags carried in a page header's flag byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u8 {
        /// Set on index pages, which hold no row data.
        const INDEX = 0x40;
    }
}

/// The kind of rows a table/page holds.
///
/// Only the kinds this decoder resolves foreign keys against or emits
/// records for are named; everything else is [`TableKind::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Track metadata rows.
    Tracks,
    /// Genre lookup rows.
    Genres,
    /// Artist lookup rows.
    Artists,
    /// Album lookup rows.
    Albums,
    /// Record label lookup rows.
    Labels,
    /// Musical key lookup rows.
    Keys,
    /// Playlist/folder tree nodes.
    PlaylistTree,
    /// Track-to-playlist link rows.
    PlaylistEntries,
    /// A table type this decoder has no row layout for.
    Other(u32),
}

impl TableKind {
    fn from_type_id(id: u32) -> Self {
        match id {
            0 => Self::Tracks,
            1 => Self::Genres,
            2 => Self::Artists,
            3 => Self::Albums,
            4 => Self::Labels,
            5 => Self::Keys,
            7 => Self::PlaylistTree,
            8 => Self::PlaylistEntries,
            other => Self::Other(other),
        }
    }
}

/// Validated file header: page size and the table list.
#[derive(Debug, Clone)]
pub struct FileHeader {
    /// Size of a single page, in bytes.
    pub page_len: u32,
    /// Table descriptors found in the header.
    pub tables: Vec<TableDescriptor>,
}

/// A single table's type and the first/last page of its page chain.
#[derive(Debug, Clone, Copy)]
pub struct TableDescriptor {
    /// The kind of rows this table holds.
    pub kind: TableKind,
    /// Index of the first page of the table's page chain.
    pub first_page: u32,
    /// Index of the last page of the table's page chain.
    pub last_page: u32,
}

impl FileHeader {
    /// Parses and validates the file header (spec §3, §4 "File header").
    pub fn parse(src: &ByteSource<'_>) -> Result<Self> {
        let size = src.len();
        if size < HEADER_LEN {
            return Err(Error::TooSmall {
                size,
                min: HEADER_LEN,
            });
        }

        let page_len = src
            .u32le_at(4)
            .map_err(|_| Error::InvalidHeader("truncated page_len"))?;
        if !(MIN_PAGE_LEN..=MAX_PAGE_LEN).contains(&page_len) {
            return Err(Error::InvalidHeader("page_len out of range"));
        }

        let num_tables = src
            .u32le_at(8)
            .map_err(|_| Error::InvalidHeader("truncated num_tables"))?;
        if num_tables > MAX_TABLES {
            return Err(Error::InvalidHeader("num_tables out of range"));
        }

        let required_size = HEADER_LEN
            .checked_add((num_tables as usize).saturating_mul(TABLE_DESCRIPTOR_LEN))
            .ok_or(Error::InvalidHeader("table count overflows file size"))?;
        if size < required_size {
            return Err(Error::TooSmall {
                size,
                min: required_size,
            });
        }

        let mut tables = Vec::with_capacity(num_tables as usize);
        for i in 0..num_tables {
            let base = HEADER_LEN + (i as usize) * TABLE_DESCRIPTOR_LEN;
            let type_id = src
                .u32le_at(base)
                .map_err(|_| Error::InvalidHeader("truncated table descriptor"))?;
            let first_page = src
                .u32le_at(base + 8)
                .map_err(|_| Error::InvalidHeader("truncated table descriptor"))?;
            let last_page = src
                .u32le_at(base + 12)
                .map_err(|_| Error::InvalidHeader("truncated table descriptor"))?;
            tables.push(TableDescriptor {
                kind: TableKind::from_type_id(type_id),
                first_page,
                last_page,
            });
        }

        Ok(Self { page_len, tables })
    }
}

/// Outcome of walking one table's page chain: the live row offsets found,
/// plus counters for the abnormal (but non-fatal) conditions encountered.
#[derive(Debug, Default, Clone, Copy)]
pub struct WalkStats {
    /// Page headers or row offsets that failed bounds/sanity checks.
    pub malformed_pages: u64,
    /// Times the `next_page` chain was found to cycle back on itself.
    pub cycles_detected: u64,
    /// Times the 10 000-page cap terminated a walk early.
    pub page_caps_exceeded: u64,
}

/// Enumerates the live row offsets of a table's page chain, in file order.
///
/// Errors during traversal never abort the walk: a malformed page header or
/// out-of-bounds row offset is skipped, and the chain is followed as far as
/// it safely can be.
pub struct PageWalker<'a> {
    src: &'a ByteSource<'a>,
    page_len: u32,
}

impl<'a> PageWalker<'a> {
    /// Creates a walker for pages of size `page_len` within `src`.
    #[must_use]
    pub fn new(src: &'a ByteSource<'a>, page_len: u32) -> Self {
        Self { src, page_len }
    }

    /// Walks `table`'s page chain and returns every live row's base offset
    /// (the start of its row payload, i.e. `page_offset + 40 + row_offset`).
    pub fn walk(&self, table: &TableDescriptor) -> (Vec<usize>, WalkStats) {
        let mut stats = WalkStats::default();
        let mut rows = Vec::new();
        let mut visited = std::collections::HashSet::new();
        let mut current = table.first_page;
        let mut pages_walked = 0usize;

        loop {
            if pages_walked >= MAX_PAGES_PER_TABLE {
                stats.page_caps_exceeded += 1;
                break;
            }
            if !visited.insert(current) {
                stats.cycles_detected += 1;
                break;
            }
            pages_walked += 1;

            let page_offset = match (current as usize).checked_mul(self.page_len as usize) {
                Some(off) if off + (self.page_len as usize) <= self.src.len() => off,
                _ => {
                    stats.malformed_pages += 1;
                    break;
                }
            };

            let is_last_page = current == table.last_page;

            match self.walk_page(page_offset, table.kind, &mut rows, &mut stats) {
                Ok(next_page) => {
                    if is_last_page || next_page == 0 || next_page as usize >= u32::MAX as usize {
                        break;
                    }
                    current = next_page;
                }
                Err(()) => {
                    stats.malformed_pages += 1;
                    break;
                }
            }
        }

        (rows, stats)
    }

    /// Parses one page's header and, if it is a data page, pushes every
    /// live row's base offset onto `rows`. Returns the page's `next_page`
    /// index.
    fn walk_page(
        &self,
        page_offset: usize,
        kind: TableKind,
        rows: &mut Vec<usize>,
        stats: &mut WalkStats,
    ) -> std::result::Result<u32, ()> {
        let _ = kind; // page type is implied by the table being walked.
        let page_len = self.page_len as usize;

        let next_page = self.src.u32le_at(page_offset + 12).map_err(|_| ())?;
        let packed = self.src.u32le_at(page_offset + 24).map_err(|_| ())?;
        let num_row_offsets = (packed & 0x1FFF) as u16;
        let flags_byte = self.src.u8_at(page_offset + 27).map_err(|_| ())?;
        let flags = PageFlags::from_bits_truncate(flags_byte);

        if num_row_offsets > MAX_ROW_OFFSETS {
            stats.malformed_pages += 1;
            return Ok(next_page);
        }
        if flags.contains(PageFlags::INDEX) {
            return Ok(next_page);
        }

        let heap_start = page_offset + PAGE_HEADER_LEN;
        let heap_end = page_offset + page_len;
        let num_groups = num_row_offsets.div_ceil(ROWS_PER_GROUP);

        for g in 0..num_groups {
            let group_base = match page_offset
                .checked_add(page_len)
                .and_then(|end| end.checked_sub((g as usize) * ROW_GROUP_STRIDE))
            {
                Some(v) => v,
                None => continue,
            };

            let presence = match group_base
                .checked_sub(4)
                .and_then(|o| self.src.u16le_at(o).ok())
            {
                Some(v) => v,
                None => continue,
            };

            for i in 0..ROWS_PER_GROUP {
                if presence & (1 << i) == 0 {
                    continue;
                }
                let offset_pos = match group_base.checked_sub(6 + 2 * (i as usize)) {
                    Some(v) => v,
                    None => continue,
                };
                let row_offset = match self.src.u16le_at(offset_pos) {
                    Ok(v) => v,
                    Err(_) => continue,
                };
                let row_base = heap_start + row_offset as usize;
                if row_base >= heap_start && row_base < heap_end {
                    rows.push(row_base);
                }
            }
        }

        Ok(next_page)
    }
}
