// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Decoder for the page-oriented device database export used by consumer DJ
//! software (`export.pdb`, optionally merged with a companion `exportExt.pdb`
//! via [`Merger`]).
//!
//! ```no_run
//! let data = std::fs::read("export.pdb").unwrap();
//! let decoded = devicedb::decode(&data, "export.pdb").unwrap();
//! println!("{} tracks", decoded.library.tracks.len());
//! ```
//!
//! The decoder never panics on adversarial input: malformed records, cyclic
//! page chains, and truncated strings are tolerated and tallied in
//! [`Decoded::diagnostics`] instead of aborting the decode. Only conditions
//! listed in [`Error`] abort it outright.

pub mod builder;
pub mod byte_source;
pub mod error;
pub mod library;
pub mod merger;
pub mod page;
pub mod row;
mod string;

pub use builder::{DatabaseBuilder, Diagnostics};
pub use byte_source::ByteSource;
pub use error::{Error, Result};
pub use library::{Library, Playlist, Track};
pub use merger::Merger;
pub use page::{FileHeader, TableDescriptor, TableKind};
pub use string::DeviceString;

/// Resource bounds applied while decoding (spec §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Inputs larger than this are rejected with [`Error::TooLarge`].
    pub max_size: usize,
    /// Inputs larger than this (but within `max_size`) log a warning but
    /// still decode.
    pub soft_warn_size: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_size: 500 * 1024 * 1024,
            soft_warn_size: 100 * 1024 * 1024,
        }
    }
}

/// The normalized result of a decode, plus counters for recoverable problems
/// encountered along the way.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// The decoded library.
    pub library: Library,
    /// Counts of recoverable problems swallowed during decode.
    pub diagnostics: Diagnostics,
}

/// Decodes `data` using [`DecodeOptions::default`].
///
/// `hint` is a caller-supplied name (typically a file path) used only to
/// make error messages identifiable; it is not otherwise interpreted.
pub fn decode(data: &[u8], hint: &str) -> Result<Decoded> {
    decode_with_options(data, hint, DecodeOptions::default())
}

/// Decodes `data` with caller-supplied resource bounds.
pub fn decode_with_options(data: &[u8], hint: &str, options: DecodeOptions) -> Result<Decoded> {
    if data.len() > options.max_size {
        return Err(Error::TooLarge {
            size: data.len(),
            max: options.max_size,
        });
    }
    if data.len() > options.soft_warn_size {
        log::warn!(
            "{hint}: input is {} bytes, over the {}-byte soft warning threshold",
            data.len(),
            options.soft_warn_size
        );
    }

    let src = ByteSource::new(data);
    let header = FileHeader::parse(&src)?;
    log::debug!("{hint}: page_len={} tables={}", header.page_len, header.tables.len());

    let builder = DatabaseBuilder::new(&src, header.page_len);
    let (library, diagnostics) = builder.build(&header.tables);

    log::debug!(
        "{hint}: decoded {} tracks, {} root playlists ({:?})",
        library.tracks.len(),
        library.playlists.len(),
        diagnostics
    );

    Ok(Decoded { library, diagnostics })
}
