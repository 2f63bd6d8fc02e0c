// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Error types returned at the top-level decode boundary.
//!
//! Only fatal conditions are represented here. Per-row and per-page problems
//! (a malformed record, an unparseable string, a cyclic page chain) are
//! recoverable: the offending row or page is skipped and the decode
//! continues, with the occurrence tallied in [`crate::builder::Diagnostics`]
//! instead of being surfaced as an [`Error`].

use thiserror::Error;

/// Errors that can abort a decode entirely.
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum Error {
    /// The input buffer exceeds the configured size cap.
    #[error("input is too large ({size} bytes, maximum is {max} bytes)")]
    TooLarge {
        /// Size of the rejected buffer, in bytes.
        size: usize,
        /// Configured maximum, in bytes.
        max: usize,
    },
    /// The input buffer is too small to contain a file header.
    #[error("input is too small ({size} bytes, need at least {min} bytes)")]
    TooSmall {
        /// Size of the rejected buffer, in bytes.
        size: usize,
        /// Minimum required size, in bytes.
        min: usize,
    },
    /// The file header failed validation (bad page size or table count).
    #[error("invalid file header: {0}")]
    InvalidHeader(&'static str),
}

/// Convenience alias for results returned by this crate.
pub type Result<T> = std::result::Result<T, Error>;
