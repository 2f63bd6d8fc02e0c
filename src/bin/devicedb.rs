// Copyright (c) 2022 Jan Holthuis
//
// This Source Code Form is subject to the terms of the Mozilla Public License, v. 2.0. If a copy
// of the MPL was not distributed with this file, You can obtain one at
// http://mozilla.org/MPL/2.0/.
//
// SPDX-License-Identifier: MPL-2.0

//! Loads a device database export, decodes it, and prints a summary.

use clap::Parser;

/// Decode a device database export and print a summary.
#[derive(Debug, Parser)]
struct Args {
    /// Path to the primary export (`export.pdb`).
    path: std::path::PathBuf,

    /// Path to a companion export (`exportExt.pdb`) to merge BPM/genre from.
    #[arg(long)]
    merge_with: Option<std::path::PathBuf>,

    /// Print every decoded track, not just the summary counts.
    #[arg(long)]
    verbose: bool,
}

fn load_and_decode(path: &std::path::Path) -> devicedb::Decoded {
    let data = std::fs::read(path).expect("failed to read file");
    let hint = path.to_string_lossy();
    devicedb::decode(&data, &hint).expect("failed to decode file")
}

fn main() {
    env_logger::init();
    let args = Args::parse();

    let decoded = load_and_decode(&args.path);
    let library = if let Some(secondary_path) = &args.merge_with {
        let secondary = load_and_decode(secondary_path);
        devicedb::Merger::new().merge(&decoded.library, &secondary.library)
    } else {
        decoded.library
    };

    println!(
        "{} tracks, {} root playlists",
        library.tracks.len(),
        library.playlists.len()
    );
    println!("{:?}", decoded.diagnostics);

    if args.verbose {
        for track in &library.tracks {
            println!(
                "  #{} {} - {} ({:.1} BPM, {}s)",
                track.id, track.artist, track.title, track.bpm, track.duration_s
            );
        }
    }
}
