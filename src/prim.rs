// Jukebox -- Playlist-driven music playback daemon
// Copyright 2021 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Primitive data types shared between the provider, the jukebox, and playback.

use std::fmt;

/// Identifies a track known to the streaming provider.
///
/// Track ids are opaque handles, the only meaningful operation on them is
/// comparison. The provider guarantees that the same track keeps the same id
/// for as long as the session lives.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TrackId(pub u64);

/// Identifies a playlist in the provider's playlist container.
///
/// Like track ids, playlist ids are stable across renames, so a renamed
/// playlist keeps its id, but a playlist that is removed and re-added does not.
#[derive(Copy, Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PlaylistId(pub u32);

/// Sample rate and channel count of a block of 16-bit interleaved samples.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AudioFormat {
    pub sample_rate_hz: u32,
    pub channels: u32,
}

impl AudioFormat {
    pub fn new(sample_rate_hz: u32, channels: u32) -> AudioFormat {
        AudioFormat {
            sample_rate_hz: sample_rate_hz,
            channels: channels,
        }
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Display for PlaylistId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} Hz, {} channels", self.sample_rate_hz, self.channels)
    }
}
