// Jukebox -- Playlist-driven music playback daemon
// Copyright 2020 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Logging of historical playback events.

use std::fmt;

use log::info;

use crate::prim::{PlaylistId, TrackId};

/// Changes in the playback state to be recorded.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PlaybackEvent {
    Started(PlaylistId, TrackId),
    Completed(TrackId),
}

impl fmt::Display for PlaybackEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PlaybackEvent::Started(playlist, track) => write!(f, "Started {} {}", playlist, track),
            PlaybackEvent::Completed(track) => write!(f, "Completed {}", track),
        }
    }
}

/// Record the event with the current time.
pub fn record(event: PlaybackEvent, track_name: &str) {
    let now = chrono::Utc::now();
    info!("{} \"{}\" at {}", event, track_name, now.format("%Y-%m-%dT%H:%M:%SZ"));
}
