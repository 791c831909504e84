// Jukebox -- Playlist-driven music playback daemon
// Copyright 2021 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The passive user interface: a list of playlists, and selection by name.

use std::io;
use std::io::BufRead;

use log::info;

use crate::notify::Notifier;
use crate::prim::PlaylistId;
use crate::session::Event;

/// Renders one row per playlist.
pub trait RowSink {
    fn add_row(&mut self, name: &str, num_tracks: usize);
}

/// Renders rows to the log.
pub struct LogRowSink;

impl RowSink for LogRowSink {
    fn add_row(&mut self, name: &str, num_tracks: usize) {
        info!("Playlist: {:<40} {:>5} tracks", name, num_tracks);
    }
}

/// The playlists that the UI knows about, in the order they were observed.
pub struct PlaylistDirectory {
    entries: Vec<(PlaylistId, String)>,
}

impl PlaylistDirectory {
    pub fn new() -> PlaylistDirectory {
        PlaylistDirectory {
            entries: Vec::new(),
        }
    }

    /// Record that tracks were observed in the playlist.
    ///
    /// Returns true if this is the first time we see the playlist, in which
    /// case it should get a row.
    pub fn observe(&mut self, playlist: PlaylistId, name: &str) -> bool {
        if self.entries.iter().any(|(id, _)| *id == playlist) {
            return false
        }
        self.entries.push((playlist, name.to_string()));
        true
    }

    pub fn rename(&mut self, playlist: PlaylistId, name: &str) {
        for (id, entry_name) in self.entries.iter_mut() {
            if *id == playlist {
                *entry_name = name.to_string();
            }
        }
    }

    pub fn remove(&mut self, playlist: PlaylistId) {
        self.entries.retain(|(id, _)| *id != playlist);
    }

    /// Find the first playlist with the given name, ignoring ASCII case.
    pub fn find_by_name(&self, name: &str) -> Option<PlaylistId> {
        self.entries
            .iter()
            .find(|(_, entry_name)| entry_name.eq_ignore_ascii_case(name))
            .map(|(id, _)| *id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PlaylistDirectory {
    fn default() -> PlaylistDirectory {
        PlaylistDirectory::new()
    }
}

/// Main for the input thread: every non-empty line selects a playlist by name.
///
/// Returns when the input is closed.
pub fn read_selections<R: BufRead>(input: R, notifier: &Notifier) -> io::Result<()> {
    for line in input.lines() {
        let line = line?;
        let name = line.trim();
        if name.is_empty() {
            continue
        }
        notifier.push_event(Event::SelectPlaylist(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::{read_selections, PlaylistDirectory};
    use crate::notify::Notifier;
    use crate::prim::PlaylistId;
    use crate::session::Event;

    #[test]
    fn directory_observes_each_playlist_once() {
        let mut directory = PlaylistDirectory::new();
        assert!(directory.observe(PlaylistId(1), "Morning"));
        assert!(directory.observe(PlaylistId(2), "Evening"));
        assert!(!directory.observe(PlaylistId(1), "Morning"));
        assert_eq!(directory.len(), 2);
    }

    #[test]
    fn directory_has_no_fixed_capacity() {
        let mut directory = PlaylistDirectory::new();
        for i in 0..500 {
            assert!(directory.observe(PlaylistId(i), &format!("List {}", i)));
        }
        assert_eq!(directory.find_by_name("list 499"), Some(PlaylistId(499)));
    }

    #[test]
    fn directory_finds_by_name_after_rename_and_remove() {
        let mut directory = PlaylistDirectory::new();
        directory.observe(PlaylistId(1), "Morning");
        directory.observe(PlaylistId(2), "Evening");

        assert_eq!(directory.find_by_name("MORNING"), Some(PlaylistId(1)));
        directory.rename(PlaylistId(1), "Dawn");
        assert_eq!(directory.find_by_name("Morning"), None);
        assert_eq!(directory.find_by_name("dawn"), Some(PlaylistId(1)));

        directory.remove(PlaylistId(1));
        assert_eq!(directory.find_by_name("Dawn"), None);
        assert_eq!(directory.find_by_name("Evening"), Some(PlaylistId(2)));
    }

    #[test]
    fn read_selections_posts_one_event_per_line() {
        let notifier = Notifier::new();
        let input = Cursor::new("Morning\n\n  Evening  \n");
        read_selections(input, &notifier).unwrap();
        assert_eq!(notifier.take_events(), vec![
            Event::SelectPlaylist("Morning".to_string()),
            Event::SelectPlaylist("Evening".to_string()),
        ]);
    }
}
