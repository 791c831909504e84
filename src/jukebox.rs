// Jukebox -- Playlist-driven music playback daemon
// Copyright 2021 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Decides which track of the target playlist plays next.
//!
//! The jukebox plays the playlist whose name matches the configured name, from
//! the top, one track after another. It follows edits to that playlist: when
//! tracks before the current position are removed, the position moves up so
//! it keeps pointing at the same upcoming track.
//!
//! The jukebox is owned by the control thread, and all of its inputs arrive
//! through that thread, so it needs no lock of its own.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::{info, warn};

use crate::history::{self, PlaybackEvent};
use crate::prim::{PlaylistId, TrackId};
use crate::sample_queue::SampleQueue;
use crate::session::Session;

pub struct Jukebox {
    /// Name of the playlist to play, compared case-insensitively.
    target_name: String,

    /// Whether to remove tracks from the playlist after they played.
    delete_after_play: bool,

    /// The playlist that matches the target name, if we found it.
    playlist: Option<PlaylistId>,

    /// Index into the playlist of the track to play.
    track_index: usize,

    /// The track that is loaded into the player.
    ///
    /// Invariant: this is `Some` if and only if `load` was issued, and `unload`
    /// was not issued after that.
    current_track: Option<TrackId>,

    queue: Arc<SampleQueue>,
}

impl Jukebox {
    pub fn new(target_name: String, delete_after_play: bool, queue: Arc<SampleQueue>) -> Jukebox {
        Jukebox {
            target_name: target_name,
            delete_after_play: delete_after_play,
            playlist: None,
            track_index: 0,
            current_track: None,
            queue: queue,
        }
    }

    pub fn playlist(&self) -> Option<PlaylistId> {
        self.playlist
    }

    pub fn track_index(&self) -> usize {
        self.track_index
    }

    pub fn current_track(&self) -> Option<TrackId> {
        self.current_track
    }

    pub fn matches_target(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(&self.target_name)
    }

    /// After login, look for the target playlist among all playlists.
    pub fn on_logged_in(&mut self, session: &mut dyn Session) {
        let playlists = session.playlists();
        info!("jukebox: Looking at {} playlists", playlists.len());

        let found = playlists.into_iter().find(|&pl| match session.playlist_name(pl) {
            Some(name) => self.matches_target(&name),
            None => false,
        });

        match found {
            Some(playlist) => self.resolve(session, playlist),
            None => info!("jukebox: No such playlist. Waiting for one to pop up..."),
        }
    }

    /// Make the given playlist the one to play, and start from its top.
    pub fn resolve(&mut self, session: &mut dyn Session, playlist: PlaylistId) {
        self.playlist = Some(playlist);
        self.track_index = 0;
        self.attempt_start(session);
    }

    fn lose_playlist(&mut self, session: &mut dyn Session) {
        self.playlist = None;
        self.current_track = None;
        session.unload();
    }

    pub fn on_playlist_renamed(&mut self, session: &mut dyn Session, playlist: PlaylistId) {
        let name = session.playlist_name(playlist).unwrap_or_default();
        if self.matches_target(&name) {
            self.resolve(session, playlist);
        } else if self.playlist == Some(playlist) {
            info!("jukebox: current playlist renamed to \"{}\".", name);
            self.lose_playlist(session);
        }
    }

    pub fn on_playlist_added(&mut self, session: &mut dyn Session, playlist: PlaylistId) {
        match session.playlist_name(playlist) {
            Some(name) if self.matches_target(&name) => self.resolve(session, playlist),
            _ => {}
        }
    }

    pub fn on_playlist_removed(&mut self, session: &mut dyn Session, playlist: PlaylistId) {
        if self.playlist == Some(playlist) {
            info!("jukebox: current playlist was removed.");
            self.lose_playlist(session);
        }
    }

    /// Tracks were inserted. The index is not shifted: tracks inserted before
    /// the current position are only played once the index wraps back to them.
    pub fn on_tracks_added(&mut self, session: &mut dyn Session, playlist: PlaylistId, count: usize) {
        if self.playlist != Some(playlist) {
            return
        }
        info!("jukebox: {} tracks were added", count);
        self.attempt_start(session);
    }

    pub fn on_tracks_removed(&mut self, session: &mut dyn Session, playlist: PlaylistId, indices: &[usize]) {
        if self.playlist != Some(playlist) {
            return
        }

        // Providers may report an index more than once, count each one once.
        let before: BTreeSet<usize> = indices
            .iter()
            .cloned()
            .filter(|&i| i < self.track_index)
            .collect();
        self.track_index = self.track_index.saturating_sub(before.len());

        info!("jukebox: {} tracks were removed", indices.len());
        self.attempt_start(session);
    }

    /// Tracks were moved around. The index tracks a position, not a track, so
    /// after a move it may point at a different track than before.
    pub fn on_tracks_moved(&mut self, session: &mut dyn Session, playlist: PlaylistId, count: usize) {
        if self.playlist != Some(playlist) {
            return
        }
        info!("jukebox: {} tracks were moved around", count);
        self.attempt_start(session);
    }

    pub fn on_metadata_updated(&mut self, session: &mut dyn Session) {
        self.attempt_start(session);
    }

    /// The loaded track played until the end.
    pub fn on_track_ended(&mut self, session: &mut dyn Session) {
        let track = match self.current_track.take() {
            Some(t) => t,
            None => return,
        };

        session.unload();
        history::record(PlaybackEvent::Completed(track), &session.track_name(track));

        if self.delete_after_play {
            // The removal comes back as a tracks-removed event, which adjusts
            // the index, so we leave it alone here.
            if let Some(playlist) = self.playlist {
                session.remove_tracks(playlist, &[0]);
            }
        } else {
            self.track_index += 1;
            self.attempt_start(session);
        }
    }

    /// Another session took over playback on this account.
    pub fn on_play_token_lost(&mut self, session: &mut dyn Session) {
        warn!("jukebox: Playback was taken over by another session.");
        self.queue.flush();
        if self.current_track.take().is_some() {
            session.unload();
        }
    }

    /// Start playing the track at the current index, if it is not playing yet.
    ///
    /// This is safe to call at any time; when there is nothing to play, or the
    /// right track is already loaded, it does nothing.
    pub fn attempt_start(&mut self, session: &mut dyn Session) {
        let playlist = match self.playlist {
            Some(pl) => pl,
            None => return,
        };

        let num_tracks = session.num_tracks(playlist);
        if num_tracks == 0 {
            info!("jukebox: No tracks in playlist. Waiting");
            return
        }
        if num_tracks < self.track_index {
            info!("jukebox: No more tracks in playlist. Waiting");
            return
        }

        let track = match session.track(playlist, self.track_index) {
            Some(t) => t,
            None => return,
        };

        if let Some(current) = self.current_track {
            if current != track {
                // Someone changed the current track.
                self.queue.flush();
                session.unload();
                self.current_track = None;
            }
        }

        if let Some(err) = session.track_error(track) {
            warn!("jukebox: Can not play track {}: {}", track, err);
            return
        }

        if self.current_track == Some(track) {
            return
        }

        self.current_track = Some(track);

        let name = session.track_name(track);
        if let Some(playlist_name) = session.playlist_name(playlist) {
            info!("jukebox: Playlist name: {}", playlist_name);
        }
        info!("jukebox: Now playing \"{}\"...", name);
        history::record(PlaybackEvent::Started(playlist, track), &name);

        if let Err(err) = session.load(track) {
            warn!("jukebox: Failed to load \"{}\": {}", name, err);
        }
        session.play(true);
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::Jukebox;
    use crate::prim::{AudioFormat, PlaylistId, TrackId};
    use crate::sample_queue::{PcmChunk, SampleQueue};
    use crate::session::fake::{Command, FakeSession};

    const LIST: PlaylistId = PlaylistId(1);
    const OTHER: PlaylistId = PlaylistId(2);

    fn session() -> FakeSession {
        FakeSession::new()
            .with_playlist(1, "HAI", 100, 10)
            .with_playlist(2, "Other", 200, 3)
    }

    fn jukebox(delete_after_play: bool) -> Jukebox {
        Jukebox::new("hai".to_string(), delete_after_play, Arc::new(SampleQueue::new()))
    }

    /// Return a jukebox that plays track 5 of playlist 1.
    fn playing_index_5(session: &mut FakeSession) -> Jukebox {
        let mut jukebox = jukebox(false);
        jukebox.resolve(session, LIST);
        jukebox.track_index = 5;
        jukebox.attempt_start(session);
        assert_eq!(jukebox.current_track(), Some(TrackId(105)));
        session.take_commands();
        jukebox
    }

    #[test]
    fn login_resolves_playlist_case_insensitively_and_starts() {
        let mut session = session();
        let mut jukebox = jukebox(false);
        jukebox.on_logged_in(&mut session);
        assert_eq!(jukebox.playlist(), Some(LIST));
        assert_eq!(jukebox.track_index(), 0);
        assert_eq!(
            session.take_commands(),
            vec![Command::Load(TrackId(100)), Command::Play(true)],
        );
    }

    #[test]
    fn login_without_match_waits() {
        let mut session = FakeSession::new().with_playlist(2, "Other", 200, 3);
        let mut jukebox = jukebox(false);
        jukebox.on_logged_in(&mut session);
        assert_eq!(jukebox.playlist(), None);
        assert!(session.commands.is_empty());
    }

    #[test]
    fn attempt_start_is_idempotent() {
        let mut session = session();
        let mut jukebox = jukebox(false);
        jukebox.resolve(&mut session, LIST);
        jukebox.attempt_start(&mut session);
        jukebox.attempt_start(&mut session);
        assert_eq!(session.count_loads(), 1);
        assert_eq!(session.commands.len(), 2);
    }

    #[test]
    fn attempt_start_without_playlist_or_tracks_does_nothing() {
        let mut session = FakeSession::new().with_playlist(1, "HAI", 100, 0);
        let mut jukebox = jukebox(false);
        jukebox.attempt_start(&mut session);
        jukebox.resolve(&mut session, LIST);
        assert!(session.commands.is_empty());
        assert_eq!(jukebox.current_track(), None);
    }

    #[test]
    fn attempt_start_past_the_end_does_nothing() {
        let mut session = session();
        let mut jukebox = jukebox(false);
        jukebox.resolve(&mut session, LIST);
        session.take_commands();
        jukebox.current_track = None;
        jukebox.track_index = 10;
        jukebox.attempt_start(&mut session);
        jukebox.track_index = 11;
        jukebox.attempt_start(&mut session);
        assert!(session.commands.is_empty());
    }

    #[test]
    fn attempt_start_skips_tracks_with_errors_without_retrying() {
        let mut session = session();
        session.broken.insert(TrackId(100));
        let mut jukebox = jukebox(false);
        jukebox.resolve(&mut session, LIST);
        assert!(session.commands.is_empty());
        assert_eq!(jukebox.current_track(), None);
        assert_eq!(jukebox.track_index(), 0);
    }

    #[test]
    fn attempt_start_replaces_a_different_loaded_track() {
        let queue = Arc::new(SampleQueue::new());
        let mut session = session();
        let mut jukebox = Jukebox::new("HAI".to_string(), false, queue.clone());
        jukebox.resolve(&mut session, LIST);
        session.take_commands();

        queue.enqueue(PcmChunk::new(AudioFormat::new(44_100, 2), vec![0; 64]));
        session.playlists[0].2.remove(0);
        jukebox.attempt_start(&mut session);

        assert!(queue.is_empty());
        assert_eq!(
            session.take_commands(),
            vec![Command::Unload, Command::Load(TrackId(101)), Command::Play(true)],
        );
        assert_eq!(jukebox.current_track(), Some(TrackId(101)));
    }

    #[test]
    fn removing_tracks_before_index_moves_index_up() {
        let mut session = session();
        let mut jukebox = playing_index_5(&mut session);
        session.playlists[0].2.drain(0..3);
        jukebox.on_tracks_removed(&mut session, LIST, &[0, 1, 2]);
        assert_eq!(jukebox.track_index(), 2);
        // Still the same track at the new index, so nothing is reloaded.
        assert_eq!(jukebox.current_track(), Some(TrackId(105)));
        assert!(session.commands.is_empty());
    }

    #[test]
    fn removing_tracks_after_index_keeps_index() {
        let mut session = session();
        let mut jukebox = playing_index_5(&mut session);
        session.playlists[0].2.remove(7);
        jukebox.on_tracks_removed(&mut session, LIST, &[7]);
        assert_eq!(jukebox.track_index(), 5);
        assert!(session.commands.is_empty());
    }

    #[test]
    fn removing_tracks_counts_repeated_indices_once() {
        let mut session = session();
        let mut jukebox = playing_index_5(&mut session);
        session.playlists[0].2.remove(0);
        jukebox.on_tracks_removed(&mut session, LIST, &[0, 0, 0, 0, 0, 0]);
        assert_eq!(jukebox.track_index(), 4);
        assert_eq!(jukebox.current_track(), Some(TrackId(105)));
        assert!(session.commands.is_empty());
    }

    #[test]
    fn removing_tracks_from_other_playlist_is_ignored() {
        let mut session = session();
        let mut jukebox = playing_index_5(&mut session);
        jukebox.on_tracks_removed(&mut session, OTHER, &[0, 1, 2]);
        assert_eq!(jukebox.track_index(), 5);
    }

    #[test]
    fn moving_tracks_does_not_adjust_index() {
        let mut session = session();
        let mut jukebox = playing_index_5(&mut session);
        let moved = session.playlists[0].2.remove(5);
        session.playlists[0].2.insert(0, moved);
        jukebox.on_tracks_moved(&mut session, LIST, 1);
        assert_eq!(jukebox.track_index(), 5);
        // Index 5 now holds what used to be index 4.
        assert_eq!(jukebox.current_track(), Some(TrackId(104)));
    }

    #[test]
    fn adding_tracks_starts_an_idle_jukebox() {
        let mut session = FakeSession::new().with_playlist(1, "HAI", 100, 0);
        let mut jukebox = jukebox(false);
        jukebox.resolve(&mut session, LIST);
        session.playlists[0].2.push(TrackId(100));
        jukebox.on_tracks_added(&mut session, LIST, 1);
        assert_eq!(jukebox.track_index(), 0);
        assert_eq!(
            session.take_commands(),
            vec![Command::Load(TrackId(100)), Command::Play(true)],
        );
    }

    #[test]
    fn natural_completion_advances_to_the_next_track() {
        let mut session = session();
        let mut jukebox = jukebox(false);
        jukebox.resolve(&mut session, LIST);
        session.take_commands();

        jukebox.on_track_ended(&mut session);
        assert_eq!(jukebox.track_index(), 1);
        assert_eq!(
            session.take_commands(),
            vec![Command::Unload, Command::Load(TrackId(101)), Command::Play(true)],
        );
    }

    #[test]
    fn natural_completion_with_delete_removes_first_track() {
        let mut session = session();
        let mut jukebox = jukebox(true);
        jukebox.resolve(&mut session, LIST);
        session.take_commands();

        jukebox.on_track_ended(&mut session);
        assert_eq!(jukebox.track_index(), 0);
        assert_eq!(jukebox.current_track(), None);
        assert_eq!(
            session.take_commands(),
            vec![Command::Unload, Command::Remove(LIST, vec![0])],
        );

        // The removal comes back as an event, which starts the next track.
        jukebox.on_tracks_removed(&mut session, LIST, &[0]);
        assert_eq!(jukebox.track_index(), 0);
        assert_eq!(jukebox.current_track(), Some(TrackId(101)));
    }

    #[test]
    fn natural_completion_without_loaded_track_does_nothing() {
        let mut session = session();
        let mut jukebox = jukebox(false);
        jukebox.on_track_ended(&mut session);
        assert!(session.commands.is_empty());
        assert_eq!(jukebox.track_index(), 0);
    }

    #[test]
    fn resolving_resets_the_index() {
        let mut session = session();
        let mut jukebox = playing_index_5(&mut session);

        session.rename(OTHER, "Hai");
        jukebox.on_playlist_renamed(&mut session, OTHER);
        assert_eq!(jukebox.playlist(), Some(OTHER));
        assert_eq!(jukebox.track_index(), 0);
        assert_eq!(
            session.take_commands(),
            vec![Command::Unload, Command::Load(TrackId(200)), Command::Play(true)],
        );
    }

    #[test]
    fn renaming_the_playlist_away_stops_playback() {
        let mut session = session();
        let mut jukebox = playing_index_5(&mut session);

        session.rename(LIST, "Not it");
        jukebox.on_playlist_renamed(&mut session, LIST);
        assert_eq!(jukebox.playlist(), None);
        assert_eq!(jukebox.current_track(), None);
        assert_eq!(session.take_commands(), vec![Command::Unload]);

        // Renaming an unrelated playlist to something else is ignored.
        jukebox.on_playlist_renamed(&mut session, OTHER);
        assert!(session.commands.is_empty());
    }

    #[test]
    fn removing_the_playlist_stops_playback() {
        let mut session = session();
        let mut jukebox = playing_index_5(&mut session);
        jukebox.on_playlist_removed(&mut session, OTHER);
        assert_eq!(jukebox.playlist(), Some(LIST));
        jukebox.on_playlist_removed(&mut session, LIST);
        assert_eq!(jukebox.playlist(), None);
        assert_eq!(session.take_commands(), vec![Command::Unload]);
    }

    #[test]
    fn play_token_lost_flushes_and_unloads_without_restart() {
        let queue = Arc::new(SampleQueue::new());
        let mut session = session();
        let mut jukebox = Jukebox::new("HAI".to_string(), false, queue.clone());
        jukebox.resolve(&mut session, LIST);
        session.take_commands();
        queue.enqueue(PcmChunk::new(AudioFormat::new(44_100, 2), vec![0; 64]));

        jukebox.on_play_token_lost(&mut session);
        assert!(queue.is_empty());
        assert_eq!(jukebox.current_track(), None);
        assert_eq!(session.take_commands(), vec![Command::Unload]);

        // Losing it again with nothing loaded only flushes.
        jukebox.on_play_token_lost(&mut session);
        assert!(session.commands.is_empty());
    }
}
