// Jukebox -- Playlist-driven music playback daemon
// Copyright 2021 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The interface to the streaming provider.
//!
//! The provider is split in two halves. The `Session` trait is what the
//! control thread calls into: it may only be used from that one thread. The
//! `SessionCallbacks` is what the provider calls back into, from whatever
//! thread it likes. Callbacks never touch jukebox state directly, they either
//! push samples into the sample queue, or post a typed event to the notifier,
//! which the control thread then applies.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::error::Result;
use crate::notify::Notifier;
use crate::prim::{AudioFormat, PlaylistId, TrackId};
use crate::sample_queue::{PcmChunk, SampleQueue};

/// Reason why a track can not be played.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum TrackError {
    #[error("the track could not be read")]
    Unreadable,

    #[error("the track does not exist")]
    NotFound,
}

/// Something that happened at the provider, or in the UI, to be applied by the
/// control thread.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Event {
    /// A login attempt completed. The error is a human-readable reason.
    LoggedIn(std::result::Result<(), String>),

    /// `count` tracks were inserted into the playlist at `position`.
    TracksAdded { playlist: PlaylistId, position: usize, count: usize },

    /// The tracks at the given indices (before removal) were removed.
    TracksRemoved { playlist: PlaylistId, indices: Vec<usize> },

    /// The tracks at the given indices were moved to `new_position`.
    TracksMoved { playlist: PlaylistId, indices: Vec<usize>, new_position: usize },

    /// The playlist has a new name, query the session for it.
    PlaylistRenamed(PlaylistId),

    PlaylistAdded(PlaylistId),
    PlaylistRemoved(PlaylistId),

    /// The playlist container is fully synchronized.
    ContainerLoaded { num_playlists: usize },

    /// Track metadata became available, tracks that were not playable may be now.
    MetadataUpdated,

    /// Another session started playing on the same account.
    PlayTokenLost,

    /// The user picked a playlist by name.
    SelectPlaylist(String),
}

/// The streaming capability, as seen from the control thread.
pub trait Session {
    /// Start logging in. The result arrives later as `Event::LoggedIn`.
    fn login(&mut self, username: &str, password: &str);

    /// Do pending provider work, return how long until it wants to run again.
    ///
    /// A zero duration means there is more work to do right away.
    fn process_events(&mut self) -> Duration;

    /// Return the playlists in the container, in container order.
    fn playlists(&self) -> Vec<PlaylistId>;

    fn playlist_name(&self, playlist: PlaylistId) -> Option<String>;

    fn num_tracks(&self, playlist: PlaylistId) -> usize;

    /// Return the track at the given index, if the index is in bounds.
    fn track(&self, playlist: PlaylistId, index: usize) -> Option<TrackId>;

    /// Return why the track can not be played, if it can not be played.
    fn track_error(&self, track: TrackId) -> Option<TrackError>;

    fn track_name(&self, track: TrackId) -> String;

    /// Load the track into the player, replacing whatever was loaded.
    fn load(&mut self, track: TrackId) -> Result<()>;

    /// Start or pause delivery of the loaded track.
    fn play(&mut self, play: bool);

    /// Stop delivery and forget the loaded track.
    fn unload(&mut self);

    /// Remove the tracks at the given indices from the playlist.
    ///
    /// The removal is reported back through `Event::TracksRemoved`.
    fn remove_tracks(&mut self, playlist: PlaylistId, indices: &[usize]);
}

/// The entry points the provider calls from its own threads.
pub struct SessionCallbacks {
    queue: Arc<SampleQueue>,
    notifier: Arc<Notifier>,
}

impl SessionCallbacks {
    pub fn new(queue: Arc<SampleQueue>, notifier: Arc<Notifier>) -> SessionCallbacks {
        SessionCallbacks {
            queue: queue,
            notifier: notifier,
        }
    }

    /// The provider has work to do, ask the control thread to process events.
    pub fn notify_main_thread(&self) {
        self.notifier.signal_events_pending();
    }

    /// Offer decoded samples for playback.
    ///
    /// Returns the number of frames consumed: either all of them, or zero when
    /// the queue is full. In the latter case the provider should offer the
    /// same samples again later.
    pub fn music_delivery(&self, format: AudioFormat, samples: &[i16]) -> usize {
        if format.channels == 0 {
            return 0
        }

        let num_frames = samples.len() / format.channels as usize;

        // An empty delivery signals a discontinuity, there is nothing to queue.
        if num_frames == 0 {
            return 0
        }

        let chunk = PcmChunk::new(format, samples[..num_frames * format.channels as usize].to_vec());
        if self.queue.enqueue(chunk) {
            num_frames
        } else {
            0
        }
    }

    /// The provider delivered the last samples of the loaded track.
    pub fn end_of_track(&self) {
        self.notifier.signal_track_ended();
    }

    pub fn metadata_updated(&self) {
        self.notifier.push_event(Event::MetadataUpdated);
    }

    pub fn play_token_lost(&self) {
        self.notifier.push_event(Event::PlayTokenLost);
    }

    /// Post a playlist, container, or login event.
    pub fn post(&self, event: Event) {
        self.notifier.push_event(event);
    }
}


#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{Event, SessionCallbacks};
    use crate::notify::Notifier;
    use crate::prim::AudioFormat;
    use crate::sample_queue::SampleQueue;

    fn callbacks() -> (Arc<SampleQueue>, Arc<Notifier>, SessionCallbacks) {
        let queue = Arc::new(SampleQueue::new());
        let notifier = Arc::new(Notifier::new());
        let callbacks = SessionCallbacks::new(queue.clone(), notifier.clone());
        (queue, notifier, callbacks)
    }

    #[test]
    fn music_delivery_reports_zero_frames_when_queue_is_full() {
        let (queue, _notifier, callbacks) = callbacks();
        let format = AudioFormat::new(1_000, 2);
        let samples = vec![0_i16; 2 * 1_001];

        assert_eq!(callbacks.music_delivery(format, &samples), 1_001);
        assert_eq!(callbacks.music_delivery(format, &samples), 0);
        assert_eq!(queue.qlen(), 1_001);
    }

    #[test]
    fn music_delivery_ignores_discontinuities() {
        let (queue, _notifier, callbacks) = callbacks();
        assert_eq!(callbacks.music_delivery(AudioFormat::new(44_100, 2), &[]), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn music_delivery_rejects_formats_without_channels() {
        let (queue, _notifier, callbacks) = callbacks();
        assert_eq!(callbacks.music_delivery(AudioFormat::new(44_100, 0), &[1, 2, 3]), 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn callbacks_reach_the_notifier() {
        let (_queue, notifier, callbacks) = callbacks();
        callbacks.end_of_track();
        callbacks.play_token_lost();
        let wake = notifier.wait(std::time::Duration::from_secs(0));
        assert!(wake.track_ended);
        assert!(wake.events_pending);
        assert_eq!(notifier.take_events(), vec![Event::PlayTokenLost]);
    }
}
