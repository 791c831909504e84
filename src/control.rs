// Jukebox -- Playlist-driven music playback daemon
// Copyright 2022 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The control loop, which runs on the main thread.
//!
//! The loop waits on the notifier, then handles a finished track, lets the
//! provider do its work, and applies the events that were posted in the
//! meantime. The session is only ever called from this thread.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::jukebox::Jukebox;
use crate::notify::Notifier;
use crate::session::{Event, Session};
use crate::ui::{PlaylistDirectory, RowSink};

pub struct ControlLoop<S: Session> {
    session: S,
    jukebox: Jukebox,
    notifier: Arc<Notifier>,
    directory: PlaylistDirectory,
    rows: Box<dyn RowSink + Send>,

    /// How long to wait for a signal, as last requested by the provider.
    next_timeout: Duration,
}

impl<S: Session> ControlLoop<S> {
    pub fn new(
        session: S,
        jukebox: Jukebox,
        notifier: Arc<Notifier>,
        rows: Box<dyn RowSink + Send>,
    ) -> ControlLoop<S> {
        ControlLoop {
            session: session,
            jukebox: jukebox,
            notifier: notifier,
            directory: PlaylistDirectory::new(),
            rows: rows,
            // Start by polling the provider right away.
            next_timeout: Duration::from_secs(0),
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn jukebox(&self) -> &Jukebox {
        &self.jukebox
    }

    pub fn next_timeout(&self) -> Duration {
        self.next_timeout
    }

    /// Run the loop until a fatal error occurs.
    pub fn run(mut self) -> Result<()> {
        loop {
            self.iterate()?;
        }
    }

    /// Wait for one wakeup, and handle everything that is due.
    pub fn iterate(&mut self) -> Result<()> {
        let wake = self.notifier.wait(self.next_timeout);

        if wake.track_ended {
            self.jukebox.on_track_ended(&mut self.session);
            self.notifier.clear_track_ended();
        }

        loop {
            let timeout = self.session.process_events();
            if !timeout.is_zero() {
                self.next_timeout = timeout;
                break
            }
        }

        for event in self.notifier.take_events() {
            self.dispatch(event)?;
        }

        Ok(())
    }

    fn dispatch(&mut self, event: Event) -> Result<()> {
        debug!("Dispatching {:?}", event);
        let session = &mut self.session;

        match event {
            Event::LoggedIn(Err(reason)) => return Err(Error::LoginFailed(reason)),
            Event::LoggedIn(Ok(())) => self.jukebox.on_logged_in(session),
            Event::TracksAdded { playlist, position: _, count } => {
                if let Some(name) = session.playlist_name(playlist) {
                    if self.directory.observe(playlist, &name) {
                        self.rows.add_row(&name, count);
                    }
                }
                self.jukebox.on_tracks_added(session, playlist, count);
            }
            Event::TracksRemoved { playlist, indices } => {
                self.jukebox.on_tracks_removed(session, playlist, &indices);
            }
            Event::TracksMoved { playlist, indices, new_position: _ } => {
                self.jukebox.on_tracks_moved(session, playlist, indices.len());
            }
            Event::PlaylistRenamed(playlist) => {
                if let Some(name) = session.playlist_name(playlist) {
                    self.directory.rename(playlist, &name);
                }
                self.jukebox.on_playlist_renamed(session, playlist);
            }
            Event::PlaylistAdded(playlist) => self.jukebox.on_playlist_added(session, playlist),
            Event::PlaylistRemoved(playlist) => {
                self.directory.remove(playlist);
                self.jukebox.on_playlist_removed(session, playlist);
            }
            Event::ContainerLoaded { num_playlists } => {
                info!("jukebox: Rootlist synchronized ({} playlists)", num_playlists);
            }
            Event::MetadataUpdated => self.jukebox.on_metadata_updated(session),
            Event::PlayTokenLost => self.jukebox.on_play_token_lost(session),
            Event::SelectPlaylist(name) => match self.directory.find_by_name(&name) {
                Some(playlist) => {
                    info!("Selected playlist \"{}\".", name);
                    self.jukebox.resolve(session, playlist);
                }
                None => warn!("No playlist named \"{}\".", name),
            },
        }

        Ok(())
    }
}
