// Jukebox -- Playlist-driven music playback daemon
// Copyright 2022 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! Wakes the control thread when the provider or the UI need attention.
//!
//! The notifier carries two independent signals, and a mailbox of events:
//!
//! * *Events pending*: the provider wants `process_events` to be called, or
//!   an event was posted to the mailbox.
//! * *Track ended*: the loaded track has been delivered completely.
//!
//! Both are sticky flags rather than pulses. A signal raised while the control
//! thread is busy stays raised, and the next `wait` returns immediately. The
//! events-pending flag is consumed by `wait`, the track-ended flag only by
//! `clear_track_ended`, after the completion has been handled.
//!
//! That leaves a window: handling a completion loads the next track, and if
//! the provider finishes that track before `clear_track_ended` runs, its
//! signal is cleared along with the old one. Providers should therefore report
//! a track that can not be opened as a failed `load`, never as an immediate
//! end of track. Only a track that delivers no samples at all can still hit
//! the window.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::session::Event;

struct NotifyState {
    events_pending: bool,
    track_ended: bool,
    events: VecDeque<Event>,
}

impl NotifyState {
    fn is_signalled(&self) -> bool {
        self.events_pending || self.track_ended
    }
}

/// The flags as observed by one `wait`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Wake {
    pub events_pending: bool,
    pub track_ended: bool,
}

pub struct Notifier {
    state: Mutex<NotifyState>,
    wake: Condvar,
}

impl Notifier {
    pub fn new() -> Notifier {
        Notifier {
            state: Mutex::new(NotifyState {
                events_pending: false,
                track_ended: false,
                events: VecDeque::new(),
            }),
            wake: Condvar::new(),
        }
    }

    pub fn signal_events_pending(&self) {
        let mut state = self.state.lock().unwrap();
        state.events_pending = true;
        self.wake.notify_one();
    }

    pub fn signal_track_ended(&self) {
        let mut state = self.state.lock().unwrap();
        state.track_ended = true;
        self.wake.notify_one();
    }

    /// Post an event to the mailbox, and raise the events-pending flag.
    pub fn push_event(&self, event: Event) {
        let mut state = self.state.lock().unwrap();
        state.events.push_back(event);
        state.events_pending = true;
        self.wake.notify_one();
    }

    /// Block until a flag is raised, or until the timeout elapses.
    ///
    /// A zero timeout does not block at all. Returns both flags as they were on
    /// wakeup, and lowers the events-pending flag.
    pub fn wait(&self, timeout: Duration) -> Wake {
        let mut state = self.state.lock().unwrap();

        if !timeout.is_zero() {
            let (guard, _timeout_result) = self
                .wake
                .wait_timeout_while(state, timeout, |s| !s.is_signalled())
                .unwrap();
            state = guard;
        }

        let wake = Wake {
            events_pending: state.events_pending,
            track_ended: state.track_ended,
        };
        state.events_pending = false;
        wake
    }

    /// Take all events posted so far, in the order they were posted.
    pub fn take_events(&self) -> Vec<Event> {
        let mut state = self.state.lock().unwrap();
        state.events.drain(..).collect()
    }

    /// Lower the track-ended flag, once the completion has been handled.
    pub fn clear_track_ended(&self) {
        self.state.lock().unwrap().track_ended = false;
    }
}

impl Default for Notifier {
    fn default() -> Notifier {
        Notifier::new()
    }
}
