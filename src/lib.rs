// Jukebox -- Playlist-driven music playback daemon
// Copyright 2020 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! A jukebox that plays one named playlist from a streaming provider.
//!
//! The provider delivers samples from its own thread into a bounded
//! [`SampleQueue`](sample_queue::SampleQueue), which a playback thread drains
//! into the audio device. Everything else happens on the control thread: the
//! [`ControlLoop`](control::ControlLoop) waits on a
//! [`Notifier`](notify::Notifier), drives the provider, and applies playlist
//! events to the [`Jukebox`](jukebox::Jukebox) state machine.

pub mod config;
pub mod control;
pub mod error;
pub mod history;
pub mod jukebox;
pub mod local;
pub mod notify;
pub mod playback;
pub mod prim;
pub mod sample_queue;
pub mod session;
pub mod ui;

pub use crate::control::ControlLoop;
pub use crate::jukebox::Jukebox;
pub use crate::local::LocalSession;
pub use crate::notify::Notifier;
pub use crate::sample_queue::{PcmChunk, SampleQueue};
pub use crate::session::{Event, Session, SessionCallbacks};
