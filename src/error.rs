// Jukebox -- Playlist-driven music playback daemon
// Copyright 2020 Ruud van Asseldonk

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

use std::io;
use std::result;

use thiserror::Error;

use crate::session::TrackError;

#[derive(Debug, Error)]
pub enum Error {
    /// Error in config file on a given line.
    #[error("Invalid config on line {line}: {1}", line = .0 + 1)]
    InvalidConfig(usize, &'static str),

    /// A key is missing in the config.
    #[error("Incomplete config: {0}")]
    IncompleteConfig(&'static str),

    /// IO error.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// The audio device rejected an operation.
    #[error("Audio device error: {0}")]
    AudioError(#[from] alsa::Error),

    /// A FLAC stream could not be read.
    #[error("Decode error: {0}")]
    DecodeError(#[from] claxon::Error),

    /// The session could not log in. This is the only fatal error.
    #[error("Login failed: {0}")]
    LoginFailed(String),

    /// The track can not be loaded.
    #[error("Track can not be played: {0}")]
    TrackError(#[from] TrackError),

    /// Samples were written before the sink knew their format.
    #[error("Audio sink was written to before it was configured.")]
    SinkNotConfigured,
}

pub type Result<T> = result::Result<T, Error>;
