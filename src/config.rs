// Jukebox -- Playlist-driven music playback daemon
// Copyright 2020 Ruud van Asseldonk

// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

// Configuration module inspired by the one in Tako (github.com/ruuda/tako),
// which is copyright 2018 Arian van Putten, Ruud van Asseldonk, Tako Marks,
// and licensed under the Apache 2.0 License.

//! Configuration file parser.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub library_path: PathBuf,
    pub audio_device: String,
    /// Name of the playlist to play, matched ignoring ASCII case.
    pub playlist: String,
    pub delete_after_play: bool,
    pub rescan_interval_seconds: u64,
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "  library_path            = {}\n", self.library_path.to_string_lossy())?;
        write!(f, "  audio_device            = {}\n", self.audio_device)?;
        write!(f, "  playlist                = {}\n", self.playlist)?;
        write!(f, "  delete_after_play       = {}\n", self.delete_after_play)?;
        write!(f, "  rescan_interval_seconds = {}", self.rescan_interval_seconds)?;

        Ok(())
    }
}

impl Config {
    pub fn parse<I, S>(lines: I) -> Result<Config>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut library_path = None;
        let mut audio_device = None;
        let mut playlist = None;
        let mut delete_after_play = false;
        let mut rescan_interval_seconds = 10;

        for (lineno, line_raw) in lines.into_iter().enumerate() {
            let line = line_raw.as_ref();

            // Allow empty lines in the config file.
            if line.trim().is_empty() {
                continue
            }

            // Skip lines starting with '#' to allow comments.
            if line.starts_with('#') {
                continue
            }

            if let Some(n) = line.find('=') {
                let key = line[..n].trim();
                let value = line[n + 1..].trim();
                match key {
                    "library_path" => library_path = Some(PathBuf::from(value)),
                    "audio_device" => audio_device = Some(String::from(value)),
                    "playlist" => {
                        if value.is_empty() {
                            let msg = "The playlist name must not be empty.";
                            return Err(Error::InvalidConfig(lineno, msg))
                        }
                        playlist = Some(String::from(value));
                    }
                    "delete_after_play" => match value {
                        "true" => delete_after_play = true,
                        "false" => delete_after_play = false,
                        _ => {
                            let msg = "Invalid delete_after_play value, must be 'true' or 'false'.";
                            return Err(Error::InvalidConfig(lineno, msg))
                        }
                    }
                    "rescan_interval_seconds" => match u64::from_str(value) {
                        Ok(seconds) if seconds > 0 => rescan_interval_seconds = seconds,
                        _ => {
                            let msg = "Invalid rescan_interval_seconds value, must be a positive integer.";
                            return Err(Error::InvalidConfig(lineno, msg))
                        }
                    }
                    _ => {
                        let msg = "Unknown key. See the configuration docs for supported keys.";
                        return Err(Error::InvalidConfig(lineno, msg))
                    }
                }
            } else {
                let msg = "Line contains no '='. \
                    Expected key-value pair like 'playlist = HAI'.";
                return Err(Error::InvalidConfig(lineno, msg))
            }
        }

        let config = Config {
            library_path: match library_path {
                Some(p) => p,
                None => return Err(Error::IncompleteConfig(
                    "Library path not set. Expected 'library_path ='-line."
                )),
            },
            audio_device: match audio_device {
                Some(d) => d,
                None => String::from("default"),
            },
            playlist: match playlist {
                Some(name) => name,
                None => String::from("HAI"),
            },
            delete_after_play: delete_after_play,
            rescan_interval_seconds: rescan_interval_seconds,
        };

        Ok(config)
    }

    /// Read and parse the config file at the given path.
    pub fn load(path: &Path) -> Result<Config> {
        let contents = fs::read_to_string(path)?;
        Config::parse(contents.lines())
    }

    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_seconds)
    }
}
