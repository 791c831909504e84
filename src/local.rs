// Jukebox -- Playlist-driven music playback daemon
// Copyright 2020 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! A streaming provider backed by a directory of FLAC files.
//!
//! Every directory directly under the library root is a playlist, named after
//! the directory. The `.flac` files in it, ordered by file name, are its
//! tracks. The tree is rescanned periodically, and differences are reported as
//! playlist events, so editing the directories edits the playlists.
//!
//! Decoding happens on a separate decoder thread, which pushes samples into
//! the sample queue through the session callbacks, and which backs off when
//! the queue is full.

use std::collections::{HashMap, HashSet};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::prim::{AudioFormat, PlaylistId, TrackId};
use crate::session::{Event, Session, SessionCallbacks, TrackError};

type FlacReader = claxon::FlacReader<fs::File>;

/// How long to wait before offering samples again after the queue was full.
const BACKPRESSURE_RETRY: Duration = Duration::from_millis(50);

/// How long until `process_events` wants to run again before login completes.
const IDLE_TIMEOUT: Duration = Duration::from_secs(1);

/// A playlist directory as found on disk.
struct ScannedPlaylist {
    dir_name: String,
    paths: Vec<PathBuf>,
}

struct LocalPlaylist {
    id: PlaylistId,
    /// The directory name, which is also the playlist name.
    name: String,
    tracks: Vec<TrackId>,
}

/// Modification time and size of a file, to notice when it changed.
type FileStamp = (SystemTime, u64);

struct LocalTrack {
    path: PathBuf,
    name: String,
    error: Option<TrackError>,
    stamp: Option<FileStamp>,
}

fn file_stamp(path: &Path) -> Option<FileStamp> {
    let metadata = fs::metadata(path).ok()?;
    Some((metadata.modified().ok()?, metadata.len()))
}

/// Return the entries directly inside `dir`, ordered by file name.
fn list_dir(dir: &Path) -> io::Result<Vec<walkdir::DirEntry>> {
    let wd = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by(|a, b| a.file_name().cmp(b.file_name()));

    let mut entries = Vec::new();
    for entry in wd {
        entries.push(entry?);
    }
    Ok(entries)
}

/// Enumerate playlist directories and their flac files.
fn scan_library(root: &Path) -> io::Result<Vec<ScannedPlaylist>> {
    let flac_ext = OsStr::new("flac");
    let mut playlists = Vec::new();

    for dir in list_dir(root)? {
        if !dir.file_type().is_dir() {
            continue
        }
        let paths = list_dir(dir.path())?
            .into_iter()
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| p.extension() == Some(flac_ext))
            .collect();
        playlists.push(ScannedPlaylist {
            dir_name: dir.file_name().to_string_lossy().into_owned(),
            paths: paths,
        });
    }

    Ok(playlists)
}

/// Read the title of the track, and find out whether we can play it at all.
fn read_track_info(path: &Path) -> (String, Option<TrackError>) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    let opts = claxon::FlacReaderOptions {
        metadata_only: true,
        read_vorbis_comment: true,
    };
    match claxon::FlacReader::open_ext(path, opts) {
        Ok(reader) => {
            let name = match reader.get_tag("TITLE").next() {
                Some(title) => title.to_string(),
                None => stem,
            };
            (name, None)
        }
        Err(err) => {
            warn!("Can not read {:?}: {}", path, err);
            (stem, Some(TrackError::Unreadable))
        }
    }
}

/// Convert a sample of the given bit depth to 16 bits.
fn to_i16(sample: i32, bits_per_sample: u32) -> i16 {
    if bits_per_sample >= 16 {
        (sample >> (bits_per_sample - 16)) as i16
    } else {
        (sample << (16 - bits_per_sample)) as i16
    }
}

/// A task for the decoder thread.
enum DecodeCommand {
    /// Prepare to decode the opened file, paused.
    Load(Decoding),
    /// Resume or pause delivery.
    Play(bool),
    /// Stop decoding and close the file.
    Unload,
}

/// A track that is being decoded.
struct Decoding {
    reader: FlacReader,
    format: AudioFormat,
    bits_per_sample: u32,
    buffer: Vec<i32>,

    /// Decoded samples that the queue did not accept yet.
    pending: Option<Vec<i16>>,
}

impl Decoding {
    fn open(path: &Path) -> Result<Decoding> {
        let reader = FlacReader::open(path)?;
        let streaminfo = reader.streaminfo();
        let format = AudioFormat::new(streaminfo.sample_rate, streaminfo.channels);
        Ok(Decoding {
            format: format,
            bits_per_sample: streaminfo.bits_per_sample,
            buffer: Vec::with_capacity(streaminfo.max_block_size as usize * streaminfo.channels as usize),
            reader: reader,
            pending: None,
        })
    }

    /// Decode the next frame into interleaved 16-bit samples.
    fn decode_next(&mut self) -> Result<Option<Vec<i16>>> {
        let buffer = mem::replace(&mut self.buffer, Vec::new());
        let block = match self.reader.blocks().read_next_or_eof(buffer)? {
            Some(b) => b,
            None => return Ok(None),
        };

        let n_channels = block.channels();
        let n_frames = block.duration();
        let mut out = Vec::with_capacity((n_channels * n_frames) as usize);
        for i in 0..n_frames {
            for ch in 0..n_channels {
                out.push(to_i16(block.sample(ch, i), self.bits_per_sample));
            }
        }

        self.buffer = block.into_buffer();
        Ok(Some(out))
    }
}

#[derive(Debug, Eq, PartialEq)]
enum Step {
    Delivered,
    QueueFull,
    EndOfTrack,
}

/// Decode or re-offer one chunk of samples.
fn step(decoding: &mut Decoding, callbacks: &SessionCallbacks) -> Step {
    if decoding.pending.is_none() {
        match decoding.decode_next() {
            Ok(Some(samples)) => decoding.pending = Some(samples),
            Ok(None) => return Step::EndOfTrack,
            Err(err) => {
                warn!("Decode failed, skipping the rest of the track: {}", err);
                return Step::EndOfTrack
            }
        }
    }

    let accepted = match decoding.pending.as_ref() {
        Some(samples) if !samples.is_empty() => callbacks.music_delivery(decoding.format, samples),
        _ => 1,
    };

    if accepted == 0 {
        Step::QueueFull
    } else {
        decoding.pending = None;
        Step::Delivered
    }
}

fn apply_command(command: DecodeCommand, decoding: &mut Option<Decoding>, playing: &mut bool) {
    match command {
        DecodeCommand::Load(d) => {
            debug!("Decoding {}.", d.format);
            *playing = false;
            *decoding = Some(d);
        }
        DecodeCommand::Play(play) => *playing = play,
        DecodeCommand::Unload => {
            *playing = false;
            *decoding = None;
        }
    }
}

/// Main for the decoder thread.
///
/// Blocks on the command channel while there is nothing to decode. Returns
/// when the session, which owns the sender, is dropped.
fn decode_main(commands: Receiver<DecodeCommand>, callbacks: &SessionCallbacks) {
    let mut decoding: Option<Decoding> = None;
    let mut playing = false;

    loop {
        let command = if playing && decoding.is_some() {
            match commands.try_recv() {
                Ok(c) => Some(c),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => return,
            }
        } else {
            match commands.recv() {
                Ok(c) => Some(c),
                Err(..) => return,
            }
        };

        if let Some(c) = command {
            apply_command(c, &mut decoding, &mut playing);
            continue
        }

        let result = match decoding.as_mut() {
            Some(d) => step(d, callbacks),
            None => continue,
        };

        match result {
            Step::Delivered => {}
            Step::EndOfTrack => {
                decoding = None;
                callbacks.end_of_track();
            }
            Step::QueueFull => match commands.recv_timeout(BACKPRESSURE_RETRY) {
                Ok(c) => apply_command(c, &mut decoding, &mut playing),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return,
            },
        }
    }
}

pub struct LocalSession {
    library_path: PathBuf,
    rescan_interval: Duration,
    callbacks: Arc<SessionCallbacks>,
    decoder: Sender<DecodeCommand>,

    /// Username of a login that `process_events` should complete.
    pending_login: Option<String>,
    logged_in: bool,
    next_rescan: Instant,

    playlists: Vec<LocalPlaylist>,
    tracks: HashMap<TrackId, LocalTrack>,
    track_ids: HashMap<PathBuf, TrackId>,

    /// Files removed through `remove_tracks`, which rescans should not re-add.
    removed: HashSet<PathBuf>,

    next_playlist_id: u32,
    next_track_id: u64,
}

impl LocalSession {
    pub fn new(
        library_path: PathBuf,
        rescan_interval: Duration,
        callbacks: Arc<SessionCallbacks>,
    ) -> Result<LocalSession> {
        let (sender, receiver) = channel();

        let callbacks_for_decode = callbacks.clone();
        thread::Builder::new()
            .name("decoder".into())
            .spawn(move || decode_main(receiver, &*callbacks_for_decode))?;

        let session = LocalSession {
            library_path: library_path,
            rescan_interval: rescan_interval,
            callbacks: callbacks,
            decoder: sender,
            pending_login: None,
            logged_in: false,
            next_rescan: Instant::now(),
            playlists: Vec::new(),
            tracks: HashMap::new(),
            track_ids: HashMap::new(),
            removed: HashSet::new(),
            next_playlist_id: 1,
            next_track_id: 1,
        };
        Ok(session)
    }

    fn send(&self, command: DecodeCommand) {
        // The decoder thread only exits when we drop the sender.
        if self.decoder.send(command).is_err() {
            warn!("Decoder thread is gone, dropping command.");
        }
    }

    fn get_playlist(&self, playlist: PlaylistId) -> Option<&LocalPlaylist> {
        self.playlists.iter().find(|p| p.id == playlist)
    }

    /// Return the id for the track at the path, and whether its name or
    /// error changed since the previous scan.
    ///
    /// Metadata is read for new paths, and read again for known paths that
    /// were unreadable or that changed on disk.
    fn refresh_track(&mut self, path: &Path) -> (TrackId, bool) {
        let stamp = file_stamp(path);

        if let Some(&id) = self.track_ids.get(path) {
            let mut changed = false;
            if let Some(track) = self.tracks.get_mut(&id) {
                if track.error.is_some() || track.stamp != stamp {
                    let (name, error) = read_track_info(path);
                    changed = name != track.name || error != track.error;
                    track.name = name;
                    track.error = error;
                    track.stamp = stamp;
                }
            }
            return (id, changed)
        }

        let id = TrackId(self.next_track_id);
        self.next_track_id += 1;

        let (name, error) = read_track_info(path);
        self.tracks.insert(id, LocalTrack {
            path: path.to_path_buf(),
            name: name,
            error: error,
            stamp: stamp,
        });
        self.track_ids.insert(path.to_path_buf(), id);

        (id, false)
    }

    /// Forget tracks that are no longer in any playlist.
    fn prune_tracks(&mut self) {
        let live: HashSet<TrackId> = self
            .playlists
            .iter()
            .flat_map(|p| p.tracks.iter().cloned())
            .collect();
        self.tracks.retain(|id, _| live.contains(id));
        self.track_ids.retain(|_, id| live.contains(id));
    }

    fn complete_login(&mut self, username: &str) {
        match scan_library(&self.library_path) {
            Ok(scan) => {
                info!("Logged in as {}, library at {:?}.", username, self.library_path);
                self.logged_in = true;
                self.callbacks.post(Event::LoggedIn(Ok(())));
                self.apply_scan(scan, false);
                self.callbacks.post(Event::ContainerLoaded { num_playlists: self.playlists.len() });
                self.next_rescan = Instant::now() + self.rescan_interval;
            }
            Err(err) => {
                let reason = format!("Can not read library at {:?}: {}", self.library_path, err);
                self.callbacks.post(Event::LoggedIn(Err(reason)));
            }
        }
    }

    fn rescan(&mut self) {
        match scan_library(&self.library_path) {
            Ok(scan) => self.apply_scan(scan, true),
            Err(err) => warn!("Failed to rescan library, keeping playlists: {}", err),
        }
    }

    /// Update the playlists to match the scan, and post what changed.
    ///
    /// Playlist additions are only announced when `announce_new` is set; on
    /// login the playlists are there from the start.
    fn apply_scan(&mut self, scan: Vec<ScannedPlaylist>, announce_new: bool) {
        let callbacks = self.callbacks.clone();
        let mut metadata_changed = false;

        let mut i = 0;
        while i < self.playlists.len() {
            if scan.iter().any(|s| s.dir_name == self.playlists[i].name) {
                i += 1;
            } else {
                let playlist = self.playlists.remove(i);
                callbacks.post(Event::PlaylistRemoved(playlist.id));
            }
        }

        for scanned in scan {
            let mut ids = Vec::with_capacity(scanned.paths.len());
            for path in scanned.paths.iter() {
                if !self.removed.contains(path) {
                    let (id, changed) = self.refresh_track(path);
                    metadata_changed |= changed;
                    ids.push(id);
                }
            }

            match self.playlists.iter().position(|p| p.name == scanned.dir_name) {
                None => {
                    let id = PlaylistId(self.next_playlist_id);
                    self.next_playlist_id += 1;
                    let count = ids.len();
                    self.playlists.push(LocalPlaylist {
                        id: id,
                        name: scanned.dir_name,
                        tracks: ids,
                    });
                    if announce_new {
                        callbacks.post(Event::PlaylistAdded(id));
                    }
                    if count > 0 {
                        callbacks.post(Event::TracksAdded { playlist: id, position: 0, count: count });
                    }
                }
                Some(i) => {
                    let playlist = &mut self.playlists[i];
                    let present: HashSet<TrackId> = ids.iter().cloned().collect();
                    let vanished: Vec<usize> = playlist
                        .tracks
                        .iter()
                        .enumerate()
                        .filter(|(_, t)| !present.contains(*t))
                        .map(|(i, _)| i)
                        .collect();
                    if !vanished.is_empty() {
                        playlist.tracks.retain(|t| present.contains(t));
                        callbacks.post(Event::TracksRemoved {
                            playlist: playlist.id,
                            indices: vanished,
                        });
                    }

                    let position = playlist.tracks.len();
                    let known: HashSet<TrackId> = playlist.tracks.iter().cloned().collect();
                    playlist.tracks.extend(ids.into_iter().filter(|t| !known.contains(t)));
                    let count = playlist.tracks.len() - position;
                    if count > 0 {
                        callbacks.post(Event::TracksAdded {
                            playlist: playlist.id,
                            position: position,
                            count: count,
                        });
                    }
                }
            }
        }

        self.prune_tracks();

        if metadata_changed {
            callbacks.metadata_updated();
        }
    }
}

impl Session for LocalSession {
    fn login(&mut self, username: &str, _password: &str) {
        self.pending_login = Some(username.to_string());
        self.callbacks.notify_main_thread();
    }

    fn process_events(&mut self) -> Duration {
        if let Some(username) = self.pending_login.take() {
            self.complete_login(&username);
        }

        if !self.logged_in {
            return IDLE_TIMEOUT
        }

        let now = Instant::now();
        if now >= self.next_rescan {
            self.rescan();
            self.next_rescan = now + self.rescan_interval;
        }

        // Never return zero, the control loop would poll us again right away.
        (self.next_rescan - now).max(Duration::from_millis(1))
    }

    fn playlists(&self) -> Vec<PlaylistId> {
        self.playlists.iter().map(|p| p.id).collect()
    }

    fn playlist_name(&self, playlist: PlaylistId) -> Option<String> {
        self.get_playlist(playlist).map(|p| p.name.clone())
    }

    fn num_tracks(&self, playlist: PlaylistId) -> usize {
        self.get_playlist(playlist).map(|p| p.tracks.len()).unwrap_or(0)
    }

    fn track(&self, playlist: PlaylistId, index: usize) -> Option<TrackId> {
        self.get_playlist(playlist)?.tracks.get(index).cloned()
    }

    fn track_error(&self, track: TrackId) -> Option<TrackError> {
        match self.tracks.get(&track) {
            Some(t) => t.error,
            None => Some(TrackError::NotFound),
        }
    }

    fn track_name(&self, track: TrackId) -> String {
        match self.tracks.get(&track) {
            Some(t) => t.name.clone(),
            None => track.to_string(),
        }
    }

    fn load(&mut self, track: TrackId) -> Result<()> {
        let entry = match self.tracks.get_mut(&track) {
            None => return Err(Error::TrackError(TrackError::NotFound)),
            Some(LocalTrack { error: Some(err), .. }) => return Err(Error::TrackError(*err)),
            Some(t) => t,
        };

        // Open here rather than on the decoder thread, so a file that can not
        // be opened fails the load instead of ending a track asynchronously.
        match Decoding::open(&entry.path) {
            Ok(decoding) => {
                self.send(DecodeCommand::Load(decoding));
                Ok(())
            }
            Err(err) => {
                warn!("Failed to open {:?} for decode: {}", entry.path, err);
                entry.error = Some(TrackError::Unreadable);
                Err(err)
            }
        }
    }

    fn play(&mut self, play: bool) {
        self.send(DecodeCommand::Play(play));
    }

    fn unload(&mut self) {
        self.send(DecodeCommand::Unload);
    }

    fn remove_tracks(&mut self, playlist: PlaylistId, indices: &[usize]) {
        let entry = match self.playlists.iter_mut().find(|p| p.id == playlist) {
            Some(p) => p,
            None => return,
        };

        let mut valid: Vec<usize> = indices
            .iter()
            .cloned()
            .filter(|&i| i < entry.tracks.len())
            .collect();
        valid.sort_unstable();
        valid.dedup();

        for &i in valid.iter().rev() {
            let track = entry.tracks.remove(i);
            if let Some(t) = self.tracks.get(&track) {
                self.removed.insert(t.path.clone());
            }
        }

        if !valid.is_empty() {
            self.callbacks.post(Event::TracksRemoved { playlist: playlist, indices: valid });
        }
    }
}
