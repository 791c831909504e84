// Jukebox -- Playlist-driven music playback daemon
// Copyright 2020 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;

use clap::Parser;
use log::{error, info, warn};

use jukebox::config::Config;
use jukebox::error::Error;
use jukebox::playback::{self, AlsaSink};
use jukebox::ui::{self, LogRowSink};
use jukebox::{ControlLoop, Jukebox, LocalSession, Notifier, SampleQueue, Session, SessionCallbacks};

#[derive(Parser, Debug)]
#[command(name = "jukebox")]
#[command(about = "Plays a named playlist, following edits to it as they happen")]
#[command(version)]
struct Args {
    /// Username to log in with.
    #[arg(short, long)]
    username: String,

    /// Password to log in with.
    #[arg(short, long)]
    password: String,

    /// Remove every track from the playlist after it played.
    #[arg(short, long)]
    delete_after_play: bool,

    /// Path to the configuration file.
    #[arg(short, long, default_value = "jukebox.conf")]
    config: PathBuf,
}

fn init_logging() {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Info);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        error!("panic in thread '{}': {}", thread_name, panic_info);
    }));
}

fn main() {
    init_logging();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let _ = err.print();
            // Help and version go to stdout, and are not failures.
            process::exit(if err.use_stderr() { 1 } else { 0 });
        }
    };

    let mut config = match Config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            error!("Failed to load {:?}: {}", args.config, err);
            process::exit(1);
        }
    };
    if args.delete_after_play {
        warn!("jukebox: Tracks will be deleted from the playlist after they played.");
        config.delete_after_play = true;
    }
    info!("Configuration:\n{}", config);

    let queue = Arc::new(SampleQueue::new());
    let notifier = Arc::new(Notifier::new());
    let callbacks = Arc::new(SessionCallbacks::new(queue.clone(), notifier.clone()));

    let queue_for_playback = queue.clone();
    let audio_device = config.audio_device.clone();
    let playback_thread = thread::Builder::new()
        .name("playback".into())
        .spawn(move || {
            let mut sink = AlsaSink::new(audio_device);
            playback::main(&queue_for_playback, &mut sink);
        });

    let notifier_for_ui = notifier.clone();
    let ui_thread = thread::Builder::new()
        .name("ui".into())
        .spawn(move || {
            let stdin = io::stdin();
            if let Err(err) = ui::read_selections(stdin.lock(), &notifier_for_ui) {
                warn!("Stopped reading playlist selections: {}", err);
            }
        });

    if let Err(err) = playback_thread.and(ui_thread) {
        error!("Failed to start threads: {}", err);
        process::exit(1);
    }

    let mut session = match LocalSession::new(
        config.library_path.clone(),
        config.rescan_interval(),
        callbacks,
    ) {
        Ok(session) => session,
        Err(err) => {
            error!("Failed to start the session: {}", err);
            process::exit(1);
        }
    };
    session.login(&args.username, &args.password);

    let jukebox = Jukebox::new(config.playlist.clone(), config.delete_after_play, queue);
    let control = ControlLoop::new(session, jukebox, notifier, Box::new(LogRowSink));

    match control.run() {
        Ok(()) => {}
        Err(Error::LoginFailed(reason)) => {
            error!("jukebox: Login failed: {}", reason);
            process::exit(2);
        }
        Err(err) => {
            error!("jukebox: {}", err);
            process::exit(1);
        }
    }
}
