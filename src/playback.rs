// Jukebox -- Playlist-driven music playback daemon
// Copyright 2020 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The playback thread, and the audio device it writes to.

use log::{error, info};

use crate::error::{Error, Result};
use crate::prim::AudioFormat;
use crate::sample_queue::{PcmChunk, SampleQueue};

/// Something that consumes interleaved 16-bit samples at playback speed.
pub trait AudioSink {
    /// Prepare the sink for samples of the given format.
    fn configure(&mut self, format: AudioFormat) -> Result<()>;

    /// Write the samples, blocking until the sink has accepted all of them.
    fn write(&mut self, samples: &[i16]) -> Result<()>;
}

/// An ALSA playback device.
pub struct AlsaSink {
    device: String,
    pcm: Option<alsa::PCM>,
    channels: usize,
}

impl AlsaSink {
    pub fn new(device: String) -> AlsaSink {
        AlsaSink {
            device: device,
            pcm: None,
            channels: 0,
        }
    }
}

fn open_device(device: &str, format: AudioFormat) -> Result<alsa::PCM> {
    let non_block = false;
    let pcm = alsa::PCM::new(device, alsa::Direction::Playback, non_block)?;

    {
        let hwp = alsa::pcm::HwParams::any(&pcm)?;
        hwp.set_channels(format.channels)?;
        hwp.set_rate(format.sample_rate_hz, alsa::ValueOr::Nearest)?;
        hwp.set_format(alsa::pcm::Format::s16())?;
        hwp.set_access(alsa::pcm::Access::RWInterleaved)?;
        pcm.hw_params(&hwp)?;
    }

    {
        let hwp = pcm.hw_params_current()?;
        let swp = pcm.sw_params_current()?;
        let buffer_len = hwp.get_buffer_size()?;
        let period_len = hwp.get_period_size()?;
        swp.set_start_threshold(buffer_len - period_len)?;
        swp.set_avail_min(period_len)?;
        pcm.sw_params(&swp)?;

        let actual_rate = hwp.get_rate()?;
        if actual_rate != format.sample_rate_hz {
            info!(
                "Device {} plays at {} Hz instead of the requested {} Hz.",
                device, actual_rate, format.sample_rate_hz,
            );
        }
    }

    Ok(pcm)
}

impl AudioSink for AlsaSink {
    fn configure(&mut self, format: AudioFormat) -> Result<()> {
        // Close the old device before we reopen it with new parameters.
        if let Some(old_pcm) = self.pcm.take() {
            let _ignored_result = old_pcm.drain();
        }
        self.pcm = Some(open_device(&self.device, format)?);
        self.channels = format.channels as usize;
        Ok(())
    }

    fn write(&mut self, samples: &[i16]) -> Result<()> {
        let pcm = self.pcm.as_ref().ok_or(Error::SinkNotConfigured)?;
        let io = pcm.io_i16()?;

        let mut offset = 0;
        while offset < samples.len() {
            match io.writei(&samples[offset..]) {
                Ok(n_frames) => offset += n_frames * self.channels,
                // On underrun, prepare the device again and retry.
                Err(err) => pcm.try_recover(err, true)?,
            }
        }

        Ok(())
    }
}

/// Write one chunk to the sink, reconfiguring the sink if its format changed.
pub fn play_chunk(
    sink: &mut dyn AudioSink,
    current_format: &mut Option<AudioFormat>,
    chunk: &PcmChunk,
) -> Result<()> {
    if *current_format != Some(chunk.format()) {
        info!("Configuring audio output for {}.", chunk.format());
        // Forget the old format first, so a failed configure is retried.
        *current_format = None;
        sink.configure(chunk.format())?;
        *current_format = Some(chunk.format());
    }
    sink.write(chunk.samples())
}

/// Main for the playback thread, which drains the sample queue into the sink.
///
/// The sink blocks at playback speed, which paces this loop. The thread runs
/// until the process exits.
pub fn main(queue: &SampleQueue, sink: &mut dyn AudioSink) -> ! {
    let mut current_format = None;
    loop {
        let chunk = queue.dequeue();
        if let Err(err) = play_chunk(sink, &mut current_format, &chunk) {
            error!("Failed to play {} ms of audio: {}", chunk.duration_ms(), err);
            current_format = None;
        }
    }
}
