// Jukebox -- Playlist-driven music playback daemon
// Copyright 2020 Ruud van Asseldonk
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// A copy of the License has been included in the root of the repository.

//! The queue of decoded samples between the provider and the playback thread.
//!
//! The provider pushes chunks from its callback context, the playback thread
//! pops them. The queue holds about one second of audio: once more than a
//! second is buffered, new chunks are rejected, and the provider is expected
//! to offer them again later. This is the only flow control there is.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::prim::AudioFormat;

/// A block of interleaved 16-bit samples, queued for playback.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PcmChunk {
    /// The sample rate and channel count of this chunk.
    format: AudioFormat,

    /// The samples, interleaved over all channels.
    samples: Box<[i16]>,
}

impl PcmChunk {
    pub fn new(format: AudioFormat, samples: Vec<i16>) -> PcmChunk {
        debug_assert!(format.channels > 0, "A chunk needs at least one channel.");
        debug_assert_eq!(
            samples.len() % format.channels as usize, 0,
            "Samples must contain whole frames.",
        );
        PcmChunk {
            format: format,
            samples: samples.into_boxed_slice(),
        }
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Return the number of frames, samples per channel, in this chunk.
    pub fn num_frames(&self) -> usize {
        self.samples.len() / self.format.channels as usize
    }

    /// Return the duration of the chunk in milliseconds.
    pub fn duration_ms(&self) -> usize {
        self.num_frames() * 1000 / self.format.sample_rate_hz as usize
    }
}

struct QueueState {
    chunks: VecDeque<PcmChunk>,

    /// Sum of `num_frames` over all chunks in `chunks`.
    qlen: usize,
}

/// Bounded FIFO of PCM chunks, shared between one producer and one consumer.
pub struct SampleQueue {
    state: Mutex<QueueState>,
    nonempty: Condvar,
}

impl SampleQueue {
    pub fn new() -> SampleQueue {
        SampleQueue {
            state: Mutex::new(QueueState {
                chunks: VecDeque::new(),
                qlen: 0,
            }),
            nonempty: Condvar::new(),
        }
    }

    /// Append the chunk, unless more than a second of audio is buffered.
    ///
    /// Returns whether the chunk was accepted. A rejected chunk is dropped;
    /// this is backpressure, not an error.
    pub fn enqueue(&self, chunk: PcmChunk) -> bool {
        let mut state = self.state.lock().unwrap();

        if state.qlen > chunk.format.sample_rate_hz as usize {
            return false
        }

        state.qlen += chunk.num_frames();
        state.chunks.push_back(chunk);
        self.nonempty.notify_one();

        true
    }

    /// Pop the oldest chunk, blocking while the queue is empty.
    pub fn dequeue(&self) -> PcmChunk {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(chunk) = state.chunks.pop_front() {
                state.qlen -= chunk.num_frames();
                return chunk
            }
            state = self.nonempty.wait(state).unwrap();
        }
    }

    /// Pop the oldest chunk if there is one, without blocking.
    pub fn try_dequeue(&self) -> Option<PcmChunk> {
        let mut state = self.state.lock().unwrap();
        let chunk = state.chunks.pop_front()?;
        state.qlen -= chunk.num_frames();
        Some(chunk)
    }

    /// Discard everything that is buffered.
    pub fn flush(&self) {
        let mut state = self.state.lock().unwrap();
        state.chunks.clear();
        state.qlen = 0;
    }

    /// Return the number of buffered frames.
    pub fn qlen(&self) -> usize {
        self.state.lock().unwrap().qlen
    }

    /// Return the number of buffered chunks.
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SampleQueue {
    fn default() -> SampleQueue {
        SampleQueue::new()
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;
    use std::thread;

    use super::{PcmChunk, SampleQueue};
    use crate::prim::AudioFormat;

    fn stereo_chunk(rate: u32, frames: usize, fill: i16) -> PcmChunk {
        PcmChunk::new(AudioFormat::new(rate, 2), vec![fill; frames * 2])
    }

    #[test]
    fn chunk_reports_frames_and_duration() {
        let chunk = stereo_chunk(44_100, 4410, 0);
        assert_eq!(chunk.num_frames(), 4410);
        assert_eq!(chunk.samples().len(), 8820);
        assert_eq!(chunk.duration_ms(), 100);
    }

    #[test]
    fn qlen_is_sum_of_accepted_frames() {
        let queue = SampleQueue::new();
        let mut expected = 0;
        for frames in [100, 2048, 7, 9000, 30_000, 1] {
            if queue.enqueue(stereo_chunk(44_100, frames, 0)) {
                expected += frames;
            }
            assert_eq!(queue.qlen(), expected);
        }
        queue.try_dequeue().unwrap();
        assert_eq!(queue.qlen(), expected - 100);
    }

    #[test]
    fn enqueue_accepts_at_one_second_and_rejects_above() {
        let queue = SampleQueue::new();

        // Exactly one second buffered, the next chunk is still accepted.
        assert!(queue.enqueue(stereo_chunk(8_000, 8_000, 0)));
        assert_eq!(queue.qlen(), 8_000);
        assert!(queue.enqueue(stereo_chunk(8_000, 1, 0)));
        assert_eq!(queue.qlen(), 8_001);

        // Now we are over one second, everything is rejected.
        assert!(!queue.enqueue(stereo_chunk(8_000, 1, 0)));
        assert_eq!(queue.qlen(), 8_001);
        assert_eq!(queue.len(), 2);

        // The limit is relative to the rate of the incoming chunk.
        assert!(queue.enqueue(stereo_chunk(48_000, 10, 0)));
    }

    #[test]
    fn flush_empties_the_queue_and_is_idempotent() {
        let queue = SampleQueue::new();
        for _ in 0..5 {
            queue.enqueue(stereo_chunk(44_100, 1000, 0));
        }
        queue.flush();
        assert_eq!(queue.qlen(), 0);
        assert!(queue.is_empty());
        queue.flush();
        assert_eq!(queue.qlen(), 0);
        assert!(queue.try_dequeue().is_none());

        // The queue is still usable after a flush.
        assert!(queue.enqueue(stereo_chunk(44_100, 10, 3)));
        assert_eq!(queue.qlen(), 10);
    }

    #[test]
    fn dequeue_returns_chunks_in_enqueue_order() {
        let queue = SampleQueue::new();
        queue.enqueue(stereo_chunk(44_100, 10, 1));
        queue.enqueue(stereo_chunk(44_100, 10, 2));
        assert_eq!(queue.dequeue().samples()[0], 1);
        queue.enqueue(stereo_chunk(44_100, 10, 3));
        assert_eq!(queue.dequeue().samples()[0], 2);
        assert_eq!(queue.dequeue().samples()[0], 3);
        assert_eq!(queue.qlen(), 0);
    }

    #[test]
    fn dequeue_blocks_until_producer_delivers() {
        let queue = Arc::new(SampleQueue::new());
        let queue_for_producer = queue.clone();

        let producer = thread::spawn(move || {
            for i in 0..100 {
                // The consumer keeps draining, so nothing gets rejected.
                while !queue_for_producer.enqueue(stereo_chunk(44_100, 441, i)) {
                    thread::yield_now();
                }
            }
        });

        for i in 0..100 {
            let chunk = queue.dequeue();
            assert_eq!(chunk.samples()[0], i);
        }

        producer.join().unwrap();
        assert_eq!(queue.qlen(), 0);
    }
}
