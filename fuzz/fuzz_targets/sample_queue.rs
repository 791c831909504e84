#![no_main]

use std::collections::VecDeque;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use jukebox::prim::AudioFormat;
use jukebox::sample_queue::{PcmChunk, SampleQueue};

#[derive(Arbitrary, Debug)]
enum Op {
    Enqueue {
        // Low rates keep the queue near its limit with small chunks.
        sample_rate_hz: u8,
        channels: u8,
        frames: u8,
    },
    Dequeue,
    Flush,
}

fuzz_target!(|ops: Vec<Op>| {
    let queue = SampleQueue::new();
    // The frame counts we expect to be in the queue, oldest first.
    let mut model: VecDeque<usize> = VecDeque::new();

    for op in ops {
        match op {
            Op::Enqueue { sample_rate_hz, channels, frames } => {
                let rate = sample_rate_hz as u32 + 1;
                let channels = (channels % 8) as usize + 1;
                let format = AudioFormat::new(rate, channels as u32);
                let samples = vec![0_i16; frames as usize * channels];
                let before: usize = model.iter().sum();
                let accepted = queue.enqueue(PcmChunk::new(format, samples));
                assert_eq!(accepted, before <= rate as usize);
                if accepted {
                    model.push_back(frames as usize);
                }
            }
            Op::Dequeue => {
                let chunk = queue.try_dequeue();
                assert_eq!(chunk.map(|c| c.num_frames()), model.pop_front());
            }
            Op::Flush => {
                queue.flush();
                model.clear();
            }
        }
        assert_eq!(queue.qlen(), model.iter().sum::<usize>());
        assert_eq!(queue.len(), model.len());
    }
});
