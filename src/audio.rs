use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::nes::NesError;

/// Host audio sink. The core produces mono i16 samples at the device rate;
/// they cross to the stream callback through a bounded queue that sheds the
/// oldest samples rather than letting latency build up.
pub struct AudioOutput {
    queue: Arc<Mutex<VecDeque<i16>>>,
    _stream: cpal::Stream,
    sample_rate: u32,
    max_queued_samples: usize,
}

impl AudioOutput {
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(NesError::SinkFailure("audio"))?;
        let supported = device
            .default_output_config()
            .context("failed to query default audio config")?;

        let stream_config: cpal::StreamConfig = supported.config();
        let sample_rate = stream_config.sample_rate.0;
        let channels = stream_config.channels as usize;
        let max_queued_samples = (sample_rate as usize) / 10;
        let queue = Arc::new(Mutex::new(VecDeque::<i16>::with_capacity(
            max_queued_samples,
        )));

        let err_fn = |err| {
            eprintln!("audio stream error: {err}");
        };

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                let queue = Arc::clone(&queue);
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [f32], _| fill_output_f32(data, channels, &queue),
                    err_fn,
                    None,
                )?
            }
            cpal::SampleFormat::I16 => {
                let queue = Arc::clone(&queue);
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [i16], _| fill_output_i16(data, channels, &queue),
                    err_fn,
                    None,
                )?
            }
            cpal::SampleFormat::U16 => {
                let queue = Arc::clone(&queue);
                device.build_output_stream(
                    &stream_config,
                    move |data: &mut [u16], _| fill_output_u16(data, channels, &queue),
                    err_fn,
                    None,
                )?
            }
            other => bail!("unsupported audio sample format: {other:?}"),
        };

        stream
            .play()
            .context("failed to start audio output stream")?;

        Ok(Self {
            queue,
            _stream: stream,
            sample_rate,
            max_queued_samples,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn push_samples(&self, samples: &[i16]) {
        if samples.is_empty() {
            return;
        }

        let Ok(mut queue) = self.queue.lock() else {
            return;
        };

        let future_len = queue.len().saturating_add(samples.len());
        if future_len > self.max_queued_samples {
            let drop_count = (future_len - self.max_queued_samples).min(queue.len());
            queue.drain(..drop_count);
        }

        queue.extend(samples.iter().copied());
    }

    pub fn queued_samples(&self) -> usize {
        self.queue.lock().map(|queue| queue.len()).unwrap_or(0)
    }
}

fn next_sample(queue: &Arc<Mutex<VecDeque<i16>>>) -> i16 {
    if let Ok(mut queue) = queue.lock() {
        queue.pop_front().unwrap_or(0)
    } else {
        0
    }
}

fn fill_output_f32(data: &mut [f32], channels: usize, queue: &Arc<Mutex<VecDeque<i16>>>) {
    for frame in data.chunks_mut(channels) {
        let sample = next_sample(queue) as f32 / 32_768.0;
        for out in frame {
            *out = sample;
        }
    }
}

fn fill_output_i16(data: &mut [i16], channels: usize, queue: &Arc<Mutex<VecDeque<i16>>>) {
    for frame in data.chunks_mut(channels) {
        let sample = next_sample(queue);
        for out in frame {
            *out = sample;
        }
    }
}

fn fill_output_u16(data: &mut [u16], channels: usize, queue: &Arc<Mutex<VecDeque<i16>>>) {
    for frame in data.chunks_mut(channels) {
        let sample = (next_sample(queue) as i32 + 32_768) as u16;
        for out in frame {
            *out = sample;
        }
    }
}
