// src/audio/cpal_backend.rs  —  cpal output sink (ALSA / PulseAudio / OSS /
// CoreAudio / WASAPI via the cpal host)
//
// The generator consumer pushes i16 buffers into a shared ring; the cpal
// callback drains it, duplicating the mono sample across channels and
// filling zeros on underrun.  write_buffer blocks while the ring is full,
// which is what paces the consumer.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};

use super::{negotiate_rate, SinkCaps, SoundSink, ToneCue, DEFAULT_BUFFER_N_SAMPLES};
use crate::errors::{Error, Result};

/// Ring headroom in buffers; keeps latency low while still absorbing
/// scheduling jitter between the consumer and the audio callback.
const RING_BUFFERS: usize = 16;

struct Shared {
    queue: Mutex<VecDeque<i16>>,
    cond: Condvar,
    capacity: usize,
}

pub struct CpalSink {
    shared: Arc<Shared>,
    _stream: Option<Stream>,
    sample_rate: u32,
}

// Stream is !Send on some platforms; the sink lives on the generator's
// consumer thread and the stream is never touched from anywhere else.
unsafe impl Send for CpalSink {}

impl Default for CpalSink {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalSink {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                queue: Mutex::new(VecDeque::new()),
                cond: Condvar::new(),
                capacity: DEFAULT_BUFFER_N_SAMPLES * RING_BUFFERS,
            }),
            _stream: None,
            sample_rate: 0,
        }
    }

    pub fn probe(device: Option<&str>) -> bool {
        let host = cpal::default_host();
        match device {
            None | Some("") => host.default_output_device().is_some(),
            Some(name) => host
                .output_devices()
                .map(|mut devs| {
                    devs.any(|d| d.name().map(|n| n.contains(name)).unwrap_or(false))
                })
                .unwrap_or(false),
        }
    }

    fn pick_device(device: Option<&str>) -> Result<cpal::Device> {
        let host = cpal::default_host();
        match device {
            None | Some("") => host
                .default_output_device()
                .ok_or_else(|| Error::BackendUnavailable("no default output device".into())),
            Some(name) => host
                .output_devices()
                .map_err(|e| Error::BackendUnavailable(format!("device enumeration: {e}")))?
                .find(|d| d.name().map(|n| n.contains(name)).unwrap_or(false))
                .ok_or_else(|| {
                    Error::BackendUnavailable(format!("no output device matching {name:?}"))
                }),
        }
    }

    /// Walk the preference list against the device's supported ranges; fall
    /// back to the device default config when nothing matches.
    fn pick_config(device: &cpal::Device) -> Result<cpal::SupportedStreamConfig> {
        if let Ok(ranges) = device.supported_output_configs() {
            let ranges: Vec<_> = ranges.collect();
            let in_range = |c: &cpal::SupportedStreamConfigRange, r: u32| {
                c.min_sample_rate().0 <= r && r <= c.max_sample_rate().0
            };
            if let Some(rate) = negotiate_rate(|r| ranges.iter().any(|c| in_range(c, r))) {
                let range = ranges.iter().find(|c| in_range(c, rate)).unwrap();
                return Ok(range.clone().with_sample_rate(cpal::SampleRate(rate)));
            }
        }
        device
            .default_output_config()
            .map_err(|e| Error::BackendUnavailable(format!("no output config: {e}")))
    }
}

fn build_stream<S>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    shared: Arc<Shared>,
) -> Result<Stream>
where
    S: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    device
        .build_output_stream(
            config,
            move |data: &mut [S], _: &cpal::OutputCallbackInfo| {
                let mut queue = shared.queue.lock().unwrap();
                for frame in data.chunks_mut(channels) {
                    // Zero-fill on underrun; the consumer's silence keep-alive
                    // makes this rare.
                    let sample = queue.pop_front().unwrap_or(0);
                    let value = S::from_sample(f32::from(sample) / 32_768.0);
                    for slot in frame.iter_mut() {
                        *slot = value;
                    }
                }
                shared.cond.notify_all();
            },
            |e| log::error!("audio stream error: {e}"),
            None,
        )
        .map_err(|e| Error::BackendUnavailable(format!("building output stream: {e}")))
}

impl SoundSink for CpalSink {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn open_and_configure(&mut self, device: Option<&str>) -> Result<SinkCaps> {
        let dev = Self::pick_device(device)?;
        let chosen = Self::pick_config(&dev)?;
        let sample_rate = chosen.sample_rate().0;
        let format = chosen.sample_format();
        let config: cpal::StreamConfig = chosen.into();

        let shared = Arc::clone(&self.shared);
        let stream = match format {
            SampleFormat::F32 => build_stream::<f32>(&dev, &config, shared)?,
            SampleFormat::I16 => build_stream::<i16>(&dev, &config, shared)?,
            SampleFormat::U16 => build_stream::<u16>(&dev, &config, shared)?,
            other => {
                return Err(Error::BackendUnavailable(format!(
                    "unsupported sample format {other:?}"
                )))
            }
        };
        stream
            .play()
            .map_err(|e| Error::BackendUnavailable(format!("starting stream: {e}")))?;

        self._stream = Some(stream);
        self.sample_rate = sample_rate;
        log::info!(
            "cpal sink open: {} Hz, {} channel(s), format {format:?}",
            sample_rate,
            config.channels
        );
        Ok(SinkCaps {
            sample_rate,
            buffer_n_samples: DEFAULT_BUFFER_N_SAMPLES,
        })
    }

    fn write_buffer(&mut self, samples: &[i16], _cue: ToneCue) -> Result<()> {
        if self._stream.is_none() {
            return Err(Error::InvalidState("cpal sink is not open"));
        }
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut queue = self.shared.queue.lock().unwrap();
        while queue.len() + samples.len() > self.shared.capacity {
            if Instant::now() >= deadline {
                return Err(Error::IoFailure("audio stream stalled".into()));
            }
            let (guard, _) = self
                .shared
                .cond
                .wait_timeout(queue, Duration::from_millis(100))
                .unwrap();
            queue = guard;
        }
        queue.extend(samples.iter().copied());
        Ok(())
    }

    fn close(&mut self) {
        self._stream = None;
        self.shared.queue.lock().unwrap().clear();
        self.shared.cond.notify_all();
    }
}
