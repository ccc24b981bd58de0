// src/audio/null.rs  —  Discard sink with real-time pacing

use super::{SinkCaps, SoundSink, ToneCue, DEFAULT_BUFFER_N_SAMPLES, SAMPLE_RATE_PREFERENCE};
use crate::clock;
use crate::errors::{Error, Result};

/// Accepts samples and throws them away, sleeping through each buffer so the
/// generator's back-pressure pacing still works without hardware.
pub struct NullSink {
    sample_rate: u32,
    open: bool,
}

impl Default for NullSink {
    fn default() -> Self {
        Self::new()
    }
}

impl NullSink {
    pub fn new() -> Self {
        Self {
            sample_rate: SAMPLE_RATE_PREFERENCE[0],
            open: false,
        }
    }

    pub fn probe(_device: Option<&str>) -> bool {
        true
    }
}

impl SoundSink for NullSink {
    fn name(&self) -> &'static str {
        "null"
    }

    fn open_and_configure(&mut self, _device: Option<&str>) -> Result<SinkCaps> {
        self.sample_rate = SAMPLE_RATE_PREFERENCE[0];
        self.open = true;
        Ok(SinkCaps {
            sample_rate: self.sample_rate,
            buffer_n_samples: DEFAULT_BUFFER_N_SAMPLES,
        })
    }

    fn write_buffer(&mut self, samples: &[i16], _cue: ToneCue) -> Result<()> {
        if !self.open {
            return Err(Error::InvalidState("null sink is not open"));
        }
        let usecs = samples.len() as u64 * 1_000_000 / u64::from(self.sample_rate);
        clock::sleep_usecs(usecs);
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_write_paces_in_real_time() {
        let mut sink = NullSink::new();
        let caps = sink.open_and_configure(None).unwrap();
        let samples = vec![0i16; caps.sample_rate as usize / 100]; // 10 ms
        let start = Instant::now();
        sink.write_buffer(&samples, ToneCue { frequency: 0, is_mark: false }).unwrap();
        assert!(start.elapsed().as_micros() >= 9_000);
    }

    #[test]
    fn test_write_requires_open() {
        let mut sink = NullSink::new();
        let err = sink.write_buffer(&[0; 4], ToneCue { frequency: 0, is_mark: false });
        assert!(matches!(err, Err(Error::InvalidState(_))));
    }
}
