// src/audio/wav.rs  —  WAV-file sink (offline rendering)

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use super::{SinkCaps, SoundSink, ToneCue, DEFAULT_BUFFER_N_SAMPLES};
use crate::errors::{Error, Result};

const DEFAULT_DEVICE: &str = "cw-out.wav";
const WAV_SAMPLE_RATE: u32 = 44_100;

/// Renders the tone stream to a mono 16-bit WAV file.  The device string is
/// the output path.  Files take writes as fast as they come, so this sink
/// applies no pacing — playback timing lives in the sample count.
pub struct WavSink {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
}

impl Default for WavSink {
    fn default() -> Self {
        Self::new()
    }
}

impl WavSink {
    pub fn new() -> Self {
        Self { writer: None }
    }

    pub fn probe(device: Option<&str>) -> bool {
        let path = Path::new(device.unwrap_or(DEFAULT_DEVICE));
        match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.is_dir(),
            _ => true,
        }
    }
}

impl SoundSink for WavSink {
    fn name(&self) -> &'static str {
        "wav"
    }

    fn open_and_configure(&mut self, device: Option<&str>) -> Result<SinkCaps> {
        let path = device.unwrap_or(DEFAULT_DEVICE);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: WAV_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path, spec).map_err(|e| {
            Error::BackendUnavailable(format!("cannot create {path}: {e}"))
        })?;
        self.writer = Some(writer);
        Ok(SinkCaps {
            sample_rate: WAV_SAMPLE_RATE,
            buffer_n_samples: DEFAULT_BUFFER_N_SAMPLES,
        })
    }

    fn write_buffer(&mut self, samples: &[i16], _cue: ToneCue) -> Result<()> {
        let Some(writer) = &mut self.writer else {
            return Err(Error::InvalidState("wav sink is not open"));
        };
        for &s in samples {
            writer
                .write_sample(s)
                .map_err(|e| Error::IoFailure(format!("wav write: {e}")))?;
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                log::warn!("finalizing wav file failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_playable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let device = path.to_str().unwrap().to_string();

        let mut sink = WavSink::new();
        let caps = sink.open_and_configure(Some(&device)).unwrap();
        assert_eq!(caps.sample_rate, WAV_SAMPLE_RATE);

        let samples = vec![1000i16; caps.buffer_n_samples];
        sink.write_buffer(&samples, ToneCue { frequency: 700, is_mark: true }).unwrap();
        sink.close();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, WAV_SAMPLE_RATE);
        let read: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(read, samples);
    }

    #[test]
    fn test_write_requires_open() {
        let mut sink = WavSink::new();
        let err = sink.write_buffer(&[0; 4], ToneCue { frequency: 0, is_mark: false });
        assert!(matches!(err, Err(Error::InvalidState(_))));
    }
}
