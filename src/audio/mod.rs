// src/audio/mod.rs  —  SoundSink contract + backend selection

use crate::errors::{Error, Result};

#[cfg(feature = "audio-cpal")]
mod cpal_backend;
#[cfg(target_os = "linux")]
mod console;
mod null;
#[cfg(feature = "audio-wav")]
mod wav;

#[cfg(feature = "audio-cpal")]
pub use cpal_backend::CpalSink;
#[cfg(target_os = "linux")]
pub use console::ConsoleSink;
pub use null::NullSink;
#[cfg(feature = "audio-wav")]
pub use wav::WavSink;

/// Sample rates offered to a backend during negotiation, best first.
pub const SAMPLE_RATE_PREFERENCE: [u32; 7] =
    [48_000, 44_100, 32_000, 22_050, 16_000, 11_025, 8_000];

/// Default fragment size in frames; backends may negotiate otherwise and
/// report the effective value through [`SinkCaps`].
pub const DEFAULT_BUFFER_N_SAMPLES: usize = 1 << 7;

/// What a backend negotiated at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkCaps {
    /// Frames per second, signed-16-bit little-endian mono.
    pub sample_rate: u32,
    /// Frames the generator hands over per `write_buffer` call.
    pub buffer_n_samples: usize,
}

/// Side-channel describing the buffer being written, for backends that do
/// not consume PCM (the console beeper keys on/off at `frequency`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToneCue {
    pub frequency: u32,
    pub is_mark: bool,
}

/// A pluggable audio output.
///
/// Backends implement four operations: a probe (each type's `probe`
/// associated function, reachable through [`is_possible`]), open-and-
/// configure, a blocking buffer write, and close.  `write_buffer` returns
/// only when every sample has been accepted; a short write is a failure.
pub trait SoundSink: Send {
    fn name(&self) -> &'static str;

    /// Open the device (or the backend default when `device` is `None`),
    /// negotiate a sample rate from [`SAMPLE_RATE_PREFERENCE`], and report
    /// the effective configuration.
    fn open_and_configure(&mut self, device: Option<&str>) -> Result<SinkCaps>;

    /// Write one buffer of mono i16 samples; blocks until accepted.
    fn write_buffer(&mut self, samples: &[i16], cue: ToneCue) -> Result<()>;

    fn close(&mut self);
}

// ── Selection ─────────────────────────────────────────────────────────────────

/// Which backend a generator should open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SoundSystem {
    /// First available: cpal, then console, then null.
    Auto,
    #[cfg(feature = "audio-cpal")]
    Cpal,
    #[cfg(target_os = "linux")]
    Console,
    #[cfg(feature = "audio-wav")]
    Wav,
    /// Accepts and discards samples, pacing in real time.  Always available.
    Null,
}

/// Probe a backend without opening it.
pub fn is_possible(system: SoundSystem, device: Option<&str>) -> bool {
    match system {
        SoundSystem::Auto => true,
        #[cfg(feature = "audio-cpal")]
        SoundSystem::Cpal => CpalSink::probe(device),
        #[cfg(target_os = "linux")]
        SoundSystem::Console => ConsoleSink::probe(device),
        #[cfg(feature = "audio-wav")]
        SoundSystem::Wav => WavSink::probe(device),
        SoundSystem::Null => NullSink::probe(device),
    }
}

fn open_one(
    mut sink: Box<dyn SoundSink>,
    device: Option<&str>,
) -> Result<(Box<dyn SoundSink>, SinkCaps)> {
    let caps = sink.open_and_configure(device)?;
    log::info!(
        "sound sink {}: {} Hz, {} samples/buffer",
        sink.name(),
        caps.sample_rate,
        caps.buffer_n_samples
    );
    Ok((sink, caps))
}

/// Open the requested backend, or walk the fallback order for `Auto`.
pub fn open_sound_sink(
    system: SoundSystem,
    device: Option<&str>,
) -> Result<(Box<dyn SoundSink>, SinkCaps)> {
    match system {
        #[cfg(feature = "audio-cpal")]
        SoundSystem::Cpal => open_one(Box::new(CpalSink::new()), device),
        #[cfg(target_os = "linux")]
        SoundSystem::Console => open_one(Box::new(ConsoleSink::new()), device),
        #[cfg(feature = "audio-wav")]
        SoundSystem::Wav => open_one(Box::new(WavSink::new()), device),
        SoundSystem::Null => open_one(Box::new(NullSink::new()), device),
        SoundSystem::Auto => {
            #[cfg(feature = "audio-cpal")]
            match open_one(Box::new(CpalSink::new()), device) {
                Ok(opened) => return Ok(opened),
                Err(e) => log::warn!("cpal unavailable: {e} — falling back"),
            }
            #[cfg(target_os = "linux")]
            match open_one(Box::new(ConsoleSink::new()), device) {
                Ok(opened) => return Ok(opened),
                Err(e) => log::warn!("console unavailable: {e} — falling back"),
            }
            open_one(Box::new(NullSink::new()), None).map_err(|e| {
                Error::BackendUnavailable(format!("no usable sound sink: {e}"))
            })
        }
    }
}

/// Pick the first preferred rate a backend supports, given a predicate.
pub(crate) fn negotiate_rate(supports: impl Fn(u32) -> bool) -> Option<u32> {
    SAMPLE_RATE_PREFERENCE.iter().copied().find(|&r| supports(r))
}
