// src/lib.rs  —  cw-engine crate root
//! Morse code signaling engine.
//!
//! Three cooperating pieces:
//!
//! * **Send** — [`Generator`] looks characters up in the [`morse`] tables,
//!   queues precisely timed tones on its bounded [`tonequeue::ToneQueue`],
//!   and a consumer thread synthesizes slope-shaped PCM into a pluggable
//!   [`audio::SoundSink`] (cpal, console beeper, WAV file, or null).
//! * **Key** — [`Key`] holds a straight-key line or runs the iambic paddle
//!   machine, feeding alternating dots and dashes into the same queue.
//! * **Receive** — [`Receiver`] classifies externally timestamped key
//!   transitions into marks and spaces, tracks the sender's speed, and
//!   hands back characters on poll.
//!
//! ```no_run
//! use cw_engine::{Generator, SoundSystem};
//!
//! let gen = Generator::new(SoundSystem::Auto, None)?;
//! gen.set_speed(20)?;
//! gen.start()?;
//! gen.enqueue_string("CQ CQ DE N0CALL K")?;
//! gen.wait_for_tone_queue()?;
//! gen.stop()?;
//! # Ok::<(), cw_engine::Error>(())
//! ```
//!
//! Old callers that expect one implicit generator per process can use the
//! free functions in [`compat`].

pub mod audio;
pub mod clock;
pub mod compat;
pub mod errors;
pub mod generator;
pub mod keyer;
pub mod morse;
pub mod receiver;
pub mod tonequeue;

pub use audio::{
    SinkCaps, SoundSink, SoundSystem, ToneCue, DEFAULT_BUFFER_N_SAMPLES, SAMPLE_RATE_PREFERENCE,
};
pub use errors::{Error, Result};
pub use generator::{Generator, DEFAULT_SLOPE_LEN};
pub use keyer::{Key, KeyValue};
pub use morse::timing::{
    DOT_CALIBRATION, FREQUENCY_MAX, FREQUENCY_MIN, GAP_MAX, GAP_MIN, SPEED_MAX, SPEED_MIN,
    TOLERANCE_MAX, TOLERANCE_MIN, VOLUME_MAX, VOLUME_MIN, WEIGHTING_MAX, WEIGHTING_MIN,
};
pub use morse::{SendParams, Timing, MAX_REPRESENTATION_LENGTH};
pub use receiver::{
    DurationStats, Polled, PolledRepresentation, Receiver, ReceiverStatistics,
};
pub use tonequeue::{QueueState, SlopeShape, Tone, ToneQueue, TONE_QUEUE_CAPACITY};
