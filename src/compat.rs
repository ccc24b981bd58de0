// src/compat.rs  —  Process-global singleton façade
//
// A thin forwarding layer for callers written against the old free-function
// API: one implicit generator, one implicit key, one implicit receiver.
// Every function reads through the guarded accessor and reports
// invalid-state when the singleton has not been created — there is no
// per-call initialization.

use std::sync::{Arc, Mutex};

use crate::audio::SoundSystem;
use crate::errors::{Error, Result};
use crate::generator::Generator;
use crate::keyer::{Key, KeyValue};
use crate::receiver::Receiver;

struct LegacyCore {
    generator: Generator,
    key: Arc<Key>,
    receiver: Receiver,
    /// Remembered for the historical inter-word-space poll behavior.
    last_polled: Option<char>,
}

static CORE: Mutex<Option<LegacyCore>> = Mutex::new(None);

fn with_core<T>(f: impl FnOnce(&mut LegacyCore) -> Result<T>) -> Result<T> {
    let mut guard = CORE.lock().unwrap();
    match guard.as_mut() {
        Some(core) => f(core),
        None => Err(Error::InvalidState(
            "no implicit generator; call generator_new first",
        )),
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// Create the implicit generator (with its key and receiver).
pub fn generator_new(sound_system: SoundSystem, device: Option<&str>) -> Result<()> {
    let mut guard = CORE.lock().unwrap();
    if guard.is_some() {
        return Err(Error::InvalidState("implicit generator already exists"));
    }
    let generator = Generator::new(sound_system, device)?;
    let key = Key::new();
    generator.attach_key(&key);
    *guard = Some(LegacyCore {
        generator,
        key,
        receiver: Receiver::new(),
        last_polled: None,
    });
    Ok(())
}

/// Tear the implicit generator down (stops it and closes the sink).
pub fn generator_delete() -> Result<()> {
    let mut guard = CORE.lock().unwrap();
    match guard.take() {
        Some(core) => {
            core.generator.detach_key();
            drop(core);
            Ok(())
        }
        None => Err(Error::InvalidState("no implicit generator to delete")),
    }
}

pub fn generator_start() -> Result<()> {
    with_core(|core| core.generator.start())
}

pub fn generator_stop() -> Result<()> {
    with_core(|core| core.generator.stop())
}

// ── Send side ─────────────────────────────────────────────────────────────────

pub fn send_character(c: char) -> Result<()> {
    with_core(|core| core.generator.enqueue_character(c))
}

pub fn send_string(s: &str) -> Result<()> {
    with_core(|core| core.generator.enqueue_string(s))
}

pub fn set_send_speed(wpm: u32) -> Result<()> {
    with_core(|core| core.generator.set_speed(wpm))
}

pub fn get_send_speed() -> Result<u32> {
    with_core(|core| Ok(core.generator.speed()))
}

pub fn set_frequency(hz: u32) -> Result<()> {
    with_core(|core| core.generator.set_frequency(hz))
}

pub fn set_volume(percent: u32) -> Result<()> {
    with_core(|core| core.generator.set_volume(percent))
}

pub fn set_gap(gap: u32) -> Result<()> {
    with_core(|core| core.generator.set_gap(gap))
}

pub fn set_weighting(percent: u32) -> Result<()> {
    with_core(|core| core.generator.set_weighting(percent))
}

/// Block until the implicit generator's queue drains.  The façade is meant
/// for single-threaded callers; the singleton stays locked for the wait.
pub fn wait_for_tone_queue() -> Result<()> {
    with_core(|core| core.generator.wait_for_tone_queue())
}

// ── Key side ──────────────────────────────────────────────────────────────────

pub fn notify_keyer_paddle_event(dot_paddle: bool, dash_paddle: bool) -> Result<()> {
    with_core(|core| core.key.notify_paddle_event(dot_paddle, dash_paddle))
}

pub fn notify_straight_key_event(value: KeyValue) -> Result<()> {
    with_core(|core| core.key.notify_straight_key_event(value))
}

pub fn get_keyer_paddles() -> Result<(bool, bool)> {
    with_core(|core| Ok(core.key.paddles()))
}

// ── Receive side ──────────────────────────────────────────────────────────────

pub fn set_receive_speed(wpm: u32) -> Result<()> {
    with_core(|core| core.receiver.set_speed(wpm))
}

pub fn set_receive_tolerance(percent: u32) -> Result<()> {
    with_core(|core| core.receiver.set_tolerance(percent))
}

pub fn set_adaptive_receive(adaptive: bool) -> Result<()> {
    with_core(|core| {
        core.receiver.set_adaptive(adaptive);
        Ok(())
    })
}

pub fn get_receive_speed() -> Result<u32> {
    with_core(|core| Ok(core.receiver.speed()))
}

pub fn notify_receive_key_event(timestamp: u64, is_down: bool) -> Result<()> {
    with_core(|core| core.receiver.notify_key_event(timestamp, is_down))
}

/// Poll for a received character.
///
/// Historical behavior, kept for old callers only: a poll that lands in the
/// inter-word space repeats the *last polled character* with the word flag
/// set, rather than reporting the space itself the way
/// [`Receiver::poll_character`] does.
pub fn receive_character(timestamp: u64) -> Result<(char, bool)> {
    with_core(|core| match core.receiver.poll_character(timestamp) {
        Ok(polled) if polled.character == ' ' && polled.is_end_of_word => {
            Ok((core.last_polled.unwrap_or(' '), true))
        }
        Ok(polled) => {
            core.last_polled = Some(polled.character);
            Ok((polled.character, polled.is_end_of_word))
        }
        Err(e) => Err(e),
    })
}

/// Poll for the received dot/dash representation.
pub fn receive_representation(timestamp: u64) -> Result<String> {
    with_core(|core| {
        core.receiver
            .poll_representation(timestamp)
            .map(|polled| polled.representation)
    })
}
