// src/generator/mod.rs  —  Tone generator: queue producer API + consumer thread

mod synth;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::audio::{self, SinkCaps, SoundSink, SoundSystem, ToneCue};
use crate::errors::{Error, Result};
use crate::keyer::{Key, KeyValue};
use crate::morse;
use crate::morse::timing::SendParams;
use crate::tonequeue::{SlopeShape, Tone, ToneQueue};

/// Default rise/fall time applied to every mark.
pub const DEFAULT_SLOPE_LEN: u32 = 5_000; // µs

/// Chunk re-synthesized while a forever tone holds the queue head.
const FOREVER_QUANTUM: u32 = 20_000; // µs

/// How long the idle consumer naps between silence keep-alives.
const IDLE_NAP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Started,
    Stopped,
}

type KeyStateCallback = Box<dyn FnMut(KeyValue) + Send>;

pub(crate) struct GenInner {
    pub(crate) tq: ToneQueue,
    params: Mutex<SendParams>,
    slope: Mutex<(SlopeShape, u32)>,
    sink: Mutex<Option<Box<dyn SoundSink>>>,
    caps: Mutex<SinkCaps>,
    stop_flag: AtomicBool,
    key_callback: Mutex<Option<KeyStateCallback>>,
    key: Mutex<Option<Weak<Key>>>,
    lifecycle: Mutex<Lifecycle>,
}

/// The send side of the library: owns the tone queue, the sound sink and the
/// consumer thread that turns queued tones into PCM.
///
/// Create with a sound system, `start` to spawn the consumer, `stop` to join
/// it (both idempotent in their target state); dropping the generator stops
/// it and closes the sink.
pub struct Generator {
    inner: Arc<GenInner>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Generator {
    pub fn new(sound_system: SoundSystem, device: Option<&str>) -> Result<Self> {
        let (sink, caps) = audio::open_sound_sink(sound_system, device)?;
        Ok(Self {
            inner: Arc::new(GenInner {
                tq: ToneQueue::new(),
                params: Mutex::new(SendParams::new()),
                slope: Mutex::new((SlopeShape::RaisedCosine, DEFAULT_SLOPE_LEN)),
                sink: Mutex::new(Some(sink)),
                caps: Mutex::new(caps),
                stop_flag: AtomicBool::new(false),
                key_callback: Mutex::new(None),
                key: Mutex::new(None),
                lifecycle: Mutex::new(Lifecycle::Created),
            }),
            thread: Mutex::new(None),
        })
    }

    // ── Lifecycle ─────────────────────────────────────────────────────────────

    /// Spawn the consumer thread.
    pub fn start(&self) -> Result<()> {
        let mut lifecycle = self.inner.lifecycle.lock().unwrap();
        if *lifecycle == Lifecycle::Started {
            return Err(Error::InvalidState("generator already started"));
        }
        self.inner.stop_flag.store(false, Ordering::SeqCst);
        self.inner.tq.set_dead(false);

        let inner = Arc::clone(&self.inner);
        let handle = std::thread::Builder::new()
            .name("cw-generator".into())
            .spawn(move || consumer_loop(inner))
            .map_err(|e| Error::IoFailure(format!("spawning consumer: {e}")))?;
        *self.thread.lock().unwrap() = Some(handle);
        *lifecycle = Lifecycle::Started;
        Ok(())
    }

    /// Signal the consumer, drain the queue, and join.  Idempotent; blocked
    /// `wait_for_*` callers return [`Error::Cancelled`].
    pub fn stop(&self) -> Result<()> {
        {
            let lifecycle = self.inner.lifecycle.lock().unwrap();
            if *lifecycle != Lifecycle::Started {
                return Ok(());
            }
        }
        self.inner.stop_flag.store(true, Ordering::SeqCst);
        // Dead first, then flush: waiters woken by the flush must observe
        // the shutdown, not a clean drain.
        self.inner.tq.set_dead(true);
        self.inner.tq.flush();

        if let Some(handle) = self.thread.lock().unwrap().take() {
            if handle.join().is_err() {
                log::warn!("consumer thread panicked during stop");
            }
        }
        *self.inner.lifecycle.lock().unwrap() = Lifecycle::Stopped;

        // The keyer cannot advance without a consumer; park it and wake
        // anything blocked on it.
        if let Some(key) = self.attached_key() {
            key.reset();
        }
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        *self.inner.lifecycle.lock().unwrap() == Lifecycle::Started
    }

    // ── Parameters ────────────────────────────────────────────────────────────

    pub fn set_speed(&self, wpm: u32) -> Result<()> {
        self.inner.params.lock().unwrap().set_speed(wpm)
    }
    pub fn set_frequency(&self, hz: u32) -> Result<()> {
        self.inner.params.lock().unwrap().set_frequency(hz)
    }
    pub fn set_volume(&self, percent: u32) -> Result<()> {
        self.inner.params.lock().unwrap().set_volume(percent)
    }
    pub fn set_gap(&self, gap: u32) -> Result<()> {
        self.inner.params.lock().unwrap().set_gap(gap)
    }
    pub fn set_weighting(&self, percent: u32) -> Result<()> {
        self.inner.params.lock().unwrap().set_weighting(percent)
    }

    pub fn speed(&self) -> u32 {
        self.inner.params.lock().unwrap().speed()
    }
    pub fn frequency(&self) -> u32 {
        self.inner.params.lock().unwrap().frequency()
    }
    pub fn volume(&self) -> u32 {
        self.inner.params.lock().unwrap().volume()
    }
    pub fn gap(&self) -> u32 {
        self.inner.params.lock().unwrap().gap()
    }
    pub fn weighting(&self) -> u32 {
        self.inner.params.lock().unwrap().weighting()
    }

    pub fn set_slope(&self, shape: SlopeShape, slope_len: u32) -> Result<()> {
        if slope_len > 100_000 {
            return Err(Error::InvalidArgument("slope length above 100 ms"));
        }
        *self.inner.slope.lock().unwrap() = (shape, slope_len);
        Ok(())
    }
    pub fn slope(&self) -> (SlopeShape, u32) {
        *self.inner.slope.lock().unwrap()
    }

    // ── Enqueue ───────────────────────────────────────────────────────────────

    /// Queue one character: its marks with inter-mark silences, closed by the
    /// end-of-character silence.  A space queues a word space.
    pub fn enqueue_character(&self, c: char) -> Result<()> {
        if c == ' ' {
            return self.enqueue_word_space();
        }
        let rep = morse::character_to_representation(c)
            .ok_or(Error::InvalidArgument("character has no representation"))?;
        self.inner.enqueue_representation_tones(rep, true, true)
    }

    /// Queue a whole string.  Validation happens up front: an invalid
    /// character fails the call before any tone is enqueued.
    pub fn enqueue_string(&self, s: &str) -> Result<()> {
        if !morse::is_string_valid(s) {
            return Err(Error::InvalidArgument("string contains unsendable characters"));
        }
        for c in s.chars() {
            self.enqueue_character(c)?;
        }
        Ok(())
    }

    /// Queue a dot/dash string as one character (with the closing silence).
    pub fn enqueue_representation(&self, representation: &str) -> Result<()> {
        morse::table::check_representation(representation)?;
        self.inner.enqueue_representation_tones(representation, true, true)
    }

    /// Queue a dot/dash string without the closing end-of-character silence,
    /// so the caller can append more marks to the same character.
    pub fn enqueue_representation_partial(&self, representation: &str) -> Result<()> {
        morse::table::check_representation(representation)?;
        self.inner.enqueue_representation_tones(representation, true, false)
    }

    /// Queue a single dot mark and its inter-mark silence.
    pub fn enqueue_dot(&self) -> Result<()> {
        self.inner.enqueue_mark(false, false, false)?;
        self.inner.enqueue_eoe()
    }

    /// Queue a single dash mark and its inter-mark silence.
    pub fn enqueue_dash(&self) -> Result<()> {
        self.inner.enqueue_mark(true, false, false)?;
        self.inner.enqueue_eoe()
    }

    /// Queue the silence completing a character (2 units plus gap).
    pub fn enqueue_character_space(&self) -> Result<()> {
        let timing = self.inner.params.lock().unwrap().timing();
        self.inner.tq.enqueue(Tone::silence(timing.eoc))
    }

    /// Queue the silence completing a word (4 further units).
    pub fn enqueue_word_space(&self) -> Result<()> {
        let timing = self.inner.params.lock().unwrap().timing();
        self.inner.tq.enqueue(Tone::silence(timing.eow))
    }

    /// Drop the most recently enqueued character's tones, provided the
    /// consumer has not started playing them.  Fails silently otherwise.
    pub fn remove_last_character(&self) -> Result<()> {
        if !self.inner.tq.remove_last_character() {
            log::debug!("remove_last_character: nothing removable");
        }
        Ok(())
    }

    // ── Waiting and queue introspection ───────────────────────────────────────

    /// Block until the tone queue is drained and idle.
    pub fn wait_for_tone_queue(&self) -> Result<()> {
        self.inner.tq.wait_for_empty()
    }

    /// Block until the currently playing tone ends.
    pub fn wait_for_tone(&self) -> Result<()> {
        self.inner.tq.wait_for_tone()
    }

    /// Block until the queue length is at or below `level`.
    pub fn wait_for_queue_level(&self, level: usize) -> Result<()> {
        self.inner.tq.wait_for_level(level)
    }

    /// Discard all pending tones and wake waiters.
    pub fn flush(&self) {
        self.inner.tq.flush();
    }

    pub fn queue_length(&self) -> usize {
        self.inner.tq.length()
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.tq.capacity()
    }

    pub fn queue_is_full(&self) -> bool {
        self.inner.tq.is_full()
    }

    /// Total µs of queued playback.
    pub fn queued_duration(&self) -> u64 {
        self.inner.tq.queued_duration()
    }

    /// Arm the tone queue's low-water callback.
    pub fn register_low_level_callback(
        &self,
        level: usize,
        callback: impl FnMut() + Send + 'static,
    ) -> Result<()> {
        self.inner.tq.register_low_level_callback(level, callback)
    }

    // ── Key integration ───────────────────────────────────────────────────────

    /// Invoked by the consumer at every mark ↔ silence boundary.  The
    /// callback must be non-blocking and must not re-enter the generator.
    pub fn register_key_state_callback(&self, callback: impl FnMut(KeyValue) + Send + 'static) {
        *self.inner.key_callback.lock().unwrap() = Some(Box::new(callback));
    }

    pub fn clear_key_state_callback(&self) {
        *self.inner.key_callback.lock().unwrap() = None;
    }

    /// Wire a key to this generator.  Both sides hold weak handles; call
    /// [`Generator::detach_key`] before tearing either down.
    pub fn attach_key(&self, key: &Arc<Key>) {
        *self.inner.key.lock().unwrap() = Some(Arc::downgrade(key));
        key.attach_generator(Arc::downgrade(&self.inner));
    }

    pub fn detach_key(&self) {
        if let Some(key) = self.attached_key() {
            key.detach_generator();
        }
        *self.inner.key.lock().unwrap() = None;
    }

    fn attached_key(&self) -> Option<Arc<Key>> {
        self.inner.key.lock().unwrap().as_ref().and_then(Weak::upgrade)
    }

    #[cfg(test)]
    pub(crate) fn queue_snapshot(&self) -> Vec<Tone> {
        self.inner.tq.snapshot()
    }
}

impl Drop for Generator {
    fn drop(&mut self) {
        let _ = self.stop();
        self.detach_key();
        if let Some(mut sink) = self.inner.sink.lock().unwrap().take() {
            sink.close();
        }
    }
}

// ── Shared producer internals (also used by the key) ──────────────────────────

impl GenInner {
    fn tone_parts(&self) -> (crate::morse::Timing, u32, SlopeShape, u32) {
        let mut params = self.params.lock().unwrap();
        let timing = params.timing();
        let frequency = params.frequency();
        drop(params);
        let (shape, slope_len) = *self.slope.lock().unwrap();
        (timing, frequency, shape, slope_len)
    }

    fn enqueue_mark(&self, is_dash: bool, starts_character: bool, from_keyer: bool) -> Result<()> {
        let (timing, frequency, shape, slope_len) = self.tone_parts();
        let duration = if is_dash { timing.dash } else { timing.dot };
        let mut tone = Tone::mark(frequency, duration, shape, slope_len);
        tone.starts_character = starts_character;
        tone.from_keyer = from_keyer;
        self.tq.enqueue(tone)
    }

    fn enqueue_eoe(&self) -> Result<()> {
        let timing = self.params.lock().unwrap().timing();
        self.tq.enqueue(Tone::silence(timing.eoe))
    }

    /// Marks with an inter-mark silence after every one; `close` appends the
    /// end-of-character silence.
    fn enqueue_representation_tones(
        &self,
        representation: &str,
        mark_start: bool,
        close: bool,
    ) -> Result<()> {
        for (i, sym) in representation.chars().enumerate() {
            let is_dash = sym == morse::CW_DASH_REPRESENTATION;
            self.enqueue_mark(is_dash, mark_start && i == 0, false)?;
            self.enqueue_eoe()?;
        }
        if close {
            let timing = self.params.lock().unwrap().timing();
            self.tq.enqueue(Tone::silence(timing.eoc))?;
        }
        Ok(())
    }

    pub(crate) fn enqueue_keyer_mark(&self, is_dash: bool) -> Result<()> {
        self.enqueue_mark(is_dash, false, true)
    }

    pub(crate) fn enqueue_keyer_gap(&self) -> Result<()> {
        let timing = self.params.lock().unwrap().timing();
        let mut tone = Tone::silence(timing.eoe);
        tone.from_keyer = true;
        self.tq.enqueue(tone)
    }

    /// Straight-key state: closed holds a forever mark, open a forever
    /// silence displacing it.
    pub(crate) fn enqueue_straight_key(&self, closed: bool) -> Result<()> {
        let (_, frequency, shape, slope_len) = self.tone_parts();
        let tone = if closed {
            Tone::forever(frequency, FOREVER_QUANTUM, shape, slope_len)
        } else {
            Tone::forever(0, FOREVER_QUANTUM, SlopeShape::Rectangular, 0)
        };
        self.tq.enqueue(tone)
    }

    fn amplitude(&self) -> f64 {
        f64::from(self.params.lock().unwrap().volume()) * 32_767.0 / 100.0
    }
}

// ── Consumer ──────────────────────────────────────────────────────────────────

fn consumer_loop(inner: Arc<GenInner>) {
    let caps = *inner.caps.lock().unwrap();
    let mut buf = vec![0i16; caps.buffer_n_samples];
    let mut phase = 0.0f64;
    let mut key_closed = false;

    log::debug!(
        "consumer up: {} Hz, {}-sample buffers",
        caps.sample_rate,
        caps.buffer_n_samples
    );

    while !inner.stop_flag.load(Ordering::SeqCst) {
        match inner.tq.dequeue() {
            Some(tone) => {
                play_tone(&inner, &tone, caps, &mut buf, &mut phase, &mut key_closed);
                if tone.from_keyer && !inner.stop_flag.load(Ordering::SeqCst) {
                    if let Some(key) = inner.key.lock().unwrap().as_ref().and_then(Weak::upgrade) {
                        key.on_keyer_tone_end();
                    }
                }
            }
            None => {
                // Queue idle: report the key open, keep the sink fed so it
                // cannot underrun, and sleep until new work arrives.
                set_key_state(&inner, &mut key_closed, false);
                buf.fill(0);
                write_chunk(&inner, &buf, ToneCue { frequency: 0, is_mark: false });
                inner.tq.wait_for_work_timeout(IDLE_NAP);
            }
        }
    }

    set_key_state(&inner, &mut key_closed, false);
    log::debug!("consumer down");
}

fn play_tone(
    inner: &Arc<GenInner>,
    tone: &Tone,
    caps: SinkCaps,
    buf: &mut [i16],
    phase: &mut f64,
    key_closed: &mut bool,
) {
    let amplitude = inner.amplitude();
    let is_mark = !tone.is_silence();
    set_key_state(inner, key_closed, is_mark);
    let cue = ToneCue {
        frequency: tone.frequency,
        is_mark,
    };

    if tone.is_forever {
        // Re-synthesize the sentinel until something displaces it: an
        // enqueue replaces the head (or queue length changes), a flush
        // empties the queue, a stop breaks out.
        let mut start = 0usize;
        while !inner.stop_flag.load(Ordering::SeqCst)
            && inner.tq.peek() == Some(*tone)
            && inner.tq.length() == 1
        {
            synth::fill(buf, tone, start, None, amplitude, caps.sample_rate, phase);
            if !write_chunk(inner, buf, cue) {
                break;
            }
            start += buf.len();
        }
        return;
    }

    let total = synth::usecs_to_samples(tone.duration, caps.sample_rate);
    let mut start = 0usize;
    while start < total && !inner.stop_flag.load(Ordering::SeqCst) {
        let n = buf.len().min(total - start);
        synth::fill(&mut buf[..n], tone, start, Some(total), amplitude, caps.sample_rate, phase);
        if !write_chunk(inner, &buf[..n], cue) {
            // A failed write loses this tone only; the consumer moves on.
            break;
        }
        start += n;
    }
}

/// Write one buffer, logging failures instead of propagating them.
fn write_chunk(inner: &Arc<GenInner>, samples: &[i16], cue: ToneCue) -> bool {
    let mut sink = inner.sink.lock().unwrap();
    match sink.as_mut() {
        Some(sink) => match sink.write_buffer(samples, cue) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("sink write failed: {e}");
                false
            }
        },
        None => false,
    }
}

fn set_key_state(inner: &Arc<GenInner>, current: &mut bool, closed: bool) {
    if *current == closed {
        return;
    }
    *current = closed;
    if let Some(callback) = inner.key_callback.lock().unwrap().as_mut() {
        callback(if closed { KeyValue::Closed } else { KeyValue::Open });
    }
}
