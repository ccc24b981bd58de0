// src/tonequeue.rs  —  Bounded ring of tone descriptors between producers and
// the generator consumer

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::errors::{Error, Result};
use crate::morse::timing::FREQUENCY_MAX;

/// Fixed capacity of every tone queue.
pub const TONE_QUEUE_CAPACITY: usize = 1024;

// ── Tone descriptor ───────────────────────────────────────────────────────────

/// Envelope applied to the first and last `slope_len` µs of a mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlopeShape {
    Linear,
    RaisedCosine,
    Sine,
    /// No shaping — the tone starts and stops at full amplitude.
    Rectangular,
}

/// One queued tone: a mark at `frequency` Hz or a silence (`frequency` 0).
///
/// A *forever* tone is a terminal sentinel: the consumer loops on it without
/// advancing the queue head until a later enqueue displaces it.  Used to hold
/// a straight-key state indefinitely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tone {
    /// Hz; 0 produces silence.
    pub frequency: u32,
    /// µs.  For a forever tone this is the synthesis quantum, not a limit.
    pub duration: u32,
    pub slope_shape: SlopeShape,
    /// µs of rise and of fall; clamped to half the tone at synthesis time.
    pub slope_len: u32,
    pub is_forever: bool,
    /// First tone of a character enqueued through the high-level text API;
    /// remove-last-character walks back to this marker.
    pub(crate) starts_character: bool,
    /// Enqueued by the iambic keyer — its state machine only advances when
    /// one of its own tones finishes.
    pub(crate) from_keyer: bool,
}

impl Tone {
    pub fn mark(frequency: u32, duration: u32, slope_shape: SlopeShape, slope_len: u32) -> Self {
        Self {
            frequency,
            duration,
            slope_shape,
            slope_len,
            is_forever: false,
            starts_character: false,
            from_keyer: false,
        }
    }

    pub fn silence(duration: u32) -> Self {
        Self {
            frequency: 0,
            duration,
            slope_shape: SlopeShape::Rectangular,
            slope_len: 0,
            is_forever: false,
            starts_character: false,
            from_keyer: false,
        }
    }

    /// A forever sentinel; `quantum` is the chunk the consumer re-synthesizes.
    pub fn forever(frequency: u32, quantum: u32, slope_shape: SlopeShape, slope_len: u32) -> Self {
        Self {
            frequency,
            duration: quantum,
            slope_shape,
            slope_len,
            is_forever: true,
            starts_character: false,
            from_keyer: false,
        }
    }

    pub fn is_silence(&self) -> bool {
        self.frequency == 0
    }
}

// ── Queue ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    Idle,
    Busy,
}

struct LowWater {
    level: usize,
    callback: Box<dyn FnMut() + Send>,
}

struct Inner {
    ring: Vec<Tone>,
    head: usize,
    len: usize,
    state: QueueState,
    /// Set while the owning generator is stopped; blocked waiters return
    /// `Error::Cancelled`.
    dead: bool,
    /// Bumped on every dequeue event (including idle transitions and flush),
    /// so `wait_for_tone` can detect the current tone ending.
    dequeues: u64,
}

/// Single-consumer, multi-producer bounded tone buffer.
///
/// One mutex guards all mutation; one condvar signals level changes.  The
/// low-water callback runs in the consumer's context with the mutex
/// released, so it must not re-enter this queue's blocking operations.
pub struct ToneQueue {
    inner: Mutex<Inner>,
    low_water: Mutex<Option<LowWater>>,
    cond: Condvar,
}

impl Default for ToneQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl ToneQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ring: vec![Tone::silence(0); TONE_QUEUE_CAPACITY],
                head: 0,
                len: 0,
                state: QueueState::Idle,
                dead: false,
                dequeues: 0,
            }),
            low_water: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        TONE_QUEUE_CAPACITY
    }

    pub fn length(&self) -> usize {
        self.inner.lock().unwrap().len
    }

    pub fn is_empty(&self) -> bool {
        self.length() == 0
    }

    pub fn is_full(&self) -> bool {
        self.length() == TONE_QUEUE_CAPACITY
    }

    pub fn state(&self) -> QueueState {
        self.inner.lock().unwrap().state
    }

    /// Total µs of queued playback; forever sentinels contribute nothing.
    pub fn queued_duration(&self) -> u64 {
        let inner = self.inner.lock().unwrap();
        (0..inner.len)
            .map(|i| {
                let t = &inner.ring[(inner.head + i) % TONE_QUEUE_CAPACITY];
                if t.is_forever {
                    0
                } else {
                    u64::from(t.duration)
                }
            })
            .sum()
    }

    /// Append a tone.  Non-blocking: a full queue fails with
    /// [`Error::FullQueue`] and does not mutate.
    ///
    /// A forever sentinel at the tail is special: a normal tone is inserted
    /// *before* it (the sentinel stays the tail); a new forever tone
    /// replaces it.
    pub fn enqueue(&self, tone: Tone) -> Result<()> {
        if tone.frequency > FREQUENCY_MAX {
            return Err(Error::InvalidArgument("tone frequency out of range 0..=4000 Hz"));
        }

        let mut inner = self.inner.lock().unwrap();

        if inner.len > 0 {
            let last_slot = (inner.head + inner.len - 1) % TONE_QUEUE_CAPACITY;
            if inner.ring[last_slot].is_forever {
                if tone.is_forever {
                    inner.ring[last_slot] = tone;
                } else {
                    if inner.len == TONE_QUEUE_CAPACITY {
                        return Err(Error::FullQueue);
                    }
                    let sentinel = inner.ring[last_slot];
                    inner.ring[last_slot] = tone;
                    let next = (last_slot + 1) % TONE_QUEUE_CAPACITY;
                    inner.ring[next] = sentinel;
                    inner.len += 1;
                }
                inner.state = QueueState::Busy;
                self.cond.notify_all();
                return Ok(());
            }
        }

        if inner.len == TONE_QUEUE_CAPACITY {
            return Err(Error::FullQueue);
        }
        let slot = (inner.head + inner.len) % TONE_QUEUE_CAPACITY;
        inner.ring[slot] = tone;
        inner.len += 1;
        inner.state = QueueState::Busy;
        self.cond.notify_all();
        Ok(())
    }

    /// Take the next tone, or `None` when the queue has no pending work —
    /// which also publishes the Busy → Idle transition to waiters.
    ///
    /// A lone forever sentinel at the head is returned by copy without
    /// advancing, so the consumer re-plays it until something displaces it.
    pub fn dequeue(&self) -> Option<Tone> {
        let mut inner = self.inner.lock().unwrap();

        if inner.len == 0 {
            if inner.state != QueueState::Idle {
                log::debug!("tone queue drained, going idle");
            }
            inner.state = QueueState::Idle;
            inner.dequeues += 1;
            self.cond.notify_all();
            return None;
        }

        let tone = inner.ring[inner.head];
        if tone.is_forever && inner.len == 1 {
            inner.dequeues += 1;
            self.cond.notify_all();
            return Some(tone);
        }

        inner.head = (inner.head + 1) % TONE_QUEUE_CAPACITY;
        inner.len -= 1;
        inner.dequeues += 1;
        let new_len = inner.len;
        self.cond.notify_all();
        drop(inner);

        // Downward crossing of the armed threshold fires the callback exactly
        // once, outside the queue mutex.  The slot is emptied for the
        // duration of the call so the callback cannot observe itself.
        let fired = {
            let mut lw = self.low_water.lock().unwrap();
            match lw.as_ref() {
                Some(armed) if armed.level == new_len => lw.take(),
                _ => None,
            }
        };
        if let Some(mut armed) = fired {
            (armed.callback)();
            let mut lw = self.low_water.lock().unwrap();
            if lw.is_none() {
                *lw = Some(armed);
            }
        }

        Some(tone)
    }

    /// Discard every pending tone (forever sentinels included), publish the
    /// Idle transition, and wake all waiters.
    pub fn flush(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.len > 0 {
            log::debug!("flushing {} queued tone(s)", inner.len);
        }
        inner.len = 0;
        inner.state = QueueState::Idle;
        inner.dequeues += 1;
        self.cond.notify_all();
    }

    /// Arm the low-water callback: fired after every dequeue that reduces the
    /// length from `level + 1` to `level`.
    ///
    /// The callback runs from the consumer's context and must not re-enter
    /// this queue's enqueue or wait operations.
    pub fn register_low_level_callback(
        &self,
        level: usize,
        callback: impl FnMut() + Send + 'static,
    ) -> Result<()> {
        if level >= TONE_QUEUE_CAPACITY {
            return Err(Error::InvalidArgument("low-water level must be below capacity"));
        }
        *self.low_water.lock().unwrap() = Some(LowWater {
            level,
            callback: Box::new(callback),
        });
        Ok(())
    }

    pub fn clear_low_level_callback(&self) {
        *self.low_water.lock().unwrap() = None;
    }

    /// Block until the queue length is at or below `level`.
    pub fn wait_for_level(&self, level: usize) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.dead {
                return Err(Error::Cancelled);
            }
            if inner.len <= level {
                return Ok(());
            }
            inner = self.cond.wait(inner).unwrap();
        }
    }

    /// Block until the tone at the head of the queue ends (the next dequeue
    /// event).  Returns immediately when nothing is playing.
    pub fn wait_for_tone(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.len == 0 && inner.state == QueueState::Idle {
            return Ok(());
        }
        let mark = inner.dequeues;
        loop {
            if inner.dead {
                return Err(Error::Cancelled);
            }
            if inner.dequeues != mark {
                return Ok(());
            }
            inner = self.cond.wait(inner).unwrap();
        }
    }

    /// Block until the queue is drained and idle.
    pub fn wait_for_empty(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        loop {
            if inner.dead {
                return Err(Error::Cancelled);
            }
            if inner.len == 0 && inner.state == QueueState::Idle {
                return Ok(());
            }
            inner = self.cond.wait(inner).unwrap();
        }
    }

    /// Consumer-side wait for new work; returns true when a tone is pending.
    pub(crate) fn wait_for_work_timeout(&self, timeout: Duration) -> bool {
        let inner = self.inner.lock().unwrap();
        let (inner, _timed_out) = self
            .cond
            .wait_timeout_while(inner, timeout, |i| i.len == 0 && !i.dead)
            .unwrap();
        inner.len > 0 && !inner.dead
    }

    /// Mark the queue dead (generator stopped) or alive again.  Dead wakes
    /// every blocked waiter with `Error::Cancelled`.
    pub(crate) fn set_dead(&self, dead: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.dead = dead;
        self.cond.notify_all();
    }

    /// Drop the tones of the most recently enqueued character: walk back from
    /// the tail to the newest `starts_character` marker and truncate there.
    ///
    /// Returns false — without touching the queue — when no marker is left,
    /// i.e. the character's first tone was already handed to the consumer.
    pub(crate) fn remove_last_character(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let mut boundary = None;
        for i in (0..inner.len).rev() {
            if inner.ring[(inner.head + i) % TONE_QUEUE_CAPACITY].starts_character {
                boundary = Some(i);
                break;
            }
        }
        match boundary {
            Some(i) => {
                log::debug!("removing last character: {} tone(s) dropped", inner.len - i);
                inner.len = i;
                self.cond.notify_all();
                true
            }
            None => false,
        }
    }

    /// Copy of the tone at the head, if any.  The consumer uses this to
    /// notice a forever sentinel being displaced or replaced mid-loop.
    pub(crate) fn peek(&self) -> Option<Tone> {
        let inner = self.inner.lock().unwrap();
        if inner.len == 0 {
            None
        } else {
            Some(inner.ring[inner.head])
        }
    }

    /// Copy of the pending tones in play order.
    pub(crate) fn snapshot(&self) -> Vec<Tone> {
        let inner = self.inner.lock().unwrap();
        (0..inner.len)
            .map(|i| inner.ring[(inner.head + i) % TONE_QUEUE_CAPACITY])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn short_mark() -> Tone {
        Tone::mark(700, 10_000, SlopeShape::RaisedCosine, 2_000)
    }

    #[test]
    fn test_length_tracks_enqueues() {
        let tq = ToneQueue::new();
        assert_eq!(tq.length(), 0);
        assert_eq!(tq.state(), QueueState::Idle);
        for i in 1..=10 {
            tq.enqueue(short_mark()).unwrap();
            assert_eq!(tq.length(), i);
        }
        assert_eq!(tq.state(), QueueState::Busy);
        assert!(!tq.is_full());
    }

    #[test]
    fn test_full_queue_rejects_without_mutating() {
        let tq = ToneQueue::new();
        for _ in 0..TONE_QUEUE_CAPACITY {
            tq.enqueue(short_mark()).unwrap();
        }
        assert!(tq.is_full());
        assert_eq!(tq.length(), TONE_QUEUE_CAPACITY);
        assert!(matches!(tq.enqueue(short_mark()), Err(Error::FullQueue)));
        assert_eq!(tq.length(), TONE_QUEUE_CAPACITY);

        tq.flush();
        assert_eq!(tq.length(), 0);
        assert_eq!(tq.capacity(), TONE_QUEUE_CAPACITY);
        assert_eq!(tq.state(), QueueState::Idle);
        // Nothing pending — the wait returns immediately.
        tq.wait_for_empty().unwrap();
    }

    #[test]
    fn test_enqueue_rejects_out_of_range_frequency() {
        let tq = ToneQueue::new();
        let bad = Tone::mark(4_001, 10_000, SlopeShape::Linear, 0);
        assert!(matches!(tq.enqueue(bad), Err(Error::InvalidArgument(_))));
        assert_eq!(tq.length(), 0);
    }

    #[test]
    fn test_dequeue_on_empty_goes_idle() {
        let tq = ToneQueue::new();
        tq.enqueue(short_mark()).unwrap();
        assert!(tq.dequeue().is_some());
        assert!(tq.dequeue().is_none());
        assert_eq!(tq.state(), QueueState::Idle);
    }

    #[test]
    fn test_low_water_fires_exactly_once_per_crossing() {
        let tq = ToneQueue::new();
        let fires = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fires);
        tq.register_low_level_callback(2, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        for _ in 0..6 {
            tq.enqueue(short_mark()).unwrap();
        }
        while tq.dequeue().is_some() {}
        assert_eq!(fires.load(Ordering::SeqCst), 1);

        // Refill and drain again: a second downward crossing, a second fire.
        for _ in 0..6 {
            tq.enqueue(short_mark()).unwrap();
        }
        while tq.dequeue().is_some() {}
        assert_eq!(fires.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_forever_tone_loops_until_displaced() {
        let tq = ToneQueue::new();
        let held = Tone::forever(700, 5_000, SlopeShape::RaisedCosine, 2_000);
        tq.enqueue(held).unwrap();

        // The sentinel is re-delivered without advancing the head.
        for _ in 0..3 {
            assert_eq!(tq.dequeue(), Some(held));
            assert_eq!(tq.length(), 1);
        }

        // A later enqueue lands before the sentinel, which stays the tail.
        tq.enqueue(short_mark()).unwrap();
        assert_eq!(tq.length(), 2);
        assert_eq!(tq.dequeue(), Some(short_mark()));
        assert_eq!(tq.dequeue(), Some(held));
        assert_eq!(tq.length(), 1);
    }

    #[test]
    fn test_forever_tone_replaces_forever_tail() {
        let tq = ToneQueue::new();
        tq.enqueue(Tone::forever(700, 5_000, SlopeShape::Linear, 0)).unwrap();
        let silence = Tone::forever(0, 5_000, SlopeShape::Rectangular, 0);
        tq.enqueue(silence).unwrap();
        assert_eq!(tq.length(), 1);
        assert_eq!(tq.dequeue(), Some(silence));
    }

    #[test]
    fn test_wait_for_level_unblocks_as_consumer_drains() {
        let tq = Arc::new(ToneQueue::new());
        for _ in 0..8 {
            tq.enqueue(short_mark()).unwrap();
        }
        let consumer = Arc::clone(&tq);
        let handle = std::thread::spawn(move || {
            while consumer.dequeue().is_some() {
                std::thread::sleep(Duration::from_millis(1));
            }
        });
        tq.wait_for_level(3).unwrap();
        assert!(tq.length() <= 3);
        handle.join().unwrap();
    }

    #[test]
    fn test_dead_queue_cancels_waiters() {
        let tq = Arc::new(ToneQueue::new());
        tq.enqueue(short_mark()).unwrap();
        let waiter = Arc::clone(&tq);
        let handle = std::thread::spawn(move || waiter.wait_for_empty());
        std::thread::sleep(Duration::from_millis(20));
        tq.set_dead(true);
        assert!(matches!(handle.join().unwrap(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_queued_duration_sums_pending_tones() {
        let tq = ToneQueue::new();
        tq.enqueue(short_mark()).unwrap();
        tq.enqueue(Tone::silence(4_000)).unwrap();
        assert_eq!(tq.queued_duration(), 14_000);
    }
}
