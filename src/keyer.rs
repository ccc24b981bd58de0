// src/keyer.rs  —  Straight key + iambic keyer state machine
//
// The keyer owns no thread and no timer.  Entering a mark state enqueues
// exactly one mark tone; entering a gap state enqueues one inter-mark
// silence.  "Timer expiry" is the generator consumer finishing one of the
// keyer's own tones and calling back into `on_keyer_tone_end`, so the
// element cadence is paced by the same sink back-pressure as everything
// else.

use std::sync::{Arc, Condvar, Mutex, Weak};

use crate::errors::{Error, Result};
use crate::generator::GenInner;

/// State of a key contact, as reported to the key-state callback and the
/// straight-key API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyValue {
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IkState {
    Idle,
    InDot,
    InDash,
    AfterDotGap,
    AfterDashGap,
}

struct KeyInner {
    gen: Weak<GenInner>,
    dot_paddle: bool,
    dash_paddle: bool,
    state: IkState,
    /// Last mark emitted; a squeeze prefers the opposite element.
    last_was_dash: bool,
    straight: KeyValue,
    /// Bumped on every state change so element waiters can detect progress.
    transitions: u64,
}

/// A Morse key: either a straight key holding the line down, or an iambic
/// paddle pair feeding the alternating dot/dash machine.
///
/// The key holds a non-owning handle to its generator; wire it up with
/// [`crate::generator::Generator::attach_key`] and clear the link with
/// `detach_key` before tearing either side down.
pub struct Key {
    inner: Mutex<KeyInner>,
    cond: Condvar,
}

impl Key {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(KeyInner {
                gen: Weak::new(),
                dot_paddle: false,
                dash_paddle: false,
                state: IkState::Idle,
                last_was_dash: true, // first squeeze leads with a dot
                straight: KeyValue::Open,
                transitions: 0,
            }),
            cond: Condvar::new(),
        })
    }

    pub(crate) fn attach_generator(&self, gen: Weak<GenInner>) {
        self.inner.lock().unwrap().gen = gen;
    }

    pub(crate) fn detach_generator(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.gen = Weak::new();
        inner.state = IkState::Idle;
        inner.transitions += 1;
        self.cond.notify_all();
    }

    // ── Straight key ──────────────────────────────────────────────────────────

    /// Report a straight-key transition.  Closing holds a forever mark on
    /// the queue; opening displaces it with a forever silence.
    pub fn notify_straight_key_event(&self, value: KeyValue) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.straight == value {
            return Ok(());
        }
        let gen = inner
            .gen
            .upgrade()
            .ok_or(Error::InvalidState("key has no generator attached"))?;
        gen.enqueue_straight_key(value == KeyValue::Closed)?;
        inner.straight = value;
        log::debug!("straight key {value:?}");
        Ok(())
    }

    pub fn value(&self) -> KeyValue {
        self.inner.lock().unwrap().straight
    }

    // ── Iambic paddles ────────────────────────────────────────────────────────

    /// Report the paddle levels.  From idle, a closed paddle starts its mark
    /// immediately; when both close together the machine leads with the
    /// opposite of the last element it sent.
    pub fn notify_paddle_event(&self, dot_paddle: bool, dash_paddle: bool) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.dot_paddle = dot_paddle;
        inner.dash_paddle = dash_paddle;

        if inner.state != IkState::Idle || !(dot_paddle || dash_paddle) {
            return Ok(());
        }

        let send_dash = if dot_paddle && dash_paddle {
            !inner.last_was_dash
        } else {
            dash_paddle
        };
        let gen = inner
            .gen
            .upgrade()
            .ok_or(Error::InvalidState("key has no generator attached"))?;
        gen.enqueue_keyer_mark(send_dash)?;
        inner.state = if send_dash { IkState::InDash } else { IkState::InDot };
        inner.last_was_dash = send_dash;
        inner.transitions += 1;
        self.cond.notify_all();
        log::debug!("keyer: idle → {:?}", inner.state);
        Ok(())
    }

    pub fn paddles(&self) -> (bool, bool) {
        let inner = self.inner.lock().unwrap();
        (inner.dot_paddle, inner.dash_paddle)
    }

    pub fn is_busy(&self) -> bool {
        self.inner.lock().unwrap().state != IkState::Idle
    }

    /// Advance the machine when one of its own tones finishes.
    ///
    /// Marks fall into their gap state (enqueueing the inter-mark silence);
    /// a finished gap picks the next element — the other paddle's mark
    /// first, then a repeat of the same paddle, else back to idle.
    pub(crate) fn on_keyer_tone_end(&self) {
        let mut inner = self.inner.lock().unwrap();
        let Some(gen) = inner.gen.upgrade() else {
            inner.state = IkState::Idle;
            inner.transitions += 1;
            self.cond.notify_all();
            return;
        };

        let next = match inner.state {
            IkState::Idle => return, // stray tone after a reset
            IkState::InDot | IkState::InDash => {
                let gap = if inner.state == IkState::InDot {
                    IkState::AfterDotGap
                } else {
                    IkState::AfterDashGap
                };
                match gen.enqueue_keyer_gap() {
                    Ok(()) => gap,
                    Err(e) => {
                        log::warn!("keyer gap enqueue failed: {e}");
                        IkState::Idle
                    }
                }
            }
            IkState::AfterDotGap | IkState::AfterDashGap => {
                let was_dot = inner.state == IkState::AfterDotGap;
                let send_dash = if was_dot {
                    // Opposite paddle wins, same paddle repeats.
                    if inner.dash_paddle {
                        Some(true)
                    } else if inner.dot_paddle {
                        Some(false)
                    } else {
                        None
                    }
                } else if inner.dot_paddle {
                    Some(false)
                } else if inner.dash_paddle {
                    Some(true)
                } else {
                    None
                };
                match send_dash {
                    Some(dash) => match gen.enqueue_keyer_mark(dash) {
                        Ok(()) => {
                            inner.last_was_dash = dash;
                            if dash {
                                IkState::InDash
                            } else {
                                IkState::InDot
                            }
                        }
                        Err(e) => {
                            log::warn!("keyer mark enqueue failed: {e}");
                            IkState::Idle
                        }
                    },
                    None => IkState::Idle,
                }
            }
        };

        log::debug!("keyer: {:?} → {:?}", inner.state, next);
        inner.state = next;
        inner.transitions += 1;
        self.cond.notify_all();
    }

    /// Park the machine (generator stopped or detached) and wake waiters.
    pub(crate) fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != IkState::Idle {
            log::debug!("keyer reset from {:?}", inner.state);
        }
        inner.state = IkState::Idle;
        inner.straight = KeyValue::Open;
        inner.transitions += 1;
        self.cond.notify_all();
    }

    // ── Waiting ───────────────────────────────────────────────────────────────

    /// Block until the current mark or gap ends.  Returns immediately when
    /// the keyer is idle.
    pub fn wait_for_keyer_element(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        if inner.state == IkState::Idle {
            return Ok(());
        }
        let mark = inner.transitions;
        while inner.transitions == mark {
            inner = self.cond.wait(inner).unwrap();
        }
        Ok(())
    }

    /// Block until the keyer returns to idle.
    pub fn wait_for_keyer(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        while inner.state != IkState::Idle {
            inner = self.cond.wait(inner).unwrap();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SoundSystem;
    use crate::generator::Generator;

    /// Unstarted generator + attached key: the test drives the consumer's
    /// part by calling `on_keyer_tone_end` itself and inspects the queue.
    fn rig() -> (Generator, Arc<Key>) {
        let gen = Generator::new(SoundSystem::Null, None).unwrap();
        gen.set_speed(20).unwrap();
        let key = Key::new();
        gen.attach_key(&key);
        (gen, key)
    }

    fn mark_pattern(gen: &Generator) -> Vec<Option<bool>> {
        // Some(true) = dash mark, Some(false) = dot mark, None = silence.
        gen.queue_snapshot()
            .iter()
            .map(|t| {
                if t.is_silence() {
                    None
                } else {
                    Some(t.duration > 100_000) // dash at 20 WPM = 180 ms
                }
            })
            .collect()
    }

    #[test]
    fn test_paddle_event_without_generator_fails() {
        let key = Key::new();
        assert!(matches!(
            key.notify_paddle_event(true, false),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_held_dot_paddle_repeats_dots() {
        let (gen, key) = rig();
        key.notify_paddle_event(true, false).unwrap();
        assert!(key.is_busy());

        // mark → gap, gap → mark, paddle still held.
        for _ in 0..2 {
            key.on_keyer_tone_end();
        }
        assert_eq!(
            mark_pattern(&gen),
            vec![Some(false), None, Some(false)],
            "dot, inter-mark silence, dot"
        );
    }

    #[test]
    fn test_squeeze_alternates_elements() {
        let (gen, key) = rig();
        key.notify_paddle_event(true, true).unwrap();
        for _ in 0..4 {
            key.on_keyer_tone_end();
        }
        assert_eq!(
            mark_pattern(&gen),
            vec![Some(false), None, Some(true), None, Some(false)],
            "squeeze leads with a dot and alternates"
        );
    }

    #[test]
    fn test_gap_prefers_opposite_paddle() {
        let (gen, key) = rig();
        key.notify_paddle_event(false, true).unwrap(); // dash first
        key.on_keyer_tone_end(); // dash → gap
        key.notify_paddle_event(true, true).unwrap(); // now squeezing
        key.on_keyer_tone_end(); // gap → opposite = dot
        assert_eq!(mark_pattern(&gen), vec![Some(true), None, Some(false)]);
    }

    #[test]
    fn test_release_returns_to_idle() {
        let (_gen, key) = rig();
        key.notify_paddle_event(true, false).unwrap();
        key.on_keyer_tone_end(); // mark → gap
        key.notify_paddle_event(false, false).unwrap();
        key.on_keyer_tone_end(); // gap → idle
        assert!(!key.is_busy());
        key.wait_for_keyer().unwrap();
        key.wait_for_keyer_element().unwrap(); // idle: immediate
    }

    #[test]
    fn test_straight_key_holds_forever_tone() {
        let (gen, key) = rig();
        key.notify_straight_key_event(KeyValue::Closed).unwrap();
        assert_eq!(key.value(), KeyValue::Closed);
        let tones = gen.queue_snapshot();
        assert_eq!(tones.len(), 1);
        assert!(tones[0].is_forever);
        assert!(!tones[0].is_silence());

        // Opening replaces the sentinel with a forever silence.
        key.notify_straight_key_event(KeyValue::Open).unwrap();
        let tones = gen.queue_snapshot();
        assert_eq!(tones.len(), 1);
        assert!(tones[0].is_forever);
        assert!(tones[0].is_silence());

        // Repeating the same value is a no-op.
        key.notify_straight_key_event(KeyValue::Open).unwrap();
        assert_eq!(gen.queue_snapshot().len(), 1);
    }

    #[test]
    fn test_detach_disarms_the_key() {
        let (gen, key) = rig();
        key.notify_paddle_event(true, false).unwrap();
        gen.detach_key();
        assert!(!key.is_busy());
        assert!(matches!(
            key.notify_paddle_event(true, false),
            Err(Error::InvalidState(_))
        ));
    }
}
