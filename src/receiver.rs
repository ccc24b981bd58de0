// src/receiver.rs  —  Timed key events → marks, spaces, characters
//
// The receiver is driven entirely by externally supplied monotonic
// timestamps: every key transition classifies the interval that just ended,
// and the front end polls to collect characters once the following space has
// grown long enough.  Single-threaded by design — no internal locking.

use crate::errors::{Error, Result};
use crate::morse;
use crate::morse::timing::{
    DOT_CALIBRATION, GAP_MAX, SPEED_MAX, SPEED_MIN, TOLERANCE_MAX,
};

/// Depth of the adaptive duration rings (recent confirmed dots and dashes).
const ADAPTIVE_RING: usize = 4;

/// Window of the diagnostic duration statistics.
const STAT_WINDOW: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecvState {
    Idle,
    InMark,
    AfterMarkSpace,
    EocGap,
    EowGap,
    /// The representation buffer overflowed; gibberish until the next
    /// end-of-character space.
    Error,
}

// ── Adaptive duration ring ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct DurationRing {
    values: [u64; ADAPTIVE_RING],
    next: usize,
}

impl DurationRing {
    fn seeded(value: u64) -> Self {
        Self {
            values: [value; ADAPTIVE_RING],
            next: 0,
        }
    }

    fn push(&mut self, value: u64) {
        self.values[self.next] = value;
        self.next = (self.next + 1) % ADAPTIVE_RING;
    }

    /// Median of the ring (mean of the middle pair for the even depth).
    fn median(&self) -> u64 {
        let mut sorted = self.values;
        sorted.sort_unstable();
        (sorted[ADAPTIVE_RING / 2 - 1] + sorted[ADAPTIVE_RING / 2]) / 2
    }
}

// ── Rolling statistics ────────────────────────────────────────────────────────

/// Rolling duration figures over the last [`STAT_WINDOW`] samples of one
/// interval type.  `count` is the lifetime total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DurationStats {
    pub count: u64,
    pub mean: u64,
    pub min: u64,
    pub max: u64,
}

#[derive(Debug, Clone, Copy)]
struct StatWindow {
    ring: [u64; STAT_WINDOW],
    len: usize,
    next: usize,
    count: u64,
}

impl StatWindow {
    fn new() -> Self {
        Self {
            ring: [0; STAT_WINDOW],
            len: 0,
            next: 0,
            count: 0,
        }
    }

    fn push(&mut self, value: u64) {
        self.ring[self.next] = value;
        self.next = (self.next + 1) % STAT_WINDOW;
        self.len = (self.len + 1).min(STAT_WINDOW);
        self.count += 1;
    }

    fn stats(&self) -> DurationStats {
        if self.len == 0 {
            return DurationStats::default();
        }
        let window = &self.ring[..self.len];
        DurationStats {
            count: self.count,
            mean: window.iter().sum::<u64>() / self.len as u64,
            min: *window.iter().min().unwrap(),
            max: *window.iter().max().unwrap(),
        }
    }
}

/// Diagnostic snapshot: one [`DurationStats`] per interval type.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReceiverStatistics {
    pub dot: DurationStats,
    pub dash: DurationStats,
    pub inter_mark: DurationStats,
    pub inter_character: DurationStats,
    pub inter_word: DurationStats,
}

// ── Poll results ──────────────────────────────────────────────────────────────

/// Result of a successful character poll.  An inter-word space is reported
/// once, as a `' '` character with the flag set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Polled {
    pub character: char,
    pub is_end_of_word: bool,
    pub is_error: bool,
}

/// Result of a successful representation poll; the inter-word space carries
/// an empty representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolledRepresentation {
    pub representation: String,
    pub is_end_of_word: bool,
    pub is_error: bool,
}

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    /// Marks shorter than this are dots, longer are dashes.
    mark_split: u64,
    /// Spaces at least this long complete the character.
    eoc_min: u64,
    /// Spaces at least this long complete the word.
    eow_min: u64,
}

// ── Receiver ──────────────────────────────────────────────────────────────────

pub struct Receiver {
    wpm: u32,
    tolerance: u32,
    gap: u32,
    adaptive: bool,
    dirty: bool,
    thresholds: Thresholds,

    state: RecvState,
    last_event: u64,
    mark_start: u64,
    space_start: u64,
    representation: String,

    dots: DurationRing,
    dashes: DurationRing,

    stat_dot: StatWindow,
    stat_dash: StatWindow,
    stat_eoe: StatWindow,
    stat_eoc: StatWindow,
    stat_eow: StatWindow,
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

impl Receiver {
    pub fn new() -> Self {
        let wpm = 18;
        let unit = u64::from(DOT_CALIBRATION) / u64::from(wpm);
        let mut rec = Self {
            wpm,
            tolerance: 50,
            gap: 0,
            adaptive: false,
            dirty: true,
            thresholds: Thresholds {
                mark_split: 0,
                eoc_min: 0,
                eow_min: 0,
            },
            state: RecvState::Idle,
            last_event: 0,
            mark_start: 0,
            space_start: 0,
            representation: String::new(),
            dots: DurationRing::seeded(unit),
            dashes: DurationRing::seeded(3 * unit),
            stat_dot: StatWindow::new(),
            stat_dash: StatWindow::new(),
            stat_eoe: StatWindow::new(),
            stat_eoc: StatWindow::new(),
            stat_eow: StatWindow::new(),
        };
        rec.resync();
        rec
    }

    // ── Parameters ────────────────────────────────────────────────────────────

    pub fn set_speed(&mut self, wpm: u32) -> Result<()> {
        if !(SPEED_MIN..=SPEED_MAX).contains(&wpm) {
            return Err(Error::InvalidArgument("speed out of range 4..=60 WPM"));
        }
        self.wpm = wpm;
        let unit = u64::from(DOT_CALIBRATION) / u64::from(wpm);
        self.dots = DurationRing::seeded(unit);
        self.dashes = DurationRing::seeded(3 * unit);
        self.dirty = true;
        Ok(())
    }

    pub fn set_tolerance(&mut self, percent: u32) -> Result<()> {
        if percent > TOLERANCE_MAX {
            return Err(Error::InvalidArgument("tolerance out of range 0..=90 %"));
        }
        self.tolerance = percent;
        self.dirty = true;
        Ok(())
    }

    pub fn set_gap(&mut self, gap: u32) -> Result<()> {
        if gap > GAP_MAX {
            return Err(Error::InvalidArgument("gap out of range 0..=60 units"));
        }
        self.gap = gap;
        self.dirty = true;
        Ok(())
    }

    /// Track the sender's speed from the marks themselves instead of the
    /// configured value.
    pub fn set_adaptive(&mut self, adaptive: bool) {
        self.adaptive = adaptive;
        self.dirty = true;
    }

    pub fn is_adaptive(&self) -> bool {
        self.adaptive
    }

    pub fn tolerance(&self) -> u32 {
        self.tolerance
    }

    pub fn gap(&self) -> u32 {
        self.gap
    }

    /// Configured speed, or the adaptive estimate when tracking (clamped to
    /// the valid speed range).
    pub fn speed(&self) -> u32 {
        if self.adaptive {
            let dot = self.dots.median().max(1);
            let wpm = (u64::from(DOT_CALIBRATION) / dot) as u32;
            wpm.clamp(SPEED_MIN, SPEED_MAX)
        } else {
            self.wpm
        }
    }

    /// One unit length per the current speed estimate.
    fn unit(&self) -> u64 {
        if self.adaptive {
            self.dots.median().max(1)
        } else {
            u64::from(DOT_CALIBRATION) / u64::from(self.wpm)
        }
    }

    fn resync(&mut self) {
        let unit = self.unit();
        let dash = if self.adaptive {
            self.dashes.median().max(1)
        } else {
            3 * unit
        };
        let margin = u64::from(100 - self.tolerance);
        let additional = u64::from(self.gap) * unit;
        let adjustment = 7 * additional / 3;

        // End-of-character sits near 2 units, narrowing toward the
        // inter-mark space as tolerance grows; end-of-word near 5 units,
        // narrowing toward the inter-character space.  Gap shifts both up.
        self.thresholds = Thresholds {
            mark_split: (unit + dash) / 2,
            eoc_min: unit + unit * margin / 100 + additional / 2,
            eow_min: 3 * unit + additional + 2 * unit * margin / 100 + adjustment / 2,
        };
        self.dirty = false;
        log::debug!(
            "receiver thresholds: split {} µs, eoc {} µs, eow {} µs",
            self.thresholds.mark_split,
            self.thresholds.eoc_min,
            self.thresholds.eow_min
        );
    }

    fn thresholds(&mut self) -> Thresholds {
        if self.dirty {
            self.resync();
        }
        self.thresholds
    }

    // ── Key events ────────────────────────────────────────────────────────────

    /// Record a key transition at `timestamp` (µs, monotonic).  A down event
    /// classifies the space that just ended; an up event classifies the mark.
    pub fn notify_key_event(&mut self, timestamp: u64, is_down: bool) -> Result<()> {
        if timestamp < self.last_event {
            return Err(Error::InvalidArgument("timestamp earlier than the last event"));
        }
        let thresholds = self.thresholds();
        self.last_event = timestamp;

        if is_down {
            match self.state {
                RecvState::Idle => {
                    self.state = RecvState::InMark;
                    self.mark_start = timestamp;
                }
                RecvState::AfterMarkSpace => {
                    let space = timestamp - self.space_start;
                    if space < thresholds.eoc_min {
                        self.stat_eoe.push(space);
                    } else {
                        // A character boundary passed without a poll; the
                        // buffer must not run two characters together.
                        log::debug!(
                            "discarding unpolled representation {:?}",
                            self.representation
                        );
                        self.representation.clear();
                        if space >= thresholds.eow_min {
                            self.stat_eow.push(space);
                        } else {
                            self.stat_eoc.push(space);
                        }
                    }
                    self.state = RecvState::InMark;
                    self.mark_start = timestamp;
                }
                RecvState::EocGap => {
                    let space = timestamp - self.space_start;
                    if space >= thresholds.eow_min {
                        self.stat_eow.push(space);
                    } else {
                        self.stat_eoc.push(space);
                    }
                    self.representation.clear();
                    self.state = RecvState::InMark;
                    self.mark_start = timestamp;
                }
                RecvState::EowGap => {
                    // The word space was already accounted for at poll time.
                    self.representation.clear();
                    self.state = RecvState::InMark;
                    self.mark_start = timestamp;
                }
                RecvState::Error => {
                    let space = timestamp - self.space_start;
                    if space >= thresholds.eoc_min {
                        // Long enough to close the garbled character.
                        self.representation.clear();
                        self.state = RecvState::InMark;
                    }
                    self.mark_start = timestamp;
                }
                RecvState::InMark => {
                    return Err(Error::InvalidState("key is already down"));
                }
            }
        } else {
            match self.state {
                RecvState::InMark => {
                    let mark = timestamp - self.mark_start;
                    self.classify_mark(mark, thresholds);
                    self.space_start = timestamp;
                }
                RecvState::Error => {
                    self.space_start = timestamp;
                }
                _ => {
                    return Err(Error::InvalidState("key is already up"));
                }
            }
        }
        Ok(())
    }

    fn classify_mark(&mut self, duration: u64, thresholds: Thresholds) {
        let is_dot = duration < thresholds.mark_split;
        if is_dot {
            self.dots.push(duration);
            self.stat_dot.push(duration);
        } else {
            self.dashes.push(duration);
            self.stat_dash.push(duration);
        }
        if self.adaptive {
            self.dirty = true;
        }

        if self.representation.len() >= morse::MAX_REPRESENTATION_LENGTH {
            log::debug!("representation overflow after {:?}", self.representation);
            self.state = RecvState::Error;
            return;
        }
        self.representation.push(if is_dot {
            morse::CW_DOT_REPRESENTATION
        } else {
            morse::CW_DASH_REPRESENTATION
        });
        self.state = RecvState::AfterMarkSpace;
    }

    // ── Polling ───────────────────────────────────────────────────────────────

    /// Fetch a received character once its trailing space is long enough.
    ///
    /// The inter-word space is reported exactly once, as a `' '` character
    /// with `is_end_of_word` set, on a poll after the character itself was
    /// collected; keep re-polling while the space grows.
    pub fn poll_character(&mut self, timestamp: u64) -> Result<Polled> {
        if timestamp < self.last_event {
            return Err(Error::InvalidArgument("timestamp earlier than the last event"));
        }
        let thresholds = self.thresholds();

        match self.state {
            RecvState::Idle => Err(Error::NothingPending),
            RecvState::InMark => Err(Error::Again),
            RecvState::AfterMarkSpace | RecvState::Error => {
                let space = timestamp - self.space_start;
                if space < thresholds.eoc_min {
                    return Err(Error::Again);
                }
                let representation = std::mem::take(&mut self.representation);
                let garbled = self.state == RecvState::Error;
                self.state = RecvState::EocGap;
                match morse::representation_to_character(&representation) {
                    Some(c) if !garbled => {
                        if space >= thresholds.eow_min {
                            self.state = RecvState::EowGap;
                            self.stat_eow.push(space);
                            Ok(Polled {
                                character: c,
                                is_end_of_word: true,
                                is_error: false,
                            })
                        } else {
                            Ok(Polled {
                                character: c,
                                is_end_of_word: false,
                                is_error: false,
                            })
                        }
                    }
                    _ => Err(Error::UnknownRepresentation(representation)),
                }
            }
            RecvState::EocGap => {
                let space = timestamp - self.space_start;
                if space >= thresholds.eow_min {
                    self.state = RecvState::EowGap;
                    self.stat_eow.push(space);
                    Ok(Polled {
                        character: ' ',
                        is_end_of_word: true,
                        is_error: false,
                    })
                } else {
                    Err(Error::Again)
                }
            }
            RecvState::EowGap => Err(Error::NothingPending),
        }
    }

    /// Like [`Receiver::poll_character`] but yields the raw dot/dash buffer;
    /// a garbled (overflowed) buffer is returned with `is_error` set instead
    /// of failing.
    pub fn poll_representation(&mut self, timestamp: u64) -> Result<PolledRepresentation> {
        if timestamp < self.last_event {
            return Err(Error::InvalidArgument("timestamp earlier than the last event"));
        }
        let thresholds = self.thresholds();

        match self.state {
            RecvState::Idle => Err(Error::NothingPending),
            RecvState::InMark => Err(Error::Again),
            RecvState::AfterMarkSpace | RecvState::Error => {
                let space = timestamp - self.space_start;
                if space < thresholds.eoc_min {
                    return Err(Error::Again);
                }
                let representation = std::mem::take(&mut self.representation);
                let is_error = self.state == RecvState::Error;
                let is_end_of_word = space >= thresholds.eow_min;
                self.state = if is_end_of_word {
                    self.stat_eow.push(space);
                    RecvState::EowGap
                } else {
                    RecvState::EocGap
                };
                Ok(PolledRepresentation {
                    representation,
                    is_end_of_word,
                    is_error,
                })
            }
            RecvState::EocGap => {
                let space = timestamp - self.space_start;
                if space >= thresholds.eow_min {
                    self.state = RecvState::EowGap;
                    self.stat_eow.push(space);
                    Ok(PolledRepresentation {
                        representation: String::new(),
                        is_end_of_word: true,
                        is_error: false,
                    })
                } else {
                    Err(Error::Again)
                }
            }
            RecvState::EowGap => Err(Error::NothingPending),
        }
    }

    /// Forget any mark or space in progress; statistics and the adaptive
    /// estimate survive.
    pub fn reset(&mut self) {
        self.state = RecvState::Idle;
        self.representation.clear();
    }

    pub fn statistics(&self) -> ReceiverStatistics {
        ReceiverStatistics {
            dot: self.stat_dot.stats(),
            dash: self.stat_dash.stats(),
            inter_mark: self.stat_eoe.stats(),
            inter_character: self.stat_eoc.stats(),
            inter_word: self.stat_eow.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Feed one character's representation as key events, starting at `t`.
    /// Returns the timestamp of the final key-up.
    fn feed_character(rec: &mut Receiver, rep: &str, unit: u64, mut t: u64) -> u64 {
        for (i, sym) in rep.chars().enumerate() {
            if i > 0 {
                t += unit; // inter-mark space
            }
            rec.notify_key_event(t, true).unwrap();
            t += if sym == '-' { 3 * unit } else { unit };
            rec.notify_key_event(t, false).unwrap();
        }
        t
    }

    #[test]
    fn test_receive_single_character() {
        let mut rec = Receiver::new();
        rec.set_speed(20).unwrap();
        let unit = 60_000;

        let end = feed_character(&mut rec, ".-", unit, 1_000_000);
        // Mid-gap the character is not ready yet.
        assert!(matches!(rec.poll_character(end + unit / 2), Err(Error::Again)));
        let polled = rec.poll_character(end + 3 * unit).unwrap();
        assert_eq!(polled.character, 'A');
        assert!(!polled.is_end_of_word);
    }

    #[test]
    fn test_receive_word_space_reported_once() {
        let mut rec = Receiver::new();
        rec.set_speed(20).unwrap();
        let unit = 60_000;

        let end = feed_character(&mut rec, "...", unit, 1_000_000);
        let polled = rec.poll_character(end + 3 * unit).unwrap();
        assert_eq!(polled.character, 'S');
        assert!(!polled.is_end_of_word);

        // The pending space keeps growing: re-polls say Again until the
        // word threshold, then the space is delivered exactly once.
        assert!(matches!(
            rec.poll_character(end + 3 * unit + unit / 2),
            Err(Error::Again)
        ));
        let space = rec.poll_character(end + 7 * unit).unwrap();
        assert_eq!(space.character, ' ');
        assert!(space.is_end_of_word);
        assert!(matches!(
            rec.poll_character(end + 9 * unit),
            Err(Error::NothingPending)
        ));
    }

    #[test]
    fn test_poll_representation_matches_keying() {
        let mut rec = Receiver::new();
        rec.set_speed(20).unwrap();
        let unit = 60_000;

        let end = feed_character(&mut rec, "-.-.", unit, 500_000);
        let polled = rec.poll_representation(end + 3 * unit).unwrap();
        assert_eq!(polled.representation, "-.-.");
        assert!(!polled.is_error);
    }

    #[test]
    fn test_unknown_representation_is_enoent() {
        let mut rec = Receiver::new();
        rec.set_speed(20).unwrap();
        let unit = 60_000;

        // "......." is well-formed but unmapped.
        let end = feed_character(&mut rec, ".......", unit, 500_000);
        match rec.poll_character(end + 3 * unit) {
            Err(Error::UnknownRepresentation(rep)) => assert_eq!(rep, "......."),
            other => panic!("expected UnknownRepresentation, got {other:?}"),
        }
    }

    #[test]
    fn test_overflow_sets_error_and_recovers() {
        let mut rec = Receiver::new();
        rec.set_speed(20).unwrap();
        let unit = 60_000;

        // Eight dots: one more mark than a representation can hold.
        let end = feed_character(&mut rec, "........", unit, 500_000);
        let polled = rec.poll_representation(end + 3 * unit).unwrap();
        assert!(polled.is_error);

        // The next character decodes normally.
        let end = feed_character(&mut rec, ".", unit, end + 6 * unit);
        let polled = rec.poll_character(end + 3 * unit).unwrap();
        assert_eq!(polled.character, 'E');
    }

    #[test]
    fn test_out_of_order_timestamps_rejected() {
        let mut rec = Receiver::new();
        rec.notify_key_event(1_000, true).unwrap();
        assert!(matches!(
            rec.notify_key_event(500, false),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            rec.poll_character(500),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_mismatched_transitions_rejected() {
        let mut rec = Receiver::new();
        rec.notify_key_event(1_000, true).unwrap();
        assert!(matches!(
            rec.notify_key_event(2_000, true),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_poll_on_idle_receiver() {
        let mut rec = Receiver::new();
        assert!(matches!(rec.poll_character(10_000), Err(Error::NothingPending)));
    }

    #[test]
    fn test_adaptive_speed_tracks_sender() {
        let mut rec = Receiver::new();
        rec.set_speed(20).unwrap();
        rec.set_adaptive(true);

        let mut t = 1_000_000;

        // Ten characters at 20 WPM (60 ms unit) …
        let unit20 = 60_000;
        for _ in 0..10 {
            let end = feed_character(&mut rec, ".-", unit20, t);
            let polled = rec.poll_character(end + 3 * unit20).unwrap();
            assert_eq!(polled.character, 'A');
            t = end + 3 * unit20;
        }
        let at_20 = rec.speed();
        assert!((19..=21).contains(&at_20), "estimate {at_20} after 20 WPM");

        // … then the sender slows to 15 WPM (80 ms unit); the estimate
        // converges within five characters.
        let unit15 = 80_000;
        for _ in 0..5 {
            let end = feed_character(&mut rec, ".-", unit15, t);
            let polled = rec.poll_character(end + 3 * unit15).unwrap();
            assert_eq!(polled.character, 'A');
            t = end + 3 * unit15;
        }
        let at_15 = rec.speed();
        assert!((13..=17).contains(&at_15), "estimate {at_15} after 15 WPM");
    }

    #[test]
    fn test_statistics_accumulate_per_type() {
        let mut rec = Receiver::new();
        rec.set_speed(20).unwrap();
        let unit = 60_000;

        let end = feed_character(&mut rec, ".-.", unit, 1_000_000);
        let _ = rec.poll_character(end + 3 * unit);

        let stats = rec.statistics();
        assert_eq!(stats.dot.count, 2);
        assert_eq!(stats.dash.count, 1);
        assert_eq!(stats.inter_mark.count, 2);
        assert_eq!(stats.dot.mean, unit);
        assert_eq!(stats.dash.mean, 3 * unit);
    }

    #[test]
    fn test_parameter_validation() {
        let mut rec = Receiver::new();
        assert!(matches!(rec.set_speed(3), Err(Error::InvalidArgument(_))));
        assert!(matches!(rec.set_tolerance(91), Err(Error::InvalidArgument(_))));
        assert!(matches!(rec.set_gap(61), Err(Error::InvalidArgument(_))));
        rec.set_speed(25).unwrap();
        rec.set_tolerance(30).unwrap();
        rec.set_gap(1).unwrap();
        assert_eq!(rec.speed(), 25);
        assert_eq!(rec.tolerance(), 30);
        assert_eq!(rec.gap(), 1);
    }
}
