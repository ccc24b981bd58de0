// src/morse/timing.rs  —  WPM/weighting/gap → element intervals (PARIS standard)

use crate::errors::{Error, Result};

// ── Parameter limits ──────────────────────────────────────────────────────────

pub const SPEED_MIN: u32 = 4; // WPM
pub const SPEED_MAX: u32 = 60;
pub const FREQUENCY_MIN: u32 = 0; // Hz; 0 = silent
pub const FREQUENCY_MAX: u32 = 4_000;
pub const VOLUME_MIN: u32 = 0; // percent
pub const VOLUME_MAX: u32 = 100;
pub const GAP_MIN: u32 = 0; // dot units of extra inter-character silence
pub const GAP_MAX: u32 = 60;
pub const WEIGHTING_MIN: u32 = 20; // percent; 50 = neutral
pub const WEIGHTING_MAX: u32 = 80;
pub const TOLERANCE_MIN: u32 = 0; // percent, receive side
pub const TOLERANCE_MAX: u32 = 90;

/// PARIS standard: dot length in µs = 1_200_000 / wpm.
pub const DOT_CALIBRATION: u64 = 1_200_000;

// ── Derived intervals ─────────────────────────────────────────────────────────

/// All interval durations in microseconds, derived from one unit length.
///
/// PARIS carries 22 mark units and 28 space units.  Weighting moves `w` µs
/// from every space unit onto every mark unit at a 22:28 exchange rate, so
/// the average character duration stays equal to the unweighted value:
///
/// * marks gain `22·w` over PARIS (`dot = unit + w`, `dash = 3·dot`),
/// * each space unit gives back `22·w/28`.
///
/// `eoc` and `eow` are the *closing* silences enqueued after a character and
/// a word; the full inter-character space is `eoe + eoc` (3 units + gap) and
/// the full inter-word space is `eoe + eoc + eow` (7 units + gap).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Dot mark, 1 unit plus weighting.
    pub dot: u32,
    /// Dash mark, 3 dots.
    pub dash: u32,
    /// Inter-mark silence within a character, 1 unit worth.
    pub eoe: u32,
    /// Closing silence completing a character, 2 units worth plus `additional`.
    pub eoc: u32,
    /// Closing silence completing a word, 4 units worth.
    pub eow: u32,
    /// Extra inter-character silence from the gap parameter, `gap · unit`.
    pub additional: u32,
    /// Proportional word-gap stretch a gapped sender produces, `7·additional/3`;
    /// consumed by the receiver's end-of-word threshold.
    pub adjustment: u32,
}

impl Timing {
    /// Derive every interval.  Inputs are assumed validated against the
    /// limits above; derivation is pure and idempotent.
    pub fn derive(wpm: u32, weighting: u32, gap: u32) -> Self {
        let unit = (DOT_CALIBRATION / u64::from(wpm)) as i64;
        let w = 2 * (i64::from(weighting) - 50) * unit / 100;

        let dot = unit + w;
        let dash = 3 * dot;
        let eoe = unit - 22 * w / 28;
        let additional = i64::from(gap) * unit;
        let eoc = 2 * unit - 44 * w / 28 + additional;
        let eow = 4 * unit - 88 * w / 28;
        let adjustment = 7 * additional / 3;

        Self {
            dot: dot as u32,
            dash: dash as u32,
            eoe: eoe as u32,
            eoc: eoc as u32,
            eow: eow as u32,
            additional: additional as u32,
            adjustment: adjustment as u32,
        }
    }

    /// The unweighted unit length for a speed, µs.
    pub fn unit(wpm: u32) -> u32 {
        (DOT_CALIBRATION / u64::from(wpm)) as u32
    }
}

// ── Send-side parameter block ─────────────────────────────────────────────────

/// Validated send parameters with lazy interval re-derivation.
///
/// Setters only mark the block dirty; [`SendParams::timing`] recomputes on
/// next use.
#[derive(Debug, Clone)]
pub struct SendParams {
    wpm: u32,
    frequency: u32,
    volume: u32,
    gap: u32,
    weighting: u32,
    dirty: bool,
    cached: Timing,
}

impl Default for SendParams {
    fn default() -> Self {
        Self::new()
    }
}

impl SendParams {
    pub fn new() -> Self {
        let wpm = 18;
        let weighting = 50;
        let gap = 0;
        Self {
            wpm,
            frequency: 620,
            volume: 70,
            gap,
            weighting,
            dirty: false,
            cached: Timing::derive(wpm, weighting, gap),
        }
    }

    pub fn set_speed(&mut self, wpm: u32) -> Result<()> {
        if !(SPEED_MIN..=SPEED_MAX).contains(&wpm) {
            return Err(Error::InvalidArgument("speed out of range 4..=60 WPM"));
        }
        self.wpm = wpm;
        self.dirty = true;
        Ok(())
    }

    pub fn set_frequency(&mut self, hz: u32) -> Result<()> {
        if hz > FREQUENCY_MAX {
            return Err(Error::InvalidArgument("frequency out of range 0..=4000 Hz"));
        }
        self.frequency = hz;
        Ok(())
    }

    pub fn set_volume(&mut self, percent: u32) -> Result<()> {
        if percent > VOLUME_MAX {
            return Err(Error::InvalidArgument("volume out of range 0..=100 %"));
        }
        self.volume = percent;
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

    pub fn set_weighting(&mut self, percent: u32) -> Result<()> {
        if !(WEIGHTING_MIN..=WEIGHTING_MAX).contains(&percent) {
            return Err(Error::InvalidArgument("weighting out of range 20..=80 %"));
        }
        self.weighting = percent;
        self.dirty = true;
        Ok(())
    }

    pub fn speed(&self) -> u32 {
        self.wpm
    }
    pub fn frequency(&self) -> u32 {
        self.frequency
    }
    pub fn volume(&self) -> u32 {
        self.volume
    }
    pub fn gap(&self) -> u32 {
        self.gap
    }
    pub fn weighting(&self) -> u32 {
        self.weighting
    }

    /// Current intervals, re-derived if a setter ran since the last call.
    pub fn timing(&mut self) -> Timing {
        if self.dirty {
            self.cached = Timing::derive(self.wpm, self.weighting, self.gap);
            self.dirty = false;
        }
        self.cached
    }
}
