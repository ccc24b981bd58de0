// src/generator/synth.rs  —  PCM sample synthesis with slope shaping

use crate::tonequeue::{SlopeShape, Tone};

/// Samples a duration covers at a given rate.
pub(crate) fn usecs_to_samples(usecs: u32, sample_rate: u32) -> usize {
    (u64::from(usecs) * u64::from(sample_rate) / 1_000_000) as usize
}

fn slope_value(shape: SlopeShape, x: f64) -> f64 {
    match shape {
        SlopeShape::Linear => x,
        SlopeShape::RaisedCosine => 0.5 * (1.0 - (std::f64::consts::PI * x).cos()),
        SlopeShape::Sine => (std::f64::consts::FRAC_PI_2 * x).sin(),
        SlopeShape::Rectangular => 1.0,
    }
}

/// Envelope factor for sample `i` of a tone.
///
/// `total` is `None` for a forever tone: it rises once and never falls.
fn envelope(shape: SlopeShape, i: usize, slope_samples: usize, total: Option<usize>) -> f64 {
    if slope_samples == 0 || shape == SlopeShape::Rectangular {
        return 1.0;
    }
    if i < slope_samples {
        return slope_value(shape, i as f64 / slope_samples as f64);
    }
    if let Some(total) = total {
        if i + slope_samples >= total {
            let remaining = total.saturating_sub(i + 1);
            return slope_value(shape, remaining as f64 / slope_samples as f64);
        }
    }
    1.0
}

/// Fill `buf` with the samples of `tone` starting at `start_sample`.
///
/// The phase accumulator (in cycles, [0,1)) carries across buffers so a tone
/// spanning several writes stays continuous; silence resets it so every mark
/// starts at a zero crossing.
pub(crate) fn fill(
    buf: &mut [i16],
    tone: &Tone,
    start_sample: usize,
    total_samples: Option<usize>,
    amplitude: f64,
    sample_rate: u32,
    phase: &mut f64,
) {
    if tone.is_silence() {
        buf.fill(0);
        *phase = 0.0;
        return;
    }

    let slope_samples = {
        let n = usecs_to_samples(tone.slope_len, sample_rate);
        match total_samples {
            Some(total) => n.min(total / 2),
            None => n,
        }
    };
    let step = f64::from(tone.frequency) / f64::from(sample_rate);

    for (k, slot) in buf.iter_mut().enumerate() {
        let i = start_sample + k;
        let env = envelope(tone.slope_shape, i, slope_samples, total_samples);
        let value = (*phase * std::f64::consts::TAU).sin() * amplitude * env;
        *slot = value as i16;
        *phase = (*phase + step) % 1.0;
    }
}
