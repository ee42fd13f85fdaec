//! Delay and echo effects
//!
//! Tap-based offline delay with feedback, a BPM-synced variant, and the
//! delay tail used by ECHO_OUT and HARD_CUT transitions: the dry signal
//! fades to silence while the echoes keep ringing.

use serde::{Deserialize, Serialize};

/// Beat fractions accepted by the synced delay
pub const SYNC_FRACTIONS: [f32; 5] = [0.25, 0.5, 0.75, 1.0, 1.5];

/// Echoes below this level stop contributing
const TAP_FLOOR: f32 = 0.01;

/// Residual level treated as silence when trimming tails
const SILENCE_THRESHOLD: f32 = 1e-3;

/// Delay parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DelayParams {
    pub delay_ms: f32,
    /// Feedback per tap, clamped to [0, 0.9]
    pub feedback: f32,
    /// Wet/dry mix in [0, 1]
    pub mix: f32,
    pub num_taps: usize,
}

impl Default for DelayParams {
    fn default() -> Self {
        Self {
            delay_ms: 250.0,
            feedback: 0.4,
            mix: 0.3,
            num_taps: 8,
        }
    }
}

/// Apply a delay effect
///
/// The output is longer than the input: echoes ring past the end, up to a
/// two-second tail.
pub fn apply_delay(samples: &[f32], params: &DelayParams, sample_rate: u32) -> Vec<f32> {
    let delay_samples = (params.delay_ms / 1000.0 * sample_rate as f32) as usize;
    if delay_samples == 0 || delay_samples >= samples.len() || samples.is_empty() {
        return samples.to_vec();
    }

    let feedback = params.feedback.clamp(0.0, 0.9);
    let mix = params.mix.clamp(0.0, 1.0);

    let output_len = samples.len() + delay_samples * params.num_taps;
    let mut wet = vec![0.0f32; output_len];

    for tap in 1..=params.num_taps {
        let level = feedback.powi(tap as i32);
        if level < TAP_FLOOR {
            break;
        }
        let offset = delay_samples * tap;
        if offset >= output_len {
            break;
        }
        let span = samples.len().min(output_len - offset);
        for i in 0..span {
            wet[offset + i] += samples[i] * level;
        }
    }

    let mut output = vec![0.0f32; output_len];
    for i in 0..output_len {
        let dry = if i < samples.len() { samples[i] } else { 0.0 };
        output[i] = dry * (1.0 - mix) + wet[i] * mix;
    }

    // Keep the original plus at most a two-second tail
    let max_len = samples.len() + 2 * sample_rate as usize;
    output.truncate(max_len);
    output
}

/// Apply a BPM-synchronized delay
///
/// `beat_fraction` is snapped to the nearest supported value: 1/4 for fast
/// rhythmic echo, 1/2 for a groovy medium, 1 for a standard beat echo, 3/4
/// for syncopation, 3/2 for a dotted feel.
pub fn apply_delay_bpm_sync(
    samples: &[f32],
    bpm: f32,
    beat_fraction: f32,
    feedback: f32,
    mix: f32,
    num_taps: usize,
    sample_rate: u32,
) -> Vec<f32> {
    let fraction = snap_fraction(beat_fraction);
    let beat_ms = 60_000.0 / bpm;
    apply_delay(
        samples,
        &DelayParams {
            delay_ms: beat_ms * fraction,
            feedback,
            mix,
            num_taps,
        },
        sample_rate,
    )
}

fn snap_fraction(requested: f32) -> f32 {
    SYNC_FRACTIONS
        .iter()
        .copied()
        .min_by(|a, b| {
            (a - requested)
                .abs()
                .partial_cmp(&(b - requested).abs())
                .unwrap()
        })
        .unwrap_or(0.5)
}

/// Create a delay tail: dry fades out, echoes ring on
///
/// From `tail_start` the dry signal fades to zero over `fade_out_s` while a
/// wet-heavy synced delay keeps repeating until it decays below the silence
/// threshold. Used by ECHO_OUT and delay-flavoured HARD_CUT exits.
pub fn create_delay_tail(
    samples: &[f32],
    tail_start: usize,
    bpm: f32,
    beat_fraction: f32,
    feedback: f32,
    fade_out_s: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let tail_start = if tail_start >= samples.len() {
        samples.len().saturating_sub(sample_rate as usize / 2)
    } else {
        tail_start
    };

    // Fade the dry tail section
    let mut tail: Vec<f32> = samples[tail_start..].to_vec();
    let fade_samples = ((fade_out_s * sample_rate as f32) as usize).min(tail.len());
    for (i, s) in tail.iter_mut().enumerate() {
        if i < fade_samples {
            *s *= 1.0 - i as f32 / fade_samples as f32;
        } else {
            *s = 0.0;
        }
    }

    // Wet-heavy delay with extra taps carries the echo past the fade
    let delayed = apply_delay_bpm_sync(&tail, bpm, beat_fraction, feedback, 0.8, 12, sample_rate);

    let mut output = Vec::with_capacity(tail_start + delayed.len());
    output.extend_from_slice(&samples[..tail_start]);
    output.extend_from_slice(&delayed);

    trim_silence(&mut output, sample_rate);
    output
}

/// Trim trailing silence, leaving a 100 ms pad after the last audible sample
pub(crate) fn trim_silence(samples: &mut Vec<f32>, sample_rate: u32) {
    if let Some(last) = samples.iter().rposition(|&s| s.abs() > SILENCE_THRESHOLD) {
        samples.truncate(last + sample_rate as usize / 10);
    }
}
