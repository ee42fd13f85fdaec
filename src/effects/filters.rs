//! Butterworth filters and frequency sweeps
//!
//! The DJ's EQ toolkit:
//! - HPF removes bass; the track "fades into the distance"
//! - LPF removes highs; the track sounds muffled, underwater
//! - Sweeps interpolate the cutoff over time for smooth exits and reveals
//!
//! Filters are fourth-order Butterworth built from two cascaded biquad
//! sections and run forward-backward for zero phase shift. Cutoffs are
//! clamped to [20, nyquist - 100] Hz.

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

/// Q values of the two second-order sections of a 4th-order Butterworth
const BUTTERWORTH_4TH_Q: [f32; 2] = [0.541_196_1, 1.306_563_0];

/// Sweep chunk length in seconds
const SWEEP_CHUNK_S: f32 = 0.05;

/// Crossfade between sweep chunks in samples
const SWEEP_XFADE: usize = 64;

/// Filter direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    HighPass,
    LowPass,
}

/// Interpolation curve for a frequency sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepCurve {
    Linear,
    /// Sounds more natural: equal musical intervals per unit time
    Exponential,
}

fn clamp_cutoff(cutoff_hz: f32, sample_rate: u32) -> f32 {
    let nyquist = sample_rate as f32 / 2.0;
    cutoff_hz.clamp(20.0, nyquist - 100.0)
}

fn cascade(kind: FilterKind, cutoff_hz: f32, sample_rate: u32) -> Vec<DirectForm2Transposed<f32>> {
    let cutoff = clamp_cutoff(cutoff_hz, sample_rate);
    let filter_type = match kind {
        FilterKind::HighPass => Type::HighPass,
        FilterKind::LowPass => Type::LowPass,
    };
    BUTTERWORTH_4TH_Q
        .iter()
        .map(|&q| {
            let coeffs = Coefficients::<f32>::from_params(
                filter_type,
                (sample_rate as f32).hz(),
                cutoff.hz(),
                q,
            )
            .expect("cutoff clamped into valid range");
            DirectForm2Transposed::<f32>::new(coeffs)
        })
        .collect()
}

fn run_cascade(samples: &[f32], kind: FilterKind, cutoff_hz: f32, sample_rate: u32) -> Vec<f32> {
    let mut sections = cascade(kind, cutoff_hz, sample_rate);
    samples
        .iter()
        .map(|&s| sections.iter_mut().fold(s, |acc, f| f.run(acc)))
        .collect()
}

/// Apply a zero-phase 4th-order Butterworth filter
///
/// Runs the cascade forward, then backward over the reversed signal, which
/// cancels the phase delay at the cost of doubling the effective rolloff.
pub fn apply_filter(
    samples: &[f32],
    kind: FilterKind,
    cutoff_hz: f32,
    sample_rate: u32,
) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }
    let forward = run_cascade(samples, kind, cutoff_hz, sample_rate);
    let reversed: Vec<f32> = forward.into_iter().rev().collect();
    let backward = run_cascade(&reversed, kind, cutoff_hz, sample_rate);
    backward.into_iter().rev().collect()
}

/// High-pass filter: removes content below the cutoff
///
/// 20 Hz is effectively off; 500-1000 Hz thins the track out; 2 kHz and up
/// leaves only air.
pub fn apply_hpf(samples: &[f32], cutoff_hz: f32, sample_rate: u32) -> Vec<f32> {
    apply_filter(samples, FilterKind::HighPass, cutoff_hz, sample_rate)
}

/// Low-pass filter: removes content above the cutoff
pub fn apply_lpf(samples: &[f32], cutoff_hz: f32, sample_rate: u32) -> Vec<f32> {
    apply_filter(samples, FilterKind::LowPass, cutoff_hz, sample_rate)
}

/// Band-pass: HPF at the low edge cascaded with LPF at the high edge
pub fn apply_bandpass(samples: &[f32], low_hz: f32, high_hz: f32, sample_rate: u32) -> Vec<f32> {
    let highpassed = apply_hpf(samples, low_hz, sample_rate);
    apply_lpf(&highpassed, high_hz, sample_rate)
}

/// Apply a filter sweep: the cutoff glides from `start_hz` to `end_hz`
///
/// The signal is processed in 50 ms chunks whose cutoff follows the sweep
/// curve; adjacent chunks are crossfaded over 64 samples to avoid clicks at
/// the coefficient switches.
pub fn create_filter_sweep(
    samples: &[f32],
    kind: FilterKind,
    start_hz: f32,
    end_hz: f32,
    curve: SweepCurve,
    sample_rate: u32,
) -> Vec<f32> {
    let n = samples.len();
    if n == 0 {
        return Vec::new();
    }

    let chunk_len = ((SWEEP_CHUNK_S * sample_rate as f32) as usize).max(SWEEP_XFADE * 2);
    let num_chunks = n.div_ceil(chunk_len);

    let start = clamp_cutoff(start_hz, sample_rate);
    let end = clamp_cutoff(end_hz, sample_rate);

    let cutoff_at = |progress: f32| -> f32 {
        match curve {
            SweepCurve::Linear => start + (end - start) * progress,
            SweepCurve::Exponential => start * (end / start).powf(progress),
        }
    };

    let mut output = vec![0.0f32; n];

    for chunk_idx in 0..num_chunks {
        let chunk_start = chunk_idx * chunk_len;
        let chunk_end = ((chunk_idx + 1) * chunk_len).min(n);

        // Extend the slice backward so the crossfade region is filtered with
        // this chunk's cutoff too
        let ext_start = chunk_start.saturating_sub(SWEEP_XFADE);
        let progress = (chunk_start + chunk_end) as f32 / 2.0 / n as f32;
        let filtered = run_cascade(
            &samples[ext_start..chunk_end],
            kind,
            cutoff_at(progress),
            sample_rate,
        );
        let head = chunk_start - ext_start;

        if chunk_idx == 0 || head == 0 {
            output[chunk_start..chunk_end].copy_from_slice(&filtered[head..]);
        } else {
            // Crossfade the extension region against the previous chunk's
            // already-written tail
            for i in 0..head {
                let t = i as f32 / head as f32;
                output[ext_start + i] = output[ext_start + i] * (1.0 - t) + filtered[i] * t;
            }
            output[chunk_start..chunk_end].copy_from_slice(&filtered[head..]);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::rms;

    const SR: u32 = 44_100;

    fn sine(freq: f32, seconds: f32) -> Vec<f32> {
        let n = (SR as f32 * seconds) as usize;
        (0..n)
            .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / SR as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_lpf_kills_highs_keeps_lows() {
        let low = sine(100.0, 0.5);
        let high = sine(8000.0, 0.5);

        let low_out = apply_lpf(&low, 1000.0, SR);
        let high_out = apply_lpf(&high, 1000.0, SR);

        assert!(rms(&low_out) > rms(&low) * 0.8);
        assert!(rms(&high_out) < rms(&high) * 0.05);
    }

    #[test]
    fn test_hpf_kills_lows_keeps_highs() {
        let low = sine(100.0, 0.5);
        let high = sine(8000.0, 0.5);

        let low_out = apply_hpf(&low, 1000.0, SR);
        let high_out = apply_hpf(&high, 1000.0, SR);

        assert!(rms(&low_out) < rms(&low) * 0.05);
        assert!(rms(&high_out) > rms(&high) * 0.8);
    }

    #[test]
    fn test_bandpass_keeps_band() {
        let inside = sine(1000.0, 0.5);
        let below = sine(50.0, 0.5);
        let above = sine(10_000.0, 0.5);

        assert!(rms(&apply_bandpass(&inside, 300.0, 3000.0, SR)) > rms(&inside) * 0.7);
        assert!(rms(&apply_bandpass(&below, 300.0, 3000.0, SR)) < rms(&below) * 0.1);
        assert!(rms(&apply_bandpass(&above, 300.0, 3000.0, SR)) < rms(&above) * 0.1);
    }

    #[test]
    fn test_cutoff_clamps_to_valid_range() {
        let buf = sine(440.0, 0.2);
        // Should not panic on absurd cutoffs
        let _ = apply_lpf(&buf, 0.0, SR);
        let _ = apply_hpf(&buf, 1_000_000.0, SR);
    }

    #[test]
    fn test_sweep_silences_bass_by_the_end() {
        // HPF sweep from 20 Hz to 2 kHz over a 100 Hz tone: the head passes,
        // the tail is gone
        let tone = sine(100.0, 2.0);
        let swept = create_filter_sweep(
            &tone,
            FilterKind::HighPass,
            20.0,
            2000.0,
            SweepCurve::Exponential,
            SR,
        );

        let head = &swept[..SR as usize / 4];
        let tail = &swept[swept.len() - SR as usize / 4..];
        assert!(rms(head) > rms(tail) * 4.0, "head {} tail {}", rms(head), rms(tail));
    }

    #[test]
    fn test_sweep_has_no_clicks() {
        // A click shows as a sample-to-sample jump far beyond what a 100 Hz
        // tone can produce
        let tone = sine(100.0, 1.0);
        let swept = create_filter_sweep(
            &tone,
            FilterKind::LowPass,
            20_000.0,
            200.0,
            SweepCurve::Exponential,
            SR,
        );
        let max_jump = swept
            .windows(2)
            .map(|w| (w[1] - w[0]).abs())
            .fold(0.0f32, f32::max);
        assert!(max_jump < 0.1, "max jump {}", max_jump);
    }

    #[test]
    fn test_sweep_preserves_length() {
        let tone = sine(440.0, 0.73);
        let swept = create_filter_sweep(
            &tone,
            FilterKind::LowPass,
            20_000.0,
            500.0,
            SweepCurve::Linear,
            SR,
        );
        assert_eq!(swept.len(), tone.len());
    }
}
