//! Pitch-preserving time-stretch and stretch-ratio planning
//!
//! Tempo matching stretches track B onto track A's grid. Ratios are bounded
//! to ±8%: past that the artifacts are audible and the planner should have
//! chosen a hard cut instead. Half-time and double-time factors are
//! considered whenever they bring the ratio closer to 1.0.
//!
//! The default [`TimeStretcher`] is a phase vocoder; production deployments
//! can plug a dedicated engine in behind the trait.

use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SegueError};
use crate::theory::TempoFactor;

/// Maximum allowed tempo change (+8%)
pub const MAX_STRETCH_RATIO: f32 = 1.08;
/// Minimum allowed tempo change (-8%)
pub const MIN_STRETCH_RATIO: f32 = 0.92;

/// Ratio below which stretching is skipped entirely
const IDENTITY_EPSILON: f32 = 0.001;

/// The stretch the planner asked for
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StretchPlan {
    /// >1 speeds the audio up (shorter), <1 slows it down
    pub ratio: f32,
    pub factor: TempoFactor,
    pub within_limits: bool,
}

/// Calculate the stretch ratio to take `source_bpm` to `target_bpm`
///
/// Checks the half-time and double-time interpretations of the target and
/// picks whichever candidate lies closest to 1.0.
pub fn calculate_stretch_ratio(source_bpm: f32, target_bpm: f32) -> StretchPlan {
    let candidates = [
        (target_bpm / source_bpm, TempoFactor::Normal),
        (target_bpm / 2.0 / source_bpm, TempoFactor::HalfTime),
        (target_bpm * 2.0 / source_bpm, TempoFactor::DoubleTime),
    ];

    let (ratio, factor) = candidates
        .into_iter()
        .min_by(|a, b| {
            (a.0 - 1.0)
                .abs()
                .partial_cmp(&(b.0 - 1.0).abs())
                .unwrap()
        })
        .unwrap();

    if factor != TempoFactor::Normal {
        log::info!(
            "using {:?} ratio {:.4} for {} -> {} BPM",
            factor,
            ratio,
            source_bpm,
            target_bpm
        );
    }

    StretchPlan {
        ratio,
        factor,
        within_limits: (MIN_STRETCH_RATIO..=MAX_STRETCH_RATIO).contains(&ratio),
    }
}

/// Clamp a ratio into the safe range, reporting whether clamping occurred
pub fn clamp_ratio(ratio: f32) -> (f32, bool) {
    let clamped = ratio.clamp(MIN_STRETCH_RATIO, MAX_STRETCH_RATIO);
    (clamped, clamped != ratio)
}

/// Pitch-preserving time-stretch port
pub trait TimeStretcher: Send + Sync {
    /// Stretch audio by `ratio` (>1 = faster/shorter) without changing pitch
    ///
    /// Implementations may assume the ratio is already inside the safe
    /// range; out-of-range input is an error.
    fn stretch(&self, samples: &[f32], sample_rate: u32, ratio: f32) -> Result<Vec<f32>>;
}

/// Stretch audio so it plays at `target_bpm` instead of `source_bpm`
///
/// The ratio is clamped to the safe range; the achieved BPM is returned so
/// callers can rescale beat grids. Near-identity ratios skip processing.
pub fn stretch_to_bpm(
    stretcher: &dyn TimeStretcher,
    samples: &[f32],
    sample_rate: u32,
    source_bpm: f32,
    target_bpm: f32,
) -> Result<(Vec<f32>, f32, f32)> {
    let plan = calculate_stretch_ratio(source_bpm, target_bpm);
    let (ratio, clamped) = clamp_ratio(plan.ratio);

    if clamped {
        log::warn!(
            "stretch ratio {:.3} clamped to {:.3} ({} -> {} BPM)",
            plan.ratio,
            ratio,
            source_bpm,
            target_bpm
        );
    }

    if (ratio - 1.0).abs() < IDENTITY_EPSILON {
        return Ok((samples.to_vec(), source_bpm, 1.0));
    }

    let stretched = stretcher.stretch(samples, sample_rate, ratio)?;
    let actual_bpm = source_bpm * ratio;
    Ok((stretched, actual_bpm, ratio))
}

/// Phase-vocoder time-stretcher
///
/// STFT with a 4096-sample Hann window and 75% overlap; phase propagation
/// keeps partials coherent across the resampled frame positions. Quality is
/// adequate inside the ±8% range the engine allows.
pub struct PhaseVocoder {
    frame_len: usize,
}

impl Default for PhaseVocoder {
    fn default() -> Self {
        Self { frame_len: 4096 }
    }
}

impl PhaseVocoder {
    pub fn new(frame_len: usize) -> Self {
        Self {
            frame_len: frame_len.next_power_of_two().max(256),
        }
    }
}

impl TimeStretcher for PhaseVocoder {
    fn stretch(&self, samples: &[f32], _sample_rate: u32, ratio: f32) -> Result<Vec<f32>> {
        if !(MIN_STRETCH_RATIO..=MAX_STRETCH_RATIO).contains(&ratio) {
            return Err(SegueError::StretchOutOfRange {
                requested: ratio,
                clamped: ratio.clamp(MIN_STRETCH_RATIO, MAX_STRETCH_RATIO),
            });
        }
        if (ratio - 1.0).abs() < IDENTITY_EPSILON {
            return Ok(samples.to_vec());
        }

        let frame = self.frame_len;
        if samples.len() < frame * 2 {
            // Too short to analyze; resampling artifacts beat silence here
            return Ok(samples.to_vec());
        }

        let hop_syn = frame / 4;
        let hop_ana = hop_syn as f64 * ratio as f64;
        let half = frame / 2 + 1;

        let window: Vec<f32> = (0..frame)
            .map(|i| {
                let x = i as f32 / frame as f32;
                0.5 - 0.5 * (2.0 * std::f32::consts::PI * x).cos()
            })
            .collect();

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(frame);
        let ifft = planner.plan_fft_inverse(frame);

        let num_frames = ((samples.len() - frame) as f64 / hop_ana).floor() as usize + 1;
        let out_len = (num_frames - 1) * hop_syn + frame;
        let mut output = vec![0.0f32; out_len];
        let mut window_sum = vec![0.0f32; out_len];

        // Bin center frequencies in radians per sample
        let omega: Vec<f64> = (0..half)
            .map(|k| 2.0 * std::f64::consts::PI * k as f64 / frame as f64)
            .collect();

        let mut prev_phase = vec![0.0f64; half];
        let mut synth_phase = vec![0.0f64; half];
        let mut buf = vec![Complex::new(0.0f32, 0.0f32); frame];

        let princarg = |phase: f64| -> f64 {
            let two_pi = 2.0 * std::f64::consts::PI;
            phase - two_pi * (phase / two_pi).round()
        };

        let max_pos = samples.len() - frame;
        let mut prev_pos = 0usize;
        for m in 0..num_frames {
            let pos = ((m as f64 * hop_ana).round() as usize).min(max_pos);
            let hop_used = if m == 0 { hop_syn } else { (pos - prev_pos).max(1) };
            prev_pos = pos;

            for (i, (&s, &w)) in samples[pos..pos + frame].iter().zip(window.iter()).enumerate()
            {
                buf[i] = Complex::new(s * w, 0.0);
            }
            fft.process(&mut buf);

            for k in 0..half {
                let magnitude = buf[k].norm() as f64;
                let phase = buf[k].arg() as f64;

                let out_phase = if m == 0 {
                    phase
                } else {
                    let expected = omega[k] * hop_used as f64;
                    let deviation = princarg(phase - prev_phase[k] - expected);
                    let true_freq = omega[k] + deviation / hop_used.max(1) as f64;
                    synth_phase[k] + true_freq * hop_syn as f64
                };

                prev_phase[k] = phase;
                synth_phase[k] = out_phase;

                buf[k] = Complex::from_polar(magnitude as f32, out_phase as f32);
            }
            // Mirror for the real-signal inverse
            for k in half..frame {
                buf[k] = buf[frame - k].conj();
            }

            ifft.process(&mut buf);
            let scale = 1.0 / frame as f32;
            let out_pos = m * hop_syn;
            for i in 0..frame {
                let w = window[i];
                output[out_pos + i] += buf[i].re * scale * w;
                window_sum[out_pos + i] += w * w;
            }
        }

        for (o, &w) in output.iter_mut().zip(window_sum.iter()) {
            if w > 1e-6 {
                *o /= w;
            }
        }

        Ok(output)
    }
}
