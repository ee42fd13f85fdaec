//! Algorithmic reverb via impulse-response convolution
//!
//! The impulse response is synthesized: a handful of discrete early
//! reflections (their count scales with room size) followed by an
//! exponentially decaying noise tail with time-varying damping. Convolution
//! runs in the frequency domain. After convolution the wet signal is
//! renormalized so its peak matches the input peak, since IR energy would
//! otherwise swing the level wildly.

use rand::Rng;
use rustfft::{num_complex::Complex, FftPlanner};
use serde::{Deserialize, Serialize};

/// Reverb parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ReverbParams {
    /// Room size in [0, 1]; larger rooms reflect more and longer
    pub room_size: f32,
    /// RT60 decay time in seconds
    pub decay: f32,
    /// Wet/dry mix in [0, 1]
    pub mix: f32,
    /// High-frequency damping in [0, 1]; higher is darker
    pub damping: f32,
}

impl Default for ReverbParams {
    fn default() -> Self {
        Self {
            room_size: 0.7,
            decay: 2.0,
            mix: 0.3,
            damping: 0.5,
        }
    }
}

/// Synthesize an impulse response for the given parameters
fn generate_impulse_response(params: &ReverbParams, sample_rate: u32) -> Vec<f32> {
    let ir_len = ((params.decay * sample_rate as f32) as usize).max(64);
    let mut ir = vec![0.0f32; ir_len];

    let room = params.room_size.clamp(0.0, 1.0);

    // Early reflections in the first 100ms, spacing widens with each bounce
    let early_len = (sample_rate as usize / 10).min(ir_len);
    let num_reflections = 5 + (room * 10.0) as usize;
    for i in 0..num_reflections {
        let pos = ((i + 1) * early_len / (num_reflections + 1)).min(ir_len - 1);
        let amplitude = 0.7f32.powi(i as i32 + 1) * (0.5 + room * 0.5);
        ir[pos] = amplitude;
    }

    // Late tail: decaying noise with damping that closes over time
    let mut rng = rand::rng();
    let late_start = early_len.min(ir_len);
    for (k, sample) in ir[late_start..].iter_mut().enumerate() {
        let t = k as f32 / sample_rate as f32;
        let envelope = (-3.0 * t / params.decay).exp();
        let damping_factor = (1.0 - params.damping * (t / params.decay)).clamp(0.1, 1.0);
        let noise: f32 = rng.random_range(-1.0f32..1.0);
        *sample += noise * envelope * damping_factor * room * 0.3;
    }

    // Unit peak
    let max = crate::audio::peak(&ir);
    if max > 0.0 {
        for s in ir.iter_mut() {
            *s /= max;
        }
    }
    ir
}

/// FFT convolution of a signal with a kernel
fn fft_convolve(signal: &[f32], kernel: &[f32]) -> Vec<f32> {
    let out_len = signal.len() + kernel.len() - 1;
    let fft_len = out_len.next_power_of_two();

    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(fft_len);
    let ifft = planner.plan_fft_inverse(fft_len);

    let mut a: Vec<Complex<f32>> = signal
        .iter()
        .map(|&s| Complex::new(s, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();
    let mut b: Vec<Complex<f32>> = kernel
        .iter()
        .map(|&s| Complex::new(s, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(fft_len)
        .collect();

    fft.process(&mut a);
    fft.process(&mut b);

    for (x, y) in a.iter_mut().zip(b.iter()) {
        *x *= *y;
    }

    ifft.process(&mut a);

    // rustfft leaves the inverse unscaled
    let scale = 1.0 / fft_len as f32;
    a[..out_len].iter().map(|c| c.re * scale).collect()
}

/// Apply reverb to a buffer
///
/// The output carries half the decay time as extra tail beyond the input
/// length.
pub fn apply_reverb(samples: &[f32], params: &ReverbParams, sample_rate: u32) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let ir = generate_impulse_response(params, sample_rate);
    let mut wet = fft_convolve(samples, &ir);

    let tail = (params.decay * sample_rate as f32 * 0.5) as usize;
    wet.truncate(samples.len() + tail);

    // Renormalize the wet peak to the input peak
    let wet_peak = crate::audio::peak(&wet);
    let input_peak = crate::audio::peak(samples);
    if wet_peak > 0.0 {
        let target = if input_peak > 0.0 { input_peak } else { 1.0 };
        let gain = target / wet_peak;
        for s in wet.iter_mut() {
            *s *= gain;
        }
    }

    let mix = params.mix.clamp(0.0, 1.0);
    let mut output = vec![0.0f32; wet.len()];
    for (i, out) in output.iter_mut().enumerate() {
        let dry = if i < samples.len() { samples[i] } else { 0.0 };
        *out = dry * (1.0 - mix) + wet[i] * mix;
    }
    output
}

/// Create a reverb tail: dry fades out under an equal-power curve while the
/// reverberated signal rings on
///
/// The analogue of [`super::delay::create_delay_tail`] for HARD_CUT and
/// ECHO_OUT exits.
pub fn create_reverb_tail(
    samples: &[f32],
    tail_start: usize,
    room_size: f32,
    decay: f32,
    fade_out_s: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let tail_start = if tail_start >= samples.len() {
        samples.len().saturating_sub(sample_rate as usize / 2)
    } else {
        tail_start
    };

    let mut tail: Vec<f32> = samples[tail_start..].to_vec();
    let fade_samples = ((fade_out_s * sample_rate as f32) as usize).min(tail.len());
    for (i, s) in tail.iter_mut().enumerate() {
        if i < fade_samples {
            let t = i as f32 / fade_samples as f32;
            let gain = (t * std::f32::consts::FRAC_PI_2).cos();
            *s *= gain * gain;
        } else {
            *s = 0.0;
        }
    }

    let reverbed = apply_reverb(
        &tail,
        &ReverbParams {
            room_size,
            decay,
            mix: 0.85,
            damping: 0.3,
        },
        sample_rate,
    );

    let mut output = Vec::with_capacity(tail_start + reverbed.len());
    output.extend_from_slice(&samples[..tail_start]);
    output.extend_from_slice(&reverbed);

    super::delay::trim_silence(&mut output, sample_rate);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44_100;

    fn tone(freq: f32, seconds: f32, amp: f32) -> Vec<f32> {
        let n = (SR as f32 * seconds) as usize;
        (0..n)
            .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / SR as f32).sin() * amp)
            .collect()
    }

    #[test]
    fn test_impulse_response_has_early_and_late_energy() {
        let params = ReverbParams::default();
        let ir = generate_impulse_response(&params, SR);

        let early = &ir[..SR as usize / 10];
        let late = &ir[SR as usize / 10..];
        assert!(crate::audio::peak(early) > 0.0);
        assert!(crate::audio::rms(late) > 0.0);
        // Peak normalized
        assert!((crate::audio::peak(&ir) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_fft_convolve_identity() {
        // Convolving with a unit impulse reproduces the signal
        let signal = tone(440.0, 0.1, 0.5);
        let out = fft_convolve(&signal, &[1.0]);
        for (a, b) in signal.iter().zip(out.iter()).step_by(100) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn test_reverb_output_peak_matches_input_scale() {
        let signal = tone(440.0, 0.5, 0.6);
        let out = apply_reverb(&signal, &ReverbParams::default(), SR);

        // Wet is renormalized to the input peak, so the mix can't exceed it
        // by much
        assert!(crate::audio::peak(&out) <= 0.75);
        // Tail extends past the input
        assert!(out.len() > signal.len());
    }

    #[test]
    fn test_reverb_tail_rings_past_the_fade() {
        let signal = tone(440.0, 2.0, 0.7);
        let tail_start = SR as usize;
        let out = create_reverb_tail(&signal, tail_start, 0.8, 2.0, 1.0, SR);

        // Dry head untouched
        assert!((out[1000] - signal[1000]).abs() < 1e-6);
        // Energy exists after the dry fade has completed
        let after_fade = tail_start + (1.2 * SR as f32) as usize;
        if after_fade + 2000 < out.len() {
            assert!(crate::audio::rms(&out[after_fade..after_fade + 2000]) > 1e-4);
        }
    }
}
