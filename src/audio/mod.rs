//! Audio I/O and buffer utilities
//!
//! This module owns everything at the PCM boundary: decoding arbitrary input
//! formats to f32 samples, resampling to the 44.1 kHz processing rate,
//! writing WAV output, encoding MP3 through an external encoder, and the
//! small buffer helpers (peaks, fades, mono/stereo conversion) the rest of
//! the engine leans on.
//!
//! All internal processing is mono f32 in the range [-1.0, 1.0]; stereo is
//! rebuilt at export by duplication.

pub mod decode;
pub mod encode;
pub mod resample;

pub use decode::{decode, decode_mono};
pub use encode::{encode_mp3, write_wav};
pub use resample::{resample, to_processing_rate};

use crate::config::PROCESSING_SAMPLE_RATE;

/// Peak absolute amplitude of a buffer
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()))
}

/// Root-mean-square level of a buffer
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Convert a dB value to a linear amplitude
pub fn db_to_amplitude(db: f32) -> f32 {
    10.0f32.powf(db / 20.0)
}

/// Convert a linear amplitude to dB (floor at -120 dB for silence)
pub fn amplitude_to_db(amp: f32) -> f32 {
    if amp <= 0.0 {
        return -120.0;
    }
    20.0 * amp.log10()
}

/// Duration of a buffer in seconds
pub fn duration_seconds(samples: &[f32], sample_rate: u32) -> f32 {
    samples.len() as f32 / sample_rate as f32
}

/// Convert interleaved multi-channel samples to mono by averaging channels
pub fn interleaved_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Duplicate a mono buffer into interleaved stereo
pub fn duplicate_to_stereo(samples: &[f32]) -> Vec<f32> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.push(s);
        out.push(s);
    }
    out
}

/// Apply a linear fade-in over the first `fade_samples` samples in place
pub fn apply_fade_in(samples: &mut [f32], fade_samples: usize) {
    let n = fade_samples.min(samples.len());
    if n == 0 {
        return;
    }
    for (i, s) in samples[..n].iter_mut().enumerate() {
        *s *= i as f32 / n as f32;
    }
}

/// Apply a linear fade-out over the last `fade_samples` samples in place
pub fn apply_fade_out(samples: &mut [f32], fade_samples: usize) {
    let len = samples.len();
    let n = fade_samples.min(len);
    if n == 0 {
        return;
    }
    for i in 0..n {
        let gain = 1.0 - (i as f32 / n as f32);
        samples[len - n + i] *= gain;
    }
}

/// Concatenate audio segments into one contiguous buffer
pub fn concat(segments: &[&[f32]]) -> Vec<f32> {
    let total: usize = segments.iter().map(|s| s.len()).sum();
    let mut out = Vec::with_capacity(total);
    for seg in segments {
        out.extend_from_slice(seg);
    }
    out
}

/// Pad or trim a buffer to exactly `target_len` samples
pub fn fit_length(samples: &[f32], target_len: usize) -> Vec<f32> {
    let mut out = samples.to_vec();
    if out.len() > target_len {
        out.truncate(target_len);
    } else {
        out.resize(target_len, 0.0);
    }
    out
}

/// Samples per beat at the given tempo
pub fn samples_per_beat(bpm: f32, sample_rate: u32) -> usize {
    ((60.0 / bpm) * sample_rate as f32).round() as usize
}

/// Samples per 4/4 bar at the given tempo
pub fn samples_per_bar(bpm: f32, sample_rate: u32) -> usize {
    samples_per_beat(bpm, sample_rate) * 4
}

/// Seconds per 4/4 bar at the given tempo
pub fn bar_duration(bpm: f32) -> f32 {
    (60.0 / bpm) * 4.0
}

/// Default processing rate accessor, kept with the audio utilities
pub fn processing_rate() -> u32 {
    PROCESSING_SAMPLE_RATE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peak_and_rms() {
        let buf = vec![0.0, 0.5, -1.0, 0.5];
        assert_eq!(peak(&buf), 1.0);
        let expected = ((0.0f32 + 0.25 + 1.0 + 0.25) / 4.0).sqrt();
        assert!((rms(&buf) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_db_round_trip() {
        let amp = db_to_amplitude(-6.0);
        assert!((amplitude_to_db(amp) - -6.0).abs() < 1e-4);
        assert!((db_to_amplitude(0.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_interleaved_to_mono() {
        let stereo = vec![1.0, 0.0, 0.5, 0.5, 0.0, 1.0];
        let mono = interleaved_to_mono(&stereo, 2);
        assert_eq!(mono, vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_stereo_duplication() {
        let mono = vec![0.25, -0.25];
        assert_eq!(duplicate_to_stereo(&mono), vec![0.25, 0.25, -0.25, -0.25]);
    }

    #[test]
    fn test_fades() {
        let mut buf = vec![1.0; 8];
        apply_fade_in(&mut buf, 4);
        assert_eq!(buf[0], 0.0);
        assert!(buf[3] < 1.0);
        assert_eq!(buf[4], 1.0);

        let mut buf = vec![1.0; 8];
        apply_fade_out(&mut buf, 4);
        assert_eq!(buf[3], 1.0);
        assert!(buf[7] < 0.3);
    }

    #[test]
    fn test_fit_length() {
        assert_eq!(fit_length(&[1.0, 2.0, 3.0], 2), vec![1.0, 2.0]);
        assert_eq!(fit_length(&[1.0], 3), vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_bar_math() {
        // 120 BPM: beat = 0.5s, bar = 2s
        assert_eq!(samples_per_beat(120.0, 44_100), 22_050);
        assert_eq!(samples_per_bar(120.0, 44_100), 88_200);
        assert!((bar_duration(120.0) - 2.0).abs() < 1e-6);
    }
}
