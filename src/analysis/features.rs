//! Frame-level spectral features
//!
//! Windowed RMS, spectral centroid and spectral contrast over STFT frames.
//! The phrase detector thresholds a smoothed multi-feature change signal
//! built from these; the tempo fallback uses the onset flux.

use rustfft::{num_complex::Complex, FftPlanner};

/// STFT frame length in samples
pub const FRAME_LEN: usize = 2048;

/// Hop between frames in samples
pub const HOP_LEN: usize = 512;

/// Number of octave bands for spectral contrast
const CONTRAST_BANDS: usize = 6;

/// Per-frame feature set
#[derive(Debug, Clone)]
pub struct FrameFeatures {
    pub rms: Vec<f32>,
    pub centroid: Vec<f32>,
    pub contrast: Vec<f32>,
    /// Positive spectral flux per frame (onset envelope)
    pub flux: Vec<f32>,
    pub sample_rate: u32,
}

impl FrameFeatures {
    /// Time in seconds of frame `i`
    pub fn frame_time(&self, i: usize) -> f32 {
        (i * HOP_LEN) as f32 / self.sample_rate as f32
    }

    /// Frame index covering time `t`
    pub fn frame_at(&self, t: f32) -> usize {
        ((t * self.sample_rate as f32) as usize / HOP_LEN).min(self.rms.len().saturating_sub(1))
    }

    pub fn num_frames(&self) -> usize {
        self.rms.len()
    }
}

/// Compute frame features over a mono buffer
pub fn compute(samples: &[f32], sample_rate: u32) -> FrameFeatures {
    if samples.len() < FRAME_LEN {
        return FrameFeatures {
            rms: vec![crate::audio::rms(samples)],
            centroid: vec![0.0],
            contrast: vec![0.0],
            flux: vec![0.0],
            sample_rate,
        };
    }

    let num_frames = (samples.len() - FRAME_LEN) / HOP_LEN + 1;
    let mut planner = FftPlanner::new();
    let fft = planner.plan_fft_forward(FRAME_LEN);

    let window: Vec<f32> = (0..FRAME_LEN)
        .map(|i| {
            let x = i as f32 / (FRAME_LEN - 1) as f32;
            0.5 - 0.5 * (2.0 * std::f32::consts::PI * x).cos()
        })
        .collect();

    let bin_hz = sample_rate as f32 / FRAME_LEN as f32;
    let half = FRAME_LEN / 2;

    let mut rms = Vec::with_capacity(num_frames);
    let mut centroid = Vec::with_capacity(num_frames);
    let mut contrast = Vec::with_capacity(num_frames);
    let mut flux = Vec::with_capacity(num_frames);
    let mut prev_mag: Vec<f32> = vec![0.0; half];

    let mut buf: Vec<Complex<f32>> = vec![Complex::new(0.0, 0.0); FRAME_LEN];

    for frame_idx in 0..num_frames {
        let start = frame_idx * HOP_LEN;
        let frame = &samples[start..start + FRAME_LEN];

        rms.push(crate::audio::rms(frame));

        for (i, (&s, &w)) in frame.iter().zip(window.iter()).enumerate() {
            buf[i] = Complex::new(s * w, 0.0);
        }
        fft.process(&mut buf);

        let mags: Vec<f32> = buf[..half].iter().map(|c| c.norm()).collect();

        // Spectral centroid
        let total: f32 = mags.iter().sum();
        let c = if total > 1e-9 {
            mags.iter()
                .enumerate()
                .map(|(i, &m)| i as f32 * bin_hz * m)
                .sum::<f32>()
                / total
        } else {
            0.0
        };
        centroid.push(c);

        // Spectral contrast: mean over octave bands of log(peak) - log(valley)
        contrast.push(band_contrast(&mags));

        // Positive spectral flux
        let f: f32 = mags
            .iter()
            .zip(prev_mag.iter())
            .map(|(&m, &p)| (m - p).max(0.0))
            .sum();
        flux.push(f);
        prev_mag = mags;
    }

    FrameFeatures {
        rms,
        centroid,
        contrast,
        flux,
        sample_rate,
    }
}

fn band_contrast(mags: &[f32]) -> f32 {
    let half = mags.len();
    let mut total = 0.0;
    let mut counted = 0;

    // Octave bands starting at bin 1
    let mut lo = 1;
    for _ in 0..CONTRAST_BANDS {
        let hi = (lo * 2).min(half);
        if hi <= lo + 2 {
            break;
        }
        let mut band: Vec<f32> = mags[lo..hi].to_vec();
        band.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let q = (band.len() / 5).max(1);
        let valley: f32 = band[..q].iter().sum::<f32>() / q as f32;
        let peak: f32 = band[band.len() - q..].iter().sum::<f32>() / q as f32;
        total += ((peak + 1e-9) / (valley + 1e-9)).ln();
        counted += 1;
        lo = hi;
    }

    if counted > 0 {
        total / counted as f32
    } else {
        0.0
    }
}

/// Combined, smoothed feature-change signal used for phrase boundaries
///
/// Each feature is normalized to its own maximum, the absolute frame-to-frame
/// differences are summed, and the result is smoothed with a moving average.
pub fn change_signal(features: &FrameFeatures) -> Vec<f32> {
    let n = features.num_frames();
    if n < 3 {
        return vec![0.0; n];
    }

    let norm = |v: &[f32]| -> Vec<f32> {
        let max = v.iter().fold(0.0f32, |a, &b| a.max(b)) + 1e-6;
        v.iter().map(|&x| x / max).collect()
    };

    let rms = norm(&features.rms);
    let centroid = norm(&features.centroid);
    let contrast = norm(&features.contrast);

    let mut diff = Vec::with_capacity(n - 1);
    for i in 1..n {
        diff.push(
            (rms[i] - rms[i - 1]).abs()
                + (centroid[i] - centroid[i - 1]).abs()
                + (contrast[i] - contrast[i - 1]).abs(),
        );
    }

    moving_average(&diff, (diff.len() / 100).max(5))
}

/// Centered moving average via prefix sums
///
/// Window sizes here go up to half a bar of samples, so the naive quadratic
/// form is not an option.
pub fn moving_average(signal: &[f32], window: usize) -> Vec<f32> {
    if window <= 1 || signal.is_empty() {
        return signal.to_vec();
    }
    let half = window / 2;

    let mut prefix = vec![0.0f64; signal.len() + 1];
    for (i, &s) in signal.iter().enumerate() {
        prefix[i + 1] = prefix[i] + s as f64;
    }

    (0..signal.len())
        .map(|i| {
            let lo = i.saturating_sub(half);
            let hi = (i + half + 1).min(signal.len());
            ((prefix[hi] - prefix[lo]) / (hi - lo) as f64) as f32
        })
        .collect()
}

/// Windowed RMS over fixed-size windows (no overlap)
///
/// The vocal detector and bass-swap validator both work on these.
pub fn windowed_rms(samples: &[f32], window: usize) -> Vec<f32> {
    if window == 0 {
        return Vec::new();
    }
    samples
        .chunks(window)
        .map(|chunk| crate::audio::rms(chunk))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sr: u32, seconds: f32, amp: f32) -> Vec<f32> {
        let n = (sr as f32 * seconds) as usize;
        (0..n)
            .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / sr as f32).sin() * amp)
            .collect()
    }

    #[test]
    fn test_centroid_tracks_frequency() {
        let sr = 44_100;
        let low = compute(&sine(200.0, sr, 0.5, 0.8), sr);
        let high = compute(&sine(4000.0, sr, 0.5, 0.8), sr);

        let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;
        assert!(mean(&high.centroid) > mean(&low.centroid) * 2.0);
    }

    #[test]
    fn test_change_signal_peaks_at_timbre_shift() {
        let sr = 44_100;
        // 1s of quiet low tone then 1s of loud high tone
        let mut samples = sine(220.0, sr, 1.0, 0.2);
        samples.extend(sine(3000.0, sr, 1.0, 0.9));

        let features = compute(&samples, sr);
        let change = change_signal(&features);

        // The biggest change should land near the 1s boundary
        let peak_idx = change
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        let peak_time = features.frame_time(peak_idx);
        assert!(
            (peak_time - 1.0).abs() < 0.25,
            "change peak at {}s",
            peak_time
        );
    }

    #[test]
    fn test_windowed_rms() {
        let mut samples = vec![0.0f32; 1000];
        samples.extend(vec![0.5f32; 1000]);
        let rms = windowed_rms(&samples, 1000);
        assert_eq!(rms.len(), 2);
        assert!(rms[0] < 1e-6);
        assert!((rms[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_moving_average_smooths() {
        let signal = vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        let smooth = moving_average(&signal, 3);
        assert_eq!(smooth.len(), signal.len());
        assert!(smooth[2] > 0.2 && smooth[2] < 0.8);
    }

    #[test]
    fn test_short_input_does_not_panic() {
        let features = compute(&[0.1, 0.2], 44_100);
        assert_eq!(features.num_frames(), 1);
    }
}
