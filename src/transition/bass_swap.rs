//! The bass swap — the sacred rule of mixing
//!
//! Two bass lines playing together sound muddy and amateurish. The rule:
//! NEVER let two basses overlap for more than two beats. Track B enters
//! without bass, the mids and highs blend, and at the swap moment A's bass
//! cuts while B's bass takes over.
//!
//! The swap must be clean: instant (ideal) or a one-bar crossfade at most.
//! [`validate`] measures the actual overlap after the swap and rejects
//! renders that break the rule.

use serde::{Deserialize, Serialize};

use crate::analysis::features::windowed_rms;
use crate::error::{Result, SegueError};
use crate::stems::StemSet;

/// Maximum allowed bass overlap in beats
pub const MAX_OVERLAP_BEATS: f32 = 2.0;

/// RMS window for overlap validation (seconds)
const VALIDATE_WINDOW_S: f32 = 0.1;

/// Instant-swap edge fade (seconds)
const INSTANT_FADE_S: f32 = 0.005;

/// How the swap is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BassSwapStyle {
    /// Cut A and bring in B at the swap sample, with 5 ms edge fades
    #[default]
    Instant,
    /// Equal-power crossfade over exactly one bar centred on the swap
    OneBar,
}

/// Result of a bass-overlap validation
#[derive(Debug, Clone, Copy)]
pub struct SwapValidation {
    pub overlap_beats: f32,
    pub overlap_seconds: f32,
}

/// Execute a bass swap on the two bass stems, in place
///
/// `swap_time` is in seconds within the transition segment. After the call
/// `bass_a` is silent past the swap (plus fade) and `bass_b` silent before
/// it.
pub fn execute(
    bass_a: &mut [f32],
    bass_b: &mut [f32],
    swap_time: f32,
    style: BassSwapStyle,
    bpm: f32,
    sample_rate: u32,
) {
    let len = bass_a.len().min(bass_b.len());
    if len == 0 {
        return;
    }
    let swap_sample = ((swap_time * sample_rate as f32) as usize).min(len - 1);

    match style {
        BassSwapStyle::Instant => {
            let fade = (INSTANT_FADE_S * sample_rate as f32) as usize;

            // A: exponential fade over [swap, swap+fade], silence after
            let a_fade_end = (swap_sample + fade).min(bass_a.len());
            for i in swap_sample..a_fade_end {
                let t = (i - swap_sample) as f32 / fade as f32;
                bass_a[i] *= (-6.9 * t).exp();
            }
            for s in bass_a[a_fade_end..].iter_mut() {
                *s = 0.0;
            }

            // B: silence before [swap-fade], exponential rise into the swap
            let b_fade_start = swap_sample.saturating_sub(fade);
            for s in bass_b[..b_fade_start].iter_mut() {
                *s = 0.0;
            }
            for i in b_fade_start..swap_sample.min(bass_b.len()) {
                let t = (swap_sample - i) as f32 / fade as f32;
                bass_b[i] *= (-6.9 * t).exp();
            }
        }
        BassSwapStyle::OneBar => {
            let bar_samples = crate::audio::samples_per_bar(bpm, sample_rate);
            let fade_start = swap_sample.saturating_sub(bar_samples / 2);
            let fade_end = (swap_sample + bar_samples / 2).min(len);
            let fade_len = fade_end - fade_start;

            if fade_len > 0 {
                for i in 0..fade_len {
                    let t = i as f32 / fade_len as f32;
                    let angle = t * std::f32::consts::FRAC_PI_2;
                    bass_a[fade_start + i] *= angle.cos();
                    bass_b[fade_start + i] *= angle.sin();
                }
            }

            for s in bass_a[fade_end..].iter_mut() {
                *s = 0.0;
            }
            for s in bass_b[..fade_start].iter_mut() {
                *s = 0.0;
            }
        }
    }
}

/// Swap time in seconds for a 1-indexed bar within the transition
pub fn swap_time_for_bar(swap_bar: u32, duration_bars: u32, bpm: f32) -> f32 {
    let bar = swap_bar.clamp(1, duration_bars.max(1));
    (bar - 1) as f32 * crate::audio::bar_duration(bpm)
}

/// Validate that the swapped basses respect the two-beat rule
///
/// Works on 100 ms RMS windows: a window counts as overlap when both basses
/// exceed 10% of the louder stem's peak window. The aggregate overlap must
/// not exceed two beats at the transition BPM.
pub fn validate(
    bass_a: &[f32],
    bass_b: &[f32],
    bpm: f32,
    sample_rate: u32,
) -> Result<SwapValidation> {
    let window = (VALIDATE_WINDOW_S * sample_rate as f32) as usize;
    let rms_a = windowed_rms(bass_a, window);
    let rms_b = windowed_rms(bass_b, window);

    let max_rms = rms_a
        .iter()
        .chain(rms_b.iter())
        .fold(1e-3f32, |a, &b| a.max(b));
    let threshold = 0.1 * max_rms;

    let overlap_windows = rms_a
        .iter()
        .zip(rms_b.iter())
        .filter(|(&a, &b)| a > threshold && b > threshold)
        .count();

    let overlap_seconds = overlap_windows as f32 * VALIDATE_WINDOW_S;
    let overlap_beats = overlap_seconds / (60.0 / bpm);

    let validation = SwapValidation {
        overlap_beats,
        overlap_seconds,
    };

    if overlap_beats > MAX_OVERLAP_BEATS {
        log::warn!(
            "bass swap validation failed: {:.2} beats of overlap",
            overlap_beats
        );
        Err(SegueError::BassSwapViolation { overlap_beats })
    } else {
        Ok(validation)
    }
}

/// Apply a bass swap to full stem sets, validating the result
///
/// On a validation failure the swap is retried with the instant style; a
/// second failure propagates `BassSwapViolation` so the renderer can
/// downgrade. Returns whether the retry path was taken.
pub fn apply_to_stems(
    stems_a: &mut StemSet,
    stems_b: &mut StemSet,
    swap_time: f32,
    style: BassSwapStyle,
    bpm: f32,
    sample_rate: u32,
) -> Result<bool> {
    let original_a = stems_a.bass.clone();
    let original_b = stems_b.bass.clone();

    execute(
        &mut stems_a.bass,
        &mut stems_b.bass,
        swap_time,
        style,
        bpm,
        sample_rate,
    );

    match validate(&stems_a.bass, &stems_b.bass, bpm, sample_rate) {
        Ok(_) => Ok(false),
        Err(_) if style != BassSwapStyle::Instant => {
            log::warn!("re-swapping with instant style");
            stems_a.bass = original_a;
            stems_b.bass = original_b;
            execute(
                &mut stems_a.bass,
                &mut stems_b.bass,
                swap_time,
                BassSwapStyle::Instant,
                bpm,
                sample_rate,
            );
            validate(&stems_a.bass, &stems_b.bass, bpm, sample_rate)?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44_100;
    const BPM: f32 = 128.0;

    /// A constant bassline at the given amplitude
    fn bassline(seconds: f32, amp: f32) -> Vec<f32> {
        let n = (seconds * SR as f32) as usize;
        (0..n)
            .map(|i| (i as f32 * 80.0 * 2.0 * std::f32::consts::PI / SR as f32).sin() * amp)
            .collect()
    }

    #[test]
    fn test_instant_swap_silences_each_side() {
        let mut a = bassline(8.0, 0.8);
        let mut b = bassline(8.0, 0.8);
        execute(&mut a, &mut b, 4.0, BassSwapStyle::Instant, BPM, SR);

        let swap = (4.0 * SR as f32) as usize;
        let fade = (0.005 * SR as f32) as usize;

        // A silent after the fade, B silent before it
        assert!(crate::audio::peak(&a[swap + fade..]) < 1e-6);
        assert!(crate::audio::peak(&b[..swap - fade]) < 1e-6);
        // A intact before, B intact after
        assert!(crate::audio::rms(&a[..swap - fade]) > 0.3);
        assert!(crate::audio::rms(&b[swap + fade..]) > 0.3);
    }

    #[test]
    fn test_one_bar_swap_crossfades_over_exactly_one_bar() {
        let mut a = bassline(8.0, 0.8);
        let mut b = bassline(8.0, 0.8);
        execute(&mut a, &mut b, 4.0, BassSwapStyle::OneBar, BPM, SR);

        let bar = crate::audio::samples_per_bar(BPM, SR);
        let swap = (4.0 * SR as f32) as usize;

        // Outside the bar-wide window the stems are fully on or fully off
        assert!(crate::audio::peak(&a[swap + bar / 2..]) < 1e-6);
        assert!(crate::audio::peak(&b[..swap - bar / 2]) < 1e-6);
        // Inside the window both are partially audible
        let mid = swap;
        assert!(a[mid].abs() < 0.8 && b[mid].abs() < 0.8);
    }

    #[test]
    fn test_instant_swap_passes_validation() {
        let mut a = bassline(8.0, 0.8);
        let mut b = bassline(8.0, 0.8);
        execute(&mut a, &mut b, 4.0, BassSwapStyle::Instant, BPM, SR);

        let validation = validate(&a, &b, BPM, SR).unwrap();
        assert!(validation.overlap_beats <= MAX_OVERLAP_BEATS);
    }

    #[test]
    fn test_one_bar_swap_on_dense_basses_retries_to_instant() {
        // An equal-power crossfade keeps both basses above the 10% line for
        // most of the bar; on wall-to-wall basslines that is nearly four
        // beats of overlap, so the wrapper must fall back to instant
        let mut stems_a = StemSet {
            drums: vec![0.0; (8.0 * SR as f32) as usize],
            bass: bassline(8.0, 0.8),
            other: vec![0.0; (8.0 * SR as f32) as usize],
            vocals: vec![0.0; (8.0 * SR as f32) as usize],
        };
        let mut stems_b = stems_a.clone();

        let retried = apply_to_stems(
            &mut stems_a,
            &mut stems_b,
            4.0,
            BassSwapStyle::OneBar,
            BPM,
            SR,
        )
        .unwrap();

        assert!(retried);
        // The retried result respects the rule
        let validation = validate(&stems_a.bass, &stems_b.bass, BPM, SR).unwrap();
        assert!(validation.overlap_beats <= MAX_OVERLAP_BEATS);
    }

    #[test]
    fn test_unswapped_basses_fail_validation() {
        let a = bassline(8.0, 0.8);
        let b = bassline(8.0, 0.8);
        let err = validate(&a, &b, BPM, SR).unwrap_err();
        assert!(matches!(err, SegueError::BassSwapViolation { .. }));
    }

    #[test]
    fn test_swap_time_for_bar() {
        // Bar 9 of a 16-bar transition at 128 BPM: 8 bars in
        let t = swap_time_for_bar(9, 16, BPM);
        assert!((t - 8.0 * crate::audio::bar_duration(BPM)).abs() < 1e-4);
        // Clamped into range
        assert_eq!(swap_time_for_bar(40, 16, BPM), swap_time_for_bar(16, 16, BPM));
        assert_eq!(swap_time_for_bar(0, 16, BPM), 0.0);
    }

    #[test]
    fn test_apply_to_stems_swaps_only_bass() {
        let mut stems_a = StemSet {
            drums: bassline(8.0, 0.5),
            bass: bassline(8.0, 0.8),
            other: bassline(8.0, 0.5),
            vocals: vec![0.0; (8.0 * SR as f32) as usize],
        };
        let mut stems_b = stems_a.clone();
        let drums_before = stems_a.drums.clone();

        let retried = apply_to_stems(
            &mut stems_a,
            &mut stems_b,
            4.0,
            BassSwapStyle::Instant,
            BPM,
            SR,
        )
        .unwrap();

        assert!(!retried);
        assert_eq!(stems_a.drums, drums_before);
        let swap = (4.0 * SR as f32) as usize;
        assert!(crate::audio::peak(&stems_a.bass[swap + 1000..]) < 1e-6);
    }
}
