//! Vocal-clash resolution
//!
//! Before a stem blend commits, the renderer checks whether the two vocal
//! stems would fight inside the transition window. The resolution is a small
//! state machine driven by B's vocal-free intro and the measured clash
//! severity:
//!
//! ```text
//! CHECK -> CLEAN                 (no clash, or B's intro covers the window)
//!       -> REDUCE_DURATION(n)    (B's vocal-free intro covers n >= 4 bars,
//!                                 or the clash is merely moderate -> 8 bars)
//!       -> DOWNGRADE_HARD_CUT    (severe clash with no safe sub-window)
//! ```

use crate::analysis::vocals::{clash_severity, ClashSeverity, VocalProfile};

/// Minimum transition length the reducer will accept, in bars
pub const MIN_TRANSITION_BARS: u32 = 4;

/// Outcome of the clash check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClashResolution {
    /// No adjustment needed
    Clean,
    /// Shorten the transition to this many bars
    ReduceDuration { bars: u32 },
    /// No safe sub-window exists; fall back to a hard cut
    DowngradeHardCut,
}

/// Resolve a potential vocal clash for a planned transition window
///
/// Both profiles are in the transition's local timeline (second 0 = start of
/// the transition). `bar_s` is the bar duration at the transition BPM.
pub fn resolve(
    profile_a: &VocalProfile,
    profile_b: &VocalProfile,
    duration_bars: u32,
    bar_s: f32,
) -> ClashResolution {
    let window_s = duration_bars as f32 * bar_s;
    let severity = clash_severity(profile_a, profile_b, window_s);

    if severity == ClashSeverity::None {
        return ClashResolution::Clean;
    }

    // B entering without vocals is the cleanest escape: if its vocal-free
    // intro covers the whole window there is nothing to fix
    let intro_free_s = profile_b.vocal_free_intro_seconds(window_s);
    if intro_free_s >= window_s {
        return ClashResolution::Clean;
    }

    // Second best: shorten the transition into B's vocal-free intro
    let intro_free_bars = (intro_free_s / bar_s).floor() as u32;
    if intro_free_bars >= MIN_TRANSITION_BARS {
        let bars = intro_free_bars.min(duration_bars);
        if bars < duration_bars {
            return ClashResolution::ReduceDuration { bars };
        }
        return ClashResolution::Clean;
    }

    match severity {
        ClashSeverity::Severe => ClashResolution::DowngradeHardCut,
        ClashSeverity::Moderate => {
            if duration_bars > 8 {
                ClashResolution::ReduceDuration { bars: 8 }
            } else {
                ClashResolution::Clean
            }
        }
        ClashSeverity::None => ClashResolution::Clean,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::vocals::{VocalIntensity, VocalSection};

    fn profile(sections: &[(f32, f32, VocalIntensity)]) -> VocalProfile {
        VocalProfile {
            has_vocals: !sections.is_empty(),
            vocal_percentage: 0.0,
            sections: sections
                .iter()
                .map(|&(start_s, end_s, intensity)| VocalSection {
                    start_s,
                    end_s,
                    intensity,
                })
                .collect(),
        }
    }

    const BAR_S: f32 = 1.875; // 128 BPM

    #[test]
    fn test_no_vocals_is_clean() {
        let empty = VocalProfile::silent();
        assert_eq!(resolve(&empty, &empty, 16, BAR_S), ClashResolution::Clean);
    }

    #[test]
    fn test_one_sided_vocals_are_clean() {
        let a = profile(&[(0.0, 30.0, VocalIntensity::Full)]);
        let b = VocalProfile::silent();
        assert_eq!(resolve(&a, &b, 16, BAR_S), ClashResolution::Clean);
    }

    #[test]
    fn test_severe_clash_with_immediate_b_vocals_downgrades() {
        // Both sing across the whole window; B starts singing at once
        let a = profile(&[(0.0, 30.0, VocalIntensity::Full)]);
        let b = profile(&[(0.0, 30.0, VocalIntensity::Full)]);
        assert_eq!(
            resolve(&a, &b, 16, BAR_S),
            ClashResolution::DowngradeHardCut
        );
    }

    #[test]
    fn test_vocal_free_intro_shortens_the_window() {
        // A sings throughout; B's vocals start 6 bars in
        let a = profile(&[(0.0, 30.0, VocalIntensity::Full)]);
        let b = profile(&[(6.0 * BAR_S, 30.0, VocalIntensity::Full)]);
        assert_eq!(
            resolve(&a, &b, 16, BAR_S),
            ClashResolution::ReduceDuration { bars: 6 }
        );
    }

    #[test]
    fn test_intro_covering_window_is_clean() {
        let a = profile(&[(0.0, 60.0, VocalIntensity::Full)]);
        // B's first vocal lands beyond the 16-bar window
        let b = profile(&[(17.0 * BAR_S, 60.0, VocalIntensity::Full)]);
        assert_eq!(resolve(&a, &b, 16, BAR_S), ClashResolution::Clean);
    }

    #[test]
    fn test_moderate_clash_shortens_to_eight() {
        // Brief FULL overlap late in the window; B vocal-free intro is
        // under four bars because of an early ad-lib
        let a = profile(&[(14.0 * BAR_S, 16.0 * BAR_S, VocalIntensity::Full)]);
        let b = profile(&[
            (1.0, 2.5, VocalIntensity::Full),
            (14.5 * BAR_S, 16.0 * BAR_S, VocalIntensity::Full),
        ]);
        let result = resolve(&a, &b, 16, BAR_S);
        assert_eq!(result, ClashResolution::ReduceDuration { bars: 8 });
    }

    #[test]
    fn test_background_vocals_never_clash() {
        let a = profile(&[(0.0, 30.0, VocalIntensity::Background)]);
        let b = profile(&[(0.0, 30.0, VocalIntensity::Background)]);
        assert_eq!(resolve(&a, &b, 16, BAR_S), ClashResolution::Clean);
    }
}
