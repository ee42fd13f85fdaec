//! Mixability analysis
//!
//! How blendable is this track? The answer comes from its vocal map and its
//! intro/outro bounds: how much instrumental runway there is on each end,
//! how much of the track sings, and whether a DJ can safely run a long
//! blend into or out of it. The result rides along with every analyze-job
//! result so the ordering UI can surface awkward tracks before they end up
//! adjacent.

use serde::{Deserialize, Serialize};

use crate::analysis::vocals::VocalProfile;

/// Blend windows shorter than this are flagged (ms)
const SHORT_DURATION_MS: u64 = 8_000;

/// Blend windows shorter than this make the track mix-unfriendly (ms)
const VERY_SHORT_DURATION_MS: u64 = 4_000;

/// Overall vocal coverage classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VocalCoverage {
    None,
    Low,
    Medium,
    High,
}

impl VocalCoverage {
    fn from_percentage(vocal_pct: f32) -> VocalCoverage {
        if vocal_pct < 10.0 {
            VocalCoverage::None
        } else if vocal_pct < 30.0 {
            VocalCoverage::Low
        } else if vocal_pct < 60.0 {
            VocalCoverage::Medium
        } else {
            VocalCoverage::High
        }
    }
}

/// Mixability rating of one track
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mixability {
    /// Vocal-free span at the head of the track (ms)
    pub intro_instrumental_ms: u64,
    /// Vocal-free span at the tail of the track (ms)
    pub outro_instrumental_ms: u64,
    /// Fraction of the track covered by vocals (0-100)
    pub vocal_percentage: f32,
    pub vocal_intensity: VocalCoverage,
    /// Longest blend the intro supports (ms)
    pub max_blend_in_duration_ms: u64,
    /// Longest blend the outro supports (ms)
    pub max_blend_out_duration_ms: u64,
    pub best_mix_in_point_ms: u64,
    pub best_mix_out_point_ms: u64,
    pub mix_friendly: bool,
    pub mixability_warnings: Vec<String>,
}

/// Rate how blendable a track is
///
/// `vocals` is the track-wide vocal profile; intro/outro bounds come from
/// the structure detection (or its 16-bar defaults).
pub fn analyze_mixability(
    vocals: &VocalProfile,
    intro_end_s: f32,
    outro_start_s: f32,
    duration_s: f32,
) -> Mixability {
    let intro_instrumental_ms = intro_instrumental(vocals, intro_end_s);
    let outro_instrumental_ms = outro_instrumental(vocals, outro_start_s, duration_s);

    let vocal_percentage = vocals.vocal_percentage;
    let (mix_friendly, warnings) =
        assess(intro_instrumental_ms, outro_instrumental_ms, vocal_percentage);

    Mixability {
        intro_instrumental_ms,
        outro_instrumental_ms,
        vocal_percentage,
        vocal_intensity: VocalCoverage::from_percentage(vocal_percentage),
        max_blend_in_duration_ms: intro_instrumental_ms,
        max_blend_out_duration_ms: outro_instrumental_ms,
        best_mix_in_point_ms: (intro_end_s.max(0.0) * 1000.0) as u64,
        best_mix_out_point_ms: (outro_start_s.max(0.0) * 1000.0) as u64,
        mix_friendly,
        mixability_warnings: warnings,
    }
}

/// Vocal-free span of the intro, in milliseconds
fn intro_instrumental(vocals: &VocalProfile, intro_end_s: f32) -> u64 {
    match vocals.sections.first() {
        Some(first) if vocals.has_vocals => {
            (first.start_s.min(intro_end_s).max(0.0) * 1000.0) as u64
        }
        _ => (intro_end_s.max(0.0) * 1000.0) as u64,
    }
}

/// Vocal-free span of the outro, in milliseconds
fn outro_instrumental(vocals: &VocalProfile, outro_start_s: f32, duration_s: f32) -> u64 {
    match vocals.sections.last() {
        Some(last) if vocals.has_vocals => {
            let start = last.end_s.max(outro_start_s);
            ((duration_s - start).max(0.0) * 1000.0) as u64
        }
        _ => ((duration_s - outro_start_s).max(0.0) * 1000.0) as u64,
    }
}

fn assess(intro_ms: u64, outro_ms: u64, vocal_pct: f32) -> (bool, Vec<String>) {
    let mut warnings = Vec::new();
    let mut mix_friendly = true;

    if intro_ms < VERY_SHORT_DURATION_MS {
        warnings.push(format!("Very short intro ({:.1}s)", intro_ms as f32 / 1000.0));
        mix_friendly = false;
    } else if intro_ms < SHORT_DURATION_MS {
        warnings.push(format!("Short intro ({:.1}s)", intro_ms as f32 / 1000.0));
    }

    if outro_ms < VERY_SHORT_DURATION_MS {
        warnings.push(format!("Very short outro ({:.1}s)", outro_ms as f32 / 1000.0));
        mix_friendly = false;
    } else if outro_ms < SHORT_DURATION_MS {
        warnings.push(format!("Short outro ({:.1}s)", outro_ms as f32 / 1000.0));
    }

    if vocal_pct > 80.0 {
        warnings.push(format!("High vocal content ({:.0}%)", vocal_pct));
        mix_friendly = false;
    } else if vocal_pct > 60.0 {
        warnings.push(format!("Moderate vocal content ({:.0}%)", vocal_pct));
    }

    (mix_friendly, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::vocals::{VocalIntensity, VocalSection};

    fn profile(sections: &[(f32, f32)], vocal_percentage: f32) -> VocalProfile {
        VocalProfile {
            has_vocals: !sections.is_empty(),
            vocal_percentage,
            sections: sections
                .iter()
                .map(|&(start_s, end_s)| VocalSection {
                    start_s,
                    end_s,
                    intensity: VocalIntensity::Full,
                })
                .collect(),
        }
    }

    #[test]
    fn test_instrumental_track_is_mix_friendly() {
        let m = analyze_mixability(&VocalProfile::silent(), 30.0, 270.0, 300.0);
        assert!(m.mix_friendly);
        assert!(m.mixability_warnings.is_empty());
        assert_eq!(m.intro_instrumental_ms, 30_000);
        assert_eq!(m.outro_instrumental_ms, 30_000);
        assert_eq!(m.vocal_intensity, VocalCoverage::None);
        assert_eq!(m.best_mix_in_point_ms, 30_000);
        assert_eq!(m.best_mix_out_point_ms, 270_000);
    }

    #[test]
    fn test_early_vocals_shrink_the_intro_runway() {
        // First vocal at 10s caps the 30s intro
        let m = analyze_mixability(&profile(&[(10.0, 60.0)], 20.0), 30.0, 270.0, 300.0);
        assert_eq!(m.intro_instrumental_ms, 10_000);
        assert_eq!(m.max_blend_in_duration_ms, 10_000);
    }

    #[test]
    fn test_late_vocals_shrink_the_outro_runway() {
        // Last vocal ends at 290s, eating into the 270s outro
        let m = analyze_mixability(&profile(&[(100.0, 290.0)], 50.0), 30.0, 270.0, 300.0);
        assert_eq!(m.outro_instrumental_ms, 10_000);
        assert_eq!(m.max_blend_out_duration_ms, 10_000);
    }

    #[test]
    fn test_very_short_runways_are_unfriendly() {
        // Vocals from 2s in: only two seconds of intro runway
        let m = analyze_mixability(&profile(&[(2.0, 250.0)], 70.0), 30.0, 270.0, 300.0);
        assert!(!m.mix_friendly);
        assert!(m
            .mixability_warnings
            .iter()
            .any(|w| w.contains("Very short intro")));
    }

    #[test]
    fn test_vocal_coverage_ladder() {
        assert_eq!(VocalCoverage::from_percentage(5.0), VocalCoverage::None);
        assert_eq!(VocalCoverage::from_percentage(20.0), VocalCoverage::Low);
        assert_eq!(VocalCoverage::from_percentage(45.0), VocalCoverage::Medium);
        assert_eq!(VocalCoverage::from_percentage(75.0), VocalCoverage::High);
    }

    #[test]
    fn test_heavy_vocal_track_is_flagged() {
        let m = analyze_mixability(&profile(&[(5.0, 295.0)], 90.0), 30.0, 270.0, 300.0);
        assert!(!m.mix_friendly);
        assert_eq!(m.vocal_intensity, VocalCoverage::High);
        assert!(m
            .mixability_warnings
            .iter()
            .any(|w| w.contains("High vocal content")));
    }

    #[test]
    fn test_wire_format_field_names() {
        let m = analyze_mixability(&VocalProfile::silent(), 30.0, 270.0, 300.0);
        let json = serde_json::to_string(&m).unwrap();
        assert!(json.contains("\"introInstrumentalMs\""));
        assert!(json.contains("\"vocalPercentage\""));
        assert!(json.contains("\"maxBlendInDurationMs\""));
        assert!(json.contains("\"bestMixOutPointMs\""));
        assert!(json.contains("\"mixFriendly\""));
        assert!(json.contains("\"mixabilityWarnings\""));
    }
}
