//! Vocal presence detection
//!
//! Two simultaneous lead vocals are the cardinal sin of mixing, so the engine
//! needs to know exactly where vocals live. Detection runs on the separated
//! vocal stem using thresholds RELATIVE to the stem's own maximum: separator
//! residuals are never absolute-zero in instrumental sections, so absolute
//! thresholds would produce false positives.

use serde::{Deserialize, Serialize};

use crate::analysis::features::windowed_rms;

/// Presence threshold as a fraction of the stem's max RMS
const PRESENCE_RATIO: f32 = 0.15;
/// Absolute floor: below this max RMS the stem is considered silent
const SILENCE_FLOOR: f32 = 5e-3;
/// Sections shorter than this are dropped (seconds)
const MIN_SECTION_S: f32 = 0.5;
/// Gaps shorter than this are bridged (seconds)
const BRIDGE_GAP_S: f32 = 0.3;
/// Sections closer than this are merged (seconds)
const MERGE_GAP_S: f32 = 1.0;
/// RMS window for detection (seconds)
const WINDOW_S: f32 = 0.1;

/// Classification of vocal intensity within a section
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VocalIntensity {
    Background,
    Sparse,
    Full,
}

impl VocalIntensity {
    fn from_ratio(ratio: f32) -> VocalIntensity {
        if ratio >= 0.50 {
            VocalIntensity::Full
        } else if ratio >= 0.25 {
            VocalIntensity::Sparse
        } else {
            VocalIntensity::Background
        }
    }
}

/// A contiguous region with vocals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocalSection {
    pub start_s: f32,
    pub end_s: f32,
    pub intensity: VocalIntensity,
}

impl VocalSection {
    pub fn duration(&self) -> f32 {
        self.end_s - self.start_s
    }

    pub fn overlaps(&self, start: f32, end: f32) -> bool {
        self.start_s < end && start < self.end_s
    }

    /// Length of the overlap with a window, in seconds
    pub fn overlap_duration(&self, start: f32, end: f32) -> f32 {
        (self.end_s.min(end) - self.start_s.max(start)).max(0.0)
    }
}

/// Result of vocal analysis on one signal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VocalProfile {
    pub has_vocals: bool,
    pub sections: Vec<VocalSection>,
    /// Fraction of the analyzed span covered by vocals (0-100)
    pub vocal_percentage: f32,
}

impl VocalProfile {
    pub fn silent() -> Self {
        Self {
            has_vocals: false,
            sections: Vec::new(),
            vocal_percentage: 0.0,
        }
    }

    /// Seconds from the start of the span until the first vocal section
    ///
    /// Returns `span_s` when the span is vocal-free.
    pub fn vocal_free_intro_seconds(&self, span_s: f32) -> f32 {
        self.sections
            .first()
            .map(|s| s.start_s.min(span_s))
            .unwrap_or(span_s)
    }

    /// Whether any FULL-intensity section overlaps a window
    pub fn has_full_vocals_in(&self, start: f32, end: f32) -> bool {
        self.sections
            .iter()
            .any(|s| s.intensity == VocalIntensity::Full && s.overlaps(start, end))
    }

    /// Total FULL-intensity coverage of a window, in seconds
    pub fn full_overlap_duration(&self, start: f32, end: f32) -> f32 {
        self.sections
            .iter()
            .filter(|s| s.intensity == VocalIntensity::Full)
            .map(|s| s.overlap_duration(start, end))
            .sum()
    }
}

/// Detect vocal sections on a vocal-isolated signal
pub fn detect(vocal_stem: &[f32], sample_rate: u32) -> VocalProfile {
    let window = (WINDOW_S * sample_rate as f32) as usize;
    if window == 0 || vocal_stem.len() < window {
        return VocalProfile::silent();
    }

    let rms = windowed_rms(vocal_stem, window);
    let max_rms = rms.iter().fold(0.0f32, |a, &b| a.max(b));

    if max_rms < SILENCE_FLOOR {
        return VocalProfile::silent();
    }

    let presence_threshold = PRESENCE_RATIO * max_rms;

    // Raw presence runs with per-window intensity ratios
    let mut sections: Vec<VocalSection> = Vec::new();
    let mut run_start: Option<usize> = None;
    let mut run_peak_ratio = 0.0f32;

    for (i, &r) in rms.iter().enumerate() {
        let present = r > presence_threshold;
        match (present, run_start) {
            (true, None) => {
                run_start = Some(i);
                run_peak_ratio = r / max_rms;
            }
            (true, Some(_)) => {
                run_peak_ratio = run_peak_ratio.max(r / max_rms);
            }
            (false, Some(start)) => {
                sections.push(VocalSection {
                    start_s: start as f32 * WINDOW_S,
                    end_s: i as f32 * WINDOW_S,
                    intensity: VocalIntensity::from_ratio(run_peak_ratio),
                });
                run_start = None;
                run_peak_ratio = 0.0;
            }
            (false, None) => {}
        }
    }
    if let Some(start) = run_start {
        sections.push(VocalSection {
            start_s: start as f32 * WINDOW_S,
            end_s: rms.len() as f32 * WINDOW_S,
            intensity: VocalIntensity::from_ratio(run_peak_ratio),
        });
    }

    // Bridge short gaps, merge near neighbours (keeping the higher
    // intensity), then drop anything still too short
    let sections = merge_sections(sections);
    let sections: Vec<VocalSection> = sections
        .into_iter()
        .filter(|s| s.duration() >= MIN_SECTION_S)
        .collect();

    let span = vocal_stem.len() as f32 / sample_rate as f32;
    let covered: f32 = sections.iter().map(|s| s.duration()).sum();

    VocalProfile {
        has_vocals: !sections.is_empty(),
        vocal_percentage: if span > 0.0 {
            (covered / span * 100.0).min(100.0)
        } else {
            0.0
        },
        sections,
    }
}

fn merge_sections(sections: Vec<VocalSection>) -> Vec<VocalSection> {
    let mut merged: Vec<VocalSection> = Vec::with_capacity(sections.len());
    for section in sections {
        match merged.last_mut() {
            Some(last) => {
                // Bridging (< 0.3s) and merging (< 1s) both collapse the gap;
                // the merged section keeps the higher intensity
                let gap = section.start_s - last.end_s;
                if gap < MERGE_GAP_S.max(BRIDGE_GAP_S) {
                    last.end_s = section.end_s;
                    last.intensity = last.intensity.max(section.intensity);
                } else {
                    merged.push(section);
                }
            }
            None => merged.push(section),
        }
    }
    merged
}

/// Severity of a vocal clash between two tracks inside a transition window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClashSeverity {
    None,
    Moderate,
    Severe,
}

/// Judge how badly the vocals of two segments clash inside a window
///
/// Both profiles are expressed in the transition's local timeline. Severe
/// means the FULL-on-FULL overlap exceeds a quarter of the window (or four
/// seconds); any overlap above half a second is moderate.
pub fn clash_severity(
    profile_a: &VocalProfile,
    profile_b: &VocalProfile,
    window_s: f32,
) -> ClashSeverity {
    let mut overlap = 0.0f32;
    for a in profile_a
        .sections
        .iter()
        .filter(|s| s.intensity == VocalIntensity::Full)
    {
        for b in profile_b
            .sections
            .iter()
            .filter(|s| s.intensity == VocalIntensity::Full)
        {
            overlap += (a.end_s.min(b.end_s) - a.start_s.max(b.start_s)).max(0.0);
        }
    }

    let severe_threshold = (window_s * 0.25).min(4.0);
    if overlap > severe_threshold {
        ClashSeverity::Severe
    } else if overlap > 0.5 {
        ClashSeverity::Moderate
    } else {
        ClashSeverity::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 44_100;

    /// Build a stem with vocals (amp) in the given second ranges and a quiet
    /// residual floor everywhere else, mimicking separator bleed.
    fn stem_with_vocals(total_s: f32, regions: &[(f32, f32, f32)]) -> Vec<f32> {
        let n = (total_s * SR as f32) as usize;
        let mut out: Vec<f32> = (0..n)
            .map(|i| (i as f32 * 300.0 * 2.0 * std::f32::consts::PI / SR as f32).sin() * 0.004)
            .collect();
        for &(start, end, amp) in regions {
            let lo = (start * SR as f32) as usize;
            let hi = ((end * SR as f32) as usize).min(n);
            for (i, sample) in out[lo..hi].iter_mut().enumerate() {
                *sample = ((lo + i) as f32 * 400.0 * 2.0 * std::f32::consts::PI / SR as f32).sin()
                    * amp;
            }
        }
        out
    }

    #[test]
    fn test_residual_floor_is_not_vocals() {
        // Pure residual bleed, no actual vocals
        let stem = stem_with_vocals(10.0, &[]);
        let profile = detect(&stem, SR);
        assert!(!profile.has_vocals);
    }

    #[test]
    fn test_detects_full_vocal_region() {
        let stem = stem_with_vocals(20.0, &[(5.0, 12.0, 0.8)]);
        let profile = detect(&stem, SR);

        assert!(profile.has_vocals);
        assert_eq!(profile.sections.len(), 1);
        let s = &profile.sections[0];
        assert!((s.start_s - 5.0).abs() < 0.3);
        assert!((s.end_s - 12.0).abs() < 0.3);
        assert_eq!(s.intensity, VocalIntensity::Full);
    }

    #[test]
    fn test_short_blips_are_dropped() {
        let stem = stem_with_vocals(10.0, &[(4.0, 4.3, 0.8)]);
        let profile = detect(&stem, SR);
        assert!(!profile.has_vocals);
    }

    #[test]
    fn test_nearby_sections_merge_keeping_higher_intensity() {
        // Two sections 0.6s apart: within the 1s merge distance
        let stem = stem_with_vocals(20.0, &[(5.0, 7.0, 0.8), (7.6, 9.0, 0.25)]);
        let profile = detect(&stem, SR);

        assert_eq!(profile.sections.len(), 1);
        assert_eq!(profile.sections[0].intensity, VocalIntensity::Full);
        assert!((profile.sections[0].end_s - 9.0).abs() < 0.3);
    }

    #[test]
    fn test_intensity_ladder() {
        // Peak amp 0.8 -> FULL; relative 0.3 of max -> SPARSE
        let stem = stem_with_vocals(30.0, &[(2.0, 6.0, 0.8), (20.0, 24.0, 0.25)]);
        let profile = detect(&stem, SR);
        assert_eq!(profile.sections.len(), 2);
        assert_eq!(profile.sections[0].intensity, VocalIntensity::Full);
        assert_eq!(profile.sections[1].intensity, VocalIntensity::Sparse);
    }

    #[test]
    fn test_vocal_free_intro() {
        let stem = stem_with_vocals(30.0, &[(12.0, 20.0, 0.8)]);
        let profile = detect(&stem, SR);
        assert!((profile.vocal_free_intro_seconds(30.0) - 12.0).abs() < 0.3);

        let silent = VocalProfile::silent();
        assert_eq!(silent.vocal_free_intro_seconds(30.0), 30.0);
    }

    #[test]
    fn test_clash_severity() {
        let a = detect(&stem_with_vocals(30.0, &[(0.0, 30.0, 0.8)]), SR);
        let b = detect(&stem_with_vocals(30.0, &[(0.0, 30.0, 0.8)]), SR);
        assert_eq!(clash_severity(&a, &b, 30.0), ClashSeverity::Severe);

        let c = detect(&stem_with_vocals(30.0, &[(28.0, 29.0, 0.8)]), SR);
        assert_eq!(clash_severity(&a, &c, 30.0), ClashSeverity::Moderate);

        let silent = VocalProfile::silent();
        assert_eq!(clash_severity(&a, &silent, 30.0), ClashSeverity::None);
    }
}
