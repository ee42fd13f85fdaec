//! Track analysis: the value objects and derivation pipeline
//!
//! A [`TrackAnalysis`] is produced once per track and cached; everything the
//! planner and renderer consume comes from here. Feature extraction proper
//! (BPM/key/energy models) lives behind ports in [`extract`]; the grid,
//! phrase, vocal, and mix-point derivations are in their sibling modules.

pub mod beats;
pub mod extract;
pub mod features;
pub mod mix_points;
pub mod mixability;
pub mod phrases;
pub mod structure;
pub mod vocals;

pub use beats::{BeatGrid, Direction, BEATS_PER_BAR};
pub use mix_points::{MixPoint, MixPointKind, MixPoints, PointQuality};
pub use mixability::{analyze_mixability, Mixability, VocalCoverage};
pub use phrases::Phrase;
pub use structure::{Section, SectionKind, TrackStructure};
pub use vocals::{ClashSeverity, VocalIntensity, VocalProfile, VocalSection};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Default intro/outro length when analysis is underdetermined, in bars
pub const DEFAULT_EDGE_BARS: f32 = 16.0;

/// Complete analysis of one track — immutable per run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackAnalysis {
    pub duration_seconds: f32,
    pub bpm: f32,
    pub bpm_confidence: f32,
    /// Beat times in seconds, strictly increasing
    pub beats: Vec<f32>,
    /// Musical key name, when detected
    pub key: Option<String>,
    /// Camelot code for the key, when known
    pub camelot: Option<String>,
    /// Overall energy in [0, 1]
    pub energy: f32,
    /// Rhythmic steadiness in [0, 1]
    #[serde(default)]
    pub danceability: f32,
    /// Peak loudness in dB (-60..0)
    pub loudness: f32,
    /// Intro end in milliseconds; defaulted to 16 bars when absent
    pub intro_end_ms: Option<u64>,
    /// Outro start in milliseconds; defaulted to 16 bars from the end
    pub outro_start_ms: Option<u64>,
    pub has_vocals: bool,
    pub vocal_sections: Vec<VocalSection>,
    pub phrases: Vec<Phrase>,
    #[serde(default)]
    pub mix_points: MixPoints,
    /// Detected sections plus intro/outro bounds; absent on job-supplied
    /// analyses that carry only the grid
    #[serde(default)]
    pub structure: Option<TrackStructure>,
    /// Blendability rating; absent on job-supplied analyses
    #[serde(default)]
    pub mixability: Option<Mixability>,
}

impl TrackAnalysis {
    /// Intro end in seconds, defaulting to 16 bars (capped at 25% of the track)
    pub fn intro_end_s(&self) -> f32 {
        match self.intro_end_ms {
            Some(ms) if ms > 0 => ms as f32 / 1000.0,
            _ => {
                let edge = crate::audio::bar_duration(self.bpm) * DEFAULT_EDGE_BARS;
                edge.min(self.duration_seconds * 0.25)
            }
        }
    }

    /// Outro start in seconds, defaulting to 16 bars before the end (floored
    /// at 75% of the track)
    pub fn outro_start_s(&self) -> f32 {
        match self.outro_start_ms {
            Some(ms) if ms > 0 && (ms as f32 / 1000.0) < self.duration_seconds => {
                ms as f32 / 1000.0
            }
            _ => {
                let edge = crate::audio::bar_duration(self.bpm) * DEFAULT_EDGE_BARS;
                (self.duration_seconds - edge).max(self.duration_seconds * 0.75)
            }
        }
    }

    /// The track's beat grid
    pub fn grid(&self) -> Result<BeatGrid> {
        BeatGrid::new(self.beats.clone(), self.bpm)
    }

    /// Vocal profile view over the cached sections
    pub fn vocal_profile(&self) -> VocalProfile {
        VocalProfile {
            has_vocals: self.has_vocals,
            sections: self.vocal_sections.clone(),
            vocal_percentage: 0.0,
        }
    }

    /// Vocal profile shifted into a window's local timeline
    ///
    /// Sections are clipped to `[start_s, start_s + span_s]` and re-based so
    /// the window starts at zero.
    pub fn vocal_profile_in_window(&self, start_s: f32, span_s: f32) -> VocalProfile {
        let end = start_s + span_s;
        let sections: Vec<VocalSection> = self
            .vocal_sections
            .iter()
            .filter(|s| s.overlaps(start_s, end))
            .map(|s| VocalSection {
                start_s: (s.start_s.max(start_s) - start_s),
                end_s: (s.end_s.min(end) - start_s),
                intensity: s.intensity,
            })
            .collect();
        VocalProfile {
            has_vocals: !sections.is_empty(),
            vocal_percentage: 0.0,
            sections,
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A plain analysis record for planner/renderer tests: regular beats,
    /// no vocals, explicit intro/outro.
    pub fn plain_analysis(bpm: f32, duration_s: f32, key: &str, energy: f32) -> TrackAnalysis {
        let beat = 60.0 / bpm;
        let count = (duration_s / beat) as usize;
        TrackAnalysis {
            duration_seconds: duration_s,
            bpm,
            bpm_confidence: 0.95,
            beats: (0..count).map(|i| i as f32 * beat).collect(),
            key: Some(key.to_string()),
            camelot: Some(key.to_string()),
            energy,
            danceability: 0.5,
            loudness: -8.0,
            intro_end_ms: None,
            outro_start_ms: None,
            has_vocals: false,
            vocal_sections: Vec::new(),
            phrases: Vec::new(),
            mix_points: MixPoints::default(),
            structure: None,
            mixability: None,
        }
    }
}
