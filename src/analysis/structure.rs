//! Track structure: intro, outro, and energy-classified sections
//!
//! Sections come from an energy-change segmentation of the windowed RMS
//! signal, snapped to bars and classified against the track's average level:
//! drops run hot, breakdowns run cold, buildups sit in between. The mix-point
//! derivation consumes these to grade candidate transition anchors.

use serde::{Deserialize, Serialize};

use crate::analysis::beats::BeatGrid;
use crate::analysis::features::{self, FrameFeatures};

/// Section classification by relative energy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionKind {
    Breakdown,
    Buildup,
    Drop,
    Main,
}

/// A contiguous section of the track
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Section {
    pub start_s: f32,
    pub end_s: f32,
    pub kind: SectionKind,
}

/// Intro/outro bounds plus classified sections
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackStructure {
    pub intro_end_s: f32,
    pub outro_start_s: f32,
    pub sections: Vec<Section>,
}

impl TrackStructure {
    /// The section covering a time position (Main when between sections)
    pub fn section_at(&self, t: f32) -> SectionKind {
        self.sections
            .iter()
            .find(|s| s.start_s <= t && t < s.end_s)
            .map(|s| s.kind)
            .unwrap_or(SectionKind::Main)
    }
}

const MAX_SECTIONS: usize = 12;
const MIN_SECTION_BARS: f32 = 4.0;

/// Detect the structure of a track from its features and beat grid
pub fn detect_structure(
    features: &FrameFeatures,
    grid: &BeatGrid,
    duration_s: f32,
) -> TrackStructure {
    let rms = &features.rms;
    if rms.len() < 10 {
        // Too short to segment; heuristic 16-bar bounds
        let sixteen_bars = grid.bars_to_seconds(16.0);
        return TrackStructure {
            intro_end_s: sixteen_bars.min(duration_s * 0.25),
            outro_start_s: (duration_s - sixteen_bars).max(duration_s * 0.75),
            sections: Vec::new(),
        };
    }

    let mean_rms = rms.iter().sum::<f32>() / rms.len() as f32;
    let threshold = mean_rms * 0.7;

    // Intro: first frame where energy clears 70% of the average
    let intro_end = rms
        .iter()
        .position(|&r| r > threshold)
        .map(|i| features.frame_time(i))
        .filter(|&t| t > 0.0)
        .unwrap_or_else(|| grid.bars_to_seconds(8.0));
    let intro_end = snap_to_bar(grid, intro_end).min(duration_s * 0.25);

    // Outro: last frame where energy clears the same threshold
    let outro_start = rms
        .iter()
        .rposition(|&r| r > threshold)
        .map(|i| features.frame_time(i))
        .unwrap_or(duration_s - grid.bars_to_seconds(8.0));
    let outro_start = snap_to_bar(grid, outro_start).max(duration_s * 0.75);

    let sections = detect_sections(features, grid, duration_s, mean_rms);

    TrackStructure {
        intro_end_s: intro_end,
        outro_start_s: outro_start.min(duration_s),
        sections,
    }
}

fn snap_to_bar(grid: &BeatGrid, t: f32) -> f32 {
    grid.snap_to_downbeat(t).unwrap_or(t)
}

fn detect_sections(
    features: &FrameFeatures,
    grid: &BeatGrid,
    duration_s: f32,
    mean_rms: f32,
) -> Vec<Section> {
    let smoothed = features::moving_average(&features.rms, (features.rms.len() / 50).max(3));

    // Boundary candidates where the smoothed level moves sharply
    let diffs: Vec<f32> = smoothed.windows(2).map(|w| w[1] - w[0]).collect();
    let std = {
        let mean = diffs.iter().sum::<f32>() / diffs.len().max(1) as f32;
        (diffs.iter().map(|d| (d - mean).powi(2)).sum::<f32>() / diffs.len().max(1) as f32).sqrt()
    };
    let threshold = std * 1.5;

    let min_section = grid.bars_to_seconds(MIN_SECTION_BARS);
    let mut boundaries = vec![0.0f32];
    for (i, &d) in diffs.iter().enumerate() {
        if d.abs() > threshold {
            let t = snap_to_bar(grid, features.frame_time(i + 1));
            if t - boundaries.last().unwrap() >= min_section {
                boundaries.push(t);
            }
        }
    }
    if duration_s - boundaries.last().unwrap() >= min_section {
        boundaries.push(duration_s);
    } else if boundaries.len() > 1 {
        *boundaries.last_mut().unwrap() = duration_s;
    }

    let mut sections = Vec::new();
    for pair in boundaries.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let lo = features.frame_at(start);
        let hi = features.frame_at(end).max(lo + 1);
        let level = features.rms[lo..hi.min(features.rms.len())]
            .iter()
            .sum::<f32>()
            / (hi - lo) as f32;

        let kind = if level > mean_rms * 1.3 {
            SectionKind::Drop
        } else if level > mean_rms * 1.1 {
            SectionKind::Buildup
        } else if level < mean_rms * 0.6 {
            SectionKind::Breakdown
        } else {
            SectionKind::Main
        };

        sections.push(Section {
            start_s: start,
            end_s: end,
            kind,
        });
        if sections.len() >= MAX_SECTIONS {
            break;
        }
    }

    sections
}
