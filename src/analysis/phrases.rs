//! Phrase detection
//!
//! A phrase is a coherent musical unit of 8, 16 or 32 bars. Electronic music
//! is built in powers of two and major changes land on the first beat of a
//! new phrase, so transitions must align to phrase boundaries.
//!
//! Boundaries are found by thresholding the smoothed multi-feature change
//! signal (RMS, spectral centroid, spectral contrast), snapping candidates to
//! the nearest downbeat, and quantizing the resulting lengths to the nearest
//! standard phrase length with a bias toward 16 bars.

use serde::{Deserialize, Serialize};

use crate::analysis::beats::BeatGrid;
use crate::analysis::features::{self, FrameFeatures};

/// Minimum phrase length in bars
pub const MIN_PHRASE_BARS: f32 = 6.0;

/// A detected phrase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phrase {
    pub start_s: f32,
    pub end_s: f32,
    /// Quantized length: 8, 16 or 32
    pub bar_count: u32,
}

impl Phrase {
    pub fn contains(&self, t: f32) -> bool {
        self.start_s <= t && t < self.end_s
    }
}

/// Quantize a raw bar count to {8, 16, 32}, biased toward 16
pub fn quantize_bar_count(raw_bars: f32) -> u32 {
    let rounded = raw_bars.round() as i64;
    if rounded <= 12 {
        8
    } else if rounded <= 24 {
        16
    } else {
        32
    }
}

/// Detect phrases from features and the beat grid
///
/// Falls back to a regular 16-bar grid when the audio gives no usable change
/// signal.
pub fn detect_phrases(
    features: &FrameFeatures,
    grid: &BeatGrid,
    duration_s: f32,
) -> Vec<Phrase> {
    let downbeats = grid.downbeats();
    if downbeats.len() < 2 {
        return estimate_phrases(grid, duration_s);
    }

    let change = features::change_signal(features);
    if change.len() < 4 {
        return estimate_phrases(grid, duration_s);
    }

    let mean = change.iter().sum::<f32>() / change.len() as f32;
    let std = (change.iter().map(|c| (c - mean).powi(2)).sum::<f32>() / change.len() as f32).sqrt();
    let threshold = mean + std;

    // Candidate boundary times, snapped to downbeats
    let mut candidates: Vec<f32> = Vec::new();
    for (i, &c) in change.iter().enumerate() {
        if c > threshold {
            let t = features.frame_time(i + 1);
            if let Some(snapped) = grid.snap_to_downbeat(t) {
                candidates.push(snapped);
            }
        }
    }
    candidates.dedup_by(|a, b| (*a - *b).abs() < 1e-3);

    let min_gap = grid.bars_to_seconds(MIN_PHRASE_BARS);
    let forced_gap = grid.bars_to_seconds(16.0);

    // Walk forward, taking candidate boundaries when they respect the
    // minimum phrase length, and forcing one every 16 bars otherwise
    let mut boundaries = vec![downbeats[0]];
    let mut candidate_iter = candidates.into_iter().peekable();
    loop {
        let last = *boundaries.last().unwrap();
        // Skip candidates behind or too close to the last boundary
        while let Some(&c) = candidate_iter.peek() {
            if c < last + min_gap {
                candidate_iter.next();
            } else {
                break;
            }
        }
        let next = match candidate_iter.peek() {
            Some(&c) if c <= last + forced_gap => {
                candidate_iter.next();
                c
            }
            _ => {
                // Force a 16-bar boundary if the track continues
                let forced = last + forced_gap;
                if forced >= duration_s {
                    break;
                }
                grid.snap_to_downbeat(forced).unwrap_or(forced)
            }
        };
        if next >= duration_s || next <= last {
            break;
        }
        boundaries.push(next);
    }
    if duration_s - *boundaries.last().unwrap() >= min_gap {
        boundaries.push(duration_s);
    }

    let mut phrases = Vec::with_capacity(boundaries.len().saturating_sub(1));
    for pair in boundaries.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        let raw_bars = grid.seconds_to_bars(end - start);
        phrases.push(Phrase {
            start_s: start,
            end_s: end,
            bar_count: quantize_bar_count(raw_bars),
        });
    }
    phrases
}

/// Fallback: a regular grid of 16-bar phrases
pub fn estimate_phrases(grid: &BeatGrid, duration_s: f32) -> Vec<Phrase> {
    let phrase_len = grid.bars_to_seconds(16.0);
    let mut phrases = Vec::new();
    let mut start = 0.0f32;
    while start < duration_s {
        let end = (start + phrase_len).min(duration_s);
        phrases.push(Phrase {
            start_s: start,
            end_s: end,
            bar_count: 16,
        });
        start = end;
    }
    phrases
}

/// Nearest phrase boundary to a time, or None when there are no phrases
pub fn nearest_boundary(phrases: &[Phrase], t: f32) -> Option<f32> {
    let mut boundaries: Vec<f32> = phrases.iter().map(|p| p.start_s).collect();
    if let Some(last) = phrases.last() {
        boundaries.push(last.end_s);
    }
    boundaries
        .into_iter()
        .min_by(|a, b| (a - t).abs().partial_cmp(&(b - t).abs()).unwrap())
}
