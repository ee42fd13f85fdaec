//! Beat grid: downbeats, snapping, and bar arithmetic
//!
//! The grid consumes a pre-computed beat list (times in seconds, strictly
//! increasing) plus the track BPM, and answers every timing question the
//! engine has: where the downbeats are, what the nearest beat to a position
//! is, and how bars map to seconds and samples.
//!
//! Downbeats are every fourth beat starting from the first detected beat;
//! electronic music is built in powers of two, and major changes land on the
//! first beat of a bar.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegueError};

/// Beats per 4/4 bar
pub const BEATS_PER_BAR: usize = 4;

/// Minimum number of beats needed for a usable grid
const MIN_BEATS: usize = 8;

/// Search direction for beat lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Nearest,
    Before,
    After,
}

/// A track's beat grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatGrid {
    beats: Vec<f32>,
    bpm: f32,
}

impl BeatGrid {
    /// Build a grid from a beat list and BPM
    ///
    /// Fails with `AnalysisUnderdetermined` when there are too few beats to
    /// derive downbeats and phrases, or when the list is not strictly
    /// increasing.
    pub fn new(beats: Vec<f32>, bpm: f32) -> Result<Self> {
        if beats.len() < MIN_BEATS {
            return Err(SegueError::AnalysisUnderdetermined(format!(
                "{} beats is too few for a grid",
                beats.len()
            )));
        }
        if !(60.0..=200.0).contains(&bpm) {
            return Err(SegueError::AnalysisUnderdetermined(format!(
                "bpm {} outside 60-200",
                bpm
            )));
        }
        if beats.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SegueError::AnalysisUnderdetermined(
                "beat list is not strictly increasing".to_string(),
            ));
        }
        if beats[0] < 0.0 {
            return Err(SegueError::AnalysisUnderdetermined(
                "negative beat time".to_string(),
            ));
        }
        Ok(Self { beats, bpm })
    }

    /// Synthesize a perfectly regular grid (used for fallbacks and tests)
    pub fn regular(bpm: f32, first_beat: f32, count: usize) -> Result<Self> {
        let beat = 60.0 / bpm;
        let beats = (0..count).map(|i| first_beat + i as f32 * beat).collect();
        Self::new(beats, bpm)
    }

    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn beats(&self) -> &[f32] {
        &self.beats
    }

    /// Duration of one beat in seconds
    pub fn beat_duration(&self) -> f32 {
        60.0 / self.bpm
    }

    /// Duration of one 4/4 bar in seconds
    pub fn bar_duration(&self) -> f32 {
        self.beat_duration() * BEATS_PER_BAR as f32
    }

    pub fn bars_to_seconds(&self, bars: f32) -> f32 {
        bars * self.bar_duration()
    }

    pub fn seconds_to_bars(&self, seconds: f32) -> f32 {
        seconds / self.bar_duration()
    }

    /// Downbeat times: every fourth beat starting from the first
    pub fn downbeats(&self) -> Vec<f32> {
        self.beats.iter().step_by(BEATS_PER_BAR).copied().collect()
    }

    /// Find the beat nearest to a time position
    ///
    /// Returns `(beat_time, beat_index)`. With `Before`/`After` the search is
    /// one-sided and falls back to the first/last beat at the edges.
    pub fn nearest_beat(&self, t: f32, direction: Direction) -> (f32, usize) {
        match direction {
            Direction::Before => {
                let idx = match self.beats.iter().rposition(|&b| b <= t) {
                    Some(i) => i,
                    None => 0,
                };
                (self.beats[idx], idx)
            }
            Direction::After => {
                let idx = match self.beats.iter().position(|&b| b >= t) {
                    Some(i) => i,
                    None => self.beats.len() - 1,
                };
                (self.beats[idx], idx)
            }
            Direction::Nearest => {
                let mut best = 0;
                let mut best_dist = f32::MAX;
                for (i, &b) in self.beats.iter().enumerate() {
                    let d = (b - t).abs();
                    if d < best_dist {
                        best_dist = d;
                        best = i;
                    }
                }
                (self.beats[best], best)
            }
        }
    }

    /// Snap a time to the nearest beat, within half a beat
    pub fn snap_to_beat(&self, t: f32) -> Option<f32> {
        let (beat, _) = self.nearest_beat(t, Direction::Nearest);
        if (beat - t).abs() <= self.beat_duration() / 2.0 {
            Some(beat)
        } else {
            None
        }
    }

    /// Snap a time to the nearest downbeat, within half a beat
    pub fn snap_to_downbeat(&self, t: f32) -> Option<f32> {
        let downbeats = self.downbeats();
        let nearest = downbeats
            .iter()
            .copied()
            .min_by(|a, b| (a - t).abs().partial_cmp(&(b - t).abs()).unwrap())?;
        if (nearest - t).abs() <= self.beat_duration() / 2.0 {
            Some(nearest)
        } else {
            None
        }
    }

    /// The downbeat at or before a time position (cue points anchor here)
    ///
    /// Falls back to the first downbeat when `t` precedes the grid.
    pub fn downbeat_at_or_before(&self, t: f32) -> f32 {
        let downbeats = self.downbeats();
        downbeats
            .iter()
            .rev()
            .copied()
            .find(|&d| d <= t)
            .unwrap_or(downbeats[0])
    }

    /// The next downbeat index at or after a beat index
    pub fn next_downbeat_index(&self, beat_idx: usize) -> usize {
        let mut idx = beat_idx;
        while idx % BEATS_PER_BAR != 0 {
            idx += 1;
            if idx >= self.beats.len() {
                return self.beats.len() - 1;
            }
        }
        idx
    }

    /// Rescale all beat times by a factor (after a time-stretch)
    ///
    /// Stretching audio to run at `rate` times its original speed divides
    /// every timestamp by `rate`; pass `1.0 / rate` here.
    pub fn scale(&self, factor: f32) -> BeatGrid {
        BeatGrid {
            beats: self.beats.iter().map(|&b| b * factor).collect(),
            bpm: self.bpm / factor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_128() -> BeatGrid {
        // 128 BPM: beat = 0.46875s
        BeatGrid::regular(128.0, 0.0, 256).unwrap()
    }

    #[test]
    fn test_rejects_underdetermined_input() {
        assert!(matches!(
            BeatGrid::new(vec![0.0, 0.5, 1.0], 120.0),
            Err(SegueError::AnalysisUnderdetermined(_))
        ));
        assert!(BeatGrid::new(vec![0.0, 0.5, 0.4, 1.0, 1.5, 2.0, 2.5, 3.0], 120.0).is_err());
        assert!(BeatGrid::regular(250.0, 0.0, 64).is_err());
    }

    #[test]
    fn test_downbeats_are_every_fourth_beat() {
        let grid = grid_128();
        let downbeats = grid.downbeats();
        assert_eq!(downbeats.len(), 64);
        assert_eq!(downbeats[0], grid.beats()[0]);
        assert_eq!(downbeats[1], grid.beats()[4]);
    }

    #[test]
    fn test_nearest_beat_directions() {
        let grid = grid_128();
        let beat = grid.beat_duration();

        let (t, idx) = grid.nearest_beat(beat * 2.4, Direction::Nearest);
        assert_eq!(idx, 2);
        assert!((t - beat * 2.0).abs() < 1e-4);

        let (t, _) = grid.nearest_beat(beat * 2.9, Direction::Before);
        assert!((t - beat * 2.0).abs() < 1e-4);

        let (t, _) = grid.nearest_beat(beat * 2.1, Direction::After);
        assert!((t - beat * 3.0).abs() < 1e-4);
    }

    #[test]
    fn test_snap_tolerance_is_half_a_beat() {
        let grid = grid_128();
        let beat = grid.beat_duration();

        // Just inside tolerance
        assert!(grid.snap_to_beat(beat * 3.0 + beat * 0.49).is_some());
        // Snapping always succeeds on a dense grid; tolerance matters for
        // downbeats, which are four beats apart
        assert!(grid.snap_to_downbeat(beat * 4.0 + beat * 0.4).is_some());
        assert!(grid.snap_to_downbeat(beat * 4.0 + beat * 1.8).is_none());
    }

    #[test]
    fn test_downbeat_at_or_before() {
        let grid = grid_128();
        let bar = grid.bar_duration();

        let cue = grid.downbeat_at_or_before(bar * 3.7);
        assert!((cue - bar * 3.0).abs() < 1e-4);

        // Before the grid start: capped to the first downbeat
        assert_eq!(grid.downbeat_at_or_before(-5.0), grid.beats()[0]);
    }

    #[test]
    fn test_scale_for_stretch() {
        let grid = grid_128();
        // Stretched to run 4% faster: timestamps shrink
        let scaled = grid.scale(1.0 / 1.04);
        assert!((scaled.bpm() - 128.0 * 1.04).abs() < 0.01);
        assert!(scaled.beats()[10] < grid.beats()[10]);
    }

    #[test]
    fn test_bar_math() {
        let grid = grid_128();
        assert!((grid.bar_duration() - 1.875).abs() < 1e-5);
        assert!((grid.bars_to_seconds(16.0) - 30.0).abs() < 1e-4);
        assert!((grid.seconds_to_bars(30.0) - 16.0).abs() < 1e-4);
    }
}
