//! The mix assembler
//!
//! Builds the segment timeline of a mix: solo, transition, solo, transition,
//! ... solo. The assembler never mixes audio itself — it plans solo bounds,
//! asks the renderer for each transition, and narrows the adjacent solos to
//! the renderer's reported cut points so no audio plays twice. Export is
//! plain concatenation of the per-segment PCM spans.

use serde::{Deserialize, Serialize};

use crate::analysis::TrackAnalysis;
use crate::error::{Result, SegueError};
use crate::transition::renderer::RenderedTransition;

/// Kind of a timeline segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SegmentKind {
    Solo,
    Transition,
}

/// One segment of the mix timeline
///
/// Solo segments reference a span of an original track; transition segments
/// reference a rendered file plus the cut points that bound the neighbouring
/// solos.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub position: usize,
    pub kind: SegmentKind,
    // Solo fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_id: Option<String>,
    #[serde(default)]
    pub start_ms: u64,
    #[serde(default)]
    pub end_ms: u64,
    pub duration_ms: u64,
    // Transition fields
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_track_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_track_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_a_cut_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_b_start_ms: Option<u64>,
}

impl Segment {
    fn solo(track_id: &str, start_ms: u64, end_ms: u64) -> Self {
        Segment {
            position: 0,
            kind: SegmentKind::Solo,
            track_id: Some(track_id.to_string()),
            start_ms,
            end_ms,
            duration_ms: end_ms.saturating_sub(start_ms),
            from_track_id: None,
            to_track_id: None,
            audio_path: None,
            track_a_cut_ms: None,
            track_b_start_ms: None,
        }
    }

    fn transition(from: &str, to: &str) -> Self {
        Segment {
            position: 0,
            kind: SegmentKind::Transition,
            track_id: None,
            start_ms: 0,
            end_ms: 0,
            duration_ms: 0,
            from_track_id: Some(from.to_string()),
            to_track_id: Some(to.to_string()),
            audio_path: None,
            track_a_cut_ms: None,
            track_b_start_ms: None,
        }
    }
}

/// One track entering the mix
#[derive(Debug, Clone)]
pub struct MixTrack {
    pub id: String,
    pub analysis: TrackAnalysis,
}

/// The evolving segment timeline of one mix
#[derive(Debug, Clone)]
pub struct MixTimeline {
    segments: Vec<Segment>,
}

impl MixTimeline {
    /// Plan the initial timeline for an ordered track list
    ///
    /// Solo bounds come from each track's intro/outro (16-bar defaults when
    /// unanalyzed); the first solo starts at zero and the last runs to its
    /// track's end. Transitions sit between adjacent solos, unrendered.
    pub fn plan(tracks: &[MixTrack]) -> Self {
        let mut segments = Vec::new();

        if tracks.len() == 1 {
            let track = &tracks[0];
            let end = (track.analysis.duration_seconds * 1000.0) as u64;
            segments.push(Segment::solo(&track.id, 0, end));
        } else {
            for (i, track) in tracks.iter().enumerate() {
                let is_first = i == 0;
                let is_last = i == tracks.len() - 1;

                let start_ms = if is_first {
                    0
                } else {
                    (track.analysis.intro_end_s() * 1000.0) as u64
                };
                let end_ms = if is_last {
                    (track.analysis.duration_seconds * 1000.0) as u64
                } else {
                    (track.analysis.outro_start_s() * 1000.0) as u64
                };

                segments.push(Segment::solo(&track.id, start_ms, end_ms));
                if !is_last {
                    segments.push(Segment::transition(&track.id, &tracks[i + 1].id));
                }
            }
        }

        let mut timeline = Self { segments };
        timeline.reindex();
        timeline
    }

    /// Record a rendered transition and narrow the neighbouring solos
    ///
    /// `pair_index` is the zero-based index of the transition (0 = between
    /// the first and second track). Sets the previous solo's end to the
    /// renderer's `track_a_play_until_ms` and the next solo's start to
    /// `track_b_start_from_ms`; the updates are applied together so readers
    /// never observe a half-adjusted boundary.
    pub fn apply_transition(
        &mut self,
        pair_index: usize,
        rendered: &RenderedTransition,
        audio_path: &str,
    ) -> Result<()> {
        let position = self
            .segments
            .iter()
            .position(|s| s.kind == SegmentKind::Transition)
            .map(|first| first + pair_index * 2)
            .ok_or_else(|| SegueError::Other("timeline has no transitions".to_string()))?;

        if position >= self.segments.len()
            || self.segments[position].kind != SegmentKind::Transition
        {
            return Err(SegueError::Other(format!(
                "no transition at pair index {}",
                pair_index
            )));
        }

        {
            let segment = &mut self.segments[position];
            segment.audio_path = Some(audio_path.to_string());
            segment.duration_ms = rendered.duration_ms;
            segment.track_a_cut_ms = Some(rendered.track_a_play_until_ms);
            segment.track_b_start_ms = Some(rendered.track_b_start_from_ms);
        }

        if position > 0 {
            let prev = &mut self.segments[position - 1];
            if prev.kind == SegmentKind::Solo {
                prev.end_ms = rendered.track_a_play_until_ms;
                prev.duration_ms = prev.end_ms.saturating_sub(prev.start_ms);
            }
        }
        if position + 1 < self.segments.len() {
            let next = &mut self.segments[position + 1];
            if next.kind == SegmentKind::Solo {
                next.start_ms = rendered.track_b_start_from_ms;
                next.duration_ms = next.end_ms.saturating_sub(next.start_ms);
            }
        }

        Ok(())
    }

    /// Remove solos whose duration has collapsed to zero
    ///
    /// The transitions around a dropped solo become adjacent; they are only
    /// merged at export, by concatenation.
    pub fn drop_empty_solos(&mut self) {
        self.segments
            .retain(|s| s.kind != SegmentKind::Solo || s.duration_ms > 0);
        self.reindex();
    }

    fn reindex(&mut self) {
        for (i, segment) in self.segments.iter_mut().enumerate() {
            segment.position = i;
        }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }

    /// Check the timeline invariants
    ///
    /// Solo first and last, kinds alternating, and every transition's cut
    /// points agreeing with its neighbouring solos.
    pub fn validate(&self) -> Result<()> {
        if self.segments.is_empty() {
            return Err(SegueError::Other("empty timeline".to_string()));
        }

        let first_solo = self.segments.first().map(|s| s.kind) == Some(SegmentKind::Solo);
        let last_solo = self.segments.last().map(|s| s.kind) == Some(SegmentKind::Solo);
        if !first_solo || !last_solo {
            return Err(SegueError::Other(
                "timeline must start and end with a solo".to_string(),
            ));
        }

        for window in self.segments.windows(2) {
            if window[0].kind == window[1].kind {
                // Adjacent transitions are legal only after a solo collapse;
                // adjacent solos never are
                if window[0].kind == SegmentKind::Solo {
                    return Err(SegueError::Other("adjacent solo segments".to_string()));
                }
            }
        }

        for (i, segment) in self.segments.iter().enumerate() {
            if segment.kind != SegmentKind::Transition {
                continue;
            }
            if let (Some(cut), Some(start)) = (segment.track_a_cut_ms, segment.track_b_start_ms) {
                if i > 0 && self.segments[i - 1].kind == SegmentKind::Solo {
                    let prev = &self.segments[i - 1];
                    if prev.end_ms != cut {
                        return Err(SegueError::Other(format!(
                            "solo {} ends at {}ms but transition cuts at {}ms",
                            prev.position, prev.end_ms, cut
                        )));
                    }
                }
                if i + 1 < self.segments.len()
                    && self.segments[i + 1].kind == SegmentKind::Solo
                {
                    let next = &self.segments[i + 1];
                    if next.start_ms != start {
                        return Err(SegueError::Other(format!(
                            "solo {} starts at {}ms but transition releases at {}ms",
                            next.position, next.start_ms, start
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

/// Concatenate per-segment PCM spans into one contiguous buffer
///
/// `fetch` resolves each segment to its samples (a solo's track span or a
/// transition's rendered file). The assembler adds nothing of its own.
pub fn concat_segments<F>(segments: &[Segment], mut fetch: F) -> Result<Vec<f32>>
where
    F: FnMut(&Segment) -> Result<Vec<f32>>,
{
    let mut out = Vec::new();
    for segment in segments {
        let samples = fetch(segment)?;
        out.extend_from_slice(&samples);
    }
    Ok(out)
}
