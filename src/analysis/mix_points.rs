//! Mix point derivation
//!
//! Candidate mix-in and mix-out anchors derived from the track's structure,
//! phrases, and vocal map. Every phrase boundary is a candidate; breakdowns
//! and buildups grade excellent, plain main sections good, and anything under
//! FULL vocals only fair. Near-duplicates within a bar collapse to the best
//! candidate.

use serde::{Deserialize, Serialize};

use crate::analysis::phrases::Phrase;
use crate::analysis::structure::{SectionKind, TrackStructure};
use crate::analysis::vocals::VocalProfile;

/// What kind of musical moment a mix point anchors to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MixPointKind {
    IntroStart,
    PhraseBoundary,
    BreakdownStart,
    BreakdownEnd,
    PostDrop,
    OutroStart,
}

/// Quality grade of a mix point
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PointQuality {
    Excellent,
    Good,
    Fair,
}

/// A candidate transition anchor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MixPoint {
    pub time_s: f32,
    pub kind: MixPointKind,
    pub quality: PointQuality,
}

/// Mix-in and mix-out candidates for one track
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MixPoints {
    pub mix_in: Vec<MixPoint>,
    pub mix_out: Vec<MixPoint>,
}

impl MixPoints {
    pub fn best_mix_in(&self) -> Option<&MixPoint> {
        self.mix_in.first()
    }

    pub fn best_mix_out(&self) -> Option<&MixPoint> {
        self.mix_out.first()
    }
}

const MAX_POINTS: usize = 10;

/// Derive mix points from the analyzed structure
pub fn derive_mix_points(
    structure: &TrackStructure,
    phrases: &[Phrase],
    vocals: &VocalProfile,
    duration_s: f32,
    bpm: f32,
) -> MixPoints {
    let bar = crate::audio::bar_duration(bpm);

    let mut mix_in: Vec<MixPoint> = Vec::new();
    let mut mix_out: Vec<MixPoint> = Vec::new();

    // The intro is designed for mixing in
    mix_in.push(MixPoint {
        time_s: 0.0,
        kind: MixPointKind::IntroStart,
        quality: PointQuality::Excellent,
    });

    // Every phrase boundary is a candidate, graded by its section and the
    // vocal map
    for phrase in phrases {
        let t = phrase.start_s;
        if t <= 0.0 {
            continue;
        }
        let quality = grade_boundary(structure, vocals, t);
        mix_in.push(MixPoint {
            time_s: t,
            kind: MixPointKind::PhraseBoundary,
            quality,
        });
        // Boundaries in the back half also work as exits
        if phrase.end_s > duration_s / 2.0 {
            let q = grade_boundary(structure, vocals, phrase.end_s);
            mix_out.push(MixPoint {
                time_s: phrase.end_s,
                kind: MixPointKind::PhraseBoundary,
                quality: q.max(PointQuality::Good),
            });
        }
    }

    // Breakdowns: low energy, perfect blend zones
    let mut prev_was_drop = false;
    for section in &structure.sections {
        match section.kind {
            SectionKind::Breakdown => {
                mix_in.push(MixPoint {
                    time_s: section.start_s,
                    kind: MixPointKind::BreakdownStart,
                    quality: PointQuality::Excellent,
                });
                mix_out.push(MixPoint {
                    time_s: section.end_s,
                    kind: MixPointKind::BreakdownEnd,
                    quality: PointQuality::Good,
                });
            }
            _ => {
                if prev_was_drop {
                    mix_out.push(MixPoint {
                        time_s: section.start_s,
                        kind: MixPointKind::PostDrop,
                        quality: PointQuality::Good,
                    });
                }
            }
        }
        prev_was_drop = section.kind == SectionKind::Drop;
    }

    // The outro is designed for mixing out
    mix_out.push(MixPoint {
        time_s: structure.outro_start_s,
        kind: MixPointKind::OutroStart,
        quality: PointQuality::Excellent,
    });

    let mut mix_in = dedup_points(mix_in, bar);
    let mut mix_out = dedup_points(mix_out, bar);
    sort_points(&mut mix_in);
    sort_points(&mut mix_out);
    mix_in.truncate(MAX_POINTS);
    mix_out.truncate(MAX_POINTS);

    MixPoints { mix_in, mix_out }
}

fn grade_boundary(structure: &TrackStructure, vocals: &VocalProfile, t: f32) -> PointQuality {
    if vocals.has_full_vocals_in(t - 0.01, t + 0.01) {
        return PointQuality::Fair;
    }
    match structure.section_at(t) {
        SectionKind::Breakdown | SectionKind::Buildup => PointQuality::Excellent,
        SectionKind::Main => PointQuality::Good,
        SectionKind::Drop => PointQuality::Fair,
    }
}

/// Collapse points within one bar of each other, keeping the better quality
fn dedup_points(mut points: Vec<MixPoint>, window_s: f32) -> Vec<MixPoint> {
    points.sort_by(|a, b| a.time_s.partial_cmp(&b.time_s).unwrap());
    let mut result: Vec<MixPoint> = Vec::with_capacity(points.len());
    for point in points {
        match result.last_mut() {
            Some(last) if point.time_s - last.time_s < window_s => {
                if point.quality < last.quality {
                    *last = point;
                }
            }
            _ => result.push(point),
        }
    }
    result
}

fn sort_points(points: &mut [MixPoint]) {
    points.sort_by(|a, b| {
        a.quality
            .cmp(&b.quality)
            .then(a.time_s.partial_cmp(&b.time_s).unwrap())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::structure::Section;
    use crate::analysis::vocals::{VocalIntensity, VocalSection};

    fn phrases_16(count: usize, bar: f32) -> Vec<Phrase> {
        (0..count)
            .map(|i| Phrase {
                start_s: i as f32 * 16.0 * bar,
                end_s: (i + 1) as f32 * 16.0 * bar,
                bar_count: 16,
            })
            .collect()
    }

    fn simple_structure(duration: f32) -> TrackStructure {
        TrackStructure {
            intro_end_s: 30.0,
            outro_start_s: duration - 30.0,
            sections: vec![
                Section {
                    start_s: 60.0,
                    end_s: 90.0,
                    kind: SectionKind::Drop,
                },
                Section {
                    start_s: 90.0,
                    end_s: 120.0,
                    kind: SectionKind::Breakdown,
                },
            ],
        }
    }

    #[test]
    fn test_intro_and_outro_are_always_candidates() {
        let bar = crate::audio::bar_duration(128.0);
        let points = derive_mix_points(
            &simple_structure(240.0),
            &phrases_16(8, bar),
            &VocalProfile::silent(),
            240.0,
            128.0,
        );

        assert!(points
            .mix_in
            .iter()
            .any(|p| p.kind == MixPointKind::IntroStart));
        assert!(points
            .mix_out
            .iter()
            .any(|p| p.kind == MixPointKind::OutroStart));
    }

    #[test]
    fn test_best_points_are_excellent_first() {
        let bar = crate::audio::bar_duration(128.0);
        let points = derive_mix_points(
            &simple_structure(240.0),
            &phrases_16(8, bar),
            &VocalProfile::silent(),
            240.0,
            128.0,
        );

        assert_eq!(points.best_mix_in().unwrap().quality, PointQuality::Excellent);
        assert_eq!(
            points.best_mix_out().unwrap().quality,
            PointQuality::Excellent
        );
        // Quality ordering is non-decreasing down the list
        for pair in points.mix_in.windows(2) {
            assert!(pair[0].quality <= pair[1].quality);
        }
    }

    #[test]
    fn test_full_vocals_downgrade_boundaries() {
        let bar = crate::audio::bar_duration(128.0);
        let vocal_everywhere = VocalProfile {
            has_vocals: true,
            vocal_percentage: 100.0,
            sections: vec![VocalSection {
                start_s: 0.0,
                end_s: 240.0,
                intensity: VocalIntensity::Full,
            }],
        };
        let structure = TrackStructure {
            intro_end_s: 30.0,
            outro_start_s: 210.0,
            sections: Vec::new(),
        };
        let points =
            derive_mix_points(&structure, &phrases_16(8, bar), &vocal_everywhere, 240.0, 128.0);

        // Phrase boundaries under full vocals grade fair
        assert!(points
            .mix_in
            .iter()
            .filter(|p| p.kind == MixPointKind::PhraseBoundary)
            .all(|p| p.quality == PointQuality::Fair));
    }

    #[test]
    fn test_near_duplicates_collapse() {
        let bar = crate::audio::bar_duration(128.0);
        let points = vec![
            MixPoint {
                time_s: 10.0,
                kind: MixPointKind::PhraseBoundary,
                quality: PointQuality::Good,
            },
            MixPoint {
                time_s: 10.0 + bar * 0.5,
                kind: MixPointKind::BreakdownStart,
                quality: PointQuality::Excellent,
            },
        ];
        let deduped = dedup_points(points, bar);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].quality, PointQuality::Excellent);
    }
}
