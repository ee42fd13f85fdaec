//! Transition plans: the contract between planner and renderer
//!
//! A plan names the transition mode, its timing (duration in bars, anchor in
//! A, entry in B), and per-mode parameters: stem phases and the bass-swap
//! bar for blends, tail effects for cuts and echo exits, sweep bounds for
//! filter transitions. Plans are JSON-serializable; anything arriving from
//! outside (the LLM port) passes through [`TransitionPlan::validate`] before
//! the renderer will touch it.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SegueError};
use crate::theory::TempoFactor;
use crate::transition::bass_swap::BassSwapStyle;

/// Realization mode of a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionMode {
    #[serde(rename = "STEM_BLEND")]
    StemBlend,
    #[serde(rename = "CROSSFADE")]
    Crossfade,
    #[serde(rename = "HARD_CUT")]
    HardCut,
    #[serde(rename = "FILTER_SWEEP")]
    FilterSweep,
    #[serde(rename = "ECHO_OUT")]
    EchoOut,
}

impl TransitionMode {
    /// Legal bar counts for this mode
    pub fn allowed_durations(&self) -> &'static [u32] {
        match self {
            TransitionMode::StemBlend => &[8, 16, 24, 32],
            TransitionMode::HardCut => &[0],
            _ => &[4, 8, 16],
        }
    }
}

/// Per-stem gain levels in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StemLevels {
    #[serde(default)]
    pub drums: f32,
    #[serde(default)]
    pub bass: f32,
    #[serde(default)]
    pub other: f32,
    #[serde(default)]
    pub vocals: f32,
}

impl StemLevels {
    pub fn full() -> Self {
        Self {
            drums: 1.0,
            bass: 1.0,
            other: 1.0,
            vocals: 1.0,
        }
    }

    pub fn silent() -> Self {
        Self {
            drums: 0.0,
            bass: 0.0,
            other: 0.0,
            vocals: 0.0,
        }
    }

    fn in_range(&self) -> bool {
        [self.drums, self.bass, self.other, self.vocals]
            .iter()
            .all(|&l| (0.0..=1.0).contains(&l))
    }
}

/// One automation phase of a stem blend: bar range plus target levels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Inclusive 1-indexed bar range [start, end]
    pub bars: [u32; 2],
    pub a: StemLevels,
    pub b: StemLevels,
}

/// Tail flavour for HARD_CUT and ECHO_OUT exits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TailKind {
    None,
    Reverb,
    Delay,
}

/// Tail effect configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TailEffect {
    pub kind: TailKind,
    #[serde(default = "default_room_size")]
    pub room_size: f32,
    #[serde(default = "default_decay")]
    pub decay_s: f32,
    #[serde(default = "default_beat_fraction")]
    pub beat_fraction: f32,
    #[serde(default = "default_feedback")]
    pub feedback: f32,
    #[serde(default = "default_fade")]
    pub fade_s: f32,
}

fn default_room_size() -> f32 {
    0.8
}
fn default_decay() -> f32 {
    4.0
}
fn default_beat_fraction() -> f32 {
    0.5
}
fn default_feedback() -> f32 {
    0.5
}
fn default_fade() -> f32 {
    1.5
}

impl Default for TailEffect {
    /// The hard-cut default: a big reverb with a four-second decay
    fn default() -> Self {
        Self {
            kind: TailKind::Reverb,
            room_size: default_room_size(),
            decay_s: default_decay(),
            beat_fraction: default_beat_fraction(),
            feedback: default_feedback(),
            fade_s: default_fade(),
        }
    }
}

/// Sweep bounds for FILTER_SWEEP, all in Hz
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FilterSweepSpec {
    pub hpf_start_a: f32,
    pub hpf_end_a: f32,
    pub lpf_start_b: f32,
    pub lpf_end_b: f32,
}

impl Default for FilterSweepSpec {
    fn default() -> Self {
        Self {
            hpf_start_a: 20.0,
            hpf_end_a: 2000.0,
            lpf_start_b: 200.0,
            lpf_end_b: 20_000.0,
        }
    }
}

/// Typed warning tags carried on plans and render results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningTag {
    VocalClash,
    HarmonicClash,
    BpmStretchAudible,
    BpmDifferenceTooLarge,
    StretchClamped,
    TransitionShortened,
    BassSwapRetried,
    DowngradedToCrossfade,
    DowngradedToHardCut,
    SeparationUnavailable,
    EnergyDropAtPeak,
    FallbackPlanUsed,
}

/// A complete transition plan
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionPlan {
    #[serde(rename = "type")]
    pub mode: TransitionMode,
    pub duration_bars: u32,
    /// Anchor in A's timeline, seconds; None means the outro start
    pub start_time_in_a: Option<f32>,
    /// Entry point in B's original timeline, seconds
    #[serde(default)]
    pub start_from_b: f32,
    /// 1-indexed bar of the bass swap (STEM_BLEND)
    pub bass_swap_bar: Option<u32>,
    #[serde(default)]
    pub bass_swap_style: BassSwapStyle,
    /// Custom stem phases; None selects the default four-phase automation
    pub phases: Option<Vec<PhaseSpec>>,
    /// Exit tail for HARD_CUT / ECHO_OUT
    pub tail: Option<TailEffect>,
    /// Sweep bounds for FILTER_SWEEP
    pub filter: Option<FilterSweepSpec>,
    #[serde(default)]
    pub tempo_factor: TempoFactor,
    pub confidence: f32,
    #[serde(default)]
    pub warnings: Vec<WarningTag>,
}

impl TransitionPlan {
    /// A plain plan of the given mode with mode-appropriate defaults
    pub fn new(mode: TransitionMode, duration_bars: u32) -> Self {
        Self {
            mode,
            duration_bars,
            start_time_in_a: None,
            start_from_b: 0.0,
            bass_swap_bar: if mode == TransitionMode::StemBlend {
                Some(duration_bars / 2 + 1)
            } else {
                None
            },
            bass_swap_style: BassSwapStyle::Instant,
            phases: None,
            tail: match mode {
                TransitionMode::HardCut => Some(TailEffect::default()),
                TransitionMode::EchoOut => Some(TailEffect {
                    kind: TailKind::Delay,
                    ..TailEffect::default()
                }),
                _ => None,
            },
            filter: if mode == TransitionMode::FilterSweep {
                Some(FilterSweepSpec::default())
            } else {
                None
            },
            tempo_factor: TempoFactor::Normal,
            confidence: 0.9,
            warnings: Vec::new(),
        }
    }

    /// Validate the plan's internal consistency
    ///
    /// Checks the duration against the mode's legal set, the phase cover,
    /// the stem level ranges, the bass-swap bar, and the confidence bound.
    pub fn validate(&self) -> Result<()> {
        if !self.mode.allowed_durations().contains(&self.duration_bars) {
            return Err(SegueError::PlanInvalid(format!(
                "duration {} bars not allowed for {:?}",
                self.duration_bars, self.mode
            )));
        }

        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(SegueError::PlanInvalid(format!(
                "confidence {} outside [0, 1]",
                self.confidence
            )));
        }

        if let Some(bar) = self.bass_swap_bar {
            if bar < 1 || bar > self.duration_bars.max(1) {
                return Err(SegueError::PlanInvalid(format!(
                    "bass swap bar {} outside [1, {}]",
                    bar, self.duration_bars
                )));
            }
        }

        if let Some(phases) = &self.phases {
            if phases.is_empty() {
                return Err(SegueError::PlanInvalid("empty phase list".to_string()));
            }
            let mut expected_start = 1u32;
            for phase in phases {
                let [start, end] = phase.bars;
                if start != expected_start {
                    return Err(SegueError::PlanInvalid(format!(
                        "phase gap: expected bar {}, got {}",
                        expected_start, start
                    )));
                }
                if end < start {
                    return Err(SegueError::PlanInvalid(format!(
                        "phase range [{}, {}] inverted",
                        start, end
                    )));
                }
                if !phase.a.in_range() || !phase.b.in_range() {
                    return Err(SegueError::PlanInvalid(
                        "stem level outside [0, 1]".to_string(),
                    ));
                }
                expected_start = end + 1;
            }
            if expected_start != self.duration_bars + 1 {
                return Err(SegueError::PlanInvalid(format!(
                    "phases cover bars 1..{} but transition is {} bars",
                    expected_start - 1,
                    self.duration_bars
                )));
            }
        }

        if matches!(self.start_time_in_a, Some(t) if t < 0.0) {
            return Err(SegueError::PlanInvalid(
                "negative start time in A".to_string(),
            ));
        }
        if self.start_from_b < 0.0 {
            return Err(SegueError::PlanInvalid(
                "negative entry point in B".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_per_mode() {
        let blend = TransitionPlan::new(TransitionMode::StemBlend, 16);
        assert_eq!(blend.bass_swap_bar, Some(9));
        assert!(blend.tail.is_none());

        let cut = TransitionPlan::new(TransitionMode::HardCut, 0);
        let tail = cut.tail.unwrap();
        assert_eq!(tail.kind, TailKind::Reverb);
        assert_eq!(tail.decay_s, 4.0);
        assert_eq!(tail.room_size, 0.8);

        let sweep = TransitionPlan::new(TransitionMode::FilterSweep, 8);
        assert!(sweep.filter.is_some());
    }

    #[test]
    fn test_duration_validation() {
        assert!(TransitionPlan::new(TransitionMode::StemBlend, 16)
            .validate()
            .is_ok());
        assert!(TransitionPlan::new(TransitionMode::StemBlend, 12)
            .validate()
            .is_err());
        assert!(TransitionPlan::new(TransitionMode::Crossfade, 8)
            .validate()
            .is_ok());
        assert!(TransitionPlan::new(TransitionMode::Crossfade, 32)
            .validate()
            .is_err());
        assert!(TransitionPlan::new(TransitionMode::HardCut, 0)
            .validate()
            .is_ok());
    }

    #[test]
    fn test_phase_cover_validation() {
        let mut plan = TransitionPlan::new(TransitionMode::StemBlend, 8);
        plan.phases = Some(vec![
            PhaseSpec {
                bars: [1, 4],
                a: StemLevels::full(),
                b: StemLevels::silent(),
            },
            PhaseSpec {
                bars: [5, 8],
                a: StemLevels::silent(),
                b: StemLevels::full(),
            },
        ]);
        assert!(plan.validate().is_ok());

        // Gap between phases
        plan.phases = Some(vec![
            PhaseSpec {
                bars: [1, 3],
                a: StemLevels::full(),
                b: StemLevels::silent(),
            },
            PhaseSpec {
                bars: [5, 8],
                a: StemLevels::silent(),
                b: StemLevels::full(),
            },
        ]);
        assert!(plan.validate().is_err());

        // Short cover
        plan.phases = Some(vec![PhaseSpec {
            bars: [1, 6],
            a: StemLevels::full(),
            b: StemLevels::silent(),
        }]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_level_range_validation() {
        let mut plan = TransitionPlan::new(TransitionMode::StemBlend, 8);
        plan.phases = Some(vec![PhaseSpec {
            bars: [1, 8],
            a: StemLevels {
                drums: 1.5, // out of range
                ..StemLevels::full()
            },
            b: StemLevels::silent(),
        }]);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_bass_swap_bar_bounds() {
        let mut plan = TransitionPlan::new(TransitionMode::StemBlend, 16);
        plan.bass_swap_bar = Some(16);
        assert!(plan.validate().is_ok());
        plan.bass_swap_bar = Some(17);
        assert!(plan.validate().is_err());
        plan.bass_swap_bar = Some(0);
        assert!(plan.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let plan = TransitionPlan::new(TransitionMode::StemBlend, 16);
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("\"type\":\"STEM_BLEND\""));
        let back: TransitionPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mode, TransitionMode::StemBlend);
        assert_eq!(back.duration_bars, 16);
        assert!(back.validate().is_ok());
    }
}
