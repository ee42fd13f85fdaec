//! Set-level energy control
//!
//! A good set is not a constant climb; it is a journey with intentional
//! peaks and valleys. The set is divided into four phases by position, each
//! with its own transition-length range, preferred modes and energy band:
//!
//! | Phase    | Progress    | Energy  | Transition bars |
//! |----------|-------------|---------|-----------------|
//! | Warmup   | [0, 0.25)   | 0.3-0.5 | 32-64           |
//! | Build    | [0.25, 0.5) | 0.5-0.7 | 16-32           |
//! | Peak     | [0.5, 0.75) | 0.8-1.0 | 8-16            |
//! | Cooldown | [0.75, 1]   | 0.4-0.6 | 32-64           |
//!
//! The planner consults these to scale blend durations; the sequence
//! validator flags orderings that fight the arc.

use serde::{Deserialize, Serialize};

use crate::transition::plan::TransitionMode;

/// Phase of the set by position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetPhase {
    Warmup,
    Build,
    Peak,
    Cooldown,
}

impl SetPhase {
    /// Phase for a progress fraction in [0, 1]
    pub fn from_progress(progress: f32) -> SetPhase {
        if progress < 0.25 {
            SetPhase::Warmup
        } else if progress < 0.5 {
            SetPhase::Build
        } else if progress < 0.75 {
            SetPhase::Peak
        } else {
            SetPhase::Cooldown
        }
    }

    /// Phase for a track position within a set
    pub fn from_position(track_index: usize, total_tracks: usize) -> SetPhase {
        if total_tracks == 0 {
            return SetPhase::Build;
        }
        Self::from_progress(track_index as f32 / total_tracks as f32)
    }
}

/// Per-phase planning configuration
#[derive(Debug, Clone)]
pub struct PhaseConfig {
    pub phase: SetPhase,
    /// Target energy band in [0, 1]
    pub energy_range: (f32, f32),
    /// Transition length range in bars
    pub transition_bars: (u32, u32),
    /// Scale applied to the planner's base stem-blend duration
    pub duration_factor: f32,
    pub preferred_modes: &'static [TransitionMode],
}

/// Configuration for a phase
pub fn phase_config(phase: SetPhase) -> PhaseConfig {
    match phase {
        SetPhase::Warmup => PhaseConfig {
            phase,
            energy_range: (0.3, 0.5),
            transition_bars: (32, 64),
            duration_factor: 2.0,
            preferred_modes: &[TransitionMode::StemBlend, TransitionMode::Crossfade],
        },
        SetPhase::Build => PhaseConfig {
            phase,
            energy_range: (0.5, 0.7),
            transition_bars: (16, 32),
            duration_factor: 1.0,
            preferred_modes: &[
                TransitionMode::StemBlend,
                TransitionMode::Crossfade,
                TransitionMode::FilterSweep,
            ],
        },
        SetPhase::Peak => PhaseConfig {
            phase,
            energy_range: (0.8, 1.0),
            transition_bars: (8, 16),
            duration_factor: 0.5,
            preferred_modes: &[TransitionMode::StemBlend, TransitionMode::HardCut],
        },
        SetPhase::Cooldown => PhaseConfig {
            phase,
            energy_range: (0.4, 0.6),
            transition_bars: (32, 64),
            duration_factor: 2.0,
            preferred_modes: &[
                TransitionMode::StemBlend,
                TransitionMode::Crossfade,
                TransitionMode::EchoOut,
            ],
        },
    }
}

/// Issue kinds reported by the sequence validator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueKind {
    EnergyJumpTooLarge,
    LowEnergyTrackDuringPeak,
    EnergyDropDuringBuild,
    EnergyIncreaseDuringCooldown,
    TooManyConsecutiveHigh,
}

/// One issue found in a proposed sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceIssue {
    pub index: usize,
    pub kind: IssueKind,
    pub message: String,
}

const MAX_ENERGY_JUMP: f32 = 0.3;
const HIGH_ENERGY: f32 = 0.7;
const MAX_CONSECUTIVE_HIGH: usize = 6;

/// Validate a proposed track ordering against the set arc
///
/// `energies` are the per-track energy ratings in play order.
pub fn validate_sequence(energies: &[f32]) -> Vec<SequenceIssue> {
    let mut issues = Vec::new();
    if energies.len() < 2 {
        return issues;
    }

    let total = energies.len();
    let mut consecutive_high = 0usize;

    for (i, &energy) in energies.iter().enumerate() {
        let phase = SetPhase::from_position(i, total);

        if energy >= HIGH_ENERGY {
            consecutive_high += 1;
            if consecutive_high > MAX_CONSECUTIVE_HIGH {
                issues.push(SequenceIssue {
                    index: i,
                    kind: IssueKind::TooManyConsecutiveHigh,
                    message: format!(
                        "{} consecutive high-energy tracks without a breather",
                        consecutive_high
                    ),
                });
            }
        } else {
            consecutive_high = 0;
        }

        if phase == SetPhase::Peak && energy < HIGH_ENERGY {
            issues.push(SequenceIssue {
                index: i,
                kind: IssueKind::LowEnergyTrackDuringPeak,
                message: format!("energy {:.2} during the peak phase", energy),
            });
        }

        if i > 0 {
            let delta = energy - energies[i - 1];
            if delta.abs() > MAX_ENERGY_JUMP {
                issues.push(SequenceIssue {
                    index: i,
                    kind: IssueKind::EnergyJumpTooLarge,
                    message: format!(
                        "energy jump of {:.0}% ({:.2} to {:.2})",
                        delta.abs() * 100.0,
                        energies[i - 1],
                        energy
                    ),
                });
            }
            if phase == SetPhase::Build && delta < -0.2 {
                issues.push(SequenceIssue {
                    index: i,
                    kind: IssueKind::EnergyDropDuringBuild,
                    message: "energy falling while the set should be building".to_string(),
                });
            }
            if phase == SetPhase::Cooldown && delta > 0.2 {
                issues.push(SequenceIssue {
                    index: i,
                    kind: IssueKind::EnergyIncreaseDuringCooldown,
                    message: "energy rising during the cooldown".to_string(),
                });
            }
        }
    }

    issues
}

/// Target energy flow for reordering suggestions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnergyFlow {
    /// Alternate high and breather tracks at a 5:1 ratio
    Serpentine,
    Ascending,
    Descending,
    /// Climb to a mid-set peak, then come back down
    PeakMiddle,
}

/// Suggest a track ordering by energy; returns indices into the input
pub fn suggest_order(energies: &[f32], flow: EnergyFlow) -> Vec<usize> {
    let mut indexed: Vec<(usize, f32)> = energies.iter().copied().enumerate().collect();

    match flow {
        EnergyFlow::Ascending => {
            indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
            indexed.into_iter().map(|(i, _)| i).collect()
        }
        EnergyFlow::Descending => {
            indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
            indexed.into_iter().map(|(i, _)| i).collect()
        }
        EnergyFlow::PeakMiddle => {
            indexed.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());
            // Evens climb up the front, odds come back down the tail
            let mut front = Vec::new();
            let mut back = Vec::new();
            for (n, (i, _)) in indexed.into_iter().enumerate() {
                if n % 2 == 0 {
                    front.push(i);
                } else {
                    back.push(i);
                }
            }
            back.reverse();
            front.extend(back);
            front
        }
        EnergyFlow::Serpentine => {
            let mut high: Vec<(usize, f32)> = indexed
                .iter()
                .copied()
                .filter(|&(_, e)| e >= HIGH_ENERGY)
                .collect();
            let mut breather: Vec<(usize, f32)> = indexed
                .iter()
                .copied()
                .filter(|&(_, e)| e < HIGH_ENERGY)
                .collect();
            if high.is_empty() || breather.is_empty() {
                return (0..energies.len()).collect();
            }
            high.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
            breather.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap());

            let mut order = Vec::with_capacity(energies.len());
            let (mut hi, mut bi, mut run) = (0usize, 0usize, 0usize);
            while hi < high.len() || bi < breather.len() {
                if run < 5 && hi < high.len() {
                    order.push(high[hi].0);
                    hi += 1;
                    run += 1;
                } else if bi < breather.len() {
                    order.push(breather[bi].0);
                    bi += 1;
                    run = 0;
                } else {
                    order.push(high[hi].0);
                    hi += 1;
                }
            }
            order
        }
    }
}
