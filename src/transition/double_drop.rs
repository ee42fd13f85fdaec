//! Double drop: two drops at once
//!
//! The riskiest move in the book — both tracks' drops play simultaneously
//! for maximum intensity. Conditions must be PERFECT: near-identical BPM
//! (under 1% apart), near-perfect harmony (score 90+), and both tracks
//! running hot. Drums can stack (adds power), melodic content is shared at
//! reduced levels, and bass comes from exactly one track at a time — the
//! two-beat rule applies here just as hard as in a blend.

use serde::{Deserialize, Serialize};

use crate::analysis::TrackAnalysis;
use crate::stems::StemSet;
use crate::theory::harmonic_score_str;

/// Maximum BPM spread for a double drop, percent of the mean
pub const MAX_BPM_DIFF_PERCENT: f32 = 1.0;

/// Minimum harmonic score for a double drop
pub const MIN_HARMONIC_SCORE: u8 = 90;

/// Energy below which a track is too tame to double-drop
const MIN_DROP_ENERGY: f32 = 0.7;

/// How risky an approved double drop still is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Medium,
    High,
}

/// Result of a double-drop compatibility check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoubleDropCheck {
    pub compatible: bool,
    pub risk: RiskLevel,
    pub harmonic_score: u8,
    pub bpm_delta_percent: f32,
    pub warnings: Vec<String>,
}

/// Validate whether two tracks can double-drop at all
///
/// Only approves the pair when the BPM spread is under 1% and the harmonic
/// score is 90 or better; even then, anything short of a perfect key match
/// stays high-risk.
pub fn validate_double_drop(track_a: &TrackAnalysis, track_b: &TrackAnalysis) -> DoubleDropCheck {
    let mut warnings = Vec::new();

    let mean_bpm = (track_a.bpm + track_b.bpm) / 2.0;
    let bpm_delta_percent = (track_a.bpm - track_b.bpm).abs() / mean_bpm * 100.0;

    let (harmonic, _) = harmonic_score_str(
        track_a
            .camelot
            .as_deref()
            .or(track_a.key.as_deref())
            .unwrap_or(""),
        track_b
            .camelot
            .as_deref()
            .or(track_b.key.as_deref())
            .unwrap_or(""),
    );

    if bpm_delta_percent > MAX_BPM_DIFF_PERCENT {
        warnings.push(format!(
            "BPM difference too large: {:.1}%",
            bpm_delta_percent
        ));
        return DoubleDropCheck {
            compatible: false,
            risk: RiskLevel::High,
            harmonic_score: harmonic,
            bpm_delta_percent,
            warnings,
        };
    }

    if harmonic < MIN_HARMONIC_SCORE {
        warnings.push(format!("Harmonic score too low: {}", harmonic));
        return DoubleDropCheck {
            compatible: false,
            risk: RiskLevel::High,
            harmonic_score: harmonic,
            bpm_delta_percent,
            warnings,
        };
    }

    if track_a.energy < MIN_DROP_ENERGY || track_b.energy < MIN_DROP_ENERGY {
        warnings.push("One or both tracks have low energy".to_string());
    }

    DoubleDropCheck {
        compatible: true,
        risk: if harmonic == 100 {
            RiskLevel::Medium
        } else {
            RiskLevel::High
        },
        harmonic_score: harmonic,
        bpm_delta_percent,
        warnings,
    }
}

/// Which track owns the bass during the double drop
///
/// Never both at once; alternating blocks are the adventurous option and
/// still respect the two-beat rule (the hand-over is instantaneous).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BassAssignment {
    TrackA,
    TrackB,
    Alternating { swap_every_bars: u32 },
}

/// Per-stem levels for the double drop, (track A, track B)
#[derive(Debug, Clone, Copy)]
pub struct StemMix {
    pub drums: (f32, f32),
    pub vocals: (f32, f32),
    pub other: (f32, f32),
    pub bass: BassAssignment,
}

impl Default for StemMix {
    /// Combined drums at 60%, shared melodic content at half, A's bass
    fn default() -> Self {
        Self {
            drums: (0.6, 0.6),
            vocals: (0.5, 0.5),
            other: (0.5, 0.5),
            bass: BassAssignment::TrackA,
        }
    }
}

impl StemMix {
    /// The conservative mix: everything pulled back, A's bass only
    pub fn safe() -> Self {
        Self {
            drums: (0.5, 0.5),
            vocals: (0.3, 0.3),
            other: (0.4, 0.4),
            bass: BassAssignment::TrackA,
        }
    }

    /// Alternate the bass between tracks every few bars
    pub fn alternating(swap_every_bars: u32) -> Self {
        Self {
            bass: BassAssignment::Alternating {
                swap_every_bars: swap_every_bars.max(1),
            },
            ..Self::safe()
        }
    }
}

/// Which track carries on after the double drop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTrack {
    A,
    B,
}

/// Render the double-drop section itself
///
/// Both stem sets are consumed from their respective drop starts for
/// `duration_bars`. Output is normalized down on clipping.
pub fn create_double_drop(
    stems_a: &StemSet,
    stems_b: &StemSet,
    drop_start_a_s: f32,
    drop_start_b_s: f32,
    duration_bars: u32,
    bpm: f32,
    mix: &StemMix,
    sample_rate: u32,
) -> Vec<f32> {
    let bar_samples = crate::audio::samples_per_bar(bpm, sample_rate);
    let drop_samples = bar_samples * duration_bars as usize;

    let offset_a = (drop_start_a_s * sample_rate as f32) as usize;
    let offset_b = (drop_start_b_s * sample_rate as f32) as usize;

    let mut output = vec![0.0f32; drop_samples];

    let mut add = |stem: &[f32], offset: usize, level: f32| {
        if level <= 0.0 {
            return;
        }
        let available = stem.len().saturating_sub(offset);
        let span = drop_samples.min(available);
        for i in 0..span {
            output[i] += stem[offset + i] * level;
        }
    };

    add(&stems_a.drums, offset_a, mix.drums.0);
    add(&stems_b.drums, offset_b, mix.drums.1);
    add(&stems_a.vocals, offset_a, mix.vocals.0);
    add(&stems_b.vocals, offset_b, mix.vocals.1);
    add(&stems_a.other, offset_a, mix.other.0);
    add(&stems_b.other, offset_b, mix.other.1);

    // Bass: exactly one track at any moment
    match mix.bass {
        BassAssignment::TrackA => add(&stems_a.bass, offset_a, 1.0),
        BassAssignment::TrackB => add(&stems_b.bass, offset_b, 1.0),
        BassAssignment::Alternating { swap_every_bars } => {
            let block_samples = bar_samples * swap_every_bars as usize;
            for i in 0..drop_samples {
                let block = i / block_samples.max(1);
                let (stem, offset) = if block % 2 == 0 {
                    (&stems_a.bass, offset_a)
                } else {
                    (&stems_b.bass, offset_b)
                };
                if offset + i < stem.len() {
                    output[i] += stem[offset + i];
                }
            }
        }
    }

    // Two full drops stack hot; pull back rather than clip
    let peak = crate::audio::peak(&output);
    if peak > 1.0 {
        let gain = 0.95 / peak;
        for s in output.iter_mut() {
            *s *= gain;
        }
        log::debug!("double drop normalized by {:.2}", gain);
    }

    output
}

/// Render a double drop plus a clean exit into one of the tracks
///
/// After `double_drop_bars` of combined mayhem the mix crossfades
/// (equal-power, over `exit_bars`) into the chosen track's continuation.
#[allow(clippy::too_many_arguments)]
pub fn create_double_drop_with_exit(
    stems_a: &StemSet,
    stems_b: &StemSet,
    audio_a: &[f32],
    audio_b: &[f32],
    drop_start_a_s: f32,
    drop_start_b_s: f32,
    double_drop_bars: u32,
    exit_to: ExitTrack,
    exit_bars: u32,
    bpm: f32,
    sample_rate: u32,
) -> Vec<f32> {
    let double_drop = create_double_drop(
        stems_a,
        stems_b,
        drop_start_a_s,
        drop_start_b_s,
        double_drop_bars,
        bpm,
        &StemMix::default(),
        sample_rate,
    );

    let (audio, drop_start_s) = match exit_to {
        ExitTrack::A => (audio_a, drop_start_a_s),
        ExitTrack::B => (audio_b, drop_start_b_s),
    };
    let continuation_start =
        (drop_start_s * sample_rate as f32) as usize + double_drop.len();
    let continuation: &[f32] = if continuation_start < audio.len() {
        &audio[continuation_start..]
    } else {
        &[]
    };

    let exit_samples = crate::audio::samples_per_bar(bpm, sample_rate) * exit_bars as usize;

    if double_drop.len() >= exit_samples && continuation.len() >= exit_samples {
        let keep = double_drop.len() - exit_samples;
        let mut out = Vec::with_capacity(double_drop.len() + continuation.len() - exit_samples);
        out.extend_from_slice(&double_drop[..keep]);
        for i in 0..exit_samples {
            let angle = i as f32 / exit_samples as f32 * std::f32::consts::FRAC_PI_2;
            out.push(double_drop[keep + i] * angle.cos() + continuation[i] * angle.sin());
        }
        out.extend_from_slice(&continuation[exit_samples..]);
        out
    } else {
        crate::audio::concat(&[&double_drop, continuation])
    }
}
