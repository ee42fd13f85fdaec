//! Acapella mixing: a vocal from one track over the instrumental of another
//!
//! The live-mashup move. The vocal stem is tempo-matched to the target
//! instrumental and overlaid at a level that sits in the mix without
//! drowning it. Key alignment matters: [`semitone_shift`] computes the
//! pitch correction a shift engine would need, and overlays carrying a
//! nonzero shift are the caller's responsibility to pitch-correct first —
//! a blend between incompatible keys should not happen at all.

use crate::error::Result;
use crate::stretch::{stretch_to_bpm, TimeStretcher};
use crate::theory::{CamelotKey, Mode};

/// Semitones to shift a vocal in `from` so it sits in `to`
///
/// One step on the wheel is a perfect fifth (7 semitones mod 12); the
/// relative major sits three semitones above its minor. The result is folded
/// into [-6, 6] so the shorter direction wins.
pub fn semitone_shift(from: &CamelotKey, to: &CamelotKey) -> i32 {
    let mut position_diff = to.number() as i32 - from.number() as i32;
    if position_diff > 6 {
        position_diff -= 12;
    } else if position_diff < -6 {
        position_diff += 12;
    }

    let mode_shift = match (from.mode(), to.mode()) {
        (Mode::Minor, Mode::Major) => 3,
        (Mode::Major, Mode::Minor) => -3,
        _ => 0,
    };

    let mut semitones = (position_diff * 7 + mode_shift).rem_euclid(12);
    if semitones > 6 {
        semitones -= 12;
    }
    semitones
}

/// Overlay levels for an acapella mix
#[derive(Debug, Clone, Copy)]
pub struct AcapellaLevels {
    pub vocal: f32,
    pub instrumental: f32,
}

impl Default for AcapellaLevels {
    fn default() -> Self {
        Self {
            vocal: 0.8,
            instrumental: 1.0,
        }
    }
}

/// Mix a vocal stem over an instrumental
///
/// The vocal is tempo-matched to the instrumental's BPM (within the ±8%
/// stretch bound) and summed at the given levels; the instrumental continues
/// alone once the vocal runs out. The result is scaled down if the sum
/// clips.
pub fn create_acapella_mix(
    stretcher: &dyn TimeStretcher,
    vocal_stem: &[f32],
    instrumental: &[f32],
    vocal_bpm: f32,
    instrumental_bpm: f32,
    levels: AcapellaLevels,
    sample_rate: u32,
) -> Result<Vec<f32>> {
    let vocal = if (vocal_bpm - instrumental_bpm).abs() > 0.5 {
        let (stretched, _, _) = stretch_to_bpm(
            stretcher,
            vocal_stem,
            sample_rate,
            vocal_bpm,
            instrumental_bpm,
        )?;
        stretched
    } else {
        vocal_stem.to_vec()
    };

    let overlay_len = vocal.len().min(instrumental.len());
    let mut mix = Vec::with_capacity(instrumental.len());
    for i in 0..overlay_len {
        mix.push(vocal[i] * levels.vocal + instrumental[i] * levels.instrumental);
    }
    mix.extend(
        instrumental[overlay_len..]
            .iter()
            .map(|&s| s * levels.instrumental),
    );

    // Scale down on clipping; never boost
    let peak = crate::audio::peak(&mix);
    if peak > 1.0 {
        let gain = 0.95 / peak;
        for s in mix.iter_mut() {
            *s *= gain;
        }
    }

    Ok(mix)
}
