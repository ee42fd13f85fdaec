//! Feature extraction ports and the analyze pipeline
//!
//! BPM, key and energy detection are external collaborators in production
//! (dedicated models); this module defines their ports and ships modest
//! in-crate defaults so the pipeline runs end to end without them. The three
//! extractors are independent for a decoded track and run in parallel.

use rayon::join;
use serde::{Deserialize, Serialize};

use crate::analysis::{
    beats::BeatGrid, features, mix_points, mixability, phrases, structure, vocals, MixPoints,
    TrackAnalysis,
};
use crate::error::{Result, SegueError};

/// BPM estimate with the supporting beat list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BpmEstimate {
    pub bpm: f32,
    pub confidence: f32,
    pub beats: Vec<f32>,
}

/// Key estimate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEstimate {
    pub key: String,
    pub confidence: f32,
}

/// Energy estimate
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EnergyEstimate {
    pub energy: f32,
    pub danceability: f32,
    pub loudness_db: f32,
}

/// Tempo detection port
pub trait BpmDetector: Send + Sync {
    fn detect(&self, samples: &[f32], sample_rate: u32) -> Result<BpmEstimate>;
}

/// Key detection port
pub trait KeyDetector: Send + Sync {
    fn detect(&self, samples: &[f32], sample_rate: u32) -> Result<KeyEstimate>;
}

/// Energy analysis port
pub trait EnergyAnalyzer: Send + Sync {
    fn analyze(&self, samples: &[f32], sample_rate: u32) -> Result<EnergyEstimate>;
}

/// The three extraction ports bundled for the pipeline
pub struct AnalysisPorts {
    pub bpm: Box<dyn BpmDetector>,
    pub key: Box<dyn KeyDetector>,
    pub energy: Box<dyn EnergyAnalyzer>,
}

impl Default for AnalysisPorts {
    fn default() -> Self {
        Self {
            bpm: Box::new(OnsetFluxBpmDetector),
            key: Box::new(ChromaKeyDetector),
            energy: Box::new(RmsEnergyAnalyzer),
        }
    }
}

/// Run the full analysis pipeline on a decoded mono track
///
/// BPM, key and energy run in parallel (they are independent and CPU-bound);
/// structure, phrases, vocal heuristics and mix points follow sequentially
/// since they consume the beat grid.
pub fn analyze_track(
    samples: &[f32],
    sample_rate: u32,
    ports: &AnalysisPorts,
) -> Result<TrackAnalysis> {
    let duration_s = crate::audio::duration_seconds(samples, sample_rate);

    let (bpm_result, (key_result, energy_result)) = join(
        || ports.bpm.detect(samples, sample_rate),
        || {
            join(
                || ports.key.detect(samples, sample_rate),
                || ports.energy.analyze(samples, sample_rate),
            )
        },
    );

    let bpm = bpm_result?;
    let key = key_result.ok();
    let energy = energy_result?;

    let camelot = key
        .as_ref()
        .and_then(|k| k.key.parse::<crate::theory::CamelotKey>().ok())
        .map(|c| c.to_string());

    let frame_features = features::compute(samples, sample_rate);

    // Downstream derivations fall back to heuristic defaults when the grid
    // is underdetermined
    let grid = BeatGrid::new(bpm.beats.clone(), bpm.bpm).ok();

    let (track_structure, phrase_list) = match &grid {
        Some(grid) => {
            let s = structure::detect_structure(&frame_features, grid, duration_s);
            let p = phrases::detect_phrases(&frame_features, grid, duration_s);
            (Some(s), p)
        }
        None => {
            log::warn!("beat grid underdetermined; using 16-bar defaults");
            (None, Vec::new())
        }
    };

    // Heuristic vocal map on the full mix: band-limit to the vocal range
    // first so pads and bass don't read as voice
    let vocal_band =
        crate::effects::filters::apply_bandpass(samples, 200.0, 4000.0, sample_rate);
    let vocal_profile = vocals::detect(&vocal_band, sample_rate);

    let mix_points = match (&track_structure, &grid) {
        (Some(s), Some(_)) => {
            mix_points::derive_mix_points(s, &phrase_list, &vocal_profile, duration_s, bpm.bpm)
        }
        _ => MixPoints::default(),
    };

    // Blendability rating over the vocal map and the structure bounds (or
    // the 16-bar defaults when structure detection came up empty)
    let edge = crate::audio::bar_duration(bpm.bpm) * crate::analysis::DEFAULT_EDGE_BARS;
    let intro_end_s = track_structure
        .as_ref()
        .map(|s| s.intro_end_s)
        .unwrap_or_else(|| edge.min(duration_s * 0.25));
    let outro_start_s = track_structure
        .as_ref()
        .map(|s| s.outro_start_s)
        .unwrap_or_else(|| (duration_s - edge).max(duration_s * 0.75));
    let track_mixability =
        mixability::analyze_mixability(&vocal_profile, intro_end_s, outro_start_s, duration_s);

    Ok(TrackAnalysis {
        duration_seconds: duration_s,
        bpm: bpm.bpm,
        bpm_confidence: bpm.confidence,
        beats: bpm.beats,
        key: key.as_ref().map(|k| k.key.clone()),
        camelot,
        energy: energy.energy,
        danceability: energy.danceability,
        loudness: energy.loudness_db,
        intro_end_ms: track_structure
            .as_ref()
            .map(|s| (s.intro_end_s * 1000.0) as u64),
        outro_start_ms: track_structure
            .as_ref()
            .map(|s| (s.outro_start_s * 1000.0) as u64),
        has_vocals: vocal_profile.has_vocals,
        vocal_sections: vocal_profile.sections,
        phrases: phrase_list,
        mix_points,
        structure: track_structure,
        mixability: Some(track_mixability),
    })
}

/// Default tempo detector: autocorrelation of the onset flux envelope
///
/// A stand-in for a dedicated model; clamps to the 60-200 BPM range and
/// emits a regular beat list phased to the strongest onsets.
pub struct OnsetFluxBpmDetector;

impl BpmDetector for OnsetFluxBpmDetector {
    fn detect(&self, samples: &[f32], sample_rate: u32) -> Result<BpmEstimate> {
        let frame_features = features::compute(samples, sample_rate);
        let flux = &frame_features.flux;
        if flux.len() < 64 {
            return Err(SegueError::AnalysisUnderdetermined(
                "track too short for tempo detection".to_string(),
            ));
        }

        let frames_per_second = sample_rate as f32 / features::HOP_LEN as f32;
        let lag_for = |bpm: f32| (frames_per_second * 60.0 / bpm).round() as usize;

        // Autocorrelate over the 60-200 BPM lag range
        let (min_lag, max_lag) = (lag_for(200.0).max(1), lag_for(60.0).min(flux.len() / 2));
        if min_lag >= max_lag {
            return Err(SegueError::AnalysisUnderdetermined(
                "tempo lag range collapsed".to_string(),
            ));
        }

        let mean = flux.iter().sum::<f32>() / flux.len() as f32;
        let centered: Vec<f32> = flux.iter().map(|&f| f - mean).collect();

        let mut best_lag = min_lag;
        let mut best_corr = f32::MIN;
        let mut total_corr = 0.0f32;
        for lag in min_lag..=max_lag {
            let corr: f32 = centered[lag..]
                .iter()
                .zip(centered.iter())
                .map(|(a, b)| a * b)
                .sum();
            total_corr += corr.max(0.0);
            if corr > best_corr {
                best_corr = corr;
                best_lag = lag;
            }
        }

        let bpm = (frames_per_second * 60.0 / best_lag as f32).clamp(60.0, 200.0);
        let confidence = if total_corr > 0.0 {
            (best_corr.max(0.0) / total_corr * (max_lag - min_lag) as f32 / 4.0).clamp(0.0, 1.0)
        } else {
            0.0
        };

        // Phase the beat grid to the onsets: pick the offset within one beat
        // that lines up with the most flux energy
        let beat_frames = best_lag;
        let mut best_offset = 0;
        let mut best_energy = f32::MIN;
        for offset in 0..beat_frames {
            let energy: f32 = (offset..flux.len()).step_by(beat_frames).map(|i| flux[i]).sum();
            if energy > best_energy {
                best_energy = energy;
                best_offset = offset;
            }
        }

        let first_beat = best_offset as f32 / frames_per_second;
        let beat_s = 60.0 / bpm;
        let duration = crate::audio::duration_seconds(samples, sample_rate);
        let count = ((duration - first_beat) / beat_s).floor().max(0.0) as usize;
        let beats: Vec<f32> = (0..count).map(|i| first_beat + i as f32 * beat_s).collect();

        Ok(BpmEstimate {
            bpm,
            confidence,
            beats,
        })
    }
}

/// Krumhansl-Schmuckler key profiles
const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];
const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];
const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "Eb", "E", "F", "F#", "G", "Ab", "A", "Bb", "B",
];

/// Default key detector: chroma accumulation matched against the
/// Krumhansl-Schmuckler profiles
pub struct ChromaKeyDetector;

impl KeyDetector for ChromaKeyDetector {
    fn detect(&self, samples: &[f32], sample_rate: u32) -> Result<KeyEstimate> {
        use rustfft::{num_complex::Complex, FftPlanner};

        const FRAME: usize = 4096;
        if samples.len() < FRAME * 4 {
            return Err(SegueError::AnalysisUnderdetermined(
                "track too short for key detection".to_string(),
            ));
        }

        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(FRAME);
        let mut chroma = [0.0f32; 12];
        let mut buf = vec![Complex::new(0.0f32, 0.0f32); FRAME];

        // Sparse hop: key is a global property, every 8th frame is plenty
        let hop = FRAME * 8;
        let mut pos = 0;
        while pos + FRAME <= samples.len() {
            for (i, &s) in samples[pos..pos + FRAME].iter().enumerate() {
                buf[i] = Complex::new(s, 0.0);
            }
            fft.process(&mut buf);

            for (bin, c) in buf[1..FRAME / 2].iter().enumerate() {
                let freq = (bin + 1) as f32 * sample_rate as f32 / FRAME as f32;
                if !(55.0..=2000.0).contains(&freq) {
                    continue;
                }
                let midi = 69.0 + 12.0 * (freq / 440.0).log2();
                let class = (midi.round() as i32).rem_euclid(12) as usize;
                chroma[class] += c.norm();
            }
            pos += hop;
        }

        let total: f32 = chroma.iter().sum();
        if total < 1e-6 {
            return Err(SegueError::AnalysisUnderdetermined(
                "no tonal content".to_string(),
            ));
        }

        // Correlate against all 24 rotated profiles
        let mut best: (f32, usize, bool) = (f32::MIN, 0, true);
        let mut second = f32::MIN;
        for root in 0..12 {
            for (is_major, profile) in [(true, &MAJOR_PROFILE), (false, &MINOR_PROFILE)] {
                let score: f32 = (0..12)
                    .map(|i| chroma[(root + i) % 12] * profile[i])
                    .sum();
                if score > best.0 {
                    second = best.0;
                    best = (score, root, is_major);
                } else if score > second {
                    second = score;
                }
            }
        }

        let (score, root, is_major) = best;
        let name = if is_major {
            PITCH_NAMES[root].to_string()
        } else {
            format!("{}m", PITCH_NAMES[root])
        };
        let confidence = if score > 0.0 {
            ((score - second.max(0.0)) / score).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(KeyEstimate {
            key: name,
            confidence,
        })
    }
}

/// Default energy analyzer: loudness from peak, energy from windowed RMS
pub struct RmsEnergyAnalyzer;

impl EnergyAnalyzer for RmsEnergyAnalyzer {
    fn analyze(&self, samples: &[f32], sample_rate: u32) -> Result<EnergyEstimate> {
        if samples.is_empty() {
            return Err(SegueError::AnalysisUnderdetermined("empty audio".to_string()));
        }
        let window = (sample_rate as usize) / 2; // 500ms windows
        let mut rms = features::windowed_rms(samples, window);
        rms.sort_by(|a, b| a.partial_cmp(b).unwrap());

        // Use the loud half of the track; quiet intros shouldn't drag the
        // rating down
        let upper = &rms[rms.len() / 2..];
        let loud_rms = upper.iter().sum::<f32>() / upper.len().max(1) as f32;

        // Sine at full scale has RMS ~0.707; treat 0.35 as the hot ceiling
        let energy = (loud_rms / 0.35).clamp(0.0, 1.0);
        let loudness_db = crate::audio::amplitude_to_db(crate::audio::peak(samples)).max(-60.0);

        // Danceability: a steady pumping level is danceable, a wildly
        // swinging one is not. Map the coefficient of variation down.
        let mean = rms.iter().sum::<f32>() / rms.len().max(1) as f32;
        let danceability = if mean > 1e-4 {
            let variance =
                rms.iter().map(|r| (r - mean).powi(2)).sum::<f32>() / rms.len() as f32;
            (1.0 - (variance.sqrt() / mean).clamp(0.0, 1.0)) * energy.sqrt()
        } else {
            0.0
        };

        Ok(EnergyEstimate {
            energy,
            danceability: danceability.clamp(0.0, 1.0),
            loudness_db,
        })
    }
}
