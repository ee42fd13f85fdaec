//! The transition renderer
//!
//! Takes two tracks, their analyses and a plan, and produces the rendered
//! transition audio plus the cut points the assembler needs. Each mode is a
//! pure function over the prologue-extracted segments; failures downgrade
//! along the ladder STEM_BLEND -> CROSSFADE -> HARD_CUT as an explicit
//! `Result` chain, never by guessing.

use std::sync::Arc;

use crate::analysis::{vocals, BeatGrid, TrackAnalysis};
use crate::audio;
use crate::config::PROCESSING_SAMPLE_RATE;
use crate::effects::{self, filters::FilterKind, filters::SweepCurve};
use crate::error::{Result, SegueError};
use crate::stems::StemSeparator;
use crate::stretch::{self, PhaseVocoder, TimeStretcher};
use crate::transition::bass_swap;
use crate::transition::curves;
use crate::transition::plan::{
    TailEffect, TailKind, TransitionMode, TransitionPlan, WarningTag,
};
use crate::transition::vocal_clash::{self, ClashResolution};

/// Output ceiling applied to every render (-1 dBFS)
const LIMITER_DB: f32 = -1.0;

/// Context taken on each side of a hard cut, seconds
const HARD_CUT_CONTEXT_S: f32 = 4.0;

/// Safety fade at hard-cut boundaries, seconds
const SAFETY_FADE_S: f32 = 0.002;

/// Overlap of a tail with the incoming track, seconds
const TAIL_OVERLAP_S: f32 = 0.5;

/// Head-room factor when extracting B before stretching
const STRETCH_HEADROOM: f32 = 1.10;

/// A rendered transition plus its timing contract
#[derive(Debug, Clone)]
pub struct RenderedTransition {
    /// Mono samples at the processing rate
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub duration_ms: u64,
    /// Where the solo of A must stop, in A's original timeline (= the cue
    /// consumed by this transition)
    pub track_a_play_until_ms: u64,
    /// Where the solo of B must resume, in B's original timeline (= the cue
    /// plus the audio this transition consumed)
    pub track_b_start_from_ms: u64,
    /// Mode actually realized (after any downgrades)
    pub mode: TransitionMode,
    pub applied_stretch_ratio: f32,
    pub bass_swap_applied: bool,
    pub warnings: Vec<WarningTag>,
}

impl RenderedTransition {
    /// Interleaved stereo view for export (mono duplicated)
    pub fn stereo_samples(&self) -> Vec<f32> {
        audio::duplicate_to_stereo(&self.samples)
    }
}

/// The renderer: a stretcher plus a separator behind their ports
pub struct TransitionRenderer {
    stretcher: Box<dyn TimeStretcher>,
    separator: Arc<dyn StemSeparator>,
}

impl TransitionRenderer {
    pub fn new(separator: Arc<dyn StemSeparator>) -> Self {
        Self {
            stretcher: Box::new(PhaseVocoder::default()),
            separator,
        }
    }

    /// Renderer wired to the process-wide separator backend
    pub fn with_defaults() -> Self {
        Self::new(crate::stems::global_separator())
    }

    pub fn with_stretcher(mut self, stretcher: Box<dyn TimeStretcher>) -> Self {
        self.stretcher = stretcher;
        self
    }

    /// Render the transition between two tracks
    ///
    /// `audio_a`/`audio_b` are mono buffers at any sample rate; both are
    /// brought to 44.1 kHz before processing.
    pub fn render(
        &self,
        audio_a: &[f32],
        sr_a: u32,
        audio_b: &[f32],
        sr_b: u32,
        analysis_a: &TrackAnalysis,
        analysis_b: &TrackAnalysis,
        plan: &TransitionPlan,
    ) -> Result<RenderedTransition> {
        plan.validate()?;

        let sr = PROCESSING_SAMPLE_RATE;
        let a = audio::to_processing_rate(audio_a, sr_a)?;
        let b = audio::to_processing_rate(audio_b, sr_b)?;

        if plan.mode == TransitionMode::HardCut {
            return self.render_hard_cut(&a, &b, analysis_a, analysis_b, plan, Vec::new());
        }

        let mut warnings: Vec<WarningTag> = plan.warnings.clone();

        let bpm = analysis_a.bpm;
        let grid_a = grid_or_fallback(analysis_a);
        let grid_b = grid_or_fallback(analysis_b);

        let mut duration_bars = plan.duration_bars;
        let mut duration_samples = exact_bar_samples(duration_bars, bpm, sr);

        // Cue on A: nearest downbeat at or before the anchor, then walk back
        // four bars at a time until the transition fits
        let anchor = plan.start_time_in_a.unwrap_or(analysis_a.outro_start_s());
        let mut cue_a_s = grid_a.downbeat_at_or_before(anchor);
        loop {
            let cue_sample = (cue_a_s as f64 * sr as f64) as usize;
            if cue_sample + duration_samples <= a.len() || cue_a_s <= 0.0 {
                break;
            }
            let stepped = cue_a_s - grid_a.bar_duration() * 4.0;
            if stepped <= 0.0 {
                cue_a_s = 0.0;
            } else {
                let snapped = grid_a.downbeat_at_or_before(stepped);
                // Guard against a degenerate grid pinning us in place
                if (snapped - cue_a_s).abs() < 1e-6 {
                    cue_a_s = 0.0;
                } else {
                    cue_a_s = snapped;
                }
            }
        }
        let cue_a = (cue_a_s as f64 * sr as f64) as usize;

        // The track itself may be shorter than the transition
        if cue_a + duration_samples > a.len() {
            let available_bars =
                ((a.len() - cue_a) as f64 / exact_bar_samples(1, bpm, sr) as f64) as u32;
            let reduced = available_bars.max(1).min(duration_bars);
            if reduced < duration_bars {
                log::warn!(
                    "transition shortened to {} bars: track A runs out",
                    reduced
                );
                warnings.push(WarningTag::TransitionShortened);
                duration_bars = reduced;
                duration_samples = exact_bar_samples(duration_bars, bpm, sr);
            }
        }
        let segment_a = a[cue_a..(cue_a + duration_samples).min(a.len())].to_vec();

        // Cue on B: first downbeat at or after the planned entry
        let (_, entry_beat) = grid_b.nearest_beat(plan.start_from_b, crate::analysis::Direction::After);
        let entry_idx = grid_b.next_downbeat_index(entry_beat);
        let cue_b_s = grid_b.beats()[entry_idx];
        let cue_b = (cue_b_s as f64 * sr as f64) as usize;

        // Extract with stretch head-room, then bring B onto A's grid
        let b_take = ((duration_samples as f32 * STRETCH_HEADROOM) as usize)
            .min(b.len().saturating_sub(cue_b));
        if b_take == 0 {
            return Err(SegueError::AnalysisUnderdetermined(
                "track B has no audio at the planned entry".to_string(),
            ));
        }
        let raw_b = &b[cue_b..cue_b + b_take];

        let stretch_plan = stretch::calculate_stretch_ratio(analysis_b.bpm, bpm);
        if !stretch_plan.within_limits {
            warnings.push(WarningTag::StretchClamped);
        }
        let (segment_b_full, _actual_bpm, ratio) =
            stretch::stretch_to_bpm(self.stretcher.as_ref(), raw_b, sr, analysis_b.bpm, bpm)?;

        // Common length, snapped down to whole bars when B runs short
        let min_len = segment_a.len().min(segment_b_full.len());
        if min_len < duration_samples {
            let bar = exact_bar_samples(1, bpm, sr);
            let fit_bars = ((min_len / bar) as u32).max(1).min(duration_bars);
            if fit_bars < duration_bars {
                log::warn!("transition shortened to {} bars: track B runs out", fit_bars);
                warnings.push(WarningTag::TransitionShortened);
                duration_bars = fit_bars;
            }
            duration_samples = exact_bar_samples(duration_bars, bpm, sr).min(min_len);
        }
        let mut segment_a = audio::fit_length(&segment_a, duration_samples);
        let mut segment_b = audio::fit_length(&segment_b_full, duration_samples);

        let realized = match plan.mode {
            TransitionMode::StemBlend => {
                match self.render_stem_blend(
                    &mut segment_a,
                    &mut segment_b,
                    bpm,
                    duration_bars,
                    plan,
                    &mut warnings,
                ) {
                    Ok(outcome) => {
                        duration_bars = outcome.duration_bars;
                        duration_samples = outcome.samples.len();
                        Realized {
                            samples: outcome.samples,
                            mode: TransitionMode::StemBlend,
                            bass_swap_applied: true,
                        }
                    }
                    Err(e) if clash_like(&e) => {
                        log::warn!("stem blend failed ({}); downgrading to hard cut", e);
                        warnings.push(WarningTag::DowngradedToHardCut);
                        let mut result = self.render_hard_cut(
                            &a,
                            &b,
                            analysis_a,
                            analysis_b,
                            plan,
                            warnings,
                        )?;
                        result.applied_stretch_ratio = 1.0;
                        return Ok(result);
                    }
                    Err(e) if e.is_recoverable() => {
                        log::warn!("stem blend failed ({}); downgrading to crossfade", e);
                        if matches!(e, SegueError::SeparationUnavailable(_)) {
                            warnings.push(WarningTag::SeparationUnavailable);
                        }
                        warnings.push(WarningTag::DowngradedToCrossfade);
                        Realized {
                            samples: equal_power_crossfade(&segment_a, &segment_b),
                            mode: TransitionMode::Crossfade,
                            bass_swap_applied: false,
                        }
                    }
                    Err(e) => return Err(e),
                }
            }
            TransitionMode::Crossfade => Realized {
                samples: equal_power_crossfade(&segment_a, &segment_b),
                mode: TransitionMode::Crossfade,
                bass_swap_applied: false,
            },
            TransitionMode::FilterSweep => Realized {
                samples: filter_sweep_blend(&segment_a, &segment_b, plan, sr),
                mode: TransitionMode::FilterSweep,
                bass_swap_applied: false,
            },
            TransitionMode::EchoOut => Realized {
                samples: echo_out(&segment_a, &segment_b, bpm, plan, sr),
                mode: TransitionMode::EchoOut,
                bass_swap_applied: false,
            },
            TransitionMode::HardCut => unreachable!("handled above"),
        };

        let samples = effects::apply_limiter(&realized.samples, LIMITER_DB);
        log::debug!(
            "rendered {:?} over {} bars ({} samples)",
            realized.mode,
            duration_bars,
            samples.len()
        );

        // Cut points: A stops where the transition started consuming it; B
        // resumes past the consumed span, mapped back through the stretch
        let consumed_b_s = duration_samples as f64 / sr as f64 * ratio as f64;
        let duration_ms = (samples.len() as f64 / sr as f64 * 1000.0).round() as u64;

        Ok(RenderedTransition {
            samples,
            sample_rate: sr,
            duration_ms,
            track_a_play_until_ms: (cue_a_s as f64 * 1000.0).round() as u64,
            track_b_start_from_ms: ((cue_b_s as f64 + consumed_b_s) * 1000.0).round() as u64,
            mode: realized.mode,
            applied_stretch_ratio: ratio,
            bass_swap_applied: realized.bass_swap_applied,
            warnings,
        })
    }

    fn render_stem_blend(
        &self,
        segment_a: &mut Vec<f32>,
        segment_b: &mut Vec<f32>,
        bpm: f32,
        duration_bars: u32,
        plan: &TransitionPlan,
        warnings: &mut Vec<WarningTag>,
    ) -> Result<BlendOutcome> {
        let sr = PROCESSING_SAMPLE_RATE;
        let mut duration_bars = duration_bars;
        let bar_s = audio::bar_duration(bpm);

        let mut stems_a = self.separator.separate(segment_a, sr)?;
        let mut stems_b = self.separator.separate(segment_b, sr)?;

        // Enriched vocal analysis on the separated stems, then the clash
        // state machine
        let profile_a = vocals::detect(&stems_a.vocals, sr);
        let profile_b = vocals::detect(&stems_b.vocals, sr);
        match vocal_clash::resolve(&profile_a, &profile_b, duration_bars, bar_s) {
            ClashResolution::Clean => {}
            ClashResolution::ReduceDuration { bars } => {
                log::info!(
                    "vocal clash: shortening transition from {} to {} bars",
                    duration_bars,
                    bars
                );
                warnings.push(WarningTag::VocalClash);
                warnings.push(WarningTag::TransitionShortened);
                duration_bars = bars;
                let new_len = exact_bar_samples(bars, bpm, sr);
                segment_a.truncate(new_len);
                segment_b.truncate(new_len);
                stems_a.fit_length(new_len);
                stems_b.fit_length(new_len);
            }
            ClashResolution::DowngradeHardCut => {
                return Err(SegueError::VocalClashUnresolvable(
                    "no vocal-free sub-window in the transition".to_string(),
                ));
            }
        }
        let total_samples = segment_a.len();

        // The sacred rule
        let swap_bar = plan
            .bass_swap_bar
            .unwrap_or(duration_bars / 2 + 1)
            .clamp(1, duration_bars);
        let swap_time = bass_swap::swap_time_for_bar(swap_bar, duration_bars, bpm);
        let retried = bass_swap::apply_to_stems(
            &mut stems_a,
            &mut stems_b,
            swap_time,
            plan.bass_swap_style,
            bpm,
            sr,
        )?;
        if retried {
            warnings.push(WarningTag::BassSwapRetried);
        }

        // Volume automation: plan phases when they still cover the window,
        // the default four-phase table otherwise
        let bar_samples = (total_samples / duration_bars as usize).max(1);
        let automation = match &plan.phases {
            Some(phases) if plan.duration_bars == duration_bars => {
                curves::automation_from_phases(phases, bar_samples, total_samples)
            }
            _ => curves::default_automation(duration_bars, bar_samples, total_samples),
        }
        .finalize(bar_samples);

        let mut output = vec![0.0f32; total_samples];
        mix_stem(&mut output, &stems_a.drums, &automation.a.drums);
        mix_stem(&mut output, &stems_a.bass, &automation.a.bass);
        mix_stem(&mut output, &stems_a.other, &automation.a.other);
        mix_stem(&mut output, &stems_a.vocals, &automation.a.vocals);
        mix_stem(&mut output, &stems_b.drums, &automation.b.drums);
        mix_stem(&mut output, &stems_b.bass, &automation.b.bass);
        mix_stem(&mut output, &stems_b.other, &automation.b.other);
        mix_stem(&mut output, &stems_b.vocals, &automation.b.vocals);

        Ok(BlendOutcome {
            samples: output,
            duration_bars,
        })
    }

    fn render_hard_cut(
        &self,
        a: &[f32],
        b: &[f32],
        analysis_a: &TrackAnalysis,
        analysis_b: &TrackAnalysis,
        plan: &TransitionPlan,
        mut warnings: Vec<WarningTag>,
    ) -> Result<RenderedTransition> {
        let sr = PROCESSING_SAMPLE_RATE;
        for &tag in &plan.warnings {
            if !warnings.contains(&tag) {
                warnings.push(tag);
            }
        }

        let grid_a = grid_or_fallback(analysis_a);
        let grid_b = grid_or_fallback(analysis_b);

        let anchor = plan.start_time_in_a.unwrap_or(analysis_a.outro_start_s());
        let cut_s = grid_a.downbeat_at_or_before(anchor);
        let cut_sample = ((cut_s as f64 * sr as f64) as usize).min(a.len());

        let context = (HARD_CUT_CONTEXT_S * sr as f32) as usize;
        let fade = (SAFETY_FADE_S * sr as f32) as usize;

        let a_start = cut_sample.saturating_sub(context);
        let mut segment_a = a[a_start..cut_sample].to_vec();
        audio::apply_fade_out(&mut segment_a, fade);

        let (_, entry_beat) =
            grid_b.nearest_beat(plan.start_from_b, crate::analysis::Direction::After);
        let entry_idx = grid_b.next_downbeat_index(entry_beat);
        let entry_s = grid_b.beats()[entry_idx];
        let entry_sample = ((entry_s as f64 * sr as f64) as usize).min(b.len());
        let b_end = (entry_sample + context).min(b.len());
        let mut segment_b = b[entry_sample..b_end].to_vec();
        audio::apply_fade_in(&mut segment_b, fade);

        let tail = plan.tail.unwrap_or_default();
        let samples = match tail.kind {
            TailKind::None => audio::concat(&[&segment_a, &segment_b]),
            _ => {
                let with_tail = apply_tail(&segment_a, &tail, analysis_a.bpm, sr);
                let dry_len = segment_a.len();
                let extension = &with_tail[dry_len.min(with_tail.len())..];

                // The tail rings over the first half-second of B under an
                // equal-power crossfade
                let overlap = ((TAIL_OVERLAP_S * sr as f32) as usize)
                    .min(extension.len())
                    .min(segment_b.len());
                let mut out = Vec::with_capacity(dry_len + segment_b.len());
                out.extend_from_slice(&with_tail[..dry_len]);
                for i in 0..overlap {
                    let t = i as f32 / overlap.max(1) as f32;
                    let angle = t * std::f32::consts::FRAC_PI_2;
                    out.push(extension[i] * angle.cos() + segment_b[i] * angle.sin());
                }
                out.extend_from_slice(&segment_b[overlap..]);
                out
            }
        };

        let samples = effects::apply_limiter(&samples, LIMITER_DB);
        let duration_ms = (samples.len() as f64 / sr as f64 * 1000.0).round() as u64;

        Ok(RenderedTransition {
            samples,
            sample_rate: sr,
            duration_ms,
            track_a_play_until_ms: (a_start as f64 / sr as f64 * 1000.0).round() as u64,
            track_b_start_from_ms: (b_end as f64 / sr as f64 * 1000.0).round() as u64,
            mode: TransitionMode::HardCut,
            applied_stretch_ratio: 1.0,
            bass_swap_applied: false,
            warnings,
        })
    }
}

struct Realized {
    samples: Vec<f32>,
    mode: TransitionMode,
    bass_swap_applied: bool,
}

struct BlendOutcome {
    samples: Vec<f32>,
    duration_bars: u32,
}

fn clash_like(e: &SegueError) -> bool {
    matches!(
        e,
        SegueError::VocalClashUnresolvable(_) | SegueError::BassSwapViolation { .. }
    )
}

/// Exact sample count of `bars` bars at `bpm`, rounded once
///
/// Rounding per beat would accumulate; the length contract allows only one
/// sample of slack.
fn exact_bar_samples(bars: u32, bpm: f32, sample_rate: u32) -> usize {
    (bars as f64 * 4.0 * 60.0 / bpm as f64 * sample_rate as f64).round() as usize
}

fn grid_or_fallback(analysis: &TrackAnalysis) -> BeatGrid {
    analysis.grid().unwrap_or_else(|_| {
        log::warn!("beat grid underdetermined; assuming a regular grid");
        let bpm = analysis.bpm.clamp(60.0, 200.0);
        let count = ((analysis.duration_seconds * bpm / 60.0) as usize).max(8);
        BeatGrid::regular(bpm, 0.0, count)
            .expect("a regular grid from a clamped bpm is always valid")
    })
}

fn mix_stem(output: &mut [f32], stem: &[f32], curve: &[f32]) {
    let n = output.len().min(stem.len()).min(curve.len());
    for i in 0..n {
        output[i] += stem[i] * curve[i];
    }
}

/// Equal-power crossfade of two equal-length segments
fn equal_power_crossfade(segment_a: &[f32], segment_b: &[f32]) -> Vec<f32> {
    let n = segment_a.len().min(segment_b.len());
    (0..n)
        .map(|i| {
            let t = i as f32 / n.max(1) as f32 * std::f32::consts::FRAC_PI_2;
            segment_a[i] * t.cos() + segment_b[i] * t.sin()
        })
        .collect()
}

fn filter_sweep_blend(
    segment_a: &[f32],
    segment_b: &[f32],
    plan: &TransitionPlan,
    sample_rate: u32,
) -> Vec<f32> {
    let spec = plan.filter.unwrap_or_default();
    let swept_a = effects::create_filter_sweep(
        segment_a,
        FilterKind::HighPass,
        spec.hpf_start_a,
        spec.hpf_end_a,
        SweepCurve::Exponential,
        sample_rate,
    );
    let swept_b = effects::create_filter_sweep(
        segment_b,
        FilterKind::LowPass,
        spec.lpf_start_b,
        spec.lpf_end_b,
        SweepCurve::Exponential,
        sample_rate,
    );
    equal_power_crossfade(&swept_a, &swept_b)
}

fn apply_tail(segment: &[f32], tail: &TailEffect, bpm: f32, sample_rate: u32) -> Vec<f32> {
    let fade_samples = ((tail.fade_s * sample_rate as f32) as usize).min(segment.len());
    let tail_start = segment.len().saturating_sub(fade_samples);
    match tail.kind {
        TailKind::Reverb => effects::create_reverb_tail(
            segment,
            tail_start,
            tail.room_size,
            tail.decay_s,
            tail.fade_s,
            sample_rate,
        ),
        TailKind::Delay => effects::create_delay_tail(
            segment,
            tail_start,
            bpm,
            tail.beat_fraction,
            tail.feedback,
            tail.fade_s,
            sample_rate,
        ),
        TailKind::None => segment.to_vec(),
    }
}

/// ECHO_OUT: the tail effect rings out from the start of the window while B
/// slips in part-way through
fn echo_out(
    segment_a: &[f32],
    segment_b: &[f32],
    bpm: f32,
    plan: &TransitionPlan,
    sample_rate: u32,
) -> Vec<f32> {
    let tail = plan.tail.unwrap_or(TailEffect {
        kind: TailKind::Delay,
        ..TailEffect::default()
    });

    // The dry signal fades over the first half of the window; echoes carry
    // the rest
    let fade_s = segment_a.len() as f32 / sample_rate as f32 / 2.0;
    let extended = match tail.kind {
        TailKind::Delay | TailKind::None => effects::create_delay_tail(
            segment_a,
            0,
            bpm,
            tail.beat_fraction,
            tail.feedback,
            fade_s,
            sample_rate,
        ),
        TailKind::Reverb => effects::create_reverb_tail(
            segment_a,
            0,
            tail.room_size,
            tail.decay_s,
            fade_s,
            sample_rate,
        ),
    };

    // B enters half-way through the tail with a short fade-in
    let b_entry = extended.len() / 2;
    let out_len = extended.len().max(b_entry + segment_b.len());
    let mut out = vec![0.0f32; out_len];
    out[..extended.len()].copy_from_slice(&extended);

    // Soften the ringing tail where it overlaps B
    let overlap_end = extended.len().min(b_entry + segment_b.len());
    for sample in out[b_entry..overlap_end].iter_mut() {
        *sample *= 0.7;
    }

    let fade_in = (sample_rate as usize) / 2;
    for (i, &s) in segment_b.iter().enumerate() {
        let gain = if i < fade_in {
            i as f32 / fade_in as f32
        } else {
            1.0
        };
        out[b_entry + i] += s * gain;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::plain_analysis;
    use crate::stems::BandSplitSeparator;

    const SR: u32 = 44_100;

    /// A synthetic "track": sustained bass + low-mid lead + a band-limited
    /// kick on every beat (55 Hz decaying sine, so no vocal-band splatter)
    fn synth_track(bpm: f32, seconds: f32) -> Vec<f32> {
        let n = (SR as f32 * seconds) as usize;
        let beat = crate::audio::samples_per_beat(bpm, SR);
        let mut out: Vec<f32> = (0..n)
            .map(|i| {
                let t = i as f32 / SR as f32;
                (t * 80.0 * 2.0 * std::f32::consts::PI).sin() * 0.3
                    + (t * 880.0 * 2.0 * std::f32::consts::PI).sin() * 0.2
            })
            .collect();
        let mut pos = 0;
        while pos < n {
            let end = (pos + 2000).min(n);
            for (k, s) in out[pos..end].iter_mut().enumerate() {
                let env = 1.0 - k as f32 / 2000.0;
                *s += (k as f32 * 55.0 * 2.0 * std::f32::consts::PI / SR as f32).sin()
                    * env
                    * env
                    * 0.4;
            }
            pos += beat;
        }
        out
    }

    fn renderer() -> TransitionRenderer {
        TransitionRenderer::new(Arc::new(BandSplitSeparator))
    }

    #[test]
    fn test_crossfade_respects_length_contract() {
        let a = synth_track(124.0, 120.0);
        let b = synth_track(124.0, 120.0);
        let ana_a = plain_analysis(124.0, 120.0, "8A", 0.6);
        let ana_b = plain_analysis(124.0, 120.0, "8A", 0.6);

        let plan = TransitionPlan::new(TransitionMode::Crossfade, 8);
        let result = renderer()
            .render(&a, SR, &b, SR, &ana_a, &ana_b, &plan)
            .unwrap();

        let expected = (8.0f64 * 4.0 * 60.0 / 124.0 * SR as f64).round() as usize;
        assert!(
            (result.samples.len() as i64 - expected as i64).abs() <= 1,
            "length {} vs contract {}",
            result.samples.len(),
            expected
        );
        assert_eq!(result.mode, TransitionMode::Crossfade);
    }

    #[test]
    fn test_peak_is_limited() {
        let a = synth_track(124.0, 120.0);
        let b = synth_track(124.0, 120.0);
        let ana_a = plain_analysis(124.0, 120.0, "8A", 0.6);
        let ana_b = plain_analysis(124.0, 120.0, "8A", 0.6);

        for mode in [
            TransitionMode::Crossfade,
            TransitionMode::StemBlend,
            TransitionMode::FilterSweep,
        ] {
            let plan = TransitionPlan::new(mode, 8);
            let result = renderer()
                .render(&a, SR, &b, SR, &ana_a, &ana_b, &plan)
                .unwrap();
            let ceiling = crate::audio::db_to_amplitude(-1.0);
            assert!(
                crate::audio::peak(&result.samples) <= ceiling + 1e-4,
                "{:?} peak over ceiling",
                mode
            );
        }
    }

    #[test]
    fn test_stem_blend_obeys_bass_rule() {
        let a = synth_track(124.0, 120.0);
        let b = synth_track(125.0, 120.0);
        let ana_a = plain_analysis(124.0, 120.0, "8A", 0.6);
        let ana_b = plain_analysis(125.0, 120.0, "7A", 0.65);

        let plan = TransitionPlan::new(TransitionMode::StemBlend, 16);
        let result = renderer()
            .render(&a, SR, &b, SR, &ana_a, &ana_b, &plan)
            .unwrap();

        assert_eq!(result.mode, TransitionMode::StemBlend);
        assert!(result.bass_swap_applied);
        assert!(result.applied_stretch_ratio >= stretch::MIN_STRETCH_RATIO);
        assert!(result.applied_stretch_ratio <= stretch::MAX_STRETCH_RATIO);
    }

    #[test]
    fn test_cut_points_follow_cue() {
        let a = synth_track(124.0, 120.0);
        let b = synth_track(124.0, 120.0);
        let ana_a = plain_analysis(124.0, 120.0, "8A", 0.6);
        let ana_b = plain_analysis(124.0, 120.0, "8A", 0.6);

        let plan = TransitionPlan::new(TransitionMode::Crossfade, 8);
        let result = renderer()
            .render(&a, SR, &b, SR, &ana_a, &ana_b, &plan)
            .unwrap();

        // A's cut lands on a downbeat at or before the outro anchor
        let grid = ana_a.grid().unwrap();
        let cut_s = result.track_a_play_until_ms as f32 / 1000.0;
        let nearest = grid.downbeat_at_or_before(cut_s + 0.01);
        assert!((nearest - cut_s).abs() < 0.02, "cut not on a downbeat");

        // B resumes after the consumed span
        assert!(result.track_b_start_from_ms > 0);
        let consumed_s = result.track_b_start_from_ms as f32 / 1000.0;
        let expected = result.duration_ms as f32 / 1000.0; // ratio 1.0 here
        assert!((consumed_s - expected).abs() < grid.bar_duration());
    }

    #[test]
    fn test_hard_cut_includes_tail() {
        let a = synth_track(124.0, 120.0);
        let b = synth_track(140.0, 120.0);
        let ana_a = plain_analysis(124.0, 120.0, "8A", 0.5);
        let ana_b = plain_analysis(140.0, 120.0, "2B", 0.8);

        let plan = TransitionPlan::new(TransitionMode::HardCut, 0);
        let result = renderer()
            .render(&a, SR, &b, SR, &ana_a, &ana_b, &plan)
            .unwrap();

        assert_eq!(result.mode, TransitionMode::HardCut);
        // About 4s of context each side
        let expected_min = (7.0 * SR as f32) as usize;
        assert!(
            result.samples.len() >= expected_min,
            "hard cut too short: {}",
            result.samples.len()
        );
        assert_eq!(result.applied_stretch_ratio, 1.0);
    }

    #[test]
    fn test_cue_safety_loop_caps_at_zero() {
        // Anchor far beyond a short track: the cue walks back to zero and
        // the transition shortens to fit
        let a = synth_track(124.0, 20.0);
        let b = synth_track(124.0, 120.0);
        let mut ana_a = plain_analysis(124.0, 20.0, "8A", 0.6);
        ana_a.outro_start_ms = Some(19_000);
        let ana_b = plain_analysis(124.0, 120.0, "8A", 0.6);

        let plan = TransitionPlan::new(TransitionMode::Crossfade, 16);
        let result = renderer()
            .render(&a, SR, &b, SR, &ana_a, &ana_b, &plan)
            .unwrap();

        assert!(result.warnings.contains(&WarningTag::TransitionShortened));
        assert!(result.samples.len() <= (20.5 * SR as f32) as usize);
    }

    #[test]
    fn test_echo_out_extends_past_window() {
        let a = synth_track(124.0, 120.0);
        let b = synth_track(124.0, 120.0);
        let ana_a = plain_analysis(124.0, 120.0, "8A", 0.6);
        let ana_b = plain_analysis(124.0, 120.0, "8A", 0.6);

        let plan = TransitionPlan::new(TransitionMode::EchoOut, 8);
        let result = renderer()
            .render(&a, SR, &b, SR, &ana_a, &ana_b, &plan)
            .unwrap();

        assert_eq!(result.mode, TransitionMode::EchoOut);
        let window = (8.0f64 * 4.0 * 60.0 / 124.0 * SR as f64) as usize;
        assert!(result.samples.len() > window);
    }
}
