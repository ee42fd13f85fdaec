//! The transition planner
//!
//! Combines harmonic/BPM/energy compatibility with set-phase heuristics into
//! a [`TransitionPlan`]. When an LLM plan source is configured and both keys
//! are known, its JSON is consulted first — but it is advisory only: the
//! response is shape-validated field by field, and anything invalid drops the
//! whole response in favour of the rule-based plan.

use serde_json::Value;

use crate::analysis::TrackAnalysis;
use crate::error::{Result, SegueError};
use crate::mix::energy::{phase_config, SetPhase};
use crate::theory::Compatibility;
use crate::transition::bass_swap::BassSwapStyle;
use crate::transition::plan::{
    FilterSweepSpec, PhaseSpec, StemLevels, TailEffect, TailKind, TransitionMode, TransitionPlan,
    WarningTag,
};

/// Context of the pair within the set
#[derive(Debug, Clone)]
pub struct SetContext {
    pub track_index: usize,
    pub total_tracks: usize,
    pub previous_mode: Option<TransitionMode>,
}

impl SetContext {
    pub fn new(track_index: usize, total_tracks: usize) -> Self {
        Self {
            track_index,
            total_tracks,
            previous_mode: None,
        }
    }

    pub fn phase(&self) -> SetPhase {
        SetPhase::from_position(self.track_index, self.total_tracks)
    }
}

/// External plan source port (the LLM call)
pub trait PlanSource: Send + Sync {
    fn plan(
        &self,
        track_a: &TrackAnalysis,
        track_b: &TrackAnalysis,
        compatibility: &Compatibility,
        context: &SetContext,
    ) -> Result<Value>;
}

/// The planner: rule table plus optional advisory plan source
pub struct Planner {
    source: Option<Box<dyn PlanSource>>,
}

impl Default for Planner {
    fn default() -> Self {
        Self { source: None }
    }
}

impl Planner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(source: Box<dyn PlanSource>) -> Self {
        Self {
            source: Some(source),
        }
    }

    /// Produce the transition plan for an adjacent pair
    pub fn plan(
        &self,
        track_a: &TrackAnalysis,
        track_b: &TrackAnalysis,
        context: &SetContext,
    ) -> TransitionPlan {
        let compatibility = Compatibility::score(
            track_a.camelot.as_deref().or(track_a.key.as_deref()),
            track_b.camelot.as_deref().or(track_b.key.as_deref()),
            track_a.bpm,
            track_b.bpm,
            track_a.energy,
            track_b.energy,
        );

        // The LLM is only consulted when both keys are known; its output is
        // advisory and must survive shape validation
        if let Some(source) = &self.source {
            let keys_known = track_a.camelot.is_some() && track_b.camelot.is_some();
            if keys_known {
                match source.plan(track_a, track_b, &compatibility, context) {
                    Ok(json) => match parse_external_plan(&json) {
                        Ok(plan) => {
                            log::info!(
                                "using external plan: {:?} over {} bars",
                                plan.mode,
                                plan.duration_bars
                            );
                            return plan;
                        }
                        Err(e) => {
                            log::warn!("external plan rejected ({}); using rule-based plan", e);
                        }
                    },
                    Err(e) => {
                        log::warn!("plan source failed ({}); using rule-based plan", e);
                    }
                }
                let mut plan = self.rule_based(track_a, track_b, &compatibility, context);
                plan.warnings.push(WarningTag::FallbackPlanUsed);
                return plan;
            }
        }

        self.rule_based(track_a, track_b, &compatibility, context)
    }

    /// The rule-based fallback table plus set-phase adjustments
    fn rule_based(
        &self,
        track_a: &TrackAnalysis,
        track_b: &TrackAnalysis,
        compatibility: &Compatibility,
        context: &SetContext,
    ) -> TransitionPlan {
        let harmonic = compatibility.harmonic;
        let delta = compatibility.bpm_delta_percent;
        let phase = context.phase();
        let config = phase_config(phase);

        let mut warnings: Vec<WarningTag> = Vec::new();

        // Vocal pre-check: FULL vocals on both sides of the prospective
        // window leave no room to blend at all
        let vocal_clash = both_sides_sing(track_a, track_b);
        if vocal_clash {
            warnings.push(WarningTag::VocalClash);
        }

        // Peak-phase energy dives kill the floor; cut instead of blending
        let energy_drop = track_a.energy - track_b.energy;
        let peak_energy_cut = phase == SetPhase::Peak && energy_drop > 0.2;
        if peak_energy_cut {
            warnings.push(WarningTag::EnergyDropAtPeak);
        }

        let (mut mode, mut duration_bars) = if vocal_clash || peak_energy_cut {
            (TransitionMode::HardCut, 0)
        } else if harmonic >= 85 && delta <= 2.0 {
            (TransitionMode::StemBlend, 16)
        } else if harmonic >= 70 && delta <= 4.0 {
            (TransitionMode::StemBlend, 8)
        } else if harmonic >= 60 && delta <= 5.0 {
            (TransitionMode::Crossfade, 8)
        } else if harmonic >= 50 && delta <= 6.0 {
            (TransitionMode::FilterSweep, 8)
        } else {
            if harmonic < 50 {
                warnings.push(WarningTag::HarmonicClash);
            }
            if delta > 8.0 {
                warnings.push(WarningTag::BpmDifferenceTooLarge);
            }
            (TransitionMode::HardCut, 0)
        };

        if delta > 4.0 && delta <= 8.0 && mode != TransitionMode::HardCut {
            warnings.push(WarningTag::BpmStretchAudible);
        }

        // Opening and closing phases want gentleness: a stem blend without
        // strong harmony softens to a crossfade
        if mode == TransitionMode::StemBlend
            && harmonic < 85
            && matches!(phase, SetPhase::Warmup | SetPhase::Cooldown)
        {
            mode = TransitionMode::Crossfade;
        }

        // Phase duration factor applies to stem blends only; the other
        // modes stay tight by construction
        if mode == TransitionMode::StemBlend {
            let scaled = (duration_bars as f32 * config.duration_factor).round() as u32;
            duration_bars = nearest_allowed(mode, scaled)
                .clamp(config.transition_bars.0.min(32), config.transition_bars.1.min(32));
            duration_bars = nearest_allowed(mode, duration_bars);
        }

        let mut plan = TransitionPlan::new(mode, duration_bars);
        plan.start_time_in_a = Some(track_a.outro_start_s());
        plan.start_from_b = 0.0;
        plan.tempo_factor = compatibility.tempo_factor;
        plan.warnings = warnings;
        plan.confidence = match mode {
            TransitionMode::StemBlend if harmonic >= 85 => 0.95,
            TransitionMode::StemBlend => 0.9,
            TransitionMode::HardCut => 0.85,
            _ => 0.8,
        };

        plan
    }
}

fn both_sides_sing(track_a: &TrackAnalysis, track_b: &TrackAnalysis) -> bool {
    // A's prospective window is its outro; B's is its head
    let a_window = track_a.duration_seconds - track_a.outro_start_s();
    let a_profile = track_a.vocal_profile_in_window(track_a.outro_start_s(), a_window);
    let b_profile = track_b.vocal_profile_in_window(0.0, a_window.max(1.0));
    a_profile.has_full_vocals_in(0.0, a_window) && b_profile.has_full_vocals_in(0.0, a_window)
}

fn nearest_allowed(mode: TransitionMode, bars: u32) -> u32 {
    *mode
        .allowed_durations()
        .iter()
        .min_by_key(|&&d| (d as i64 - bars as i64).abs())
        .unwrap_or(&8)
}

/// Parse and shape-validate an external plan JSON
///
/// The expected shape mirrors [`TransitionPlan`]'s serde layout, with the
/// nested `transition`/`effects` structure the prompt asks the model for
/// also accepted. Any missing or out-of-range field is an error — the caller
/// falls back to the rule-based plan rather than guessing.
pub fn parse_external_plan(json: &Value) -> Result<TransitionPlan> {
    // Accept both a flat TransitionPlan object and the nested prompt shape
    let transition = json.get("transition").unwrap_or(json);

    let mode_str = transition
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| SegueError::PlanInvalid("missing transition type".to_string()))?;
    let mode: TransitionMode = serde_json::from_value(Value::String(mode_str.to_string()))
        .map_err(|_| SegueError::PlanInvalid(format!("unknown transition type {}", mode_str)))?;

    let duration_bars = transition
        .get("duration_bars")
        .or_else(|| transition.get("durationBars"))
        .and_then(Value::as_u64)
        .ok_or_else(|| SegueError::PlanInvalid("missing duration_bars".to_string()))?
        as u32;

    let mut plan = TransitionPlan::new(mode, duration_bars);

    if let Some(t) = transition
        .get("start_time_in_a")
        .or_else(|| transition.get("startTimeInA"))
        .and_then(Value::as_f64)
    {
        plan.start_time_in_a = Some(t as f32);
    }
    if let Some(t) = json
        .pointer("/track_b/start_from_seconds")
        .or_else(|| transition.get("start_from_b"))
        .and_then(Value::as_f64)
    {
        plan.start_from_b = t as f32;
    }

    let stems = transition.get("stems").unwrap_or(&Value::Null);
    if let Some(bar) = stems
        .get("bass_swap_bar")
        .or_else(|| transition.get("bass_swap_bar"))
        .and_then(Value::as_u64)
    {
        plan.bass_swap_bar = Some(bar as u32);
    }
    if let Some(style) = stems
        .get("bass_swap_style")
        .and_then(Value::as_str)
    {
        plan.bass_swap_style = match style {
            "instant" => BassSwapStyle::Instant,
            "1_bar" | "one_bar" => BassSwapStyle::OneBar,
            other => {
                return Err(SegueError::PlanInvalid(format!(
                    "unknown bass swap style {}",
                    other
                )))
            }
        };
    }

    if let Some(phase_values) = stems
        .get("phases")
        .or_else(|| transition.get("phases"))
        .and_then(Value::as_array)
    {
        let mut phases = Vec::with_capacity(phase_values.len());
        for value in phase_values {
            let bars = value
                .get("bars")
                .and_then(Value::as_array)
                .filter(|b| b.len() == 2)
                .ok_or_else(|| SegueError::PlanInvalid("phase missing bars".to_string()))?;
            let parse_levels = |v: Option<&Value>| -> Result<StemLevels> {
                let v = v.ok_or_else(|| {
                    SegueError::PlanInvalid("phase missing stem levels".to_string())
                })?;
                serde_json::from_value(v.clone())
                    .map_err(|e| SegueError::PlanInvalid(format!("bad stem levels: {}", e)))
            };
            phases.push(PhaseSpec {
                bars: [
                    bars[0].as_u64().unwrap_or(0) as u32,
                    bars[1].as_u64().unwrap_or(0) as u32,
                ],
                a: parse_levels(value.get("a"))?,
                b: parse_levels(value.get("b"))?,
            });
        }
        plan.phases = Some(phases);
    }

    // Exit effect on A, for cuts and echo outs
    if let Some(effect) = json
        .pointer("/effects/track_a")
        .or_else(|| transition.pointer("/effects/track_a"))
    {
        let kind = match effect.get("type").and_then(Value::as_str) {
            Some("reverb") => TailKind::Reverb,
            Some("delay") => TailKind::Delay,
            Some("none") | None => TailKind::None,
            Some(other) => {
                return Err(SegueError::PlanInvalid(format!(
                    "unknown effect type {}",
                    other
                )))
            }
        };
        if kind != TailKind::None {
            let params = effect.get("params").unwrap_or(&Value::Null);
            let mut tail = TailEffect {
                kind,
                ..TailEffect::default()
            };
            if let Some(v) = params.get("room_size").and_then(Value::as_f64) {
                tail.room_size = v as f32;
            }
            if let Some(v) = params.get("decay").and_then(Value::as_f64) {
                tail.decay_s = v as f32;
            }
            if let Some(v) = params.get("feedback").and_then(Value::as_f64) {
                tail.feedback = v as f32;
            }
            if let Some(v) = params.get("beat_fraction").and_then(Value::as_f64) {
                tail.beat_fraction = v as f32;
            }
            plan.tail = Some(tail);
        }
    }

    if let Some(filter) = transition.get("filter") {
        let get = |key: &str| filter.get(key).and_then(Value::as_f64).map(|v| v as f32);
        plan.filter = Some(FilterSweepSpec {
            hpf_start_a: get("hpf_start_a").unwrap_or(20.0),
            hpf_end_a: get("hpf_end_a").unwrap_or(2000.0),
            lpf_start_b: get("lpf_start_b").unwrap_or(200.0),
            lpf_end_b: get("lpf_end_b").unwrap_or(20_000.0),
        });
    }

    if let Some(confidence) = json.get("confidence").and_then(Value::as_f64) {
        plan.confidence = confidence as f32;
    }

    plan.validate()?;
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::plain_analysis;
    use crate::analysis::vocals::{VocalIntensity, VocalSection};
    use serde_json::json;

    fn ctx_for_phase(phase: SetPhase) -> SetContext {
        // Positions chosen to land in each quarter of a 12-track set
        let index = match phase {
            SetPhase::Warmup => 1,
            SetPhase::Build => 4,
            SetPhase::Peak => 7,
            SetPhase::Cooldown => 10,
        };
        SetContext::new(index, 12)
    }

    #[test]
    fn test_adjacent_keys_build_phase_blend_sixteen() {
        let a = plain_analysis(124.0, 300.0, "8A", 0.6);
        let b = plain_analysis(125.0, 300.0, "7A", 0.65);
        let plan = Planner::new().plan(&a, &b, &ctx_for_phase(SetPhase::Build));
        assert_eq!(plan.mode, TransitionMode::StemBlend);
        assert_eq!(plan.duration_bars, 16);
    }

    #[test]
    fn test_relative_keys_at_peak_blend_eight() {
        let a = plain_analysis(128.0, 300.0, "8A", 0.9);
        let b = plain_analysis(130.0, 300.0, "8B", 0.9);
        let plan = Planner::new().plan(&a, &b, &ctx_for_phase(SetPhase::Peak));
        assert_eq!(plan.mode, TransitionMode::StemBlend);
        assert_eq!(plan.duration_bars, 8);
    }

    #[test]
    fn test_clashing_pair_hard_cuts_with_reverb_tail() {
        let a = plain_analysis(120.0, 300.0, "8A", 0.5);
        let b = plain_analysis(140.0, 300.0, "2B", 0.8);
        let plan = Planner::new().plan(&a, &b, &ctx_for_phase(SetPhase::Build));
        assert_eq!(plan.mode, TransitionMode::HardCut);
        assert_eq!(plan.duration_bars, 0);
        let tail = plan.tail.unwrap();
        assert_eq!(tail.kind, TailKind::Reverb);
        assert!((tail.decay_s - 4.0).abs() < 1e-6);
        assert!(plan.warnings.contains(&WarningTag::HarmonicClash));
    }

    #[test]
    fn test_double_vocals_force_hard_cut() {
        let mut a = plain_analysis(124.0, 300.0, "8A", 0.6);
        a.has_vocals = true;
        // Vocals cover 90% of the outro
        a.vocal_sections = vec![VocalSection {
            start_s: a.outro_start_s(),
            end_s: 300.0,
            intensity: VocalIntensity::Full,
        }];
        let mut b = plain_analysis(124.0, 300.0, "8A", 0.6);
        b.has_vocals = true;
        b.vocal_sections = vec![VocalSection {
            start_s: 0.0,
            end_s: 120.0,
            intensity: VocalIntensity::Full,
        }];

        let plan = Planner::new().plan(&a, &b, &ctx_for_phase(SetPhase::Build));
        assert_eq!(plan.mode, TransitionMode::HardCut);
        assert!(plan.warnings.contains(&WarningTag::VocalClash));
    }

    #[test]
    fn test_warmup_energy_shift_softens_to_crossfade() {
        let a = plain_analysis(126.0, 300.0, "8A", 0.5);
        let b = plain_analysis(128.0, 300.0, "6A", 0.55);
        let plan = Planner::new().plan(&a, &b, &ctx_for_phase(SetPhase::Warmup));
        assert!(
            plan.mode == TransitionMode::Crossfade || plan.mode == TransitionMode::FilterSweep,
            "got {:?}",
            plan.mode
        );
        assert_eq!(plan.duration_bars, 8);
    }

    #[test]
    fn test_peak_energy_drop_forces_hard_cut() {
        let a = plain_analysis(128.0, 300.0, "8A", 0.95);
        let b = plain_analysis(129.0, 300.0, "8A", 0.60);
        let plan = Planner::new().plan(&a, &b, &ctx_for_phase(SetPhase::Peak));
        assert_eq!(plan.mode, TransitionMode::HardCut);
        assert!(plan.warnings.contains(&WarningTag::EnergyDropAtPeak));
    }

    #[test]
    fn test_warmup_blend_stretches_long() {
        // Identical keys in warmup: blend scales toward 32 bars
        let a = plain_analysis(122.0, 300.0, "5A", 0.4);
        let b = plain_analysis(122.0, 300.0, "5A", 0.45);
        let plan = Planner::new().plan(&a, &b, &ctx_for_phase(SetPhase::Warmup));
        assert_eq!(plan.mode, TransitionMode::StemBlend);
        assert_eq!(plan.duration_bars, 32);
    }

    #[test]
    fn test_identical_tracks_blend_sixteen_at_build() {
        let a = plain_analysis(124.0, 300.0, "8A", 0.6);
        let plan = Planner::new().plan(&a, &a.clone(), &ctx_for_phase(SetPhase::Build));
        assert_eq!(plan.mode, TransitionMode::StemBlend);
        assert_eq!(plan.duration_bars, 16);
    }

    struct CannedSource(Value);
    impl PlanSource for CannedSource {
        fn plan(
            &self,
            _: &TrackAnalysis,
            _: &TrackAnalysis,
            _: &Compatibility,
            _: &SetContext,
        ) -> Result<Value> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_valid_external_plan_is_used() {
        let source = CannedSource(json!({
            "confidence": 0.8,
            "track_b": { "start_from_seconds": 12.5 },
            "transition": {
                "type": "STEM_BLEND",
                "duration_bars": 24,
                "start_time_in_a": 200.0,
                "stems": { "bass_swap_bar": 13, "bass_swap_style": "1_bar" }
            }
        }));
        let a = plain_analysis(124.0, 300.0, "8A", 0.6);
        let b = plain_analysis(125.0, 300.0, "7A", 0.6);
        let plan =
            Planner::with_source(Box::new(source)).plan(&a, &b, &ctx_for_phase(SetPhase::Build));

        assert_eq!(plan.mode, TransitionMode::StemBlend);
        assert_eq!(plan.duration_bars, 24);
        assert_eq!(plan.bass_swap_bar, Some(13));
        assert_eq!(plan.bass_swap_style, BassSwapStyle::OneBar);
        assert!((plan.start_from_b - 12.5).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_external_plan_falls_back() {
        // 12 bars is not a legal stem-blend duration
        let source = CannedSource(json!({
            "transition": { "type": "STEM_BLEND", "duration_bars": 12 }
        }));
        let a = plain_analysis(124.0, 300.0, "8A", 0.6);
        let b = plain_analysis(125.0, 300.0, "7A", 0.65);
        let plan =
            Planner::with_source(Box::new(source)).plan(&a, &b, &ctx_for_phase(SetPhase::Build));

        // Rule-based result with the fallback warning attached
        assert_eq!(plan.mode, TransitionMode::StemBlend);
        assert_eq!(plan.duration_bars, 16);
        assert!(plan.warnings.contains(&WarningTag::FallbackPlanUsed));
    }

    #[test]
    fn test_unknown_keys_skip_the_source() {
        struct PanickySource;
        impl PlanSource for PanickySource {
            fn plan(
                &self,
                _: &TrackAnalysis,
                _: &TrackAnalysis,
                _: &Compatibility,
                _: &SetContext,
            ) -> Result<Value> {
                panic!("source must not be called without keys");
            }
        }
        let mut a = plain_analysis(124.0, 300.0, "8A", 0.6);
        a.camelot = None;
        let b = plain_analysis(125.0, 300.0, "7A", 0.65);
        let plan = Planner::with_source(Box::new(PanickySource)).plan(
            &a,
            &b,
            &ctx_for_phase(SetPhase::Build),
        );
        assert_eq!(plan.mode, TransitionMode::StemBlend);
    }

    #[test]
    fn test_half_tempo_pair_is_compatible() {
        let a = plain_analysis(126.0, 300.0, "8A", 0.6);
        let b = plain_analysis(63.0, 300.0, "8A", 0.6);
        let plan = Planner::new().plan(&a, &b, &ctx_for_phase(SetPhase::Build));
        assert_eq!(plan.mode, TransitionMode::StemBlend);
        assert_eq!(plan.tempo_factor, crate::theory::TempoFactor::DoubleTime);
    }
}
