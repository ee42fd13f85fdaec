//! Per-stem volume automation curves
//!
//! A stem blend is driven by eight gain curves: four stems for the outgoing
//! track, four for the incoming one. Curves come either from a plan's phase
//! list (piecewise constant levels per phase) or from the default four-phase
//! automation. Either way they are smoothed with a half-bar moving average so
//! the gain steps never produce zipper noise.
//!
//! Bass curves are identity: the bass swap already encodes the bass
//! hand-over, and automating on top of it would soften the swap.

use crate::analysis::features::moving_average;
use crate::transition::plan::PhaseSpec;

/// Minimum smoothing window in samples
const MIN_SMOOTH_SAMPLES: usize = 64;

/// Gain curves for one track's four stems
#[derive(Debug, Clone)]
pub struct StemCurves {
    pub drums: Vec<f32>,
    pub bass: Vec<f32>,
    pub other: Vec<f32>,
    pub vocals: Vec<f32>,
}

/// The full automation of a blend: curves for A (outgoing) and B (incoming)
#[derive(Debug, Clone)]
pub struct BlendAutomation {
    pub a: StemCurves,
    pub b: StemCurves,
}

/// A linear ramp segment of one stem's curve
struct Ramp {
    start_bar: f32,
    end_bar: f32,
    from: f32,
    to: f32,
}

fn render_ramps(ramps: &[Ramp], bar_samples: usize, total_samples: usize) -> Vec<f32> {
    let mut curve = vec![0.0f32; total_samples];
    for ramp in ramps {
        let start = ((ramp.start_bar * bar_samples as f32) as usize).min(total_samples);
        let end = ((ramp.end_bar * bar_samples as f32) as usize).min(total_samples);
        if end <= start {
            continue;
        }
        let span = (end - start) as f32;
        for i in start..end {
            let t = (i - start) as f32 / span;
            curve[i] = ramp.from + (ramp.to - ramp.from) * t;
        }
    }
    // Hold the final level to the end of the buffer
    if let Some(last) = ramps.last() {
        let end = ((last.end_bar * bar_samples as f32) as usize).min(total_samples);
        for sample in curve[end..].iter_mut() {
            *sample = last.to;
        }
    }
    curve
}

/// Build the default four-phase automation for a blend of `duration_bars`
///
/// Phase layout over quarters of the transition (q = duration/4):
///
/// | Phase | A drums | A bass | A other | A vocals | B drums | B bass | B other | B vocals |
/// |-------|---------|--------|---------|----------|---------|--------|---------|----------|
/// | 1     | 1       | 1      | 1       | 1        | 0→0.7   | 0      | 0→0.3   | 0        |
/// | 2     | 1       | 1→0.2  | 1       | 1        | 0.7→1   | 0      | 0.3→0.5 | 0        |
/// | 3     | 1→0.5   | 0.2→0  | 1       | 1→0      | 1       | 0→1    | 0.5→1   | 0→1      |
/// | 4     | 0.5→0   | 0      | 1→0     | 0        | 1       | 1      | 1       | 1        |
pub fn default_automation(
    duration_bars: u32,
    bar_samples: usize,
    total_samples: usize,
) -> BlendAutomation {
    let q = duration_bars as f32 / 4.0;
    let quarters = [0.0, q, q * 2.0, q * 3.0, q * 4.0];

    let ramps = |levels: [(f32, f32); 4]| -> Vec<Ramp> {
        levels
            .iter()
            .enumerate()
            .map(|(i, &(from, to))| Ramp {
                start_bar: quarters[i],
                end_bar: quarters[i + 1],
                from,
                to,
            })
            .collect()
    };

    let a = StemCurves {
        drums: render_ramps(
            &ramps([(1.0, 1.0), (1.0, 1.0), (1.0, 0.5), (0.5, 0.0)]),
            bar_samples,
            total_samples,
        ),
        bass: render_ramps(
            &ramps([(1.0, 1.0), (1.0, 0.2), (0.2, 0.0), (0.0, 0.0)]),
            bar_samples,
            total_samples,
        ),
        other: render_ramps(
            &ramps([(1.0, 1.0), (1.0, 1.0), (1.0, 1.0), (1.0, 0.0)]),
            bar_samples,
            total_samples,
        ),
        vocals: render_ramps(
            &ramps([(1.0, 1.0), (1.0, 1.0), (1.0, 0.0), (0.0, 0.0)]),
            bar_samples,
            total_samples,
        ),
    };

    let b = StemCurves {
        drums: render_ramps(
            &ramps([(0.0, 0.7), (0.7, 1.0), (1.0, 1.0), (1.0, 1.0)]),
            bar_samples,
            total_samples,
        ),
        bass: render_ramps(
            &ramps([(0.0, 0.0), (0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]),
            bar_samples,
            total_samples,
        ),
        other: render_ramps(
            &ramps([(0.0, 0.3), (0.3, 0.5), (0.5, 1.0), (1.0, 1.0)]),
            bar_samples,
            total_samples,
        ),
        vocals: render_ramps(
            &ramps([(0.0, 0.0), (0.0, 0.0), (0.0, 1.0), (1.0, 1.0)]),
            bar_samples,
            total_samples,
        ),
    };

    BlendAutomation { a, b }
}

/// Build automation from a plan's phase list (piecewise constant levels)
pub fn automation_from_phases(
    phases: &[PhaseSpec],
    bar_samples: usize,
    total_samples: usize,
) -> BlendAutomation {
    let curve_for = |select: &dyn Fn(&PhaseSpec) -> f32| -> Vec<f32> {
        let ramps: Vec<Ramp> = phases
            .iter()
            .map(|phase| {
                let level = select(phase);
                Ramp {
                    start_bar: (phase.bars[0] - 1) as f32,
                    end_bar: phase.bars[1] as f32,
                    from: level,
                    to: level,
                }
            })
            .collect();
        render_ramps(&ramps, bar_samples, total_samples)
    };

    BlendAutomation {
        a: StemCurves {
            drums: curve_for(&|p| p.a.drums),
            bass: curve_for(&|p| p.a.bass),
            other: curve_for(&|p| p.a.other),
            vocals: curve_for(&|p| p.a.vocals),
        },
        b: StemCurves {
            drums: curve_for(&|p| p.b.drums),
            bass: curve_for(&|p| p.b.bass),
            other: curve_for(&|p| p.b.other),
            vocals: curve_for(&|p| p.b.vocals),
        },
    }
}

impl BlendAutomation {
    /// Smooth every curve and force the bass curves to identity
    ///
    /// Smoothing window is half a bar, floored at 64 samples.
    pub fn finalize(mut self, bar_samples: usize) -> Self {
        let window = (bar_samples / 2).max(MIN_SMOOTH_SAMPLES);

        for curves in [&mut self.a, &mut self.b] {
            curves.drums = moving_average(&curves.drums, window);
            curves.other = moving_average(&curves.other, window);
            curves.vocals = moving_average(&curves.vocals, window);
            // The swap owns bass automation
            for s in curves.bass.iter_mut() {
                *s = 1.0;
            }
        }
        self
    }
}
