//! Output safety: limiter and peak normalizer
//!
//! Both are single-gain operations over the whole buffer. The normalizer
//! never boosts: incoming material is already mastered and pulling quiet
//! passages up would wreck its dynamics.

use crate::audio::{db_to_amplitude, peak};

/// Brick-wall limiter: scale down so no sample exceeds the threshold
///
/// Idempotent at a fixed threshold: applying it twice equals applying it
/// once.
pub fn apply_limiter(samples: &[f32], threshold_db: f32) -> Vec<f32> {
    let threshold = db_to_amplitude(threshold_db);
    let p = peak(samples);
    if p > threshold {
        let gain = threshold / p;
        log::debug!("limiter engaged: peak {:.3} -> {:.3}", p, threshold);
        samples.iter().map(|&s| s * gain).collect()
    } else {
        samples.to_vec()
    }
}

/// Peak-normalize downward to a target level; never boosts
pub fn normalize_peak(samples: &[f32], target_db: f32) -> Vec<f32> {
    let target = db_to_amplitude(target_db);
    let p = peak(samples);
    if p > target && p > 0.0 {
        let gain = target / p;
        samples.iter().map(|&s| s * gain).collect()
    } else {
        samples.to_vec()
    }
}
