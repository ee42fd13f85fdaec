//! Track-order optimization
//!
//! Given a pool of analyzed tracks, find a play order that keeps adjacent
//! pairs compatible: harmonically close, tempo-matched, and without energy
//! cliffs. The optimizer is a greedy chain builder — from the best starting
//! track, repeatedly append the most compatible remaining track — which is
//! cheap and lands close to optimal for club-sized pools.

use crate::analysis::TrackAnalysis;
use crate::theory::Compatibility;

/// Pairwise transition score between two tracks (0-100)
pub fn pairwise_score(a: &TrackAnalysis, b: &TrackAnalysis) -> u8 {
    Compatibility::score(
        a.camelot.as_deref().or(a.key.as_deref()),
        b.camelot.as_deref().or(b.key.as_deref()),
        a.bpm,
        b.bpm,
        a.energy,
        b.energy,
    )
    .overall
}

/// Mean adjacent-pair score of an ordering (0-100)
pub fn order_quality(tracks: &[TrackAnalysis], order: &[usize]) -> f32 {
    if order.len() < 2 {
        return 100.0;
    }
    let total: u32 = order
        .windows(2)
        .map(|w| pairwise_score(&tracks[w[0]], &tracks[w[1]]) as u32)
        .sum();
    total as f32 / (order.len() - 1) as f32
}

/// Suggest a play order maximizing adjacent compatibility
///
/// Returns indices into `tracks`. Every candidate starting track is tried
/// and the best-scoring chain wins.
pub fn optimize_order(tracks: &[TrackAnalysis]) -> Vec<usize> {
    if tracks.len() < 3 {
        return (0..tracks.len()).collect();
    }

    // Precompute the score matrix
    let n = tracks.len();
    let mut scores = vec![vec![0u8; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i != j {
                scores[i][j] = pairwise_score(&tracks[i], &tracks[j]);
            }
        }
    }

    let chain_from = |start: usize| -> Vec<usize> {
        let mut order = vec![start];
        let mut used = vec![false; n];
        used[start] = true;

        while order.len() < n {
            let last = *order.last().unwrap_or(&start);
            let next = (0..n)
                .filter(|&j| !used[j])
                .max_by_key(|&j| scores[last][j]);
            match next {
                Some(j) => {
                    used[j] = true;
                    order.push(j);
                }
                None => break,
            }
        }
        order
    };

    let mut best: Vec<usize> = (0..n).collect();
    let mut best_quality = order_quality(tracks, &best);

    for start in 0..n {
        let candidate = chain_from(start);
        let quality = order_quality(tracks, &candidate);
        if quality > best_quality {
            best_quality = quality;
            best = candidate;
        }
    }

    log::debug!("optimized order scores {:.1}/100", best_quality);
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::plain_analysis;

    #[test]
    fn test_pairwise_score_matches_compatibility() {
        let a = plain_analysis(124.0, 300.0, "8A", 0.6);
        let b = plain_analysis(124.0, 300.0, "8A", 0.6);
        assert_eq!(pairwise_score(&a, &b), 100);

        let c = plain_analysis(140.0, 300.0, "2B", 0.9);
        assert!(pairwise_score(&a, &c) < 50);
    }

    #[test]
    fn test_optimizer_separates_clashing_tracks() {
        // Two harmonic families: 8A-ish and 2B-ish. A good order keeps each
        // family together instead of alternating.
        let tracks = vec![
            plain_analysis(124.0, 300.0, "8A", 0.5),
            plain_analysis(126.0, 300.0, "2B", 0.6),
            plain_analysis(125.0, 300.0, "9A", 0.55),
            plain_analysis(127.0, 300.0, "3B", 0.6),
        ];

        let order = optimize_order(&tracks);
        assert_eq!(order.len(), 4);

        let optimized = order_quality(&tracks, &order);
        let naive = order_quality(&tracks, &[0, 1, 2, 3]);
        assert!(
            optimized >= naive,
            "optimizer made it worse: {} vs {}",
            optimized,
            naive
        );
        // The 8A/9A pair ends up adjacent
        let pos_a = order.iter().position(|&i| i == 0).unwrap();
        let pos_c = order.iter().position(|&i| i == 2).unwrap();
        assert_eq!((pos_a as i32 - pos_c as i32).abs(), 1);
    }

    #[test]
    fn test_order_is_a_permutation() {
        let tracks: Vec<TrackAnalysis> = (0..6)
            .map(|i| plain_analysis(120.0 + i as f32, 300.0, "5A", 0.5))
            .collect();
        let mut order = optimize_order(&tracks);
        order.sort_unstable();
        assert_eq!(order, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_tiny_pools_pass_through() {
        let tracks = vec![plain_analysis(124.0, 300.0, "8A", 0.5)];
        assert_eq!(optimize_order(&tracks), vec![0]);
        assert_eq!(optimize_order(&[]), Vec::<usize>::new());
    }
}
