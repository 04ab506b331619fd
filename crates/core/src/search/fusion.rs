//! Score fusion for multi-modal search.
//!
//! Combines the ranked outputs of prior KNN/match expressions into one list.
//! Two strategies:
//! - **RRF** (Reciprocal Rank Fusion): rank-based, `1 / (k + rank)` summed
//!   across inputs.
//! - **Weighted sum**: score-based with per-input min-max normalization;
//!   the first input takes `weight`, the rest share `1 - weight` equally.

use crate::config;
use crate::types::RowId;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Reciprocal Rank Fusion over any number of ranked inputs.
pub fn rrf_fusion(inputs: &[Vec<(RowId, f32)>], rank_constant: f32, k: usize) -> Vec<(RowId, f32)> {
    let mut scores: HashMap<RowId, f32> = HashMap::new();
    for input in inputs {
        for (rank, (id, _)) in input.iter().enumerate() {
            *scores.entry(*id).or_insert(0.0) += 1.0 / (rank_constant + rank as f32 + 1.0);
        }
    }
    top_k(scores, k)
}

/// Weighted linear combination with per-input min-max normalization.
pub fn weighted_fusion(inputs: &[Vec<(RowId, f32)>], weight: f32, k: usize) -> Vec<(RowId, f32)> {
    let mut scores: HashMap<RowId, f32> = HashMap::new();
    let rest_weight = if inputs.len() > 1 {
        (1.0 - weight) / (inputs.len() - 1) as f32
    } else {
        0.0
    };
    for (idx, input) in inputs.iter().enumerate() {
        let w = if idx == 0 { weight } else { rest_weight };
        if let Some((min, max)) = min_max(input) {
            let range = max - min;
            for &(id, score) in input {
                let norm = if range < f32::EPSILON {
                    1.0
                } else {
                    (score - min) / range
                };
                *scores.entry(id).or_insert(0.0) += w * norm;
            }
        }
    }
    top_k(scores, k)
}

/// Dispatch on the fusion method name with its options.
pub fn fuse(
    inputs: &[Vec<(RowId, f32)>],
    method: &str,
    rank_constant: Option<f32>,
    weight: Option<f32>,
    k: usize,
) -> Vec<(RowId, f32)> {
    match method {
        "weighted_sum" => weighted_fusion(
            inputs,
            weight.unwrap_or(config::FUSION_DEFAULT_WEIGHT),
            k,
        ),
        _ => rrf_fusion(
            inputs,
            rank_constant.unwrap_or(config::RRF_RANK_CONSTANT),
            k,
        ),
    }
}

fn min_max(results: &[(RowId, f32)]) -> Option<(f32, f32)> {
    if results.is_empty() {
        return None;
    }
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    for &(_, s) in results {
        if s < min {
            min = s;
        }
        if s > max {
            max = s;
        }
    }
    Some((min, max))
}

/// Partial sort: O(n log k) via a min-heap of size k.
fn top_k(scores: HashMap<RowId, f32>, k: usize) -> Vec<(RowId, f32)> {
    let mut heap: BinaryHeap<Reverse<(OrderedFloat<f32>, RowId)>> =
        BinaryHeap::with_capacity(k + 1);
    for (id, score) in scores {
        heap.push(Reverse((OrderedFloat(score), id)));
        if heap.len() > k {
            heap.pop();
        }
    }
    let mut results: Vec<(RowId, f32)> =
        heap.into_iter().map(|Reverse((s, id))| (id, s.0)).collect();
    results.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rid(n: u64) -> RowId {
        RowId(n)
    }

    #[test]
    fn test_rrf_disjoint_inputs() {
        let a = vec![(rid(0), 0.9), (rid(1), 0.8)];
        let b = vec![(rid(2), 5.0), (rid(3), 4.0)];
        let fused = rrf_fusion(&[a, b], config::RRF_RANK_CONSTANT, 4);
        assert_eq!(fused.len(), 4);
    }

    #[test]
    fn test_rrf_overlap_boosts() {
        let a = vec![(rid(0), 0.9), (rid(1), 0.8), (rid(2), 0.7)];
        let b = vec![(rid(1), 5.0), (rid(3), 4.0)];
        let fused = rrf_fusion(&[a, b], config::RRF_RANK_CONSTANT, 4);
        assert_eq!(fused[0].0, rid(1), "overlapping row should rank first");
    }

    #[test]
    fn test_weighted_extremes() {
        let a = vec![(rid(0), 0.9), (rid(1), 0.5)];
        let b = vec![(rid(2), 10.0), (rid(3), 5.0)];
        let all_a = weighted_fusion(&[a.clone(), b.clone()], 1.0, 4);
        assert!(all_a[0].0 == rid(0) || all_a[0].0 == rid(1));
        let all_b = weighted_fusion(&[a, b], 0.0, 4);
        assert!(all_b[0].0 == rid(2) || all_b[0].0 == rid(3));
    }

    #[test]
    fn test_truncates_to_k() {
        let a: Vec<(RowId, f32)> = (0..20).map(|i| (rid(i), 1.0 - i as f32 / 20.0)).collect();
        let fused = rrf_fusion(&[a], config::RRF_RANK_CONSTANT, 5);
        assert_eq!(fused.len(), 5);
    }

    #[test]
    fn test_fuse_dispatch() {
        let a = vec![(rid(0), 1.0)];
        assert_eq!(fuse(&[a.clone()], "rrf", None, None, 1).len(), 1);
        assert_eq!(fuse(&[a], "weighted_sum", None, Some(0.7), 1).len(), 1);
        assert!(fuse(&[], "rrf", None, None, 5).is_empty());
    }
}
