//! BM25 Okapi scoring over posting decoders.
//!
//! The pure scoring math plus the accumulation loop: callers hand in one
//! in-memory posting decoder per query term (the reader-side contract of the
//! posting writers) together with the corpus statistics, and get back the
//! top-k scored documents.

use crate::config;
use crate::posting::InMemPostingDecoder;
use crate::types::DocId;
use ordered_float::OrderedFloat;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Inverse document frequency: `ln((N - df + 0.5) / (df + 0.5) + 1)`.
pub fn idf(doc_count: u32, df: u32) -> f32 {
    let n = doc_count as f32;
    let df = df as f32;
    ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
}

/// Saturated, length-normalized term frequency.
pub fn tf_norm(tf: u32, doc_len: u32, avg_doc_len: f32) -> f32 {
    let tf = tf as f32;
    let dl = doc_len as f32;
    let k1 = config::BM25_K1;
    let b = config::BM25_B;
    let avg = if avg_doc_len > 0.0 { avg_doc_len } else { 1.0 };
    (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * dl / avg))
}

/// Score a disjunctive query: one decoder per query term, document lengths
/// indexed by doc id. Returns up to `k` `(doc_id, score)` pairs sorted by
/// descending score.
pub fn bm25_search(
    mut term_decoders: Vec<InMemPostingDecoder>,
    doc_lengths: &[u32],
    doc_count: u32,
    k: usize,
) -> Vec<(DocId, f32)> {
    if doc_count == 0 || term_decoders.is_empty() || k == 0 {
        return Vec::new();
    }

    let total_len: u64 = doc_lengths.iter().map(|&l| l as u64).sum();
    let avg_doc_len = total_len as f32 / doc_count as f32;

    let mut scores: HashMap<DocId, f32> = HashMap::new();
    for decoder in &mut term_decoders {
        let term_idf = idf(doc_count, decoder.df());
        while let Some((doc_id, tf)) = decoder.next_posting() {
            let doc_len = doc_lengths.get(doc_id as usize).copied().unwrap_or(0);
            *scores.entry(doc_id).or_insert(0.0) += term_idf * tf_norm(tf, doc_len, avg_doc_len);
        }
    }

    top_k(scores, k)
}

/// Partial sort: O(n log k) via a min-heap of size k.
fn top_k(scores: HashMap<DocId, f32>, k: usize) -> Vec<(DocId, f32)> {
    let mut heap: BinaryHeap<Reverse<(OrderedFloat<f32>, DocId)>> =
        BinaryHeap::with_capacity(k + 1);
    for (id, score) in scores {
        heap.push(Reverse((OrderedFloat(score), id)));
        if heap.len() > k {
            heap.pop();
        }
    }
    let mut results: Vec<(DocId, f32)> =
        heap.into_iter().map(|Reverse((s, id))| (id, s.0)).collect();
    results.sort_unstable_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;
    use crate::mem::{ByteSlicePool, RecyclePool};
    use crate::posting::{PostingFormatOption, PostingWriter};
    use parking_lot::RwLock;
    use std::sync::Arc;

    fn build_term(postings: &[(DocId, u32)], lengths: &Arc<RwLock<Vec<u32>>>) -> PostingWriter {
        let bsp = Arc::new(ByteSlicePool::new(config::BYTE_SLICE_POOL_BUDGET));
        let rp = Arc::new(RecyclePool::new());
        let mut writer =
            PostingWriter::new(bsp, rp, PostingFormatOption::default(), lengths.clone()).unwrap();
        for &(doc, tf) in postings {
            for p in 0..tf {
                writer.add_position(p);
            }
            writer.end_document(doc, 0).unwrap();
        }
        writer
    }

    #[test]
    fn test_idf_decreases_with_df() {
        assert!(idf(100, 1) > idf(100, 50));
        assert!(idf(100, 100) > 0.0);
    }

    #[test]
    fn test_higher_tf_scores_higher() {
        let lengths = Arc::new(RwLock::new(vec![3u32; 4]));
        let writer = build_term(&[(0, 3), (1, 1)], &lengths);
        let results = bm25_search(
            vec![writer.in_mem_decoder()],
            &lengths.read(),
            2,
            10,
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, 0, "doc with higher TF should rank first");
        assert!(results[0].1 > results[1].1);
    }

    #[test]
    fn test_multi_term_accumulates() {
        let lengths = Arc::new(RwLock::new(vec![2u32; 4]));
        let t1 = build_term(&[(0, 1), (1, 1)], &lengths);
        let t2 = build_term(&[(1, 1)], &lengths);
        let results = bm25_search(
            vec![t1.in_mem_decoder(), t2.in_mem_decoder()],
            &lengths.read(),
            2,
            10,
        );
        assert_eq!(results[0].0, 1, "doc matching both terms should rank first");
    }

    #[test]
    fn test_k_truncation() {
        let lengths = Arc::new(RwLock::new(vec![1u32; 8]));
        let writer = build_term(&[(0, 1), (1, 1), (2, 1), (3, 1)], &lengths);
        let results = bm25_search(vec![writer.in_mem_decoder()], &lengths.read(), 4, 2);
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(bm25_search(Vec::new(), &[], 0, 10).is_empty());
    }
}
