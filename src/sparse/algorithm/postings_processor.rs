//! Posting pruning and cluster summaries.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use ahash::AHashMap;

use crate::error::Result;
use crate::sparse::algorithm::SparseVectorReader;
use crate::sparse::cluster::{DocWeight, DocumentCluster};
use crate::sparse::quantization::{compare_unsigned, unsigned};
use crate::sparse::vector::SparseVector;

/// Heap entry ordered by unsigned weight. Among equal weights the higher doc
/// id sorts lower, so it is evicted first.
#[derive(Debug, PartialEq, Eq)]
struct ByWeight(DocWeight);

impl Ord for ByWeight {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_unsigned(self.0.weight, other.0.weight).then(other.0.doc.cmp(&self.0.doc))
    }
}

impl PartialOrd for ByWeight {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The `k` postings with the largest weights, in no particular order.
pub fn top_k(postings: &[DocWeight], k: usize) -> Vec<DocWeight> {
    if postings.is_empty() || k == 0 {
        return Vec::new();
    }
    if k >= postings.len() {
        return postings.to_vec();
    }
    let mut heap = BinaryHeap::with_capacity(k + 1);
    for &posting in postings {
        heap.push(Reverse(ByWeight(posting)));
        if heap.len() > k {
            heap.pop();
        }
    }
    heap.into_iter().map(|Reverse(ByWeight(p))| p).collect()
}

/// Set `cluster.summary` to the per-token maximum of its members' vectors,
/// keeping the heaviest tokens until their cumulative weight exceeds
/// `floor(total * prune_ratio)`.
pub fn summarize(
    cluster: &mut DocumentCluster,
    reader: &dyn SparseVectorReader,
    prune_ratio: f32,
) -> Result<()> {
    let mut maxima: AHashMap<u32, u8> = AHashMap::new();
    for posting in &cluster.docs {
        let Some(vector) = reader.read(posting.doc)? else {
            continue;
        };
        for (token, weight) in vector.items() {
            maxima
                .entry(token)
                .and_modify(|w| *w = (*w).max(weight))
                .or_insert(weight);
        }
    }

    let mut items: Vec<(u32, u8)> = maxima.into_iter().collect();
    items.sort_by(|a, b| compare_unsigned(b.1, a.1).then(a.0.cmp(&b.0)));

    let total: f64 = items.iter().map(|&(_, w)| unsigned(w) as f64).sum();
    let threshold = (total * prune_ratio as f64).floor() as u64;
    let mut sum = 0u64;
    let mut keep = 0;
    for &(_, weight) in &items {
        keep += 1;
        sum += unsigned(weight) as u64;
        if sum > threshold {
            break;
        }
    }
    items.truncate(keep);

    cluster.summary = if items.is_empty() {
        None
    } else {
        Some(SparseVector::new(items))
    };
    Ok(())
}
