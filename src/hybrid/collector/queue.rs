//! Bounded best-N queue.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Keeps the `capacity` greatest items. The weakest item sits on top of the
/// inner min-heap so it can be displaced in O(log n).
#[derive(Debug, Clone)]
pub(crate) struct TopNQueue<T: Ord> {
    capacity: usize,
    heap: BinaryHeap<Reverse<T>>,
}

impl<T: Ord> TopNQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        TopNQueue {
            capacity,
            heap: BinaryHeap::with_capacity(capacity.min(1024) + 1),
        }
    }

    /// Insert `item` if there is room or it beats the weakest entry.
    pub(crate) fn offer(&mut self, item: T) -> bool {
        if self.capacity == 0 {
            return false;
        }
        if self.heap.len() < self.capacity {
            self.heap.push(Reverse(item));
            return true;
        }
        let beats_weakest = match self.heap.peek() {
            Some(Reverse(weakest)) => item > *weakest,
            None => true,
        };
        if beats_weakest {
            self.heap.pop();
            self.heap.push(Reverse(item));
        }
        beats_weakest
    }

    pub(crate) fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Best item first.
    pub(crate) fn to_sorted_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        let mut items: Vec<T> = self.heap.iter().map(|Reverse(item)| item.clone()).collect();
        items.sort_by(|a, b| b.cmp(a));
        items
    }
}
