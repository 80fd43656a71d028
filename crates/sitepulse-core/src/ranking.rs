//! Top-K ranking over `(name, value)` pairs.
//!
//! Uses a bounded min-heap: the smallest held entry sits at the top and is
//! replaced only by a strictly larger value. Ties favour whichever pair
//! was seen first, both when deciding what to keep and in the final order.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use serde::{Deserialize, Serialize};

/// One entry of a ranking result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedSite {
    /// Site name.
    pub name: String,
    /// The value the site was ranked by.
    pub value: f64,
}

/// Heap entry ordered by value, then by source position with earlier
/// positions ranking higher.
#[derive(Debug)]
struct HeapEntry<'a> {
    name: &'a str,
    value: f64,
    position: usize,
}

impl Ord for HeapEntry<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value
            .total_cmp(&other.value)
            .then_with(|| other.position.cmp(&self.position))
    }
}

impl PartialOrd for HeapEntry<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry<'_> {}

/// Return the `k` pairs with the largest values, highest first.
///
/// Returns an empty vector when `pairs` is empty or `k` is zero. The
/// input is never modified.
pub fn top_k<S: AsRef<str>>(pairs: &[(S, f64)], k: usize) -> Vec<RankedSite> {
    if pairs.is_empty() || k == 0 {
        return Vec::new();
    }

    let mut heap: BinaryHeap<Reverse<HeapEntry<'_>>> =
        BinaryHeap::with_capacity(k.min(pairs.len()));

    for (position, (name, value)) in pairs.iter().enumerate() {
        let entry = HeapEntry {
            name: name.as_ref(),
            value: *value,
            position,
        };
        if heap.len() < k {
            heap.push(Reverse(entry));
        } else if let Some(Reverse(min)) = heap.peek()
            && entry.value.total_cmp(&min.value) == Ordering::Greater
        {
            heap.pop();
            heap.push(Reverse(entry));
        }
    }

    let mut held: Vec<HeapEntry<'_>> = heap.into_iter().map(|Reverse(entry)| entry).collect();
    held.sort_unstable_by(|a, b| b.cmp(a));

    held.into_iter()
        .map(|entry| RankedSite {
            name: entry.name.to_owned(),
            value: entry.value,
        })
        .collect()
}

/// [`top_k`] for callers holding a signed `k`, such as a query string.
/// Any `k <= 0` yields an empty ranking.
pub fn top_k_signed<S: AsRef<str>>(pairs: &[(S, f64)], k: i64) -> Vec<RankedSite> {
    usize::try_from(k).map_or_else(|_| Vec::new(), |k| top_k(pairs, k))
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;

    fn names(ranked: &[RankedSite]) -> Vec<&str> {
        ranked.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn picks_highest_with_earlier_tie_first() {
        let pairs = [("A", 5.0), ("B", 9.0), ("C", 3.0), ("D", 9.0)];
        let ranked = top_k(&pairs, 2);
        assert_eq!(names(&ranked), vec!["B", "D"]);
        assert!(ranked.iter().all(|r| r.value == 9.0));
    }

    #[test]
    fn empty_input_gives_empty_output() {
        let pairs: [(&str, f64); 0] = [];
        assert!(top_k(&pairs, 3).is_empty());
    }

    #[test]
    fn zero_or_negative_k_gives_empty_output() {
        let pairs = [("A", 1.0), ("B", 2.0)];
        assert!(top_k(&pairs, 0).is_empty());
        assert!(top_k_signed(&pairs, 0).is_empty());
        assert!(top_k_signed(&pairs, -4).is_empty());
        assert_eq!(top_k_signed(&pairs, 1).len(), 1);
    }

    #[test]
    fn k_larger_than_input_returns_everything_sorted() {
        let pairs = [("A", 1.0), ("B", 3.0), ("C", 2.0)];
        let ranked = top_k(&pairs, 10);
        assert_eq!(names(&ranked), vec!["B", "C", "A"]);
    }

    #[test]
    fn equal_value_never_displaces_earlier_entry() {
        let pairs = [("A", 4.0), ("B", 4.0), ("C", 4.0), ("D", 1.0)];
        assert_eq!(names(&top_k(&pairs, 2)), vec!["A", "B"]);
    }

    #[test]
    fn latest_tie_is_evicted_first() {
        // A and B tie at the bottom; the larger C must push out B, not A.
        let pairs = [("A", 2.0), ("B", 2.0), ("C", 7.0)];
        assert_eq!(names(&top_k(&pairs, 2)), vec!["C", "A"]);
    }

    #[test]
    fn ranking_is_deterministic() {
        let pairs = [("x", 1.5), ("y", 1.5), ("z", 1.5), ("w", 0.5)];
        let first = top_k(&pairs, 3);
        for _ in 0..10 {
            assert_eq!(top_k(&pairs, 3), first);
        }
        assert_eq!(names(&first), vec!["x", "y", "z"]);
    }

    #[test]
    fn input_is_untouched() {
        let pairs = vec![(String::from("A"), 1.0), (String::from("B"), 2.0)];
        let before = pairs.clone();
        let _ = top_k(&pairs, 1);
        assert_eq!(pairs, before);
    }
}
