//! As-of joins between sorted time axes
//!
//! Both functions take a sorted base axis and a sorted source axis and return,
//! for every base point, the index of the matching source record. They run in
//! a single merge pass, O(base + source).

use std::ops::Sub;

/// For each base point, the index of the source point nearest in time.
///
/// Symmetric: a later source point may match. On equal distance the earlier
/// source point wins.
pub fn nearest_indices<T, D>(base: &[T], source: &[T]) -> Vec<Option<usize>>
where
    T: Copy + Ord + Sub<Output = D>,
    D: Ord,
{
    debug_assert!(base.windows(2).all(|w| w[0] <= w[1]));
    debug_assert!(source.windows(2).all(|w| w[0] <= w[1]));

    let distance = |a: T, b: T| if a >= b { a - b } else { b - a };

    let mut out = Vec::with_capacity(base.len());
    // Index of the first source point >= current base point
    let mut j = 0;
    for &t in base {
        while j < source.len() && source[j] < t {
            j += 1;
        }
        let before = j.checked_sub(1);
        let after = (j < source.len()).then_some(j);
        let pick = match (before, after) {
            (Some(b), Some(a)) => {
                if distance(t, source[b]) <= distance(source[a], t) {
                    Some(b)
                } else {
                    Some(a)
                }
            }
            (b, a) => b.or(a),
        };
        out.push(pick);
    }
    out
}

/// For each base point, the index of the most recent source point at or before it.
///
/// With duplicate source timestamps the last one wins.
pub fn backward_indices<T: Copy + Ord>(base: &[T], source: &[T]) -> Vec<Option<usize>> {
    debug_assert!(base.windows(2).all(|w| w[0] <= w[1]));
    debug_assert!(source.windows(2).all(|w| w[0] <= w[1]));

    let mut out = Vec::with_capacity(base.len());
    // Number of source points <= current base point
    let mut j = 0;
    for &t in base {
        while j < source.len() && source[j] <= t {
            j += 1;
        }
        out.push(j.checked_sub(1));
    }
    out
}
