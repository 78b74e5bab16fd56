//! The sequential pattern-defeating sort driver.

use crate::heap::heapsort;
use crate::params::{self, MEDIAN_THRESHOLD, PARTITION_RATIO};
use crate::partition::{partition_to_left, partition_to_right};
use crate::partition_branchless::partition_right_branchless;
use crate::pivot::choose_pivot;
use crate::smallsort::{
    insertion_sort, insertion_sort_unguarded, partial_insertion_sort,
    partial_insertion_sort_unguarded,
};

/// Swaps a fixed set of positions on both sides of a badly placed pivot to
/// break up whatever pattern produced the imbalance, without randomness.
///
/// `v` is the partitioned range, `pivot_pos` the pivot's position in it.
pub(crate) fn deterministic_shuffle<T>(
    v: &mut [T],
    l_size: usize,
    r_size: usize,
    pivot_pos: usize,
    ins_thr: usize,
) {
    let len = v.len();
    if l_size >= ins_thr {
        v.swap(0, l_size / 4);
        v.swap(pivot_pos - 1, pivot_pos - l_size / 4);
        if l_size > MEDIAN_THRESHOLD {
            v.swap(1, l_size / 4 + 1);
            v.swap(2, l_size / 4 + 2);
            v.swap(pivot_pos - 2, pivot_pos - (l_size / 4 + 1));
            v.swap(pivot_pos - 3, pivot_pos - (l_size / 4 + 2));
        }
    }
    if r_size >= ins_thr {
        v.swap(pivot_pos + 1, pivot_pos + (1 + r_size / 4));
        v.swap(len - 1, len - r_size / 4);
        if r_size > MEDIAN_THRESHOLD {
            v.swap(pivot_pos + 2, pivot_pos + (2 + r_size / 4));
            v.swap(pivot_pos + 3, pivot_pos + (3 + r_size / 4));
            v.swap(len - 2, len - (1 + r_size / 4));
            v.swap(len - 3, len - (2 + r_size / 4));
        }
    }
}

/// The recursive sort loop. Iterates on one side of each partition and
/// recurses on the other (always the smaller), so stack depth stays
/// logarithmic.
///
/// When `leftmost` is false, `v[0]` is an already-placed element known to be
/// less than or equal to everything after it, and the range being sorted is
/// `v[1..]`. That sentinel enables the unguarded insertion paths and the
/// equal-pivot shortcut; the drivers maintain it by continuing right-hand
/// ranges from the placed pivot itself.
///
/// `bad_allowed` is the number of highly unbalanced partitions tolerated
/// before the range is heapsorted.
pub(crate) fn seq_loop<T, F, const BRANCHLESS: bool>(
    mut v: &mut [T],
    is_less: &mut F,
    mut bad_allowed: u32,
    mut leftmost: bool,
) where
    F: FnMut(&T, &T) -> bool,
{
    let ins_thr = params::insertion_threshold(BRANCHLESS);

    loop {
        let base = usize::from(!leftmost);
        let size = v.len() - base;

        if size < ins_thr {
            if leftmost {
                insertion_sort(v, is_less);
            } else {
                insertion_sort_unguarded(v, is_less);
            }
            return;
        }

        choose_pivot::<T, F, BRANCHLESS>(&mut v[base..], is_less);

        // The chosen pivot is equivalent to the sentinel, so it is the
        // smallest element in the range: partition the equal run to the
        // front and continue past it, with the placed pivot as the new
        // sentinel. This collapses long runs of duplicates without
        // recursing.
        if !leftmost && !is_less(&v[0], &v[1]) {
            let mid = partition_to_left(&mut v[1..], is_less);
            let (_, rest) = v.split_at_mut(1 + mid);
            v = rest;
            continue;
        }

        let (mid, already_partitioned) = if BRANCHLESS {
            partition_right_branchless(&mut v[base..], is_less)
        } else {
            partition_to_right(&mut v[base..], is_less)
        };
        let pivot_abs = base + mid;
        let l_size = mid;
        let r_size = v.len() - pivot_abs - 1;

        // A partition that needed no swap usually means the range is sorted
        // or nearly so; a bounded insertion pass either finishes a side or
        // proves the guess wrong.
        if already_partitioned {
            let mut left_done = false;
            let mut right_done = false;
            if l_size > ins_thr {
                left_done = partial_insertion_sort(&mut v[base..pivot_abs], is_less);
            }
            if r_size > ins_thr {
                right_done = partial_insertion_sort_unguarded(&mut v[pivot_abs..], is_less);
            }
            if left_done && right_done {
                return;
            }
            if left_done {
                let (_, right) = v.split_at_mut(pivot_abs);
                v = right;
                leftmost = false;
                continue;
            }
            if right_done {
                let (left, _) = v.split_at_mut(pivot_abs);
                v = left;
                continue;
            }
        }

        let highly_unbalanced =
            l_size < size / PARTITION_RATIO || r_size < size / PARTITION_RATIO;
        if highly_unbalanced {
            bad_allowed -= 1;
            if bad_allowed == 0 {
                heapsort(&mut v[base..], is_less);
                return;
            }
            deterministic_shuffle(&mut v[base..], l_size, r_size, mid, ins_thr);
        }

        if l_size < r_size {
            let (left, right) = v.split_at_mut(pivot_abs);
            seq_loop::<T, F, BRANCHLESS>(left, is_less, bad_allowed, leftmost);
            v = right;
            leftmost = false;
        } else {
            let (left, right) = v.split_at_mut(pivot_abs);
            seq_loop::<T, F, BRANCHLESS>(right, is_less, bad_allowed, false);
            v = left;
        }
    }
}

/// Sequential entry: seeds the imbalance budget and starts the loop.
pub(crate) fn seq_sort<T, F, const BRANCHLESS: bool>(v: &mut [T], is_less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    if v.len() < 2 {
        return;
    }
    let bad_allowed = params::log2(v.len());
    seq_loop::<T, F, BRANCHLESS>(v, is_less, bad_allowed, true);
}
