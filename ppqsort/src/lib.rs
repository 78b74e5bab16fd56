#![deny(missing_docs)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

/*!
Parallel, in-place, pattern-defeating quicksort for slices.

The sort is unstable (it may reorder equal elements), runs in place, and is
*O*(*n* log *n*) worst-case while staying linear on common patterns:
already sorted, reverse sorted, all equal, few distinct values, and
append-and-resort inputs. The parallel entry points partition one range
cooperatively across worker threads with a block-claiming protocol and
carry recursive sub-sorts on a work-stealing pool.

## Picking an entry point

* [`sort`] / [`sort_by`] — sequential.
* [`par_sort`] / [`par_sort_by`] — parallel, using all available cores.
* The `_branchless` variants force the branchless block partitioner, which
  records comparison outcomes into offset buffers and swaps in bulk. The
  plain entry points pick it automatically for cheap-to-move element types
  sorted by the default ordering.

## Example

```rust
let mut v = [-5i32, 4, 1, -3, 2];

ppqsort::sort(&mut v);
assert_eq!(v, [-5, -3, 1, 2, 4]);

ppqsort::par_sort_by(&mut v, |a, b| b.cmp(a));
assert_eq!(v, [4, 2, 1, -3, -5]);
```
*/

mod heap;
mod par;
mod params;
mod partition;
mod partition_branchless;
mod pivot;
mod seq;
mod smallsort;

#[cfg(test)]
mod test;

use core::cmp::Ordering;
use core::mem;

/// Whether `T` is cheap enough to move for the branchless partitioner to pay
/// off under the default ordering.
const fn use_branchless<T>() -> bool {
    mem::size_of::<T>() <= mem::size_of::<u64>()
}

fn lt<T: Ord>(a: &T, b: &T) -> bool {
    a.lt(b)
}

/// Sorts the slice, but might not preserve the order of equal elements.
///
/// This sort is unstable (i.e., may reorder equal elements), in-place, and
/// *O*(*n* log *n*) worst-case.
///
/// # Current implementation
///
/// Pattern-defeating quicksort: common patterns — ascending, descending,
/// all-equal, few distinct values — are detected and resolved in linear
/// time, and repeatedly imbalanced partitions switch the range to heapsort,
/// which bounds the worst case. Small element types are partitioned
/// branchlessly.
///
/// # Examples
///
/// ```
/// let mut v = [5, 4, 1, 3, 2];
/// ppqsort::sort(&mut v);
/// assert_eq!(v, [1, 2, 3, 4, 5]);
/// ```
pub fn sort<T: Ord>(v: &mut [T]) {
    // Sorting has no meaningful behavior on zero-sized types.
    if mem::size_of::<T>() == 0 {
        return;
    }
    let mut is_less = lt::<T>;
    if use_branchless::<T>() {
        seq::seq_sort::<T, _, true>(v, &mut is_less);
    } else {
        seq::seq_sort::<T, _, false>(v, &mut is_less);
    }
}

/// Sorts the slice with a comparator function, but might not preserve the
/// order of equal elements.
///
/// The comparator must define a strict weak ordering; if it does not, the
/// resulting order is unspecified (but the slice remains a permutation of
/// its input).
///
/// # Examples
///
/// ```
/// let mut v = [5, 4, 1, 3, 2];
/// ppqsort::sort_by(&mut v, |a, b| b.cmp(a));
/// assert_eq!(v, [5, 4, 3, 2, 1]);
/// ```
pub fn sort_by<T, F>(v: &mut [T], mut compare: F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    if mem::size_of::<T>() == 0 {
        return;
    }
    let mut is_less = |a: &T, b: &T| compare(a, b) == Ordering::Less;
    seq::seq_sort::<T, _, false>(v, &mut is_less);
}

/// [`sort`] with the branchless partitioner forced on, regardless of the
/// element-type heuristic.
pub fn sort_branchless<T: Ord>(v: &mut [T]) {
    if mem::size_of::<T>() == 0 {
        return;
    }
    let mut is_less = lt::<T>;
    seq::seq_sort::<T, _, true>(v, &mut is_less);
}

/// [`sort_by`] with the branchless partitioner forced on.
pub fn sort_branchless_by<T, F>(v: &mut [T], mut compare: F)
where
    F: FnMut(&T, &T) -> Ordering,
{
    if mem::size_of::<T>() == 0 {
        return;
    }
    let mut is_less = |a: &T, b: &T| compare(a, b) == Ordering::Less;
    seq::seq_sort::<T, _, true>(v, &mut is_less);
}

/// Sorts the slice in parallel, but might not preserve the order of equal
/// elements.
///
/// Partitions large ranges cooperatively across all available cores and
/// carries the recursive sub-sorts on a work-stealing thread pool; the
/// resulting order equals what [`sort`] produces. Small slices take the
/// sequential path without spinning up a pool.
///
/// # Examples
///
/// ```
/// let mut v: Vec<u32> = (0..10_000).rev().collect();
/// ppqsort::par_sort(&mut v);
/// assert!(v.windows(2).all(|w| w[0] <= w[1]));
/// ```
pub fn par_sort<T: Ord + Send + Sync>(v: &mut [T]) {
    if mem::size_of::<T>() == 0 {
        return;
    }
    if use_branchless::<T>() {
        par::par_sort_impl::<T, _, true>(v, lt::<T>);
    } else {
        par::par_sort_impl::<T, _, false>(v, lt::<T>);
    }
}

/// Sorts the slice in parallel with a comparator function.
///
/// The comparator is shared across worker threads, so it must be `Fn`,
/// `Send` and `Sync`.
///
/// # Examples
///
/// ```
/// let mut v: Vec<i64> = (0..10_000).collect();
/// ppqsort::par_sort_by(&mut v, |a, b| b.cmp(a));
/// assert!(v.windows(2).all(|w| w[0] >= w[1]));
/// ```
pub fn par_sort_by<T, F>(v: &mut [T], compare: F)
where
    T: Send + Sync,
    F: Fn(&T, &T) -> Ordering + Send + Sync,
{
    if mem::size_of::<T>() == 0 {
        return;
    }
    let is_less = move |a: &T, b: &T| compare(a, b) == Ordering::Less;
    par::par_sort_impl::<T, _, false>(v, is_less);
}

/// [`par_sort`] with the branchless partitioner forced on.
pub fn par_sort_branchless<T: Ord + Send + Sync>(v: &mut [T]) {
    if mem::size_of::<T>() == 0 {
        return;
    }
    par::par_sort_impl::<T, _, true>(v, lt::<T>);
}

/// [`par_sort_by`] with the branchless partitioner forced on.
pub fn par_sort_branchless_by<T, F>(v: &mut [T], compare: F)
where
    T: Send + Sync,
    F: Fn(&T, &T) -> Ordering + Send + Sync,
{
    if mem::size_of::<T>() == 0 {
        return;
    }
    let is_less = move |a: &T, b: &T| compare(a, b) == Ordering::Less;
    par::par_sort_impl::<T, _, true>(v, is_less);
}
