//! Classic Hoare partitioning around a pivot at `v[0]`.

use core::mem::{self, ManuallyDrop};
use core::ptr;

use crate::smallsort::CopyOnDrop;

/// Partitions `v` around the pivot at `v[0]`: elements less than the pivot
/// end up in front of it, all others behind it.
///
/// Returns the pivot's final position and whether the range was already
/// partitioned (no swap was needed).
pub(crate) fn partition_to_right<T, F>(v: &mut [T], is_less: &mut F) -> (usize, bool)
where
    F: FnMut(&T, &T) -> bool,
{
    let len = v.len();
    debug_assert!(len >= 2);

    // SAFETY: `l` and `r` stay within `[1, len]` for any comparator (every
    // scan is bounded by the other cursor), and `r - 1` is only read while
    // `l < r`. The moved-out pivot is restored by the guard even if the
    // comparator panics, so the slice always owns each element exactly once.
    let (mid, already_partitioned) = unsafe {
        let base = v.as_mut_ptr();
        let tmp = ManuallyDrop::new(ptr::read(base));
        let _pivot_guard = CopyOnDrop {
            src: &*tmp,
            dest: base,
        };
        let pivot: &T = &tmp;

        let mut l = 1;
        let mut r = len;

        // Skip the prefix and suffix that are already on the correct side.
        while l < r && is_less(&*base.add(l), pivot) {
            l += 1;
        }
        while l < r && !is_less(&*base.add(r - 1), pivot) {
            r -= 1;
        }
        let already_partitioned = l >= r;

        while l < r {
            r -= 1;
            ptr::swap(base.add(l), base.add(r));
            l += 1;
            while l < r && is_less(&*base.add(l), pivot) {
                l += 1;
            }
            while l < r && !is_less(&*base.add(r - 1), pivot) {
                r -= 1;
            }
        }

        (l - 1, already_partitioned)
        // `_pivot_guard` drops here, writing the pivot value back to `v[0]`.
    };

    v.swap(0, mid);

    debug_assert!(!is_less(&v[mid], &v[0]));
    debug_assert!(mid + 1 == v.len() || !is_less(&v[mid + 1], &v[mid]));
    (mid, already_partitioned)
}

/// Partitions `v` around the pivot at `v[0]` so that elements equivalent to
/// the pivot end up in front of its final position and strictly greater
/// elements behind it. Assumes `v` contains no element less than the pivot.
///
/// Returns the pivot's final position. Used by the drivers to collapse runs
/// of elements equal to an already-placed pivot in linear time.
pub(crate) fn partition_to_left<T, F>(v: &mut [T], is_less: &mut F) -> usize
where
    F: FnMut(&T, &T) -> bool,
{
    let len = v.len();
    debug_assert!(len >= 2);

    // SAFETY: same index bounds and pivot restore reasoning as
    // `partition_to_right`, with the comparisons dualized.
    let mid = unsafe {
        let base = v.as_mut_ptr();
        let tmp = ManuallyDrop::new(ptr::read(base));
        let _pivot_guard = CopyOnDrop {
            src: &*tmp,
            dest: base,
        };
        let pivot: &T = &tmp;

        let mut l = 1;
        let mut r = len;

        while l < r && !is_less(pivot, &*base.add(l)) {
            l += 1;
        }
        while l < r && is_less(pivot, &*base.add(r - 1)) {
            r -= 1;
        }

        while l < r {
            r -= 1;
            ptr::swap(base.add(l), base.add(r));
            l += 1;
            while l < r && !is_less(pivot, &*base.add(l)) {
                l += 1;
            }
            while l < r && is_less(pivot, &*base.add(r - 1)) {
                r -= 1;
            }
        }

        l - 1
    };

    v.swap(0, mid);
    mid
}

/// Sequentially partitions the central dirty segment left behind by the
/// classic parallel partitioner and places the pivot.
///
/// `base` addresses the partitioned range (the pivot slot at index 0);
/// `[first_offset, last_offset]` bounds the unresolved segment: everything in
/// `[1, first_offset)` is already less than the pivot and everything above
/// `last_offset` is already not less.
///
/// Returns the pivot's final position and whether the segment needed no swap.
///
/// # Safety
///
/// `base` must be valid for reads and writes over `last_offset + 1` elements
/// and `1 <= first_offset`, `first_offset - 1 <= last_offset`.
pub(crate) unsafe fn seq_cleanup<T, F>(
    base: *mut T,
    pivot: T,
    is_less: &mut F,
    first_offset: usize,
    last_offset: usize,
) -> (usize, bool)
where
    F: FnMut(&T, &T) -> bool,
{
    let mut l = first_offset;
    let mut r = last_offset + 1;

    // SAFETY: `l` and `r` stay within `[first_offset, last_offset + 1]`, all
    // in bounds per the function contract. The guarded scans maintain
    // `v[1..l] < pivot <= v[r..]`, so placing the pivot at `l - 1` is
    // correct; `l >= 1` throughout. The pivot is parked behind a restore
    // guard while the comparator can still panic.
    unsafe {
        let tmp = ManuallyDrop::new(pivot);
        let pivot_guard = CopyOnDrop {
            src: &*tmp,
            dest: base,
        };
        let pivot: &T = &tmp;

        while l < r && is_less(&*base.add(l), pivot) {
            l += 1;
        }
        while l < r && !is_less(&*base.add(r - 1), pivot) {
            r -= 1;
        }
        let already_partitioned = l >= r;

        while l < r {
            r -= 1;
            ptr::swap(base.add(l), base.add(r));
            l += 1;
            while l < r && is_less(&*base.add(l), pivot) {
                l += 1;
            }
            while l < r && !is_less(&*base.add(r - 1), pivot) {
                r -= 1;
            }
        }

        let mid = l - 1;
        mem::forget(pivot_guard);
        // `copy` rather than `copy_nonoverlapping`: `mid` may be 0.
        ptr::copy(base.add(mid), base, 1);
        ptr::write(base.add(mid), ManuallyDrop::into_inner(tmp));
        (mid, already_partitioned)
    }
}

