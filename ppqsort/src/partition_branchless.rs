//! Branchless partitioning: comparison outcomes are recorded into small
//! offset buffers, then the flagged elements are exchanged in bulk. The hot
//! loops contain no data-dependent branches, which avoids the mispredictions
//! a classic Hoare scan pays on random data.
//!
//! The scheme follows the BlockQuicksort idea: trace a block from each side,
//! note the out-of-place positions, swap the noted pairs.

use core::mem::{self, ManuallyDrop, MaybeUninit};
use core::ptr;

use crate::params::{BLOCK_SIZE_BRANCHLESS as BLOCK, CACHELINE_SIZE};
use crate::smallsort::CopyOnDrop;

/// One cache-line aligned offset buffer; element `k` holds the in-block
/// index of the `k`-th element that belongs on the other side.
#[repr(align(64))]
pub(crate) struct OffsetBuffer([MaybeUninit<u16>; BLOCK]);

const _: () = assert!(mem::align_of::<OffsetBuffer>() == CACHELINE_SIZE);

impl OffsetBuffer {
    #[inline]
    pub(crate) fn new() -> Self {
        Self([MaybeUninit::uninit(); BLOCK])
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u16 {
        self.0.as_mut_ptr().cast()
    }
}

/// Walks `block_len` elements upward from `*it`, recording the in-block index
/// of every element not less than the pivot. The count advances by the
/// comparison result itself, so the write is data-independent.
///
/// # Safety
///
/// `*it` must be valid for reads over `block_len` elements upward, `offsets`
/// for writes over `BLOCK` entries, and `*count + block_len <= BLOCK`.
pub(crate) unsafe fn populate_block_left<T, F>(
    it: &mut *mut T,
    pivot: &T,
    offsets: *mut u16,
    count: &mut usize,
    is_less: &mut F,
    block_len: usize,
) where
    F: FnMut(&T, &T) -> bool,
{
    // SAFETY: per contract; `*count` grows by at most one per element, so
    // the offset write stays within the buffer.
    unsafe {
        for i in 0..block_len {
            *offsets.add(*count) = i as u16;
            *count += !is_less(&**it, pivot) as usize;
            *it = it.add(1);
        }
    }
}

/// Mirror of [`populate_block_left`]: walks downward from `*it`, recording
/// elements that are less than the pivot.
///
/// # Safety
///
/// `*it` must be valid for reads over `block_len` elements downward,
/// `offsets` for writes over `BLOCK` entries, and `*count + block_len <=
/// BLOCK`.
pub(crate) unsafe fn populate_block_right<T, F>(
    it: &mut *mut T,
    pivot: &T,
    offsets: *mut u16,
    count: &mut usize,
    is_less: &mut F,
    block_len: usize,
) where
    F: FnMut(&T, &T) -> bool,
{
    // SAFETY: as in `populate_block_left`.
    unsafe {
        for i in 0..block_len {
            *offsets.add(*count) = i as u16;
            *count += is_less(&**it, pivot) as usize;
            *it = it.sub(1);
        }
    }
}

/// Exchanges `min(num_l, num_r)` flagged elements between the block at
/// `first` (offsets added) and the block ending at `last` (offsets
/// subtracted); returns how many were exchanged.
///
/// Equal counts force plain pairwise swaps; this is what keeps descending
/// distributions correct, where every cycle would otherwise degenerate.
/// Unequal counts use a cyclic permutation: one temporary, two moves per
/// element.
///
/// # Safety
///
/// The first `min(num_l, num_r)` entries of both offset buffers must flag
/// distinct in-bounds elements of the two (disjoint) blocks.
pub(crate) unsafe fn swap_offsets<T>(
    first: *mut T,
    last: *mut T,
    offsets_l: *const u16,
    offsets_r: *const u16,
    num_l: usize,
    num_r: usize,
) -> usize {
    let num = num_l.min(num_r);
    if num == 0 {
        return 0;
    }

    // SAFETY: all reads and writes go through flagged positions, which are
    // distinct per contract; the cyclic permutation moves every touched
    // element exactly once and runs no user code, so no value is lost even
    // partway through.
    unsafe {
        if num_l == num_r {
            for i in 0..num {
                ptr::swap(
                    first.add(*offsets_l.add(i) as usize),
                    last.sub(*offsets_r.add(i) as usize),
                );
            }
        } else {
            let mut left = first.add(*offsets_l as usize);
            let mut right = last.sub(*offsets_r as usize);
            let tmp = ManuallyDrop::new(ptr::read(left));
            ptr::copy_nonoverlapping(right, left, 1);
            for i in 1..num {
                left = first.add(*offsets_l.add(i) as usize);
                ptr::copy_nonoverlapping(left, right, 1);
                right = last.sub(*offsets_r.add(i) as usize);
                ptr::copy_nonoverlapping(right, left, 1);
            }
            ptr::copy_nonoverlapping(&*tmp, right, 1);
        }
    }
    num
}

/// Partitions the all-unknown inclusive region `[*first, *last]` around the
/// pivot. On return `*first` is the partition boundary: everything below it
/// is less than the pivot, everything from it on is not.
///
/// # Safety
///
/// `*first` and `*last` must point into one allocation with `*first` at
/// least one element above its start (the pivot slot), and every position of
/// `[*first - 1, *last + 1]` must be valid for reads and writes.
pub(crate) unsafe fn partition_branchless_core<T, F>(
    first: &mut *mut T,
    last: &mut *mut T,
    pivot: &T,
    is_less: &mut F,
) where
    F: FnMut(&T, &T) -> bool,
{
    let mut offsets_l = OffsetBuffer::new();
    let mut offsets_r = OffsetBuffer::new();
    let ol = offsets_l.as_mut_ptr();
    let or = offsets_r.as_mut_ptr();

    let mut block_l = *first;
    let mut block_r = *last;
    let mut count_l = 0usize;
    let mut count_r = 0usize;
    let mut start_l = 0usize;
    let mut start_r = 0usize;

    // SAFETY: the populate calls consume at most `last - first + 1` elements
    // per side, so the cursors stay within the allocation (the right cursor
    // may rest one element below `*first`, which is still at or above the
    // pivot slot). Offset buffers never hold more than BLOCK entries.
    unsafe {
        // Full blocks while at least two of them remain.
        let mut size = (*last).offset_from(*first) + 1;
        while size >= 2 * BLOCK as isize {
            if count_l == 0 {
                start_l = 0;
                block_l = *first;
                populate_block_left(first, pivot, ol, &mut count_l, is_less, BLOCK);
                size = (*last).offset_from(*first) + 1;
            }
            if count_r == 0 {
                start_r = 0;
                block_r = *last;
                populate_block_right(last, pivot, or, &mut count_r, is_less, BLOCK);
                size = (*last).offset_from(*first) + 1;
            }
            let swapped = swap_offsets(
                block_l,
                block_r,
                ol.add(start_l),
                or.add(start_r),
                count_l,
                count_r,
            );
            count_l -= swapped;
            count_r -= swapped;
            start_l += swapped;
            start_r += swapped;
        }

        // Partial blocks sized to what remains.
        let mut size = (*last).offset_from(*first) + 1;
        while *first <= *last {
            if count_l == 0 {
                start_l = 0;
                block_l = *first;
                let l_size = if size > BLOCK as isize { BLOCK } else { size as usize };
                populate_block_left(first, pivot, ol, &mut count_l, is_less, l_size);
                size = (*last).offset_from(*first) + 1;
            }
            if count_r == 0 {
                start_r = 0;
                block_r = *last;
                let r_size = if size > BLOCK as isize { BLOCK } else { size as usize };
                populate_block_right(last, pivot, or, &mut count_r, is_less, r_size);
                size = (*last).offset_from(*first) + 1;
            }
            let swapped = swap_offsets(
                block_l,
                block_r,
                ol.add(start_l),
                or.add(start_r),
                count_l,
                count_r,
            );
            count_l -= swapped;
            count_r -= swapped;
            start_l += swapped;
            start_r += swapped;
        }

        // At most one block is left half-drained; shift its flagged elements
        // to its own side's boundary.
        if count_l > 0 {
            let residue = ol.add(start_l);
            while count_l > 0 {
                count_l -= 1;
                ptr::swap(block_l.add(*residue.add(count_l) as usize), *last);
                *last = last.sub(1);
            }
            *first = (*last).add(1);
        }
        if count_r > 0 {
            let residue = or.add(start_r);
            while count_r > 0 {
                count_r -= 1;
                ptr::swap(block_r.sub(*residue.add(count_r) as usize), *first);
                *first = first.add(1);
            }
        }
    }
}

/// Branchless counterpart of
/// [`partition_to_right`](crate::partition::partition_to_right): same
/// contract, offset-buffer core.
pub(crate) fn partition_right_branchless<T, F>(v: &mut [T], is_less: &mut F) -> (usize, bool)
where
    F: FnMut(&T, &T) -> bool,
{
    let len = v.len();
    debug_assert!(len >= 2);

    // SAFETY: the guarded scans keep `l` and `r` within `[1, len]` for any
    // comparator. When they find an out-of-place pair, `r >= l + 2`, so the
    // region handed to the core sits in `[l + 1, r - 2]` and satisfies its
    // contract (one element of margin on both sides). Pivot restore on panic
    // via the guard.
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

        while l < r && is_less(&*base.add(l), pivot) {
            l += 1;
        }
        while l < r && !is_less(&*base.add(r - 1), pivot) {
            r -= 1;
        }
        let already_partitioned = l >= r;

        let boundary = if already_partitioned {
            l
        } else {
            // Swap the found pair by hand, then resolve the strictly inner
            // region through the offset buffers.
            ptr::swap(base.add(l), base.add(r - 1));
            let mut first = base.add(l + 1);
            let mut last = base.add(r - 2);
            partition_branchless_core(&mut first, &mut last, pivot, is_less);
            first.offset_from(base) as usize
        };

        (boundary - 1, already_partitioned)
    };

    v.swap(0, mid);

    debug_assert!(!is_less(&v[mid], &v[0]));
    debug_assert!(mid + 1 == v.len() || !is_less(&v[mid + 1], &v[mid]));
    (mid, already_partitioned)
}

/// Branchless counterpart of [`seq_cleanup`](crate::partition::seq_cleanup):
/// resolves the central dirty segment of a branchless parallel partition and
/// places the pivot.
///
/// # Safety
///
/// Same contract as `seq_cleanup`.
pub(crate) unsafe fn seq_cleanup_branchless<T, F>(
    base: *mut T,
    pivot: T,
    is_less: &mut F,
    first_offset: usize,
    last_offset: usize,
) -> (usize, bool)
where
    F: FnMut(&T, &T) -> bool,
{
    // SAFETY: the guarded scans stay within `[first_offset - 1, last_offset
    // + 1]`; the elements bounding that window are clean (left side less
    // than the pivot, right side not less), so the boundary `first` ends on
    // satisfies the placement invariant. The pivot is parked behind a
    // restore guard while the comparator can still panic.
    unsafe {
        let tmp = ManuallyDrop::new(pivot);
        let pivot_guard = CopyOnDrop {
            src: &*tmp,
            dest: base,
        };
        let pivot: &T = &tmp;

        let mut first = base.add(first_offset - 1);
        let mut last = base.add(last_offset + 1);

        while first < last {
            first = first.add(1);
            if !is_less(&*first, pivot) {
                break;
            }
        }
        while first < last {
            last = last.sub(1);
            if is_less(&*last, pivot) {
                break;
            }
        }

        let already_partitioned = first >= last;
        if !already_partitioned {
            partition_branchless_core(&mut first, &mut last, pivot, is_less);
        }

        let mid = first.offset_from(base) as usize - 1;
        mem::forget(pivot_guard);
        ptr::copy(base.add(mid), base, 1);
        ptr::write(base.add(mid), ManuallyDrop::into_inner(tmp));
        (mid, already_partitioned)
    }
}
