//! Cooperative branchless partitioning: the block-claim protocol of the
//! classic parallel partitioner, with each worker resolving its blocks
//! through offset buffers instead of Hoare scans.

use core::mem::{self, ManuallyDrop};
use core::ptr;
use std::thread;

use super::partition::{get_new_block, swap_dirty_blocks, PartitionState};
use super::SliceParts;
use crate::params::BLOCK_SIZE_BRANCHLESS;
use crate::partition_branchless::{
    partition_right_branchless, populate_block_left, populate_block_right,
    seq_cleanup_branchless, swap_offsets, OffsetBuffer,
};
use crate::smallsort::CopyOnDrop;

/// Takes ownership of a freshly claimed left block: skips the elements
/// already in place, then records the rest into the offset buffer. Leaves
/// `*t_left` one past the block and `*t_left_start` at the recording base.
///
/// # Safety
///
/// The block `[*t_left, t_left_end]` must be in bounds and exclusively
/// owned by this worker; `offsets` must have room for the block.
unsafe fn solve_left_block<T, F>(
    v: *mut T,
    t_left: &mut usize,
    t_left_start: &mut usize,
    t_left_end: usize,
    offsets: *mut u16,
    count: &mut usize,
    pivot: &T,
    is_less: &mut F,
) where
    F: FnMut(&T, &T) -> bool,
{
    // SAFETY: per contract; the scan and the populate together consume
    // exactly the block.
    unsafe {
        while *t_left <= t_left_end && is_less(&*v.add(*t_left), pivot) {
            *t_left += 1;
        }
        let remaining = t_left_end + 1 - *t_left;
        *t_left_start = *t_left;
        let mut cursor = v.add(*t_left);
        populate_block_left(&mut cursor, pivot, offsets, count, is_less, remaining);
        *t_left = t_left_end + 1;
    }
}

/// Mirror of [`solve_left_block`] for a right block; leaves `*t_right` one
/// below the block and `*t_right_end` at the recording base.
///
/// # Safety
///
/// As for `solve_left_block`, with the block `[t_right_start, *t_right]`.
unsafe fn solve_right_block<T, F>(
    v: *mut T,
    t_right: &mut usize,
    t_right_start: usize,
    t_right_end: &mut usize,
    offsets: *mut u16,
    count: &mut usize,
    pivot: &T,
    is_less: &mut F,
) where
    F: FnMut(&T, &T) -> bool,
{
    // SAFETY: per contract.
    unsafe {
        while *t_right >= t_right_start && !is_less(&*v.add(*t_right), pivot) {
            *t_right -= 1;
        }
        let remaining = (*t_right + 1) - t_right_start;
        *t_right_end = *t_right;
        let mut cursor = v.add(*t_right);
        populate_block_right(&mut cursor, pivot, offsets, count, is_less, remaining);
        *t_right = t_right_start - 1;
    }
}

/// One worker's claim loop in the branchless variant. The final pair of
/// blocks is always handed to the repair phase: leftover offsets mean mixed
/// content, and accounting whole blocks keeps the slot arithmetic uniform.
///
/// # Safety
///
/// As for the classic `process_blocks`: `base` covers `size` elements with
/// the pivot slot at index 0, `my_id` unique, `state` sized for all workers.
unsafe fn process_blocks_branchless<T, F>(
    base: SliceParts<T>,
    is_less: &F,
    size: usize,
    state: &PartitionState,
    pivot: &T,
    my_id: usize,
) where
    F: Fn(&T, &T) -> bool,
{
    let block_size = BLOCK_SIZE_BRANCHLESS;
    let v = base.ptr;
    let mut less = |a: &T, b: &T| is_less(a, b);

    let mut t_left = block_size * my_id + 1;
    let mut t_right = (size - 1) - block_size * my_id;
    let mut t_left_start = t_left;
    let mut t_left_end = t_left + block_size - 1;
    let mut t_right_start = t_right - block_size + 1;
    let mut t_right_end = t_right;
    let mut t_already_partitioned = true;

    let mut offsets_l = OffsetBuffer::new();
    let mut offsets_r = OffsetBuffer::new();
    let ol = offsets_l.as_mut_ptr();
    let or = offsets_r.as_mut_ptr();
    let mut count_l = 0usize;
    let mut count_r = 0usize;
    let mut start_l = 0usize;
    let mut start_r = 0usize;

    // SAFETY: blocks are disjoint between workers (static pre-assignment
    // plus the claim protocol), and all recorded offsets stay inside the
    // owning block.
    unsafe {
        // The statically pre-assigned pair first.
        solve_left_block(
            v,
            &mut t_left,
            &mut t_left_start,
            t_left_end,
            ol,
            &mut count_l,
            pivot,
            &mut less,
        );
        solve_right_block(
            v,
            &mut t_right,
            t_right_start,
            &mut t_right_end,
            or,
            &mut count_r,
            pivot,
            &mut less,
        );
        let swapped = swap_offsets(
            v.add(t_left_start),
            v.add(t_right_end),
            ol.add(start_l),
            or.add(start_r),
            count_l,
            count_r,
        );
        if swapped > 0 {
            t_already_partitioned = false;
        }
        count_l -= swapped;
        start_l += swapped;
        count_r -= swapped;
        start_r += swapped;

        loop {
            if count_l == 0 {
                start_l = 0;
                match get_new_block::<true>(state, block_size) {
                    Some((it, bound)) => {
                        t_left = it;
                        t_left_end = bound;
                        solve_left_block(
                            v,
                            &mut t_left,
                            &mut t_left_start,
                            t_left_end,
                            ol,
                            &mut count_l,
                            pivot,
                            &mut less,
                        );
                    }
                    None => break,
                }
            }
            if count_r == 0 {
                start_r = 0;
                match get_new_block::<false>(state, block_size) {
                    Some((it, bound)) => {
                        t_right = it;
                        t_right_start = bound;
                        solve_right_block(
                            v,
                            &mut t_right,
                            t_right_start,
                            &mut t_right_end,
                            or,
                            &mut count_r,
                            pivot,
                            &mut less,
                        );
                    }
                    None => break,
                }
            }

            let swapped = swap_offsets(
                v.add(t_left_start),
                v.add(t_right_end),
                ol.add(start_l),
                or.add(start_r),
                count_l,
                count_r,
            );
            if swapped > 0 {
                t_already_partitioned = false;
            }
            count_l -= swapped;
            start_l += swapped;
            count_r -= swapped;
            start_r += swapped;
        }

        state.merge_already_partitioned(t_already_partitioned);

        // Unresolved offsets sit somewhere inside the final blocks, so both
        // blocks go to the repair phase wholesale.
        let t_left_final = t_left_end - count_l;
        let t_right_final = t_right_start + count_r;
        swap_dirty_blocks(
            base,
            state,
            block_size,
            my_id,
            t_left_final,
            t_right_final,
            t_left_end,
            t_right_start,
        );
    }
}

/// Branchless counterpart of
/// [`partition_to_right_par`](super::partition::partition_to_right_par):
/// same claim-and-repair protocol, offset-buffer workers on scoped threads,
/// the caller participating as worker 0.
pub(crate) fn partition_right_branchless_par<T, F>(
    v: &mut [T],
    is_less: &F,
    thread_count: usize,
) -> (usize, bool)
where
    T: Send + Sync,
    F: Fn(&T, &T) -> bool + Send + Sync,
{
    let block_size = BLOCK_SIZE_BRANCHLESS;
    let size = v.len();

    if size.saturating_sub(1) < 2 * block_size * thread_count {
        return partition_right_branchless(v, &mut |a, b| is_less(a, b));
    }

    // SAFETY: as in the classic parallel partitioner; the thread scope joins
    // every worker before the cleanup reads the final offsets.
    let (mid, already_partitioned) = unsafe {
        let base = SliceParts::new(v);
        let tmp = ManuallyDrop::new(ptr::read(base.ptr));
        let pivot_guard = CopyOnDrop {
            src: &*tmp,
            dest: base.ptr,
        };
        let pivot: &T = &tmp;

        let state = PartitionState::new(size, block_size, thread_count);

        thread::scope(|s| {
            let state = &state;
            for id in 1..thread_count {
                s.spawn(move || {
                    // SAFETY: forwarded from the enclosing block; the scope
                    // guarantees the borrows outlive the worker.
                    unsafe {
                        process_blocks_branchless(base, is_less, size, state, pivot, id);
                    }
                });
            }
            // SAFETY: as above, with this thread as worker 0.
            unsafe {
                process_blocks_branchless(base, is_less, size, state, pivot, 0);
            }
        });

        let first_offset = state.first_offset();
        let last_offset = state.last_offset();
        let already_partitioned = state.already_partitioned();

        mem::forget(pivot_guard);
        let pivot = ManuallyDrop::into_inner(tmp);
        let (mid, cleanup_already_partitioned) = seq_cleanup_branchless(
            base.ptr,
            pivot,
            &mut |a, b| is_less(a, b),
            first_offset,
            last_offset,
        );
        (mid, already_partitioned && cleanup_already_partitioned)
    };

    debug_assert!(!is_less(&v[mid], &v[0]));
    debug_assert!(mid + 1 == v.len() || !is_less(&v[mid + 1], &v[mid]));
    (mid, already_partitioned)
}
