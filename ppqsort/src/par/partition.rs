//! Cooperative classic partitioning: workers atomically claim disjoint
//! blocks of the array, Hoare-partition inside them around one shared pivot,
//! then repair the blocks they left unfinished in a barrier-ordered
//! three-phase pass (count dirty blocks, reserve slots, swap).

use core::mem::{self, ManuallyDrop};
use core::ptr;
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicUsize, Ordering};
use std::sync::Barrier;

use super::pool::{Latch, ThreadPool};
use super::SliceParts;
use crate::params::BLOCK_SIZE_CLASSIC;
use crate::partition::{partition_to_right, seq_cleanup};
use crate::smallsort::CopyOnDrop;

/// Shared state of one parallel partition call. All workers hold it by
/// reference; its final values are read by the initiator after the latch.
pub(super) struct PartitionState {
    /// Leftmost interior position not yet claimed by a left block.
    first_offset: AtomicUsize,
    /// Rightmost interior position not yet claimed by a right block.
    last_offset: AtomicUsize,
    /// Unclaimed interior elements; claims drive it negative before rolling
    /// back, so it is signed.
    distance: AtomicIsize,
    dirty_blocks_left: AtomicUsize,
    dirty_blocks_right: AtomicUsize,
    reserved_left: Box<[AtomicBool]>,
    reserved_right: Box<[AtomicBool]>,
    already_partitioned: AtomicBool,
    barrier: Barrier,
}

impl PartitionState {
    /// Pre-assigns the first block on each side to every worker; the claim
    /// counters cover only what remains between them.
    pub(super) fn new(size: usize, block_size: usize, threads: usize) -> Self {
        debug_assert!(size - 1 >= 2 * block_size * threads);
        Self {
            first_offset: AtomicUsize::new(1 + block_size * threads),
            last_offset: AtomicUsize::new(size - 1 - block_size * threads),
            distance: AtomicIsize::new((size - 1 - 2 * block_size * threads) as isize),
            dirty_blocks_left: AtomicUsize::new(0),
            dirty_blocks_right: AtomicUsize::new(0),
            reserved_left: (0..threads).map(|_| AtomicBool::new(false)).collect(),
            reserved_right: (0..threads).map(|_| AtomicBool::new(false)).collect(),
            already_partitioned: AtomicBool::new(true),
            barrier: Barrier::new(threads),
        }
    }

    pub(super) fn first_offset(&self) -> usize {
        self.first_offset.load(Ordering::Acquire)
    }

    pub(super) fn last_offset(&self) -> usize {
        self.last_offset.load(Ordering::Acquire)
    }

    pub(super) fn already_partitioned(&self) -> bool {
        self.already_partitioned.load(Ordering::Acquire)
    }

    pub(super) fn merge_already_partitioned(&self, local: bool) {
        self.already_partitioned.fetch_and(local, Ordering::Release);
    }
}

/// Claims the next block on one side. Returns the claim's scan start and its
/// inclusive bound, or `None` once the interior is exhausted.
///
/// A successful claim happens-before any access to the block by any worker:
/// the offset `fetch_add`/`fetch_sub` hands each claimant a disjoint range.
pub(super) fn get_new_block<const LEFT: bool>(
    state: &PartitionState,
    block_size: usize,
) -> Option<(usize, usize)> {
    let remaining = state
        .distance
        .fetch_sub(block_size as isize, Ordering::AcqRel);
    if remaining < block_size as isize {
        // Not enough elements for a full block; undo the claim and leave
        // the rest to the repair phase and sequential cleanup.
        state.distance.fetch_add(block_size as isize, Ordering::AcqRel);
        return None;
    }
    if LEFT {
        let it = state.first_offset.fetch_add(block_size, Ordering::AcqRel);
        Some((it, it + (block_size - 1)))
    } else {
        let it = state.last_offset.fetch_sub(block_size, Ordering::AcqRel);
        Some((it, it - (block_size - 1)))
    }
}

/// Swaps this worker's dirty block out of a clean segment into a reserved
/// slot of the dirty segment.
///
/// # Safety
///
/// Must only run in the repair phase between the second barrier and the
/// latch; the reservation CAS makes the chosen slot exclusive to this
/// worker, so the two block ranges are disjoint and unshared.
unsafe fn swap_block<T, const LEFT: bool>(
    base: SliceParts<T>,
    state: &PartitionState,
    block_size: usize,
    t_old: usize,
    t_bound: usize,
) {
    let (dirty_count, reserved) = if LEFT {
        (
            state.dirty_blocks_left.load(Ordering::Acquire),
            &state.reserved_left,
        )
    } else {
        (
            state.dirty_blocks_right.load(Ordering::Acquire),
            &state.reserved_right,
        )
    };

    for i in 0..dirty_count {
        let free = !reserved[i].load(Ordering::Acquire)
            && reserved[i]
                .compare_exchange(false, true, Ordering::Release, Ordering::Relaxed)
                .is_ok();
        if free {
            let swap_start = if LEFT {
                t_old - (i + 1) * block_size
            } else {
                t_old + i * block_size + 1
            };
            let block_start = if LEFT { t_bound + 1 - block_size } else { t_bound };
            // SAFETY: both ranges lie inside the partitioned range; the
            // dirty block is ours, the slot is reserved to us, and one is in
            // a clean segment while the other is in the dirty segment, so
            // they cannot overlap.
            unsafe {
                ptr::swap_nonoverlapping(
                    base.ptr.add(block_start),
                    base.ptr.add(swap_start),
                    block_size,
                );
            }
            return;
        }
    }
    // There are as many slots as dirty blocks per side, and blocks already
    // inside the dirty segment reserved their own in the previous phase.
    unreachable!("no free slot for a dirty block");
}

/// The repair pass every worker runs after its claim loop: count dirty
/// blocks, compute the clean bounds, reserve slots for dirty blocks already
/// inside the dirty segment, swap the others in. The two barrier waits keep
/// the three phases totally ordered; skipping one corrupts the array on
/// rare interleavings.
///
/// # Safety
///
/// `base` must cover the partitioned range and the `t_*` positions must
/// describe this worker's final blocks.
pub(super) unsafe fn swap_dirty_blocks<T>(
    base: SliceParts<T>,
    state: &PartitionState,
    block_size: usize,
    my_id: usize,
    t_left: usize,
    t_right: usize,
    t_left_end: usize,
    t_right_start: usize,
) {
    let dirty_left = t_left <= t_left_end;
    let dirty_right = t_right >= t_right_start;

    if dirty_left {
        state.dirty_blocks_left.fetch_add(1, Ordering::Relaxed);
    }
    if dirty_right {
        state.dirty_blocks_right.fetch_add(1, Ordering::Relaxed);
    }

    state.barrier.wait();

    let first_old = state.first_offset.load(Ordering::Acquire);
    let last_old = state.last_offset.load(Ordering::Acquire);
    let first_clean =
        first_old - state.dirty_blocks_left.load(Ordering::Acquire) * block_size;
    let last_clean =
        last_old + state.dirty_blocks_right.load(Ordering::Acquire) * block_size;

    // A dirty block that already lies in what becomes the dirty segment
    // keeps its place; everything else competes for the remaining slots.
    if dirty_left && t_left_end >= first_clean {
        state.reserved_left[(first_old - (t_left_end + 1)) / block_size]
            .store(true, Ordering::Release);
    }
    if dirty_right && t_right_start <= last_clean {
        state.reserved_right[(t_right_start - 1 - last_old) / block_size]
            .store(true, Ordering::Release);
    }

    state.barrier.wait();

    // SAFETY: forwarded from the caller; phase ordering per the barriers.
    unsafe {
        if dirty_left && t_left_end < first_clean {
            swap_block::<T, true>(base, state, block_size, first_old, t_left_end);
        }
        if dirty_right && t_right_start > last_clean {
            swap_block::<T, false>(base, state, block_size, last_old, t_right_start);
        }
    }

    if my_id == 0 {
        state.first_offset.store(first_clean, Ordering::Release);
        state.last_offset.store(last_clean, Ordering::Release);
    }
}

/// One worker's claim loop: guarded Hoare scans inside the current blocks,
/// swaps across the middle, new blocks on exhaustion.
///
/// # Safety
///
/// `base` must cover `size` elements with the pivot slot at index 0;
/// `my_id` must be unique among the partition's workers and `state` sized
/// for all of them.
unsafe fn process_blocks<T, F>(
    base: SliceParts<T>,
    is_less: &F,
    size: usize,
    state: &PartitionState,
    block_size: usize,
    pivot: &T,
    my_id: usize,
) where
    F: Fn(&T, &T) -> bool,
{
    // Each worker starts on its statically pre-assigned pair of blocks.
    let mut t_left = block_size * my_id + 1;
    let mut t_right = (size - 1) - block_size * my_id;
    let mut t_left_end = t_left + block_size - 1;
    let mut t_right_start = t_right - block_size + 1;
    let mut t_already_partitioned = true;

    let v = base.ptr;

    // SAFETY: all positions stay within the claimed blocks, which lie in
    // `[1, size - 1]`; claims are disjoint between workers, so every element
    // is touched by at most one worker at a time.
    unsafe {
        loop {
            if t_left > t_left_end {
                match get_new_block::<true>(state, block_size) {
                    Some((it, bound)) => {
                        t_left = it;
                        t_left_end = bound;
                    }
                    None => break,
                }
            }
            if t_right < t_right_start {
                match get_new_block::<false>(state, block_size) {
                    Some((it, bound)) => {
                        t_right = it;
                        t_right_start = bound;
                    }
                    None => break,
                }
            }

            // Nothing is guaranteed inside a block, so both scans are
            // guarded by the block bounds.
            while t_left <= t_left_end && is_less(&*v.add(t_left), pivot) {
                t_left += 1;
            }
            while t_right >= t_right_start && !is_less(&*v.add(t_right), pivot) {
                t_right -= 1;
            }

            while t_left < t_right {
                if t_left > t_left_end || t_right < t_right_start {
                    break;
                }
                ptr::swap(v.add(t_left), v.add(t_right));
                t_already_partitioned = false;
                loop {
                    t_left += 1;
                    if t_left > t_left_end || !is_less(&*v.add(t_left), pivot) {
                        break;
                    }
                }
                loop {
                    t_right -= 1;
                    if t_right < t_right_start || is_less(&*v.add(t_right), pivot) {
                        break;
                    }
                }
            }
        }

        state.merge_already_partitioned(t_already_partitioned);

        swap_dirty_blocks(
            base,
            state,
            block_size,
            my_id,
            t_left,
            t_right,
            t_left_end,
            t_right_start,
        );
    }
}

/// Cooperatively partitions `v` around the pivot at `v[0]` using
/// `thread_count` workers; same contract as
/// [`partition_to_right`](crate::partition::partition_to_right).
///
/// The calling thread participates as worker 0 and the remaining workers run
/// as pool tasks, so each active partition consumes exactly its thread
/// budget. Falls back to the sequential partitioner when the range cannot
/// give every worker two full blocks.
pub(crate) fn partition_to_right_par<T, F>(
    v: &mut [T],
    is_less: &F,
    thread_count: usize,
    pool: &ThreadPool,
) -> (usize, bool)
where
    T: Send + Sync,
    F: Fn(&T, &T) -> bool + Send + Sync,
{
    let block_size = BLOCK_SIZE_CLASSIC;
    let size = v.len();

    if size.saturating_sub(1) < 2 * block_size * thread_count {
        return partition_to_right(v, &mut |a, b| is_less(a, b));
    }

    // SAFETY: the pivot is moved out for the whole call and restored by the
    // guard if anything below unwinds before the cleanup places it. Workers
    // only touch disjoint claimed blocks of `v`; the latch makes all their
    // writes visible before the cleanup reads the final offsets.
    let (mid, already_partitioned) = unsafe {
        let base = SliceParts::new(v);
        let tmp = ManuallyDrop::new(ptr::read(base.ptr));
        let pivot_guard = CopyOnDrop {
            src: &*tmp,
            dest: base.ptr,
        };
        let pivot: &T = &tmp;

        let state = PartitionState::new(size, block_size, thread_count);
        let latch = Latch::new(thread_count);

        {
            let state = &state;
            let latch = &latch;
            for id in 1..thread_count {
                // SAFETY: the latch wait below returns only after every
                // worker task ran to completion, so the erased borrows
                // outlive the tasks; blocks are exclusive per the claim
                // protocol.
                pool.push_task_erased(Box::new(move || unsafe {
                    process_blocks(base, is_less, size, state, block_size, pivot, id);
                    latch.count_down();
                }));
            }
        }
        process_blocks(base, is_less, size, &state, block_size, pivot, 0);
        latch.count_down();
        latch.wait();

        let first_offset = state.first_offset();
        let last_offset = state.last_offset();
        let already_partitioned = state.already_partitioned();

        mem::forget(pivot_guard);
        let pivot = ManuallyDrop::into_inner(tmp);
        let (mid, cleanup_already_partitioned) = seq_cleanup(
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
