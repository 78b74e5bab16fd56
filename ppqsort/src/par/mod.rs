//! Parallel sorting: the task-recursive driver, the cooperative
//! partitioners and the work-stealing pool that carries them.

pub(crate) mod partition;
pub(crate) mod partition_branchless;
pub(crate) mod pool;
pub(crate) mod task_stack;

use core::slice;

use self::partition::partition_to_right_par;
use self::partition_branchless::partition_right_branchless_par;
use self::pool::ThreadPool;
use crate::heap::heapsort;
use crate::params::{self, PARTITION_RATIO, PAR_THR_DIV};
use crate::partition::partition_to_left;
use crate::pivot::choose_pivot;
use crate::seq::{deterministic_shuffle, seq_loop};
use crate::smallsort::{partial_insertion_sort, partial_insertion_sort_unguarded};

/// Raw parts of a subrange, so tasks and partition workers can carry it
/// across threads. Reconstructed into a slice by exactly one owner at a
/// time.
pub(crate) struct SliceParts<T> {
    pub ptr: *mut T,
    pub len: usize,
}

impl<T> SliceParts<T> {
    fn new(v: &mut [T]) -> Self {
        Self {
            ptr: v.as_mut_ptr(),
            len: v.len(),
        }
    }

    /// # Safety
    ///
    /// The caller must be the range's only owner for `'a`.
    unsafe fn into_slice<'a>(self) -> &'a mut [T] {
        // SAFETY: per contract; `ptr`/`len` came from a live slice.
        unsafe { slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

impl<T> Clone for SliceParts<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for SliceParts<T> {}

// SAFETY: a `SliceParts` is a borrow-by-agreement of `[T]`; moving it to
// another thread moves access to the elements, exactly like `&mut [T]`.
unsafe impl<T: Send> Send for SliceParts<T> {}
// SAFETY: sharing it only shares `&T` reads until someone asserts unique
// ownership via `into_slice`.
unsafe impl<T: Sync> Sync for SliceParts<T> {}

/// The parallel driver loop. Parallel-partitions with the current thread
/// budget, halves the budget, ships the smaller side to the pool and keeps
/// iterating on the larger one; small ranges and exhausted budgets drop to
/// the sequential loop. Sentinel convention as in
/// [`seq_loop`](crate::seq::seq_loop).
///
/// # Safety
///
/// `parts` must be exclusively owned by this call, and every borrow it and
/// `is_less`/`pool` carry must stay alive until the pool drains.
unsafe fn par_loop<T, F, const BRANCHLESS: bool>(
    parts: SliceParts<T>,
    is_less: &F,
    mut bad_allowed: u32,
    seq_thr: usize,
    mut threads: usize,
    pool: &ThreadPool,
    mut leftmost: bool,
) where
    T: Send + Sync,
    F: Fn(&T, &T) -> bool + Send + Sync,
{
    let ins_thr = params::insertion_threshold(BRANCHLESS);
    // SAFETY: exclusive ownership per contract; subranges handed to tasks
    // below are split off disjointly.
    let mut v: &mut [T] = unsafe { parts.into_slice() };

    loop {
        let base = usize::from(!leftmost);
        let size = v.len() - base;

        if threads < 2 || size < seq_thr {
            return seq_loop::<T, _, BRANCHLESS>(
                v,
                &mut |a, b| is_less(a, b),
                bad_allowed,
                leftmost,
            );
        }

        choose_pivot::<T, _, BRANCHLESS>(&mut v[base..], &mut |a, b| is_less(a, b));

        // Equal-pivot shortcut, as in the sequential loop.
        if !leftmost && !is_less(&v[0], &v[1]) {
            let mid = partition_to_left(&mut v[1..], &mut |a, b| is_less(a, b));
            let (_, rest) = v.split_at_mut(1 + mid);
            v = rest;
            continue;
        }

        let (mid, already_partitioned) = if BRANCHLESS {
            partition_right_branchless_par(&mut v[base..], is_less, threads)
        } else {
            partition_to_right_par(&mut v[base..], is_less, threads, pool)
        };
        let pivot_abs = base + mid;
        let l_size = mid;
        let r_size = v.len() - pivot_abs - 1;

        if already_partitioned {
            let mut left_done = false;
            let mut right_done = false;
            if l_size > ins_thr {
                left_done =
                    partial_insertion_sort(&mut v[base..pivot_abs], &mut |a, b| is_less(a, b));
            }
            if r_size > ins_thr {
                right_done = partial_insertion_sort_unguarded(&mut v[pivot_abs..], &mut |a, b| {
                    is_less(a, b)
                });
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
                return heapsort(&mut v[base..], &mut |a, b| is_less(a, b));
            }
            deterministic_shuffle(&mut v[base..], l_size, r_size, mid, ins_thr);
        }

        // Halve the budget, ship the smaller side, keep the larger one.
        threads >>= 1;
        if l_size < r_size {
            let (left, right) = v.split_at_mut(pivot_abs);
            let sub = SliceParts::new(left);
            let sub_leftmost = leftmost;
            let sub_threads = threads;
            // SAFETY: `left` is split off and never touched again here; the
            // top-level entry drains the pool before any borrow ends.
            unsafe {
                pool.push_task_erased(Box::new(move || unsafe {
                    par_loop::<T, F, BRANCHLESS>(
                        sub,
                        is_less,
                        bad_allowed,
                        seq_thr,
                        sub_threads,
                        pool,
                        sub_leftmost,
                    );
                }));
            }
            v = right;
            leftmost = false;
        } else {
            let (left, right) = v.split_at_mut(pivot_abs);
            let sub = SliceParts::new(right);
            let sub_threads = threads;
            // SAFETY: as above; the right side starts at the placed pivot,
            // which is its sentinel.
            unsafe {
                pool.push_task_erased(Box::new(move || unsafe {
                    par_loop::<T, F, BRANCHLESS>(
                        sub,
                        is_less,
                        bad_allowed,
                        seq_thr,
                        sub_threads,
                        pool,
                        false,
                    );
                }));
            }
            v = left;
        }
    }
}

/// Parallel entry: sizes the pool and the per-task sequential cutoff,
/// submits the initial loop as a task and drains the pool.
pub(crate) fn par_sort_impl<T, F, const BRANCHLESS: bool>(v: &mut [T], is_less: F)
where
    T: Send + Sync,
    F: Fn(&T, &T) -> bool + Send + Sync,
{
    let size = v.len();
    if size < 2 {
        return;
    }

    let threads = pool::default_threads();
    let ins_thr = params::insertion_threshold(BRANCHLESS);
    let seq_thr = (size / threads / PAR_THR_DIV).max(ins_thr);
    let bad_allowed = params::log2(size);

    if threads < 2 || size < seq_thr {
        return seq_loop::<T, _, BRANCHLESS>(v, &mut |a, b| is_less(a, b), bad_allowed, true);
    }

    let pool = ThreadPool::new(threads);
    {
        let parts = SliceParts::new(v);
        let is_less = &is_less;
        let pool_ref = &pool;
        // SAFETY: `wait_and_stop` below returns only after every submitted
        // task (including transitively submitted ones) completed, so the
        // erased borrows of the slice, the comparator and the pool outlive
        // all tasks.
        unsafe {
            pool.push_task_erased(Box::new(move || unsafe {
                par_loop::<T, F, BRANCHLESS>(
                    parts,
                    is_less,
                    bad_allowed,
                    seq_thr,
                    threads,
                    pool_ref,
                    true,
                );
            }));
        }
    }
    pool.wait_and_stop();
}
