//! Small-range sorting kernels: guarded and unguarded insertion sort, their
//! abandoning "partial" variants, and the branchless comparison networks used
//! by pivot selection.

use core::mem::ManuallyDrop;
use core::ptr;

use crate::params::PARTIAL_INSERTION_THRESHOLD;

/// When dropped, copies from `src` into `dest`.
///
/// Keeps a moved-out element alive across comparator calls: if the comparator
/// panics, the drop writes the element back and the slice still owns every
/// value exactly once.
pub(crate) struct CopyOnDrop<T> {
    pub src: *const T,
    pub dest: *mut T,
}

impl<T> Drop for CopyOnDrop<T> {
    fn drop(&mut self) {
        // SAFETY: the caller guarantees `src` and `dest` do not overlap and
        // that `dest` is a hole that owns no value of its own.
        unsafe {
            ptr::copy_nonoverlapping(self.src, self.dest, 1);
        }
    }
}

/// Sorts `v` using insertion sort, which is *O*(*n*^2) worst-case.
pub(crate) fn insertion_sort<T, F>(v: &mut [T], is_less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    let len = v.len();
    if len < 2 {
        return;
    }

    let base = v.as_mut_ptr();
    // SAFETY: all offsets stay within `0..len`; the shifting loop below only
    // decrements `hole` while it is greater than zero. The moved-out element
    // is protected by a `CopyOnDrop` hole, so a panicking comparator leaves
    // the slice a permutation of its input.
    unsafe {
        for i in 1..len {
            if is_less(&*base.add(i), &*base.add(i - 1)) {
                let tmp = ManuallyDrop::new(ptr::read(base.add(i)));
                let mut guard = CopyOnDrop {
                    src: &*tmp,
                    dest: base.add(i),
                };
                let mut hole = i;
                loop {
                    ptr::copy_nonoverlapping(base.add(hole - 1), base.add(hole), 1);
                    hole -= 1;
                    guard.dest = base.add(hole);
                    if hole == 0 || !is_less(&*tmp, &*base.add(hole - 1)) {
                        break;
                    }
                }
                // `guard` drops here and fills the hole with `tmp`.
            }
        }
    }
}

/// Sorts `v[1..]` using insertion sort, assuming `v[0]` is a sentinel less
/// than or equal to every element of `v[1..]`.
///
/// The sentinel contract makes the comparison against the head redundant:
/// the shift loop stops unconditionally once the hole sits right above the
/// sentinel, where [`insertion_sort`] would still call the comparator.
pub(crate) fn insertion_sort_unguarded<T, F>(v: &mut [T], is_less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    let len = v.len();
    if len < 3 {
        return;
    }

    let base = v.as_mut_ptr();
    // SAFETY: `hole` starts at `i >= 2`, decrements once per iteration and
    // the loop exits no later than `hole == 1`, so `hole - 1` stays in
    // bounds for any comparator. Hole guard as in `insertion_sort`.
    unsafe {
        for i in 2..len {
            if is_less(&*base.add(i), &*base.add(i - 1)) {
                let tmp = ManuallyDrop::new(ptr::read(base.add(i)));
                let mut guard = CopyOnDrop {
                    src: &*tmp,
                    dest: base.add(i),
                };
                let mut hole = i;
                loop {
                    ptr::copy_nonoverlapping(base.add(hole - 1), base.add(hole), 1);
                    hole -= 1;
                    guard.dest = base.add(hole);
                    if hole == 1 || !is_less(&*tmp, &*base.add(hole - 1)) {
                        break;
                    }
                }
            }
        }
    }
}

/// Tries to sort `v` by insertion sort, giving up once more than
/// `PARTIAL_INSERTION_THRESHOLD` elements had to be shifted.
///
/// Returns `true` iff `v` is sorted on return.
pub(crate) fn partial_insertion_sort<T, F>(v: &mut [T], is_less: &mut F) -> bool
where
    F: FnMut(&T, &T) -> bool,
{
    let len = v.len();
    if len < 2 {
        return true;
    }

    let base = v.as_mut_ptr();
    let mut shifts = 0;
    // SAFETY: same bounds and hole reasoning as `insertion_sort`.
    unsafe {
        for i in 1..len {
            if is_less(&*base.add(i), &*base.add(i - 1)) {
                let tmp = ManuallyDrop::new(ptr::read(base.add(i)));
                let mut guard = CopyOnDrop {
                    src: &*tmp,
                    dest: base.add(i),
                };
                let mut hole = i;
                loop {
                    ptr::copy_nonoverlapping(base.add(hole - 1), base.add(hole), 1);
                    hole -= 1;
                    guard.dest = base.add(hole);
                    if hole == 0 || !is_less(&*tmp, &*base.add(hole - 1)) {
                        break;
                    }
                }
                drop(guard);
                shifts += 1;
                if shifts >= PARTIAL_INSERTION_THRESHOLD {
                    return i + 1 == len;
                }
            }
        }
    }
    true
}

/// Partial insertion sort over `v[1..]` with the sentinel contract of
/// [`insertion_sort_unguarded`].
pub(crate) fn partial_insertion_sort_unguarded<T, F>(v: &mut [T], is_less: &mut F) -> bool
where
    F: FnMut(&T, &T) -> bool,
{
    let len = v.len();
    if len < 3 {
        return true;
    }

    let base = v.as_mut_ptr();
    let mut shifts = 0;
    // SAFETY: same bounds and sentinel reasoning as `insertion_sort_unguarded`.
    unsafe {
        for i in 2..len {
            if is_less(&*base.add(i), &*base.add(i - 1)) {
                let tmp = ManuallyDrop::new(ptr::read(base.add(i)));
                let mut guard = CopyOnDrop {
                    src: &*tmp,
                    dest: base.add(i),
                };
                let mut hole = i;
                loop {
                    ptr::copy_nonoverlapping(base.add(hole - 1), base.add(hole), 1);
                    hole -= 1;
                    guard.dest = base.add(hole);
                    if hole == 1 || !is_less(&*tmp, &*base.add(hole - 1)) {
                        break;
                    }
                }
                drop(guard);
                shifts += 1;
                if shifts >= PARTIAL_INSERTION_THRESHOLD {
                    return i + 1 == len;
                }
            }
        }
    }
    true
}

/// Orders the values at positions `a` and `b` with a conditional pointer
/// select instead of a data-dependent branch; one comparison.
///
/// # Safety
///
/// `a` and `b` must be distinct in-bounds positions of `v`.
unsafe fn sort2<T, F>(v: *mut T, a: usize, b: usize, is_less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    // SAFETY: `pa != pb` per contract; both reads happen before either write,
    // so each slot keeps owning exactly one value. No user code runs between
    // the reads and the writes.
    unsafe {
        let pa = v.add(a);
        let pb = v.add(b);
        let swap = is_less(&*pb, &*pa);
        let min = ptr::read(if swap { pb } else { pa });
        let max = ptr::read(if swap { pa } else { pb });
        ptr::write(pa, min);
        ptr::write(pb, max);
    }
}

/// Three-element sorting network; three comparisons, no data-dependent
/// branches.
///
/// # Safety
///
/// `a`, `b`, `c` must be pairwise distinct in-bounds positions of `v`.
pub(crate) unsafe fn sort3_branchless<T, F>(v: *mut T, a: usize, b: usize, c: usize, is_less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    // SAFETY: forwarded contract.
    unsafe {
        sort2(v, a, b, is_less);
        sort2(v, b, c, is_less);
        sort2(v, a, b, is_less);
    }
}

/// Five-element sorting network; nine comparisons, no data-dependent
/// branches.
///
/// # Safety
///
/// All positions must be pairwise distinct and in bounds of `v`.
pub(crate) unsafe fn sort5_branchless<T, F>(
    v: *mut T,
    x1: usize,
    x2: usize,
    x3: usize,
    x4: usize,
    x5: usize,
    is_less: &mut F,
) where
    F: FnMut(&T, &T) -> bool,
{
    // SAFETY: forwarded contract.
    unsafe {
        sort2(v, x1, x2, is_less);
        sort2(v, x4, x5, is_less);
        sort2(v, x3, x5, is_less);
        sort2(v, x3, x4, is_less);
        sort2(v, x1, x4, is_less);
        sort2(v, x1, x3, is_less);
        sort2(v, x2, x5, is_less);
        sort2(v, x2, x4, is_less);
        sort2(v, x2, x3, is_less);
    }
}

/// Stable three-element sort; 2-3 comparisons, 0-2 swaps.
pub(crate) fn sort3<T, F>(v: &mut [T], a: usize, b: usize, c: usize, is_less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    if !is_less(&v[b], &v[a]) {
        // a <= b
        if !is_less(&v[c], &v[b]) {
            return;
        }
        v.swap(b, c);
        if is_less(&v[b], &v[a]) {
            v.swap(a, b);
        }
        return;
    }
    if is_less(&v[c], &v[b]) {
        // a > b, b > c
        v.swap(a, c);
        return;
    }
    // a > b, b <= c
    v.swap(a, b);
    if is_less(&v[c], &v[b]) {
        v.swap(b, c);
    }
}
