//! Pivot selection: moves the chosen pivot to `v[0]`.

use crate::params::MEDIAN_THRESHOLD;
use crate::smallsort::{sort3, sort3_branchless, sort5_branchless};

/// Chooses a pivot for `v` and moves it to `v[0]`, shuffling a handful of
/// probe elements in the process.
///
/// Ranges shorter than `MEDIAN_THRESHOLD` use a median of three. Longer
/// ranges use a pseudo-median of nine (classic) or a median of five through
/// the `sort5` network (branchless).
pub(crate) fn choose_pivot<T, F, const BRANCHLESS: bool>(v: &mut [T], is_less: &mut F)
where
    F: FnMut(&T, &T) -> bool,
{
    let len = v.len();
    debug_assert!(len >= 3);
    let mid = len / 2;

    if len < MEDIAN_THRESHOLD {
        // Ordering the probes as (mid, 0, len - 1) leaves the median in
        // front.
        if BRANCHLESS {
            // SAFETY: `len >= 3`, so `mid`, `0` and `len - 1` are distinct
            // in-bounds positions.
            unsafe { sort3_branchless(v.as_mut_ptr(), mid, 0, len - 1, is_less) };
        } else {
            sort3(v, mid, 0, len - 1, is_less);
        }
        return;
    }

    if BRANCHLESS {
        // Median of five equally spaced probes; the network leaves it at
        // `mid`.
        let quarter = len / 4;
        // SAFETY: `len >= MEDIAN_THRESHOLD`, so the five positions are
        // pairwise distinct and in bounds.
        unsafe {
            sort5_branchless(
                v.as_mut_ptr(),
                0,
                quarter,
                mid,
                len - 1 - quarter,
                len - 1,
                is_less,
            );
        }
        v.swap(0, mid);
    } else {
        // Pseudo-median of nine: medians of three spaced triplets, then the
        // median of those medians.
        sort3(v, 0, mid, len - 1, is_less);
        sort3(v, 1, mid - 1, len - 2, is_less);
        sort3(v, 2, mid + 1, len - 3, is_less);
        sort3(v, mid - 1, mid, mid + 1, is_less);
        v.swap(0, mid);
    }
}
