//! Compile-time tuning constants.

/// Below this size, classic partitioning ranges are insertion sorted.
pub(crate) const INSERTION_THRESHOLD: usize = 12;

/// Below this size, branchless partitioning ranges are insertion sorted.
/// Larger than the classic threshold: cheap-to-move elements keep insertion
/// sort competitive for longer.
pub(crate) const INSERTION_THRESHOLD_BRANCHLESS: usize = 32;

/// Maximum number of element shifts `partial_insertion_sort` performs before
/// giving up on an "almost sorted" range.
pub(crate) const PARTIAL_INSERTION_THRESHOLD: usize = 8;

/// Ranges at least this large select the pivot from nine (classic) or five
/// (branchless) probes instead of three.
pub(crate) const MEDIAN_THRESHOLD: usize = 128;

/// A partition is highly unbalanced if the smaller side is less than
/// `size / PARTITION_RATIO`.
pub(crate) const PARTITION_RATIO: usize = 8;

pub(crate) const CACHELINE_SIZE: usize = 64;

/// Block length and offset-buffer capacity of the branchless partitioner.
/// 1536 elements per input block: two u16 offset buffers (6 KB) plus the
/// blocks themselves stay within a 32 KB L1 cache for 8-byte elements.
pub(crate) const BLOCK_SIZE_BRANCHLESS: usize = 24 * CACHELINE_SIZE;

/// Block length claimed per step by the classic parallel partitioner.
pub(crate) const BLOCK_SIZE_CLASSIC: usize = 1 << 14;

/// Divisor for the per-task sequential cutoff of the parallel driver.
pub(crate) const PAR_THR_DIV: usize = 10;

// Offsets are stored as u16; a block must be addressable by one.
const _: () = assert!(BLOCK_SIZE_BRANCHLESS <= u16::MAX as usize);

pub(crate) const fn insertion_threshold(branchless: bool) -> usize {
    if branchless {
        INSERTION_THRESHOLD_BRANCHLESS
    } else {
        INSERTION_THRESHOLD
    }
}

/// `floor(log2(n))` for `n >= 1`; the number of imbalanced partitions the
/// drivers tolerate before falling back to heapsort.
pub(crate) fn log2(n: usize) -> u32 {
    usize::BITS - 1 - n.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::log2;

    #[test]
    fn log2_matches_shift_count() {
        assert_eq!(log2(1), 0);
        assert_eq!(log2(2), 1);
        assert_eq!(log2(3), 1);
        assert_eq!(log2(4), 2);
        assert_eq!(log2(1 << 20), 20);
        assert_eq!(log2((1 << 20) + 1), 20);
    }
}
