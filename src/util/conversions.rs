use crate::util::constants::*;

/* Alignment */

pub const fn raw_align_up(val: usize, align: usize) -> usize {
    // See https://github.com/rust-lang/rust/blob/e620d0f337d0643c757bab791fc7d88d63217704/src/libcore/alloc.rs#L192
    val.wrapping_add(align).wrapping_sub(1) & !align.wrapping_sub(1)
}

pub const fn raw_align_down(val: usize, align: usize) -> usize {
    val & !align.wrapping_sub(1)
}

pub const fn raw_is_aligned(val: usize, align: usize) -> bool {
    val & align.wrapping_sub(1) == 0
}

/* Conversion */

/// The number of heap page granules needed to hold `bytes`.
pub const fn bytes_to_heap_pages_up(bytes: usize) -> usize {
    (bytes + BYTES_IN_HEAP_PAGE - 1) >> LOG_BYTES_IN_HEAP_PAGE
}

pub const fn heap_pages_to_bytes(pages: usize) -> usize {
    pages << LOG_BYTES_IN_HEAP_PAGE
}

/// Round an allocation request up to the allocation unit.
pub const fn object_size_align_up(bytes: usize) -> usize {
    raw_align_up(bytes, OBJECT_ALIGNMENT)
}
