/// log2 of the number of bytes in a byte
pub const LOG_BYTES_IN_BYTE: u8 = 0;
/// The number of bytes in a byte
pub const BYTES_IN_BYTE: usize = 1;
/// log2 of the number of bits in a byte
pub const LOG_BITS_IN_BYTE: u8 = 3;
/// The number of bits in a byte
pub const BITS_IN_BYTE: usize = 1 << LOG_BITS_IN_BYTE;

/// log2 of the number of bytes in a megabyte
pub const LOG_BYTES_IN_MBYTE: u8 = 20;
/// The number of bytes in a megabyte
pub const BYTES_IN_MBYTE: usize = 1 << LOG_BYTES_IN_MBYTE;

/// log2 of the number of bytes in a kilobyte
pub const LOG_BYTES_IN_KBYTE: u8 = 10;
/// The number of bytes in a kilobyte
pub const BYTES_IN_KBYTE: usize = 1 << LOG_BYTES_IN_KBYTE;

#[cfg(target_pointer_width = "32")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 2;
#[cfg(target_pointer_width = "64")]
/// log2 of the number of bytes in an address
pub const LOG_BYTES_IN_ADDRESS: u8 = 3;
/// The number of bytes in an address
pub const BYTES_IN_ADDRESS: usize = 1 << LOG_BYTES_IN_ADDRESS;
/// log2 of the number of bits in an address
pub const LOG_BITS_IN_ADDRESS: usize = LOG_BITS_IN_BYTE as usize + LOG_BYTES_IN_ADDRESS as usize;
/// The number of bits in an address
pub const BITS_IN_ADDRESS: usize = 1 << LOG_BITS_IN_ADDRESS;

/// log2 of the number of bytes in a word
pub const LOG_BYTES_IN_WORD: u8 = LOG_BYTES_IN_ADDRESS;
/// The number of bytes in a word
pub const BYTES_IN_WORD: usize = 1 << LOG_BYTES_IN_WORD;
/// log2 of the number of bits in a word
pub const LOG_BITS_IN_WORD: usize = LOG_BITS_IN_BYTE as usize + LOG_BYTES_IN_WORD as usize;
/// The number of bits in a word
pub const BITS_IN_WORD: usize = 1 << LOG_BITS_IN_WORD;

/// log2 of the number of bytes in an OS page
pub const LOG_BYTES_IN_PAGE: u8 = 12;
/// The number of bytes in an OS page
pub const BYTES_IN_PAGE: usize = 1 << LOG_BYTES_IN_PAGE;

/// log2 of the number of bytes in a heap page. Heap pages are the unit in which the heap
/// takes memory from the OS, and every heap page is aligned to this size.
pub const LOG_BYTES_IN_HEAP_PAGE: u8 = 19;
/// The number of bytes in a heap page (512 KiB).
pub const BYTES_IN_HEAP_PAGE: usize = 1 << LOG_BYTES_IN_HEAP_PAGE;
/// Mask that rounds an address in an aligned heap page down to the page start.
pub const HEAP_PAGE_MASK: usize = !(BYTES_IN_HEAP_PAGE - 1);

/// log2 of the allocation unit. Every object starts and ends on an allocation unit boundary.
pub const LOG_OBJECT_ALIGNMENT: u8 = LOG_BYTES_IN_WORD + 1;
/// The allocation unit: two words, which is also the size of an object header.
pub const OBJECT_ALIGNMENT: usize = 1 << LOG_OBJECT_ALIGNMENT;
/// The minimal object size in bytes
pub const MIN_OBJECT_SIZE: usize = OBJECT_ALIGNMENT;

/// Allocation stubs may write up to this many bytes past the end of the object they are
/// initialising, the same way code may touch the stack red zone. `Page::end()` always
/// leaves at least this much room before the end of the page memory.
pub const ALLOCATION_RED_ZONE_SIZE: usize = OBJECT_ALIGNMENT;

/// The word written over unallocated memory in debug builds.
#[cfg(target_pointer_width = "64")]
pub const ALLOCATION_CANARY: usize = 0xcdcd_cdcd_cdcd_cdcd;
#[cfg(target_pointer_width = "32")]
pub const ALLOCATION_CANARY: usize = 0xcdcd_cdcd;

/// log2 of the pointer slots covered by one card. 1 card = 32 slots.
pub const LOG_SLOTS_PER_CARD: usize = 5;
/// The number of pointer slots covered by one card.
pub const SLOTS_PER_CARD: usize = 1 << LOG_SLOTS_PER_CARD;
/// log2 of the number of bytes covered by one card.
pub const LOG_BYTES_PER_CARD: usize = LOG_BYTES_IN_WORD as usize + LOG_SLOTS_PER_CARD;
/// The number of bytes covered by one card.
pub const BYTES_PER_CARD: usize = 1 << LOG_BYTES_PER_CARD;

/// Slots scanned between two claims of card-scanning work.
pub const SLOTS_PER_INTERRUPT_CHECK: usize = BYTES_IN_KBYTE;
/// Cards claimed at once from a page's progress bar.
pub const CARDS_PER_INTERRUPT_CHECK: usize = SLOTS_PER_INTERRUPT_CHECK / SLOTS_PER_CARD;

/// Words of live bitvector per forwarding block.
pub const BIT_VECTOR_WORDS_PER_BLOCK: usize = 1;
/// The number of bytes covered by one forwarding block: one live bit per allocation unit.
pub const BYTES_IN_FORWARDING_BLOCK: usize =
    OBJECT_ALIGNMENT * BITS_IN_WORD * BIT_VECTOR_WORDS_PER_BLOCK;
/// Mask that rounds an address down to the start of its forwarding block.
pub const FORWARDING_BLOCK_MASK: usize = !(BYTES_IN_FORWARDING_BLOCK - 1);
/// The number of forwarding blocks in a standard heap page.
pub const FORWARDING_BLOCKS_PER_PAGE: usize = BYTES_IN_HEAP_PAGE / BYTES_IN_FORWARDING_BLOCK;

static_assertions::const_assert!(BYTES_IN_HEAP_PAGE % BYTES_PER_CARD == 0);
static_assertions::const_assert!(BYTES_IN_HEAP_PAGE % BYTES_IN_FORWARDING_BLOCK == 0);
static_assertions::const_assert!(BYTES_IN_HEAP_PAGE % BYTES_IN_PAGE == 0);
static_assertions::const_assert_eq!(OBJECT_ALIGNMENT, 2 * BYTES_IN_WORD);
