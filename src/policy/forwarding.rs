//! Forwarding information for a page that is evacuated by the compactor.
//!
//! A page is divided into blocks of `BYTES_IN_FORWARDING_BLOCK` bytes. Each block has one
//! live bit per allocation unit and the address its live objects are moved to. The live
//! objects of a block are moved together, in address order and without gaps, so the new
//! address of an object is the block's new address plus the live bytes before it.

use crate::util::constants::{BITS_IN_WORD, BYTES_IN_FORWARDING_BLOCK, LOG_OBJECT_ALIGNMENT};
use crate::util::Address;

#[derive(Copy, Clone, Debug)]
pub struct ForwardingBlock {
    new_address: Address,
    live_bitvector: usize,
}

impl ForwardingBlock {
    const fn empty() -> Self {
        ForwardingBlock {
            new_address: Address::ZERO,
            live_bitvector: 0,
        }
    }

    fn unit_offset(old_addr: Address) -> usize {
        (old_addr.as_usize() % BYTES_IN_FORWARDING_BLOCK) >> LOG_OBJECT_ALIGNMENT
    }

    /// The new address of the live object at `old_addr`.
    pub fn lookup(&self, old_addr: Address) -> Address {
        let offset = Self::unit_offset(old_addr);
        let preceding = self.live_bitvector & ((1usize << offset) - 1);
        self.new_address + ((preceding.count_ones() as usize) << LOG_OBJECT_ALIGNMENT)
    }

    /// Record a live object of `size` bytes at `old_addr`. Only the part of the object
    /// inside this block is recorded: an object that runs past the end of the block is the
    /// last object starting in it.
    pub fn record_live(&mut self, old_addr: Address, size: usize) {
        let offset = Self::unit_offset(old_addr);
        let units = (size >> LOG_OBJECT_ALIGNMENT).min(BITS_IN_WORD - offset);
        let mask = if units == BITS_IN_WORD {
            usize::MAX
        } else {
            (1usize << units) - 1
        };
        debug_assert!(self.live_bitvector & (mask << offset) == 0);
        self.live_bitvector |= mask << offset;
    }

    pub fn is_live(&self, old_addr: Address) -> bool {
        self.live_bitvector & (1usize << Self::unit_offset(old_addr)) != 0
    }

    pub fn new_address(&self) -> Address {
        self.new_address
    }

    pub fn set_new_address(&mut self, new_address: Address) {
        self.new_address = new_address;
    }
}

pub struct ForwardingPage {
    base: Address,
    blocks: Box<[ForwardingBlock]>,
}

impl ForwardingPage {
    /// Forwarding information for the `size` bytes of page memory starting at `base`.
    pub fn new(base: Address, size: usize) -> Self {
        debug_assert!(base.is_aligned_to(BYTES_IN_FORWARDING_BLOCK));
        ForwardingPage {
            base,
            blocks: vec![ForwardingBlock::empty(); size.div_ceil(BYTES_IN_FORWARDING_BLOCK)]
                .into_boxed_slice(),
        }
    }

    pub fn block_index(&self, old_addr: Address) -> usize {
        (old_addr - self.base) / BYTES_IN_FORWARDING_BLOCK
    }

    pub fn block(&self, index: usize) -> &ForwardingBlock {
        &self.blocks[index]
    }

    pub fn block_mut(&mut self, index: usize) -> &mut ForwardingBlock {
        &mut self.blocks[index]
    }

    pub fn block_for(&self, old_addr: Address) -> &ForwardingBlock {
        self.block(self.block_index(old_addr))
    }

    pub fn lookup(&self, old_addr: Address) -> Address {
        self.block_for(old_addr).lookup(old_addr)
    }
}
