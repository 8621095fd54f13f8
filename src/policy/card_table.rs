//! The remembered set of an old page: one bit per card of `SLOTS_PER_CARD` pointer slots.

use crate::util::constants::{BITS_IN_WORD, BYTES_PER_CARD, LOG_BITS_IN_WORD, LOG_BYTES_PER_CARD};
use crate::util::Address;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct CardTable {
    base: Address,
    cards: usize,
    words: Box<[AtomicUsize]>,
}

impl CardTable {
    /// A table covering `size` bytes from `base`.
    pub fn new(base: Address, size: usize) -> Self {
        let cards = size.div_ceil(BYTES_PER_CARD);
        let words = cards.div_ceil(BITS_IN_WORD);
        CardTable {
            base,
            cards,
            words: (0..words).map(|_| AtomicUsize::new(0)).collect(),
        }
    }

    pub fn num_cards(&self) -> usize {
        self.cards
    }

    pub fn card_index(&self, slot: Address) -> usize {
        debug_assert!(slot >= self.base);
        let index = (slot - self.base) >> LOG_BYTES_PER_CARD;
        debug_assert!(index < self.cards, "{} is not covered by the card table", slot);
        index
    }

    /// The address range covered by a card.
    pub fn card_range(&self, card: usize) -> Range<Address> {
        let start = self.base + (card << LOG_BYTES_PER_CARD);
        start..start + BYTES_PER_CARD
    }

    /// Set the card of `slot`. Cards only ever get set between two scans, so racing writers
    /// can use a relaxed `fetch_or`.
    pub fn remember(&self, slot: Address) {
        let card = self.card_index(slot);
        let word = &self.words[card >> LOG_BITS_IN_WORD];
        let bit = 1usize << (card & (BITS_IN_WORD - 1));
        if word.load(Ordering::Relaxed) & bit == 0 {
            word.fetch_or(bit, Ordering::Relaxed);
        }
    }

    pub fn is_remembered(&self, slot: Address) -> bool {
        self.is_card_set(self.card_index(slot))
    }

    pub fn is_card_set(&self, card: usize) -> bool {
        let word = self.words[card >> LOG_BITS_IN_WORD].load(Ordering::Relaxed);
        word & (1usize << (card & (BITS_IN_WORD - 1))) != 0
    }

    /// Clear all cards and return the cards that were set, one bit per card.
    pub fn take_all(&self) -> Vec<usize> {
        self.words
            .iter()
            .map(|w| w.swap(0, Ordering::Relaxed))
            .collect()
    }

    /// Clear one card and return whether it was set.
    pub fn take_card(&self, card: usize) -> bool {
        let bit = 1usize << (card & (BITS_IN_WORD - 1));
        let word = &self.words[card >> LOG_BITS_IN_WORD];
        word.load(Ordering::Relaxed) & bit != 0 && word.fetch_and(!bit, Ordering::Relaxed) & bit != 0
    }

    pub fn clear(&self) {
        for w in self.words.iter() {
            w.store(0, Ordering::Relaxed);
        }
    }

    pub fn count_remembered(&self) -> usize {
        self.words
            .iter()
            .map(|w| w.load(Ordering::Relaxed).count_ones() as usize)
            .sum()
    }
}

/// Is `card` set in a snapshot taken by `CardTable::take_all`?
pub(crate) fn is_set_in(snapshot: &[usize], card: usize) -> bool {
    snapshot[card >> LOG_BITS_IN_WORD] & (1usize << (card & (BITS_IN_WORD - 1))) != 0
}
