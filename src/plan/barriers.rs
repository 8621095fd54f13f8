//! The generational write barrier.

use crate::util::heap::PageTable;
use crate::util::{Address, ObjectReference};

/// Card-marking post-write barrier: called after `target` is stored into `slot` of `src`.
///
/// If `src` is on a page with a card table (old space) and `target` is in new space, the
/// card that covers `slot` is remembered so the next scavenge finds the reference.
#[inline(always)]
pub(crate) fn card_marking_post_write(
    table: &PageTable,
    src: ObjectReference,
    slot: Address,
    target: Option<ObjectReference>,
) {
    let Some(target) = target else {
        return;
    };
    let Some(target_page) = table.page_of(target.to_raw_address()) else {
        return;
    };
    if !target_page.is_new() {
        return;
    }
    let Some(src_page) = table.page_of(src.to_raw_address()) else {
        return;
    };
    if src_page.card_table().is_some() && !src_page.is_card_remembered(slot) {
        trace!("Remember slot {} of {} -> {}", slot, src, target);
        src_page.remember_card(slot);
    }
}
