use crate::heap::Heap;
use crate::policy::page::PageCollectorAccess;
use crate::util::object_model;
use crate::util::{Address, ObjectReference};
use crate::vm::VMBinding;

/// What marking found.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MarkSummary {
    pub marked_objects: usize,
    pub marked_bytes: usize,
}

/// Marks every object reachable from the roots by setting its header mark bit, and
/// counts the live bytes of every old page. Image pages are neither marked nor traced:
/// their objects are immortal and their references are not followed.
pub(crate) struct Marker<'a, VM: VMBinding> {
    heap: &'a Heap<VM>,
    mark_stack: Vec<ObjectReference>,
    summary: MarkSummary,
}

impl<'a, VM: VMBinding> Marker<'a, VM> {
    pub fn new(heap: &'a Heap<VM>) -> Self {
        Marker {
            heap,
            mark_stack: vec![],
            summary: MarkSummary::default(),
        }
    }

    pub fn mark(mut self) -> MarkSummary {
        let heap = self.heap;
        for page in heap.old_space.all_pages(&heap.table) {
            page.set_live_bytes(0);
        }
        heap.binding.scan_roots(&mut |slot: Address| self.mark_slot(slot));
        while let Some(object) = self.mark_stack.pop() {
            object_model::scan_object(object, &mut |slot: Address| self.mark_slot(slot));
        }
        debug!("Marked {:?}", self.summary);
        self.summary
    }

    fn mark_slot(&mut self, slot: Address) {
        if let Some(object) = object_model::load_slot(slot) {
            self.mark_object(object);
        }
    }

    fn mark_object(&mut self, object: ObjectReference) {
        let Some(page) = self.heap.table.page_of(object.to_raw_address()) else {
            trace!("{} is not in the heap, not marking it", object);
            return;
        };
        if page.is_image() {
            return;
        }
        if object_model::test_and_mark(object) {
            let size = object_model::get_size(object);
            if page.is_old() {
                page.add_live_bytes(size);
            }
            self.summary.marked_objects += 1;
            self.summary.marked_bytes += size;
            self.mark_stack.push(object);
        }
    }
}
