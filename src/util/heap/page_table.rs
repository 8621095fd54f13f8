use super::PageResource;
use crate::policy::page::Page;
use crate::util::constants::LOG_BYTES_IN_HEAP_PAGE;
use crate::util::Address;
use spin::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// A stable handle to a page record in the page table.
///
/// Ids are reused after a page is freed, so a `PageId` must not be kept across the
/// collection that frees its page.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct PageId(u32);

impl PageId {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// The encoding used by the granule map and page links: 0 stands for "no page".
    pub(crate) fn to_raw(id: Option<PageId>) -> u32 {
        id.map_or(0, |id| id.0 + 1)
    }

    pub(crate) fn from_raw(raw: u32) -> Option<PageId> {
        raw.checked_sub(1).map(PageId)
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "page#{}", self.0)
    }
}

/// All page records of a heap, and the map from addresses to pages.
///
/// Pages carved from the heap reservation are found by indexing a direct map with one
/// entry per heap-page granule, so `page_of` is O(1). Image pages live outside the
/// reservation and are not aligned; they are found by binary search over their ranges.
pub struct PageTable {
    resource: PageResource,
    arena: RwLock<PageArena>,
    granule_to_page: Box<[AtomicU32]>,
    image_ranges: RwLock<Vec<ImageRange>>,
}

struct PageArena {
    slots: Vec<Option<Arc<Page>>>,
    free_ids: Vec<u32>,
    live: usize,
}

struct ImageRange {
    start: Address,
    end: Address,
    id: PageId,
}

impl PageTable {
    pub fn new(resource: PageResource) -> Self {
        let granules = resource.total_granules();
        PageTable {
            resource,
            arena: RwLock::new(PageArena {
                slots: vec![],
                free_ids: vec![],
                live: 0,
            }),
            granule_to_page: (0..granules).map(|_| AtomicU32::new(0)).collect(),
            image_ranges: RwLock::new(vec![]),
        }
    }

    pub fn resource(&self) -> &PageResource {
        &self.resource
    }

    /// Create a page record with a fresh id and make its memory range resolvable.
    pub(crate) fn insert(&self, create: impl FnOnce(PageId) -> Page) -> Arc<Page> {
        let page = {
            let mut arena = self.arena.write();
            let raw = match arena.free_ids.pop() {
                Some(raw) => raw,
                None => {
                    arena.slots.push(None);
                    (arena.slots.len() - 1) as u32
                }
            };
            let page = Arc::new(create(PageId(raw)));
            debug_assert_eq!(page.id(), PageId(raw));
            arena.slots[raw as usize] = Some(page.clone());
            arena.live += 1;
            page
        };
        self.map(&page);
        page
    }

    /// Remove a page record. Its id may be handed out again afterwards.
    pub(crate) fn remove(&self, id: PageId) -> Option<Arc<Page>> {
        let page = self.get(id)?;
        self.unmap(&page);
        let mut arena = self.arena.write();
        arena.slots[id.as_usize()] = None;
        arena.free_ids.push(id.0);
        arena.live -= 1;
        Some(page)
    }

    fn map(&self, page: &Page) {
        if self.resource.contains(page.start()) {
            let raw = PageId::to_raw(Some(page.id()));
            for entry in self.granule_entries(page) {
                let _prev = entry.swap(raw, Ordering::Release);
                debug_assert_eq!(_prev, 0, "granule of {} already mapped", page.id());
            }
        } else {
            let mut ranges = self.image_ranges.write();
            let index = ranges.partition_point(|r| r.start < page.start());
            debug_assert!(index == ranges.len() || page.memory_end() <= ranges[index].start);
            debug_assert!(index == 0 || ranges[index - 1].end <= page.start());
            ranges.insert(
                index,
                ImageRange {
                    start: page.start(),
                    end: page.memory_end(),
                    id: page.id(),
                },
            );
        }
    }

    fn unmap(&self, page: &Page) {
        if self.resource.contains(page.start()) {
            for entry in self.granule_entries(page) {
                entry.store(0, Ordering::Release);
            }
        } else {
            self.image_ranges.write().retain(|r| r.id != page.id());
        }
    }

    fn granule_entries(&self, page: &Page) -> &[AtomicU32] {
        let first = self.resource.granule_index(page.start());
        let count = (page.memory_end() - page.start()) >> LOG_BYTES_IN_HEAP_PAGE;
        &self.granule_to_page[first..first + count]
    }

    pub fn get(&self, id: PageId) -> Option<Arc<Page>> {
        self.arena.read().slots.get(id.as_usize()).and_then(|p| p.clone())
    }

    /// Get a page that must exist.
    pub(crate) fn page(&self, id: PageId) -> Arc<Page> {
        self.get(id)
            .unwrap_or_else(|| panic!("{} is not in the page table", id))
    }

    /// The id of the page whose memory contains `addr`.
    pub fn page_id_of(&self, addr: Address) -> Option<PageId> {
        if self.resource.contains(addr) {
            let raw = self.granule_to_page[self.resource.granule_index(addr)].load(Ordering::Acquire);
            PageId::from_raw(raw)
        } else {
            let ranges = self.image_ranges.read();
            let index = ranges.partition_point(|r| r.end <= addr);
            ranges
                .get(index)
                .filter(|r| r.start <= addr)
                .map(|r| r.id)
        }
    }

    /// The page whose memory contains `addr`.
    pub fn page_of(&self, addr: Address) -> Option<Arc<Page>> {
        self.page_id_of(addr).and_then(|id| self.get(id))
    }

    /// The number of live page records.
    pub fn len(&self) -> usize {
        self.arena.read().live
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of all pages, image pages included.
    pub fn pages(&self) -> Vec<Arc<Page>> {
        self.arena.read().slots.iter().flatten().cloned().collect()
    }
}
