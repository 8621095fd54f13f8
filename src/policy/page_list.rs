use super::page::{Page, PageCollectorAccess};
use crate::util::heap::{PageId, PageTable};
use std::sync::Arc;

/// A singly linked list of pages, threaded through `Page::next`.
#[derive(Default, Debug)]
pub struct PageList {
    head: Option<PageId>,
    tail: Option<PageId>,
    len: usize,
}

impl PageList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn head(&self) -> Option<PageId> {
        self.head
    }

    pub fn tail(&self) -> Option<PageId> {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn push_back(&mut self, table: &PageTable, page: &Page) {
        page.set_next(None);
        match self.tail {
            Some(tail) => table.page(tail).set_next(Some(page.id())),
            None => self.head = Some(page.id()),
        }
        self.tail = Some(page.id());
        self.len += 1;
    }

    pub fn iter<'a>(&self, table: &'a PageTable) -> PageListIter<'a> {
        PageListIter {
            table,
            next: self.head,
        }
    }

    pub fn to_vec(&self, table: &PageTable) -> Vec<Arc<Page>> {
        self.iter(table).collect()
    }

    /// Keep the pages for which `keep` returns true and unlink the others, which are returned
    /// in list order.
    pub fn retain(
        &mut self,
        table: &PageTable,
        mut keep: impl FnMut(&Page) -> bool,
    ) -> Vec<Arc<Page>> {
        let pages = self.to_vec(table);
        *self = PageList::new();
        let mut removed = vec![];
        for page in pages {
            if keep(&page) {
                self.push_back(table, &page);
            } else {
                page.set_next(None);
                removed.push(page);
            }
        }
        removed
    }
}

pub struct PageListIter<'a> {
    table: &'a PageTable,
    next: Option<PageId>,
}

impl Iterator for PageListIter<'_> {
    type Item = Arc<Page>;

    fn next(&mut self) -> Option<Arc<Page>> {
        let page = self.table.page(self.next?);
        self.next = page.next();
        Some(page)
    }
}
