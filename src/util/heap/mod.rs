//! Heap-level resources: where page memory comes from, how pages are found by address,
//! and when old space needs a full collection.

mod accounting;
pub(crate) mod gc_trigger;
pub(crate) mod page_resource;
pub(crate) mod page_table;

pub use self::accounting::PageAccounting;
pub use self::gc_trigger::GcTrigger;
pub use self::page_resource::PageResource;
pub use self::page_table::{PageId, PageTable};
