//! Memory policies: pages and their side tables, and the two generations built from them.

pub mod card_table;
pub mod forwarding;
pub mod newspace;
pub mod oldspace;
pub mod page;
pub mod page_list;

pub use self::newspace::NewSpace;
pub use self::oldspace::OldSpace;
pub use self::page::{Page, PageFlags};
