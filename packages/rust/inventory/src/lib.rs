//! Migration inventory: the per-page tracking table.
//!
//! The inventory maps every source file to its destination page, priority
//! and status. It is read at the start of a run (for target names and
//! `Skip-EmptyDraft` markers) and updated from the run's report.

pub mod naming;
pub mod scan;
pub mod store;

pub use naming::{derive_target_page_name, matching_convention, priority_for};
pub use scan::{SOURCE_EXTENSIONS, list_sources, scan_corpus};
pub use store::{CsvInventory, InventoryRecord, InventoryStore};
