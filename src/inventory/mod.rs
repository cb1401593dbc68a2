//! Inventory: the derived status/location view of every blob
//!
//! Joins the local and backup listings with the dependency graph. Nothing
//! here is cached; every call reflects the filesystem and manifests as they
//! are now.

mod filter;
mod service;

pub use filter::{InventoryFilter, SortKey, SortOrder};
pub use service::{InventoryScan, InventoryService, InventorySummary, StatusTotals};
