//! Storage tables and committed views
//!
//! Responsibilities:
//! - Fixed-capacity chained hash map from `u64` keys to byte payloads
//! - Per-entry LZ4 compression above a runtime-adjustable threshold
//! - Committed (read-only) views maintained by transaction replay
//! - Cursors, chain-length diagnostics, and binary dump/restore

pub(crate) mod core;
pub(crate) mod dump;
mod iter;
mod table;
mod view;

pub use iter::{MapEntry, TableIter};
pub use table::Table;
pub use view::TableView;
