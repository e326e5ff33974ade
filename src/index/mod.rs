//! Secondary indexes
//!
//! Responsibilities:
//! - Map encoded index values (bytes, or a direct 32-bit integer) to
//!   the primary keys holding them
//! - Enforce uniqueness before linking, so failed writes change nothing
//! - Stage every mutation in the shard's transaction alongside the
//!   table writes it mirrors
//! - Committed views and forward-only key iteration

mod engine;
mod iter;
mod view;

pub use engine::Index;
pub use iter::{BatchedIndexKeys, IndexKeys};
pub use view::IndexView;
