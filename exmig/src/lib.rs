//! exmig library interface
//!
//! Migrates exhibition pages from the source CMS database into entries and
//! assets on the hosted content platform. The binary in `main.rs` is a thin
//! CLI over [`orchestrator::Migration`]; integration tests drive the same
//! types against in-memory stores.

pub mod align;
pub mod assets;
pub mod clean;
pub mod credits;
pub mod entries;
pub mod error;
pub mod images;
pub mod markdown;
pub mod orchestrator;
pub mod source;
pub mod target;
pub mod transform;

pub use crate::error::{MigrationError, Result, Skip};
pub use crate::orchestrator::Migration;
