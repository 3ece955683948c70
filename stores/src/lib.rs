//! Data stores for loadpace
//!
//! This crate provides implementations of the `Db` trait:
//!
//! - In-memory ordered store, with table analysis

#![warn(clippy::all)]

mod memory;

pub use memory::{MemoryStore, TableStats};

use std::sync::Arc;

use loadpace_core::Db;

/// Create a store by name
///
/// Returns `None` for names no store answers to.
pub fn create(name: &str) -> Option<Arc<dyn Db>> {
    match name {
        "memory" | "basic" => Some(Arc::new(MemoryStore::new())),
        _ => None,
    }
}
