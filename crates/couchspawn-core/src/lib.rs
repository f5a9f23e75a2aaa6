//! Core types, traits, and revision algorithms shared by the couchspawn
//! emulator crates.
//!
//! - [`document`]: revisions, documents, request options and response bodies
//! - [`rev_tree`]: the per-document revision tree
//! - [`merge`]: merging revision paths and choosing a winner
//! - [`adapter`]: the storage trait the HTTP layer talks to

pub mod adapter;
pub mod document;
pub mod error;
pub mod merge;
pub mod rev_tree;

pub use adapter::Adapter;
pub use error::{CouchError, Result};
