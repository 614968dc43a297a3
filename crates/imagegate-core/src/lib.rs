//! Domain types and pure logic shared by the imagegate HTTP surface and the
//! worker pool.
//!
//! This crate has no I/O: no sockets, no filesystem, no child processes. It
//! exists so the batch-key math and wire types can be unit tested without a
//! Tokio runtime, the way `ferroid-tonic-core` keeps the Snowflake ID layout
//! free of any transport dependency.

pub mod batch;
pub mod error;
pub mod types;

pub use batch::BatchManager;
pub use error::{Error, Result};
pub use types::*;
