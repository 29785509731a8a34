//! Source-to-target synchronization engine
//!
//! Pulls objects from external sources (JSON APIs, XML feeds, SOAP services),
//! maps them into the target shape and writes them to a target system while
//! keeping a durable contract per object so repeated runs stay idempotent.

pub mod api;
pub mod config;
pub mod error;
pub mod sync;

pub use error::{Result, SyncError};
pub use sync::{RunOptions, SyncEngine};
