//! Synchronization engine
//!
//! Keeps target systems in step with source systems: objects are fetched
//! from a source connector, mapped, compared against their contract by
//! content hash and written through a target connector.

pub mod engine;
pub mod hash;
pub mod mapping;
pub mod objects;
pub mod reconciler;
pub mod source;
pub mod store;
pub mod target;
pub mod types;

pub use engine::{EngineSettings, RunOptions, SyncEngine};
pub use mapping::{MappingService, PathMapper};
pub use objects::{MemoryObjectStore, ObjectStore, SqliteObjectStore};
pub use store::{MemoryStore, SqliteStore, SyncStore};
