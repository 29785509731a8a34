//! Write operations issued against generic API targets

pub mod operation;

pub use operation::{Operation, OperationResult};
