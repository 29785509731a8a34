//! Persistent domain types of the synchronization engine

mod contract;
mod log;
mod mapping;
mod source;
mod synchronization;

pub use contract::{SynchronizationContract, TargetAction};
pub use log::{ContractLogResult, RunCounters, SynchronizationContractLog, SynchronizationLog};
pub use mapping::Mapping;
pub use source::Source;
pub use synchronization::Synchronization;
