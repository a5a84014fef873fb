pub mod engine;
pub mod store;
pub mod types;

pub use engine::SyncEngine;
pub use store::{SyncStore, next_version, now_millis};
pub use types::{
    BatchRequest, DeltaPage, ObjectType, OpResult, OpStatus, Operation, SyncOp, SyncStatus,
    TypeStats, VersionedObject,
};
