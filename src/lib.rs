// ============================================================================
// prospect-sync
// ============================================================================
//
// Keeps map-attached prospect records in step with their persistence layer:
// debounced field edits, a remote or local backend chosen once, cache
// reconciliation and polygon shape saves.

pub mod backend;
pub mod cache;
pub mod config;
pub mod core;
pub mod storage;
pub mod sync;

pub use backend::{
    LocalBackend, LocalPersistence, PersistenceBackend, ProspectFilter, RemoteBackend,
    backend_from_config,
};
pub use cache::{CacheEvent, CacheKey, CacheReconciler, MembershipIndex, QueryCache};
pub use config::{PersistenceMode, SwitchPolicy, SyncConfig};
pub use core::{
    Coordinate, FieldPatch, Geometry, ParentId, Prospect, ProspectId, Result, SyncError, fields,
    ring_acres,
};
pub use storage::{FileStore, LocalStore, MemoryStore, StorageNamespace};
pub use sync::{
    EditSynchronizer, PersistenceDispatcher, QueueMode, ShapeEditor, ShapeOutcome, ShapePhase,
    SyncEvent,
};
