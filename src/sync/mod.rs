//! Edit synchronization: coalescing, dispatch and shape saves.

pub mod dispatcher;
pub mod events;
pub mod session;
pub mod shape;
pub mod synchronizer;

pub use dispatcher::PersistenceDispatcher;
pub use events::{EventBus, SyncEvent};
pub use session::{EditSession, PendingFlush};
pub use shape::{SavedHook, ShapeEditor, ShapeOutcome, ShapePhase, geometry_patch};
pub use synchronizer::{EditSynchronizer, QueueMode};
