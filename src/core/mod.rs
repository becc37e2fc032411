pub mod entity;
pub mod error;
pub mod follow_up;
pub mod geometry;

pub use entity::{
    Coordinate, DEFAULT_STATUS, FieldPatch, Geometry, ParentId, Prospect, ProspectId, close_ring,
    fields,
};
pub use error::{Result, SyncError};
pub use follow_up::{FollowUpTimeframe, derive_follow_up_date};
pub use geometry::{distinct_vertex_count, ring_acres, ring_area_square_meters};
