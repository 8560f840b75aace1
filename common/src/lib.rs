//! Shared scene data model for the Vantage viewer
//!
//! This crate provides the geometry-level types shared between:
//! - `vantage-consolidation` (fragment consolidation engine)
//! - the viewer runtime (render list construction, BVH, picking)
//!
//! # Modules
//!
//! - [`geometry`] - Interleaved geometry buffers with an explicit attribute schema
//! - [`packing`] - Packed-normal and database-id codecs
//! - [`math`] - Axis-aligned bounding boxes
//! - [`flags`] - Per-fragment visibility flags and draw modes

pub mod flags;
pub mod geometry;
pub mod math;
pub mod packing;

// Re-export commonly used geometry items
pub use geometry::{
    ATTR_ID, ATTR_INST_OFFSET, ATTR_INST_ROTATION, ATTR_INST_SCALING, ATTR_NORMAL, ATTR_POSITION,
    GeometryBuffer, InstanceStreams, PrimitiveKind, VertexAttribute,
};

// Re-export commonly used packing items
pub use packing::{
    ID_ITEM_SIZE, decode_normal, encode_normal, pack_db_id, u16_to_unit_f32, unit_f32_to_u16,
    unpack_db_id,
};

pub use flags::{DrawMode, FragFlags, frag_visible};
pub use math::Box3;
