//! Fragment consolidation engine for the Vantage viewer
//!
//! Large models arrive as thousands of independent renderable fragments,
//! each with its own small geometry, material, world transform, and
//! database id. Drawing them one by one is draw-call bound long before it
//! is vertex bound. This crate preprocesses a fragment list into a much
//! smaller set of drawable meshes using two complementary techniques:
//!
//! - **Buffer merging**: compatible small geometries of one material are
//!   concatenated into a single vertex/index buffer with world transforms
//!   baked in and per-vertex id triples for picking/theming.
//! - **Hardware instancing**: repeated geometries become one mesh with
//!   per-instance offset/rotation/scale/id streams.
//!
//! Both stay under a caller-supplied byte budget, and both keep
//! per-fragment visibility, highlighting, and theming addressable at draw
//! time through sub-draw-call ranges - no buffer rebuild when flags
//! change.
//!
//! # Architecture
//!
//! [`consolidate_fragment_list`] runs the pipeline end to end:
//! instance counting → cost-sorted fragment order →
//! [`builder::ConsolidationBuilder`] partitions fragments into merge
//! buckets under the budget → [`merge::MergeCoordinator`] runs one
//! [`merge::MergeTask`] per bucket (inline or on a worker pool) →
//! leftover fragments go through [`instancing::InstanceBufferBuilder`] or
//! pass through as single-fragment meshes → [`residency`] assigns
//! GPU-resident vs streaming classes → the [`Consolidation`] result is
//! returned. Per-frame state is applied afterwards with
//! [`Consolidation::apply_attributes`].
//!
//! The engine never talks to the GPU; it consumes the scene through the
//! narrow traits in [`scene`] and hands renderable meshes back.

pub mod bucket;
pub mod builder;
pub mod compat;
pub mod consolidate;
pub mod consolidation;
pub mod error;
pub mod instancing;
pub mod merge;
pub mod mesh;
pub mod residency;
pub mod scene;

#[cfg(test)]
pub(crate) mod test_utils;

pub use builder::{ConsolidationBuilder, ConsolidationMap};
pub use consolidate::{ConsolidateOptions, consolidate_fragment_list};
pub use consolidation::Consolidation;
pub use error::ConsolidationError;
pub use mesh::{BvhOptions, ConsolidatedMesh, DrawGroup, DrawRange, MeshOrigin};
pub use scene::{
    FragmentList, GeometryList, MaterialHandle, MaterialManager, MaterialVariant, Renderer,
};
