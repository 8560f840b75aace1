//! Output mesh types of the consolidation engine
//!
//! A consolidation produces three kinds of meshes: merged containers
//! (new geometry, transforms baked in), instanced containers (shared
//! geometry plus per-instance streams), and single-fragment meshes that
//! share their source geometry and material unchanged.

use std::sync::Arc;

use glam::{Mat4, Vec4};
use vantage_common::{Box3, GeometryBuffer};

use crate::scene::MaterialHandle;

/// Sub-draw-call range of a container mesh
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawRange {
    /// Index-unit range of a merged container, with the matching
    /// line-index range for edge rendering (`edge_count == 0` when the
    /// covered fragments have no edges)
    Indexed {
        start: u32,
        count: u32,
        edge_start: u32,
        edge_count: u32,
    },
    /// Instance range of an instanced container
    Instanced { start: u32, count: u32 },
}

/// One draw call of a partitioned container: a contiguous range drawn
/// with one theming state
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DrawGroup {
    pub range: DrawRange,
    pub theming_color: Option<Vec4>,
}

/// Where a mesh came from, and which fragments it renders
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MeshOrigin {
    /// Merged container; fragments in packing order
    Merged { frag_ids: Vec<u32> },
    /// Instanced container; fragments in instance order
    Instanced { frag_ids: Vec<u32> },
    /// Shares the source geometry of one fragment
    Single { frag_id: u32 },
}

/// One renderable output mesh
#[derive(Clone, Debug)]
pub struct ConsolidatedMesh {
    pub geometry: Arc<GeometryBuffer>,
    pub material: MaterialHandle,
    /// Identity for containers (transforms are baked in / carried per
    /// instance); the fragment's original matrix for singles
    pub world_matrix: Mat4,
    /// Set for single-fragment meshes only; containers carry ids per
    /// vertex or per instance
    pub db_id: Option<u32>,
    pub model_id: u32,
    pub bounds: Box3,
    /// Always false - frustum culling happens against the BVH outside
    /// the engine
    pub frustum_culled: bool,
    pub visible: bool,
    pub theming_color: Option<Vec4>,
    /// Draw-call partition of a container; empty for singles and for the
    /// whole-container fast path
    pub groups: Vec<DrawGroup>,
    pub origin: MeshOrigin,
}

impl ConsolidatedMesh {
    pub fn merged(
        geometry: Arc<GeometryBuffer>,
        material: MaterialHandle,
        model_id: u32,
        bounds: Box3,
        frag_ids: Vec<u32>,
    ) -> Self {
        Self {
            geometry,
            material,
            world_matrix: Mat4::IDENTITY,
            db_id: None,
            model_id,
            bounds,
            frustum_culled: false,
            visible: true,
            theming_color: None,
            groups: Vec::new(),
            origin: MeshOrigin::Merged { frag_ids },
        }
    }

    pub fn instanced(
        geometry: Arc<GeometryBuffer>,
        material: MaterialHandle,
        model_id: u32,
        bounds: Box3,
        frag_ids: Vec<u32>,
    ) -> Self {
        Self {
            geometry,
            material,
            world_matrix: Mat4::IDENTITY,
            db_id: None,
            model_id,
            bounds,
            frustum_culled: false,
            visible: true,
            theming_color: None,
            groups: Vec::new(),
            origin: MeshOrigin::Instanced { frag_ids },
        }
    }

    pub fn single(
        geometry: Arc<GeometryBuffer>,
        material: MaterialHandle,
        model_id: u32,
        world_matrix: Mat4,
        bounds: Box3,
        frag_id: u32,
        db_id: u32,
    ) -> Self {
        Self {
            geometry,
            material,
            world_matrix,
            db_id: Some(db_id),
            model_id,
            bounds,
            frustum_culled: false,
            visible: true,
            theming_color: None,
            groups: Vec::new(),
            origin: MeshOrigin::Single { frag_id },
        }
    }

    /// True for merged and instanced meshes
    pub fn is_container(&self) -> bool {
        !matches!(self.origin, MeshOrigin::Single { .. })
    }
}

/// Hints handed to the external BVH builder
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BvhOptions {
    pub frags_per_leaf_node: u32,
    pub max_polys_per_node: u32,
}

impl Default for BvhOptions {
    fn default() -> Self {
        Self {
            frags_per_leaf_node: 1,
            max_polys_per_node: 10_000,
        }
    }
}
