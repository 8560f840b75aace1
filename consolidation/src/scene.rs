//! Collaborator interfaces the engine consumes
//!
//! The consolidation engine reads the scene and hands results back
//! through these traits; it owns none of the data behind them. Fragment
//! lists and source geometries are read-only for the duration of a build.

use std::sync::Arc;

use glam::{Mat4, Vec4};
use vantage_common::{Box3, GeometryBuffer};

/// Opaque handle to a material owned by the material manager
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u32);

/// Which shader-side attribute layout a consolidated mesh needs
///
/// Merged geometries carry per-vertex id triples, instanced geometries
/// carry per-instance transform/id streams; each needs a matching shader
/// program, so the material manager hands out a variant per layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialVariant {
    VertexIds,
    Instanced,
}

/// Read access to the fragments of one model
///
/// Fragment ids are dense indices `0..count()`. `geometry` may return
/// `None` for fragments whose geometry failed to load; the engine drops
/// those.
pub trait FragmentList {
    fn count(&self) -> usize;
    fn geometry_id(&self, frag: u32) -> u32;
    fn material_id(&self, frag: u32) -> u32;
    fn geometry(&self, frag: u32) -> Option<Arc<GeometryBuffer>>;
    fn material(&self, frag: u32) -> MaterialHandle;
    /// World transform as loaded, unaffected by any runtime model
    /// transform
    fn original_world_matrix(&self, frag: u32) -> Mat4;
    fn world_bounds(&self, frag: u32) -> Box3;
    /// 24-bit database id of the logical object this fragment belongs to
    fn db_id(&self, frag: u32) -> u32;
    /// Current visibility flag byte (see `vantage_common::flags`)
    fn viz_flags(&self, frag: u32) -> u8;
    /// Current theming tint for a database id, if any
    fn theming_color(&self, db_id: u32) -> Option<Vec4>;
}

/// Hands out shader-compatible material variants
pub trait MaterialManager {
    fn variant(
        &mut self,
        material: MaterialHandle,
        variant: MaterialVariant,
        model_id: u32,
    ) -> MaterialHandle;
}

/// Residency policy hook of the geometry list
pub trait GeometryList {
    /// Decide whether `geom` lives on the GPU or streams per draw, given
    /// how often it is instanced and how much GPU budget is already
    /// spoken for. Implementations record the decision via
    /// `geom.set_streaming_draw`.
    fn choose_memory_type(
        &mut self,
        geom: &GeometryBuffer,
        instance_count: u32,
        gpu_mesh_count: u32,
        gpu_byte_count: u64,
    );
}

/// Minimal renderer capabilities the engine depends on
pub trait Renderer {
    fn supports_instanced_arrays(&self) -> bool;
    /// Release the GPU copy of a geometry whose residency class flipped
    /// to streaming. Returns false when the deallocation failed; the
    /// engine logs and continues.
    fn deallocate_geometry(&mut self, geom: &GeometryBuffer) -> bool;
}
