//! Test-only in-memory scene
//!
//! Provides a fragment list, material manager, geometry list, and
//! renderer good enough to run the full pipeline without a viewer or a
//! GPU.

use std::sync::Arc;

use glam::{Mat4, Vec3, Vec4};
use hashbrown::HashMap;
use vantage_common::{
    ATTR_POSITION, Box3, FragFlags, GeometryBuffer, PrimitiveKind, VertexAttribute,
};

use crate::scene::{
    FragmentList, GeometryList, MaterialHandle, MaterialManager, MaterialVariant, Renderer,
};

/// Marker the material manager ORs into vertex-id variants
pub const VERTEX_IDS_BIT: u32 = 0x0100_0000;
/// Marker the material manager ORs into instanced variants
pub const INSTANCED_BIT: u32 = 0x0200_0000;

pub struct FragSpec {
    pub geometry: Option<Arc<GeometryBuffer>>,
    pub geom_id: u32,
    pub material_id: u32,
    pub matrix: Mat4,
    pub db_id: u32,
    pub flags: u8,
}

#[derive(Default)]
pub struct SceneModel {
    pub frags: Vec<FragSpec>,
    pub theming: HashMap<u32, Vec4>,
}

impl SceneModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, spec: FragSpec) -> u32 {
        self.frags.push(spec);
        (self.frags.len() - 1) as u32
    }

    pub fn set_flags(&mut self, frag: u32, flags: FragFlags) {
        self.frags[frag as usize].flags = flags.bits();
    }

    pub fn set_theming(&mut self, db_id: u32, color: Vec4) {
        self.theming.insert(db_id, color);
    }
}

impl FragmentList for SceneModel {
    fn count(&self) -> usize {
        self.frags.len()
    }

    fn geometry_id(&self, frag: u32) -> u32 {
        self.frags[frag as usize].geom_id
    }

    fn material_id(&self, frag: u32) -> u32 {
        self.frags[frag as usize].material_id
    }

    fn geometry(&self, frag: u32) -> Option<Arc<GeometryBuffer>> {
        self.frags[frag as usize].geometry.clone()
    }

    fn material(&self, frag: u32) -> MaterialHandle {
        MaterialHandle(self.frags[frag as usize].material_id)
    }

    fn original_world_matrix(&self, frag: u32) -> Mat4 {
        self.frags[frag as usize].matrix
    }

    fn world_bounds(&self, frag: u32) -> Box3 {
        let spec = &self.frags[frag as usize];
        let Some(geom) = &spec.geometry else {
            return Box3::EMPTY;
        };
        let Some(offset) = geom.float_offset(ATTR_POSITION) else {
            return Box3::EMPTY;
        };
        let stride = geom.vb_stride as usize;
        let mut local = Box3::EMPTY;
        for v in 0..geom.vertex_count() as usize {
            let at = v * stride + offset as usize;
            local.expand_by_point(Vec3::new(geom.vb[at], geom.vb[at + 1], geom.vb[at + 2]));
        }
        local.transformed(&spec.matrix)
    }

    fn db_id(&self, frag: u32) -> u32 {
        self.frags[frag as usize].db_id
    }

    fn viz_flags(&self, frag: u32) -> u8 {
        self.frags[frag as usize].flags
    }

    fn theming_color(&self, db_id: u32) -> Option<Vec4> {
        self.theming.get(&db_id).copied()
    }
}

/// Material manager marking variants with high bits
#[derive(Default)]
pub struct VariantMaterials;

impl MaterialManager for VariantMaterials {
    fn variant(
        &mut self,
        material: MaterialHandle,
        variant: MaterialVariant,
        _model_id: u32,
    ) -> MaterialHandle {
        let bit = match variant {
            MaterialVariant::VertexIds => VERTEX_IDS_BIT,
            MaterialVariant::Instanced => INSTANCED_BIT,
        };
        MaterialHandle(material.0 | bit)
    }
}

/// Residency policy: GPU-resident until a byte budget is spent, then
/// streaming. Records every visit.
pub struct BudgetGeometryList {
    pub gpu_byte_budget: u64,
    /// (byte_size, instance_count) per visit, in visit order
    pub visits: Vec<(u64, u32)>,
}

impl BudgetGeometryList {
    pub fn unlimited() -> Self {
        Self {
            gpu_byte_budget: u64::MAX,
            visits: Vec::new(),
        }
    }

    pub fn with_budget(gpu_byte_budget: u64) -> Self {
        Self {
            gpu_byte_budget,
            visits: Vec::new(),
        }
    }
}

impl GeometryList for BudgetGeometryList {
    fn choose_memory_type(
        &mut self,
        geom: &GeometryBuffer,
        instance_count: u32,
        _gpu_mesh_count: u32,
        gpu_byte_count: u64,
    ) {
        self.visits.push((geom.byte_size, instance_count));
        geom.set_streaming_draw(gpu_byte_count + geom.byte_size > self.gpu_byte_budget);
    }
}

/// Renderer fake with switchable instancing support
pub struct FakeRenderer {
    pub instancing: bool,
    pub deallocations: usize,
    pub fail_deallocation: bool,
}

impl FakeRenderer {
    pub fn new() -> Self {
        Self {
            instancing: true,
            deallocations: 0,
            fail_deallocation: false,
        }
    }

    pub fn without_instancing() -> Self {
        Self {
            instancing: false,
            ..Self::new()
        }
    }
}

impl Renderer for FakeRenderer {
    fn supports_instanced_arrays(&self) -> bool {
        self.instancing
    }

    fn deallocate_geometry(&mut self, _geom: &GeometryBuffer) -> bool {
        self.deallocations += 1;
        !self.fail_deallocation
    }
}

/// Triangle-soup geometry with explicit positions at offset 0; indices
/// run 0..len
pub fn positions_geometry(stride: u32, positions: &[Vec3]) -> Arc<GeometryBuffer> {
    let mut vb = vec![0.0f32; positions.len() * stride as usize];
    for (v, p) in positions.iter().enumerate() {
        let at = v * stride as usize;
        vb[at] = p.x;
        vb[at + 1] = p.y;
        vb[at + 2] = p.z;
    }
    let ib: Vec<u16> = (0..positions.len() as u16).collect();
    let mut g = GeometryBuffer::new(vb, stride, ib, None, PrimitiveKind::Triangles);
    g.add_attribute(ATTR_POSITION, VertexAttribute::float(0, 3));
    Arc::new(g)
}

/// Position-only geometry with `vertices` vertices and one index per
/// vertex
pub fn geometry_n(vertices: u32, stride: u32) -> Arc<GeometryBuffer> {
    let positions: Vec<Vec3> = (0..vertices)
        .map(|v| Vec3::new(v as f32, 0.0, 0.0))
        .collect();
    positions_geometry(stride, &positions)
}

/// Visible fragment of one geometry
pub fn frag(
    geometry: &Arc<GeometryBuffer>,
    geom_id: u32,
    material_id: u32,
    matrix: Mat4,
    db_id: u32,
) -> FragSpec {
    FragSpec {
        geometry: Some(geometry.clone()),
        geom_id,
        material_id,
        matrix,
        db_id,
        flags: FragFlags::VISIBLE.bits(),
    }
}
