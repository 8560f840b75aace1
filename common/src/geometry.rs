//! Interleaved geometry buffers with an explicit attribute schema
//!
//! A [`GeometryBuffer`] is the unit the renderer draws: one interleaved
//! float vertex buffer, a 16-bit index buffer, an optional line index
//! buffer for edge rendering, and a schema describing where each named
//! attribute lives. Source schemas vary per model, so the schema is an
//! explicit map keyed by attribute name rather than a closed format enum.
//!
//! Two kinds of side streams exist outside the interleaved buffer:
//! per-vertex id triples on merged geometries and per-instance
//! transform/id streams on instanced geometries. Their attributes appear
//! in the schema with no interleave offset.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hashbrown::HashMap;
use smallvec::SmallVec;

/// Interleaved position attribute name
pub const ATTR_POSITION: &str = "position";
/// Interleaved packed-normal attribute name (u16 pair)
pub const ATTR_NORMAL: &str = "normal";
/// Per-vertex or per-instance id attribute name (u8 triple)
pub const ATTR_ID: &str = "id";
/// Per-instance translation attribute name
pub const ATTR_INST_OFFSET: &str = "instOffset";
/// Per-instance rotation attribute name (quaternion xyzw)
pub const ATTR_INST_ROTATION: &str = "instRotation";
/// Per-instance scale attribute name
pub const ATTR_INST_SCALING: &str = "instScaling";

/// What the index buffer describes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrimitiveKind {
    Triangles,
    Lines,
    WideLines,
    Points,
}

/// Layout of one named attribute
///
/// `item_offset` is the offset in floats into the interleaved buffer;
/// `None` marks attributes backed by a dedicated side stream (ids,
/// instance transforms).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub item_offset: Option<u32>,
    pub item_size: u8,
    pub bytes_per_item: u8,
    pub normalized: bool,
    pub is_pattern: bool,
    /// 0 = per-vertex, 1 = per-instance
    pub divisor: u32,
}

impl VertexAttribute {
    /// Interleaved f32 attribute
    pub const fn float(item_offset: u32, item_size: u8) -> Self {
        Self {
            item_offset: Some(item_offset),
            item_size,
            bytes_per_item: 4,
            normalized: false,
            is_pattern: false,
            divisor: 0,
        }
    }

    /// Interleaved normalized-u16 attribute (packed normals)
    pub const fn packed_u16(item_offset: u32, item_size: u8) -> Self {
        Self {
            item_offset: Some(item_offset),
            item_size,
            bytes_per_item: 2,
            normalized: true,
            is_pattern: false,
            divisor: 0,
        }
    }

    /// Per-vertex id triple in a dedicated byte stream
    pub const fn vertex_ids() -> Self {
        Self {
            item_offset: None,
            item_size: 3,
            bytes_per_item: 1,
            normalized: true,
            is_pattern: false,
            divisor: 0,
        }
    }

    /// Per-instance f32 stream attribute
    pub const fn instance_floats(item_size: u8) -> Self {
        Self {
            item_offset: None,
            item_size,
            bytes_per_item: 4,
            normalized: false,
            is_pattern: false,
            divisor: 1,
        }
    }

    /// Per-instance id triple
    pub const fn instance_ids() -> Self {
        Self {
            item_offset: None,
            item_size: 3,
            bytes_per_item: 1,
            normalized: true,
            is_pattern: false,
            divisor: 1,
        }
    }
}

/// Per-instance parallel arrays of an instanced geometry
///
/// All four streams have one entry per accepted instance; the rotation is
/// a unit quaternion (x, y, z, w).
#[derive(Clone, Debug, Default)]
pub struct InstanceStreams {
    pub offsets: Vec<f32>,
    pub rotations: Vec<f32>,
    pub scalings: Vec<f32>,
    pub ids: Vec<u8>,
    pub count: u32,
}

impl InstanceStreams {
    /// Bytes held by the transform streams (ids are tracked separately)
    pub fn transform_byte_size(&self) -> u64 {
        ((self.offsets.len() + self.rotations.len() + self.scalings.len()) * 4) as u64
    }
}

/// One renderable geometry: interleaved vertex buffer, index buffers,
/// attribute schema, and primitive metadata
///
/// `vb`, `ib` and `ib_lines` are reference-counted so an instanced
/// geometry can alias its source without copying vertex data.
#[derive(Debug)]
pub struct GeometryBuffer {
    pub vb: Arc<Vec<f32>>,
    /// Stride in floats (4-byte multiple by construction)
    pub vb_stride: u32,
    pub ib: Arc<Vec<u16>>,
    pub ib_lines: Option<Arc<Vec<u16>>>,

    pub attributes: HashMap<String, VertexAttribute>,
    pub attribute_order: SmallVec<[String; 8]>,

    pub primitive: PrimitiveKind,
    /// Valid for `Lines` / `WideLines`
    pub line_width: f32,
    /// Valid for `Points`
    pub point_size: f32,

    /// Summed buffer byte length; 0 means unknown (excluded from cost
    /// accounting)
    pub byte_size: u64,

    /// Per-vertex id triples of a merged geometry
    pub vertex_ids: Option<Vec<u8>>,
    /// Per-instance streams of an instanced geometry
    pub instances: Option<InstanceStreams>,

    streaming_draw: AtomicBool,
    discard_after_upload: AtomicBool,
}

impl GeometryBuffer {
    pub fn new(
        vb: Vec<f32>,
        vb_stride: u32,
        ib: Vec<u16>,
        ib_lines: Option<Vec<u16>>,
        primitive: PrimitiveKind,
    ) -> Self {
        let mut geom = Self {
            vb: Arc::new(vb),
            vb_stride,
            ib: Arc::new(ib),
            ib_lines: ib_lines.map(Arc::new),
            attributes: HashMap::new(),
            attribute_order: SmallVec::new(),
            primitive,
            line_width: 1.0,
            point_size: 1.0,
            byte_size: 0,
            vertex_ids: None,
            instances: None,
            streaming_draw: AtomicBool::new(false),
            discard_after_upload: AtomicBool::new(false),
        };
        geom.byte_size = geom.computed_byte_size();
        geom
    }

    /// Summed byte length of the owned buffers
    pub fn computed_byte_size(&self) -> u64 {
        let lines = self.ib_lines.as_ref().map_or(0, |l| l.len() * 2);
        (self.vb.len() * 4 + self.ib.len() * 2 + lines) as u64
    }

    #[inline]
    pub fn vertex_count(&self) -> u32 {
        if self.vb_stride == 0 {
            return 0;
        }
        (self.vb.len() / self.vb_stride as usize) as u32
    }

    pub fn add_attribute(&mut self, name: &str, attr: VertexAttribute) {
        if self.attributes.insert(name.to_string(), attr).is_none() {
            self.attribute_order.push(name.to_string());
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&VertexAttribute> {
        self.attributes.get(name)
    }

    /// Interleave offset in floats of a named attribute, if interleaved
    pub fn float_offset(&self, name: &str) -> Option<u32> {
        self.attributes.get(name).and_then(|a| a.item_offset)
    }

    /// Residency class: true when the buffers are streamed from CPU
    /// memory per draw instead of living on the GPU
    #[inline]
    pub fn streaming_draw(&self) -> bool {
        self.streaming_draw.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_streaming_draw(&self, streaming: bool) {
        self.streaming_draw.store(streaming, Ordering::Relaxed);
    }

    /// Whether the CPU copy can be released after GPU upload
    #[inline]
    pub fn discard_after_upload(&self) -> bool {
        self.discard_after_upload.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn set_discard_after_upload(&self, discard: bool) {
        self.discard_after_upload.store(discard, Ordering::Relaxed);
    }
}
