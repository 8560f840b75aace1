//! Instance buffer construction
//!
//! Repeated geometries become one mesh with per-instance
//! offset/rotation/scale/id streams. The source vertex and index buffers
//! are shared, not copied. Only matrices that survive a
//! decompose-recompose round trip are accepted; shear and other
//! non-TRS transforms fall back to single-fragment meshes.

use glam::Mat4;
use tracing::trace;
use vantage_common::{
    ATTR_ID, ATTR_INST_OFFSET, ATTR_INST_ROTATION, ATTR_INST_SCALING, GeometryBuffer,
    InstanceStreams, VertexAttribute, pack_db_id,
};

/// Element-wise closeness with the absolute tolerance used for
/// decomposition validation
fn matrices_close(a: &Mat4, b: &Mat4) -> bool {
    let a = a.to_cols_array();
    let b = b.to_cols_array();
    a.iter().zip(b.iter()).all(|(&x, &y)| {
        let tolerance = 1e-4 * 1.0f32.max(x.abs().min(y.abs()));
        (x - y).abs() <= tolerance
    })
}

/// Accumulates per-instance streams for one run of equal geometries
pub struct InstanceBufferBuilder {
    offsets: Vec<f32>,
    rotations: Vec<f32>,
    scalings: Vec<f32>,
    ids: Vec<u8>,
}

impl InstanceBufferBuilder {
    pub fn with_capacity(instances: usize) -> Self {
        Self {
            offsets: Vec::with_capacity(instances * 3),
            rotations: Vec::with_capacity(instances * 4),
            scalings: Vec::with_capacity(instances * 3),
            ids: Vec::with_capacity(instances * 3),
        }
    }

    /// Number of accepted instances
    pub fn len(&self) -> u32 {
        (self.offsets.len() / 3) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Decompose one instance matrix and append its streams
    ///
    /// Returns false (leaving the streams untouched) when recomposing the
    /// decomposition does not reproduce the matrix - the transform cannot
    /// be expressed as offset/quaternion/scale.
    pub fn try_add(&mut self, matrix: &Mat4, db_id: u32) -> bool {
        let (scale, rotation, offset) = matrix.to_scale_rotation_translation();
        let recomposed = Mat4::from_scale_rotation_translation(scale, rotation, offset);
        if !matrices_close(matrix, &recomposed) {
            trace!(db_id, "instance matrix does not decompose; rejected");
            return false;
        }

        self.offsets.extend_from_slice(&[offset.x, offset.y, offset.z]);
        self.rotations
            .extend_from_slice(&[rotation.x, rotation.y, rotation.z, rotation.w]);
        self.scalings.extend_from_slice(&[scale.x, scale.y, scale.z]);
        let at = self.ids.len();
        self.ids.resize(at + 3, 0);
        pack_db_id(db_id, &mut self.ids[at..]);
        true
    }

    /// Close the run: build a geometry sharing `source`'s buffers and
    /// schema, carrying the accumulated instance streams
    ///
    /// Must only be called with at least one accepted instance.
    pub fn build(self, source: &GeometryBuffer) -> GeometryBuffer {
        let count = self.len();
        let mut geom = GeometryBuffer::new(Vec::new(), source.vb_stride, Vec::new(), None, source.primitive);
        geom.vb = source.vb.clone();
        geom.ib = source.ib.clone();
        geom.ib_lines = source.ib_lines.clone();
        geom.line_width = source.line_width;
        geom.point_size = source.point_size;
        for name in &source.attribute_order {
            geom.add_attribute(name, source.attributes[name.as_str()]);
        }
        geom.add_attribute(ATTR_INST_OFFSET, VertexAttribute::instance_floats(3));
        geom.add_attribute(ATTR_INST_ROTATION, VertexAttribute::instance_floats(4));
        geom.add_attribute(ATTR_INST_SCALING, VertexAttribute::instance_floats(3));
        geom.add_attribute(ATTR_ID, VertexAttribute::instance_ids());

        let streams = InstanceStreams {
            offsets: self.offsets,
            rotations: self.rotations,
            scalings: self.scalings,
            ids: self.ids,
            count,
        };
        // Shared vb/ib plus the transform streams; the id stream is
        // tracked separately
        geom.byte_size = (geom.vb.len() * 4 + geom.ib.len() * 2) as u64
            + geom.ib_lines.as_ref().map_or(0, |l| (l.len() * 2) as u64)
            + streams.transform_byte_size();
        geom.instances = Some(streams);
        geom
    }
}
