//! Per-bucket merge job
//!
//! Pure data-parallel work: sources are shared read-only, the output is
//! freshly allocated and moved back to the coordinator. Nothing here
//! touches the destination geometry, so tasks can complete in any order.

use std::sync::Arc;

use glam::{Mat3, Vec3};
use vantage_common::{ID_ITEM_SIZE, decode_normal, encode_normal, pack_db_id};

/// One source geometry's share of a merge task
#[derive(Clone, Debug)]
pub struct MergeSource {
    pub vb: Arc<Vec<f32>>,
    pub vertex_count: u32,
    pub matrix: glam::Mat4,
    pub db_id: u32,
}

/// Fills the merged vertex buffer and id stream for one bucket
#[derive(Clone, Debug)]
pub struct MergeTask {
    pub task_id: u32,
    /// Stride in floats, shared by all sources
    pub stride: u32,
    /// Float offset of the position attribute
    pub position_offset: u32,
    /// Float offset of the packed-normal attribute; `None` when the
    /// sources carry no normals
    pub normal_offset: Option<u32>,
    pub total_vertices: u32,
    pub sources: Vec<MergeSource>,
}

/// Result of a merge task, installed on the destination geometry
#[derive(Debug)]
pub struct MergeOutput {
    pub task_id: u32,
    pub vb: Vec<f32>,
    /// Little-endian id triples, one per vertex
    pub vertex_ids: Vec<u8>,
}

impl MergeTask {
    /// Run to completion and return the populated buffers
    pub fn run(&self) -> MergeOutput {
        let stride = self.stride as usize;
        let mut vb = vec![0.0f32; self.total_vertices as usize * stride];
        let mut vertex_ids = vec![0u8; self.total_vertices as usize * ID_ITEM_SIZE];

        let mut v_base = 0usize;
        for src in &self.sources {
            let count = src.vertex_count as usize;
            let dst = v_base * stride..(v_base + count) * stride;
            vb[dst.clone()].copy_from_slice(&src.vb[..count * stride]);

            self.transform_positions(&mut vb[dst.clone()], count, &src.matrix);
            if let Some(offset) = self.normal_offset {
                self.transform_normals(&mut vb[dst], count, &src.matrix, offset as usize);
            }

            for v in 0..count {
                let at = (v_base + v) * ID_ITEM_SIZE;
                pack_db_id(src.db_id, &mut vertex_ids[at..at + ID_ITEM_SIZE]);
            }

            v_base += count;
        }

        MergeOutput {
            task_id: self.task_id,
            vb,
            vertex_ids,
        }
    }

    fn transform_positions(&self, range: &mut [f32], count: usize, matrix: &glam::Mat4) {
        let stride = self.stride as usize;
        let pos = self.position_offset as usize;
        for v in 0..count {
            let at = v * stride + pos;
            let p = matrix.transform_point3(Vec3::new(range[at], range[at + 1], range[at + 2]));
            range[at] = p.x;
            range[at + 1] = p.y;
            range[at + 2] = p.z;
        }
    }

    /// Decode, rotate through the normal matrix, renormalize, re-encode.
    /// The packed pairs live inside the float-interleaved buffer; the u16
    /// view aliases the same bytes.
    fn transform_normals(&self, range: &mut [f32], count: usize, matrix: &glam::Mat4, offset: usize) {
        let stride = self.stride as usize;
        let normal_matrix = Mat3::from_mat4(*matrix).inverse().transpose();

        let as_u16: &mut [u16] = bytemuck::cast_slice_mut(range);
        for v in 0..count {
            let at = (v * stride + offset) * 2;
            let n = decode_normal(as_u16[at], as_u16[at + 1]);
            let n = (normal_matrix * n).normalize_or_zero();
            let (a, b) = encode_normal(n);
            as_u16[at] = a;
            as_u16[at + 1] = b;
        }
    }
}
