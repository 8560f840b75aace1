//! Merged-geometry construction
//!
//! One bucket becomes one merged geometry: the index buffers are rebased
//! and concatenated up front on the control thread, while the heavy part
//! - copying the vertex data, baking world transforms into positions and
//! packed normals, and writing per-vertex id triples - runs as a
//! [`MergeTask`], either inline or on the [`MergeCoordinator`]'s worker
//! pool.

mod coordinator;
mod task;

#[cfg(test)]
mod tests;

pub use coordinator::MergeCoordinator;
pub use task::{MergeOutput, MergeSource, MergeTask};

use vantage_common::{ATTR_ID, ATTR_NORMAL, ATTR_POSITION, GeometryBuffer, VertexAttribute};

use crate::bucket::MergeBucket;

/// Build the destination geometry for a bucket and the task that fills
/// its vertex data
///
/// The destination comes back with rebased index buffers, the schema of
/// the first source plus the id attribute, and an empty vertex buffer;
/// the coordinator installs the task's output into it. Buckets of size 1
/// never reach this point (their fragment shares the source geometry).
pub fn create_merged_geometry(bucket: &MergeBucket, task_id: u32) -> (GeometryBuffer, MergeTask) {
    let first = &bucket.entries[0].geometry;
    let stride = first.vb_stride;
    let total_vertices = bucket.vertex_count;

    let index_count: usize = bucket.entries.iter().map(|e| e.geometry.ib.len()).sum();
    let mut ib = Vec::with_capacity(index_count);
    let has_lines = bucket
        .entries
        .iter()
        .any(|e| e.geometry.ib_lines.is_some());
    let line_count: usize = bucket
        .entries
        .iter()
        .filter_map(|e| e.geometry.ib_lines.as_ref().map(|l| l.len()))
        .sum();
    let mut ib_lines = has_lines.then(|| Vec::with_capacity(line_count));

    let mut sources = Vec::with_capacity(bucket.entries.len());
    let mut v_base = 0u32;
    for entry in &bucket.entries {
        let geom = &entry.geometry;
        for &idx in geom.ib.iter() {
            ib.push(idx + v_base as u16);
        }
        if let (Some(out), Some(lines)) = (ib_lines.as_mut(), geom.ib_lines.as_ref()) {
            for &idx in lines.iter() {
                out.push(idx + v_base as u16);
            }
        }
        sources.push(MergeSource {
            vb: geom.vb.clone(),
            vertex_count: geom.vertex_count(),
            matrix: entry.matrix,
            db_id: entry.db_id,
        });
        v_base += geom.vertex_count();
    }

    let mut dest = GeometryBuffer::new(Vec::new(), stride, ib, ib_lines, first.primitive);
    dest.line_width = first.line_width;
    dest.point_size = first.point_size;
    for name in &first.attribute_order {
        dest.add_attribute(name, first.attributes[name.as_str()]);
    }
    dest.add_attribute(ATTR_ID, VertexAttribute::vertex_ids());
    // The vertex buffer arrives with the task output; account for it now
    dest.byte_size = (total_vertices as u64 * stride as u64 * 4)
        + (dest.ib.len() * 2) as u64
        + dest.ib_lines.as_ref().map_or(0, |l| (l.len() * 2) as u64);

    let task = MergeTask {
        task_id,
        stride,
        position_offset: first.float_offset(ATTR_POSITION).unwrap_or(0),
        normal_offset: first.float_offset(ATTR_NORMAL),
        total_vertices,
        sources,
    };

    (dest, task)
}
