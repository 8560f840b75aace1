//! Tests for merged-geometry construction

use std::sync::Arc;

use glam::{Mat3, Mat4, Quat, Vec3};
use vantage_common::{
    ATTR_ID, ATTR_NORMAL, ATTR_POSITION, Box3, GeometryBuffer, PrimitiveKind, VertexAttribute,
    decode_normal, encode_normal, unpack_db_id,
};

use super::*;
use crate::bucket::{BucketEntry, MergeBucket};

/// Store a u16 pair in one float slot (the u16 view aliases the low
/// half first on little-endian)
fn pack_u16_pair(a: u16, b: u16) -> f32 {
    f32::from_bits(a as u32 | ((b as u32) << 16))
}

fn unpack_u16_pair(f: f32) -> (u16, u16) {
    let bits = f.to_bits();
    (bits as u16, (bits >> 16) as u16)
}

/// Triangle geometry with positions at offset 0 and, optionally, one
/// shared packed normal at float offset 3
fn tri_geom(
    stride: u32,
    positions: &[Vec3],
    normal: Option<Vec3>,
    lines: bool,
) -> Arc<GeometryBuffer> {
    let mut vb = vec![0.0f32; positions.len() * stride as usize];
    for (v, p) in positions.iter().enumerate() {
        let at = v * stride as usize;
        vb[at] = p.x;
        vb[at + 1] = p.y;
        vb[at + 2] = p.z;
        if let Some(n) = normal {
            let (a, b) = encode_normal(n.normalize());
            vb[at + 3] = pack_u16_pair(a, b);
        }
    }
    let ib: Vec<u16> = (0..positions.len() as u16).collect();
    let ib_lines = lines.then(|| vec![0u16, 1]);
    let mut g = GeometryBuffer::new(vb, stride, ib, ib_lines, PrimitiveKind::Triangles);
    g.add_attribute(ATTR_POSITION, VertexAttribute::float(0, 3));
    if normal.is_some() {
        g.add_attribute(ATTR_NORMAL, VertexAttribute::packed_u16(3, 2));
    }
    Arc::new(g)
}

fn bucket_of(entries: Vec<BucketEntry>) -> MergeBucket {
    let mut bucket = MergeBucket::new(0);
    for entry in entries {
        bucket.push(entry, &Box3::EMPTY);
    }
    bucket
}

fn entry(frag_id: u32, geom: &Arc<GeometryBuffer>, matrix: Mat4, db_id: u32) -> BucketEntry {
    BucketEntry {
        frag_id,
        geometry: geom.clone(),
        matrix,
        db_id,
    }
}

fn run_inline(bucket: &MergeBucket) -> GeometryBuffer {
    let (dest, task) = create_merged_geometry(bucket, 0);
    let mut coordinator = MergeCoordinator::new(0);
    coordinator.enqueue(task, dest);
    let mut done = coordinator.run().unwrap();
    done.remove(&0).unwrap()
}

#[test]
fn test_two_fragments_merge_into_one_buffer() {
    // Two 3-vertex triangles at stride 32, identity and unit-x offset
    let positions = [
        Vec3::new(0.0, 0.0, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
    ];
    let g = tri_geom(32, &positions, None, false);
    let bucket = bucket_of(vec![
        entry(0, &g, Mat4::IDENTITY, 10),
        entry(1, &g, Mat4::from_translation(Vec3::X), 11),
    ]);

    let merged = run_inline(&bucket);
    assert_eq!(merged.vb.len(), 192);
    assert_eq!(merged.ib.as_slice(), &[0, 1, 2, 3, 4, 5]);
    assert_eq!(merged.vertex_count(), 6);

    // Vertex 3 is the second fragment's first vertex, shifted by +1 in x
    let at = 3 * 32;
    assert_eq!(merged.vb[at], positions[0].x + 1.0);
    assert_eq!(merged.vb[at + 1], positions[0].y);
    assert_eq!(merged.vb[at + 2], positions[0].z);
}

#[test]
fn test_positions_bake_in_world_transform() {
    let positions = [
        Vec3::new(1.0, 2.0, 3.0),
        Vec3::new(-4.0, 0.5, 2.0),
        Vec3::new(0.0, -1.0, 7.0),
    ];
    let matrix = Mat4::from_scale_rotation_translation(
        Vec3::new(2.0, 1.0, 0.5),
        Quat::from_rotation_y(0.7),
        Vec3::new(10.0, -3.0, 1.0),
    );
    let g = tri_geom(4, &positions, None, false);
    let bucket = bucket_of(vec![entry(0, &g, matrix, 1)]);

    let merged = run_inline(&bucket);
    for (v, p) in positions.iter().enumerate() {
        let expected = matrix.transform_point3(*p);
        let at = v * 4;
        let got = Vec3::new(merged.vb[at], merged.vb[at + 1], merged.vb[at + 2]);
        assert!(
            (got - expected).length() <= 1e-5 * expected.length().max(1.0),
            "vertex {v}: expected {expected:?}, got {got:?}"
        );
    }
}

#[test]
fn test_normals_transform_through_inverse_transpose() {
    let positions = [Vec3::ZERO, Vec3::X, Vec3::Y];
    let normal = Vec3::new(0.0, 0.0, 1.0);
    // Non-uniform scale: normals must not transform like positions
    let matrix = Mat4::from_scale(Vec3::new(4.0, 1.0, 0.25));
    let g = tri_geom(4, &positions, Some(normal), false);
    let bucket = bucket_of(vec![entry(0, &g, matrix, 1)]);

    let merged = run_inline(&bucket);
    let expected = (Mat3::from_mat4(matrix).inverse().transpose() * normal).normalize();
    for v in 0..3 {
        let (a, b) = unpack_u16_pair(merged.vb[v * 4 + 3]);
        let decoded = decode_normal(a, b);
        assert!(
            (decoded - expected).abs().max_element() <= 2.0 / 65535.0,
            "vertex {v}: expected {expected:?}, got {decoded:?}"
        );
        assert!((decoded.length() - 1.0).abs() < 1e-5);
    }
}

#[test]
fn test_vertex_ids_are_le_triples_per_source_range() {
    let g = tri_geom(4, &[Vec3::ZERO, Vec3::X, Vec3::Y], None, false);
    let bucket = bucket_of(vec![
        entry(0, &g, Mat4::IDENTITY, 0x00A1_B2C3),
        entry(1, &g, Mat4::IDENTITY, 0x0000_0042),
    ]);

    let merged = run_inline(&bucket);
    let ids = merged.vertex_ids.as_ref().unwrap();
    assert_eq!(ids.len(), 6 * 3);
    for v in 0..3 {
        assert_eq!(unpack_db_id(&ids[v * 3..]), 0x00A1_B2C3);
    }
    for v in 3..6 {
        assert_eq!(unpack_db_id(&ids[v * 3..]), 0x42);
    }
    // Schema advertises the separate id stream
    let id_attr = merged.attribute(ATTR_ID).unwrap();
    assert_eq!(id_attr.item_size, 3);
    assert_eq!(id_attr.bytes_per_item, 1);
    assert!(id_attr.normalized);
    assert_eq!(id_attr.item_offset, None);
}

#[test]
fn test_line_indices_rebase_like_triangle_indices() {
    let g = tri_geom(4, &[Vec3::ZERO, Vec3::X, Vec3::Y], None, true);
    let bucket = bucket_of(vec![
        entry(0, &g, Mat4::IDENTITY, 1),
        entry(1, &g, Mat4::IDENTITY, 2),
    ]);

    let (dest, _task) = create_merged_geometry(&bucket, 0);
    assert_eq!(dest.ib.as_slice(), &[0, 1, 2, 3, 4, 5]);
    assert_eq!(dest.ib_lines.as_ref().unwrap().as_slice(), &[0, 1, 3, 4]);

    // Every rebased index stays within the merged vertex range
    let vertex_count = bucket.vertex_count as u16;
    assert!(dest.ib.iter().all(|&i| i < vertex_count));
    assert!(
        dest.ib_lines
            .as_ref()
            .unwrap()
            .iter()
            .all(|&i| i < vertex_count)
    );
}

#[test]
fn test_merged_byte_size_matches_installed_buffers() {
    let g = tri_geom(5, &[Vec3::ZERO, Vec3::X, Vec3::Y], None, true);
    let bucket = bucket_of(vec![
        entry(0, &g, Mat4::IDENTITY, 1),
        entry(1, &g, Mat4::IDENTITY, 2),
    ]);

    let merged = run_inline(&bucket);
    assert_eq!(merged.byte_size, merged.computed_byte_size());
}

#[test]
fn test_worker_pool_matches_inline_output() {
    let positions = [Vec3::ZERO, Vec3::X, Vec3::Y];
    let matrix = Mat4::from_rotation_z(1.1);
    let with_normals = tri_geom(4, &positions, Some(Vec3::new(0.3, -0.5, 0.8)), false);
    let plain = tri_geom(6, &positions, None, true);

    let make_buckets = || {
        vec![
            bucket_of(vec![
                entry(0, &with_normals, Mat4::IDENTITY, 5),
                entry(1, &with_normals, matrix, 6),
            ]),
            bucket_of(vec![
                entry(2, &plain, matrix, 7),
                entry(3, &plain, Mat4::IDENTITY, 8),
            ]),
        ]
    };

    let run_with = |workers: usize| {
        let mut coordinator = MergeCoordinator::new(workers);
        for (id, bucket) in make_buckets().iter().enumerate() {
            let (dest, task) = create_merged_geometry(bucket, id as u32);
            coordinator.enqueue(task, dest);
        }
        coordinator.run().unwrap()
    };

    let inline = run_with(0);
    let pooled = run_with(2);
    for id in 0..2u32 {
        let a = &inline[&id];
        let b = &pooled[&id];
        assert_eq!(a.vb.as_slice(), b.vb.as_slice());
        assert_eq!(a.vertex_ids, b.vertex_ids);
        assert_eq!(a.ib.as_slice(), b.ib.as_slice());
    }
}
