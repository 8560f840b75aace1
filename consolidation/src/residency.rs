//! Residency assignment
//!
//! Every geometry ends up either GPU-resident or streamed per draw; the
//! policy lives in the geometry list, the visiting order here. Output
//! meshes are visited first so consolidated and instanced buffers get
//! first claim on GPU memory, then the original fragment geometries in
//! fragment order. A geometry already visited through a single-fragment
//! mesh is not visited again.

use hashbrown::{HashMap, HashSet};
use std::sync::Arc;
use tracing::warn;
use vantage_common::GeometryBuffer;

use crate::mesh::{ConsolidatedMesh, MeshOrigin};
use crate::scene::{FragmentList, GeometryList, Renderer};

/// Run the two-phase residency pass over a consolidation's meshes and
/// the fragment list they were built from
pub fn choose_memory_types<F, G, R>(
    meshes: &[ConsolidatedMesh],
    frags: &F,
    geometries: &mut G,
    renderer: &mut R,
    instance_counts: &HashMap<u32, u32>,
) where
    F: FragmentList + ?Sized,
    G: GeometryList + ?Sized,
    R: Renderer + ?Sized,
{
    let mut visited: HashSet<usize> = HashSet::new();
    let mut gpu_mesh_count = 0u32;
    let mut gpu_byte_count = 0u64;

    // Phase 1: output meshes, so containers win the GPU budget
    for mesh in meshes {
        let geom = &mesh.geometry;
        let instance_count = match &mesh.origin {
            MeshOrigin::Merged { .. } => 1,
            MeshOrigin::Instanced { .. } => geom.instances.as_ref().map_or(1, |s| s.count),
            MeshOrigin::Single { frag_id } => instance_count_for(frags, *frag_id, instance_counts),
        };

        geometries.choose_memory_type(geom, instance_count, gpu_mesh_count, gpu_byte_count);
        if !geom.streaming_draw() {
            gpu_mesh_count += 1;
            gpu_byte_count += geom.byte_size;
        }

        match &mesh.origin {
            // Shared source geometry: phase 2 must not re-decide it
            MeshOrigin::Single { .. } => {
                visited.insert(geometry_key(geom));
            }
            // A merged buffer serves no other mesh; its CPU copy can go
            // after upload
            MeshOrigin::Merged { .. } => geom.set_discard_after_upload(true),
            MeshOrigin::Instanced { .. } => {}
        }
    }

    // Phase 2: original fragment geometries in fragment order
    for f in 0..frags.count() as u32 {
        let Some(geom) = frags.geometry(f) else {
            continue;
        };
        if !visited.insert(geometry_key(&geom)) {
            continue;
        }

        let was_resident = !geom.streaming_draw();
        let instance_count = instance_count_for(frags, f, instance_counts);
        geometries.choose_memory_type(&geom, instance_count, gpu_mesh_count, gpu_byte_count);

        if !geom.streaming_draw() {
            gpu_mesh_count += 1;
            gpu_byte_count += geom.byte_size;
        } else if was_resident && !renderer.deallocate_geometry(&geom) {
            warn!(frag = f, "failed to release GPU copy of demoted geometry");
        }
    }
}

fn geometry_key(geom: &Arc<GeometryBuffer>) -> usize {
    Arc::as_ptr(geom) as usize
}

fn instance_count_for<F>(frags: &F, frag: u32, counts: &HashMap<u32, u32>) -> u32
where
    F: FragmentList + ?Sized,
{
    counts
        .get(&frags.geometry_id(frag))
        .copied()
        .unwrap_or(1)
}
