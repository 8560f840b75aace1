//! Top-level consolidation pipeline
//!
//! Runs the full flow of the engine: instance counting, cost-ordered
//! fragment sorting, merge bucketing under the byte budget, merged-mesh
//! construction through the coordinator, instancing over repeated
//! geometries, single-fragment fallthrough, and the residency pass.


use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, warn};
use vantage_common::Box3;

use crate::bucket::{BucketEntry, MergeBucket};
use crate::builder::{ConsolidationBuilder, ConsolidationMap};
use crate::consolidation::Consolidation;
use crate::error::ConsolidationError;
use crate::instancing::InstanceBufferBuilder;
use crate::merge::{MergeCoordinator, create_merged_geometry};
use crate::mesh::ConsolidatedMesh;
use crate::residency;
use crate::scene::{FragmentList, GeometryList, MaterialHandle, MaterialManager, MaterialVariant, Renderer};

/// Tuning knobs of a consolidation build
#[derive(Clone, Copy, Debug)]
pub struct ConsolidateOptions {
    /// Memory the merge pass may spend on new buffers
    pub byte_limit: u64,
    /// Merge worker threads; 0 merges on the calling thread
    pub workers: usize,
}

impl ConsolidateOptions {
    pub const DEFAULT_BYTE_LIMIT: u64 = 100 * 1024 * 1024;
}

impl Default for ConsolidateOptions {
    fn default() -> Self {
        Self {
            byte_limit: Self::DEFAULT_BYTE_LIMIT,
            workers: 0,
        }
    }
}

/// A mesh slot filled either immediately or when its merge task lands
enum MeshSlot {
    Ready(ConsolidatedMesh),
    PendingMerge {
        task_id: u32,
        material: MaterialHandle,
        bounds: Box3,
        frag_ids: Vec<u32>,
    },
}

/// Consolidate one model's fragment list into a small set of meshes
///
/// Pass a previously obtained [`ConsolidationMap`] to replay that plan
/// (skipping counting, sorting, and bucketing); otherwise the plan is
/// built from scratch under `options.byte_limit`. The call blocks until
/// every merge task is installed, so the returned consolidation is
/// always ready. The only fatal failure is losing the merge worker pool;
/// callers should then keep rendering the original fragment list.
pub fn consolidate_fragment_list<F, M, G, R>(
    frags: &F,
    materials: &mut M,
    geometries: &mut G,
    renderer: &mut R,
    model_id: u32,
    options: &ConsolidateOptions,
    map: Option<Arc<ConsolidationMap>>,
) -> Result<Consolidation, ConsolidationError>
where
    F: FragmentList + ?Sized,
    M: MaterialManager + ?Sized,
    G: GeometryList + ?Sized,
    R: Renderer + ?Sized,
{
    let count = frags.count();
    let instance_counts = count_instances(frags);
    let map = match map {
        Some(map) => map,
        None => Arc::new(build_plan(frags, &instance_counts, options.byte_limit)),
    };

    let mut slots: Vec<MeshSlot> = Vec::new();
    let mut frag_to_mesh = vec![-1i32; count];
    let mut coordinator = MergeCoordinator::new(options.workers);
    let mut byte_size = 0u64;
    let mut missing_warned = false;

    // Merge pass: one mesh per bucket; size-1 buckets share their source
    for b in 0..map.bucket_count() {
        let frag_slice = &map.frag_order[map.bucket_range(b)];
        if frag_slice.len() == 1 {
            push_single(
                frags, model_id, frag_slice[0], &mut slots, &mut frag_to_mesh,
                &mut missing_warned,
            );
            continue;
        }

        let mut bucket = MergeBucket::new(frags.material_id(frag_slice[0]));
        for &f in frag_slice {
            let Some(geometry) = frags.geometry(f) else {
                warn_missing(&mut missing_warned, f);
                continue;
            };
            bucket.push(
                BucketEntry {
                    frag_id: f,
                    geometry,
                    matrix: frags.original_world_matrix(f),
                    db_id: frags.db_id(f),
                },
                &frags.world_bounds(f),
            );
        }
        match bucket.len() {
            0 => continue,
            1 => {
                push_single(
                    frags, model_id, bucket.entries[0].frag_id, &mut slots,
                    &mut frag_to_mesh, &mut missing_warned,
                );
                continue;
            }
            _ => {}
        }

        let task_id = b as u32;
        let (dest, task) = create_merged_geometry(&bucket, task_id);
        byte_size += dest.byte_size;

        let mesh_index = slots.len() as i32;
        for entry in &bucket.entries {
            frag_to_mesh[entry.frag_id as usize] = mesh_index;
        }
        let material = materials.variant(
            frags.material(bucket.entries[0].frag_id),
            MaterialVariant::VertexIds,
            model_id,
        );
        slots.push(MeshSlot::PendingMerge {
            task_id,
            material,
            bounds: map.boxes[b],
            frag_ids: bucket.entries.iter().map(|e| e.frag_id).collect(),
        });
        coordinator.enqueue(task, dest);
    }

    // Instancing pass over maximal equal (geometry, material) runs
    let remainder = &map.frag_order[map.num_consolidated..];
    let instancing_available = renderer.supports_instanced_arrays();
    let mut i = 0;
    while i < remainder.len() {
        let geom_id = frags.geometry_id(remainder[i]);
        let mat_id = frags.material_id(remainder[i]);
        let mut j = i + 1;
        while j < remainder.len()
            && frags.geometry_id(remainder[j]) == geom_id
            && frags.material_id(remainder[j]) == mat_id
        {
            j += 1;
        }
        instance_run(
            frags, materials, model_id, &remainder[i..j], instancing_available, &mut slots,
            &mut frag_to_mesh, &mut byte_size, &mut missing_warned,
        );
        i = j;
    }

    let merge_count = coordinator.task_count();
    let mut merged = coordinator.run()?;

    let meshes: Vec<ConsolidatedMesh> = slots
        .into_iter()
        .map(|slot| match slot {
            MeshSlot::Ready(mesh) => mesh,
            MeshSlot::PendingMerge {
                task_id,
                material,
                bounds,
                frag_ids,
            } => {
                let Some(geometry) = merged.remove(&task_id) else {
                    unreachable!("coordinator completed without output for task {task_id}")
                };
                ConsolidatedMesh::merged(Arc::new(geometry), material, model_id, bounds, frag_ids)
            }
        })
        .collect();

    residency::choose_memory_types(&meshes, frags, geometries, renderer, &instance_counts);

    debug!(
        fragments = count,
        meshes = meshes.len(),
        merged = merge_count,
        bytes = byte_size,
        budget = options.byte_limit,
        "fragment list consolidated"
    );

    Ok(Consolidation::new(meshes, frag_to_mesh, byte_size, map))
}

/// Occurrences of each geometry id across the fragment list
fn count_instances<F>(frags: &F) -> HashMap<u32, u32>
where
    F: FragmentList + ?Sized,
{
    let mut counts: HashMap<u32, u32> = HashMap::new();
    for f in 0..frags.count() as u32 {
        if frags.geometry(f).is_some() {
            *counts.entry(frags.geometry_id(f)).or_insert(0) += 1;
        }
    }
    counts
}

/// Build the merge plan: cost-sorted fragment order, bucketed until the
/// budget is spent
fn build_plan<F>(frags: &F, instance_counts: &HashMap<u32, u32>, byte_limit: u64) -> ConsolidationMap
where
    F: FragmentList + ?Sized,
{
    // Cheapest-to-consolidate first; the (geometry, material) tie-break
    // keeps equal pairs contiguous for the instancing pass
    let mut keyed: Vec<(u64, u32, u32, u32)> = Vec::with_capacity(frags.count());
    let mut dropped = 0usize;
    for f in 0..frags.count() as u32 {
        let Some(geometry) = frags.geometry(f) else {
            dropped += 1;
            continue;
        };
        let geom_id = frags.geometry_id(f);
        let instances = instance_counts.get(&geom_id).copied().unwrap_or(1) as u64;
        keyed.push((
            instances * geometry.byte_size,
            geom_id,
            frags.material_id(f),
            f,
        ));
    }
    if dropped > 0 {
        warn!(dropped, "fragments without geometry dropped from consolidation");
    }
    keyed.sort_unstable_by_key(|&(cost, geom_id, mat_id, _)| (cost, geom_id, mat_id));
    let order: Vec<u32> = keyed.iter().map(|&(_, _, _, f)| f).collect();

    let mut builder = ConsolidationBuilder::new(byte_limit);
    let mut cut = order.len();
    for (k, &f) in order.iter().enumerate() {
        if builder.budget_reached() {
            cut = k;
            break;
        }
        let Some(geometry) = frags.geometry(f) else {
            continue;
        };
        builder.add_fragment(
            f,
            geometry,
            frags.original_world_matrix(f),
            frags.db_id(f),
            frags.material_id(f),
            &frags.world_bounds(f),
        );
    }
    builder.finish(&order[cut..])
}

/// Instance one run of fragments sharing a (geometry, material) pair,
/// falling back to single meshes for short runs, missing capability, and
/// rejected matrices
#[allow(clippy::too_many_arguments)]
fn instance_run<F, M>(
    frags: &F,
    materials: &mut M,
    model_id: u32,
    run: &[u32],
    instancing_available: bool,
    slots: &mut Vec<MeshSlot>,
    frag_to_mesh: &mut [i32],
    byte_size: &mut u64,
    missing_warned: &mut bool,
) where
    F: FragmentList + ?Sized,
    M: MaterialManager + ?Sized,
{
    let source = frags.geometry(run[0]);
    if run.len() < 2 || !instancing_available || source.is_none() {
        for &f in run {
            push_single(frags, model_id, f, slots, frag_to_mesh, missing_warned);
        }
        return;
    }
    let Some(source) = source else { return };

    // Rejected instances swap to the back so accepted ones stay
    // contiguous at the front of the streams
    let mut order: Vec<u32> = run.to_vec();
    let mut end = order.len();
    let mut builder = InstanceBufferBuilder::with_capacity(end);
    let mut idx = 0;
    while idx < end {
        let f = order[idx];
        if builder.try_add(&frags.original_world_matrix(f), frags.db_id(f)) {
            idx += 1;
        } else {
            order.swap(idx, end - 1);
            end -= 1;
        }
    }
    let (accepted, rejected) = order.split_at(end);

    if !accepted.is_empty() {
        let geometry = builder.build(&source);
        if let Some(streams) = &geometry.instances {
            *byte_size += streams.transform_byte_size();
        }
        let mesh_index = slots.len() as i32;
        let mut bounds = Box3::EMPTY;
        for &f in accepted {
            frag_to_mesh[f as usize] = mesh_index;
            bounds.union_with(&frags.world_bounds(f));
        }
        let material = materials.variant(
            frags.material(accepted[0]),
            MaterialVariant::Instanced,
            model_id,
        );
        slots.push(MeshSlot::Ready(ConsolidatedMesh::instanced(
            Arc::new(geometry),
            material,
            model_id,
            bounds,
            accepted.to_vec(),
        )));
    }

    for &f in rejected {
        push_single(frags, model_id, f, slots, frag_to_mesh, missing_warned);
    }
}

/// Emit a mesh sharing one fragment's source geometry and material
fn push_single<F>(
    frags: &F,
    model_id: u32,
    frag_id: u32,
    slots: &mut Vec<MeshSlot>,
    frag_to_mesh: &mut [i32],
    missing_warned: &mut bool,
) where
    F: FragmentList + ?Sized,
{
    let Some(geometry) = frags.geometry(frag_id) else {
        warn_missing(missing_warned, frag_id);
        return;
    };
    frag_to_mesh[frag_id as usize] = slots.len() as i32;
    slots.push(MeshSlot::Ready(ConsolidatedMesh::single(
        geometry,
        frags.material(frag_id),
        model_id,
        frags.original_world_matrix(frag_id),
        frags.world_bounds(frag_id),
        frag_id,
        frags.db_id(frag_id),
    )));
}

fn warn_missing(missing_warned: &mut bool, frag_id: u32) {
    if !*missing_warned {
        warn!(frag = frag_id, "fragment without source geometry skipped");
        *missing_warned = true;
    }
}
