//! Consolidation result and per-frame draw-call partitioning
//!
//! The result owns the output meshes and the fragment -> mesh index. Per
//! frame, [`Consolidation::apply_attributes`] re-partitions a container
//! into draw groups from the current visibility flags and theming colors
//! - mutable attribute state never forces a buffer rebuild.

use std::sync::Arc;

use glam::Vec4;
use vantage_common::{DrawMode, frag_visible};

use crate::builder::ConsolidationMap;
use crate::mesh::{BvhOptions, ConsolidatedMesh, DrawGroup, DrawRange, MeshOrigin};
use crate::scene::FragmentList;

/// Output of the consolidation engine: a small set of meshes rendering
/// the original fragment list
#[derive(Debug)]
pub struct Consolidation {
    pub meshes: Vec<ConsolidatedMesh>,
    /// fragment id -> mesh index; -1 for dropped fragments
    pub frag_to_mesh: Vec<i32>,
    /// Newly allocated memory: merged buffers in full, instanced
    /// transform streams; shared source geometries contribute nothing
    pub byte_size: u64,
    /// The plan this result was built from; kept so the same plan can be
    /// replayed without re-bucketing
    pub map: Arc<ConsolidationMap>,
    ready: bool,
}

struct OpenGroup {
    start: u32,
    edge_start: u32,
    color: Option<Vec4>,
}

impl Consolidation {
    /// BVH leaves below this fragment count shatter consolidated meshes
    pub const FRAGS_PER_LEAF_NODE: u32 = 512;
    pub const MAX_POLYS_PER_NODE: u32 = 100_000;

    pub(crate) fn new(
        meshes: Vec<ConsolidatedMesh>,
        frag_to_mesh: Vec<i32>,
        byte_size: u64,
        map: Arc<ConsolidationMap>,
    ) -> Self {
        Self {
            meshes,
            frag_to_mesh,
            byte_size,
            map,
            ready: true,
        }
    }

    /// True once every merge output is installed; containers of a
    /// not-yet-ready consolidation must not be drawn
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Widen the external BVH builder's leaf hints so its leaves do not
    /// split consolidated containers back into per-fragment draws
    pub fn apply_bvh_defaults(&self, opts: &mut BvhOptions) {
        opts.frags_per_leaf_node = Self::FRAGS_PER_LEAF_NODE;
        opts.max_polys_per_node = Self::MAX_POLYS_PER_NODE;
    }

    /// Recompute one mesh's draw state for the given pass
    ///
    /// Containers get a fresh `groups` partition covering exactly the
    /// fragments the pass draws, split wherever the theming color
    /// changes. A partition that collapses to the whole container skips
    /// the group list and drives `visible`/`theming_color` directly.
    /// Single-fragment meshes take the whole-mesh fast path. `special`
    /// selects fragments excluded from this container for the frame
    /// (they are drawn separately, e.g. while animated).
    pub fn apply_attributes<F>(
        &mut self,
        mesh_index: usize,
        frags: &F,
        mode: DrawMode,
        special: Option<&dyn Fn(u32) -> bool>,
    ) -> &ConsolidatedMesh
    where
        F: FragmentList + ?Sized,
    {
        let mesh = &mut self.meshes[mesh_index];

        if let MeshOrigin::Single { frag_id } = mesh.origin {
            let excluded = special.is_some_and(|p| p(frag_id));
            mesh.visible = !excluded && frag_visible(frags.viz_flags(frag_id), mode);
            mesh.theming_color = frags.theming_color(frags.db_id(frag_id));
            mesh.groups.clear();
            return &self.meshes[mesh_index];
        }

        // Reuse the group allocation across frames
        let mut groups = std::mem::take(&mut mesh.groups);
        groups.clear();

        let instanced = matches!(mesh.origin, MeshOrigin::Instanced { .. });
        let frag_ids = match &mesh.origin {
            MeshOrigin::Merged { frag_ids } | MeshOrigin::Instanced { frag_ids } => frag_ids,
            MeshOrigin::Single { .. } => unreachable!(),
        };

        let mut start = 0u32;
        let mut edge_start = 0u32;
        let mut open: Option<OpenGroup> = None;

        for &f in frag_ids {
            let (count, edge_count) = if instanced {
                (1, 0)
            } else {
                match frags.geometry(f) {
                    Some(g) => (
                        g.ib.len() as u32,
                        g.ib_lines.as_ref().map_or(0, |l| l.len() as u32),
                    ),
                    None => (0, 0),
                }
            };

            let excluded = special.is_some_and(|p| p(f));
            let visible = !excluded && frag_visible(frags.viz_flags(f), mode);
            let color = if visible {
                frags.theming_color(frags.db_id(f))
            } else {
                None
            };

            if visible {
                let extends = open.as_ref().is_some_and(|g| g.color == color);
                if !extends {
                    if let Some(g) = open.take() {
                        groups.push(close_group(g, start, edge_start, instanced));
                    }
                    open = Some(OpenGroup {
                        start,
                        edge_start,
                        color,
                    });
                }
            } else if let Some(g) = open.take() {
                groups.push(close_group(g, start, edge_start, instanced));
            }

            start += count;
            edge_start += edge_count;
        }
        if let Some(g) = open.take() {
            groups.push(close_group(g, start, edge_start, instanced));
        }

        let covers_all = groups.len() == 1
            && match groups[0].range {
                DrawRange::Indexed {
                    start: s,
                    count,
                    edge_start: es,
                    edge_count,
                } => s == 0 && count == start && es == 0 && edge_count == edge_start,
                DrawRange::Instanced { start: s, count } => s == 0 && count == start,
            };

        if covers_all {
            mesh.visible = true;
            mesh.theming_color = groups[0].theming_color;
            groups.clear();
        } else {
            mesh.visible = !groups.is_empty();
            mesh.theming_color = None;
        }
        mesh.groups = groups;

        &self.meshes[mesh_index]
    }
}

fn close_group(open: OpenGroup, end: u32, edge_end: u32, instanced: bool) -> DrawGroup {
    let range = if instanced {
        DrawRange::Instanced {
            start: open.start,
            count: end - open.start,
        }
    } else {
        DrawRange::Indexed {
            start: open.start,
            count: end - open.start,
            edge_start: open.edge_start,
            edge_count: edge_end - open.edge_start,
        }
    };
    DrawGroup {
        range,
        theming_color: open.color,
    }
}
