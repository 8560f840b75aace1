//! Merge-plan construction under a byte budget
//!
//! The builder walks fragments in cost order and packs them into per-
//! material bucket lists, charging each bucket's memory cost against the
//! budget as it grows. The output is a [`ConsolidationMap`]: a compact
//! plan (fragment ordering plus bucket ranges) that can be replayed into
//! meshes any number of times without re-bucketing.

use std::ops::Range;
use std::sync::Arc;

use glam::Mat4;
use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::{debug, warn};
use vantage_common::{Box3, GeometryBuffer};

use crate::bucket::{BucketEntry, MergeBucket};

/// The cost-ordered merge plan
///
/// The first `num_consolidated` entries of `frag_order` belong to merge
/// buckets (bucket `b` owns `frag_order[ranges[b] .. ranges[b+1]]`); the
/// rest are candidates for the instancing pass.
#[derive(Clone, Debug)]
pub struct ConsolidationMap {
    /// Every surviving fragment id exactly once
    pub frag_order: Vec<u32>,
    /// Start offset in `frag_order` per bucket
    pub ranges: Vec<u32>,
    /// World bounds per bucket
    pub boxes: Vec<Box3>,
    /// How many leading entries of `frag_order` are bucketed
    pub num_consolidated: usize,
}

impl ConsolidationMap {
    pub fn bucket_count(&self) -> usize {
        self.ranges.len()
    }

    /// Index range into `frag_order` owned by bucket `b`
    pub fn bucket_range(&self, b: usize) -> Range<usize> {
        let start = self.ranges[b] as usize;
        let end = self
            .ranges
            .get(b + 1)
            .map_or(self.num_consolidated, |&r| r as usize);
        start..end
    }
}

/// Packs fragments into merge buckets until the byte budget is spent
pub struct ConsolidationBuilder {
    byte_limit: u64,
    cost: u64,
    buckets: Vec<MergeBucket>,
    /// material id -> indices into `buckets`, scan order
    by_material: HashMap<u32, SmallVec<[usize; 4]>>,
    warned_byte_size: bool,
}

impl ConsolidationBuilder {
    pub fn new(byte_limit: u64) -> Self {
        Self {
            byte_limit,
            cost: 0,
            buckets: Vec::new(),
            by_material: HashMap::new(),
            warned_byte_size: false,
        }
    }

    /// Cumulative memory cost charged so far
    pub fn cost(&self) -> u64 {
        self.cost
    }

    /// True once the budget is spent; callers stop feeding fragments and
    /// route the rest to the instancing pass
    pub fn budget_reached(&self) -> bool {
        self.cost >= self.byte_limit
    }

    /// Stage one fragment into the first bucket of its material that
    /// accepts it, opening a new bucket if none does
    pub fn add_fragment(
        &mut self,
        frag_id: u32,
        geometry: Arc<GeometryBuffer>,
        matrix: Mat4,
        db_id: u32,
        material_id: u32,
        world_bounds: &Box3,
    ) {
        let list = self.by_material.entry(material_id).or_default();
        let bucket_idx = match list
            .iter()
            .copied()
            .find(|&idx| self.buckets[idx].accepts(&geometry))
        {
            Some(idx) => idx,
            None => {
                let idx = self.buckets.len();
                self.buckets.push(MergeBucket::new(material_id));
                list.push(idx);
                idx
            }
        };

        let bucket = &mut self.buckets[bucket_idx];
        bucket.push(
            BucketEntry {
                frag_id,
                geometry,
                matrix,
                db_id,
            },
            world_bounds,
        );

        // A one-geometry bucket will not be merged, so the first entry is
        // free until a second one arrives; then both are charged.
        match bucket.len() {
            1 => {}
            2 => {
                let first = self.entry_byte_size(bucket_idx, 0);
                let second = self.entry_byte_size(bucket_idx, 1);
                self.cost += first + second;
            }
            n => {
                let added = self.entry_byte_size(bucket_idx, n - 1);
                self.cost += added;
            }
        }
    }

    fn entry_byte_size(&mut self, bucket_idx: usize, entry_idx: usize) -> u64 {
        let geom = &self.buckets[bucket_idx].entries[entry_idx].geometry;
        if geom.byte_size == 0 {
            if !self.warned_byte_size {
                warn!("geometry with unknown byte size; excluded from consolidation cost");
                self.warned_byte_size = true;
            }
            return 0;
        }
        geom.byte_size
    }

    /// Emit the plan. `remaining` holds the cost-ordered fragment ids
    /// that were never staged (budget cut-off); they trail `frag_order`
    /// as instancing candidates.
    pub fn finish(self, remaining: &[u32]) -> ConsolidationMap {
        let num_consolidated: usize = self.buckets.iter().map(|b| b.len()).sum();
        let mut frag_order = Vec::with_capacity(num_consolidated + remaining.len());
        let mut ranges = Vec::with_capacity(self.buckets.len());
        let mut boxes = Vec::with_capacity(self.buckets.len());

        for bucket in &self.buckets {
            ranges.push(frag_order.len() as u32);
            boxes.push(bucket.bounds);
            frag_order.extend(bucket.entries.iter().map(|e| e.frag_id));
        }
        frag_order.extend_from_slice(remaining);

        debug!(
            buckets = self.buckets.len(),
            consolidated = num_consolidated,
            remaining = remaining.len(),
            cost_bytes = self.cost,
            budget_bytes = self.byte_limit,
            "consolidation plan built"
        );

        ConsolidationMap {
            frag_order,
            ranges,
            boxes,
            num_consolidated,
        }
    }
}
