//! Merge buckets
//!
//! A bucket collects fragments whose geometries are mutually compatible
//! and whose summed vertex count stays within the 16-bit index range.
//! Size-1 buckets are never merged; their fragment falls back to sharing
//! the source geometry.

use std::sync::Arc;

use glam::Mat4;
use vantage_common::{Box3, GeometryBuffer};

use crate::compat::can_merge;

/// One fragment staged for merging
#[derive(Clone, Debug)]
pub struct BucketEntry {
    pub frag_id: u32,
    pub geometry: Arc<GeometryBuffer>,
    pub matrix: Mat4,
    pub db_id: u32,
}

/// Staging container for one candidate merged mesh
#[derive(Debug)]
pub struct MergeBucket {
    pub material_id: u32,
    pub entries: Vec<BucketEntry>,
    pub vertex_count: u32,
    pub bounds: Box3,
}

impl MergeBucket {
    /// Hard cap keeping the merged index buffer 16-bit
    pub const MAX_VERTEX_COUNT: u32 = 65_535;

    pub fn new(material_id: u32) -> Self {
        Self {
            material_id,
            entries: Vec::new(),
            vertex_count: 0,
            bounds: Box3::EMPTY,
        }
    }

    /// Whether `geom` fits this bucket: compatible with the first entry
    /// and within the vertex cap
    pub fn accepts(&self, geom: &GeometryBuffer) -> bool {
        let Some(first) = self.entries.first() else {
            return geom.vertex_count() <= Self::MAX_VERTEX_COUNT;
        };
        self.vertex_count + geom.vertex_count() <= Self::MAX_VERTEX_COUNT
            && can_merge(&first.geometry, geom)
    }

    pub fn push(&mut self, entry: BucketEntry, world_bounds: &Box3) {
        debug_assert!(self.accepts(&entry.geometry));
        self.vertex_count += entry.geometry.vertex_count();
        self.bounds.union_with(world_bounds);
        self.entries.push(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
