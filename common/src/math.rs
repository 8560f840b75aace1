//! Axis-aligned bounding boxes
//!
//! Minimal f32 AABB used for fragment bounds, bucket bounds, and output
//! mesh bounds. Starts out empty (min > max) so unions can accumulate
//! without a sentinel check at every call site.

use glam::{Mat4, Vec3};

/// Axis-aligned bounding box
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Box3 {
    pub min: Vec3,
    pub max: Vec3,
}

impl Box3 {
    /// Empty box - any union with it yields the other operand
    pub const EMPTY: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// True when no point has been added yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow to contain a point
    #[inline]
    pub fn expand_by_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Grow to contain another box
    #[inline]
    pub fn union_with(&mut self, other: &Box3) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Box containing all 8 transformed corners
    pub fn transformed(&self, m: &Mat4) -> Box3 {
        if self.is_empty() {
            return *self;
        }
        let mut out = Box3::EMPTY;
        for i in 0..8 {
            let corner = Vec3::new(
                if i & 1 != 0 { self.max.x } else { self.min.x },
                if i & 2 != 0 { self.max.y } else { self.min.y },
                if i & 4 != 0 { self.max.z } else { self.min.z },
            );
            out.expand_by_point(m.transform_point3(corner));
        }
        out
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

impl Default for Box3 {
    fn default() -> Self {
        Self::EMPTY
    }
}
