//! Merge compatibility check
//!
//! A merged buffer inherits one interleave layout; per-vertex format
//! conversion is deliberately avoided. Two geometries can share a merge
//! bucket only when their layouts agree exactly.

use vantage_common::{GeometryBuffer, PrimitiveKind};

/// Whether `b` can be appended to a merge bucket whose layout is `a`'s
///
/// Requires equal stride, primitive kind, line width / point size where
/// the primitive uses one, equal attribute count, and for every attribute
/// of `a` an identically laid-out attribute of the same name in `b`.
pub fn can_merge(a: &GeometryBuffer, b: &GeometryBuffer) -> bool {
    if a.vb_stride != b.vb_stride || a.primitive != b.primitive {
        return false;
    }

    match a.primitive {
        PrimitiveKind::Lines | PrimitiveKind::WideLines => {
            if a.line_width != b.line_width {
                return false;
            }
        }
        PrimitiveKind::Points => {
            if a.point_size != b.point_size {
                return false;
            }
        }
        PrimitiveKind::Triangles => {}
    }

    if a.attributes.len() != b.attributes.len() {
        return false;
    }

    a.attributes
        .iter()
        .all(|(name, attr)| b.attributes.get(name) == Some(attr))
}
