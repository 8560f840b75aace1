//! Packed vertex attribute codecs
//!
//! Provides the two bit-level encodings shared between the consolidation
//! engine and the shader programs:
//! - unit normals stored as two u16 angular components
//! - 24-bit database ids stored as three normalized u8 components
//!
//! Both layouts must be reproduced exactly; the shaders decode them.

use glam::Vec3;
use std::f32::consts::PI;

/// Components per id attribute item (vec3 of u8 in the shader)
pub const ID_ITEM_SIZE: usize = 3;

/// Store a unit-range float as u16 (rounded to nearest)
#[inline]
pub fn unit_f32_to_u16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Load a u16-stored unit-range float
#[inline]
pub fn u16_to_unit_f32(v: u16) -> f32 {
    v as f32 / 65535.0
}

/// Encode a unit normal as a (theta, z) u16 pair
///
/// `n` must already be normalized; the angular encoding preserves no
/// magnitude.
#[inline]
pub fn encode_normal(n: Vec3) -> (u16, u16) {
    let u = 0.5 * (1.0 + n.y.atan2(n.x) / PI);
    let v = 0.5 * (1.0 + n.z);
    (unit_f32_to_u16(u), unit_f32_to_u16(v))
}

/// Decode a (theta, z) u16 pair back to a unit normal
#[inline]
pub fn decode_normal(a: u16, b: u16) -> Vec3 {
    let theta = (2.0 * u16_to_unit_f32(a) - 1.0) * PI;
    let phi = 2.0 * u16_to_unit_f32(b) - 1.0;
    let sx = (1.0 - phi * phi).max(0.0).sqrt();
    Vec3::new(theta.cos() * sx, theta.sin() * sx, phi)
}

/// Write a 24-bit database id as a little-endian u8 triple
///
/// The shader samples the id attribute as a normalized vec3; there is no
/// fourth byte.
#[inline]
pub fn pack_db_id(db_id: u32, out: &mut [u8]) {
    out[0] = (db_id & 0xFF) as u8;
    out[1] = ((db_id >> 8) & 0xFF) as u8;
    out[2] = ((db_id >> 16) & 0xFF) as u8;
}

/// Read a 24-bit database id from its u8 triple
#[inline]
pub fn unpack_db_id(bytes: &[u8]) -> u32 {
    bytes[0] as u32 | ((bytes[1] as u32) << 8) | ((bytes[2] as u32) << 16)
}
