//! Math utilities and types
//!
//! Provides the vector/matrix types used by the draw pipeline and the
//! fixed-point representation used by rasterizer setup.

pub use nalgebra::{Matrix4, Vector2, Vector3, Vector4};

/// 2D vector type
pub type Vec2 = Vector2<f32>;

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Number of fractional bits of sub-pixel precision used by edge equations.
pub const SUBPIXEL_BITS: i32 = 4;

/// One pixel in 28.4 fixed point.
pub const SUBPIXEL_ONE: i32 = 1 << SUBPIXEL_BITS;

/// Converts a floating-point screen coordinate to 28.4 fixed point.
///
/// Values below the sub-pixel precision are rounded toward zero so that
/// tie-breaking matches the top-left fill convention.
#[inline]
#[must_use]
pub fn to_fixed(v: f32) -> i32 {
    (v * SUBPIXEL_ONE as f32) as i32
}

/// Converts a 28.4 fixed-point value back to floating point.
#[inline]
#[must_use]
pub fn from_fixed(v: i32) -> f32 {
    v as f32 / SUBPIXEL_ONE as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_point_round_trips_whole_pixels() {
        assert_eq!(to_fixed(3.0), 48);
        assert_eq!(from_fixed(48), 3.0);
    }

    #[test]
    fn fixed_point_truncates_below_precision() {
        // 1/32 of a pixel is below 4-bit precision and rounds toward zero.
        assert_eq!(to_fixed(0.03125), 0);
        assert_eq!(to_fixed(-0.03125), 0);
    }
}
