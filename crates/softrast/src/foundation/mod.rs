//! Foundation utilities shared across the pipeline
//!
//! Math type aliases and the fixed-point helpers used by rasterizer setup.

pub mod math;

pub use math::{Mat4, Vec2, Vec3, Vec4};
