//! Colour blending
//!
//! Classic factor/op evaluation with Vulkan semantics: separate colour and
//! alpha factors and ops, constant-colour factors, dual-source factors, and
//! min/max ops that ignore the factors entirely. The channel write mask is
//! applied by the attachment store, after blending.

use crate::foundation::math::Vec4;
use crate::pipeline::state::{BlendFactor, BlendOp, BlendState};

/// Blend inputs for one sample.
#[derive(Clone, Copy)]
pub struct BlendInputs {
    /// Fragment colour (output zero).
    pub src: Vec4,
    /// Dual-source colour (output one).
    pub src1: Vec4,
    /// Stored destination colour.
    pub dst: Vec4,
    /// Blend constant colour.
    pub constants: [f32; 4],
}

fn color_factor(factor: BlendFactor, inputs: &BlendInputs) -> Vec4 {
    let rgb = |v: f32| Vec4::new(v, v, v, v);
    match factor {
        BlendFactor::Zero => rgb(0.0),
        BlendFactor::One => rgb(1.0),
        BlendFactor::SrcColor => inputs.src,
        BlendFactor::OneMinusSrcColor => rgb(1.0) - inputs.src,
        BlendFactor::DstColor => inputs.dst,
        BlendFactor::OneMinusDstColor => rgb(1.0) - inputs.dst,
        BlendFactor::SrcAlpha => rgb(inputs.src.w),
        BlendFactor::OneMinusSrcAlpha => rgb(1.0 - inputs.src.w),
        BlendFactor::DstAlpha => rgb(inputs.dst.w),
        BlendFactor::OneMinusDstAlpha => rgb(1.0 - inputs.dst.w),
        BlendFactor::ConstantColor => Vec4::new(
            inputs.constants[0],
            inputs.constants[1],
            inputs.constants[2],
            inputs.constants[3],
        ),
        BlendFactor::OneMinusConstantColor => Vec4::new(
            1.0 - inputs.constants[0],
            1.0 - inputs.constants[1],
            1.0 - inputs.constants[2],
            1.0 - inputs.constants[3],
        ),
        BlendFactor::ConstantAlpha => rgb(inputs.constants[3]),
        BlendFactor::OneMinusConstantAlpha => rgb(1.0 - inputs.constants[3]),
        BlendFactor::SrcAlphaSaturate => {
            let f = inputs.src.w.min(1.0 - inputs.dst.w);
            Vec4::new(f, f, f, 1.0)
        }
        BlendFactor::Src1Color => inputs.src1,
        BlendFactor::OneMinusSrc1Color => rgb(1.0) - inputs.src1,
        BlendFactor::Src1Alpha => rgb(inputs.src1.w),
        BlendFactor::OneMinusSrc1Alpha => rgb(1.0 - inputs.src1.w),
    }
}

fn alpha_factor(factor: BlendFactor, inputs: &BlendInputs) -> f32 {
    match factor {
        BlendFactor::Zero => 0.0,
        BlendFactor::One | BlendFactor::SrcAlphaSaturate => 1.0,
        BlendFactor::SrcColor | BlendFactor::SrcAlpha => inputs.src.w,
        BlendFactor::OneMinusSrcColor | BlendFactor::OneMinusSrcAlpha => 1.0 - inputs.src.w,
        BlendFactor::DstColor | BlendFactor::DstAlpha => inputs.dst.w,
        BlendFactor::OneMinusDstColor | BlendFactor::OneMinusDstAlpha => 1.0 - inputs.dst.w,
        BlendFactor::ConstantColor | BlendFactor::ConstantAlpha => inputs.constants[3],
        BlendFactor::OneMinusConstantColor | BlendFactor::OneMinusConstantAlpha => {
            1.0 - inputs.constants[3]
        }
        BlendFactor::Src1Color | BlendFactor::Src1Alpha => inputs.src1.w,
        BlendFactor::OneMinusSrc1Color | BlendFactor::OneMinusSrc1Alpha => 1.0 - inputs.src1.w,
    }
}

fn combine(op: BlendOp, src: f32, dst: f32, src_factor: f32, dst_factor: f32) -> f32 {
    match op {
        BlendOp::Add => src * src_factor + dst * dst_factor,
        BlendOp::Subtract => src * src_factor - dst * dst_factor,
        BlendOp::ReverseSubtract => dst * dst_factor - src * src_factor,
        BlendOp::Min => src.min(dst),
        BlendOp::Max => src.max(dst),
    }
}

/// Evaluates the blend equation for one sample.
///
/// With blending disabled the source colour passes through unchanged.
#[must_use]
pub fn blend(state: &BlendState, inputs: &BlendInputs) -> Vec4 {
    if !state.enabled {
        return inputs.src;
    }
    let src_color = color_factor(state.src_color, inputs);
    let dst_color = color_factor(state.dst_color, inputs);
    let src_alpha = alpha_factor(state.src_alpha, inputs);
    let dst_alpha = alpha_factor(state.dst_alpha, inputs);

    Vec4::new(
        combine(
            state.color_op,
            inputs.src.x,
            inputs.dst.x,
            src_color.x,
            dst_color.x,
        ),
        combine(
            state.color_op,
            inputs.src.y,
            inputs.dst.y,
            src_color.y,
            dst_color.y,
        ),
        combine(
            state.color_op,
            inputs.src.z,
            inputs.dst.z,
            src_color.z,
            dst_color.z,
        ),
        combine(
            state.alpha_op,
            inputs.src.w,
            inputs.dst.w,
            src_alpha,
            dst_alpha,
        ),
    )
}
