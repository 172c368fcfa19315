//! Pipeline state snapshotted into each draw
//!
//! Semantics follow the Vulkan fixed-function pipeline; only the state the
//! draw core consumes is represented.

use bitflags::bitflags;

/// Maximum number of simultaneously bound colour targets.
pub const MAX_COLOR_TARGETS: usize = 4;

/// Primitive assembly topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    /// Independent points.
    PointList,
    /// Independent line segments.
    LineList,
    /// Connected line segments.
    LineStrip,
    /// Independent triangles.
    #[default]
    TriangleList,
    /// Strip of triangles sharing an edge.
    TriangleStrip,
    /// Fan of triangles sharing the first vertex.
    TriangleFan,
}

impl Topology {
    /// Number of primitives produced by `count` vertices.
    #[must_use]
    pub const fn primitive_count(self, count: u32) -> u32 {
        match self {
            Self::PointList => count,
            Self::LineList => count / 2,
            Self::LineStrip => count.saturating_sub(1),
            Self::TriangleList => count / 3,
            Self::TriangleStrip | Self::TriangleFan => count.saturating_sub(2),
        }
    }
}

/// Element type of the bound index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IndexType {
    /// 8-bit indices.
    U8,
    /// 16-bit indices.
    U16,
    /// 32-bit indices.
    U32,
    /// No index buffer; vertices are consumed sequentially.
    #[default]
    Sequential,
}

/// Which facing is discarded before rasterization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    /// Nothing is culled.
    #[default]
    None,
    /// Front-facing primitives are culled.
    Front,
    /// Back-facing primitives are culled.
    Back,
    /// Everything is culled.
    FrontAndBack,
}

/// Winding order that counts as front-facing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontFace {
    /// Counter-clockwise in framebuffer space.
    #[default]
    CounterClockwise,
    /// Clockwise in framebuffer space.
    Clockwise,
}

/// The vertex supplying flat-interpolated attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProvokingVertex {
    /// The first vertex of the primitive (the default).
    #[default]
    First,
    /// The last vertex of the primitive.
    Last,
}

/// How one vertex output is interpolated across a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpolationMode {
    /// Perspective-correct interpolation.
    #[default]
    Perspective,
    /// Linear interpolation in screen space.
    Linear,
    /// The provoking vertex's value everywhere.
    Flat,
}

/// Depth and stencil comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareOp {
    /// Never passes.
    Never,
    /// Passes when incoming < stored.
    Less,
    /// Passes when equal.
    Equal,
    /// Passes when incoming <= stored.
    LessOrEqual,
    /// Passes when incoming > stored.
    Greater,
    /// Passes when different.
    NotEqual,
    /// Passes when incoming >= stored.
    GreaterOrEqual,
    /// Always passes.
    #[default]
    Always,
}

impl CompareOp {
    /// Applies the comparison to floating-point values.
    #[must_use]
    pub fn compare_f32(self, incoming: f32, stored: f32) -> bool {
        match self {
            Self::Never => false,
            Self::Less => incoming < stored,
            Self::Equal => incoming == stored,
            Self::LessOrEqual => incoming <= stored,
            Self::Greater => incoming > stored,
            Self::NotEqual => incoming != stored,
            Self::GreaterOrEqual => incoming >= stored,
            Self::Always => true,
        }
    }

    /// Applies the comparison to masked stencil values.
    #[must_use]
    pub fn compare_u32(self, incoming: u32, stored: u32) -> bool {
        match self {
            Self::Never => false,
            Self::Less => incoming < stored,
            Self::Equal => incoming == stored,
            Self::LessOrEqual => incoming <= stored,
            Self::Greater => incoming > stored,
            Self::NotEqual => incoming != stored,
            Self::GreaterOrEqual => incoming >= stored,
            Self::Always => true,
        }
    }
}

/// Stencil update operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StencilOp {
    /// Keep the stored value.
    #[default]
    Keep,
    /// Store zero.
    Zero,
    /// Store the reference value.
    Replace,
    /// Increment, clamping at the maximum.
    IncrementAndClamp,
    /// Decrement, clamping at zero.
    DecrementAndClamp,
    /// Bitwise-invert the stored value.
    Invert,
    /// Increment with wrap-around.
    IncrementAndWrap,
    /// Decrement with wrap-around.
    DecrementAndWrap,
}

impl StencilOp {
    /// Applies the operation to an 8-bit stencil value.
    #[must_use]
    pub const fn apply(self, stored: u8, reference: u8) -> u8 {
        match self {
            Self::Keep => stored,
            Self::Zero => 0,
            Self::Replace => reference,
            Self::IncrementAndClamp => stored.saturating_add(1),
            Self::DecrementAndClamp => stored.saturating_sub(1),
            Self::Invert => !stored,
            Self::IncrementAndWrap => stored.wrapping_add(1),
            Self::DecrementAndWrap => stored.wrapping_sub(1),
        }
    }
}

/// Per-face stencil configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilOpState {
    /// Applied when the stencil test fails.
    pub fail_op: StencilOp,
    /// Applied when both stencil and depth tests pass.
    pub pass_op: StencilOp,
    /// Applied when stencil passes but depth fails.
    pub depth_fail_op: StencilOp,
    /// Comparison between reference and stored value.
    pub compare_op: CompareOp,
    /// Mask applied to both sides of the comparison.
    pub compare_mask: u32,
    /// Mask restricting which stored bits are updated.
    pub write_mask: u32,
    /// Reference value.
    pub reference: u32,
}

impl Default for StencilOpState {
    fn default() -> Self {
        Self {
            fail_op: StencilOp::Keep,
            pass_op: StencilOp::Keep,
            depth_fail_op: StencilOp::Keep,
            compare_op: CompareOp::Always,
            compare_mask: 0xFF,
            write_mask: 0xFF,
            reference: 0,
        }
    }
}

/// Stencil state for both facings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StencilState {
    /// Whether the stencil test runs.
    pub enabled: bool,
    /// Configuration for front-facing primitives.
    pub front: StencilOpState,
    /// Configuration for back-facing primitives.
    pub back: StencilOpState,
}

/// Depth-test state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    /// Whether the depth test runs.
    pub test_enable: bool,
    /// Whether passing samples update the depth buffer.
    pub write_enable: bool,
    /// Comparison between incoming and stored depth.
    pub compare_op: CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test_enable: false,
            write_enable: false,
            compare_op: CompareOp::LessOrEqual,
        }
    }
}

/// Multiplier applied to a blend input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)] // Factor names mirror the Vulkan enumeration.
pub enum BlendFactor {
    Zero,
    #[default]
    One,
    SrcColor,
    OneMinusSrcColor,
    DstColor,
    OneMinusDstColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstAlpha,
    OneMinusDstAlpha,
    ConstantColor,
    OneMinusConstantColor,
    ConstantAlpha,
    OneMinusConstantAlpha,
    SrcAlphaSaturate,
    Src1Color,
    OneMinusSrc1Color,
    Src1Alpha,
    OneMinusSrc1Alpha,
}

/// Combiner applied to the weighted source and destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[allow(missing_docs)] // Op names mirror the Vulkan enumeration.
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    ReverseSubtract,
    Min,
    Max,
}

bitflags! {
    /// Channels a colour write may modify.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ColorWriteMask: u8 {
        /// Red channel.
        const R = 1;
        /// Green channel.
        const G = 2;
        /// Blue channel.
        const B = 4;
        /// Alpha channel.
        const A = 8;
    }
}

impl Default for ColorWriteMask {
    fn default() -> Self {
        Self::all()
    }
}

/// Per-target blend configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlendState {
    /// Whether blending runs; when off the source replaces the destination.
    pub enabled: bool,
    /// Source colour factor.
    pub src_color: BlendFactor,
    /// Destination colour factor.
    pub dst_color: BlendFactor,
    /// Colour combiner.
    pub color_op: BlendOp,
    /// Source alpha factor.
    pub src_alpha: BlendFactor,
    /// Destination alpha factor.
    pub dst_alpha: BlendFactor,
    /// Alpha combiner.
    pub alpha_op: BlendOp,
    /// Channel write mask, applied last.
    pub write_mask: ColorWriteMask,
}

impl BlendState {
    /// Whether any factor reads the dual-source colour.
    #[must_use]
    pub fn uses_dual_source(&self) -> bool {
        [self.src_color, self.dst_color, self.src_alpha, self.dst_alpha]
            .iter()
            .any(|f| {
                matches!(
                    f,
                    BlendFactor::Src1Color
                        | BlendFactor::OneMinusSrc1Color
                        | BlendFactor::Src1Alpha
                        | BlendFactor::OneMinusSrc1Alpha
                )
            })
    }
}
