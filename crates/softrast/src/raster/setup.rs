//! Fixed-function primitive setup
//!
//! Turns assembled triangles (and the quads lines and points expand into)
//! into rasterization-ready primitives: frustum clipping, viewport
//! projection, signed-area facing and culling, 28.4 edge equations,
//! interpolant planes, bounding rectangles, and cluster masks.
//!
//! Degenerate inputs (zero area, non-finite coordinates, fully clipped) are
//! dropped here and never reach the pixel engine.

use crate::foundation::math::{to_fixed, Vec4};
use crate::pipeline::routine::{SetupRoutine, TransformedVertex, MAX_ATTRIBUTES};
use crate::pipeline::state::{CullMode, FrontFace, InterpolationMode};
use crate::raster::clip::{clip_segment, clip_triangle, outcode};
use crate::raster::primitive::{
    AttributePlanes, EdgeEquation, Plane, Primitive, Rect, Triangle,
};
use crate::raster::{Scissor, Viewport};

/// Smallest w treated as in front of the eye.
const MIN_W: f32 = 1e-9;

/// What the assembled "triangles" of a batch actually are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveClass {
    /// Three meaningful vertices.
    #[default]
    Triangle,
    /// Two meaningful vertices, expanded to a screen-space quad.
    Line,
    /// One meaningful vertex, expanded to a screen-space quad.
    Point,
}

/// Fixed-function state consumed by setup.
#[derive(Clone)]
pub struct SetupParams {
    /// How to interpret each entry of the triangle batch.
    pub class: PrimitiveClass,
    /// Viewport transform.
    pub viewport: Viewport,
    /// Scissor rectangle.
    pub scissor: Scissor,
    /// Bound target width in pixels.
    pub target_width: u32,
    /// Bound target height in pixels.
    pub target_height: u32,
    /// Facing cull mode; applies to triangles only.
    pub cull_mode: CullMode,
    /// Winding that counts as front-facing.
    pub front_face: FrontFace,
    /// Interpolation discipline per attribute.
    pub interpolation: [InterpolationMode; MAX_ATTRIBUTES],
    /// Number of live attributes.
    pub attribute_count: usize,
    /// Width of rasterized lines, in pixels.
    pub line_width: f32,
    /// Edge length of rasterized points, in pixels.
    pub point_size: f32,
}

impl Default for SetupParams {
    fn default() -> Self {
        Self {
            class: PrimitiveClass::Triangle,
            viewport: Viewport::default(),
            scissor: Scissor::default(),
            target_width: 0,
            target_height: 0,
            cull_mode: CullMode::None,
            front_face: FrontFace::CounterClockwise,
            interpolation: [InterpolationMode::Perspective; MAX_ATTRIBUTES],
            attribute_count: 0,
            line_width: 1.0,
            point_size: 1.0,
        }
    }
}

/// A vertex after projection to framebuffer coordinates.
#[derive(Clone, Copy)]
struct ScreenVertex {
    x: f32,
    y: f32,
    depth: f32,
    rhw: f32,
    attributes: [Vec4; MAX_ATTRIBUTES],
}

/// The standard fixed-function setup stage.
pub struct StandardSetup;

impl SetupRoutine for StandardSetup {
    fn setup(
        &self,
        triangles: &[Triangle],
        primitives: &mut Vec<Primitive>,
        params: &SetupParams,
    ) -> usize {
        let before = primitives.len();
        for triangle in triangles {
            match params.class {
                PrimitiveClass::Triangle => setup_triangle(triangle, primitives, params),
                PrimitiveClass::Line => setup_line(triangle, primitives, params),
                PrimitiveClass::Point => setup_point(triangle, primitives, params),
            }
        }
        primitives.len() - before
    }
}

fn position_is_finite(v: &TransformedVertex) -> bool {
    v.position.iter().all(|c| c.is_finite())
}

fn project(v: &TransformedVertex, viewport: &Viewport) -> Option<ScreenVertex> {
    let w = v.position.w;
    if w < MIN_W {
        return None;
    }
    let rhw = 1.0 / w;
    let ndc_x = v.position.x * rhw;
    let ndc_y = v.position.y * rhw;
    let ndc_z = v.position.z * rhw;
    Some(ScreenVertex {
        x: viewport.x + (ndc_x + 1.0) * 0.5 * viewport.width,
        y: viewport.y + (ndc_y + 1.0) * 0.5 * viewport.height,
        depth: viewport.min_depth + ndc_z * (viewport.max_depth - viewport.min_depth),
        rhw,
        attributes: v.attributes,
    })
}

fn setup_triangle(triangle: &Triangle, primitives: &mut Vec<Primitive>, params: &SetupParams) {
    if !triangle.v.iter().all(position_is_finite) {
        return;
    }
    let flat = triangle.v[triangle.provoking].attributes;
    let codes = [
        outcode(&triangle.v[0]),
        outcode(&triangle.v[1]),
        outcode(&triangle.v[2]),
    ];
    if codes[0] & codes[1] & codes[2] != 0 {
        return;
    }
    if codes[0] | codes[1] | codes[2] == 0 {
        emit_clip_triangle(&triangle.v, &flat, primitives, params);
        return;
    }
    // Clip and re-fan the resulting polygon.
    let polygon = clip_triangle(&triangle.v);
    for i in 2..polygon.len {
        let fan = [
            polygon.vertices[0],
            polygon.vertices[i - 1],
            polygon.vertices[i],
        ];
        emit_clip_triangle(&fan, &flat, primitives, params);
    }
}

fn emit_clip_triangle(
    vertices: &[TransformedVertex; 3],
    flat: &[Vec4; MAX_ATTRIBUTES],
    primitives: &mut Vec<Primitive>,
    params: &SetupParams,
) {
    let Some(s0) = project(&vertices[0], &params.viewport) else {
        return;
    };
    let Some(s1) = project(&vertices[1], &params.viewport) else {
        return;
    };
    let Some(s2) = project(&vertices[2], &params.viewport) else {
        return;
    };
    emit_screen_triangle([s0, s1, s2], flat, true, primitives, params);
}

/// Builds the rasterization primitive for a projected triangle.
fn emit_screen_triangle(
    v: [ScreenVertex; 3],
    flat: &[Vec4; MAX_ATTRIBUTES],
    cullable: bool,
    primitives: &mut Vec<Primitive>,
    params: &SetupParams,
) {
    let fx: [i32; 3] = [to_fixed(v[0].x), to_fixed(v[1].x), to_fixed(v[2].x)];
    let fy: [i32; 3] = [to_fixed(v[0].y), to_fixed(v[1].y), to_fixed(v[2].y)];

    // Twice the signed area in framebuffer coordinates (y down); negative
    // means the triangle winds counter-clockwise on screen.
    let area2 = i64::from(fx[1] - fx[0]) * i64::from(fy[2] - fy[0])
        - i64::from(fy[1] - fy[0]) * i64::from(fx[2] - fx[0]);
    if area2 == 0 {
        return;
    }
    let ccw = area2 < 0;
    let front_facing = ccw == (params.front_face == FrontFace::CounterClockwise);
    if cullable {
        match params.cull_mode {
            CullMode::None => {}
            CullMode::Front => {
                if front_facing {
                    return;
                }
            }
            CullMode::Back => {
                if !front_facing {
                    return;
                }
            }
            CullMode::FrontAndBack => return,
        }
    }

    // Edge construction needs the interior on the positive side.
    let order: [usize; 3] = if area2 > 0 { [0, 1, 2] } else { [0, 2, 1] };
    let edges = [
        EdgeEquation::from_points(
            fx[order[0]],
            fy[order[0]],
            fx[order[1]],
            fy[order[1]],
        ),
        EdgeEquation::from_points(
            fx[order[1]],
            fy[order[1]],
            fx[order[2]],
            fy[order[2]],
        ),
        EdgeEquation::from_points(
            fx[order[2]],
            fy[order[2]],
            fx[order[0]],
            fy[order[0]],
        ),
    ];

    let min_x = v.iter().map(|s| s.x).fold(f32::INFINITY, f32::min);
    let max_x = v.iter().map(|s| s.x).fold(f32::NEG_INFINITY, f32::max);
    let min_y = v.iter().map(|s| s.y).fold(f32::INFINITY, f32::min);
    let max_y = v.iter().map(|s| s.y).fold(f32::NEG_INFINITY, f32::max);
    if !(min_x.is_finite() && max_x.is_finite() && min_y.is_finite() && max_y.is_finite()) {
        return;
    }

    let target = Rect {
        min: (0, 0),
        max: (params.target_width as i32, params.target_height as i32),
    };
    let scissor = Rect {
        min: (params.scissor.x, params.scissor.y),
        max: (
            params.scissor.x + params.scissor.width as i32,
            params.scissor.y + params.scissor.height as i32,
        ),
    };
    let bounds = Rect {
        min: (min_x.floor() as i32, min_y.floor() as i32),
        max: (max_x.ceil() as i32, max_y.ceil() as i32),
    }
    .intersect(&target)
    .intersect(&scissor);
    if bounds.is_empty() {
        return;
    }

    let points = [(v[0].x, v[0].y), (v[1].x, v[1].y), (v[2].x, v[2].y)];
    let one_over_w = Plane::through(points, [v[0].rhw, v[1].rhw, v[2].rhw]);
    let depth = Plane::through(points, [v[0].depth, v[1].depth, v[2].depth]);
    if ![one_over_w, depth]
        .iter()
        .all(|p| p.a.is_finite() && p.b.is_finite() && p.c.is_finite())
    {
        return;
    }

    let mut attributes = [AttributePlanes::default(); MAX_ATTRIBUTES];
    for i in 0..params.attribute_count {
        attributes[i] = match params.interpolation[i] {
            InterpolationMode::Flat => AttributePlanes::Flat(flat[i]),
            InterpolationMode::Linear => {
                let mut planes = [Plane::default(); 4];
                for c in 0..4 {
                    planes[c] = Plane::through(
                        points,
                        [
                            v[0].attributes[i][c],
                            v[1].attributes[i][c],
                            v[2].attributes[i][c],
                        ],
                    );
                }
                AttributePlanes::Linear(planes)
            }
            InterpolationMode::Perspective => {
                let mut planes = [Plane::default(); 4];
                for c in 0..4 {
                    planes[c] = Plane::through(
                        points,
                        [
                            v[0].attributes[i][c] * v[0].rhw,
                            v[1].attributes[i][c] * v[1].rhw,
                            v[2].attributes[i][c] * v[2].rhw,
                        ],
                    );
                }
                AttributePlanes::Perspective(planes)
            }
        };
    }

    primitives.push(Primitive {
        edges,
        cluster_mask: Primitive::clusters_for_bounds(&bounds, params.target_height),
        bounds,
        front_facing,
        one_over_w,
        depth,
        attribute_count: params.attribute_count,
        attributes,
    });
}

fn setup_line(triangle: &Triangle, primitives: &mut Vec<Primitive>, params: &SetupParams) {
    if !triangle.v[..2].iter().all(position_is_finite) {
        return;
    }
    let Some((a, b)) = clip_segment(&triangle.v[0], &triangle.v[1]) else {
        return;
    };
    let (Some(sa), Some(sb)) = (project(&a, &params.viewport), project(&b, &params.viewport))
    else {
        return;
    };

    let dx = sb.x - sa.x;
    let dy = sb.y - sa.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 || !len.is_finite() {
        return;
    }
    let half = params.line_width * 0.5;
    let (px, py) = (-dy / len * half, dx / len * half);

    let corner = |s: &ScreenVertex, sign: f32| ScreenVertex {
        x: s.x + px * sign,
        y: s.y + py * sign,
        ..*s
    };
    let a0 = corner(&sa, 1.0);
    let a1 = corner(&sa, -1.0);
    let b0 = corner(&sb, 1.0);
    let b1 = corner(&sb, -1.0);

    let flat = triangle.v[triangle.provoking].attributes;
    emit_screen_triangle([a0, a1, b0], &flat, false, primitives, params);
    emit_screen_triangle([b0, a1, b1], &flat, false, primitives, params);
}

fn setup_point(triangle: &Triangle, primitives: &mut Vec<Primitive>, params: &SetupParams) {
    let v = &triangle.v[0];
    if !position_is_finite(v) || outcode(v) != 0 {
        return;
    }
    let Some(centre) = project(v, &params.viewport) else {
        return;
    };
    let half = params.point_size * 0.5;
    fn corner(centre: ScreenVertex, sx: f32, sy: f32, half: f32) -> ScreenVertex {
        ScreenVertex {
            x: centre.x + sx * half,
            y: centre.y + sy * half,
            ..centre
        }
    }
    let tl = corner(centre, -1.0, -1.0, half);
    let tr = corner(centre, 1.0, -1.0, half);
    let bl = corner(centre, -1.0, 1.0, half);
    let br = corner(centre, 1.0, 1.0, half);

    let flat = v.attributes;
    emit_screen_triangle([tl, bl, tr], &flat, false, primitives, params);
    emit_screen_triangle([tr, bl, br], &flat, false, primitives, params);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params_4x4() -> SetupParams {
        SetupParams {
            viewport: Viewport::covering(4, 4),
            scissor: Scissor::covering(4, 4),
            target_width: 4,
            target_height: 4,
            attribute_count: 1,
            ..SetupParams::default()
        }
    }

    fn clip_vertex(x: f32, y: f32, z: f32, w: f32) -> TransformedVertex {
        TransformedVertex {
            position: Vec4::new(x, y, z, w),
            ..TransformedVertex::default()
        }
    }

    fn full_screen_triangle() -> Triangle {
        Triangle {
            v: [
                clip_vertex(-1.0, -1.0, 0.5, 1.0),
                clip_vertex(1.0, -1.0, 0.5, 1.0),
                clip_vertex(0.0, 1.0, 0.5, 1.0),
            ],
            provoking: 0,
        }
    }

    #[test]
    fn visible_triangle_produces_one_primitive() {
        let mut primitives = Vec::new();
        let count = StandardSetup.setup(
            &[full_screen_triangle()],
            &mut primitives,
            &params_4x4(),
        );
        assert_eq!(count, 1);
        let primitive = &primitives[0];
        assert!(!primitive.bounds.is_empty());
        assert_ne!(primitive.cluster_mask, 0);
    }

    #[test]
    fn behind_near_plane_is_dropped() {
        let triangle = Triangle {
            v: [
                clip_vertex(-1.0, -1.0, -0.5, 1.0),
                clip_vertex(1.0, -1.0, -0.5, 1.0),
                clip_vertex(0.0, 1.0, -0.5, 1.0),
            ],
            provoking: 0,
        };
        let mut primitives = Vec::new();
        let count = StandardSetup.setup(&[triangle], &mut primitives, &params_4x4());
        assert_eq!(count, 0);
    }

    #[test]
    fn zero_area_triangles_are_dropped() {
        let triangle = Triangle {
            v: [
                clip_vertex(-0.5, 0.0, 0.5, 1.0),
                clip_vertex(0.0, 0.0, 0.5, 1.0),
                clip_vertex(0.5, 0.0, 0.5, 1.0),
            ],
            provoking: 0,
        };
        let mut primitives = Vec::new();
        let count = StandardSetup.setup(&[triangle], &mut primitives, &params_4x4());
        assert_eq!(count, 0);
    }

    #[test]
    fn nan_positions_are_dropped() {
        let triangle = Triangle {
            v: [
                clip_vertex(f32::NAN, -1.0, 0.5, 1.0),
                clip_vertex(1.0, -1.0, 0.5, 1.0),
                clip_vertex(0.0, 1.0, 0.5, 1.0),
            ],
            provoking: 0,
        };
        let mut primitives = Vec::new();
        let count = StandardSetup.setup(&[triangle], &mut primitives, &params_4x4());
        assert_eq!(count, 0);
    }

    #[test]
    fn clipped_triangle_fans_into_multiple_primitives() {
        // One vertex far outside the right plane.
        let triangle = Triangle {
            v: [
                clip_vertex(-0.5, -0.5, 0.5, 1.0),
                clip_vertex(3.0, 0.0, 0.5, 1.0),
                clip_vertex(-0.5, 0.5, 0.5, 1.0),
            ],
            provoking: 0,
        };
        let mut primitives = Vec::new();
        let count = StandardSetup.setup(&[triangle], &mut primitives, &params_4x4());
        assert!(count >= 2, "expected a fan, got {count}");
    }

    #[test]
    fn culling_honours_facing() {
        // This triangle projects clockwise per the framebuffer area formula.
        let mut params = params_4x4();
        params.cull_mode = CullMode::Back;
        let mut primitives = Vec::new();
        let count = StandardSetup.setup(&[full_screen_triangle()], &mut primitives, &params);
        assert_eq!(count, 0);

        params.cull_mode = CullMode::Front;
        let count = StandardSetup.setup(&[full_screen_triangle()], &mut primitives, &params);
        assert_eq!(count, 1);
    }

    #[test]
    fn cluster_masks_cover_large_targets() {
        let mut params = params_4x4();
        params.viewport = Viewport::covering(64, 64);
        params.scissor = Scissor::covering(64, 64);
        params.target_width = 64;
        params.target_height = 64;
        let mut primitives = Vec::new();
        StandardSetup.setup(&[full_screen_triangle()], &mut primitives, &params);
        assert_eq!(primitives[0].cluster_mask, u16::MAX);
    }

    #[test]
    fn lines_expand_to_a_quad() {
        let mut params = params_4x4();
        params.class = PrimitiveClass::Line;
        let line = Triangle {
            v: [
                clip_vertex(-0.5, 0.0, 0.5, 1.0),
                clip_vertex(0.5, 0.0, 0.5, 1.0),
                TransformedVertex::default(),
            ],
            provoking: 0,
        };
        let mut primitives = Vec::new();
        let count = StandardSetup.setup(&[line], &mut primitives, &params);
        assert_eq!(count, 2);
    }

    #[test]
    fn points_expand_to_a_quad() {
        let mut params = params_4x4();
        params.class = PrimitiveClass::Point;
        params.point_size = 1.0;
        let point = Triangle {
            v: [
                clip_vertex(0.0, 0.0, 0.5, 1.0),
                TransformedVertex::default(),
                TransformedVertex::default(),
            ],
            provoking: 0,
        };
        let mut primitives = Vec::new();
        let count = StandardSetup.setup(&[point], &mut primitives, &params);
        assert_eq!(count, 2);
    }
}
