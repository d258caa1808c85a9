//! Camera state consumed by culling and level-of-detail scoring.

use glam::{Mat4, Vec3, Vec4};
use strata_data::Aabb;

/// Minimum camera distance used when projecting box sizes.
const MIN_DISTANCE: f32 = 1e-3;

/// Camera snapshot for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    /// Eye position in world space.
    pub position: Vec3,
    /// Projection times view.
    pub view_proj: Mat4,
    /// Viewport height in pixels.
    pub viewport_height: f32,
    /// Vertical field of view in radians.
    pub fov_y: f32,
}

impl ViewState {
    /// Right-handed perspective camera looking from `eye` at `target`.
    pub fn look_at(
        eye: Vec3,
        target: Vec3,
        fov_y: f32,
        aspect: f32,
        viewport_height: f32,
        near: f32,
        far: f32,
    ) -> Self {
        let view = Mat4::look_at_rh(eye, target, Vec3::Y);
        let proj = Mat4::perspective_rh(fov_y, aspect, near, far);
        Self {
            position: eye,
            view_proj: proj * view,
            viewport_height,
            fov_y,
        }
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_proj(&self.view_proj)
    }

    /// Projected size in pixels of the box's largest extent.
    ///
    /// Uses the distance to the nearest point of the box, so a camera inside
    /// the box yields a very large error.
    pub fn screen_error(&self, bounds: &Aabb) -> f32 {
        if bounds.is_empty() {
            return 0.0;
        }
        let distance = bounds.distance_to(self.position).max(MIN_DISTANCE);
        let slope = (self.fov_y * 0.5).tan().max(f32::EPSILON);
        bounds.max_extent() / (2.0 * distance * slope) * self.viewport_height
    }
}

/// Six inward-facing planes `(n, d)` with `n·p + d >= 0` inside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    planes: [Vec4; 6],
}

impl Frustum {
    /// Extract planes from a view-projection matrix with a `[0, 1]` depth
    /// range.
    pub fn from_view_proj(m: &Mat4) -> Self {
        let (r0, r1, r2, r3) = (m.row(0), m.row(1), m.row(2), m.row(3));
        let planes = [r3 + r0, r3 - r0, r3 + r1, r3 - r1, r2, r3 - r2].map(|p| {
            let length = p.truncate().length();
            if length > 0.0 { p / length } else { p }
        });
        Self { planes }
    }

    /// Conservative box test: false only when the box lies entirely outside
    /// one plane.
    pub fn intersects(&self, bounds: &Aabb) -> bool {
        if bounds.is_empty() {
            return false;
        }
        self.planes.iter().all(|plane| {
            let normal = plane.truncate();
            let positive = Vec3::select(normal.cmpge(Vec3::ZERO), bounds.max, bounds.min);
            normal.dot(positive) + plane.w >= 0.0
        })
    }

    pub fn contains_point(&self, p: Vec3) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.truncate().dot(p) + plane.w >= 0.0)
    }
}
