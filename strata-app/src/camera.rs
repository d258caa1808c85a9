//! Scripted orbit camera for headless simulation.

use glam::Vec3;
use strata_data::Aabb;
use strata_stream::ViewState;

/// Circles a target at a fixed radius and height, one step per frame.
#[derive(Debug, Clone)]
pub struct OrbitCamera {
    pub center: Vec3,
    pub radius: f32,
    pub height: f32,
    /// Radians advanced per frame.
    pub step: f32,
    pub fov_y: f32,
    pub viewport: (f32, f32),
}

impl OrbitCamera {
    /// Orbit framing `bounds`, starting at twice its largest extent.
    pub fn framing(bounds: &Aabb) -> Self {
        let extent = bounds.max_extent().max(1.0);
        Self {
            center: bounds.center(),
            radius: extent * 2.0,
            height: extent * 0.5,
            step: 0.05,
            fov_y: 60f32.to_radians(),
            viewport: (1920.0, 1080.0),
        }
    }

    pub fn with_step(mut self, step: f32) -> Self {
        self.step = step;
        self
    }

    /// Move in to `fraction` of the starting radius over `frames` frames.
    pub fn dolly(&self, frame: u64, frames: u64, fraction: f32) -> f32 {
        let t = if frames == 0 {
            0.0
        } else {
            frame as f32 / frames as f32
        };
        self.radius * (1.0 - t * (1.0 - fraction))
    }

    pub fn view(&self, frame: u64, frames: u64) -> ViewState {
        let angle = frame as f32 * self.step;
        let radius = self.dolly(frame, frames, 0.25);
        let eye = self.center + Vec3::new(angle.cos() * radius, self.height, angle.sin() * radius);
        let (width, height) = self.viewport;
        ViewState::look_at(
            eye,
            self.center,
            self.fov_y,
            width / height,
            height,
            0.01,
            radius * 10.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orbit_keeps_target_in_view() {
        let bounds = Aabb::new(Vec3::ZERO, Vec3::new(10.0, 4.0, 6.0));
        let camera = OrbitCamera::framing(&bounds);
        for frame in [0, 10, 37, 99] {
            let view = camera.view(frame, 100);
            assert!(view.frustum().contains_point(bounds.center()));
            assert!(view.frustum().intersects(&bounds));
        }
    }

    #[test]
    fn test_dolly_moves_in() {
        let camera = OrbitCamera::framing(&Aabb::new(Vec3::ZERO, Vec3::splat(4.0)));
        assert_eq!(camera.dolly(0, 100, 0.25), camera.radius);
        assert!((camera.dolly(100, 100, 0.25) - camera.radius * 0.25).abs() < 1e-5);
    }
}
