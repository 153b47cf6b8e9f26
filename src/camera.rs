//! Fixed perspective camera looking at the image plane.

use glam::{Mat4, Vec3};

use crate::params::RenderConfig;

/// Perspective camera on the +Z axis looking at the origin
#[derive(Debug, Clone)]
pub struct Camera {
    fov_degrees: f32,
    aspect: f32,
    near: f32,
    far: f32,
    eye: Vec3,
}

impl Camera {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            fov_degrees: config.fov_degrees,
            aspect: config.aspect_ratio(),
            near: config.near_plane,
            far: config.far_plane,
            eye: Vec3::new(0.0, 0.0, config.camera_distance),
        }
    }

    /// Track the window size (ignores degenerate sizes while minimized)
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.aspect = width as f32 / height as f32;
        }
    }

    pub fn view(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, Vec3::ZERO, Vec3::Y)
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_degrees.to_radians(), self.aspect, self.near, self.far)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection() * self.view()
    }

    pub fn fov_degrees(&self) -> f32 {
        self.fov_degrees
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    /// Distance from the eye to the z = 0 plane
    pub fn distance(&self) -> f32 {
        self.eye.z.abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_projects_to_center() {
        let camera = Camera::new(&RenderConfig::default());
        let clip = camera.view_proj() * Vec3::ZERO.extend(1.0);
        let ndc = clip.truncate() / clip.w;

        assert!(ndc.x.abs() < 1e-5);
        assert!(ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn test_viewport_updates_aspect() {
        let mut camera = Camera::new(&RenderConfig::default());
        camera.set_viewport(1920, 1080);
        assert!((camera.aspect() - 1920.0 / 1080.0).abs() < 1e-6);

        camera.set_viewport(0, 0);
        assert!((camera.aspect() - 1920.0 / 1080.0).abs() < 1e-6);
        assert_eq!(camera.distance(), 5.0);
    }
}
