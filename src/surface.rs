//! Image plane mesh, texture hand-off and watermark placement.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;
use image::RgbaImage;

use crate::params::SurfaceConfig;

/// Vertex data for plane meshes (position + UV + normal)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
}

/// Subdivided plane in the XY plane, centered on the origin, facing +Z
pub struct PlaneMesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub width: f32,
    pub height: f32,
}

impl PlaneMesh {
    /// Create a `width` x `height` plane with `segments` subdivisions per side
    pub fn new(width: f32, height: f32, segments: u32) -> Self {
        let segments = segments.max(1);
        let row = segments + 1;
        let half_w = width / 2.0;
        let half_h = height / 2.0;
        let step_x = width / segments as f32;
        let step_y = height / segments as f32;

        let mut vertices = Vec::with_capacity((row * row) as usize);
        let mut indices = Vec::with_capacity((segments * segments * 6) as usize);

        // Rows run top to bottom so v = 0 is the top edge of the image
        for iy in 0..row {
            for ix in 0..row {
                vertices.push(Vertex {
                    position: [
                        ix as f32 * step_x - half_w,
                        half_h - iy as f32 * step_y,
                        0.0,
                    ],
                    uv: [ix as f32 / segments as f32, iy as f32 / segments as f32],
                    normal: [0.0, 0.0, 1.0],
                });
            }
        }

        // Counter-clockwise seen from +Z
        for iy in 0..segments {
            for ix in 0..segments {
                let top_left = iy * row + ix;
                let top_right = top_left + 1;
                let bottom_left = top_left + row;
                let bottom_right = bottom_left + 1;

                indices.extend_from_slice(&[
                    top_left,
                    bottom_left,
                    top_right,
                    top_right,
                    bottom_left,
                    bottom_right,
                ]);
            }
        }

        Self {
            vertices,
            indices,
            width,
            height,
        }
    }
}

/// The textured plane the user image is shown on
///
/// Geometry is rebuilt whenever a new image arrives; the decoded image is
/// parked until the renderer picks it up, which then drops the old texture.
pub struct VisualSurface {
    mesh: PlaneMesh,
    mesh_version: u64,
    image_size: Option<(u32, u32)>,
    pending_image: Option<RgbaImage>,
    config: SurfaceConfig,
}

impl VisualSurface {
    /// Square plane with no image
    pub fn new(config: SurfaceConfig) -> Self {
        let mesh = PlaneMesh::new(config.base_height, config.base_height, config.segments);
        Self {
            mesh,
            mesh_version: 0,
            image_size: None,
            pending_image: None,
            config,
        }
    }

    /// Swap in a fully decoded image, resizing the plane to its aspect ratio
    pub fn set_image(&mut self, image: RgbaImage) {
        let (width, height) = image.dimensions();
        let (plane_w, plane_h) = plane_size(width, height, self.config.base_height);

        self.mesh = PlaneMesh::new(plane_w, plane_h, self.config.segments);
        self.mesh_version += 1;
        self.image_size = Some((width, height));
        self.pending_image = Some(image);
    }

    pub fn mesh(&self) -> &PlaneMesh {
        &self.mesh
    }

    /// Incremented on every geometry rebuild
    pub fn mesh_version(&self) -> u64 {
        self.mesh_version
    }

    pub fn image_size(&self) -> Option<(u32, u32)> {
        self.image_size
    }

    /// Hand the newest image to the renderer (at most once)
    pub fn take_pending_image(&mut self) -> Option<RgbaImage> {
        self.pending_image.take()
    }
}

/// Plane dimensions keeping the image aspect ratio at a fixed height
pub fn plane_size(image_width: u32, image_height: u32, base_height: f32) -> (f32, f32) {
    let aspect = image_width.max(1) as f32 / image_height.max(1) as f32;
    (base_height * aspect, base_height)
}

/// Bottom-right corner position for a square watermark of edge `size`
///
/// Uses the visible frustum extent at the plane z = 0 for a camera at
/// `camera_distance`.
pub fn watermark_position(fov_degrees: f32, camera_distance: f32, aspect: f32, size: f32) -> Vec3 {
    let v_fov = fov_degrees.to_radians();
    let height = 2.0 * (v_fov / 2.0).tan() * camera_distance.abs();
    let width = height * aspect;

    Vec3::new(width / 2.0 - size * 0.6, -height / 2.0 + size * 0.6, 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_mesh_creation() {
        let mesh = PlaneMesh::new(5.0, 5.0, 50);

        // (segments + 1)^2 vertices, segments^2 * 2 triangles
        assert_eq!(mesh.vertices.len(), 51 * 51);
        assert_eq!(mesh.indices.len(), 50 * 50 * 6);
        assert!(mesh.indices.iter().all(|&i| (i as usize) < mesh.vertices.len()));

        let first = mesh.vertices[0];
        let last = mesh.vertices[mesh.vertices.len() - 1];
        assert_eq!(first.position, [-2.5, 2.5, 0.0]);
        assert_eq!(first.uv, [0.0, 0.0]);
        assert!((last.position[0] - 2.5).abs() < 1e-5);
        assert!((last.position[1] + 2.5).abs() < 1e-5);
        assert_eq!(last.uv, [1.0, 1.0]);
    }

    #[test]
    fn test_plane_keeps_aspect_ratio() {
        assert_eq!(plane_size(1920, 1080, 5.0), (5.0 * 1920.0 / 1080.0, 5.0));
        assert_eq!(plane_size(500, 1000, 5.0), (2.5, 5.0));
    }

    #[test]
    fn test_set_image_rebuilds_geometry() {
        let mut surface = VisualSurface::new(SurfaceConfig::default());
        assert_eq!(surface.mesh().width, 5.0);
        assert!(surface.take_pending_image().is_none());

        surface.set_image(RgbaImage::new(200, 100));

        assert_eq!(surface.mesh_version(), 1);
        assert_eq!(surface.image_size(), Some((200, 100)));
        assert!((surface.mesh().width - 10.0).abs() < 1e-5);
        assert_eq!(surface.mesh().height, 5.0);
        assert!(surface.take_pending_image().is_some());
        assert!(surface.take_pending_image().is_none());
    }

    #[test]
    fn test_watermark_position() {
        // fov 90 at distance 1: visible height 2, width 2 * aspect
        let pos = watermark_position(90.0, 1.0, 2.0, 1.0);
        assert!((pos.x - (2.0 - 0.6)).abs() < 1e-5);
        assert!((pos.y - (-1.0 + 0.6)).abs() < 1e-5);
        assert_eq!(pos.z, 0.0);
    }
}
