use ash::vk;
use glam::{Mat4, Vec3};

/// Fixed perspective camera looking at a target point
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    position: Vec3,
    target: Vec3,
    up: Vec3,
    fov_y_deg: f32,
    near: f32,
    far: f32,
}

impl Camera {
    const DEFAULT_FOV_Y_DEG: f32 = 45.0;

    pub fn new() -> Self {
        Self {
            position: Vec3::new(2.0, 2.0, 2.0),
            target: Vec3::ZERO,
            up: Vec3::Z,
            fov_y_deg: Self::DEFAULT_FOV_Y_DEG,
            near: 0.1,
            far: 10.0,
        }
    }

    pub fn get_view_mat(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    /// Perspective projection into Vulkan clip space, where Y points down and depth is `[0, 1]`
    pub fn get_proj_mat(&self, extent: vk::Extent2D) -> Mat4 {
        let aspect_ratio = extent.width.max(1) as f32 / extent.height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(
            self.fov_y_deg.to_radians(),
            aspect_ratio,
            self.near,
            self.far,
        );
        proj.y_axis.y *= -1.0;
        proj
    }

    pub fn get_position(&self) -> Vec3 {
        self.position
    }

    pub fn get_near(&self) -> f32 {
        self.near
    }

    pub fn get_far(&self) -> f32 {
        self.far
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new()
    }
}
