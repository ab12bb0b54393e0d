use std::time::Duration;
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};
use crate::renderer::camera::Camera;

pub const ROTATION_AXIS: Vec3 = Vec3::Z;
pub const ROTATION_DEGREES_PER_SEC: f32 = 90.0;

/// Transforms for the vertex stage, one copy per frame-in-flight slot.
///
/// Matches the std140 block at set 0, binding 0 of `textured.vert`.
#[repr(C)]
#[derive(Debug, Default, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl UniformBufferObject {
    /// The model spun about a fixed axis by `elapsed`, seen through `camera`
    pub fn animated(camera: &Camera, elapsed: Duration, extent: vk::Extent2D) -> Self {
        let angle = elapsed.as_secs_f32() * ROTATION_DEGREES_PER_SEC.to_radians();
        Self {
            model: Mat4::from_axis_angle(ROTATION_AXIS, angle),
            view: camera.get_view_mat(),
            proj: camera.get_proj_mat(extent),
        }
    }
}
