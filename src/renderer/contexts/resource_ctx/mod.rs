pub mod upload;
pub mod uniforms;
pub mod descriptors;
#[cfg(test)]
pub mod testing;

use color_eyre::Result;
use crate::renderer::config::{BuiltinMesh, RenderConfig};
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::resource_ctx::descriptors::FrameDescriptorSets;
use crate::renderer::contexts::resource_ctx::uniforms::FrameUniforms;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::resources::model::Model;
use crate::renderer::resources::texture::Texture;

const CHECKERBOARD_SIZE: u32 = 256;
const CHECKERBOARD_CELLS: u32 = 8;
const SPHERE_RADIUS: f32 = 0.75;
const SPHERE_RINGS: u32 = 16;
const SPHERE_SEGMENTS: u32 = 32;

/// Responsibilities:
/// - Upload the model and its texture once at startup
/// - Own the per-slot uniform buffers and the descriptor sets that reference them
///
/// Descriptor sets are released first, before the resources they point at.
pub struct RenderResourceContext {
    pub descriptors: FrameDescriptorSets,
    pub uniforms: FrameUniforms,
    pub texture: Texture,
    pub model: Model,
}

impl RenderResourceContext {
    pub fn new(dev_ctx: &RenderDeviceContext, config: &RenderConfig) -> Result<Self> {
        let dev = &dev_ctx.device;

        let mesh = match &config.model_path {
            Some(path) => Mesh::load_obj(path)?,
            None => match config.builtin_mesh {
                BuiltinMesh::Triangle => Mesh::new_triangle(),
                BuiltinMesh::Quad => Mesh::new_textured_quad(),
                BuiltinMesh::Sphere => Mesh::new_uv_sphere(SPHERE_RADIUS, SPHERE_RINGS, SPHERE_SEGMENTS),
            },
        };
        let model = Model::upload(dev, &mesh)?;
        log::info!(
            "Uploaded model: {} vertices, {} triangles",
            model.vertex_count(),
            mesh.triangle_count(),
        );

        let texture = match &config.texture_path {
            Some(path) => Texture::load(dev, path)?,
            None => Texture::checkerboard(dev, CHECKERBOARD_SIZE, CHECKERBOARD_CELLS)?,
        };

        let uniforms = FrameUniforms::new(dev, config.frames_in_flight)?;
        let descriptors = FrameDescriptorSets::new(dev, uniforms.buffers(), &texture)?;

        Ok(Self {
            descriptors,
            uniforms,
            texture,
            model,
        })
    }
}
