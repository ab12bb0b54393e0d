use color_eyre::Result;
use crate::renderer::contexts::frame_ctx::recorder::DrawGeometry;
use crate::renderer::contexts::resource_ctx::upload::{
    check_indices, check_vertex_count, create_index_buffer, create_vertex_buffer, TransferDevice,
};
use crate::renderer::resources::buffer::{Buffer, GpuBuffer};
use crate::renderer::resources::mesh::Mesh;

/// A mesh resident in device-local vertex and index buffers
pub struct Model<B: GpuBuffer = Buffer> {
    pub vertex_buffer: B,
    pub index_buffer: B,
    vertex_count: usize,
    index_count: u32,
}

impl<B: GpuBuffer> Model<B> {
    /// Uploads `mesh`. The whole mesh is validated before the first allocation.
    pub fn upload<D>(dev: &D, mesh: &Mesh) -> Result<Self>
    where
        D: TransferDevice<Buffer = B>,
    {
        check_vertex_count(mesh.vertices.len())?;
        check_indices(&mesh.indices, mesh.vertices.len())?;

        let vertex_buffer = create_vertex_buffer(dev, &mesh.vertices)?;
        let index_buffer = create_index_buffer(dev, &mesh.indices, mesh.vertices.len())?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            vertex_count: mesh.vertices.len(),
            index_count: mesh.indices.len() as u32,
        })
    }

    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn geometry(&self) -> DrawGeometry {
        DrawGeometry {
            vertex_buffer: self.vertex_buffer.handle(),
            index_buffer: self.index_buffer.handle(),
            index_count: self.index_count,
        }
    }
}
