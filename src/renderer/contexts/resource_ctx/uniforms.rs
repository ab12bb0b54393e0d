use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::OptionExt;
use crate::renderer::contexts::resource_ctx::upload::TransferDevice;
use crate::renderer::resources::buffer::{Buffer, GpuBuffer, MemoryDomain};
use crate::renderer::shader_data::UniformBufferObject;

/// One persistently mapped uniform buffer per frame-in-flight slot.
///
/// A slot's buffer may only be written after that slot's fence has been waited on.
pub struct FrameUniforms<B: GpuBuffer = Buffer> {
    buffers: Vec<B>,
}

impl<B: GpuBuffer> FrameUniforms<B> {
    pub fn new<D>(dev: &D, frames_in_flight: usize) -> Result<Self>
    where
        D: TransferDevice<Buffer = B>,
    {
        let buffers = (0..frames_in_flight)
            .map(|slot| {
                dev.create_buffer(
                    size_of::<UniformBufferObject>() as u64,
                    vk::BufferUsageFlags::UNIFORM_BUFFER,
                    MemoryDomain::HostCoherent,
                    &format!("Uniform Buffer {}", slot),
                )
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { buffers })
    }

    pub fn update(&mut self, slot: usize, ubo: &UniformBufferObject) -> Result<()> {
        self.buffers
            .get_mut(slot)
            .ok_or_eyre("No uniform buffer for frame slot")?
            .write_bytes(bytemuck::bytes_of(ubo))
    }

    pub fn buffers(&self) -> &[B] {
        &self.buffers
    }
}
