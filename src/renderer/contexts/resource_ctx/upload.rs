use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::error::RenderError;
use crate::renderer::contexts::frame_ctx::recorder::VkCommandSink;
use crate::renderer::resources::buffer::{Buffer, GpuBuffer, MemoryDomain};
use crate::renderer::resources::image::{Image, ImageCreateInfo};
use crate::renderer::resources::texture::record_mipmap_generation;
use crate::renderer::resources::vertex::Vertex;

/// Fewer vertices than this cannot form a single triangle
pub const MIN_VERTICES: usize = 3;

/// The device operations a staged upload is built from
pub trait TransferDevice {
    type Buffer: GpuBuffer;

    fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        domain: MemoryDomain,
        name: &str,
    ) -> Result<Self::Buffer>;

    /// Copies `size` bytes and waits for the copy to finish
    fn copy_buffer(&self, src: &Self::Buffer, dst: &mut Self::Buffer, size: u64) -> Result<()>;
}

impl TransferDevice for RenderDevice {
    type Buffer = Buffer;

    fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        domain: MemoryDomain,
        name: &str,
    ) -> Result<Buffer> {
        RenderDevice::create_buffer(self, size, usage, domain, name)
    }

    fn copy_buffer(&self, src: &Buffer, dst: &mut Buffer, size: u64) -> Result<()> {
        RenderDevice::copy_buffer(self, src.handle(), dst.handle(), size)
    }
}

/// The image operations a staged texture upload adds on top of buffer transfers
pub trait ImageTransferDevice: TransferDevice {
    type Image;

    /// Whether optimally tiled images of `format` can be blitted with a linear filter
    fn supports_linear_blit(&self, format: vk::Format) -> bool;
    fn create_image(&self, info: &ImageCreateInfo) -> Result<Self::Image>;
    fn transition_image_layout(
        &self,
        image: &Self::Image,
        format: vk::Format,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        mip_levels: u32,
    ) -> Result<()>;
    /// Copies tightly packed texels into mip level 0, which must be in `TRANSFER_DST_OPTIMAL`
    fn copy_buffer_to_image(&self, src: &Self::Buffer, image: &Self::Image, width: u32, height: u32) -> Result<()>;
    /// Fills every mip level from level 0 and leaves all of them shader readable
    fn generate_mipmaps(&self, image: &Self::Image, width: u32, height: u32) -> Result<()>;
}

impl ImageTransferDevice for RenderDevice {
    type Image = Image;

    fn supports_linear_blit(&self, format: vk::Format) -> bool {
        RenderDevice::supports_linear_blit(self, format)
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<Image> {
        RenderDevice::create_image(self, info)
    }

    fn transition_image_layout(
        &self,
        image: &Image,
        format: vk::Format,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        mip_levels: u32,
    ) -> Result<()> {
        RenderDevice::transition_image_layout(self, image.image, format, old_layout, new_layout, mip_levels)
    }

    fn copy_buffer_to_image(&self, src: &Buffer, image: &Image, width: u32, height: u32) -> Result<()> {
        RenderDevice::copy_buffer_to_image(self, src.handle(), image.image, width, height, 1)
    }

    fn generate_mipmaps(&self, image: &Image, width: u32, height: u32) -> Result<()> {
        self.immediate_submit(|cmd, device| {
            record_mipmap_generation(&mut VkCommandSink::new(device, cmd), image.image, width, height);
            Ok(())
        })
    }
}

/// Extra usage uploaded buffers carry so they can be read back for inspection
fn debug_usage() -> vk::BufferUsageFlags {
    if cfg!(debug_assertions) {
        vk::BufferUsageFlags::TRANSFER_SRC
    } else {
        vk::BufferUsageFlags::empty()
    }
}

/// Moves `bytes` into a new device-local buffer through a host-visible staging buffer.
///
/// The staging buffer never outlives this call.
pub fn upload_to_device_local<D: TransferDevice>(
    dev: &D,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
    name: &str,
) -> Result<D::Buffer> {
    if bytes.is_empty() {
        return Err(eyre!("Cannot upload an empty {}", name));
    }
    let size = bytes.len() as u64;

    let mut staging = dev.create_buffer(
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryDomain::HostCoherent,
        &format!("{} Staging Buffer", name),
    )?;
    // Coherent memory, so no flush is needed before the copy
    staging.write_bytes(bytes)?;

    let mut buffer = dev.create_buffer(
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST | debug_usage(),
        MemoryDomain::DeviceLocal,
        name,
    )?;
    dev.copy_buffer(&staging, &mut buffer, size)?;
    drop(staging);

    Ok(buffer)
}

/// Copies a buffer into host-readable memory and returns its contents
#[cfg(test)]
pub fn read_back<D: TransferDevice>(dev: &D, src: &D::Buffer) -> Result<Vec<u8>> {
    let mut readback = dev.create_buffer(
        src.size(),
        vk::BufferUsageFlags::TRANSFER_DST,
        MemoryDomain::HostReadback,
        "Readback Buffer",
    )?;
    dev.copy_buffer(src, &mut readback, src.size())?;
    readback.read_bytes()
}

/// Uploads vertices into a device-local vertex buffer.
///
/// Fewer than `MIN_VERTICES` vertices is rejected before anything is allocated.
pub fn create_vertex_buffer<D: TransferDevice>(dev: &D, vertices: &[Vertex]) -> Result<D::Buffer> {
    check_vertex_count(vertices.len())?;
    upload_to_device_local(
        dev,
        bytemuck::cast_slice(vertices),
        vk::BufferUsageFlags::VERTEX_BUFFER,
        "Vertex Buffer",
    )
}

/// Uploads a triangle list's indices into a device-local index buffer
pub fn create_index_buffer<D: TransferDevice>(
    dev: &D,
    indices: &[u32],
    vertex_count: usize,
) -> Result<D::Buffer> {
    check_indices(indices, vertex_count)?;
    upload_to_device_local(
        dev,
        bytemuck::cast_slice(indices),
        vk::BufferUsageFlags::INDEX_BUFFER,
        "Index Buffer",
    )
}

pub fn check_vertex_count(count: usize) -> Result<()> {
    if count < MIN_VERTICES {
        return Err(RenderError::InsufficientVertices {
            count,
            minimum: MIN_VERTICES,
        }
        .into());
    }
    Ok(())
}

pub fn check_indices(indices: &[u32], vertex_count: usize) -> Result<()> {
    if indices.is_empty() {
        return Err(RenderError::InvalidIndices("no indices".into()).into());
    }
    if indices.len() % 3 != 0 {
        return Err(RenderError::InvalidIndices(format!(
            "{} indices do not form whole triangles",
            indices.len(),
        ))
        .into());
    }
    if let Some(index) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(RenderError::InvalidIndices(format!(
            "index {} out of range for {} vertices",
            index, vertex_count,
        ))
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::contexts::resource_ctx::testing::{FakeCall, FakeTransferDevice};
    use crate::renderer::resources::mesh::Mesh;

    #[test]
    fn test_upload_round_trips_bytes() {
        let dev = FakeTransferDevice::default();
        let bytes: Vec<u8> = (0..=255u8).cycle().take(1000).collect();

        let buffer = upload_to_device_local(&dev, &bytes, vk::BufferUsageFlags::VERTEX_BUFFER, "Test").unwrap();
        assert_eq!(buffer.domain(), MemoryDomain::DeviceLocal);
        assert!(buffer.read_bytes().is_err());
        assert_eq!(read_back(&dev, &buffer).unwrap(), bytes);
    }

    #[test]
    fn test_staging_buffer_is_released() {
        let dev = FakeTransferDevice::default();
        let buffer = create_vertex_buffer(&dev, &Mesh::new_textured_quad().vertices).unwrap();

        assert_eq!(dev.live_buffers(), 1);
        let calls = dev.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(calls[0], FakeCall::Create { domain: MemoryDomain::HostCoherent, .. }));
        assert!(matches!(calls[1], FakeCall::Create { domain: MemoryDomain::DeviceLocal, .. }));
        assert!(matches!(calls[2], FakeCall::Copy { .. }));
        assert!(buffer.usage.contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST));

        drop(buffer);
        assert_eq!(dev.live_buffers(), 0);
    }

    #[test]
    fn test_two_vertices_rejected_before_any_gpu_call() {
        let dev = FakeTransferDevice::default();
        let vertices = &Mesh::new_triangle().vertices[..2];

        let err = create_vertex_buffer(&dev, vertices).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::InsufficientVertices { count: 2, minimum: 3 }),
        ));
        assert!(dev.calls().is_empty());
    }

    #[test]
    fn test_index_validation() {
        assert!(check_indices(&[0, 1, 2], 3).is_ok());
        assert!(check_indices(&[], 3).is_err());
        assert!(check_indices(&[0, 1], 3).is_err());
        assert!(check_indices(&[0, 1, 3], 3).is_err());

        let dev = FakeTransferDevice::default();
        assert!(create_index_buffer(&dev, &[0, 1, 5], 3).is_err());
        assert!(dev.calls().is_empty());
    }

    #[test]
    fn test_empty_upload_is_rejected() {
        let dev = FakeTransferDevice::default();
        assert!(upload_to_device_local(&dev, &[], vk::BufferUsageFlags::INDEX_BUFFER, "Empty").is_err());
        assert!(dev.calls().is_empty());
    }
}
