use std::cell::{Cell, RefCell};
use std::rc::Rc;
use ash::vk;
use ash::vk::Handle;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use crate::renderer::contexts::resource_ctx::upload::{ImageTransferDevice, TransferDevice};
use crate::renderer::resources::buffer::{GpuBuffer, MemoryDomain};
use crate::renderer::resources::image::ImageCreateInfo;
use crate::renderer::resources::texture::{record_mipmap_generation, MipmapSink};

#[derive(Debug, Clone, PartialEq)]
pub enum FakeCall {
    Create { size: u64, domain: MemoryDomain },
    Copy { src: vk::Buffer, dst: vk::Buffer, size: u64 },
    CreateImage { width: u32, height: u32, mip_levels: u32 },
    Barrier {
        base_level: u32,
        level_count: u32,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    },
    CopyToImage { src: vk::Buffer, width: u32, height: u32 },
    Blit { src_level: u32, dst_level: u32 },
}

/// Buffer whose memory is a plain byte vector
#[derive(Debug)]
pub struct FakeBuffer {
    pub handle: vk::Buffer,
    pub usage: vk::BufferUsageFlags,
    domain: MemoryDomain,
    bytes: Vec<u8>,
    live: Rc<Cell<usize>>,
}

impl GpuBuffer for FakeBuffer {
    fn handle(&self) -> vk::Buffer {
        self.handle
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn domain(&self) -> MemoryDomain {
        self.domain
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.domain.is_host_visible() {
            return Err(eyre!("Cannot write to a buffer in device-local memory"));
        }
        self.bytes[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    fn read_bytes(&self) -> Result<Vec<u8>> {
        if !self.domain.is_host_visible() {
            return Err(eyre!("Cannot read from a buffer that is not host visible"));
        }
        Ok(self.bytes.clone())
    }
}

impl Drop for FakeBuffer {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

#[derive(Debug)]
pub struct FakeImage {
    pub handle: vk::Image,
    pub mip_levels: u32,
}

/// In-memory device that executes copies immediately and logs every call
pub struct FakeTransferDevice {
    calls: RefCell<Vec<FakeCall>>,
    next_handle: Cell<u64>,
    live: Rc<Cell<usize>>,
    linear_blit: bool,
}

impl Default for FakeTransferDevice {
    fn default() -> Self {
        Self {
            calls: RefCell::default(),
            next_handle: Cell::default(),
            live: Rc::default(),
            linear_blit: true,
        }
    }
}

impl FakeTransferDevice {
    /// A device whose texture format cannot be blitted with a linear filter
    pub fn without_linear_blit() -> Self {
        Self {
            linear_blit: false,
            ..Self::default()
        }
    }

    fn log(&self, call: FakeCall) {
        self.calls.borrow_mut().push(call);
    }

    fn next_handle(&self) -> u64 {
        self.next_handle.set(self.next_handle.get() + 1);
        self.next_handle.get()
    }

    pub fn calls(&self) -> Vec<FakeCall> {
        self.calls.borrow().clone()
    }

    pub fn live_buffers(&self) -> usize {
        self.live.get()
    }
}

impl TransferDevice for FakeTransferDevice {
    type Buffer = FakeBuffer;

    fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        domain: MemoryDomain,
        _name: &str,
    ) -> Result<FakeBuffer> {
        self.log(FakeCall::Create { size, domain });
        self.live.set(self.live.get() + 1);
        Ok(FakeBuffer {
            handle: vk::Buffer::from_raw(self.next_handle()),
            usage,
            domain,
            bytes: vec![0; size as usize],
            live: self.live.clone(),
        })
    }

    fn copy_buffer(&self, src: &FakeBuffer, dst: &mut FakeBuffer, size: u64) -> Result<()> {
        self.log(FakeCall::Copy {
            src: src.handle,
            dst: dst.handle,
            size,
        });
        let size = size as usize;
        dst.bytes[..size].copy_from_slice(&src.bytes[..size]);
        Ok(())
    }
}

impl ImageTransferDevice for FakeTransferDevice {
    type Image = FakeImage;

    fn supports_linear_blit(&self, _format: vk::Format) -> bool {
        self.linear_blit
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<FakeImage> {
        self.log(FakeCall::CreateImage {
            width: info.width,
            height: info.height,
            mip_levels: info.mip_levels,
        });
        Ok(FakeImage {
            handle: vk::Image::from_raw(self.next_handle()),
            mip_levels: info.mip_levels,
        })
    }

    fn transition_image_layout(
        &self,
        _image: &FakeImage,
        _format: vk::Format,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        mip_levels: u32,
    ) -> Result<()> {
        self.log(FakeCall::Barrier {
            base_level: 0,
            level_count: mip_levels,
            old_layout,
            new_layout,
        });
        Ok(())
    }

    fn copy_buffer_to_image(&self, src: &FakeBuffer, _image: &FakeImage, width: u32, height: u32) -> Result<()> {
        self.log(FakeCall::CopyToImage { src: src.handle, width, height });
        Ok(())
    }

    fn generate_mipmaps(&self, image: &FakeImage, width: u32, height: u32) -> Result<()> {
        record_mipmap_generation(&mut CallLogSink(self), image.handle, width, height);
        Ok(())
    }
}

/// Logs mip generation commands into the device's call list
struct CallLogSink<'a>(&'a FakeTransferDevice);

impl MipmapSink for CallLogSink<'_> {
    fn pipeline_barrier(
        &mut self,
        _src_stage: vk::PipelineStageFlags,
        _dst_stage: vk::PipelineStageFlags,
        barrier: vk::ImageMemoryBarrier<'static>,
    ) {
        self.0.log(FakeCall::Barrier {
            base_level: barrier.subresource_range.base_mip_level,
            level_count: barrier.subresource_range.level_count,
            old_layout: barrier.old_layout,
            new_layout: barrier.new_layout,
        });
    }

    fn blit_image(&mut self, _image: vk::Image, region: vk::ImageBlit) {
        self.0.log(FakeCall::Blit {
            src_level: region.src_subresource.mip_level,
            dst_level: region.dst_subresource.mip_level,
        });
    }
}
