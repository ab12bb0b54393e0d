use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::Result;
use color_eyre::eyre::eyre;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use crate::renderer::resources::buffer::{allocation_error, MemoryDomain};

pub struct ImageCreateInfo<'a> {
    pub width: u32,
    pub height: u32,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub domain: MemoryDomain,
    pub name: &'a str,
}

/// A 2D image, the memory bound to it and a view over all of its mip levels.
///
/// Dropping destroys the view, then the image, then frees the memory.
pub struct Image {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    pub aspect: vk::ImageAspectFlags,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Image {
    // NOTE: The memory of the returned image is uninitialized.
    // Color textures still need their pixels copied in and their layout transitioned.
    pub fn new(
        create_info: &ImageCreateInfo,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let image = {
            let info = vk::ImageCreateInfo::default()
                .format(create_info.format)
                .usage(create_info.usage)
                .extent(vk::Extent3D {
                    width: create_info.width,
                    height: create_info.height,
                    depth: 1,
                })
                .image_type(vk::ImageType::TYPE_2D)
                .mip_levels(create_info.mip_levels)
                .array_layers(1)
                .samples(create_info.samples)
                .tiling(create_info.tiling)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            unsafe { device.create_image(&info, None)? }
        };
        // Owned from here on, so an early return below releases whatever was created
        let mut image = Self {
            image,
            view: vk::ImageView::null(),
            format: create_info.format,
            extent: vk::Extent2D {
                width: create_info.width,
                height: create_info.height,
            },
            mip_levels: create_info.mip_levels,
            samples: create_info.samples,
            aspect: create_info.aspect,

            allocation: None,
            memory_allocator,
            device,
        };

        let requirements = unsafe { image.device.get_image_memory_requirements(image.image) };
        let allocation = image.memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name: create_info.name,
                requirements,
                location: create_info.domain.location(),
                linear: create_info.tiling == vk::ImageTiling::LINEAR,
                allocation_scheme: AllocationScheme::DedicatedImage(image.image),
            })
            .map_err(|e| allocation_error(e, create_info.name))?;
        let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
        image.allocation = Some(allocation);

        unsafe {
            image.device.bind_image_memory(image.image, memory, offset)?;
        }
        image.view = create_image_view(
            &image.device,
            image.image,
            create_info.format,
            create_info.aspect,
            create_info.mip_levels,
        )?;

        Ok(image)
    }

    /// Per-swapchain-image depth target
    pub fn new_depth_image(
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let aspect = if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        };
        let create_info = ImageCreateInfo {
            width: extent.width,
            height: extent.height,
            mip_levels: 1,
            samples,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            aspect,
            domain: MemoryDomain::DeviceLocal,
            name: "Depth Image",
        };
        Self::new(&create_info, memory_allocator, device)
    }

    /// Multisampled color target resolved into the swapchain image every frame
    pub fn new_msaa_color_image(
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let create_info = ImageCreateInfo {
            width: extent.width,
            height: extent.height,
            mip_levels: 1,
            samples,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            aspect: vk::ImageAspectFlags::COLOR,
            domain: MemoryDomain::DeviceLocal,
            name: "MSAA Color Image",
        };
        Self::new(&create_info, memory_allocator, device)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        // A null view is ignored by the driver
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free image memory: {}", e);
                    }
                }
                Err(e) => log::error!("Memory allocator lock poisoned: {}", e),
            }
        }
    }
}

pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    mip_levels: u32,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::default()
        .view_type(vk::ImageViewType::TYPE_2D)
        .image(image)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: 1,
        });
    Ok(unsafe { device.create_image_view(&info, None)? })
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    format == vk::Format::D32_SFLOAT_S8_UINT || format == vk::Format::D24_UNORM_S8_UINT
}
