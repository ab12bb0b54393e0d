use std::ffi::{c_char, CStr};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_descriptor::{CreatePoolError, DescriptorAllocator, DescriptorDevice, DescriptorPoolCreateFlags, DescriptorTotalCount, DeviceAllocationError};
use crate::renderer::contexts::device_ctx::instance::RenderInstance;
use crate::renderer::contexts::device_ctx::queue::{Queue, QueueFamilySelection};
use crate::renderer::contexts::device_ctx::surface::Surface;
use crate::renderer::contexts::device_ctx::transfer_ctx::{self, TransferContext};
use crate::renderer::error::RenderError;
use crate::renderer::resources::buffer::{Buffer, MemoryDomain};
use crate::renderer::resources::image::{Image, ImageCreateInfo};

pub type RenderDescriptorAllocator = DescriptorAllocator<vk::DescriptorPool, vk::DescriptorSet>;

/// Capabilities of the chosen adapter that shape resource creation
#[derive(Debug, Clone, Copy)]
pub struct DeviceLimits {
    pub max_msaa_samples: vk::SampleCountFlags,
    /// `None` when the adapter lacks sampler anisotropy
    pub max_sampler_anisotropy: Option<f32>,
}

/// Owns the logical device, its queues, memory allocator, command pool and descriptor pools.
///
/// Everything created from it must be dropped before it is.
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,
    pub instance: ash::Instance,
    pub limits: DeviceLimits,

    pub graphics_queue: Arc<Queue>,
    pub present_queue: Arc<Queue>,

    /// Pool for the per-frame command buffers, which are reset individually
    pub command_pool: vk::CommandPool,
    pub descriptor_allocator: Arc<Mutex<RenderDescriptorAllocator>>,

    memory_allocator: ManuallyDrop<Arc<Mutex<Allocator>>>,
    transfer_context: ManuallyDrop<TransferContext>,
}

impl RenderDevice {
    pub fn new(
        instance: &RenderInstance,
        surface: &Surface,
    ) -> Result<Self> {
        let (physical_device, families) = Self::select_physical_device(&instance.instance, surface)?;

        let properties = unsafe { instance.instance.get_physical_device_properties(physical_device) };
        let features = unsafe { instance.instance.get_physical_device_features(physical_device) };
        let limits = DeviceLimits {
            max_msaa_samples: max_usable_sample_count(
                properties.limits.framebuffer_color_sample_counts,
                properties.limits.framebuffer_depth_sample_counts,
            ),
            max_sampler_anisotropy: (features.sampler_anisotropy == vk::TRUE)
                .then_some(properties.limits.max_sampler_anisotropy),
        };
        log::info!(
            "Using {:?} ({:?}), max MSAA {:?}",
            properties.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            properties.device_type,
            limits.max_msaa_samples,
        );

        let (logical_device, graphics_queue, present_queue) = Self::create_logical_device(
            &instance.instance,
            physical_device,
            families,
            &limits,
        )?;

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: false,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        let logical_device = Arc::new(logical_device);
        let graphics_queue = Arc::new(graphics_queue);
        let present_queue = Arc::new(present_queue);

        let command_pool = {
            let info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(graphics_queue.family_index)
                // Allow the pool to reset individual command buffers
                .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
            unsafe { logical_device.create_command_pool(&info, None)? }
        };
        let descriptor_allocator: RenderDescriptorAllocator = DescriptorAllocator::new(0);

        let transfer_context = TransferContext::new(
            graphics_queue.clone(),
            logical_device.clone(),
        )?;

        Ok(Self {
            logical: logical_device,
            physical: physical_device,
            instance: instance.instance.clone(),
            limits,

            graphics_queue,
            present_queue,

            command_pool,
            descriptor_allocator: Arc::new(Mutex::new(descriptor_allocator)),

            memory_allocator: ManuallyDrop::new(Arc::new(Mutex::new(memory_allocator))),
            transfer_context: ManuallyDrop::new(transfer_context),
        })
    }

    pub fn create_buffer(
        &self,
        size: u64,
        usage: vk::BufferUsageFlags,
        domain: MemoryDomain,
        name: &str,
    ) -> Result<Buffer> {
        Buffer::new(
            size,
            usage,
            domain,
            name,
            Arc::clone(&self.memory_allocator),
            self.logical.clone(),
        )
    }

    pub fn create_image(&self, create_info: &ImageCreateInfo) -> Result<Image> {
        Image::new(
            create_info,
            Arc::clone(&self.memory_allocator),
            self.logical.clone(),
        )
    }

    pub fn create_depth_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> Result<Image> {
        Image::new_depth_image(
            extent,
            format,
            samples,
            Arc::clone(&self.memory_allocator),
            self.logical.clone(),
        )
    }

    pub fn create_msaa_color_image(
        &self,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> Result<Image> {
        Image::new_msaa_color_image(
            extent,
            format,
            samples,
            Arc::clone(&self.memory_allocator),
            self.logical.clone(),
        )
    }

    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        self.transfer_context.immediate_submit(func)
    }

    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: u64) -> Result<()> {
        self.immediate_submit(|cmd, device| {
            let region = vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size,
            };
            unsafe { device.cmd_copy_buffer(cmd, src, dst, &[region]) };
            Ok(())
        })
    }

    /// Copies tightly packed texels into mip level 0, which must be in `TRANSFER_DST_OPTIMAL`
    pub fn copy_buffer_to_image(
        &self,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
        layers: u32,
    ) -> Result<()> {
        self.immediate_submit(|cmd, device| {
            let region = vk::BufferImageCopy::default()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: layers,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D { width, height, depth: 1 });
            unsafe {
                device.cmd_copy_buffer_to_image(
                    cmd,
                    buffer,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region],
                );
            }
            Ok(())
        })
    }

    pub fn transition_image_layout(
        &self,
        image: vk::Image,
        format: vk::Format,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
        mip_levels: u32,
    ) -> Result<()> {
        let masks = transfer_ctx::transition_masks(old_layout, new_layout)?;
        let aspect = if new_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
            if crate::renderer::resources::image::has_stencil_component(format) {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            } else {
                vk::ImageAspectFlags::DEPTH
            }
        } else {
            vk::ImageAspectFlags::COLOR
        };
        let barrier = transfer_ctx::image_barrier(
            image,
            aspect,
            0,
            mip_levels,
            old_layout,
            new_layout,
            masks.src_access,
            masks.dst_access,
        );

        self.immediate_submit(|cmd, device| {
            unsafe {
                device.cmd_pipeline_barrier(
                    cmd,
                    masks.src_stage,
                    masks.dst_stage,
                    vk::DependencyFlags::empty(),
                    &[],
                    &[],
                    &[barrier],
                );
            }
            Ok(())
        })
    }

    /// Whether optimally tiled images of `format` can be blitted with a linear filter
    pub fn supports_linear_blit(&self, format: vk::Format) -> bool {
        let properties = unsafe {
            self.instance.get_physical_device_format_properties(self.physical, format)
        };
        properties
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }

    pub fn find_depth_format(&self) -> Result<vk::Format> {
        find_supported_format(
            &[
                vk::Format::D32_SFLOAT,
                vk::Format::D32_SFLOAT_S8_UINT,
                vk::Format::D24_UNORM_S8_UINT,
            ],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| unsafe {
                self.instance.get_physical_device_format_properties(self.physical, format)
            },
        )
        .ok_or_else(|| eyre!("No supported depth format"))
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.logical.device_wait_idle()? };
        Ok(())
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: &Surface,
    ) -> Result<(vk::PhysicalDevice, QueueFamilySelection)> {
        let req_device_exts = Self::get_required_device_extensions();

        let devices = unsafe { instance.enumerate_physical_devices()? };
        devices
            .into_iter()
            // Filter out devices that do not contain the required device extensions
            .filter(|device| {
                let supported_extensions = unsafe {
                    instance
                        .enumerate_device_extension_properties(*device)
                        .unwrap_or_default()
                };
                req_device_exts.iter().all(|req_ext| {
                    let supported = supported_extensions
                        .iter()
                        .any(|ext| ext.extension_name_as_c_str().is_ok_and(|name| name == *req_ext));
                    if !supported {
                        log::debug!("Device extension not supported: {:?}", req_ext);
                    }
                    supported
                })
            })
            // Filter out devices whose surface support is empty
            .filter(|device| {
                surface
                    .query_support(*device)
                    .map(|support| support.is_adequate())
                    .unwrap_or(false)
            })
            // Filter out devices that do not contain the required queues
            .filter_map(|device| {
                let families = unsafe {
                    instance.get_physical_device_queue_family_properties(device)
                };
                QueueFamilySelection::choose(&families, |index| surface.supports_present(device, index))
                    .map(|selection| (device, selection))
            })
            .min_by_key(|(device, _)| {
                let props = unsafe { instance.get_physical_device_properties(*device) };
                device_type_rank(props.device_type)
            })
            .ok_or_else(|| RenderError::NoSuitableDevice.into())
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        families: QueueFamilySelection,
        limits: &DeviceLimits,
    ) -> Result<(ash::Device, Queue, Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos = families
            .unique_indices()
            .into_iter()
            .map(|index| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(index)
                    .queue_priorities(&queue_priorities)
            })
            .collect::<Vec<_>>();

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();
        let enabled_features = vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(limits.max_sampler_anisotropy.is_some());

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .enabled_features(&enabled_features);
        let device = unsafe {
            instance.create_device(physical_device, &device_create_info, None)?
        };

        let queue = |index: u32| Queue::new(index, unsafe { device.get_device_queue(index, 0) });
        let graphics_queue = queue(families.graphics);
        let present_queue = queue(families.present);

        Ok((device, graphics_queue, present_queue))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.logical.device_wait_idle() {
                log::error!("Failed to wait for device idle during teardown: {}", e);
            }
            match self.descriptor_allocator.lock() {
                Ok(mut allocator) => {
                    allocator.cleanup(&DescriptorAshDevice::from(self.logical.clone()));
                }
                Err(e) => log::error!("Descriptor allocator lock poisoned: {}", e),
            }
            ManuallyDrop::drop(&mut self.transfer_context);
            ManuallyDrop::drop(&mut self.memory_allocator);
            self.logical.destroy_command_pool(self.command_pool, None);
            self.logical.destroy_device(None);
        }
    }
}

/// Highest sample count supported for both color and depth framebuffer attachments
pub fn max_usable_sample_count(
    color_counts: vk::SampleCountFlags,
    depth_counts: vk::SampleCountFlags,
) -> vk::SampleCountFlags {
    let counts = color_counts & depth_counts;
    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|count| counts.contains(*count))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// First candidate whose tiling supports every requested feature
pub fn find_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    properties_of: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|format| {
        let properties = properties_of(*format);
        match tiling {
            vk::ImageTiling::LINEAR => properties.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => properties.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        vk::PhysicalDeviceType::OTHER => 4,
        _ => 5,
    }
}

pub struct DescriptorAshDevice(pub Arc<ash::Device>);

impl From<Arc<ash::Device>> for DescriptorAshDevice {
    fn from(device: Arc<ash::Device>) -> Self {
        Self(device)
    }
}

impl DescriptorDevice<vk::DescriptorSetLayout, vk::DescriptorPool, vk::DescriptorSet>
for DescriptorAshDevice
{
    unsafe fn create_descriptor_pool(
        &self,
        descriptor_count: &DescriptorTotalCount,
        max_sets: u32,
        flags: DescriptorPoolCreateFlags,
    ) -> Result<vk::DescriptorPool, CreatePoolError> {
        let pool_sizes = [
            (vk::DescriptorType::SAMPLER, descriptor_count.sampler),
            (vk::DescriptorType::COMBINED_IMAGE_SAMPLER, descriptor_count.combined_image_sampler),
            (vk::DescriptorType::SAMPLED_IMAGE, descriptor_count.sampled_image),
            (vk::DescriptorType::STORAGE_IMAGE, descriptor_count.storage_image),
            (vk::DescriptorType::UNIFORM_BUFFER, descriptor_count.uniform_buffer),
            (vk::DescriptorType::STORAGE_BUFFER, descriptor_count.storage_buffer),
            (vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, descriptor_count.uniform_buffer_dynamic),
            (vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, descriptor_count.storage_buffer_dynamic),
        ]
        .into_iter()
        .filter(|(_, count)| *count != 0)
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize { ty, descriptor_count })
        .collect::<smallvec::SmallVec<[_; 8]>>();

        let mut ash_flags = vk::DescriptorPoolCreateFlags::empty();
        if flags.contains(DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET) {
            ash_flags |= vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET;
        }
        if flags.contains(DescriptorPoolCreateFlags::UPDATE_AFTER_BIND) {
            ash_flags |= vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND;
        }

        let result = unsafe {
            self.0.create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::default()
                    .max_sets(max_sets)
                    .pool_sizes(&pool_sizes)
                    .flags(ash_flags),
                None,
            )
        };

        match result {
            Ok(pool) => Ok(pool),
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => Err(CreatePoolError::OutOfDeviceMemory),
            Err(vk::Result::ERROR_FRAGMENTATION) => Err(CreatePoolError::Fragmentation),
            Err(err) => {
                log::error!("Descriptor pool creation failed: {}", err);
                Err(CreatePoolError::OutOfHostMemory)
            }
        }
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe {
            self.0.destroy_descriptor_pool(pool, None)
        }
    }

    unsafe fn alloc_descriptor_sets<'a>(
        &self,
        pool: &mut vk::DescriptorPool,
        layouts: impl ExactSizeIterator<Item = &'a vk::DescriptorSetLayout>,
        sets: &mut impl Extend<vk::DescriptorSet>,
    ) -> Result<(), DeviceAllocationError> {
        let set_layouts: smallvec::SmallVec<[_; 16]> = layouts.copied().collect();

        let result = unsafe {
            self.0.allocate_descriptor_sets(
                &vk::DescriptorSetAllocateInfo::default()
                    .set_layouts(&set_layouts)
                    .descriptor_pool(*pool),
            )
        };
        match result {
            Ok(allocated) => {
                sets.extend(allocated);
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY) => Err(DeviceAllocationError::OutOfDeviceMemory),
            Err(vk::Result::ERROR_FRAGMENTED_POOL) => Err(DeviceAllocationError::FragmentedPool),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) => Err(DeviceAllocationError::OutOfPoolMemory),
            Err(_) => Err(DeviceAllocationError::OutOfHostMemory),
        }
    }

    unsafe fn dealloc_descriptor_sets<'a>(
        &self,
        pool: &mut vk::DescriptorPool,
        sets: impl Iterator<Item = vk::DescriptorSet>,
    ) {
        let sets: smallvec::SmallVec<[_; 16]> = sets.collect();
        unsafe {
            if let Err(err) = self.0.free_descriptor_sets(*pool, &sets) {
                log::error!("Failed to free descriptor sets: {}", err);
            }
        }
    }
}
