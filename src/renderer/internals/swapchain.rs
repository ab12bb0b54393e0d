use ash::prelude::VkResult;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use std::sync::Arc;
use crate::renderer::contexts::device_ctx::device::RenderDevice;
use crate::renderer::contexts::device_ctx::queue::Queue;
use crate::renderer::contexts::device_ctx::surface::{Surface, SurfaceSupport};
use crate::renderer::internals::render_pass::{framebuffer_attachments, RenderPassLayout};
use crate::renderer::resources::image::{create_image_view, Image};

pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Parameters derived from the surface for one swapchain build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainSettings {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub min_image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl SwapchainSettings {
    pub fn choose(
        support: &SurfaceSupport,
        drawable_extent: vk::Extent2D,
        vsync: bool,
    ) -> Result<Self> {
        let capabilities = &support.capabilities;
        let pre_transform = if capabilities
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            capabilities.current_transform
        };

        Ok(Self {
            surface_format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes, vsync),
            extent: choose_extent(capabilities, drawable_extent),
            min_image_count: choose_image_count(capabilities),
            pre_transform,
        })
    }
}

/// The preferred sRGB BGRA format if offered, else whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|format| *format == PREFERRED_SURFACE_FORMAT)
        .or_else(|| formats.first().copied())
        .ok_or_else(|| eyre!("Surface offers no formats"))
}

/// Mailbox when available and vsync isn't forced; FIFO is always supported
pub fn choose_present_mode(modes: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if !vsync && modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    drawable_extent: vk::Extent2D,
) -> vk::Extent2D {
    // u32::MAX means the surface size follows whatever the swapchain picks
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: drawable_extent.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: drawable_extent.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// One more than the minimum so the driver never stalls us; a maximum of 0 means unbounded
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// The presentable images and everything rendering into them depends on.
///
/// Teardown runs in a fixed order: image views, the swapchain handle, depth
/// resources (with the shared MSAA target), framebuffers, then the render pass.
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub settings: SwapchainSettings,
    pub layout: RenderPassLayout,
    pub images: Vec<vk::Image>,
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,

    image_views: Vec<vk::ImageView>,
    depth_images: Vec<Image>,
    color_image: Option<Image>,
    loader: ash::khr::swapchain::Device,
    device: Arc<ash::Device>,
}

impl Swapchain {
    /// Builds a swapchain for `settings`.
    ///
    /// `predecessor` is handed to the driver as `old_swapchain` so it can recycle
    /// resources, and is destroyed before this returns.
    pub fn new(
        dev: &RenderDevice,
        surface: &Surface,
        loader: &ash::khr::swapchain::Device,
        settings: SwapchainSettings,
        layout: RenderPassLayout,
        predecessor: Option<Swapchain>,
    ) -> Result<Self> {
        let queue_family_indices = [
            dev.graphics_queue.family_index,
            dev.present_queue.family_index,
        ];
        let old_swapchain = predecessor
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), |previous| previous.handle);

        let mut swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(settings.min_image_count)
            .image_format(settings.surface_format.format)
            .image_color_space(settings.surface_format.color_space)
            .image_extent(settings.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(settings.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(settings.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);
        swapchain_info = if queue_family_indices[0] != queue_family_indices[1] {
            swapchain_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&queue_family_indices)
        } else {
            swapchain_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let handle = unsafe { loader.create_swapchain(&swapchain_info, None)? };
        // The predecessor is retired now and must not outlive this call
        drop(predecessor);

        let mut swapchain = Self {
            handle,
            settings,
            layout,
            images: Vec::new(),
            render_pass: vk::RenderPass::null(),
            framebuffers: Vec::new(),
            image_views: Vec::new(),
            depth_images: Vec::new(),
            color_image: None,
            loader: loader.clone(),
            device: dev.logical.clone(),
        };
        // From here on a failure unwinds through Drop, releasing whatever was built
        swapchain.build_attachments(dev)?;

        log::info!(
            "Built swapchain: {} images, {}x{}, {:?}, {:?}, {:?}",
            swapchain.images.len(),
            settings.extent.width,
            settings.extent.height,
            settings.surface_format.format,
            settings.present_mode,
            layout.samples,
        );

        Ok(swapchain)
    }

    fn build_attachments(&mut self, dev: &RenderDevice) -> Result<()> {
        let extent = self.settings.extent;
        let format = self.settings.surface_format.format;

        self.images = unsafe { self.loader.get_swapchain_images(self.handle)? };
        for image in &self.images {
            let view = create_image_view(&self.device, *image, format, vk::ImageAspectFlags::COLOR, 1)?;
            self.image_views.push(view);
        }

        for _ in &self.images {
            let depth = dev.create_depth_image(extent, self.layout.depth_format, self.layout.samples)?;
            self.depth_images.push(depth);
        }
        if self.layout.msaa_enabled() {
            self.color_image = Some(dev.create_msaa_color_image(extent, format, self.layout.samples)?);
        }

        self.render_pass = self.layout.create(&self.device)?;

        let msaa_view = self.color_image.as_ref().map(|image| image.view);
        for (view, depth) in self.image_views.iter().zip(&self.depth_images) {
            let attachments = framebuffer_attachments(msaa_view, depth.view, *view);
            let info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe { self.device.create_framebuffer(&info, None)? };
            self.framebuffers.push(framebuffer);
        }

        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.settings.extent
    }

    pub fn acquire_next_image(&self, image_available: vk::Semaphore) -> VkResult<(u32, bool)> {
        unsafe {
            self.loader.acquire_next_image(
                self.handle,
                u64::MAX,
                image_available,
                vk::Fence::null(),
            )
        }
    }

    pub fn present(
        &self,
        queue: &Queue,
        render_finished: vk::Semaphore,
        image_index: u32,
    ) -> VkResult<bool> {
        let wait_semaphores = [render_finished];
        let swapchains = [self.handle];
        let image_indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        unsafe { self.loader.queue_present(queue.handle, &info) }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for view in self.image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.handle, None);
            self.depth_images.clear();
            self.color_image = None;
            for framebuffer in self.framebuffers.drain(..) {
                self.device.destroy_framebuffer(framebuffer, None);
            }
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}
