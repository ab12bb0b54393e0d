pub mod camera;
pub mod clock;
pub mod config;
pub mod error;

mod contexts;
mod internals;
mod resources;
mod shader_data;

pub use contexts::device_ctx::target::PresentationSurface;
pub use contexts::frame_ctx::driver::FrameStatus;

use color_eyre::Result;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use winit::window::Window;
use crate::renderer::camera::Camera;
use crate::renderer::clock::Clock;
use crate::renderer::config::RenderConfig;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::device_ctx::target::{RebuildOutcome, RenderTarget};
use crate::renderer::contexts::frame_ctx::command_buffers::FrameCommandBuffers;
use crate::renderer::contexts::frame_ctx::driver::{self, FrameTarget};
use crate::renderer::contexts::frame_ctx::frame::SubmitSync;
use crate::renderer::contexts::frame_ctx::recorder::{record_frame, DrawPass, VkCommandSink};
use crate::renderer::contexts::frame_ctx::{classify_acquire, classify_present, AcquireOutcome, PresentOutcome, RenderFrameContext};
use crate::renderer::contexts::pipeline_ctx::RenderPipelineContext;
use crate::renderer::contexts::resource_ctx::RenderResourceContext;
use crate::renderer::shader_data::UniformBufferObject;

/// Fields drop in declaration order, so every context goes before the device it was created from.
pub struct Renderer {
    frm: RenderFrameContext,
    pip: RenderPipelineContext,
    res: RenderResourceContext,
    target: RenderTarget,
    dev: RenderDeviceContext,

    config: RenderConfig,
    camera: Camera,
}

impl Renderer {
    pub fn new(
        window: &Window,
        surface: &mut impl PresentationSurface,
        config: RenderConfig,
    ) -> Result<Self> {
        let dev = RenderDeviceContext::new(window)?;

        let mut target = RenderTarget::new(&dev);
        let image_count = match target.rebuild(&dev, surface, &config)? {
            RebuildOutcome::Rebuilt { image_count, .. } => image_count,
            RebuildOutcome::Closed => return Err(eyre!("Window closed before the first frame")),
        };

        let res = RenderResourceContext::new(&dev, &config)?;

        let mut pip = RenderPipelineContext::new(
            dev.device.logical.clone(),
            res.descriptors.layout,
            &config,
        )?;
        let swapchain = target.swapchain()?;
        pip.rebuild(swapchain.render_pass, swapchain.layout.samples)?;

        let frm = RenderFrameContext::new(&dev, config.frames_in_flight, image_count)?;

        let camera = Camera::new();
        log::debug!(
            "Camera at {}, depth range {}..{}",
            camera.get_position(),
            camera.get_near(),
            camera.get_far(),
        );

        Ok(Self {
            frm,
            pip,
            res,
            target,
            dev,

            config,
            camera,
        })
    }

    /// Renders and presents one frame, animated to `clock`'s current time.
    ///
    /// Stale swapchains are rebuilt here; only fatal errors are returned.
    pub fn draw_frame(
        &mut self,
        surface: &mut impl PresentationSurface,
        clock: &impl Clock,
    ) -> Result<FrameStatus> {
        let Self { frm, pip, res, target, dev, config, camera } = self;
        let mut frame = SwapchainFrame {
            dev,
            target,
            pip,
            res,
            command_buffers: &mut frm.command_buffers,
            config,
            camera,
            clock,
        };
        driver::draw_frame(&mut frm.sync, &mut frame, surface)
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.dev.device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.wait_idle() {
            log::error!("Failed to wait for device idle before teardown: {}", e);
        }
    }
}

/// The live swapchain and the contexts recorded against it, borrowed for one frame
struct SwapchainFrame<'a, C: Clock> {
    dev: &'a RenderDeviceContext,
    target: &'a mut RenderTarget,
    pip: &'a mut RenderPipelineContext,
    res: &'a mut RenderResourceContext,
    command_buffers: &'a mut FrameCommandBuffers,
    config: &'a RenderConfig,
    camera: &'a Camera,
    clock: &'a C,
}

impl<C: Clock> FrameTarget<vk::Fence, vk::Semaphore> for SwapchainFrame<'_, C> {
    fn acquire(&mut self, image_available: vk::Semaphore) -> Result<AcquireOutcome> {
        classify_acquire(self.target.swapchain()?.acquire_next_image(image_available))
    }

    fn record(&mut self, slot: usize, image_index: u32) -> Result<()> {
        let swapchain = self.target.swapchain()?;
        let extent = swapchain.extent();
        let ubo = UniformBufferObject::animated(self.camera, self.clock.elapsed(), extent);
        self.res.uniforms.update(slot, &ubo)?;

        let pass = DrawPass {
            render_pass: swapchain.render_pass,
            framebuffer: swapchain.framebuffers
                .get(image_index as usize)
                .copied()
                .ok_or_eyre("No framebuffer for swapchain image")?,
            extent,
            clear_color: self.config.clear_color,
            pipeline: self.pip.pipeline,
            pipeline_layout: self.pip.pipeline_layout,
            descriptor_set: self.res.descriptors.get(slot)?,
            geometry: self.res.model.geometry(),
        };
        let command_buffer = self.command_buffers.get(image_index)?;
        record_frame(&mut VkCommandSink::new(&self.dev.device.logical, command_buffer), &pass)
    }

    fn submit(&mut self, image_index: u32, sync: SubmitSync<vk::Fence, vk::Semaphore>) -> Result<()> {
        let device = &self.dev.device;
        let command_buffer = self.command_buffers.get(image_index)?;
        RenderFrameContext::submit(&device.logical, &device.graphics_queue, command_buffer, sync)
    }

    fn present(&mut self, render_finished: vk::Semaphore, image_index: u32) -> Result<PresentOutcome> {
        let swapchain = self.target.swapchain()?;
        classify_present(swapchain.present(&self.dev.device.present_queue, render_finished, image_index))
    }

    fn rebuild(&mut self, surface: &mut impl PresentationSurface) -> Result<RebuildOutcome> {
        let outcome = self.target.rebuild(self.dev, surface, self.config)?;
        if let RebuildOutcome::Rebuilt { image_count, .. } = outcome {
            // The rebuild idled the device, so no command buffer is pending
            self.command_buffers.reallocate(image_count)?;
            let swapchain = self.target.swapchain()?;
            self.pip.rebuild(swapchain.render_pass, swapchain.layout.samples)?;
        }
        Ok(outcome)
    }
}
