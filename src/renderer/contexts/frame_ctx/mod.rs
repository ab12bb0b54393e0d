pub mod frame;
pub mod command_buffers;
pub mod driver;
pub mod recorder;
#[cfg(test)]
pub mod testing;

use std::fmt::Debug;
use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::eyre;
use crate::renderer::contexts::device_ctx::RenderDeviceContext;
use crate::renderer::contexts::device_ctx::queue::Queue;
use crate::renderer::contexts::frame_ctx::command_buffers::FrameCommandBuffers;
use crate::renderer::contexts::frame_ctx::frame::{FrameSlot, SubmitSync};
use crate::renderer::error::RenderError;

/// Creation, waiting and teardown of the CPU and GPU side signals the frame loop uses
pub trait SyncBackend {
    type Fence: Copy + PartialEq + Debug;
    type Semaphore: Copy + Debug;

    fn create_fence(&mut self, signaled: bool) -> Result<Self::Fence>;
    fn create_semaphore(&mut self) -> Result<Self::Semaphore>;
    /// Blocks without a timeout until `fence` is signaled
    fn wait_for_fence(&mut self, fence: Self::Fence) -> Result<()>;
    fn reset_fence(&mut self, fence: Self::Fence) -> Result<()>;
    fn destroy_fence(&mut self, fence: Self::Fence);
    fn destroy_semaphore(&mut self, semaphore: Self::Semaphore);
}

/// Bounds how far the CPU runs ahead of the GPU.
///
/// Holds a ring of frame slots and a side table from swapchain image index to
/// the fence of the submission that last rendered into that image. The number
/// of slots and the number of images are independent.
pub struct FrameSyncController<B: SyncBackend> {
    slots: Vec<FrameSlot<B::Fence, B::Semaphore>>,
    images_in_flight: Vec<Option<B::Fence>>,
    current_frame: usize,
    backend: B,
}

impl<B: SyncBackend> FrameSyncController<B> {
    pub fn new(mut backend: B, frames_in_flight: usize, image_count: usize) -> Result<Self> {
        if frames_in_flight == 0 {
            return Err(eyre!("At least one frame in flight is required"));
        }

        let mut slots = Vec::with_capacity(frames_in_flight);
        for _ in 0..frames_in_flight {
            slots.push(FrameSlot {
                image_available: backend.create_semaphore()?,
                render_finished: backend.create_semaphore()?,
                // Signaled so the first wait on each slot returns immediately
                in_flight: backend.create_fence(true)?,
            });
        }

        Ok(Self {
            slots,
            images_in_flight: vec![None; image_count],
            current_frame: 0,
            backend,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    /// Index of the frame slot the next frame uses
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    pub fn current_slot(&self) -> &FrameSlot<B::Fence, B::Semaphore> {
        &self.slots[self.current_frame]
    }

    /// Waits until the GPU is done with the last submission made from the current slot.
    ///
    /// After this the slot's per-frame resources and its image-available signal may be reused.
    pub fn wait_for_current_slot(&mut self) -> Result<()> {
        let fence = self.slots[self.current_frame].in_flight;
        self.backend.wait_for_fence(fence)
    }

    /// Waits for whichever submission last rendered into `image_index`, then
    /// records the current slot as its new user.
    pub fn claim_image(&mut self, image_index: u32) -> Result<()> {
        let current_fence = self.slots[self.current_frame].in_flight;
        let image_count = self.images_in_flight.len();
        let entry = self.images_in_flight
            .get_mut(image_index as usize)
            .ok_or_else(|| eyre!("Image index {} out of range for {} images", image_index, image_count))?;

        if let Some(previous_fence) = *entry {
            if previous_fence != current_fence {
                self.backend.wait_for_fence(previous_fence)?;
            }
        }
        *entry = Some(current_fence);
        Ok(())
    }

    /// Resets the current slot's fence and hands out the signals for its submission.
    ///
    /// Only call this immediately before submitting, so an abandoned frame never
    /// leaves the fence unsignaled.
    pub fn begin_submit(&mut self) -> Result<SubmitSync<B::Fence, B::Semaphore>> {
        let slot = self.slots[self.current_frame];
        self.backend.reset_fence(slot.in_flight)?;
        Ok(slot.submit_sync())
    }

    pub fn advance(&mut self) {
        self.current_frame = (self.current_frame + 1) % self.slots.len();
    }

    /// Forgets which slot last used each image, after a rebuild produced `image_count` new images
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight = vec![None; image_count];
    }
}

impl<B: SyncBackend> Drop for FrameSyncController<B> {
    fn drop(&mut self) {
        for slot in self.slots.drain(..) {
            self.backend.destroy_semaphore(slot.image_available);
            self.backend.destroy_semaphore(slot.render_finished);
            self.backend.destroy_fence(slot.in_flight);
        }
    }
}

/// Fences and semaphores on a Vulkan device
pub struct VulkanSync {
    device: Arc<ash::Device>,
}

impl VulkanSync {
    pub fn new(device: Arc<ash::Device>) -> Self {
        Self { device }
    }
}

impl SyncBackend for VulkanSync {
    type Fence = vk::Fence;
    type Semaphore = vk::Semaphore;

    fn create_fence(&mut self, signaled: bool) -> Result<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::default().flags(flags);
        Ok(unsafe { self.device.create_fence(&info, None)? })
    }

    fn create_semaphore(&mut self) -> Result<vk::Semaphore> {
        Ok(unsafe { self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)? })
    }

    fn wait_for_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, u64::MAX)? };
        Ok(())
    }

    fn reset_fence(&mut self, fence: vk::Fence) -> Result<()> {
        unsafe { self.device.reset_fences(&[fence])? };
        Ok(())
    }

    fn destroy_fence(&mut self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn destroy_semaphore(&mut self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image { index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface; the frame must be dropped
    OutOfDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    /// Presented, but the swapchain should be rebuilt before the next frame
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    pub fn needs_rebuild(self) -> bool {
        self != PresentOutcome::Presented
    }
}

/// Splits an acquire result into the recoverable outcomes and fatal errors
pub fn classify_acquire(result: VkResult<(u32, bool)>) -> Result<AcquireOutcome> {
    match result {
        Ok((index, suboptimal)) => Ok(AcquireOutcome::Image { index, suboptimal }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
        Err(e) => Err(RenderError::SwapchainAcquire(e).into()),
    }
}

/// Splits a present result into the recoverable outcomes and fatal errors
pub fn classify_present(result: VkResult<bool>) -> Result<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) => Ok(PresentOutcome::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
        Err(e) => Err(RenderError::Present(e).into()),
    }
}

/// Responsibilities:
/// - Manage per-image command buffers
/// - Manage synchronization between frames
pub struct RenderFrameContext {
    pub sync: FrameSyncController<VulkanSync>,
    pub command_buffers: FrameCommandBuffers,
}

impl RenderFrameContext {
    pub fn new(
        dev_ctx: &RenderDeviceContext,
        frames_in_flight: usize,
        image_count: usize,
    ) -> Result<Self> {
        let device = dev_ctx.device.logical.clone();
        let sync = FrameSyncController::new(
            VulkanSync::new(device.clone()),
            frames_in_flight,
            image_count,
        )?;
        let command_buffers = FrameCommandBuffers::new(
            image_count,
            dev_ctx.device.command_pool,
            device,
        )?;

        Ok(Self {
            sync,
            command_buffers,
        })
    }

    pub fn submit(
        device: &ash::Device,
        queue: &Queue,
        command_buffer: vk::CommandBuffer,
        sync: SubmitSync<vk::Fence, vk::Semaphore>,
    ) -> Result<()> {
        let wait_semaphores = [sync.wait_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [sync.signal_semaphore];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .queue_submit(queue.handle, &[submit_info], sync.fence)
                .map_err(RenderError::Submit)?;
        }
        Ok(())
    }
}
