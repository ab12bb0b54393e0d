use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::Result;
use color_eyre::eyre::eyre;
use crate::renderer::contexts::device_ctx::queue::Queue;

/// Executes one-shot command buffers synchronously, outside the per-frame loop
pub struct TransferContext {
    transfer_fence: vk::Fence,
    command_pool: vk::CommandPool,

    transfer_queue: Arc<Queue>,
    device: Arc<ash::Device>,
}

/// A command buffer checked out of the transfer pool.
///
/// `end` submits it and blocks until the GPU is done with it. The buffer goes back
/// to the pool when this guard drops, whether or not it was submitted.
pub struct SingleTimeCommands<'a> {
    pub command_buffer: vk::CommandBuffer,
    ctx: &'a TransferContext,
}

impl TransferContext {
    pub fn new(
        transfer_queue: Arc<Queue>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let transfer_fence_info = vk::FenceCreateInfo::default();
        let transfer_fence =
            unsafe { device.create_fence(&transfer_fence_info, None)? };

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(transfer_queue.family_index)
            .flags(vk::CommandPoolCreateFlags::TRANSIENT);
        let command_pool =
            unsafe { device.create_command_pool(&command_pool_info, None)? };

        Ok(Self {
            transfer_fence,
            command_pool,
            transfer_queue,
            device,
        })
    }

    pub fn begin_single_time_commands(&self) -> Result<SingleTimeCommands<'_>> {
        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = unsafe {
            self.device
                .allocate_command_buffers(&command_buffer_info)?
                .into_iter()
                .next()
                .ok_or_else(|| eyre!("Driver returned no command buffer"))?
        };
        let commands = SingleTimeCommands {
            command_buffer,
            ctx: self,
        };

        // This command buffer will be used exactly once
        let cmd_begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.begin_command_buffer(command_buffer, &cmd_begin_info)?;
        }

        Ok(commands)
    }

    /// Records `func` into a single-time command buffer, submits it and waits for completion
    pub fn immediate_submit<F>(
        &self,
        func: F,
    ) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        let commands = self.begin_single_time_commands()?;
        func(commands.command_buffer, &self.device)?;
        commands.end()
    }
}

impl SingleTimeCommands<'_> {
    pub fn end(self) -> Result<()> {
        let ctx = self.ctx;
        let cmd = [self.command_buffer];

        unsafe {
            ctx.device.end_command_buffer(self.command_buffer)?;
        }

        let submit = vk::SubmitInfo::default()
            .command_buffers(&cmd);
        unsafe {
            ctx.device.queue_submit(
                ctx.transfer_queue.handle,
                &[submit],
                ctx.transfer_fence,
            )?;
            // Unbounded: transfers always complete unless the device is lost
            ctx.device.wait_for_fences(&[ctx.transfer_fence], true, u64::MAX)?;
            ctx.device.reset_fences(&[ctx.transfer_fence])?;
        }

        Ok(())
    }
}

impl Drop for SingleTimeCommands<'_> {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.free_command_buffers(self.ctx.command_pool, &[self.command_buffer]);
        }
    }
}

impl Drop for TransferContext {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_fence(self.transfer_fence, None);
        }
    }
}

/// Access masks and pipeline stages for the layout transitions the renderer performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

pub fn transition_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<TransitionMasks> {
    use vk::ImageLayout as L;

    let masks = match (old_layout, new_layout) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::TRANSFER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        },
        (old, new) => {
            return Err(eyre!("Unsupported layout transition: {:?} -> {:?}", old, new));
        }
    };

    Ok(masks)
}

#[allow(clippy::too_many_arguments)]
pub fn image_barrier(
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    base_mip_level: u32,
    level_count: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .image(image)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level,
            level_count,
            base_array_layer: 0,
            layer_count: 1,
        })
}

pub fn subresource_layers(aspect: vk::ImageAspectFlags, mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: aspect,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}
