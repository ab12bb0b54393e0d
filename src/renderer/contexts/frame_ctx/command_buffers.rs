use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::OptionExt;

/// One primary command buffer per swapchain image, re-recorded every frame
pub struct FrameCommandBuffers {
    buffers: Vec<vk::CommandBuffer>,
    command_pool: vk::CommandPool,
    device: Arc<ash::Device>,
}

impl FrameCommandBuffers {
    pub fn new(
        count: usize,
        command_pool: vk::CommandPool,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let mut command_buffers = Self {
            buffers: Vec::new(),
            command_pool,
            device,
        };
        command_buffers.allocate(count)?;
        Ok(command_buffers)
    }

    pub fn get(&self, image_index: u32) -> Result<vk::CommandBuffer> {
        self.buffers
            .get(image_index as usize)
            .copied()
            .ok_or_eyre("No command buffer for swapchain image")
    }

    /// Frees and reallocates the buffers when the swapchain image count changed.
    ///
    /// The caller must ensure none of the buffers is still pending on the GPU.
    pub fn reallocate(&mut self, count: usize) -> Result<()> {
        if count == self.buffers.len() {
            return Ok(());
        }
        log::debug!("Reallocating command buffers: {} -> {}", self.buffers.len(), count);
        self.free();
        self.allocate(count)
    }

    fn allocate(&mut self, count: usize) -> Result<()> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count as u32);
        self.buffers = unsafe { self.device.allocate_command_buffers(&info)? };
        Ok(())
    }

    fn free(&mut self) {
        if self.buffers.is_empty() {
            return;
        }
        unsafe {
            self.device.free_command_buffers(self.command_pool, &self.buffers);
        }
        self.buffers.clear();
    }
}

impl Drop for FrameCommandBuffers {
    fn drop(&mut self) {
        self.free();
    }
}
