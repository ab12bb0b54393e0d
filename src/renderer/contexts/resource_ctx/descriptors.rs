use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::{eyre, OptionExt};
use gpu_descriptor::{DescriptorSet, DescriptorSetLayoutCreateFlags, DescriptorTotalCount};
use crate::renderer::contexts::device_ctx::device::{DescriptorAshDevice, RenderDescriptorAllocator, RenderDevice};
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::texture::Texture;
use crate::renderer::shader_data::UniformBufferObject;

pub const UNIFORM_BINDING: u32 = 0;
pub const TEXTURE_BINDING: u32 = 1;
pub const SAMPLER_BINDING: u32 = 2;

pub struct DescriptorSetLayoutBuilder<'a> {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'a>>,
}

impl DescriptorSetLayoutBuilder<'_> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        let binding = vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(1)
            .stage_flags(stages);
        self.bindings.push(binding);
        self
    }

    /// Number of descriptors of each type one set of this layout needs
    pub fn descriptor_count(&self) -> DescriptorTotalCount {
        let mut count = DescriptorTotalCount::default();
        for binding in &self.bindings {
            let n = binding.descriptor_count;
            match binding.descriptor_type {
                vk::DescriptorType::UNIFORM_BUFFER => count.uniform_buffer += n,
                vk::DescriptorType::SAMPLED_IMAGE => count.sampled_image += n,
                vk::DescriptorType::SAMPLER => count.sampler += n,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER => count.combined_image_sampler += n,
                vk::DescriptorType::STORAGE_BUFFER => count.storage_buffer += n,
                vk::DescriptorType::STORAGE_IMAGE => count.storage_image += n,
                _ => {}
            }
        }
        count
    }

    pub fn build(&self, device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .bindings(&self.bindings);

        Ok(unsafe {
            device.create_descriptor_set_layout(&layout_info, None)?
        })
    }
}

/// Uniform block for the vertex stage, texture and sampler for the fragment stage
pub fn frame_layout_builder() -> DescriptorSetLayoutBuilder<'static> {
    DescriptorSetLayoutBuilder::new()
        .add_binding(UNIFORM_BINDING, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX)
        .add_binding(TEXTURE_BINDING, vk::DescriptorType::SAMPLED_IMAGE, vk::ShaderStageFlags::FRAGMENT)
        .add_binding(SAMPLER_BINDING, vk::DescriptorType::SAMPLER, vk::ShaderStageFlags::FRAGMENT)
}

/// One descriptor set per frame-in-flight slot, each pointing at that slot's uniform buffer
pub struct FrameDescriptorSets {
    pub layout: vk::DescriptorSetLayout,
    sets: Vec<DescriptorSet<vk::DescriptorSet>>,
    allocator: Arc<Mutex<RenderDescriptorAllocator>>,
    device: Arc<ash::Device>,
}

impl FrameDescriptorSets {
    pub fn new(
        dev: &RenderDevice,
        uniform_buffers: &[Buffer],
        texture: &Texture,
    ) -> Result<Self> {
        let builder = frame_layout_builder();
        let layout = builder.build(&dev.logical)?;

        let sets = unsafe {
            dev.descriptor_allocator
                .lock()
                .map_err(|e| eyre!(e.to_string()))?
                .allocate(
                    &DescriptorAshDevice::from(dev.logical.clone()),
                    &layout,
                    DescriptorSetLayoutCreateFlags::empty(),
                    &builder.descriptor_count(),
                    uniform_buffers.len() as u32,
                )?
        };

        let descriptor_sets = Self {
            layout,
            sets,
            allocator: dev.descriptor_allocator.clone(),
            device: dev.logical.clone(),
        };
        descriptor_sets.write(uniform_buffers, texture);

        Ok(descriptor_sets)
    }

    fn write(&self, uniform_buffers: &[Buffer], texture: &Texture) {
        let image_info = [vk::DescriptorImageInfo::default()
            .image_view(texture.image.view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
        let sampler_info = [vk::DescriptorImageInfo::default().sampler(texture.sampler)];

        for (set, buffer) in self.sets.iter().zip(uniform_buffers) {
            let buffer_info = [vk::DescriptorBufferInfo::default()
                .buffer(buffer.buffer)
                .offset(0)
                .range(size_of::<UniformBufferObject>() as u64)];
            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(*set.raw())
                    .dst_binding(UNIFORM_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_info),
                vk::WriteDescriptorSet::default()
                    .dst_set(*set.raw())
                    .dst_binding(TEXTURE_BINDING)
                    .descriptor_type(vk::DescriptorType::SAMPLED_IMAGE)
                    .image_info(&image_info),
                vk::WriteDescriptorSet::default()
                    .dst_set(*set.raw())
                    .dst_binding(SAMPLER_BINDING)
                    .descriptor_type(vk::DescriptorType::SAMPLER)
                    .image_info(&sampler_info),
            ];
            unsafe { self.device.update_descriptor_sets(&writes, &[]) };
        }
    }

    pub fn get(&self, slot: usize) -> Result<vk::DescriptorSet> {
        self.sets
            .get(slot)
            .map(|set| *set.raw())
            .ok_or_eyre("No descriptor set for frame slot")
    }
}

impl Drop for FrameDescriptorSets {
    fn drop(&mut self) {
        match self.allocator.lock() {
            Ok(mut allocator) => unsafe {
                allocator.free(&DescriptorAshDevice::from(self.device.clone()), self.sets.drain(..));
            },
            Err(e) => log::error!("Descriptor allocator lock poisoned: {}", e),
        }
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout_bindings() {
        let builder = frame_layout_builder();
        let bindings = &builder.bindings;
        assert_eq!(bindings.len(), 3);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(bindings[1].binding, TEXTURE_BINDING);
        assert_eq!(bindings[1].stage_flags, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(bindings[2].descriptor_type, vk::DescriptorType::SAMPLER);
    }

    #[test]
    fn test_descriptor_count_per_set() {
        let count = frame_layout_builder().descriptor_count();
        assert_eq!(count.uniform_buffer, 1);
        assert_eq!(count.sampled_image, 1);
        assert_eq!(count.sampler, 1);
        assert_eq!(count.storage_buffer, 0);
    }
}
