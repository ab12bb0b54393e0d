use ash::vk;
use color_eyre::Result;
use crate::renderer::error::RenderError;
use crate::renderer::resources::texture::MipmapSink;

/// The commands a frame is made of, so recording can be checked without a device
pub trait CommandSink {
    fn begin(&mut self) -> Result<()>;
    fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    );
    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D);
    fn bind_pipeline(&mut self, pipeline: vk::Pipeline);
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer);
    fn bind_index_buffer(&mut self, buffer: vk::Buffer);
    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet);
    fn draw_indexed(&mut self, index_count: u32, instance_count: u32);
    fn end_render_pass(&mut self);
    fn end(&mut self) -> Result<()>;
}

/// Buffers of the single model drawn each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawGeometry {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

/// Everything one frame's command buffer refers to
#[derive(Debug, Clone, Copy)]
pub struct DrawPass {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    /// The set holding the current frame slot's uniform buffer
    pub descriptor_set: vk::DescriptorSet,
    pub geometry: DrawGeometry,
}

impl DrawPass {
    /// Color first, then depth at the far plane; the resolve target is never loaded
    pub fn clear_values(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue { float32: self.clear_color },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ]
    }
}

pub fn record_frame(sink: &mut impl CommandSink, pass: &DrawPass) -> Result<()> {
    sink.begin()?;
    sink.begin_render_pass(pass.render_pass, pass.framebuffer, pass.extent, &pass.clear_values());
    sink.set_viewport_and_scissor(pass.extent);
    sink.bind_pipeline(pass.pipeline);
    sink.bind_vertex_buffer(pass.geometry.vertex_buffer);
    sink.bind_index_buffer(pass.geometry.index_buffer);
    sink.bind_descriptor_set(pass.pipeline_layout, pass.descriptor_set);
    sink.draw_indexed(pass.geometry.index_count, 1);
    sink.end_render_pass();
    sink.end()
}

/// Records into a primary command buffer allocated from a resettable pool
pub struct VkCommandSink<'a> {
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
}

impl<'a> VkCommandSink<'a> {
    pub fn new(device: &'a ash::Device, command_buffer: vk::CommandBuffer) -> Self {
        Self { device, command_buffer }
    }
}

impl CommandSink for VkCommandSink<'_> {
    fn begin(&mut self) -> Result<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(RenderError::CommandRecording)?;
            self.device
                .begin_command_buffer(self.command_buffer, &vk::CommandBufferBeginInfo::default())
                .map_err(RenderError::CommandRecording)?;
        }
        Ok(())
    }

    fn begin_render_pass(
        &mut self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_values: &[vk::ClearValue],
    ) {
        let info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(clear_values);
        unsafe {
            self.device.cmd_begin_render_pass(self.command_buffer, &info, vk::SubpassContents::INLINE);
        }
    }

    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        unsafe {
            self.device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }
    }

    fn bind_pipeline(&mut self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(self.command_buffer, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device.cmd_bind_vertex_buffers(self.command_buffer, 0, &[buffer], &[0]);
        }
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device.cmd_bind_index_buffer(self.command_buffer, buffer, 0, vk::IndexType::UINT32);
        }
    }

    fn bind_descriptor_set(&mut self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            );
        }
    }

    fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
        unsafe {
            self.device.cmd_draw_indexed(self.command_buffer, index_count, instance_count, 0, 0, 0);
        }
    }

    fn end_render_pass(&mut self) {
        unsafe {
            self.device.cmd_end_render_pass(self.command_buffer);
        }
    }

    fn end(&mut self) -> Result<()> {
        unsafe {
            self.device
                .end_command_buffer(self.command_buffer)
                .map_err(RenderError::CommandRecording)?;
        }
        Ok(())
    }
}

impl MipmapSink for VkCommandSink<'_> {
    fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        barrier: vk::ImageMemoryBarrier<'static>,
    ) {
        unsafe {
            self.device.cmd_pipeline_barrier(
                self.command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    fn blit_image(&mut self, image: vk::Image, region: vk::ImageBlit) {
        unsafe {
            self.device.cmd_blit_image(
                self.command_buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
                vk::Filter::LINEAR,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use crate::renderer::resources::mesh::Mesh;

    #[derive(Debug, Clone, PartialEq)]
    enum Command {
        Begin,
        BeginRenderPass { clear_count: usize, extent: vk::Extent2D },
        Viewport(vk::Extent2D),
        BindPipeline,
        BindVertexBuffer(vk::Buffer),
        BindIndexBuffer(vk::Buffer),
        BindDescriptorSet(vk::DescriptorSet),
        DrawIndexed { index_count: u32, instance_count: u32 },
        EndRenderPass,
        End,
    }

    #[derive(Default)]
    struct RecordingSink {
        commands: Vec<Command>,
    }

    impl RecordingSink {
        fn draws(&self) -> Vec<&Command> {
            self.commands
                .iter()
                .filter(|c| matches!(c, Command::DrawIndexed { .. }))
                .collect()
        }
    }

    impl CommandSink for RecordingSink {
        fn begin(&mut self) -> Result<()> {
            self.commands.push(Command::Begin);
            Ok(())
        }

        fn begin_render_pass(
            &mut self,
            _render_pass: vk::RenderPass,
            _framebuffer: vk::Framebuffer,
            extent: vk::Extent2D,
            clear_values: &[vk::ClearValue],
        ) {
            self.commands.push(Command::BeginRenderPass {
                clear_count: clear_values.len(),
                extent,
            });
        }

        fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
            self.commands.push(Command::Viewport(extent));
        }

        fn bind_pipeline(&mut self, _pipeline: vk::Pipeline) {
            self.commands.push(Command::BindPipeline);
        }

        fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
            self.commands.push(Command::BindVertexBuffer(buffer));
        }

        fn bind_index_buffer(&mut self, buffer: vk::Buffer) {
            self.commands.push(Command::BindIndexBuffer(buffer));
        }

        fn bind_descriptor_set(&mut self, _layout: vk::PipelineLayout, set: vk::DescriptorSet) {
            self.commands.push(Command::BindDescriptorSet(set));
        }

        fn draw_indexed(&mut self, index_count: u32, instance_count: u32) {
            self.commands.push(Command::DrawIndexed { index_count, instance_count });
        }

        fn end_render_pass(&mut self) {
            self.commands.push(Command::EndRenderPass);
        }

        fn end(&mut self) -> Result<()> {
            self.commands.push(Command::End);
            Ok(())
        }
    }

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 800, height: 600 };

    fn pass_for(mesh: &Mesh, descriptor_set: u64) -> DrawPass {
        DrawPass {
            render_pass: vk::RenderPass::from_raw(1),
            framebuffer: vk::Framebuffer::from_raw(2),
            extent: EXTENT,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            pipeline: vk::Pipeline::from_raw(3),
            pipeline_layout: vk::PipelineLayout::from_raw(4),
            descriptor_set: vk::DescriptorSet::from_raw(descriptor_set),
            geometry: DrawGeometry {
                vertex_buffer: vk::Buffer::from_raw(5),
                index_buffer: vk::Buffer::from_raw(6),
                index_count: mesh.indices.len() as u32,
            },
        }
    }

    #[test]
    fn test_minimal_triangle_is_one_draw() {
        let mut sink = RecordingSink::default();
        record_frame(&mut sink, &pass_for(&Mesh::new_triangle(), 10)).unwrap();

        assert_eq!(
            sink.draws(),
            vec![&Command::DrawIndexed { index_count: 3, instance_count: 1 }],
        );
    }

    #[test]
    fn test_textured_quad_draws_two_triangles() {
        let mesh = Mesh::new_textured_quad();
        let mut sink = RecordingSink::default();
        record_frame(&mut sink, &pass_for(&mesh, 10)).unwrap();

        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(
            sink.draws(),
            vec![&Command::DrawIndexed { index_count: 6, instance_count: 1 }],
        );
    }

    #[test]
    fn test_command_order() {
        let mut sink = RecordingSink::default();
        record_frame(&mut sink, &pass_for(&Mesh::new_triangle(), 11)).unwrap();

        assert_eq!(
            sink.commands,
            vec![
                Command::Begin,
                Command::BeginRenderPass { clear_count: 2, extent: EXTENT },
                Command::Viewport(EXTENT),
                Command::BindPipeline,
                Command::BindVertexBuffer(vk::Buffer::from_raw(5)),
                Command::BindIndexBuffer(vk::Buffer::from_raw(6)),
                Command::BindDescriptorSet(vk::DescriptorSet::from_raw(11)),
                Command::DrawIndexed { index_count: 3, instance_count: 1 },
                Command::EndRenderPass,
                Command::End,
            ],
        );
    }

    #[test]
    fn test_depth_clears_to_far_plane() {
        let values = pass_for(&Mesh::new_triangle(), 1).clear_values();
        let depth = unsafe { values[1].depth_stencil };
        assert_eq!(depth.depth, 1.0);
    }
}
