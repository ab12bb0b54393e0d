use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use color_eyre::eyre::OptionExt;
use crate::renderer::config::RenderConfig;
use crate::renderer::resources::shader::GraphicsShader;
use crate::renderer::resources::vertex::VertexLayout;

pub const DYNAMIC_STATES: [vk::DynamicState; 2] = [
    vk::DynamicState::VIEWPORT,
    vk::DynamicState::SCISSOR,
];

/// Responsibilities:
/// - Own the graphics pipeline, its layout and its shader modules
/// - Rebuild the pipeline whenever the render pass it was built against is replaced
pub struct RenderPipelineContext {
    pub pipeline: vk::Pipeline,
    pub pipeline_layout: vk::PipelineLayout,
    vertex_layout: VertexLayout,
    shader: GraphicsShader,
    device: Arc<ash::Device>,
}

impl RenderPipelineContext {
    pub fn new(
        device: Arc<ash::Device>,
        descriptor_set_layout: vk::DescriptorSetLayout,
        config: &RenderConfig,
    ) -> Result<Self> {
        let shader = GraphicsShader::new(&config.shader_name, device.clone())?;

        let set_layouts = [descriptor_set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&set_layouts);
        let pipeline_layout = unsafe { device.create_pipeline_layout(&layout_info, None)? };

        Ok(Self {
            pipeline: vk::Pipeline::null(),
            pipeline_layout,
            vertex_layout: config.vertex_layout,
            shader,
            device,
        })
    }

    /// Replaces the pipeline with one compatible with `render_pass`.
    ///
    /// The previous pipeline must no longer be in use by the GPU.
    pub fn rebuild(&mut self, render_pass: vk::RenderPass, samples: vk::SampleCountFlags) -> Result<()> {
        let pipeline = self.create_pipeline(render_pass, samples)?;
        self.destroy_pipeline();
        self.pipeline = pipeline;
        Ok(())
    }

    fn create_pipeline(&self, render_pass: vk::RenderPass, samples: vk::SampleCountFlags) -> Result<vk::Pipeline> {
        let entry_point = c"main";
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(self.shader.vert_mod)
                .name(entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(self.shader.frag_mod)
                .name(entry_point),
        ];

        let bindings = [self.vertex_layout.binding_description()];
        let attributes = self.vertex_layout.attribute_descriptions();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are set per frame
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        // The projection flips Y, which keeps counter-clockwise triangles front facing
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(samples)
            .sample_shading_enable(false);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&DYNAMIC_STATES);

        let info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(self.pipeline_layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            self.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
                .map_err(|(_, e)| e)?
        };
        pipelines.into_iter().next().ok_or_eyre("No graphics pipeline was created")
    }

    fn destroy_pipeline(&mut self) {
        if self.pipeline != vk::Pipeline::null() {
            unsafe { self.device.destroy_pipeline(self.pipeline, None) };
            self.pipeline = vk::Pipeline::null();
        }
    }
}

impl Drop for RenderPipelineContext {
    fn drop(&mut self) {
        self.destroy_pipeline();
        unsafe {
            self.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}
