use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::info;

use vkframe_rhi::RhiResult;
use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::device::Device;
use vkframe_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use vkframe_rhi::render_pass::RenderPass;
use vkframe_rhi::shader::{Shader, ShaderStage};

use super::device::VulkanFrameDevice;
use super::display::SwapchainDisplay;
use crate::backend::{BackendError, Display, RenderTarget};

const SHADER_ENTRY_POINT: &str = "main";

/// The fixed pipeline that draws the hard-coded triangle.
pub struct TrianglePass {
    pipeline: Pipeline,
    layout: PipelineLayout,
    render_pass: Arc<RenderPass>,
}

impl TrianglePass {
    /// Loads the SPIR-V stages and builds the pipeline for `render_pass`.
    ///
    /// Shader modules are only needed while the pipeline is created.
    pub fn new(
        device: Arc<Device>,
        render_pass: Arc<RenderPass>,
        vertex_shader: &Path,
        fragment_shader: &Path,
    ) -> RhiResult<Self> {
        let vertex = Shader::from_spirv_file(
            Arc::clone(&device),
            vertex_shader,
            ShaderStage::Vertex,
            SHADER_ENTRY_POINT,
        )?;
        let fragment = Shader::from_spirv_file(
            Arc::clone(&device),
            fragment_shader,
            ShaderStage::Fragment,
            SHADER_ENTRY_POINT,
        )?;

        let layout = PipelineLayout::empty(Arc::clone(&device))?;
        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex)
            .fragment_shader(&fragment)
            .build(device, &layout, &render_pass)?;

        info!("Triangle pipeline created");

        Ok(Self {
            pipeline,
            layout,
            render_pass,
        })
    }

    /// Draw callback for the scheduler: three vertices generated in the
    /// vertex shader.
    pub fn draw(cmd: &CommandBuffer) {
        cmd.draw(3, 1, 0, 0);
    }

    #[inline]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> &PipelineLayout {
        &self.layout
    }
}

impl RenderTarget<VulkanFrameDevice, SwapchainDisplay> for TrianglePass {
    fn begin_pass(
        &self,
        cmd: &CommandBuffer,
        display: &SwapchainDisplay,
        image_index: u32,
        clear_color: [f32; 4],
    ) -> Result<(), BackendError> {
        let framebuffer = display.framebuffer(image_index).ok_or_else(|| {
            BackendError::Api(format!("no framebuffer for swap image {image_index}"))
        })?;
        let extent = display.extent();

        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue {
                float32: clear_color,
            },
        }];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(self.render_pass.handle())
            .framebuffer(framebuffer.handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: vk::Extent2D {
                    width: extent.width,
                    height: extent.height,
                },
            })
            .clear_values(&clear_values);

        cmd.begin_render_pass(&begin_info);
        Ok(())
    }

    fn bind_pipeline(&self, cmd: &CommandBuffer) {
        cmd.bind_pipeline(self.pipeline.bind_point(), self.pipeline.handle());
    }

    fn end_pass(&self, cmd: &CommandBuffer) {
        cmd.end_render_pass();
    }
}
