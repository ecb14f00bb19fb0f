//! Graphics pipeline creation.
//!
//! - [`PipelineLayout`] - resource interface of a pipeline (empty for the triangle)
//! - [`Pipeline`] - a compiled graphics pipeline
//! - [`GraphicsPipelineBuilder`] - fixed-function state with render-pass defaults
//!
//! Viewport and scissor are always dynamic so the pipeline survives swapchain
//! recreation untouched.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::{Shader, ShaderStage};

/// Vulkan pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a layout with no descriptor sets and no push constants.
    pub fn empty(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default();

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!("Created empty pipeline layout");

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Compiled graphics pipeline.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        vk::PipelineBindPoint::GRAPHICS
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}

/// Fixed-function state of the triangle pipeline.
pub const TOPOLOGY: vk::PrimitiveTopology = vk::PrimitiveTopology::TRIANGLE_LIST;
pub const POLYGON_MODE: vk::PolygonMode = vk::PolygonMode::FILL;
pub const CULL_MODE: vk::CullModeFlags = vk::CullModeFlags::BACK;
pub const FRONT_FACE: vk::FrontFace = vk::FrontFace::CLOCKWISE;

const DYNAMIC_STATES: [vk::DynamicState; 2] =
    [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

/// Builder for the triangle pipeline on subpass 0 of a render pass.
///
/// Only the shaders vary. The rest is fixed: no vertex input, filled triangle
/// list, back-face culling with clockwise front faces, single sample, opaque
/// color writes, dynamic viewport and scissor.
#[derive(Default)]
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    /// Checks shader presence and stage assignment.
    fn validate(&self) -> RhiResult<(&'a Shader, &'a Shader)> {
        let vertex = self
            .vertex_shader
            .ok_or_else(|| RhiError::PipelineError("Vertex shader is required".to_string()))?;
        let fragment = self
            .fragment_shader
            .ok_or_else(|| RhiError::PipelineError("Fragment shader is required".to_string()))?;

        if vertex.stage() != ShaderStage::Vertex {
            return Err(RhiError::PipelineError(format!(
                "Expected a vertex shader, got a {} shader",
                vertex.stage()
            )));
        }
        if fragment.stage() != ShaderStage::Fragment {
            return Err(RhiError::PipelineError(format!(
                "Expected a fragment shader, got a {} shader",
                fragment.stage()
            )));
        }

        Ok((vertex, fragment))
    }

    /// Builds the pipeline for `render_pass`.
    pub fn build(
        self,
        device: Arc<Device>,
        layout: &PipelineLayout,
        render_pass: &RenderPass,
    ) -> RhiResult<Pipeline> {
        let (vertex, fragment) = self.validate()?;

        let stages = [vertex.stage_create_info(), fragment.stage_create_info()];

        // Vertices are generated in the shader
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(TOPOLOGY)
            .primitive_restart_enable(false);

        // Counts only; the actual rectangles are dynamic
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(POLYGON_MODE)
            .line_width(1.0)
            .cull_mode(CULL_MODE)
            .front_face(FRONT_FACE)
            .depth_bias_enable(false);

        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .sample_shading_enable(false);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)];

        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&DYNAMIC_STATES);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass.handle())
            .subpass(0);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = pipelines.into_iter().next().ok_or_else(|| {
            RhiError::PipelineError("Driver returned no pipeline".to_string())
        })?;

        info!(
            "Graphics pipeline created ({:?}, cull {:?}, {} dynamic state(s))",
            TOPOLOGY,
            CULL_MODE,
            DYNAMIC_STATES.len()
        );

        Ok(Pipeline { device, pipeline })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_starts_without_shaders() {
        let builder = GraphicsPipelineBuilder::new();
        assert!(builder.vertex_shader.is_none());
        assert!(builder.fragment_shader.is_none());
    }

    #[test]
    fn test_builder_requires_shaders() {
        let err = GraphicsPipelineBuilder::new().validate().err().unwrap();
        assert!(err.to_string().contains("Vertex shader is required"));
    }

    #[test]
    fn test_fixed_state_draws_filled_clockwise_triangles() {
        assert_eq!(TOPOLOGY, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(POLYGON_MODE, vk::PolygonMode::FILL);
        assert_eq!(CULL_MODE, vk::CullModeFlags::BACK);
        assert_eq!(FRONT_FACE, vk::FrontFace::CLOCKWISE);
        assert_eq!(
            DYNAMIC_STATES,
            [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]
        );
    }
}
