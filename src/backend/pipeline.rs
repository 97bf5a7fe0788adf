// Graphics pipeline creation
//
// The graphics pipeline defines how vertices are processed and rasterized.
// It includes: vertex input, shaders, rasterization, depth/stencil, blending.
// Pipelines render straight into the swapchain and depth formats through
// dynamic rendering, so there are no render pass or framebuffer objects.

use ash::vk;
use std::ffi::CStr;

use crate::error::{RenderError, RenderResult, VkResultExt};
use crate::scene::Vertex;

const ENTRY_POINT: &CStr = c"main";

/// Fixed state every mesh pipeline shares.
#[derive(Debug, Clone, Copy)]
pub struct PipelineTarget {
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
    pub extent: vk::Extent2D,
    pub depth_write: bool,
}

/// Vertex input description for [`Vertex`]: interleaved position + normal.
pub fn vertex_input_description() -> (
    [vk::VertexInputBindingDescription; 1],
    [vk::VertexInputAttributeDescription; 2],
) {
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: std::mem::size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };

    // Position attribute (location 0)
    let position_attr = vk::VertexInputAttributeDescription {
        binding: 0,
        location: 0,
        format: vk::Format::R32G32B32_SFLOAT,
        offset: std::mem::offset_of!(Vertex, position) as u32,
    };

    // Normal attribute (location 1)
    let normal_attr = vk::VertexInputAttributeDescription {
        binding: 0,
        location: 1,
        format: vk::Format::R32G32B32_SFLOAT,
        offset: std::mem::offset_of!(Vertex, normal) as u32,
    };

    ([binding], [position_attr, normal_attr])
}

/// Set 0 is the global layout, set 1 the entity's.
pub fn create_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
) -> RenderResult<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);

    unsafe { device.create_pipeline_layout(&layout_info, None) }.op("vkCreatePipelineLayout")
}

/// Create a triangle-list graphics pipeline for one mesh's shaders.
pub fn create_graphics_pipeline(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
    target: &PipelineTarget,
) -> RenderResult<vk::Pipeline> {
    // Shader stages
    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_shader)
            .name(ENTRY_POINT)
            .build(),
        vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_shader)
            .name(ENTRY_POINT)
            .build(),
    ];

    // Vertex input
    let (bindings, attributes) = vertex_input_description();
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    // Input assembly
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Viewport and scissor, fixed to the swapchain size
    let viewports = [vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: target.extent.width as f32,
        height: target.extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }];
    let scissors = [vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent: target.extent,
    }];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(&viewports)
        .scissors(&scissors);

    // Rasterization: both faces drawn
    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::NONE)
        .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
        .depth_bias_enable(false);

    // Multisampling (disabled)
    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
        .depth_test_enable(true)
        .depth_write_enable(target.depth_write)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    // Color blending (no blending, opaque)
    let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build()];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let color_formats = [target.color_format];
    let mut rendering_info = vk::PipelineRenderingCreateInfo::builder()
        .color_attachment_formats(&color_formats)
        .depth_attachment_format(target.depth_format);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .layout(layout)
        .push_next(&mut rendering_info)
        .build();

    let pipelines = unsafe { device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None) }
        .map_err(|(_, result)| RenderError::Vulkan {
            op: "vkCreateGraphicsPipelines",
            result,
        })?;

    Ok(pipelines[0])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_vertex_struct() {
        let (bindings, attributes) = vertex_input_description();
        assert_eq!(bindings[0].stride, 24);
        assert_eq!(bindings[0].input_rate, vk::VertexInputRate::VERTEX);

        assert_eq!(attributes[0].location, 0);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].offset, 12);
        assert!(attributes.iter().all(|a| a.format == vk::Format::R32G32B32_SFLOAT));
    }
}
