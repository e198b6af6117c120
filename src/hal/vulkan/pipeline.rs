// Pipeline layout and graphics pipeline creation
//
// Layouts become descriptor-set layouts + push-constant ranges. Pipelines
// target dynamic rendering (no render pass object) and keep viewport and
// scissor dynamic.

use ash::vk;
use std::ffi::CString;

use super::convert;
use super::device::LayoutInfo;
use super::shader::create_shader_module;
use super::VulkanDevice;
use crate::hal::{GraphicsError, GraphicsPipelineDesc, GraphicsResult, PipelineLayoutDesc};

/// Create descriptor-set layouts and the pipeline layout that references them
pub(crate) fn create_pipeline_layout(
    device: &VulkanDevice,
    desc: &PipelineLayoutDesc,
) -> GraphicsResult<(vk::PipelineLayout, LayoutInfo)> {
    let mut set_layouts = Vec::with_capacity(desc.descriptor_sets.len());

    let destroy_set_layouts = |set_layouts: &[vk::DescriptorSetLayout]| unsafe {
        for &set_layout in set_layouts {
            device.device.destroy_descriptor_set_layout(set_layout, None);
        }
    };

    for set in &desc.descriptor_sets {
        // One binding per range, numbered in declaration order
        let bindings: Vec<_> = set
            .ranges
            .iter()
            .enumerate()
            .map(|(binding, range)| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding as u32)
                    .descriptor_type(convert::descriptor_type(range.kind))
                    .descriptor_count(range.count)
                    .stage_flags(convert::stages(range.stages))
                    .build()
            })
            .collect();

        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        match unsafe { device.device.create_descriptor_set_layout(&layout_info, None) } {
            Ok(set_layout) => set_layouts.push(set_layout),
            Err(e) => {
                destroy_set_layouts(&set_layouts);
                return Err(e.into());
            }
        }
    }

    // Push constants are packed back to back
    let mut offset = 0;
    let mut push_constants = Vec::with_capacity(desc.root_constants.len());
    let push_constant_ranges: Vec<_> = desc
        .root_constants
        .iter()
        .map(|rc| {
            let stage_flags = convert::stages(rc.stages);
            push_constants.push((stage_flags, offset));
            let range = vk::PushConstantRange::builder()
                .stage_flags(stage_flags)
                .offset(offset)
                .size(rc.size)
                .build();
            offset += rc.size;
            range
        })
        .collect();

    let layout_info = vk::PipelineLayoutCreateInfo::builder()
        .set_layouts(&set_layouts)
        .push_constant_ranges(&push_constant_ranges);

    match unsafe { device.device.create_pipeline_layout(&layout_info, None) } {
        Ok(layout) => Ok((
            layout,
            LayoutInfo {
                set_layouts,
                push_constants,
            },
        )),
        Err(e) => {
            destroy_set_layouts(&set_layouts);
            Err(e.into())
        }
    }
}

/// Create a graphics pipeline for dynamic rendering
pub(crate) fn create_graphics_pipeline(
    device: &VulkanDevice,
    layout: vk::PipelineLayout,
    desc: &GraphicsPipelineDesc<'_>,
) -> GraphicsResult<vk::Pipeline> {
    // Shader stages
    let mut modules = Vec::with_capacity(desc.shaders.len());
    let mut entry_points = Vec::with_capacity(desc.shaders.len());
    for shader in desc.shaders {
        let entry_point =
            CString::new(shader.entry_point).map_err(|_| GraphicsError::InvalidArgument)?;
        match create_shader_module(device, shader.bytecode) {
            Ok(module) => {
                modules.push((convert::shader_stage(shader.stage), module));
                entry_points.push(entry_point);
            }
            Err(e) => {
                destroy_modules(device, &modules);
                return Err(e);
            }
        }
    }

    let shader_stages: Vec<_> = modules
        .iter()
        .zip(&entry_points)
        .map(|(&(stage, module), name)| {
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(stage)
                .module(module)
                .name(name)
                .build()
        })
        .collect();

    // Vertex input
    let bindings: Vec<_> = desc
        .vertex_streams
        .iter()
        .map(|stream| {
            vk::VertexInputBindingDescription::builder()
                .binding(stream.binding)
                .stride(stream.stride)
                .input_rate(vk::VertexInputRate::VERTEX)
                .build()
        })
        .collect();

    let attributes: Vec<_> = desc
        .vertex_attributes
        .iter()
        .map(|attr| {
            vk::VertexInputAttributeDescription::builder()
                .binding(attr.stream)
                .location(attr.location)
                .format(convert::format(attr.format))
                .offset(attr.offset)
                .build()
        })
        .collect();

    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    // Input assembly
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(convert::topology(desc.topology))
        .primitive_restart_enable(false);

    // Viewport and scissor are set per frame
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(1)
        .scissor_count(1);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

    // Rasterization
    let front_face = if desc.rasterization.front_counter_clockwise {
        vk::FrontFace::COUNTER_CLOCKWISE
    } else {
        vk::FrontFace::CLOCKWISE
    };
    let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(convert::polygon_mode(desc.rasterization.fill_mode))
        .line_width(1.0)
        .cull_mode(convert::cull_mode(desc.rasterization.cull_mode))
        .front_face(front_face)
        .depth_bias_enable(false);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(convert::sample_count(desc.sample_count));

    // No depth attachment
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder();

    // Color blending
    let color_blend_attachments: Vec<_> = desc
        .color_attachments
        .iter()
        .map(|att| {
            vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::from_raw(
                    att.color_write_mask as u32,
                ))
                .blend_enable(att.blend_enabled)
                .src_color_blend_factor(convert::blend_factor(att.color_blend.src_factor))
                .dst_color_blend_factor(convert::blend_factor(att.color_blend.dst_factor))
                .color_blend_op(convert::blend_op(att.color_blend.op))
                .src_alpha_blend_factor(convert::blend_factor(att.alpha_blend.src_factor))
                .dst_alpha_blend_factor(convert::blend_factor(att.alpha_blend.dst_factor))
                .alpha_blend_op(convert::blend_op(att.alpha_blend.op))
                .build()
        })
        .collect();
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let color_formats: Vec<_> = desc
        .color_attachments
        .iter()
        .map(|att| convert::format(att.format))
        .collect();
    let mut rendering_info =
        vk::PipelineRenderingCreateInfo::builder().color_attachment_formats(&color_formats);

    // Create pipeline
    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(layout)
        .push_next(&mut rendering_info)
        .build();

    let result = unsafe {
        device
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
            .map_err(|(_, e)| e)
    };

    // Shader modules are no longer needed regardless of success/failure
    destroy_modules(device, &modules);

    Ok(result?[0])
}

fn destroy_modules(device: &VulkanDevice, modules: &[(vk::ShaderStageFlags, vk::ShaderModule)]) {
    for &(_, module) in modules {
        unsafe { device.device.destroy_shader_module(module, None) };
    }
}
