// Command recording on a caller-owned Vulkan command buffer
//
// The caller begins the command buffer and the dynamic-rendering pass;
// this type only forwards the renderer's state changes and draws.

use ash::vk;
use ash::vk::Handle;

use super::{convert, VulkanDevice};
use crate::hal::*;

/// A command buffer inside `vkCmdBeginRendering` with one colour attachment
pub struct VulkanCommandRecorder<'a> {
    device: &'a VulkanDevice,
    command_buffer: vk::CommandBuffer,
    format: Format,
    layout: vk::PipelineLayout,
    push_constants: Vec<(vk::ShaderStageFlags, u32)>,
}

impl<'a> VulkanCommandRecorder<'a> {
    /// `format` must match the colour attachment of the active rendering pass
    pub fn new(device: &'a VulkanDevice, command_buffer: vk::CommandBuffer, format: Format) -> Self {
        Self {
            device,
            command_buffer,
            format,
            layout: vk::PipelineLayout::null(),
            push_constants: Vec::new(),
        }
    }
}

impl CommandRecorder for VulkanCommandRecorder<'_> {
    fn color_attachment_format(&self) -> Format {
        self.format
    }

    fn set_pipeline_layout(&mut self, layout: PipelineLayout) {
        // Vulkan binds layouts implicitly; keep what later calls need
        self.layout = vk::PipelineLayout::from_raw(layout.0);
        self.push_constants = self
            .device
            .tables
            .lock()
            .layouts
            .get(&layout.0)
            .map(|info| info.push_constants.clone())
            .unwrap_or_default();
    }

    fn set_pipeline(&mut self, pipeline: Pipeline) {
        unsafe {
            self.device.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                vk::Pipeline::from_raw(pipeline.0),
            );
        }
    }

    fn set_descriptor_set(&mut self, set_index: u32, set: DescriptorSet) {
        unsafe {
            self.device.device.cmd_bind_descriptor_sets(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.layout,
                set_index,
                &[vk::DescriptorSet::from_raw(set.0)],
                &[],
            );
        }
    }

    fn set_root_constants(&mut self, index: u32, data: &[u8]) {
        let Some(&(stages, offset)) = self.push_constants.get(index as usize) else {
            log::error!("Root constant {} is not part of the bound pipeline layout", index);
            return;
        };
        unsafe {
            self.device.device.cmd_push_constants(
                self.command_buffer,
                self.layout,
                stages,
                offset,
                data,
            );
        }
    }

    fn set_index_buffer(&mut self, buffer: Buffer, offset: u64, index_type: IndexType) {
        unsafe {
            self.device.device.cmd_bind_index_buffer(
                self.command_buffer,
                vk::Buffer::from_raw(buffer.0),
                offset,
                convert::index_type(index_type),
            );
        }
    }

    fn set_vertex_buffers(&mut self, base_slot: u32, buffers: &[Buffer], offsets: &[u64]) {
        let buffers: Vec<_> = buffers.iter().map(|b| vk::Buffer::from_raw(b.0)).collect();
        unsafe {
            self.device.device.cmd_bind_vertex_buffers(
                self.command_buffer,
                base_slot,
                &buffers,
                offsets,
            );
        }
    }

    fn set_viewports(&mut self, viewports: &[Viewport]) {
        let viewports: Vec<_> = viewports
            .iter()
            .map(|v| vk::Viewport {
                x: v.x,
                y: v.y,
                width: v.width,
                height: v.height,
                min_depth: v.min_depth,
                max_depth: v.max_depth,
            })
            .collect();
        unsafe {
            self.device
                .device
                .cmd_set_viewport(self.command_buffer, 0, &viewports);
        }
    }

    fn set_scissors(&mut self, rects: &[Rect]) {
        let rects: Vec<_> = rects
            .iter()
            .map(|r| vk::Rect2D {
                offset: vk::Offset2D { x: r.x, y: r.y },
                extent: vk::Extent2D {
                    width: r.width,
                    height: r.height,
                },
            })
            .collect();
        unsafe {
            self.device
                .device
                .cmd_set_scissor(self.command_buffer, 0, &rects);
        }
    }

    fn draw_indexed(&mut self, desc: &DrawIndexedDesc) {
        unsafe {
            self.device.device.cmd_draw_indexed(
                self.command_buffer,
                desc.index_num,
                desc.instance_num,
                desc.base_index,
                desc.base_vertex,
                desc.base_instance,
            );
        }
    }
}
