// Frame renderer
//
// Translates one frame of GUI draw data into buffer uploads and indexed
// draws on the caller's command recorder. No render state is assumed to
// survive between calls.

use bytemuck::cast_slice;
use glam::Vec2;

use super::buffer::FrameVertex;
use super::Renderer;
use crate::gui::{DrawCmd, DrawData, DrawIdx};
use crate::hal::*;

/// Root constants mapping display coordinates to clip space:
/// `[scale.x, scale.y, translate.x, translate.y]`.
pub(crate) fn projection_constants(display_pos: Vec2, display_size: Vec2) -> [f32; 4] {
    let scale = 2.0 / display_size;
    let translate = -1.0 - display_pos * scale;
    [scale.x, scale.y, translate.x, translate.y]
}

/// Project a clip rectangle into framebuffer pixels and clamp it to the
/// whole pixels of the framebuffer. `None` when nothing of it is visible.
pub(crate) fn scissor_rect(
    clip_rect: [f32; 4],
    display_pos: Vec2,
    framebuffer_scale: Vec2,
    framebuffer_size: Vec2,
) -> Option<Rect> {
    let min = (Vec2::new(clip_rect[0], clip_rect[1]) - display_pos) * framebuffer_scale;
    let max = (Vec2::new(clip_rect[2], clip_rect[3]) - display_pos) * framebuffer_scale;

    let min = min.max(Vec2::ZERO).floor();
    let max = max.ceil().min(framebuffer_size.floor());
    if max.x <= min.x || max.y <= min.y {
        return None;
    }

    Some(Rect {
        x: min.x as i32,
        y: min.y as i32,
        width: (max.x - min.x) as u32,
        height: (max.y - min.y) as u32,
    })
}

impl<D: Device> Renderer<D> {
    /// Record the draws for one frame of GUI output into `cmd`.
    ///
    /// `cmd` must be inside a render pass targeting a framebuffer of
    /// `draw_data.framebuffer_size()` pixels.
    pub fn render_draw_data(&mut self, draw_data: &DrawData, cmd: &mut impl CommandRecorder) {
        // Avoid rendering when minimized
        let fb_size = draw_data.framebuffer_size();
        if fb_size.x <= 0.0 || fb_size.y <= 0.0 {
            return;
        }

        let vtx_count = draw_data.total_vtx_count();
        let idx_count = draw_data.total_idx_count();
        if vtx_count == 0 || idx_count == 0 {
            return;
        }

        if !self.create_device_objects() {
            return;
        }

        // Frame buffers
        let (vertex_buffer, index_buffer) = {
            let min_vertices = self.config.buffers.min_vertex_capacity;
            let min_indices = self.config.buffers.min_index_capacity;
            let frame = self.frames.advance();

            if !frame.vertex.reserve(
                &self.ctx,
                vtx_count,
                min_vertices,
                std::mem::size_of::<FrameVertex>(),
                BufferUsage::Vertex,
            ) || !frame.index.reserve(
                &self.ctx,
                idx_count,
                min_indices,
                std::mem::size_of::<DrawIdx>(),
                BufferUsage::Index,
            ) {
                return;
            }
            (frame.vertex.buffer, frame.index.buffer)
        };

        // Upload vertex and index data
        let mut vertices = Vec::with_capacity(vtx_count);
        let mut indices: Vec<DrawIdx> = Vec::with_capacity(idx_count);
        for list in &draw_data.draw_lists {
            vertices.extend(list.vtx_buffer.iter().map(FrameVertex::from));
            indices.extend_from_slice(&list.idx_buffer);
        }

        let device = &*self.ctx.device;
        if self
            .ctx
            .check(device.write_buffer(vertex_buffer, 0, cast_slice(&vertices)))
            .is_none()
            || self
                .ctx
                .check(device.write_buffer(index_buffer, 0, cast_slice(&indices)))
                .is_none()
        {
            return;
        }

        let Some(pipeline) = self.pipeline_for(cmd.color_attachment_format()) else {
            log::debug!("No GUI pipeline for {:?}, skipping frame", cmd.color_attachment_format());
            return;
        };

        self.setup_render_state(draw_data, cmd, pipeline, vertex_buffer, index_buffer);

        // Will project scissor/clipping rectangles into framebuffer space
        let clip_off = draw_data.display_pos;
        let clip_scale = draw_data.framebuffer_scale;

        let mut bound_set = DescriptorSet::NULL;
        let mut global_vtx_offset = 0u32;
        let mut global_idx_offset = 0u32;

        for list in &draw_data.draw_lists {
            for command in &list.commands {
                match command {
                    DrawCmd::Elements {
                        count,
                        clip_rect,
                        texture_id,
                        vtx_offset,
                        idx_offset,
                    } => {
                        let Some(scissor) = scissor_rect(*clip_rect, clip_off, clip_scale, fb_size)
                        else {
                            continue;
                        };

                        let Some(set) = self.textures.get(*texture_id) else {
                            log::warn!("Skipping draw with unregistered texture {:#x}", texture_id.0);
                            continue;
                        };
                        if set != bound_set {
                            cmd.set_descriptor_set(0, set);
                            bound_set = set;
                        }

                        cmd.set_scissors(&[scissor]);
                        cmd.draw_indexed(&DrawIndexedDesc {
                            index_num: *count,
                            instance_num: 1,
                            base_index: idx_offset + global_idx_offset,
                            base_vertex: (vtx_offset + global_vtx_offset) as i32,
                            base_instance: 0,
                        });
                    }
                    DrawCmd::ResetRenderState => {
                        self.setup_render_state(draw_data, cmd, pipeline, vertex_buffer, index_buffer);
                        bound_set = DescriptorSet::NULL;
                    }
                }
            }

            global_vtx_offset += list.vtx_buffer.len() as u32;
            global_idx_offset += list.idx_buffer.len() as u32;
        }
    }

    /// Bind pipeline, buffers, viewport and projection constants.
    fn setup_render_state(
        &self,
        draw_data: &DrawData,
        cmd: &mut impl CommandRecorder,
        pipeline: Pipeline,
        vertex_buffer: Buffer,
        index_buffer: Buffer,
    ) {
        let fb_size = draw_data.framebuffer_size();

        cmd.set_pipeline_layout(self.objects.layout);
        cmd.set_pipeline(pipeline);
        cmd.set_index_buffer(index_buffer, 0, IndexType::U16);
        cmd.set_vertex_buffers(0, &[vertex_buffer], &[0]);
        cmd.set_viewports(&[Viewport {
            x: 0.0,
            y: 0.0,
            width: fb_size.x,
            height: fb_size.y,
            min_depth: 0.0,
            max_depth: 1.0,
        }]);

        let constants = projection_constants(draw_data.display_pos, draw_data.display_size);
        cmd.set_root_constants(0, cast_slice(&constants));
    }
}
