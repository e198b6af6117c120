mod common;

use common::*;
use glam::Vec2;
use nri_imgui_renderer::gui::{DrawCmd, DrawList, TextureId};
use nri_imgui_renderer::hal::headless::{Command, DeviceCall, RecordingCommandBuffer};
use nri_imgui_renderer::hal::{
    Buffer, DrawIndexedDesc, Format, GraphicsApi, IndexType, Rect, ResultCode,
};
use nri_imgui_renderer::{FrameVertex, RendererConfig, ShaderLibrary};

fn ready_harness() -> Harness {
    let mut h = harness();
    h.renderer.new_frame(&mut h.gui);
    h.device.take_calls();
    h
}

fn bound_vertex_buffer(cmd: &RecordingCommandBuffer) -> Buffer {
    cmd.commands()
        .iter()
        .find_map(|c| match c {
            Command::SetVertexBuffers { buffers, .. } => buffers.first().copied(),
            _ => None,
        })
        .unwrap()
}

#[test]
fn test_full_clip_draws_whole_framebuffer() {
    let mut h = ready_harness();
    let tex = h.gui.fonts.tex_id;
    let data = draw_data(
        Vec2::new(800.0, 600.0),
        vec![quad_list(vec![elements(6, FULL_CLIP, tex)])],
    );
    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);

    h.renderer.render_draw_data(&data, &mut cmd);

    assert_eq!(
        cmd.scissors(),
        vec![Rect {
            x: 0,
            y: 0,
            width: 800,
            height: 600,
        }]
    );
    assert_eq!(
        cmd.draw_calls(),
        vec![DrawIndexedDesc {
            index_num: 6,
            instance_num: 1,
            base_index: 0,
            base_vertex: 0,
            base_instance: 0,
        }]
    );
    assert!(cmd.commands().iter().any(|c| matches!(
        c,
        Command::SetIndexBuffer {
            offset: 0,
            index_type: IndexType::U16,
            ..
        }
    )));
}

#[test]
fn test_render_state_is_set_before_draws() {
    let mut h = ready_harness();
    let data = draw_data(
        Vec2::new(800.0, 600.0),
        vec![quad_list(vec![elements(6, FULL_CLIP, h.gui.fonts.tex_id)])],
    );
    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);

    h.renderer.render_draw_data(&data, &mut cmd);

    let names: Vec<_> = cmd
        .commands()
        .iter()
        .map(|c| match c {
            Command::SetPipelineLayout(_) => "layout",
            Command::SetPipeline(_) => "pipeline",
            Command::SetIndexBuffer { .. } => "index",
            Command::SetVertexBuffers { .. } => "vertex",
            Command::SetViewports(_) => "viewport",
            Command::SetRootConstants { .. } => "constants",
            Command::SetDescriptorSet { .. } => "set",
            Command::SetScissors(_) => "scissor",
            Command::DrawIndexed(_) => "draw",
        })
        .collect();
    assert_eq!(
        names,
        ["layout", "pipeline", "index", "vertex", "viewport", "constants", "set", "scissor", "draw"]
    );

    let constants = cmd
        .commands()
        .iter()
        .find_map(|c| match c {
            Command::SetRootConstants { index: 0, data } => Some(data.clone()),
            _ => None,
        })
        .unwrap();
    let constants: Vec<f32> = constants
        .chunks_exact(4)
        .map(bytemuck::pod_read_unaligned)
        .collect();
    assert_eq!(constants, [2.0 / 800.0, 2.0 / 600.0, -1.0, -1.0]);
}

#[test]
fn test_minimized_framebuffer_draws_nothing() {
    let mut h = ready_harness();
    let tex = h.gui.fonts.tex_id;
    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);

    for size in [Vec2::new(0.0, 600.0), Vec2::new(800.0, 0.0), Vec2::new(-5.0, 10.0)] {
        let data = draw_data(size, vec![quad_list(vec![elements(6, FULL_CLIP, tex)])]);
        h.renderer.render_draw_data(&data, &mut cmd);
    }

    assert!(cmd.commands().is_empty());
    assert!(h.device.take_calls().is_empty());
}

#[test]
fn test_empty_draw_data_draws_nothing() {
    let mut h = ready_harness();
    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);

    h.renderer
        .render_draw_data(&draw_data(Vec2::new(800.0, 600.0), Vec::new()), &mut cmd);
    h.renderer.render_draw_data(
        &draw_data(Vec2::new(800.0, 600.0), vec![DrawList::default()]),
        &mut cmd,
    );

    assert!(cmd.commands().is_empty());
    assert!(h.device.take_calls().is_empty());
}

#[test]
fn test_clip_rect_outside_framebuffer_is_skipped() {
    let mut h = ready_harness();
    let tex = h.gui.fonts.tex_id;
    let data = draw_data(
        Vec2::new(800.0, 600.0),
        vec![quad_list(vec![
            elements(6, [900.0, 0.0, 1000.0, 100.0], tex),
            elements(6, [0.0, 700.0, 100.0, 800.0], tex),
        ])],
    );
    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);

    h.renderer.render_draw_data(&data, &mut cmd);

    assert!(cmd.scissors().is_empty());
    assert!(cmd.draw_calls().is_empty());
}

#[test]
fn test_lists_are_offset_into_shared_buffers() {
    let mut h = ready_harness();
    let tex = h.gui.fonts.tex_id;
    let second = DrawList {
        vtx_buffer: quad_vertices([200.0, 200.0], 50.0),
        idx_buffer: QUAD_INDICES.to_vec(),
        commands: vec![DrawCmd::Elements {
            count: 3,
            clip_rect: FULL_CLIP,
            texture_id: tex,
            vtx_offset: 1,
            idx_offset: 3,
        }],
    };
    let data = draw_data(
        Vec2::new(800.0, 600.0),
        vec![quad_list(vec![elements(6, FULL_CLIP, tex)]), second],
    );
    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);

    h.renderer.render_draw_data(&data, &mut cmd);

    let draws = cmd.draw_calls();
    assert_eq!(draws.len(), 2);
    assert_eq!((draws[1].index_num, draws[1].base_index, draws[1].base_vertex), (3, 9, 5));
    // Same texture: bound once
    assert_eq!(cmd.bound_descriptor_sets().len(), 1);

    let contents = h.device.buffer_contents(bound_vertex_buffer(&cmd)).unwrap();
    let vertices: Vec<FrameVertex> = contents[..8 * 16]
        .chunks_exact(16)
        .map(bytemuck::pod_read_unaligned)
        .collect();
    assert_eq!(vertices[4].pos, [200.0, 200.0]);
    assert_eq!(vertices[6].uv, [u16::MAX, u16::MAX]);
    assert_eq!(vertices[0].col, [0xff; 4]);
}

#[test]
fn test_buffers_grow_only_when_needed() {
    let mut config = RendererConfig::default();
    config.buffers.min_vertex_capacity = 4;
    config.buffers.min_index_capacity = 6;
    let mut h = harness_with(GraphicsApi::Vulkan, config, test_shaders());
    h.renderer.new_frame(&mut h.gui);
    let tex = h.gui.fonts.tex_id;
    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);

    let one_quad = draw_data(
        Vec2::new(800.0, 600.0),
        vec![quad_list(vec![elements(6, FULL_CLIP, tex)])],
    );
    let three_quads = draw_data(
        Vec2::new(800.0, 600.0),
        vec![
            quad_list(vec![elements(6, FULL_CLIP, tex)]),
            quad_list(vec![elements(6, FULL_CLIP, tex)]),
            quad_list(vec![elements(6, FULL_CLIP, tex)]),
        ],
    );
    let creates = |h: &Harness| h.device.count_calls(|c| matches!(c, DeviceCall::CreateBuffer { .. }));

    // Slot 0, slot 1
    h.renderer.render_draw_data(&one_quad, &mut cmd);
    h.renderer.render_draw_data(&one_quad, &mut cmd);
    assert_eq!(h.renderer.frame_buffer_capacities(), vec![(4, 6), (4, 6)]);
    assert_eq!(creates(&h), 4);

    // Slot 0 again, fits
    h.renderer.render_draw_data(&one_quad, &mut cmd);
    assert_eq!(creates(&h), 4);

    // Slot 1 needs 12 vertices and 18 indices
    h.renderer.render_draw_data(&three_quads, &mut cmd);
    assert_eq!(h.renderer.frame_buffer_capacities(), vec![(4, 6), (12, 18)]);
    assert_eq!(creates(&h), 6);

    // Slot 1 never shrinks
    h.renderer.render_draw_data(&one_quad, &mut cmd);
    h.renderer.render_draw_data(&one_quad, &mut cmd);
    assert_eq!(h.renderer.frame_buffer_capacities(), vec![(4, 6), (12, 18)]);
    assert_eq!(creates(&h), 6);
}

#[test]
fn test_pipeline_is_cached_per_format() {
    let mut h = ready_harness();
    let data = draw_data(
        Vec2::new(800.0, 600.0),
        vec![quad_list(vec![elements(6, FULL_CLIP, h.gui.fonts.tex_id)])],
    );
    let mut bgra = RecordingCommandBuffer::new(Format::Bgra8Unorm);
    let mut rgba = RecordingCommandBuffer::new(Format::Rgba16Sfloat);

    h.renderer.render_draw_data(&data, &mut bgra);
    h.renderer.render_draw_data(&data, &mut bgra);
    h.renderer.render_draw_data(&data, &mut rgba);
    h.renderer.render_draw_data(&data, &mut bgra);

    let created: Vec<_> = h
        .device
        .calls()
        .into_iter()
        .filter_map(|c| match c {
            DeviceCall::CreateGraphicsPipeline { format, .. } => Some(format),
            _ => None,
        })
        .collect();
    assert_eq!(created, [Format::Bgra8Unorm, Format::Rgba16Sfloat]);
    assert_eq!(h.renderer.pipeline_count(), 2);
}

#[test]
fn test_unsupported_api_reports_and_skips_drawing() {
    let mut h = harness_with(
        GraphicsApi::D3D11,
        RendererConfig::default(),
        ShaderLibrary::empty(),
    );
    h.renderer.new_frame(&mut h.gui);
    let data = draw_data(
        Vec2::new(800.0, 600.0),
        vec![quad_list(vec![elements(6, FULL_CLIP, h.gui.fonts.tex_id)])],
    );
    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);

    h.renderer.render_draw_data(&data, &mut cmd);

    assert!(h.results.borrow().contains(&ResultCode::Unsupported));
    assert_eq!(
        h.device.count_calls(|c| matches!(c, DeviceCall::CreateGraphicsPipeline { .. })),
        0
    );
    assert!(cmd.draw_calls().is_empty());
    assert_eq!(h.renderer.pipeline_count(), 0);
}

#[test]
fn test_reset_render_state_rebinds_everything() {
    let mut h = ready_harness();
    let tex = h.gui.fonts.tex_id;
    let data = draw_data(
        Vec2::new(800.0, 600.0),
        vec![quad_list(vec![
            elements(6, FULL_CLIP, tex),
            elements(6, FULL_CLIP, tex),
            DrawCmd::ResetRenderState,
            elements(6, FULL_CLIP, tex),
        ])],
    );
    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);

    h.renderer.render_draw_data(&data, &mut cmd);

    let count = |pred: fn(&Command) -> bool| cmd.commands().iter().filter(|c| pred(c)).count();
    assert_eq!(count(|c| matches!(c, Command::SetPipeline(_))), 2);
    assert_eq!(count(|c| matches!(c, Command::SetRootConstants { .. })), 2);
    assert_eq!(count(|c| matches!(c, Command::SetDescriptorSet { .. })), 2);
    assert_eq!(cmd.draw_calls().len(), 3);
}

#[test]
fn test_unregistered_texture_draws_are_skipped() {
    let mut h = ready_harness();
    let tex = h.gui.fonts.tex_id;
    let data = draw_data(
        Vec2::new(800.0, 600.0),
        vec![quad_list(vec![
            elements(6, FULL_CLIP, TextureId(0xdead)),
            elements(6, FULL_CLIP, tex),
        ])],
    );
    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);

    h.renderer.render_draw_data(&data, &mut cmd);

    assert_eq!(cmd.draw_calls().len(), 1);
    assert_eq!(
        cmd.bound_descriptor_sets(),
        vec![h.renderer.texture_descriptor_set(tex).unwrap()]
    );
}

#[test]
fn test_hidpi_scissor_uses_framebuffer_pixels() {
    let mut h = ready_harness();
    let mut data = draw_data(
        Vec2::new(400.0, 300.0),
        vec![quad_list(vec![elements(
            6,
            [10.0, 20.0, 110.0, 70.0],
            h.gui.fonts.tex_id,
        )])],
    );
    data.framebuffer_scale = Vec2::splat(2.0);
    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);

    h.renderer.render_draw_data(&data, &mut cmd);

    assert_eq!(
        cmd.scissors(),
        vec![Rect {
            x: 20,
            y: 40,
            width: 200,
            height: 100,
        }]
    );
    let viewport = cmd
        .commands()
        .iter()
        .find_map(|c| match c {
            Command::SetViewports(v) => Some(v[0]),
            _ => None,
        })
        .unwrap();
    assert_eq!((viewport.width, viewport.height), (800.0, 600.0));
}

#[test]
fn test_embedded_shaders_draw_on_every_api() {
    for api in [GraphicsApi::Vulkan, GraphicsApi::D3D12, GraphicsApi::D3D11] {
        let mut h = harness_with(api, RendererConfig::default(), ShaderLibrary::embedded());
        h.renderer.new_frame(&mut h.gui);
        let data = draw_data(
            Vec2::new(800.0, 600.0),
            vec![quad_list(vec![elements(6, FULL_CLIP, h.gui.fonts.tex_id)])],
        );
        let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);

        h.renderer.render_draw_data(&data, &mut cmd);

        assert_eq!(cmd.draw_calls().len(), 1, "{:?}", api);
        assert!(!h.results.borrow().contains(&ResultCode::Unsupported));
    }
}
