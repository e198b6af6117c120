mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use common::*;
use nri_imgui_renderer::gui::{GuiContext, TextureId};
use nri_imgui_renderer::hal::headless::{
    DeviceCall, HeadlessDevice, Operation, RecordingCommandBuffer,
};
use nri_imgui_renderer::hal::{CommandQueue, Format, GraphicsApi, GraphicsError, ResultCode};
use nri_imgui_renderer::{InitInfo, Renderer, RendererConfig, BACKEND_RENDERER_NAME};

#[test]
fn test_init_registers_backend_and_creates_shared_objects() {
    let h = harness();

    assert_eq!(h.gui.io.backend_renderer, Some(h.renderer.id()));
    assert_eq!(h.gui.io.backend_renderer_name, Some(BACKEND_RENDERER_NAME));
    assert_eq!(BACKEND_RENDERER_NAME, "nri_imgui_renderer");

    // Pipeline layout, sampler, descriptor pool
    assert_eq!(h.device.live_object_count(), 3);
    assert!(h.results.borrow().iter().all(|c| c.is_success()));
}

#[test]
#[should_panic(expected = "Already initialized a renderer backend!")]
fn test_double_init_panics() {
    let mut h = harness();
    let info = InitInfo::new(h.device.clone(), h.device.queue()).with_shaders(test_shaders());
    let _second = Renderer::init(&mut h.gui, info);
}

#[test]
fn test_init_with_null_queue_panics_without_registering() {
    init_logger();
    let device = Arc::new(HeadlessDevice::new(GraphicsApi::Vulkan));
    let mut gui = GuiContext::new();

    let result = catch_unwind(AssertUnwindSafe(|| {
        Renderer::init(&mut gui, InitInfo::new(device.clone(), CommandQueue::NULL))
    }));

    assert!(result.is_err());
    assert_eq!(gui.io.backend_renderer, None);
    assert_eq!(gui.io.backend_renderer_name, None);
    assert_eq!(device.live_object_count(), 0);
}

#[test]
fn test_shutdown_releases_everything_and_allows_reinit() {
    let mut h = harness();
    h.renderer.new_frame(&mut h.gui);

    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);
    let data = draw_data(
        glam::Vec2::new(800.0, 600.0),
        vec![quad_list(vec![elements(6, FULL_CLIP, h.gui.fonts.tex_id)])],
    );
    h.renderer.render_draw_data(&data, &mut cmd);
    assert!(h.device.live_object_count() > 3);

    let Harness {
        device,
        mut gui,
        renderer,
        ..
    } = h;
    device.take_calls();
    renderer.shutdown(&mut gui);

    // Only the font atlas set, freed once
    assert_eq!(
        device.count_calls(|c| matches!(c, DeviceCall::FreeDescriptorSet(_))),
        1
    );
    assert_eq!(device.live_object_count(), 0);
    assert_eq!(gui.io.backend_renderer, None);
    assert_eq!(gui.io.backend_renderer_name, None);
    assert_eq!(gui.fonts.tex_id, TextureId::NONE);

    let again = Renderer::init(&mut gui, InitInfo::new(device.clone(), device.queue()));
    assert_eq!(gui.io.backend_renderer, Some(again.id()));
    again.shutdown(&mut gui);
}

#[test]
#[should_panic(expected = "No renderer backend to shutdown, or already shutdown?")]
fn test_shutdown_on_foreign_context_panics() {
    let h = harness();
    let mut other = GuiContext::new();
    h.renderer.shutdown(&mut other);
}

#[test]
fn test_drop_without_shutdown_releases_objects() {
    let mut h = harness();
    h.renderer.new_frame(&mut h.gui);
    let device = h.device.clone();
    assert!(device.live_object_count() > 3);

    drop(h);

    assert_eq!(device.live_object_count(), 0);
}

#[test]
fn test_new_frame_recreates_objects_that_failed_at_init() {
    init_logger();
    let device = Arc::new(HeadlessDevice::new(GraphicsApi::Vulkan));
    device.fail_next(Operation::CreateSampler, GraphicsError::OutOfMemory);
    let mut gui = gui_with_fonts();

    let results: Results = Default::default();
    let sink = results.clone();
    let mut renderer = Renderer::init(
        &mut gui,
        InitInfo::new(device.clone(), device.queue())
            .with_shaders(test_shaders())
            .with_check_result_fn(move |code| sink.borrow_mut().push(code)),
    );
    assert!(results.borrow().contains(&ResultCode::OutOfMemory));
    assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::CreateSampler(_))), 0);

    renderer.new_frame(&mut gui);

    assert_eq!(device.count_calls(|c| matches!(c, DeviceCall::CreateSampler(_))), 1);
    assert_ne!(gui.fonts.tex_id, TextureId::NONE);
    renderer.shutdown(&mut gui);
}

#[test]
#[should_panic(expected = "Did you call Renderer::init()?")]
fn test_new_frame_requires_registration() {
    let mut h = harness();
    let mut other = GuiContext::new();
    h.renderer.new_frame(&mut other);
}

#[test]
fn test_set_min_image_count_rebuilds_frame_ring() {
    let mut h = harness();
    h.renderer.new_frame(&mut h.gui);
    let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);
    let data = draw_data(
        glam::Vec2::new(800.0, 600.0),
        vec![quad_list(vec![elements(6, FULL_CLIP, h.gui.fonts.tex_id)])],
    );
    h.renderer.render_draw_data(&data, &mut cmd);
    assert_eq!(h.renderer.frame_buffer_capacities().len(), 2);
    h.device.take_calls();

    h.renderer.set_min_image_count(3);

    let calls = h.device.take_calls();
    assert_eq!(calls.first(), Some(&DeviceCall::WaitForIdle(h.device.queue())));
    assert_eq!(
        calls.iter().filter(|c| matches!(c, DeviceCall::DestroyBuffer(_))).count(),
        2
    );
    assert_eq!(h.renderer.min_image_count(), 3);
    assert_eq!(h.renderer.frame_buffer_capacities(), vec![(0, 0); 3]);

    // Same count again is a no-op
    h.renderer.set_min_image_count(3);
    assert!(h.device.take_calls().is_empty());
}

#[test]
#[should_panic(expected = "min_image_count must be at least 2")]
fn test_min_image_count_below_two_panics() {
    let mut h = harness();
    h.renderer.set_min_image_count(1);
}

#[test]
fn test_config_drives_descriptor_pool_and_frames() {
    let config = RendererConfig::from_toml_str(
        r#"
        [textures]
        descriptor_pool_size = 8
        sampler_filter = "nearest"

        [frames]
        min_image_count = 4
        "#,
    )
    .unwrap();

    let h = harness_with(GraphicsApi::Vulkan, config, test_shaders());

    assert_eq!(h.renderer.min_image_count(), 4);
    assert_eq!(h.renderer.frame_buffer_capacities().len(), 4);
    assert_eq!(h.renderer.config().textures.descriptor_pool_size, 8);
}
