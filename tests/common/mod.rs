// Shared setup for the integration tests: a headless device, a GUI context
// with a small font atlas, and helpers to build draw data.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use glam::Vec2;
use nri_imgui_renderer::gui::{DrawCmd, DrawData, DrawList, DrawVert, GuiContext, TextureId};
use nri_imgui_renderer::hal::headless::HeadlessDevice;
use nri_imgui_renderer::hal::{GraphicsApi, ResultCode};
use nri_imgui_renderer::{InitInfo, Renderer, RendererConfig, ShaderLibrary};

pub type Results = Rc<RefCell<Vec<ResultCode>>>;

pub struct Harness {
    pub device: Arc<HeadlessDevice>,
    pub gui: GuiContext,
    pub renderer: Renderer<HeadlessDevice>,
    pub results: Results,
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Non-empty stand-in bytecode; the headless device only checks presence.
pub fn test_shaders() -> ShaderLibrary {
    ShaderLibrary::empty()
        .with_api(GraphicsApi::Vulkan, vec![0x03u8, 0x02, 0x23, 0x07], vec![0x03u8, 0x02, 0x23, 0x07])
        .with_api(GraphicsApi::D3D12, vec![0x44u8, 0x58, 0x42, 0x43], vec![0x44u8, 0x58, 0x42, 0x43])
}

pub fn gui_with_fonts() -> GuiContext {
    let mut gui = GuiContext::new();
    gui.fonts.set_rgba32(4, 2, vec![255; 4 * 2 * 4]);
    gui
}

pub fn harness_with(api: GraphicsApi, config: RendererConfig, shaders: ShaderLibrary) -> Harness {
    harness_on(HeadlessDevice::new(api), config, shaders)
}

pub fn harness_on(device: HeadlessDevice, config: RendererConfig, shaders: ShaderLibrary) -> Harness {
    init_logger();

    let device = Arc::new(device);
    let mut gui = gui_with_fonts();
    let results: Results = Rc::default();
    let sink = results.clone();

    let info = InitInfo::new(device.clone(), device.queue())
        .with_config(config)
        .with_shaders(shaders)
        .with_check_result_fn(move |code| sink.borrow_mut().push(code));
    let renderer = Renderer::init(&mut gui, info);

    Harness {
        device,
        gui,
        renderer,
        results,
    }
}

pub fn harness() -> Harness {
    harness_with(GraphicsApi::Vulkan, RendererConfig::default(), test_shaders())
}

pub fn quad_vertices(origin: [f32; 2], size: f32) -> Vec<DrawVert> {
    let [x, y] = origin;
    [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]
        .iter()
        .map(|[u, v]| DrawVert {
            pos: [x + u * size, y + v * size],
            uv: [*u, *v],
            col: 0xffff_ffff,
        })
        .collect()
}

pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

pub fn elements(count: u32, clip_rect: [f32; 4], texture_id: TextureId) -> DrawCmd {
    DrawCmd::Elements {
        count,
        clip_rect,
        texture_id,
        vtx_offset: 0,
        idx_offset: 0,
    }
}

/// One list holding one quad drawn with `commands`.
pub fn quad_list(commands: Vec<DrawCmd>) -> DrawList {
    DrawList {
        vtx_buffer: quad_vertices([10.0, 10.0], 100.0),
        idx_buffer: QUAD_INDICES.to_vec(),
        commands,
    }
}

pub fn draw_data(size: Vec2, draw_lists: Vec<DrawList>) -> DrawData {
    DrawData {
        display_pos: Vec2::ZERO,
        display_size: size,
        framebuffer_scale: Vec2::ONE,
        draw_lists,
    }
}

pub const FULL_CLIP: [f32; 4] = [0.0, 0.0, 800.0, 600.0];
