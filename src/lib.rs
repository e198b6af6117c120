//! Renderer backend for an immediate-mode GUI, drawing through a thin
//! graphics abstraction layer.
//!
//! The GUI library produces [`gui::DrawData`] every frame; [`Renderer`]
//! uploads it into per-frame buffers and records indexed draws on a
//! [`hal::CommandRecorder`]. Device objects are created through a
//! [`hal::Device`], which the `vulkan` feature implements with `ash` and
//! [`hal::headless`] implements without a GPU.
//!
//! ```no_run
//! use std::sync::Arc;
//! use nri_imgui_renderer::gui::GuiContext;
//! use nri_imgui_renderer::hal::headless::{HeadlessDevice, RecordingCommandBuffer};
//! use nri_imgui_renderer::hal::{Format, GraphicsApi};
//! use nri_imgui_renderer::{InitInfo, Renderer};
//!
//! let device = Arc::new(HeadlessDevice::new(GraphicsApi::Vulkan));
//! let mut gui = GuiContext::new();
//! let mut renderer = Renderer::init(&mut gui, InitInfo::new(device.clone(), device.queue()));
//!
//! renderer.new_frame(&mut gui);
//! let draw_data = Default::default();
//! let mut cmd = RecordingCommandBuffer::new(Format::Bgra8Unorm);
//! renderer.render_draw_data(&draw_data, &mut cmd);
//!
//! renderer.shutdown(&mut gui);
//! ```

pub mod backend;
pub mod config;
pub mod gui;
pub mod hal;

pub use backend::{
    CheckResultFn, FrameVertex, InitInfo, Renderer, ShaderLibrary, BACKEND_RENDERER_NAME,
};
pub use config::RendererConfig;
