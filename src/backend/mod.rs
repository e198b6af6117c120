// Renderer backend - draws GUI output through the graphics abstraction layer
//
// Lifecycle: `Renderer::init` registers the backend on a GUI context and
// creates the objects with no per-frame cost (pipeline layout, sampler,
// descriptor pool). Pipelines, font texture and frame buffers follow
// lazily. `Renderer::shutdown` releases everything and unregisters.

pub mod buffer;
pub mod context;
pub mod fonts;
pub mod pipeline;
pub mod render;
pub mod shader;

pub use buffer::{grow_capacity, FrameVertex};
pub use context::{BackendContext, CheckResultFn};
pub use shader::{ShaderBytecode, ShaderLibrary};

use std::sync::Arc;

use crate::config::RendererConfig;
use crate::gui::{BackendId, GuiContext};
use crate::hal::*;

use buffer::FrameRing;
use fonts::{FontResources, TextureRegistry};
use pipeline::PipelineCache;

/// Name the backend registers on the GUI context.
pub const BACKEND_RENDERER_NAME: &str = "nri_imgui_renderer";

/// Everything `Renderer::init` needs.
pub struct InitInfo<D: Device> {
    pub device: Arc<D>,
    pub queue: CommandQueue,
    pub check_result_fn: Option<CheckResultFn>,
    pub config: RendererConfig,
    pub shaders: ShaderLibrary,
}

impl<D: Device> InitInfo<D> {
    pub fn new(device: Arc<D>, queue: CommandQueue) -> Self {
        Self {
            device,
            queue,
            check_result_fn: None,
            config: RendererConfig::default(),
            shaders: ShaderLibrary::embedded(),
        }
    }

    pub fn with_check_result_fn(mut self, check: impl Fn(ResultCode) + 'static) -> Self {
        self.check_result_fn = Some(Box::new(check));
        self
    }

    pub fn with_config(mut self, config: RendererConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `shaders` instead of the bytecode compiled into the crate.
    pub fn with_shaders(mut self, shaders: ShaderLibrary) -> Self {
        self.shaders = shaders;
        self
    }
}

/// Objects created once and shared by every frame. Null until created.
#[derive(Debug, Default)]
pub(crate) struct DeviceObjects {
    pub layout: PipelineLayout,
    pub sampler: Sampler,
    pub descriptor_pool: DescriptorPool,
}

pub struct Renderer<D: Device> {
    ctx: BackendContext<D>,
    config: RendererConfig,
    shaders: ShaderLibrary,
    objects: DeviceObjects,
    pipelines: PipelineCache,
    fonts: Option<FontResources>,
    textures: TextureRegistry,
    frames: FrameRing,
    min_image_count: u32,
    shut_down: bool,
}

impl<D: Device> Renderer<D> {
    /// Create the backend and register it on `gui`.
    ///
    /// # Panics
    /// If `gui` already has a renderer backend, or `info.queue` is null.
    pub fn init(gui: &mut GuiContext, info: InitInfo<D>) -> Self {
        assert!(
            gui.io.backend_renderer.is_none(),
            "Already initialized a renderer backend!"
        );
        assert!(!info.queue.is_null(), "Renderer backend needs a command queue");

        let min_image_count = info.config.frames.min_image_count;
        assert!(min_image_count >= 2, "min_image_count must be at least 2");

        let ctx = BackendContext::new(info.device, info.queue, info.check_result_fn);
        log::info!(
            "Initializing GUI renderer backend for {:?}",
            ctx.device.graphics_api()
        );

        let mut renderer = Self {
            ctx,
            config: info.config,
            shaders: info.shaders,
            objects: DeviceObjects::default(),
            pipelines: PipelineCache::default(),
            fonts: None,
            textures: TextureRegistry::default(),
            frames: FrameRing::new(min_image_count),
            min_image_count,
            shut_down: false,
        };

        gui.io.backend_renderer = Some(renderer.ctx.id);
        gui.io.backend_renderer_name = Some(BACKEND_RENDERER_NAME);

        // Failures are reported; new_frame retries
        renderer.create_device_objects();
        renderer
    }

    /// Release every device object and unregister from `gui`.
    ///
    /// # Panics
    /// If `gui` does not have this renderer registered.
    pub fn shutdown(mut self, gui: &mut GuiContext) {
        assert!(
            gui.io.backend_renderer == Some(self.ctx.id),
            "No renderer backend to shutdown, or already shutdown?"
        );

        log::info!("Shutting down GUI renderer backend");
        self.destroy_device_objects();
        gui.fonts.tex_id = crate::gui::TextureId::NONE;
        gui.io.backend_renderer = None;
        gui.io.backend_renderer_name = None;
        self.shut_down = true;
    }

    /// Prepare for a new GUI frame: recreate missing objects and bring the
    /// font atlas up to date.
    ///
    /// # Panics
    /// If this renderer is not the one registered on `gui`.
    pub fn new_frame(&mut self, gui: &mut GuiContext) {
        assert!(
            gui.io.backend_renderer == Some(self.ctx.id),
            "Context or backend not initialized! Did you call Renderer::init()?"
        );

        self.create_device_objects();
        self.ensure_fonts_texture(gui);
    }

    /// Change how many frames may be in flight.
    ///
    /// Waits for the queue to go idle and drops every per-frame buffer
    /// when the count changes.
    pub fn set_min_image_count(&mut self, min_image_count: u32) {
        assert!(min_image_count >= 2, "min_image_count must be at least 2");
        if min_image_count == self.min_image_count {
            return;
        }

        log::info!(
            "Frame ring: {} -> {} slots",
            self.min_image_count,
            min_image_count
        );
        self.ctx.check(self.ctx.device.wait_for_idle(self.ctx.queue));
        self.frames.destroy_all(&*self.ctx.device);
        self.frames = FrameRing::new(min_image_count);
        self.min_image_count = min_image_count;
    }

    pub fn id(&self) -> BackendId {
        self.ctx.id
    }

    pub fn device(&self) -> &Arc<D> {
        &self.ctx.device
    }

    pub fn queue(&self) -> CommandQueue {
        self.ctx.queue
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    pub fn min_image_count(&self) -> u32 {
        self.min_image_count
    }

    /// Number of pipelines created so far (one per colour format).
    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Vertex and index capacity, in elements, of every frame slot.
    pub fn frame_buffer_capacities(&self) -> Vec<(usize, usize)> {
        self.frames
            .iter()
            .map(|f| (f.vertex.capacity, f.index.capacity))
            .collect()
    }

    /// Create whichever shared objects are missing. Returns whether all exist.
    pub(crate) fn create_device_objects(&mut self) -> bool {
        let device = &*self.ctx.device;

        if self.objects.layout.is_null() {
            if let Some(layout) = self
                .ctx
                .check(device.create_pipeline_layout(&pipeline::pipeline_layout_desc()))
            {
                self.objects.layout = layout;
            }
        }

        if self.objects.sampler.is_null() {
            let filter = self.config.sampler_filter();
            if let Some(sampler) = self.ctx.check(device.create_sampler(&SamplerDesc {
                mag_filter: filter,
                min_filter: filter,
                mip_filter: filter,
                address_u: AddressMode::Repeat,
                address_v: AddressMode::Repeat,
                address_w: AddressMode::Repeat,
            })) {
                self.objects.sampler = sampler;
            }
        }

        if self.objects.descriptor_pool.is_null() {
            let size = self.config.textures.descriptor_pool_size;
            if let Some(pool) = self.ctx.check(device.create_descriptor_pool(&DescriptorPoolDesc {
                max_sets: size,
                texture_max_num: size,
                sampler_max_num: size,
            })) {
                self.objects.descriptor_pool = pool;
            }
        }

        !self.objects.layout.is_null()
            && !self.objects.sampler.is_null()
            && !self.objects.descriptor_pool.is_null()
    }

    /// Release everything in dependency order after the queue went idle.
    fn destroy_device_objects(&mut self) {
        let anything_alive = self.fonts.is_some()
            || !self.textures.is_empty()
            || !self.pipelines.is_empty()
            || self.frames.iter().any(|f| !f.vertex.buffer.is_null() || !f.index.buffer.is_null())
            || !self.objects.layout.is_null()
            || !self.objects.sampler.is_null()
            || !self.objects.descriptor_pool.is_null();
        if !anything_alive {
            return;
        }

        self.ctx.check(self.ctx.device.wait_for_idle(self.ctx.queue));

        // Fonts first; their set is also in the registry
        self.release_fonts();
        let device = &*self.ctx.device;
        for set in self.textures.drain() {
            device.free_descriptor_set(self.objects.descriptor_pool, set);
        }

        self.frames.destroy_all(device);
        self.pipelines.destroy_all(device);

        let objects = std::mem::take(&mut self.objects);
        if !objects.descriptor_pool.is_null() {
            device.destroy_descriptor_pool(objects.descriptor_pool);
        }
        if !objects.sampler.is_null() {
            device.destroy_sampler(objects.sampler);
        }
        if !objects.layout.is_null() {
            device.destroy_pipeline_layout(objects.layout);
        }
    }
}

impl<D: Device> Drop for Renderer<D> {
    fn drop(&mut self) {
        if !self.shut_down {
            log::warn!("GUI renderer dropped without shutdown(), releasing its device objects");
            self.destroy_device_objects();
        }
    }
}
