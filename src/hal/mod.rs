// Graphics abstraction layer - the interface this renderer draws through
//
// A thin dispatch table in the spirit of NRI: opaque handles, plain-data
// descriptors and two traits. `Device` creates and destroys objects and
// exposes the few queue operations the renderer needs; `CommandRecorder`
// is a command buffer the caller is currently recording.
//
// Implementations:
// - `headless`: in-process device that hands out handles and logs calls
// - `vulkan`:   ash-backed device (feature "vulkan")

pub mod headless;
#[cfg(feature = "vulkan")]
pub mod vulkan;

use thiserror::Error;

macro_rules! handles {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {$(
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name(pub u64);

        impl $name {
            pub const NULL: Self = Self(0);

            pub fn is_null(self) -> bool {
                self.0 == 0
            }
        }
    )*};
}

handles!(
    /// Queue that work is submitted to and that can be waited on.
    CommandQueue,
    /// Resource-binding shape shared by pipelines.
    PipelineLayout,
    /// Compiled graphics pipeline state.
    Pipeline,
    Sampler,
    Texture,
    /// Shader-visible view of a texture.
    TextureView,
    Buffer,
    /// Device memory backing a buffer or texture.
    Memory,
    DescriptorPool,
    /// Bound group of shader-visible resources.
    DescriptorSet,
);

/// Native API the abstraction layer dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GraphicsApi {
    None,
    D3D11,
    D3D12,
    Vulkan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Unknown,
    R8Unorm,
    Rg16Unorm,
    Rg32Sfloat,
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    Rgb10A2Unorm,
    Rgba16Sfloat,
}

impl Format {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Format::Unknown => 0,
            Format::R8Unorm => 1,
            Format::Rg16Unorm | Format::Rgba8Unorm | Format::Rgba8Srgb => 4,
            Format::Bgra8Unorm | Format::Bgra8Srgb | Format::Rgb10A2Unorm => 4,
            Format::Rg32Sfloat | Format::Rgba16Sfloat => 8,
        }
    }
}

// =============================================================================
// RESULT CODES
// =============================================================================

/// Every outcome a graphics-layer call can report, success included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    Failure,
    InvalidArgument,
    OutOfMemory,
    Unsupported,
    DeviceLost,
    OutOfDate,
}

impl ResultCode {
    pub fn of<T>(result: &GraphicsResult<T>) -> Self {
        match result {
            Ok(_) => ResultCode::Success,
            Err(e) => (*e).into(),
        }
    }

    pub fn is_success(self) -> bool {
        self == ResultCode::Success
    }
}

/// Non-success result of a graphics-layer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum GraphicsError {
    #[error("graphics call failed")]
    Failure,
    #[error("invalid argument passed to graphics call")]
    InvalidArgument,
    #[error("out of memory")]
    OutOfMemory,
    #[error("operation unsupported by the active graphics API")]
    Unsupported,
    #[error("device lost")]
    DeviceLost,
    #[error("object out of date")]
    OutOfDate,
}

impl From<GraphicsError> for ResultCode {
    fn from(error: GraphicsError) -> Self {
        match error {
            GraphicsError::Failure => ResultCode::Failure,
            GraphicsError::InvalidArgument => ResultCode::InvalidArgument,
            GraphicsError::OutOfMemory => ResultCode::OutOfMemory,
            GraphicsError::Unsupported => ResultCode::Unsupported,
            GraphicsError::DeviceLost => ResultCode::DeviceLost,
            GraphicsError::OutOfDate => ResultCode::OutOfDate,
        }
    }
}

pub type GraphicsResult<T> = Result<T, GraphicsError>;

// =============================================================================
// DESCRIPTORS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStages {
    Vertex,
    Fragment,
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    Texture,
    Sampler,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorRangeDesc {
    pub base_register: u32,
    pub count: u32,
    pub kind: DescriptorKind,
    pub stages: ShaderStages,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorSetDesc {
    pub register_space: u32,
    pub ranges: Vec<DescriptorRangeDesc>,
}

/// Small constant block pushed with the command stream (push/root constants).
#[derive(Debug, Clone, PartialEq)]
pub struct RootConstantDesc {
    pub register: u32,
    pub size: u32,
    pub stages: ShaderStages,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineLayoutDesc {
    pub descriptor_sets: Vec<DescriptorSetDesc>,
    pub root_constants: Vec<RootConstantDesc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Clone, Copy)]
pub struct ShaderDesc<'a> {
    pub stage: ShaderStage,
    pub bytecode: &'a [u8],
    pub entry_point: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexStreamDesc {
    pub binding: u32,
    pub stride: u32,
}

/// Vertex attribute annotated for every API: D3D matches on `semantic`,
/// Vulkan on `location`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttributeDesc {
    pub semantic: &'static str,
    pub location: u32,
    pub offset: u32,
    pub format: Format,
    pub stream: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topology {
    TriangleList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FillMode {
    Solid,
    Wireframe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterizationDesc {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendFactor {
    Zero,
    One,
    SrcAlpha,
    OneMinusSrcAlpha,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendOp {
    Add,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendingDesc {
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub op: BlendOp,
}

pub const COLOR_WRITE_RGBA: u8 = 0b1111;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorAttachmentDesc {
    pub format: Format,
    pub color_write_mask: u8,
    pub blend_enabled: bool,
    pub color_blend: BlendingDesc,
    pub alpha_blend: BlendingDesc,
}

#[derive(Debug, Clone, Copy)]
pub struct GraphicsPipelineDesc<'a> {
    pub layout: PipelineLayout,
    pub vertex_streams: &'a [VertexStreamDesc],
    pub vertex_attributes: &'a [VertexAttributeDesc],
    pub topology: Topology,
    pub rasterization: RasterizationDesc,
    pub sample_count: u32,
    pub color_attachments: &'a [ColorAttachmentDesc],
    pub shaders: &'a [ShaderDesc<'a>],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Repeat,
    ClampToEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplerDesc {
    pub mag_filter: Filter,
    pub min_filter: Filter,
    pub mip_filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub width: u32,
    pub height: u32,
    pub mip_num: u32,
    pub format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureViewDesc {
    pub texture: Texture,
    pub format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex,
    Index,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryLocation {
    /// GPU-local memory; filled through queue uploads.
    Device,
    /// CPU-writable memory visible to the GPU.
    HostUpload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Buffer(Buffer),
    Texture(Texture),
}

#[derive(Debug, Clone, Copy)]
pub struct TextureUploadDesc<'a> {
    pub texture: Texture,
    pub width: u32,
    pub height: u32,
    pub format: Format,
    /// Tightly packed rows of `width * format.bytes_per_pixel()` bytes.
    pub pixels: &'a [u8],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorPoolDesc {
    pub max_sets: u32,
    pub texture_max_num: u32,
    pub sampler_max_num: u32,
}

/// New contents for the texture + sampler slots of a descriptor set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSetUpdate {
    pub texture_view: TextureView,
    pub sampler: Sampler,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

/// Integer rectangle in framebuffer pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawIndexedDesc {
    pub index_num: u32,
    pub instance_num: u32,
    pub base_index: u32,
    pub base_vertex: i32,
    pub base_instance: u32,
}

// =============================================================================
// ENTRY POINTS
// =============================================================================

/// The fixed set of device entry points the renderer calls.
///
/// Creation calls return the graphics-layer result; destruction calls are
/// infallible. Implementations are used from a single thread at a time.
pub trait Device {
    /// Native API this device dispatches to.
    fn graphics_api(&self) -> GraphicsApi;

    fn create_pipeline_layout(&self, desc: &PipelineLayoutDesc) -> GraphicsResult<PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: PipelineLayout);

    fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc<'_>) -> GraphicsResult<Pipeline>;
    fn destroy_pipeline(&self, pipeline: Pipeline);

    fn create_sampler(&self, desc: &SamplerDesc) -> GraphicsResult<Sampler>;
    fn destroy_sampler(&self, sampler: Sampler);

    fn create_texture(&self, desc: &TextureDesc) -> GraphicsResult<Texture>;
    fn destroy_texture(&self, texture: Texture);

    fn create_texture_view(&self, desc: &TextureViewDesc) -> GraphicsResult<TextureView>;
    fn destroy_texture_view(&self, view: TextureView);

    fn create_buffer(&self, desc: &BufferDesc) -> GraphicsResult<Buffer>;
    fn destroy_buffer(&self, buffer: Buffer);

    /// Allocate memory suitable for `resource` and bind it.
    fn allocate_and_bind_memory(
        &self,
        location: MemoryLocation,
        resource: Resource,
    ) -> GraphicsResult<Memory>;
    fn free_memory(&self, memory: Memory);

    /// Copy `data` into a host-visible buffer at `offset` bytes.
    fn write_buffer(&self, buffer: Buffer, offset: u64, data: &[u8]) -> GraphicsResult<()>;

    /// Fill a device-local texture through `queue`; returns once the copy completed.
    fn upload_texture(&self, queue: CommandQueue, desc: &TextureUploadDesc<'_>) -> GraphicsResult<()>;

    fn create_descriptor_pool(&self, desc: &DescriptorPoolDesc) -> GraphicsResult<DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: DescriptorPool);

    fn allocate_descriptor_set(
        &self,
        pool: DescriptorPool,
        layout: PipelineLayout,
        set_index: u32,
    ) -> GraphicsResult<DescriptorSet>;
    fn free_descriptor_set(&self, pool: DescriptorPool, set: DescriptorSet);
    fn update_descriptor_set(&self, set: DescriptorSet, update: &DescriptorSetUpdate);

    /// Block until every submission on `queue` has completed.
    fn wait_for_idle(&self, queue: CommandQueue) -> GraphicsResult<()>;
}

/// A command buffer in the recording state, inside a render pass whose
/// single colour attachment has `color_attachment_format()`.
pub trait CommandRecorder {
    fn color_attachment_format(&self) -> Format;

    fn set_pipeline_layout(&mut self, layout: PipelineLayout);
    fn set_pipeline(&mut self, pipeline: Pipeline);
    fn set_descriptor_set(&mut self, set_index: u32, set: DescriptorSet);
    fn set_root_constants(&mut self, index: u32, data: &[u8]);
    fn set_index_buffer(&mut self, buffer: Buffer, offset: u64, index_type: IndexType);
    fn set_vertex_buffers(&mut self, base_slot: u32, buffers: &[Buffer], offsets: &[u64]);
    fn set_viewports(&mut self, viewports: &[Viewport]);
    fn set_scissors(&mut self, rects: &[Rect]);
    fn draw_indexed(&mut self, desc: &DrawIndexedDesc);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_code_reflects_outcome() {
        let ok: GraphicsResult<u32> = Ok(3);
        let err: GraphicsResult<u32> = Err(GraphicsError::OutOfMemory);

        assert_eq!(ResultCode::of(&ok), ResultCode::Success);
        assert_eq!(ResultCode::of(&err), ResultCode::OutOfMemory);
        assert!(!ResultCode::of(&err).is_success());
    }

    #[test]
    fn null_handles() {
        assert!(Pipeline::NULL.is_null());
        assert!(Pipeline::default().is_null());
        assert!(!DescriptorSet(7).is_null());
    }
}
