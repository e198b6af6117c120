// Abstraction-layer enums to Vulkan enums

use ash::vk;

use crate::hal::*;

impl From<vk::Result> for GraphicsError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY
            | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            | vk::Result::ERROR_OUT_OF_POOL_MEMORY
            | vk::Result::ERROR_FRAGMENTED_POOL => GraphicsError::OutOfMemory,
            vk::Result::ERROR_DEVICE_LOST => GraphicsError::DeviceLost,
            vk::Result::ERROR_OUT_OF_DATE_KHR => GraphicsError::OutOfDate,
            vk::Result::ERROR_FORMAT_NOT_SUPPORTED
            | vk::Result::ERROR_FEATURE_NOT_PRESENT
            | vk::Result::ERROR_EXTENSION_NOT_PRESENT => GraphicsError::Unsupported,
            _ => GraphicsError::Failure,
        }
    }
}

pub(crate) fn format(format: Format) -> vk::Format {
    match format {
        Format::Unknown => vk::Format::UNDEFINED,
        Format::R8Unorm => vk::Format::R8_UNORM,
        Format::Rg16Unorm => vk::Format::R16G16_UNORM,
        Format::Rg32Sfloat => vk::Format::R32G32_SFLOAT,
        Format::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
        Format::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        Format::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
        Format::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        Format::Rgb10A2Unorm => vk::Format::A2B10G10R10_UNORM_PACK32,
        Format::Rgba16Sfloat => vk::Format::R16G16B16A16_SFLOAT,
    }
}

/// Inverse of [`format`], for render targets the caller created natively
pub fn format_from_vk(format: vk::Format) -> Format {
    match format {
        vk::Format::R8_UNORM => Format::R8Unorm,
        vk::Format::R16G16_UNORM => Format::Rg16Unorm,
        vk::Format::R32G32_SFLOAT => Format::Rg32Sfloat,
        vk::Format::R8G8B8A8_UNORM => Format::Rgba8Unorm,
        vk::Format::R8G8B8A8_SRGB => Format::Rgba8Srgb,
        vk::Format::B8G8R8A8_UNORM => Format::Bgra8Unorm,
        vk::Format::B8G8R8A8_SRGB => Format::Bgra8Srgb,
        vk::Format::A2B10G10R10_UNORM_PACK32 => Format::Rgb10A2Unorm,
        vk::Format::R16G16B16A16_SFLOAT => Format::Rgba16Sfloat,
        _ => Format::Unknown,
    }
}

pub(crate) fn stages(stages: ShaderStages) -> vk::ShaderStageFlags {
    match stages {
        ShaderStages::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStages::Fragment => vk::ShaderStageFlags::FRAGMENT,
        ShaderStages::All => vk::ShaderStageFlags::ALL_GRAPHICS,
    }
}

pub(crate) fn shader_stage(stage: ShaderStage) -> vk::ShaderStageFlags {
    match stage {
        ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
    }
}

pub(crate) fn descriptor_type(kind: DescriptorKind) -> vk::DescriptorType {
    match kind {
        DescriptorKind::Texture => vk::DescriptorType::SAMPLED_IMAGE,
        DescriptorKind::Sampler => vk::DescriptorType::SAMPLER,
    }
}

pub(crate) fn blend_factor(factor: BlendFactor) -> vk::BlendFactor {
    match factor {
        BlendFactor::Zero => vk::BlendFactor::ZERO,
        BlendFactor::One => vk::BlendFactor::ONE,
        BlendFactor::SrcAlpha => vk::BlendFactor::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
    }
}

pub(crate) fn blend_op(op: BlendOp) -> vk::BlendOp {
    match op {
        BlendOp::Add => vk::BlendOp::ADD,
    }
}

pub(crate) fn filter(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub(crate) fn mipmap_mode(filter: Filter) -> vk::SamplerMipmapMode {
    match filter {
        Filter::Nearest => vk::SamplerMipmapMode::NEAREST,
        Filter::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub(crate) fn address_mode(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
    }
}

pub(crate) fn polygon_mode(mode: FillMode) -> vk::PolygonMode {
    match mode {
        FillMode::Solid => vk::PolygonMode::FILL,
        FillMode::Wireframe => vk::PolygonMode::LINE,
    }
}

pub(crate) fn cull_mode(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub(crate) fn topology(topology: Topology) -> vk::PrimitiveTopology {
    match topology {
        Topology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
    }
}

pub(crate) fn sample_count(count: u32) -> vk::SampleCountFlags {
    match count {
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        _ => vk::SampleCountFlags::TYPE_1,
    }
}

pub(crate) fn index_type(index_type: IndexType) -> vk::IndexType {
    match index_type {
        IndexType::U16 => vk::IndexType::UINT16,
        IndexType::U32 => vk::IndexType::UINT32,
    }
}

pub(crate) fn buffer_usage(usage: BufferUsage) -> vk::BufferUsageFlags {
    match usage {
        BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
        BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
    }
}

pub(crate) fn memory_properties(location: MemoryLocation) -> vk::MemoryPropertyFlags {
    match location {
        MemoryLocation::Device => vk::MemoryPropertyFlags::DEVICE_LOCAL,
        MemoryLocation::HostUpload => {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        }
    }
}
