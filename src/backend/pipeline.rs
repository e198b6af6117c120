// Pipeline builder
//
// One pipeline layout shared by every pipeline: descriptor set 0 holds a
// texture and a sampler for the fragment stage, plus a 16-byte block of
// root constants (scale + translate) visible to all stages. Pipelines are
// created lazily per colour-attachment format and cached.

use std::collections::HashMap;

use super::buffer::FrameVertex;
use super::Renderer;
use crate::hal::*;

/// Two `vec2`s: projection scale and translate.
pub(crate) const ROOT_CONSTANTS_SIZE: u32 = 16;

const VERTEX_STREAMS: [VertexStreamDesc; 1] = [VertexStreamDesc {
    binding: 0,
    stride: std::mem::size_of::<FrameVertex>() as u32,
}];

const VERTEX_ATTRIBUTES: [VertexAttributeDesc; 3] = [
    VertexAttributeDesc {
        semantic: "POSITION",
        location: 0,
        offset: 0,
        format: Format::Rg32Sfloat,
        stream: 0,
    },
    VertexAttributeDesc {
        semantic: "TEXCOORD",
        location: 1,
        offset: 8,
        format: Format::Rg16Unorm,
        stream: 0,
    },
    VertexAttributeDesc {
        semantic: "COLOR",
        location: 2,
        offset: 12,
        format: Format::Rgba8Unorm,
        stream: 0,
    },
];

pub(crate) fn pipeline_layout_desc() -> PipelineLayoutDesc {
    PipelineLayoutDesc {
        descriptor_sets: vec![DescriptorSetDesc {
            register_space: 0,
            ranges: vec![
                DescriptorRangeDesc {
                    base_register: 0,
                    count: 1,
                    kind: DescriptorKind::Texture,
                    stages: ShaderStages::Fragment,
                },
                DescriptorRangeDesc {
                    base_register: 0,
                    count: 1,
                    kind: DescriptorKind::Sampler,
                    stages: ShaderStages::Fragment,
                },
            ],
        }],
        root_constants: vec![RootConstantDesc {
            register: 0,
            size: ROOT_CONSTANTS_SIZE,
            stages: ShaderStages::All,
        }],
    }
}

fn color_attachment(format: Format) -> ColorAttachmentDesc {
    ColorAttachmentDesc {
        format,
        color_write_mask: COLOR_WRITE_RGBA,
        blend_enabled: true,
        color_blend: BlendingDesc {
            src_factor: BlendFactor::SrcAlpha,
            dst_factor: BlendFactor::OneMinusSrcAlpha,
            op: BlendOp::Add,
        },
        alpha_blend: BlendingDesc {
            src_factor: BlendFactor::OneMinusSrcAlpha,
            dst_factor: BlendFactor::Zero,
            op: BlendOp::Add,
        },
    }
}

/// Pipelines by colour-attachment format. Never evicts.
#[derive(Debug, Default)]
pub(crate) struct PipelineCache {
    pipelines: HashMap<Format, Pipeline>,
}

impl PipelineCache {
    pub fn get(&self, format: Format) -> Option<Pipeline> {
        self.pipelines.get(&format).copied()
    }

    pub fn insert(&mut self, format: Format, pipeline: Pipeline) {
        self.pipelines.insert(format, pipeline);
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    pub fn destroy_all(&mut self, device: &impl Device) {
        for (_, pipeline) in self.pipelines.drain() {
            device.destroy_pipeline(pipeline);
        }
    }
}

impl<D: Device> Renderer<D> {
    /// Build a pipeline rendering into a colour attachment of `format`.
    ///
    /// Reports `Unsupported` without touching the device when no bytecode
    /// exists for the device's API.
    pub fn create_pipeline(&self, format: Format) -> Option<Pipeline> {
        if self.objects.layout.is_null() {
            log::warn!("Cannot create a pipeline without a pipeline layout");
            return None;
        }

        let api = self.ctx.device.graphics_api();
        let Some(code) = self.shaders.get(api) else {
            log::error!("No shader bytecode for {:?}", api);
            self.ctx.check_result(ResultCode::Unsupported);
            return None;
        };

        let shaders = [
            ShaderDesc {
                stage: ShaderStage::Vertex,
                bytecode: &code.vertex,
                entry_point: "main",
            },
            ShaderDesc {
                stage: ShaderStage::Fragment,
                bytecode: &code.fragment,
                entry_point: "main",
            },
        ];
        let color_attachments = [color_attachment(format)];

        let desc = GraphicsPipelineDesc {
            layout: self.objects.layout,
            vertex_streams: &VERTEX_STREAMS,
            vertex_attributes: &VERTEX_ATTRIBUTES,
            topology: Topology::TriangleList,
            rasterization: RasterizationDesc {
                fill_mode: FillMode::Solid,
                cull_mode: CullMode::None,
                front_counter_clockwise: false,
            },
            sample_count: 1,
            color_attachments: &color_attachments,
            shaders: &shaders,
        };

        let pipeline = self.ctx.check(self.ctx.device.create_graphics_pipeline(&desc))?;
        log::info!("Created GUI pipeline for {:?}", format);
        Some(pipeline)
    }

    /// Cached pipeline for `format`, created on first use.
    pub(crate) fn pipeline_for(&mut self, format: Format) -> Option<Pipeline> {
        if let Some(pipeline) = self.pipelines.get(format) {
            return Some(pipeline);
        }
        let pipeline = self.create_pipeline(format)?;
        self.pipelines.insert(format, pipeline);
        Some(pipeline)
    }
}
