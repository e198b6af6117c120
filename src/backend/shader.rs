// Shader library - precompiled bytecode per graphics API
//
// The blobs live in shaders/ next to their sources: SPIR-V for Vulkan and
// shader model 5.0 DXBC, which both D3D11 and D3D12 accept.

use std::borrow::Cow;
use std::collections::HashMap;

use crate::hal::GraphicsApi;

const SPIRV_VS: &[u8] = include_bytes!("../../shaders/imgui.vert.spv");
const SPIRV_FS: &[u8] = include_bytes!("../../shaders/imgui.frag.spv");
const DXBC_VS: &[u8] = include_bytes!("../../shaders/imgui_vs.dxbc");
const DXBC_PS: &[u8] = include_bytes!("../../shaders/imgui_ps.dxbc");

/// Vertex and fragment bytecode for one API. Both entry points are `main`.
#[derive(Debug, Clone)]
pub struct ShaderBytecode {
    pub vertex: Cow<'static, [u8]>,
    pub fragment: Cow<'static, [u8]>,
}

#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    entries: HashMap<GraphicsApi, ShaderBytecode>,
}

impl ShaderLibrary {
    /// Bytecode compiled into this crate
    pub fn embedded() -> Self {
        Self::empty()
            .with_api(GraphicsApi::Vulkan, SPIRV_VS, SPIRV_FS)
            .with_api(GraphicsApi::D3D12, DXBC_VS, DXBC_PS)
            .with_api(GraphicsApi::D3D11, DXBC_VS, DXBC_PS)
    }

    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Add or replace the bytecode used for `api`.
    pub fn with_api(
        mut self,
        api: GraphicsApi,
        vertex: impl Into<Cow<'static, [u8]>>,
        fragment: impl Into<Cow<'static, [u8]>>,
    ) -> Self {
        self.entries.insert(
            api,
            ShaderBytecode {
                vertex: vertex.into(),
                fragment: fragment.into(),
            },
        );
        self
    }

    /// Bytecode for `api`, or `None` if either stage is missing.
    pub fn get(&self, api: GraphicsApi) -> Option<&ShaderBytecode> {
        self.entries
            .get(&api)
            .filter(|code| !code.vertex.is_empty() && !code.fragment.is_empty())
    }
}

impl Default for ShaderLibrary {
    fn default() -> Self {
        Self::embedded()
    }
}
