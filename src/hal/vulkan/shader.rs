// Shader module loading
//
// Vulkan consumes SPIR-V bytecode. Embedded blobs carry no alignment
// guarantee, so words are re-read through `ash::util::read_spv`.

use ash::vk;
use std::io::Cursor;

use super::VulkanDevice;
use crate::hal::{GraphicsError, GraphicsResult};

/// Create a shader module from SPIR-V bytes
pub(crate) fn create_shader_module(
    device: &VulkanDevice,
    code: &[u8],
) -> GraphicsResult<vk::ShaderModule> {
    let words = ash::util::read_spv(&mut Cursor::new(code)).map_err(|e| {
        log::error!("Invalid SPIR-V blob ({} bytes): {}", code.len(), e);
        GraphicsError::InvalidArgument
    })?;

    let create_info = vk::ShaderModuleCreateInfo::builder().code(&words);

    Ok(unsafe { device.device.create_shader_module(&create_info, None) }?)
}
