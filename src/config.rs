// =============================================================================
// CONFIGURATION - Load renderer settings from a TOML file
// =============================================================================
//
// Buffer sizing, descriptor pool size, sampler filtering and frame ring
// depth. Every field has a default, so a partial (or missing) file works.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::hal::Filter;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RendererConfig {
    pub buffers: BufferConfig,
    pub textures: TextureConfig,
    pub frames: FrameConfig,
}

/// Minimum per-frame buffer capacities, in elements
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BufferConfig {
    pub min_vertex_capacity: usize,
    pub min_index_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            min_vertex_capacity: 5000,
            min_index_capacity: 10000,
        }
    }
}

/// Texture binding settings
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TextureConfig {
    /// Descriptor sets available for the font atlas and user textures
    pub descriptor_pool_size: u32,
    pub sampler_filter: String,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            descriptor_pool_size: 64,
            sampler_filter: "linear".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct FrameConfig {
    /// Frames that may be in flight at once (>= 2)
    pub min_image_count: u32,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self { min_image_count: 2 }
    }
}

impl RendererConfig {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("imgui_renderer.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load imgui_renderer.toml: {:#}. Using defaults.", e);
            RendererConfig::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(RendererConfig::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Sampler filter as a graphics-layer enum
    pub fn sampler_filter(&self) -> Filter {
        match self.textures.sampler_filter.to_lowercase().as_str() {
            "linear" => Filter::Linear,
            "nearest" => Filter::Nearest,
            _ => {
                log::warn!(
                    "Unknown sampler filter '{}', defaulting to linear",
                    self.textures.sampler_filter
                );
                Filter::Linear
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config = RendererConfig::from_toml_str(
            r#"
            [buffers]
            min_vertex_capacity = 128

            [textures]
            sampler_filter = "Nearest"
            "#,
        )
        .unwrap();

        assert_eq!(config.buffers.min_vertex_capacity, 128);
        assert_eq!(config.buffers.min_index_capacity, 10000);
        assert_eq!(config.textures.descriptor_pool_size, 64);
        assert_eq!(config.frames.min_image_count, 2);
        assert_eq!(config.sampler_filter(), Filter::Nearest);
    }

    #[test]
    fn unknown_filter_falls_back_to_linear() {
        let mut config = RendererConfig::default();
        config.textures.sampler_filter = "bicubic".into();
        assert_eq!(config.sampler_filter(), Filter::Linear);
    }

    #[test]
    fn missing_file_uses_defaults() {
        let config = RendererConfig::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn malformed_file_is_an_error() {
        assert!(RendererConfig::from_toml_str("[frames]\nmin_image_count = \"two\"").is_err());
    }
}
