//! Engine configuration
//!
//! All tunable limits and resource locations live in [`UniverseConfig`].
//! Configurations are plain serde types loadable from TOML through the
//! [`Config`] trait.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Configuration trait: TOML load/save for serde types
pub trait Config: Serialize + DeserializeOwned + Default {
    /// Load configuration from a TOML file
    fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        if !path.ends_with(".toml") {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        }
        let contents = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Save configuration to a TOML file
    fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        if !path.ends_with(".toml") {
            return Err(ConfigError::UnsupportedFormat(path.to_string()));
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?;
        std::fs::write(path, contents).map_err(ConfigError::Io)
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialize(String),

    /// Unsupported file format
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Limits and resource locations for a [`crate::Universe`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniverseConfig {
    /// Maximum product nesting level (root products are level 0)
    pub max_product_level: u32,

    /// Light-unit budget; lowered at initialization if the backend
    /// reports fewer hardware units
    pub max_light_units: u32,

    /// Minimum accepted world viewport dimension in pixels
    pub world_size_min: u32,

    /// Maximum accepted world viewport dimension in pixels
    pub world_size_max: u32,

    /// Directory searched for mesh files
    pub meshes_dir: String,

    /// Directory searched for texture files
    pub textures_dir: String,

    /// Subdirectory prefix for diffuse textures
    pub texture_prefix_diffuse: String,

    /// Subdirectory prefix for interface textures
    pub texture_prefix_interface: String,

    /// Subdirectory prefix for normal-map textures
    pub texture_prefix_normal: String,

    /// Mesh file extension, stripped during name normalization
    pub mesh_extension: String,

    /// Texture file extension, stripped during name normalization
    pub texture_extension: String,

    /// Loading-indicator blink interval in milliseconds
    pub loading_blink_interval_ms: u64,

    /// Whether the loading indicator overlay is drawn at all
    pub show_loading_overlay: bool,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            max_product_level: 8,
            max_light_units: 8,
            world_size_min: 16,
            world_size_max: 16_384,
            meshes_dir: "meshes".to_string(),
            textures_dir: "textures".to_string(),
            texture_prefix_diffuse: "d/".to_string(),
            texture_prefix_interface: "i/".to_string(),
            texture_prefix_normal: "n/".to_string(),
            mesh_extension: "obj".to_string(),
            texture_extension: "png".to_string(),
            loading_blink_interval_ms: 300,
            show_loading_overlay: true,
        }
    }
}

impl UniverseConfig {
    /// Set the mesh search directory
    pub fn with_meshes_dir(mut self, dir: impl Into<String>) -> Self {
        self.meshes_dir = dir.into();
        self
    }

    /// Set the texture search directory
    pub fn with_textures_dir(mut self, dir: impl Into<String>) -> Self {
        self.textures_dir = dir.into();
        self
    }

    /// Set the maximum product nesting level
    pub fn with_max_product_level(mut self, level: u32) -> Self {
        self.max_product_level = level;
        self
    }

    /// Set the light-unit budget
    pub fn with_max_light_units(mut self, units: u32) -> Self {
        self.max_light_units = units;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_light_units == 0 {
            return Err("at least one light unit is required".to_string());
        }
        if self.world_size_min >= self.world_size_max {
            return Err(format!(
                "world size bounds are inverted: {} >= {}",
                self.world_size_min, self.world_size_max
            ));
        }
        if self.loading_blink_interval_ms == 0 {
            return Err("loading blink interval must be non-zero".to_string());
        }
        Ok(())
    }
}

impl Config for UniverseConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(UniverseConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_world_bounds_rejected() {
        let config = UniverseConfig {
            world_size_min: 100,
            world_size_max: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let path = std::env::temp_dir().join("orrery_config_test.toml");
        let path_str = path.to_str().unwrap();

        let config = UniverseConfig::default().with_max_product_level(5);
        config.save_to_file(path_str).unwrap();

        let loaded = UniverseConfig::load_from_file(path_str).unwrap();
        assert_eq!(loaded.max_product_level, 5);
        assert_eq!(loaded.meshes_dir, config.meshes_dir);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_non_toml_extension_rejected() {
        assert!(matches!(
            UniverseConfig::load_from_file("config.yaml"),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
