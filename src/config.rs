// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::backend::{ProgramBuilder, ShaderStage};

/// Root configuration structure
#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "OpenGL".to_string(),
            width: 800,
            height: 600,
            resizable: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Requested core-profile version as [major, minor]
    pub gl_version: [u8; 2],
    pub clear_color: [f32; 4],
    pub vsync: bool,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            gl_version: [4, 1],
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vsync: true,
        }
    }
}

/// Shader sources and build policy
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
    pub geometry: Option<PathBuf>,
    /// Treat a failed shader build as fatal instead of drawing with it
    pub fail_on_error: bool,
    /// Rebuild the program when a shader file changes
    pub hot_reload: bool,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/vertex.glsl"),
            fragment: PathBuf::from("shaders/fragment.glsl"),
            geometry: None,
            fail_on_error: false,
            hot_reload: true,
        }
    }
}

impl ShaderConfig {
    /// Builder for the configured stages, in pipeline order.
    pub fn program_builder(&self) -> ProgramBuilder {
        let mut builder = ProgramBuilder::new().stage(ShaderStage::Vertex, &self.vertex);
        if let Some(geometry) = &self.geometry {
            builder = builder.stage(ShaderStage::Geometry, geometry);
        }
        builder.stage(ShaderStage::Fragment, &self.fragment)
    }
}

/// Debug settings
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Default log filter when RUST_LOG is unset
    pub log_level: String,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_to_file: false,
            log_file: "gl_sandbox.log".to_string(),
            show_fps: false,
        }
    }
}

impl Config {
    /// Load config.toml from the working directory.
    ///
    /// Runs before logging exists, so a load failure is handed back for the
    /// caller to report once the logger is up.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        Self::load_or_default("config.toml")
    }

    /// Load from `path`, falling back to defaults on any error
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, Option<anyhow::Error>) {
        match Self::load_from_path(path) {
            Ok(config) => (config, None),
            Err(e) => (Config::default(), Some(e)),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }
}
