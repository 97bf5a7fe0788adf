// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section and key is optional; anything missing falls back to the
// defaults below.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::Path;

/// Root configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
    pub camera: CameraConfig,
}

/// Window settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "visor".to_string(),
            width: 1500,
            height: 1200,
        }
    }
}

/// Present modes the swapchain may ask for.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    Immediate,
    Mailbox,
    Fifo,
    FifoRelaxed,
}

impl From<PresentMode> for vk::PresentModeKHR {
    fn from(mode: PresentMode) -> Self {
        match mode {
            PresentMode::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentMode::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentMode::Fifo => vk::PresentModeKHR::FIFO,
            PresentMode::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
        }
    }
}

/// Colour formats the swapchain may ask for.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SwapchainFormat {
    R8g8b8a8Unorm,
    R8g8b8a8Srgb,
    B8g8r8a8Unorm,
    B8g8r8a8Srgb,
}

impl From<SwapchainFormat> for vk::Format {
    fn from(format: SwapchainFormat) -> Self {
        match format {
            SwapchainFormat::R8g8b8a8Unorm => vk::Format::R8G8B8A8_UNORM,
            SwapchainFormat::R8g8b8a8Srgb => vk::Format::R8G8B8A8_SRGB,
            SwapchainFormat::B8g8r8a8Unorm => vk::Format::B8G8R8A8_UNORM,
            SwapchainFormat::B8g8r8a8Srgb => vk::Format::B8G8R8A8_SRGB,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GraphicsConfig {
    /// Preferred mode; FIFO (vsync) when the surface lacks it.
    pub present_mode: PresentMode,
    /// Preferred format; the surface's first format when unsupported.
    pub swapchain_format: SwapchainFormat,
    /// Requested swapchain images, clamped to what the surface allows.
    pub image_count: u32,
    pub clear_color: [f32; 4],
    pub depth_write: bool,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: PresentMode::Mailbox,
            swapchain_format: SwapchainFormat::R8g8b8a8Unorm,
            image_count: 2,
            clear_color: [0.2, 0.5, 0.8, 1.0],
            depth_write: true,
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honoured in builds with debug assertions.
    pub validation_layers: bool,
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_level: "info".to_string(),
        }
    }
}

impl DebugConfig {
    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

/// Camera and fly-through controls
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CameraConfig {
    pub fov: f32,
    /// World units per second.
    pub move_speed: f32,
    /// Radians per pixel of mouse motion.
    pub mouse_sensitivity: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov: 1.2,
            move_speed: 3.0,
            mouse_sensitivity: 0.004,
        }
    }
}

impl Config {
    /// Load `config.toml`, falling back to defaults if it is unusable.
    ///
    /// Logging is usually configured from the result, so the failure is
    /// handed back for the caller to report instead of being logged here.
    pub fn load() -> (Self, Option<anyhow::Error>) {
        Self::load_or_default("config.toml")
    }

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

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
