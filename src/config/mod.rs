//! Configuration management for wlframe
//!
//! This module handles loading, parsing, and validating configuration
//! from TOML files. It covers the renderer background, the simulated
//! output, and the frame-loop simulation driven by the `wlframe` binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::output::Transform;
use crate::renderer::DEFAULT_CLEAR_COLOR;

/// Main configuration struct containing all wlframe settings
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct FrameConfig {
    /// Renderer settings
    #[serde(default)]
    pub renderer: RendererConfig,

    /// Headless output used by the simulator
    #[serde(default)]
    pub output: OutputConfig,

    /// Frame-loop simulation
    #[serde(default)]
    pub simulation: SimulationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RendererConfig {
    /// Background color as RGBA, each component in 0.0-1.0
    #[serde(default = "RendererConfig::default_clear_color")]
    pub clear_color: [f32; 4],
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputConfig {
    /// Mode width (pixels)
    pub width: i32,

    /// Mode height (pixels)
    pub height: i32,

    /// Scale factor
    #[serde(default = "OutputConfig::default_scale")]
    pub scale: f32,

    /// Output transform ("normal", "rotated90", "flipped180", ...)
    #[serde(default)]
    pub transform: Transform,

    /// Number of buffers in the simulated swapchain
    #[serde(default = "OutputConfig::default_buffer_count")]
    pub buffer_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationConfig {
    /// Number of frames to run
    #[serde(default = "SimulationConfig::default_frames")]
    pub frames: u32,

    /// Number of surfaces drawn each frame
    #[serde(default = "SimulationConfig::default_surfaces")]
    pub surfaces: u32,

    /// Size of each surface (pixels)
    #[serde(default = "SimulationConfig::default_surface_size")]
    pub surface_size: i32,

    /// Surfaces that redraw on every frame, starting from the first
    #[serde(default = "SimulationConfig::default_animated")]
    pub animated_surfaces: u32,

    /// Frame on which the simulated output changes its mode (0 = never)
    #[serde(default)]
    pub mode_change_at: u32,
}

impl RendererConfig {
    fn default_clear_color() -> [f32; 4] {
        DEFAULT_CLEAR_COLOR
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: Self::default_clear_color(),
        }
    }
}

impl OutputConfig {
    fn default_scale() -> f32 {
        1.0
    }
    fn default_buffer_count() -> usize {
        2
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
            scale: Self::default_scale(),
            transform: Transform::Normal,
            buffer_count: Self::default_buffer_count(),
        }
    }
}

impl SimulationConfig {
    fn default_frames() -> u32 {
        120
    }
    fn default_surfaces() -> u32 {
        4
    }
    fn default_surface_size() -> i32 {
        256
    }
    fn default_animated() -> u32 {
        1
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frames: Self::default_frames(),
            surfaces: Self::default_surfaces(),
            surface_size: Self::default_surface_size(),
            animated_surfaces: Self::default_animated(),
            mode_change_at: 0,
        }
    }
}

/// Expands a leading `~` to the home directory
fn expand_home(path: &Path) -> Result<PathBuf> {
    if path.to_string_lossy().starts_with('~') {
        let home = std::env::var("HOME").context("Failed to get HOME environment variable")?;
        Ok(Path::new(&home).join(path.strip_prefix("~").unwrap_or(path)))
    } else {
        Ok(path.to_path_buf())
    }
}

impl FrameConfig {
    /// Load configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let expanded_path = expand_home(path.as_ref())?;

        let contents = fs::read_to_string(&expanded_path)
            .with_context(|| format!("Failed to read config file: {}", expanded_path.display()))?;

        let config: FrameConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", expanded_path.display()))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self
            .renderer
            .clear_color
            .iter()
            .any(|c| !(0.0..=1.0).contains(c))
        {
            anyhow::bail!("Invalid clear_color: components must be between 0.0 and 1.0");
        }

        if self.output.width <= 0 || self.output.height <= 0 {
            anyhow::bail!(
                "Invalid output size {}x{}: must be positive",
                self.output.width,
                self.output.height
            );
        }

        if !(self.output.scale > 0.0 && self.output.scale <= 10.0) {
            anyhow::bail!("Invalid scale: must be between 0.0 and 10.0");
        }

        if !(1..=8).contains(&self.output.buffer_count) {
            anyhow::bail!("Invalid buffer_count: must be between 1 and 8");
        }

        if self.simulation.surface_size <= 0 {
            anyhow::bail!("Invalid surface_size: must be positive");
        }

        if self.simulation.animated_surfaces > self.simulation.surfaces {
            anyhow::bail!(
                "Invalid animated_surfaces: {} exceeds surfaces ({})",
                self.simulation.animated_surfaces,
                self.simulation.surfaces
            );
        }

        Ok(())
    }

    /// Save configuration to a TOML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(path, contents).context("Failed to write configuration file")?;

        Ok(())
    }
}
