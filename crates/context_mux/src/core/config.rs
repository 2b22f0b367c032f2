//! # Multiplexer Configuration
//!
//! Everything the manager needs to realize windows: how many windows each
//! backend gets, whether they dock into a shared container, default window
//! geometry and the render-loop frame cap.
//!
//! All types are serde-serializable and load from TOML or RON through the
//! [`Config`] trait.

use serde::{Serialize, Deserialize};
use std::time::Duration;

use crate::backend::BackendTag;
use crate::config::{Config, ConfigError};

/// Requested number of windows per backend type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowCounts {
    /// Immediate-mode software rasterizer windows
    pub raster: usize,
    /// Retained GL-style windows (share one graphics context)
    pub retained: usize,
    /// Windows whose backend hosts its own native graphics context
    pub hosted: usize,
    /// Inert windows that never draw
    pub noop: usize,
}

impl WindowCounts {
    /// Requested count for one backend
    pub const fn count(&self, tag: BackendTag) -> usize {
        match tag {
            BackendTag::Raster => self.raster,
            BackendTag::Retained => self.retained,
            BackendTag::Hosted => self.hosted,
            BackendTag::Noop => self.noop,
        }
    }

    /// Set the requested count for one backend
    pub fn set(&mut self, tag: BackendTag, count: usize) {
        match tag {
            BackendTag::Raster => self.raster = count,
            BackendTag::Retained => self.retained = count,
            BackendTag::Hosted => self.hosted = count,
            BackendTag::Noop => self.noop = count,
        }
    }

    /// Builder form of [`WindowCounts::set`]
    #[must_use]
    pub fn with(mut self, tag: BackendTag, count: usize) -> Self {
        self.set(tag, count);
        self
    }

    /// Total requested windows across all backends
    pub const fn total(&self) -> usize {
        self.raster + self.retained + self.hosted + self.noop
    }

    /// Backends with a non-zero count, in creation order
    pub fn requested(&self) -> impl Iterator<Item = (BackendTag, usize)> + '_ {
        BackendTag::ALL
            .into_iter()
            .map(|tag| (tag, self.count(tag)))
            .filter(|(_, count)| *count > 0)
    }
}

/// Default geometry for undocked windows
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Client width in pixels
    pub width: u32,
    /// Client height in pixels
    pub height: u32,
    /// Prefix for generated window titles
    pub title_prefix: String,
    /// Screen offset between successive undocked windows
    pub cascade_offset: i32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            title_prefix: "Context".to_string(),
            cascade_offset: 32,
        }
    }
}

/// Parent container layout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Container window title
    pub title: String,
    /// Initial width of one grid cell
    pub cell_width: u32,
    /// Initial height of one grid cell
    pub cell_height: u32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            title: "Context Multiplexer".to_string(),
            cell_width: 480,
            cell_height: 360,
        }
    }
}

/// Render-loop pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderLoopConfig {
    /// Fixed sleep between render-loop iterations in milliseconds
    pub frame_interval_ms: u64,
}

impl Default for RenderLoopConfig {
    fn default() -> Self {
        Self { frame_interval_ms: 16 }
    }
}

/// # Multiplexer Configuration
///
/// Top-level settings for a [`crate::MultiContextManager`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplexerConfig {
    /// Windows to create on bulk initialization
    pub windows: WindowCounts,
    /// Dock windows into a shared parent container
    pub parented: bool,
    /// Undocked window defaults
    pub window: WindowConfig,
    /// Parent container layout
    pub container: ContainerConfig,
    /// Render-loop pacing
    pub render: RenderLoopConfig,
    /// Fallback log filter when `RUST_LOG` is unset
    pub log_level: String,
}

impl MultiplexerConfig {
    /// Create a configuration with defaults
    pub fn new() -> Self {
        Self {
            windows: WindowCounts::default().with(BackendTag::Raster, 1),
            parented: false,
            window: WindowConfig::default(),
            container: ContainerConfig::default(),
            render: RenderLoopConfig::default(),
            log_level: "info".to_string(),
        }
    }

    /// Set requested window counts
    #[must_use]
    pub fn with_windows(mut self, windows: WindowCounts) -> Self {
        self.windows = windows;
        self
    }

    /// Enable or disable the parent container
    #[must_use]
    pub fn with_parented(mut self, parented: bool) -> Self {
        self.parented = parented;
        self
    }

    /// Set the render-loop frame interval
    #[must_use]
    pub fn with_frame_interval_ms(mut self, interval_ms: u64) -> Self {
        self.render.frame_interval_ms = interval_ms;
        self
    }

    /// Set the grid cell size of the parent container
    #[must_use]
    pub fn with_cell_size(mut self, width: u32, height: u32) -> Self {
        self.container.cell_width = width;
        self.container.cell_height = height;
        self
    }

    /// Set the log level
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Fixed render-loop sleep interval
    pub const fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.render.frame_interval_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid("window size must be non-zero".to_string()));
        }
        if self.container.cell_width == 0 || self.container.cell_height == 0 {
            return Err(ConfigError::Invalid("container cell size must be non-zero".to_string()));
        }
        if self.render.frame_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "frame interval must be at least 1ms".to_string(),
            ));
        }
        if self.render.frame_interval_ms > 1000 {
            return Err(ConfigError::Invalid(format!(
                "frame interval of {}ms is below one frame per second",
                self.render.frame_interval_ms
            )));
        }
        Ok(())
    }
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl Config for MultiplexerConfig {}
