//! # Core Module
//!
//! Shared settings types used by the manager, the render threads and the
//! demo driver.
//!
//! ## Organization
//!
//! - **Config**: Multiplexer configuration (window counts, layout, pacing)

pub mod config;

// Re-export commonly used config types
pub use config::{
    MultiplexerConfig,
    WindowCounts,
    WindowConfig,
    ContainerConfig,
    RenderLoopConfig,
};
pub use crate::config::{Config, ConfigError, ConfigFormat};
