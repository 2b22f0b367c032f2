//! # Context Mux
//!
//! Multiplexes heterogeneous graphics backends across one or many windows,
//! each driven by its own dedicated render thread.
//!
//! ## Features
//!
//! - **Context Pooling**: One master context per backend, cloned on demand and
//!   recycled between windows
//! - **Thread-Per-Window**: Every window owns a render loop and a command queue
//! - **Resize Coalescing**: Resize storms collapse into a single final apply
//! - **Docking**: Windows tile inside a shared parent container and can be
//!   dragged out of it and back in
//! - **Failure Isolation**: A broken backend leaves an inert window instead of
//!   taking the process down
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use context_mux::prelude::*;
//!
//! fn main() -> Result<(), MuxError> {
//!     let platform = Arc::new(HeadlessPlatform::new());
//!     let manager = MultiContextManager::new(platform, MultiplexerConfig::default());
//!
//!     let counts = WindowCounts::default().with(BackendTag::Raster, 3);
//!     manager.initialize(&counts, true)?;
//!
//!     for id in manager.window_ids() {
//!         manager.enqueue_with_context(id, |ctx| ctx.clear(Color::BLACK))?;
//!     }
//!
//!     manager.stop_all();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core configuration
pub mod core;
pub mod config;

// Low-level utilities
pub mod foundation;

// Multiplexer building blocks
pub mod backend;
pub mod command_queue;
pub mod context;
pub mod platform;
pub mod telemetry;
pub mod window;

// Orchestration
pub mod manager;
mod render_thread;

#[cfg(test)]
mod tests;

pub use manager::{MultiContextManager, MuxError};

/// Common imports for multiplexer users
pub mod prelude {
    pub use crate::{
        backend::{
            AtlasId, AtlasRegion, BackendError, BackendTag, Color, GraphicsBackend, InitPolicy,
            KeyCode, SpriteDraw, TextureId,
        },
        command_queue::CommandQueue,
        context::{Context, ContextRegistry},
        core::config::{MultiplexerConfig, WindowCounts},
        manager::{MultiContextManager, MuxError},
        platform::{headless::HeadlessPlatform, NativePlatform, Point, Rect, WindowStyle},
        telemetry::{CountingTelemetry, LogTelemetry, TelemetrySink},
        window::{resize::ResizeRequest, WindowData, WindowId},
    };
}
