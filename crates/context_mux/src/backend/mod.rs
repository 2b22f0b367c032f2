//! # Backend Module
//!
//! Graphics backends plug into the multiplexer through [`GraphicsBackend`].
//! A backend instance is the dispatch table of one [`Context`]: the master
//! context of each backend type holds the prototype instance, and duplicates
//! hold instances produced by [`GraphicsBackend::duplicate`].
//!
//! ## Backends
//!
//! - **Raster**: immediate-mode software rasterizer presenting RGBA frames
//! - **Retained**: GL-style scene that persists between frames; its contexts
//!   share resources with one manager-owned graphics context
//! - **Hosted**: creates and owns its native graphics context, so it must be
//!   initialized on the render thread that drives it
//! - **Noop**: accepts everything and draws nothing
//!
//! ## Initialization Policy
//!
//! [`BackendTag::owns_native_context`] decides where `initialize` runs. When it
//! is `false` the manager prepares the surface and may initialize on any
//! thread ([`InitPolicy::Immediate`]). When it is `true` the backend binds its
//! own context to the creating thread, so initialization is deferred to the
//! window's render thread ([`InitPolicy::Deferred`]).

pub mod hosted;
pub mod noop;
pub mod raster;
pub mod resources;
pub mod retained;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::command_queue::CommandQueue;
use crate::context::Context;
use crate::foundation::math::{scale_point, Vec2};
use crate::platform::{
    GraphicsContextHandle, NativePlatform, NativeWindow, PlatformError, Rect, SurfaceHandle,
};

pub use hosted::HostedBackend;
pub use noop::NoopBackend;
pub use raster::RasterBackend;
pub use retained::RetainedBackend;

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// Backend type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendTag {
    /// Immediate-mode software rasterizer
    Raster,
    /// Retained GL-style backend sharing one graphics context
    Retained,
    /// Backend that creates its own native graphics context
    Hosted,
    /// Inert backend
    Noop,
}

impl BackendTag {
    /// Every compiled-in backend, in window creation order
    pub const ALL: [Self; 4] = [Self::Raster, Self::Retained, Self::Hosted, Self::Noop];

    /// Lowercase backend name
    pub const fn name(self) -> &'static str {
        match self {
            Self::Raster => "raster",
            Self::Retained => "retained",
            Self::Hosted => "hosted",
            Self::Noop => "noop",
        }
    }

    /// Whether the backend creates and binds its own native graphics context
    pub const fn owns_native_context(self) -> bool {
        matches!(self, Self::Hosted)
    }

    /// Whether windows of this backend share one manager-owned graphics context
    pub const fn requires_shared_context(self) -> bool {
        matches!(self, Self::Retained)
    }

    /// Where backend initialization must run
    pub const fn init_policy(self) -> InitPolicy {
        if self.owns_native_context() {
            InitPolicy::Deferred
        } else {
            InitPolicy::Immediate
        }
    }
}

impl fmt::Display for BackendTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Thread placement of backend initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPolicy {
    /// Manager prepares native resources and may initialize on any thread
    Immediate,
    /// Backend creates its own native resources on the render thread
    Deferred,
}

/// RGBA color with 8 bits per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    /// Red
    pub r: u8,
    /// Green
    pub g: u8,
    /// Blue
    pub b: u8,
    /// Alpha
    pub a: u8,
}

impl Color {
    /// Opaque black
    pub const BLACK: Self = Self::rgb(0, 0, 0);
    /// Opaque white
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    /// Fully transparent
    pub const TRANSPARENT: Self = Self::rgba(0, 0, 0, 0);

    /// Opaque color
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    /// Color with alpha
    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

/// Platform-independent key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyCode(pub u32);

/// Handle to a texture owned by one backend instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u64);

/// Handle to a texture atlas owned by one backend instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AtlasId(pub u64);

/// Named sub-rectangle of an atlas texture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtlasRegion {
    /// Lookup name
    pub name: String,
    /// Texel rectangle inside the atlas texture
    pub rect: Rect,
}

impl AtlasRegion {
    /// Create a named region
    pub fn new(name: impl Into<String>, rect: Rect) -> Self {
        Self { name: name.into(), rect }
    }
}

/// One textured quad
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteDraw {
    /// Source texture
    pub texture: TextureId,
    /// Texel rectangle to sample; whole texture when `None`
    pub source: Option<Rect>,
    /// Destination rectangle in framebuffer pixels
    pub dest: Rect,
    /// Multiplicative tint
    pub tint: Color,
}

impl SpriteDraw {
    /// Draw a whole texture untinted
    pub const fn new(texture: TextureId, dest: Rect) -> Self {
        Self { texture, source: None, dest, tint: Color::WHITE }
    }

    /// Sample only part of the texture
    #[must_use]
    pub const fn with_source(mut self, source: Rect) -> Self {
        self.source = Some(source);
        self
    }

    /// Apply a tint
    #[must_use]
    pub const fn with_tint(mut self, tint: Color) -> Self {
        self.tint = tint;
        self
    }
}

/// Native resources handed to [`GraphicsBackend::initialize`]
///
/// Immediate backends receive a ready surface (and a shared graphics context
/// when they need one). Deferred backends receive only the window and fill in
/// the handles they create; the manager releases them after the render thread
/// has been joined.
#[derive(Clone)]
pub struct InitTarget {
    /// Platform that owns every handle below
    pub platform: Arc<dyn NativePlatform>,
    /// Window being driven
    pub window: NativeWindow,
    /// Drawable surface of the window
    pub surface: Option<SurfaceHandle>,
    /// Graphics context bound to the surface
    pub graphics_context: Option<GraphicsContextHandle>,
    /// Manager-owned context to share resources with
    pub shared_context: Option<GraphicsContextHandle>,
    /// Framebuffer width in pixels
    pub width: u32,
    /// Framebuffer height in pixels
    pub height: u32,
}

impl fmt::Debug for InitTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitTarget")
            .field("platform", &self.platform.name())
            .field("window", &self.window)
            .field("surface", &self.surface)
            .field("graphics_context", &self.graphics_context)
            .field("shared_context", &self.shared_context)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// Called before a successful `initialize`
    #[error("{0} backend is not initialized")]
    NotInitialized(BackendTag),

    /// Initialization needs a surface the manager did not provide
    #[error("{0} backend requires a drawing surface")]
    MissingSurface(BackendTag),

    /// Initialization needs a graphics context the manager did not provide
    #[error("{0} backend requires a graphics context")]
    MissingGraphicsContext(BackendTag),

    /// Unknown texture handle
    #[error("Unknown texture {0:?}")]
    UnknownTexture(TextureId),

    /// Texture data does not match its dimensions
    #[error("Texture data has {actual} bytes, expected {expected}")]
    InvalidTexture {
        /// Bytes required by the dimensions
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },

    /// Atlas region outside its texture
    #[error("Atlas region '{0}' lies outside its texture")]
    RegionOutOfBounds(String),

    /// Driven from a thread other than the one that created the native context
    #[error("{tag} backend driven from a foreign thread")]
    ForeignThread {
        /// Offending backend
        tag: BackendTag,
    },

    /// Native layer failure
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Any other backend-specific failure
    #[error("Backend failure: {0}")]
    Failed(String),
}

/// Capability set every graphics backend provides
///
/// Methods take `&self`: a backend guards its own state, so queued actions can
/// draw through the [`Context`] while `process` is draining the queue.
pub trait GraphicsBackend: Send + Sync {
    /// Backend type
    fn tag(&self) -> BackendTag;

    /// Fresh instance with the same configuration and no native state
    fn duplicate(&self) -> Arc<dyn GraphicsBackend>;

    /// Prepare for rendering into `target`
    fn initialize(&self, ctx: &Context, target: &mut InitTarget) -> BackendResult<()>;

    /// Drop all per-window state; native handles are released by the manager
    fn cleanup(&self, ctx: &Context);

    /// Whether `initialize` has succeeded and `cleanup` has not run since
    fn is_initialized(&self) -> bool;

    /// Run one frame; `Ok(false)` asks the render loop to stop
    ///
    /// The default drains the queue and keeps running.
    fn process(&self, ctx: &Context, queue: &CommandQueue) -> BackendResult<bool> {
        let _ = ctx;
        queue.drain();
        Ok(true)
    }

    /// Framebuffer size changed
    fn resize(&self, ctx: &Context, width: u32, height: u32) -> BackendResult<()> {
        let _ = (ctx, width, height);
        Ok(())
    }

    /// Set the clear color and reset frame contents
    fn clear(&self, color: Color);

    /// Show the current frame
    fn present(&self) -> BackendResult<()>;

    /// Draw a textured quad
    fn draw_sprite(&self, sprite: &SpriteDraw) -> BackendResult<()>;

    /// Upload RGBA8 texture data
    fn add_texture(&self, width: u32, height: u32, rgba: &[u8]) -> BackendResult<TextureId>;

    /// Register named regions of a texture
    fn add_atlas(&self, texture: TextureId, regions: &[AtlasRegion]) -> BackendResult<AtlasId>;

    /// Look up an atlas region
    fn atlas_region(&self, atlas: AtlasId, name: &str) -> Option<(TextureId, Rect)>;

    /// Whether a key is held in this context's window
    fn is_key_down(&self, ctx: &Context, key: KeyCode) -> bool {
        ctx.input().is_key_down(key)
    }

    /// Pointer position in framebuffer pixels
    fn mouse_position(&self, ctx: &Context) -> Vec2 {
        scale_point(ctx.input().mouse_position(), ctx.geometry().pointer_scale)
    }
}

/// One prototype instance of every compiled-in backend
pub fn default_backends() -> Vec<Arc<dyn GraphicsBackend>> {
    vec![
        Arc::new(RasterBackend::new()),
        Arc::new(RetainedBackend::new()),
        Arc::new(HostedBackend::new()),
        Arc::new(NoopBackend::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_policy_follows_native_context_ownership() {
        for tag in BackendTag::ALL {
            let expected = if tag.owns_native_context() {
                InitPolicy::Deferred
            } else {
                InitPolicy::Immediate
            };
            assert_eq!(tag.init_policy(), expected);
        }
        assert_eq!(BackendTag::Hosted.init_policy(), InitPolicy::Deferred);
        assert!(BackendTag::Retained.requires_shared_context());
        assert!(!BackendTag::Raster.requires_shared_context());
    }

    #[test]
    fn test_default_backends_cover_every_tag() {
        let tags: Vec<_> = default_backends().iter().map(|b| b.tag()).collect();
        assert_eq!(tags, BackendTag::ALL.to_vec());
    }

    #[test]
    fn test_tag_display() {
        assert_eq!(BackendTag::Retained.to_string(), "retained");
    }
}
