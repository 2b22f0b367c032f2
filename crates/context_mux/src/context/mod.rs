//! # Rendering Contexts
//!
//! A [`Context`] is the per-window rendering handle handed to user code. It
//! carries the backend dispatch table, window geometry, the resize callback,
//! input state, and native bindings while attached to a window.
//!
//! Contexts are pooled per backend type by the [`ContextRegistry`]: the
//! master context is created once at startup and every other context is a
//! duplicate of it. A context moves through
//! `Free -> Reserved -> Attached -> Retiring -> Free`; the last transition
//! happens only after the window's render thread has been joined, so a
//! context is never reused while a thread may still touch it.

pub mod registry;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};
use std::thread::ThreadId;

use crate::backend::{
    AtlasId, AtlasRegion, BackendResult, BackendTag, Color, GraphicsBackend, KeyCode, SpriteDraw,
    TextureId,
};
use crate::foundation::math::{Scale2, Vec2};
use crate::foundation::sync::{lock, read, write};
use crate::platform::{GraphicsContextHandle, NativeWindow, Rect, SurfaceHandle};
use crate::window::WindowData;

pub use registry::{BackendState, ContextRegistry};

/// Callback invoked with the logical client size after a resize is applied
pub type ResizeCallback = Arc<dyn Fn(u32, u32) + Send + Sync>;

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Origin of a context within its backend pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextRole {
    /// Created once per backend type at startup
    Master,
    /// Cloned from the master on demand
    Duplicate,
}

/// Pool lifecycle of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStatus {
    /// Available for a new window
    Free,
    /// Handed out, window still being created
    Reserved,
    /// Bound to a live window
    Attached,
    /// Window removed, waiting for its render thread to finish
    Retiring,
}

#[derive(Debug)]
enum Binding {
    Free,
    Reserved,
    Attached(Weak<WindowData>),
    Retiring,
}

impl Binding {
    const fn status(&self) -> ContextStatus {
        match self {
            Self::Free => ContextStatus::Free,
            Self::Reserved => ContextStatus::Reserved,
            Self::Attached(_) => ContextStatus::Attached,
            Self::Retiring => ContextStatus::Retiring,
        }
    }
}

/// Window size and scaling as seen by a context
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    /// Logical client width
    pub width: u32,
    /// Logical client height
    pub height: u32,
    /// Framebuffer pixels per logical unit
    pub scale_factor: f64,
    /// Scale applied to pointer coordinates
    pub pointer_scale: Scale2,
}

impl Geometry {
    /// Framebuffer size in pixels
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn framebuffer_size(&self) -> (u32, u32) {
        let scale = |v: u32| ((f64::from(v) * self.scale_factor).round() as u32).max(1);
        (scale(self.width), scale(self.height))
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self { width: 0, height: 0, scale_factor: 1.0, pointer_scale: Scale2::new(1.0, 1.0) }
    }
}

/// Keyboard and pointer state of the attached window
#[derive(Debug, Clone, PartialEq)]
pub struct InputState {
    keys: HashSet<KeyCode>,
    mouse: Vec2,
}

impl Default for InputState {
    fn default() -> Self {
        Self { keys: HashSet::new(), mouse: Vec2::zeros() }
    }
}

impl InputState {
    /// Whether a key is held
    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.keys.contains(&key)
    }

    /// Pointer position in logical units
    pub const fn mouse_position(&self) -> Vec2 {
        self.mouse
    }
}

/// Native handles bound to a context while it is attached
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeBindings {
    /// Window being rendered to
    pub window: Option<NativeWindow>,
    /// Drawable surface
    pub surface: Option<SurfaceHandle>,
    /// Graphics context
    pub graphics_context: Option<GraphicsContextHandle>,
}

impl NativeBindings {
    /// Whether no handle is bound
    pub const fn is_empty(&self) -> bool {
        self.window.is_none() && self.surface.is_none() && self.graphics_context.is_none()
    }
}

/// Per-window rendering handle
pub struct Context {
    serial: u64,
    role: ContextRole,
    backend: Arc<dyn GraphicsBackend>,
    geometry: Mutex<Geometry>,
    on_resize: RwLock<Option<ResizeCallback>>,
    input: Mutex<InputState>,
    binding: Mutex<Binding>,
    natives: Mutex<NativeBindings>,
    owner: Mutex<Option<ThreadId>>,
}

impl Context {
    pub(crate) fn master(backend: Arc<dyn GraphicsBackend>) -> Self {
        Self::with_role(backend, ContextRole::Master)
    }

    fn with_role(backend: Arc<dyn GraphicsBackend>, role: ContextRole) -> Self {
        Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            role,
            backend,
            geometry: Mutex::new(Geometry::default()),
            on_resize: RwLock::new(None),
            input: Mutex::new(InputState::default()),
            binding: Mutex::new(Binding::Free),
            natives: Mutex::new(NativeBindings::default()),
            owner: Mutex::new(None),
        }
    }

    /// Produce a free duplicate of this context
    ///
    /// The duplicate gets a fresh backend instance of the same type and none
    /// of this context's native bindings, owner thread, resize callback or
    /// window back-reference.
    pub fn clone_context(&self) -> Self {
        Self::with_role(self.backend.duplicate(), ContextRole::Duplicate)
    }

    /// Process-unique identifier, for logs
    pub const fn serial(&self) -> u64 {
        self.serial
    }

    /// Backend type
    pub fn tag(&self) -> BackendTag {
        self.backend.tag()
    }

    /// Master or duplicate
    pub const fn role(&self) -> ContextRole {
        self.role
    }

    /// Backend dispatch table
    pub fn backend(&self) -> &Arc<dyn GraphicsBackend> {
        &self.backend
    }

    /// Pool lifecycle state
    pub fn status(&self) -> ContextStatus {
        lock(&self.binding).status()
    }

    /// Whether the context is available for a new window
    pub fn is_free(&self) -> bool {
        self.status() == ContextStatus::Free
    }

    /// Window this context is attached to
    pub fn window(&self) -> Option<Arc<WindowData>> {
        match &*lock(&self.binding) {
            Binding::Attached(window) => window.upgrade(),
            _ => None,
        }
    }

    /// Current geometry
    pub fn geometry(&self) -> Geometry {
        *lock(&self.geometry)
    }

    /// Logical client size
    pub fn size(&self) -> (u32, u32) {
        let geometry = self.geometry();
        (geometry.width, geometry.height)
    }

    /// Framebuffer size in pixels
    pub fn framebuffer_size(&self) -> (u32, u32) {
        self.geometry().framebuffer_size()
    }

    /// Framebuffer pixels per logical unit
    pub fn scale_factor(&self) -> f64 {
        self.geometry().scale_factor
    }

    /// Register the resize callback, replacing any previous one
    pub fn set_on_resize<F>(&self, callback: F)
    where
        F: Fn(u32, u32) + Send + Sync + 'static,
    {
        *write(&self.on_resize) = Some(Arc::new(callback));
    }

    /// Remove the resize callback
    pub fn clear_on_resize(&self) {
        *write(&self.on_resize) = None;
    }

    pub(crate) fn on_resize(&self) -> Option<ResizeCallback> {
        read(&self.on_resize).clone()
    }

    /// Native handles currently bound
    pub fn natives(&self) -> NativeBindings {
        *lock(&self.natives)
    }

    /// Thread currently driving this context
    pub fn owner_thread(&self) -> Option<ThreadId> {
        *lock(&self.owner)
    }

    /// Input state of the attached window
    pub fn input(&self) -> MutexGuard<'_, InputState> {
        lock(&self.input)
    }

    /// Record a key press or release
    pub fn set_key_state(&self, key: KeyCode, down: bool) {
        let mut input = lock(&self.input);
        if down {
            input.keys.insert(key);
        } else {
            input.keys.remove(&key);
        }
    }

    /// Record the pointer position in logical units
    pub fn set_mouse_position(&self, x: f32, y: f32) {
        lock(&self.input).mouse = Vec2::new(x, y);
    }

    /// Whether a key is held
    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.backend.is_key_down(self, key)
    }

    /// Pointer position in framebuffer pixels
    pub fn mouse_position(&self) -> Vec2 {
        self.backend.mouse_position(self)
    }

    /// Clear the frame
    pub fn clear(&self, color: Color) {
        self.backend.clear(color);
    }

    /// Present the frame
    pub fn present(&self) -> BackendResult<()> {
        self.backend.present()
    }

    /// Draw a textured quad
    pub fn draw_sprite(&self, sprite: &SpriteDraw) -> BackendResult<()> {
        self.backend.draw_sprite(sprite)
    }

    /// Draw a named atlas region into `dest`
    pub fn draw_atlas_sprite(&self, atlas: AtlasId, name: &str, dest: Rect) -> BackendResult<bool> {
        match self.backend.atlas_region(atlas, name) {
            Some((texture, source)) => {
                self.backend
                    .draw_sprite(&SpriteDraw::new(texture, dest).with_source(source))?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Upload RGBA8 texture data
    pub fn add_texture(&self, width: u32, height: u32, rgba: &[u8]) -> BackendResult<TextureId> {
        self.backend.add_texture(width, height, rgba)
    }

    /// Register named regions of a texture
    pub fn add_atlas(&self, texture: TextureId, regions: &[AtlasRegion]) -> BackendResult<AtlasId> {
        self.backend.add_atlas(texture, regions)
    }

    pub(crate) fn try_reserve(&self) -> bool {
        let mut binding = lock(&self.binding);
        if matches!(*binding, Binding::Free) {
            *binding = Binding::Reserved;
            true
        } else {
            false
        }
    }

    pub(crate) fn attach(&self, window: &Arc<WindowData>, natives: NativeBindings) {
        *lock(&self.natives) = natives;
        *lock(&self.binding) = Binding::Attached(Arc::downgrade(window));
    }

    pub(crate) fn set_natives(&self, natives: NativeBindings) {
        *lock(&self.natives) = natives;
    }

    /// Detach from a removed window; the context stays unavailable until released
    pub(crate) fn detach(&self) {
        *lock(&self.binding) = Binding::Retiring;
    }

    /// Return the context to its pool with all per-window state reset
    pub(crate) fn release(&self) {
        *lock(&self.natives) = NativeBindings::default();
        *lock(&self.owner) = None;
        *lock(&self.geometry) = Geometry::default();
        *lock(&self.input) = InputState::default();
        *write(&self.on_resize) = None;
        *lock(&self.binding) = Binding::Free;
    }

    pub(crate) fn set_owner(&self, owner: Option<ThreadId>) {
        *lock(&self.owner) = owner;
    }

    pub(crate) fn set_geometry(&self, width: u32, height: u32, scale_factor: f64) {
        *lock(&self.geometry) = Geometry {
            width,
            height,
            scale_factor,
            pointer_scale: Scale2::new(scale_factor, scale_factor),
        };
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("serial", &self.serial)
            .field("tag", &self.tag())
            .field("role", &self.role)
            .field("status", &self.status())
            .field("geometry", &self.geometry())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{NoopBackend, RasterBackend};
    use approx::assert_relative_eq;

    #[test]
    fn test_clone_resets_per_window_state() {
        let master = Context::master(Arc::new(RasterBackend::new()));
        master.set_natives(NativeBindings {
            window: Some(NativeWindow(1)),
            surface: Some(SurfaceHandle(2)),
            graphics_context: None,
        });
        master.set_owner(Some(std::thread::current().id()));
        master.set_on_resize(|_, _| {});
        master.set_geometry(320, 200, 2.0);

        let duplicate = master.clone_context();
        assert_eq!(duplicate.role(), ContextRole::Duplicate);
        assert_eq!(duplicate.tag(), BackendTag::Raster);
        assert!(duplicate.natives().is_empty());
        assert_eq!(duplicate.owner_thread(), None);
        assert!(duplicate.on_resize().is_none());
        assert!(duplicate.is_free());
        assert_ne!(duplicate.serial(), master.serial());
        assert!(!Arc::ptr_eq(duplicate.backend(), master.backend()));
    }

    #[test]
    fn test_reserve_is_exclusive() {
        let ctx = Context::master(Arc::new(NoopBackend::new()));
        assert!(ctx.try_reserve());
        assert!(!ctx.try_reserve());
        assert_eq!(ctx.status(), ContextStatus::Reserved);

        ctx.detach();
        assert!(!ctx.try_reserve());
        ctx.release();
        assert!(ctx.try_reserve());
    }

    #[test]
    fn test_release_clears_bindings() {
        let ctx = Context::master(Arc::new(NoopBackend::new()));
        ctx.try_reserve();
        ctx.set_natives(NativeBindings { window: Some(NativeWindow(9)), ..Default::default() });
        ctx.set_on_resize(|_, _| {});
        ctx.set_key_state(KeyCode(32), true);

        ctx.release();
        assert!(ctx.natives().is_empty());
        assert!(ctx.on_resize().is_none());
        assert!(!ctx.is_key_down(KeyCode(32)));
        assert!(ctx.is_free());
    }

    #[test]
    fn test_mouse_position_follows_scale() {
        let ctx = Context::master(Arc::new(NoopBackend::new()));
        ctx.set_geometry(100, 100, 2.0);
        ctx.set_mouse_position(10.0, 15.0);

        let pos = ctx.mouse_position();
        assert_relative_eq!(pos.x, 20.0);
        assert_relative_eq!(pos.y, 30.0);
        assert_eq!(ctx.framebuffer_size(), (200, 200));
    }

    #[test]
    fn test_key_state() {
        let ctx = Context::master(Arc::new(NoopBackend::new()));
        ctx.set_key_state(KeyCode(65), true);
        assert!(ctx.is_key_down(KeyCode(65)));
        ctx.set_key_state(KeyCode(65), false);
        assert!(!ctx.is_key_down(KeyCode(65)));
    }
}
