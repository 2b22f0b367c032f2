//! Retained-mode backend on a shared graphics context
//!
//! Sprites submitted through the context accumulate in a scene that survives
//! between frames until the next `clear`. Each window gets its own graphics
//! context, created by the manager on the window's surface and sharing
//! resources with one manager-owned context. The context is made current
//! lazily on whichever thread first processes a frame.

use std::sync::{Arc, Mutex};
use std::thread::{self, ThreadId};

use super::resources::ResourceTable;
use super::{
    AtlasId, AtlasRegion, BackendError, BackendResult, BackendTag, Color, GraphicsBackend,
    InitTarget, SpriteDraw, TextureId,
};
use crate::command_queue::CommandQueue;
use crate::context::Context;
use crate::foundation::sync::lock;
use crate::platform::{GraphicsContextHandle, NativePlatform, Rect};

struct GlTarget {
    platform: Arc<dyn NativePlatform>,
    context: GraphicsContextHandle,
    shared: Option<GraphicsContextHandle>,
    current_on: Option<ThreadId>,
}

#[derive(Default)]
struct RetainedState {
    target: Option<GlTarget>,
    scene: Vec<SpriteDraw>,
    clear_color: Color,
    viewport: (u32, u32),
    resources: ResourceTable,
    frames: u64,
}

/// Retained scene renderer
pub struct RetainedBackend {
    state: Mutex<RetainedState>,
}

impl RetainedBackend {
    /// Create an uninitialized backend
    pub fn new() -> Self {
        Self { state: Mutex::new(RetainedState::default()) }
    }

    /// Sprites currently in the scene
    pub fn scene_len(&self) -> usize {
        lock(&self.state).scene.len()
    }

    /// Viewport in framebuffer pixels
    pub fn viewport(&self) -> (u32, u32) {
        lock(&self.state).viewport
    }

    /// Frames swapped since initialization
    pub fn frames_presented(&self) -> u64 {
        lock(&self.state).frames
    }

    /// Context this backend shares resources with
    pub fn shared_context(&self) -> Option<GraphicsContextHandle> {
        lock(&self.state).target.as_ref().and_then(|t| t.shared)
    }

    fn swap_locked(state: &mut RetainedState) -> BackendResult<()> {
        let target = state
            .target
            .as_mut()
            .ok_or(BackendError::NotInitialized(BackendTag::Retained))?;

        let caller = thread::current().id();
        if target.current_on != Some(caller) {
            target.platform.make_current(target.context)?;
            target.current_on = Some(caller);
        }
        target.platform.swap_buffers(target.context)?;
        state.frames += 1;
        Ok(())
    }
}

impl Default for RetainedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for RetainedBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Retained
    }

    fn duplicate(&self) -> Arc<dyn GraphicsBackend> {
        Arc::new(Self::new())
    }

    fn initialize(&self, _ctx: &Context, target: &mut InitTarget) -> BackendResult<()> {
        let context = target
            .graphics_context
            .ok_or(BackendError::MissingGraphicsContext(BackendTag::Retained))?;

        let mut state = lock(&self.state);
        state.viewport = (target.width, target.height);
        state.target = Some(GlTarget {
            platform: Arc::clone(&target.platform),
            context,
            shared: target.shared_context,
            current_on: None,
        });
        log::debug!(
            "Retained backend initialized on {:?} sharing {:?}",
            context,
            target.shared_context
        );
        Ok(())
    }

    fn cleanup(&self, _ctx: &Context) {
        *lock(&self.state) = RetainedState::default();
    }

    fn is_initialized(&self) -> bool {
        lock(&self.state).target.is_some()
    }

    fn process(&self, _ctx: &Context, queue: &CommandQueue) -> BackendResult<bool> {
        if !self.is_initialized() {
            return Err(BackendError::NotInitialized(BackendTag::Retained));
        }

        queue.drain();

        Self::swap_locked(&mut lock(&self.state))?;
        Ok(true)
    }

    fn resize(&self, _ctx: &Context, width: u32, height: u32) -> BackendResult<()> {
        lock(&self.state).viewport = (width, height);
        Ok(())
    }

    fn clear(&self, color: Color) {
        let mut state = lock(&self.state);
        state.clear_color = color;
        state.scene.clear();
    }

    fn present(&self) -> BackendResult<()> {
        Self::swap_locked(&mut lock(&self.state))
    }

    fn draw_sprite(&self, sprite: &SpriteDraw) -> BackendResult<()> {
        let mut state = lock(&self.state);
        state.resources.texture_size(sprite.texture)?;
        state.scene.push(*sprite);
        Ok(())
    }

    fn add_texture(&self, width: u32, height: u32, rgba: &[u8]) -> BackendResult<TextureId> {
        ResourceTable::check_rgba(width, height, rgba)?;
        Ok(lock(&self.state).resources.register_texture(width, height))
    }

    fn add_atlas(&self, texture: TextureId, regions: &[AtlasRegion]) -> BackendResult<AtlasId> {
        lock(&self.state).resources.register_atlas(texture, regions)
    }

    fn atlas_region(&self, atlas: AtlasId, name: &str) -> Option<(TextureId, Rect)> {
        lock(&self.state).resources.atlas_region(atlas, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::headless::HeadlessPlatform;
    use crate::platform::WindowDesc;

    fn target_for(platform: &Arc<HeadlessPlatform>) -> InitTarget {
        let window = platform
            .create_window(&WindowDesc::top_level("retained", Default::default(), 16, 16))
            .unwrap();
        let shared_window = platform.create_window(&WindowDesc::hidden("shared")).unwrap();
        let shared_surface = platform.create_surface(shared_window).unwrap();
        let shared = platform.create_graphics_context(shared_surface, None).unwrap();

        let surface = platform.create_surface(window).unwrap();
        let context = platform.create_graphics_context(surface, Some(shared)).unwrap();
        InitTarget {
            platform: platform.clone(),
            window,
            surface: Some(surface),
            graphics_context: Some(context),
            shared_context: Some(shared),
            width: 16,
            height: 16,
        }
    }

    #[test]
    fn test_initialize_requires_graphics_context() {
        let platform = Arc::new(HeadlessPlatform::new());
        let mut target = target_for(&platform);
        target.graphics_context = None;

        let backend = RetainedBackend::new();
        let ctx = Context::master(Arc::new(RetainedBackend::new()));
        assert!(matches!(
            backend.initialize(&ctx, &mut target),
            Err(BackendError::MissingGraphicsContext(BackendTag::Retained))
        ));
    }

    #[test]
    fn test_scene_persists_until_clear() {
        let platform = Arc::new(HeadlessPlatform::new());
        let mut target = target_for(&platform);
        let context = target.graphics_context.unwrap();
        let backend = RetainedBackend::new();
        let ctx = Context::master(Arc::new(RetainedBackend::new()));
        backend.initialize(&ctx, &mut target).unwrap();
        assert_eq!(backend.shared_context(), target.shared_context);

        let texture = backend.add_texture(1, 1, &[255; 4]).unwrap();
        backend
            .draw_sprite(&SpriteDraw::new(texture, Rect::new(0, 0, 4, 4)))
            .unwrap();

        let queue = CommandQueue::new();
        backend.process(&ctx, &queue).unwrap();
        backend.process(&ctx, &queue).unwrap();
        assert_eq!(backend.scene_len(), 1);
        assert_eq!(backend.frames_presented(), 2);
        assert_eq!(platform.context_swaps(context), 2);

        backend.clear(Color::WHITE);
        assert_eq!(backend.scene_len(), 0);
    }

    #[test]
    fn test_unknown_texture_is_rejected() {
        let backend = RetainedBackend::new();
        assert!(matches!(
            backend.draw_sprite(&SpriteDraw::new(TextureId(7), Rect::new(0, 0, 1, 1))),
            Err(BackendError::UnknownTexture(TextureId(7)))
        ));
    }
}
