//! Backend that owns its native graphics context
//!
//! Creates its surface (when the manager did not supply one) and a private
//! graphics context during `initialize`, and binds that context to the
//! initializing thread. All later frames must run on the same thread, which
//! is why this backend's initialization is deferred to the render thread.

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

struct OwnedTarget {
    platform: Arc<dyn NativePlatform>,
    context: GraphicsContextHandle,
    thread: ThreadId,
}

#[derive(Default)]
struct HostedState {
    target: Option<OwnedTarget>,
    frame_ops: usize,
    last_frame_ops: usize,
    clear_color: Color,
    resources: ResourceTable,
    frames: u64,
}

/// Self-hosting backend bound to one thread
pub struct HostedBackend {
    state: Mutex<HostedState>,
}

impl HostedBackend {
    /// Create an uninitialized backend
    pub fn new() -> Self {
        Self { state: Mutex::new(HostedState::default()) }
    }

    /// Thread the native context is bound to
    pub fn bound_thread(&self) -> Option<ThreadId> {
        lock(&self.state).target.as_ref().map(|t| t.thread)
    }

    /// Draw calls issued during the last completed frame
    pub fn last_frame_ops(&self) -> usize {
        lock(&self.state).last_frame_ops
    }

    /// Frames swapped since initialization
    pub fn frames_presented(&self) -> u64 {
        lock(&self.state).frames
    }

    fn owned_context(
        state: &HostedState,
    ) -> BackendResult<(Arc<dyn NativePlatform>, GraphicsContextHandle)> {
        let target = state
            .target
            .as_ref()
            .ok_or(BackendError::NotInitialized(BackendTag::Hosted))?;
        if target.thread != thread::current().id() {
            return Err(BackendError::ForeignThread { tag: BackendTag::Hosted });
        }
        Ok((Arc::clone(&target.platform), target.context))
    }
}

impl Default for HostedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsBackend for HostedBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Hosted
    }

    fn duplicate(&self) -> Arc<dyn GraphicsBackend> {
        Arc::new(Self::new())
    }

    fn initialize(&self, _ctx: &Context, target: &mut InitTarget) -> BackendResult<()> {
        let platform = Arc::clone(&target.platform);

        let surface = match target.surface {
            Some(surface) => surface,
            None => {
                let surface = platform.create_surface(target.window)?;
                target.surface = Some(surface);
                surface
            }
        };

        let context = platform.create_graphics_context(surface, None)?;
        target.graphics_context = Some(context);
        platform.make_current(context)?;

        let thread = thread::current().id();
        lock(&self.state).target = Some(OwnedTarget { platform, context, thread });
        log::debug!("Hosted backend bound {:?} to {:?}", context, thread);
        Ok(())
    }

    fn cleanup(&self, _ctx: &Context) {
        *lock(&self.state) = HostedState::default();
    }

    fn is_initialized(&self) -> bool {
        lock(&self.state).target.is_some()
    }

    fn process(&self, _ctx: &Context, queue: &CommandQueue) -> BackendResult<bool> {
        {
            let mut state = lock(&self.state);
            Self::owned_context(&state)?;
            state.frame_ops = 0;
        }

        queue.drain();

        self.present()?;
        Ok(true)
    }

    fn clear(&self, color: Color) {
        let mut state = lock(&self.state);
        state.clear_color = color;
        state.frame_ops = 0;
    }

    fn present(&self) -> BackendResult<()> {
        let (platform, context) = Self::owned_context(&lock(&self.state))?;
        platform.swap_buffers(context)?;

        let mut state = lock(&self.state);
        state.last_frame_ops = state.frame_ops;
        state.frames += 1;
        Ok(())
    }

    fn draw_sprite(&self, sprite: &SpriteDraw) -> BackendResult<()> {
        let mut state = lock(&self.state);
        state.resources.texture_size(sprite.texture)?;
        state.frame_ops += 1;
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

    fn bare_target(platform: &Arc<HeadlessPlatform>) -> InitTarget {
        let window = platform
            .create_window(&WindowDesc::top_level("hosted", Default::default(), 16, 16))
            .unwrap();
        InitTarget {
            platform: platform.clone(),
            window,
            surface: None,
            graphics_context: None,
            shared_context: None,
            width: 16,
            height: 16,
        }
    }

    #[test]
    fn test_initialize_creates_and_reports_native_resources() {
        let platform = Arc::new(HeadlessPlatform::new());
        let mut target = bare_target(&platform);
        let backend = HostedBackend::new();
        let ctx = Context::master(Arc::new(HostedBackend::new()));

        backend.initialize(&ctx, &mut target).unwrap();

        let surface = target.surface.unwrap();
        let context = target.graphics_context.unwrap();
        assert!(platform.is_surface_alive(surface));
        assert!(platform.is_context_alive(context));
        assert_eq!(platform.context_share(context), None);
        assert_eq!(backend.bound_thread(), Some(thread::current().id()));
    }

    #[test]
    fn test_frames_counted_per_frame() {
        let platform = Arc::new(HeadlessPlatform::new());
        let mut target = bare_target(&platform);
        let backend = Arc::new(HostedBackend::new());
        let ctx = Context::master(Arc::new(HostedBackend::new()));
        backend.initialize(&ctx, &mut target).unwrap();

        let texture = backend.add_texture(1, 1, &[0; 4]).unwrap();
        let queue = CommandQueue::new();
        for _ in 0..3 {
            let backend = Arc::clone(&backend);
            queue.enqueue(move || {
                backend
                    .draw_sprite(&SpriteDraw::new(texture, Rect::new(0, 0, 1, 1)))
                    .unwrap();
            });
        }

        backend.process(&ctx, &queue).unwrap();
        assert_eq!(backend.last_frame_ops(), 3);
        backend.process(&ctx, &queue).unwrap();
        assert_eq!(backend.last_frame_ops(), 0);
        assert_eq!(backend.frames_presented(), 2);
    }

    #[test]
    fn test_process_from_foreign_thread_fails() {
        let platform = Arc::new(HeadlessPlatform::new());
        let mut target = bare_target(&platform);
        let backend = Arc::new(HostedBackend::new());
        let ctx = Arc::new(Context::master(Arc::new(HostedBackend::new())));
        backend.initialize(&ctx, &mut target).unwrap();

        let remote = Arc::clone(&backend);
        let remote_ctx = Arc::clone(&ctx);
        let result = thread::spawn(move || remote.process(&remote_ctx, &CommandQueue::new()))
            .join()
            .unwrap();
        assert!(matches!(result, Err(BackendError::ForeignThread { tag: BackendTag::Hosted })));
    }

    #[test]
    fn test_context_creation_failure_still_reports_surface() {
        let platform = Arc::new(HeadlessPlatform::new());
        platform.set_failures(crate::platform::headless::FailurePlan {
            graphics_contexts: true,
            ..Default::default()
        });
        let mut target = bare_target(&platform);
        let backend = HostedBackend::new();
        let ctx = Context::master(Arc::new(HostedBackend::new()));

        assert!(backend.initialize(&ctx, &mut target).is_err());
        assert!(target.surface.is_some());
        assert!(target.graphics_context.is_none());
        assert!(!backend.is_initialized());
    }
}
