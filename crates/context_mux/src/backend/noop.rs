//! Inert backend
//!
//! Accepts every call and draws nothing. Also stands in for windows whose
//! real backend failed to initialize: its `process` discards queued work
//! instead of running it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{
    AtlasId, AtlasRegion, BackendResult, BackendTag, Color, GraphicsBackend, InitTarget,
    SpriteDraw, TextureId,
};
use crate::command_queue::CommandQueue;
use crate::context::Context;
use crate::platform::Rect;

/// Backend that renders nothing
#[derive(Debug, Default)]
pub struct NoopBackend {
    next_id: AtomicU64,
}

impl NoopBackend {
    /// Create a new inert backend
    pub const fn new() -> Self {
        Self { next_id: AtomicU64::new(0) }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl GraphicsBackend for NoopBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Noop
    }

    fn duplicate(&self) -> Arc<dyn GraphicsBackend> {
        Arc::new(Self::new())
    }

    fn initialize(&self, _ctx: &Context, _target: &mut InitTarget) -> BackendResult<()> {
        Ok(())
    }

    fn cleanup(&self, _ctx: &Context) {}

    fn is_initialized(&self) -> bool {
        true
    }

    fn process(&self, _ctx: &Context, queue: &CommandQueue) -> BackendResult<bool> {
        let discarded = queue.clear();
        if discarded > 0 {
            log::trace!("Noop backend discarded {} queued commands", discarded);
        }
        Ok(true)
    }

    fn clear(&self, _color: Color) {}

    fn present(&self) -> BackendResult<()> {
        Ok(())
    }

    fn draw_sprite(&self, _sprite: &SpriteDraw) -> BackendResult<()> {
        Ok(())
    }

    fn add_texture(&self, _width: u32, _height: u32, _rgba: &[u8]) -> BackendResult<TextureId> {
        Ok(TextureId(self.next_id()))
    }

    fn add_atlas(&self, _texture: TextureId, _regions: &[AtlasRegion]) -> BackendResult<AtlasId> {
        Ok(AtlasId(self.next_id()))
    }

    fn atlas_region(&self, _atlas: AtlasId, _name: &str) -> Option<(TextureId, Rect)> {
        None
    }
}
