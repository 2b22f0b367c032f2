//! Cross-module scenarios
//!
//! Each module drives a full [`MultiContextManager`] over the headless
//! platform with real render threads. Shared fixtures live here.

mod layout;
mod pooling;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crate::backend::{
    AtlasId, AtlasRegion, BackendError, BackendResult, BackendTag, Color, GraphicsBackend,
    InitTarget, SpriteDraw, TextureId,
};
use crate::command_queue::CommandQueue;
use crate::context::Context;
use crate::core::config::MultiplexerConfig;
use crate::manager::MultiContextManager;
use crate::platform::headless::HeadlessPlatform;
use crate::platform::Rect;
use crate::telemetry::CountingTelemetry;

/// Manager plus the handles tests inspect
pub(crate) struct Harness {
    pub platform: Arc<HeadlessPlatform>,
    pub telemetry: Arc<CountingTelemetry>,
    pub manager: Arc<MultiContextManager>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_backends(backends: Vec<Arc<dyn GraphicsBackend>>) -> Self {
        Self::build(Some(backends))
    }

    fn build(backends: Option<Vec<Arc<dyn GraphicsBackend>>>) -> Self {
        let platform = Arc::new(HeadlessPlatform::new());
        let telemetry = Arc::new(CountingTelemetry::new());
        let config = MultiplexerConfig::default().with_frame_interval_ms(1);
        let manager = match backends {
            Some(backends) => MultiContextManager::with_backends(platform.clone(), config, backends),
            None => MultiContextManager::new(platform.clone(), config),
        }
        .with_telemetry(telemetry.clone());

        Self { platform, telemetry, manager: Arc::new(manager) }
    }

    /// Route native client-size changes back into the manager, like a window procedure
    pub fn wire_resize_events(&self) {
        let manager: Weak<MultiContextManager> = Arc::downgrade(&self.manager);
        self.platform.set_resize_observer(Some(Arc::new(move |native, width, height| {
            if let Some(manager) = manager.upgrade() {
                manager.on_native_resize(native, width, height);
            }
        })));
    }

    /// Run cleanup passes until every removed window has been released
    pub fn drain_retired(&self) -> bool {
        wait_until(|| {
            self.manager.cleanup_finished_windows();
            self.manager.retired_count() == 0
        })
    }
}

/// Poll `condition` until it holds or five seconds pass
pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InitBehavior {
    Succeed,
    Fail,
    Panic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessBehavior {
    Drain,
    Stop,
    Fail,
    Panic,
}

/// Backend whose initialization and frame outcome are chosen by the test
pub(crate) struct ScriptedBackend {
    tag: BackendTag,
    init: InitBehavior,
    process: ProcessBehavior,
    frames: Arc<AtomicUsize>,
    initialized: AtomicBool,
    init_delay: Duration,
    init_started: AtomicBool,
    size: Mutex<Option<(u32, u32)>>,
}

impl ScriptedBackend {
    pub fn new(tag: BackendTag, init: InitBehavior, process: ProcessBehavior) -> Self {
        Self::sharing(tag, init, process, Arc::new(AtomicUsize::new(0)))
    }

    fn sharing(
        tag: BackendTag,
        init: InitBehavior,
        process: ProcessBehavior,
        frames: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            tag,
            init,
            process,
            frames,
            initialized: AtomicBool::new(false),
            init_delay: Duration::ZERO,
            init_started: AtomicBool::new(false),
            size: Mutex::new(None),
        }
    }

    /// Sleep inside `initialize` before it returns
    pub fn with_init_delay(mut self, delay: Duration) -> Self {
        self.init_delay = delay;
        self
    }

    /// Whether `initialize` has been entered
    pub fn init_started(&self) -> bool {
        self.init_started.load(Ordering::SeqCst)
    }

    /// Framebuffer size the backend last saw, from `initialize` or `resize`
    pub fn size(&self) -> Option<(u32, u32)> {
        *self.size.lock().unwrap()
    }

    /// Frames processed by this backend and every duplicate of it
    pub fn frame_counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.frames)
    }
}

impl GraphicsBackend for ScriptedBackend {
    fn tag(&self) -> BackendTag {
        self.tag
    }

    fn duplicate(&self) -> Arc<dyn GraphicsBackend> {
        Arc::new(Self::sharing(self.tag, self.init, self.process, Arc::clone(&self.frames)))
    }

    fn initialize(&self, _ctx: &Context, target: &mut InitTarget) -> BackendResult<()> {
        *self.size.lock().unwrap() = Some((target.width, target.height));
        self.init_started.store(true, Ordering::SeqCst);
        thread::sleep(self.init_delay);
        match self.init {
            InitBehavior::Succeed => {
                self.initialized.store(true, Ordering::SeqCst);
                Ok(())
            }
            InitBehavior::Fail => Err(BackendError::Failed("scripted init failure".to_string())),
            InitBehavior::Panic => panic!("scripted init panic"),
        }
    }

    fn cleanup(&self, _ctx: &Context) {
        self.initialized.store(false, Ordering::SeqCst);
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn resize(&self, _ctx: &Context, width: u32, height: u32) -> BackendResult<()> {
        *self.size.lock().unwrap() = Some((width, height));
        Ok(())
    }

    fn process(&self, _ctx: &Context, queue: &CommandQueue) -> BackendResult<bool> {
        self.frames.fetch_add(1, Ordering::SeqCst);
        match self.process {
            ProcessBehavior::Drain => {
                queue.drain();
                Ok(true)
            }
            ProcessBehavior::Stop => Ok(false),
            ProcessBehavior::Fail => Err(BackendError::Failed("scripted frame failure".to_string())),
            ProcessBehavior::Panic => panic!("scripted frame panic"),
        }
    }

    fn clear(&self, _color: Color) {}

    fn present(&self) -> BackendResult<()> {
        Ok(())
    }

    fn draw_sprite(&self, _sprite: &SpriteDraw) -> BackendResult<()> {
        Ok(())
    }

    fn add_texture(&self, _width: u32, _height: u32, _rgba: &[u8]) -> BackendResult<TextureId> {
        Ok(TextureId(1))
    }

    fn add_atlas(&self, _texture: TextureId, _regions: &[AtlasRegion]) -> BackendResult<AtlasId> {
        Ok(AtlasId(1))
    }

    fn atlas_region(&self, _atlas: AtlasId, _name: &str) -> Option<(TextureId, Rect)> {
        None
    }
}
