//! # Window Data
//!
//! [`WindowData`] is everything the multiplexer knows about one realized
//! window: its native handles, the [`Context`] it renders through, its
//! command queue, lifecycle flags and resize state.
//!
//! The manager's window list owns each `WindowData`; the window's render
//! thread holds a second reference while it runs.

pub mod resize;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};

use slotmap::new_key_type;

use crate::backend::{BackendTag, InitTarget};
use crate::command_queue::CommandQueue;
use crate::context::{Context, NativeBindings};
use crate::foundation::panic::panic_message;
use crate::foundation::sync::{lock, read, wait, write};
use crate::platform::{GraphicsContextHandle, NativePlatform, NativeWindow, SurfaceHandle};
use crate::telemetry::TelemetrySink;
use resize::{ResizeCoalescer, ResizeOutcome, ResizeRequest};

new_key_type! {
    /// Identifier of a window owned by the manager
    pub struct WindowId;
}

/// Backend initialization progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Not initialized yet; the render thread will do it
    Pending,
    /// Backend ready
    Ready,
    /// Initialization failed; the window is inert
    Failed,
}

/// Native resources owned by one window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NativeHandles {
    /// The native window
    pub window: Option<NativeWindow>,
    /// Drawing surface
    pub surface: Option<SurfaceHandle>,
    /// Graphics context bound to the surface
    pub graphics_context: Option<GraphicsContextHandle>,
    /// Whether `graphics_context` shares resources with the manager's context
    pub uses_shared_graphics_context: bool,
}

impl NativeHandles {
    pub(crate) const fn bindings(&self) -> NativeBindings {
        NativeBindings {
            window: self.window,
            surface: self.surface,
            graphics_context: self.graphics_context,
        }
    }
}

/// Construction parameters for [`WindowData`]
pub(crate) struct WindowSetup {
    pub id: WindowId,
    pub title: String,
    pub tag: BackendTag,
    pub handles: NativeHandles,
    pub size: (u32, u32),
    pub context: Arc<Context>,
    pub shared_context: Option<GraphicsContextHandle>,
    pub platform: Arc<dyn NativePlatform>,
    pub telemetry: Arc<dyn TelemetrySink>,
}

/// One realized window
pub struct WindowData {
    id: WindowId,
    title: String,
    tag: BackendTag,
    native: Mutex<NativeHandles>,
    native_gate: RwLock<()>,
    shared_context: Option<GraphicsContextHandle>,
    running: AtomicBool,
    finished: AtomicBool,
    release_on_exit: AtomicBool,
    init_state: Mutex<InitState>,
    queue: CommandQueue,
    resize: Mutex<ResizeCoalescer>,
    resize_idle: Condvar,
    size: Mutex<(u32, u32)>,
    context: Arc<Context>,
    platform: Arc<dyn NativePlatform>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl WindowData {
    pub(crate) fn new(setup: WindowSetup) -> Self {
        Self {
            id: setup.id,
            title: setup.title,
            tag: setup.tag,
            native: Mutex::new(setup.handles),
            native_gate: RwLock::new(()),
            shared_context: setup.shared_context,
            running: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            release_on_exit: AtomicBool::new(false),
            init_state: Mutex::new(InitState::Pending),
            queue: CommandQueue::new(),
            resize: Mutex::new(ResizeCoalescer::new()),
            resize_idle: Condvar::new(),
            size: Mutex::new(setup.size),
            context: setup.context,
            platform: setup.platform,
            telemetry: setup.telemetry,
        }
    }

    /// Window identifier
    pub const fn id(&self) -> WindowId {
        self.id
    }

    /// Title given at creation
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Backend type
    pub const fn tag(&self) -> BackendTag {
        self.tag
    }

    /// Rendering context
    pub const fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Command queue drained by the render thread
    pub const fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    /// Queue an action for the render thread
    pub fn enqueue<F>(&self, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.queue.enqueue(action);
    }

    pub(crate) fn telemetry(&self) -> &dyn TelemetrySink {
        self.telemetry.as_ref()
    }

    /// Whether the render loop should keep going
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the render loop to exit at its next iteration
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Whether the render loop has exited
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    /// Backend initialization progress
    pub fn init_state(&self) -> InitState {
        *lock(&self.init_state)
    }

    /// Native handles currently owned
    pub fn native_handles(&self) -> NativeHandles {
        *lock(&self.native)
    }

    /// The native window, if not yet released
    pub fn native_window(&self) -> Option<NativeWindow> {
        lock(&self.native).window
    }

    /// Run `f` on the native window, which stays alive until `f` returns
    ///
    /// Returns `None` once the handles have been released. `f` must not
    /// release this window.
    pub(crate) fn with_native_window<R>(&self, f: impl FnOnce(NativeWindow) -> R) -> Option<R> {
        let _gate = read(&self.native_gate);
        let window = self.native_window()?;
        Some(f(window))
    }

    /// Take every native handle, leaving empty sentinels behind
    ///
    /// Waits for a resize applying on another thread to finish, then refuses
    /// further resizes, then waits out every [`WindowData::with_native_window`]
    /// caller, so no one touches the handles once they are taken.
    pub(crate) fn take_native_handles(&self) -> NativeHandles {
        {
            let mut resize = lock(&self.resize);
            while resize.is_busy_elsewhere() {
                resize = wait(&self.resize_idle, resize);
            }
            resize.close();
        }
        let _gate = write(&self.native_gate);
        let handles = std::mem::take(&mut *lock(&self.native));
        self.context.set_natives(NativeBindings::default());
        handles
    }

    /// Release native handles, drop queued actions and return the context
    ///
    /// The render thread must have exited, or be the caller on its way out.
    pub(crate) fn release(&self) {
        self.queue.clear();
        release_handles(self.platform.as_ref(), self.take_native_handles());
        self.context.release();
        log::debug!("Released window '{}'", self.title);
    }

    /// Have the render thread release the window itself when its loop exits
    pub(crate) fn release_on_exit(&self) {
        self.release_on_exit.store(true, Ordering::Release);
    }

    pub(crate) fn releases_on_exit(&self) -> bool {
        self.release_on_exit.load(Ordering::Acquire)
    }

    /// Last applied logical client size
    pub fn size(&self) -> (u32, u32) {
        *lock(&self.size)
    }

    /// Phase of the resize state machine
    pub fn resize_phase(&self) -> resize::ResizePhase {
        lock(&self.resize).phase()
    }

    /// Run backend initialization on the calling thread
    ///
    /// Handles the backend creates are recorded even when it then fails, so
    /// they are released with the window.
    pub(crate) fn initialize_backend(&self) -> InitState {
        let Some(window) = self.native_window() else {
            log::error!("Window '{}' has no native window to initialize", self.title);
            return self.set_init_state(InitState::Failed);
        };

        let (width, height) = self.context.framebuffer_size();
        let handles = self.native_handles();
        let mut target = InitTarget {
            platform: Arc::clone(&self.platform),
            window,
            surface: handles.surface,
            graphics_context: handles.graphics_context,
            shared_context: self.shared_context,
            width,
            height,
        };

        let backend = Arc::clone(self.context.backend());
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            backend.initialize(&self.context, &mut target)
        }));

        let updated = {
            let mut native = lock(&self.native);
            native.surface = target.surface;
            native.graphics_context = target.graphics_context;
            *native
        };
        self.context.set_natives(updated.bindings());

        let state = match result {
            Ok(Ok(())) => {
                log::info!("Initialized {} backend for '{}'", self.tag, self.title);
                return self.mark_ready((target.width, target.height));
            }
            Ok(Err(e)) => {
                log::error!("{} backend failed to initialize '{}': {}", self.tag, self.title, e);
                InitState::Failed
            }
            Err(payload) => {
                log::error!(
                    "{} backend panicked initializing '{}': {}",
                    self.tag,
                    self.title,
                    panic_message(payload.as_ref())
                );
                InitState::Failed
            }
        };
        self.set_init_state(state)
    }

    /// Switch to `Ready` and catch the backend up on resizes it missed
    ///
    /// Resizes applied while initialization ran skipped the backend. Holding
    /// the coalescer across the switch means every later resize sees `Ready`.
    fn mark_ready(&self, initialized_at: (u32, u32)) -> InitState {
        let mut resize = lock(&self.resize);
        while resize.is_busy_elsewhere() {
            resize = wait(&self.resize_idle, resize);
        }
        self.set_init_state(InitState::Ready);

        let (width, height) = self.context.framebuffer_size();
        if (width, height) != initialized_at {
            log::debug!(
                "'{}' resized to {}x{} during initialization",
                self.title,
                width,
                height
            );
            let backend = Arc::clone(self.context.backend());
            match panic::catch_unwind(AssertUnwindSafe(|| backend.resize(&self.context, width, height))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::warn!("{} backend rejected resize of '{}': {}", self.tag, self.title, e);
                }
                Err(payload) => log::error!(
                    "{} backend panicked resizing '{}': {}",
                    self.tag,
                    self.title,
                    panic_message(payload.as_ref())
                ),
            }
        }
        drop(resize);
        InitState::Ready
    }

    fn set_init_state(&self, state: InitState) -> InitState {
        *lock(&self.init_state) = state;
        state
    }

    /// Apply a resize, coalescing with any dispatch already in progress
    pub fn dispatch_resize(&self, request: ResizeRequest) -> ResizeOutcome {
        let begun = {
            let mut resize = lock(&self.resize);
            if resize.is_closed() {
                log::trace!("Dropped resize of released window '{}'", self.title);
                return ResizeOutcome::Dropped;
            }
            resize.begin(request)
        };
        let Some(mut current) = begun else {
            log::debug!(
                "Coalesced resize of '{}' to {}x{}",
                self.title,
                request.width,
                request.height
            );
            return ResizeOutcome::Coalesced;
        };

        let mut passes = 0;
        loop {
            passes += 1;
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.apply_resize(current)))
            {
                log::error!(
                    "Resize of '{}' panicked: {}",
                    self.title,
                    panic_message(payload.as_ref())
                );
            }

            match lock(&self.resize).finish() {
                Some(next) => current = next,
                None => break,
            }
        }
        self.resize_idle.notify_all();

        if passes > 1 {
            log::debug!("Resize of '{}' settled after {} passes", self.title, passes);
        }
        ResizeOutcome::Applied { passes }
    }

    fn apply_resize(&self, request: ResizeRequest) {
        let width = request.width.max(1);
        let height = request.height.max(1);
        let handles = self.native_handles();

        let scale = handles
            .window
            .and_then(|window| self.platform.scale_factor(window).ok())
            .unwrap_or(1.0);
        *lock(&self.size) = (width, height);
        self.context.set_geometry(width, height, scale);

        if request.update_native_window {
            if let Some(window) = handles.window {
                if let Err(e) = self.platform.set_client_size(window, width, height) {
                    log::warn!("Failed to resize native window of '{}': {}", self.title, e);
                }
            }
        }

        if !request.skip_native_apply {
            let (fb_width, fb_height) = self.context.framebuffer_size();
            if let Some(surface) = handles.surface {
                if let Err(e) = self.platform.resize_surface(surface, fb_width, fb_height) {
                    log::warn!("Failed to resize surface of '{}': {}", self.title, e);
                }
            }
            if self.init_state() == InitState::Ready {
                if let Err(e) = self.context.backend().resize(&self.context, fb_width, fb_height) {
                    log::warn!("{} backend rejected resize of '{}': {}", self.tag, self.title, e);
                }
            }
        }

        if request.notify_client {
            if let Some(callback) = self.context.on_resize() {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(width, height)))
                {
                    log::error!(
                        "Resize callback of '{}' panicked: {}",
                        self.title,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        self.telemetry.resize_applied(self.tag, self.id, width, height);
    }
}

/// Destroy native handles, innermost first
pub(crate) fn release_handles(platform: &dyn NativePlatform, handles: NativeHandles) {
    if let Some(context) = handles.graphics_context {
        if let Err(e) = platform.destroy_graphics_context(context) {
            log::warn!("Failed to destroy graphics context: {}", e);
        }
    }
    if let Some(surface) = handles.surface {
        if let Err(e) = platform.release_surface(surface) {
            log::warn!("Failed to release surface: {}", e);
        }
    }
    if let Some(window) = handles.window {
        if let Err(e) = platform.destroy_window(window) {
            log::warn!("Failed to destroy window: {}", e);
        }
    }
}

impl fmt::Debug for WindowData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WindowData")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("tag", &self.tag)
            .field("native", &self.native_handles())
            .field("running", &self.is_running())
            .field("init_state", &self.init_state())
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}
