//! # Multi-Context Manager
//!
//! Owns every realized window and orchestrates their lifecycle:
//!
//! - bulk creation from per-backend window counts, optionally docked into a
//!   shared parent container
//! - lazy creation of single windows
//! - the shared graphics context used by backends that need one
//! - one render thread per window, started on creation and joined on removal
//! - native event entry points (resize, close, drag) and the docking grid
//!
//! ## Locking
//!
//! The window list lock is only held to look up or move entries. Backends,
//! resize dispatch and client callbacks always run on a snapshot of
//! `Arc<WindowData>`, so they may call back into the manager.

pub mod docking;

use slotmap::SlotMap;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use thiserror::Error;

use crate::backend::{default_backends, BackendTag, GraphicsBackend, InitPolicy};
use crate::config::ConfigError;
use crate::context::{Context, ContextRegistry};
use crate::core::config::{MultiplexerConfig, WindowCounts};
use crate::foundation::panic::panic_message;
use crate::foundation::sync::lock;
use crate::platform::{
    GraphicsContextHandle, NativePlatform, NativeWindow, PlatformError, Point, SurfaceHandle,
    WindowDesc,
};
use crate::render_thread::{self, RenderLoopSettings};
use crate::telemetry::{LogTelemetry, TelemetrySink};
use crate::window::resize::{ResizeOutcome, ResizeRequest};
use crate::window::{release_handles, InitState, NativeHandles, WindowData, WindowId, WindowSetup};

pub use docking::{grid_cells, grid_dimensions, DragOutcome, DragState};

/// Manager errors
#[derive(Error, Debug)]
pub enum MuxError {
    /// `initialize` was asked for zero windows
    #[error("No windows requested")]
    NoWindowsRequested,

    /// A requested backend has no master context
    #[error("No master context registered for the {0} backend")]
    MissingMaster(BackendTag),

    /// Unknown or already removed window
    #[error("Unknown window {0:?}")]
    UnknownWindow(WindowId),

    /// The window has no native window left
    #[error("Window {0:?} has no native window")]
    NoNativeWindow(WindowId),

    /// Shared graphics context bootstrap failed
    #[error("Failed to create the shared graphics context: {0}")]
    SharedContext(#[source] PlatformError),

    /// The configuration was rejected
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Native layer failure
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Render thread could not be started
    #[error("Failed to start render thread: {0}")]
    ThreadSpawn(#[from] io::Error),

    /// The manager has been stopped
    #[error("Manager has been stopped")]
    Stopped,
}

/// Throw-away window hosting the context other contexts share resources with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedGraphicsContext {
    /// Hidden placeholder window
    pub window: NativeWindow,
    /// Surface of the placeholder
    pub surface: SurfaceHandle,
    /// The shared context
    pub context: GraphicsContextHandle,
}

struct ManagedWindow {
    data: Arc<WindowData>,
    thread: Option<JoinHandle<()>>,
    serial: u64,
}

impl ManagedWindow {
    fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

/// Orchestrator of windows, contexts and render threads
pub struct MultiContextManager {
    platform: Arc<dyn NativePlatform>,
    config: MultiplexerConfig,
    registry: ContextRegistry,
    telemetry: Arc<dyn TelemetrySink>,
    windows: Mutex<SlotMap<WindowId, ManagedWindow>>,
    retired: Mutex<Vec<ManagedWindow>>,
    parent: Mutex<Option<NativeWindow>>,
    shared: Mutex<Option<SharedGraphicsContext>>,
    drag: Mutex<DragState>,
    running: Arc<AtomicBool>,
    next_serial: AtomicU64,
}

impl MultiContextManager {
    /// Create a manager with every compiled-in backend
    pub fn new(platform: Arc<dyn NativePlatform>, config: MultiplexerConfig) -> Self {
        Self::with_backends(platform, config, default_backends())
    }

    /// Create a manager with a custom set of backend prototypes
    pub fn with_backends<I>(
        platform: Arc<dyn NativePlatform>,
        config: MultiplexerConfig,
        backends: I,
    ) -> Self
    where
        I: IntoIterator<Item = Arc<dyn GraphicsBackend>>,
    {
        let registry = ContextRegistry::new();
        registry.initialize_all_contexts(backends);
        log::info!("Context multiplexer created on the {} platform", platform.name());

        Self {
            platform,
            config,
            registry,
            telemetry: Arc::new(LogTelemetry),
            windows: Mutex::new(SlotMap::with_key()),
            retired: Mutex::new(Vec::new()),
            parent: Mutex::new(None),
            shared: Mutex::new(None),
            drag: Mutex::new(DragState::default()),
            running: Arc::new(AtomicBool::new(true)),
            next_serial: AtomicU64::new(1),
        }
    }

    /// Replace the telemetry sink; affects windows created afterwards
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Context pools
    pub const fn registry(&self) -> &ContextRegistry {
        &self.registry
    }

    /// Native platform
    pub fn platform(&self) -> &Arc<dyn NativePlatform> {
        &self.platform
    }

    /// Configuration
    pub const fn config(&self) -> &MultiplexerConfig {
        &self.config
    }

    /// Whether `stop_all` has not run yet
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Parent container, when windows are docked
    pub fn parent_window(&self) -> Option<NativeWindow> {
        *lock(&self.parent)
    }

    /// Shared graphics context, once bootstrapped
    pub fn shared_graphics_context(&self) -> Option<SharedGraphicsContext> {
        *lock(&self.shared)
    }

    /// Create the windows requested by the configuration
    ///
    /// The configuration is validated first; nothing is created when it is
    /// rejected.
    pub fn initialize_from_config(&self) -> Result<(), MuxError> {
        self.config.validate()?;
        let counts = self.config.windows;
        self.initialize(&counts, self.config.parented)
    }

    /// Create `counts` windows and start their render threads
    ///
    /// Validation failures return before anything is created. If native
    /// creation fails partway, windows created by this call are removed again.
    pub fn initialize(&self, counts: &WindowCounts, parented: bool) -> Result<(), MuxError> {
        if !self.is_running() {
            return Err(MuxError::Stopped);
        }
        let total = counts.total();
        if total == 0 {
            return Err(MuxError::NoWindowsRequested);
        }
        let missing = counts
            .requested()
            .find(|(tag, _)| !self.registry.has_master(*tag));
        if let Some((tag, _)) = missing {
            return Err(MuxError::MissingMaster(tag));
        }

        log::info!("Initializing {} windows (parented: {})", total, parented);

        let parent = if parented { Some(self.ensure_parent(total)?) } else { None };
        if counts.requested().any(|(tag, _)| tag.requires_shared_context()) {
            self.ensure_shared_context()?;
        }

        let mut created = Vec::with_capacity(total);
        for (tag, count) in counts.requested() {
            for _ in 0..count {
                match self.create_window(tag, None, parent, true) {
                    Ok(id) => created.push(id),
                    Err(e) => {
                        log::error!("Failed to create {} window: {}", tag, e);
                        self.rollback(&created);
                        return Err(e);
                    }
                }
            }
        }

        if parent.is_some() {
            self.arrange_docked_windows_grid();
        }

        for id in &created {
            if let Err(e) = self.start_thread(*id) {
                log::error!("Failed to start render thread: {}", e);
                self.rollback(&created);
                return Err(e);
            }
        }
        Ok(())
    }

    /// Create one window and start its render thread
    ///
    /// The window docks into the parent container when one exists. Backend
    /// initialization always runs on the new render thread.
    pub fn add_window(&self, tag: BackendTag, title: Option<&str>) -> Result<WindowId, MuxError> {
        if !self.is_running() {
            return Err(MuxError::Stopped);
        }
        if !self.registry.has_master(tag) {
            return Err(MuxError::MissingMaster(tag));
        }
        if tag.requires_shared_context() {
            self.ensure_shared_context()?;
        }

        let parent = self.parent_window();
        let id = self.create_window(tag, title.map(str::to_owned), parent, false)?;
        if parent.is_some() {
            self.arrange_docked_windows_grid();
        }

        if let Err(e) = self.start_thread(id) {
            self.rollback(&[id]);
            return Err(e);
        }
        Ok(id)
    }

    /// Stop a window and schedule its teardown
    ///
    /// Never blocks on the render thread: the thread join and native release
    /// happen in [`MultiContextManager::cleanup_finished_windows`] once the
    /// thread has exited.
    pub fn remove_window(&self, id: WindowId) -> Result<(), MuxError> {
        let managed = self.detach_window(id).ok_or(MuxError::UnknownWindow(id))?;
        let was_docked = self.is_docked(&managed.data);

        log::info!("Removed window '{}'", managed.data.title());
        lock(&self.retired).push(managed);
        self.cleanup_finished_windows();

        if was_docked {
            self.arrange_docked_windows_grid();
        }
        Ok(())
    }

    /// Native close notification
    pub fn close_requested(&self, id: WindowId) -> Result<(), MuxError> {
        self.remove_window(id)
    }

    /// Tear down removed windows whose render thread has exited
    ///
    /// Returns how many windows were released. Windows still mid-frame are
    /// left for a later pass.
    pub fn cleanup_finished_windows(&self) -> usize {
        let finished: Vec<ManagedWindow> = {
            let mut retired = lock(&self.retired);
            let (done, pending) = retired.drain(..).partition(ManagedWindow::is_finished);
            *retired = pending;
            done
        };

        let count = finished.len();
        for managed in finished {
            self.finalize(managed);
        }
        count
    }

    /// Removed windows still waiting for their render thread
    pub fn retired_count(&self) -> usize {
        lock(&self.retired).len()
    }

    /// Stop every render thread and release all native resources
    ///
    /// Blocks until every thread has been joined. Idempotent. When called
    /// from a window's own render thread (a queued action, or the last
    /// reference dropped there), that window is released by its thread as
    /// it exits instead of being joined.
    pub fn stop_all(&self) {
        let was_running = self.running.swap(false, Ordering::AcqRel);

        let mut all: Vec<ManagedWindow> = lock(&self.windows).drain().map(|(_, m)| m).collect();
        all.append(&mut lock(&self.retired));
        for managed in &all {
            managed.data.stop();
            managed.data.context().detach();
        }
        let count = all.len();
        for managed in all {
            self.finalize(managed);
        }

        lock(&self.drag).reset();
        if let Some(shared) = lock(&self.shared).take() {
            self.release_shared_context(shared);
        }
        if let Some(parent) = lock(&self.parent).take() {
            if let Err(e) = self.platform.destroy_window(parent) {
                log::warn!("Failed to destroy parent container: {}", e);
            }
        }

        if was_running {
            log::info!("Stopped {} windows", count);
        }
    }

    /// Live window ids in creation order
    pub fn window_ids(&self) -> Vec<WindowId> {
        let windows = lock(&self.windows);
        let mut ids: Vec<(u64, WindowId)> = windows.iter().map(|(id, m)| (m.serial, id)).collect();
        ids.sort_unstable();
        ids.into_iter().map(|(_, id)| id).collect()
    }

    /// Number of live windows
    pub fn window_count(&self) -> usize {
        lock(&self.windows).len()
    }

    /// Live window by id
    pub fn window(&self, id: WindowId) -> Option<Arc<WindowData>> {
        lock(&self.windows).get(id).map(|m| Arc::clone(&m.data))
    }

    /// Context of a live window
    pub fn context(&self, id: WindowId) -> Option<Arc<Context>> {
        self.window(id).map(|window| Arc::clone(window.context()))
    }

    /// Live window owning a native window
    pub fn find_by_native(&self, native: NativeWindow) -> Option<WindowId> {
        lock(&self.windows)
            .iter()
            .find(|(_, m)| m.data.native_window() == Some(native))
            .map(|(id, _)| id)
    }

    /// Live windows in creation order
    pub fn windows(&self) -> Vec<Arc<WindowData>> {
        let windows = lock(&self.windows);
        let mut all: Vec<(u64, Arc<WindowData>)> = windows
            .values()
            .map(|m| (m.serial, Arc::clone(&m.data)))
            .collect();
        all.sort_unstable_by_key(|(serial, _)| *serial);
        all.into_iter().map(|(_, data)| data).collect()
    }

    /// Queue an action on a window's render thread
    pub fn enqueue<F>(&self, id: WindowId, action: F) -> Result<(), MuxError>
    where
        F: FnOnce() + Send + 'static,
    {
        let window = self.window(id).ok_or(MuxError::UnknownWindow(id))?;
        window.enqueue(action);
        Ok(())
    }

    /// Queue an action that receives the window's context
    pub fn enqueue_with_context<F>(&self, id: WindowId, action: F) -> Result<(), MuxError>
    where
        F: FnOnce(&Context) + Send + 'static,
    {
        let window = self.window(id).ok_or(MuxError::UnknownWindow(id))?;
        let context = Arc::clone(window.context());
        window.enqueue(move || action(&context));
        Ok(())
    }

    /// Native resize notification for a window
    pub fn handle_resize(
        &self,
        id: WindowId,
        width: u32,
        height: u32,
    ) -> Result<ResizeOutcome, MuxError> {
        self.dispatch_resize(id, ResizeRequest::new(width, height))
    }

    /// Programmatic resize of a window's client area
    pub fn resize_window(
        &self,
        id: WindowId,
        width: u32,
        height: u32,
    ) -> Result<ResizeOutcome, MuxError> {
        self.dispatch_resize(id, ResizeRequest::new(width, height).with_native_update(true))
    }

    /// Run the resize dispatcher of a window
    pub fn dispatch_resize(
        &self,
        id: WindowId,
        request: ResizeRequest,
    ) -> Result<ResizeOutcome, MuxError> {
        let window = self.window(id).ok_or(MuxError::UnknownWindow(id))?;
        Ok(window.dispatch_resize(request))
    }

    /// Parent container resized: re-tile the docked windows
    pub fn handle_parent_resize(&self, width: u32, height: u32) -> usize {
        log::debug!("Parent container resized to {}x{}", width, height);
        self.arrange_docked_windows_grid()
    }

    /// Route a native client-size notification
    ///
    /// Returns `false` when the window is not managed.
    pub fn on_native_resize(&self, native: NativeWindow, width: u32, height: u32) -> bool {
        if self.parent_window() == Some(native) {
            self.handle_parent_resize(width, height);
            return true;
        }
        match self.find_by_native(native) {
            Some(id) => self.handle_resize(id, width, height).is_ok(),
            None => false,
        }
    }

    /// Take a window out of the live list and stop it
    fn detach_window(&self, id: WindowId) -> Option<ManagedWindow> {
        let managed = lock(&self.windows).remove(id)?;
        managed.data.stop();
        managed.data.context().detach();

        let mut drag = lock(&self.drag);
        if drag.dragged == Some(id) {
            drag.reset();
        }
        Some(managed)
    }

    /// Whether `window` is a child of the parent container
    fn is_docked(&self, window: &WindowData) -> bool {
        let Some(parent) = self.parent_window() else {
            return false;
        };
        window
            .with_native_window(|native| self.platform.parent(native).ok().flatten())
            .flatten()
            == Some(parent)
    }

    /// Undo windows created by a failed `initialize`
    ///
    /// Joins any render thread already started, so everything the call
    /// created is released before it returns.
    pub(crate) fn rollback(&self, ids: &[WindowId]) {
        let mut docked = false;
        for id in ids {
            match self.detach_window(*id) {
                Some(managed) => {
                    docked |= self.is_docked(&managed.data);
                    log::debug!("Rolling back window '{}'", managed.data.title());
                    self.finalize(managed);
                }
                None => log::warn!("Rollback of unknown window {:?}", id),
            }
        }
        if docked {
            self.arrange_docked_windows_grid();
        }
    }

    fn ensure_parent(&self, window_count: usize) -> Result<NativeWindow, MuxError> {
        let mut parent = lock(&self.parent);
        if let Some(existing) = *parent {
            return Ok(existing);
        }

        let container = &self.config.container;
        let (cols, rows) = grid_dimensions(window_count);
        let cols = u32::try_from(cols).unwrap_or(u32::MAX);
        let rows = u32::try_from(rows).unwrap_or(u32::MAX);
        let desc = WindowDesc::top_level(
            container.title.clone(),
            Point::default(),
            container.cell_width.saturating_mul(cols),
            container.cell_height.saturating_mul(rows),
        );
        let window = self.platform.create_window(&desc)?;
        log::info!(
            "Created parent container {}x{} ({}x{} grid)",
            desc.width,
            desc.height,
            cols,
            rows
        );
        *parent = Some(window);
        Ok(window)
    }

    fn ensure_shared_context(&self) -> Result<GraphicsContextHandle, MuxError> {
        let mut shared = lock(&self.shared);
        if let Some(existing) = *shared {
            return Ok(existing.context);
        }

        let window = self
            .platform
            .create_window(&WindowDesc::hidden("shared-context"))
            .map_err(MuxError::SharedContext)?;
        let surface = match self.platform.create_surface(window) {
            Ok(surface) => surface,
            Err(e) => {
                if let Err(cleanup) = self.platform.destroy_window(window) {
                    log::warn!("Failed to destroy shared context placeholder: {}", cleanup);
                }
                return Err(MuxError::SharedContext(e));
            }
        };
        let context = match self.platform.create_graphics_context(surface, None) {
            Ok(context) => context,
            Err(e) => {
                let results = [
                    self.platform.release_surface(surface),
                    self.platform.destroy_window(window),
                ];
                for cleanup in results.into_iter().filter_map(Result::err) {
                    log::warn!("Failed to release shared context placeholder: {}", cleanup);
                }
                return Err(MuxError::SharedContext(e));
            }
        };

        log::info!("Shared graphics context {:?} ready", context);
        *shared = Some(SharedGraphicsContext { window, surface, context });
        Ok(context)
    }

    fn release_shared_context(&self, shared: SharedGraphicsContext) {
        let results = [
            self.platform.destroy_graphics_context(shared.context),
            self.platform.release_surface(shared.surface),
            self.platform.destroy_window(shared.window),
        ];
        for e in results.into_iter().filter_map(Result::err) {
            log::warn!("Failed to release shared graphics context: {}", e);
        }
    }

    /// Realize one window of `tag` on a pooled context
    fn create_window(
        &self,
        tag: BackendTag,
        title: Option<String>,
        parent: Option<NativeWindow>,
        init_now: bool,
    ) -> Result<WindowId, MuxError> {
        let context = self
            .registry
            .acquire(tag)
            .ok_or(MuxError::MissingMaster(tag))?;

        self.realize(&context, tag, title, parent, init_now)
            .map_err(|e| {
                context.release();
                e
            })
    }

    fn realize(
        &self,
        context: &Arc<Context>,
        tag: BackendTag,
        title: Option<String>,
        parent: Option<NativeWindow>,
        init_now: bool,
    ) -> Result<WindowId, MuxError> {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        let defaults = &self.config.window;
        let title =
            title.unwrap_or_else(|| format!("{} {} #{}", defaults.title_prefix, tag, serial));

        let desc = match parent {
            Some(parent) => WindowDesc::docked(
                title.clone(),
                parent,
                Point::default(),
                self.config.container.cell_width,
                self.config.container.cell_height,
            ),
            None => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                let offset = defaults.cascade_offset * (serial % 8) as i32;
                WindowDesc::top_level(
                    title.clone(),
                    Point::new(offset, offset),
                    defaults.width,
                    defaults.height,
                )
            }
        };

        let native = self.platform.create_window(&desc)?;
        let mut handles = NativeHandles { window: Some(native), ..NativeHandles::default() };
        if tag.init_policy() == InitPolicy::Immediate {
            if let Err(e) = self.prepare_surface(tag, &mut handles) {
                release_handles(self.platform.as_ref(), handles);
                return Err(e);
            }
        }

        let scale = self.platform.scale_factor(native).unwrap_or(1.0);
        context.set_geometry(desc.width, desc.height, scale);

        let shared_context = self.shared_graphics_context().map(|shared| shared.context);
        let data = {
            let mut windows = lock(&self.windows);
            let id = windows.insert_with_key(|id| ManagedWindow {
                data: Arc::new(WindowData::new(WindowSetup {
                    id,
                    title,
                    tag,
                    handles,
                    size: (desc.width, desc.height),
                    context: Arc::clone(context),
                    shared_context,
                    platform: Arc::clone(&self.platform),
                    telemetry: Arc::clone(&self.telemetry),
                })),
                thread: None,
                serial,
            });
            Arc::clone(&windows[id].data)
        };
        context.attach(&data, handles.bindings());

        if init_now && tag.init_policy() == InitPolicy::Immediate {
            data.initialize_backend();
        }

        log::info!(
            "Created {} window '{}' on context #{}",
            tag,
            data.title(),
            context.serial()
        );
        Ok(data.id())
    }

    /// Surface (and shared-context child context) for immediate backends
    fn prepare_surface(&self, tag: BackendTag, handles: &mut NativeHandles) -> Result<(), MuxError> {
        let window = handles
            .window
            .ok_or_else(|| PlatformError::CreationFailed("surface without window".to_string()))?;
        let surface = self.platform.create_surface(window)?;
        handles.surface = Some(surface);

        if tag.requires_shared_context() {
            let share = self.ensure_shared_context()?;
            let context = self.platform.create_graphics_context(surface, Some(share))?;
            handles.graphics_context = Some(context);
            handles.uses_shared_graphics_context = true;
        }
        Ok(())
    }

    fn start_thread(&self, id: WindowId) -> Result<(), MuxError> {
        let mut windows = lock(&self.windows);
        let managed = windows.get_mut(id).ok_or(MuxError::UnknownWindow(id))?;
        if managed.thread.is_some() {
            return Ok(());
        }

        let settings = RenderLoopSettings {
            running: Arc::clone(&self.running),
            frame_interval: self.config.frame_interval(),
        };
        managed.thread = Some(render_thread::spawn(Arc::clone(&managed.data), settings)?);
        Ok(())
    }

    /// Join, release native handles and return the context to its pool
    ///
    /// A window finalized from its own render thread cannot be joined; its
    /// thread releases it on the way out instead.
    fn finalize(&self, mut managed: ManagedWindow) {
        let data = &managed.data;
        match managed.thread.take() {
            Some(handle) if handle.thread().id() == thread::current().id() => {
                log::debug!("'{}' stopped from its own render thread", data.title());
                data.release_on_exit();
                return;
            }
            Some(handle) => {
                if handle.join().is_err() {
                    log::error!("Render thread of '{}' panicked", data.title());
                }
            }
            None => {
                // Never started: undo an initialization done on the manager thread
                if data.init_state() == InitState::Ready {
                    let context = data.context();
                    let backend = Arc::clone(context.backend());
                    if let Err(payload) =
                        panic::catch_unwind(AssertUnwindSafe(|| backend.cleanup(context)))
                    {
                        log::error!(
                            "Backend cleanup of '{}' panicked: {}",
                            data.title(),
                            panic_message(payload.as_ref())
                        );
                    }
                }
            }
        }

        data.release();
    }
}

impl Drop for MultiContextManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}
