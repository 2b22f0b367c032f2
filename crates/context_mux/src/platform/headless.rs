//! In-memory platform implementation
//!
//! `HeadlessPlatform` keeps every window, surface and graphics context in a
//! table instead of talking to a display server. It behaves like a strict
//! native layer:
//!
//! - Handles are never reused, and any call on a released handle fails with
//!   [`PlatformError::StaleHandle`] and is counted in [`PlatformStats`]
//! - `swap_buffers` fails unless the context was made current on the calling
//!   thread, and the violation is counted
//! - `set_client_size` synchronously notifies an optional resize observer,
//!   the way a native window procedure receives a size message before the
//!   resize call returns
//!
//! Decorated windows get a fixed caption and border; children get no frame.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, ThreadId};

use super::{
    GraphicsContextHandle, NativePlatform, NativeWindow, PlatformError, PlatformResult, Point, Rect,
    SurfaceHandle, WindowDesc, WindowStyle,
};
use crate::foundation::sync::{lock, read, write};

/// Callback invoked after a native client-size change
pub type ResizeObserver = Arc<dyn Fn(NativeWindow, u32, u32) + Send + Sync>;

/// Height of the simulated title bar
pub const CAPTION_HEIGHT: u32 = 24;

/// Width of the simulated sizing border
pub const BORDER_WIDTH: u32 = 4;

/// Counters describing everything the platform has done
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformStats {
    /// Windows created
    pub windows_created: u64,
    /// Windows destroyed
    pub windows_destroyed: u64,
    /// Surfaces created
    pub surfaces_created: u64,
    /// Surfaces released
    pub surfaces_released: u64,
    /// Graphics contexts created
    pub contexts_created: u64,
    /// Graphics contexts destroyed
    pub contexts_destroyed: u64,
    /// Pixel buffers presented
    pub presents: u64,
    /// Successful buffer swaps
    pub swaps: u64,
    /// Native client-size changes
    pub native_resizes: u64,
    /// Calls made with a released or unknown handle
    pub stale_handle_accesses: u64,
    /// Swaps attempted off the context's current thread
    pub cross_thread_violations: u64,
}

/// Which creation calls should fail, for exercising error paths
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FailurePlan {
    /// Fail `create_window`
    pub windows: bool,
    /// Fail `create_surface`
    pub surfaces: bool,
    /// Fail `create_graphics_context`
    pub graphics_contexts: bool,
}

#[derive(Debug)]
struct HeadlessWindow {
    title: String,
    style: WindowStyle,
    parent: Option<NativeWindow>,
    // Parent-client-relative for children, screen space otherwise
    rect: Rect,
    scale: f64,
}

#[derive(Debug)]
struct HeadlessSurface {
    window: NativeWindow,
    width: u32,
    height: u32,
    presents: u64,
}

#[derive(Debug)]
struct HeadlessContext {
    surface: SurfaceHandle,
    share: Option<GraphicsContextHandle>,
    current_thread: Option<ThreadId>,
    swaps: u64,
}

#[derive(Debug, Default)]
struct HeadlessState {
    windows: HashMap<u64, HeadlessWindow>,
    surfaces: HashMap<u64, HeadlessSurface>,
    contexts: HashMap<u64, HeadlessContext>,
    stats: PlatformStats,
    failures: FailurePlan,
}

impl HeadlessState {
    fn window(&mut self, window: NativeWindow) -> PlatformResult<&mut HeadlessWindow> {
        if !self.windows.contains_key(&window.0) {
            self.stats.stale_handle_accesses += 1;
            return Err(PlatformError::StaleHandle { kind: "window", id: window.0 });
        }
        self.windows
            .get_mut(&window.0)
            .ok_or(PlatformError::StaleHandle { kind: "window", id: window.0 })
    }

    fn surface(&mut self, surface: SurfaceHandle) -> PlatformResult<&mut HeadlessSurface> {
        if !self.surfaces.contains_key(&surface.0) {
            self.stats.stale_handle_accesses += 1;
            return Err(PlatformError::StaleHandle { kind: "surface", id: surface.0 });
        }
        self.surfaces
            .get_mut(&surface.0)
            .ok_or(PlatformError::StaleHandle { kind: "surface", id: surface.0 })
    }

    fn context(&mut self, context: GraphicsContextHandle) -> PlatformResult<&mut HeadlessContext> {
        if !self.contexts.contains_key(&context.0) {
            self.stats.stale_handle_accesses += 1;
            return Err(PlatformError::StaleHandle { kind: "graphics context", id: context.0 });
        }
        self.contexts
            .get_mut(&context.0)
            .ok_or(PlatformError::StaleHandle { kind: "graphics context", id: context.0 })
    }

    /// Screen-space outer rectangle, resolving parent chains
    fn screen_rect(&mut self, window: NativeWindow) -> PlatformResult<Rect> {
        let (rect, parent) = {
            let entry = self.window(window)?;
            (entry.rect, entry.parent)
        };
        match parent {
            Some(parent) if parent != window => {
                let parent_client = self.screen_client_rect(parent)?;
                Ok(rect.offset(parent_client.x, parent_client.y))
            }
            _ => Ok(rect),
        }
    }

    fn screen_client_rect(&mut self, window: NativeWindow) -> PlatformResult<Rect> {
        let outer = self.screen_rect(window)?;
        let style = self.window(window)?.style;
        Ok(client_from_outer(outer, style))
    }
}

/// Frame insets (left, top, right, bottom) for a style
const fn frame_insets(style: WindowStyle) -> (u32, u32, u32, u32) {
    if style.contains(WindowStyle::CHILD) {
        return (0, 0, 0, 0);
    }
    let border = if style.intersects(WindowStyle::CAPTION.union(WindowStyle::RESIZABLE)) {
        BORDER_WIDTH
    } else {
        0
    };
    let caption = if style.contains(WindowStyle::CAPTION) { CAPTION_HEIGHT } else { 0 };
    (border, border + caption, border, border)
}

#[allow(clippy::cast_possible_wrap)]
const fn client_from_outer(outer: Rect, style: WindowStyle) -> Rect {
    let (left, top, right, bottom) = frame_insets(style);
    Rect::new(
        outer.x + left as i32,
        outer.y + top as i32,
        outer.width.saturating_sub(left + right),
        outer.height.saturating_sub(top + bottom),
    )
}

/// Window system simulated entirely in memory
pub struct HeadlessPlatform {
    state: Mutex<HeadlessState>,
    next_handle: AtomicU64,
    resize_observer: RwLock<Option<ResizeObserver>>,
    default_scale: RwLock<f64>,
}

impl Default for HeadlessPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessPlatform {
    /// Create an empty platform with a 1.0 scale factor
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HeadlessState::default()),
            next_handle: AtomicU64::new(1),
            resize_observer: RwLock::new(None),
            default_scale: RwLock::new(1.0),
        }
    }

    fn allocate(&self) -> u64 {
        self.next_handle.fetch_add(1, Ordering::Relaxed)
    }

    /// Register the callback fired after every native client-size change
    pub fn set_resize_observer(&self, observer: Option<ResizeObserver>) {
        *write(&self.resize_observer) = observer;
    }

    /// Scale factor given to windows created from now on
    pub fn set_default_scale_factor(&self, scale: f64) {
        *write(&self.default_scale) = scale;
    }

    /// Change the scale factor of one window (e.g. moved to another monitor)
    pub fn set_scale_factor(&self, window: NativeWindow, scale: f64) -> PlatformResult<()> {
        lock(&self.state).window(window)?.scale = scale;
        Ok(())
    }

    /// Select creation calls that should fail
    pub fn set_failures(&self, failures: FailurePlan) {
        lock(&self.state).failures = failures;
    }

    /// Snapshot of the platform counters
    pub fn stats(&self) -> PlatformStats {
        lock(&self.state).stats
    }

    /// Whether a window handle is still alive
    pub fn is_window_alive(&self, window: NativeWindow) -> bool {
        lock(&self.state).windows.contains_key(&window.0)
    }

    /// Whether a surface handle is still alive
    pub fn is_surface_alive(&self, surface: SurfaceHandle) -> bool {
        lock(&self.state).surfaces.contains_key(&surface.0)
    }

    /// Whether a graphics context handle is still alive
    pub fn is_context_alive(&self, context: GraphicsContextHandle) -> bool {
        lock(&self.state).contexts.contains_key(&context.0)
    }

    /// Number of live windows
    pub fn live_windows(&self) -> usize {
        lock(&self.state).windows.len()
    }

    /// Number of live surfaces
    pub fn live_surfaces(&self) -> usize {
        lock(&self.state).surfaces.len()
    }

    /// Number of live graphics contexts
    pub fn live_contexts(&self) -> usize {
        lock(&self.state).contexts.len()
    }

    /// Title of a live window
    pub fn window_title(&self, window: NativeWindow) -> Option<String> {
        lock(&self.state).windows.get(&window.0).map(|w| w.title.clone())
    }

    /// Framebuffer size of a live surface
    pub fn surface_size(&self, surface: SurfaceHandle) -> Option<(u32, u32)> {
        lock(&self.state)
            .surfaces
            .get(&surface.0)
            .map(|s| (s.width, s.height))
    }

    /// Window a live surface belongs to
    pub fn surface_window(&self, surface: SurfaceHandle) -> Option<NativeWindow> {
        lock(&self.state).surfaces.get(&surface.0).map(|s| s.window)
    }

    /// Frames presented on a live surface
    pub fn surface_presents(&self, surface: SurfaceHandle) -> u64 {
        lock(&self.state)
            .surfaces
            .get(&surface.0)
            .map_or(0, |s| s.presents)
    }

    /// Resource-sharing parent of a live graphics context
    pub fn context_share(&self, context: GraphicsContextHandle) -> Option<GraphicsContextHandle> {
        lock(&self.state).contexts.get(&context.0).and_then(|c| c.share)
    }

    /// Surface a live graphics context renders to
    pub fn context_surface(&self, context: GraphicsContextHandle) -> Option<SurfaceHandle> {
        lock(&self.state).contexts.get(&context.0).map(|c| c.surface)
    }

    /// Successful swaps on a live graphics context
    pub fn context_swaps(&self, context: GraphicsContextHandle) -> u64 {
        lock(&self.state)
            .contexts
            .get(&context.0)
            .map_or(0, |c| c.swaps)
    }
}

impl NativePlatform for HeadlessPlatform {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_window(&self, desc: &WindowDesc) -> PlatformResult<NativeWindow> {
        let scale = *read(&self.default_scale);
        let mut state = lock(&self.state);
        if state.failures.windows {
            return Err(PlatformError::CreationFailed(format!("window '{}'", desc.title)));
        }
        if let Some(parent) = desc.parent {
            state.window(parent)?;
        }

        let id = self.allocate();
        let client = Rect::new(desc.position.x, desc.position.y, desc.width.max(1), desc.height.max(1));
        let outer = self.frame_for_client(client, desc.style).at(desc.position);
        state.windows.insert(
            id,
            HeadlessWindow {
                title: desc.title.clone(),
                style: desc.style,
                parent: desc.parent,
                rect: outer,
                scale,
            },
        );
        state.stats.windows_created += 1;
        log::trace!("headless: created window {} '{}' at {:?}", id, desc.title, outer);
        Ok(NativeWindow(id))
    }

    fn destroy_window(&self, window: NativeWindow) -> PlatformResult<()> {
        let mut state = lock(&self.state);
        state.window(window)?;
        state.windows.remove(&window.0);
        for child in state.windows.values_mut() {
            if child.parent == Some(window) {
                child.parent = None;
            }
        }
        state.stats.windows_destroyed += 1;
        Ok(())
    }

    fn set_parent(&self, window: NativeWindow, parent: Option<NativeWindow>) -> PlatformResult<()> {
        let mut state = lock(&self.state);
        if let Some(parent) = parent {
            state.window(parent)?;
        }
        state.window(window)?.parent = parent;
        Ok(())
    }

    fn parent(&self, window: NativeWindow) -> PlatformResult<Option<NativeWindow>> {
        Ok(lock(&self.state).window(window)?.parent)
    }

    fn style(&self, window: NativeWindow) -> PlatformResult<WindowStyle> {
        Ok(lock(&self.state).window(window)?.style)
    }

    fn set_style(&self, window: NativeWindow, style: WindowStyle) -> PlatformResult<()> {
        lock(&self.state).window(window)?.style = style;
        Ok(())
    }

    fn window_rect(&self, window: NativeWindow) -> PlatformResult<Rect> {
        lock(&self.state).screen_rect(window)
    }

    fn client_rect(&self, window: NativeWindow) -> PlatformResult<Rect> {
        lock(&self.state).screen_client_rect(window)
    }

    fn move_window(&self, window: NativeWindow, rect: Rect) -> PlatformResult<()> {
        lock(&self.state).window(window)?.rect = rect;
        Ok(())
    }

    fn set_client_size(&self, window: NativeWindow, width: u32, height: u32) -> PlatformResult<()> {
        {
            let mut state = lock(&self.state);
            let entry = state.window(window)?;
            let origin = entry.rect.origin();
            let client = Rect::new(origin.x, origin.y, width, height);
            entry.rect = self.frame_for_client(client, entry.style).at(origin);
            state.stats.native_resizes += 1;
        }

        // Delivered after the state lock is released so observers may call back in
        let observer = read(&self.resize_observer).clone();
        if let Some(observer) = observer {
            observer(window, width, height);
        }
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn frame_for_client(&self, client: Rect, style: WindowStyle) -> Rect {
        let (left, top, right, bottom) = frame_insets(style);
        Rect::new(
            client.x - left as i32,
            client.y - top as i32,
            client.width + left + right,
            client.height + top + bottom,
        )
    }

    fn scale_factor(&self, window: NativeWindow) -> PlatformResult<f64> {
        Ok(lock(&self.state).window(window)?.scale)
    }

    fn create_surface(&self, window: NativeWindow) -> PlatformResult<SurfaceHandle> {
        let mut state = lock(&self.state);
        if state.failures.surfaces {
            return Err(PlatformError::CreationFailed("surface".to_string()));
        }
        let (width, height) = {
            let outer = state.screen_rect(window)?;
            let style = state.window(window)?.style;
            let client = client_from_outer(outer, style);
            (client.width.max(1), client.height.max(1))
        };

        let id = self.allocate();
        state.surfaces.insert(id, HeadlessSurface { window, width, height, presents: 0 });
        state.stats.surfaces_created += 1;
        Ok(SurfaceHandle(id))
    }

    fn resize_surface(&self, surface: SurfaceHandle, width: u32, height: u32) -> PlatformResult<()> {
        let mut state = lock(&self.state);
        let entry = state.surface(surface)?;
        entry.width = width.max(1);
        entry.height = height.max(1);
        Ok(())
    }

    fn present_pixels(
        &self,
        surface: SurfaceHandle,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> PlatformResult<()> {
        let mut state = lock(&self.state);
        let expected = width as usize * height as usize * 4;
        if pixels.len() != expected {
            return Err(PlatformError::InvalidPixels { expected, actual: pixels.len() });
        }
        state.surface(surface)?.presents += 1;
        state.stats.presents += 1;
        Ok(())
    }

    fn release_surface(&self, surface: SurfaceHandle) -> PlatformResult<()> {
        let mut state = lock(&self.state);
        state.surface(surface)?;
        state.surfaces.remove(&surface.0);
        state.stats.surfaces_released += 1;
        Ok(())
    }

    fn create_graphics_context(
        &self,
        surface: SurfaceHandle,
        share: Option<GraphicsContextHandle>,
    ) -> PlatformResult<GraphicsContextHandle> {
        let mut state = lock(&self.state);
        if state.failures.graphics_contexts {
            return Err(PlatformError::CreationFailed("graphics context".to_string()));
        }
        state.surface(surface)?;
        if let Some(share) = share {
            state.context(share)?;
        }

        let id = self.allocate();
        state.contexts.insert(
            id,
            HeadlessContext { surface, share, current_thread: None, swaps: 0 },
        );
        state.stats.contexts_created += 1;
        Ok(GraphicsContextHandle(id))
    }

    fn make_current(&self, context: GraphicsContextHandle) -> PlatformResult<()> {
        lock(&self.state).context(context)?.current_thread = Some(thread::current().id());
        Ok(())
    }

    fn swap_buffers(&self, context: GraphicsContextHandle) -> PlatformResult<()> {
        let mut state = lock(&self.state);
        let caller = thread::current();
        let entry = state.context(context)?;
        if entry.current_thread != Some(caller.id()) {
            state.stats.cross_thread_violations += 1;
            return Err(PlatformError::NotCurrent {
                context: context.0,
                thread: caller.name().unwrap_or("<unnamed>").to_string(),
            });
        }
        entry.swaps += 1;
        state.stats.swaps += 1;
        Ok(())
    }

    fn destroy_graphics_context(&self, context: GraphicsContextHandle) -> PlatformResult<()> {
        let mut state = lock(&self.state);
        state.context(context)?;
        state.contexts.remove(&context.0);
        state.stats.contexts_destroyed += 1;
        Ok(())
    }
}
