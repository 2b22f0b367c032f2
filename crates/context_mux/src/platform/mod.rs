//! # Native Platform Abstraction
//!
//! The multiplexer never talks to a windowing API directly. Everything that
//! touches native state goes through [`NativePlatform`]: window creation,
//! reparenting, restyling, moving and resizing, drawing surfaces and graphics
//! contexts.
//!
//! ## Coordinate Conventions
//!
//! - `window_rect` and `client_rect` are always reported in screen space
//! - `move_window` takes the outer rectangle in the parent's client space for
//!   child windows and in screen space for top-level windows
//! - `frame_for_client` maps a client rectangle to the outer rectangle a
//!   window of the given style needs (the non-client frame)
//!
//! ## Threading
//!
//! Implementations must be `Send + Sync`: the manager thread, render threads
//! and OS event threads all call in. Graphics contexts follow the usual rule
//! that `swap_buffers` is only valid on the thread that made the context
//! current.

pub mod headless;

use bitflags::bitflags;
use thiserror::Error;

/// Result type for platform operations
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Handle to a native window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeWindow(pub u64);

/// Handle to a drawable surface bound to a native window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// Handle to a native graphics context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphicsContextHandle(pub u64);

/// Integer point in window or screen space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    /// Horizontal coordinate
    pub x: i32,
    /// Vertical coordinate
    pub y: i32,
}

impl Point {
    /// Create a new point
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Integer rectangle with a top-left origin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge
    pub x: i32,
    /// Top edge
    pub y: i32,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Rect {
    /// Create a new rectangle
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Top-left corner
    pub const fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Exclusive right edge
    #[allow(clippy::cast_possible_wrap)]
    pub const fn right(&self) -> i32 {
        self.x + self.width as i32
    }

    /// Exclusive bottom edge
    #[allow(clippy::cast_possible_wrap)]
    pub const fn bottom(&self) -> i32 {
        self.y + self.height as i32
    }

    /// Rectangle moved by a delta
    #[must_use]
    pub const fn offset(&self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Rectangle with the same size at a new origin
    #[must_use]
    pub const fn at(&self, origin: Point) -> Self {
        Self::new(origin.x, origin.y, self.width, self.height)
    }

    /// Whether `other` lies entirely inside this rectangle
    pub const fn contains_rect(&self, other: &Self) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    /// Whether the two rectangles share any area
    pub const fn intersects(&self, other: &Self) -> bool {
        self.x < other.right()
            && other.x < self.right()
            && self.y < other.bottom()
            && other.y < self.bottom()
    }
}

bitflags! {
    /// Native window style bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WindowStyle: u32 {
        /// Lives inside a parent's client area
        const CHILD = 1 << 0;
        /// Has a title bar
        const CAPTION = 1 << 1;
        /// Has a sizing border
        const RESIZABLE = 1 << 2;
        /// Shown on screen
        const VISIBLE = 1 << 3;
        /// Does not paint over sibling windows
        const CLIP_SIBLINGS = 1 << 4;

        /// Regular decorated top-level window
        const TOP_LEVEL = Self::CAPTION.bits() | Self::RESIZABLE.bits() | Self::VISIBLE.bits();
        /// Undecorated window docked into a container
        const DOCKED = Self::CHILD.bits() | Self::VISIBLE.bits() | Self::CLIP_SIBLINGS.bits();
    }
}

/// Parameters for creating a native window
#[derive(Debug, Clone)]
pub struct WindowDesc {
    /// Title bar text
    pub title: String,
    /// Top-left corner of the outer rectangle (parent-relative for children)
    pub position: Point,
    /// Client area width
    pub width: u32,
    /// Client area height
    pub height: u32,
    /// Style bits
    pub style: WindowStyle,
    /// Parent window for child windows
    pub parent: Option<NativeWindow>,
}

impl WindowDesc {
    /// Describe a decorated top-level window
    pub fn top_level(title: impl Into<String>, position: Point, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            position,
            width,
            height,
            style: WindowStyle::TOP_LEVEL,
            parent: None,
        }
    }

    /// Describe an undecorated child docked into `parent`
    pub fn docked(
        title: impl Into<String>,
        parent: NativeWindow,
        position: Point,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            title: title.into(),
            position,
            width,
            height,
            style: WindowStyle::DOCKED,
            parent: Some(parent),
        }
    }

    /// Describe an invisible helper window
    pub fn hidden(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            position: Point::default(),
            width: 1,
            height: 1,
            style: WindowStyle::empty(),
            parent: None,
        }
    }
}

/// Errors reported by the native layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// A handle was used after it had been released
    #[error("{kind} handle {id} is not alive")]
    StaleHandle {
        /// Handle category
        kind: &'static str,
        /// Raw handle value
        id: u64,
    },

    /// Native resource creation failed
    #[error("Failed to create {0}")]
    CreationFailed(String),

    /// Graphics context used on a thread it is not current on
    #[error("Graphics context {context} is not current on thread {thread}")]
    NotCurrent {
        /// Raw context handle
        context: u64,
        /// Offending thread description
        thread: String,
    },

    /// Pixel buffer does not match the surface dimensions
    #[error("Pixel buffer has {actual} bytes, expected {expected}")]
    InvalidPixels {
        /// Bytes required by the surface size
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },
}

/// Platform-ownership interface for native windows and graphics resources
pub trait NativePlatform: Send + Sync {
    /// Human-readable platform name
    fn name(&self) -> &'static str;

    /// Create a native window
    fn create_window(&self, desc: &WindowDesc) -> PlatformResult<NativeWindow>;

    /// Destroy a native window
    fn destroy_window(&self, window: NativeWindow) -> PlatformResult<()>;

    /// Reparent a window; `None` makes it top-level
    fn set_parent(&self, window: NativeWindow, parent: Option<NativeWindow>) -> PlatformResult<()>;

    /// Current parent of a window
    fn parent(&self, window: NativeWindow) -> PlatformResult<Option<NativeWindow>>;

    /// Current style bits
    fn style(&self, window: NativeWindow) -> PlatformResult<WindowStyle>;

    /// Replace the style bits, keeping the outer rectangle
    fn set_style(&self, window: NativeWindow, style: WindowStyle) -> PlatformResult<()>;

    /// Outer rectangle in screen space
    fn window_rect(&self, window: NativeWindow) -> PlatformResult<Rect>;

    /// Client rectangle in screen space
    fn client_rect(&self, window: NativeWindow) -> PlatformResult<Rect>;

    /// Place the outer rectangle (parent-client-relative for children)
    fn move_window(&self, window: NativeWindow, rect: Rect) -> PlatformResult<()>;

    /// Resize the client area, keeping the outer origin
    fn set_client_size(&self, window: NativeWindow, width: u32, height: u32) -> PlatformResult<()>;

    /// Outer rectangle needed for a client rectangle under a style
    fn frame_for_client(&self, client: Rect, style: WindowStyle) -> Rect;

    /// Framebuffer pixels per logical unit
    fn scale_factor(&self, window: NativeWindow) -> PlatformResult<f64>;

    /// Create a drawable surface for a window
    fn create_surface(&self, window: NativeWindow) -> PlatformResult<SurfaceHandle>;

    /// Resize a surface's framebuffer
    fn resize_surface(&self, surface: SurfaceHandle, width: u32, height: u32) -> PlatformResult<()>;

    /// Present an RGBA8 pixel buffer on a surface
    fn present_pixels(
        &self,
        surface: SurfaceHandle,
        width: u32,
        height: u32,
        pixels: &[u8],
    ) -> PlatformResult<()>;

    /// Release a surface
    fn release_surface(&self, surface: SurfaceHandle) -> PlatformResult<()>;

    /// Create a graphics context on a surface, optionally sharing resources
    fn create_graphics_context(
        &self,
        surface: SurfaceHandle,
        share: Option<GraphicsContextHandle>,
    ) -> PlatformResult<GraphicsContextHandle>;

    /// Bind a graphics context to the calling thread
    fn make_current(&self, context: GraphicsContextHandle) -> PlatformResult<()>;

    /// Present the back buffer of a context current on the calling thread
    fn swap_buffers(&self, context: GraphicsContextHandle) -> PlatformResult<()>;

    /// Destroy a graphics context
    fn destroy_graphics_context(&self, context: GraphicsContextHandle) -> PlatformResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_containment() {
        let outer = Rect::new(0, 0, 100, 100);
        assert!(outer.contains_rect(&Rect::new(10, 10, 50, 50)));
        assert!(outer.contains_rect(&outer));
        assert!(!outer.contains_rect(&Rect::new(60, 60, 50, 50)));
        assert!(!outer.contains_rect(&Rect::new(-1, 0, 10, 10)));
    }

    #[test]
    fn test_rect_intersection_is_exclusive() {
        let a = Rect::new(0, 0, 10, 10);
        assert!(a.intersects(&Rect::new(5, 5, 10, 10)));
        assert!(!a.intersects(&Rect::new(10, 0, 10, 10)));
        assert!(!a.intersects(&Rect::new(0, 10, 10, 10)));
    }

    #[test]
    fn test_style_presets() {
        assert!(WindowStyle::DOCKED.contains(WindowStyle::CHILD));
        assert!(!WindowStyle::TOP_LEVEL.contains(WindowStyle::CHILD));
        assert!(WindowStyle::TOP_LEVEL.contains(WindowStyle::CAPTION));
    }
}
