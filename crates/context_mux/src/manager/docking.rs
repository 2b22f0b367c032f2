//! Docking grid layout and drag-to-dock gestures

use super::{MultiContextManager, MuxError};
use crate::foundation::sync::lock;
use crate::platform::{NativeWindow, Point, Rect, WindowStyle};
use crate::window::resize::ResizeRequest;
use crate::window::{WindowData, WindowId};

/// Smallest grid holding `count` cells
///
/// Grows from 1x1, adding a column while `cols <= rows` and a row otherwise.
pub fn grid_dimensions(count: usize) -> (usize, usize) {
    let (mut cols, mut rows) = (1, 1);
    while cols * rows < count {
        if cols <= rows {
            cols += 1;
        } else {
            rows += 1;
        }
    }
    (cols, rows)
}

/// Cell rectangles for `count` windows in a `width` x `height` client area
///
/// Cells are relative to the client origin, in row-major order.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub fn grid_cells(width: u32, height: u32, count: usize) -> Vec<Rect> {
    if count == 0 {
        return Vec::new();
    }
    let (cols, rows) = grid_dimensions(count);
    let cell_width = (width / cols as u32).max(1);
    let cell_height = (height / rows as u32).max(1);

    (0..count)
        .map(|index| {
            let col = (index % cols) as u32;
            let row = (index / cols) as u32;
            Rect::new(
                (col * cell_width) as i32,
                (row * cell_height) as i32,
                cell_width,
                cell_height,
            )
        })
        .collect()
}

/// In-progress drag gesture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DragState {
    /// A drag is in progress
    pub dragging: bool,
    /// Window being dragged
    pub dragged: Option<WindowId>,
    /// Container the window can dock into
    pub original_parent: Option<NativeWindow>,
    /// Pointer position of the last move, in screen space
    pub last_mouse: Point,
    /// Dock or undock transitions during this drag
    pub transitions: u32,
}

impl DragState {
    /// Forget the gesture
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Effect of one drag move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    /// No drag in progress
    Idle,
    /// Window moved without changing its docking
    Moved,
    /// Window entered the container and became a child
    Docked,
    /// Window left the container and became top-level
    Undocked,
}

impl MultiContextManager {
    /// Tile every docked window into the parent's client area
    ///
    /// Returns the number of windows arranged.
    pub fn arrange_docked_windows_grid(&self) -> usize {
        let Some(parent) = self.parent_window() else {
            return 0;
        };
        let client = match self.platform.client_rect(parent) {
            Ok(client) => client,
            Err(e) => {
                log::warn!("Cannot arrange docked windows: {}", e);
                return 0;
            }
        };

        let docked: Vec<_> = self
            .windows()
            .into_iter()
            .filter(|window| self.is_docked(window))
            .collect();

        let cells = grid_cells(client.width, client.height, docked.len());
        for (window, cell) in docked.iter().zip(&cells) {
            let placed = window.with_native_window(|native| self.platform.move_window(native, *cell));
            if let Some(Err(e)) = placed {
                log::warn!("Failed to place '{}': {}", window.title(), e);
            }
            window.dispatch_resize(ResizeRequest::new(cell.width, cell.height));
        }

        let (cols, rows) = grid_dimensions(docked.len());
        log::debug!(
            "Arranged {} docked windows in a {}x{} grid",
            docked.len(),
            cols,
            rows
        );
        docked.len()
    }

    /// Pointer pressed on a window: start a drag
    ///
    /// `mouse` is in screen space.
    pub fn begin_drag(&self, id: WindowId, mouse: Point) -> Result<(), MuxError> {
        if self.window(id).is_none() {
            return Err(MuxError::UnknownWindow(id));
        }
        let original_parent = self.parent_window();
        *lock(&self.drag) = DragState {
            dragging: true,
            dragged: Some(id),
            original_parent,
            last_mouse: mouse,
            transitions: 0,
        };
        log::debug!("Drag started on {:?}", id);
        Ok(())
    }

    /// Pointer moved during a drag
    ///
    /// Moves the window by the pointer delta. A top-level window whose moved
    /// rectangle lies inside the container's client area docks into it; a
    /// docked window moved outside becomes top-level with its client size kept.
    pub fn drag_move(&self, mouse: Point) -> Result<DragOutcome, MuxError> {
        let state = {
            let mut drag = lock(&self.drag);
            if !drag.dragging {
                return Ok(DragOutcome::Idle);
            }
            let previous = *drag;
            drag.last_mouse = mouse;
            previous
        };
        let Some(id) = state.dragged else {
            return Ok(DragOutcome::Idle);
        };
        let Some(window) = self.window(id) else {
            lock(&self.drag).reset();
            return Ok(DragOutcome::Idle);
        };

        let dx = mouse.x - state.last_mouse.x;
        let dy = mouse.y - state.last_mouse.y;
        let outcome = window
            .with_native_window(|native| self.drag_native(&window, native, &state, dx, dy))
            .ok_or(MuxError::NoNativeWindow(id))??;

        if matches!(outcome, DragOutcome::Docked | DragOutcome::Undocked) {
            lock(&self.drag).transitions += 1;
        }
        Ok(outcome)
    }

    /// Move a dragged window by `(dx, dy)`, docking or undocking it as needed
    fn drag_native(
        &self,
        window: &WindowData,
        native: NativeWindow,
        state: &DragState,
        dx: i32,
        dy: i32,
    ) -> Result<DragOutcome, MuxError> {
        let candidate = self.platform.window_rect(native)?.offset(dx, dy);
        let is_child = self.platform.style(native)?.contains(WindowStyle::CHILD);

        let container = match state.original_parent {
            Some(parent) => Some((parent, self.platform.client_rect(parent)?)),
            None => None,
        };

        let outcome = match container {
            Some((parent, parent_client)) if !is_child && parent_client.contains_rect(&candidate) => {
                let client = self.platform.client_rect(native)?.offset(dx, dy);
                self.platform.set_parent(native, Some(parent))?;
                self.platform.set_style(native, WindowStyle::DOCKED)?;
                self.platform.move_window(
                    native,
                    client.offset(-parent_client.x, -parent_client.y),
                )?;
                log::info!("Docked '{}'", window.title());
                DragOutcome::Docked
            }
            Some((_, parent_client)) if is_child && !parent_client.contains_rect(&candidate) => {
                let client = self.platform.client_rect(native)?.offset(dx, dy);
                self.platform.set_parent(native, None)?;
                self.platform.set_style(native, WindowStyle::TOP_LEVEL)?;
                let outer = self.platform.frame_for_client(client, WindowStyle::TOP_LEVEL);
                self.platform.move_window(native, outer)?;
                log::info!("Undocked '{}'", window.title());
                DragOutcome::Undocked
            }
            Some((_, parent_client)) if is_child => {
                self.platform
                    .move_window(native, candidate.offset(-parent_client.x, -parent_client.y))?;
                DragOutcome::Moved
            }
            _ => {
                self.platform.move_window(native, candidate)?;
                DragOutcome::Moved
            }
        };
        Ok(outcome)
    }

    /// Pointer released: end the drag
    ///
    /// Re-tiles the container when the window docked or undocked during the
    /// gesture.
    pub fn end_drag(&self) -> DragState {
        let finished = {
            let mut drag = lock(&self.drag);
            let finished = *drag;
            drag.reset();
            finished
        };
        if finished.transitions > 0 {
            self.arrange_docked_windows_grid();
        }
        finished
    }

    /// Current drag gesture
    pub fn drag_state(&self) -> DragState {
        *lock(&self.drag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_dimensions_grow_columns_first() {
        assert_eq!(grid_dimensions(0), (1, 1));
        assert_eq!(grid_dimensions(1), (1, 1));
        assert_eq!(grid_dimensions(2), (2, 1));
        assert_eq!(grid_dimensions(3), (2, 2));
        assert_eq!(grid_dimensions(4), (2, 2));
        assert_eq!(grid_dimensions(5), (3, 2));
        assert_eq!(grid_dimensions(7), (3, 3));
        assert_eq!(grid_dimensions(10), (4, 3));
    }

    #[test]
    fn test_grid_law_holds() {
        for count in 1..50 {
            let (cols, rows) = grid_dimensions(count);
            assert!(cols * rows >= count);
            assert!(cols >= rows);
            assert!(cols - rows <= 1);
        }
    }

    #[test]
    fn test_cells_fit_inside_client_without_overlap() {
        let client = Rect::new(0, 0, 1000, 700);
        for count in 1..20 {
            let cells = grid_cells(client.width, client.height, count);
            assert_eq!(cells.len(), count);
            for (i, a) in cells.iter().enumerate() {
                assert!(client.contains_rect(a), "cell {a:?} outside client");
                for b in &cells[i + 1..] {
                    assert!(!a.intersects(b), "{a:?} overlaps {b:?}");
                }
            }
        }
    }

    #[test]
    fn test_tiny_client_clamps_cells() {
        let cells = grid_cells(1, 1, 4);
        assert!(cells.iter().all(|cell| cell.width == 1 && cell.height == 1));
    }
}
