//! Docking grid and drag-to-dock scenarios

use super::Harness;
use crate::backend::BackendTag;
use crate::core::config::WindowCounts;
use crate::manager::{DragOutcome, DragState};
use crate::platform::{NativePlatform, NativeWindow, Point, WindowStyle};
use crate::window::WindowId;

#[cfg(test)]
mod tests {
    use super::*;

    fn docked_harness(count: usize) -> Harness {
        let harness = Harness::new();
        harness.wire_resize_events();
        let counts = WindowCounts::default().with(BackendTag::Raster, count);
        harness.manager.initialize(&counts, true).unwrap();
        harness
    }

    fn native(harness: &Harness, id: WindowId) -> NativeWindow {
        harness.manager.window(id).unwrap().native_window().unwrap()
    }

    fn assert_tiled(harness: &Harness) {
        let parent = harness.manager.parent_window().unwrap();
        let client = harness.platform.client_rect(parent).unwrap();
        let rects: Vec<_> = harness
            .manager
            .window_ids()
            .into_iter()
            .map(|id| harness.platform.window_rect(native(harness, id)).unwrap())
            .collect();

        for (i, a) in rects.iter().enumerate() {
            assert!(client.contains_rect(a), "{a:?} outside {client:?}");
            for b in &rects[i + 1..] {
                assert!(!a.intersects(b), "{a:?} overlaps {b:?}");
            }
        }
    }

    #[test]
    fn test_parented_windows_tile_the_container() {
        let harness = docked_harness(3);
        let parent = harness.manager.parent_window().unwrap();

        let client = harness.platform.client_rect(parent).unwrap();
        assert_eq!((client.width, client.height), (960, 720));

        for window in harness.manager.windows() {
            let native = window.native_window().unwrap();
            assert_eq!(harness.platform.parent(native).unwrap(), Some(parent));
            assert!(harness.platform.style(native).unwrap().contains(WindowStyle::CHILD));
            assert_eq!(window.size(), (480, 360));
            assert_eq!(window.context().size(), (480, 360));
        }
        assert_tiled(&harness);
    }

    #[test]
    fn test_parent_resize_retiles() {
        let harness = docked_harness(3);
        let parent = harness.manager.parent_window().unwrap();

        harness.platform.set_client_size(parent, 1200, 900).unwrap();

        for window in harness.manager.windows() {
            assert_eq!(window.size(), (600, 450));
        }
        assert_tiled(&harness);
        assert_eq!(harness.manager.handle_parent_resize(1200, 900), 3);
    }

    #[test]
    fn test_removing_docked_window_retiles_rest() {
        let harness = docked_harness(3);
        let last = *harness.manager.window_ids().last().unwrap();

        harness.manager.remove_window(last).unwrap();

        assert_eq!(harness.manager.window_count(), 2);
        for window in harness.manager.windows() {
            assert_eq!(window.size(), (480, 720));
        }
        assert_tiled(&harness);
        assert!(harness.drain_retired());
    }

    #[test]
    fn test_drag_undock_then_redock() {
        let harness = docked_harness(3);
        let parent = harness.manager.parent_window().unwrap();
        let id = harness.manager.window_ids()[2];
        let native = native(&harness, id);
        let docked_client = harness.platform.client_rect(native).unwrap();

        harness.manager.begin_drag(id, Point::new(10, 10)).unwrap();
        assert!(harness.manager.drag_state().dragging);

        // Far outside the container
        assert_eq!(
            harness.manager.drag_move(Point::new(2010, 10)).unwrap(),
            DragOutcome::Undocked
        );
        let floating = harness.platform.client_rect(native).unwrap();
        assert_eq!((floating.width, floating.height), (docked_client.width, docked_client.height));
        assert_eq!((floating.x, floating.y), (docked_client.x + 2000, docked_client.y));
        assert_eq!(harness.platform.parent(native).unwrap(), None);
        assert_eq!(harness.platform.style(native).unwrap(), WindowStyle::TOP_LEVEL);

        // Still outside: plain move
        assert_eq!(harness.manager.drag_move(Point::new(2020, 10)).unwrap(), DragOutcome::Moved);

        // Whole frame back inside the container's client area
        assert_eq!(
            harness.manager.drag_move(Point::new(120, -90)).unwrap(),
            DragOutcome::Docked
        );
        assert_eq!(harness.platform.parent(native).unwrap(), Some(parent));
        assert_eq!(harness.platform.style(native).unwrap(), WindowStyle::DOCKED);

        let finished = harness.manager.end_drag();
        assert_eq!(finished.dragged, Some(id));
        assert_eq!(finished.transitions, 2);
        assert_eq!(harness.manager.drag_state(), DragState::default());

        assert_eq!(harness.manager.window(id).unwrap().size(), (480, 360));
        assert_tiled(&harness);
    }

    #[test]
    fn test_drag_without_begin_is_idle() {
        let harness = docked_harness(1);
        assert_eq!(harness.manager.drag_move(Point::new(5, 5)).unwrap(), DragOutcome::Idle);
        assert_eq!(harness.manager.end_drag(), DragState::default());
    }

    #[test]
    fn test_removing_dragged_window_cancels_drag() {
        let harness = docked_harness(2);
        let id = harness.manager.window_ids()[0];

        harness.manager.begin_drag(id, Point::new(0, 0)).unwrap();
        harness.manager.remove_window(id).unwrap();

        assert!(!harness.manager.drag_state().dragging);
        assert_eq!(harness.manager.drag_move(Point::new(50, 50)).unwrap(), DragOutcome::Idle);
    }

    #[test]
    fn test_top_level_windows_cascade() {
        let harness = Harness::new();
        let counts = WindowCounts::default().with(BackendTag::Noop, 2);
        harness.manager.initialize(&counts, false).unwrap();

        assert_eq!(harness.manager.parent_window(), None);
        let origins: Vec<_> = harness
            .manager
            .window_ids()
            .into_iter()
            .map(|id| harness.platform.window_rect(native(&harness, id)).unwrap().origin())
            .collect();
        assert_ne!(origins[0], origins[1]);
        assert_eq!(harness.manager.arrange_docked_windows_grid(), 0);
    }
}
