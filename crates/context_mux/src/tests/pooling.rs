//! Context pooling across window creation and removal

use std::collections::HashSet;
use std::sync::Arc;

use super::{wait_until, Harness};
use crate::backend::{BackendTag, GraphicsBackend, NoopBackend};
use crate::context::{ContextRole, ContextStatus};
use crate::config::ConfigError;
use crate::core::config::{MultiplexerConfig, WindowCounts};
use crate::manager::{MultiContextManager, MuxError};
use crate::platform::headless::HeadlessPlatform;

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_one_context_per_window(harness: &Harness) {
        let mut seen = HashSet::new();
        for window in harness.manager.windows() {
            let ctx = window.context();
            assert!(seen.insert(ctx.serial()), "context #{} attached twice", ctx.serial());
            assert_eq!(ctx.status(), ContextStatus::Attached);
            assert!(Arc::ptr_eq(&ctx.window().unwrap(), &window));
        }
    }

    #[test]
    fn test_attached_contexts_match_requested_counts() {
        let combos = [
            WindowCounts::default().with(BackendTag::Raster, 3),
            WindowCounts::default()
                .with(BackendTag::Raster, 1)
                .with(BackendTag::Noop, 4),
            WindowCounts::default()
                .with(BackendTag::Retained, 2)
                .with(BackendTag::Hosted, 2)
                .with(BackendTag::Noop, 1),
        ];

        for counts in combos {
            let harness = Harness::new();
            harness.manager.initialize(&counts, false).unwrap();
            assert_eq!(harness.manager.window_count(), counts.total());

            let registry = harness.manager.registry();
            for tag in BackendTag::ALL {
                let requested = counts.count(tag);
                assert_eq!(registry.attached_count(tag), requested, "{tag} attached");
                assert_eq!(registry.duplicate_count(tag), requested.saturating_sub(1), "{tag} clones");
            }
            assert_one_context_per_window(&harness);
        }
    }

    #[test]
    fn test_first_window_draws_master() {
        let harness = Harness::new();
        let counts = WindowCounts::default().with(BackendTag::Noop, 2);
        harness.manager.initialize(&counts, false).unwrap();

        let roles: Vec<_> = harness
            .manager
            .windows()
            .iter()
            .map(|window| window.context().role())
            .collect();
        assert_eq!(roles, vec![ContextRole::Master, ContextRole::Duplicate]);
    }

    #[test]
    fn test_removed_window_context_is_reused() {
        let harness = Harness::new();
        let counts = WindowCounts::default().with(BackendTag::Raster, 2);
        harness.manager.initialize(&counts, false).unwrap();

        let victim = harness.manager.window_ids()[1];
        let released_ctx = harness.manager.context(victim).unwrap();
        let released = Arc::clone(released_ctx.backend());
        harness.manager.remove_window(victim).unwrap();
        assert_ne!(released_ctx.status(), ContextStatus::Attached);
        assert!(harness.drain_retired());
        assert!(released_ctx.is_free());
        assert!(released_ctx.natives().is_empty());

        let replacement = harness.manager.add_window(BackendTag::Raster, Some("replacement")).unwrap();
        let reused = harness.manager.context(replacement).unwrap();
        assert!(Arc::ptr_eq(&reused, &released_ctx));
        assert!(Arc::ptr_eq(reused.backend(), &released));
        assert_eq!(harness.manager.registry().pool_sizes(BackendTag::Raster), (2, 0));

        let window = harness.manager.window(replacement).unwrap();
        assert!(wait_until(|| window.context().backend().is_initialized()));
        assert_one_context_per_window(&harness);
    }

    #[test]
    fn test_validation_errors_have_no_side_effects() {
        let harness = Harness::new();

        assert!(matches!(
            harness.manager.initialize(&WindowCounts::default(), true),
            Err(MuxError::NoWindowsRequested)
        ));
        assert_eq!(harness.platform.stats().windows_created, 0);
        assert_eq!(harness.manager.parent_window(), None);
    }

    #[test]
    fn test_invalid_config_creates_nothing() {
        let configs = [
            MultiplexerConfig::default().with_frame_interval_ms(0),
            MultiplexerConfig::default().with_cell_size(0, 300).with_parented(true),
        ];

        for config in configs {
            let platform = Arc::new(HeadlessPlatform::new());
            let manager = MultiContextManager::new(platform.clone(), config);

            assert!(matches!(
                manager.initialize_from_config(),
                Err(MuxError::Config(ConfigError::Invalid(_)))
            ));
            assert_eq!(manager.window_count(), 0);
            assert_eq!(platform.stats().windows_created, 0);
        }
    }

    #[test]
    fn test_missing_master_is_rejected() {
        let backends: Vec<Arc<dyn GraphicsBackend>> = vec![Arc::new(NoopBackend::new())];
        let harness = Harness::with_backends(backends);
        let counts = WindowCounts::default()
            .with(BackendTag::Noop, 1)
            .with(BackendTag::Raster, 1);

        assert!(matches!(
            harness.manager.initialize(&counts, true),
            Err(MuxError::MissingMaster(BackendTag::Raster))
        ));
        assert!(matches!(
            harness.manager.add_window(BackendTag::Hosted, None),
            Err(MuxError::MissingMaster(BackendTag::Hosted))
        ));
        assert_eq!(harness.platform.stats().windows_created, 0);
        assert_eq!(harness.manager.window_count(), 0);
    }
}
