//! Per-backend context pools

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use super::{Context, ContextStatus};
use crate::backend::{BackendTag, GraphicsBackend};
use crate::foundation::sync::{read, write};

/// Master context of one backend type plus every duplicate made from it
#[derive(Debug)]
pub struct BackendState {
    master: Arc<Context>,
    duplicates: Vec<Arc<Context>>,
}

impl BackendState {
    fn new(master: Context) -> Self {
        Self { master: Arc::new(master), duplicates: Vec::new() }
    }

    /// The master context
    pub const fn master(&self) -> &Arc<Context> {
        &self.master
    }

    /// Duplicates created so far, free or not
    pub fn duplicates(&self) -> &[Arc<Context>] {
        &self.duplicates
    }

    /// Master followed by every duplicate
    pub fn contexts(&self) -> impl Iterator<Item = &Arc<Context>> {
        std::iter::once(&self.master).chain(self.duplicates.iter())
    }

    /// Contexts currently available
    pub fn free_count(&self) -> usize {
        self.contexts().filter(|ctx| ctx.is_free()).count()
    }

    /// Contexts currently attached to a window
    pub fn attached_count(&self) -> usize {
        self.contexts()
            .filter(|ctx| ctx.status() == ContextStatus::Attached)
            .count()
    }

    fn acquire(&mut self) -> Arc<Context> {
        if let Some(ctx) = self.contexts().find(|ctx| ctx.try_reserve()) {
            return Arc::clone(ctx);
        }

        let duplicate = Arc::new(self.master.clone_context());
        let reserved = duplicate.try_reserve();
        debug_assert!(reserved, "fresh duplicate must be free");
        log::debug!(
            "Cloned {} context #{} (pool size {})",
            duplicate.tag(),
            duplicate.serial(),
            self.duplicates.len() + 2
        );
        self.duplicates.push(Arc::clone(&duplicate));
        duplicate
    }
}

/// Process-wide table of context pools keyed by backend type
///
/// Created empty; [`ContextRegistry::initialize_all_contexts`] builds one
/// master per backend exactly once. Later calls are no-ops.
#[derive(Debug, Default)]
pub struct ContextRegistry {
    pools: RwLock<BTreeMap<BackendTag, BackendState>>,
    initialized: AtomicBool,
}

impl ContextRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the master context of every backend
    ///
    /// Returns `true` when this call performed the initialization. A backend
    /// whose tag is already registered is ignored.
    pub fn initialize_all_contexts<I>(&self, backends: I) -> bool
    where
        I: IntoIterator<Item = Arc<dyn GraphicsBackend>>,
    {
        if self
            .initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::debug!("Context registry already initialized");
            return false;
        }

        let mut pools = write(&self.pools);
        for backend in backends {
            let tag = backend.tag();
            if pools.contains_key(&tag) {
                log::warn!("Ignoring second {} backend prototype", tag);
                continue;
            }
            pools.insert(tag, BackendState::new(Context::master(backend)));
        }
        log::info!(
            "Context registry ready with backends: {}",
            pools.keys().map(|tag| tag.name()).collect::<Vec<_>>().join(", ")
        );
        true
    }

    /// Whether the masters have been created
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Whether a master exists for `tag`
    pub fn has_master(&self, tag: BackendTag) -> bool {
        read(&self.pools).contains_key(&tag)
    }

    /// Master context for `tag`
    pub fn master(&self, tag: BackendTag) -> Option<Arc<Context>> {
        read(&self.pools).get(&tag).map(|state| Arc::clone(state.master()))
    }

    /// Registered backend types
    pub fn tags(&self) -> Vec<BackendTag> {
        read(&self.pools).keys().copied().collect()
    }

    /// Reserve a free context of `tag`, cloning the master when none is free
    ///
    /// The master itself is handed out while it is free. Returns `None` when
    /// no master exists for `tag`.
    pub fn acquire(&self, tag: BackendTag) -> Option<Arc<Context>> {
        write(&self.pools).get_mut(&tag).map(BackendState::acquire)
    }

    /// Run `f` on the pool of `tag`
    pub fn with_pool<R>(&self, tag: BackendTag, f: impl FnOnce(&BackendState) -> R) -> Option<R> {
        read(&self.pools).get(&tag).map(f)
    }

    /// Total contexts (master plus duplicates) of `tag`
    pub fn pool_size(&self, tag: BackendTag) -> usize {
        self.with_pool(tag, |pool| pool.duplicates().len() + 1)
            .unwrap_or(0)
    }

    /// `(total, free)` context counts of `tag`
    pub fn pool_sizes(&self, tag: BackendTag) -> (usize, usize) {
        self.with_pool(tag, |pool| (pool.duplicates().len() + 1, pool.free_count()))
            .unwrap_or((0, 0))
    }

    /// Duplicates created for `tag`
    pub fn duplicate_count(&self, tag: BackendTag) -> usize {
        self.with_pool(tag, |pool| pool.duplicates().len())
            .unwrap_or(0)
    }

    /// Contexts of `tag` available for new windows
    pub fn free_count(&self, tag: BackendTag) -> usize {
        self.with_pool(tag, BackendState::free_count).unwrap_or(0)
    }

    /// Contexts of `tag` attached to windows
    pub fn attached_count(&self, tag: BackendTag) -> usize {
        self.with_pool(tag, BackendState::attached_count)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{default_backends, NoopBackend, RasterBackend};
    use crate::context::ContextRole;

    fn registry() -> ContextRegistry {
        let registry = ContextRegistry::new();
        assert!(registry.initialize_all_contexts(default_backends()));
        registry
    }

    #[test]
    fn test_initialize_is_one_shot() {
        let registry = registry();
        let master = registry.master(BackendTag::Raster).unwrap();

        let again: Vec<Arc<dyn GraphicsBackend>> = vec![Arc::new(RasterBackend::new())];
        assert!(!registry.initialize_all_contexts(again));
        assert!(Arc::ptr_eq(&master, &registry.master(BackendTag::Raster).unwrap()));
        assert_eq!(registry.tags(), BackendTag::ALL.to_vec());
    }

    #[test]
    fn test_first_acquire_hands_out_master() {
        let registry = registry();
        let first = registry.acquire(BackendTag::Raster).unwrap();
        assert_eq!(first.role(), ContextRole::Master);
        assert_eq!(registry.duplicate_count(BackendTag::Raster), 0);

        let second = registry.acquire(BackendTag::Raster).unwrap();
        assert_eq!(second.role(), ContextRole::Duplicate);
        assert_eq!(registry.pool_size(BackendTag::Raster), 2);
        assert_eq!(registry.free_count(BackendTag::Raster), 0);
    }

    #[test]
    fn test_released_context_is_reused() {
        let registry = registry();
        let a = registry.acquire(BackendTag::Noop).unwrap();
        let b = registry.acquire(BackendTag::Noop).unwrap();

        b.detach();
        assert_eq!(registry.free_count(BackendTag::Noop), 0);
        b.release();

        let c = registry.acquire(BackendTag::Noop).unwrap();
        assert!(Arc::ptr_eq(&b, &c));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.pool_size(BackendTag::Noop), 2);
    }

    #[test]
    fn test_missing_master() {
        let registry = ContextRegistry::new();
        let only_noop: Vec<Arc<dyn GraphicsBackend>> = vec![Arc::new(NoopBackend::new())];
        registry.initialize_all_contexts(only_noop);

        assert!(registry.acquire(BackendTag::Raster).is_none());
        assert!(!registry.has_master(BackendTag::Raster));
        assert_eq!(registry.pool_size(BackendTag::Raster), 0);
    }

    #[test]
    fn test_duplicate_prototypes_are_ignored() {
        let registry = ContextRegistry::new();
        let backends: Vec<Arc<dyn GraphicsBackend>> =
            vec![Arc::new(NoopBackend::new()), Arc::new(NoopBackend::new())];
        registry.initialize_all_contexts(backends);
        assert_eq!(registry.tags(), vec![BackendTag::Noop]);
    }
}
