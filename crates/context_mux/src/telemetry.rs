//! Per-window telemetry hooks
//!
//! The multiplexer reports applied resizes and per-frame queue depth through
//! a [`TelemetrySink`]. [`LogTelemetry`] forwards to `log` at trace level;
//! [`CountingTelemetry`] keeps counters that can be inspected.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::backend::BackendTag;
use crate::foundation::sync::lock;
use crate::window::WindowId;

/// Receiver of multiplexer telemetry
pub trait TelemetrySink: Send + Sync {
    /// A resize pass finished applying for `window`
    fn resize_applied(&self, tag: BackendTag, window: WindowId, width: u32, height: u32);

    /// Command queue depth sampled at the start of a frame
    fn queue_depth(&self, tag: BackendTag, window: WindowId, depth: usize);
}

/// Telemetry written to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTelemetry;

impl TelemetrySink for LogTelemetry {
    fn resize_applied(&self, tag: BackendTag, window: WindowId, width: u32, height: u32) {
        log::trace!(
            target: "context_mux::telemetry",
            "resize {} {:?} -> {}x{}",
            tag,
            window,
            width,
            height
        );
    }

    fn queue_depth(&self, tag: BackendTag, window: WindowId, depth: usize) {
        if depth > 0 {
            log::trace!(target: "context_mux::telemetry", "queue {} {:?} depth {}", tag, window, depth);
        }
    }
}

/// Telemetry kept in memory
#[derive(Debug, Default)]
pub struct CountingTelemetry {
    resizes: Mutex<HashMap<WindowId, u64>>,
    last_size: Mutex<HashMap<WindowId, (u32, u32)>>,
    depths: Mutex<HashMap<WindowId, usize>>,
    max_depth: AtomicUsize,
    samples: AtomicU64,
}

impl CountingTelemetry {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize passes applied to `window`
    pub fn resize_count(&self, window: WindowId) -> u64 {
        lock(&self.resizes).get(&window).copied().unwrap_or(0)
    }

    /// Resize passes applied across all windows
    pub fn total_resizes(&self) -> u64 {
        lock(&self.resizes).values().sum()
    }

    /// Size of the last applied resize of `window`
    pub fn last_resize(&self, window: WindowId) -> Option<(u32, u32)> {
        lock(&self.last_size).get(&window).copied()
    }

    /// Most recent queue depth sample of `window`
    pub fn last_depth(&self, window: WindowId) -> Option<usize> {
        lock(&self.depths).get(&window).copied()
    }

    /// Deepest queue seen on any window
    pub fn max_depth(&self) -> usize {
        self.max_depth.load(Ordering::Relaxed)
    }

    /// Number of queue depth samples taken
    pub fn depth_samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }
}

impl TelemetrySink for CountingTelemetry {
    fn resize_applied(&self, _tag: BackendTag, window: WindowId, width: u32, height: u32) {
        *lock(&self.resizes).entry(window).or_insert(0) += 1;
        lock(&self.last_size).insert(window, (width, height));
    }

    fn queue_depth(&self, _tag: BackendTag, window: WindowId, depth: usize) {
        lock(&self.depths).insert(window, depth);
        self.max_depth.fetch_max(depth, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
    }
}
