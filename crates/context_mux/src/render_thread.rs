//! Per-window render loop
//!
//! One named OS thread per window. The loop owns the window's context for its
//! lifetime: it initializes deferred backends, drives `process` once per frame
//! at a fixed cadence, and tears the backend down on exit. The frame interval
//! never drops below [`MIN_FRAME_INTERVAL`], so a loop never spins.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::backend::{GraphicsBackend, NoopBackend};
use crate::foundation::panic::panic_message;
use crate::foundation::time::FramePacer;
use crate::window::{InitState, WindowData};

/// Shortest sleep between frames
pub const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);

/// Loop parameters shared by every render thread of one manager
#[derive(Clone)]
pub(crate) struct RenderLoopSettings {
    pub running: Arc<AtomicBool>,
    pub frame_interval: Duration,
}

/// Start the render thread of `window`
pub(crate) fn spawn(
    window: Arc<WindowData>,
    settings: RenderLoopSettings,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("render-{}", window.title()))
        .spawn(move || run(&window, &settings))
}

fn run(window: &WindowData, settings: &RenderLoopSettings) {
    let context = window.context();
    context.set_owner(Some(thread::current().id()));
    log::debug!("Render thread started for '{}'", window.title());

    if window.init_state() == InitState::Pending {
        window.initialize_backend();
    }

    let inert = NoopBackend::new();
    let mut pacer = FramePacer::new(settings.frame_interval.max(MIN_FRAME_INTERVAL));

    while window.is_running() && settings.running.load(Ordering::Acquire) {
        window
            .telemetry()
            .queue_depth(window.tag(), window.id(), window.queue().depth());

        if !run_frame(window, &inert) {
            window.stop();
            break;
        }
        pacer.wait();
    }

    let ready = window.init_state() == InitState::Ready;
    if ready {
        window.queue().drain();
        let backend = Arc::clone(context.backend());
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| backend.cleanup(context))) {
            log::error!(
                "{} backend panicked during cleanup of '{}': {}",
                window.tag(),
                window.title(),
                panic_message(payload.as_ref())
            );
        }
    } else {
        window.queue().clear();
    }

    context.set_owner(None);
    if window.releases_on_exit() {
        // Stopped from one of its own actions; nobody is left to join us
        window.release();
    }
    window.mark_finished();
    log::info!(
        "Render thread for '{}' finished after {} frames",
        window.title(),
        pacer.frame_count()
    );
}

/// Run one frame; `false` ends the loop
fn run_frame(window: &WindowData, inert: &NoopBackend) -> bool {
    let context = window.context();
    let backend: &dyn GraphicsBackend = match window.init_state() {
        InitState::Ready => context.backend().as_ref(),
        InitState::Pending | InitState::Failed => inert,
    };

    match panic::catch_unwind(AssertUnwindSafe(|| backend.process(context, window.queue()))) {
        Ok(Ok(true)) => true,
        Ok(Ok(false)) => {
            log::info!("{} backend stopped '{}'", window.tag(), window.title());
            false
        }
        Ok(Err(e)) => {
            log::error!("{} backend failed on '{}': {}", window.tag(), window.title(), e);
            false
        }
        Err(payload) => {
            log::error!(
                "{} backend panicked on '{}': {}",
                window.tag(),
                window.title(),
                panic_message(payload.as_ref())
            );
            false
        }
    }
}
