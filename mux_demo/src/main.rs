//! Context multiplexer demo
//!
//! Drives a docked set of windows on the headless platform: every backend
//! draws a sprite each frame, a resize storm hits the windows from a helper
//! thread, one window is dragged out of the container and back, another is
//! closed and replaced, then everything shuts down.
//!
//! Usage: `mux_demo [config.toml|config.ron]`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use context_mux::config::Config;
use context_mux::foundation::logging;
use context_mux::manager::DragOutcome;
use context_mux::platform::headless::HeadlessPlatform;
use context_mux::prelude::*;
use rand::Rng;

const SPRITE_SIZE: u32 = 16;

fn load_config() -> Result<MultiplexerConfig, Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => MultiplexerConfig::load_from_file(&path)?,
        None => MultiplexerConfig::default()
            .with_windows(
                WindowCounts::default()
                    .with(BackendTag::Raster, 2)
                    .with(BackendTag::Retained, 1)
                    .with(BackendTag::Hosted, 1),
            )
            .with_parented(true),
    };
    config.validate()?;
    Ok(config)
}

/// Upload a checkerboard and draw it every frame
fn start_drawing(manager: &MultiContextManager, id: WindowId) -> Result<(), MuxError> {
    manager.enqueue_with_context(id, |ctx| {
        let pixels: Vec<u8> = (0..SPRITE_SIZE * SPRITE_SIZE)
            .flat_map(|i| {
                let on = ((i % SPRITE_SIZE) / 4 + (i / SPRITE_SIZE) / 4) % 2 == 0;
                if on { [255, 200, 40, 255] } else { [30, 30, 60, 255] }
            })
            .collect();
        match ctx.add_texture(SPRITE_SIZE, SPRITE_SIZE, &pixels) {
            Ok(texture) => draw_loop(ctx, texture),
            Err(e) => log::warn!("Texture upload failed on {}: {}", ctx.tag(), e),
        }
    })
}

/// Draw one frame, then queue the next one on the same thread
fn draw_loop(ctx: &Context, texture: TextureId) {
    ctx.clear(Color::rgb(16, 16, 24));
    let (width, height) = ctx.size();
    #[allow(clippy::cast_possible_wrap)]
    let dest = Rect::new(
        (width / 2).saturating_sub(SPRITE_SIZE) as i32,
        (height / 2).saturating_sub(SPRITE_SIZE) as i32,
        SPRITE_SIZE * 2,
        SPRITE_SIZE * 2,
    );
    if let Err(e) = ctx.draw_sprite(&SpriteDraw::new(texture, dest)) {
        log::warn!("Draw failed on {}: {}", ctx.tag(), e);
        return;
    }

    let Some(window) = ctx.window() else {
        return;
    };
    let next: Weak<Context> = Arc::downgrade(window.context());
    window.enqueue(move || {
        if let Some(ctx) = next.upgrade() {
            if ctx.window().is_some() {
                draw_loop(&ctx, texture);
            }
        }
    });
}

fn resize_storm(manager: Arc<MultiContextManager>, done: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut rng = rand::thread_rng();
        while !done.load(Ordering::Acquire) {
            let ids = manager.window_ids();
            if ids.is_empty() {
                break;
            }
            let id = ids[rng.gen_range(0..ids.len())];
            let width = rng.gen_range(120..=640);
            let height = rng.gen_range(90..=480);
            if let Err(e) = manager.resize_window(id, width, height) {
                log::debug!("Storm resize skipped: {}", e);
            }
            thread::sleep(Duration::from_millis(rng.gen_range(1..10)));
        }
    })
}

fn drag_out_and_back(manager: &MultiContextManager, id: WindowId) -> Result<(), MuxError> {
    manager.begin_drag(id, Point::new(0, 0))?;
    let out = manager.drag_move(Point::new(3000, 0))?;
    log::info!("Drag out of the container: {:?}", out);
    thread::sleep(Duration::from_millis(200));

    let back = manager.drag_move(Point::new(40, 40))?;
    if back != DragOutcome::Docked {
        // Frame still overlapping the container edge; nudge it inward
        manager.drag_move(Point::new(80, 80))?;
    }
    let finished = manager.end_drag();
    log::info!("Drag finished after {} dock transitions", finished.transitions);
    Ok(())
}

fn run(config: MultiplexerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let platform = Arc::new(HeadlessPlatform::new());
    let telemetry = Arc::new(CountingTelemetry::new());
    let manager = Arc::new(
        MultiContextManager::new(platform.clone(), config).with_telemetry(telemetry.clone()),
    );

    // Native resize notifications flow back into the manager
    let weak = Arc::downgrade(&manager);
    platform.set_resize_observer(Some(Arc::new(move |native, width, height| {
        if let Some(manager) = weak.upgrade() {
            manager.on_native_resize(native, width, height);
        }
    })));

    manager.initialize_from_config()?;
    for id in manager.window_ids() {
        start_drawing(&manager, id)?;
    }
    log::info!("{} windows running", manager.window_count());

    let done = Arc::new(AtomicBool::new(false));
    let storm = resize_storm(Arc::clone(&manager), Arc::clone(&done));
    thread::sleep(Duration::from_millis(500));

    if let Some(parent) = manager.parent_window() {
        platform.set_client_size(parent, 1280, 960)?;
    }
    if let Some(&first) = manager.window_ids().first() {
        drag_out_and_back(&manager, first)?;
    }

    if let Some(&last) = manager.window_ids().last() {
        let tag = manager.window(last).map_or(BackendTag::Raster, |window| window.tag());
        manager.close_requested(last)?;
        let replacement = manager.add_window(tag, Some("replacement"))?;
        start_drawing(&manager, replacement)?;
    }
    thread::sleep(Duration::from_millis(500));

    done.store(true, Ordering::Release);
    if storm.join().is_err() {
        log::error!("Resize storm thread panicked");
    }

    for window in manager.windows() {
        log::info!(
            "'{}': {:?}, {} resizes, last queue depth {:?}",
            window.title(),
            window.size(),
            telemetry.resize_count(window.id()),
            telemetry.last_depth(window.id())
        );
    }

    manager.stop_all();
    platform.set_resize_observer(None);

    let stats = platform.stats();
    log::info!("Total resizes applied: {}", telemetry.total_resizes());
    log::info!("Peak queue depth: {}", telemetry.max_depth());
    log::info!("Platform: {:?}", stats);
    if stats.stale_handle_accesses > 0 || stats.cross_thread_violations > 0 {
        log::error!("Native handle misuse detected");
    }
    Ok(())
}

fn main() {
    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init_with_level("info");
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };
    logging::init_with_level(&config.log_level);
    log::info!("Starting context multiplexer demo");

    if let Err(e) = run(config) {
        log::error!("Demo failed: {}", e);
        std::process::exit(1);
    }
    log::info!("Demo finished");
}
