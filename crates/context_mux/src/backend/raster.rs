//! Software rasterizer backend
//!
//! Draws into an `image::RgbaImage` canvas and presents the finished frame
//! through [`NativePlatform::present_pixels`]. Every frame starts from the
//! clear color, so drawing is immediate-mode: whatever the queued actions
//! draw during `process` is what gets shown.

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::resources::ResourceTable;
use super::{
    AtlasId, AtlasRegion, BackendError, BackendResult, BackendTag, Color, GraphicsBackend,
    InitTarget, SpriteDraw, TextureId,
};
use crate::command_queue::CommandQueue;
use crate::context::Context;
use crate::foundation::sync::lock;
use crate::platform::{NativePlatform, Rect, SurfaceHandle};

impl From<Color> for Rgba<u8> {
    fn from(color: Color) -> Self {
        Self([color.r, color.g, color.b, color.a])
    }
}

impl From<Rgba<u8>> for Color {
    fn from(pixel: Rgba<u8>) -> Self {
        let [r, g, b, a] = pixel.0;
        Self::rgba(r, g, b, a)
    }
}

struct PresentTarget {
    platform: Arc<dyn NativePlatform>,
    surface: SurfaceHandle,
}

struct RasterState {
    target: Option<PresentTarget>,
    canvas: RgbaImage,
    clear_color: Color,
    resources: ResourceTable,
    pixels: HashMap<TextureId, RgbaImage>,
    frames: u64,
}

impl RasterState {
    fn new(clear_color: Color) -> Self {
        Self {
            target: None,
            canvas: RgbaImage::new(1, 1),
            clear_color,
            resources: ResourceTable::new(),
            pixels: HashMap::new(),
            frames: 0,
        }
    }

    fn clear_canvas(&mut self) {
        let color = Rgba::from(self.clear_color);
        for pixel in self.canvas.pixels_mut() {
            *pixel = color;
        }
    }
}

/// Immediate-mode RGBA software renderer
pub struct RasterBackend {
    default_clear: Color,
    state: Mutex<RasterState>,
}

impl RasterBackend {
    /// Create a backend clearing to black
    pub fn new() -> Self {
        Self::with_clear_color(Color::BLACK)
    }

    /// Create a backend with a custom initial clear color
    pub fn with_clear_color(color: Color) -> Self {
        Self { default_clear: color, state: Mutex::new(RasterState::new(color)) }
    }

    /// Number of frames presented since initialization
    pub fn frames_presented(&self) -> u64 {
        lock(&self.state).frames
    }

    /// Canvas dimensions
    pub fn canvas_size(&self) -> (u32, u32) {
        lock(&self.state).canvas.dimensions()
    }

    /// Read back one canvas pixel
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        let state = lock(&self.state);
        if x < state.canvas.width() && y < state.canvas.height() {
            Some(Color::from(*state.canvas.get_pixel(x, y)))
        } else {
            None
        }
    }

    fn present_locked(state: &mut RasterState) -> BackendResult<()> {
        let target = state
            .target
            .as_ref()
            .ok_or(BackendError::NotInitialized(BackendTag::Raster))?;
        target.platform.present_pixels(
            target.surface,
            state.canvas.width(),
            state.canvas.height(),
            state.canvas.as_raw(),
        )?;
        state.frames += 1;
        Ok(())
    }
}

impl Default for RasterBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Multiply two 8-bit channels
#[allow(clippy::cast_possible_truncation)]
const fn modulate(a: u8, b: u8) -> u8 {
    ((a as u16 * b as u16 + 127) / 255) as u8
}

impl GraphicsBackend for RasterBackend {
    fn tag(&self) -> BackendTag {
        BackendTag::Raster
    }

    fn duplicate(&self) -> Arc<dyn GraphicsBackend> {
        Arc::new(Self::with_clear_color(self.default_clear))
    }

    fn initialize(&self, _ctx: &Context, target: &mut InitTarget) -> BackendResult<()> {
        let surface = target
            .surface
            .ok_or(BackendError::MissingSurface(BackendTag::Raster))?;

        let mut state = lock(&self.state);
        state.canvas = RgbaImage::new(target.width.max(1), target.height.max(1));
        state.clear_canvas();
        state.target = Some(PresentTarget { platform: Arc::clone(&target.platform), surface });
        log::debug!(
            "Raster backend initialized at {}x{}",
            state.canvas.width(),
            state.canvas.height()
        );
        Ok(())
    }

    fn cleanup(&self, _ctx: &Context) {
        let mut state = lock(&self.state);
        let frames = state.frames;
        *state = RasterState::new(self.default_clear);
        log::debug!("Raster backend cleaned up after {} frames", frames);
    }

    fn is_initialized(&self) -> bool {
        lock(&self.state).target.is_some()
    }

    fn process(&self, _ctx: &Context, queue: &CommandQueue) -> BackendResult<bool> {
        {
            let mut state = lock(&self.state);
            if state.target.is_none() {
                return Err(BackendError::NotInitialized(BackendTag::Raster));
            }
            state.clear_canvas();
        }

        queue.drain();

        let mut state = lock(&self.state);
        Self::present_locked(&mut state)?;
        Ok(true)
    }

    fn resize(&self, _ctx: &Context, width: u32, height: u32) -> BackendResult<()> {
        let mut state = lock(&self.state);
        state.canvas = RgbaImage::new(width.max(1), height.max(1));
        state.clear_canvas();
        Ok(())
    }

    fn clear(&self, color: Color) {
        let mut state = lock(&self.state);
        state.clear_color = color;
        state.clear_canvas();
    }

    fn present(&self) -> BackendResult<()> {
        let mut state = lock(&self.state);
        Self::present_locked(&mut state)
    }

    fn draw_sprite(&self, sprite: &SpriteDraw) -> BackendResult<()> {
        if sprite.dest.width == 0 || sprite.dest.height == 0 {
            return Ok(());
        }

        let mut state = lock(&self.state);
        let texture = state
            .pixels
            .get(&sprite.texture)
            .ok_or(BackendError::UnknownTexture(sprite.texture))?;

        let bounds = Rect::new(0, 0, texture.width(), texture.height());
        let source = sprite.source.unwrap_or(bounds);
        if !bounds.contains_rect(&source) || source.width == 0 || source.height == 0 {
            return Err(BackendError::Failed(format!(
                "sprite source {source:?} outside texture {:?}",
                sprite.texture
            )));
        }

        #[allow(clippy::cast_sign_loss)]
        let cropped = imageops::crop_imm(
            texture,
            source.x as u32,
            source.y as u32,
            source.width,
            source.height,
        )
        .to_image();
        let mut scaled = if cropped.dimensions() == (sprite.dest.width, sprite.dest.height) {
            cropped
        } else {
            imageops::resize(&cropped, sprite.dest.width, sprite.dest.height, FilterType::Nearest)
        };

        if sprite.tint != Color::WHITE {
            let tint = sprite.tint;
            for pixel in scaled.pixels_mut() {
                let [r, g, b, a] = pixel.0;
                *pixel = Rgba([
                    modulate(r, tint.r),
                    modulate(g, tint.g),
                    modulate(b, tint.b),
                    modulate(a, tint.a),
                ]);
            }
        }

        imageops::overlay(
            &mut state.canvas,
            &scaled,
            i64::from(sprite.dest.x),
            i64::from(sprite.dest.y),
        );
        Ok(())
    }

    fn add_texture(&self, width: u32, height: u32, rgba: &[u8]) -> BackendResult<TextureId> {
        ResourceTable::check_rgba(width, height, rgba)?;
        let image = RgbaImage::from_raw(width, height, rgba.to_vec()).ok_or(
            BackendError::InvalidTexture {
                expected: width as usize * height as usize * 4,
                actual: rgba.len(),
            },
        )?;

        let mut state = lock(&self.state);
        let id = state.resources.register_texture(width, height);
        state.pixels.insert(id, image);
        Ok(id)
    }

    fn add_atlas(&self, texture: TextureId, regions: &[AtlasRegion]) -> BackendResult<AtlasId> {
        lock(&self.state).resources.register_atlas(texture, regions)
    }

    fn atlas_region(&self, atlas: AtlasId, name: &str) -> Option<(TextureId, Rect)> {
        lock(&self.state).resources.atlas_region(atlas, name)
    }
}
