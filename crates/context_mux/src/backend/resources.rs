//! Texture and atlas bookkeeping shared by the drawing backends

use std::collections::HashMap;

use super::{AtlasId, AtlasRegion, BackendError, BackendResult, TextureId};
use crate::platform::Rect;

#[derive(Debug, Clone)]
struct Atlas {
    texture: TextureId,
    regions: HashMap<String, Rect>,
}

/// Per-instance registry of texture sizes and atlas regions
#[derive(Debug, Default)]
pub struct ResourceTable {
    next_id: u64,
    textures: HashMap<TextureId, (u32, u32)>,
    atlases: HashMap<AtlasId, Atlas>,
}

impl ResourceTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate RGBA8 data against its dimensions
    pub fn check_rgba(width: u32, height: u32, rgba: &[u8]) -> BackendResult<()> {
        let expected = width as usize * height as usize * 4;
        if rgba.len() == expected {
            Ok(())
        } else {
            Err(BackendError::InvalidTexture { expected, actual: rgba.len() })
        }
    }

    /// Record a texture and hand out its id
    pub fn register_texture(&mut self, width: u32, height: u32) -> TextureId {
        self.next_id += 1;
        let id = TextureId(self.next_id);
        self.textures.insert(id, (width, height));
        id
    }

    /// Size of a registered texture
    pub fn texture_size(&self, texture: TextureId) -> BackendResult<(u32, u32)> {
        self.textures
            .get(&texture)
            .copied()
            .ok_or(BackendError::UnknownTexture(texture))
    }

    /// Record an atlas over a registered texture
    pub fn register_atlas(
        &mut self,
        texture: TextureId,
        regions: &[AtlasRegion],
    ) -> BackendResult<AtlasId> {
        let (width, height) = self.texture_size(texture)?;
        let bounds = Rect::new(0, 0, width, height);

        let mut named = HashMap::with_capacity(regions.len());
        for region in regions {
            if !bounds.contains_rect(&region.rect) {
                return Err(BackendError::RegionOutOfBounds(region.name.clone()));
            }
            named.insert(region.name.clone(), region.rect);
        }

        self.next_id += 1;
        let id = AtlasId(self.next_id);
        self.atlases.insert(id, Atlas { texture, regions: named });
        Ok(id)
    }

    /// Look up a named atlas region
    pub fn atlas_region(&self, atlas: AtlasId, name: &str) -> Option<(TextureId, Rect)> {
        let atlas = self.atlases.get(&atlas)?;
        atlas.regions.get(name).map(|rect| (atlas.texture, *rect))
    }

    /// Number of registered textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.textures.clear();
        self.atlases.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atlas_lookup() {
        let mut table = ResourceTable::new();
        let texture = table.register_texture(64, 32);
        let atlas = table
            .register_atlas(
                texture,
                &[
                    AtlasRegion::new("ship", Rect::new(0, 0, 32, 32)),
                    AtlasRegion::new("rock", Rect::new(32, 0, 32, 32)),
                ],
            )
            .unwrap();

        assert_eq!(
            table.atlas_region(atlas, "rock"),
            Some((texture, Rect::new(32, 0, 32, 32)))
        );
        assert_eq!(table.atlas_region(atlas, "missing"), None);
    }

    #[test]
    fn test_region_outside_texture_is_rejected() {
        let mut table = ResourceTable::new();
        let texture = table.register_texture(16, 16);
        let result = table.register_atlas(texture, &[AtlasRegion::new("big", Rect::new(8, 8, 16, 16))]);
        assert!(matches!(result, Err(BackendError::RegionOutOfBounds(name)) if name == "big"));
    }

    #[test]
    fn test_unknown_texture() {
        let mut table = ResourceTable::new();
        assert!(matches!(
            table.register_atlas(TextureId(99), &[]),
            Err(BackendError::UnknownTexture(TextureId(99)))
        ));
    }

    #[test]
    fn test_rgba_length_check() {
        assert!(ResourceTable::check_rgba(2, 2, &[0; 16]).is_ok());
        assert!(matches!(
            ResourceTable::check_rgba(2, 2, &[0; 12]),
            Err(BackendError::InvalidTexture { expected: 16, actual: 12 })
        ));
    }
}
