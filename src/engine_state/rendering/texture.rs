//! # Texture and Shader Sources
//!
//! The mesh builder only needs handles: it asks a `TextureSource` for the
//! id of a texture name (modifiers such as `^[cracko2` included) and a
//! `ShaderSource` for the shader of a material family. Both are filled at
//! startup and shared read-mostly with the mesh worker.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Mutex,
};

use log::{debug, warn};

use super::tile::{MaterialType, ShaderId, TextureId};

/// Texture used when a requested texture cannot be found.
pub const DEBUG_TEXTURE_NAME: &str = "no_texture.png";

/// Texture lookup consumed by the mesh builder.
pub trait TextureSource: Send + Sync {
    /// Id of a texture, creating modifier variants on demand. `None` if the
    /// base image is unknown.
    fn texture_for_mesh(&self, name: &str) -> Option<TextureId>;

    /// Pixel size of the base image behind a texture id.
    fn texture_original_size(&self, id: TextureId) -> Option<(u32, u32)>;

    /// Whether a base image of that name exists.
    fn is_known_source_image(&self, name: &str) -> bool;
}

/// Description of a compiled shader.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderInfo {
    /// Program name
    pub name: String,
    /// Material family it was compiled for
    pub material_type: MaterialType,
}

/// Shader lookup consumed by the mesh builder.
pub trait ShaderSource: Send + Sync {
    /// Id of the shader for a program name and material family.
    fn get_shader(&self, name: &str, material_type: MaterialType) -> ShaderId;

    /// Description of a shader id.
    fn shader_info(&self, id: ShaderId) -> Option<ShaderInfo>;
}

fn base_image_name(name: &str) -> &str {
    name.split("^[").next().unwrap_or(name)
}

#[derive(Debug, Default)]
struct TextureTable {
    source_sizes: HashMap<String, (u32, u32)>,
    ids: HashMap<String, TextureId>,
    names: Vec<String>,
}

/// In-memory texture source. Base images are registered with their pixel
/// size; modifier variants get their own id the first time they are asked for.
#[derive(Debug)]
pub struct TextureRegistry {
    table: Mutex<TextureTable>,
}

impl Default for TextureRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureRegistry {
    /// Creates a registry holding only the debug texture.
    pub fn new() -> Self {
        let registry = TextureRegistry {
            table: Mutex::new(TextureTable::default()),
        };
        registry.add_source_image(DEBUG_TEXTURE_NAME, 16, 16);
        registry
    }

    /// Registers a base image.
    pub fn add_source_image(&self, name: &str, width: u32, height: u32) {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.source_sizes.insert(name.to_owned(), (width, height));
    }

    /// Name a texture id was created for.
    pub fn texture_name(&self, id: TextureId) -> Option<String> {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.names.get(id.checked_sub(1)? as usize).cloned()
    }
}

impl TextureSource for TextureRegistry {
    fn texture_for_mesh(&self, name: &str) -> Option<TextureId> {
        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(id) = table.ids.get(name) {
            return Some(*id);
        }
        if !table.source_sizes.contains_key(base_image_name(name)) {
            return None;
        }
        table.names.push(name.to_owned());
        let id = table.names.len() as TextureId;
        table.ids.insert(name.to_owned(), id);
        debug!("Texture {id} created for `{name}`");
        Some(id)
    }

    fn texture_original_size(&self, id: TextureId) -> Option<(u32, u32)> {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        let name = table.names.get(id.checked_sub(1)? as usize)?;
        table.source_sizes.get(base_image_name(name)).copied()
    }

    fn is_known_source_image(&self, name: &str) -> bool {
        let table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        table.source_sizes.contains_key(name)
    }
}

/// Texture source backed by a directory of image files. Image sizes are
/// read from the file headers the first time a name is requested.
#[derive(Debug)]
pub struct FileTextureSource {
    root: PathBuf,
    registry: TextureRegistry,
}

impl FileTextureSource {
    /// Serves images found under `root`.
    pub fn new(root: impl AsRef<Path>) -> Self {
        FileTextureSource {
            root: root.as_ref().to_path_buf(),
            registry: TextureRegistry::new(),
        }
    }

    fn ensure_loaded(&self, base: &str) -> bool {
        if self.registry.is_known_source_image(base) {
            return true;
        }
        match image::image_dimensions(self.root.join(base)) {
            Ok((w, h)) => {
                self.registry.add_source_image(base, w, h);
                true
            }
            Err(err) => {
                debug!("Image `{base}` not available: {err}");
                false
            }
        }
    }
}

impl TextureSource for FileTextureSource {
    fn texture_for_mesh(&self, name: &str) -> Option<TextureId> {
        if !self.ensure_loaded(base_image_name(name)) {
            return None;
        }
        self.registry.texture_for_mesh(name)
    }

    fn texture_original_size(&self, id: TextureId) -> Option<(u32, u32)> {
        self.registry.texture_original_size(id)
    }

    fn is_known_source_image(&self, name: &str) -> bool {
        self.ensure_loaded(name)
    }
}

/// In-memory shader source handing out one id per (program, material) pair.
#[derive(Debug, Default)]
pub struct ShaderRegistry {
    shaders: Mutex<Vec<ShaderInfo>>,
}

impl ShaderRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShaderSource for ShaderRegistry {
    fn get_shader(&self, name: &str, material_type: MaterialType) -> ShaderId {
        let mut shaders = self.shaders.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(index) = shaders
            .iter()
            .position(|s| s.name == name && s.material_type == material_type)
        {
            return index as ShaderId + 1;
        }
        if name.is_empty() {
            warn!("Empty shader name requested");
            return 0;
        }
        shaders.push(ShaderInfo {
            name: name.to_owned(),
            material_type,
        });
        shaders.len() as ShaderId
    }

    fn shader_info(&self, id: ShaderId) -> Option<ShaderInfo> {
        let shaders = self.shaders.lock().unwrap_or_else(|e| e.into_inner());
        shaders.get(id.checked_sub(1)? as usize).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifiers_share_base_image_size() {
        let textures = TextureRegistry::new();
        textures.add_source_image("water.png", 16, 128);
        let base = textures.texture_for_mesh("water.png").unwrap();
        let frame = textures.texture_for_mesh("water.png^[verticalframe:8:3").unwrap();
        assert_ne!(base, frame);
        assert_eq!(textures.texture_original_size(frame), Some((16, 128)));
        assert_eq!(textures.texture_for_mesh("water.png"), Some(base));
        assert_eq!(textures.texture_for_mesh("lava.png"), None);
    }

    #[test]
    fn shader_ids_are_stable() {
        let shaders = ShaderRegistry::new();
        let a = shaders.get_shader("nodes", MaterialType::Opaque);
        let b = shaders.get_shader("nodes", MaterialType::Alpha);
        assert_ne!(a, b);
        assert_eq!(shaders.get_shader("nodes", MaterialType::Opaque), a);
        assert_eq!(shaders.shader_info(b).unwrap().material_type, MaterialType::Alpha);
    }
}
