//! # Tiles
//!
//! Resolved texture state of one node face. A `TileSpec` stacks up to
//! `MAX_TILE_LAYERS` `TileLayer`s (base texture, then overlay); every layer
//! carries the material state the renderer needs to group draws.

use std::sync::Arc;

use serde::Deserialize;

/// Number of stacked layers per tile: base and overlay.
pub const MAX_TILE_LAYERS: usize = 2;

/// Handle of a texture in the texture source. 0 means "none".
pub type TextureId = u32;

/// Handle of a shader in the shader source. 0 means "fixed pipeline".
pub type ShaderId = u32;

/// Cull back faces when drawing.
pub const MATERIAL_FLAG_BACKFACE_CULLING: u8 = 0x01;
/// The tile shows the dig crack when the crack sits on its node.
pub const MATERIAL_FLAG_CRACK: u8 = 0x02;
/// The crack is drawn as an overlay texture instead of blended in.
pub const MATERIAL_FLAG_CRACK_OVERLAY: u8 = 0x04;
/// The tile cycles through frames.
pub const MATERIAL_FLAG_ANIMATION: u8 = 0x08;
/// Texture may repeat horizontally across merged faces.
pub const MATERIAL_FLAG_TILEABLE_HORIZONTAL: u8 = 0x20;
/// Texture may repeat vertically across merged faces.
pub const MATERIAL_FLAG_TILEABLE_VERTICAL: u8 = 0x40;

/// How a tile's pixels are blended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MaterialType {
    /// Fully opaque
    Opaque,
    /// Alpha tested (cutout)
    Basic,
    /// Alpha blended
    Alpha,
    /// Alpha blended liquid surface
    LiquidTransparent,
    /// Opaque liquid surface
    LiquidOpaque,
    /// Alpha tested leaves with a waving shader
    WavingLeaves,
    /// Alpha tested plants with a waving shader
    WavingPlants,
}

/// The two draw passes, in the order the host issues them.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderPass {
    /// Opaque and cutout-free geometry
    Solid = 0,
    /// Anything with see-through pixels
    Transparent = 1,
}

impl MaterialType {
    /// Pass a buffer of this material is drawn in.
    pub fn render_pass(self) -> RenderPass {
        match self {
            MaterialType::Opaque | MaterialType::LiquidOpaque | MaterialType::WavingLeaves => {
                RenderPass::Solid
            }
            MaterialType::Basic
            | MaterialType::Alpha
            | MaterialType::LiquidTransparent
            | MaterialType::WavingPlants => RenderPass::Transparent,
        }
    }
}

/// One frame of an animated tile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameSpec {
    /// Texture shown during this frame
    pub texture_id: TextureId,
    /// Name the texture was requested under
    pub texture_name: String,
}

/// One layer of a tile.
#[derive(Clone, Debug, PartialEq)]
pub struct TileLayer {
    /// Texture (first frame for animated tiles)
    pub texture_id: TextureId,
    /// Name of the texture, used to build crack overlays
    pub texture_name: String,
    /// Shader used for the material family
    pub shader_id: ShaderId,
    /// Blending mode
    pub material_type: MaterialType,
    /// `MATERIAL_FLAG_*` bits
    pub material_flags: u8,
    /// World-aligned texture scale in nodes
    pub scale: u8,
    /// Frames of an animated tile
    pub frames: Option<Arc<Vec<FrameSpec>>>,
    /// Duration of one frame
    pub animation_frame_length_ms: u16,
    /// Number of frames
    pub animation_frame_count: u16,
    /// Color multiplier
    pub color: [u8; 3],
}

impl Default for TileLayer {
    fn default() -> Self {
        TileLayer {
            texture_id: 0,
            texture_name: String::new(),
            shader_id: 0,
            material_type: MaterialType::Basic,
            material_flags: MATERIAL_FLAG_BACKFACE_CULLING
                | MATERIAL_FLAG_TILEABLE_HORIZONTAL
                | MATERIAL_FLAG_TILEABLE_VERTICAL,
            scale: 1,
            frames: None,
            animation_frame_length_ms: 0,
            animation_frame_count: 1,
            color: [255, 255, 255],
        }
    }
}

impl TileLayer {
    /// Whether the layer draws anything.
    pub fn is_empty(&self) -> bool {
        self.texture_id == 0
    }

    /// Whether a `MATERIAL_FLAG_*` bit is set.
    pub fn has_flag(&self, flag: u8) -> bool {
        self.material_flags & flag != 0
    }

    /// Whether the texture repeats in both directions.
    pub fn is_tileable(&self) -> bool {
        self.has_flag(MATERIAL_FLAG_TILEABLE_HORIZONTAL)
            && self.has_flag(MATERIAL_FLAG_TILEABLE_VERTICAL)
    }

    /// Key of the render state this layer needs.
    pub fn material_key(&self) -> MaterialKey {
        MaterialKey {
            material_type: self.material_type,
            shader_id: self.shader_id,
            texture_id: self.texture_id,
            backface_culling: self.has_flag(MATERIAL_FLAG_BACKFACE_CULLING),
        }
    }
}

/// Render state of a buffer, ordered so that sorting groups blend and depth
/// state first, then shader, then texture.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialKey {
    /// Blending mode
    pub material_type: MaterialType,
    /// Shader
    pub shader_id: ShaderId,
    /// Texture
    pub texture_id: TextureId,
    /// Raster state
    pub backface_culling: bool,
}

/// The resolved tile of one node face.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TileSpec {
    /// Base layer and optional overlay
    pub layers: [TileLayer; MAX_TILE_LAYERS],
    /// Quarter turns applied to texture coordinates
    pub rotation: u8,
    /// Texture coordinates follow world position instead of the face
    pub world_aligned: bool,
    /// Light the tile emits regardless of its surroundings
    pub emissive_light: u8,
}

/// Texture animation of a tile definition.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TileAnimation {
    /// Static texture
    #[default]
    None,
    /// Frames stacked vertically in one image
    VerticalFrames {
        /// Width of a frame in aspect units
        aspect_w: u16,
        /// Height of a frame in aspect units
        aspect_h: u16,
        /// Length of the whole loop in seconds
        length: f32,
    },
    /// Frames laid out in a grid, row by row
    Sheet2d {
        /// Frames per row
        frames_w: u8,
        /// Rows
        frames_h: u8,
        /// Length of one frame in seconds
        frame_length: f32,
    },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TileDefRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default = "default_true")]
        backface_culling: bool,
        #[serde(default)]
        animation: TileAnimation,
        #[serde(default)]
        world_aligned: bool,
        #[serde(default)]
        scale: Option<u8>,
        #[serde(default)]
        color: Option<[u8; 3]>,
    },
}

fn default_true() -> bool {
    true
}

/// A tile as written in a node definition.
///
/// Deserializes from either a bare texture name or an object.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "TileDefRepr")]
pub struct TileDef {
    /// Texture name; empty means "no tile"
    pub name: String,
    /// Cull back faces
    pub backface_culling: bool,
    /// Frame animation
    pub animation: TileAnimation,
    /// Texture coordinates follow world position
    pub world_aligned: bool,
    /// World-aligned texture scale in nodes
    pub scale: u8,
    /// Color multiplier
    pub color: Option<[u8; 3]>,
}

impl From<TileDefRepr> for TileDef {
    fn from(repr: TileDefRepr) -> Self {
        match repr {
            TileDefRepr::Name(name) => TileDef::named(name),
            TileDefRepr::Full {
                name,
                backface_culling,
                animation,
                world_aligned,
                scale,
                color,
            } => TileDef {
                name,
                backface_culling,
                animation,
                world_aligned,
                scale: scale.unwrap_or(1).max(1),
                color,
            },
        }
    }
}

impl Default for TileDef {
    fn default() -> Self {
        TileDef::named(String::new())
    }
}

impl TileDef {
    /// A static tile with default options.
    pub fn named(name: impl Into<String>) -> Self {
        TileDef {
            name: name.into(),
            backface_culling: true,
            animation: TileAnimation::None,
            world_aligned: false,
            scale: 1,
            color: None,
        }
    }

    /// Whether the definition names a texture.
    pub fn is_set(&self) -> bool {
        !self.name.is_empty()
    }
}
