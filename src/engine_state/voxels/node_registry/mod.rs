//! # Node Registry
//!
//! The catalogue of node types. Entries are registered once at startup,
//! resolved (liquid alternatives, connection targets, textures) and then
//! shared read-only between the main thread and the mesh worker.
//!
//! Content ids `125..=127` are reserved for the built-in `unknown`, `air`
//! and `ignore` types; registered types are numbered from 0 upward around
//! that range.

use std::collections::{HashMap, HashSet};

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use serde::Deserialize;

use crate::{
    core::settings::MeshSettings,
    engine_state::{
        collision::aabb::Aabb,
        rendering::{
            texture::{ShaderSource, TextureSource, DEBUG_TEXTURE_NAME},
            tile::{
                FrameSpec, MaterialType, TileAnimation, TileDef, TileLayer, TileSpec,
                MATERIAL_FLAG_ANIMATION, MATERIAL_FLAG_BACKFACE_CULLING,
                MATERIAL_FLAG_TILEABLE_HORIZONTAL, MATERIAL_FLAG_TILEABLE_VERTICAL,
            },
        },
        voxels::block::{
            block_side::BlockSide, ContentId, MapNode, CONTENT_AIR, CONTENT_IGNORE,
            CONTENT_UNKNOWN, LIGHT_MAX,
        },
    },
};

use draw_type::{AlphaMode, DrawType, LiquidType, ParamType, ParamType2};
use node_box::NodeBox;

pub mod draw_type;
pub mod node_box;

/// Shader program every node material is drawn with.
const NODE_SHADER: &str = "nodes_shader";

/// A node type as written in a definition file.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct NodeDefinition {
    /// Unique name, e.g. `default:stone`
    pub name: String,
    /// Shape class
    pub drawtype: DrawType,
    /// Scale of plant, torch, sign and allfaces geometry
    pub visual_scale: f32,
    /// Up to six tiles in `BlockSide` order; the last one repeats
    pub tiles: Vec<TileDef>,
    /// Overlay tiles drawn over `tiles`
    pub overlay_tiles: Vec<TileDef>,
    /// Extra tiles used by liquids, rooted plants and framed glass
    pub special_tiles: Vec<TileDef>,
    /// Alpha handling; derived from the drawtype when absent
    pub alpha: Option<AlphaMode>,
    /// Meaning of `param1`
    pub paramtype: ParamType,
    /// Meaning of `param2`
    pub paramtype2: ParamType2,
    /// Sunlight passes down without loss
    pub sunlight_propagates: bool,
    /// Objects collide with the node
    pub walkable: bool,
    /// Objects can climb the node
    pub climbable: bool,
    /// Placing a node replaces this one
    pub buildable_to: bool,
    /// Liquids may flow into the node
    pub floodable: bool,
    /// Mapgen may carve caves through the node
    pub is_ground_content: bool,
    /// Emitted light, clamped to `LIGHT_MAX`
    pub light_source: u8,
    /// Liquid behaviour
    pub liquidtype: LiquidType,
    /// Name of the flowing variant of this liquid
    pub liquid_alternative_flowing: String,
    /// Name of the source variant of this liquid
    pub liquid_alternative_source: String,
    /// Flow slowdown
    pub liquid_viscosity: u8,
    /// Two sources make a new one between them
    pub liquid_renewable: bool,
    /// How far flowing liquid reaches from a source
    pub liquid_range: u8,
    /// Default level of leveled nodes
    pub leveled: u8,
    /// Shape for `DrawType::Nodebox`
    pub node_box: NodeBox,
    /// Collision shape; `node_box` when absent
    pub collision_box: Option<NodeBox>,
    /// Selection shape; `node_box` when absent
    pub selection_box: Option<NodeBox>,
    /// Names of node types a connected node box connects to
    pub connects_to: Vec<String>,
    /// Faces other connected node boxes may connect to
    pub connect_sides: Vec<String>,
    /// Waving shader selector
    pub waving: u8,
    /// Prebaked mesh name for `DrawType::Mesh`
    pub mesh: String,
    /// Group ratings
    pub groups: HashMap<String, i32>,
}

impl Default for NodeDefinition {
    fn default() -> Self {
        NodeDefinition {
            name: String::new(),
            drawtype: DrawType::Normal,
            visual_scale: 1.0,
            tiles: Vec::new(),
            overlay_tiles: Vec::new(),
            special_tiles: Vec::new(),
            alpha: None,
            paramtype: ParamType::None,
            paramtype2: ParamType2::None,
            sunlight_propagates: false,
            walkable: true,
            climbable: false,
            buildable_to: false,
            floodable: false,
            is_ground_content: true,
            light_source: 0,
            liquidtype: LiquidType::None,
            liquid_alternative_flowing: String::new(),
            liquid_alternative_source: String::new(),
            liquid_viscosity: 0,
            liquid_renewable: true,
            liquid_range: 8,
            leveled: 0,
            node_box: NodeBox::Regular,
            collision_box: None,
            selection_box: None,
            connects_to: Vec::new(),
            connect_sides: Vec::new(),
            waving: 0,
            mesh: String::new(),
            groups: HashMap::new(),
        }
    }
}

/// The resolved, immutable properties of a node type.
#[derive(Clone, Debug)]
pub struct ContentFeatures {
    /// Unique name
    pub name: String,
    /// Group ratings
    pub groups: HashMap<String, i32>,
    /// Shape class
    pub drawtype: DrawType,
    /// Scale of billboard-like geometry
    pub visual_scale: f32,
    /// Tile definitions in `BlockSide` order
    pub tiledef: [TileDef; 6],
    /// Overlay tile definitions
    pub tiledef_overlay: [TileDef; 6],
    /// Special tile definitions
    pub tiledef_special: [TileDef; 6],
    /// Resolved tiles; filled by `NodeRegistry::update_textures`
    pub tiles: [TileSpec; 6],
    /// Resolved special tiles
    pub special_tiles: [TileSpec; 6],
    /// Alpha handling
    pub alpha: AlphaMode,
    /// 2 for opaque cubes, 1 for liquid sources, 0 otherwise
    pub solidness: u8,
    /// Solidness used for face culling when `solidness` is 0
    pub visual_solidness: u8,
    /// Meaning of `param1`
    pub param_type: ParamType,
    /// Meaning of `param2`
    pub param_type_2: ParamType2,
    /// Light passes through the node
    pub light_propagates: bool,
    /// Sunlight passes down without loss
    pub sunlight_propagates: bool,
    /// Objects collide with the node
    pub walkable: bool,
    /// Objects can climb the node
    pub climbable: bool,
    /// Placing a node replaces this one
    pub buildable_to: bool,
    /// Liquids may flow into the node
    pub floodable: bool,
    /// Mapgen may carve caves through the node
    pub is_ground_content: bool,
    /// Emitted light
    pub light_source: u8,
    /// Liquid behaviour
    pub liquid_type: LiquidType,
    /// Flowing variant name
    pub liquid_alternative_flowing_name: String,
    /// Source variant name
    pub liquid_alternative_source_name: String,
    /// Flowing variant id
    pub liquid_alternative_flowing: ContentId,
    /// Source variant id
    pub liquid_alternative_source: ContentId,
    /// Flow slowdown
    pub liquid_viscosity: u8,
    /// Two sources make a new one between them
    pub liquid_renewable: bool,
    /// How far flowing liquid reaches from a source
    pub liquid_range: u8,
    /// Default level of leveled nodes
    pub leveled: u8,
    /// Drawn shape
    pub node_box: NodeBox,
    /// Collision shape
    pub collision_box: NodeBox,
    /// Selection shape
    pub selection_box: NodeBox,
    /// Names of connection targets
    pub connects_to: Vec<String>,
    /// Ids of connection targets
    pub connects_to_ids: Vec<ContentId>,
    /// `BlockSide::connect_bit` mask of faces others may connect to
    pub connect_sides: u8,
    /// Waving shader selector
    pub waving: u8,
    /// Prebaked mesh name
    pub mesh: String,
}

fn expand_tiles(defs: &[TileDef]) -> [TileDef; 6] {
    let last = defs.last().cloned().unwrap_or_default();
    std::array::from_fn(|i| defs.get(i).cloned().unwrap_or_else(|| last.clone()))
}

fn connect_sides_mask(names: &[String]) -> u8 {
    names
        .iter()
        .filter_map(|name| match name.as_str() {
            "top" => Some(BlockSide::TOP),
            "bottom" => Some(BlockSide::BOTTOM),
            "front" => Some(BlockSide::FRONT),
            "left" => Some(BlockSide::LEFT),
            "back" => Some(BlockSide::BACK),
            "right" => Some(BlockSide::RIGHT),
            other => {
                warn!("Unknown connect side `{other}`");
                None
            }
        })
        .fold(0, |mask, side| mask | side.connect_bit())
}

impl ContentFeatures {
    /// Builds features from a definition, deriving the drawtype-dependent fields.
    pub fn from_definition(def: NodeDefinition) -> Self {
        let (solidness, visual_solidness) = match def.drawtype {
            DrawType::Normal | DrawType::PlantlikeRooted => (2, 0),
            DrawType::Liquid => (1, 0),
            DrawType::Glasslike | DrawType::GlasslikeFramed | DrawType::Allfaces => (0, 1),
            _ => (0, 0),
        };
        let alpha = def.alpha.unwrap_or(match def.drawtype {
            DrawType::Liquid | DrawType::FlowingLiquid => AlphaMode::Blend,
            DrawType::Glasslike
            | DrawType::GlasslikeFramed
            | DrawType::Allfaces
            | DrawType::Torchlike
            | DrawType::Signlike
            | DrawType::Plantlike
            | DrawType::Firelike
            | DrawType::Raillike => AlphaMode::Clip,
            _ => AlphaMode::Opaque,
        });
        let collision_box = def.collision_box.unwrap_or_else(|| def.node_box.clone());
        let selection_box = def.selection_box.unwrap_or_else(|| def.node_box.clone());

        ContentFeatures {
            light_propagates: def.paramtype == ParamType::Light,
            light_source: def.light_source.min(LIGHT_MAX),
            tiledef: expand_tiles(&def.tiles),
            tiledef_overlay: expand_tiles(&def.overlay_tiles),
            tiledef_special: expand_tiles(&def.special_tiles),
            tiles: Default::default(),
            special_tiles: Default::default(),
            connect_sides: connect_sides_mask(&def.connect_sides),
            name: def.name,
            groups: def.groups,
            drawtype: def.drawtype,
            visual_scale: def.visual_scale,
            alpha,
            solidness,
            visual_solidness,
            param_type: def.paramtype,
            param_type_2: def.paramtype2,
            sunlight_propagates: def.sunlight_propagates,
            walkable: def.walkable,
            climbable: def.climbable,
            buildable_to: def.buildable_to,
            floodable: def.floodable,
            is_ground_content: def.is_ground_content,
            liquid_type: def.liquidtype,
            liquid_alternative_flowing_name: def.liquid_alternative_flowing,
            liquid_alternative_source_name: def.liquid_alternative_source,
            liquid_alternative_flowing: CONTENT_IGNORE,
            liquid_alternative_source: CONTENT_IGNORE,
            liquid_viscosity: def.liquid_viscosity,
            liquid_renewable: def.liquid_renewable,
            liquid_range: def.liquid_range,
            leveled: def.leveled,
            node_box: def.node_box,
            collision_box,
            selection_box,
            connects_to: def.connects_to,
            connects_to_ids: Vec::new(),
            waving: def.waving,
            mesh: def.mesh,
        }
    }

    /// Group rating, zero if absent.
    pub fn group(&self, name: &str) -> i32 {
        self.groups.get(name).copied().unwrap_or(0)
    }

    /// Whether the type is a liquid source or flowing liquid.
    pub fn is_liquid(&self) -> bool {
        self.liquid_type != LiquidType::None
    }

    /// Whether both types are variants of the same liquid.
    pub fn same_liquid(&self, other: &ContentFeatures) -> bool {
        self.is_liquid()
            && other.is_liquid()
            && self.liquid_alternative_flowing == other.liquid_alternative_flowing
    }

    /// Collision boxes of a node in node units. Empty for non-walkable types.
    pub fn collision_boxes(&self, node: &MapNode, neighbors: u8) -> Vec<Aabb> {
        if !self.walkable {
            return Vec::new();
        }
        self.collision_box.boxes(node, self, neighbors)
    }

    /// Selection boxes of a node in node units.
    pub fn selection_boxes(&self, node: &MapNode, neighbors: u8) -> Vec<Aabb> {
        self.selection_box.boxes(node, self, neighbors)
    }

    fn material_type(&self) -> MaterialType {
        match (self.drawtype, self.alpha) {
            (DrawType::Liquid | DrawType::FlowingLiquid, AlphaMode::Opaque) => {
                MaterialType::LiquidOpaque
            }
            (DrawType::Liquid | DrawType::FlowingLiquid, _) => MaterialType::LiquidTransparent,
            (DrawType::Plantlike, _) if self.waving == 1 => MaterialType::WavingPlants,
            (DrawType::Allfaces, _) if self.waving == 2 => MaterialType::WavingLeaves,
            (_, AlphaMode::Opaque) => MaterialType::Opaque,
            (_, AlphaMode::Clip) => MaterialType::Basic,
            (_, AlphaMode::Blend) => MaterialType::Alpha,
        }
    }
}

fn builtin(name: &str, configure: impl FnOnce(&mut NodeDefinition)) -> ContentFeatures {
    let mut def = NodeDefinition {
        name: name.to_owned(),
        ..NodeDefinition::default()
    };
    configure(&mut def);
    ContentFeatures::from_definition(def)
}

/// Resolves texture names to tile layers, substituting the debug texture
/// for names the texture source does not know.
struct TileResolver<'a> {
    textures: &'a dyn TextureSource,
    missing: HashSet<String>,
}

impl TileResolver<'_> {
    fn texture(&mut self, name: &str) -> (u32, String) {
        if let Some(id) = self.textures.texture_for_mesh(name) {
            return (id, name.to_owned());
        }
        if self.missing.insert(name.to_owned()) {
            warn!("Texture `{name}` not found, using {DEBUG_TEXTURE_NAME}");
        }
        let id = self.textures.texture_for_mesh(DEBUG_TEXTURE_NAME).unwrap_or(0);
        (id, DEBUG_TEXTURE_NAME.to_owned())
    }

    fn layer(
        &mut self,
        def: &TileDef,
        material_type: MaterialType,
        shader_id: u32,
        backface_culling: bool,
    ) -> TileLayer {
        let (texture_id, texture_name) = self.texture(&def.name);
        let mut layer = TileLayer {
            texture_id,
            texture_name: texture_name.clone(),
            shader_id,
            material_type,
            material_flags: MATERIAL_FLAG_TILEABLE_HORIZONTAL | MATERIAL_FLAG_TILEABLE_VERTICAL,
            scale: def.scale,
            color: def.color.unwrap_or([255, 255, 255]),
            ..TileLayer::default()
        };
        if backface_culling && def.backface_culling {
            layer.material_flags |= MATERIAL_FLAG_BACKFACE_CULLING;
        }

        let (w, h) = self
            .textures
            .texture_original_size(texture_id)
            .unwrap_or((16, 16));
        let (frame_names, frame_length_ms): (Vec<String>, f32) = match def.animation {
            TileAnimation::None => (Vec::new(), 0.0),
            TileAnimation::VerticalFrames {
                aspect_w,
                aspect_h,
                length,
            } => {
                let frame_height = (w * aspect_h.max(1) as u32 / aspect_w.max(1) as u32).max(1);
                let count = (h / frame_height).max(1);
                let names = (0..count)
                    .map(|i| format!("{texture_name}^[verticalframe:{count}:{i}"))
                    .collect();
                (names, length * 1000.0 / count as f32)
            }
            TileAnimation::Sheet2d {
                frames_w,
                frames_h,
                frame_length,
            } => {
                let names = (0..frames_h.max(1))
                    .flat_map(|y| (0..frames_w.max(1)).map(move |x| (x, y)))
                    .map(|(x, y)| format!("{texture_name}^[sheet:{frames_w}x{frames_h}:{x},{y}"))
                    .collect();
                (names, frame_length * 1000.0)
            }
        };
        if frame_names.len() > 1 {
            let frames: Vec<FrameSpec> = frame_names
                .into_iter()
                .map(|name| {
                    let (texture_id, texture_name) = self.texture(&name);
                    FrameSpec {
                        texture_id,
                        texture_name,
                    }
                })
                .collect();
            layer.texture_id = frames[0].texture_id;
            layer.animation_frame_count = frames.len() as u16;
            layer.animation_frame_length_ms = frame_length_ms.clamp(1.0, u16::MAX as f32) as u16;
            layer.material_flags |= MATERIAL_FLAG_ANIMATION;
            layer.material_flags &=
                !(MATERIAL_FLAG_TILEABLE_HORIZONTAL | MATERIAL_FLAG_TILEABLE_VERTICAL);
            layer.frames = Some(std::sync::Arc::new(frames));
        }
        layer
    }

    fn tile(
        &mut self,
        base: &TileDef,
        overlay: &TileDef,
        material_type: MaterialType,
        shader_id: u32,
        backface_culling: bool,
        emissive_light: u8,
    ) -> TileSpec {
        let mut tile = TileSpec {
            world_aligned: base.world_aligned,
            emissive_light,
            ..TileSpec::default()
        };
        if base.is_set() {
            tile.layers[0] = self.layer(base, material_type, shader_id, backface_culling);
        }
        if overlay.is_set() {
            tile.layers[1] = self.layer(overlay, material_type, shader_id, backface_culling);
        }
        tile
    }
}

/// Indexed catalogue of node types.
#[derive(Debug)]
pub struct NodeRegistry {
    features: Vec<ContentFeatures>,
    name_to_id: HashMap<String, ContentId>,
    next_id: ContentId,
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeRegistry {
    /// Creates a registry holding only the built-in types.
    pub fn new() -> Self {
        let unknown = builtin("unknown", |d| d.tiles = vec![TileDef::named("unknown_node.png")]);
        let air = builtin("air", |d| {
            d.drawtype = DrawType::Airlike;
            d.paramtype = ParamType::Light;
            d.sunlight_propagates = true;
            d.walkable = false;
            d.buildable_to = true;
            d.floodable = true;
        });
        let ignore = builtin("ignore", |d| {
            d.drawtype = DrawType::Airlike;
            d.walkable = false;
            d.buildable_to = true;
        });

        let mut features = vec![unknown.clone(); CONTENT_IGNORE as usize + 1];
        features[CONTENT_AIR as usize] = air;
        features[CONTENT_IGNORE as usize] = ignore;

        let name_to_id = HashMap::from([
            ("unknown".to_owned(), CONTENT_UNKNOWN),
            ("air".to_owned(), CONTENT_AIR),
            ("ignore".to_owned(), CONTENT_IGNORE),
        ]);
        NodeRegistry {
            features,
            name_to_id,
            next_id: 0,
        }
    }

    /// Loads a JSON array of node definitions on top of the built-ins and
    /// resolves cross references.
    pub fn from_json(json: &str) -> Result<Self> {
        let defs: Vec<NodeDefinition> =
            serde_json::from_str(json).context("node definitions are not valid")?;
        let mut registry = Self::new();
        for def in defs {
            registry.register(def)?;
        }
        registry.resolve();
        Ok(registry)
    }

    /// Registers a node type.
    ///
    /// # Returns
    /// The content id assigned to the type.
    pub fn register(&mut self, def: NodeDefinition) -> Result<ContentId> {
        if def.name.is_empty() {
            bail!("node definition without a name");
        }
        if self.name_to_id.contains_key(&def.name) {
            bail!("node `{}` registered twice", def.name);
        }
        if self.next_id == CONTENT_UNKNOWN {
            self.next_id = CONTENT_IGNORE + 1;
        }
        let id = self.next_id;
        self.next_id = self
            .next_id
            .checked_add(1)
            .context("content id space exhausted")?;

        self.name_to_id.insert(def.name.clone(), id);
        let features = ContentFeatures::from_definition(def);
        debug!("Registered node `{}` as {id}", features.name);
        if (id as usize) < self.features.len() {
            self.features[id as usize] = features;
        } else {
            self.features.push(features);
        }
        Ok(id)
    }

    /// Maps liquid alternative and connection names to ids. Unknown names
    /// resolve to `CONTENT_IGNORE` and are logged.
    pub fn resolve(&mut self) {
        let name_to_id = &self.name_to_id;
        let lookup = |owner: &str, name: &str| -> ContentId {
            if name.is_empty() {
                return CONTENT_IGNORE;
            }
            name_to_id.get(name).copied().unwrap_or_else(|| {
                warn!("Node `{owner}` refers to unknown node `{name}`");
                CONTENT_IGNORE
            })
        };
        for f in self.features.iter_mut() {
            if f.is_liquid() {
                f.liquid_alternative_flowing = lookup(&f.name, &f.liquid_alternative_flowing_name);
                f.liquid_alternative_source = lookup(&f.name, &f.liquid_alternative_source_name);
            }
            let mut ids: Vec<ContentId> = f
                .connects_to
                .iter()
                .map(|name| lookup(&f.name, name))
                .filter(|id| *id != CONTENT_IGNORE)
                .collect();
            ids.sort_unstable();
            ids.dedup();
            f.connects_to_ids = ids;
        }
    }

    /// Resolves every tile definition into texture and shader handles.
    pub fn update_textures(
        &mut self,
        textures: &dyn TextureSource,
        shaders: &dyn ShaderSource,
        settings: &MeshSettings,
    ) {
        let mut resolver = TileResolver {
            textures,
            missing: HashSet::new(),
        };
        for f in self.features.iter_mut() {
            if matches!(f.drawtype, DrawType::Airlike) {
                continue;
            }
            let material_type = f.material_type();
            let shader_id = if settings.enable_shaders {
                shaders.get_shader(NODE_SHADER, material_type)
            } else {
                0
            };
            let backface_culling = !matches!(
                f.drawtype,
                DrawType::Plantlike | DrawType::Firelike | DrawType::Torchlike | DrawType::Signlike
            );
            for i in 0..6 {
                f.tiles[i] = resolver.tile(
                    &f.tiledef[i],
                    &f.tiledef_overlay[i],
                    material_type,
                    shader_id,
                    backface_culling,
                    f.light_source,
                );
                let special_culling = backface_culling && !f.is_liquid();
                f.special_tiles[i] = resolver.tile(
                    &f.tiledef_special[i],
                    &TileDef::default(),
                    material_type,
                    shader_id,
                    special_culling,
                    f.light_source,
                );
            }
        }
    }

    /// Features of a content id; unknown ids map to the `unknown` type.
    pub fn get(&self, id: ContentId) -> &ContentFeatures {
        self.features
            .get(id as usize)
            .unwrap_or(&self.features[CONTENT_UNKNOWN as usize])
    }

    /// Features of a cell's type.
    pub fn get_node(&self, node: &MapNode) -> &ContentFeatures {
        self.get(node.content)
    }

    /// Content id of a name.
    pub fn get_id(&self, name: &str) -> Option<ContentId> {
        self.name_to_id.get(name).copied()
    }

    /// Number of registered types, built-ins included.
    pub fn len(&self) -> usize {
        self.name_to_id.len()
    }

    /// Whether only the built-ins are registered.
    pub fn is_empty(&self) -> bool {
        self.name_to_id.len() <= 3
    }

    /// Whether a connected node box at `from` connects to `to`, which lies
    /// across the `face` side of `from`.
    pub fn nodebox_connects(&self, from: MapNode, to: MapNode, face: BlockSide) -> bool {
        let f1 = self.get(from.content);
        if f1.drawtype != DrawType::Nodebox || !f1.node_box.is_connected() {
            return false;
        }
        if f1.connects_to_ids.binary_search(&to.content).is_err() {
            return false;
        }
        let f2 = self.get(to.content);
        if f2.drawtype == DrawType::Nodebox && f2.node_box.is_connected() {
            return f2.connects_to_ids.binary_search(&from.content).is_ok();
        }
        if f2.connect_sides > 0 {
            return f2.connect_sides & face.opposite().connect_bit() != 0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::rendering::texture::{ShaderRegistry, TextureRegistry};

    const DEFS: &str = r#"[
        {"name": "stone", "tiles": ["stone.png"], "groups": {"cracky": 3}},
        {"name": "glass", "drawtype": "glasslike", "paramtype": "light",
         "sunlight_propagates": true, "tiles": ["glass.png"]},
        {"name": "water_source", "drawtype": "liquid", "paramtype": "light",
         "liquidtype": "source", "walkable": false,
         "liquid_alternative_flowing": "water_flowing",
         "liquid_alternative_source": "water_source",
         "tiles": [{"name": "water.png", "animation": {"type": "vertical_frames",
                    "aspect_w": 16, "aspect_h": 16, "length": 2.0}}]},
        {"name": "water_flowing", "drawtype": "flowing_liquid", "paramtype": "light",
         "liquidtype": "flowing", "walkable": false, "paramtype2": "flowing_liquid",
         "liquid_alternative_flowing": "water_flowing",
         "liquid_alternative_source": "water_source", "tiles": ["water.png"]},
        {"name": "fence_rail", "drawtype": "nodebox", "paramtype": "light",
         "node_box": {"type": "connected", "fixed": [[-0.1, -0.5, -0.1, 0.1, 0.5, 0.1]],
                      "connect_left": [[-0.5, 0.2, -0.05, 0, 0.3, 0.05]]},
         "connects_to": ["stone", "fence_rail"], "tiles": ["wood.png"]}
    ]"#;

    #[test]
    fn builtins_occupy_reserved_ids() {
        let registry = NodeRegistry::new();
        assert_eq!(registry.get(CONTENT_AIR).name, "air");
        assert_eq!(registry.get(CONTENT_IGNORE).name, "ignore");
        assert_eq!(registry.get(9000).name, "unknown");
        assert!(registry.get(CONTENT_AIR).sunlight_propagates);
        assert!(!registry.get(CONTENT_IGNORE).light_propagates);
    }

    #[test]
    fn definitions_derive_solidness_and_liquids() {
        let registry = NodeRegistry::from_json(DEFS).unwrap();
        let stone = registry.get(registry.get_id("stone").unwrap());
        assert_eq!(stone.solidness, 2);
        assert_eq!(stone.group("cracky"), 3);
        assert_eq!(stone.group("bouncy"), 0);

        let glass = registry.get(registry.get_id("glass").unwrap());
        assert_eq!((glass.solidness, glass.visual_solidness), (0, 1));

        let source = registry.get(registry.get_id("water_source").unwrap());
        let flowing = registry.get(registry.get_id("water_flowing").unwrap());
        assert!(source.same_liquid(flowing));
        assert_eq!(source.liquid_alternative_source, registry.get_id("water_source").unwrap());
        assert_eq!(flowing.alpha, AlphaMode::Blend);
    }

    #[test]
    fn registration_skips_reserved_range() {
        let mut registry = NodeRegistry::new();
        for i in 0..130 {
            let id = registry
                .register(NodeDefinition {
                    name: format!("n{i}"),
                    ..NodeDefinition::default()
                })
                .unwrap();
            assert!(!(CONTENT_UNKNOWN..=CONTENT_IGNORE).contains(&id));
        }
        assert!(registry
            .register(NodeDefinition {
                name: "n0".into(),
                ..NodeDefinition::default()
            })
            .is_err());
    }

    #[test]
    fn connected_boxes_follow_connects_to() {
        let registry = NodeRegistry::from_json(DEFS).unwrap();
        let rail = MapNode::new(registry.get_id("fence_rail").unwrap());
        let stone = MapNode::new(registry.get_id("stone").unwrap());
        let glass = MapNode::new(registry.get_id("glass").unwrap());
        assert!(registry.nodebox_connects(rail, stone, BlockSide::LEFT));
        assert!(registry.nodebox_connects(rail, rail, BlockSide::LEFT));
        assert!(!registry.nodebox_connects(rail, glass, BlockSide::LEFT));
        assert!(!registry.nodebox_connects(stone, rail, BlockSide::RIGHT));

        let f = registry.get(rail.content);
        assert_eq!(f.collision_boxes(&rail, 0).len(), 1);
        assert_eq!(f.collision_boxes(&rail, BlockSide::LEFT.connect_bit()).len(), 2);
    }

    #[test]
    fn missing_textures_fall_back_and_animations_expand() {
        let mut registry = NodeRegistry::from_json(DEFS).unwrap();
        let textures = TextureRegistry::new();
        textures.add_source_image("water.png", 16, 128);
        textures.add_source_image("stone.png", 16, 16);
        let shaders = ShaderRegistry::new();
        registry.update_textures(&textures, &shaders, &MeshSettings::default());

        let glass = registry.get(registry.get_id("glass").unwrap());
        assert_eq!(glass.tiles[0].layers[0].texture_name, DEBUG_TEXTURE_NAME);

        let water = registry.get(registry.get_id("water_source").unwrap());
        let layer = &water.tiles[0].layers[0];
        assert_eq!(layer.animation_frame_count, 8);
        assert_eq!(layer.animation_frame_length_ms, 250);
        assert!(layer.has_flag(MATERIAL_FLAG_ANIMATION));
        assert_eq!(layer.material_type, MaterialType::LiquidTransparent);
        assert!(water.tiles[0].layers[1].is_empty());
    }
}
