//! Mesh generation for map blocks.
//!
//! This module turns a [`MeshMakeData`] snapshot into a [`MapBlockMesh`]:
//! per-pass lists of vertex and index buffers, one per material, plus the
//! side tables that let the finished mesh animate without being rebuilt.
//!
//! # Architecture
//! - `fast_faces`: greedy quads for every cube-shaped node
//! - `content_mapblock`: generators for all other drawtypes
//! - `collector`: groups generated geometry by material and render pass
//! - `prebaked`: models used by mesh nodes
//! - [`MeshContext`]: the read-only inputs shared by every build
//!
//! # Animation
//! A finished mesh keeps three tables keyed by `(pass, buffer index)`:
//! - crack materials, the texture name a dig crack level is appended to
//! - animated tiles with their current frame and per-block phase offset
//! - day/night diffs, the encoded light color of every sunlit vertex,
//!   kept only when shaders are off and colors are finished on the CPU
//!
//! [`MapBlockMesh::animate`] walks these tables each frame.

use std::{
    collections::HashMap,
    fmt,
    num::NonZeroUsize,
    sync::{Arc, Mutex},
};

use log::debug;
use lru::LruCache;
use noise::{NoiseFn, Perlin};
use web_time::Instant;

use crate::{
    core::settings::MeshSettings,
    engine_state::{
        rendering::{
            color::{final_color_blend, get_sunlight_color},
            texture::TextureSource,
            tile::{
                RenderPass, TileLayer, TileSpec, MATERIAL_FLAG_ANIMATION, MATERIAL_FLAG_CRACK,
                MATERIAL_FLAG_CRACK_OVERLAY,
            },
            Vertex,
        },
        voxels::{
            block::{block_side::BlockSide, block_side::NodeRotation, MapNode},
            lighting::smooth::LightSampler,
            node_registry::{draw_type::ParamType2, ContentFeatures, NodeRegistry},
            BlockPos, BS,
        },
    },
};

use collector::MeshCollector;
use mesh_make_data::MeshMakeData;
use prebaked::{MeshSource, PrebakedMesh};

mod collector;
mod content_mapblock;
mod fast_faces;
pub mod mesh_make_data;
pub mod prebaked;

pub use collector::QUAD_INDICES;

/// Rotated prebaked meshes kept when `enable_mesh_cache` is on.
const ROTATED_MESH_CACHE_SIZE: usize = 1024;

/// Force timer returned by a mesh with nothing to animate.
const NO_ANIMATION_TIMER: u32 = 100000;

/// Scale applied to block positions before sampling the animation phase noise.
const ANIMATION_PHASE_FREQUENCY: f64 = 0.731;

/// Tile of a node face, turned by the node's orientation.
///
/// # Arguments
/// * `f` - Features of the node
/// * `n` - The node
/// * `side` - Face in world space
/// * `crack` - Whether the dig crack sits on this node
///
/// # Returns
/// The tile of the node-local side that faces `side`, with its texture
/// rotation adjusted so the texture keeps its orientation on the node.
pub(crate) fn get_node_tile(
    f: &ContentFeatures,
    n: &MapNode,
    side: BlockSide,
    crack: bool,
) -> TileSpec {
    let rotation = match f.param_type_2 {
        ParamType2::Facedir => Some(NodeRotation::from_facedir(n.facedir(f))),
        ParamType2::Wallmounted => Some(NodeRotation::from_wallmounted(n.wallmounted(f))),
        _ => None,
    };
    let mut tile = match rotation {
        Some(rotation) => {
            let (local, turns) = rotation.tile_for_side(side);
            let mut tile = f.tiles[local as usize].clone();
            tile.rotation = (tile.rotation + turns) % 4;
            tile
        }
        None => f.tiles[side as usize].clone(),
    };
    if crack {
        for layer in tile.layers.iter_mut().filter(|l| !l.is_empty()) {
            layer.material_flags |= MATERIAL_FLAG_CRACK;
        }
    }
    tile
}

/// Orientation a prebaked mesh is drawn in.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MeshRotation {
    /// As authored
    None,
    /// One of the 24 facedir orientations
    Facedir(u8),
    /// One of the 6 wallmounted orientations
    Wallmounted(u8),
    /// Turned about Y in steps of 1.5 degrees
    Degrotate(u8),
}

impl MeshRotation {
    /// Key of the rotation in the rotated mesh cache.
    fn cache_key(self) -> Option<u8> {
        match self {
            MeshRotation::None => Some(0),
            MeshRotation::Facedir(d) => Some(d % 24),
            MeshRotation::Wallmounted(w) => Some(24 + w % 6),
            MeshRotation::Degrotate(_) => None,
        }
    }
}

/// Read-only inputs of every mesh build, shared by the main thread and the
/// mesh worker.
pub struct MeshContext {
    /// Node definitions with resolved tiles
    pub registry: Arc<NodeRegistry>,
    /// Texture lookup for crack and animation frames
    pub textures: Arc<dyn TextureSource>,
    /// Prebaked models of mesh nodes
    pub meshes: Arc<dyn MeshSource>,
    /// Builder options
    pub settings: MeshSettings,
    rotated_meshes: Mutex<LruCache<(String, u32, u8), Arc<PrebakedMesh>>>,
}

impl fmt::Debug for MeshContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshContext")
            .field("nodes", &self.registry.len())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl MeshContext {
    /// Creates a context.
    ///
    /// # Arguments
    /// * `registry` - Node definitions; tiles must already be resolved
    /// * `textures` - Texture source the tiles were resolved against
    /// * `meshes` - Source of prebaked models
    /// * `settings` - Builder options
    pub fn new(
        registry: Arc<NodeRegistry>,
        textures: Arc<dyn TextureSource>,
        meshes: Arc<dyn MeshSource>,
        settings: MeshSettings,
    ) -> Self {
        let capacity = NonZeroUsize::new(ROTATED_MESH_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        MeshContext {
            registry,
            textures,
            meshes,
            settings,
            rotated_meshes: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Model of a mesh node in world units, turned to `rotation`.
    ///
    /// # Returns
    /// `None` if the node names no model or the model cannot be found.
    pub fn node_mesh(
        &self,
        f: &ContentFeatures,
        rotation: MeshRotation,
    ) -> Option<Arc<PrebakedMesh>> {
        let scale = BS * f.visual_scale;
        let key = rotation
            .cache_key()
            .filter(|_| self.settings.enable_mesh_cache)
            .map(|k| (f.mesh.clone(), scale.to_bits(), k));
        if let Some(key) = &key {
            let mut cache = self.rotated_meshes.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(mesh) = cache.get(key) {
                return Some(mesh.clone());
            }
        }

        let base = self.meshes.get_mesh(&f.mesh)?;
        let scaled = base.scaled(scale);
        let mesh = Arc::new(match rotation {
            MeshRotation::None => scaled,
            MeshRotation::Facedir(d) => scaled.rotated(&NodeRotation::from_facedir(d)),
            MeshRotation::Wallmounted(w) => scaled.rotated(&NodeRotation::from_wallmounted(w)),
            MeshRotation::Degrotate(d) => scaled.rotated_y(1.5 * d as f32),
        });

        if let Some(key) = key {
            let mut cache = self.rotated_meshes.lock().unwrap_or_else(|e| e.into_inner());
            cache.put(key, mesh.clone());
        }
        Some(mesh)
    }
}

/// One material's geometry in a finished mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshBuffer {
    /// Material state; the texture changes as the buffer animates
    pub layer: TileLayer,
    /// 0 for base layers, 1 for overlays
    pub tile_layer: u8,
    /// Vertices
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
}

/// Key of a buffer: render pass index and position in that pass.
type BufferKey = (usize, usize);

/// The mesh of one map block.
pub struct MapBlockMesh {
    blockpos: BlockPos,
    buffers: [Vec<MeshBuffer>; 2],
    textures: Arc<dyn TextureSource>,
    enable_shaders: bool,

    crack_materials: HashMap<BufferKey, String>,
    last_crack: i32,

    animation_tiles: HashMap<BufferKey, TileLayer>,
    animation_frames: HashMap<BufferKey, Option<u16>>,
    animation_frame_offsets: HashMap<BufferKey, u32>,

    daynight_diffs: HashMap<BufferKey, Vec<(usize, [u8; 4])>>,
    last_daynight_ratio: u32,

    has_animation: bool,
    animation_force_timer: u32,
}

impl fmt::Debug for MapBlockMesh {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapBlockMesh")
            .field("blockpos", &self.blockpos)
            .field("solid_buffers", &self.buffers[0].len())
            .field("transparent_buffers", &self.buffers[1].len())
            .field("triangles", &self.triangle_count())
            .field("has_animation", &self.has_animation)
            .finish_non_exhaustive()
    }
}

/// Name of the crack modifier a layer uses.
fn crack_modifier(layer: &TileLayer) -> &'static str {
    if layer.has_flag(MATERIAL_FLAG_CRACK_OVERLAY) {
        "^[cracko"
    } else {
        "^[crack"
    }
}

impl MapBlockMesh {
    /// Builds the mesh of a snapshot.
    ///
    /// # Arguments
    /// * `data` - Cells of the block and its neighbors
    /// * `ctx` - Node definitions, textures and options
    ///
    /// # Returns
    /// The mesh, empty if nothing in the block is visible.
    pub fn new(data: &MeshMakeData, ctx: &MeshContext) -> Self {
        let started = Instant::now();
        let registry: &NodeRegistry = &ctx.registry;
        let sampler = LightSampler::new(&data.vmanip, registry, ctx.settings.ambient_occlusion_gamma);
        let mut collector = MeshCollector::new(!data.use_shaders);

        let quads = fast_faces::update_all_fast_face_rows(data, registry, &sampler, &mut collector);
        content_mapblock::generate(data, ctx, &sampler, &mut collector);

        let mut mesh = MapBlockMesh {
            blockpos: data.blockpos,
            buffers: [Vec::new(), Vec::new()],
            textures: ctx.textures.clone(),
            enable_shaders: data.use_shaders,
            crack_materials: HashMap::new(),
            last_crack: data.crack_level,
            animation_tiles: HashMap::new(),
            animation_frames: HashMap::new(),
            animation_frame_offsets: HashMap::new(),
            daynight_diffs: HashMap::new(),
            last_daynight_ratio: u32::MAX,
            has_animation: false,
            animation_force_timer: NO_ANIMATION_TIMER,
        };

        let phase_noise = Perlin::new(0);
        let phase = if ctx.settings.desync_animation {
            let b = data.blockpos;
            let p = [b.x as f64, b.y as f64, b.z as f64].map(|c| c * ANIMATION_PHASE_FREQUENCY);
            (100000.0 * (2.0 + phase_noise.get(p))) as u32
        } else {
            0
        };
        let night = get_sunlight_color(0);

        for (pass, prebuffers) in collector.prebuffers.into_iter().enumerate() {
            let mut prebuffers = prebuffers;
            // Overlays draw after every base layer of the pass.
            prebuffers.sort_by_key(|b| b.tile_layer);
            for (i, prebuffer) in prebuffers.into_iter().enumerate() {
                let key = (pass, i);
                let mut layer = prebuffer.layer;
                let mut vertices = prebuffer.vertices;

                if layer.has_flag(MATERIAL_FLAG_CRACK) {
                    let template = format!("{}{}", layer.texture_name, crack_modifier(&layer));
                    let name = format!("{}{}", template, data.crack_level.max(0));
                    if let Some(id) = ctx.textures.texture_for_mesh(&name) {
                        layer.texture_id = id;
                    }
                    mesh.crack_materials.insert(key, template);
                }

                if layer.has_flag(MATERIAL_FLAG_ANIMATION) {
                    if let Some(first) = layer.frames.as_ref().and_then(|frames| frames.first()) {
                        if !layer.has_flag(MATERIAL_FLAG_CRACK) {
                            layer.texture_id = first.texture_id;
                        }
                        mesh.animation_tiles.insert(key, layer.clone());
                        mesh.animation_frames.insert(key, Some(0));
                        mesh.animation_frame_offsets.insert(key, phase);
                    }
                }

                if !data.use_shaders {
                    let mut diffs = Vec::new();
                    for (j, v) in vertices.iter_mut().enumerate() {
                        if v.color[3] == 0 {
                            v.color = final_color_blend(v.color, night);
                        } else {
                            diffs.push((j, v.color));
                        }
                        v.color[3] = 255;
                    }
                    if !diffs.is_empty() {
                        mesh.daynight_diffs.insert(key, diffs);
                    }
                }

                mesh.buffers[pass].push(MeshBuffer {
                    layer,
                    tile_layer: prebuffer.tile_layer,
                    vertices,
                    indices: prebuffer.indices,
                });
            }
        }

        mesh.has_animation = !mesh.crack_materials.is_empty()
            || !mesh.animation_tiles.is_empty()
            || !mesh.daynight_diffs.is_empty();

        debug!(
            "Meshed block {:?}: {} fast quads, {} triangles in {:?}",
            data.blockpos,
            quads,
            mesh.triangle_count(),
            started.elapsed()
        );
        mesh
    }

    /// Advances crack, texture animation and day/night colors.
    ///
    /// # Arguments
    /// * `far_away` - The block is far from the camera; texture frames are not advanced
    /// * `time` - Animation time in seconds
    /// * `crack` - Current crack level
    /// * `daynight_ratio` - Current day/night ratio in `0..=1000`
    ///
    /// # Returns
    /// `true` if a texture or a vertex color changed.
    pub fn animate(&mut self, far_away: bool, time: f32, crack: i32, daynight_ratio: u32) -> bool {
        if !self.has_animation {
            self.animation_force_timer = NO_ANIMATION_TIMER;
            return false;
        }
        self.animation_force_timer = fastrand::u32(5..100);
        let mut changed = false;

        if crack != self.last_crack {
            for (key, template) in self.crack_materials.iter() {
                let name = format!("{}{}", template, crack.max(0));
                let Some(id) = self.textures.texture_for_mesh(&name) else {
                    continue;
                };
                self.buffers[key.0][key.1].layer.texture_id = id;
                changed = true;
                if let Some(tile) = self.animation_tiles.get_mut(key) {
                    tile.texture_id = id;
                    self.animation_frames.insert(*key, None);
                }
            }
            self.last_crack = crack;
        }

        if !far_away {
            for (key, tile) in self.animation_tiles.iter() {
                let Some(frames) = tile.frames.as_ref() else {
                    continue;
                };
                let count = tile.animation_frame_count.max(1) as u64;
                let length = tile.animation_frame_length_ms.max(1) as f64;
                let offset = self.animation_frame_offsets.get(key).copied().unwrap_or(0) as u64;
                let frame = ((time as f64 * 1000.0 / length) as u64 + offset) % count;
                let frame = frame as u16;
                let current = self.animation_frames.entry(*key).or_insert(None);
                if *current == Some(frame) {
                    continue;
                }
                *current = Some(frame);
                let Some(spec) = frames.get(frame as usize) else {
                    continue;
                };
                let texture_id = match self.crack_materials.get(key) {
                    Some(_) => {
                        let name = format!(
                            "{}{}{}",
                            spec.texture_name,
                            crack_modifier(tile),
                            self.last_crack.max(0)
                        );
                        self.textures.texture_for_mesh(&name).unwrap_or(spec.texture_id)
                    }
                    None => spec.texture_id,
                };
                self.buffers[key.0][key.1].layer.texture_id = texture_id;
                changed = true;
            }
        }

        if !self.enable_shaders && daynight_ratio != self.last_daynight_ratio {
            let day = get_sunlight_color(daynight_ratio);
            for (key, diffs) in self.daynight_diffs.iter() {
                let vertices = &mut self.buffers[key.0][key.1].vertices;
                for (j, color) in diffs {
                    let mut c = final_color_blend(*color, day);
                    c[3] = 255;
                    vertices[*j].color = c;
                    changed = true;
                }
            }
            self.last_daynight_ratio = daynight_ratio;
        }
        changed
    }

    /// Buffers of a render pass, base layers first.
    pub fn buffers(&self, pass: RenderPass) -> &[MeshBuffer] {
        &self.buffers[pass as usize]
    }

    /// Position of the meshed block.
    pub fn blockpos(&self) -> BlockPos {
        self.blockpos
    }

    /// Total number of triangles.
    pub fn triangle_count(&self) -> usize {
        self.buffers
            .iter()
            .flatten()
            .map(|b| b.indices.len() / 3)
            .sum()
    }

    /// Whether the mesh has no geometry.
    pub fn is_empty(&self) -> bool {
        self.buffers.iter().all(|pass| pass.is_empty())
    }

    /// Approximate heap size of the geometry in bytes.
    pub fn memory_usage(&self) -> usize {
        self.buffers
            .iter()
            .flatten()
            .map(|b| {
                b.vertices.len() * std::mem::size_of::<Vertex>()
                    + b.indices.len() * std::mem::size_of::<u32>()
            })
            .sum()
    }

    /// Whether crack, texture or day/night animation applies.
    pub fn has_animation(&self) -> bool {
        self.has_animation
    }

    /// Frames until the mesh should be animated even when the host skips it.
    pub fn animation_force_timer(&self) -> u32 {
        self.animation_force_timer
    }

    /// Counts the force timer down by one frame.
    ///
    /// # Returns
    /// `true` when the timer has run out.
    pub fn decrement_animation_force_timer(&mut self) -> bool {
        self.animation_force_timer = self.animation_force_timer.saturating_sub(1);
        self.animation_force_timer == 0
    }
}
