//! # Draw List
//!
//! Each frame the draw list picks the blocks worth drawing and flattens
//! their mesh buffers into two ordered passes for the host renderer.
//!
//! ## Selection
//! A block is drawn when it has a non-empty mesh and
//! 1. its center lies within the viewing range (plus the block radius),
//! 2. its bounding sphere touches the camera frustum,
//! 3. with occlusion culling on, at least one of nine rays from the eye to
//!    the block center and corners is not stopped by an opaque node.
//!
//! Every block passing the range test has its usage timer reset, whether
//! or not it ends up drawn, so the map keeps the surroundings loaded.
//!
//! ## Ordering
//! Entries of a pass are sorted by tile layer first and material second,
//! so adjacent draws share as much render state as possible.

use std::collections::HashSet;

use cgmath::{EuclideanSpace, InnerSpace, Matrix4, Point3, Vector3};
use log::{trace, warn};

use crate::{
    core::settings::DrawSettings,
    engine_state::voxels::{
        block::CONTENT_IGNORE, block_origin, float_to_node, node_registry::NodeRegistry,
        world::Map, BlockPos, BS, MAP_BLOCKSIZE,
    },
};

use super::{
    camera::Camera,
    color::get_sunlight_color,
    tile::{MaterialKey, RenderPass},
};

/// Fog distance used when fog is disabled.
const FOG_RANGE_ALL: f32 = 100000.0 * BS;

/// Blocks farther than this from the eye animate without texture frames.
const FAR_AWAY_DISTANCE: f32 = 50.0 * BS;

/// Meshes animated per frame, not counting forced ones.
const MAX_ANIMATED_PER_FRAME: usize = 50;

/// Radius of a block's bounding sphere in world units.
fn block_radius() -> f32 {
    MAP_BLOCKSIZE as f32 * BS * 0.5 * 3f32.sqrt()
}

/// World position of a block's center.
fn block_center(pos: BlockPos) -> Point3<f32> {
    let origin = block_origin(pos);
    let half = (MAP_BLOCKSIZE as f32 - 1.0) * 0.5;
    Point3::new(
        (origin.x as f32 + half) * BS,
        (origin.y as f32 + half) * BS,
        (origin.z as f32 + half) * BS,
    )
}

/// One buffer to draw.
#[derive(Clone, Debug, PartialEq)]
pub struct DrawEntry {
    /// Block owning the mesh
    pub blockpos: BlockPos,
    /// Index of the buffer in the mesh's pass
    pub buffer_index: usize,
    /// 0 for base layers, 1 for overlays
    pub tile_layer: u8,
    /// Render state of the buffer
    pub material: MaterialKey,
    /// Translation of the block relative to the camera offset
    pub world: Matrix4<f32>,
}

/// Per-frame constants shared by every draw.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SceneConstants {
    /// World to view transform, relative to the camera offset
    pub view: Matrix4<f32>,
    /// View to clip transform
    pub projection: Matrix4<f32>,
    /// Sky background color
    pub sky_color: [f32; 4],
    /// Distance where fog is total
    pub fog_distance: f32,
    /// Distance where fog starts
    pub fog_start: f32,
    /// Sunlight color for the current day/night ratio
    pub day_night_color: [f32; 3],
    /// Animation time in seconds
    pub animation_timer: f32,
    /// Camera offset in nodes
    pub camera_offset: Vector3<i32>,
}

/// The blocks and buffers chosen for the current frame.
#[derive(Debug, Default)]
pub struct DrawList {
    passes: [Vec<DrawEntry>; 2],
    drawn_blocks: Vec<BlockPos>,
    warned_materials: HashSet<MaterialKey>,
    blocks_in_range: usize,
    blocks_occluded: usize,
    blocks_frustum_culled: usize,
}

impl DrawList {
    /// Creates an empty draw list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the list for a camera.
    ///
    /// # Arguments
    /// * `map` - The map; usage timers of blocks in range are reset
    /// * `camera` - The viewer
    /// * `settings` - Range and culling options
    pub fn update(&mut self, map: &mut Map, camera: &Camera, settings: &DrawSettings) {
        for pass in self.passes.iter_mut() {
            pass.clear();
        }
        self.drawn_blocks.clear();
        self.blocks_in_range = 0;
        self.blocks_occluded = 0;
        self.blocks_frustum_culled = 0;

        let range = settings.viewing_range * BS;
        let radius = block_radius();
        let eye = camera.position;
        let frustum = camera.frustum();
        let offset = camera.camera_offset();
        let offset_f = Vector3::new(offset.x as f32, offset.y as f32, offset.z as f32) * BS;

        let mut visible = Vec::new();
        for pos in map.block_positions() {
            let center = block_center(pos);
            if (center - eye).magnitude() > range + radius {
                continue;
            }
            if let Some(block) = map.get_block_no_create_no_ex_mut(pos) {
                block.reset_usage_timer();
            }
            self.blocks_in_range += 1;

            if !frustum.contains_sphere(center, radius) {
                self.blocks_frustum_culled += 1;
                continue;
            }
            if settings.occlusion_culling && is_block_occluded(map, pos, eye) {
                self.blocks_occluded += 1;
                continue;
            }
            visible.push(pos);
        }

        for pos in visible {
            let Some(mesh) = map
                .get_block_no_create_no_ex(pos)
                .and_then(|block| block.mesh.as_ref())
            else {
                continue;
            };
            if mesh.is_empty() {
                continue;
            }
            let origin = block_origin(pos);
            let translation =
                Vector3::new(origin.x as f32, origin.y as f32, origin.z as f32) * BS - offset_f;
            let world = Matrix4::from_translation(translation);

            for pass in [RenderPass::Solid, RenderPass::Transparent] {
                for (buffer_index, buffer) in mesh.buffers(pass).iter().enumerate() {
                    let material = buffer.layer.material_key();
                    if buffer.layer.texture_id == 0 {
                        if self.warned_materials.insert(material) {
                            warn!("Skipping draws of material {material:?} without a texture");
                        }
                        continue;
                    }
                    self.passes[pass as usize].push(DrawEntry {
                        blockpos: pos,
                        buffer_index,
                        tile_layer: buffer.tile_layer,
                        material,
                        world,
                    });
                }
            }
            self.drawn_blocks.push(pos);
        }

        for pass in self.passes.iter_mut() {
            pass.sort_by(|a, b| {
                (a.tile_layer, a.material, a.blockpos.x, a.blockpos.y, a.blockpos.z).cmp(&(
                    b.tile_layer,
                    b.material,
                    b.blockpos.x,
                    b.blockpos.y,
                    b.blockpos.z,
                ))
            });
        }
        trace!(
            "Draw list: {} in range, {} frustum culled, {} occluded, {} drawn",
            self.blocks_in_range,
            self.blocks_frustum_culled,
            self.blocks_occluded,
            self.drawn_blocks.len()
        );
    }

    /// Entries of a pass in draw order.
    pub fn entries(&self, pass: RenderPass) -> &[DrawEntry] {
        &self.passes[pass as usize]
    }

    /// Blocks with at least one drawn buffer.
    pub fn drawn_blocks(&self) -> &[BlockPos] {
        &self.drawn_blocks
    }

    /// Blocks whose center was within range at the last update.
    pub fn blocks_in_range(&self) -> usize {
        self.blocks_in_range
    }

    /// Blocks in range skipped because they were hidden.
    pub fn blocks_occluded(&self) -> usize {
        self.blocks_occluded
    }

    /// Animates the meshes of drawn blocks.
    ///
    /// Near blocks animate fully, far ones skip texture frames. Only a
    /// limited number of meshes animate per call; the others wait until
    /// their force timer runs out.
    ///
    /// # Arguments
    /// * `map` - The map owning the meshes
    /// * `camera` - The viewer
    /// * `time` - Animation time in seconds
    /// * `crack` - Current crack level
    /// * `daynight_ratio` - Current day/night ratio in `0..=1000`
    pub fn animate(
        &self,
        map: &mut Map,
        camera: &Camera,
        time: f32,
        crack: i32,
        daynight_ratio: u32,
    ) {
        let mut animated = 0;
        for pos in self.drawn_blocks.iter() {
            let Some(mesh) = map
                .get_block_no_create_no_ex_mut(*pos)
                .and_then(|block| block.mesh.as_mut())
            else {
                continue;
            };
            if !mesh.has_animation() {
                continue;
            }
            let forced = mesh.decrement_animation_force_timer();
            if !forced && animated >= MAX_ANIMATED_PER_FRAME {
                continue;
            }
            let far_away = (block_center(*pos) - camera.position).magnitude() >= FAR_AWAY_DISTANCE;
            if mesh.animate(far_away, time, crack, daynight_ratio) {
                animated += 1;
            }
        }
    }

    /// Frame constants for the current camera.
    ///
    /// # Arguments
    /// * `camera` - The viewer
    /// * `settings` - Fog options
    /// * `sky_color` - Background color
    /// * `daynight_ratio` - Current day/night ratio in `0..=1000`
    /// * `animation_timer` - Animation time in seconds
    pub fn scene_constants(
        camera: &Camera,
        settings: &DrawSettings,
        sky_color: [f32; 4],
        daynight_ratio: u32,
        animation_timer: f32,
    ) -> SceneConstants {
        let offset = camera.camera_offset();
        let mut shifted = *camera;
        shifted.position -= Vector3::new(offset.x as f32, offset.y as f32, offset.z as f32) * BS;
        let fog_distance = if settings.enable_fog {
            settings.viewing_range * BS
        } else {
            FOG_RANGE_ALL
        };
        SceneConstants {
            view: shifted.calc_matrix(),
            projection: camera.projection.calc_matrix(),
            sky_color,
            fog_distance,
            fog_start: fog_distance * settings.fog_start,
            day_night_color: get_sunlight_color(daynight_ratio),
            animation_timer,
            camera_offset: offset,
        }
    }
}

/// Distance between the first two occlusion ray samples.
const OCCLUSION_STEP: f32 = BS;

/// Growth of the sample distance along an occlusion ray.
const OCCLUSION_STEP_FACTOR: f32 = 1.1;

/// Whether a ray from `from` toward `to` meets an opaque node before it
/// gets within `end_off` of `to`.
fn is_occluded(
    map: &Map,
    registry: &NodeRegistry,
    from: Point3<f32>,
    to: Point3<f32>,
    end_off: f32,
) -> bool {
    let d = to - from;
    let length = d.magnitude();
    if length <= 0.0 {
        return false;
    }
    let dir = d / length;
    let mut step = OCCLUSION_STEP;
    let mut off = OCCLUSION_STEP;
    while off < length - end_off {
        let p = float_to_node((from + dir * off).to_vec());
        let n = map.get_node(p);
        if n.content != CONTENT_IGNORE && registry.get_node(&n).solidness == 2 {
            return true;
        }
        off += step;
        step *= OCCLUSION_STEP_FACTOR;
    }
    false
}

/// Whether the eye sees none of a block's center and corners.
fn is_block_occluded(map: &Map, pos: BlockPos, eye: Point3<f32>) -> bool {
    let eye_node = float_to_node(eye.to_vec());
    let origin = block_origin(pos);
    let inside = (0..3).all(|i| (-1..=MAP_BLOCKSIZE).contains(&(eye_node[i] - origin[i])));
    if inside {
        return false;
    }

    let registry = map.registry();
    let center = block_center(pos);
    // Rays stop at the bounding sphere so the block's own nodes never count.
    let end_off = block_radius();
    let half = (MAP_BLOCKSIZE / 2 + 1) as f32 * BS;
    let mut targets = vec![center];
    for dx in [-1.0, 1.0] {
        for dy in [-1.0, 1.0] {
            for dz in [-1.0, 1.0] {
                targets.push(center + Vector3::new(dx, dy, dz) * half);
            }
        }
    }
    targets
        .iter()
        .all(|target| is_occluded(map, registry, eye, *target, end_off))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cgmath::Deg;

    use super::*;
    use crate::engine_state::{
        rendering::{
            camera::Projection,
            meshing::{mesh_make_data::MeshMakeData, prebaked::MeshRegistry, MapBlockMesh, MeshContext},
            texture::{ShaderRegistry, TextureRegistry},
        },
        voxels::{
            block::{MapNode, CONTENT_AIR},
            map_block::MapBlock,
        },
    };

    const DEFS: &str = r#"[
        {"name": "stone", "tiles": ["stone.png"]},
        {"name": "glass", "drawtype": "glasslike", "paramtype": "light",
         "sunlight_propagates": true, "tiles": ["glass.png"]}
    ]"#;

    fn settings(occlusion_culling: bool) -> DrawSettings {
        DrawSettings {
            viewing_range: 100.0,
            fog_start: 0.4,
            enable_fog: true,
            occlusion_culling,
        }
    }

    fn camera_at(x: f32) -> Camera {
        let projection = Projection::new(800, 600, Deg(72.0), 1.0, 5000.0);
        Camera::new(Point3::new(x, 8.0 * BS, 8.0 * BS), Deg(0.0), Deg(0.0), projection)
    }

    /// A map with one meshed block of a single stone node at (2, 0, 0) and
    /// air elsewhere along the X axis.
    fn world() -> (Map, MeshContext) {
        let textures = Arc::new(TextureRegistry::new());
        textures.add_source_image("stone.png", 16, 16);
        textures.add_source_image("glass.png", 16, 16);
        let mesh_settings = crate::core::settings::MeshSettings::default();
        let mut registry = NodeRegistry::from_json(DEFS).unwrap();
        registry.update_textures(textures.as_ref(), &ShaderRegistry::new(), &mesh_settings);
        let registry = Arc::new(registry);
        let ctx = MeshContext::new(
            registry.clone(),
            textures,
            Arc::new(MeshRegistry::new()),
            mesh_settings,
        );

        let mut map = Map::new(registry.clone());
        for x in -1..=4 {
            map.insert_block(MapBlock::filled(Point3::new(x, 0, 0), MapNode::new(CONTENT_AIR)));
        }
        let stone = MapNode::new(registry.get_id("stone").unwrap());
        map.set_node(Point3::new(40, 8, 8), stone);

        let pos = Point3::new(2, 0, 0);
        let mut data = MeshMakeData::new(pos, true);
        data.fill_from_map(&map);
        let mesh = MapBlockMesh::new(&data, &ctx);
        map.get_block_no_create_no_ex_mut(pos).unwrap().mesh = Some(mesh);
        (map, ctx)
    }

    #[test]
    fn visible_block_is_listed() {
        let (mut map, _ctx) = world();
        let mut list = DrawList::new();
        list.update(&mut map, &camera_at(0.0), &settings(true));
        assert_eq!(list.drawn_blocks(), &[Point3::new(2, 0, 0)]);
        assert_eq!(list.entries(RenderPass::Solid).len(), 1);
        assert!(list.entries(RenderPass::Transparent).is_empty());
    }

    #[test]
    fn blocks_behind_the_camera_are_culled() {
        let (mut map, _ctx) = world();
        let mut list = DrawList::new();
        let camera = camera_at(80.0 * BS);
        list.update(&mut map, &camera, &settings(false));
        assert!(list.drawn_blocks().is_empty());
        assert!(list.blocks_in_range() > 0);
    }

    #[test]
    fn walls_occlude_blocks_behind_them() {
        let (mut map, _ctx) = world();
        let stone = MapNode::new(map.registry().get_id("stone").unwrap());
        for x in 6..=10 {
            for y in 0..16 {
                for z in 0..16 {
                    map.set_node(Point3::new(x, y, z), stone);
                }
            }
        }
        let mut list = DrawList::new();
        list.update(&mut map, &camera_at(0.0), &settings(true));
        assert!(list.drawn_blocks().is_empty());
        assert!(list.blocks_occluded() > 0);

        list.update(&mut map, &camera_at(0.0), &settings(false));
        assert_eq!(list.drawn_blocks().len(), 1);
    }

    #[test]
    fn range_resets_usage_timers() {
        let (mut map, _ctx) = world();
        map.get_block_no_create_no_ex_mut(Point3::new(4, 0, 0))
            .unwrap()
            .increment_usage_timer(5.0);
        let mut list = DrawList::new();
        list.update(&mut map, &camera_at(0.0), &settings(true));
        let block = map.get_block_no_create_no_ex(Point3::new(4, 0, 0)).unwrap();
        assert_eq!(block.usage_timer(), 0.0);
    }

    #[test]
    fn fog_is_pushed_out_when_disabled() {
        let mut s = settings(true);
        s.enable_fog = false;
        let constants = DrawList::scene_constants(&camera_at(0.0), &s, [0.5, 0.7, 1.0, 1.0], 1000, 0.0);
        assert_eq!(constants.fog_distance, FOG_RANGE_ALL);
        assert_eq!(constants.camera_offset, Vector3::new(0, 0, 0));
    }
}
