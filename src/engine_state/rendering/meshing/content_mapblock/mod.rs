//! # Special Drawtype Generators
//!
//! Geometry for every node that is not a plain cube. The generator walks
//! the cells of the block and dispatches on the node's drawtype; each
//! drawtype lives in its own submodule and emits quads and cuboids through
//! the shared helpers here.
//!
//! Generator coordinates are in world units relative to the node center
//! (a node spans `-BS/2..BS/2`). The helpers add the node's offset inside
//! the block before handing vertices to the collector.
//!
//! ## Lighting
//! With smooth lighting each node samples the light at its eight corners
//! once, and every vertex blends those samples trilinearly by its position.
//! Without it the whole node uses its interior light raised by one level.

use cgmath::{InnerSpace, Point3, Vector2, Vector3};

use crate::engine_state::{
    collision::aabb::Aabb,
    rendering::{
        color::encode_light,
        tile::{TileSpec, MATERIAL_FLAG_CRACK},
        Vertex,
    },
    voxels::{
        block::{block_side::BlockSide, MapNode},
        lighting::smooth::LightSampler,
        node_registry::{draw_type::DrawType, ContentFeatures, NodeRegistry},
        NodePos, BS, MAP_BLOCKSIZE,
    },
};

use super::{
    collector::MeshCollector, fast_faces::face_uv, get_node_tile, mesh_make_data::MeshMakeData,
    MeshContext,
};

mod connected;
mod glass;
mod liquid;
mod mesh;
mod plants;
mod wall_mounted;

/// How far outside the node smooth light blending may extrapolate, in nodes.
const SMOOTH_LIGHTING_OVERSIZE: f32 = 1.0;

/// Corner directions of a node, indexed by `x << 2 | y << 1 | z` with 1
/// meaning the positive side.
const LIGHT_DIRS: [Vector3<i32>; 8] = [
    Vector3::new(-1, -1, -1),
    Vector3::new(-1, -1, 1),
    Vector3::new(-1, 1, -1),
    Vector3::new(-1, 1, 1),
    Vector3::new(1, -1, -1),
    Vector3::new(1, -1, 1),
    Vector3::new(1, 1, -1),
    Vector3::new(1, 1, 1),
];

/// Rotates about the Y axis; positive angles turn +X toward +Z.
pub(crate) fn rotate_xz_by(v: Vector3<f32>, degrees: f32) -> Vector3<f32> {
    let (sn, cs) = (degrees as f64).to_radians().sin_cos();
    let (x, z) = (v.x as f64, v.z as f64);
    Vector3::new((x * cs - z * sn) as f32, v.y, (x * sn + z * cs) as f32)
}

/// Rotates about the X axis; positive angles turn +Y toward +Z.
pub(crate) fn rotate_yz_by(v: Vector3<f32>, degrees: f32) -> Vector3<f32> {
    let (sn, cs) = (degrees as f64).to_radians().sin_cos();
    let (y, z) = (v.y as f64, v.z as f64);
    Vector3::new(v.x, (y * cs - z * sn) as f32, (y * sn + z * cs) as f32)
}

/// Rotates about the Z axis; positive angles turn +X toward +Y.
pub(crate) fn rotate_xy_by(v: Vector3<f32>, degrees: f32) -> Vector3<f32> {
    let (sn, cs) = (degrees as f64).to_radians().sin_cos();
    let (x, y) = (v.x as f64, v.y as f64);
    Vector3::new((x * cs - y * sn) as f32, (x * sn + y * cs) as f32, v.z)
}

/// Light of the node being drawn.
#[derive(Copy, Clone, Debug)]
enum NodeLight {
    /// One packed value for every vertex
    Flat(u16),
    /// Packed values at the eight corners, indexed like `LIGHT_DIRS`
    Smooth([u16; 8]),
}

/// Per-node drawing state shared by the drawtype generators.
pub(crate) struct MapblockMeshGenerator<'a> {
    data: &'a MeshMakeData,
    ctx: &'a MeshContext,
    registry: &'a NodeRegistry,
    sampler: &'a LightSampler<'a>,
    collector: &'a mut MeshCollector,
    /// World position of the block origin
    blockpos_nodes: NodePos,
    /// Current node, block-local
    p: Point3<i32>,
    n: MapNode,
    f: &'a ContentFeatures,
    /// Offset of the current node center inside the block, in world units
    origin: Vector3<f32>,
    light: NodeLight,
}

impl<'a> MapblockMeshGenerator<'a> {
    /// Creates a generator writing into `collector`.
    pub(crate) fn new(
        data: &'a MeshMakeData,
        ctx: &'a MeshContext,
        sampler: &'a LightSampler<'a>,
        collector: &'a mut MeshCollector,
    ) -> Self {
        let registry: &'a NodeRegistry = &ctx.registry;
        let n = MapNode::air();
        MapblockMeshGenerator {
            data,
            ctx,
            registry,
            sampler,
            collector,
            blockpos_nodes: data.origin(),
            p: Point3::new(0, 0, 0),
            n,
            f: registry.get_node(&n),
            origin: Vector3::new(0.0, 0.0, 0.0),
            light: NodeLight::Flat(0),
        }
    }

    /// Emits the geometry of every special node of the block.
    pub(crate) fn generate(&mut self) {
        for z in 0..MAP_BLOCKSIZE {
            for y in 0..MAP_BLOCKSIZE {
                for x in 0..MAP_BLOCKSIZE {
                    self.p = Point3::new(x, y, z);
                    self.n = self.node_at(Vector3::new(0, 0, 0));
                    self.f = self.registry.get_node(&self.n);
                    if matches!(
                        self.f.drawtype,
                        DrawType::Normal | DrawType::Airlike | DrawType::Liquid
                    ) {
                        continue;
                    }
                    self.origin = Vector3::new(x as f32, y as f32, z as f32) * BS;
                    self.draw_node();
                }
            }
        }
    }

    fn draw_node(&mut self) {
        self.light = self.compute_light(self.n, Vector3::new(0, 0, 0));
        match self.f.drawtype {
            DrawType::FlowingLiquid => self.draw_liquid_node(),
            DrawType::Glasslike => self.draw_glasslike_node(),
            DrawType::GlasslikeFramed => self.draw_glasslike_framed_node(),
            DrawType::Allfaces => self.draw_allfaces_node(),
            DrawType::Torchlike => self.draw_torchlike_node(),
            DrawType::Signlike => self.draw_signlike_node(),
            DrawType::Plantlike => self.draw_plantlike_node(),
            DrawType::PlantlikeRooted => self.draw_plantlike_rooted_node(),
            DrawType::Firelike => self.draw_firelike_node(),
            DrawType::Fencelike => self.draw_fencelike_node(),
            DrawType::Raillike => self.draw_raillike_node(),
            DrawType::Nodebox => self.draw_nodebox_node(),
            DrawType::Mesh => self.draw_mesh_node(),
            DrawType::Normal | DrawType::Airlike | DrawType::Liquid => {}
        }
    }

    /// World position of the current node plus `offset`.
    fn world_pos(&self, offset: Vector3<i32>) -> NodePos {
        self.blockpos_nodes + (self.p - Point3::new(0, 0, 0)) + offset
    }

    /// Cell next to the current node.
    fn node_at(&self, offset: Vector3<i32>) -> MapNode {
        self.data.vmanip.get_node(self.world_pos(offset))
    }

    fn is_cracked(&self) -> bool {
        self.data.crack_pos_relative == Some(self.p)
    }

    /// Light for the node at `offset` from the current one, as the current
    /// node's geometry should use it.
    fn compute_light(&self, node: MapNode, offset: Vector3<i32>) -> NodeLight {
        if self.data.smooth_lighting {
            let p = self.world_pos(offset);
            NodeLight::Smooth(LIGHT_DIRS.map(|dir| self.sampler.smooth_light_transparent(p, dir)))
        } else {
            NodeLight::Flat(self.sampler.interior_light(node, 1))
        }
    }

    /// Tile `index` of the current node's regular or special tiles.
    ///
    /// # Arguments
    /// * `index` - Tile index, `0..6`
    /// * `set_flags` - Material flags added to every layer
    /// * `reset_flags` - Material flags removed from every layer
    /// * `special` - Read from the special tiles
    fn use_tile(&self, index: usize, set_flags: u8, reset_flags: u8, special: bool) -> TileSpec {
        let tiles = if special {
            &self.f.special_tiles
        } else {
            &self.f.tiles
        };
        let mut tile = tiles[index.min(5)].clone();
        if special && tile.layers[0].is_empty() {
            tile = self.f.tiles[index.min(5)].clone();
        }
        let crack = if self.is_cracked() { MATERIAL_FLAG_CRACK } else { 0 };
        for layer in tile.layers.iter_mut().filter(|l| !l.is_empty()) {
            layer.material_flags |= set_flags | crack;
            layer.material_flags &= !reset_flags;
        }
        tile
    }

    /// Tile shown on a world face of the current node, honoring its rotation.
    fn face_tile(&self, side: BlockSide) -> TileSpec {
        get_node_tile(self.f, &self.n, side, self.is_cracked())
    }

    /// Blended light at a position relative to the node center.
    fn blend_light(&self, pos: Vector3<f32>) -> u16 {
        match self.light {
            NodeLight::Flat(light) => light,
            NodeLight::Smooth(frame) => {
                let limit = |v: f32| {
                    (v / BS + 0.5).clamp(-SMOOTH_LIGHTING_OVERSIZE, 1.0 + SMOOTH_LIGHTING_OVERSIZE)
                };
                let (x, y, z) = (limit(pos.x), limit(pos.y), limit(pos.z));
                let mut day = 0.0f32;
                let mut night = 0.0f32;
                for (k, light) in frame.iter().enumerate() {
                    let dx = if k & 4 != 0 { x } else { 1.0 - x };
                    let dy = if k & 2 != 0 { y } else { 1.0 - y };
                    let dz = if k & 1 != 0 { z } else { 1.0 - z };
                    let weight = dx * dy * dz;
                    day += weight * (light & 0xff) as f32;
                    night += weight * (light >> 8) as f32;
                }
                let day = day.round().clamp(0.0, 255.0) as u16;
                let night = night.round().clamp(0.0, 255.0) as u16;
                day | night << 8
            }
        }
    }

    fn light_color(&self, pos: Vector3<f32>) -> [u8; 4] {
        encode_light(self.blend_light(pos), self.f.light_source)
    }

    /// Draws a quad given in node-relative world units.
    ///
    /// # Arguments
    /// * `tile` - Texture of the quad
    /// * `coords` - Corners, bottom-left first
    /// * `uvs` - Texture coordinates of the corners; `None` maps the full tile
    /// * `normal` - Direction the front side should face. The corner order
    ///   is reversed when it disagrees. `None` keeps the order and leaves
    ///   the vertex normal at zero, which disables face shading.
    fn draw_quad(
        &mut self,
        tile: &TileSpec,
        coords: [Vector3<f32>; 4],
        uvs: Option<[Vector2<f32>; 4]>,
        normal: Option<Vector3<f32>>,
    ) {
        let mut coords = coords;
        let mut uvs = uvs.unwrap_or([
            Vector2::new(0.0, 1.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 0.0),
        ]);
        let vertex_normal = match normal {
            Some(intended) => {
                let geometric = (coords[1] - coords[0]).cross(coords[2] - coords[0]);
                if geometric.dot(intended) < 0.0 {
                    coords.reverse();
                    uvs.reverse();
                }
                intended
            }
            None => Vector3::new(0.0, 0.0, 0.0),
        };
        let vertices: Vec<Vertex> = (0..4)
            .map(|k| {
                Vertex::new(
                    coords[k] + self.origin,
                    vertex_normal,
                    self.light_color(coords[k]),
                    uvs[k],
                )
            })
            .collect();
        self.collector.append(tile, &vertices, &[0, 1, 2, 2, 3, 0]);
    }

    /// Draws the six faces of a box given in node-relative world units.
    ///
    /// # Arguments
    /// * `aabb` - The box
    /// * `tiles` - Tile per face in `BlockSide` order
    /// * `skip_faces` - `BlockSide::connect_bit` mask of faces to leave out
    fn draw_cuboid(&mut self, aabb: &Aabb, tiles: &[TileSpec; 6], skip_faces: u8) {
        let center = aabb.center();
        let half = aabb.extent() * 0.5;
        for side in BlockSide::all() {
            if skip_faces & side.connect_bit() != 0 {
                continue;
            }
            let tile = &tiles[side as usize];
            let n = side.normal_f32();
            let r = side.texture_right();
            let u = side.texture_up();
            let r = Vector3::new(r.x as f32, r.y as f32, r.z as f32);
            let u = Vector3::new(u.x as f32, u.y as f32, u.z as f32);
            let extent = |d: Vector3<f32>| d.x.abs() * half.x + d.y.abs() * half.y + d.z.abs() * half.z;
            let (hn, hr, hu) = (extent(n), extent(r), extent(u));
            let face_center = center + n * hn;
            let coords = [
                face_center - r * hr - u * hu,
                face_center + r * hr - u * hu,
                face_center + r * hr + u * hu,
                face_center - r * hr + u * hu,
            ];
            // Texture coordinates follow the box's place inside the node.
            let uvs = coords.map(|c| {
                let s = c.dot(r) / BS + 0.5;
                let t = c.dot(u) / BS + 0.5;
                face_uv(s, t, 1.0, 1.0, tile.rotation)
            });
            self.draw_quad(tile, coords, Some(uvs), Some(n));
        }
    }

    /// Draws a box with the node's rotated face tiles.
    fn draw_auto_lighted_cuboid(&mut self, aabb: &Aabb) {
        let tiles = BlockSide::all().map(|side| self.face_tile(side));
        self.draw_cuboid(aabb, &tiles, 0);
    }

    /// Bank-wise light check used by liquids.
    fn interior_light_of(&self, node: MapNode) -> u16 {
        self.sampler.interior_light(node, 0)
    }
}

/// Emits the special drawtype geometry of a block.
pub(crate) fn generate(
    data: &MeshMakeData,
    ctx: &MeshContext,
    sampler: &LightSampler,
    collector: &mut MeshCollector,
) {
    MapblockMeshGenerator::new(data, ctx, sampler, collector).generate();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotations_follow_the_right_hand_axes() {
        let x = Vector3::new(1.0, 0.0, 0.0);
        let r = rotate_xz_by(x, 90.0);
        assert!((r - Vector3::new(0.0, 0.0, 1.0)).magnitude() < 1e-6);
        let y = Vector3::new(0.0, 1.0, 0.0);
        let r = rotate_yz_by(y, 90.0);
        assert!((r - Vector3::new(0.0, 0.0, 1.0)).magnitude() < 1e-6);
        let r = rotate_xy_by(x, 90.0);
        assert!((r - Vector3::new(0.0, 1.0, 0.0)).magnitude() < 1e-6);
    }

    #[test]
    fn light_dirs_match_their_index_bits() {
        for (k, dir) in LIGHT_DIRS.iter().enumerate() {
            assert_eq!(dir.x > 0, k & 4 != 0);
            assert_eq!(dir.y > 0, k & 2 != 0);
            assert_eq!(dir.z > 0, k & 1 != 0);
        }
    }
}
