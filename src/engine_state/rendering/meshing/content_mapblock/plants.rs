//! Plant-like billboards: plants, rooted plants and fire.

use cgmath::{Vector2, Vector3};
use num_traits::FromPrimitive;

use crate::engine_state::{
    rendering::tile::{TileSpec, MATERIAL_FLAG_CRACK_OVERLAY},
    voxels::{
        block::{CONTENT_AIR, CONTENT_IGNORE},
        node_registry::draw_type::{
            ParamType2, PlantStyle, MESHOPTIONS_RANDOM_OFFSET, MESHOPTIONS_RANDOM_OFFSET_Y,
            MESHOPTIONS_SCALE,
        },
        BS,
    },
};

use super::{rotate_xz_by, rotate_yz_by, MapblockMeshGenerator};

/// `param2` bits selecting the plant style.
const MESHOPTIONS_STYLE_MASK: u8 = 0x07;

/// Steps of `ParamType2::Degrotate`.
const DEGROTATE_STEPS: u8 = 240;

/// Layout of the plant being drawn.
struct PlantParams {
    tile: TileSpec,
    style: PlantStyle,
    /// Half width of a quad
    scale: f32,
    /// Height in nodes; quads taller than one node repeat the texture
    height: f32,
    /// Added to every vertex
    offset: Vector3<f32>,
    /// Added to every quad's rotation, in degrees
    rotate_degree: f32,
    random_offset_y: bool,
    /// Quads drawn so far, seeds the vertical offset
    face_num: u32,
}

/// Deterministic random stream of a node position.
fn position_rng(seed: i64) -> fastrand::Rng {
    fastrand::Rng::with_seed(seed as u64)
}

impl MapblockMeshGenerator<'_> {
    pub(super) fn draw_plantlike_node(&mut self) {
        let tile = self.use_tile(0, 0, 0, false);
        self.draw_plantlike(tile);
    }

    pub(super) fn draw_plantlike_rooted_node(&mut self) {
        let tile = self.use_tile(0, MATERIAL_FLAG_CRACK_OVERLAY, 0, true);
        self.origin.y += BS;
        let above = Vector3::new(0, 1, 0);
        self.light = self.compute_light(self.node_at(above), above);
        self.draw_plantlike(tile);
    }

    fn draw_plantlike(&mut self, tile: TileSpec) {
        let world = self.world_pos(Vector3::new(0, 0, 0));
        let mut plant = PlantParams {
            tile,
            style: PlantStyle::Cross,
            scale: BS / 2.0 * self.f.visual_scale,
            height: 1.0,
            offset: Vector3::new(0.0, 0.0, 0.0),
            rotate_degree: 0.0,
            random_offset_y: false,
            face_num: 0,
        };

        match self.f.param_type_2 {
            ParamType2::Meshoptions => {
                let param2 = self.n.param2;
                plant.style = PlantStyle::from_u8(param2 & MESHOPTIONS_STYLE_MASK)
                    .unwrap_or(PlantStyle::Cross);
                if param2 & MESHOPTIONS_SCALE != 0 {
                    plant.scale *= 1.41421;
                }
                if param2 & MESHOPTIONS_RANDOM_OFFSET != 0 {
                    let mut rng = position_rng(
                        (world.x as i64) << 8 | world.z as i64 & 0xff | (world.y as i64) << 16,
                    );
                    plant.offset.x = BS * ((rng.u32(..) % 16) as f32 / 16.0 * 0.29 - 0.145);
                    plant.offset.z = BS * ((rng.u32(..) % 16) as f32 / 16.0 * 0.29 - 0.145);
                }
                plant.random_offset_y = param2 & MESHOPTIONS_RANDOM_OFFSET_Y != 0;
            }
            ParamType2::Degrotate => {
                plant.rotate_degree = 1.5 * (self.n.param2 % DEGROTATE_STEPS) as f32;
            }
            ParamType2::Leveled => {
                plant.height = self.n.param2 as f32 / 16.0;
            }
            _ => {}
        }

        match plant.style {
            PlantStyle::Cross => {
                self.draw_plantlike_quad(&mut plant, 46.0, 0.0, false);
                self.draw_plantlike_quad(&mut plant, -44.0, 0.0, false);
            }
            PlantStyle::Cross2 => {
                self.draw_plantlike_quad(&mut plant, 91.0, 0.0, false);
                self.draw_plantlike_quad(&mut plant, 1.0, 0.0, false);
            }
            PlantStyle::Star => {
                self.draw_plantlike_quad(&mut plant, 121.0, 0.0, false);
                self.draw_plantlike_quad(&mut plant, 241.0, 0.0, false);
                self.draw_plantlike_quad(&mut plant, 1.0, 0.0, false);
            }
            PlantStyle::Hash => {
                for rotation in [1.0, 91.0, 181.0, 271.0] {
                    self.draw_plantlike_quad(&mut plant, rotation, BS / 4.0, false);
                }
            }
            PlantStyle::Hash2 => {
                for rotation in [1.0, 91.0, 181.0, 271.0] {
                    self.draw_plantlike_quad(&mut plant, rotation, -BS / 2.0, true);
                }
            }
        }
    }

    /// Draws one upright plant quad.
    ///
    /// # Arguments
    /// * `plant` - Layout of the plant
    /// * `rotation` - Rotation about Y in degrees
    /// * `quad_offset` - Distance the quad is pushed along its normal
    /// * `offset_top_only` - Push only the upper edge, tilting the quad
    fn draw_plantlike_quad(
        &mut self,
        plant: &mut PlantParams,
        rotation: f32,
        quad_offset: f32,
        offset_top_only: bool,
    ) {
        let s = plant.scale;
        let top = -BS / 2.0 + 2.0 * s * plant.height;
        let mut coords = [
            Vector3::new(-s, -BS / 2.0, 0.0),
            Vector3::new(s, -BS / 2.0, 0.0),
            Vector3::new(s, top, 0.0),
            Vector3::new(-s, top, 0.0),
        ];
        if plant.random_offset_y {
            let world = self.world_pos(Vector3::new(0, 0, 0));
            let seed = plant.face_num as i64
                | (world.x as i64) << 16
                | (world.z as i64) << 8
                | (world.y as i64) << 24;
            plant.face_num += 1;
            let mut rng = position_rng(seed);
            plant.offset.y = -BS * ((rng.u32(..) % 16) as f32 / 16.0 * 0.125);
        }
        let pushed = if offset_top_only { 2..4 } else { 0..4 };
        for v in coords[pushed].iter_mut() {
            v.z += quad_offset;
        }
        let coords = coords.map(|v| rotate_xz_by(v, rotation + plant.rotate_degree) + plant.offset);
        let h = plant.height;
        let uvs = [
            Vector2::new(0.0, h),
            Vector2::new(1.0, h),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 0.0),
        ];
        let tile = plant.tile.clone();
        self.draw_quad(&tile, coords, Some(uvs), None);
    }

    pub(super) fn draw_firelike_node(&mut self) {
        let tile = self.use_tile(0, 0, 0, false);
        let scale = BS / 2.0 * self.f.visual_scale;

        // Sides in quad order: +Z, -X, -Z, +X, then -Y and +Y.
        let dirs = [
            Vector3::new(0, 0, 1),
            Vector3::new(-1, 0, 0),
            Vector3::new(0, 0, -1),
            Vector3::new(1, 0, 0),
            Vector3::new(0, -1, 0),
            Vector3::new(0, 1, 0),
        ];
        let neighbor = dirs.map(|d| {
            let c = self.node_at(d).content;
            c != CONTENT_IGNORE && c != CONTENT_AIR && c != self.n.content
        });
        let any_neighbor = neighbor.iter().any(|n| *n);
        let basic = neighbor[4] || !any_neighbor;
        let bottom = neighbor[5];

        for (i, rotation) in [0.0, 90.0, 180.0, 270.0].into_iter().enumerate() {
            if basic || neighbor[i] {
                self.draw_firelike_quad(&tile, scale, rotation, -10.0, 0.4 * BS, 0.0);
            } else if bottom {
                self.draw_firelike_quad(&tile, scale, rotation, 70.0, 0.47 * BS, 0.484 * BS);
            }
        }
        if basic {
            self.draw_firelike_quad(&tile, scale, 45.0, 0.0, 0.0, 0.0);
            self.draw_firelike_quad(&tile, scale, -45.0, 0.0, 0.0, 0.0);
        }
    }

    /// Draws one flame quad.
    ///
    /// # Arguments
    /// * `rotation` - Rotation about Y in degrees
    /// * `opening_angle` - Tilt about X before the quad is moved out
    /// * `offset_h` - Distance from the node center
    /// * `offset_v` - Height added after rotating
    fn draw_firelike_quad(
        &mut self,
        tile: &TileSpec,
        scale: f32,
        rotation: f32,
        opening_angle: f32,
        offset_h: f32,
        offset_v: f32,
    ) {
        let coords = [
            Vector3::new(-scale, -BS / 2.0, 0.0),
            Vector3::new(scale, -BS / 2.0, 0.0),
            Vector3::new(scale, -BS / 2.0 + scale * 2.0, 0.0),
            Vector3::new(-scale, -BS / 2.0 + scale * 2.0, 0.0),
        ]
        .map(|v| {
            let mut v = rotate_yz_by(v, opening_angle);
            v.z += offset_h;
            let mut v = rotate_xz_by(v, rotation);
            v.y += offset_v;
            v
        });
        self.draw_quad(tile, coords, None, None);
    }
}
