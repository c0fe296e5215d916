//! Shapes that depend on their neighbors: fences, rails and node boxes.

use cgmath::Vector3;

use crate::engine_state::{
    collision::aabb::Aabb,
    rendering::tile::{
        TileSpec, MATERIAL_FLAG_BACKFACE_CULLING, MATERIAL_FLAG_CRACK,
        MATERIAL_FLAG_CRACK_OVERLAY,
    },
    voxels::{block::block_side::BlockSide, node_registry::draw_type::DrawType, BS},
};

use super::{rotate_xz_by, MapblockMeshGenerator};

/// Group joining rails of different node types into one track.
const RAILLIKE_GROUP: &str = "connect_to_raillike";

/// Horizontal directions probed for rails; bit `i` of the connection code
/// is set when direction `i` connects.
const RAIL_DIRECTIONS: [Vector3<i32>; 4] = [
    Vector3::new(0, 0, 1),
    Vector3::new(0, 0, -1),
    Vector3::new(-1, 0, 0),
    Vector3::new(1, 0, 0),
];

/// Rotation of a rail sloping up toward each of `RAIL_DIRECTIONS`.
const RAIL_SLOPE_ANGLES: [f32; 4] = [0.0, 180.0, 90.0, -90.0];

/// Rail tile indices.
const RAIL_STRAIGHT: usize = 0;
const RAIL_CURVED: usize = 1;
const RAIL_JUNCTION: usize = 2;
const RAIL_CROSS: usize = 3;

/// Tile and rotation for each connection code.
const RAIL_KINDS: [(usize, f32); 16] = [
    (RAIL_STRAIGHT, 0.0),
    (RAIL_STRAIGHT, 0.0),
    (RAIL_STRAIGHT, 0.0),
    (RAIL_STRAIGHT, 0.0),
    (RAIL_STRAIGHT, 90.0),
    (RAIL_CURVED, 180.0),
    (RAIL_CURVED, 270.0),
    (RAIL_JUNCTION, 180.0),
    (RAIL_STRAIGHT, 90.0),
    (RAIL_CURVED, 90.0),
    (RAIL_CURVED, 0.0),
    (RAIL_JUNCTION, 0.0),
    (RAIL_STRAIGHT, 90.0),
    (RAIL_JUNCTION, 90.0),
    (RAIL_JUNCTION, 270.0),
    (RAIL_CROSS, 0.0),
];

fn aabb(x0: f32, y0: f32, z0: f32, x1: f32, y1: f32, z1: f32) -> Aabb {
    Aabb::new(Vector3::new(x0, y0, z0), Vector3::new(x1, y1, z1))
}

impl MapblockMeshGenerator<'_> {
    pub(super) fn draw_fencelike_node(&mut self) {
        let tile = self.use_tile(0, 0, 0, false);
        let mut tile_nocrack = tile.clone();
        for layer in tile_nocrack.layers.iter_mut() {
            layer.material_flags &= !MATERIAL_FLAG_CRACK;
        }
        // Wood grain runs along the post.
        let mut tile_rot = tile;
        tile_rot.rotation = 1;

        let post_rad = BS / 8.0;
        let bar_rad = BS / 16.0;
        let bar_len = BS / 2.0 - post_rad;

        let post = aabb(-post_rad, -BS / 2.0, -post_rad, post_rad, BS / 2.0, post_rad);
        self.draw_cuboid(&post, &std::array::from_fn(|_| tile_rot.clone()), 0);

        let bars: [TileSpec; 6] = std::array::from_fn(|_| tile_nocrack.clone());
        if self.registry.get_node(&self.node_at(Vector3::new(1, 0, 0))).drawtype
            == DrawType::Fencelike
        {
            for y in [BS / 4.0, -BS / 4.0] {
                let bar = aabb(
                    BS / 2.0 - bar_len,
                    y - bar_rad,
                    -bar_rad,
                    BS / 2.0 + bar_len,
                    y + bar_rad,
                    bar_rad,
                );
                self.draw_cuboid(&bar, &bars, 0);
            }
        }
        if self.registry.get_node(&self.node_at(Vector3::new(0, 0, 1))).drawtype
            == DrawType::Fencelike
        {
            for y in [BS / 4.0, -BS / 4.0] {
                let bar = aabb(
                    -bar_rad,
                    y - bar_rad,
                    BS / 2.0 - bar_len,
                    bar_rad,
                    y + bar_rad,
                    BS / 2.0 + bar_len,
                );
                self.draw_cuboid(&bar, &bars, 0);
            }
        }
    }

    fn is_same_rail(&self, dir: Vector3<i32>, group: i32) -> bool {
        let n2 = self.node_at(dir);
        if n2.content == self.n.content {
            return true;
        }
        let f2 = self.registry.get_node(&n2);
        f2.drawtype == DrawType::Raillike && f2.group(RAILLIKE_GROUP) == group
    }

    pub(super) fn draw_raillike_node(&mut self) {
        let group = self.f.group(RAILLIKE_GROUP);
        let up = Vector3::new(0, 1, 0);

        let mut code = 0;
        let mut slope = None;
        for (i, dir) in RAIL_DIRECTIONS.iter().enumerate() {
            let rail_above = self.is_same_rail(*dir + up, group);
            if rail_above {
                slope = Some(RAIL_SLOPE_ANGLES[i]);
            }
            if rail_above || self.is_same_rail(*dir, group) || self.is_same_rail(*dir - up, group)
            {
                code |= 1 << i;
            }
        }
        let (tile_index, angle) = match slope {
            Some(angle) => (RAIL_STRAIGHT, angle),
            None => RAIL_KINDS[code],
        };

        let tile = self.use_tile(
            tile_index,
            MATERIAL_FLAG_CRACK_OVERLAY,
            MATERIAL_FLAG_BACKFACE_CULLING,
            false,
        );
        let offset = BS / 64.0;
        let size = BS / 2.0;
        let y2 = if slope.is_some() { size } else { -size };
        let coords = [
            Vector3::new(-size, y2 + offset, size),
            Vector3::new(size, y2 + offset, size),
            Vector3::new(size, -size + offset, -size),
            Vector3::new(-size, -size + offset, -size),
        ]
        .map(|v| rotate_xz_by(v, angle));
        self.draw_quad(&tile, coords, None, None);
    }

    pub(super) fn draw_nodebox_node(&mut self) {
        let tiles = BlockSide::all().map(|side| self.face_tile(side));

        let mut neighbors = 0;
        if self.f.node_box.is_connected() {
            for side in BlockSide::all() {
                let n2 = self.node_at(side.normal());
                if self.registry.nodebox_connects(self.n, n2, side) {
                    neighbors |= side.connect_bit();
                }
            }
        }

        for b in self.f.node_box.boxes(&self.n, self.f, neighbors) {
            self.draw_cuboid(&b.scaled(BS), &tiles, 0);
        }
    }
}
