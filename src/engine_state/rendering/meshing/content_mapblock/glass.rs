//! Glass-like nodes: plain glass, framed glass and all-faces cubes.

use cgmath::Vector3;

use crate::engine_state::{
    collision::aabb::Aabb,
    voxels::{
        block::block_side::BlockSide,
        node_registry::draw_type::ParamType2,
        BS,
    },
};

use super::{face_uv, MapblockMeshGenerator};

/// The 26 neighbor directions in the order framed glass checks them: the
/// six faces, then the twelve edges.
const FRAMED_NEIGHBORS: [Vector3<i32>; 18] = [
    Vector3::new(0, 0, 1),
    Vector3::new(0, 1, 0),
    Vector3::new(1, 0, 0),
    Vector3::new(0, 0, -1),
    Vector3::new(0, -1, 0),
    Vector3::new(-1, 0, 0),
    Vector3::new(-1, 1, 0),
    Vector3::new(1, 1, 0),
    Vector3::new(0, 1, 1),
    Vector3::new(0, 1, -1),
    Vector3::new(-1, 0, 1),
    Vector3::new(1, 0, 1),
    Vector3::new(-1, 0, -1),
    Vector3::new(1, 0, -1),
    Vector3::new(-1, -1, 0),
    Vector3::new(1, -1, 0),
    Vector3::new(0, -1, 1),
    Vector3::new(0, -1, -1),
];

/// Sides matching the first six entries of `FRAMED_NEIGHBORS`.
const FRAMED_FACES: [BlockSide; 6] = [
    BlockSide::BACK,
    BlockSide::TOP,
    BlockSide::RIGHT,
    BlockSide::FRONT,
    BlockSide::BOTTOM,
    BlockSide::LEFT,
];

/// For each frame edge: the two faces it runs between and the edge
/// neighbor across it, as indices into `FRAMED_NEIGHBORS`.
const FRAME_EDGE_NEIGHBORS: [[usize; 3]; 12] = [
    [1, 2, 7],
    [1, 5, 6],
    [4, 2, 15],
    [4, 5, 14],
    [2, 0, 11],
    [2, 3, 13],
    [5, 0, 10],
    [5, 3, 12],
    [0, 1, 8],
    [0, 4, 16],
    [3, 4, 17],
    [3, 1, 9],
];

/// Neighbors consulted when only vertical merging is allowed.
const CHECK_VERTICAL: [usize; 2] = [1, 4];
/// Neighbors consulted when only horizontal merging is allowed.
const CHECK_HORIZONTAL: [usize; 8] = [0, 2, 3, 5, 10, 11, 12, 13];

/// `param2` bit disabling horizontal merging of framed glass.
const GLASS_NO_HORIZONTAL_MERGE: u8 = 0x80;
/// `param2` bit disabling vertical merging of framed glass.
const GLASS_NO_VERTICAL_MERGE: u8 = 0x40;
/// `param2` bits holding the liquid level of a framed glass tank.
const GLASS_LIQUID_LEVEL_MASK: u8 = 0x3f;

fn frame_edges(a: f32, b: f32) -> [Aabb; 12] {
    let bx = |x0, y0, z0, x1, y1, z1| Aabb::new(Vector3::new(x0, y0, z0), Vector3::new(x1, y1, z1));
    [
        bx(b, b, -a, a, a, a),
        bx(-a, b, -a, -b, a, a),
        bx(b, -a, -a, a, -b, a),
        bx(-a, -a, -a, -b, -b, a),
        bx(b, -a, b, a, a, a),
        bx(b, -a, -a, a, a, -b),
        bx(-a, -a, b, -b, a, a),
        bx(-a, -a, -a, -b, a, -b),
        bx(-a, b, b, a, a, a),
        bx(-a, -a, b, a, -b, a),
        bx(-a, -a, -a, a, -b, -b),
        bx(-a, b, -a, a, a, -b),
    ]
}

impl MapblockMeshGenerator<'_> {
    pub(super) fn draw_glasslike_node(&mut self) {
        let mut skip = 0;
        for side in BlockSide::all() {
            if self.node_at(side.normal()).content == self.n.content {
                skip |= side.connect_bit();
            }
        }
        let tiles = BlockSide::all().map(|side| self.face_tile(side));
        let h = BS / 2.0;
        let full = Aabb::new(Vector3::new(-h, -h, -h), Vector3::new(h, h, h));
        self.draw_cuboid(&full, &tiles, skip);
    }

    pub(super) fn draw_allfaces_node(&mut self) {
        let h = BS / 2.0 * self.f.visual_scale;
        self.draw_auto_lighted_cuboid(&Aabb::new(
            Vector3::new(-h, -h, -h),
            Vector3::new(h, h, h),
        ));
    }

    pub(super) fn draw_glasslike_framed_node(&mut self) {
        let param2 = if self.f.param_type_2 == ParamType2::GlasslikeLiquidLevel {
            self.n.param2
        } else {
            0
        };
        let h_merge = param2 & GLASS_NO_HORIZONTAL_MERGE == 0;
        let v_merge = param2 & GLASS_NO_VERTICAL_MERGE == 0;
        let liquid_level = param2 & GLASS_LIQUID_LEVEL_MASK;

        let a = BS / 2.0;
        let g = a - 0.03;
        let b = 0.876 * (BS / 2.0);

        // Neighbors of the same type that this node merges with.
        let mut nb = [false; 18];
        if h_merge || v_merge {
            let checked: Vec<usize> = match (h_merge, v_merge) {
                (false, _) => CHECK_VERTICAL.to_vec(),
                (_, false) => CHECK_HORIZONTAL.to_vec(),
                _ => (0..FRAMED_NEIGHBORS.len()).collect(),
            };
            for i in checked {
                nb[i] = self.node_at(FRAMED_NEIGHBORS[i]).content == self.n.content;
            }
        }

        for (edge, [f0, f1, across]) in frame_edges(a, b).iter().zip(FRAME_EDGE_NEIGHBORS) {
            let invisible = if nb[across] {
                nb[f0] && nb[f1]
            } else {
                nb[f0] ^ nb[f1]
            };
            if !invisible {
                self.draw_auto_lighted_cuboid(edge);
            }
        }

        for (i, side) in FRAMED_FACES.iter().enumerate() {
            if nb[i] {
                continue;
            }
            let tile = self.face_tile(*side);
            let n = side.normal_f32();
            let r = side.texture_right().cast::<f32>().unwrap_or(n);
            let u = side.texture_up().cast::<f32>().unwrap_or(n);
            let center = n * g;
            let coords = [
                center - r * a - u * a,
                center + r * a - u * a,
                center + r * a + u * a,
                center - r * a + u * a,
            ];
            let uvs = [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]
                .map(|(s, t)| face_uv(s, t, 1.0, 1.0, tile.rotation));
            self.draw_quad(&tile, coords, Some(uvs), Some(n));
        }

        if liquid_level > 0
            && self.f.param_type_2 == ParamType2::GlasslikeLiquidLevel
            && !self.f.special_tiles[0].layers[0].is_empty()
        {
            let level = liquid_level as f32 / 63.0 * 2.0 - 1.0;
            let ext = |i: usize| if nb[i] { g } else { b };
            let aabb = Aabb::new(
                Vector3::new(-ext(5), -ext(4), -ext(3)),
                Vector3::new(ext(2), ext(1) * level, ext(0)),
            );
            let tile = self.use_tile(0, 0, 0, true);
            let tiles = std::array::from_fn(|_| tile.clone());
            self.draw_cuboid(&aabb, &tiles, 0);
        }
    }
}

