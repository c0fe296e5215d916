//! Flowing liquid surfaces.
//!
//! The surface height at each of the four top corners is the average of the
//! levels of the four cells sharing that corner, so neighboring flowing
//! nodes join into one continuous slope.

use cgmath::{Vector2, Vector3};

use crate::engine_state::{
    rendering::tile::TileSpec,
    voxels::{
        block::{ContentId, MapNode, CONTENT_AIR, LIQUID_LEVEL_MASK},
        BS,
    },
};

use super::{MapblockMeshGenerator, NodeLight};

const LIQUID_LEVEL_MAX: i32 = 7;

#[derive(Copy, Clone, Debug)]
struct NeighborData {
    level: f32,
    content: ContentId,
    is_same_liquid: bool,
    top_is_same_liquid: bool,
}

/// Sides of the liquid cube: outward direction and the two bottom corners,
/// left then right as seen from outside (`1` is the positive end of an axis).
const LIQUID_BASE_FACES: [(Vector3<i32>, [(usize, usize); 2]); 4] = [
    (Vector3::new(1, 0, 0), [(1, 1), (1, 0)]),
    (Vector3::new(-1, 0, 0), [(0, 0), (0, 1)]),
    (Vector3::new(0, 0, 1), [(0, 1), (1, 1)]),
    (Vector3::new(0, 0, -1), [(1, 0), (0, 0)]),
];

struct LiquidState {
    tile: TileSpec,
    tile_top: TileSpec,
    c_flowing: ContentId,
    c_source: ContentId,
    top_is_same_liquid: bool,
    draw_bottom: bool,
    /// Neighbors indexed `[z + 1][x + 1]`
    neighbors: [[NeighborData; 3]; 3],
    /// Surface height at the corners, indexed `[z][x]` with 1 the positive side
    corner_levels: [[f32; 2]; 2],
}

impl MapblockMeshGenerator<'_> {
    pub(super) fn draw_liquid_node(&mut self) {
        let mut liquid = self.prepare_liquid();
        self.liquid_neighborhood(&mut liquid);
        for k in 0..2 {
            for i in 0..2 {
                liquid.corner_levels[k][i] = corner_level(&liquid, i, k);
            }
        }
        self.draw_liquid_sides(&liquid);
        if !liquid.top_is_same_liquid {
            self.draw_liquid_top(&liquid);
        }
        if liquid.draw_bottom {
            self.draw_liquid_bottom(&liquid);
        }
    }

    fn prepare_liquid(&mut self) -> LiquidState {
        let c_flowing = self.f.liquid_alternative_flowing;
        let c_source = self.f.liquid_alternative_source;
        let is_same = |c: ContentId| c == c_flowing || c == c_source;

        let ntop = self.node_at(Vector3::new(0, 1, 0));
        let nbottom = self.node_at(Vector3::new(0, -1, 0));
        let top_is_same_liquid = is_same(ntop.content);
        let draw_bottom =
            !is_same(nbottom.content) && self.registry.get_node(&nbottom).solidness <= 1;

        if !self.data.smooth_lighting {
            let lit = if top_is_same_liquid { ntop } else { self.n };
            self.light = NodeLight::Flat(self.interior_light_of(lit));
        }

        let empty = NeighborData {
            level: 0.0,
            content: CONTENT_AIR,
            is_same_liquid: false,
            top_is_same_liquid: false,
        };
        LiquidState {
            tile: self.use_tile(1, 0, 0, true),
            tile_top: self.use_tile(0, 0, 0, true),
            c_flowing,
            c_source,
            top_is_same_liquid,
            draw_bottom,
            neighbors: [[empty; 3]; 3],
            corner_levels: [[0.0; 2]; 2],
        }
    }

    fn liquid_neighborhood(&self, liquid: &mut LiquidState) {
        let range = self.f.liquid_range.clamp(1, 8) as i32;
        for w in -1..=1 {
            for u in -1..=1 {
                let n2: MapNode = self.node_at(Vector3::new(u, 0, w));
                let mut neighbor = NeighborData {
                    level: -0.5 * BS,
                    content: n2.content,
                    is_same_liquid: false,
                    top_is_same_liquid: false,
                };
                if n2.content == liquid.c_source {
                    neighbor.is_same_liquid = true;
                    neighbor.level = 0.5 * BS;
                } else if n2.content == liquid.c_flowing {
                    neighbor.is_same_liquid = true;
                    let mut level = (n2.param2 & LIQUID_LEVEL_MASK) as i32;
                    let hidden = LIQUID_LEVEL_MAX + 1 - range;
                    level = if level <= hidden { 0 } else { level - hidden };
                    neighbor.level = (-0.5 + (level as f32 + 0.5) / range as f32) * BS;
                }
                if neighbor.is_same_liquid {
                    let above = self.node_at(Vector3::new(u, 1, w)).content;
                    neighbor.top_is_same_liquid =
                        above == liquid.c_flowing || above == liquid.c_source;
                }
                liquid.neighbors[(w + 1) as usize][(u + 1) as usize] = neighbor;
            }
        }
    }

    fn draw_liquid_sides(&mut self, liquid: &LiquidState) {
        for (dir, corners) in LIQUID_BASE_FACES {
            let neighbor = liquid.neighbors[(dir.z + 1) as usize][(dir.x + 1) as usize];
            // Faces inside one body of liquid are hidden unless they border
            // the liquid column above.
            if neighbor.is_same_liquid
                && (!liquid.top_is_same_liquid || neighbor.top_is_same_liquid)
            {
                continue;
            }
            if self.registry.get(neighbor.content).solidness == 2 {
                continue;
            }

            let corner_pos = |(x, z): (usize, usize), y: f32| {
                Vector3::new((x as f32 - 0.5) * BS, y, (z as f32 - 0.5) * BS)
            };
            let bottom = |(x, z): (usize, usize)| {
                if neighbor.is_same_liquid {
                    liquid.corner_levels[z][x]
                } else {
                    -0.5 * BS
                }
            };
            let top = |(x, z): (usize, usize)| {
                if liquid.top_is_same_liquid {
                    0.5 * BS
                } else {
                    liquid.corner_levels[z][x]
                }
            };
            let [left, right] = corners;
            let coords = [
                corner_pos(left, bottom(left)),
                corner_pos(right, bottom(right)),
                corner_pos(right, top(right)),
                corner_pos(left, top(left)),
            ];
            let normal = Vector3::new(dir.x as f32, 0.0, dir.z as f32);
            self.draw_quad(&liquid.tile, coords, None, Some(normal));
        }
    }

    fn draw_liquid_top(&mut self, liquid: &LiquidState) {
        let h = BS / 2.0;
        let levels = &liquid.corner_levels;
        let coords = [
            Vector3::new(-h, levels[1][0], h),
            Vector3::new(h, levels[1][1], h),
            Vector3::new(h, levels[0][1], -h),
            Vector3::new(-h, levels[0][0], -h),
        ];

        // Turn the texture so its downward animation runs along the slope.
        let dz = (levels[0][0] + levels[0][1]) - (levels[1][0] + levels[1][1]);
        let dx = (levels[0][0] + levels[1][0]) - (levels[0][1] + levels[1][1]);
        let angle = dz.atan2(dx);
        let world = self.world_pos(Vector3::new(0, 0, 0));
        let mut translate = rotate_uv(
            Vector2::new(world.z as f32, world.x as f32),
            angle,
            Vector2::new(0.0, 0.0),
        );
        translate.x -= translate.x.floor();
        translate.y -= translate.y.floor();

        let center = Vector2::new(0.5, 0.5);
        let mut uvs = [
            Vector2::new(0.0, 1.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(0.0, 0.0),
        ]
        .map(|uv| rotate_uv(uv, angle, center) + translate);
        uvs.swap(0, 2);

        self.draw_quad(&liquid.tile_top, coords, Some(uvs), Some(Vector3::new(0.0, 1.0, 0.0)));
    }

    fn draw_liquid_bottom(&mut self, liquid: &LiquidState) {
        let h = BS / 2.0;
        let coords = [
            Vector3::new(-h, -h, -h),
            Vector3::new(h, -h, -h),
            Vector3::new(h, -h, h),
            Vector3::new(-h, -h, h),
        ];
        let uvs = [
            Vector2::new(0.0, 0.0),
            Vector2::new(1.0, 0.0),
            Vector2::new(1.0, 1.0),
            Vector2::new(0.0, 1.0),
        ];
        self.draw_quad(
            &liquid.tile_top,
            coords,
            Some(uvs),
            Some(Vector3::new(0.0, -1.0, 0.0)),
        );
    }
}

/// Surface height at the corner between cells `x = i - 1..=i` and
/// `z = k - 1..=k` of the neighborhood.
fn corner_level(liquid: &LiquidState, i: usize, k: usize) -> f32 {
    let mut sum = 0.0;
    let mut count = 0;
    let mut air_count = 0;
    for dk in 0..2 {
        for di in 0..2 {
            let neighbor = &liquid.neighbors[k + dk][i + di];
            if neighbor.top_is_same_liquid {
                return 0.5 * BS;
            }
            if neighbor.content == liquid.c_source {
                return 0.5 * BS;
            }
            if neighbor.content == liquid.c_flowing {
                sum += neighbor.level;
                count += 1;
            } else if neighbor.content == CONTENT_AIR {
                air_count += 1;
                if air_count >= 2 {
                    return -0.5 * BS + 0.2;
                }
            }
        }
    }
    if count > 0 {
        sum / count as f32
    } else {
        0.0
    }
}

fn rotate_uv(uv: Vector2<f32>, radians: f32, center: Vector2<f32>) -> Vector2<f32> {
    let (sn, cs) = radians.sin_cos();
    let d = uv - center;
    Vector2::new(d.x * cs - d.y * sn, d.x * sn + d.y * cs) + center
}
