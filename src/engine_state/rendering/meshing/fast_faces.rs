//! Greedy face generation for cube-shaped nodes.
//!
//! Every cell of the block checks its six neighbors; where the cell's type
//! wins the face contest it shows a face toward that neighbor. Faces of one
//! direction are processed slice by slice: runs of equal faces along a row
//! become strips, and strips that line up exactly with a strip of the row
//! below are merged into rectangles, so a flat wall of one material becomes
//! a single quad.
//!
//! Two faces are equal when they use the same tile (including rotation and
//! crack state), the tile repeats in both directions and all four corner
//! lights match.

use cgmath::{EuclideanSpace, Point3, Vector2, Vector3};

use crate::engine_state::{
    rendering::{color::encode_light, tile::TileSpec, Vertex},
    voxels::{
        block::{block_side::BlockSide, MapNode, CONTENT_IGNORE},
        lighting::smooth::LightSampler,
        node_registry::{ContentFeatures, NodeRegistry},
        BS, MAP_BLOCKSIZE,
    },
};

use super::{collector::MeshCollector, get_node_tile, mesh_make_data::MeshMakeData};

const N: usize = MAP_BLOCKSIZE as usize;

/// One visible cell face before merging.
#[derive(Clone, Debug, PartialEq)]
struct FaceCell {
    tile: TileSpec,
    /// Packed light at the bottom-left, bottom-right, top-right and top-left corners
    lights: [u16; 4],
}

impl FaceCell {
    fn merges_with(&self, other: &FaceCell) -> bool {
        self.lights == other.lights
            && self.tile == other.tile
            && self
                .tile
                .layers
                .iter()
                .all(|layer| layer.is_empty() || layer.is_tileable())
    }
}

/// A merged rectangle of faces in grid units of one slice.
#[derive(Clone, Debug)]
struct FaceRect {
    i0: usize,
    i1: usize,
    j0: usize,
    j1: usize,
    cell: FaceCell,
}

/// Whether `f1` shows a face toward its neighbor `f2`.
///
/// Unloaded neighbors count as empty space so the boundary is drawn until
/// the neighbor arrives.
fn shows_face(c1: u16, c2: u16, f1: &ContentFeatures, f2: &ContentFeatures) -> bool {
    if c1 == CONTENT_IGNORE || c1 == c2 {
        return false;
    }
    let (mut s1, mut s2) = (f1.solidness, f2.solidness);
    if c2 == CONTENT_IGNORE {
        s2 = 0;
    } else if f1.same_liquid(f2) {
        return false;
    }
    if s1 == s2 {
        return false;
    }
    if s1 == 0 {
        s1 = f1.visual_solidness;
    } else if s2 == 0 && c2 != CONTENT_IGNORE {
        s2 = f2.visual_solidness;
    }
    if s1 == s2 {
        return f1.is_liquid();
    }
    s1 > s2
}

/// Maps slice grid coordinates of a face direction to block-local cells.
struct SliceAxes {
    side: BlockSide,
    normal: Vector3<i32>,
    right: Vector3<i32>,
    up: Vector3<i32>,
}

impl SliceAxes {
    fn new(side: BlockSide) -> Self {
        SliceAxes {
            side,
            normal: side.normal(),
            right: side.texture_right(),
            up: side.texture_up(),
        }
    }

    /// Local cell at column `i`, row `j` of slice `depth`.
    fn cell(&self, depth: usize, i: usize, j: usize) -> Point3<i32> {
        let along = |dir: Vector3<i32>, k: usize| -> Vector3<i32> {
            let k = k as i32;
            let sum = dir.x + dir.y + dir.z;
            let coord = if sum > 0 { k } else { MAP_BLOCKSIZE - 1 - k };
            Vector3::new(dir.x.abs(), dir.y.abs(), dir.z.abs()) * coord
        };
        Point3::from_vec(
            along(self.normal, depth) + along(self.right, i) + along(self.up, j),
        )
    }
}

fn to_f32(v: Vector3<i32>) -> Vector3<f32> {
    Vector3::new(v.x as f32, v.y as f32, v.z as f32)
}

/// Texture coordinate of the point `(s, t)` of a `w` by `h` face, measured
/// from its bottom-left corner, with the texture turned counterclockwise
/// `rotation` times.
pub(super) fn face_uv(s: f32, t: f32, w: f32, h: f32, rotation: u8) -> Vector2<f32> {
    match rotation % 4 {
        0 => Vector2::new(s, h - t),
        1 => Vector2::new(t, s),
        2 => Vector2::new(w - s, t),
        _ => Vector2::new(h - t, w - s),
    }
}

/// Texture coordinates of a `w` by `h` quad's corners (bottom-left first,
/// counterclockwise) with the texture turned counterclockwise `rotation` times.
pub(super) fn quad_uvs(w: f32, h: f32, rotation: u8) -> [Vector2<f32>; 4] {
    let corners = [(0.0, 0.0), (w, 0.0), (w, h), (0.0, h)];
    corners.map(|(s, t)| face_uv(s, t, w, h, rotation))
}

/// Triangle indices of a quad, splitting it along the diagonal whose end
/// points have the more similar light.
pub(super) fn quad_indices(lights: &[u16; 4]) -> [u32; 6] {
    let diff = |a: u16, b: u16| {
        ((a & 0xff) as i32 - (b & 0xff) as i32).abs() + ((a >> 8) as i32 - (b >> 8) as i32).abs()
    };
    if diff(lights[0], lights[2]) <= diff(lights[1], lights[3]) {
        [0, 1, 2, 2, 3, 0]
    } else {
        [0, 1, 3, 1, 2, 3]
    }
}

struct FaceGenerator<'a> {
    data: &'a MeshMakeData,
    registry: &'a NodeRegistry,
    sampler: &'a LightSampler<'a>,
    smooth: bool,
    origin: Point3<i32>,
}

impl FaceGenerator<'_> {
    fn face_cell(&self, axes: &SliceAxes, local: Point3<i32>) -> Option<FaceCell> {
        let p = self.origin + local.to_vec();
        let q = p + axes.normal;
        let n1: MapNode = self.data.vmanip.get_node(p);
        let n2: MapNode = self.data.vmanip.get_node(q);
        let f1 = self.registry.get_node(&n1);
        let f2 = self.registry.get_node(&n2);
        if !shows_face(n1.content, n2.content, f1, f2) {
            return None;
        }

        let crack = self.data.crack_pos_relative == Some(local);
        let tile = get_node_tile(f1, &n1, axes.side, crack);
        let lights = if self.smooth {
            let corner = |r: i32, u: i32| axes.normal + axes.right * r + axes.up * u;
            [
                self.sampler.smooth_light_solid(p, axes.normal, corner(-1, -1)),
                self.sampler.smooth_light_solid(p, axes.normal, corner(1, -1)),
                self.sampler.smooth_light_solid(p, axes.normal, corner(1, 1)),
                self.sampler.smooth_light_solid(p, axes.normal, corner(-1, 1)),
            ]
        } else {
            [self.sampler.face_light(n1, n2); 4]
        };
        Some(FaceCell { tile, lights })
    }

    fn slice_rects(&self, axes: &SliceAxes, depth: usize, out: &mut Vec<FaceRect>) {
        let mut open: Vec<FaceRect> = Vec::new();
        for j in 0..N {
            // Strips of equal faces along the row.
            let mut strips: Vec<FaceRect> = Vec::new();
            for i in 0..N {
                let Some(cell) = self.face_cell(axes, axes.cell(depth, i, j)) else {
                    continue;
                };
                match strips.last_mut() {
                    Some(last) if last.i1 == i && last.cell.merges_with(&cell) => last.i1 = i + 1,
                    _ => strips.push(FaceRect {
                        i0: i,
                        i1: i + 1,
                        j0: j,
                        j1: j + 1,
                        cell,
                    }),
                }
            }

            // Grow rectangles of the rows below by strips that match them exactly.
            let mut next_open = Vec::with_capacity(strips.len());
            let mut below = open.into_iter().peekable();
            for strip in strips {
                while let Some(rect) = below.next_if(|rect| rect.i0 < strip.i0) {
                    out.push(rect);
                }
                match below.next_if(|rect| {
                    rect.i0 == strip.i0 && rect.i1 == strip.i1 && rect.cell.merges_with(&strip.cell)
                }) {
                    Some(mut rect) => {
                        rect.j1 = j + 1;
                        next_open.push(rect);
                    }
                    None => next_open.push(strip),
                }
            }
            out.extend(below);
            open = next_open;
        }
        out.extend(open);
    }

    fn emit(&self, axes: &SliceAxes, depth: usize, rect: &FaceRect, collector: &mut MeshCollector) {
        let n = to_f32(axes.normal);
        let r = to_f32(axes.right);
        let u = to_f32(axes.up);
        let center = |i: usize, j: usize| {
            let c = axes.cell(depth, i, j);
            Vector3::new(c.x as f32, c.y as f32, c.z as f32)
        };
        let positions = [
            center(rect.i0, rect.j0) + (n - r - u) * 0.5,
            center(rect.i1 - 1, rect.j0) + (n + r - u) * 0.5,
            center(rect.i1 - 1, rect.j1 - 1) + (n + r + u) * 0.5,
            center(rect.i0, rect.j1 - 1) + (n - r + u) * 0.5,
        ];
        let w = (rect.i1 - rect.i0) as f32;
        let h = (rect.j1 - rect.j0) as f32;
        let tile = &rect.cell.tile;
        let mut uvs = quad_uvs(w, h, tile.rotation);
        if tile.world_aligned {
            let scale = tile.layers[0].scale.max(1) as f32;
            let world = to_f32(self.origin.to_vec()) + positions[0];
            let s0 = world.x * r.x + world.y * r.y + world.z * r.z;
            let t0 = world.x * u.x + world.y * u.y + world.z * u.z;
            for uv in uvs.iter_mut() {
                *uv = Vector2::new((uv.x + s0) / scale, (uv.y - t0) / scale);
            }
        }

        let vertices: Vec<Vertex> = (0..4)
            .map(|k| {
                Vertex::new(
                    positions[k] * BS,
                    n,
                    encode_light(rect.cell.lights[k], tile.emissive_light),
                    uvs[k],
                )
            })
            .collect();
        collector.append(tile, &vertices, &quad_indices(&rect.cell.lights));
    }
}

/// Emits the merged faces of every cube-shaped cell of the block.
///
/// # Arguments
/// * `data` - The block snapshot
/// * `registry` - Node definitions
/// * `sampler` - Light sampler over the snapshot
/// * `collector` - Receives the quads
///
/// # Returns
/// The number of quads emitted.
pub fn update_all_fast_face_rows(
    data: &MeshMakeData,
    registry: &NodeRegistry,
    sampler: &LightSampler,
    collector: &mut MeshCollector,
) -> usize {
    let generator = FaceGenerator {
        data,
        registry,
        sampler,
        smooth: data.smooth_lighting,
        origin: data.origin(),
    };
    let mut quads = 0;
    let mut rects = Vec::new();
    for side in BlockSide::all() {
        let axes = SliceAxes::new(side);
        for depth in 0..N {
            rects.clear();
            generator.slice_rects(&axes, depth, &mut rects);
            for rect in rects.iter() {
                generator.emit(&axes, depth, rect, collector);
            }
            quads += rects.len();
        }
    }
    quads
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uv_rotation_swaps_extents() {
        let uvs = quad_uvs(3.0, 1.0, 0);
        assert_eq!(uvs[0], Vector2::new(0.0, 1.0));
        assert_eq!(uvs[2], Vector2::new(3.0, 0.0));
        let turned = quad_uvs(3.0, 1.0, 1);
        assert_eq!(turned[0], Vector2::new(0.0, 0.0));
        assert_eq!(turned[2], Vector2::new(1.0, 3.0));
    }

    #[test]
    fn diagonal_joins_similar_corners() {
        assert_eq!(quad_indices(&[100, 10, 100, 200]), [0, 1, 2, 2, 3, 0]);
        assert_eq!(quad_indices(&[10, 100, 200, 100]), [0, 1, 3, 1, 2, 3]);
    }

    #[test]
    fn slice_axes_cover_the_block() {
        for side in BlockSide::all() {
            let axes = SliceAxes::new(side);
            let mut seen = std::collections::HashSet::new();
            for d in 0..N {
                for j in 0..N {
                    for i in 0..N {
                        let c = axes.cell(d, i, j);
                        assert!((0..16).contains(&c.x) && (0..16).contains(&c.y));
                        seen.insert(c);
                    }
                }
            }
            assert_eq!(seen.len(), 4096);
        }
        let top = SliceAxes::new(BlockSide::TOP);
        assert_eq!(top.cell(15, 0, 0).y, 15);
        let bottom = SliceAxes::new(BlockSide::BOTTOM);
        assert_eq!(bottom.cell(15, 0, 0).y, 0);
    }
}
