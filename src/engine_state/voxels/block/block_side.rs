//! # Block Side Module
//!
//! The six faces of a node and the integer rotations that `facedir` and
//! `wallmounted` parameters apply to node-local geometry.

use cgmath::Vector3;
use num_derive::FromPrimitive;

use crate::engine_state::{collision::aabb::Aabb, voxels::FACE_DIRS};

/// Represents the six faces of a node.
///
/// The order matches the order of a node type's tile list:
/// [TOP, BOTTOM, RIGHT, LEFT, BACK, FRONT]
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, FromPrimitive)]
pub enum BlockSide {
    /// The face pointing to +Y
    TOP = 0,
    /// The face pointing to -Y
    BOTTOM = 1,
    /// The face pointing to +X
    RIGHT = 2,
    /// The face pointing to -X
    LEFT = 3,
    /// The face pointing to +Z
    BACK = 4,
    /// The face pointing to -Z
    FRONT = 5,
}

impl BlockSide {
    /// Returns an array containing all six faces in tile order.
    pub fn all() -> [BlockSide; 6] {
        [
            BlockSide::TOP,
            BlockSide::BOTTOM,
            BlockSide::RIGHT,
            BlockSide::LEFT,
            BlockSide::BACK,
            BlockSide::FRONT,
        ]
    }

    /// Unit normal of the face.
    pub fn normal(self) -> Vector3<i32> {
        FACE_DIRS[self as usize]
    }

    /// Unit normal as floats.
    pub fn normal_f32(self) -> Vector3<f32> {
        self.normal().cast::<f32>().unwrap_or(Vector3::new(0.0, 0.0, 0.0))
    }

    /// The face on the other side of the node.
    pub fn opposite(self) -> BlockSide {
        match self {
            BlockSide::TOP => BlockSide::BOTTOM,
            BlockSide::BOTTOM => BlockSide::TOP,
            BlockSide::RIGHT => BlockSide::LEFT,
            BlockSide::LEFT => BlockSide::RIGHT,
            BlockSide::BACK => BlockSide::FRONT,
            BlockSide::FRONT => BlockSide::BACK,
        }
    }

    /// Face whose normal equals `v`, if `v` is an axis unit vector.
    pub fn from_normal(v: Vector3<i32>) -> Option<BlockSide> {
        BlockSide::all().into_iter().find(|side| side.normal() == v)
    }

    /// Axis index of the normal: 0 for X, 1 for Y, 2 for Z.
    pub fn axis(self) -> usize {
        match self {
            BlockSide::RIGHT | BlockSide::LEFT => 0,
            BlockSide::TOP | BlockSide::BOTTOM => 1,
            BlockSide::BACK | BlockSide::FRONT => 2,
        }
    }

    /// Bit used for this face in connected nodebox masks.
    pub fn connect_bit(self) -> u8 {
        match self {
            BlockSide::TOP => 1,
            BlockSide::BOTTOM => 2,
            BlockSide::FRONT => 4,
            BlockSide::LEFT => 8,
            BlockSide::BACK => 16,
            BlockSide::RIGHT => 32,
        }
    }

    /// Direction the top edge of an unrotated texture points to on this face.
    pub fn texture_up(self) -> Vector3<i32> {
        match self {
            BlockSide::TOP => Vector3::new(0, 0, 1),
            BlockSide::BOTTOM => Vector3::new(0, 0, -1),
            _ => Vector3::new(0, 1, 0),
        }
    }

    /// Direction the right edge of an unrotated texture points to on this face.
    pub fn texture_right(self) -> Vector3<i32> {
        cross(self.texture_up(), self.normal())
    }
}

fn cross(a: Vector3<i32>, b: Vector3<i32>) -> Vector3<i32> {
    Vector3::new(
        a.y * b.z - a.z * b.y,
        a.z * b.x - a.x * b.z,
        a.x * b.y - a.y * b.x,
    )
}

/// An orthogonal integer rotation of node-local space.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeRotation {
    m: [[i32; 3]; 3],
}

const IDENTITY: [[i32; 3]; 3] = [[1, 0, 0], [0, 1, 0], [0, 0, 1]];

/// Tilt of the node's up axis for each facedir axis group.
const FACEDIR_AXES: [[[i32; 3]; 3]; 6] = [
    IDENTITY,
    [[1, 0, 0], [0, 0, -1], [0, 1, 0]],
    [[1, 0, 0], [0, 0, 1], [0, -1, 0]],
    [[0, 1, 0], [-1, 0, 0], [0, 0, 1]],
    [[0, -1, 0], [1, 0, 0], [0, 0, 1]],
    [[-1, 0, 0], [0, -1, 0], [0, 0, 1]],
];

/// Clockwise quarter turns about +Y seen from above.
const QUARTER_TURNS_Y: [[[i32; 3]; 3]; 4] = [
    IDENTITY,
    [[0, 0, 1], [0, 1, 0], [-1, 0, 0]],
    [[-1, 0, 0], [0, 1, 0], [0, 0, -1]],
    [[0, 0, -1], [0, 1, 0], [1, 0, 0]],
];

/// Rotation taking a floor-mounted model onto each wallmounted direction.
const WALLMOUNTED: [[[i32; 3]; 3]; 6] = [
    [[-1, 0, 0], [0, -1, 0], [0, 0, 1]],
    IDENTITY,
    [[0, -1, 0], [1, 0, 0], [0, 0, 1]],
    [[0, 1, 0], [-1, 0, 0], [0, 0, 1]],
    [[1, 0, 0], [0, 0, 1], [0, -1, 0]],
    [[1, 0, 0], [0, 0, -1], [0, 1, 0]],
];

fn mul(a: &[[i32; 3]; 3], b: &[[i32; 3]; 3]) -> [[i32; 3]; 3] {
    let mut out = [[0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

impl NodeRotation {
    /// The rotation that changes nothing.
    pub const IDENTITY: NodeRotation = NodeRotation { m: IDENTITY };

    /// Rotation for a facedir value: `facedir / 4` picks the direction the
    /// node's top points to, `facedir % 4` turns it about that axis.
    pub fn from_facedir(facedir: u8) -> Self {
        let facedir = if facedir < 24 { facedir } else { 0 };
        let axis = &FACEDIR_AXES[(facedir / 4) as usize];
        let turn = &QUARTER_TURNS_Y[(facedir % 4) as usize];
        NodeRotation { m: mul(axis, turn) }
    }

    /// Rotation for a wallmounted value. Models are authored attached to the floor.
    pub fn from_wallmounted(wallmounted: u8) -> Self {
        let wallmounted = if wallmounted < 6 { wallmounted } else { 1 };
        NodeRotation {
            m: WALLMOUNTED[wallmounted as usize],
        }
    }

    /// Inverse rotation.
    pub fn inverse(&self) -> Self {
        let mut m = [[0; 3]; 3];
        for (i, row) in m.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = self.m[j][i];
            }
        }
        NodeRotation { m }
    }

    /// Rotates an integer vector.
    pub fn apply(&self, v: Vector3<i32>) -> Vector3<i32> {
        let m = &self.m;
        Vector3::new(
            m[0][0] * v.x + m[0][1] * v.y + m[0][2] * v.z,
            m[1][0] * v.x + m[1][1] * v.y + m[1][2] * v.z,
            m[2][0] * v.x + m[2][1] * v.y + m[2][2] * v.z,
        )
    }

    /// Rotates a float vector.
    pub fn apply_f32(&self, v: Vector3<f32>) -> Vector3<f32> {
        let m = &self.m;
        let f = |i: usize| m[i][0] as f32 * v.x + m[i][1] as f32 * v.y + m[i][2] as f32 * v.z;
        Vector3::new(f(0), f(1), f(2))
    }

    /// Rotates a box about the node center.
    pub fn rotate_box(&self, b: &Aabb) -> Aabb {
        Aabb::new(self.apply_f32(b.min), self.apply_f32(b.max))
    }

    /// For a face seen in world space, the node-local face whose tile shows
    /// there and the number of counterclockwise quarter turns of its texture.
    pub fn tile_for_side(&self, world: BlockSide) -> (BlockSide, u8) {
        let d = world.normal();
        let local = BlockSide::from_normal(self.inverse().apply(d)).unwrap_or(world);
        let actual_up = self.apply(local.texture_up());
        let mut up = world.texture_up();
        for turns in 0..4u8 {
            if up == actual_up {
                return (local, turns);
            }
            up = cross(d, up);
        }
        (local, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facedir_rotations_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for fd in 0..24 {
            assert!(seen.insert(NodeRotation::from_facedir(fd)), "facedir {fd} repeats");
        }
    }

    #[test]
    fn facedir_axis_moves_top() {
        let up = Vector3::new(0, 1, 0);
        assert_eq!(NodeRotation::from_facedir(4).apply(up), Vector3::new(0, 0, 1));
        assert_eq!(NodeRotation::from_facedir(12).apply(up), Vector3::new(1, 0, 0));
        assert_eq!(NodeRotation::from_facedir(20).apply(up), Vector3::new(0, -1, 0));
    }

    #[test]
    fn wallmounted_moves_floor_to_wall() {
        let down = Vector3::new(0, -1, 0);
        for (wm, side) in [
            (0, BlockSide::TOP),
            (1, BlockSide::BOTTOM),
            (2, BlockSide::RIGHT),
            (3, BlockSide::LEFT),
            (4, BlockSide::BACK),
            (5, BlockSide::FRONT),
        ] {
            assert_eq!(NodeRotation::from_wallmounted(wm).apply(down), side.normal());
        }
    }

    #[test]
    fn identity_keeps_tiles() {
        for side in BlockSide::all() {
            assert_eq!(NodeRotation::IDENTITY.tile_for_side(side), (side, 0));
        }
    }

    #[test]
    fn quarter_turn_shifts_side_tiles_and_spins_top() {
        let r = NodeRotation::from_facedir(1);
        let (local, _) = r.tile_for_side(BlockSide::RIGHT);
        assert_ne!(local, BlockSide::RIGHT);
        let (top, turns) = r.tile_for_side(BlockSide::TOP);
        assert_eq!(top, BlockSide::TOP);
        assert_ne!(turns, 0);
    }
}
