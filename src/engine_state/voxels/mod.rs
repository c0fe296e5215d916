//! # Voxels Module
//!
//! The addressable voxel world: cells, the node type registry, 16³ map
//! blocks grouped into sectors, and the light and liquid propagation that
//! runs over map edits.
//!
//! ## Coordinate spaces
//! - **Node positions** (`NodePos`) address single cells. Node `p` occupies
//!   the float box `(p - 0.5) * BS ..= (p + 0.5) * BS`.
//! - **Block positions** (`BlockPos`) address 16³ blocks; block `b` holds
//!   nodes `b * 16 ..= b * 16 + 15` on each axis.
//! - **Local positions** address a node inside its block, `0..16` per axis.

use cgmath::{Point3, Vector3};

pub mod block;
pub mod lighting;
pub mod liquid;
pub mod map_block;
pub mod node_registry;
pub mod voxel_manip;
pub mod world;

/// World-space edge length of a node.
pub const BS: f32 = 10.0;

/// Edge length of a map block in nodes.
pub const MAP_BLOCKSIZE: i32 = 16;

/// Number of nodes in a map block.
pub const MAP_BLOCK_VOLUME: usize = (MAP_BLOCKSIZE * MAP_BLOCKSIZE * MAP_BLOCKSIZE) as usize;

/// Largest absolute node coordinate accepted on any axis.
pub const MAX_MAP_COORD: i32 = 32767;

/// Position of a single node.
pub type NodePos = Point3<i32>;

/// Position of a map block.
pub type BlockPos = Point3<i32>;

/// Whether every axis of a node position lies within `±MAX_MAP_COORD`.
pub fn is_valid_node_pos(p: NodePos) -> bool {
    p.x.abs() <= MAX_MAP_COORD && p.y.abs() <= MAX_MAP_COORD && p.z.abs() <= MAX_MAP_COORD
}

/// Block containing a node.
pub fn node_to_block_pos(p: NodePos) -> BlockPos {
    Point3::new(
        p.x.div_euclid(MAP_BLOCKSIZE),
        p.y.div_euclid(MAP_BLOCKSIZE),
        p.z.div_euclid(MAP_BLOCKSIZE),
    )
}

/// Position of a node inside its block.
pub fn node_to_local_pos(p: NodePos) -> Point3<i32> {
    Point3::new(
        p.x.rem_euclid(MAP_BLOCKSIZE),
        p.y.rem_euclid(MAP_BLOCKSIZE),
        p.z.rem_euclid(MAP_BLOCKSIZE),
    )
}

/// First node of a block.
pub fn block_origin(b: BlockPos) -> NodePos {
    Point3::new(b.x * MAP_BLOCKSIZE, b.y * MAP_BLOCKSIZE, b.z * MAP_BLOCKSIZE)
}

/// Float position of a node center.
pub fn node_to_float(p: NodePos) -> Vector3<f32> {
    Vector3::new(p.x as f32 * BS, p.y as f32 * BS, p.z as f32 * BS)
}

/// Node containing a float position.
pub fn float_to_node(v: Vector3<f32>) -> NodePos {
    Point3::new(
        (v.x / BS + 0.5).floor() as i32,
        (v.y / BS + 0.5).floor() as i32,
        (v.z / BS + 0.5).floor() as i32,
    )
}

/// The six face neighbor offsets, in `BlockSide` order.
pub const FACE_DIRS: [Vector3<i32>; 6] = [
    Vector3::new(0, 1, 0),
    Vector3::new(0, -1, 0),
    Vector3::new(1, 0, 0),
    Vector3::new(-1, 0, 0),
    Vector3::new(0, 0, 1),
    Vector3::new(0, 0, -1),
];
