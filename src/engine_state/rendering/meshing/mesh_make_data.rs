//! # Mesh Input
//!
//! `MeshMakeData` is the self-contained snapshot a mesh is built from: the
//! cells of the meshed block and of its 26 neighbors copied into one dense
//! 48³ voxel area, plus the crack and the lighting mode. Building never
//! touches the live map, so the snapshot can travel to the mesh worker.

use cgmath::{EuclideanSpace, Point3, Vector3};

use crate::engine_state::voxels::{
    block::MapNode,
    block_origin,
    voxel_manip::{VoxelArea, VoxelManipulator},
    world::Map,
    BlockPos, NodePos, MAP_BLOCKSIZE,
};

/// Everything the mesh builder reads.
#[derive(Clone, Debug)]
pub struct MeshMakeData {
    /// Cells of the block and its neighbors; unknown cells read as ignore
    pub vmanip: VoxelManipulator,
    /// The block being meshed
    pub blockpos: BlockPos,
    /// Crack level, `-1` for none
    pub crack_level: i32,
    /// Cracked node relative to the block origin
    pub crack_pos_relative: Option<Point3<i32>>,
    /// Interpolate light per vertex
    pub smooth_lighting: bool,
    /// Colors are finished by shaders instead of on the CPU
    pub use_shaders: bool,
}

impl MeshMakeData {
    /// Creates an empty snapshot for a block.
    ///
    /// # Arguments
    /// * `blockpos` - Position of the block to mesh
    /// * `use_shaders` - Whether shaders finish vertex colors
    pub fn new(blockpos: BlockPos, use_shaders: bool) -> Self {
        let origin = block_origin(blockpos);
        let border = Vector3::new(MAP_BLOCKSIZE, MAP_BLOCKSIZE, MAP_BLOCKSIZE);
        let area = VoxelArea::new(
            origin - border,
            origin + border * 2 - Vector3::new(1, 1, 1),
        );
        MeshMakeData {
            vmanip: VoxelManipulator::new(area),
            blockpos,
            crack_level: -1,
            crack_pos_relative: None,
            smooth_lighting: false,
            use_shaders,
        }
    }

    /// Copies one block's cells into the snapshot.
    ///
    /// # Arguments
    /// * `block_offset` - Offset of the copied block from the meshed one, `-1..=1` per axis
    /// * `nodes` - The block's cells in z-major order
    pub fn fill_block_data(&mut self, block_offset: Vector3<i32>, nodes: &[MapNode]) {
        let origin = block_origin(self.blockpos + block_offset);
        self.vmanip.copy_from(origin, MAP_BLOCKSIZE, nodes);
    }

    /// Fills the snapshot straight from a map.
    pub fn fill_from_map(&mut self, map: &Map) {
        for z in -1..=1 {
            for y in -1..=1 {
                for x in -1..=1 {
                    let offset = Vector3::new(x, y, z);
                    if let Some(block) = map.get_block_no_create_no_ex(self.blockpos + offset) {
                        self.fill_block_data(offset, block.nodes());
                    }
                }
            }
        }
    }

    /// Sets the dig crack.
    ///
    /// # Arguments
    /// * `level` - Crack level, negative for none
    /// * `pos` - Cracked node in world coordinates
    pub fn set_crack(&mut self, level: i32, pos: NodePos) {
        if level >= 0 {
            self.crack_level = level;
            self.crack_pos_relative = Some(pos - block_origin(self.blockpos).to_vec());
        }
    }

    /// Enables or disables smooth lighting.
    pub fn set_smooth_lighting(&mut self, smooth_lighting: bool) {
        self.smooth_lighting = smooth_lighting;
    }

    /// World position of the meshed block's first node.
    pub fn origin(&self) -> NodePos {
        block_origin(self.blockpos)
    }

    /// Whether the meshed block itself was copied in.
    pub fn has_center_block(&self) -> bool {
        self.vmanip.is_loaded(self.origin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_covers_the_neighborhood() {
        let data = MeshMakeData::new(Point3::new(1, 0, -1), true);
        assert_eq!(data.vmanip.area.min, Point3::new(0, -16, -32));
        assert_eq!(data.vmanip.area.max, Point3::new(47, 31, 15));
        assert!(!data.has_center_block());
    }

    #[test]
    fn filled_blocks_become_readable() {
        let mut data = MeshMakeData::new(Point3::new(0, 0, 0), false);
        let nodes = vec![MapNode::air(); 4096];
        data.fill_block_data(Vector3::new(0, 0, 0), &nodes);
        data.fill_block_data(Vector3::new(1, 0, 0), &nodes);
        assert!(data.has_center_block());
        assert_eq!(data.vmanip.get_node(Point3::new(20, 3, 3)), MapNode::air());
        assert_eq!(data.vmanip.get_node(Point3::new(-1, 3, 3)), MapNode::ignore());
        assert_eq!(data.vmanip.loaded_count(), 8192);
    }

    #[test]
    fn crack_is_stored_relative() {
        let mut data = MeshMakeData::new(Point3::new(-1, 0, 0), false);
        data.set_crack(-1, Point3::new(0, 0, 0));
        assert_eq!(data.crack_pos_relative, None);
        data.set_crack(2, Point3::new(-3, 4, 5));
        assert_eq!(data.crack_pos_relative, Some(Point3::new(13, 4, 5)));
    }
}
