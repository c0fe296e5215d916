//! # Map Block Module
//!
//! The `MapBlock` struct: a 16x16x16 array of cells plus the bookkeeping the
//! map, the lighting engine and the mesh scheduler attach to it.
//!
//! ## Layout
//!
//! Cells are stored densely in z-major order: the index of local position
//! `(x, y, z)` is `z * 256 + y * 16 + x`. Copying a block's cells therefore
//! is a single slice copy, which the mesh scheduler relies on when it takes
//! snapshots.
//!
//! Freshly created blocks are filled with `CONTENT_IGNORE` until something
//! writes real data into them.

use std::collections::BTreeMap;

use cgmath::Point3;

use crate::engine_state::rendering::meshing::MapBlockMesh;

use super::{block::MapNode, block_origin, BlockPos, NodePos, MAP_BLOCKSIZE, MAP_BLOCK_VOLUME};

pub mod generation;
mod serialization;

pub use serialization::SERIALIZATION_VERSION;

/// Key/value fields attached to a single node.
pub type NodeMetadata = BTreeMap<String, String>;

/// Represents a 16x16x16 block of cells in the world.
#[derive(Debug)]
pub struct MapBlock {
    /// Position of this block in block coordinates
    pub position: BlockPos,
    data: Vec<MapNode>,
    metadata: BTreeMap<u16, NodeMetadata>,
    /// Nothing above this block lets sunlight in, even when the block above
    /// is not loaded
    pub is_underground: bool,
    /// Light has been computed for the block and its borders
    pub lighting_complete: bool,
    /// Cells changed since the mesh was last requested
    pub mesh_dirty: bool,
    /// Current mesh, replaced whenever the scheduler delivers a new one
    pub mesh: Option<MapBlockMesh>,
    refcount: u32,
    usage_timer: f32,
}

/// Index of a local position inside a block's cell array.
///
/// # Panics
/// Never; callers guarantee `0 <= x, y, z < 16`.
pub fn local_index(x: i32, y: i32, z: i32) -> usize {
    (z * MAP_BLOCKSIZE * MAP_BLOCKSIZE + y * MAP_BLOCKSIZE + x) as usize
}

/// Local position of a cell array index.
pub fn index_to_local(index: usize) -> Point3<i32> {
    let i = index as i32;
    Point3::new(
        i % MAP_BLOCKSIZE,
        (i / MAP_BLOCKSIZE) % MAP_BLOCKSIZE,
        i / (MAP_BLOCKSIZE * MAP_BLOCKSIZE),
    )
}

fn is_local(p: Point3<i32>) -> bool {
    (0..MAP_BLOCKSIZE).contains(&p.x)
        && (0..MAP_BLOCKSIZE).contains(&p.y)
        && (0..MAP_BLOCKSIZE).contains(&p.z)
}

impl MapBlock {
    /// Creates a block whose cells are all `CONTENT_IGNORE`.
    ///
    /// # Arguments
    /// * `position` - The block coordinates of the new block
    pub fn new(position: BlockPos) -> Self {
        Self::filled(position, MapNode::ignore())
    }

    /// Creates a block with every cell set to `node`.
    ///
    /// # Arguments
    /// * `position` - The block coordinates of the new block
    /// * `node` - The cell copied into every position
    ///
    /// # Returns
    /// A new `MapBlock`, not underground and with lighting marked incomplete.
    pub fn filled(position: BlockPos, node: MapNode) -> Self {
        MapBlock {
            position,
            data: vec![node; MAP_BLOCK_VOLUME],
            metadata: BTreeMap::new(),
            is_underground: false,
            lighting_complete: false,
            mesh_dirty: true,
            mesh: None,
            refcount: 0,
            usage_timer: 0.0,
        }
    }

    /// Creates a block from a complete cell array.
    ///
    /// Returns `None` if `data` does not hold exactly one cell per position.
    pub fn from_nodes(position: BlockPos, data: Vec<MapNode>) -> Option<Self> {
        if data.len() != MAP_BLOCK_VOLUME {
            return None;
        }
        let mut block = Self::new(position);
        block.data = data;
        Some(block)
    }

    /// First node position covered by this block.
    pub fn origin(&self) -> NodePos {
        block_origin(self.position)
    }

    /// Gets the cell at a local position; `None` outside `0..16`.
    pub fn get_node(&self, local: Point3<i32>) -> Option<MapNode> {
        is_local(local).then(|| self.data[local_index(local.x, local.y, local.z)])
    }

    /// Gets the cell at a local position without a range check on the
    /// individual axes. Out-of-range indices return `CONTENT_IGNORE`.
    pub fn get_node_no_check(&self, x: i32, y: i32, z: i32) -> MapNode {
        self.data
            .get(local_index(x, y, z))
            .copied()
            .unwrap_or_else(MapNode::ignore)
    }

    /// Sets the cell at a local position. Returns `false` outside `0..16`.
    pub fn set_node(&mut self, local: Point3<i32>, node: MapNode) -> bool {
        if !is_local(local) {
            return false;
        }
        self.data[local_index(local.x, local.y, local.z)] = node;
        self.mesh_dirty = true;
        true
    }

    /// The whole cell array.
    pub fn nodes(&self) -> &[MapNode] {
        &self.data
    }

    /// Mutable access to the whole cell array. Marks the mesh dirty.
    pub fn nodes_mut(&mut self) -> &mut [MapNode] {
        self.mesh_dirty = true;
        &mut self.data
    }

    /// Whether every cell is `CONTENT_IGNORE`.
    pub fn is_dummy(&self) -> bool {
        self.data.iter().all(|n| *n == MapNode::ignore())
    }

    /// Metadata of the node at a local position.
    pub fn metadata(&self, local: Point3<i32>) -> Option<&NodeMetadata> {
        if !is_local(local) {
            return None;
        }
        self.metadata
            .get(&(local_index(local.x, local.y, local.z) as u16))
    }

    /// Sets one metadata field of the node at a local position.
    pub fn set_metadata_field(&mut self, local: Point3<i32>, key: &str, value: &str) -> bool {
        if !is_local(local) {
            return false;
        }
        self.metadata
            .entry(local_index(local.x, local.y, local.z) as u16)
            .or_default()
            .insert(key.to_owned(), value.to_owned());
        true
    }

    /// Removes all metadata of the node at a local position.
    pub fn remove_metadata(&mut self, local: Point3<i32>) -> Option<NodeMetadata> {
        if !is_local(local) {
            return None;
        }
        self.metadata
            .remove(&(local_index(local.x, local.y, local.z) as u16))
    }

    /// Number of nodes carrying metadata.
    pub fn metadata_count(&self) -> usize {
        self.metadata.len()
    }

    /// Current reference count. Blocks with a nonzero count are never unloaded.
    pub fn refcount(&self) -> u32 {
        self.refcount
    }

    /// Adds a reference.
    pub fn ref_grab(&mut self) {
        self.refcount += 1;
    }

    /// Drops a reference. Dropping below zero is logged and ignored.
    pub fn ref_drop(&mut self) {
        if self.refcount == 0 {
            log::warn!("Reference count of block {:?} dropped below zero", self.position);
            return;
        }
        self.refcount -= 1;
    }

    /// Seconds since the block was last in use.
    pub fn usage_timer(&self) -> f32 {
        self.usage_timer
    }

    /// Marks the block as in use.
    pub fn reset_usage_timer(&mut self) {
        self.usage_timer = 0.0;
    }

    /// Advances the usage timer.
    pub fn increment_usage_timer(&mut self, dtime: f32) {
        self.usage_timer += dtime;
    }

    /// Approximate heap usage in bytes.
    pub fn memory_usage(&self) -> usize {
        self.data.len() * std::mem::size_of::<MapNode>()
            + self
                .metadata
                .values()
                .flat_map(|fields| fields.iter())
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::CONTENT_AIR;

    #[test]
    fn local_index_is_z_major() {
        assert_eq!(local_index(1, 0, 0), 1);
        assert_eq!(local_index(0, 1, 0), 16);
        assert_eq!(local_index(0, 0, 1), 256);
        for index in [0, 17, 300, 4095] {
            let p = index_to_local(index);
            assert_eq!(local_index(p.x, p.y, p.z), index);
        }
    }

    #[test]
    fn new_blocks_hold_ignore() {
        let block = MapBlock::new(Point3::new(0, 0, 0));
        assert!(block.is_dummy());
        assert_eq!(block.get_node(Point3::new(16, 0, 0)), None);
    }

    #[test]
    fn writes_mark_mesh_dirty() {
        let mut block = MapBlock::filled(Point3::new(1, 2, 3), MapNode::air());
        block.mesh_dirty = false;
        assert!(block.set_node(Point3::new(3, 4, 5), MapNode::new(7)));
        assert!(block.mesh_dirty);
        assert_eq!(block.get_node(Point3::new(3, 4, 5)).unwrap().content, 7);
        assert_eq!(block.get_node_no_check(0, 0, 0).content, CONTENT_AIR);
        assert!(!block.set_node(Point3::new(-1, 0, 0), MapNode::air()));
    }

    #[test]
    fn refcount_never_underflows() {
        let mut block = MapBlock::new(Point3::new(0, 0, 0));
        block.ref_grab();
        block.ref_drop();
        block.ref_drop();
        assert_eq!(block.refcount(), 0);
    }

    #[test]
    fn metadata_is_per_node() {
        let mut block = MapBlock::filled(Point3::new(0, 0, 0), MapNode::air());
        let p = Point3::new(2, 3, 4);
        block.set_metadata_field(p, "owner", "sam");
        assert_eq!(block.metadata(p).unwrap()["owner"], "sam");
        assert!(block.metadata(Point3::new(0, 0, 0)).is_none());
        assert!(block.remove_metadata(p).is_some());
        assert_eq!(block.metadata_count(), 0);
    }
}
