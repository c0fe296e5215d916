//! # Map Module
//!
//! The `Map` owns every resident `MapBlock`, grouped into vertical columns
//! (`MapSector`) keyed by their horizontal block position. It is the single
//! entry point for reading and writing cells: gameplay edits go through
//! [`Map::add_node_and_update`] and [`Map::remove_node_and_update`], which
//! keep light and the liquid queue consistent and report every block whose
//! mesh has to be rebuilt.
//!
//! ## Storage
//!
//! Only blocks that have been generated, loaded or written to are kept.
//! Reads outside resident blocks return `CONTENT_IGNORE`; writes create the
//! missing block (filled with `CONTENT_IGNORE`) on demand.
//!
//! ## Unloading
//!
//! Every block carries a usage timer. [`Map::timer_update`] advances the
//! timers and drops blocks that have been idle past the unload timeout,
//! unless something still holds a reference to them.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use cgmath::{Point2, Point3};
use log::{debug, info};

use super::{
    block::{MapNode, CONTENT_AIR, CONTENT_IGNORE},
    block_origin, is_valid_node_pos,
    lighting,
    map_block::{MapBlock, NodeMetadata},
    node_to_block_pos, node_to_local_pos,
    node_registry::NodeRegistry,
    voxel_manip::VoxelManipulator,
    BlockPos, NodePos, FACE_DIRS, MAP_BLOCKSIZE,
};

/// Blocks whose cells or light changed during an edit.
pub type ModifiedBlocks = HashSet<BlockPos>;

/// A vertical column of blocks sharing the same horizontal position.
#[derive(Debug)]
pub struct MapSector {
    /// Horizontal block position of the column
    pub position: Point2<i32>,
    blocks: HashMap<i32, MapBlock>,
}

impl MapSector {
    /// Creates an empty column.
    pub fn new(position: Point2<i32>) -> Self {
        MapSector {
            position,
            blocks: HashMap::new(),
        }
    }

    /// Block at height `y`, if resident.
    pub fn get_block(&self, y: i32) -> Option<&MapBlock> {
        self.blocks.get(&y)
    }

    /// Mutable block at height `y`, if resident.
    pub fn get_block_mut(&mut self, y: i32) -> Option<&mut MapBlock> {
        self.blocks.get_mut(&y)
    }

    /// Inserts a block, returning the one it replaced.
    pub fn insert_block(&mut self, block: MapBlock) -> Option<MapBlock> {
        self.blocks.insert(block.position.y, block)
    }

    /// Removes the block at height `y`.
    pub fn remove_block(&mut self, y: i32) -> Option<MapBlock> {
        self.blocks.remove(&y)
    }

    /// Number of resident blocks in the column.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Heights of the resident blocks, lowest first.
    pub fn block_heights(&self) -> Vec<i32> {
        let mut heights: Vec<i32> = self.blocks.keys().copied().collect();
        heights.sort_unstable();
        heights
    }
}

/// The resident voxel world.
pub struct Map {
    sectors: HashMap<Point2<i32>, MapSector>,
    registry: Arc<NodeRegistry>,
    pub(crate) transforming_liquid: VecDeque<NodePos>,
}

impl std::fmt::Debug for Map {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Map")
            .field("sectors", &self.sectors.len())
            .field("blocks", &self.block_count())
            .field("transforming_liquid", &self.transforming_liquid.len())
            .finish()
    }
}

fn sector_pos(b: BlockPos) -> Point2<i32> {
    Point2::new(b.x, b.z)
}

impl Map {
    /// Creates an empty map.
    ///
    /// # Arguments
    /// * `registry` - Node definitions shared with the mesh builder
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Map {
            sectors: HashMap::new(),
            registry,
            transforming_liquid: VecDeque::new(),
        }
    }

    /// Node definitions this map was created with.
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Column at a horizontal block position, if any block of it is resident.
    pub fn get_sector(&self, p: Point2<i32>) -> Option<&MapSector> {
        self.sectors.get(&p)
    }

    /// Number of columns with at least one resident block.
    pub fn sector_count(&self) -> usize {
        self.sectors.len()
    }

    /// Number of resident blocks.
    pub fn block_count(&self) -> usize {
        self.sectors.values().map(MapSector::block_count).sum()
    }

    /// Resident block at `p`. Never creates anything.
    pub fn get_block_no_create_no_ex(&self, p: BlockPos) -> Option<&MapBlock> {
        self.sectors.get(&sector_pos(p))?.get_block(p.y)
    }

    /// Mutable resident block at `p`. Never creates anything.
    pub fn get_block_no_create_no_ex_mut(&mut self, p: BlockPos) -> Option<&mut MapBlock> {
        self.sectors.get_mut(&sector_pos(p))?.get_block_mut(p.y)
    }

    /// Whether the block at `p` is resident.
    pub fn is_block_loaded(&self, p: BlockPos) -> bool {
        self.get_block_no_create_no_ex(p).is_some()
    }

    /// Returns the block at `p`, creating an `CONTENT_IGNORE`-filled one if
    /// it is not resident.
    ///
    /// # Returns
    /// `None` only if `p` lies outside the valid world.
    pub fn create_block(&mut self, p: BlockPos) -> Option<&mut MapBlock> {
        if !is_valid_node_pos(block_origin(p)) {
            debug!("Refusing to create block outside the world at {p:?}");
            return None;
        }
        let sector = self
            .sectors
            .entry(sector_pos(p))
            .or_insert_with(|| MapSector::new(sector_pos(p)));
        Some(sector.blocks.entry(p.y).or_insert_with(|| MapBlock::new(p)))
    }

    /// Inserts a finished block (generated or deserialized), replacing any
    /// resident block at the same position.
    ///
    /// # Returns
    /// `false` if the block lies outside the valid world.
    pub fn insert_block(&mut self, block: MapBlock) -> bool {
        let p = block.position;
        if !is_valid_node_pos(block_origin(p)) {
            return false;
        }
        let sector = self
            .sectors
            .entry(sector_pos(p))
            .or_insert_with(|| MapSector::new(sector_pos(p)));
        if sector.insert_block(block).is_some() {
            debug!("Replaced resident block {p:?}");
        }
        true
    }

    /// Removes a block from memory.
    pub fn remove_block(&mut self, p: BlockPos) -> Option<MapBlock> {
        let sp = sector_pos(p);
        let sector = self.sectors.get_mut(&sp)?;
        let block = sector.remove_block(p.y);
        if sector.block_count() == 0 {
            self.sectors.remove(&sp);
        }
        block
    }

    /// Positions of every resident block, in a stable order.
    pub fn block_positions(&self) -> Vec<BlockPos> {
        let mut positions: Vec<BlockPos> = self
            .sectors
            .values()
            .flat_map(|sector| {
                sector
                    .blocks
                    .keys()
                    .map(move |y| Point3::new(sector.position.x, *y, sector.position.y))
            })
            .collect();
        positions.sort_unstable_by_key(|p| (p.x, p.y, p.z));
        positions
    }

    /// Calls `f` for every resident block.
    pub fn for_each_block(&self, mut f: impl FnMut(&MapBlock)) {
        for sector in self.sectors.values() {
            for block in sector.blocks.values() {
                f(block);
            }
        }
    }

    /// Calls `f` for every resident block, mutably.
    pub fn for_each_block_mut(&mut self, mut f: impl FnMut(&mut MapBlock)) {
        for sector in self.sectors.values_mut() {
            for block in sector.blocks.values_mut() {
                f(block);
            }
        }
    }

    /// Cell at `p`, or `CONTENT_IGNORE` if its block is not resident.
    pub fn get_node(&self, p: NodePos) -> MapNode {
        self.get_node_checked(p).unwrap_or_else(MapNode::ignore)
    }

    /// Cell at `p`, or `None` if `p` is invalid or its block is not resident.
    pub fn get_node_checked(&self, p: NodePos) -> Option<MapNode> {
        if !is_valid_node_pos(p) {
            return None;
        }
        self.get_block_no_create_no_ex(node_to_block_pos(p))?
            .get_node(node_to_local_pos(p))
    }

    /// Whether `p` is inside a resident block.
    pub fn is_valid_position(&self, p: NodePos) -> bool {
        is_valid_node_pos(p) && self.is_block_loaded(node_to_block_pos(p))
    }

    /// Writes a cell without touching light or liquids. Creates the block
    /// if needed.
    ///
    /// # Returns
    /// `false` if `p` lies outside the valid world.
    pub fn set_node(&mut self, p: NodePos, node: MapNode) -> bool {
        if !is_valid_node_pos(p) {
            return false;
        }
        match self.create_block(node_to_block_pos(p)) {
            Some(block) => block.set_node(node_to_local_pos(p), node),
            None => false,
        }
    }

    /// Metadata of the node at `p`.
    pub fn get_node_metadata(&self, p: NodePos) -> Option<&NodeMetadata> {
        self.get_block_no_create_no_ex(node_to_block_pos(p))?
            .metadata(node_to_local_pos(p))
    }

    /// Sets one metadata field of the node at `p`.
    ///
    /// # Returns
    /// `false` if the block holding `p` is not resident.
    pub fn set_node_metadata(&mut self, p: NodePos, key: &str, value: &str) -> bool {
        match self.get_block_no_create_no_ex_mut(node_to_block_pos(p)) {
            Some(block) => block.set_metadata_field(node_to_local_pos(p), key, value),
            None => false,
        }
    }

    /// Removes all metadata of the node at `p`.
    pub fn remove_node_metadata(&mut self, p: NodePos) -> Option<NodeMetadata> {
        self.get_block_no_create_no_ex_mut(node_to_block_pos(p))?
            .remove_metadata(node_to_local_pos(p))
    }

    /// Whether the block holding `p` is flagged as underground. Unloaded
    /// blocks count as not underground.
    pub fn is_underground(&self, p: NodePos) -> bool {
        self.get_block_no_create_no_ex(node_to_block_pos(p))
            .map(|block| block.is_underground)
            .unwrap_or(false)
    }

    /// Places a node, then updates light, queues liquid neighbors and marks
    /// the affected blocks for remeshing.
    ///
    /// # Arguments
    /// * `p` - Node position to write
    /// * `node` - The new cell; its stored light is recomputed
    /// * `modified` - Receives every block whose mesh must be rebuilt
    /// * `remove_metadata` - Whether metadata of the replaced node is dropped
    ///
    /// # Returns
    /// `false` if `p` lies outside the valid world.
    pub fn add_node_and_update(
        &mut self,
        p: NodePos,
        node: MapNode,
        modified: &mut ModifiedBlocks,
        remove_metadata: bool,
    ) -> bool {
        if !is_valid_node_pos(p) {
            debug!("Ignoring edit outside the world at {p:?}");
            return false;
        }
        let old = self.get_node(p);
        if !self.set_node(p, node) {
            return false;
        }
        if remove_metadata {
            self.remove_node_metadata(p);
        }

        lighting::update_lighting_nodes(self, &[(p, old)], modified);
        self.queue_liquid_neighborhood(p);
        self.mark_node_modified(modified, p);
        true
    }

    /// Replaces the node at `p` with air. See [`Map::add_node_and_update`].
    pub fn remove_node_and_update(&mut self, p: NodePos, modified: &mut ModifiedBlocks) -> bool {
        self.add_node_and_update(p, MapNode::air(), modified, true)
    }

    /// Queues `p` and its neighbors for the liquid pass when any of them
    /// holds liquid.
    pub(crate) fn queue_liquid_neighborhood(&mut self, p: NodePos) {
        let mut positions = vec![p];
        positions.extend(FACE_DIRS.iter().map(|d| p + d));
        let any_liquid = positions
            .iter()
            .any(|q| self.registry.get_node(&self.get_node(*q)).is_liquid());
        if !any_liquid {
            return;
        }
        for q in positions {
            let Some(n) = self.get_node_checked(q) else {
                continue;
            };
            let f = self.registry.get_node(&n);
            if f.is_liquid() || f.floodable || n.content == CONTENT_AIR {
                self.transforming_liquid.push_back(q);
            }
        }
    }

    /// Queues a single position for the liquid pass.
    pub fn queue_liquid(&mut self, p: NodePos) {
        self.transforming_liquid.push_back(p);
    }

    /// Number of positions waiting for the liquid pass.
    pub fn liquid_queue_len(&self) -> usize {
        self.transforming_liquid.len()
    }

    /// Marks the block holding `p` and, when `p` sits on a block border, the
    /// resident neighbor blocks whose meshes sample it.
    pub fn mark_node_modified(&mut self, modified: &mut ModifiedBlocks, p: NodePos) {
        let local = node_to_local_pos(p);
        let axis_offsets = |c: i32| -> &'static [i32] {
            if c == 0 {
                &[0, -1]
            } else if c == MAP_BLOCKSIZE - 1 {
                &[0, 1]
            } else {
                &[0]
            }
        };
        let b = node_to_block_pos(p);
        for dx in axis_offsets(local.x) {
            for dy in axis_offsets(local.y) {
                for dz in axis_offsets(local.z) {
                    let nb = Point3::new(b.x + dx, b.y + dy, b.z + dz);
                    if let Some(block) = self.get_block_no_create_no_ex_mut(nb) {
                        block.mesh_dirty = true;
                        modified.insert(nb);
                    }
                }
            }
        }
    }

    /// Copies every resident block overlapping the manipulator's area into
    /// it. Cells of missing blocks stay unloaded.
    pub fn copy_to_voxel_manip(&self, vm: &mut VoxelManipulator) {
        let min_b = node_to_block_pos(vm.area.min);
        let max_b = node_to_block_pos(vm.area.max);
        for z in min_b.z..=max_b.z {
            for y in min_b.y..=max_b.y {
                for x in min_b.x..=max_b.x {
                    let bp = Point3::new(x, y, z);
                    if let Some(block) = self.get_block_no_create_no_ex(bp) {
                        vm.copy_from(block_origin(bp), MAP_BLOCKSIZE, block.nodes());
                    }
                }
            }
        }
    }

    /// Advances block usage timers and unloads idle, unreferenced blocks.
    ///
    /// # Arguments
    /// * `dtime` - Seconds since the last call
    /// * `unload_timeout` - Idle seconds after which a block is dropped
    ///
    /// # Returns
    /// Positions of the blocks that were unloaded.
    pub fn timer_update(&mut self, dtime: f32, unload_timeout: f32) -> Vec<BlockPos> {
        let mut unloaded = Vec::new();
        for sector in self.sectors.values_mut() {
            sector.blocks.retain(|_, block| {
                block.increment_usage_timer(dtime);
                if block.refcount() == 0 && block.usage_timer() > unload_timeout {
                    unloaded.push(block.position);
                    false
                } else {
                    true
                }
            });
        }
        self.sectors.retain(|_, sector| sector.block_count() > 0);
        if !unloaded.is_empty() {
            unloaded.sort_unstable_by_key(|p| (p.x, p.y, p.z));
            info!("Unloaded {} idle blocks", unloaded.len());
        }
        unloaded
    }

    /// Whether the cell at `p` is loaded and not `CONTENT_IGNORE`.
    pub fn is_known(&self, p: NodePos) -> bool {
        self.get_node_checked(p)
            .map(|n| n.content != CONTENT_IGNORE)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::block::{LightBank, LIGHT_SUN};
    use crate::engine_state::voxels::node_registry::NodeDefinition;

    fn registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry
            .register(NodeDefinition {
                name: "stone".into(),
                ..Default::default()
            })
            .unwrap();
        Arc::new(registry)
    }

    #[test]
    fn missing_blocks_read_as_ignore() {
        let map = Map::new(registry());
        assert_eq!(map.get_node(Point3::new(3, 4, 5)).content, CONTENT_IGNORE);
        assert!(map.get_node_checked(Point3::new(3, 4, 5)).is_none());
        assert!(map.get_node_checked(Point3::new(0, 40000, 0)).is_none());
    }

    #[test]
    fn set_node_creates_ignore_filled_block() {
        let mut map = Map::new(registry());
        assert!(map.set_node(Point3::new(-1, 0, 0), MapNode::air()));
        let block = map.get_block_no_create_no_ex(Point3::new(-1, 0, 0)).unwrap();
        assert_eq!(block.get_node(Point3::new(15, 0, 0)).unwrap().content, CONTENT_AIR);
        assert_eq!(block.get_node(Point3::new(0, 0, 0)).unwrap().content, CONTENT_IGNORE);
        assert_eq!(map.sector_count(), 1);
        assert!(!map.set_node(Point3::new(40000, 0, 0), MapNode::air()));
    }

    #[test]
    fn border_edits_mark_neighbor_blocks() {
        let mut map = Map::new(registry());
        for b in [Point3::new(0, 0, 0), Point3::new(-1, 0, 0), Point3::new(0, 0, 1)] {
            map.insert_block(MapBlock::filled(b, MapNode::air()));
        }
        let mut modified = ModifiedBlocks::new();
        map.mark_node_modified(&mut modified, Point3::new(0, 5, 15));
        assert!(modified.contains(&Point3::new(0, 0, 0)));
        assert!(modified.contains(&Point3::new(-1, 0, 0)));
        assert!(modified.contains(&Point3::new(0, 0, 1)));
        assert_eq!(modified.len(), 3);
    }

    #[test]
    fn add_then_remove_restores_sunlight() {
        let registry = registry();
        let stone = registry.get_id("stone").unwrap();
        let mut map = Map::new(Arc::clone(&registry));
        map.insert_block(MapBlock::filled(Point3::new(0, 0, 0), MapNode::air()));
        let mut modified = ModifiedBlocks::new();
        lighting::recalculate_lighting(&mut map, &[Point3::new(0, 0, 0)], &mut modified);
        let below = Point3::new(4, 3, 4);
        assert_eq!(map.get_node(below).light_raw(LightBank::Day), LIGHT_SUN);

        let before: Vec<MapNode> = map
            .get_block_no_create_no_ex(Point3::new(0, 0, 0))
            .unwrap()
            .nodes()
            .to_vec();
        assert!(map.add_node_and_update(Point3::new(4, 10, 4), MapNode::new(stone), &mut modified, true));
        assert!(map.get_node(below).light_raw(LightBank::Day) < LIGHT_SUN);
        assert!(map.remove_node_and_update(Point3::new(4, 10, 4), &mut modified));
        let after = map
            .get_block_no_create_no_ex(Point3::new(0, 0, 0))
            .unwrap()
            .nodes();
        assert_eq!(before.as_slice(), after);
    }

    #[test]
    fn idle_unreferenced_blocks_unload() {
        let mut map = Map::new(registry());
        map.insert_block(MapBlock::filled(Point3::new(0, 0, 0), MapNode::air()));
        map.insert_block(MapBlock::filled(Point3::new(1, 0, 0), MapNode::air()));
        map.get_block_no_create_no_ex_mut(Point3::new(1, 0, 0))
            .unwrap()
            .ref_grab();
        assert!(map.timer_update(5.0, 10.0).is_empty());
        let unloaded = map.timer_update(6.0, 10.0);
        assert_eq!(unloaded, vec![Point3::new(0, 0, 0)]);
        assert_eq!(map.block_count(), 1);
    }
}
