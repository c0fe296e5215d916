//! # Lighting Module
//!
//! Incremental light propagation over the two light banks.
//!
//! Light is a small integer per cell: sunlight enters at `LIGHT_SUN` and
//! travels straight down without loss through cells that let sunlight
//! through; every other step costs one level. Light sources emit their own
//! level. Only cells whose type stores light (`ParamType::Light`) hold a
//! value; everything else is dark but may still emit.
//!
//! ## Update algorithm
//!
//! An edit is handled in two phases per bank:
//! 1. **Unspread**: starting from the changed cells at their previous light,
//!    neighbors whose light could only have come from there are cleared and
//!    in turn unspread. Neighbors that are lit independently become seeds.
//! 2. **Spread**: seeds are processed brightest first, lighting every
//!    propagating neighbor that is darker than the seed minus one.
//!
//! Both phases only touch resident blocks; cells in missing blocks are
//! treated as opaque and are never written. Every block containing a
//! changed cell (or bordering it) ends up in the modified set.

use std::collections::HashSet;
use std::sync::Arc;

use cgmath::{EuclideanSpace, Point3};
use log::debug;

use super::{
    block::{block_side::BlockSide, LightBank, MapNode, CONTENT_IGNORE, LIGHT_SUN},
    map_block::index_to_local,
    node_registry::{draw_type::ParamType, NodeRegistry},
    world::{Map, ModifiedBlocks},
    BlockPos, NodePos, MAP_BLOCKSIZE,
};

pub mod smooth;

/// Seeds bucketed by light level, drained brightest first.
#[derive(Debug)]
pub struct LightQueue {
    buckets: Vec<Vec<NodePos>>,
    len: usize,
}

impl Default for LightQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl LightQueue {
    /// Creates an empty queue with one bucket per nonzero level.
    pub fn new() -> Self {
        LightQueue {
            buckets: vec![Vec::new(); LIGHT_SUN as usize],
            len: 0,
        }
    }

    /// Queues `p` at `level`. Level zero carries nothing and is dropped.
    pub fn push(&mut self, level: u8, p: NodePos) {
        if level == 0 {
            return;
        }
        let level = level.min(LIGHT_SUN);
        self.buckets[level as usize - 1].push(p);
        self.len += 1;
    }

    /// Removes an entry of the highest queued level.
    pub fn pop_highest(&mut self) -> Option<(u8, NodePos)> {
        for (i, bucket) in self.buckets.iter_mut().enumerate().rev() {
            if let Some(p) = bucket.pop() {
                self.len -= 1;
                return Some((i as u8 + 1, p));
            }
        }
        None
    }

    /// Number of queued entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn loaded_node(map: &Map, p: NodePos) -> Option<MapNode> {
    map.get_node_checked(p).filter(|n| n.content != CONTENT_IGNORE)
}

fn write_node(map: &mut Map, modified: &mut ModifiedBlocks, p: NodePos, n: MapNode) {
    if map.set_node(p, n) {
        map.mark_node_modified(modified, p);
    }
}

/// Light a neighbor receives from a cell at `level` across `side`.
fn propagated_level(bank: LightBank, level: u8, side: BlockSide, sunlight_propagates: bool) -> u8 {
    if bank == LightBank::Day && level == LIGHT_SUN && side == BlockSide::BOTTOM && sunlight_propagates {
        LIGHT_SUN
    } else {
        level.saturating_sub(1)
    }
}

/// Spreads light from every queued seed.
///
/// Each seed is re-read when popped, so stale entries left behind by the
/// unspread phase cost nothing.
pub fn spread_light(
    map: &mut Map,
    registry: &NodeRegistry,
    bank: LightBank,
    queue: &mut LightQueue,
    modified: &mut ModifiedBlocks,
) {
    while let Some((_, p)) = queue.pop_highest() {
        let Some(n) = loaded_node(map, p) else {
            continue;
        };
        let level = n.light(bank, registry.get_node(&n));
        if level <= 1 {
            continue;
        }
        for side in BlockSide::all() {
            let q = p + side.normal();
            let Some(mut m) = loaded_node(map, q) else {
                continue;
            };
            let mf = registry.get_node(&m);
            if !mf.light_propagates {
                continue;
            }
            let new_level =
                propagated_level(bank, level, side, mf.sunlight_propagates).min(bank.max_level());
            if new_level > m.light_raw(bank) {
                m.set_light(bank, new_level, mf);
                write_node(map, modified, q, m);
                queue.push(new_level, q);
            }
        }
    }
}

/// Clears light that depended on cells in `unlight` and collects the
/// independent light around the cleared region into `sources`.
///
/// Entries of `unlight` carry the light the cell had before it was cleared.
pub fn unspread_light(
    map: &mut Map,
    registry: &NodeRegistry,
    bank: LightBank,
    unlight: &mut LightQueue,
    sources: &mut LightQueue,
    modified: &mut ModifiedBlocks,
) {
    while let Some((old_level, p)) = unlight.pop_highest() {
        for side in BlockSide::all() {
            let q = p + side.normal();
            let Some(mut m) = loaded_node(map, q) else {
                continue;
            };
            let mf = registry.get_node(&m);
            let effective = m.light(bank, mf);
            if effective == 0 {
                continue;
            }
            if mf.param_type != ParamType::Light {
                sources.push(effective, q);
                continue;
            }
            let stored = m.light_raw(bank);
            let sun_column = bank == LightBank::Day
                && side == BlockSide::BOTTOM
                && old_level == LIGHT_SUN
                && stored == LIGHT_SUN;
            let dependent = stored > mf.light_source && (stored < old_level || sun_column);
            if dependent {
                m.set_light(bank, mf.light_source, mf);
                write_node(map, modified, q, m);
                unlight.push(stored, q);
                sources.push(mf.light_source, q);
            } else {
                sources.push(effective, q);
            }
        }
    }
}

/// Whether sunlight reaches `p` from above: the cell above is sunlit, or
/// it is not loaded and the block holding `p` is not underground.
fn sunlit_from_above(map: &Map, registry: &NodeRegistry, p: NodePos) -> bool {
    let above = p + BlockSide::TOP.normal();
    match loaded_node(map, above) {
        Some(n) => {
            let f = registry.get_node(&n);
            f.sunlight_propagates && n.light(LightBank::Day, f) == LIGHT_SUN
        }
        None => !map.is_underground(p),
    }
}

/// Repairs light after a batch of cell changes.
///
/// # Arguments
/// * `map` - The map, already holding the new cells
/// * `changes` - Every changed position with the cell it replaced
/// * `modified` - Receives every block whose light changed
pub fn update_lighting_nodes(
    map: &mut Map,
    changes: &[(NodePos, MapNode)],
    modified: &mut ModifiedBlocks,
) {
    let registry = Arc::clone(map.registry());
    for bank in LightBank::BOTH {
        let mut unlight = LightQueue::new();
        let mut sources = LightQueue::new();

        for (p, old) in changes {
            let p = *p;
            let Some(mut n) = loaded_node(map, p) else {
                continue;
            };
            let f = registry.get_node(&n);
            let old_light = old.light(bank, registry.get_node(old));

            n.set_light(bank, f.light_source, f);
            if f.light_propagates
                && f.sunlight_propagates
                && bank == LightBank::Day
                && sunlit_from_above(map, &registry, p)
            {
                n.set_light(bank, LIGHT_SUN, f);
                sources.push(LIGHT_SUN, p);
            }
            write_node(map, modified, p, n);

            unlight.push(old_light, p);
            sources.push(f.light_source, p);
            if f.light_propagates {
                for side in BlockSide::all() {
                    let q = p + side.normal();
                    if let Some(m) = loaded_node(map, q) {
                        sources.push(m.light(bank, registry.get_node(&m)), q);
                    }
                }
            }
        }

        unspread_light(map, &registry, bank, &mut unlight, &mut sources, modified);
        spread_light(map, &registry, bank, &mut sources, modified);
    }
}

/// Recomputes light of a set of blocks from scratch.
///
/// Light inside the set is cleared, sunlight columns are seeded from the
/// top down, and light sources inside the set plus lit cells bordering it
/// are spread. Blocks outside the set only ever gain light.
///
/// # Arguments
/// * `map` - The map holding the blocks
/// * `blocks` - Block positions to recompute; missing ones are skipped
/// * `modified` - Receives every block whose light changed
pub fn recalculate_lighting(map: &mut Map, blocks: &[BlockPos], modified: &mut ModifiedBlocks) {
    let registry = Arc::clone(map.registry());
    let set: HashSet<BlockPos> = blocks
        .iter()
        .copied()
        .filter(|b| map.is_block_loaded(*b))
        .collect();
    let mut order: Vec<BlockPos> = set.iter().copied().collect();
    order.sort_unstable_by_key(|b| (-b.y, b.x, b.z));
    debug!("Recalculating light of {} blocks", order.len());

    for bank in LightBank::BOTH {
        for b in &order {
            if let Some(block) = map.get_block_no_create_no_ex_mut(*b) {
                for n in block.nodes_mut() {
                    let f = registry.get_node(n);
                    if f.param_type == ParamType::Light {
                        n.set_light_raw(bank, f.light_source);
                    }
                }
            }
        }

        let mut sources = LightQueue::new();
        if bank == LightBank::Day {
            for b in &order {
                seed_sunlight(map, &registry, *b, &mut sources);
            }
        }

        for b in &order {
            let Some(block) = map.get_block_no_create_no_ex(*b) else {
                continue;
            };
            let origin = block.origin();
            for (i, n) in block.nodes().iter().enumerate() {
                let f = registry.get_node(n);
                if f.light_source > 0 {
                    sources.push(f.light_source, origin + index_to_local(i).to_vec());
                }
            }
            for side in BlockSide::all() {
                let d = side.normal();
                if set.contains(&(*b + d)) {
                    continue;
                }
                for q in border_cells(origin, side) {
                    if let Some(m) = loaded_node(map, q + d) {
                        sources.push(m.light(bank, registry.get_node(&m)), q + d);
                    }
                }
            }
        }

        spread_light(map, &registry, bank, &mut sources, modified);
    }

    for b in &order {
        if let Some(block) = map.get_block_no_create_no_ex_mut(*b) {
            block.lighting_complete = true;
            block.mesh_dirty = true;
        }
        modified.insert(*b);
    }
}

fn seed_sunlight(map: &mut Map, registry: &NodeRegistry, b: BlockPos, sources: &mut LightQueue) {
    let Some(block) = map.get_block_no_create_no_ex(b) else {
        return;
    };
    let origin = block.origin();
    let underground = block.is_underground;
    let mut lit = Vec::new();
    for z in 0..MAP_BLOCKSIZE {
        for x in 0..MAP_BLOCKSIZE {
            let top = origin + Point3::new(x, MAP_BLOCKSIZE - 1, z).to_vec();
            let above = top + BlockSide::TOP.normal();
            let mut sun = match loaded_node(map, above) {
                Some(n) => {
                    let f = registry.get_node(&n);
                    f.sunlight_propagates && n.light(LightBank::Day, f) == LIGHT_SUN
                }
                None => !underground,
            };
            for y in (0..MAP_BLOCKSIZE).rev() {
                if !sun {
                    break;
                }
                let n = block.get_node_no_check(x, y, z);
                if registry.get_node(&n).sunlight_propagates {
                    lit.push(Point3::new(x, y, z));
                } else {
                    sun = false;
                }
            }
        }
    }
    let Some(block) = map.get_block_no_create_no_ex_mut(b) else {
        return;
    };
    for local in lit {
        let mut n = block.get_node_no_check(local.x, local.y, local.z);
        n.set_light(LightBank::Day, LIGHT_SUN, registry.get_node(&n));
        block.set_node(local, n);
        sources.push(LIGHT_SUN, origin + local.to_vec());
    }
}

/// Node positions of the face of a block on `side`.
fn border_cells(origin: NodePos, side: BlockSide) -> impl Iterator<Item = NodePos> {
    let d = side.normal();
    let fixed = |c: i32| if c > 0 { MAP_BLOCKSIZE - 1 } else { 0 };
    (0..MAP_BLOCKSIZE).flat_map(move |a| {
        (0..MAP_BLOCKSIZE).map(move |b| {
            let local = match side.axis() {
                0 => Point3::new(fixed(d.x), a, b),
                1 => Point3::new(a, fixed(d.y), b),
                _ => Point3::new(a, b, fixed(d.z)),
            };
            origin + local.to_vec()
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::{
        block::{CONTENT_AIR, LIGHT_MAX},
        map_block::MapBlock,
        node_registry::{draw_type::DrawType, NodeDefinition},
    };

    fn registry() -> Arc<NodeRegistry> {
        let mut registry = NodeRegistry::new();
        registry
            .register(NodeDefinition {
                name: "stone".into(),
                ..Default::default()
            })
            .unwrap();
        registry
            .register(NodeDefinition {
                name: "torch".into(),
                drawtype: DrawType::Torchlike,
                paramtype: ParamType::Light,
                sunlight_propagates: true,
                walkable: false,
                light_source: 13,
                ..Default::default()
            })
            .unwrap();
        Arc::new(registry)
    }

    fn dark_cave(registry: &Arc<NodeRegistry>) -> Map {
        let mut map = Map::new(Arc::clone(registry));
        let mut block = MapBlock::filled(Point3::new(0, 0, 0), MapNode::air());
        block.is_underground = true;
        map.insert_block(block);
        map
    }

    #[test]
    fn queue_pops_brightest_first() {
        let mut queue = LightQueue::new();
        queue.push(3, Point3::new(0, 0, 0));
        queue.push(0, Point3::new(9, 9, 9));
        queue.push(15, Point3::new(1, 0, 0));
        queue.push(7, Point3::new(2, 0, 0));
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.pop_highest(), Some((15, Point3::new(1, 0, 0))));
        assert_eq!(queue.pop_highest(), Some((7, Point3::new(2, 0, 0))));
        assert_eq!(queue.pop_highest(), Some((3, Point3::new(0, 0, 0))));
        assert!(queue.is_empty());
    }

    #[test]
    fn torch_floods_with_manhattan_falloff() {
        let registry = registry();
        let torch = registry.get_id("torch").unwrap();
        let mut map = dark_cave(&registry);
        let mut modified = ModifiedBlocks::new();
        let center = Point3::new(8, 8, 8);
        assert!(map.add_node_and_update(center, MapNode::new(torch), &mut modified, true));

        for (offset, expected) in [
            (Point3::new(1, 0, 0), 12),
            (Point3::new(2, 1, 0), 10),
            (Point3::new(3, 3, 3), 4),
            (Point3::new(7, 0, 0), 6),
        ] {
            let p = center + offset.to_vec();
            let n = map.get_node(p);
            assert_eq!(n.light_raw(LightBank::Night), expected, "at {p:?}");
            assert_eq!(n.light_raw(LightBank::Day), expected, "at {p:?}");
        }
        assert!(modified.contains(&Point3::new(0, 0, 0)));
    }

    #[test]
    fn removing_torch_restores_darkness() {
        let registry = registry();
        let torch = registry.get_id("torch").unwrap();
        let mut map = dark_cave(&registry);
        let mut modified = ModifiedBlocks::new();
        let center = Point3::new(5, 5, 5);
        map.add_node_and_update(center, MapNode::new(torch), &mut modified, true);
        map.remove_node_and_update(center, &mut modified);
        let block = map.get_block_no_create_no_ex(Point3::new(0, 0, 0)).unwrap();
        assert!(block.nodes().iter().all(|n| n.param1 == 0));
    }

    #[test]
    fn sunlight_fills_open_column_and_stops_at_stone() {
        let registry = registry();
        let stone = registry.get_id("stone").unwrap();
        let mut map = Map::new(Arc::clone(&registry));
        let mut block = MapBlock::filled(Point3::new(0, 0, 0), MapNode::air());
        block.set_node(Point3::new(3, 6, 3), MapNode::new(stone));
        map.insert_block(block);
        let mut modified = ModifiedBlocks::new();
        recalculate_lighting(&mut map, &[Point3::new(0, 0, 0)], &mut modified);

        assert_eq!(map.get_node(Point3::new(0, 0, 0)).light_raw(LightBank::Day), LIGHT_SUN);
        assert_eq!(map.get_node(Point3::new(3, 7, 3)).light_raw(LightBank::Day), LIGHT_SUN);
        assert_eq!(map.get_node(Point3::new(3, 5, 3)).light_raw(LightBank::Day), LIGHT_MAX);
        assert_eq!(map.get_node(Point3::new(3, 0, 3)).light_raw(LightBank::Day), LIGHT_MAX);
        assert_eq!(map.get_node(Point3::new(3, 5, 3)).light_raw(LightBank::Night), 0);
        assert!(map
            .get_block_no_create_no_ex(Point3::new(0, 0, 0))
            .unwrap()
            .lighting_complete);
    }

    #[test]
    fn sealing_a_shaft_darkens_it() {
        let registry = registry();
        let stone = registry.get_id("stone").unwrap();
        let mut map = Map::new(Arc::clone(&registry));
        let mut block = MapBlock::filled(Point3::new(0, 0, 0), MapNode::new(stone));
        for y in 0..16 {
            block.set_node(Point3::new(8, y, 8), MapNode::air());
        }
        map.insert_block(block);
        let mut modified = ModifiedBlocks::new();
        recalculate_lighting(&mut map, &[Point3::new(0, 0, 0)], &mut modified);
        assert_eq!(map.get_node(Point3::new(8, 0, 8)).light_raw(LightBank::Day), LIGHT_SUN);

        map.add_node_and_update(Point3::new(8, 15, 8), MapNode::new(stone), &mut modified, true);
        for y in 0..15 {
            let n = map.get_node(Point3::new(8, y, 8));
            assert_eq!(n.content, CONTENT_AIR);
            assert_eq!(n.light_raw(LightBank::Day), 0, "y = {y}");
        }

        map.remove_node_and_update(Point3::new(8, 15, 8), &mut modified);
        assert_eq!(map.get_node(Point3::new(8, 0, 8)).light_raw(LightBank::Day), LIGHT_SUN);
    }

    #[test]
    fn unloaded_neighbors_are_never_written() {
        let registry = registry();
        let torch = registry.get_id("torch").unwrap();
        let mut map = dark_cave(&registry);
        let mut modified = ModifiedBlocks::new();
        map.add_node_and_update(Point3::new(0, 0, 0), MapNode::new(torch), &mut modified, true);
        assert_eq!(map.block_count(), 1);
        assert_eq!(map.get_node(Point3::new(-1, 0, 0)).content, CONTENT_IGNORE);
    }
}
