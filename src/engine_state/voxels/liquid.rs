//! # Liquid Module
//!
//! Stepwise liquid flow over the map's liquid queue.
//!
//! Flowing liquid stores its level (0..=7) in the low bits of `param2` and
//! a flow-down bit when liquid of the same kind sits directly above it.
//! Each call to [`Map::transform_liquids`] drains a bounded number of
//! queued positions, recomputes every one of them from its neighborhood and
//! queues the neighbors of whatever changed for the next call, so a
//! spreading flood advances one cell per step.
//!
//! ## Rules
//! - Sources never change on their own.
//! - A cell under liquid of its kind becomes falling liquid at full level.
//! - Otherwise it takes the highest horizontal neighbor level minus one.
//!   Sources count as level 7; flowing neighbors only feed sideways when
//!   they rest on something they cannot fall into.
//! - Two or more horizontal sources over solid ground (or over a source)
//!   form a new source when the liquid is renewable.
//! - Levels below `8 - liquid_range` dry up to air.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use cgmath::Vector3;
use log::trace;

use super::{
    block::{
        ContentId, MapNode, CONTENT_AIR, CONTENT_IGNORE, LIQUID_FLOW_DOWN_MASK, LIQUID_LEVEL_MASK,
        LIQUID_LEVEL_SOURCE,
    },
    lighting,
    node_registry::{draw_type::LiquidType, NodeRegistry},
    world::{Map, ModifiedBlocks},
    NodePos, FACE_DIRS,
};

const HORIZONTAL_DIRS: [Vector3<i32>; 4] = [
    Vector3::new(1, 0, 0),
    Vector3::new(-1, 0, 0),
    Vector3::new(0, 0, 1),
    Vector3::new(0, 0, -1),
];

const UP: Vector3<i32> = Vector3::new(0, 1, 0);
const DOWN: Vector3<i32> = Vector3::new(0, -1, 0);

/// Highest level a flowing liquid cell can hold.
const LIQUID_LEVEL_MAX: u8 = LIQUID_LEVEL_SOURCE - 1;

/// Source and flowing content ids of one liquid.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct LiquidKind {
    source: ContentId,
    flowing: ContentId,
}

impl LiquidKind {
    fn of(registry: &NodeRegistry, n: &MapNode) -> Option<LiquidKind> {
        let f = registry.get_node(n);
        if !f.is_liquid()
            || f.liquid_alternative_source == CONTENT_IGNORE
            || f.liquid_alternative_flowing == CONTENT_IGNORE
        {
            return None;
        }
        Some(LiquidKind {
            source: f.liquid_alternative_source,
            flowing: f.liquid_alternative_flowing,
        })
    }

    fn contains(&self, n: &MapNode) -> bool {
        n.content == self.source || n.content == self.flowing
    }
}

impl Map {
    /// Runs one step of liquid flow.
    ///
    /// # Arguments
    /// * `modified` - Receives every block whose cells or light changed
    /// * `max_iterations` - Upper bound on queued positions processed
    ///
    /// # Returns
    /// The number of queued positions processed.
    pub fn transform_liquids(&mut self, modified: &mut ModifiedBlocks, max_iterations: usize) -> usize {
        let registry = Arc::clone(self.registry());
        let mut original: HashMap<NodePos, MapNode> = HashMap::new();
        let mut changes: Vec<(NodePos, MapNode)> = Vec::new();
        let mut must_reflow: VecDeque<NodePos> = VecDeque::new();
        let mut processed = 0;

        while processed < max_iterations {
            let Some(p) = self.transforming_liquid.pop_front() else {
                break;
            };
            processed += 1;

            let Some(n0) = self.get_node_checked(p) else {
                continue;
            };
            if n0.content == CONTENT_IGNORE {
                continue;
            }
            let Some(target) = self.liquid_target(&registry, p, n0) else {
                continue;
            };
            if target.content == n0.content && target.param2 == n0.param2 {
                continue;
            }

            trace!("Liquid at {p:?}: {} -> {}", n0.content, target.content);
            self.set_node(p, target);
            if original.insert(p, n0).is_none() {
                changes.push((p, n0));
            }
            for d in FACE_DIRS {
                let q = p + d;
                if let Some(m) = self.get_node_checked(q) {
                    let mf = registry.get_node(&m);
                    if mf.is_liquid() || mf.floodable || m.content == CONTENT_AIR {
                        must_reflow.push_back(q);
                    }
                }
            }
        }

        self.transforming_liquid.extend(must_reflow);
        if !changes.is_empty() {
            lighting::update_lighting_nodes(self, &changes, modified);
            for (p, _) in &changes {
                self.mark_node_modified(modified, *p);
            }
        }
        processed
    }

    /// The cell `p` should hold given its neighbors, or `None` if it cannot
    /// take part in liquid flow.
    fn liquid_target(&self, registry: &NodeRegistry, p: NodePos, n0: MapNode) -> Option<MapNode> {
        let f0 = registry.get_node(&n0);
        let floodable = n0.content == CONTENT_AIR || f0.floodable;
        match f0.liquid_type {
            LiquidType::Source => return None,
            LiquidType::Flowing => {}
            LiquidType::None if floodable => {}
            LiquidType::None => return None,
        }

        let above = self.get_node(p + UP);
        let below = self.get_node(p + DOWN);
        let horizontal: Vec<(NodePos, MapNode)> = HORIZONTAL_DIRS
            .iter()
            .map(|d| (p + d, self.get_node(p + d)))
            .collect();

        let kind = LiquidKind::of(registry, &n0)
            .or_else(|| LiquidKind::of(registry, &above))
            .or_else(|| {
                horizontal
                    .iter()
                    .find_map(|(_, m)| LiquidKind::of(registry, m))
            })?;

        if kind.contains(&above) {
            return Some(MapNode::with_params(
                kind.flowing,
                0,
                LIQUID_LEVEL_MAX | LIQUID_FLOW_DOWN_MASK,
            ));
        }

        let mut max_level: i32 = -1;
        let mut sources = 0;
        for (q, m) in &horizontal {
            if m.content == kind.source {
                sources += 1;
                max_level = max_level.max(LIQUID_LEVEL_MAX as i32);
            } else if m.content == kind.flowing && self.rests_on_ground(registry, *q, &kind) {
                let level = (m.param2 & LIQUID_LEVEL_MASK) as i32;
                max_level = max_level.max(level - 1);
            }
        }

        let source_f = registry.get(kind.source);
        if sources >= 2 && source_f.liquid_renewable {
            let bf = registry.get_node(&below);
            let solid_below = below.content != CONTENT_IGNORE
                && below.content != CONTENT_AIR
                && !bf.floodable
                && !bf.is_liquid();
            if below.content == kind.source || solid_below {
                return Some(MapNode::new(kind.source));
            }
        }

        let range = registry.get(kind.flowing).liquid_range.clamp(1, LIQUID_LEVEL_SOURCE) as i32;
        if max_level < 0 || max_level < LIQUID_LEVEL_SOURCE as i32 - range {
            return Some(if f0.liquid_type == LiquidType::Flowing {
                MapNode::air()
            } else {
                n0
            });
        }
        Some(MapNode::with_params(kind.flowing, 0, max_level as u8))
    }

    /// Whether the cell at `q` has something under it that its liquid cannot
    /// fall into.
    fn rests_on_ground(&self, registry: &NodeRegistry, q: NodePos, kind: &LiquidKind) -> bool {
        let below = self.get_node(q + DOWN);
        if below.content == CONTENT_IGNORE || below.content == CONTENT_AIR {
            return false;
        }
        if below.content == kind.flowing {
            return false;
        }
        below.content == kind.source || !registry.get_node(&below).floodable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::{block::LightBank, map_block::MapBlock};
    use cgmath::Point3;

    const DEFS: &str = r#"[
        {"name": "stone"},
        {"name": "water_source", "drawtype": "liquid", "paramtype": "light",
         "liquidtype": "source", "walkable": false,
         "liquid_alternative_flowing": "water_flowing",
         "liquid_alternative_source": "water_source"},
        {"name": "water_flowing", "drawtype": "flowing_liquid", "paramtype": "light",
         "liquidtype": "flowing", "walkable": false, "paramtype2": "flowing_liquid",
         "liquid_alternative_flowing": "water_flowing",
         "liquid_alternative_source": "water_source"}
    ]"#;

    fn pool() -> (Map, ContentId, ContentId) {
        let registry = Arc::new(NodeRegistry::from_json(DEFS).unwrap());
        let stone = registry.get_id("stone").unwrap();
        let source = registry.get_id("water_source").unwrap();
        let flowing = registry.get_id("water_flowing").unwrap();
        let mut block = MapBlock::filled(Point3::new(0, 0, 0), MapNode::air());
        for z in 0..16 {
            for x in 0..16 {
                for y in 0..8 {
                    block.set_node(Point3::new(x, y, z), MapNode::new(stone));
                }
            }
        }
        let mut map = Map::new(registry);
        map.insert_block(block);
        let mut modified = ModifiedBlocks::new();
        lighting::recalculate_lighting(&mut map, &[Point3::new(0, 0, 0)], &mut modified);
        (map, source, flowing)
    }

    fn settle(map: &mut Map, modified: &mut ModifiedBlocks) {
        for _ in 0..256 {
            if map.liquid_queue_len() == 0 {
                break;
            }
            map.transform_liquids(modified, 10_000);
        }
    }

    #[test]
    fn source_spreads_with_decreasing_levels() {
        let (mut map, source, flowing) = pool();
        let mut modified = ModifiedBlocks::new();
        map.add_node_and_update(Point3::new(8, 8, 8), MapNode::new(source), &mut modified, true);
        assert!(map.liquid_queue_len() > 0);
        settle(&mut map, &mut modified);

        for (p, level) in [
            (Point3::new(9, 8, 8), 7),
            (Point3::new(10, 8, 9), 5),
            (Point3::new(15, 8, 8), 1),
            (Point3::new(8, 8, 0), 0),
        ] {
            let n = map.get_node(p);
            assert_eq!(n.content, flowing, "at {p:?}");
            assert_eq!(n.param2 & LIQUID_LEVEL_MASK, level, "at {p:?}");
        }
        assert_eq!(map.get_node(Point3::new(0, 8, 0)).content, CONTENT_AIR);
        assert_eq!(map.get_node(Point3::new(8, 9, 8)).content, CONTENT_AIR);
        assert_eq!(map.get_node(Point3::new(8, 8, 8)).content, source);
        assert!(map.get_node(Point3::new(9, 8, 8)).light_raw(LightBank::Day) > 0);
    }

    #[test]
    fn liquid_falls_with_flow_down_bit() {
        let (mut map, source, flowing) = pool();
        let mut modified = ModifiedBlocks::new();
        map.add_node_and_update(Point3::new(4, 14, 4), MapNode::new(source), &mut modified, true);
        settle(&mut map, &mut modified);
        let below = map.get_node(Point3::new(4, 13, 4));
        assert_eq!(below.content, flowing);
        assert_ne!(below.param2 & LIQUID_FLOW_DOWN_MASK, 0);
        assert_eq!(map.get_node(Point3::new(4, 8, 4)).content, flowing);
        assert_eq!(map.get_node(Point3::new(5, 14, 4)).content, flowing);
        assert_eq!(map.get_node(Point3::new(6, 13, 4)).content, CONTENT_AIR);
    }

    #[test]
    fn two_sources_renew_the_gap() {
        let (mut map, source, _) = pool();
        let mut modified = ModifiedBlocks::new();
        map.add_node_and_update(Point3::new(3, 8, 3), MapNode::new(source), &mut modified, true);
        map.add_node_and_update(Point3::new(5, 8, 3), MapNode::new(source), &mut modified, true);
        settle(&mut map, &mut modified);
        assert_eq!(map.get_node(Point3::new(4, 8, 3)).content, source);
    }

    #[test]
    fn removing_the_source_dries_the_flow() {
        let (mut map, source, _) = pool();
        let mut modified = ModifiedBlocks::new();
        map.add_node_and_update(Point3::new(8, 8, 8), MapNode::new(source), &mut modified, true);
        settle(&mut map, &mut modified);
        map.remove_node_and_update(Point3::new(8, 8, 8), &mut modified);
        settle(&mut map, &mut modified);
        for x in 0..16 {
            assert_eq!(map.get_node(Point3::new(x, 8, 8)).content, CONTENT_AIR, "x = {x}");
        }
    }

    #[test]
    fn iteration_bound_is_respected() {
        let (mut map, source, _) = pool();
        let mut modified = ModifiedBlocks::new();
        map.add_node_and_update(Point3::new(8, 8, 8), MapNode::new(source), &mut modified, true);
        let queued = map.liquid_queue_len();
        assert_eq!(map.transform_liquids(&mut modified, 2), 2);
        assert!(queued >= 2);
    }
}
