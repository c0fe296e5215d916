use std::sync::Arc;

use cgmath::{EuclideanSpace, Point3, Vector3};
use voxel_world::engine_state::voxels::{
    block::{LightBank, MapNode, CONTENT_AIR, LIGHT_SUN},
    lighting::recalculate_lighting,
    map_block::MapBlock,
    node_registry::NodeRegistry,
    world::{Map, ModifiedBlocks},
    NodePos, FACE_DIRS, MAP_BLOCKSIZE,
};

const DEFS: &str = r#"[
    {"name": "stone", "tiles": ["stone.png"]},
    {"name": "torch", "drawtype": "torchlike", "paramtype": "light",
     "light_source": 13, "walkable": false, "sunlight_propagates": true,
     "tiles": ["torch.png"]}
]"#;

fn registry() -> Arc<NodeRegistry> {
    Arc::new(NodeRegistry::from_json(DEFS).unwrap())
}

fn light_at(map: &Map, p: NodePos, bank: LightBank) -> u8 {
    let n = map.get_node(p);
    n.light(bank, map.registry().get_node(&n))
}

/// Every light value of every cell in the block at the origin.
fn light_field(map: &Map) -> Vec<(u8, u8)> {
    let block = map.get_block_no_create_no_ex(Point3::new(0, 0, 0)).unwrap();
    block
        .nodes()
        .iter()
        .map(|n| {
            let f = map.registry().get_node(n);
            (n.light(LightBank::Day, f), n.light(LightBank::Night, f))
        })
        .collect()
}

fn inside(p: NodePos) -> bool {
    (0..MAP_BLOCKSIZE).contains(&p.x)
        && (0..MAP_BLOCKSIZE).contains(&p.y)
        && (0..MAP_BLOCKSIZE).contains(&p.z)
}

fn assert_smooth_gradient(map: &Map) {
    let registry = Arc::clone(map.registry());
    for z in 0..MAP_BLOCKSIZE {
        for y in 0..MAP_BLOCKSIZE {
            for x in 0..MAP_BLOCKSIZE {
                let a = Point3::new(x, y, z);
                let na = map.get_node(a);
                if !registry.get_node(&na).light_propagates {
                    continue;
                }
                for d in FACE_DIRS {
                    let b = a + d;
                    let nb = map.get_node(b);
                    if !inside(b) || !registry.get_node(&nb).light_propagates {
                        continue;
                    }
                    for bank in LightBank::BOTH {
                        let la = light_at(map, a, bank);
                        let lb = light_at(map, b, bank);
                        // Sunlight falls straight down without losing strength.
                        if bank == LightBank::Day && la == LIGHT_SUN && lb == LIGHT_SUN {
                            continue;
                        }
                        assert!(
                            la.abs_diff(lb) <= 1,
                            "{bank:?} light jumps from {la} at {a:?} to {lb} at {b:?}"
                        );
                    }
                }
            }
        }
    }
}

/// A single open-air block with random stone pillars and overhangs.
fn random_world(seed: u64) -> (Map, fastrand::Rng) {
    let registry = registry();
    let stone = registry.get_id("stone").unwrap();
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut block = MapBlock::filled(Point3::new(0, 0, 0), MapNode::air());
    for n in block.nodes_mut() {
        if rng.u8(..100) < 20 {
            *n = MapNode::new(stone);
        }
    }
    let mut map = Map::new(registry);
    map.insert_block(block);
    let mut modified = ModifiedBlocks::new();
    recalculate_lighting(&mut map, &[Point3::new(0, 0, 0)], &mut modified);
    (map, rng)
}

fn random_cell(rng: &mut fastrand::Rng) -> NodePos {
    Point3::new(
        rng.i32(0..MAP_BLOCKSIZE),
        rng.i32(0..MAP_BLOCKSIZE),
        rng.i32(0..MAP_BLOCKSIZE),
    )
}

#[test]
fn sunlight_column_over_stone() {
    let registry = registry();
    let stone = registry.get_id("stone").unwrap();
    let mut map = Map::new(Arc::clone(&registry));
    map.insert_block(MapBlock::filled(Point3::new(0, 0, 0), MapNode::air()));
    let mut ground = MapBlock::filled(Point3::new(0, -1, 0), MapNode::new(stone));
    ground.is_underground = true;
    map.insert_block(ground);

    let mut modified = ModifiedBlocks::new();
    recalculate_lighting(
        &mut map,
        &[Point3::new(0, 0, 0), Point3::new(0, -1, 0)],
        &mut modified,
    );
    // An edit elsewhere in the column must not disturb it.
    map.add_node_and_update(Point3::new(12, 4, 12), MapNode::new(stone), &mut modified, true);

    for y in 0..MAP_BLOCKSIZE {
        assert_eq!(light_at(&map, Point3::new(3, y, 3), LightBank::Day), LIGHT_SUN, "y = {y}");
    }
    assert_eq!(light_at(&map, Point3::new(3, -1, 3), LightBank::Day), 0);
    assert!(modified.contains(&Point3::new(0, -1, 0)));
}

#[test]
fn torch_flood_in_dark_air() {
    let registry = registry();
    let torch = registry.get_id("torch").unwrap();
    let mut map = Map::new(Arc::clone(&registry));
    for z in -1..=0 {
        for y in -1..=0 {
            for x in -1..=0 {
                let mut block = MapBlock::filled(Point3::new(x, y, z), MapNode::air());
                block.is_underground = true;
                map.insert_block(block);
            }
        }
    }

    let mut modified = ModifiedBlocks::new();
    let origin = Point3::new(0, 0, 0);
    map.add_node_and_update(origin, MapNode::new(torch), &mut modified, true);

    for (distance, expected) in [(0, 13), (1, 12), (5, 8), (12, 1), (13, 0), (14, 0)] {
        for d in [Vector3::new(1, 0, 0), Vector3::new(0, -1, 0), Vector3::new(0, 0, -1)] {
            let p = origin + d * distance;
            assert_eq!(light_at(&map, p, LightBank::Night), expected, "at {p:?}");
        }
    }
    // Light falls off with Manhattan distance, not Euclidean.
    assert_eq!(light_at(&map, Point3::new(3, -4, 2), LightBank::Night), 4);
    assert_eq!(modified.len(), 8);
}

#[test]
fn adjacent_light_differs_by_at_most_one() {
    for seed in 0..4 {
        let (mut map, mut rng) = random_world(seed);
        let stone = map.registry().get_id("stone").unwrap();
        let torch = map.registry().get_id("torch").unwrap();
        assert_smooth_gradient(&map);

        let mut modified = ModifiedBlocks::new();
        for _ in 0..40 {
            let p = random_cell(&mut rng);
            let node = match rng.u8(..3) {
                0 => MapNode::new(stone),
                1 => MapNode::new(torch),
                _ => {
                    map.remove_node_and_update(p, &mut modified);
                    continue;
                }
            };
            map.add_node_and_update(p, node, &mut modified, true);
        }
        assert_smooth_gradient(&map);
    }
}

#[test]
fn add_then_remove_restores_the_light_field() {
    let (mut map, mut rng) = random_world(11);
    let stone = map.registry().get_id("stone").unwrap();
    let torch = map.registry().get_id("torch").unwrap();
    let mut modified = ModifiedBlocks::new();

    for node in [MapNode::new(stone), MapNode::new(torch)] {
        for _ in 0..10 {
            let p = random_cell(&mut rng);
            if map.get_node(p).content != CONTENT_AIR {
                continue;
            }
            let before = light_field(&map);
            map.add_node_and_update(p, node, &mut modified, true);
            map.remove_node_and_update(p, &mut modified);
            assert_eq!(light_field(&map), before, "after editing {p:?}");
        }
    }
}

#[test]
fn lit_blocks_survive_serialization() {
    let (map, _) = random_world(3);
    let block = map.get_block_no_create_no_ex(Point3::new(0, 0, 0)).unwrap();
    let decoded = MapBlock::deserialize(block.position, &block.serialize()).unwrap();
    assert_eq!(decoded.nodes(), block.nodes());
    assert_eq!(decoded.origin(), Point3::origin());
}
