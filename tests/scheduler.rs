use std::{sync::Arc, time::Duration};

use cgmath::{Point3, Vector3};
use voxel_world::{
    core::{
        settings::{SchedulerSettings, Settings},
        time_source::ManualClock,
    },
    engine_state::{
        rendering::{
            meshing::prebaked::MeshRegistry,
            texture::{ShaderRegistry, TextureRegistry},
            tile::RenderPass,
        },
        task_management::mesh_update_queue::MeshUpdateQueue,
        voxels::{
            block::MapNode, map_block::MapBlock, node_registry::NodeRegistry, world::Map, BlockPos,
        },
    },
    EngineState,
};

const DEFS: &str = r#"[{"name": "stone", "tiles": ["stone.png"]}]"#;

fn scheduler_settings(cache_size_kb: u32) -> SchedulerSettings {
    SchedulerSettings {
        cache_size_kb,
        generation_interval_ms: 0,
    }
}

fn air_map(positions: &[BlockPos]) -> Map {
    let mut map = Map::new(Arc::new(NodeRegistry::from_json(DEFS).unwrap()));
    for p in positions {
        map.insert_block(MapBlock::filled(*p, MapNode::air()));
    }
    map
}

#[test]
fn repeated_requests_for_a_block_build_once() {
    let clock = Arc::new(ManualClock::new(0));
    let queue = MeshUpdateQueue::new(scheduler_settings(20480), clock, false, true);
    let p = Point3::new(1, 2, 3);
    let map = air_map(&[p]);

    assert!(queue.add_block(&map, p, false, false));
    assert!(!queue.add_block(&map, p, false, false));
    assert_eq!(queue.cached_refcount(p), Some(1));

    let mut pops = 0;
    while let Some(job) = queue.pop() {
        assert_eq!(job.p, p);
        pops += 1;
    }
    assert_eq!(pops, 1);
    assert_eq!(queue.cached_refcount(p), Some(0));
}

#[test]
fn cache_stays_near_its_budget_under_steady_load() {
    let clock = Arc::new(ManualClock::new(0));
    let budget_kb = 160;
    let queue = MeshUpdateQueue::new(scheduler_settings(budget_kb), clock.clone(), false, true);
    // Spread out so no block is another's neighbor.
    let positions: Vec<BlockPos> = (0..40).map(|i| Point3::new(i * 3, 0, 0)).collect();
    let map = air_map(&positions);

    for (i, p) in positions.iter().enumerate() {
        queue.add_block(&map, *p, false, false);
        assert!(queue.pop().is_some());
        clock.advance(500);

        let stats = queue.stats();
        if i >= 2 {
            assert!(
                stats.cache_size_kb as f64 <= budget_kb as f64 * 1.1,
                "cache grew to {} kB after {} blocks",
                stats.cache_size_kb,
                i + 1
            );
        }
    }
    assert_eq!(queue.stats().cache_misses, positions.len() as u64);
}

#[test]
fn idle_cache_entries_expire() {
    let clock = Arc::new(ManualClock::new(1_000));
    let queue = MeshUpdateQueue::new(scheduler_settings(20480), clock.clone(), false, true);
    let a = Point3::new(0, 0, 0);
    let b = Point3::new(10, 0, 0);
    let map = air_map(&[a, b]);

    queue.add_block(&map, a, false, false);
    queue.pop();
    assert_eq!(queue.cached_refcount(a), Some(0));

    clock.advance(11_000);
    queue.add_block(&map, b, false, false);
    assert_eq!(queue.cached_refcount(a), None);
    assert_eq!(queue.cached_refcount(b), Some(1));
}

fn engine() -> EngineState {
    let textures = Arc::new(TextureRegistry::new());
    textures.add_source_image("stone.png", 16, 16);
    EngineState::new(
        Settings::new(),
        NodeRegistry::from_json(DEFS).unwrap(),
        textures,
        &ShaderRegistry::new(),
        Arc::new(MeshRegistry::new()),
        Arc::new(ManualClock::new(0)),
    )
}

#[test]
fn edits_come_back_as_meshes() {
    let mut engine = engine();
    let stone = engine.registry().get_id("stone").unwrap();
    for x in -1..=1 {
        engine.insert_block(MapBlock::filled(Point3::new(x, 0, 0), MapNode::air()));
    }
    assert!(engine.finish_mesh_updates(Duration::from_secs(30)));

    let center = Point3::new(0, 0, 0);
    let block = engine.map().get_block_no_create_no_ex(center).unwrap();
    assert!(block.mesh.as_ref().is_some_and(|m| m.is_empty()));
    assert_eq!(block.refcount(), 0);

    // A node on the block border touches the neighbor's mesh as well.
    engine.set_node(Point3::new(15, 8, 8), MapNode::new(stone));
    assert!(engine.pending_mesh_count() >= 2);
    assert!(engine.finish_mesh_updates(Duration::from_secs(30)));
    assert_eq!(engine.pending_mesh_count(), 0);

    let block = engine.map().get_block_no_create_no_ex(center).unwrap();
    let mesh = block.mesh.as_ref().unwrap();
    assert!(!block.mesh_dirty);
    // The face toward the neighbor block belongs to this block's mesh.
    assert_eq!(mesh.triangle_count(), 12);
    assert_eq!(mesh.buffers(RenderPass::Solid).len(), 1);

    engine.remove_node(Point3::new(15, 8, 8));
    assert!(engine.finish_mesh_updates(Duration::from_secs(30)));
    let block = engine.map().get_block_no_create_no_ex(center).unwrap();
    assert!(block.mesh.as_ref().is_some_and(|m| m.is_empty()));
    engine.shutdown();
}

#[test]
fn stepping_drives_the_draw_list() {
    let mut engine = engine();
    let stone = engine.registry().get_id("stone").unwrap();
    engine.insert_block(MapBlock::filled(Point3::new(0, 0, 0), MapNode::new(stone)));
    engine.insert_block(MapBlock::filled(Point3::new(0, 1, 0), MapNode::air()));
    assert!(engine.finish_mesh_updates(Duration::from_secs(30)));

    engine
        .player_mut()
        .set_position(Vector3::new(80.0, 165.0, 80.0));
    engine.step(0.05);
    let list = engine.update_draw_list();
    assert!(list.drawn_blocks().contains(&Point3::new(0, 0, 0)));
    assert!(!list.entries(RenderPass::Solid).is_empty());
    engine.shutdown();
}
