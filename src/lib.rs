#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel World
//!
//! The voxel-world core of a block game client: an addressable map of
//! 16³ blocks, day and night light propagation, a map block mesher with
//! texture animation, a background mesh worker, swept box collision and
//! per-frame draw list assembly.
//!
//! No window, GPU or sound code lives here. Hosts supply texture, shader
//! and mesh lookups, drive the engine once per frame and draw the entries
//! it hands back.
//!
//! ## Key Modules
//!
//! * `core` - Settings and time sources shared by every subsystem
//! * `engine_state` - The engine facade and its subsystems
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     voxel_world::run();
//! }
//! ```
//!
//! `run` installs a logger (configured through `RUST_LOG`) and simulates a
//! small generated world headlessly, logging what the engine does.

use std::{sync::Arc, time::Duration};

use cgmath::{Point3, Vector3};
use log::{error, info};

pub mod core;
pub mod engine_state;

pub use engine_state::EngineState;

use crate::{
    core::{settings::Settings, time_source::SystemClock},
    engine_state::{
        rendering::{
            meshing::prebaked::MeshRegistry,
            texture::{ShaderRegistry, TextureRegistry},
            tile::RenderPass,
        },
        voxels::{
            block::MapNode,
            map_block::generation::{TerrainGenerator, TerrainPalette},
            node_registry::NodeRegistry,
            BS,
        },
    },
};

/// Node types of the demo world.
const DEMO_NODES: &str = r#"[
    {"name": "stone", "tiles": ["stone.png"], "groups": {"cracky": 3}},
    {"name": "dirt", "tiles": ["dirt.png"]},
    {"name": "grass", "tiles": ["grass.png", "dirt.png", "grass_side.png"]},
    {"name": "water_source", "drawtype": "liquid", "paramtype": "light",
     "liquidtype": "source", "walkable": false,
     "liquid_alternative_flowing": "water_flowing",
     "liquid_alternative_source": "water_source",
     "tiles": [{"name": "water.png", "animation": {"type": "vertical_frames",
                "aspect_w": 16, "aspect_h": 16, "length": 2.0}}]},
    {"name": "water_flowing", "drawtype": "flowing_liquid", "paramtype": "light",
     "liquidtype": "flowing", "walkable": false, "paramtype2": "flowing_liquid",
     "liquid_alternative_flowing": "water_flowing",
     "liquid_alternative_source": "water_source", "tiles": ["water.png"]},
    {"name": "torch", "drawtype": "torchlike", "paramtype": "light",
     "paramtype2": "wallmounted", "light_source": 13, "walkable": false,
     "sunlight_propagates": true,
     "tiles": ["torch_floor.png", "torch_ceiling.png", "torch.png"]}
]"#;

/// Seconds of simulated time.
const DEMO_SECONDS: f32 = 3.0;

/// Simulation step length.
const DEMO_DTIME: f32 = 1.0 / 30.0;

/// Blocks generated around the origin on each horizontal axis.
const DEMO_RADIUS: i32 = 2;

/// Runs the headless demo with logging to stdout.
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");
    if let Err(e) = run_demo() {
        error!("Demo failed: {e:#}");
    }
}

fn run_demo() -> anyhow::Result<()> {
    let settings = match std::env::var("VOXEL_WORLD_SETTINGS") {
        Ok(path) => Settings::load(path)?,
        Err(_) => Settings::new(),
    };
    let registry = NodeRegistry::from_json(DEMO_NODES)?;
    let palette = TerrainPalette::from_registry(&registry, "stone", "dirt", "grass", "water_source");
    let torch = registry
        .get_id("torch")
        .ok_or_else(|| anyhow::anyhow!("torch is not registered"))?;

    let textures = Arc::new(TextureRegistry::new());
    for name in [
        "stone.png",
        "dirt.png",
        "grass.png",
        "grass_side.png",
        "torch_floor.png",
        "torch_ceiling.png",
        "torch.png",
    ] {
        textures.add_source_image(name, 16, 16);
    }
    textures.add_source_image("water.png", 16, 128);

    let mut engine = EngineState::new(
        settings,
        registry,
        textures,
        &ShaderRegistry::new(),
        Arc::new(MeshRegistry::new()),
        Arc::new(SystemClock::new()),
    );

    let generator = TerrainGenerator::new(fastrand::u32(..), palette);
    let started = web_time::Instant::now();
    for y in (-1..=1).rev() {
        for z in -DEMO_RADIUS..=DEMO_RADIUS {
            for x in -DEMO_RADIUS..=DEMO_RADIUS {
                engine.insert_block(generator.generate(Point3::new(x, y, z)));
            }
        }
    }
    info!(
        "Generated {} blocks in {:?}",
        engine.map().block_count(),
        started.elapsed()
    );

    let surface = generator.surface_height(0, 0).max(generator.sea_level);
    engine
        .player_mut()
        .set_position(Vector3::new(0.0, (surface as f32 + 2.0) * BS, 0.0));
    engine.set_node(Point3::new(2, surface + 1, 2), MapNode::new(torch));

    if !engine.finish_mesh_updates(Duration::from_secs(30)) {
        info!("{} meshes still pending", engine.pending_mesh_count());
    }

    let steps = (DEMO_SECONDS / DEMO_DTIME) as u32;
    for i in 0..steps {
        let fall_speed = engine.player().speed().y;
        engine
            .player_mut()
            .set_speed(Vector3::new(2.0 * BS, fall_speed, 0.0));
        engine.set_crack((i / 10) as i32 % 5, Point3::new(0, surface, 3));
        engine.step(DEMO_DTIME);
        let draw_list = engine.update_draw_list();
        if i % 30 == 0 {
            info!(
                "t={:.1}s drawn blocks {} solid {} transparent {} occluded {}",
                i as f32 * DEMO_DTIME,
                draw_list.drawn_blocks().len(),
                draw_list.entries(RenderPass::Solid).len(),
                draw_list.entries(RenderPass::Transparent).len(),
                draw_list.blocks_occluded(),
            );
        }
    }

    let stats = engine.mesh_stats();
    info!(
        "Player at {:?}, on ground {}; mesh cache {} blocks ({} kB), hits {} misses {}",
        engine.player().position(),
        engine.player().touching_ground(),
        stats.cached_blocks,
        stats.cache_size_kb,
        stats.cache_hits,
        stats.cache_misses,
    );
    engine.shutdown();
    Ok(())
}
