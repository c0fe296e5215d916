//! # Engine State Module
//!
//! The voxel core a host drives once per frame.
//!
//! ## Key Components
//!
//! * `EngineState` - Owns every subsystem and sequences them each step
//! * `voxels` - Cells, node definitions, map blocks, light and liquids
//! * `rendering` - Block meshes, camera and draw list
//! * `task_management` - The mesh worker thread and its queue
//! * `collision` - Swept box movement and the player controller
//!
//! ## Frame sequence
//!
//! 1. The host edits the map through `set_node`/`remove_node`; each edit
//!    relights the map and queues the touched blocks for remeshing
//! 2. `step` moves the player, settles liquids, takes finished meshes from
//!    the worker, animates visible meshes and unloads idle blocks
//! 3. `update_draw_list` culls and sorts the visible meshes for the host's
//!    renderer, which reads them back through `draw_list`
//!
//! Only the thread owning `EngineState` touches the map. The mesh worker
//! reads copies of block cells taken when the blocks were queued.

use std::{
    collections::HashMap,
    sync::Arc,
    time::Duration,
};

use cgmath::{Deg, EuclideanSpace, InnerSpace, Point3, Vector3};
use log::{debug, trace, warn};

use crate::core::{
    settings::{DrawSettings, MeshSettings, MovementSettings, SchedulerSettings, Settings},
    time_source::TimeSource,
};
use collision::{
    aabb::Aabb, player::PlayerController, CollisionEnvironment, CollisionObject, ObjectId,
};
use rendering::{
    camera::{Camera, Projection},
    draw_list::{DrawList, SceneConstants},
    meshing::{prebaked::MeshSource, MeshContext},
    texture::{ShaderSource, TextureSource},
};
use task_management::{mesh_update_queue::MeshQueueStats, MeshUpdateManager, MeshUpdateStatus};
use voxels::{
    block::MapNode,
    lighting,
    map_block::MapBlock,
    node_registry::NodeRegistry,
    node_to_block_pos,
    world::{Map, ModifiedBlocks},
    BlockPos, NodePos, BS, FACE_DIRS,
};

pub mod collision;
pub mod rendering;
pub mod task_management;
pub mod voxels;

/// Height of the camera above the player's feet.
const EYE_HEIGHT: f32 = 1.625 * BS;

/// Full daylight.
const DAYNIGHT_RATIO_MAX: u32 = 1000;

/// Another moving thing in the world that the player collides with.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ActiveObject {
    /// Position in world units
    pub position: Vector3<f32>,
    /// Collision box relative to `position`
    pub collision_box: Aabb,
}

/// Map plus objects, as seen by the collision resolver.
struct WorldEnvironment<'a> {
    map: &'a Map,
    objects: &'a HashMap<ObjectId, ActiveObject>,
}

impl CollisionEnvironment for WorldEnvironment<'_> {
    fn map(&self) -> &Map {
        self.map
    }

    fn objects_inside_radius(&self, center: Vector3<f32>, radius: f32) -> Vec<CollisionObject> {
        let mut found: Vec<CollisionObject> = self
            .objects
            .iter()
            .filter(|(_, o)| (o.position - center).magnitude2() <= radius * radius)
            .map(|(id, o)| CollisionObject {
                id: *id,
                collision_box: o.collision_box.translated(o.position),
            })
            .collect();
        found.sort_unstable_by_key(|o| o.id);
        found
    }
}

/// The voxel core: map, meshing, collision and drawing state.
///
/// # Usage
/// ```ignore
/// let mut engine = EngineState::new(settings, registry, textures, &shaders, meshes, clock);
/// engine.insert_block(block);
/// loop {
///     engine.step(dtime);
///     let draw_list = engine.update_draw_list();
///     // hand draw_list entries to the renderer
/// }
/// ```
pub struct EngineState {
    settings: Settings,
    draw_settings: DrawSettings,
    map: Map,
    mesh_manager: MeshUpdateManager,
    draw_list: DrawList,
    camera: Camera,
    player: PlayerController,
    objects: HashMap<ObjectId, ActiveObject>,
    /// Mesh jobs in flight per block; a block with any holds one reference
    pending_meshes: HashMap<BlockPos, u32>,
    crack: Option<(i32, NodePos)>,
    daynight_ratio: u32,
    animation_time: f32,
    liquid_loop_max: usize,
    unload_timeout: f32,
}

impl std::fmt::Debug for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineState")
            .field("map", &self.map)
            .field("mesh_manager", &self.mesh_manager)
            .field("pending_meshes", &self.pending_meshes.len())
            .field("player", &self.player.position())
            .finish_non_exhaustive()
    }
}

impl EngineState {
    /// Creates the engine with an empty map.
    ///
    /// # Arguments
    /// * `settings` - Settings store; typed snapshots are taken here
    /// * `registry` - Node definitions; tiles are resolved against the sources
    /// * `textures` - Texture lookup
    /// * `shaders` - Shader lookup, used only while resolving tiles
    /// * `meshes` - Prebaked mesh lookup
    /// * `clock` - Time source of the mesh block cache
    pub fn new(
        settings: Settings,
        mut registry: NodeRegistry,
        textures: Arc<dyn TextureSource>,
        shaders: &dyn ShaderSource,
        meshes: Arc<dyn MeshSource>,
        clock: Arc<dyn TimeSource>,
    ) -> Self {
        let mesh_settings = MeshSettings::from_settings(&settings);
        let draw_settings = DrawSettings::from_settings(&settings);
        registry.update_textures(textures.as_ref(), shaders, &mesh_settings);
        let registry = Arc::new(registry);

        let ctx = Arc::new(MeshContext::new(registry.clone(), textures, meshes, mesh_settings));
        let mesh_manager =
            MeshUpdateManager::new(ctx, SchedulerSettings::from_settings(&settings), clock);

        let projection = Projection::new(800, 600, Deg(72.0), 1.0, draw_settings.viewing_range * BS);
        let camera = Camera::new(
            Point3::new(0.0, EYE_HEIGHT, 0.0),
            Deg(0.0),
            Deg(0.0),
            projection,
        );

        EngineState {
            draw_settings,
            map: Map::new(registry),
            mesh_manager,
            draw_list: DrawList::default(),
            camera,
            player: PlayerController::new(
                Vector3::new(0.0, 0.0, 0.0),
                MovementSettings::from_settings(&settings),
            ),
            objects: HashMap::new(),
            pending_meshes: HashMap::new(),
            crack: None,
            daynight_ratio: DAYNIGHT_RATIO_MAX,
            animation_time: 0.0,
            liquid_loop_max: settings.get_u32("liquid_loop_max") as usize,
            unload_timeout: settings.get_f32("block_unload_timeout"),
            settings,
        }
    }

    /// The settings the engine was created with.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The map.
    pub fn map(&self) -> &Map {
        &self.map
    }

    /// Node definitions.
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        self.map.registry()
    }

    /// Adds a block loaded or generated elsewhere, lights it and queues it
    /// and its neighbors for meshing.
    ///
    /// # Returns
    /// `false` if the block lies outside the world.
    pub fn insert_block(&mut self, block: MapBlock) -> bool {
        let p = block.position;
        if !self.map.insert_block(block) {
            warn!("Refusing block {p:?} outside the world");
            return false;
        }
        let mut modified = ModifiedBlocks::new();
        modified.insert(p);
        for dir in FACE_DIRS {
            if self.map.is_block_loaded(p + dir) {
                modified.insert(p + dir);
            }
        }
        lighting::recalculate_lighting(&mut self.map, &[p], &mut modified);
        self.queue_modified(&modified, false);
        true
    }

    /// Places a node and updates light, liquids and meshes.
    ///
    /// # Returns
    /// `false` if the position is outside the world.
    pub fn set_node(&mut self, p: NodePos, node: MapNode) -> bool {
        let mut modified = ModifiedBlocks::new();
        if !self.map.add_node_and_update(p, node, &mut modified, true) {
            return false;
        }
        trace!("Set node at {p:?}, {} blocks touched", modified.len());
        self.queue_modified(&modified, true);
        true
    }

    /// Removes a node, leaving air.
    pub fn remove_node(&mut self, p: NodePos) -> bool {
        let mut modified = ModifiedBlocks::new();
        if !self.map.remove_node_and_update(p, &mut modified) {
            return false;
        }
        self.queue_modified(&modified, true);
        true
    }

    /// Sets or clears the dig crack.
    ///
    /// # Arguments
    /// * `level` - Crack level, negative to clear
    /// * `pos` - Node being dug
    pub fn set_crack(&mut self, level: i32, pos: NodePos) {
        let crack = (level >= 0).then_some((level, pos));
        if crack == self.crack {
            return;
        }
        let previous = std::mem::replace(&mut self.crack, crack);
        self.mesh_manager.set_crack(level, pos);

        let mut touched = ModifiedBlocks::new();
        for (_, p) in previous.into_iter().chain(crack) {
            touched.insert(node_to_block_pos(p));
        }
        self.queue_modified(&touched, true);
    }

    /// Sets the daylight share of the sky, 0 (night) to 1000 (day).
    pub fn set_daynight_ratio(&mut self, ratio: u32) {
        self.daynight_ratio = ratio.min(DAYNIGHT_RATIO_MAX);
    }

    /// Adds or moves an active object.
    pub fn set_object(&mut self, id: ObjectId, object: ActiveObject) {
        self.objects.insert(id, object);
    }

    /// Removes an active object.
    pub fn remove_object(&mut self, id: ObjectId) -> Option<ActiveObject> {
        self.objects.remove(&id)
    }

    /// The local player.
    pub fn player(&self) -> &PlayerController {
        &self.player
    }

    /// The local player, for input handling.
    pub fn player_mut(&mut self) -> &mut PlayerController {
        &mut self.player
    }

    /// The camera.
    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// The camera, for orientation and projection changes.
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Advances the world by `dtime` seconds.
    pub fn step(&mut self, dtime: f32) {
        let env = WorldEnvironment {
            map: &self.map,
            objects: &self.objects,
        };
        self.player.step(&env, dtime);
        self.camera.position = Point3::from_vec(self.player.position())
            + Vector3::new(0.0, EYE_HEIGHT, 0.0);

        let mut modified = ModifiedBlocks::new();
        let processed = self.map.transform_liquids(&mut modified, self.liquid_loop_max);
        if processed > 0 {
            trace!("Liquid step processed {processed} positions");
        }
        self.queue_modified(&modified, false);

        self.process_mesh_results();

        self.animation_time += dtime;
        let crack_level = self.crack.map_or(-1, |(level, _)| level);
        self.draw_list.animate(
            &mut self.map,
            &self.camera,
            self.animation_time,
            crack_level,
            self.daynight_ratio,
        );

        let unloaded = self.map.timer_update(dtime, self.unload_timeout);
        for p in unloaded {
            debug!("Unloaded block {p:?}");
        }
    }

    /// Rebuilds the draw list for the current camera.
    pub fn update_draw_list(&mut self) -> &DrawList {
        self.camera.projection.set_zfar(self.draw_settings.viewing_range * BS);
        self.draw_list.update(&mut self.map, &self.camera, &self.draw_settings);
        &self.draw_list
    }

    /// The draw list of the last `update_draw_list`.
    pub fn draw_list(&self) -> &DrawList {
        &self.draw_list
    }

    /// Frame constants for the renderer.
    pub fn scene_constants(&self, sky_color: [f32; 4]) -> SceneConstants {
        DrawList::scene_constants(
            &self.camera,
            &self.draw_settings,
            sky_color,
            self.daynight_ratio,
            self.animation_time,
        )
    }

    /// Mesh queue and cache counters.
    pub fn mesh_stats(&self) -> MeshQueueStats {
        self.mesh_manager.stats()
    }

    /// Blocks whose mesh job has not come back yet.
    pub fn pending_mesh_count(&self) -> usize {
        self.pending_meshes.len()
    }

    /// Blocks until every queued mesh job has come back or `timeout` passes.
    ///
    /// # Returns
    /// `true` if nothing is pending any more.
    pub fn finish_mesh_updates(&mut self, timeout: Duration) -> bool {
        let deadline = web_time::Instant::now() + timeout;
        while !self.pending_meshes.is_empty() {
            let now = web_time::Instant::now();
            if now >= deadline {
                return false;
            }
            match self.mesh_manager.recv_result_timeout(deadline - now) {
                Some(result) => self.apply_mesh_result(result),
                None => return self.pending_meshes.is_empty(),
            }
        }
        true
    }

    /// Stops the mesh worker. Pending jobs are dropped.
    pub fn shutdown(&mut self) {
        self.mesh_manager.stop();
        for p in self.pending_meshes.drain().map(|(p, _)| p) {
            if let Some(block) = self.map.get_block_no_create_no_ex_mut(p) {
                block.ref_drop();
            }
        }
    }

    fn queue_modified(&mut self, modified: &ModifiedBlocks, urgent: bool) {
        let mut blocks: Vec<BlockPos> = modified.iter().copied().collect();
        blocks.sort_unstable_by_key(|p| (p.x, p.y, p.z));
        for p in blocks {
            let Some(block) = self.map.get_block_no_create_no_ex_mut(p) else {
                continue;
            };
            block.mesh_dirty = true;
            if !self.mesh_manager.update_block(&self.map, p, false, urgent, false) {
                continue;
            }
            let jobs = self.pending_meshes.entry(p).or_insert(0);
            *jobs += 1;
            if *jobs == 1 {
                if let Some(block) = self.map.get_block_no_create_no_ex_mut(p) {
                    block.ref_grab();
                }
            }
        }
    }

    fn process_mesh_results(&mut self) {
        for result in self.mesh_manager.drain_results() {
            self.apply_mesh_result(result);
        }
    }

    fn apply_mesh_result(&mut self, result: task_management::MeshUpdateResult) {
        let last_job = match self.pending_meshes.get_mut(&result.p) {
            Some(jobs) if *jobs > 1 => {
                *jobs -= 1;
                false
            }
            Some(_) => {
                self.pending_meshes.remove(&result.p);
                true
            }
            None => false,
        };
        let Some(block) = self.map.get_block_no_create_no_ex_mut(result.p) else {
            return;
        };
        if last_job {
            block.ref_drop();
        }
        match result.status {
            MeshUpdateStatus::Built => {
                block.mesh = result.mesh;
                block.mesh_dirty = false;
            }
            MeshUpdateStatus::CenterBlockMissing => {
                debug!("Block {:?} was gone when its mesh job ran", result.p);
            }
        }
    }
}

impl Drop for EngineState {
    fn drop(&mut self) {
        self.mesh_manager.stop();
    }
}
