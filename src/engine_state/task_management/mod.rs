//! # Mesh Update Scheduling
//!
//! Moves mesh building off the main thread. The main thread queues blocks
//! whose cells changed; a single worker thread pops jobs, builds their
//! meshes and sends the results back over a channel the main thread drains
//! once per frame.
//!
//! ## Key Components
//! - `MeshUpdateQueue`: waiting jobs and the block cell cache they read
//! - `MeshUpdateManager`: owns the worker thread and the result channel
//! - `MeshUpdateResult`: a finished job
//!
//! ## Threading
//! The worker sleeps on a condition variable until the main thread queues
//! something or asks it to stop. It only ever touches snapshots copied out
//! of the map, never the map itself, so the main thread keeps exclusive
//! ownership of every block. Meshes cross back as plain values.
//!
//! ## Lifecycle
//! 1. `MeshUpdateManager::new` spawns the worker
//! 2. `update_block` queues a block, and optionally its face neighbors
//! 3. The worker builds one job at a time, pausing `generation_interval_ms`
//!    between builds
//! 4. `drain_results` hands finished meshes to the main thread
//! 5. `stop` (or dropping the manager) joins the worker and frees the cache

pub mod mesh_update_queue;

use std::{
    sync::{
        mpsc::{channel, Receiver, RecvTimeoutError, Sender},
        Arc, Condvar, Mutex,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use log::{debug, error, info, warn};
use mesh_update_queue::{MeshQueueStats, MeshUpdateJob, MeshUpdateQueue};

use crate::{
    core::{settings::SchedulerSettings, time_source::TimeSource},
    engine_state::{
        rendering::meshing::{MapBlockMesh, MeshContext},
        voxels::{world::Map, BlockPos, NodePos, FACE_DIRS},
    },
};

/// Outcome of one mesh job.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MeshUpdateStatus {
    /// A mesh was built
    Built,
    /// The block was no longer resident when its cells were cached
    CenterBlockMissing,
}

/// A finished mesh job.
#[derive(Debug)]
pub struct MeshUpdateResult {
    /// Meshed block
    pub p: BlockPos,
    /// Outcome of the job
    pub status: MeshUpdateStatus,
    /// The new mesh, present when `status` is `Built`
    pub mesh: Option<MapBlockMesh>,
    /// Whether the block should be acknowledged to the logic layer
    pub ack_block_to_server: bool,
}

#[derive(Debug, Default)]
struct WorkerSignal {
    pending: bool,
    stop: bool,
}

#[derive(Debug, Default)]
struct WorkerShared {
    signal: Mutex<WorkerSignal>,
    wake: Condvar,
}

impl WorkerShared {
    fn lock(&self) -> std::sync::MutexGuard<'_, WorkerSignal> {
        self.signal.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self) {
        self.lock().pending = true;
        self.wake.notify_one();
    }

    fn stopping(&self) -> bool {
        self.lock().stop
    }

    /// Blocks until there is work or a stop request.
    ///
    /// # Returns
    /// `false` once the worker should exit.
    fn wait_for_work(&self) -> bool {
        let mut signal = self.lock();
        while !signal.pending && !signal.stop {
            signal = self.wake.wait(signal).unwrap_or_else(|e| e.into_inner());
        }
        signal.pending = false;
        !signal.stop
    }
}

/// Owns the mesh worker thread and its queue.
pub struct MeshUpdateManager {
    queue: Arc<MeshUpdateQueue>,
    shared: Arc<WorkerShared>,
    result_rx: Receiver<MeshUpdateResult>,
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for MeshUpdateManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshUpdateManager")
            .field("queue", &self.queue)
            .field("running", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

impl MeshUpdateManager {
    /// Creates the queue and spawns the worker thread.
    ///
    /// # Arguments
    /// * `ctx` - Node definitions, texture lookups and mesh settings
    /// * `settings` - Cache size and build pacing
    /// * `clock` - Time source for cache ages
    pub fn new(ctx: Arc<MeshContext>, settings: SchedulerSettings, clock: Arc<dyn TimeSource>) -> Self {
        let queue = Arc::new(MeshUpdateQueue::new(
            settings,
            clock,
            ctx.settings.smooth_lighting,
            ctx.settings.enable_shaders,
        ));
        let shared = Arc::new(WorkerShared::default());
        let (result_tx, result_rx) = channel();

        let worker = {
            let queue = queue.clone();
            let shared = shared.clone();
            let interval = Duration::from_millis(settings.generation_interval_ms as u64);
            thread::Builder::new()
                .name("mesh-update".to_owned())
                .spawn(move || worker_loop(&queue, &shared, &ctx, &result_tx, interval))
        };
        let worker = match worker {
            Ok(handle) => Some(handle),
            Err(e) => {
                error!("Failed to spawn mesh worker: {e}");
                None
            }
        };

        MeshUpdateManager {
            queue,
            shared,
            result_rx,
            worker,
        }
    }

    /// Queues a block for meshing.
    ///
    /// # Arguments
    /// * `map` - Map the cells are copied from
    /// * `p` - Block to mesh
    /// * `ack_block_to_server` - Acknowledge the block once meshed
    /// * `urgent` - Build before non-urgent jobs
    /// * `update_neighbors` - Also queue the resident face neighbors
    ///
    /// # Returns
    /// `true` if a new job was queued for `p`, `false` if the request was
    /// merged into one already waiting.
    pub fn update_block(
        &self,
        map: &Map,
        p: BlockPos,
        ack_block_to_server: bool,
        urgent: bool,
        update_neighbors: bool,
    ) -> bool {
        let queued = self.queue.add_block(map, p, ack_block_to_server, urgent);
        if update_neighbors {
            for dir in FACE_DIRS {
                let neighbor = p + dir;
                if map.get_block_no_create_no_ex(neighbor).is_some() {
                    self.queue.add_block(map, neighbor, false, urgent);
                }
            }
        }
        self.shared.notify();
        queued
    }

    /// Sets the crack attached to jobs queued from now on.
    pub fn set_crack(&self, level: i32, pos: NodePos) {
        self.queue.set_crack(level, pos);
    }

    /// Takes every finished result without blocking.
    pub fn drain_results(&self) -> Vec<MeshUpdateResult> {
        self.result_rx.try_iter().collect()
    }

    /// Waits up to `timeout` for the next result.
    pub fn recv_result_timeout(&self, timeout: Duration) -> Option<MeshUpdateResult> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(result) => Some(result),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Mesh worker is gone; no more results will arrive");
                None
            }
        }
    }

    /// Number of jobs waiting for the worker.
    pub fn queue_len(&self) -> usize {
        self.queue.size()
    }

    /// Queue and cache counters.
    pub fn stats(&self) -> MeshQueueStats {
        self.queue.stats()
    }

    /// Whether the worker thread is running.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Stops the worker, discards pending results and frees the cache.
    pub fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        self.shared.lock().stop = true;
        self.shared.wake.notify_all();
        if worker.join().is_err() {
            error!("Mesh worker panicked");
        }
        let discarded = self.result_rx.try_iter().count();
        if discarded > 0 {
            debug!("Discarded {discarded} mesh results on shutdown");
        }
        self.queue.clear();
    }
}

impl Drop for MeshUpdateManager {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(
    queue: &MeshUpdateQueue,
    shared: &WorkerShared,
    ctx: &MeshContext,
    result_tx: &Sender<MeshUpdateResult>,
    interval: Duration,
) {
    info!("Mesh worker started");
    'outer: while shared.wait_for_work() {
        while let Some(job) = queue.pop() {
            if shared.stopping() {
                break 'outer;
            }
            if result_tx.send(build(job, ctx)).is_err() {
                break 'outer;
            }
            if !interval.is_zero() {
                thread::sleep(interval);
            }
        }
    }
    info!("Mesh worker stopped");
}

fn build(job: MeshUpdateJob, ctx: &MeshContext) -> MeshUpdateResult {
    let MeshUpdateJob {
        p,
        ack_block_to_server,
        data,
    } = job;
    if !data.has_center_block() {
        return MeshUpdateResult {
            p,
            status: MeshUpdateStatus::CenterBlockMissing,
            mesh: None,
            ack_block_to_server,
        };
    }
    MeshUpdateResult {
        p,
        status: MeshUpdateStatus::Built,
        mesh: Some(MapBlockMesh::new(&data, ctx)),
        ack_block_to_server,
    }
}

#[cfg(test)]
mod tests {
    use cgmath::Point3;

    use super::*;
    use crate::{
        core::{settings::MeshSettings, time_source::ManualClock},
        engine_state::{
            rendering::{
                meshing::prebaked::MeshRegistry,
                texture::{ShaderRegistry, TextureRegistry},
            },
            voxels::{
                block::MapNode, map_block::MapBlock, node_registry::NodeRegistry,
            },
        },
    };

    const TIMEOUT: Duration = Duration::from_secs(10);

    fn manager(map: &Map) -> MeshUpdateManager {
        let textures = Arc::new(TextureRegistry::new());
        let ctx = MeshContext::new(
            map.registry().clone(),
            textures,
            Arc::new(MeshRegistry::new()),
            MeshSettings::default(),
        );
        let settings = SchedulerSettings {
            cache_size_kb: 20480,
            generation_interval_ms: 0,
        };
        MeshUpdateManager::new(Arc::new(ctx), settings, Arc::new(ManualClock::new(0)))
    }

    fn map() -> Map {
        let mut registry = NodeRegistry::new();
        registry.update_textures(
            &TextureRegistry::new(),
            &ShaderRegistry::new(),
            &MeshSettings::default(),
        );
        let mut map = Map::new(Arc::new(registry));
        map.insert_block(MapBlock::filled(Point3::new(0, 0, 0), MapNode::air()));
        map
    }

    #[test]
    fn queued_blocks_come_back_built() {
        let map = map();
        let mut manager = manager(&map);
        manager.update_block(&map, Point3::new(0, 0, 0), true, false, false);

        let result = manager.recv_result_timeout(TIMEOUT).unwrap();
        assert_eq!(result.p, Point3::new(0, 0, 0));
        assert_eq!(result.status, MeshUpdateStatus::Built);
        assert!(result.ack_block_to_server);
        assert!(result.mesh.unwrap().is_empty());
        manager.stop();
        assert!(!manager.is_running());
    }

    #[test]
    fn missing_blocks_are_reported() {
        let map = map();
        let manager = manager(&map);
        manager.update_block(&map, Point3::new(3, 0, 0), false, false, false);
        let result = manager.recv_result_timeout(TIMEOUT).unwrap();
        assert_eq!(result.status, MeshUpdateStatus::CenterBlockMissing);
        assert!(result.mesh.is_none());
    }

    #[test]
    fn neighbor_updates_skip_absent_blocks() {
        let mut map = map();
        map.insert_block(MapBlock::filled(Point3::new(1, 0, 0), MapNode::air()));
        let manager = manager(&map);
        manager.update_block(&map, Point3::new(0, 0, 0), false, true, true);

        let mut seen = vec![
            manager.recv_result_timeout(TIMEOUT).unwrap().p,
            manager.recv_result_timeout(TIMEOUT).unwrap().p,
        ];
        seen.sort_by_key(|p| p.x);
        assert_eq!(seen, vec![Point3::new(0, 0, 0), Point3::new(1, 0, 0)]);
        assert!(manager.recv_result_timeout(Duration::from_millis(200)).is_none());
    }

    #[test]
    fn stop_frees_the_cache() {
        let map = map();
        let mut manager = manager(&map);
        manager.update_block(&map, Point3::new(0, 0, 0), false, false, false);
        manager.recv_result_timeout(TIMEOUT).unwrap();
        manager.stop();
        assert_eq!(manager.stats().cached_blocks, 0);
        assert_eq!(manager.queue_len(), 0);
    }
}
