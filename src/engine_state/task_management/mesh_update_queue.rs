//! # Mesh Update Queue
//!
//! Jobs waiting for the mesh worker, plus a cache of block cell copies the
//! jobs are assembled from.
//!
//! ## Cache
//! Enqueueing a block copies its cells into the cache (always, so edits are
//! picked up, even when the job merges into a waiting one) and copies each
//! resident neighbor unless a copy is already cached. Every queued job holds
//! one reference on each cached block it will read; `pop` releases them
//! while it assembles the job's snapshot.
//!
//! Entries nobody references are evicted once they have not been used for
//! a while. The allowed age shrinks from 10 seconds toward 2 as the cache
//! approaches its soft size limit.
//!
//! ## Ordering
//! Jobs leave in the order they were queued, except that while any urgent
//! job is waiting only urgent jobs are returned. Queueing a block that is
//! already waiting merges into the waiting job.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex},
};

use cgmath::{Point3, Vector3};
use log::{trace, warn};

use crate::{
    core::{settings::SchedulerSettings, time_source::TimeSource},
    engine_state::{
        rendering::meshing::mesh_make_data::MeshMakeData,
        voxels::{block::MapNode, world::Map, BlockPos, NodePos, MAP_BLOCK_VOLUME},
    },
};

/// Size of one cached block in kilobytes.
const MAPBLOCK_KB: u64 = (MAP_BLOCK_VOLUME * std::mem::size_of::<MapNode>() / 1000) as u64;

/// Longest time an unreferenced entry may stay cached, in seconds.
const CACHE_SECONDS_MAX: u64 = 10;

/// Shortest time an unreferenced entry stays cached, in seconds.
const CACHE_SECONDS_MIN: u64 = 2;

/// A cached copy of one block's cells.
#[derive(Debug)]
struct CachedBlockData {
    /// `None` if the block was not resident when it was cached
    data: Option<Vec<MapNode>>,
    refcount_from_queue: u32,
    last_used_ms: u64,
}

/// A job waiting in the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
struct QueuedMeshUpdate {
    p: BlockPos,
    ack_block_to_server: bool,
    crack_level: i32,
    crack_pos: NodePos,
    /// Cached blocks this job holds a reference on
    referenced: Vec<BlockPos>,
}

/// A job ready for the mesh builder.
#[derive(Debug)]
pub struct MeshUpdateJob {
    /// Block to mesh
    pub p: BlockPos,
    /// Whether the result should be acknowledged to the logic layer
    pub ack_block_to_server: bool,
    /// Snapshot of the block and its neighbors
    pub data: MeshMakeData,
}

/// Counters describing the queue and its cache.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct MeshQueueStats {
    /// Jobs waiting
    pub queued: usize,
    /// Urgent jobs waiting
    pub urgent: usize,
    /// Blocks cached
    pub cached_blocks: usize,
    /// Approximate size of the cached cells in kilobytes
    pub cache_size_kb: u64,
    /// Neighbor lookups served by an existing copy
    pub cache_hits: u64,
    /// Blocks copied from the map because no copy was cached yet
    pub cache_misses: u64,
}

#[derive(Debug)]
struct QueueState {
    queue: VecDeque<QueuedMeshUpdate>,
    urgents: HashSet<BlockPos>,
    cache: HashMap<BlockPos, CachedBlockData>,
    crack_level: i32,
    crack_pos: NodePos,
    cache_hits: u64,
    cache_misses: u64,
}

/// Thread-safe queue of mesh jobs with its block cache.
pub struct MeshUpdateQueue {
    state: Mutex<QueueState>,
    clock: Arc<dyn TimeSource>,
    settings: SchedulerSettings,
    smooth_lighting: bool,
    use_shaders: bool,
}

impl std::fmt::Debug for MeshUpdateQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshUpdateQueue")
            .field("stats", &self.stats())
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn neighborhood() -> impl Iterator<Item = Vector3<i32>> {
    (-1..=1).flat_map(|z| (-1..=1).flat_map(move |y| (-1..=1).map(move |x| Vector3::new(x, y, z))))
}

impl MeshUpdateQueue {
    /// Creates an empty queue.
    ///
    /// # Arguments
    /// * `settings` - Cache size
    /// * `clock` - Time source for cache ages
    /// * `smooth_lighting` - Lighting mode put into every snapshot
    /// * `use_shaders` - Shader mode put into every snapshot
    pub fn new(
        settings: SchedulerSettings,
        clock: Arc<dyn TimeSource>,
        smooth_lighting: bool,
        use_shaders: bool,
    ) -> Self {
        MeshUpdateQueue {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                urgents: HashSet::new(),
                cache: HashMap::new(),
                crack_level: -1,
                crack_pos: Point3::new(0, 0, 0),
                cache_hits: 0,
                cache_misses: 0,
            }),
            clock,
            settings,
            smooth_lighting,
            use_shaders,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sets the crack attached to jobs queued from now on.
    pub fn set_crack(&self, level: i32, pos: NodePos) {
        let mut state = self.lock();
        state.crack_level = level;
        state.crack_pos = pos;
    }

    /// Queues a mesh build for a block.
    ///
    /// # Arguments
    /// * `map` - Map the cells are copied from
    /// * `p` - Block to mesh
    /// * `ack_block_to_server` - Acknowledge the block once meshed
    /// * `urgent` - Build before every non-urgent job
    ///
    /// # Returns
    /// `true` if a new job was queued, `false` if it merged into a waiting one.
    pub fn add_block(&self, map: &Map, p: BlockPos, ack_block_to_server: bool, urgent: bool) -> bool {
        let now = self.clock.now_ms();
        let mut state = self.lock();
        self.cleanup_cache(&mut state, now);

        if urgent {
            state.urgents.insert(p);
        }

        let mut referenced = Vec::with_capacity(27);
        for dp in neighborhood() {
            let p1 = p + dp;
            let is_center = dp == Vector3::new(0, 0, 0);
            if !is_center && map.get_block_no_create_no_ex(p1).is_none() {
                continue;
            }
            Self::cache_block(&mut state, map, p1, is_center, now);
            referenced.push(p1);
        }

        let (crack_level, crack_pos) = (state.crack_level, state.crack_pos);
        if let Some(q) = state.queue.iter_mut().find(|q| q.p == p) {
            q.ack_block_to_server |= ack_block_to_server;
            q.crack_level = crack_level;
            q.crack_pos = crack_pos;
            return false;
        }

        for p1 in &referenced {
            if let Some(cached) = state.cache.get_mut(p1) {
                cached.refcount_from_queue += 1;
            }
        }
        state.queue.push_back(QueuedMeshUpdate {
            p,
            ack_block_to_server,
            crack_level,
            crack_pos,
            referenced,
        });
        true
    }

    /// Copies a block into the cache.
    ///
    /// # Arguments
    /// * `force_update` - Replace an existing copy
    fn cache_block(state: &mut QueueState, map: &Map, p: BlockPos, force_update: bool, now: u64) {
        let cached = state.cache.contains_key(&p);
        if !cached {
            state.cache_misses += 1;
        } else if !force_update {
            state.cache_hits += 1;
        }
        let entry = state.cache.entry(p).or_insert_with(|| CachedBlockData {
            data: None,
            refcount_from_queue: 0,
            last_used_ms: now,
        });
        if !cached || force_update {
            entry.data = map
                .get_block_no_create_no_ex(p)
                .map(|block| block.nodes().to_vec());
            entry.last_used_ms = now;
        }
    }

    /// Evicts unreferenced entries that have not been used recently.
    fn cleanup_cache(&self, state: &mut QueueState, now: u64) {
        let soft_max = (self.settings.cache_size_kb as u64 / MAPBLOCK_KB.max(1)).max(1);
        let size = state.cache.len() as u64;
        let fill = size * CACHE_SECONDS_MAX / soft_max;
        let ttl_ms = CACHE_SECONDS_MAX.saturating_sub(fill).max(CACHE_SECONDS_MIN) * 1000;

        let before = state.cache.len();
        state.cache.retain(|_, cached| {
            cached.refcount_from_queue > 0 || now.saturating_sub(cached.last_used_ms) <= ttl_ms
        });
        let evicted = before - state.cache.len();
        if evicted > 0 {
            trace!("Mesh queue evicted {evicted} cached blocks, ttl {ttl_ms} ms");
        }
    }

    /// Takes the next job, urgent ones first, and assembles its snapshot.
    pub fn pop(&self) -> Option<MeshUpdateJob> {
        let now = self.clock.now_ms();
        let mut state = self.lock();
        let must_be_urgent = !state.urgents.is_empty();
        let index = state
            .queue
            .iter()
            .position(|q| !must_be_urgent || state.urgents.contains(&q.p))
            .or_else(|| {
                // Urgent marks whose job already left are stale.
                state.urgents.clear();
                (!state.queue.is_empty()).then_some(0)
            })?;
        let q = state.queue.remove(index)?;
        state.urgents.remove(&q.p);

        let mut data = MeshMakeData::new(q.p, self.use_shaders);
        for p1 in &q.referenced {
            let Some(cached) = state.cache.get_mut(p1) else {
                warn!("Cached block {p1:?} evicted while referenced");
                continue;
            };
            if cached.refcount_from_queue == 0 {
                warn!("Cached block {p1:?} released more often than referenced");
            } else {
                cached.refcount_from_queue -= 1;
            }
        }
        for dp in neighborhood() {
            let Some(cached) = state.cache.get_mut(&(q.p + dp)) else {
                continue;
            };
            cached.last_used_ms = now;
            if let Some(nodes) = &cached.data {
                data.fill_block_data(dp, nodes);
            }
        }
        data.set_crack(q.crack_level, q.crack_pos);
        data.set_smooth_lighting(self.smooth_lighting);

        Some(MeshUpdateJob {
            p: q.p,
            ack_block_to_server: q.ack_block_to_server,
            data,
        })
    }

    /// Number of waiting jobs.
    pub fn size(&self) -> usize {
        self.lock().queue.len()
    }

    /// Number of waiting jobs that reference a cached block.
    pub fn cached_refcount(&self, p: BlockPos) -> Option<u32> {
        self.lock().cache.get(&p).map(|c| c.refcount_from_queue)
    }

    /// Current counters.
    pub fn stats(&self) -> MeshQueueStats {
        let state = self.lock();
        MeshQueueStats {
            queued: state.queue.len(),
            urgent: state.urgents.len(),
            cached_blocks: state.cache.len(),
            cache_size_kb: state.cache.values().filter(|c| c.data.is_some()).count() as u64
                * MAPBLOCK_KB,
            cache_hits: state.cache_hits,
            cache_misses: state.cache_misses,
        }
    }

    /// Drops every waiting job and cached block.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.queue.clear();
        state.urgents.clear();
        state.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        core::time_source::ManualClock,
        engine_state::voxels::{
            block::{CONTENT_AIR, CONTENT_UNKNOWN},
            map_block::MapBlock,
            node_registry::NodeRegistry,
        },
    };

    fn map_with_blocks(positions: &[BlockPos]) -> Map {
        let mut map = Map::new(Arc::new(NodeRegistry::new()));
        for p in positions {
            map.insert_block(MapBlock::filled(*p, MapNode::new(CONTENT_AIR)));
        }
        map
    }

    fn queue(clock: Arc<ManualClock>) -> MeshUpdateQueue {
        let settings = SchedulerSettings {
            cache_size_kb: 20480,
            generation_interval_ms: 0,
        };
        MeshUpdateQueue::new(settings, clock, false, true)
    }

    #[test]
    fn repeated_adds_coalesce() {
        let clock = Arc::new(ManualClock::new(0));
        let q = queue(clock);
        let p = Point3::new(0, 0, 0);
        let map = map_with_blocks(&[p]);
        assert!(q.add_block(&map, p, false, false));
        assert!(!q.add_block(&map, p, true, false));
        assert_eq!(q.size(), 1);
        assert_eq!(q.cached_refcount(p), Some(1));

        let job = q.pop().unwrap();
        assert!(job.ack_block_to_server);
        assert!(job.data.has_center_block());
        assert!(q.pop().is_none());
        assert_eq!(q.cached_refcount(p), Some(0));
    }

    #[test]
    fn merged_requests_pick_up_later_edits() {
        let clock = Arc::new(ManualClock::new(0));
        let q = queue(clock);
        let p = Point3::new(0, 0, 0);
        let mut map = map_with_blocks(&[p]);
        assert!(q.add_block(&map, p, false, false));
        map.set_node(Point3::new(3, 3, 3), MapNode::new(CONTENT_UNKNOWN));
        assert!(!q.add_block(&map, p, false, false));
        assert_eq!(q.cached_refcount(p), Some(1));

        let job = q.pop().unwrap();
        assert_eq!(job.data.vmanip.get_node(Point3::new(3, 3, 3)).content, CONTENT_UNKNOWN);
        assert_eq!(q.cached_refcount(p), Some(0));
    }

    #[test]
    fn neighbors_cached_after_queueing_are_not_released() {
        let clock = Arc::new(ManualClock::new(0));
        let q = queue(clock);
        let a = Point3::new(0, 0, 0);
        let b = Point3::new(1, 0, 0);
        let far = Point3::new(2, 0, 0);
        let mut map = map_with_blocks(&[a]);
        q.add_block(&map, a, false, false);
        map.insert_block(MapBlock::filled(b, MapNode::new(CONTENT_AIR)));
        map.insert_block(MapBlock::filled(far, MapNode::new(CONTENT_AIR)));
        q.add_block(&map, far, false, false);
        assert_eq!(q.cached_refcount(b), Some(1));

        assert_eq!(q.pop().unwrap().p, a);
        assert_eq!(q.cached_refcount(b), Some(1));
        assert_eq!(q.pop().unwrap().p, far);
        assert_eq!(q.cached_refcount(b), Some(0));
    }

    #[test]
    fn urgent_jobs_jump_the_queue() {
        let clock = Arc::new(ManualClock::new(0));
        let q = queue(clock);
        let a = Point3::new(0, 0, 0);
        let b = Point3::new(5, 0, 0);
        let map = map_with_blocks(&[a, b]);
        q.add_block(&map, a, false, false);
        q.add_block(&map, b, false, true);
        assert_eq!(q.pop().unwrap().p, b);
        assert_eq!(q.pop().unwrap().p, a);
    }

    #[test]
    fn neighbors_are_shared_through_the_cache() {
        let clock = Arc::new(ManualClock::new(0));
        let q = queue(clock);
        let a = Point3::new(0, 0, 0);
        let b = Point3::new(1, 0, 0);
        let map = map_with_blocks(&[a, b]);
        q.add_block(&map, a, false, false);
        q.add_block(&map, b, false, false);
        let stats = q.stats();
        assert_eq!(stats.cached_blocks, 2);
        // `a` and `b` were both copied once; `a` as neighbor of `b` was a hit.
        assert_eq!((stats.cache_hits, stats.cache_misses), (1, 2));
        assert_eq!(q.cached_refcount(a), Some(2));
    }

    #[test]
    fn stale_entries_are_evicted() {
        let clock = Arc::new(ManualClock::new(0));
        let q = queue(clock.clone());
        let a = Point3::new(0, 0, 0);
        let b = Point3::new(10, 0, 0);
        let map = map_with_blocks(&[a, b]);
        q.add_block(&map, a, false, false);
        q.pop().unwrap();

        clock.advance(5_000);
        q.add_block(&map, b, false, false);
        assert!(q.cached_refcount(a).is_some());

        clock.advance(6_000);
        q.pop().unwrap();
        q.add_block(&map, b, false, false);
        assert!(q.cached_refcount(a).is_none());
        assert_eq!(q.stats().cached_blocks, 1);
    }

    #[test]
    fn referenced_entries_survive_cleanup() {
        let clock = Arc::new(ManualClock::new(0));
        let q = queue(clock.clone());
        let a = Point3::new(0, 0, 0);
        let b = Point3::new(10, 0, 0);
        let map = map_with_blocks(&[a, b]);
        q.add_block(&map, a, false, false);
        clock.advance(60_000);
        q.add_block(&map, b, false, false);
        assert_eq!(q.cached_refcount(a), Some(1));
    }

    #[test]
    fn snapshot_carries_the_crack() {
        let clock = Arc::new(ManualClock::new(0));
        let q = queue(clock);
        let p = Point3::new(0, 0, 0);
        let map = map_with_blocks(&[p]);
        q.set_crack(2, Point3::new(3, 4, 5));
        q.add_block(&map, p, false, false);
        let job = q.pop().unwrap();
        assert_eq!(job.data.crack_level, 2);
        assert_eq!(job.data.crack_pos_relative, Some(Point3::new(3, 4, 5)));
    }
}
