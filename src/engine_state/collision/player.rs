//! # Player Controller
//!
//! The local player's position and speed, advanced every engine step
//! against the map. Movement runs in sub-steps short enough that the
//! player never moves more than `POSITION_MAX_INCREMENT` per call into
//! the collision resolver.
//!
//! Three movement paths exist:
//! - `free_move` together with `noclip` moves straight through everything
//! - `new_move` (the default) uses `collision_move_simple`
//! - otherwise the legacy resolver sweeps each axis on its own against the
//!   nodes the box covers; kept for replays recorded with it

use cgmath::{InnerSpace, Point3, Vector3};
use log::trace;

use super::{
    aabb::Aabb, collision_move_simple, CollisionEnvironment, CollisionInfo, CollisionMoveResult,
};
use crate::{
    core::settings::MovementSettings,
    engine_state::voxels::{block::CONTENT_IGNORE, float_to_node, node_to_float, NodePos, BS},
};

/// Downward acceleration in world units per second squared.
pub const GRAVITY: f32 = 9.81 * BS;

/// Longest distance moved per collision sub-step.
const POSITION_MAX_INCREMENT: f32 = 0.1 * BS;

/// Step height while airborne.
const AIRBORNE_STEPHEIGHT: f32 = 0.2 * BS;

/// The local player's movement state.
#[derive(Clone, Debug)]
pub struct PlayerController {
    position: Vector3<f32>,
    speed: Vector3<f32>,
    collision_box: Aabb,
    settings: MovementSettings,
    touching_ground: bool,
    standing_on_object: bool,
    collisions: Vec<CollisionInfo>,
}

impl PlayerController {
    /// Creates a player standing still.
    ///
    /// # Arguments
    /// * `position` - Feet position in world units
    /// * `settings` - Movement modes and step height
    pub fn new(position: Vector3<f32>, settings: MovementSettings) -> Self {
        PlayerController {
            position,
            speed: Vector3::new(0.0, 0.0, 0.0),
            collision_box: Aabb::new(Vector3::new(-0.3, 0.0, -0.3), Vector3::new(0.3, 1.7, 0.3))
                .scaled(BS),
            settings,
            touching_ground: false,
            standing_on_object: false,
            collisions: Vec::new(),
        }
    }

    /// Feet position in world units.
    pub fn position(&self) -> Vector3<f32> {
        self.position
    }

    /// Teleports the player.
    pub fn set_position(&mut self, position: Vector3<f32>) {
        self.position = position;
    }

    /// Velocity in world units per second.
    pub fn speed(&self) -> Vector3<f32> {
        self.speed
    }

    /// Sets the velocity, e.g. from movement input.
    pub fn set_speed(&mut self, speed: Vector3<f32>) {
        self.speed = speed;
    }

    /// Collision box relative to the feet position.
    pub fn collision_box(&self) -> Aabb {
        self.collision_box
    }

    /// Whether the last step ended on the ground.
    pub fn touching_ground(&self) -> bool {
        self.touching_ground
    }

    /// Whether the ground under the player is an object.
    pub fn standing_on_object(&self) -> bool {
        self.standing_on_object
    }

    /// Impacts of the last step.
    pub fn collisions(&self) -> &[CollisionInfo] {
        &self.collisions
    }

    /// Movement settings in use.
    pub fn settings(&self) -> &MovementSettings {
        &self.settings
    }

    /// Replaces the movement settings.
    pub fn set_settings(&mut self, settings: MovementSettings) {
        self.settings = settings;
    }

    /// Node the player's feet are in.
    pub fn node_pos(&self) -> NodePos {
        float_to_node(self.position)
    }

    /// Advances the player by `dtime` seconds, applying gravity unless
    /// flying.
    pub fn step(&mut self, env: &dyn CollisionEnvironment, dtime: f32) {
        self.collisions.clear();
        let mut remaining = dtime;
        while remaining > 0.0 {
            let speed = self.speed.magnitude();
            let max_increment = if speed > 0.001 {
                POSITION_MAX_INCREMENT / speed
            } else {
                remaining
            };
            let dtime_part = remaining.min(max_increment);
            remaining -= dtime_part;

            let accel = if self.settings.free_move {
                Vector3::new(0.0, 0.0, 0.0)
            } else {
                Vector3::new(0.0, -GRAVITY, 0.0)
            };
            let result = self.move_by(env, dtime_part, accel);
            self.collisions.extend(result.collisions);
        }
    }

    /// Moves once without sub-stepping.
    ///
    /// # Arguments
    /// * `env` - Map and objects to collide with
    /// * `dtime` - Length of the move in seconds
    /// * `accel` - Acceleration applied before moving
    pub fn move_by(
        &mut self,
        env: &dyn CollisionEnvironment,
        dtime: f32,
        accel: Vector3<f32>,
    ) -> CollisionMoveResult {
        if self.settings.free_move && self.settings.noclip {
            self.speed += accel * dtime;
            self.position += self.speed * dtime;
            self.touching_ground = false;
            self.standing_on_object = false;
            return CollisionMoveResult::default();
        }

        if !self.settings.new_move {
            return self.old_move(env, dtime, accel);
        }

        let stepheight = if self.touching_ground {
            self.settings.stepheight * BS
        } else {
            AIRBORNE_STEPHEIGHT
        };
        let result = collision_move_simple(
            env,
            POSITION_MAX_INCREMENT,
            &self.collision_box,
            stepheight,
            dtime,
            &mut self.position,
            &mut self.speed,
            accel,
            None,
            true,
        );
        self.touching_ground = result.touching_ground;
        self.standing_on_object = result.standing_on_object;
        result
    }

    /// Legacy movement: sweeps Y, then X, then Z, each against the world
    /// boxes the moved box would overlap.
    fn old_move(
        &mut self,
        env: &dyn CollisionEnvironment,
        dtime: f32,
        accel: Vector3<f32>,
    ) -> CollisionMoveResult {
        let mut result = CollisionMoveResult::default();
        self.speed += accel * dtime;
        let boxes = world_boxes_around(env, &self.collision_box, self.position, self.speed * dtime);

        for axis in [1, 0, 2] {
            let delta = self.speed[axis] * dtime;
            if delta == 0.0 {
                continue;
            }
            let mut moved = self.collision_box.translated(self.position);
            moved.min[axis] += delta;
            moved.max[axis] += delta;

            let mut allowed = delta;
            for b in boxes.iter().filter(|b| b.intersects(&moved)) {
                let current = self.collision_box.translated(self.position);
                let limit = if delta > 0.0 {
                    b.min[axis] - current.max[axis]
                } else {
                    b.max[axis] - current.min[axis]
                };
                // Already inside the box on this axis.
                if limit * delta < 0.0 {
                    continue;
                }
                if limit.abs() < allowed.abs() {
                    allowed = limit;
                }
            }

            self.position[axis] += allowed;
            if allowed != delta {
                if axis == 1 && delta < 0.0 {
                    result.touching_ground = true;
                }
                self.speed[axis] = 0.0;
                result.collides = true;
            }
        }

        self.touching_ground = result.touching_ground;
        self.standing_on_object = false;
        if result.collides {
            trace!("Legacy move blocked at {:?}", self.position);
        }
        result
    }
}

/// Collision boxes of every walkable or unloaded node a move may touch,
/// in world units.
fn world_boxes_around(
    env: &dyn CollisionEnvironment,
    box_0: &Aabb,
    pos: Vector3<f32>,
    delta: Vector3<f32>,
) -> Vec<Aabb> {
    let map = env.map();
    let registry = env.registry();
    let swept = box_0.translated(pos).union(&box_0.translated(pos + delta));
    let lo = swept.min / BS;
    let hi = swept.max / BS;
    let min = Point3::new(lo.x.round() as i32, lo.y.round() as i32, lo.z.round() as i32);
    let max = Point3::new(hi.x.round() as i32, hi.y.round() as i32, hi.z.round() as i32);

    let mut boxes = Vec::new();
    for z in min.z..=max.z {
        for y in min.y..=max.y {
            for x in min.x..=max.x {
                let p = Point3::new(x, y, z);
                let origin = node_to_float(p);
                match map.get_node_checked(p) {
                    Some(n) if n.content != CONTENT_IGNORE => {
                        let f = registry.get_node(&n);
                        boxes.extend(
                            f.collision_boxes(&n, 0)
                                .iter()
                                .map(|b| b.scaled(BS).translated(origin)),
                        );
                    }
                    _ => boxes.push(Aabb::unit().scaled(BS).translated(origin)),
                }
            }
        }
    }
    boxes
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine_state::voxels::{
        block::MapNode, map_block::MapBlock, node_registry::NodeRegistry, world::Map,
    };

    fn world() -> Map {
        let registry =
            NodeRegistry::from_json(r#"[{"name": "stone", "tiles": ["stone.png"]}]"#).unwrap();
        let stone = registry.get_id("stone").unwrap();
        let mut map = Map::new(Arc::new(registry));
        for z in -1..=0 {
            for y in -1..=0 {
                for x in -1..=0 {
                    map.insert_block(MapBlock::filled(Point3::new(x, y, z), MapNode::air()));
                }
            }
        }
        for z in -8..8 {
            for x in -8..8 {
                map.set_node(Point3::new(x, -1, z), MapNode::new(stone));
            }
        }
        map
    }

    fn settings(free_move: bool, noclip: bool, new_move: bool) -> MovementSettings {
        MovementSettings {
            free_move,
            noclip,
            new_move,
            stepheight: 0.6,
        }
    }

    #[test]
    fn gravity_settles_the_player_on_the_floor() {
        let map = world();
        let mut player = PlayerController::new(Vector3::new(0.0, 20.0, 0.0), settings(false, false, true));
        for _ in 0..60 {
            player.step(&map, 0.05);
        }
        assert!((player.position().y + 5.0).abs() < 1e-2);
        assert!(player.touching_ground());
        assert_eq!(player.speed().y, 0.0);
    }

    #[test]
    fn noclip_flies_through_the_floor() {
        let map = world();
        let mut player = PlayerController::new(Vector3::new(0.0, 0.0, 0.0), settings(true, true, true));
        player.set_speed(Vector3::new(0.0, -50.0, 0.0));
        player.step(&map, 1.0);
        assert!((player.position().y + 50.0).abs() < 1e-3);
        assert!(!player.touching_ground());
    }

    #[test]
    fn free_move_without_noclip_still_collides() {
        let map = world();
        let mut player = PlayerController::new(Vector3::new(0.0, 0.0, 0.0), settings(true, false, true));
        player.set_speed(Vector3::new(0.0, -50.0, 0.0));
        player.step(&map, 1.0);
        assert!((player.position().y + 5.0).abs() < 1e-2);
    }

    #[test]
    fn legacy_move_lands_on_the_floor() {
        let map = world();
        let mut player = PlayerController::new(Vector3::new(0.0, 20.0, 0.0), settings(false, false, false));
        for _ in 0..60 {
            player.step(&map, 0.05);
        }
        assert!((player.position().y + 5.0).abs() < 1e-2);
        assert!(player.touching_ground());
    }
}
