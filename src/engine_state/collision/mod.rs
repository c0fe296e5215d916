//! # Collision
//!
//! Swept axis-aligned box movement against the voxel world and other
//! objects. `collision_move_simple` advances one box by one time step:
//! it gathers every node and object box the movement could touch, then
//! repeatedly jumps to the nearest impact, cancels (or reflects) the
//! colliding speed component and continues with the remaining time.
//!
//! ## Step-up
//! A horizontal impact against a box whose top is less than `stepheight`
//! above the moving box's bottom is not treated as a collision. The box is
//! marked stepped-up and ignored for the rest of the step; once the sweep
//! finishes the moving box is lifted onto it.
//!
//! ## Unloaded map
//! Cells that are not resident, or hold `CONTENT_IGNORE`, collide as full
//! cubes. If nothing but such cells surrounds the box it does not move at
//! all and its speed is zeroed.

pub mod aabb;
pub mod player;

use cgmath::{InnerSpace, Point3, Vector3};
use log::warn;

use aabb::Aabb;

use crate::engine_state::voxels::{
    block::{block_side::BlockSide, CONTENT_IGNORE},
    float_to_node, node_to_float,
    node_registry::NodeRegistry,
    world::Map,
    NodePos, BS,
};

/// Identifier of an active object.
pub type ObjectId = u16;

/// Largest speed component, in world units per second.
const SPEED_LIMIT: f32 = 5000.0;

/// Speeds and offsets are truncated to multiples of `1 / QUANTIZATION`.
const QUANTIZATION: f32 = 10000.0;

/// Upper bound on impacts resolved in a single step.
const MAX_ITERATIONS: u32 = 100;

/// Impacts faster than this bounce off bouncy nodes.
const BOUNCE_MIN_SPEED: f32 = 3.0 * BS;

/// Maximum gap between box bottom and ground top to count as standing.
const GROUND_TOLERANCE: f32 = 0.05;

/// Deepest overlap, in world units, still resolved as an impact.
const MAX_INNER_MARGIN: f32 = 2.0;

/// An active object's collision shape as seen by other movers.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CollisionObject {
    /// Object identity
    pub id: ObjectId,
    /// Collision box in world units
    pub collision_box: Aabb,
}

/// What a mover collides against.
pub trait CollisionEnvironment {
    /// The voxel map.
    fn map(&self) -> &Map;

    /// Node definitions of the map.
    fn registry(&self) -> &NodeRegistry {
        self.map().registry()
    }

    /// Objects whose position lies within `radius` of `center`.
    fn objects_inside_radius(&self, center: Vector3<f32>, radius: f32) -> Vec<CollisionObject>;
}

impl CollisionEnvironment for Map {
    fn map(&self) -> &Map {
        self
    }

    fn objects_inside_radius(&self, _center: Vector3<f32>, _radius: f32) -> Vec<CollisionObject> {
        Vec::new()
    }
}

/// Axis of an impact.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum CollisionAxis {
    /// Along X
    X,
    /// Along Y
    Y,
    /// Along Z
    Z,
}

impl CollisionAxis {
    const ALL: [CollisionAxis; 3] = [CollisionAxis::X, CollisionAxis::Y, CollisionAxis::Z];

    fn index(self) -> usize {
        self as usize
    }
}

/// What was hit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CollisionTarget {
    /// A node
    Node(NodePos),
    /// An active object
    Object(ObjectId),
}

/// One resolved impact.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct CollisionInfo {
    /// What was hit
    pub target: CollisionTarget,
    /// Axis of the impact
    pub axis: CollisionAxis,
    /// Speed before the impact
    pub old_speed: Vector3<f32>,
    /// Speed after the impact
    pub new_speed: Vector3<f32>,
}

/// Outcome of `collision_move_simple`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CollisionMoveResult {
    /// The box rests on something
    pub touching_ground: bool,
    /// Some speed component was cancelled or reflected
    pub collides: bool,
    /// The box rests on an object
    pub standing_on_object: bool,
    /// Every impact that changed the speed noticeably
    pub collisions: Vec<CollisionInfo>,
}

/// A candidate box gathered in the broadphase.
#[derive(Copy, Clone, Debug)]
struct NearbyCollisionInfo {
    target: CollisionTarget,
    box_: Aabb,
    bouncy: i32,
    is_unloaded: bool,
    is_step_up: bool,
}

fn component(v: Vector3<f32>, axis: usize) -> f32 {
    match axis {
        0 => v.x,
        1 => v.y,
        _ => v.z,
    }
}

fn component_mut(v: &mut Vector3<f32>, axis: usize) -> &mut f32 {
    match axis {
        0 => &mut v.x,
        1 => &mut v.y,
        _ => &mut v.z,
    }
}

fn truncate(v: Vector3<f32>) -> Vector3<f32> {
    v.map(|c| (c * QUANTIZATION).trunc() / QUANTIZATION)
}

/// Time until a moving box first hits a static one.
///
/// # Arguments
/// * `staticbox` - The obstacle
/// * `movingbox` - The mover at the start of the interval
/// * `speed` - Velocity of the mover
/// * `max_dtime` - Length of the interval
///
/// # Returns
/// The axis and time of the earliest face crossing within `max_dtime`
/// during which the boxes overlap on the other two axes, or `None`.
pub fn axis_aligned_collision(
    staticbox: &Aabb,
    movingbox: &Aabb,
    speed: Vector3<f32>,
    max_dtime: f32,
) -> Option<(CollisionAxis, f32)> {
    let mut nearest: Option<(CollisionAxis, f32)> = None;
    for axis in CollisionAxis::ALL {
        let i = axis.index();
        let v = component(speed, i);
        if v == 0.0 {
            continue;
        }
        let thickness = component(staticbox.extent(), i);
        let inner_margin = (-0.5 * thickness).max(-MAX_INNER_MARGIN);
        let gap = if v > 0.0 {
            component(staticbox.min, i) - component(movingbox.max, i)
        } else {
            component(movingbox.min, i) - component(staticbox.max, i)
        };
        if gap <= inner_margin {
            continue;
        }
        let time = gap.max(0.0) / v.abs();
        if time > max_dtime || nearest.is_some_and(|(_, t)| time >= t) {
            continue;
        }

        let overlaps = (0..3).filter(|&j| j != i).all(|j| {
            let offset = component(speed, j) * time;
            component(movingbox.min, j) + offset < component(staticbox.max, j)
                && component(movingbox.max, j) + offset > component(staticbox.min, j)
        });
        if overlaps {
            nearest = Some((axis, time));
        }
    }
    nearest
}

/// Whether lifting `movingbox` by `y_increase` would hit a box above it.
fn would_collide_with_ceiling(
    cinfo: &[NearbyCollisionInfo],
    movingbox: &Aabb,
    y_increase: f32,
    d: f32,
) -> bool {
    cinfo.iter().any(|info| {
        let s = &info.box_;
        movingbox.max.y - d <= s.min.y
            && movingbox.max.y + y_increase > s.min.y
            && movingbox.min.x < s.max.x
            && movingbox.max.x > s.min.x
            && movingbox.min.z < s.max.z
            && movingbox.max.z > s.min.z
    })
}

/// Node and object boxes a movement could touch.
///
/// # Returns
/// The candidates and whether any of the covered cells was resident.
fn collect_candidates(
    env: &dyn CollisionEnvironment,
    box_0: &Aabb,
    pos: Vector3<f32>,
    speed: Vector3<f32>,
    dtime: f32,
    self_id: Option<ObjectId>,
    collide_with_objects: bool,
) -> (Vec<NearbyCollisionInfo>, bool) {
    let map = env.map();
    let registry = env.registry();
    let newpos = pos + speed * dtime;
    let start = float_to_node(pos);
    let end = float_to_node(newpos);
    let min = Point3::new(
        start.x.min(end.x) + (box_0.min.x / BS).floor() as i32 - 1,
        start.y.min(end.y) + (box_0.min.y / BS).floor() as i32 - 1,
        start.z.min(end.z) + (box_0.min.z / BS).floor() as i32 - 1,
    );
    let max = Point3::new(
        start.x.max(end.x) + (box_0.max.x / BS).ceil() as i32 + 1,
        start.y.max(end.y) + (box_0.max.y / BS).ceil() as i32 + 1,
        start.z.max(end.z) + (box_0.max.z / BS).ceil() as i32 + 1,
    );

    let mut cinfo = Vec::new();
    let mut any_position_valid = false;
    for z in min.z..=max.z {
        for y in min.y..=max.y {
            for x in min.x..=max.x {
                let p = Point3::new(x, y, z);
                let n = match map.get_node_checked(p) {
                    Some(n) if n.content != CONTENT_IGNORE => n,
                    _ => {
                        cinfo.push(NearbyCollisionInfo {
                            target: CollisionTarget::Node(p),
                            box_: Aabb::unit().scaled(BS).translated(node_to_float(p)),
                            bouncy: 0,
                            is_unloaded: true,
                            is_step_up: false,
                        });
                        continue;
                    }
                };
                any_position_valid = true;
                let f = registry.get_node(&n);
                if !f.walkable {
                    continue;
                }

                let mut neighbors = 0;
                if f.node_box.is_connected() {
                    for side in BlockSide::all() {
                        let n2 = map.get_node(p + side.normal());
                        if registry.nodebox_connects(n, n2, side) {
                            neighbors |= side.connect_bit();
                        }
                    }
                }
                let bouncy = f.group("bouncy").abs();
                let origin = node_to_float(p);
                for b in f.collision_boxes(&n, neighbors) {
                    cinfo.push(NearbyCollisionInfo {
                        target: CollisionTarget::Node(p),
                        box_: b.scaled(BS).translated(origin),
                        bouncy,
                        is_unloaded: false,
                        is_step_up: false,
                    });
                }
            }
        }
    }

    if collide_with_objects {
        let radius = speed.magnitude() * dtime + box_0.extent().magnitude() + 1.5 * BS;
        for object in env.objects_inside_radius(pos, radius) {
            if Some(object.id) == self_id {
                continue;
            }
            cinfo.push(NearbyCollisionInfo {
                target: CollisionTarget::Object(object.id),
                box_: object.collision_box,
                bouncy: 0,
                is_unloaded: false,
                is_step_up: false,
            });
        }
    }

    (cinfo, any_position_valid)
}

/// Whether micro-step `loopcount` (counted from 1) is past the cap.
fn iteration_limit_exceeded(loopcount: u32) -> bool {
    loopcount > MAX_ITERATIONS
}

/// Moves a box through the world for one time step.
///
/// # Arguments
/// * `env` - Map and objects to collide with
/// * `pos_max_d` - Largest distance the box may move per step; widens the
///   tolerances of the step-up and ground checks
/// * `box_0` - Collision box relative to `pos`
/// * `stepheight` - Highest obstacle that is stepped onto instead of blocking
/// * `dtime` - Length of the step in seconds
/// * `pos` - Position, updated in place
/// * `speed` - Velocity, updated in place
/// * `accel` - Acceleration applied before moving
/// * `self_id` - The mover's own object id, excluded from object collisions
/// * `collide_with_objects` - Whether other objects block the mover
///
/// # Returns
/// Ground contact and the impacts that happened.
#[allow(clippy::too_many_arguments)]
pub fn collision_move_simple(
    env: &dyn CollisionEnvironment,
    pos_max_d: f32,
    box_0: &Aabb,
    stepheight: f32,
    dtime: f32,
    pos: &mut Vector3<f32>,
    speed: &mut Vector3<f32>,
    accel: Vector3<f32>,
    self_id: Option<ObjectId>,
    collide_with_objects: bool,
) -> CollisionMoveResult {
    let mut result = CollisionMoveResult::default();

    *speed += accel * dtime;
    if speed.magnitude2() == 0.0 {
        return result;
    }
    *speed = truncate(speed.map(|c| c.clamp(-SPEED_LIMIT, SPEED_LIMIT)));

    let (mut cinfo, any_position_valid) =
        collect_candidates(env, box_0, *pos, *speed, dtime, self_id, collide_with_objects);
    if !any_position_valid {
        *speed = Vector3::new(0.0, 0.0, 0.0);
        return result;
    }

    let d = pos_max_d * 1.1;
    let mut dtime = dtime;
    let mut loopcount = 0;
    while dtime > BS * 1e-10 {
        loopcount += 1;
        if iteration_limit_exceeded(loopcount) {
            warn!("collision_move_simple: loop count exceeded, aborting at {pos:?}");
            break;
        }

        let movingbox = box_0.translated(*pos);
        let mut nearest: Option<(usize, CollisionAxis, f32)> = None;
        for (i, info) in cinfo.iter().enumerate() {
            if info.is_step_up {
                continue;
            }
            let limit = nearest.map_or(dtime, |(_, _, t)| t);
            if let Some((axis, t)) = axis_aligned_collision(&info.box_, &movingbox, *speed, limit) {
                if nearest.map_or(true, |(_, _, best)| t < best) {
                    nearest = Some((i, axis, t));
                }
            }
        }

        let Some((index, axis, nearest_dtime)) = nearest else {
            *pos += truncate(*speed * dtime);
            break;
        };

        let cbox = cinfo[index].box_;
        let stepbox = movingbox.translated(Vector3::new(speed.x * dtime, 0.0, speed.z * dtime));
        let step_up = axis != CollisionAxis::Y
            && movingbox.min.y < cbox.max.y
            && movingbox.min.y + stepheight > cbox.max.y
            && !would_collide_with_ceiling(&cinfo, &stepbox, cbox.max.y - movingbox.min.y, d);

        *pos += truncate(*speed * nearest_dtime);
        dtime -= nearest_dtime;

        let old_speed = *speed;
        if step_up {
            cinfo[index].is_step_up = true;
            continue;
        }

        let bounce = -(cinfo[index].bouncy as f32) / 100.0;
        let v = component_mut(speed, axis.index());
        if cinfo[index].bouncy > 0 && v.abs() > BOUNCE_MIN_SPEED {
            *v *= bounce;
        } else {
            *v = 0.0;
        }
        result.collides = true;

        let is_collision =
            !cinfo[index].is_unloaded && (*speed - old_speed).magnitude() >= 0.1 * BS;
        if is_collision {
            result.collisions.push(CollisionInfo {
                target: cinfo[index].target,
                axis,
                old_speed,
                new_speed: *speed,
            });
        }
    }

    let mut box_ = box_0.translated(*pos);
    for info in &cinfo {
        let c = &info.box_;
        let overlaps_xz = c.max.x - d > box_.min.x
            && c.min.x + d < box_.max.x
            && c.max.z - d > box_.min.z
            && c.min.z + d < box_.max.z;
        if !overlaps_xz {
            continue;
        }
        if info.is_step_up {
            pos.y += c.max.y - box_.min.y;
            box_ = box_0.translated(*pos);
        }
        if (c.max.y - box_.min.y).abs() < GROUND_TOLERANCE {
            result.touching_ground = true;
            if matches!(info.target, CollisionTarget::Object(_)) {
                result.standing_on_object = true;
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::engine_state::voxels::{block::MapNode, map_block::MapBlock};

    const DEFS: &str = r#"[
        {"name": "stone", "drawtype": "normal", "tiles": ["stone.png"]},
        {"name": "trampoline", "drawtype": "normal", "tiles": ["stone.png"],
         "groups": {"bouncy": 100}}
    ]"#;

    fn player_box() -> Aabb {
        Aabb::new(Vector3::new(-0.3, 0.0, -0.3), Vector3::new(0.3, 1.7, 0.3)).scaled(BS)
    }

    /// Air everywhere around the origin with a stone floor at y = -1.
    fn world() -> Map {
        let registry = NodeRegistry::from_json(DEFS).unwrap();
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

    #[test]
    fn the_full_micro_step_budget_is_usable() {
        assert!(!iteration_limit_exceeded(1));
        assert!(!iteration_limit_exceeded(MAX_ITERATIONS));
        assert!(iteration_limit_exceeded(MAX_ITERATIONS + 1));
    }

    #[test]
    fn box_in_motion_hits_a_box_ahead() {
        let staticbox = Aabb::new(Vector3::new(10.0, 0.0, 0.0), Vector3::new(20.0, 10.0, 10.0));
        let movingbox = Aabb::new(Vector3::new(0.0, 2.0, 2.0), Vector3::new(5.0, 8.0, 8.0));
        let hit = axis_aligned_collision(&staticbox, &movingbox, Vector3::new(10.0, 0.0, 0.0), 1.0);
        assert_eq!(hit, Some((CollisionAxis::X, 0.5)));
        // Too slow to get there in time.
        assert_eq!(
            axis_aligned_collision(&staticbox, &movingbox, Vector3::new(1.0, 0.0, 0.0), 1.0),
            None
        );
        // Passing beside it.
        let beside = movingbox.translated(Vector3::new(0.0, 20.0, 0.0));
        assert_eq!(
            axis_aligned_collision(&staticbox, &beside, Vector3::new(10.0, 0.0, 0.0), 1.0),
            None
        );
    }

    #[test]
    fn resting_box_does_not_move() {
        let map = world();
        let mut pos = Vector3::new(0.0, -5.0, 0.0);
        let mut speed = Vector3::new(0.0, 0.0, 0.0);
        let result = collision_move_simple(
            &map, BS * 0.1, &player_box(), 0.0, 0.1, &mut pos, &mut speed,
            Vector3::new(0.0, 0.0, 0.0), None, false,
        );
        assert_eq!(pos, Vector3::new(0.0, -5.0, 0.0));
        assert!(result.collisions.is_empty());
    }

    #[test]
    fn falling_box_lands_on_the_floor() {
        let map = world();
        let mut pos = Vector3::new(0.0, 0.0, 0.0);
        let mut speed = Vector3::new(0.0, -100.0, 0.0);
        let result = collision_move_simple(
            &map, BS * 0.1, &player_box(), 0.0, 0.1, &mut pos, &mut speed,
            Vector3::new(0.0, 0.0, 0.0), None, false,
        );
        assert!((pos.y + 5.0).abs() < 1e-3);
        assert_eq!(speed.y, 0.0);
        assert!(result.touching_ground);
        assert_eq!(result.collisions.len(), 1);
        assert_eq!(result.collisions[0].axis, CollisionAxis::Y);
        assert_eq!(result.collisions[0].target, CollisionTarget::Node(Point3::new(0, -1, 0)));
    }

    #[test]
    fn unloaded_world_freezes_the_mover() {
        let map = Map::new(Arc::new(NodeRegistry::new()));
        let mut pos = Vector3::new(500.0, 500.0, 500.0);
        let mut speed = Vector3::new(10.0, -10.0, 0.0);
        collision_move_simple(
            &map, BS * 0.1, &player_box(), 0.0, 0.1, &mut pos, &mut speed,
            Vector3::new(0.0, 0.0, 0.0), None, false,
        );
        assert_eq!(pos, Vector3::new(500.0, 500.0, 500.0));
        assert_eq!(speed, Vector3::new(0.0, 0.0, 0.0));
    }

    #[test]
    fn fast_impacts_bounce_off_bouncy_nodes() {
        let mut map = world();
        let trampoline = map.registry().get_id("trampoline").unwrap();
        for y in 0..3 {
            map.set_node(Point3::new(1, y, 0), MapNode::new(trampoline));
        }
        let mut pos = Vector3::new(0.0, -5.0, 0.0);
        let mut speed = Vector3::new(10.0 * BS, 0.0, 0.0);
        let result = collision_move_simple(
            &map, BS * 0.1, &player_box(), 0.0, 0.1, &mut pos, &mut speed,
            Vector3::new(0.0, 0.0, 0.0), None, false,
        );
        assert_eq!(speed.x, -10.0 * BS);
        assert!(result.collides);
        assert_eq!(result.collisions[0].axis, CollisionAxis::X);
    }

    #[test]
    fn objects_block_movement_unless_they_are_self() {
        struct WithCrate(Map);
        impl CollisionEnvironment for WithCrate {
            fn map(&self) -> &Map {
                &self.0
            }
            fn objects_inside_radius(&self, _: Vector3<f32>, _: f32) -> Vec<CollisionObject> {
                vec![CollisionObject {
                    id: 7,
                    collision_box: Aabb::new(
                        Vector3::new(10.0, -5.0, -5.0),
                        Vector3::new(20.0, 5.0, 5.0),
                    ),
                }]
            }
        }
        let env = WithCrate(world());
        let run = |self_id| {
            let mut pos = Vector3::new(0.0, -5.0, 0.0);
            let mut speed = Vector3::new(20.0, 0.0, 0.0);
            let result = collision_move_simple(
                &env, BS * 0.1, &player_box(), 0.0, 1.0, &mut pos, &mut speed,
                Vector3::new(0.0, 0.0, 0.0), self_id, true,
            );
            (pos, result)
        };

        let (pos, result) = run(None);
        assert!((pos.x - 7.0).abs() < 1e-3);
        assert_eq!(result.collisions[0].target, CollisionTarget::Object(7));

        let (pos, result) = run(Some(7));
        assert!((pos.x - 20.0).abs() < 1e-3);
        assert!(result.collisions.is_empty());
    }
}
