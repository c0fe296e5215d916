//! # Smooth Light Sampling
//!
//! Per-vertex light for meshes. Light levels are decoded to the 0..=255
//! brightness scale and returned as `day | night << 8`.
//!
//! A vertex samples the 2x2x2 cube of cells around its corner. Cells that
//! store light contribute their decoded level; opaque cells count towards
//! ambient occlusion instead. A diagonal cell only contributes when the two
//! cells between it and the origin do not both block, so light does not
//! leak around corners. When more than four samples are occluded the result
//! is darkened through a gamma-corrected table.

use cgmath::Vector3;

use crate::engine_state::voxels::{
    block::{LightBank, MapNode, CONTENT_IGNORE, LIGHT_SUN},
    node_registry::{draw_type::ParamType, NodeRegistry},
    voxel_manip::VoxelManipulator,
    NodePos,
};

/// Brightness of each light level on the 0..=255 scale.
pub const LIGHT_DECODE_TABLE: [u8; 16] = [
    8, 11, 14, 18, 22, 29, 37, 47, 60, 76, 97, 123, 157, 200, 255, 255,
];

/// Brightness of a light level.
pub fn decode_light(level: u8) -> u8 {
    LIGHT_DECODE_TABLE[level.min(LIGHT_SUN) as usize]
}

/// Darkening factors for one, two and three extra occluded samples.
pub fn ambient_occlusion_table(gamma: f32) -> [f32; 3] {
    let gamma = gamma.clamp(0.25, 4.0);
    [
        0.75f32.powf(1.0 / gamma),
        0.5f32.powf(1.0 / gamma),
        0.25f32.powf(1.0 / gamma),
    ]
}

/// Packs two decoded brightness values.
pub fn pack_light(day: u8, night: u8) -> u16 {
    day as u16 | (night as u16) << 8
}

/// Light sampling over a mesh snapshot.
pub struct LightSampler<'a> {
    vmanip: &'a VoxelManipulator,
    registry: &'a NodeRegistry,
    ao_table: [f32; 3],
}

impl<'a> LightSampler<'a> {
    /// Creates a sampler over a snapshot.
    ///
    /// # Arguments
    /// * `vmanip` - Cells of the meshed block plus a one block border
    /// * `registry` - Node definitions
    /// * `ao_gamma` - Gamma for the ambient occlusion table, clamped to 0.25..=4.0
    pub fn new(vmanip: &'a VoxelManipulator, registry: &'a NodeRegistry, ao_gamma: f32) -> Self {
        LightSampler {
            vmanip,
            registry,
            ao_table: ambient_occlusion_table(ao_gamma),
        }
    }

    fn node(&self, p: NodePos) -> MapNode {
        self.vmanip.get_node(p)
    }

    /// Flat light of a face between `n` and its neighbor `n2`: the brighter
    /// of the two, raised to any light source.
    pub fn face_light(&self, n: MapNode, n2: MapNode) -> u16 {
        let f1 = self.registry.get_node(&n);
        let f2 = self.registry.get_node(&n2);
        let source = f1.light_source.max(f2.light_source);
        let bank = |bank: LightBank| {
            let level = n.light(bank, f1).max(n2.light(bank, f2)).max(source);
            decode_light(level)
        };
        pack_light(bank(LightBank::Day), bank(LightBank::Night))
    }

    /// Flat light inside a node, raised by `increment` levels.
    pub fn interior_light(&self, n: MapNode, increment: u8) -> u16 {
        let f = self.registry.get_node(&n);
        let bank = |bank: LightBank| {
            decode_light(n.light(bank, f).saturating_add(increment).min(LIGHT_SUN))
        };
        pack_light(bank(LightBank::Day), bank(LightBank::Night))
    }

    /// Smooth light of a solid face corner.
    ///
    /// # Arguments
    /// * `p` - The node owning the face
    /// * `face_dir` - Outward face normal
    /// * `corner` - Corner of the node, `±1` on every axis
    pub fn smooth_light_solid(
        &self,
        p: NodePos,
        face_dir: Vector3<i32>,
        corner: Vector3<i32>,
    ) -> u16 {
        let (n1, n2) = if face_dir.x != 0 {
            (Vector3::new(0, corner.y, 0), Vector3::new(0, 0, corner.z))
        } else if face_dir.y != 0 {
            (Vector3::new(0, 0, corner.z), Vector3::new(corner.x, 0, 0))
        } else {
            (Vector3::new(corner.x, 0, 0), Vector3::new(0, corner.y, 0))
        };
        let dirs = [
            face_dir,
            face_dir + n1,
            face_dir + n2,
            Vector3::new(0, 0, 0),
            face_dir + n1 + n2,
            n1,
            n2,
            n1 + n2,
        ];
        self.combined(p, &dirs)
    }

    /// Smooth light of a corner of a non-solid node.
    pub fn smooth_light_transparent(&self, p: NodePos, corner: Vector3<i32>) -> u16 {
        let dirs = [
            Vector3::new(0, 0, 0),
            Vector3::new(corner.x, 0, 0),
            Vector3::new(0, corner.y, 0),
            Vector3::new(0, 0, corner.z),
            Vector3::new(corner.x, corner.y, 0),
            Vector3::new(corner.x, 0, corner.z),
            Vector3::new(0, corner.y, corner.z),
            Vector3::new(corner.x, corner.y, corner.z),
        ];
        self.combined(p, &dirs)
    }

    /// Combines the eight samples of a 2x2x2 cube. `dirs[0]` is the origin,
    /// `dirs[1..4]` its axis neighbors, `dirs[4..7]` the face diagonals
    /// (each between two of the axis neighbors) and `dirs[7]` the far corner.
    fn combined(&self, p: NodePos, dirs: &[Vector3<i32>; 8]) -> u16 {
        let mut acc = Accumulator::default();
        let mut add = |i: usize, obstructed: bool| -> bool {
            if obstructed {
                acc.ambient_occlusion += 1;
                return false;
            }
            let n = self.node(p + dirs[i]);
            if n.content == CONTENT_IGNORE {
                return true;
            }
            let f = self.registry.get_node(&n);
            acc.light_source_max = acc.light_source_max.max(f.light_source);
            if f.param_type == ParamType::Light && f.solidness != 2 {
                let day = n.light_raw(LightBank::Day);
                let night = n.light_raw(LightBank::Night);
                if day == LIGHT_SUN {
                    acc.direct_sunlight = true;
                }
                acc.day += decode_light(day) as u32;
                acc.night += decode_light(night) as u32;
                acc.count += 1;
            } else {
                acc.ambient_occlusion += 1;
            }
            f.light_propagates
        };

        add(0, false);
        let opaque1 = !add(1, false);
        let opaque2 = !add(2, false);
        let opaque3 = !add(3, false);
        let obstructed = [opaque1 && opaque2, opaque1 && opaque3, opaque2 && opaque3];
        let mut far_obstructed = true;
        for (k, blocked) in obstructed.iter().enumerate() {
            if add(k + 4, *blocked) {
                far_obstructed = false;
            }
        }
        let wraps = add(7, far_obstructed);
        if wraps {
            // Light wraps around the edge: the diagonals count again, with
            // their obstruction reversed.
            for (k, blocked) in obstructed.iter().enumerate() {
                add(k + 4, !*blocked);
            }
        }
        if wraps {
            acc.ambient_occlusion -= 3;
        }

        self.finish(acc)
    }

    fn finish(&self, acc: Accumulator) -> u16 {
        let (mut day, mut night) = if acc.count == 0 {
            (0, 0)
        } else {
            (acc.day / acc.count, acc.night / acc.count)
        };
        if acc.direct_sunlight {
            day = 255;
        }

        let source = decode_light(acc.light_source_max) as u32;
        let skip_day = source >= day;
        if skip_day {
            day = source;
        }
        let skip_night = source >= night;
        if skip_night {
            night = source;
        }

        if acc.ambient_occlusion > 4 {
            let factor = self.ao_table[(acc.ambient_occlusion - 5).min(2) as usize];
            if !skip_day {
                day = (day as f32 * factor).round().clamp(0.0, 255.0) as u32;
            }
            if !skip_night {
                night = (night as f32 * factor).round().clamp(0.0, 255.0) as u32;
            }
        }
        pack_light(day.min(255) as u8, night.min(255) as u8)
    }
}

#[derive(Default)]
struct Accumulator {
    ambient_occlusion: i32,
    count: u32,
    light_source_max: u8,
    day: u32,
    night: u32,
    direct_sunlight: bool,
}
