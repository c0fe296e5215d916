//! Axis-aligned bounding boxes in float space.

use cgmath::{InnerSpace, Vector3};
use serde::Deserialize;

/// An axis-aligned box given by its minimum and maximum corners.
///
/// Node boxes are written in node units (a full node spans `-0.5..0.5`);
/// collision and mesh code scale them by `BS` when placing them in the world.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "[f32; 6]")]
pub struct Aabb {
    /// Minimum corner
    pub min: Vector3<f32>,
    /// Maximum corner
    pub max: Vector3<f32>,
}

impl From<[f32; 6]> for Aabb {
    fn from(v: [f32; 6]) -> Self {
        Aabb::new(
            Vector3::new(v[0], v[1], v[2]),
            Vector3::new(v[3], v[4], v[5]),
        )
    }
}

impl Aabb {
    /// Builds a box from two corners, sorting each component.
    pub fn new(a: Vector3<f32>, b: Vector3<f32>) -> Self {
        Aabb {
            min: Vector3::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: Vector3::new(a.x.max(b.x), a.y.max(b.y), a.z.max(b.z)),
        }
    }

    /// The box of a full node in node units.
    pub fn unit() -> Self {
        Aabb::new(Vector3::new(-0.5, -0.5, -0.5), Vector3::new(0.5, 0.5, 0.5))
    }

    /// Returns this box moved by `offset`.
    pub fn translated(&self, offset: Vector3<f32>) -> Self {
        Aabb {
            min: self.min + offset,
            max: self.max + offset,
        }
    }

    /// Returns this box with every coordinate multiplied by `s`.
    pub fn scaled(&self, s: f32) -> Self {
        Aabb::new(self.min * s, self.max * s)
    }

    /// Edge lengths.
    pub fn extent(&self) -> Vector3<f32> {
        self.max - self.min
    }

    /// Center point.
    pub fn center(&self) -> Vector3<f32> {
        (self.min + self.max) * 0.5
    }

    /// Half the length of the box diagonal.
    pub fn radius(&self) -> f32 {
        self.extent().magnitude() * 0.5
    }

    /// Strict overlap test; touching faces do not intersect.
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x < other.max.x
            && self.max.x > other.min.x
            && self.min.y < other.max.y
            && self.max.y > other.min.y
            && self.min.z < other.max.z
            && self.max.z > other.min.z
    }

    /// Smallest box containing both.
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: Vector3::new(
                self.min.x.min(other.min.x),
                self.min.y.min(other.min.y),
                self.min.z.min(other.min.z),
            ),
            max: Vector3::new(
                self.max.x.max(other.max.x),
                self.max.y.max(other.max.y),
                self.max.z.max(other.max.z),
            ),
        }
    }
}
