//! Vertex data structures for map block meshes.
//!
//! This module defines the vertex format produced by the mesh builder and
//! consumed by the host renderer.

use cgmath::{Vector2, Vector3};

/// A vertex of a map block mesh.
///
/// Positions are in world units relative to the origin of the block's
/// mesh (the camera offset is applied by the renderer). The color carries
/// encoded light, not a final color: `rgb` is the brightness and `a` the
/// share of it that comes from sunlight, see [`super::color::encode_light`].
///
/// # Memory Layout
/// - Position: 3x f32 (12 bytes)
/// - Normal: 3x f32 (12 bytes)
/// - Color: 4x u8 (4 bytes)
/// - Texture Coordinates: 2x f32 (8 bytes)
///
/// Total size: 36 bytes
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    /// Position in world units
    pub position: [f32; 3],
    /// Face normal
    pub normal: [f32; 3],
    /// Encoded light (`rgb` brightness, `a` sunlight ratio)
    pub color: [u8; 4],
    /// Texture coordinates in tile units
    pub tex_coords: [f32; 2],
}

impl Vertex {
    /// Creates a new vertex.
    ///
    /// # Arguments
    /// * `position` - Position in world units
    /// * `normal` - Face normal
    /// * `color` - Encoded light color
    /// * `uv` - Texture coordinates
    ///
    /// # Returns
    /// A new `Vertex` instance
    pub fn new(
        position: Vector3<f32>,
        normal: Vector3<f32>,
        color: [u8; 4],
        uv: Vector2<f32>,
    ) -> Self {
        Vertex {
            position: position.into(),
            normal: normal.into(),
            color,
            tex_coords: uv.into(),
        }
    }

    /// Position as a vector.
    pub fn pos(&self) -> Vector3<f32> {
        Vector3::from(self.position)
    }
}
