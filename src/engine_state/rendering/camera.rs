//! # Camera
//!
//! Position, orientation and projection of the viewer, plus the view
//! frustum the draw list culls blocks against.
//!
//! ## Key Components
//! - `Camera`: eye position, yaw and pitch, view matrix and camera offset
//! - `Projection`: perspective projection settings
//! - `Frustum`: six clip planes extracted from a view-projection matrix

use std::f32::consts::FRAC_PI_2;

use cgmath::*;

use crate::engine_state::voxels::{BS, NodePos};

/// Transformation matrix to convert from OpenGL's clip space to one whose
/// depth range is 0..1.
#[rustfmt::skip]
pub const ZERO_TO_ONE_DEPTH: Matrix4<f32> = Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Safe limit for pitch to prevent gimbal lock
const SAFE_FRAC_PI_2: f32 = FRAC_PI_2 - 0.0001;

/// The camera offset moves in steps of this many nodes.
const CAMERA_OFFSET_STEP: i32 = 200;

/// Represents a camera's projection matrix and related parameters.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Projection {
    /// Aspect ratio (width / height)
    aspect: f32,
    /// Vertical field of view in radians
    fovy: Rad<f32>,
    /// Near clipping plane distance
    znear: f32,
    /// Far clipping plane distance
    zfar: f32,
}

impl Projection {
    /// Creates a new projection with the given parameters.
    ///
    /// # Arguments
    /// * `width` - Viewport width in pixels
    /// * `height` - Viewport height in pixels
    /// * `fovy` - Vertical field of view
    /// * `znear` - Near clipping plane distance
    /// * `zfar` - Far clipping plane distance
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    /// Updates the projection's aspect ratio for viewport resizing.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    /// Moves the far plane, usually to the viewing range.
    pub fn set_zfar(&mut self, zfar: f32) {
        self.zfar = zfar.max(self.znear * 2.0);
    }

    /// Far clipping plane distance.
    pub fn zfar(&self) -> f32 {
        self.zfar
    }

    /// Calculates the projection matrix.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        ZERO_TO_ONE_DEPTH * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// A first-person camera in world units.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Camera {
    /// Eye position in world units
    pub position: Point3<f32>,
    /// Horizontal rotation (around Y axis); zero looks along +X
    pub yaw: Rad<f32>,
    /// Vertical rotation; positive looks up
    pub pitch: Rad<f32>,
    /// Perspective settings
    pub projection: Projection,
}

impl Camera {
    /// Creates a camera.
    ///
    /// # Arguments
    /// * `position` - Eye position in world units
    /// * `yaw` - Horizontal rotation
    /// * `pitch` - Vertical rotation, clamped short of straight up or down
    /// * `projection` - Perspective settings
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
        projection: Projection,
    ) -> Self {
        let mut camera = Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: pitch.into(),
            projection,
        };
        camera.set_orientation(camera.yaw, camera.pitch);
        camera
    }

    /// Turns the camera, clamping pitch to prevent gimbal lock.
    pub fn set_orientation(&mut self, yaw: Rad<f32>, pitch: Rad<f32>) {
        self.yaw = yaw;
        self.pitch = Rad(pitch.0.clamp(-SAFE_FRAC_PI_2, SAFE_FRAC_PI_2));
    }

    /// Normalized direction the camera looks in.
    pub fn view_dir(&self) -> Vector3<f32> {
        let (yaw_sin, yaw_cos) = self.yaw.0.sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.0.sin_cos();
        Vector3::new(pitch_cos * yaw_cos, pitch_sin, pitch_cos * yaw_sin).normalize()
    }

    /// Calculates the view matrix for this camera.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.view_dir(), Vector3::unit_y())
    }

    /// Product of projection and view matrices.
    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection.calc_matrix() * self.calc_matrix()
    }

    /// Node the eye is in.
    pub fn node_pos(&self) -> NodePos {
        let p = self.position / BS;
        Point3::new(p.x.round() as i32, p.y.round() as i32, p.z.round() as i32)
    }

    /// Origin subtracted from world positions before rendering, in nodes.
    /// Snapped to a coarse grid so it changes rarely.
    pub fn camera_offset(&self) -> Vector3<i32> {
        let p = self.node_pos();
        let snap = |c: i32| (c + CAMERA_OFFSET_STEP / 2).div_euclid(CAMERA_OFFSET_STEP) * CAMERA_OFFSET_STEP;
        Vector3::new(snap(p.x), snap(p.y), snap(p.z))
    }

    /// Frustum of the current view.
    pub fn frustum(&self) -> Frustum {
        Frustum::from_matrix(&self.view_projection())
    }
}

/// A plane `normal · p + d = 0` with the normal pointing into the frustum.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Plane {
    normal: Vector3<f32>,
    d: f32,
}

impl Plane {
    fn from_row(v: Vector4<f32>) -> Self {
        let normal = v.truncate();
        let len = normal.magnitude();
        if len > 0.0 {
            Plane {
                normal: normal / len,
                d: v.w / len,
            }
        } else {
            Plane { normal, d: v.w }
        }
    }

    fn distance(&self, p: Point3<f32>) -> f32 {
        self.normal.dot(p.to_vec()) + self.d
    }
}

/// The six planes bounding the visible volume.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Frustum {
    planes: [Plane; 6],
}

impl Frustum {
    /// Extracts the planes of a view-projection matrix whose clip depth
    /// range is 0..1.
    pub fn from_matrix(m: &Matrix4<f32>) -> Self {
        let row = |i: usize| Vector4::new(m.x[i], m.y[i], m.z[i], m.w[i]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));
        Frustum {
            planes: [
                Plane::from_row(r3 + r0),
                Plane::from_row(r3 - r0),
                Plane::from_row(r3 + r1),
                Plane::from_row(r3 - r1),
                Plane::from_row(r2),
                Plane::from_row(r3 - r2),
            ],
        }
    }

    /// Whether a sphere is at least partly inside.
    pub fn contains_sphere(&self, center: Point3<f32>, radius: f32) -> bool {
        self.planes.iter().all(|p| p.distance(center) >= -radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        let projection = Projection::new(800, 600, Deg(72.0), 1.0, 2000.0);
        Camera::new(Point3::new(0.0, 0.0, 0.0), Deg(0.0), Deg(0.0), projection)
    }

    #[test]
    fn zero_yaw_looks_along_x() {
        let dir = camera().view_dir();
        assert!((dir - Vector3::unit_x()).magnitude() < 1e-6);
    }

    #[test]
    fn frustum_keeps_what_is_ahead() {
        let frustum = camera().frustum();
        assert!(frustum.contains_sphere(Point3::new(100.0, 0.0, 0.0), 1.0));
        assert!(!frustum.contains_sphere(Point3::new(-100.0, 0.0, 0.0), 1.0));
        assert!(!frustum.contains_sphere(Point3::new(5000.0, 0.0, 0.0), 1.0));
        // A large sphere behind the eye still reaches into view.
        assert!(frustum.contains_sphere(Point3::new(-10.0, 0.0, 0.0), 20.0));
    }

    #[test]
    fn camera_offset_moves_in_coarse_steps() {
        let mut c = camera();
        c.position = Point3::new(99.0 * BS, 0.0, -101.0 * BS);
        assert_eq!(c.camera_offset(), Vector3::new(0, 0, -200));
    }
}
