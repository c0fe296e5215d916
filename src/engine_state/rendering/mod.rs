//! Rendering side of the voxel core.
//!
//! Everything between the map and a GPU: tile and texture resolution,
//! the light encoding shared with shaders, the map block mesher, and the
//! per-frame draw list with its camera. No graphics API is touched here;
//! a host renderer uploads the buffers and draws the entries it is given.
//!
//! ## Key Modules
//! - `tile`: materials and tile layers resolved for node faces
//! - `texture`: texture and shader lookup traits with in-memory registries
//! - `color`: light to vertex color encoding and day/night blending
//! - `meshing`: map block meshes and their animation
//! - `camera`: viewer position, projection and frustum
//! - `draw_list`: culled, sorted draw entries for one frame

pub mod camera;
pub mod color;
pub mod draw_list;
pub mod meshing;
pub mod texture;
pub mod tile;
mod vertex;

pub use vertex::Vertex;
