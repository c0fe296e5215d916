//! # Voxel World Demo Entry Point
//!
//! Runs the library's headless demo: a small generated world is lit,
//! meshed and walked through for a few seconds while the engine logs what
//! it does.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=info cargo run --release
//! ```
//!
//! Set `VOXEL_WORLD_SETTINGS` to a JSON file of setting overrides.

fn main() {
    voxel_world::run();
}
