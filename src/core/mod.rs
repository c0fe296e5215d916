//! # Core Module
//!
//! Utilities shared by every subsystem of the voxel core:
//!
//! - `settings`: the flat key/value settings store and the typed snapshots
//!   handed to each subsystem at construction
//! - `time_source`: injectable monotonic clocks

pub mod settings;
pub mod time_source;
