//! # Settings
//!
//! A flat key to string map with a static table of defaults. Hosts may
//! override any key from a JSON object; values of any JSON scalar type are
//! accepted and stored in their string form.
//!
//! Typed snapshots (`MeshSettings`, `SchedulerSettings`, ...) are taken once
//! at construction and passed explicitly to the subsystems that need them.

use std::{collections::HashMap, fs, path::Path};

use anyhow::{bail, Context, Result};
use log::{debug, warn};
use phf::phf_map;

/// Default value for every key the core recognizes.
static DEFAULT_SETTINGS: phf::Map<&'static str, &'static str> = phf_map! {
    "enable_shaders" => "true",
    "enable_vbo" => "true",
    "smooth_lighting" => "true",
    "mesh_generation_interval" => "0",
    "meshgen_block_cache_size" => "20480",
    "enable_mesh_cache" => "false",
    "free_move" => "false",
    "noclip" => "false",
    "fog_start" => "0.4",
    "enable_fog" => "true",
    "trilinear_filter" => "false",
    "bilinear_filter" => "false",
    "anisotropic_filter" => "false",
    "ambient_occlusion_gamma" => "1.8",
    "max_block_send_distance" => "10",
    "desynchronize_mapblock_texture_animation" => "true",
    "viewing_range" => "190",
    "new_move" => "true",
    "occlusion_culling" => "true",
    "liquid_loop_max" => "10000",
    "block_unload_timeout" => "600",
    "stepheight" => "0.6",
};

/// Flat key to string settings store.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    /// Creates a settings store holding only the defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object of overrides.
    ///
    /// # Arguments
    /// * `json` - A JSON document whose top level is an object of scalars
    ///
    /// # Returns
    /// The settings store, or an error if the document is not an object or
    /// holds a nested value.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let parsed: serde_json::Value =
            serde_json::from_str(json).context("settings are not valid JSON")?;
        let serde_json::Value::Object(entries) = parsed else {
            bail!("settings document must be a JSON object");
        };

        let mut settings = Self::new();
        for (key, value) in entries {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Null => continue,
                _ => bail!("setting `{key}` must be a scalar"),
            };
            if !DEFAULT_SETTINGS.contains_key(key.as_str()) {
                debug!("Unrecognized setting `{key}` kept as-is");
            }
            settings.values.insert(key, text);
        }
        Ok(settings)
    }

    /// Loads overrides from a JSON file on disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parsing {}", path.display()))
    }

    /// Sets a key, replacing any previous override.
    pub fn set(&mut self, key: &str, value: impl ToString) {
        self.values.insert(key.to_owned(), value.to_string());
    }

    /// Returns the raw string for a key: the override if present, else the default.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .or_else(|| DEFAULT_SETTINGS.get(key).copied())
    }

    /// Reads a boolean. Accepts `true/false`, `yes/no`, `on/off` and integers.
    pub fn get_bool(&self, key: &str) -> bool {
        match self.get(key).map(str::trim) {
            Some("true" | "yes" | "on") => true,
            Some("false" | "no" | "off") | None => false,
            Some(other) => match other.parse::<i64>() {
                Ok(n) => n != 0,
                Err(_) => {
                    warn!("Setting `{key}` has non-boolean value `{other}`");
                    DEFAULT_SETTINGS.get(key) == Some(&"true")
                }
            },
        }
    }

    /// Reads an unsigned integer, falling back to the default on parse failure.
    pub fn get_u32(&self, key: &str) -> u32 {
        self.parsed(key).unwrap_or(0)
    }

    /// Reads a signed integer, falling back to the default on parse failure.
    pub fn get_i32(&self, key: &str) -> i32 {
        self.parsed(key).unwrap_or(0)
    }

    /// Reads a float, falling back to the default on parse failure.
    pub fn get_f32(&self, key: &str) -> f32 {
        self.parsed(key).unwrap_or(0.0)
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.get(key)?;
        match raw.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Setting `{key}` has unparsable value `{raw}`, using default");
                self.default_parsed(key)
            }
        }
    }

    fn default_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        DEFAULT_SETTINGS.get(key).and_then(|raw| raw.parse().ok())
    }
}

/// Options consumed by the mesh builder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshSettings {
    /// Final color blending happens on the GPU; vertex colors stay encoded.
    pub enable_shaders: bool,
    /// Per-vertex light sampling with ambient occlusion.
    pub smooth_lighting: bool,
    /// Keep rotated copies of prebaked meshes.
    pub enable_mesh_cache: bool,
    /// Gamma used for the ambient occlusion darkening table, in 0.25..=4.0.
    pub ambient_occlusion_gamma: f32,
    /// Offset animated tiles per block so neighbors don't pulse together.
    pub desync_animation: bool,
}

impl MeshSettings {
    /// Snapshot from a settings store.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            enable_shaders: settings.get_bool("enable_shaders"),
            smooth_lighting: settings.get_bool("smooth_lighting"),
            enable_mesh_cache: settings.get_bool("enable_mesh_cache"),
            ambient_occlusion_gamma: settings
                .get_f32("ambient_occlusion_gamma")
                .clamp(0.25, 4.0),
            desync_animation: settings.get_bool("desynchronize_mapblock_texture_animation"),
        }
    }
}

impl Default for MeshSettings {
    fn default() -> Self {
        Self::from_settings(&Settings::new())
    }
}

/// Options consumed by the mesh update scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Soft ceiling of the block data cache in kilobytes.
    pub cache_size_kb: u32,
    /// Pause between two mesh builds, in 0..=50 ms.
    pub generation_interval_ms: u32,
}

impl SchedulerSettings {
    /// Snapshot from a settings store.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            cache_size_kb: settings.get_u32("meshgen_block_cache_size"),
            generation_interval_ms: settings.get_u32("mesh_generation_interval").min(50),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_settings(&Settings::new())
    }
}

/// Options consumed by draw list assembly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawSettings {
    /// Viewing range in nodes.
    pub viewing_range: f32,
    /// Fraction of the range where fog starts.
    pub fog_start: f32,
    /// Whether fog is drawn at all.
    pub enable_fog: bool,
    /// Skip blocks hidden behind opaque nodes.
    pub occlusion_culling: bool,
}

impl DrawSettings {
    /// Snapshot from a settings store.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            viewing_range: settings.get_f32("viewing_range").max(20.0),
            fog_start: settings.get_f32("fog_start").clamp(0.0, 0.99),
            enable_fog: settings.get_bool("enable_fog"),
            occlusion_culling: settings.get_bool("occlusion_culling"),
        }
    }
}

impl Default for DrawSettings {
    fn default() -> Self {
        Self::from_settings(&Settings::new())
    }
}

/// Options consumed by the player controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MovementSettings {
    /// Fly without gravity.
    pub free_move: bool,
    /// Combined with `free_move`, move through nodes.
    pub noclip: bool,
    /// Use the swept collision resolver; `false` selects the legacy per-axis path.
    pub new_move: bool,
    /// Step-up height in nodes.
    pub stepheight: f32,
}

impl MovementSettings {
    /// Snapshot from a settings store.
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            free_move: settings.get_bool("free_move"),
            noclip: settings.get_bool("noclip"),
            new_move: settings.get_bool("new_move"),
            stepheight: settings.get_f32("stepheight").max(0.0),
        }
    }
}

impl Default for MovementSettings {
    fn default() -> Self {
        Self::from_settings(&Settings::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_recognized_keys() {
        let settings = Settings::new();
        assert!(settings.get_bool("enable_shaders"));
        assert_eq!(settings.get_u32("meshgen_block_cache_size"), 20480);
        assert!((settings.get_f32("ambient_occlusion_gamma") - 1.8).abs() < 1e-6);
        assert_eq!(settings.get("no_such_key"), None);
    }

    #[test]
    fn json_overrides_accept_scalars() {
        let settings = Settings::from_json_str(
            r#"{"smooth_lighting": false, "mesh_generation_interval": 120, "fog_start": "0.7"}"#,
        )
        .unwrap();
        assert!(!settings.get_bool("smooth_lighting"));
        assert_eq!(SchedulerSettings::from_settings(&settings).generation_interval_ms, 50);
        assert!((settings.get_f32("fog_start") - 0.7).abs() < 1e-6);
    }

    #[test]
    fn nested_values_are_rejected() {
        assert!(Settings::from_json_str(r#"{"enable_fog": [1, 2]}"#).is_err());
        assert!(Settings::from_json_str("[]").is_err());
    }

    #[test]
    fn unparsable_values_fall_back_to_defaults() {
        let mut settings = Settings::new();
        settings.set("ambient_occlusion_gamma", "bright");
        settings.set("enable_fog", "maybe");
        assert!((settings.get_f32("ambient_occlusion_gamma") - 1.8).abs() < 1e-6);
        assert!(settings.get_bool("enable_fog"));
    }

    #[test]
    fn mesh_settings_clamp_gamma() {
        let mut settings = Settings::new();
        settings.set("ambient_occlusion_gamma", 9.0);
        assert_eq!(MeshSettings::from_settings(&settings).ambient_occlusion_gamma, 4.0);
    }
}
