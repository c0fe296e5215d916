//! # Block Module
//!
//! The per-cell record stored in map blocks and the face/orientation
//! helpers used when interpreting it.
//!
//! A cell is four bytes: a 16-bit content id and two parameter bytes whose
//! meaning depends on the node type's `param_type` and `param_type_2`.
//! With `ParamType::Light`, `param1` holds the day bank in its low nibble
//! and the night bank in its high nibble.

use crate::engine_state::voxels::node_registry::{
    draw_type::{ParamType, ParamType2},
    ContentFeatures,
};

pub mod block_side;

/// Index into the node registry.
pub type ContentId = u16;

/// Content id used for unregistered node types.
pub const CONTENT_UNKNOWN: ContentId = 125;

/// Content id of empty space.
pub const CONTENT_AIR: ContentId = 126;

/// Sentinel content of cells that are not loaded.
pub const CONTENT_IGNORE: ContentId = 127;

/// Day bank value of unobstructed sunlight.
pub const LIGHT_SUN: u8 = 15;

/// Highest artificial light level.
pub const LIGHT_MAX: u8 = 14;

/// Bit of `param2` marking flowing liquid that falls down.
pub const LIQUID_FLOW_DOWN_MASK: u8 = 0x08;

/// Bits of `param2` holding a flowing liquid level.
pub const LIQUID_LEVEL_MASK: u8 = 0x07;

/// Level reported for liquid sources.
pub const LIQUID_LEVEL_SOURCE: u8 = 8;

/// Bits of `param2` holding a leveled node height.
pub const LEVELED_MASK: u8 = 0x7F;

/// Highest leveled node height.
pub const LEVELED_MAX: u8 = 127;

/// One of the two independent light fields.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LightBank {
    /// Sunlight plus artificial light.
    Day,
    /// Artificial light only.
    Night,
}

impl LightBank {
    /// Both banks, day first.
    pub const BOTH: [LightBank; 2] = [LightBank::Day, LightBank::Night];

    /// Highest value the bank can store.
    pub fn max_level(self) -> u8 {
        match self {
            LightBank::Day => LIGHT_SUN,
            LightBank::Night => LIGHT_MAX,
        }
    }
}

/// A single cell of the world.
///
/// # Memory Layout
/// `#[repr(C)]` keeps the record at exactly four bytes so block arrays can
/// be copied wholesale into the mesh scheduler's cache.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MapNode {
    /// Node type
    pub content: ContentId,
    /// Light banks or type-specific data
    pub param1: u8,
    /// Orientation, level or other type-specific data
    pub param2: u8,
}

impl MapNode {
    /// A cell of the given type with zeroed parameters.
    pub const fn new(content: ContentId) -> Self {
        MapNode {
            content,
            param1: 0,
            param2: 0,
        }
    }

    /// A cell with explicit parameters.
    pub const fn with_params(content: ContentId, param1: u8, param2: u8) -> Self {
        MapNode {
            content,
            param1,
            param2,
        }
    }

    /// An unlit air cell.
    pub const fn air() -> Self {
        MapNode::new(CONTENT_AIR)
    }

    /// The not-loaded sentinel cell.
    pub const fn ignore() -> Self {
        MapNode::new(CONTENT_IGNORE)
    }

    /// Stored light of a bank, without type checks.
    pub fn light_raw(&self, bank: LightBank) -> u8 {
        match bank {
            LightBank::Day => self.param1 & 0x0f,
            LightBank::Night => (self.param1 >> 4) & 0x0f,
        }
    }

    /// Stores light in a bank, without type checks.
    pub fn set_light_raw(&mut self, bank: LightBank, level: u8) {
        let level = level.min(bank.max_level());
        match bank {
            LightBank::Day => self.param1 = (self.param1 & 0xf0) | level,
            LightBank::Night => self.param1 = (self.param1 & 0x0f) | (level << 4),
        }
    }

    /// Effective light of a bank: the stored value raised to the node's own
    /// emission. Nodes that don't store light report only their emission.
    pub fn light(&self, bank: LightBank, f: &ContentFeatures) -> u8 {
        let stored = if f.param_type == ParamType::Light {
            self.light_raw(bank)
        } else {
            0
        };
        stored.max(f.light_source)
    }

    /// Stores light if the node type keeps light in `param1`.
    pub fn set_light(&mut self, bank: LightBank, level: u8, f: &ContentFeatures) {
        if f.param_type == ParamType::Light {
            self.set_light_raw(bank, level);
        }
    }

    /// Facedir rotation `0..24`, or 0 for types without one.
    pub fn facedir(&self, f: &ContentFeatures) -> u8 {
        match f.param_type_2 {
            ParamType2::Facedir => {
                let fd = self.param2 & 0x1f;
                if fd < 24 {
                    fd
                } else {
                    0
                }
            }
            _ => 0,
        }
    }

    /// Wallmounted direction `0..6`, or 1 (floor) for types without one.
    pub fn wallmounted(&self, f: &ContentFeatures) -> u8 {
        match f.param_type_2 {
            ParamType2::Wallmounted => {
                let wm = self.param2 & 0x07;
                if wm < 6 {
                    wm
                } else {
                    1
                }
            }
            _ => 1,
        }
    }

    /// Height of a leveled node in 1/64 node units.
    pub fn level(&self, f: &ContentFeatures) -> u8 {
        if f.param_type_2 == ParamType2::Leveled {
            let level = self.param2 & LEVELED_MASK;
            if level > 0 {
                return level;
            }
        }
        f.leveled.min(LEVELED_MAX)
    }
}

impl Default for MapNode {
    fn default() -> Self {
        MapNode::ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn light_banks_are_independent_nibbles() {
        let mut n = MapNode::air();
        n.set_light_raw(LightBank::Day, LIGHT_SUN);
        n.set_light_raw(LightBank::Night, 9);
        assert_eq!(n.light_raw(LightBank::Day), 15);
        assert_eq!(n.light_raw(LightBank::Night), 9);
        n.set_light_raw(LightBank::Day, 3);
        assert_eq!(n.param1, 0x93);
    }

    #[test]
    fn night_bank_is_capped() {
        let mut n = MapNode::air();
        n.set_light_raw(LightBank::Night, LIGHT_SUN);
        assert_eq!(n.light_raw(LightBank::Night), LIGHT_MAX);
    }

    #[test]
    fn cell_is_four_bytes() {
        assert_eq!(std::mem::size_of::<MapNode>(), 4);
    }
}
