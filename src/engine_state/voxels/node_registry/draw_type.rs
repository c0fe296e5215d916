//! Shape classes and parameter interpretations of node types.

use num_derive::FromPrimitive;
use serde::Deserialize;

/// Shape class of a node type; the mesh builder dispatches on it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, FromPrimitive, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawType {
    /// A full cube drawn by the fast-face pass
    #[default]
    Normal,
    /// Nothing is drawn
    Airlike,
    /// Liquid source, drawn as a cube against non-liquids
    Liquid,
    /// Flowing liquid with sloped surface
    FlowingLiquid,
    /// Cube hiding faces toward the same type
    Glasslike,
    /// Glass with a frame along visible edges
    GlasslikeFramed,
    /// Cube drawing every face
    Allfaces,
    /// One tilted billboard oriented by the wall it hangs on
    Torchlike,
    /// One quad flat against the wall it hangs on
    Signlike,
    /// Crossed quads
    Plantlike,
    /// Solid cube with a plant growing on top
    PlantlikeRooted,
    /// Billboards leaning against neighbors
    Firelike,
    /// Post plus bars toward fence neighbors
    Fencelike,
    /// Flat track piece chosen from neighbors
    Raillike,
    /// Explicit boxes
    Nodebox,
    /// Prebaked mesh
    Mesh,
}

/// Meaning of `param1`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, FromPrimitive, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// Unused
    #[default]
    None,
    /// Day and night light banks
    Light,
}

/// Meaning of `param2`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, FromPrimitive, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType2 {
    /// Unused
    #[default]
    None,
    /// Free for game use
    Full,
    /// Liquid level and flow-down bit
    FlowingLiquid,
    /// One of 24 orientations
    Facedir,
    /// One of 6 wall directions
    Wallmounted,
    /// Height of a leveled node
    Leveled,
    /// Rotation about Y in 1.5° steps
    Degrotate,
    /// Plant style and offset bits
    Meshoptions,
    /// Liquid level and merge flags of framed glass
    GlasslikeLiquidLevel,
}

/// Liquid behaviour of a node type.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, FromPrimitive, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiquidType {
    /// Not a liquid
    #[default]
    None,
    /// Flowing variant
    Flowing,
    /// Source variant
    Source,
}

/// How a node type's textures use alpha.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, FromPrimitive, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlphaMode {
    /// Alpha ignored
    #[default]
    Opaque,
    /// Alpha tested
    Clip,
    /// Alpha blended
    Blend,
}

/// Crossed-quad layouts of plant-like nodes, selected by `param2 & 0x07`
/// with `ParamType2::Meshoptions`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, FromPrimitive)]
pub enum PlantStyle {
    /// Two diagonal quads
    Cross = 0,
    /// Two axis-aligned quads
    Cross2 = 1,
    /// Three quads at 120°
    Star = 2,
    /// Four quads forming a hash, pushed outward
    Hash = 3,
    /// Four quads forming a hash along the node edges
    Hash2 = 4,
}

/// `param2` bit moving a plant by a random horizontal offset.
pub const MESHOPTIONS_RANDOM_OFFSET: u8 = 0x08;
/// `param2` bit scaling a plant by `sqrt(2)`.
pub const MESHOPTIONS_SCALE: u8 = 0x10;
/// `param2` bit moving a plant by a random vertical offset.
pub const MESHOPTIONS_RANDOM_OFFSET_Y: u8 = 0x20;
