//! Node boxes: the explicit AABB shapes used by `DrawType::Nodebox` meshes
//! and by collision for every walkable node type.

use serde::Deserialize;

use crate::engine_state::{
    collision::aabb::Aabb,
    voxels::block::{
        block_side::{BlockSide, NodeRotation},
        MapNode,
    },
};

use super::{draw_type::ParamType2, ContentFeatures};

/// Boxes used by a connected node box, keyed by which neighbors connect.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectedBoxes {
    /// Always present
    pub fixed: Vec<Aabb>,
    /// Present when the +Y neighbor connects
    pub connect_top: Vec<Aabb>,
    /// Present when the -Y neighbor connects
    pub connect_bottom: Vec<Aabb>,
    /// Present when the -Z neighbor connects
    pub connect_front: Vec<Aabb>,
    /// Present when the -X neighbor connects
    pub connect_left: Vec<Aabb>,
    /// Present when the +Z neighbor connects
    pub connect_back: Vec<Aabb>,
    /// Present when the +X neighbor connects
    pub connect_right: Vec<Aabb>,
    /// Present when the +Y neighbor does not connect
    pub disconnected_top: Vec<Aabb>,
    /// Present when the -Y neighbor does not connect
    pub disconnected_bottom: Vec<Aabb>,
    /// Present when the -Z neighbor does not connect
    pub disconnected_front: Vec<Aabb>,
    /// Present when the -X neighbor does not connect
    pub disconnected_left: Vec<Aabb>,
    /// Present when the +Z neighbor does not connect
    pub disconnected_back: Vec<Aabb>,
    /// Present when the +X neighbor does not connect
    pub disconnected_right: Vec<Aabb>,
    /// Present when nothing connects
    pub disconnected: Vec<Aabb>,
    /// Present when no horizontal neighbor connects
    pub disconnected_sides: Vec<Aabb>,
}

/// Shape of a node in node units (a full node spans `-0.5..0.5`).
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NodeBox {
    /// The full unit cube
    #[default]
    Regular,
    /// Fixed boxes, rotated by facedir or wallmounted
    Fixed {
        /// Boxes
        fixed: Vec<Aabb>,
    },
    /// Fixed boxes whose tops follow the node level
    Leveled {
        /// Boxes
        fixed: Vec<Aabb>,
    },
    /// One box per mounting kind
    WallMounted {
        /// Box when hanging from the ceiling
        wall_top: Aabb,
        /// Box when standing on the floor
        wall_bottom: Aabb,
        /// Box when attached to the -X wall; rotated for other walls
        wall_side: Aabb,
    },
    /// Boxes depending on connecting neighbors
    Connected(ConnectedBoxes),
}

/// Horizontal connect bits: front, left, back and right.
const SIDE_CONNECT_BITS: u8 = 4 | 8 | 16 | 32;

impl NodeBox {
    /// Whether this is a connected node box.
    pub fn is_connected(&self) -> bool {
        matches!(self, NodeBox::Connected(_))
    }

    /// Resolves the boxes of a node in node units.
    ///
    /// # Arguments
    /// * `node` - The cell whose `param2` drives rotation and level
    /// * `f` - Features of the cell's type
    /// * `neighbors` - `BlockSide::connect_bit` mask of connecting neighbors
    ///
    /// # Returns
    /// The boxes, relative to the node center.
    pub fn boxes(&self, node: &MapNode, f: &ContentFeatures, neighbors: u8) -> Vec<Aabb> {
        match self {
            NodeBox::Regular => vec![Aabb::unit()],
            NodeBox::Fixed { fixed } => {
                let rotation = match f.param_type_2 {
                    ParamType2::Facedir => NodeRotation::from_facedir(node.facedir(f)),
                    ParamType2::Wallmounted => NodeRotation::from_wallmounted(node.wallmounted(f)),
                    _ => NodeRotation::IDENTITY,
                };
                fixed.iter().map(|b| rotation.rotate_box(b)).collect()
            }
            NodeBox::Leveled { fixed } => {
                let top = -0.5 + node.level(f) as f32 / 64.0;
                fixed
                    .iter()
                    .map(|b| {
                        let mut b = *b;
                        b.max.y = top.max(b.min.y);
                        b
                    })
                    .collect()
            }
            NodeBox::WallMounted {
                wall_top,
                wall_bottom,
                wall_side,
            } => {
                let b = match node.wallmounted(f) {
                    0 => *wall_top,
                    1 => *wall_bottom,
                    2 => NodeRotation::from_facedir(2).rotate_box(wall_side),
                    4 => NodeRotation::from_facedir(1).rotate_box(wall_side),
                    5 => NodeRotation::from_facedir(3).rotate_box(wall_side),
                    _ => *wall_side,
                };
                vec![b]
            }
            NodeBox::Connected(c) => {
                let mut boxes = c.fixed.clone();
                let per_side = [
                    (BlockSide::TOP, &c.connect_top, &c.disconnected_top),
                    (BlockSide::BOTTOM, &c.connect_bottom, &c.disconnected_bottom),
                    (BlockSide::FRONT, &c.connect_front, &c.disconnected_front),
                    (BlockSide::LEFT, &c.connect_left, &c.disconnected_left),
                    (BlockSide::BACK, &c.connect_back, &c.disconnected_back),
                    (BlockSide::RIGHT, &c.connect_right, &c.disconnected_right),
                ];
                for (side, connected, disconnected) in per_side {
                    if neighbors & side.connect_bit() != 0 {
                        boxes.extend_from_slice(connected);
                    } else {
                        boxes.extend_from_slice(disconnected);
                    }
                }
                if neighbors == 0 {
                    boxes.extend_from_slice(&c.disconnected);
                }
                if neighbors & SIDE_CONNECT_BITS == 0 {
                    boxes.extend_from_slice(&c.disconnected_sides);
                }
                boxes
            }
        }
    }
}
