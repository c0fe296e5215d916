//! Torches and signs, placed by their `wallmounted` direction.

use cgmath::Vector3;

use crate::engine_state::{
    rendering::tile::{MATERIAL_FLAG_BACKFACE_CULLING, MATERIAL_FLAG_CRACK_OVERLAY},
    voxels::BS,
};

use super::{rotate_xy_by, rotate_xz_by, MapblockMeshGenerator};

/// Wallmounted directions.
const WALL_CEILING: u8 = 0;
const WALL_FLOOR: u8 = 1;
const WALL_XP: u8 = 2;
const WALL_XN: u8 = 3;
const WALL_ZP: u8 = 4;
const WALL_ZN: u8 = 5;

impl MapblockMeshGenerator<'_> {
    pub(super) fn draw_torchlike_node(&mut self) {
        let wall = self.n.wallmounted(self.f);
        let tile_index = match wall {
            WALL_CEILING => 1,
            WALL_FLOOR => 0,
            _ => 2,
        };
        let tile = self.use_tile(
            tile_index,
            MATERIAL_FLAG_CRACK_OVERLAY,
            MATERIAL_FLAG_BACKFACE_CULLING,
            false,
        );

        let size = BS / 2.0 * self.f.visual_scale;
        let coords = [
            Vector3::new(-size, -size, 0.0),
            Vector3::new(size, -size, 0.0),
            Vector3::new(size, size, 0.0),
            Vector3::new(-size, size, 0.0),
        ]
        .map(|mut v| match wall {
            WALL_CEILING => {
                v.y += -size + BS / 2.0;
                rotate_xz_by(v, -45.0)
            }
            WALL_FLOOR => {
                v.y += size - BS / 2.0;
                rotate_xz_by(v, 45.0)
            }
            _ => {
                v.x += -size + BS / 2.0;
                let angle = match wall {
                    WALL_XN => 180.0,
                    WALL_ZP => 90.0,
                    WALL_ZN => -90.0,
                    _ => 0.0,
                };
                rotate_xz_by(v, angle)
            }
        });
        self.draw_quad(&tile, coords, None, None);
    }

    pub(super) fn draw_signlike_node(&mut self) {
        let wall = self.n.wallmounted(self.f);
        let tile = self.use_tile(
            0,
            MATERIAL_FLAG_CRACK_OVERLAY,
            MATERIAL_FLAG_BACKFACE_CULLING,
            false,
        );

        let offset = BS / 16.0;
        let size = BS / 2.0 * self.f.visual_scale;
        // Against the +X wall before rotating.
        let x = BS / 2.0 - offset;
        let coords = [
            Vector3::new(x, -size, -size),
            Vector3::new(x, -size, size),
            Vector3::new(x, size, size),
            Vector3::new(x, size, -size),
        ]
        .map(|v| match wall {
            WALL_CEILING => rotate_xy_by(v, 90.0),
            WALL_FLOOR => rotate_xy_by(v, -90.0),
            WALL_XP => v,
            WALL_XN => rotate_xz_by(v, 180.0),
            WALL_ZP => rotate_xz_by(v, 90.0),
            WALL_ZN => rotate_xz_by(v, -90.0),
            _ => v,
        });
        self.draw_quad(&tile, coords, None, None);
    }
}
