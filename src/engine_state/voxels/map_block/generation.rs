//! Noise-driven terrain for hosts and demos that need a world without a
//! map generator of their own.

use cgmath::Point3;
use noise::{NoiseFn, Perlin};

use crate::engine_state::voxels::{
    block::{ContentId, MapNode, CONTENT_AIR},
    node_registry::NodeRegistry,
    BlockPos, MAP_BLOCKSIZE,
};

use super::MapBlock;

/// Threshold above which cave noise carves the terrain away.
pub const CAVE_POSITIVE_THRESHOLD: f64 = 0.55;
/// Threshold below which cave noise carves the terrain away.
pub const CAVE_NEGATIVE_THRESHOLD: f64 = -0.55;
/// Scaling factor applied to node coordinates when sampling cave noise.
pub const CAVE_SCALE_FACTOR: f64 = 0.06;
/// Scaling factor applied to node coordinates when sampling height noise.
pub const HEIGHT_SCALE_FACTOR: f64 = 0.015;
/// Height variation around sea level, in nodes.
pub const HEIGHT_AMPLITUDE: f64 = 12.0;

/// Content ids the generator places.
#[derive(Copy, Clone, Debug)]
pub struct TerrainPalette {
    /// Below the surface layers
    pub stone: ContentId,
    /// The few layers under the surface
    pub dirt: ContentId,
    /// The surface node above sea level
    pub grass: ContentId,
    /// Fills air below sea level
    pub water: ContentId,
}

impl TerrainPalette {
    /// Looks the palette up by node name. Missing names fall back to air.
    pub fn from_registry(
        registry: &NodeRegistry,
        stone: &str,
        dirt: &str,
        grass: &str,
        water: &str,
    ) -> Self {
        let id = |name: &str| registry.get_id(name).unwrap_or(CONTENT_AIR);
        TerrainPalette {
            stone: id(stone),
            dirt: id(dirt),
            grass: id(grass),
            water: id(water),
        }
    }
}

/// Generates blocks from 2D height noise with 3D cave noise carved out.
pub struct TerrainGenerator {
    height_noise: Perlin,
    cave_noise: Perlin,
    palette: TerrainPalette,
    /// Water fills air at and below this height
    pub sea_level: i32,
}

impl TerrainGenerator {
    /// Creates a generator.
    ///
    /// # Arguments
    /// * `seed` - Seed of both noise functions
    /// * `palette` - Content ids to place
    pub fn new(seed: u32, palette: TerrainPalette) -> Self {
        TerrainGenerator {
            height_noise: Perlin::new(seed),
            cave_noise: Perlin::new(seed.wrapping_add(1)),
            palette,
            sea_level: 0,
        }
    }

    /// Surface height of a column.
    pub fn surface_height(&self, x: i32, z: i32) -> i32 {
        let sample = self
            .height_noise
            .get([x as f64 * HEIGHT_SCALE_FACTOR, z as f64 * HEIGHT_SCALE_FACTOR]);
        (sample * HEIGHT_AMPLITUDE).round() as i32 + 2
    }

    fn is_cave(&self, p: Point3<i32>) -> bool {
        let sample = self.cave_noise.get([
            p.x as f64 * CAVE_SCALE_FACTOR,
            p.y as f64 * CAVE_SCALE_FACTOR,
            p.z as f64 * CAVE_SCALE_FACTOR,
        ]);
        !(CAVE_NEGATIVE_THRESHOLD..=CAVE_POSITIVE_THRESHOLD).contains(&sample)
    }

    fn node_at(&self, p: Point3<i32>, surface: i32) -> MapNode {
        if p.y > surface {
            if p.y <= self.sea_level {
                return MapNode::new(self.palette.water);
            }
            return MapNode::air();
        }
        if p.y < surface - 1 && self.is_cave(p) {
            return MapNode::air();
        }
        let content = if p.y == surface && surface >= self.sea_level {
            self.palette.grass
        } else if p.y > surface - 3 {
            self.palette.dirt
        } else {
            self.palette.stone
        };
        MapNode::new(content)
    }

    /// Generates the block at `position`. Lighting is left to the caller.
    pub fn generate(&self, position: BlockPos) -> MapBlock {
        let mut block = MapBlock::filled(position, MapNode::air());
        let origin = block.origin();
        let top = origin.y + MAP_BLOCKSIZE - 1;
        let mut underground = true;

        for z in 0..MAP_BLOCKSIZE {
            for x in 0..MAP_BLOCKSIZE {
                let surface = self.surface_height(origin.x + x, origin.z + z);
                if surface < top {
                    underground = false;
                }
                for y in 0..MAP_BLOCKSIZE {
                    let p = Point3::new(origin.x + x, origin.y + y, origin.z + z);
                    block.set_node(Point3::new(x, y, z), self.node_at(p, surface));
                }
            }
        }
        block.is_underground = underground;
        block
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn palette() -> TerrainPalette {
        TerrainPalette {
            stone: 1,
            dirt: 2,
            grass: 3,
            water: 4,
        }
    }

    #[test]
    fn generation_is_deterministic() {
        let a = TerrainGenerator::new(3, palette()).generate(Point3::new(0, 0, 0));
        let b = TerrainGenerator::new(3, palette()).generate(Point3::new(0, 0, 0));
        assert_eq!(a.nodes(), b.nodes());
    }

    #[test]
    fn deep_blocks_are_underground_and_high_blocks_are_open() {
        let generator = TerrainGenerator::new(3, palette());
        let deep = generator.generate(Point3::new(0, -6, 0));
        assert!(deep.is_underground);
        let sky = generator.generate(Point3::new(0, 6, 0));
        assert!(!sky.is_underground);
        assert!(sky.nodes().iter().all(|n| n.content == CONTENT_AIR));
    }
}
