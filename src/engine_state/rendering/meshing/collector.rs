//! Gathers generated geometry into per-material buffers.
//!
//! Every generator hands its quads to a `MeshCollector` together with the
//! tile they use. The collector appends them to the buffer of the matching
//! material in the tile's render pass, creating buffers on demand, so the
//! finished mesh has one buffer per distinct material and tile layer.

use cgmath::Vector3;

use crate::engine_state::rendering::{
    color::apply_face_shading,
    tile::{RenderPass, TileLayer, TileSpec},
    Vertex,
};

/// Geometry of one material before it becomes a mesh buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct PreMeshBuffer {
    /// Material of every triangle in the buffer
    pub layer: TileLayer,
    /// 0 for base layers, 1 for overlays
    pub tile_layer: u8,
    /// Vertices
    pub vertices: Vec<Vertex>,
    /// Triangle list indices into `vertices`
    pub indices: Vec<u32>,
}

/// Per-pass lists of buffers under construction.
#[derive(Debug)]
pub struct MeshCollector {
    /// Buffers indexed by `RenderPass`
    pub prebuffers: [Vec<PreMeshBuffer>; 2],
    /// Shade vertex colors by face direction
    apply_shading: bool,
    /// Added to every appended vertex position
    offset: Vector3<f32>,
}

impl MeshCollector {
    /// Creates an empty collector.
    ///
    /// # Arguments
    /// * `apply_shading` - Darken colors by face direction; used without shaders
    pub fn new(apply_shading: bool) -> Self {
        MeshCollector {
            prebuffers: [Vec::new(), Vec::new()],
            apply_shading,
            offset: Vector3::new(0.0, 0.0, 0.0),
        }
    }

    /// Sets the translation applied to appended vertices.
    pub fn set_offset(&mut self, offset: Vector3<f32>) {
        self.offset = offset;
    }

    /// Appends geometry once per non-empty layer of a tile.
    ///
    /// # Arguments
    /// * `tile` - Tile the geometry is textured with
    /// * `vertices` - Vertices with encoded light colors
    /// * `indices` - Triangle list indices into `vertices`
    pub fn append(&mut self, tile: &TileSpec, vertices: &[Vertex], indices: &[u32]) {
        for (tile_layer, layer) in tile.layers.iter().enumerate() {
            if layer.is_empty() {
                continue;
            }
            let shade = self.apply_shading && tile.emissive_light == 0;
            let offset = self.offset;
            let buffer = self.find_buffer(layer, tile_layer as u8);
            let base = buffer.vertices.len() as u32;
            buffer.vertices.extend(vertices.iter().map(|v| {
                let mut v = *v;
                v.position = (v.pos() + offset).into();
                if shade {
                    apply_face_shading(&mut v.color, v.normal);
                }
                v
            }));
            buffer.indices.extend(indices.iter().map(|i| base + i));
        }
    }

    fn find_buffer(&mut self, layer: &TileLayer, tile_layer: u8) -> &mut PreMeshBuffer {
        let pass = layer.material_type.render_pass() as usize;
        let buffers = &mut self.prebuffers[pass];
        let found = buffers
            .iter()
            .position(|b| b.tile_layer == tile_layer && b.layer == *layer);
        let index = match found {
            Some(index) => index,
            None => {
                buffers.push(PreMeshBuffer {
                    layer: layer.clone(),
                    tile_layer,
                    vertices: Vec::new(),
                    indices: Vec::new(),
                });
                buffers.len() - 1
            }
        };
        &mut buffers[index]
    }

    /// Buffers of a pass.
    pub fn buffers(&self, pass: RenderPass) -> &[PreMeshBuffer] {
        &self.prebuffers[pass as usize]
    }

    /// Total number of triangles collected.
    pub fn triangle_count(&self) -> usize {
        self.prebuffers
            .iter()
            .flatten()
            .map(|b| b.indices.len() / 3)
            .sum()
    }
}

/// Indices of a quad whose corners are listed counterclockwise.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::rendering::tile::MaterialType;
    use cgmath::Vector2;

    fn tile(texture_id: u32, material_type: MaterialType) -> TileSpec {
        let mut tile = TileSpec::default();
        tile.layers[0] = TileLayer {
            texture_id,
            material_type,
            ..TileLayer::default()
        };
        tile
    }

    fn quad() -> [Vertex; 4] {
        let n = Vector3::new(0.0, 1.0, 0.0);
        let uv = Vector2::new(0.0, 0.0);
        [
            Vertex::new(Vector3::new(0.0, 0.0, 0.0), n, [255; 4], uv),
            Vertex::new(Vector3::new(1.0, 0.0, 0.0), n, [255; 4], uv),
            Vertex::new(Vector3::new(1.0, 0.0, 1.0), n, [255; 4], uv),
            Vertex::new(Vector3::new(0.0, 0.0, 1.0), n, [255; 4], uv),
        ]
    }

    #[test]
    fn same_material_shares_a_buffer() {
        let mut collector = MeshCollector::new(false);
        let stone = tile(1, MaterialType::Opaque);
        collector.append(&stone, &quad(), &QUAD_INDICES);
        collector.append(&stone, &quad(), &QUAD_INDICES);
        collector.append(&tile(2, MaterialType::Opaque), &quad(), &QUAD_INDICES);
        collector.append(&tile(3, MaterialType::Alpha), &quad(), &QUAD_INDICES);

        let solid = collector.buffers(RenderPass::Solid);
        assert_eq!(solid.len(), 2);
        assert_eq!(solid[0].vertices.len(), 8);
        assert_eq!(&solid[0].indices[6..], &[4, 5, 6, 6, 7, 4]);
        assert_eq!(collector.buffers(RenderPass::Transparent).len(), 1);
        assert_eq!(collector.triangle_count(), 8);
    }

    #[test]
    fn overlays_get_their_own_buffers() {
        let mut collector = MeshCollector::new(false);
        let mut grass = tile(1, MaterialType::Opaque);
        grass.layers[1] = grass.layers[0].clone();
        collector.append(&grass, &quad(), &QUAD_INDICES);
        let solid = collector.buffers(RenderPass::Solid);
        assert_eq!(solid.len(), 2);
        assert_eq!((solid[0].tile_layer, solid[1].tile_layer), (0, 1));
    }

    #[test]
    fn shading_skips_emissive_tiles() {
        let mut collector = MeshCollector::new(true);
        let mut side = quad();
        for v in side.iter_mut() {
            v.normal = [1.0, 0.0, 0.0];
        }
        collector.append(&tile(1, MaterialType::Opaque), &side, &QUAD_INDICES);
        let mut lamp = tile(2, MaterialType::Opaque);
        lamp.emissive_light = 10;
        collector.append(&lamp, &side, &QUAD_INDICES);
        let solid = collector.buffers(RenderPass::Solid);
        assert!(solid[0].vertices[0].color[0] < 255);
        assert_eq!(solid[1].vertices[0].color[0], 255);
    }
}
