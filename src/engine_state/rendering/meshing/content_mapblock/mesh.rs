//! Prebaked models.

use cgmath::{Vector2, Vector3};

use crate::engine_state::{
    rendering::{meshing::MeshRotation, Vertex},
    voxels::node_registry::draw_type::ParamType2,
};

use super::MapblockMeshGenerator;

impl MapblockMeshGenerator<'_> {
    pub(super) fn draw_mesh_node(&mut self) {
        let rotation = match self.f.param_type_2 {
            ParamType2::Facedir => MeshRotation::Facedir(self.n.facedir(self.f)),
            ParamType2::Wallmounted => MeshRotation::Wallmounted(self.n.wallmounted(self.f)),
            ParamType2::Degrotate => MeshRotation::Degrotate(self.n.param2 % 240),
            _ => MeshRotation::None,
        };
        let Some(mesh) = self.ctx.node_mesh(self.f, rotation) else {
            return;
        };

        for (j, buffer) in mesh.buffers.iter().enumerate() {
            let tile = self.use_tile(j, 0, 0, false);
            let vertices: Vec<Vertex> = buffer
                .positions
                .iter()
                .zip(&buffer.normals)
                .zip(&buffer.uvs)
                .map(|((p, n), uv)| {
                    let pos = Vector3::from(*p);
                    Vertex::new(
                        pos + self.origin,
                        Vector3::from(*n),
                        self.light_color(pos),
                        Vector2::from(*uv),
                    )
                })
                .collect();
            self.collector.append(&tile, &vertices, &buffer.indices);
        }
    }
}
