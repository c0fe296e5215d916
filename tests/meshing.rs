use std::sync::Arc;

use cgmath::{Point3, Vector3};
use voxel_world::{
    core::settings::MeshSettings,
    engine_state::{
        rendering::{
            meshing::{mesh_make_data::MeshMakeData, prebaked::MeshRegistry, MapBlockMesh, MeshContext},
            texture::{ShaderRegistry, TextureRegistry},
            tile::RenderPass,
        },
        voxels::{
            block::{MapNode, CONTENT_AIR, LIGHT_SUN},
            lighting::recalculate_lighting,
            map_block::{
                generation::{TerrainGenerator, TerrainPalette},
                MapBlock,
            },
            node_registry::NodeRegistry,
            world::{Map, ModifiedBlocks},
            BlockPos, BS,
        },
    },
};

const DEFS: &str = r#"[
    {"name": "stone", "tiles": ["stone.png"]},
    {"name": "dirt", "tiles": ["dirt.png"]},
    {"name": "grass", "tiles": ["grass.png", "dirt.png", "grass_side.png"]},
    {"name": "water_source", "drawtype": "liquid", "paramtype": "light",
     "liquidtype": "source", "walkable": false, "alpha": "blend",
     "liquid_alternative_flowing": "water_flowing",
     "liquid_alternative_source": "water_source", "tiles": ["water.png"]},
    {"name": "water_flowing", "drawtype": "flowing_liquid", "paramtype": "light",
     "liquidtype": "flowing", "walkable": false, "paramtype2": "flowing_liquid",
     "liquid_alternative_flowing": "water_flowing",
     "liquid_alternative_source": "water_source", "tiles": ["water.png"]}
]"#;

fn settings(smooth_lighting: bool) -> MeshSettings {
    MeshSettings {
        enable_shaders: true,
        smooth_lighting,
        enable_mesh_cache: false,
        ambient_occlusion_gamma: 2.2,
        desync_animation: false,
    }
}

fn context(settings: MeshSettings) -> MeshContext {
    let textures = Arc::new(TextureRegistry::new());
    for name in ["stone.png", "dirt.png", "grass.png", "grass_side.png", "water.png"] {
        textures.add_source_image(name, 16, 16);
    }
    let mut registry = NodeRegistry::from_json(DEFS).unwrap();
    registry.update_textures(textures.as_ref(), &ShaderRegistry::new(), &settings);
    MeshContext::new(Arc::new(registry), textures, Arc::new(MeshRegistry::new()), settings)
}

/// Lit map holding `center` surrounded by open air.
fn map_around(ctx: &MeshContext, center: MapBlock) -> Map {
    let mut map = Map::new(Arc::clone(&ctx.registry));
    let p = center.position;
    let mut blocks = Vec::new();
    for z in -1..=1 {
        for y in -1..=1 {
            for x in -1..=1 {
                let b = p + Vector3::new(x, y, z);
                blocks.push(b);
                if b != p {
                    map.insert_block(MapBlock::filled(b, MapNode::air()));
                }
            }
        }
    }
    map.insert_block(center);
    recalculate_lighting(&mut map, &blocks, &mut ModifiedBlocks::new());
    map
}

/// `center` surrounded by air carrying the same light everywhere.
fn evenly_lit_map(ctx: &MeshContext, center: MapBlock) -> Map {
    let mut map = Map::new(Arc::clone(&ctx.registry));
    let lit_air = MapNode::with_params(CONTENT_AIR, LIGHT_SUN, 0);
    let p = center.position;
    for z in -1..=1 {
        for y in -1..=1 {
            for x in -1..=1 {
                let b = p + Vector3::new(x, y, z);
                if b != p {
                    map.insert_block(MapBlock::filled(b, lit_air));
                }
            }
        }
    }
    map.insert_block(center);
    map
}

fn build(ctx: &MeshContext, map: &Map, p: BlockPos) -> MapBlockMesh {
    let mut data = MeshMakeData::new(p, ctx.settings.enable_shaders);
    data.fill_from_map(map);
    data.set_smooth_lighting(ctx.settings.smooth_lighting);
    MapBlockMesh::new(&data, ctx)
}

#[test]
fn solid_block_merges_into_one_quad_per_side() {
    let ctx = context(settings(false));
    let stone = ctx.registry.get_id("stone").unwrap();
    let p = Point3::new(2, -1, 0);
    let map = evenly_lit_map(&ctx, MapBlock::filled(p, MapNode::new(stone)));
    let mesh = build(&ctx, &map, p);

    assert_eq!(mesh.triangle_count(), 12);
    let buffers = mesh.buffers(RenderPass::Solid);
    let quads: Vec<_> = buffers
        .iter()
        .flat_map(|b| b.vertices.chunks_exact(4))
        .collect();
    assert_eq!(quads.len(), 6);

    let mut normals = Vec::new();
    for quad in quads {
        let extents: Vec<f32> = (0..3)
            .map(|axis| {
                let lo = quad.iter().fold(f32::MAX, |m, v| m.min(v.position[axis]));
                let hi = quad.iter().fold(f32::MIN, |m, v| m.max(v.position[axis]));
                hi - lo
            })
            .collect();
        let flat: Vec<usize> = (0..3).filter(|&a| extents[a] < 1e-4).collect();
        assert_eq!(flat.len(), 1, "quad extents {extents:?}");
        for (axis, extent) in extents.iter().enumerate() {
            if axis != flat[0] {
                assert!((extent - 16.0 * BS).abs() < 1e-3, "quad extents {extents:?}");
            }
        }
        normals.push(quad[0].normal.map(|c| c.round() as i32));
    }
    normals.sort();
    normals.dedup();
    assert_eq!(normals.len(), 6);
}

#[test]
fn rebuilding_generated_terrain_is_deterministic() {
    for smooth in [false, true] {
        let ctx = context(settings(smooth));
        let palette =
            TerrainPalette::from_registry(&ctx.registry, "stone", "dirt", "grass", "water_source");
        let generator = TerrainGenerator::new(1234, palette);
        let x = 3;
        let z = -2;
        let y = generator.surface_height(x * 16 + 8, z * 16 + 8).div_euclid(16);
        let p = Point3::new(x, y, z);
        let map = map_around(&ctx, generator.generate(p));

        let a = build(&ctx, &map, p);
        let b = build(&ctx, &map, p);
        assert!(!a.is_empty());
        for pass in [RenderPass::Solid, RenderPass::Transparent] {
            assert_eq!(a.buffers(pass), b.buffers(pass));
        }
        assert_eq!(a.triangle_count(), b.triangle_count());
    }
}

#[test]
fn faces_between_solid_nodes_are_hidden() {
    let ctx = context(settings(false));
    let stone = ctx.registry.get_id("stone").unwrap();
    let dirt = ctx.registry.get_id("dirt").unwrap();
    let p = Point3::new(0, 0, 0);
    let mut block = MapBlock::filled(p, MapNode::air());
    block.set_node(Point3::new(4, 4, 4), MapNode::new(stone));
    block.set_node(Point3::new(5, 4, 4), MapNode::new(dirt));
    let map = map_around(&ctx, block);
    let mesh = build(&ctx, &map, p);

    // Two cubes touching on one side: 5 visible faces each.
    assert_eq!(mesh.triangle_count(), 20);
    assert!(mesh.buffers(RenderPass::Transparent).is_empty());
}

#[test]
fn liquids_are_drawn_in_the_transparent_pass() {
    let ctx = context(settings(false));
    let water = ctx.registry.get_id("water_source").unwrap();
    let p = Point3::new(0, -1, 0);
    let mut block = MapBlock::filled(p, MapNode::air());
    for x in 0..4 {
        block.set_node(Point3::new(x, 15, 0), MapNode::new(water));
    }
    let map = map_around(&ctx, block);
    let mesh = build(&ctx, &map, p);

    assert!(mesh.buffers(RenderPass::Solid).is_empty());
    assert!(!mesh.buffers(RenderPass::Transparent).is_empty());
}
