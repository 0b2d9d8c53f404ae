// src/lines/visuals.rs
//! Bevy-side drawing: one line-list mesh per chunk, one merged mesh per pole pool,
//! one mesh entity per hanging prop, optional bounds gizmos.

use std::collections::HashMap;

use bevy::asset::LoadState;
use bevy::prelude::*;
use bevy::render::mesh::{Indices, PrimitiveTopology, VertexAttributeValues};
use bevy::render::primitives::Aabb;

use super::core::{Bounds, ChunkKey};
use super::hanging::HangingChanged;
use super::plugin::{PoleBatchChanged, PowerLineSettings};
use super::pool::PoolKey;
use super::render::{ChunkLineMeshes, LineMeshData};
use super::subsystem::PowerLineSubsystem;

#[derive(Resource)]
pub struct PoleBatchConfig {
    pub max_merges_per_frame: usize,
}
impl Default for PoleBatchConfig {
    fn default() -> Self {
        Self { max_merges_per_frame: 2 }
    }
}

/// Shared unlit material; vertex colours carry the wire colour.
#[derive(Resource, Default)]
pub struct PowerLineMaterial(pub Handle<StandardMaterial>);

#[derive(Component, Clone, Copy, Debug)]
pub struct ChunkLineVisual {
    pub chunk: ChunkKey,
}

/// One merged pole mesh per (chunk, mesh) pool.
#[derive(Component)]
pub struct PoleBatch {
    pub key: PoolKey,
    pub base_mesh: Handle<Mesh>,
    pub dirty: bool,
    pub last_built_count: usize,
}

#[derive(Component, Clone, Copy, Debug)]
pub struct HangingProp {
    pub line: Entity,
}

#[derive(Resource, Default)]
pub struct PowerLineVisuals {
    pub chunks: HashMap<ChunkKey, Entity>,
    pub pole_batches: HashMap<PoolKey, Entity>,
    pub hanging: HashMap<Entity, Entity>,
}

pub struct PowerLineVisualsPlugin;

impl Plugin for PowerLineVisualsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PoleBatchConfig>()
            .init_resource::<PowerLineMaterial>()
            .init_resource::<PowerLineVisuals>()
            .add_systems(Startup, init_line_material)
            .add_systems(
                Update,
                (
                    apply_chunk_line_meshes,
                    queue_pole_batches,
                    rebuild_dirty_pole_batches,
                    sync_hanging_props,
                    draw_debug_bounds,
                )
                    .chain(),
            );
    }
}

fn init_line_material(mut commands: Commands, mut materials: ResMut<Assets<StandardMaterial>>) {
    let handle = materials.add(StandardMaterial {
        base_color: Color::WHITE,
        unlit: true,
        ..Default::default()
    });
    commands.insert_resource(PowerLineMaterial(handle));
}

/// Line-list mesh from consumed chunk data.
pub fn build_line_mesh(data: &LineMeshData) -> Mesh {
    let mut mesh = Mesh::new(PrimitiveTopology::LineList, Default::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, data.positions.clone());
    mesh.insert_attribute(Mesh::ATTRIBUTE_COLOR, data.colors.clone());
    mesh
}

/// Culling volume from the published bounds. Bevy only computes an `Aabb` once per
/// entity, so it is replaced together with the mesh.
pub fn chunk_aabb(bounds: &Bounds) -> Aabb {
    Aabb::from_min_max(bounds.min, bounds.max)
}

/// Replace the mesh of every chunk the render side refreshed.
pub fn apply_chunk_line_meshes(
    mut commands: Commands,
    mut consumed: ResMut<ChunkLineMeshes>,
    mut visuals: ResMut<PowerLineVisuals>,
    material: Res<PowerLineMaterial>,
    mut meshes: ResMut<Assets<Mesh>>,
) {
    if consumed.updated.is_empty() { return; }
    let ChunkLineMeshes { by_chunk, updated } = &mut *consumed;

    for chunk in std::mem::take(updated) {
        let Some(data) = by_chunk.get(&chunk) else { continue };
        let vis = if data.is_empty() { Visibility::Hidden } else { Visibility::Visible };
        let mesh = meshes.add(build_line_mesh(data));
        let aabb = chunk_aabb(&data.bounds);

        match visuals.chunks.get(&chunk) {
            Some(&e) => {
                commands.entity(e).insert((Mesh3d(mesh), aabb, vis));
            }
            None => {
                let e = commands
                    .spawn((
                        ChunkLineVisual { chunk },
                        Mesh3d(mesh),
                        aabb,
                        MeshMaterial3d(material.0.clone()),
                        Transform::default(),
                        vis,
                        Name::new(format!("PowerLines {},{}", chunk.x, chunk.z)),
                    ))
                    .id();
                visuals.chunks.insert(chunk, e);
            }
        }
    }
}

/// Mark (or create) the batch entity of every pool the rebuild touched.
pub fn queue_pole_batches(
    mut commands: Commands,
    mut events: EventReader<PoleBatchChanged>,
    mut visuals: ResMut<PowerLineVisuals>,
    mut q_batch: Query<&mut PoleBatch>,
    asset_server: Res<AssetServer>,
) {
    for PoleBatchChanged(key) in events.read() {
        if let Some(&e) = visuals.pole_batches.get(key) {
            if let Ok(mut batch) = q_batch.get_mut(e) {
                batch.dirty = true;
                continue;
            }
        }
        let e = commands
            .spawn((
                PoleBatch {
                    key: key.clone(),
                    base_mesh: asset_server.load(key.mesh.as_str()),
                    dirty: true,
                    last_built_count: 0,
                },
                Name::new(format!("Poles {},{} / {}", key.chunk.x, key.chunk.z, key.mesh.as_str())),
                Transform::default(),
                Visibility::Hidden,
            ))
            .id();
        visuals.pole_batches.insert(key.clone(), e);
    }
}

/// Merge pool transforms into one mesh per batch, a few batches per frame.
pub fn rebuild_dirty_pole_batches(
    mut commands: Commands,
    mut q_batches: Query<(Entity, &mut PoleBatch)>,
    subsystem: Res<PowerLineSubsystem>,
    cfg: Res<PoleBatchConfig>,
    asset_server: Res<AssetServer>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let mut merged_this_frame = 0usize;

    for (e, mut batch) in q_batches.iter_mut() {
        if !batch.dirty { continue; }
        if merged_this_frame >= cfg.max_merges_per_frame { break; }

        let transforms = subsystem.pools().pool(&batch.key).map(|p| p.transforms()).unwrap_or(&[]);
        if transforms.is_empty() {
            commands.entity(e).insert(Visibility::Hidden);
            batch.dirty = false;
            batch.last_built_count = 0;
            continue;
        }

        let Some(src_mesh) = meshes.get(&batch.base_mesh) else {
            // still loading, or never will be
            if matches!(asset_server.load_state(batch.base_mesh.id()), LoadState::Failed(_)) {
                warn!("PowerLines: pole mesh '{}' failed to load; batch left empty", batch.key.mesh.as_str());
                batch.dirty = false;
            }
            continue;
        };
        let Some(merged) = merge_mesh_instances(src_mesh, transforms) else {
            warn!("PowerLines: pole mesh '{}' has no usable positions", batch.key.mesh.as_str());
            batch.dirty = false;
            continue;
        };
        let merged_handle = meshes.add(merged);
        let mat_handle = materials.add(StandardMaterial {
            base_color: Color::srgb(0.35, 0.27, 0.2),
            perceptual_roughness: 1.0,
            ..Default::default()
        });

        commands.entity(e).insert((Mesh3d(merged_handle), MeshMaterial3d(mat_handle), Visibility::Visible));
        batch.last_built_count = transforms.len();
        batch.dirty = false;
        merged_this_frame += 1;
    }
}

/// Bake every instance transform into one mesh (positions, normals, UVs, indices).
pub fn merge_mesh_instances(src: &Mesh, instances: &[Transform]) -> Option<Mesh> {
    let positions: Vec<[f32; 3]> = match src.attribute(Mesh::ATTRIBUTE_POSITION)? {
        VertexAttributeValues::Float32x3(v) => v.clone(),
        _ => return None,
    };
    let normals: Option<Vec<[f32; 3]>> = src.attribute(Mesh::ATTRIBUTE_NORMAL).and_then(|vals| match vals {
        VertexAttributeValues::Float32x3(v) => Some(v.clone()),
        _ => None,
    });
    let uvs: Option<Vec<[f32; 2]>> = src.attribute(Mesh::ATTRIBUTE_UV_0).and_then(|vals| match vals {
        VertexAttributeValues::Float32x2(v) => Some(v.clone()),
        _ => None,
    });
    let src_indices: Option<Vec<u32>> = match src.indices() {
        Some(Indices::U32(v)) => Some(v.clone()),
        Some(Indices::U16(v)) => Some(v.iter().map(|&x| x as u32).collect()),
        None => None,
    };

    let src_vtx = positions.len();
    let n = instances.len();
    let mut out_positions = Vec::with_capacity(src_vtx * n);
    let mut out_normals = normals.as_ref().map(|_| Vec::with_capacity(src_vtx * n));
    let mut out_uvs = uvs.as_ref().map(|_| Vec::with_capacity(src_vtx * n));
    let mut out_indices: Vec<u32> = Vec::with_capacity(src_indices.as_ref().map_or(0, |ix| ix.len()) * n);

    for (inst_id, t) in instances.iter().enumerate() {
        let trs = Mat4::from_scale_rotation_translation(t.scale, t.rotation, t.translation);
        out_positions.extend(positions.iter().map(|p| trs.transform_point3(Vec3::from_array(*p)).to_array()));

        if let (Some(src), Some(dst)) = (normals.as_ref(), out_normals.as_mut()) {
            dst.extend(src.iter().map(|n| (t.rotation * Vec3::from_array(*n)).to_array()));
        }
        if let (Some(src), Some(dst)) = (uvs.as_ref(), out_uvs.as_mut()) {
            dst.extend_from_slice(src);
        }
        if let Some(ix) = &src_indices {
            let base = (inst_id * src_vtx) as u32;
            out_indices.extend(ix.iter().map(|&i| i + base));
        }
    }

    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, Default::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, out_positions);
    if let Some(nrm) = out_normals { mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, nrm); }
    if let Some(uv) = out_uvs { mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uv); }
    if src_indices.is_some() { mesh.insert_indices(Indices::U32(out_indices)); }
    Some(mesh)
}

/// Spawn, move or despawn the mesh hanging from each wire.
pub fn sync_hanging_props(
    mut commands: Commands,
    mut events: EventReader<HangingChanged>,
    mut visuals: ResMut<PowerLineVisuals>,
    asset_server: Res<AssetServer>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    for ev in events.read() {
        match ev {
            HangingChanged::Placed { line, mesh, transform } => {
                let handle: Handle<Mesh> = asset_server.load(mesh.as_str());
                if let Some(&e) = visuals.hanging.get(line) {
                    commands.entity(e).insert((Mesh3d(handle), *transform));
                    continue;
                }
                let mat = materials.add(StandardMaterial { base_color: Color::WHITE, ..Default::default() });
                let e = commands
                    .spawn((
                        HangingProp { line: *line },
                        Mesh3d(handle),
                        MeshMaterial3d(mat),
                        *transform,
                        Name::new(format!("Hanging {}", mesh.as_str())),
                    ))
                    .id();
                visuals.hanging.insert(*line, e);
            }
            HangingChanged::Removed { line } => {
                if let Some(e) = visuals.hanging.remove(line) {
                    commands.entity(e).despawn();
                }
            }
        }
    }
}

fn draw_debug_bounds(settings: Res<PowerLineSettings>, consumed: Res<ChunkLineMeshes>, mut gizmos: Gizmos) {
    if !settings.debug_draw { return; }
    for data in consumed.by_chunk.values() {
        let color = if data.is_empty() { Color::srgb(0.6, 0.6, 0.6) } else { Color::srgb(1.0, 0.8, 0.1) };
        let b = data.bounds;
        gizmos.cuboid(Transform::from_translation(b.center()).with_scale(b.size()), color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::ecs::system::RunSystemOnce;
    use crate::lines::core::MeshRef;
    use bevy::math::Vec3A;
    use bevy::render::render_asset::RenderAssetUsages;

    fn triangle() -> Mesh {
        let mut m = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
        m.insert_attribute(Mesh::ATTRIBUTE_POSITION, vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]);
        m.insert_indices(Indices::U32(vec![0, 1, 2]));
        m
    }

    #[test]
    fn merged_mesh_offsets_indices_per_instance() {
        let merged = merge_mesh_instances(
            &triangle(),
            &[Transform::from_xyz(10.0, 0.0, 0.0), Transform::from_xyz(0.0, 0.0, 5.0)],
        )
        .unwrap();
        assert_eq!(merged.count_vertices(), 6);
        let Some(Indices::U32(ix)) = merged.indices() else { panic!("expected u32 indices") };
        assert_eq!(ix, &vec![0, 1, 2, 3, 4, 5]);
        let Some(VertexAttributeValues::Float32x3(p)) = merged.attribute(Mesh::ATTRIBUTE_POSITION) else {
            panic!("expected positions")
        };
        assert_eq!(p[1], [11.0, 0.0, 0.0]);
        assert_eq!(p[3], [0.0, 0.0, 5.0]);
    }

    #[test]
    fn republished_chunk_replaces_culling_box() {
        let mut world = World::new();
        world.init_resource::<Assets<Mesh>>();
        world.init_resource::<PowerLineMaterial>();
        world.init_resource::<PowerLineVisuals>();
        world.init_resource::<ChunkLineMeshes>();
        let chunk = ChunkKey::new(0, 0);

        let publish = |world: &mut World, bounds: Bounds, revision: u64| {
            let mut consumed = world.resource_mut::<ChunkLineMeshes>();
            consumed.by_chunk.insert(
                chunk,
                LineMeshData {
                    positions: vec![bounds.min.to_array(), bounds.max.to_array()],
                    colors: vec![[1.0; 4]; 2],
                    bounds,
                    revision,
                },
            );
            consumed.updated.insert(chunk);
        };

        // a point-like stub first, then a long wire somewhere else
        publish(&mut world, Bounds::around(Vec3::new(10.0, 300.0, 10.0), 1.0), 1);
        world.run_system_once(apply_chunk_line_meshes).unwrap();
        let e = world.resource::<PowerLineVisuals>().chunks[&chunk];
        assert_eq!(world.get::<Aabb>(e).unwrap().center, Vec3A::new(10.0, 300.0, 10.0));

        let wide = Bounds { min: Vec3::new(0.0, 200.0, 0.0), max: Vec3::new(4000.0, 300.0, 20.0) };
        publish(&mut world, wide, 2);
        world.run_system_once(apply_chunk_line_meshes).unwrap();
        let aabb = world.get::<Aabb>(e).unwrap();
        assert_eq!(aabb.center, Vec3A::new(2000.0, 250.0, 10.0));
        assert_eq!(aabb.half_extents, Vec3A::new(2000.0, 50.0, 10.0));
    }

    #[test]
    fn failed_base_mesh_stops_retrying() {
        let mut app = App::new();
        app.add_plugins((MinimalPlugins, AssetPlugin::default()))
            .init_asset::<Mesh>()
            .init_asset::<StandardMaterial>()
            .init_resource::<PoleBatchConfig>()
            .insert_resource(PowerLineSubsystem::default())
            .add_systems(Update, rebuild_dirty_pole_batches);

        let mesh = MeshRef::from("missing/pole.glb");
        let pole = app.world_mut().spawn_empty().id();
        {
            let mut sys = app.world_mut().resource_mut::<PowerLineSubsystem>();
            sys.register_pole(pole, Transform::default(), Some(mesh.clone()));
            sys.rebuild_dirty();
        }
        let base_mesh = app.world().resource::<AssetServer>().load(mesh.as_str());
        let batch = app
            .world_mut()
            .spawn(PoleBatch { key: PoolKey::new(ChunkKey::new(0, 0), mesh), base_mesh, dirty: true, last_built_count: 0 })
            .id();

        for _ in 0..500 {
            app.update();
            if !app.world().get::<PoleBatch>(batch).unwrap().dirty {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        let built = app.world().get::<PoleBatch>(batch).unwrap();
        assert!(!built.dirty);
        assert_eq!(built.last_built_count, 0);
    }
}
