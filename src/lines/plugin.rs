//! Power lines plugin wiring (glue).
//! - Settings + subsystem resource
//! - Pole wire rigs (Update)
//! - Change detection -> subsystem calls, then one rebuild per frame (PostUpdate)
//! - Geometry / pool / hanging events for the render side

use std::collections::{BTreeSet, HashMap};

use bevy::prelude::*;
use bevy::transform::TransformSystem;
use serde::{Deserialize, Serialize};

use super::anchors::Anchor;
use super::core::ChunkKey;
use super::curve::SegmentSpacing;
use super::district::DistrictProfile;
use super::districts::AutoDiscovery;
use super::hanging::HangingChanged;
use super::pole::{AutoWire, PowerLinePole};
use super::pool::PoolKey;
use super::source::PowerLine;
use super::subsystem::PowerLineSubsystem;

/// Global knobs. Changing them at runtime re-dirties (or re-buckets) everything.
#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerLineSettings {
    /// Edge length of a chunk on the XZ plane.
    pub chunk_size: f32,
    pub auto_discovery: AutoDiscovery,
    pub spacing: SegmentSpacing,
    /// Half extent of the bounds reported for chunks without usable geometry.
    pub degenerate_bounds_extent: f32,
    /// District manifest loaded by the stack; `None` disables it.
    pub districts_path: Option<String>,
    pub debug_draw: bool,
}

impl Default for PowerLineSettings {
    fn default() -> Self {
        Self {
            chunk_size: 10_000.0,
            auto_discovery: AutoDiscovery::UniqueOnly,
            spacing: SegmentSpacing::Uniform,
            degenerate_bounds_extent: super::core::DEGENERATE_BOUNDS_EXTENT,
            districts_path: Some("powerlines/city.districts.ron".to_string()),
            debug_draw: false,
        }
    }
}

/// A district: every line that resolves to this entity uses its profile.
/// The entity's translation is its origin for nearest-district discovery.
#[derive(Component, Clone, Debug, Default)]
pub struct PowerLineDistrict(pub DistrictProfile);

/// Attach point on an actor (the parent, or this entity when it has none).
/// `Name` doubles as the anchor name for `ByName` lookups.
#[derive(Component, Clone, Debug, Default)]
pub struct WireAnchor {
    pub attach_id: Option<String>,
    pub tags: Vec<String>,
}

impl WireAnchor {
    pub fn tagged(tag: impl Into<String>) -> Self {
        Self { attach_id: None, tags: vec![tag.into()] }
    }
}

/// A chunk's handoff buffer got a new revision.
#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkGeometryChanged {
    pub chunk: ChunkKey,
    pub revision: u64,
}

/// Instances of a (chunk, mesh) pool changed.
#[derive(Event, Clone, Debug, PartialEq, Eq)]
pub struct PoleBatchChanged(pub PoolKey);

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum PowerLineSet {
    Rig,     // pole wire children (Update)
    Sync,    // ECS -> subsystem (PostUpdate, after transforms)
    Rebuild, // dirty chunks -> handoff buffers + events
}

pub struct PowerLinesPlugin;

impl Plugin for PowerLinesPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PowerLineSettings>();
        let settings = app.world().resource::<PowerLineSettings>().clone();
        info!(
            "PowerLines: chunk_size={}, discovery={:?}, spacing={:?}",
            settings.chunk_size, settings.auto_discovery, settings.spacing
        );

        app.insert_resource(PowerLineSubsystem::new(&settings))
            .add_event::<ChunkGeometryChanged>()
            .add_event::<PoleBatchChanged>()
            .add_event::<HangingChanged>()
            .configure_sets(
                PostUpdate,
                (
                    PowerLineSet::Sync.after(TransformSystem::TransformPropagate),
                    PowerLineSet::Rebuild.after(PowerLineSet::Sync),
                ),
            )
            .add_systems(Update, rig_pole_wires.in_set(PowerLineSet::Rig))
            .add_systems(
                PostUpdate,
                (
                    apply_settings_changes,
                    sync_removed,
                    sync_districts,
                    sync_poles,
                    sync_anchors,
                    sync_lines,
                    sync_target_origins,
                )
                    .chain()
                    .in_set(PowerLineSet::Sync),
            )
            .add_systems(PostUpdate, rebuild_dirty_chunks.in_set(PowerLineSet::Rebuild));
    }
}

fn owner_of(id: Entity, child_of: Option<&ChildOf>) -> Entity {
    child_of.map_or(id, |c| c.parent())
}

// ---------- Rig ----------

/// Spawn, restyle or despawn the `AutoWire` children of changed poles.
/// Poles targeting a changed pole are re-rigged too (their clamp may change).
pub fn rig_pole_wires(
    mut commands: Commands,
    changed: Query<Entity, Changed<PowerLinePole>>,
    poles: Query<(Entity, &PowerLinePole)>,
    wires: Query<(Entity, &AutoWire, &ChildOf)>,
    children: Query<&Children>,
    lines: Query<(), With<PowerLine>>,
) {
    let mut todo: BTreeSet<Entity> = changed.iter().collect();
    if todo.is_empty() {
        return;
    }
    for (e, p) in &poles {
        if p.target_pole.is_some_and(|t| todo.contains(&t)) {
            todo.insert(e);
        }
    }

    let mut existing: HashMap<Entity, HashMap<u32, Entity>> = HashMap::new();
    for (e, w, parent) in &wires {
        if todo.contains(&parent.parent()) {
            existing.entry(parent.parent()).or_default().insert(w.index, e);
        }
    }

    for pole_e in todo {
        let Ok((_, pole)) = poles.get(pole_e) else { continue };
        // a plain target counts its PowerLine children
        let target_count = pole.target_pole.and_then(|t| match poles.get(t) {
            Ok((_, target)) => Some(target.num_wires),
            Err(_) => children
                .get(t)
                .ok()
                .map(|c| {
                    let c: &[Entity] = c;
                    c.iter().filter(|child| lines.contains(**child)).count() as u32
                }),
        });
        if pole.num_wires > 0 && target_count == Some(0) && pole.clamp_to_target_wire_count {
            warn!("PowerLines: pole {pole_e} targets a pole without wires; its wires stay disabled");
        }

        let mut mine = existing.remove(&pole_e).unwrap_or_default();
        for i in 0..pole.num_wires {
            let line = pole.wire_line(i, target_count);
            let transform = Transform::from_translation(pole.wire_offset(i));
            match mine.remove(&i) {
                Some(wire) => {
                    commands.entity(wire).insert((line, transform));
                }
                None => {
                    commands.spawn((
                        line,
                        AutoWire { index: i },
                        transform,
                        Name::new(pole.wire_key(i)),
                        ChildOf(pole_e),
                    ));
                }
            }
        }
        // wires past num_wires
        for (_, wire) in mine {
            commands.entity(wire).despawn();
        }
    }
}

// ---------- Sync ----------

fn apply_settings_changes(settings: Res<PowerLineSettings>, mut subsystem: ResMut<PowerLineSubsystem>) {
    if settings.is_changed() && !settings.is_added() {
        info!("PowerLines: settings changed, rebuilding all chunks");
        subsystem.apply_settings(&settings);
    }
}

fn sync_removed(
    mut subsystem: ResMut<PowerLineSubsystem>,
    mut lines: RemovedComponents<PowerLine>,
    mut poles: RemovedComponents<PowerLinePole>,
    mut anchors: RemovedComponents<WireAnchor>,
    mut districts: RemovedComponents<PowerLineDistrict>,
    mut transforms: RemovedComponents<GlobalTransform>,
) {
    for e in lines.read() {
        subsystem.unregister_line(e);
    }
    for e in poles.read() {
        subsystem.unregister_pole(e);
    }
    for e in anchors.read() {
        subsystem.remove_anchor(e);
    }
    for e in districts.read() {
        subsystem.remove_district(e);
    }
    // despawned targets
    for e in transforms.read() {
        subsystem.remove_actor(e);
    }
}

fn sync_districts(
    mut subsystem: ResMut<PowerLineSubsystem>,
    q: Query<
        (Entity, &PowerLineDistrict, &GlobalTransform),
        Or<(Changed<PowerLineDistrict>, Changed<GlobalTransform>)>,
    >,
) {
    for (e, district, gt) in &q {
        subsystem.upsert_district(e, district.0.clone(), gt.translation());
    }
}

fn sync_poles(
    mut subsystem: ResMut<PowerLineSubsystem>,
    q: Query<(Entity, &PowerLinePole, &GlobalTransform), Or<(Changed<PowerLinePole>, Changed<GlobalTransform>)>>,
) {
    for (e, pole, gt) in &q {
        subsystem.register_pole(e, pole.instance_transform(gt), pole.mesh.clone());
    }
}

fn sync_anchors(
    mut subsystem: ResMut<PowerLineSubsystem>,
    q: Query<
        (Entity, &WireAnchor, Option<&Name>, Option<&ChildOf>, &GlobalTransform),
        Or<(Changed<WireAnchor>, Changed<GlobalTransform>, Changed<Name>, Changed<ChildOf>)>,
    >,
) {
    for (e, anchor, name, child_of, gt) in &q {
        subsystem.set_anchor(
            owner_of(e, child_of),
            e,
            Anchor {
                attach_id: anchor.attach_id.clone(),
                tags: anchor.tags.clone(),
                name: name.map(|n| n.as_str().to_string()),
                position: gt.translation(),
                is_line: false,
            },
        );
    }
}

fn sync_lines(
    mut subsystem: ResMut<PowerLineSubsystem>,
    q: Query<
        (Entity, Ref<PowerLine>, &GlobalTransform, Option<&ChildOf>),
        Or<(Changed<PowerLine>, Changed<GlobalTransform>, Changed<ChildOf>)>,
    >,
    transforms: Query<&GlobalTransform>,
) {
    for (e, line, gt, child_of) in &q {
        let start = gt.translation();
        let owner = owner_of(e, child_of);
        let known_owner = subsystem.line_owner(e);
        if line.is_changed() || known_owner != Some(owner) {
            subsystem.register_line(e, owner, start, line.clone());
        } else {
            subsystem.move_line(e, start);
        }

        // first sighting of a target: give it an origin
        if let Some(target) = line.target {
            if let Ok(tgt) = transforms.get(target) {
                subsystem.set_actor_origin(target, tgt.translation());
            }
        }
    }
}

/// Targets that are plain entities (not poles) still need their origin tracked.
fn sync_target_origins(
    mut subsystem: ResMut<PowerLineSubsystem>,
    q: Query<(Entity, &GlobalTransform), Changed<GlobalTransform>>,
) {
    for (e, gt) in &q {
        if subsystem.lines_targeting(e).next().is_some() {
            subsystem.set_actor_origin(e, gt.translation());
        }
    }
}

// ---------- Rebuild ----------

pub fn rebuild_dirty_chunks(
    mut subsystem: ResMut<PowerLineSubsystem>,
    mut geometry: EventWriter<ChunkGeometryChanged>,
    mut batches: EventWriter<PoleBatchChanged>,
    mut hangings: EventWriter<HangingChanged>,
) {
    if !subsystem.has_dirty() {
        return;
    }
    let report = subsystem.rebuild_dirty();

    // buffers are published; signal outside any lock
    for chunk in report.chunks {
        let revision = subsystem.handoff(chunk).map_or(0, |h| h.revision());
        geometry.write(ChunkGeometryChanged { chunk, revision });
    }
    for key in report.pools {
        batches.write(PoleBatchChanged(key));
    }
    for change in report.hangings {
        hangings.write(change);
    }
}
