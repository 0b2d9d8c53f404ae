// src/lines/districts.rs
//! District registry (resolution rules) + data-driven `.districts.ron` loader.

use std::collections::{BTreeMap, HashSet};

use bevy::asset::{io::Reader, AssetLoader, LoadContext};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::district::DistrictProfile;
use super::plugin::{PowerLineDistrict, PowerLineSettings};

// ---------- Binding / policy ----------

/// How a line picks its district profile.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistrictBinding {
    /// Never use a district; local sag/segments only.
    None,
    /// Explicit district entity.
    Direct(Entity),
    /// Discover a district; prefer `district_id` when given.
    Auto { district_id: Option<String> },
}

impl Default for DistrictBinding {
    fn default() -> Self { DistrictBinding::Auto { district_id: None } }
}

/// What auto-discovery does when no id disambiguates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AutoDiscovery {
    /// Exactly one district in the world => use it; otherwise none.
    #[default]
    UniqueOnly,
    /// Closest district origin to the line start wins.
    Nearest,
}

// ---------- Registry ----------

#[derive(Clone, Debug)]
pub struct DistrictRecord {
    pub profile: DistrictProfile,
    /// World position of the district (used by `AutoDiscovery::Nearest`).
    pub origin: Vec3,
}

#[derive(Debug, Default)]
pub struct DistrictRegistry {
    by_entity: BTreeMap<Entity, DistrictRecord>,
    pub policy: AutoDiscovery,
}

impl DistrictRegistry {
    pub fn new(policy: AutoDiscovery) -> Self {
        Self { by_entity: BTreeMap::new(), policy }
    }

    /// Insert or replace; returns the previous record.
    pub fn upsert(&mut self, id: Entity, profile: DistrictProfile, origin: Vec3) -> Option<DistrictRecord> {
        self.by_entity.insert(id, DistrictRecord { profile, origin })
    }

    pub fn remove(&mut self, id: Entity) -> Option<DistrictRecord> { self.by_entity.remove(&id) }

    pub fn get(&self, id: Entity) -> Option<&DistrictRecord> { self.by_entity.get(&id) }

    pub fn len(&self) -> usize { self.by_entity.len() }

    pub fn is_empty(&self) -> bool { self.by_entity.is_empty() }

    /// Resolve a binding for a line starting at `at`. Ambiguity resolves to `None`.
    pub fn resolve(&self, binding: &DistrictBinding, at: Vec3) -> Option<Entity> {
        match binding {
            DistrictBinding::None => None,
            DistrictBinding::Direct(id) => self.by_entity.contains_key(id).then_some(*id),
            DistrictBinding::Auto { district_id: Some(wanted) } => {
                let mut matching = self
                    .by_entity
                    .iter()
                    .filter(|(_, r)| r.profile.district_id.as_deref() == Some(wanted.as_str()));
                match self.policy {
                    AutoDiscovery::UniqueOnly => matching.next().map(|(e, _)| *e),
                    AutoDiscovery::Nearest => nearest(matching, at),
                }
            }
            DistrictBinding::Auto { district_id: None } => match self.policy {
                AutoDiscovery::UniqueOnly => {
                    let mut it = self.by_entity.keys();
                    match (it.next(), it.next()) {
                        (Some(only), None) => Some(*only),
                        _ => None,
                    }
                }
                AutoDiscovery::Nearest => nearest(self.by_entity.iter(), at),
            },
        }
    }

    pub fn resolve_profile(&self, binding: &DistrictBinding, at: Vec3) -> Option<(Entity, &DistrictProfile)> {
        let id = self.resolve(binding, at)?;
        self.by_entity.get(&id).map(|r| (id, &r.profile))
    }
}

fn nearest<'a>(it: impl Iterator<Item = (&'a Entity, &'a DistrictRecord)>, at: Vec3) -> Option<Entity> {
    let mut best: Option<(Entity, f32)> = None;
    for (e, r) in it {
        let d = r.origin.distance_squared(at);
        // strict `<` keeps the lowest entity on ties
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((*e, d));
        }
    }
    best.map(|(e, _)| e)
}

// ---------- Data-driven district set ----------

/// One entry of a `.districts.ron` manifest.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DistrictDef {
    pub origin: Vec3,
    pub profile: DistrictProfile,
}

#[derive(Asset, TypePath, Clone, Debug)]
pub struct DistrictSet {
    pub districts: Vec<DistrictDef>,
}

impl DistrictSet {
    /// Parse and validate a manifest (a RON list of district entries).
    pub fn from_ron_bytes(bytes: &[u8]) -> Result<Self, DistrictSetLoadError> {
        let districts: Vec<DistrictDef> =
            ron::de::from_bytes(bytes).map_err(|e| DistrictSetLoadError::Ron(e.to_string()))?;
        Self::validated(districts)
    }

    pub fn from_ron_str(s: &str) -> Result<Self, DistrictSetLoadError> {
        Self::from_ron_bytes(s.as_bytes())
    }

    fn validated(districts: Vec<DistrictDef>) -> Result<Self, DistrictSetLoadError> {
        let mut seen = HashSet::new();
        for (i, def) in districts.iter().enumerate() {
            if let Some(id) = &def.profile.district_id {
                if !seen.insert(id.clone()) {
                    return Err(DistrictSetLoadError::DuplicateId(id.clone()));
                }
            }
            let (lo, hi) = def.profile.sag.range;
            if !(hi - lo).is_finite() {
                return Err(DistrictSetLoadError::Invalid {
                    index: i,
                    reason: format!("sag.range ({lo}, {hi}) must be finite"),
                });
            }
            let h = &def.profile.hanging;
            if !(0.0..=1.0).contains(&h.chance_per_wire) {
                return Err(DistrictSetLoadError::Invalid {
                    index: i,
                    reason: format!("chance_per_wire {} outside 0..=1", h.chance_per_wire),
                });
            }
            if def.profile.segments.auto && !(def.profile.segments.target_length > 0.0) {
                return Err(DistrictSetLoadError::Invalid {
                    index: i,
                    reason: "segments.target_length must be positive".to_string(),
                });
            }
        }
        Ok(Self { districts })
    }
}

/// Handle to the loaded district manifest.
#[derive(Resource, Default)]
pub struct DistrictSetHandle(pub Handle<DistrictSet>);

/// District entities spawned from the current manifest.
#[derive(Resource, Default)]
pub struct SpawnedDistricts(pub Vec<Entity>);

/// Asset + loader, and the systems turning a loaded manifest into district entities.
pub struct DistrictSetAssetPlugin;

impl Plugin for DistrictSetAssetPlugin {
    fn build(&self, app: &mut App) {
        app.init_asset::<DistrictSet>()
            .register_asset_loader(DistrictSetLoader)
            .init_resource::<DistrictSetHandle>()
            .init_resource::<SpawnedDistricts>()
            .add_systems(Startup, load_district_set)
            .add_systems(Update, spawn_districts_from_set);
    }
}

/// Startup: request the manifest named in the settings.
fn load_district_set(
    mut handle_res: ResMut<DistrictSetHandle>,
    settings: Res<PowerLineSettings>,
    assets: Res<AssetServer>,
) {
    if handle_res.0.is_strong() { return; }
    let Some(path) = settings.districts_path.as_deref() else { return };
    handle_res.0 = assets.load(path);
    info!("PowerLines: loading districts from '{}'", path);
}

/// Update: (re)spawn district entities whenever the manifest (re)loads.
fn spawn_districts_from_set(
    mut commands: Commands,
    mut events: EventReader<AssetEvent<DistrictSet>>,
    handle_res: Res<DistrictSetHandle>,
    sets: Res<Assets<DistrictSet>>,
    mut spawned: ResMut<SpawnedDistricts>,
) {
    let id = handle_res.0.id();
    let reload = events.read().any(|ev| match ev {
        AssetEvent::LoadedWithDependencies { id: ev_id } | AssetEvent::Modified { id: ev_id } => *ev_id == id,
        _ => false,
    });
    if !reload { return; }
    let Some(set) = sets.get(id) else {
        warn!("PowerLines: district set event without a loaded asset");
        return;
    };

    for e in spawned.0.drain(..) {
        commands.entity(e).despawn();
    }
    for (i, def) in set.districts.iter().enumerate() {
        let label = def.profile.district_id.clone().unwrap_or_else(|| format!("District #{i}"));
        let e = commands
            .spawn((
                PowerLineDistrict(def.profile.clone()),
                Transform::from_translation(def.origin),
                Name::new(label),
            ))
            .id();
        spawned.0.push(e);
    }
    info!("PowerLines: {} district(s) ready", set.districts.len());
}

#[derive(Default)]
pub struct DistrictSetLoader;

impl AssetLoader for DistrictSetLoader {
    type Asset = DistrictSet;
    type Settings = ();
    type Error = DistrictSetLoadError;

    fn extensions(&self) -> &[&str] {
        &["districts.ron"]
    }

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &Self::Settings,
        _load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        DistrictSet::from_ron_bytes(&bytes)
    }
}

// ---------- Loader errors ----------

#[derive(thiserror::Error, Debug)]
pub enum DistrictSetLoadError {
    #[error("I/O while reading district set: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(String),
    #[error("Duplicate district id '{0}'")]
    DuplicateId(String),
    #[error("District #{index} is invalid: {reason}")]
    Invalid { index: usize, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entities(n: usize) -> Vec<Entity> {
        let mut world = World::new();
        (0..n).map(|_| world.spawn_empty().id()).collect()
    }

    fn profile(id: Option<&str>) -> DistrictProfile {
        DistrictProfile { district_id: id.map(str::to_string), ..Default::default() }
    }

    #[test]
    fn unique_only_needs_exactly_one() {
        let e = entities(2);
        let mut reg = DistrictRegistry::new(AutoDiscovery::UniqueOnly);
        let auto = DistrictBinding::default();
        assert_eq!(reg.resolve(&auto, Vec3::ZERO), None);

        reg.upsert(e[0], profile(None), Vec3::ZERO);
        assert_eq!(reg.resolve(&auto, Vec3::ZERO), Some(e[0]));

        reg.upsert(e[1], profile(None), Vec3::ZERO);
        assert_eq!(reg.resolve(&auto, Vec3::ZERO), None);
    }

    #[test]
    fn id_match_beats_ambiguity() {
        let e = entities(2);
        let mut reg = DistrictRegistry::new(AutoDiscovery::UniqueOnly);
        reg.upsert(e[0], profile(Some("Harbor")), Vec3::ZERO);
        reg.upsert(e[1], profile(Some("Downtown")), Vec3::ZERO);
        let b = DistrictBinding::Auto { district_id: Some("Downtown".into()) };
        assert_eq!(reg.resolve(&b, Vec3::ZERO), Some(e[1]));
        let missing = DistrictBinding::Auto { district_id: Some("Airport".into()) };
        assert_eq!(reg.resolve(&missing, Vec3::ZERO), None);
    }

    #[test]
    fn nearest_policy_picks_closest() {
        let e = entities(2);
        let mut reg = DistrictRegistry::new(AutoDiscovery::Nearest);
        reg.upsert(e[0], profile(None), Vec3::new(0.0, 0.0, 0.0));
        reg.upsert(e[1], profile(None), Vec3::new(5000.0, 0.0, 0.0));
        let auto = DistrictBinding::default();
        assert_eq!(reg.resolve(&auto, Vec3::new(4000.0, 0.0, 0.0)), Some(e[1]));
        assert_eq!(reg.resolve(&auto, Vec3::new(100.0, 0.0, 0.0)), Some(e[0]));
    }

    #[test]
    fn direct_binding_to_removed_district_is_none() {
        let e = entities(1);
        let mut reg = DistrictRegistry::default();
        reg.upsert(e[0], profile(None), Vec3::ZERO);
        let direct = DistrictBinding::Direct(e[0]);
        assert_eq!(reg.resolve(&direct, Vec3::ZERO), Some(e[0]));
        reg.remove(e[0]);
        assert_eq!(reg.resolve(&direct, Vec3::ZERO), None);
        assert_eq!(reg.resolve(&DistrictBinding::None, Vec3::ZERO), None);
    }

    #[test]
    fn manifest_parses_with_defaults() {
        let set = DistrictSet::from_ron_str(
            r#"[
                (
                    origin: (0.0, 0.0, 0.0),
                    profile: (
                        district_id: Some("Downtown"),
                        sag: (range: (40.0, 120.0), scale: 1.5),
                        hanging: (mesh_pool: ["props/sneakers.glb"], chance_per_wire: 0.1),
                    ),
                ),
                (),
            ]"#,
        )
        .unwrap();
        assert_eq!(set.districts.len(), 2);
        let d = &set.districts[0].profile;
        assert_eq!(d.sag.scale, 1.5);
        assert_eq!(d.segments.target_length, 150.0);
        assert_eq!(d.hanging.mesh_pool.len(), 1);
        assert_eq!(set.districts[1].profile.district_id, None);
    }

    #[test]
    fn manifest_rejects_duplicates_and_bad_chance() {
        let dup = DistrictSet::from_ron_str(r#"[(profile: (district_id: Some("A"))), (profile: (district_id: Some("A")))]"#);
        assert!(matches!(dup, Err(DistrictSetLoadError::DuplicateId(_))));

        let bad = DistrictSet::from_ron_str(r#"[(profile: (hanging: (chance_per_wire: 2.0)))]"#);
        assert!(matches!(bad, Err(DistrictSetLoadError::Invalid { index: 0, .. })));

        let wide = DistrictSet::from_ron_str(r#"[(), (profile: (sag: (range: (-3e38, 3e38))))]"#);
        assert!(matches!(wide, Err(DistrictSetLoadError::Invalid { index: 1, .. })));

        assert!(matches!(DistrictSet::from_ron_str("[("), Err(DistrictSetLoadError::Ron(_))));
    }
}
