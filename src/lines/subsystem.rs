// src/lines/subsystem.rs
//! The batching engine: registry of lines/poles/anchors/districts, chunk dirtying,
//! and the once-per-step rebuild that publishes chunk batches and pool changes.
//!
//! Everything here is driven by explicit calls (the ECS glue lives in `plugin.rs`),
//! so hosts and tests can run it without an `App`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use bevy::prelude::*;

use super::anchors::{Anchor, AnchorResolver, AnchorTable};
use super::chunk_index::ChunkIndex;
use super::core::{ChunkGrid, ChunkKey, LineSegment, MeshRef};
use super::curve::SegmentSpacing;
use super::district::DistrictProfile;
use super::districts::{DistrictBinding, DistrictRegistry};
use super::handoff::{GeometrySnapshot, HandoffBuffer};
use super::hanging::{self, HangingChanged, HangingInstance};
use super::plugin::PowerLineSettings;
use super::pool::{InstancePools, PoolKey};
use super::source::{LineShape, PowerLine};

/// Chunk member handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Member {
    Line(Entity),
    Pole(Entity),
}

#[derive(Clone, Debug)]
struct LineRecord {
    line: PowerLine,
    /// Actor the line's own anchor belongs to (its pole, or itself).
    owner: Entity,
    start: Vec3,
}

#[derive(Clone, Debug)]
struct PoleRecord {
    transform: Transform,
    mesh: Option<MeshRef>,
}

/// What one `rebuild_dirty` pass changed.
#[derive(Debug, Default)]
pub struct RebuildReport {
    /// Chunks whose handoff buffer got a new revision.
    pub chunks: Vec<ChunkKey>,
    pub pools: Vec<PoolKey>,
    pub hangings: Vec<HangingChanged>,
    pub segments: usize,
}

impl RebuildReport {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty() && self.pools.is_empty() && self.hangings.is_empty()
    }
}

#[derive(Resource)]
pub struct PowerLineSubsystem {
    spacing: SegmentSpacing,
    bounds_extent: f32,
    index: ChunkIndex<Member>,
    lines: HashMap<Entity, LineRecord>,
    poles: HashMap<Entity, PoleRecord>,
    anchors: AnchorTable,
    districts: DistrictRegistry,
    /// target actor -> lines pointing at it
    targeting: HashMap<Entity, BTreeSet<Entity>>,
    /// district each line used at its last rebuild
    line_district: HashMap<Entity, Entity>,
    handoffs: HashMap<ChunkKey, Arc<HandoffBuffer>>,
    hanging: HashMap<Entity, HangingInstance>,
    pools: InstancePools<Entity>,
    dirty_poles: BTreeSet<Entity>,
    pending_hangings: Vec<HangingChanged>,
}

impl Default for PowerLineSubsystem {
    fn default() -> Self { Self::new(&PowerLineSettings::default()) }
}

impl PowerLineSubsystem {
    pub fn new(settings: &PowerLineSettings) -> Self {
        Self {
            spacing: settings.spacing,
            bounds_extent: settings.degenerate_bounds_extent,
            index: ChunkIndex::new(ChunkGrid::new(settings.chunk_size)),
            lines: HashMap::new(),
            poles: HashMap::new(),
            anchors: AnchorTable::default(),
            districts: DistrictRegistry::new(settings.auto_discovery),
            targeting: HashMap::new(),
            line_district: HashMap::new(),
            handoffs: HashMap::new(),
            hanging: HashMap::new(),
            pools: InstancePools::default(),
            dirty_poles: BTreeSet::new(),
            pending_hangings: Vec::new(),
        }
    }

    /// Apply new settings. A grid change re-buckets everything.
    pub fn apply_settings(&mut self, settings: &PowerLineSettings) {
        self.spacing = settings.spacing;
        self.districts.policy = settings.auto_discovery;
        let extent_changed = self.bounds_extent != settings.degenerate_bounds_extent;
        self.bounds_extent = settings.degenerate_bounds_extent;

        let grid = ChunkGrid::new(settings.chunk_size);
        let regrid = grid != self.index.grid();
        if regrid {
            let old: Vec<ChunkKey> = self.index.chunk_keys().collect();
            let mut index = ChunkIndex::new(grid);
            for (id, rec) in &self.lines {
                index.register_at(Member::Line(*id), rec.start);
            }
            for (id, rec) in &self.poles {
                index.register_at(Member::Pole(*id), rec.transform.translation);
                self.dirty_poles.insert(*id);
            }
            // old chunks publish empty batches once
            for key in old {
                index.mark_dirty(key);
            }
            self.index = index;
        } else {
            self.mark_all_lines_dirty();
        }

        // existing buffers keep their revision; only the fallback box moves
        if regrid || extent_changed {
            for (key, buffer) in &self.handoffs {
                buffer.set_fallback(grid.center(*key), self.bounds_extent);
                self.index.mark_dirty(*key);
            }
        }
    }

    // ---------- Lines ----------

    /// Register (or re-register) a line starting at `start`. `owner` is the actor its
    /// anchor belongs to; pass the line itself when it has none.
    pub fn register_line(&mut self, id: Entity, owner: Entity, start: Vec3, line: PowerLine) {
        if let Some(prev) = self.lines.get(&id) {
            if prev.owner != owner {
                let old_owner = prev.owner;
                self.dirty_dependants(old_owner);
            }
        }
        let old_target = self.lines.get(&id).and_then(|r| r.line.target);
        self.retarget(id, old_target, line.target);
        self.lines.insert(id, LineRecord { line, owner, start });
        self.index.register_at(Member::Line(id), start);
        self.refresh_line_anchor(id);
    }

    /// Replace a line's settings in place.
    pub fn update_line(&mut self, id: Entity, line: PowerLine) {
        let Some(rec) = self.lines.get(&id) else { return };
        let (owner, start) = (rec.owner, rec.start);
        self.register_line(id, owner, start, line);
    }

    pub fn move_line(&mut self, id: Entity, start: Vec3) {
        let Some(rec) = self.lines.get_mut(&id) else { return };
        rec.start = start;
        self.index.register_at(Member::Line(id), start);
        self.refresh_line_anchor(id);
    }

    pub fn mark_line_dirty(&mut self, id: Entity) {
        if let Some(key) = self.index.key_of(Member::Line(id)) {
            self.index.mark_dirty(key);
        }
    }

    /// Forget a line; its hanging prop goes with it.
    pub fn unregister_line(&mut self, id: Entity) -> bool {
        let Some(rec) = self.lines.remove(&id) else { return false };
        self.retarget(id, rec.line.target, None);
        self.index.unregister(Member::Line(id));
        self.line_district.remove(&id);
        self.remove_anchor(id);
        if rec.owner == id {
            self.remove_actor(id);
        }
        if self.hanging.remove(&id).is_some() {
            self.pending_hangings.push(HangingChanged::Removed { line: id });
        }
        true
    }

    pub fn line(&self, id: Entity) -> Option<&PowerLine> { self.lines.get(&id).map(|r| &r.line) }

    pub fn line_owner(&self, id: Entity) -> Option<Entity> { self.lines.get(&id).map(|r| r.owner) }

    pub fn chunk_of_line(&self, id: Entity) -> Option<ChunkKey> { self.index.key_of(Member::Line(id)) }

    pub fn line_count(&self) -> usize { self.lines.len() }

    fn retarget(&mut self, id: Entity, old: Option<Entity>, new: Option<Entity>) {
        if old == new {
            return;
        }
        if let Some(t) = old {
            if let Some(set) = self.targeting.get_mut(&t) {
                set.remove(&id);
                if set.is_empty() {
                    self.targeting.remove(&t);
                }
            }
        }
        if let Some(t) = new {
            self.targeting.entry(t).or_default().insert(id);
        }
    }

    /// Keep the line's start visible to lines targeting its owner.
    fn refresh_line_anchor(&mut self, id: Entity) {
        let Some(rec) = self.lines.get(&id) else { return };
        let owner = rec.owner;
        let anchor = Anchor {
            attach_id: rec.line.attach_id.clone(),
            tags: rec.line.tags.clone(),
            name: None,
            position: rec.start,
            is_line: true,
        };
        if owner == id {
            self.anchors.set_origin(id, rec.start);
        }
        if self.anchors.anchor(id) == Some(&anchor) && self.anchors.owner_of(id) == Some(owner) {
            return;
        }
        if let Some(prev_owner) = self.anchors.set_anchor(owner, id, anchor) {
            self.dirty_dependants(prev_owner);
        }
        self.dirty_dependants(owner);
    }

    fn dirty_dependants(&mut self, actor: Entity) {
        let Some(lines) = self.targeting.get(&actor) else { return };
        for line in lines {
            if let Some(key) = self.index.key_of(Member::Line(*line)) {
                self.index.mark_dirty(key);
            }
        }
    }

    fn mark_all_lines_dirty(&mut self) {
        for id in self.lines.keys() {
            if let Some(key) = self.index.key_of(Member::Line(*id)) {
                self.index.mark_dirty(key);
            }
        }
    }

    // ---------- Poles ----------

    /// Register a pole instance. `transform` is its final world transform (scale included).
    pub fn register_pole(&mut self, id: Entity, transform: Transform, mesh: Option<MeshRef>) {
        self.poles.insert(id, PoleRecord { transform, mesh });
        self.index.register_at(Member::Pole(id), transform.translation);
        self.dirty_poles.insert(id);
        self.set_actor_origin(id, transform.translation);
    }

    pub fn update_pole(&mut self, id: Entity, mesh: Option<MeshRef>) {
        let Some(rec) = self.poles.get(&id) else { return };
        let transform = rec.transform;
        self.register_pole(id, transform, mesh);
    }

    pub fn move_pole(&mut self, id: Entity, transform: Transform) {
        let Some(rec) = self.poles.get(&id) else { return };
        let mesh = rec.mesh.clone();
        self.register_pole(id, transform, mesh);
    }

    /// Drop the pole's instance. The entity stays an anchor actor (its wires and
    /// origin) until `remove_actor`.
    pub fn unregister_pole(&mut self, id: Entity) -> bool {
        if self.poles.remove(&id).is_none() {
            return false;
        }
        self.index.unregister(Member::Pole(id));
        self.dirty_poles.remove(&id);
        self.pools.remove(id);
        true
    }

    pub fn chunk_of_pole(&self, id: Entity) -> Option<ChunkKey> { self.index.key_of(Member::Pole(id)) }

    pub fn pools(&self) -> &InstancePools<Entity> { &self.pools }

    // ---------- Anchors / actors ----------

    pub fn set_actor_origin(&mut self, actor: Entity, origin: Vec3) {
        if self.anchors.origin(actor) == Some(origin) {
            return;
        }
        self.anchors.set_origin(actor, origin);
        self.dirty_dependants(actor);
    }

    pub fn set_anchor(&mut self, actor: Entity, id: Entity, anchor: Anchor) {
        if self.anchors.owner_of(id) == Some(actor) && self.anchors.anchor(id) == Some(&anchor) {
            return;
        }
        if let Some(prev) = self.anchors.set_anchor(actor, id, anchor) {
            self.dirty_dependants(prev);
        }
        self.dirty_dependants(actor);
    }

    pub fn remove_anchor(&mut self, id: Entity) {
        if let Some(actor) = self.anchors.remove_anchor(id) {
            self.dirty_dependants(actor);
        }
    }

    /// The actor is gone; lines targeting it fall back to their manual end or a stub.
    pub fn remove_actor(&mut self, actor: Entity) {
        if self.anchors.remove_actor(actor) {
            self.dirty_dependants(actor);
        }
    }

    pub fn anchors(&self) -> &AnchorTable { &self.anchors }

    /// Lines whose target is `actor`.
    pub fn lines_targeting(&self, actor: Entity) -> impl Iterator<Item = Entity> + '_ {
        self.targeting.get(&actor).into_iter().flat_map(|s| s.iter().copied())
    }

    // ---------- Districts ----------

    pub fn upsert_district(&mut self, id: Entity, profile: DistrictProfile, origin: Vec3) {
        if let Some(prev) = self.districts.get(id) {
            if prev.profile == profile && prev.origin == origin {
                return;
            }
        }
        self.redistrict(id, |d| {
            d.upsert(id, profile, origin);
        });
    }

    pub fn remove_district(&mut self, id: Entity) {
        if self.districts.get(id).is_none() {
            return;
        }
        self.redistrict(id, |d| {
            d.remove(id);
        });
    }

    /// District a line would use right now (ignores whether it is connected).
    pub fn resolve_district(&self, line: Entity) -> Option<Entity> {
        let rec = self.lines.get(&line)?;
        self.districts.resolve(&rec.line.district, rec.start)
    }

    pub fn districts(&self) -> &DistrictRegistry { &self.districts }

    /// Apply a registry change and dirty every line whose district may differ.
    fn redistrict(&mut self, id: Entity, change: impl FnOnce(&mut DistrictRegistry)) {
        let before: HashMap<Entity, Option<Entity>> = self
            .lines
            .iter()
            .filter(|(_, r)| r.line.district != DistrictBinding::None)
            .map(|(e, r)| (*e, self.districts.resolve(&r.line.district, r.start)))
            .collect();
        change(&mut self.districts);
        for (line, was) in before {
            let Some(rec) = self.lines.get(&line) else { continue };
            let now = self.districts.resolve(&rec.line.district, rec.start);
            if was != now || was == Some(id) || self.line_district.get(&line) == Some(&id) {
                if let Some(key) = self.index.key_of(Member::Line(line)) {
                    self.index.mark_dirty(key);
                }
            }
        }
    }

    // ---------- Rebuild ----------

    pub fn has_dirty(&self) -> bool {
        self.index.has_dirty() || !self.dirty_poles.is_empty() || !self.pending_hangings.is_empty()
    }

    /// Rebuild every dirty chunk, publish the batches and update pools for dirty poles.
    pub fn rebuild_dirty(&mut self) -> RebuildReport {
        let Self {
            spacing,
            bounds_extent,
            index,
            lines,
            poles,
            anchors,
            districts,
            line_district,
            handoffs,
            hanging,
            pools,
            dirty_poles,
            pending_hangings,
            ..
        } = self;

        let mut report = RebuildReport { hangings: std::mem::take(pending_hangings), ..default() };
        let grid = index.grid();
        let mut batch: Vec<LineSegment> = Vec::new();

        for key in index.take_dirty() {
            batch.clear();
            for member in index.members(key) {
                match member {
                    Member::Line(id) => {
                        let Some(rec) = lines.get(&id) else { continue };
                        let shape = LineShape::evaluate(&rec.line, rec.start, &*anchors, &*districts, *spacing);
                        match &shape {
                            Some(s) => {
                                s.emit(&rec.line, &mut batch);
                                match s.district {
                                    Some(d) => line_district.insert(id, d),
                                    None => line_district.remove(&id),
                                };
                            }
                            None => {
                                line_district.remove(&id);
                            }
                        }
                        let placed = shape
                            .as_ref()
                            .and_then(|s| s.hanging.as_ref().and_then(|c| hanging::place(c, &s.points)));
                        sync_hanging(hanging, &mut report.hangings, id, placed);
                    }
                    Member::Pole(id) => {
                        if dirty_poles.remove(&id) {
                            sync_pole(pools, poles, key, id);
                        }
                    }
                }
            }

            let buffer = handoffs
                .entry(key)
                .or_insert_with(|| Arc::new(HandoffBuffer::new(grid.center(key), *bounds_extent)));
            buffer.publish(&batch);
            report.segments += batch.len();
            report.chunks.push(key);
        }

        // poles whose chunk was not rebuilt (settings-only changes)
        for id in std::mem::take(dirty_poles) {
            if let Some(key) = index.key_of(Member::Pole(id)) {
                sync_pole(pools, poles, key, id);
            }
        }

        report.pools = pools.take_dirty();
        if !report.is_empty() {
            debug!(
                "powerlines: rebuilt {} chunk(s), {} segment(s), {} pool(s), {} hanging change(s)",
                report.chunks.len(),
                report.segments,
                report.pools.len(),
                report.hangings.len()
            );
        }
        report
    }

    // ---------- Render side ----------

    /// Shared buffer of a chunk that has been rebuilt at least once.
    pub fn handoff(&self, key: ChunkKey) -> Option<Arc<HandoffBuffer>> { self.handoffs.get(&key).cloned() }

    pub fn snapshot(&self, key: ChunkKey) -> Option<GeometrySnapshot> {
        self.handoffs.get(&key).map(|h| h.snapshot())
    }

    pub fn hanging(&self, line: Entity) -> Option<&HangingInstance> { self.hanging.get(&line) }

    pub fn grid(&self) -> ChunkGrid { self.index.grid() }

    pub fn index(&self) -> &ChunkIndex<Member> { &self.index }
}

fn sync_hanging(
    hanging: &mut HashMap<Entity, HangingInstance>,
    out: &mut Vec<HangingChanged>,
    line: Entity,
    placed: Option<HangingInstance>,
) {
    match placed {
        Some(h) => {
            if hanging.get(&line) != Some(&h) {
                out.push(HangingChanged::Placed { line, mesh: h.mesh.clone(), transform: h.transform });
                hanging.insert(line, h);
            }
        }
        None => {
            if hanging.remove(&line).is_some() {
                out.push(HangingChanged::Removed { line });
            }
        }
    }
}

fn sync_pole(pools: &mut InstancePools<Entity>, poles: &HashMap<Entity, PoleRecord>, key: ChunkKey, id: Entity) {
    match poles.get(&id).and_then(|p| p.mesh.clone().map(|m| (m, p.transform))) {
        Some((mesh, transform)) => {
            pools.update(id, key, mesh, transform);
        }
        None => {
            pools.remove(id);
        }
    }
}
