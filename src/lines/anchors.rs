// src/lines/anchors.rs
//! Anchor resolution: where on a target actor does a line attach?
//!
//! An actor is any entity lines can target. It has an origin and zero or more
//! anchors (named/tagged points, or other lines' start points).

use std::collections::{BTreeMap, HashMap};

use bevy::prelude::*;

use super::core::AttachLookup;

/// An attach point owned by an actor.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Anchor {
    pub attach_id: Option<String>,
    pub tags: Vec<String>,
    pub name: Option<String>,
    pub position: Vec3,
    /// Start point of a power line (only these answer `ByAttachId`).
    pub is_line: bool,
}

impl Anchor {
    /// Key other lines use to find this anchor: attach id, else first tag, else name.
    pub fn attach_key(&self) -> Option<&str> {
        self.attach_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.tags.first().map(String::as_str).filter(|s| !s.is_empty()))
            .or_else(|| self.name.as_deref().filter(|s| !s.is_empty()))
    }

    fn matches(&self, key: &str, mode: AttachLookup) -> bool {
        match mode {
            AttachLookup::ByAttachId => self.is_line && self.attach_id.as_deref() == Some(key),
            AttachLookup::ByTag => self.tags.iter().any(|t| t == key),
            AttachLookup::ByName => self.name.as_deref() == Some(key),
        }
    }
}

/// Anchor-resolution collaborator: (target, key, mode) -> world position.
pub trait AnchorResolver {
    /// Target's own position; `None` when the actor is unknown.
    fn origin(&self, actor: Entity) -> Option<Vec3>;

    /// Matching anchor on `actor`, or `None` when nothing matches.
    fn find(&self, actor: Entity, key: &str, mode: AttachLookup) -> Option<Vec3>;

    /// Full lookup: requested mode, the remaining modes, then the generic key match,
    /// finally the target's origin.
    fn resolve(&self, actor: Entity, key: Option<&str>, mode: AttachLookup) -> Option<Vec3> {
        let origin = self.origin(actor)?;
        let Some(key) = key.filter(|k| !k.is_empty()) else {
            return Some(origin);
        };
        mode.fallback_order()
            .into_iter()
            .find_map(|m| self.find(actor, key, m))
            .or_else(|| self.find_by_key(actor, key))
            .or(Some(origin))
    }

    /// Anchor whose own attach key equals `key`.
    fn find_by_key(&self, _actor: Entity, _key: &str) -> Option<Vec3> { None }
}

#[derive(Debug, Default)]
struct ActorAnchors {
    origin: Vec3,
    anchors: BTreeMap<Entity, Anchor>,
}

/// In-memory resolver fed by the ECS glue (or directly by hosts/tests).
#[derive(Debug, Default)]
pub struct AnchorTable {
    actors: HashMap<Entity, ActorAnchors>,
    anchor_owner: HashMap<Entity, Entity>,
}

impl AnchorTable {
    pub fn set_origin(&mut self, actor: Entity, origin: Vec3) {
        self.actors.entry(actor).or_default().origin = origin;
    }

    /// Insert or move an anchor. Returns the previous owner when it changed.
    pub fn set_anchor(&mut self, actor: Entity, id: Entity, anchor: Anchor) -> Option<Entity> {
        let prev = self.anchor_owner.insert(id, actor);
        let moved = prev.filter(|p| *p != actor);
        if let Some(old) = moved {
            if let Some(a) = self.actors.get_mut(&old) {
                a.anchors.remove(&id);
            }
        }
        self.actors.entry(actor).or_default().anchors.insert(id, anchor);
        moved
    }

    /// Returns the actor that owned the anchor.
    pub fn remove_anchor(&mut self, id: Entity) -> Option<Entity> {
        let actor = self.anchor_owner.remove(&id)?;
        if let Some(a) = self.actors.get_mut(&actor) {
            a.anchors.remove(&id);
        }
        Some(actor)
    }

    pub fn remove_actor(&mut self, actor: Entity) -> bool {
        let Some(a) = self.actors.remove(&actor) else { return false };
        for id in a.anchors.keys() {
            self.anchor_owner.remove(id);
        }
        true
    }

    pub fn owner_of(&self, id: Entity) -> Option<Entity> { self.anchor_owner.get(&id).copied() }

    pub fn anchor(&self, id: Entity) -> Option<&Anchor> {
        let actor = self.owner_of(id)?;
        self.actors.get(&actor)?.anchors.get(&id)
    }

    pub fn contains_actor(&self, actor: Entity) -> bool { self.actors.contains_key(&actor) }

    /// Line anchors on `actor` (attach-id order is not guaranteed).
    pub fn line_count(&self, actor: Entity) -> usize {
        self.actors.get(&actor).map_or(0, |a| a.anchors.values().filter(|x| x.is_line).count())
    }
}

impl AnchorResolver for AnchorTable {
    fn origin(&self, actor: Entity) -> Option<Vec3> { self.actors.get(&actor).map(|a| a.origin) }

    fn find(&self, actor: Entity, key: &str, mode: AttachLookup) -> Option<Vec3> {
        let a = self.actors.get(&actor)?;
        a.anchors.values().find(|x| x.matches(key, mode)).map(|x| x.position)
    }

    fn find_by_key(&self, actor: Entity, key: &str) -> Option<Vec3> {
        let a = self.actors.get(&actor)?;
        a.anchors.values().find(|x| x.attach_key() == Some(key)).map(|x| x.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<Entity> {
        let mut world = World::new();
        (0..n).map(|_| world.spawn_empty().id()).collect()
    }

    #[test]
    fn attach_key_priority() {
        let mut a = Anchor { name: Some("Arm".into()), ..default() };
        assert_eq!(a.attach_key(), Some("Arm"));
        a.tags = vec!["Wire_0".into()];
        assert_eq!(a.attach_key(), Some("Wire_0"));
        a.attach_id = Some("Main".into());
        assert_eq!(a.attach_key(), Some("Main"));
    }

    #[test]
    fn requested_mode_wins_then_falls_back() {
        let e = ids(4);
        let (pole, by_tag, by_line, by_name) = (e[0], e[1], e[2], e[3]);
        let mut t = AnchorTable::default();
        t.set_origin(pole, Vec3::new(1000.0, 0.0, 0.0));
        t.set_anchor(pole, by_tag, Anchor { tags: vec!["Wire_0".into()], position: Vec3::new(1.0, 0.0, 0.0), ..default() });
        t.set_anchor(
            pole,
            by_line,
            Anchor { attach_id: Some("Wire_0".into()), is_line: true, position: Vec3::new(2.0, 0.0, 0.0), ..default() },
        );
        t.set_anchor(pole, by_name, Anchor { name: Some("Wire_0".into()), position: Vec3::new(3.0, 0.0, 0.0), ..default() });

        assert_eq!(t.resolve(pole, Some("Wire_0"), AttachLookup::ByTag), Some(Vec3::new(1.0, 0.0, 0.0)));
        assert_eq!(t.resolve(pole, Some("Wire_0"), AttachLookup::ByAttachId), Some(Vec3::new(2.0, 0.0, 0.0)));
        assert_eq!(t.resolve(pole, Some("Wire_0"), AttachLookup::ByName), Some(Vec3::new(3.0, 0.0, 0.0)));

        t.remove_anchor(by_line);
        // id lookup misses, tag is next in line
        assert_eq!(t.resolve(pole, Some("Wire_0"), AttachLookup::ByAttachId), Some(Vec3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn attach_id_only_matches_lines() {
        let e = ids(2);
        let mut t = AnchorTable::default();
        t.set_origin(e[0], Vec3::ZERO);
        t.set_anchor(e[0], e[1], Anchor { attach_id: Some("A".into()), position: Vec3::ONE, ..default() });
        assert_eq!(t.find(e[0], "A", AttachLookup::ByAttachId), None);
        // still reachable through the generic key match
        assert_eq!(t.resolve(e[0], Some("A"), AttachLookup::ByAttachId), Some(Vec3::ONE));
    }

    #[test]
    fn total_failure_is_target_origin() {
        let e = ids(2);
        let mut t = AnchorTable::default();
        t.set_origin(e[0], Vec3::new(5.0, 6.0, 7.0));
        assert_eq!(t.resolve(e[0], Some("Nope"), AttachLookup::ByTag), Some(Vec3::new(5.0, 6.0, 7.0)));
        assert_eq!(t.resolve(e[0], None, AttachLookup::ByTag), Some(Vec3::new(5.0, 6.0, 7.0)));
        assert_eq!(t.resolve(e[1], Some("x"), AttachLookup::ByTag), None);
    }

    #[test]
    fn anchors_move_between_actors() {
        let e = ids(3);
        let mut t = AnchorTable::default();
        t.set_anchor(e[0], e[2], Anchor { is_line: true, ..default() });
        assert_eq!(t.line_count(e[0]), 1);
        assert_eq!(t.set_anchor(e[1], e[2], Anchor { is_line: true, ..default() }), Some(e[0]));
        assert_eq!(t.line_count(e[0]), 0);
        assert_eq!(t.line_count(e[1]), 1);
        assert!(t.remove_actor(e[1]));
        assert_eq!(t.owner_of(e[2]), None);
    }
}
