// src/lines/pole.rs
//! Poles: pooled mesh instances that can also rig their own wires to a target pole.

use bevy::prelude::*;

use super::core::MeshRef;
use super::source::PowerLine;

/// A pole. Its mesh is batched per (chunk, mesh); with `num_wires > 0` it spawns
/// child `PowerLine`s running to `target_pole`.
#[derive(Component, Clone, Debug)]
pub struct PowerLinePole {
    /// `None` keeps the pole out of every instance pool.
    pub mesh: Option<MeshRef>,
    /// Per-instance scale on top of the entity transform.
    pub scale: Vec3,

    pub num_wires: u32,
    /// Local wire start offsets; missing entries use [`PowerLinePole::default_offset`].
    pub wire_offsets: Vec<Vec3>,
    /// Wire attach ids are `"{attach_prefix}_{i}"`.
    pub attach_prefix: String,
    pub target_pole: Option<Entity>,
    /// Disable our extra wires when the target has fewer.
    pub clamp_to_target_wire_count: bool,
    /// Style shared by every rigged wire (sag, segments, colour, district...).
    pub wire: PowerLine,
}

impl Default for PowerLinePole {
    fn default() -> Self {
        Self {
            mesh: None,
            scale: Vec3::ONE,
            num_wires: 0,
            wire_offsets: Vec::new(),
            attach_prefix: "Wire".to_string(),
            target_pole: None,
            clamp_to_target_wire_count: true,
            wire: PowerLine::default(),
        }
    }
}

/// Marks a `PowerLine` spawned by a pole rig.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq)]
pub struct AutoWire {
    pub index: u32,
}

impl PowerLinePole {
    pub fn with_mesh(mesh: impl Into<String>) -> Self {
        Self { mesh: Some(MeshRef::new(mesh)), ..default() }
    }

    /// Cross-arm layout: wires 25 apart, 300 up.
    pub fn default_offset(index: u32) -> Vec3 {
        Vec3::new(0.0, 300.0, 25.0 * index as f32)
    }

    pub fn wire_offset(&self, index: u32) -> Vec3 {
        self.wire_offsets
            .get(index as usize)
            .copied()
            .unwrap_or_else(|| Self::default_offset(index))
    }

    pub fn wire_key(&self, index: u32) -> String { format!("{}_{}", self.attach_prefix, index) }

    /// How many of our wires have a partner on the target.
    pub fn connected_wires(&self, target_wire_count: Option<u32>) -> u32 {
        match (self.clamp_to_target_wire_count, target_wire_count) {
            (true, Some(n)) => self.num_wires.min(n),
            _ => self.num_wires,
        }
    }

    /// The `PowerLine` for wire `index`.
    pub fn wire_line(&self, index: u32, target_wire_count: Option<u32>) -> PowerLine {
        let key = self.wire_key(index);
        PowerLine {
            attach_id: Some(key.clone()),
            tags: vec![key],
            target: self.target_pole,
            target_attach_override: None,
            line_id: index as i32,
            enabled: self.wire.enabled && index < self.connected_wires(target_wire_count),
            ..self.wire.clone()
        }
    }

    /// World transform of the pooled instance.
    pub fn instance_transform(&self, global: &GlobalTransform) -> Transform {
        let mut t = global.compute_transform();
        t.scale *= self.scale;
        t
    }
}
