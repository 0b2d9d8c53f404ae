// src/lines/render.rs
//! Render-side consumer of the handoff buffers.
//! Snapshots are copied on the async compute pool, off the simulation timeline, and
//! turned into flat line-list vertex data. No `Mesh` here, so this runs headless.

use std::collections::{BTreeSet, HashMap};

use bevy::prelude::*;
use bevy::tasks::{AsyncComputeTaskPool, Task};
use futures_lite::future;

use super::core::{Bounds, ChunkKey};
use super::handoff::GeometrySnapshot;
use super::plugin::{ChunkGeometryChanged, PowerLineSet};
use super::subsystem::PowerLineSubsystem;

/// Line-list vertices for one chunk (two per segment).
#[derive(Clone, Debug, PartialEq)]
pub struct LineMeshData {
    pub positions: Vec<[f32; 3]>,
    pub colors: Vec<[f32; 4]>,
    pub bounds: Bounds,
    pub revision: u64,
}

impl LineMeshData {
    pub fn from_snapshot(snapshot: &GeometrySnapshot) -> Self {
        let n = snapshot.segments.len() * 2;
        let mut positions = Vec::with_capacity(n);
        let mut colors = Vec::with_capacity(n);
        for s in &snapshot.segments {
            let c = s.color.to_linear();
            let rgba = [c.red, c.green, c.blue, c.alpha];
            positions.push(s.start.to_array());
            positions.push(s.end.to_array());
            colors.push(rgba);
            colors.push(rgba);
        }
        Self { positions, colors, bounds: snapshot.bounds, revision: snapshot.revision }
    }

    #[inline]
    pub fn is_empty(&self) -> bool { self.positions.is_empty() }

    #[inline]
    pub fn segment_count(&self) -> usize { self.positions.len() / 2 }
}

/// Latest consumed geometry per chunk.
#[derive(Resource, Default)]
pub struct ChunkLineMeshes {
    pub by_chunk: HashMap<ChunkKey, LineMeshData>,
    /// Chunks whose data changed since the visuals last looked.
    pub updated: BTreeSet<ChunkKey>,
}

#[derive(Resource, Default)]
pub struct LineSnapshotTasks {
    tasks: HashMap<ChunkKey, Task<LineMeshData>>,
    /// Changed while a task for the same chunk was still running.
    pending: BTreeSet<ChunkKey>,
}

impl LineSnapshotTasks {
    pub fn in_flight(&self) -> usize { self.tasks.len() + self.pending.len() }
}

pub struct PowerLineRenderPlugin;

impl Plugin for PowerLineRenderPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<ChunkLineMeshes>()
            .init_resource::<LineSnapshotTasks>()
            .add_systems(
                PostUpdate,
                (collect_snapshot_tasks, schedule_snapshot_tasks)
                    .chain()
                    .after(PowerLineSet::Rebuild),
            );
    }
}

/// Spawn one snapshot copy per changed chunk (at most one in flight per chunk).
pub fn schedule_snapshot_tasks(
    subsystem: Res<PowerLineSubsystem>,
    mut events: EventReader<ChunkGeometryChanged>,
    mut tasks: ResMut<LineSnapshotTasks>,
) {
    let LineSnapshotTasks { tasks, pending } = &mut *tasks;
    pending.extend(events.read().map(|ev| ev.chunk));
    if pending.is_empty() {
        return;
    }

    let pool = AsyncComputeTaskPool::get();
    let ready: Vec<ChunkKey> = pending.iter().copied().filter(|k| !tasks.contains_key(k)).collect();
    for key in ready {
        pending.remove(&key);
        let Some(buffer) = subsystem.handoff(key) else { continue };
        let task = pool.spawn(async move { LineMeshData::from_snapshot(&buffer.snapshot()) });
        tasks.insert(key, task);
    }
}

/// Poll finished copies; older revisions never overwrite newer ones.
pub fn collect_snapshot_tasks(mut tasks: ResMut<LineSnapshotTasks>, mut meshes: ResMut<ChunkLineMeshes>) {
    let ChunkLineMeshes { by_chunk, updated } = &mut *meshes;
    tasks.tasks.retain(|key, task| {
        if !task.is_finished() {
            return true;
        }
        if let Some(data) = future::block_on(future::poll_once(task)) {
            let stale = by_chunk.get(key).is_some_and(|old| old.revision >= data.revision);
            if !stale {
                debug!("PowerLines: chunk {:?} rev {} -> {} segment(s)", key, data.revision, data.segment_count());
                by_chunk.insert(*key, data);
                updated.insert(*key);
            }
        }
        false
    });
}
