// src/lines/chunk_index.rs
//! Uniform-grid membership index with a dirty set.
//!
//! Members are opaque handles (`Copy + Ord + Hash`). The index is the only owner of
//! "which chunk is this member in"; callers never cache keys themselves.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::Hash;

use bevy::prelude::*;

use super::core::{ChunkGrid, ChunkKey};

/// Membership of one chunk. Ordered so rebuilds emit geometry in a stable order.
#[derive(Debug)]
pub struct Chunk<M> {
    pub members: BTreeSet<M>,
}

impl<M> Default for Chunk<M> {
    fn default() -> Self { Self { members: BTreeSet::new() } }
}

#[derive(Debug)]
pub struct ChunkIndex<M> {
    grid: ChunkGrid,
    chunks: HashMap<ChunkKey, Chunk<M>>,
    keys: HashMap<M, ChunkKey>,
    dirty: HashSet<ChunkKey>,
}

impl<M: Copy + Ord + Hash> ChunkIndex<M> {
    pub fn new(grid: ChunkGrid) -> Self {
        Self {
            grid,
            chunks: HashMap::new(),
            keys: HashMap::new(),
            dirty: HashSet::new(),
        }
    }

    #[inline]
    pub fn grid(&self) -> ChunkGrid { self.grid }

    #[inline]
    pub fn locate(&self, pos: Vec3) -> ChunkKey { self.grid.locate(pos) }

    /// Move `member` into `key`, dirtying both the old and the new chunk.
    /// Returns the previous key. Re-registering into the same chunk only dirties it.
    pub fn register_or_move(&mut self, member: M, key: ChunkKey) -> Option<ChunkKey> {
        let prev = self.keys.insert(member, key);
        if let Some(old) = prev {
            if old != key {
                if let Some(chunk) = self.chunks.get_mut(&old) {
                    chunk.members.remove(&member);
                }
                self.dirty.insert(old);
            }
        }
        self.chunks.entry(key).or_default().members.insert(member);
        self.dirty.insert(key);
        prev
    }

    /// Convenience: locate + register_or_move.
    pub fn register_at(&mut self, member: M, pos: Vec3) -> Option<ChunkKey> {
        let key = self.locate(pos);
        self.register_or_move(member, key)
    }

    /// Remove `member` from its chunk (which becomes dirty). Unknown members are a no-op.
    pub fn unregister(&mut self, member: M) -> Option<ChunkKey> {
        let key = self.keys.remove(&member)?;
        if let Some(chunk) = self.chunks.get_mut(&key) {
            chunk.members.remove(&member);
        }
        self.dirty.insert(key);
        Some(key)
    }

    #[inline]
    pub fn key_of(&self, member: M) -> Option<ChunkKey> { self.keys.get(&member).copied() }

    #[inline]
    pub fn contains(&self, member: M) -> bool { self.keys.contains_key(&member) }

    pub fn chunk(&self, key: ChunkKey) -> Option<&Chunk<M>> { self.chunks.get(&key) }

    /// Members of a chunk in stable order (empty when the chunk was never created).
    pub fn members(&self, key: ChunkKey) -> impl Iterator<Item = M> + '_ {
        self.chunks.get(&key).into_iter().flat_map(|c| c.members.iter().copied())
    }

    pub fn chunk_keys(&self) -> impl Iterator<Item = ChunkKey> + '_ { self.chunks.keys().copied() }

    pub fn chunk_count(&self) -> usize { self.chunks.len() }

    pub fn member_count(&self) -> usize { self.keys.len() }

    #[inline]
    pub fn mark_dirty(&mut self, key: ChunkKey) { self.dirty.insert(key); }

    #[inline]
    pub fn is_dirty(&self, key: ChunkKey) -> bool { self.dirty.contains(&key) }

    pub fn has_dirty(&self) -> bool { !self.dirty.is_empty() }

    /// Drain the dirty set, sorted so a rebuild pass is reproducible.
    pub fn take_dirty(&mut self) -> Vec<ChunkKey> {
        let mut out: Vec<ChunkKey> = self.dirty.drain().collect();
        out.sort_unstable();
        out
    }
}
