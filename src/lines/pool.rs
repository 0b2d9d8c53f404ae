// src/lines/pool.rs
//! Dense instance pools keyed by (chunk, mesh). Removal swaps the last slot into the
//! hole and relocates its owner, so slots stay gap-free and owner lookups stay O(1).

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use bevy::prelude::*;

use super::core::{ChunkKey, MeshRef};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolKey {
    pub chunk: ChunkKey,
    pub mesh: MeshRef,
}

impl PoolKey {
    pub fn new(chunk: ChunkKey, mesh: MeshRef) -> Self { Self { chunk, mesh } }
}

/// Where an owner currently lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolSlot {
    pub key: PoolKey,
    pub index: usize,
}

/// One pool. `transforms[i]` belongs to `owners[i]` for every `i < len()`.
#[derive(Debug)]
pub struct InstancePool<O> {
    transforms: Vec<Transform>,
    owners: Vec<O>,
}

impl<O> Default for InstancePool<O> {
    fn default() -> Self { Self { transforms: Vec::new(), owners: Vec::new() } }
}

impl<O: Copy> InstancePool<O> {
    #[inline]
    pub fn len(&self) -> usize { self.transforms.len() }

    #[inline]
    pub fn is_empty(&self) -> bool { self.transforms.is_empty() }

    pub fn transforms(&self) -> &[Transform] { &self.transforms }

    pub fn owners(&self) -> &[O] { &self.owners }

    fn push(&mut self, owner: O, transform: Transform) -> usize {
        self.transforms.push(transform);
        self.owners.push(owner);
        self.transforms.len() - 1
    }

    /// Swap-remove; returns the owner that moved into `index`, if any.
    fn swap_remove(&mut self, index: usize) -> Option<O> {
        if index >= self.transforms.len() {
            return None;
        }
        self.transforms.swap_remove(index);
        self.owners.swap_remove(index);
        self.owners.get(index).copied()
    }
}

#[derive(Debug)]
pub struct InstancePools<O> {
    pools: HashMap<PoolKey, InstancePool<O>>,
    slots: HashMap<O, PoolSlot>,
    dirty: BTreeSet<PoolKey>,
}

impl<O> Default for InstancePools<O> {
    fn default() -> Self {
        Self { pools: HashMap::new(), slots: HashMap::new(), dirty: BTreeSet::new() }
    }
}

impl<O: Copy + Eq + Hash> InstancePools<O> {
    /// Add `owner` to the (chunk, mesh) pool. An owner already pooled is updated instead.
    pub fn add(&mut self, owner: O, chunk: ChunkKey, mesh: MeshRef, transform: Transform) -> usize {
        if self.slots.contains_key(&owner) {
            return self.update(owner, chunk, mesh, transform);
        }
        let key = PoolKey::new(chunk, mesh);
        let index = self.pools.entry(key.clone()).or_default().push(owner, transform);
        self.dirty.insert(key.clone());
        self.slots.insert(owner, PoolSlot { key, index });
        index
    }

    /// Remove `owner`; unknown owners are a no-op. The pool itself stays allocated.
    pub fn remove(&mut self, owner: O) -> Option<PoolSlot> {
        let slot = self.slots.remove(&owner)?;
        if let Some(pool) = self.pools.get_mut(&slot.key) {
            if let Some(moved) = pool.swap_remove(slot.index) {
                if let Some(s) = self.slots.get_mut(&moved) {
                    s.index = slot.index;
                }
            }
        }
        self.dirty.insert(slot.key.clone());
        Some(slot)
    }

    /// In place when (chunk, mesh) is unchanged, otherwise remove + add.
    pub fn update(&mut self, owner: O, chunk: ChunkKey, mesh: MeshRef, transform: Transform) -> usize {
        let same = self
            .slots
            .get(&owner)
            .map(|s| (s.key.chunk == chunk && s.key.mesh == mesh).then(|| (s.key.clone(), s.index)));
        match same {
            Some(Some((key, index))) => {
                if let Some(t) = self.pools.get_mut(&key).and_then(|p| p.transforms.get_mut(index)) {
                    *t = transform;
                }
                self.dirty.insert(key);
                index
            }
            Some(None) => {
                self.remove(owner);
                self.add(owner, chunk, mesh, transform)
            }
            None => self.add(owner, chunk, mesh, transform),
        }
    }

    pub fn slot_of(&self, owner: O) -> Option<&PoolSlot> { self.slots.get(&owner) }

    pub fn transform_of(&self, owner: O) -> Option<Transform> {
        let slot = self.slots.get(&owner)?;
        self.pools.get(&slot.key)?.transforms.get(slot.index).copied()
    }

    pub fn pool(&self, key: &PoolKey) -> Option<&InstancePool<O>> { self.pools.get(key) }

    pub fn keys(&self) -> impl Iterator<Item = &PoolKey> + '_ { self.pools.keys() }

    pub fn instance_count(&self) -> usize { self.slots.len() }

    /// Pools touched since the last call, in stable order.
    pub fn take_dirty(&mut self) -> Vec<PoolKey> {
        std::mem::take(&mut self.dirty).into_iter().collect()
    }
}
