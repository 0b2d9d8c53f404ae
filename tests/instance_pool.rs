use std::collections::HashMap;

use bevy::prelude::*;
use powerlines::lines::core::{ChunkKey, MeshRef};
use powerlines::lines::pool::{InstancePools, PoolKey};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn at(x: f32) -> Transform { Transform::from_xyz(x, 0.0, 0.0) }

/// Every pooled owner resolves to its own transform and no slot is shared.
fn check(pools: &InstancePools<u32>, expected: &HashMap<u32, (PoolKey, Transform)>) {
    assert_eq!(pools.instance_count(), expected.len());
    for (owner, (key, t)) in expected {
        let slot = pools.slot_of(*owner).expect("owner has a slot");
        assert_eq!(&slot.key, key);
        let pool = pools.pool(key).expect("pool exists");
        assert!(slot.index < pool.len());
        assert_eq!(pool.owners()[slot.index], *owner);
        assert_eq!(pools.transform_of(*owner), Some(*t));
    }
    let total: usize = pools.keys().filter_map(|k| pools.pool(k)).map(|p| p.len()).sum();
    assert_eq!(total, expected.len());
}

#[test]
fn removal_keeps_remaining_transforms() {
    let mut pools = InstancePools::<u32>::default();
    let chunk = ChunkKey::new(0, 0);
    let mesh = MeshRef::from("pole.glb");
    for i in 0..10 {
        pools.add(i, chunk, mesh.clone(), at(i as f32));
    }
    let key = PoolKey::new(chunk, mesh);

    pools.remove(4);
    let pool = pools.pool(&key).unwrap();
    assert_eq!(pool.len(), 9);
    for i in (0..10).filter(|i| *i != 4) {
        assert_eq!(pools.transform_of(i), Some(at(i as f32)));
    }
    // the former last owner now sits in the hole
    assert_eq!(pools.slot_of(9).unwrap().index, 4);

    // removing the last slot relocates nobody
    pools.remove(8);
    assert_eq!(pools.slot_of(9).unwrap().index, 4);
    assert_eq!(pools.pool(&key).unwrap().len(), 8);
}

#[test]
fn random_churn_never_leaves_gaps() {
    let mut rng = ChaCha8Rng::seed_from_u64(99);
    let mut pools = InstancePools::<u32>::default();
    let mut expected: HashMap<u32, (PoolKey, Transform)> = HashMap::new();
    let meshes = [MeshRef::from("wood.glb"), MeshRef::from("steel.glb")];

    for _ in 0..3_000 {
        let owner = rng.random_range(0..40u32);
        let chunk = ChunkKey::new(rng.random_range(-2..2), rng.random_range(-2..2));
        let mesh = meshes[rng.random_range(0..meshes.len())].clone();
        let t = at(rng.random_range(0.0..1000.0));
        match rng.random_range(0..3) {
            0 => {
                pools.add(owner, chunk, mesh.clone(), t);
                expected.insert(owner, (PoolKey::new(chunk, mesh), t));
            }
            1 => {
                pools.update(owner, chunk, mesh.clone(), t);
                expected.insert(owner, (PoolKey::new(chunk, mesh), t));
            }
            _ => {
                let had = expected.remove(&owner).is_some();
                assert_eq!(pools.remove(owner).is_some(), had);
            }
        }
        check(&pools, &expected);
    }
}
