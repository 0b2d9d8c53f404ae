use bevy::prelude::*;
use powerlines::lines::chunk_index::ChunkIndex;
use powerlines::lines::core::{ChunkGrid, ChunkKey};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

fn random_pos(rng: &mut ChaCha8Rng) -> Vec3 {
    Vec3::new(rng.random_range(-50_000.0..50_000.0), rng.random_range(0.0..500.0), rng.random_range(-50_000.0..50_000.0))
}

#[test]
fn locate_is_pure() {
    let grid = ChunkGrid::new(10_000.0);
    let p = Vec3::new(-12_345.0, 77.0, 99_999.0);
    assert_eq!(grid.locate(p), grid.locate(p));
    assert_eq!(grid.locate(p), ChunkKey::new(-2, 9));
}

#[test]
fn random_moves_keep_single_membership() {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let mut ix: ChunkIndex<u32> = ChunkIndex::new(ChunkGrid::new(10_000.0));

    for step in 0..2_000 {
        let member = rng.random_range(0..64u32);
        let pos = random_pos(&mut rng);
        let before = ix.key_of(member);
        ix.take_dirty();

        ix.register_at(member, pos);
        let key = ix.locate(pos);

        assert_eq!(ix.key_of(member), Some(key), "step {step}");
        assert!(ix.is_dirty(key));
        if let Some(old) = before {
            assert!(ix.is_dirty(old));
        }

        let holding: Vec<ChunkKey> = ix.chunk_keys().filter(|k| ix.members(*k).any(|m| m == member)).collect();
        assert_eq!(holding, vec![key], "step {step}");
    }

    // occasionally unregister everything
    for m in 0..64 {
        ix.unregister(m);
    }
    assert_eq!(ix.member_count(), 0);
    assert!(ix.chunk_keys().all(|k| ix.members(k).next().is_none()));
}

#[test]
fn take_dirty_is_sorted_and_drains() {
    let mut ix: ChunkIndex<u32> = ChunkIndex::new(ChunkGrid::new(100.0));
    ix.register_at(1, Vec3::new(550.0, 0.0, -20.0));
    ix.register_at(2, Vec3::new(-350.0, 0.0, 20.0));
    ix.register_at(3, Vec3::new(10.0, 0.0, 10.0));
    assert_eq!(ix.take_dirty(), vec![ChunkKey::new(-4, 0), ChunkKey::new(0, 0), ChunkKey::new(5, -1)]);
    assert!(ix.take_dirty().is_empty());
}
