// src/lines/district.rs
//! Per-district line settings: sag, segment density and hanging props.
//! Sampling is deterministic per (seed, quantized endpoints, line id) unless disabled.

use bevy::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::core::MeshRef;

// ---------- Settings (data form) ----------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SagSettings {
    /// Random sag amount (downward, positive). Order of the two ends does not matter.
    pub range: (f32, f32),
    /// Multiplier for the whole district.
    pub scale: f32,
    /// Same line => same sag across rebuilds.
    pub deterministic: bool,
    pub seed: u64,
}

impl Default for SagSettings {
    fn default() -> Self {
        Self { range: (40.0, 120.0), scale: 1.0, deterministic: true, seed: 1337 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentsSettings {
    /// Derive the count from line length.
    pub auto: bool,
    pub target_length: f32,
    pub min: u32,
    pub max: u32,
    /// Used when `auto` is false.
    pub fixed: u32,
}

impl Default for SegmentsSettings {
    fn default() -> Self {
        Self { auto: true, target_length: 150.0, min: 4, max: 64, fixed: 12 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HangingSettings {
    /// Meshes that may hang on a wire. Empty disables the feature.
    pub mesh_pool: Vec<MeshRef>,
    /// Chance for ONE mesh on a wire, 0..=1.
    pub chance_per_wire: f32,
    /// Normalized placement range along the wire.
    pub distance_range: (f32, f32),
    /// Extra drop below the wire point.
    pub down_offset: f32,
    /// Max random yaw around the wire tangent (degrees).
    pub random_yaw_deg: f32,
    pub deterministic: bool,
    pub seed: u64,
}

impl Default for HangingSettings {
    fn default() -> Self {
        Self {
            mesh_pool: Vec::new(),
            chance_per_wire: 0.03,
            distance_range: (0.2, 0.8),
            down_offset: 10.0,
            random_yaw_deg: 15.0,
            deterministic: true,
            seed: 24601,
        }
    }
}

/// Named settings for every line associated with a district.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistrictProfile {
    /// Optional id lines can ask for during auto-discovery.
    pub district_id: Option<String>,
    pub sag: SagSettings,
    pub segments: SegmentsSettings,
    pub hanging: HangingSettings,
}

/// A hanging prop chosen for a line.
#[derive(Clone, Debug, PartialEq)]
pub struct HangingChoice {
    pub mesh: MeshRef,
    /// Normalized arc-length position along the wire.
    pub distance: f32,
    pub yaw_deg: f32,
    pub down_offset: f32,
}

// ---------- Sampling ----------

impl DistrictProfile {
    /// Sag for the line between `start` and `end`; never negative.
    pub fn sag_for_line(&self, start: Vec3, end: Vec3, line_id: i32) -> f32 {
        let (lo, hi) = ordered(self.sag.range);
        let mut rng = stream(self.sag.deterministic, self.sag.seed, start, end, line_id);
        let value = sample_between(&mut rng, lo, hi);
        finite_or(value * finite_or(self.sag.scale, 0.0), 0.0).max(0.0)
    }

    /// Segment count the district wants for a line of `length` units.
    pub fn segments_for_length(&self, length: f32) -> u32 {
        let s = &self.segments;
        if !s.auto {
            return s.fixed.max(1);
        }
        let step = finite_or(s.target_length, 10.0).max(10.0);
        let raw = (finite_or(length, 0.0).max(0.0) / step).ceil();
        let raw = if raw >= u32::MAX as f32 { u32::MAX } else { raw as u32 };
        let lo = s.min.max(1);
        let hi = s.max.max(lo);
        raw.clamp(lo, hi)
    }

    /// Decide whether this line carries a hanging prop and where.
    pub fn hanging_for_line(&self, start: Vec3, end: Vec3, line_id: i32) -> Option<HangingChoice> {
        let h = &self.hanging;
        if h.mesh_pool.is_empty() || !(h.chance_per_wire > 0.0) {
            return None;
        }

        let (lo, hi) = ordered(h.distance_range);
        let (lo, hi) = (lo.clamp(0.0, 1.0), hi.clamp(0.0, 1.0));

        let mut rng = stream(h.deterministic, h.seed, start, end, line_id);
        if rng.random::<f32>() > h.chance_per_wire {
            return None;
        }

        let mesh = h.mesh_pool[rng.random_range(0..h.mesh_pool.len())].clone();
        let distance = sample_between(&mut rng, lo, hi);
        let max_yaw = finite_or(h.random_yaw_deg, 0.0).abs();
        let yaw_deg = if max_yaw > 0.0 { sample_between(&mut rng, -max_yaw, max_yaw) } else { 0.0 };

        Some(HangingChoice { mesh, distance, yaw_deg, down_offset: finite_or(h.down_offset, 0.0) })
    }
}

/// Stable hash of a line; endpoints are rounded to whole units so sub-unit jitter
/// does not reshuffle anything.
pub fn hash_line(start: Vec3, end: Vec3, line_id: i32) -> u64 {
    let qa = start.round().as_ivec3();
    let qb = end.round().as_ivec3();
    let mut h = 0u64;
    for v in [qa.x, qa.y, qa.z, qb.x, qb.y, qb.z, line_id] {
        h = combine(h, v as u32 as u64);
    }
    h
}

#[inline]
fn combine(h: u64, v: u64) -> u64 {
    splitmix64(h ^ v.wrapping_add(0x9E37_79B9_7F4A_7C15).wrapping_add(h << 6).wrapping_add(h >> 2))
}

#[inline]
fn splitmix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

fn stream(deterministic: bool, seed: u64, start: Vec3, end: Vec3, line_id: i32) -> ChaCha8Rng {
    if deterministic {
        ChaCha8Rng::seed_from_u64(seed ^ hash_line(start, end, line_id))
    } else {
        ChaCha8Rng::from_rng(&mut rand::rng())
    }
}

/// Uniform in `[lo, hi]`. Spans too wide for `random_range` use a blend of the ends.
fn sample_between(rng: &mut ChaCha8Rng, lo: f32, hi: f32) -> f32 {
    if (hi - lo).is_finite() {
        rng.random_range(lo..=hi)
    } else {
        let u: f32 = rng.random();
        lo * (1.0 - u) + hi * u
    }
}

#[inline]
fn finite_or(v: f32, fallback: f32) -> f32 {
    if v.is_finite() { v } else { fallback }
}

#[inline]
fn ordered((a, b): (f32, f32)) -> (f32, f32) {
    let (a, b) = (finite_or(a, 0.0), finite_or(b, 0.0));
    (a.min(b), a.max(b))
}
