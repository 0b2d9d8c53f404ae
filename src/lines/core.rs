// src/lines/core.rs
//! Core types shared by the chunk index, the rebuilder and the render side.
//! Keep this file dependency-light; everything else builds on it.

use bevy::prelude::*; // Vec3, Color
use serde::{Deserialize, Serialize};

/// World up. Sag pulls curves along `-UP`, hanging props drop along `-UP`.
pub const UP: Vec3 = Vec3::Y;

/// Half extent of the box used when a chunk has no usable geometry.
pub const DEGENERATE_BOUNDS_EXTENT: f32 = 1.0;

// ---------- Chunks ----------

/// Integer chunk coordinate on the XZ ground plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub x: i32,
    pub z: i32,
}

impl ChunkKey {
    pub const fn new(x: i32, z: i32) -> Self { Self { x, z } }
}

/// Uniform grid used to quantize world positions into chunk keys.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChunkGrid {
    size: f32,
}

impl ChunkGrid {
    /// Smallest accepted cell size; anything below (or non-finite) is clamped.
    pub const MIN_SIZE: f32 = 1.0;

    pub fn new(size: f32) -> Self {
        let size = if size.is_finite() { size.max(Self::MIN_SIZE) } else { Self::MIN_SIZE };
        Self { size }
    }

    #[inline]
    pub fn size(&self) -> f32 { self.size }

    /// Pure and total: NaN coordinates saturate to 0, huge ones to `i32` bounds.
    #[inline]
    pub fn locate(&self, pos: Vec3) -> ChunkKey {
        ChunkKey {
            x: (pos.x / self.size).floor() as i32,
            z: (pos.z / self.size).floor() as i32,
        }
    }

    /// World-space center of a chunk (y = 0).
    pub fn center(&self, key: ChunkKey) -> Vec3 {
        Vec3::new(
            (key.x as f32 + 0.5) * self.size,
            0.0,
            (key.z as f32 + 0.5) * self.size,
        )
    }
}

impl Default for ChunkGrid {
    fn default() -> Self { Self::new(10_000.0) }
}

// ---------- Visual assets ----------

/// Reference to a visual asset (mesh path). Pools are keyed by it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeshRef(pub String);

impl MeshRef {
    pub fn new(path: impl Into<String>) -> Self { Self(path.into()) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl From<&str> for MeshRef {
    fn from(s: &str) -> Self { Self(s.to_string()) }
}

// ---------- Geometry ----------

/// One batched line segment, world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LineSegment {
    pub start: Vec3,
    pub end: Vec3,
    pub color: Color,
    pub thickness: f32,
    pub depth_bias: f32,
    pub screen_space: bool,
}

/// Axis-aligned world bounds of a chunk batch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Bounds {
    /// Box of `half` extent on every axis around `center`.
    pub fn around(center: Vec3, half: f32) -> Self {
        let h = Vec3::splat(half.abs());
        Self { min: center - h, max: center + h }
    }

    /// Bounds over every segment endpoint. Empty, non-finite or point-like input falls
    /// back to a small box so culling never sees an invalid volume.
    pub fn from_segments(segments: &[LineSegment], fallback_center: Vec3, fallback_half: f32) -> Self {
        Self::tight(segments).with_fallback(fallback_center, fallback_half)
    }

    /// Raw min/max over every endpoint. Invalid for empty input.
    pub fn tight(segments: &[LineSegment]) -> Self {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for s in segments {
            min = min.min(s.start).min(s.end);
            max = max.max(s.start).max(s.end);
        }
        Self { min, max }
    }

    /// Invalid bounds become a box around `fallback_center`, point-like ones a box
    /// around the point.
    pub fn with_fallback(self, fallback_center: Vec3, fallback_half: f32) -> Self {
        if !self.is_valid() {
            return Self::around(fallback_center, fallback_half);
        }
        if self.size().max_element() <= f32::EPSILON {
            return Self::around(self.center(), fallback_half);
        }
        self
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min.cmple(self.max).all()
    }

    #[inline]
    pub fn size(&self) -> Vec3 { self.max - self.min }

    #[inline]
    pub fn center(&self) -> Vec3 { (self.min + self.max) * 0.5 }

    /// Radius of the enclosing sphere.
    #[inline]
    pub fn radius(&self) -> f32 { self.size().length() * 0.5 }
}

// ---------- Anchor lookup ----------

/// How a line finds its matching point on the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttachLookup {
    /// Match the attach id of a line on the target (recommended).
    #[default]
    ByAttachId,
    /// Match an anchor carrying the key as a tag.
    ByTag,
    /// Match an anchor by exact name.
    ByName,
}

impl AttachLookup {
    /// Requested mode first, then the remaining modes in id → tag → name order.
    pub fn fallback_order(self) -> [AttachLookup; 3] {
        match self {
            AttachLookup::ByAttachId => [AttachLookup::ByAttachId, AttachLookup::ByTag, AttachLookup::ByName],
            AttachLookup::ByTag => [AttachLookup::ByTag, AttachLookup::ByAttachId, AttachLookup::ByName],
            AttachLookup::ByName => [AttachLookup::ByName, AttachLookup::ByAttachId, AttachLookup::ByTag],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(a: Vec3, b: Vec3) -> LineSegment {
        LineSegment { start: a, end: b, color: Color::BLACK, thickness: 1.0, depth_bias: 0.0, screen_space: true }
    }

    #[test]
    fn locate_floors_negative_coordinates() {
        let grid = ChunkGrid::new(100.0);
        assert_eq!(grid.locate(Vec3::new(-0.5, 0.0, 0.0)), ChunkKey::new(-1, 0));
        assert_eq!(grid.locate(Vec3::new(99.9, 7.0, 100.0)), ChunkKey::new(0, 1));
        assert_eq!(grid.locate(Vec3::new(-200.0, 0.0, -100.1)), ChunkKey::new(-2, -2));
    }

    #[test]
    fn locate_is_total_for_nan() {
        let grid = ChunkGrid::new(100.0);
        assert_eq!(grid.locate(Vec3::NAN), ChunkKey::new(0, 0));
    }

    #[test]
    fn bad_chunk_size_is_clamped() {
        assert_eq!(ChunkGrid::new(0.0).size(), ChunkGrid::MIN_SIZE);
        assert_eq!(ChunkGrid::new(f32::NAN).size(), ChunkGrid::MIN_SIZE);
    }

    #[test]
    fn empty_bounds_fall_back_to_box() {
        let b = Bounds::from_segments(&[], Vec3::new(5.0, 0.0, 5.0), 1.0);
        assert!(b.is_valid());
        assert_eq!(b.center(), Vec3::new(5.0, 0.0, 5.0));
        assert_eq!(b.size(), Vec3::splat(2.0));
    }

    #[test]
    fn point_like_bounds_are_inflated() {
        let p = Vec3::new(10.0, 2.0, -3.0);
        let b = Bounds::from_segments(&[seg(p, p), seg(p, p)], Vec3::ZERO, 1.0);
        assert_eq!(b.center(), p);
        assert!(b.size().min_element() > 0.0);
    }

    #[test]
    fn bounds_cover_all_endpoints() {
        let b = Bounds::from_segments(
            &[seg(Vec3::ZERO, Vec3::new(10.0, -2.0, 0.0)), seg(Vec3::new(10.0, -2.0, 0.0), Vec3::new(20.0, 0.0, 5.0))],
            Vec3::ZERO,
            1.0,
        );
        assert_eq!(b.min, Vec3::new(0.0, -2.0, 0.0));
        assert_eq!(b.max, Vec3::new(20.0, 0.0, 5.0));
    }
}
