// src/lines/handoff.rs
//! Per-chunk double buffer between the rebuild (writer) and the render side (reader).
//! Critical sections only copy or swap; nothing is evaluated under the lock.

use std::sync::{Mutex, MutexGuard, PoisonError};

use bevy::prelude::*;

use super::core::{Bounds, LineSegment};

/// Stable copy handed to a consumer.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometrySnapshot {
    pub segments: Vec<LineSegment>,
    pub bounds: Bounds,
    /// Bumped on every publish; 0 means nothing was published yet.
    pub revision: u64,
}

#[derive(Debug)]
struct Buffers {
    front: Vec<LineSegment>,
    back: Vec<LineSegment>,
    /// Raw bounds of `front`, kept so a new fallback can be applied without a rescan.
    tight: Bounds,
    bounds: Bounds,
    revision: u64,
    fallback_center: Vec3,
    fallback_half: f32,
}

#[derive(Debug)]
pub struct HandoffBuffer {
    inner: Mutex<Buffers>,
}

impl HandoffBuffer {
    /// `fallback_*` define the bounds reported while the chunk has no usable geometry.
    pub fn new(fallback_center: Vec3, fallback_half: f32) -> Self {
        Self {
            inner: Mutex::new(Buffers {
                front: Vec::new(),
                back: Vec::new(),
                tight: Bounds::tight(&[]),
                bounds: Bounds::around(fallback_center, fallback_half),
                revision: 0,
                fallback_center,
                fallback_half,
            }),
        }
    }

    // The swap is the last mutation, so a poisoned guard still holds whole buffers.
    fn lock(&self) -> MutexGuard<'_, Buffers> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Producer side: write back, swap, recompute bounds. Returns the new revision.
    /// Callers signal "geometry changed" after this returns, outside the lock.
    pub fn publish(&self, segments: &[LineSegment]) -> u64 {
        let tight = Bounds::tight(segments);
        let mut b = self.lock();
        b.back.clear();
        b.back.extend_from_slice(segments);
        let Buffers { front, back, .. } = &mut *b;
        std::mem::swap(front, back);
        b.tight = tight;
        b.bounds = tight.with_fallback(b.fallback_center, b.fallback_half);
        b.revision += 1;
        b.revision
    }

    /// Move the fallback box (chunk grid or extent changed). Keeps the revision.
    pub fn set_fallback(&self, center: Vec3, half: f32) {
        let mut b = self.lock();
        b.fallback_center = center;
        b.fallback_half = half;
        b.bounds = b.tight.with_fallback(center, half);
    }

    /// Consumer side: copy the front buffer and bounds.
    pub fn snapshot(&self) -> GeometrySnapshot {
        let b = self.lock();
        GeometrySnapshot { segments: b.front.clone(), bounds: b.bounds, revision: b.revision }
    }

    pub fn bounds(&self) -> Bounds { self.lock().bounds }

    pub fn revision(&self) -> u64 { self.lock().revision }

    pub fn segment_count(&self) -> usize { self.lock().front.len() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(x: f32) -> LineSegment {
        LineSegment {
            start: Vec3::new(x, 0.0, 0.0),
            end: Vec3::new(x + 1.0, -1.0, 0.0),
            color: Color::BLACK,
            thickness: 1.0,
            depth_bias: 0.0,
            screen_space: true,
        }
    }

    #[test]
    fn fresh_buffer_has_fallback_bounds() {
        let h = HandoffBuffer::new(Vec3::new(5.0, 0.0, 5.0), 1.0);
        let s = h.snapshot();
        assert!(s.segments.is_empty());
        assert_eq!(s.revision, 0);
        assert_eq!(s.bounds, Bounds::around(Vec3::new(5.0, 0.0, 5.0), 1.0));
    }

    #[test]
    fn publish_swaps_and_bumps_revision() {
        let h = HandoffBuffer::new(Vec3::ZERO, 1.0);
        assert_eq!(h.publish(&[seg(0.0), seg(1.0)]), 1);
        assert_eq!(h.segment_count(), 2);
        assert_eq!(h.bounds().max.x, 2.0);

        assert_eq!(h.publish(&[]), 2);
        let s = h.snapshot();
        assert!(s.segments.is_empty());
        assert!(s.bounds.is_valid());
    }

    #[test]
    fn snapshot_is_independent_of_later_publishes() {
        let h = HandoffBuffer::new(Vec3::ZERO, 1.0);
        h.publish(&[seg(0.0)]);
        let s = h.snapshot();
        h.publish(&[seg(7.0), seg(8.0)]);
        assert_eq!(s.segments, vec![seg(0.0)]);
    }

    #[test]
    fn moving_the_fallback_keeps_geometry_and_revision() {
        let h = HandoffBuffer::new(Vec3::new(5000.0, 0.0, 5000.0), 1.0);
        h.publish(&[]);
        h.set_fallback(Vec3::new(50.0, 0.0, 50.0), 2.0);
        assert_eq!(h.revision(), 1);
        assert_eq!(h.bounds(), Bounds::around(Vec3::new(50.0, 0.0, 50.0), 2.0));

        h.publish(&[seg(0.0)]);
        h.set_fallback(Vec3::ZERO, 1.0);
        assert_eq!(h.bounds().max, Vec3::new(1.0, 0.0, 0.0));
    }
}
