// src/lines/curve.rs
//! Sagging curve evaluation.
//!
//! `point(t) = lerp(start, end, t) - UP * sag * sin(t * PI)`.
//! The same polyline feeds segment emission and hanging placement, so the two always agree.

use std::f32::consts::PI;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use super::core::UP;

/// Fewest segments any line is drawn with.
pub const MIN_SEGMENTS: u32 = 2;

/// Hard upper limit so a bad profile can't allocate unbounded polylines.
pub const MAX_SEGMENTS: u32 = 4096;

/// Total arc length below which a polyline counts as degenerate.
pub const DEGENERATE_LENGTH: f32 = 1e-4;

/// How polyline vertices are distributed along the curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum SegmentSpacing {
    /// `segments + 1` equally spaced `t` values.
    Uniform,
    /// Oversample, then place vertices at equal arc length.
    EqualArcLength { oversample: u32 },
}

impl Default for SegmentSpacing {
    fn default() -> Self { SegmentSpacing::Uniform }
}

/// Sag profile: symmetric bell, 0 at the ends, 1 at `t = 0.5`.
#[inline]
pub fn sag_shape(t: f32) -> f32 { (t * PI).sin() }

#[inline]
pub fn eval(start: Vec3, end: Vec3, sag: f32, t: f32) -> Vec3 {
    start.lerp(end, t) - UP * (sag * sag_shape(t))
}

/// Segment count actually used: the larger of the local hint and the district policy,
/// never below [`MIN_SEGMENTS`].
pub fn effective_segments(hint: u32, policy: Option<u32>) -> u32 {
    let n = match policy {
        Some(p) => hint.max(p),
        None => hint,
    };
    n.clamp(MIN_SEGMENTS, MAX_SEGMENTS)
}

/// Polyline with `segments + 1` vertices from `start` to `end`.
pub fn build_polyline(start: Vec3, end: Vec3, sag: f32, segments: u32, spacing: SegmentSpacing) -> Vec<Vec3> {
    let n = segments.clamp(MIN_SEGMENTS, MAX_SEGMENTS);
    match spacing {
        SegmentSpacing::Uniform => uniform(start, end, sag, n),
        SegmentSpacing::EqualArcLength { oversample } => {
            let dense = uniform(start, end, sag, n.saturating_mul(oversample.max(1)).min(MAX_SEGMENTS * 8));
            resample_equal_length(&dense, n)
        }
    }
}

fn uniform(start: Vec3, end: Vec3, sag: f32, n: u32) -> Vec<Vec3> {
    (0..=n).map(|i| eval(start, end, sag, i as f32 / n as f32)).collect()
}

/// Cumulative arc length at every vertex (`out[0] == 0`).
pub fn cumulative_lengths(points: &[Vec3]) -> Vec<f32> {
    let mut out = Vec::with_capacity(points.len());
    let mut total = 0.0;
    out.push(0.0);
    for w in points.windows(2) {
        total += w[0].distance(w[1]);
        out.push(total);
    }
    out
}

pub fn polyline_length(points: &[Vec3]) -> f32 {
    points.windows(2).map(|w| w[0].distance(w[1])).sum()
}

/// Position and unit tangent at a normalized arc-length fraction.
/// Returns `None` for degenerate (near zero-length) polylines.
pub fn point_at_fraction(points: &[Vec3], fraction: f32) -> Option<(Vec3, Vec3)> {
    if points.len() < 2 {
        return None;
    }
    let cum = cumulative_lengths(points);
    let total = *cum.last()?;
    if total <= DEGENERATE_LENGTH {
        return None;
    }

    let target = fraction.clamp(0.0, 1.0) * total;
    // first vertex whose cumulative length reaches the target
    let hi = cum.partition_point(|&d| d < target).clamp(1, points.len() - 1);
    let lo = hi - 1;

    let (d0, d1) = (cum[lo], cum[hi]);
    let alpha = if d1 > d0 { (target - d0) / (d1 - d0) } else { 0.0 };
    let pos = points[lo].lerp(points[hi], alpha);
    let tangent = (points[hi] - points[lo]).normalize_or_zero();
    Some((pos, tangent))
}

/// Re-place `n + 1` vertices at equal arc length along a dense polyline.
fn resample_equal_length(dense: &[Vec3], n: u32) -> Vec<Vec3> {
    let (Some(&first), Some(&last)) = (dense.first(), dense.last()) else {
        return Vec::new();
    };
    let cum = cumulative_lengths(dense);
    let total = cum.last().copied().unwrap_or(0.0);
    if total <= DEGENERATE_LENGTH {
        return vec![first; n as usize + 1];
    }

    let mut out = Vec::with_capacity(n as usize + 1);
    out.push(first);
    let mut seg = 1usize;
    for i in 1..n {
        let target = total * i as f32 / n as f32;
        while seg < dense.len() - 1 && cum[seg] < target {
            seg += 1;
        }
        let (d0, d1) = (cum[seg - 1], cum[seg]);
        let alpha = if d1 > d0 { (target - d0) / (d1 - d0) } else { 0.0 };
        out.push(dense[seg - 1].lerp(dense[seg], alpha));
    }
    out.push(last);
    out
}
