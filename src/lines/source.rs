// src/lines/source.rs
//! `PowerLine`: one sagging wire from its own anchor to a target anchor (or a fixed point).

use bevy::prelude::*;

use super::anchors::AnchorResolver;
use super::core::{AttachLookup, LineSegment};
use super::curve::{self, SegmentSpacing};
use super::district::HangingChoice;
use super::districts::{DistrictBinding, DistrictRegistry};

/// A wire. Its start is the entity's world translation.
#[derive(Component, Clone, Debug)]
pub struct PowerLine {
    /// Key other lines use to find this one (`ByAttachId`).
    pub attach_id: Option<String>,
    pub tags: Vec<String>,

    /// Actor the wire runs to.
    pub target: Option<Entity>,
    pub target_lookup: AttachLookup,
    /// Search this key on the target instead of our own attach key.
    pub target_attach_override: Option<String>,
    /// World end point when there is no target. `Vec3::ZERO` means unset.
    pub manual_end: Vec3,

    pub district: DistrictBinding,
    /// Local sag, used when no district profile applies.
    pub sag: f32,
    /// Separates parallel wires between the same two anchors.
    pub line_id: i32,
    /// Segment-count hint.
    pub segments: u32,

    pub thickness: f32,
    pub color: Color,
    pub depth_bias: f32,
    pub screen_space: bool,
    pub enabled: bool,
}

impl Default for PowerLine {
    fn default() -> Self {
        Self {
            attach_id: None,
            tags: Vec::new(),
            target: None,
            target_lookup: AttachLookup::ByAttachId,
            target_attach_override: None,
            manual_end: Vec3::ZERO,
            district: DistrictBinding::default(),
            sag: 50.0,
            line_id: 0,
            segments: 8,
            thickness: 2.0,
            color: Color::BLACK,
            depth_bias: 0.0,
            screen_space: true,
            enabled: true,
        }
    }
}

impl PowerLine {
    /// Wire towards `target`, matched by attach id.
    pub fn to(target: Entity) -> Self {
        Self { target: Some(target), ..default() }
    }

    /// Attach id, else first tag.
    pub fn attach_key(&self) -> Option<&str> {
        self.attach_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.tags.first().map(String::as_str).filter(|s| !s.is_empty()))
    }

    /// Key searched on the target.
    pub fn search_key(&self) -> Option<&str> {
        self.target_attach_override.as_deref().filter(|s| !s.is_empty()).or_else(|| self.attach_key())
    }

    /// End point plus whether the wire is actually connected to something.
    /// A target the resolver does not know counts as no target.
    pub fn resolve_end(&self, start: Vec3, anchors: &impl AnchorResolver) -> (Vec3, bool) {
        if let Some(end) = self
            .target
            .and_then(|t| anchors.resolve(t, self.search_key(), self.target_lookup))
        {
            return (end, true);
        }
        if self.manual_end != Vec3::ZERO {
            (self.manual_end, false)
        } else {
            (start, false)
        }
    }
}

/// Everything the rebuilder needs from one evaluated wire.
#[derive(Clone, Debug)]
pub struct LineShape {
    pub start: Vec3,
    pub end: Vec3,
    pub connected: bool,
    pub sag: f32,
    pub segments: u32,
    pub district: Option<Entity>,
    pub points: Vec<Vec3>,
    pub hanging: Option<HangingChoice>,
}

impl LineShape {
    /// Resolve, sample and tessellate. Disabled lines yield `None`.
    pub fn evaluate(
        line: &PowerLine,
        start: Vec3,
        anchors: &impl AnchorResolver,
        districts: &DistrictRegistry,
        spacing: SegmentSpacing,
    ) -> Option<Self> {
        if !line.enabled {
            return None;
        }
        let (end, connected) = line.resolve_end(start, anchors);

        // disconnected stubs never look at a district
        let profile = if connected { districts.resolve_profile(&line.district, start) } else { None };

        let (sag, segments, hanging) = match (connected, profile) {
            (false, _) => (0.0, curve::effective_segments(line.segments, None), None),
            (true, None) => (line.sag.max(0.0), curve::effective_segments(line.segments, None), None),
            (true, Some((_, p))) => {
                let length = start.distance(end);
                let policy = p.segments_for_length(length);
                // no decoration on a zero-length chord, even though the sag dip has length
                let hanging = if length > curve::DEGENERATE_LENGTH {
                    p.hanging_for_line(start, end, line.line_id)
                } else {
                    None
                };
                (
                    p.sag_for_line(start, end, line.line_id),
                    curve::effective_segments(line.segments, Some(policy)),
                    hanging,
                )
            }
        };

        let points = curve::build_polyline(start, end, sag, segments, spacing);
        Some(Self {
            start,
            end,
            connected,
            sag,
            segments,
            district: profile.map(|(id, _)| id),
            points,
            hanging,
        })
    }

    /// Append this wire's segments to a chunk batch.
    pub fn emit(&self, line: &PowerLine, out: &mut Vec<LineSegment>) {
        out.extend(self.points.windows(2).map(|w| LineSegment {
            start: w[0],
            end: w[1],
            color: line.color,
            thickness: line.thickness,
            depth_bias: line.depth_bias,
            screen_space: line.screen_space,
        }));
    }
}
