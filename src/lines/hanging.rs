// src/lines/hanging.rs
//! Hanging props: one optional mesh dangling from each connected wire.

use bevy::prelude::*;

use super::core::{MeshRef, UP};
use super::curve;
use super::district::HangingChoice;

/// A placed hanging prop.
#[derive(Clone, Debug, PartialEq)]
pub struct HangingInstance {
    pub mesh: MeshRef,
    pub transform: Transform,
}

/// Reported to the host after a rebuild.
#[derive(Event, Clone, Debug, PartialEq)]
pub enum HangingChanged {
    Placed { line: Entity, mesh: MeshRef, transform: Transform },
    Removed { line: Entity },
}

impl HangingChanged {
    pub fn line(&self) -> Entity {
        match self {
            HangingChanged::Placed { line, .. } | HangingChanged::Removed { line } => *line,
        }
    }
}

/// Walk the wire polyline to the chosen spot. `None` on degenerate wires.
pub fn place(choice: &HangingChoice, points: &[Vec3]) -> Option<HangingInstance> {
    let (pos, tangent) = curve::point_at_fraction(points, choice.distance)?;
    if tangent == Vec3::ZERO {
        return None;
    }
    let align = Quat::from_rotation_arc(Vec3::X, tangent);
    let yaw = Quat::from_axis_angle(tangent, choice.yaw_deg.to_radians());
    Some(HangingInstance {
        mesh: choice.mesh.clone(),
        transform: Transform {
            translation: pos - UP * choice.down_offset,
            rotation: (yaw * align).normalize(),
            scale: Vec3::ONE,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lines::curve::{build_polyline, SegmentSpacing};

    fn choice(distance: f32, yaw_deg: f32) -> HangingChoice {
        HangingChoice { mesh: MeshRef::from("shoes.glb"), distance, yaw_deg, down_offset: 10.0 }
    }

    #[test]
    fn sits_below_wire_and_faces_along_it() {
        let pts = build_polyline(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0), 0.0, 4, SegmentSpacing::Uniform);
        let h = place(&choice(0.5, 0.0), &pts).unwrap();
        assert!(h.transform.translation.distance(Vec3::new(50.0, -10.0, 0.0)) < 1e-3);
        assert!((h.transform.rotation * Vec3::X).distance(Vec3::X) < 1e-4);
    }

    #[test]
    fn yaw_rotates_about_tangent() {
        let pts = build_polyline(Vec3::ZERO, Vec3::new(100.0, 0.0, 0.0), 0.0, 4, SegmentSpacing::Uniform);
        let h = place(&choice(0.25, 90.0), &pts).unwrap();
        // forward stays on the wire; up swings around it
        assert!((h.transform.rotation * Vec3::X).distance(Vec3::X) < 1e-4);
        assert!((h.transform.rotation * Vec3::Y).distance(Vec3::Z) < 1e-4);
    }

    #[test]
    fn degenerate_wire_gets_nothing() {
        let pts = vec![Vec3::ONE; 5];
        assert!(place(&choice(0.5, 0.0), &pts).is_none());
    }
}
