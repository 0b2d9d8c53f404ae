//! Demo scene: rows of rigged poles crossing a chunk border, one pole swaying so the
//! incremental rebuild is visible.

use bevy::prelude::*;
use powerlines::lines::core::MeshRef;
use powerlines::lines::districts::DistrictBinding;
use powerlines::{PowerLine, PowerLinePole};

const POLE_MESH: &str = "powerlines/pole.gltf#Mesh0/Primitive0";
const ROWS: i32 = 3;
const POLES_PER_ROW: i32 = 16;
const SPACING: f32 = 1400.0;

/// First pole of the first row.
#[derive(Component)]
pub struct Swaying {
    pub base: Vec3,
}

pub fn spawn_pole_rows(mut commands: Commands) {
    for row in 0..ROWS {
        let z = row as f32 * 2000.0;
        let district = if row == 0 {
            DistrictBinding::Auto { district_id: Some("Downtown".to_string()) }
        } else {
            DistrictBinding::Auto { district_id: Some("Suburbs".to_string()) }
        };

        // spawn back to front so each pole can target the one after it
        let mut next: Option<Entity> = None;
        for i in (0..POLES_PER_ROW).rev() {
            let pos = Vec3::new(i as f32 * SPACING - 2000.0, 0.0, z);
            let pole = PowerLinePole {
                mesh: Some(MeshRef::new(POLE_MESH)),
                num_wires: 3,
                target_pole: next,
                wire: PowerLine { district: district.clone(), ..default() },
                ..default()
            };
            let mut e = commands.spawn((pole, Transform::from_translation(pos), Name::new(format!("Pole {row}/{i}"))));
            if row == 0 && i == 0 {
                e.insert(Swaying { base: pos });
            }
            next = Some(e.id());
        }
    }
    info!("Demo: spawned {} poles", ROWS * POLES_PER_ROW);
}

pub fn sway_first_pole(time: Res<Time>, mut q: Query<(&mut Transform, &Swaying)>) {
    for (mut tf, sway) in &mut q {
        let t = time.elapsed_secs();
        tf.translation = sway.base + Vec3::new(0.0, 0.0, 300.0 * (t * 0.7).sin());
    }
}
