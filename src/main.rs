use bevy::prelude::*;

mod demo;
mod input;
mod setup;

use input::camera_controller;
use powerlines::{PowerLineSettings, PowerLinesStackPlugin};

fn main() {
    App::new()
        // core engine plugins
        .add_plugins(DefaultPlugins)
        // settings must exist before the stack reads them
        .insert_resource(PowerLineSettings {
            debug_draw: true,
            ..Default::default()
        })
        .add_plugins(PowerLinesStackPlugin)
        // camera, light, ground
        .add_systems(Startup, setup::setup)
        // a few rows of rigged poles
        .add_systems(Startup, demo::spawn_pole_rows)
        .add_systems(Update, (camera_controller, demo::sway_first_pole))
        .run();
}
