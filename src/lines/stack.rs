// src/lines/stack.rs
use bevy::prelude::*;
use crate::lines::districts::DistrictSetAssetPlugin;
use crate::lines::plugin::PowerLinesPlugin;
use crate::lines::render::PowerLineRenderPlugin;
use crate::lines::visuals::PowerLineVisualsPlugin;

/// Everything a rendered game needs. Headless hosts add `PowerLinesPlugin` alone.
pub struct PowerLinesStackPlugin;
impl Plugin for PowerLinesStackPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(PowerLinesPlugin)          // subsystem + sync + rebuild
           .add_plugins(DistrictSetAssetPlugin)    // .districts.ron -> district entities
           .add_plugins(PowerLineRenderPlugin)     // handoff snapshots -> vertex data
           .add_plugins(PowerLineVisualsPlugin);   // meshes, pole batches, hanging props
    }
}
