//! Chunk-batched procedural power lines and poles for Bevy worlds.

pub mod lines;

pub use lines::{
    PowerLine, PowerLineDistrict, PowerLinePole, PowerLineSettings, PowerLineSubsystem, PowerLinesPlugin,
    PowerLinesStackPlugin, WireAnchor,
};
