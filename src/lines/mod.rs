pub mod core;
pub mod chunk_index;
pub mod curve;
pub mod district;
pub mod districts;
pub mod anchors;
pub mod source;
pub mod hanging;
pub mod pool;
pub mod pole;
pub mod handoff;
pub mod subsystem;
pub mod plugin;
pub mod render;
pub mod visuals;
pub mod stack;

pub use self::core::{ChunkGrid, ChunkKey, LineSegment, MeshRef};
pub use plugin::{PowerLineDistrict, PowerLineSettings, PowerLinesPlugin, WireAnchor};
pub use pole::PowerLinePole;
pub use source::PowerLine;
pub use stack::PowerLinesStackPlugin;
pub use subsystem::PowerLineSubsystem;
