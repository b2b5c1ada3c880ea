//! Path timelines for Trill Flight
//!
//! Maps beat-relative time onto a polyline by arc length, converts musical
//! keys to heights and lays level events out along the path.

mod beat;
mod height;
mod layout;
mod timeline;
mod vec3;

pub use beat::{BeatClock, InvalidTimeRatio};
pub use height::{HeightMap, HeightMapError};
pub use layout::{
    EventKind, LayoutConfig, LayoutError, LevelEvent, LevelLayout, Placement, PlacementKind,
};
pub use timeline::{ConfigurationError, PathSample, PathTimeline, RegressionPolicy};
pub use vec3::Vec3;
