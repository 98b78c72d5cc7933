pub mod position;

pub use position::{AlertKind, PositionAlert, PositionThresholds, PositionTracker, TrackedPosition};
