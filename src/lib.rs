//! Multi-person 2D pose assembly from keypoint heatmaps and part affinity
//! fields, with identity tracking across frames.

pub mod decode;
pub mod engine;
pub mod error;
pub mod frame;
pub mod point;
pub mod pose;
pub mod track;

pub use decode::{Decoder, NetworkOutput, PafDecoder};
pub use engine::{Engine, EngineConfig, Timing};
pub use error::Error;
pub use frame::{FrameGeometry, Padding};
pub use point::Point;
pub use pose::{BoundingBox, KeypointKind, Keypoints, Skeleton};
pub use track::{Tracker, TrackerConfig};
