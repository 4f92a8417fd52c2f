use crate::pose::KeypointKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("expected {0} heatmap channels, got {1}")]
    HeatmapChannels(usize, usize),

    #[error("expected {0} part affinity field channels, got {1}")]
    PafChannels(usize, usize),

    #[error("heatmap spatial dims {0:?} do not match part affinity field dims {1:?}")]
    MismatchedDims((usize, usize), (usize, usize)),

    #[error("heatmaps and part affinity fields must have non-zero height and width")]
    EmptyField,

    #[error("minimum keypoints per pose must be at least 2, got {0}")]
    InvalidMinKeypoints(usize),

    #[error("part affinity fields must be sampled at least twice per limb, got {0}")]
    InvalidPafSamples(usize),

    #[error("maximum tracking distance must be positive and finite, got {0}")]
    InvalidMaxDistance(f32),

    #[error("smoothing factor must be in (0, 1], got {0}")]
    InvalidSmoothingFactor(f32),

    #[error("invalid frame geometry: {0}")]
    InvalidGeometry(&'static str),

    #[error("failed to convert value to f32")]
    ConvertToF32,

    #[error("failed to convert value to usize")]
    ConvertToUSize,

    #[error("failed to construct NotNan from f32: {1}")]
    ConstructNotNan(#[source] ordered_float::FloatIsNan, f32),

    #[error("failed to convert usize value to keypoint kind: {0}")]
    ConvertUSizeToKeypointKind(usize),

    #[error("failed to convert keypoint variant to usize: {0:?}")]
    KeypointVariantToUSize(KeypointKind),

    #[error("candidate id {0} is out of range for a table of {1} candidates")]
    CandidateOutOfRange(usize, usize),
}
