use crate::{point::Point, pose::KeypointKind};
use ordered_float::NotNan;
use std::cmp::Ordering;

/// A heatmap peak before it is given a global id.
///
/// Peaks order by score, then by smaller `x`, then by smaller `y`, so the
/// greatest peak is the one to accept first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Peak {
    pub(crate) x: usize,
    pub(crate) y: usize,
    pub(crate) score: NotNan<f32>,
}

impl Ord for Peak {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .cmp(&other.score)
            .then_with(|| other.x.cmp(&self.x))
            .then_with(|| other.y.cmp(&self.y))
    }
}

impl PartialOrd for Peak {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A detected joint location in heatmap space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub point: Point,
    pub confidence: f32,
    /// Global id, unique across all joint types of a frame.
    pub id: usize,
    pub kind: KeypointKind,
}
