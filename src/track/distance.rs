use crate::{error::Error, pose::Skeleton};
use num_traits::ToPrimitive;

/// Dissimilarity between a current skeleton and a tracked one.
pub trait PoseDistance {
    /// Distance between the two skeletons, `None` if they cannot be compared.
    fn distance(&self, current: &Skeleton, tracked: &Skeleton) -> Result<Option<f32>, Error>;
}

/// Mean distance over shared keypoints, divided by the larger bounding box diagonal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedKeypointDistance {
    pub min_common_keypoints: usize,
}

impl PoseDistance for NormalizedKeypointDistance {
    fn distance(&self, current: &Skeleton, tracked: &Skeleton) -> Result<Option<f32>, Error> {
        let (common, total) = current
            .keypoints()
            .iter()
            .zip(tracked.keypoints().iter())
            .filter_map(|(a, b)| Some((*a)?.distance((*b)?)))
            .fold((0_usize, 0.0_f32), |(n, sum), d| (n + 1, sum + d));
        if common == 0 || common < self.min_common_keypoints {
            return Ok(None);
        }

        let scale = current.bbox().diagonal().max(tracked.bbox().diagonal());
        if scale <= f32::EPSILON {
            return Ok(None);
        }
        let mean = total / common.to_f32().ok_or(Error::ConvertToF32)?;
        Ok(Some(mean / scale))
    }
}
