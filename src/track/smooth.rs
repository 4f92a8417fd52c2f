use crate::pose::Keypoints;

/// Exponential smoothing of keypoints present in both sets.
///
/// Each shared keypoint becomes `alpha * current + (1 - alpha) * previous`;
/// keypoints missing from either set are taken from `current` unchanged.
pub fn blend_keypoints(current: &Keypoints, previous: &Keypoints, alpha: f32) -> Keypoints {
    let mut blended = *current;
    for (out, prev) in blended.iter_mut().zip(previous.iter()) {
        if let (Some(cur), Some(prev)) = (out.as_mut(), prev) {
            *cur = cur.blend(*prev, alpha);
        }
    }
    blended
}
