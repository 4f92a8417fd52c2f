use crate::{error::Error, point::Point};
use num_traits::ToPrimitive;
use std::collections::VecDeque;

#[derive(Debug, Copy, Clone, PartialEq, Eq, num_derive::FromPrimitive, num_derive::ToPrimitive)]
pub enum KeypointKind {
    Nose,
    Neck,
    RightShoulder,
    RightElbow,
    RightWrist,
    LeftShoulder,
    LeftElbow,
    LeftWrist,
    RightHip,
    RightKnee,
    RightAnkle,
    LeftHip,
    LeftKnee,
    LeftAnkle,
    RightEye,
    LeftEye,
    RightEar,
    LeftEar,
}

impl KeypointKind {
    pub fn idx(self) -> Result<usize, Error> {
        self.to_usize().ok_or(Error::KeypointVariantToUSize(self))
    }
}

/// Number of body joint types; the heatmap carries one extra background channel.
pub const NUM_KEYPOINTS: usize = 18;
pub const NUM_HEATMAP_CHANNELS: usize = NUM_KEYPOINTS + 1;
pub const NUM_LIMBS: usize = constants::LIMBS.len();
pub const NUM_PAF_CHANNELS: usize = 2 * NUM_LIMBS;

/// Fraction of the keypoint extent added on every side of a bounding box.
pub const BBOX_MARGIN: f32 = 0.05;

pub type Keypoints = [Option<Point>; NUM_KEYPOINTS];

/// A limb connecting two joint types, scored through a pair of PAF channels.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Limb {
    pub from: KeypointKind,
    pub to: KeypointKind,
    pub paf_x: usize,
    pub paf_y: usize,
    /// Auxiliary limbs only complete poses started by other limbs.
    pub auxiliary: bool,
}

pub mod constants {
    use super::{
        KeypointKind::{self, *},
        Limb,
    };

    const fn limb(from: KeypointKind, to: KeypointKind, paf_x: usize, paf_y: usize) -> Limb {
        Limb {
            from,
            to,
            paf_x,
            paf_y,
            auxiliary: false,
        }
    }

    const fn auxiliary(from: KeypointKind, to: KeypointKind, paf_x: usize, paf_y: usize) -> Limb {
        Limb {
            from,
            to,
            paf_x,
            paf_y,
            auxiliary: true,
        }
    }

    // trunk first, then arms and legs, then the head
    pub const LIMBS: [Limb; 19] = [
        limb(Neck, RightShoulder, 12, 13),
        limb(Neck, LeftShoulder, 20, 21),
        limb(RightShoulder, RightElbow, 14, 15),
        limb(RightElbow, RightWrist, 16, 17),
        limb(LeftShoulder, LeftElbow, 22, 23),
        limb(LeftElbow, LeftWrist, 24, 25),
        limb(Neck, RightHip, 0, 1),
        limb(RightHip, RightKnee, 2, 3),
        limb(RightKnee, RightAnkle, 4, 5),
        limb(Neck, LeftHip, 6, 7),
        limb(LeftHip, LeftKnee, 8, 9),
        limb(LeftKnee, LeftAnkle, 10, 11),
        limb(Neck, Nose, 28, 29),
        limb(Nose, RightEye, 30, 31),
        limb(RightEye, RightEar, 34, 35),
        limb(Nose, LeftEye, 32, 33),
        limb(LeftEye, LeftEar, 36, 37),
        auxiliary(RightShoulder, RightEar, 18, 19),
        auxiliary(LeftShoulder, LeftEar, 26, 27),
    ];
}

/// Axis-aligned box in image space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Bounds of the present keypoints padded by `margin` of the extent.
    ///
    /// Returns `None` when fewer than two keypoints are present.
    pub fn from_keypoints(keypoints: &Keypoints, margin: f32) -> Option<Self> {
        let mut present = keypoints.iter().flatten();
        let first = present.next()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x(), first.y(), first.x(), first.y());
        let mut count = 1;
        for point in present {
            min_x = min_x.min(point.x());
            min_y = min_y.min(point.y());
            max_x = max_x.max(point.x());
            max_y = max_y.max(point.y());
            count += 1;
        }
        if count < 2 {
            return None;
        }
        let pad_x = (max_x - min_x) * margin;
        let pad_y = (max_y - min_y) * margin;
        Some(Self {
            x: min_x - pad_x,
            y: min_y - pad_y,
            width: max_x - min_x + 2.0 * pad_x,
            height: max_y - min_y + 2.0 * pad_y,
        })
    }

    pub fn diagonal(&self) -> f32 {
        self.width.hypot(self.height)
    }
}

/// A finalized person: image-space keypoints plus tracking state.
#[derive(Debug, Clone)]
pub struct Skeleton {
    pub(crate) keypoints: Keypoints,
    pub(crate) bbox: BoundingBox,
    pub(crate) confidence: f32,
    pub(crate) id: Option<u64>,
    pub(crate) history: VecDeque<Keypoints>,
}

impl Skeleton {
    /// Build a skeleton, or `None` if it has fewer than two present keypoints.
    pub fn new(keypoints: Keypoints, confidence: f32) -> Option<Self> {
        let bbox = BoundingBox::from_keypoints(&keypoints, BBOX_MARGIN)?;
        let mut history = VecDeque::with_capacity(1);
        history.push_back(keypoints);
        Some(Self {
            keypoints,
            bbox,
            confidence,
            id: None,
            history,
        })
    }

    pub fn keypoints(&self) -> &Keypoints {
        &self.keypoints
    }

    pub fn keypoint(&self, kind: KeypointKind) -> Result<Option<Point>, Error> {
        Ok(self.keypoints[kind.idx()?])
    }

    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Identity assigned by the tracker, `None` until tracked.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// Recent keypoint sets, oldest first; the last entry is the current one.
    pub fn history(&self) -> &VecDeque<Keypoints> {
        &self.history
    }

    pub fn num_present(&self) -> usize {
        self.keypoints.iter().flatten().count()
    }

    /// Replace the keypoints, keeping the bounding box and the newest history entry in sync.
    pub(crate) fn set_keypoints(&mut self, keypoints: Keypoints) {
        self.keypoints = keypoints;
        if let Some(bbox) = BoundingBox::from_keypoints(&keypoints, BBOX_MARGIN) {
            self.bbox = bbox;
        }
        match self.history.back_mut() {
            Some(newest) => *newest = keypoints,
            None => self.history.push_back(keypoints),
        }
    }

    /// Prepend `previous` history to this skeleton's own, keeping at most `limit` sets.
    pub(crate) fn inherit_history(&mut self, previous: &VecDeque<Keypoints>, limit: usize) {
        let mut history = previous.clone();
        history.extend(self.history.drain(..));
        while history.len() > limit.max(1) {
            history.pop_front();
        }
        self.history = history;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use num_traits::FromPrimitive;

    fn point(x: f32, y: f32) -> Option<Point> {
        Some(Point::new(x, y).unwrap())
    }

    mod keypoint_kind_tests {
        use super::*;

        #[test]
        fn round_trips_every_index() {
            for i in 0..NUM_KEYPOINTS {
                let kind = KeypointKind::from_usize(i).unwrap();
                assert_eq!(kind.idx().unwrap(), i);
            }
            assert!(KeypointKind::from_usize(NUM_KEYPOINTS).is_none());
        }

        #[test]
        fn channel_counts() {
            assert_eq!(NUM_HEATMAP_CHANNELS, 19);
            assert_eq!(NUM_LIMBS, 19);
            assert_eq!(NUM_PAF_CHANNELS, 38);
        }

        #[test]
        fn limbs_cover_every_paf_channel_once() {
            let mut seen = [false; NUM_PAF_CHANNELS];
            for limb in constants::LIMBS.iter() {
                for channel in [limb.paf_x, limb.paf_y] {
                    assert!(!seen[channel], "channel {} used twice", channel);
                    seen[channel] = true;
                }
            }
            assert!(seen.iter().all(|&s| s));
        }
    }

    mod bounding_box_tests {
        use super::*;

        #[test]
        fn skips_absent_keypoints() {
            let mut keypoints: Keypoints = [None; NUM_KEYPOINTS];
            keypoints[0] = point(10.0, 20.0);
            keypoints[5] = point(30.0, 60.0);
            let bbox = BoundingBox::from_keypoints(&keypoints, 0.0).unwrap();
            assert_approx_eq!(bbox.x, 10.0);
            assert_approx_eq!(bbox.y, 20.0);
            assert_approx_eq!(bbox.width, 20.0);
            assert_approx_eq!(bbox.height, 40.0);
        }

        #[test]
        fn margin_pads_every_side() {
            let mut keypoints: Keypoints = [None; NUM_KEYPOINTS];
            keypoints[1] = point(0.0, 0.0);
            keypoints[2] = point(100.0, 200.0);
            let bbox = BoundingBox::from_keypoints(&keypoints, 0.1).unwrap();
            assert_approx_eq!(bbox.x, -10.0);
            assert_approx_eq!(bbox.y, -20.0);
            assert_approx_eq!(bbox.width, 120.0);
            assert_approx_eq!(bbox.height, 240.0);
        }

        #[test]
        fn single_keypoint_is_degenerate() {
            let mut keypoints: Keypoints = [None; NUM_KEYPOINTS];
            keypoints[3] = point(5.0, 5.0);
            assert!(BoundingBox::from_keypoints(&keypoints, BBOX_MARGIN).is_none());
            assert!(Skeleton::new(keypoints, 1.0).is_none());
        }
    }

    mod skeleton_tests {
        use super::*;

        #[test]
        fn new_skeleton_is_untracked_with_own_history() {
            let mut keypoints: Keypoints = [None; NUM_KEYPOINTS];
            keypoints[1] = point(1.0, 1.0);
            keypoints[2] = point(3.0, 4.0);
            let skeleton = Skeleton::new(keypoints, 2.5).unwrap();
            assert_eq!(skeleton.id(), None);
            assert_eq!(skeleton.num_present(), 2);
            assert_eq!(skeleton.history().len(), 1);
            assert_eq!(skeleton.history()[0], keypoints);
            assert_eq!(
                skeleton.keypoint(KeypointKind::RightShoulder).unwrap(),
                point(3.0, 4.0)
            );
        }

        #[test]
        fn inherited_history_is_bounded() {
            let mut keypoints: Keypoints = [None; NUM_KEYPOINTS];
            keypoints[1] = point(0.0, 0.0);
            keypoints[2] = point(1.0, 1.0);
            let mut older = Skeleton::new(keypoints, 1.0).unwrap();
            for _ in 0..4 {
                let next = Skeleton::new(keypoints, 1.0).unwrap();
                let history = older.history.clone();
                older = next;
                older.inherit_history(&history, 3);
            }
            assert_eq!(older.history().len(), 3);
        }
    }
}
