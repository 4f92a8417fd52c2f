//! Identity tracking of skeletons across frames.

use crate::{error::Error, pose::Skeleton};
use bitvec::bitvec;
use ordered_float::NotNan;
use std::cmp::Reverse;
use tracing::{debug, trace, warn};

pub use distance::{NormalizedKeypointDistance, PoseDistance};
pub use smooth::blend_keypoints;

mod distance;
mod smooth;

const DEFAULT_MAX_DISTANCE: &str = "0.5";
const DEFAULT_MIN_COMMON_KEYPOINTS: &str = "3";
const DEFAULT_MAX_MISSED_FRAMES: &str = "5";
const DEFAULT_SMOOTHING_FACTOR: &str = "0.8";
const DEFAULT_HISTORY_LEN: &str = "8";

#[derive(Debug, Clone, Copy, PartialEq, structopt::StructOpt)]
pub struct TrackerConfig {
    /// Largest normalized keypoint distance at which two skeletons are the same person.
    #[structopt(long, default_value = DEFAULT_MAX_DISTANCE)]
    pub max_distance: f32,
    /// Keypoints two skeletons must share to be compared at all.
    #[structopt(long, default_value = DEFAULT_MIN_COMMON_KEYPOINTS)]
    pub min_common_keypoints: usize,
    /// Frames an unmatched identity is kept before it expires.
    #[structopt(long, default_value = DEFAULT_MAX_MISSED_FRAMES)]
    pub max_missed_frames: usize,
    /// Smooth keypoints of matched skeletons over time.
    #[structopt(long)]
    pub smooth: bool,
    /// Weight of the current keypoints when smoothing.
    #[structopt(long, default_value = DEFAULT_SMOOTHING_FACTOR)]
    pub smoothing_factor: f32,
    /// Number of keypoint sets kept per identity.
    #[structopt(long, default_value = DEFAULT_HISTORY_LEN)]
    pub history_len: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_distance: DEFAULT_MAX_DISTANCE.parse().unwrap(),
            min_common_keypoints: DEFAULT_MIN_COMMON_KEYPOINTS.parse().unwrap(),
            max_missed_frames: DEFAULT_MAX_MISSED_FRAMES.parse().unwrap(),
            smooth: false,
            smoothing_factor: DEFAULT_SMOOTHING_FACTOR.parse().unwrap(),
            history_len: DEFAULT_HISTORY_LEN.parse().unwrap(),
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.max_distance.is_finite() && self.max_distance > 0.0) {
            return Err(Error::InvalidMaxDistance(self.max_distance));
        }
        if !(self.smoothing_factor > 0.0 && self.smoothing_factor <= 1.0) {
            return Err(Error::InvalidSmoothingFactor(self.smoothing_factor));
        }
        Ok(())
    }
}

/// A retained identity: the last skeleton seen for it and how many frames it has gone unmatched.
#[derive(Debug, Clone)]
struct Track {
    skeleton: Skeleton,
    missed: usize,
}

/// Assigns stable identities to skeletons across frames.
#[derive(Debug)]
pub struct Tracker<M = NormalizedKeypointDistance> {
    config: TrackerConfig,
    metric: M,
    tracks: Vec<Track>,
    next_id: u64,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Result<Self, Error> {
        let metric = NormalizedKeypointDistance {
            min_common_keypoints: config.min_common_keypoints,
        };
        Self::with_metric(config, metric)
    }
}

impl<M> Tracker<M>
where
    M: PoseDistance,
{
    pub fn with_metric(config: TrackerConfig, metric: M) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            metric,
            tracks: Vec::new(),
            next_id: 0,
        })
    }

    /// Number of identities currently retained, matched or not.
    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    fn drop_corrupted(&mut self) {
        self.tracks.retain(|track| {
            if track.skeleton.history().is_empty() {
                warn!(
                    message = "dropping identity with empty history",
                    id = ?track.skeleton.id()
                );
                false
            } else {
                true
            }
        });
    }

    /// Greedily pair current skeletons with retained identities.
    ///
    /// Returns, per current skeleton, the index of its matched track.
    fn match_tracks(&self, current: &[Skeleton]) -> Result<Vec<Option<usize>>, Error> {
        let mut pairs = Vec::new();
        for (ci, skeleton) in current.iter().enumerate() {
            for (ti, track) in self.tracks.iter().enumerate() {
                if let Some(distance) = self.metric.distance(skeleton, &track.skeleton)? {
                    if distance < self.config.max_distance {
                        let confidence = skeleton.confidence();
                        pairs.push((
                            NotNan::new(distance).map_err(|e| Error::ConstructNotNan(e, distance))?,
                            Reverse(
                                NotNan::new(confidence)
                                    .map_err(|e| Error::ConstructNotNan(e, confidence))?,
                            ),
                            ci,
                            ti,
                        ));
                    }
                }
            }
        }
        pairs.sort();

        let mut claimed_current = bitvec![0; current.len()];
        let mut claimed_tracks = bitvec![0; self.tracks.len()];
        let mut matches = vec![None; current.len()];
        for (_, _, ci, ti) in pairs {
            if !claimed_current[ci] && !claimed_tracks[ti] {
                claimed_current.set(ci, true);
                claimed_tracks.set(ti, true);
                matches[ci] = Some(ti);
            }
        }
        Ok(matches)
    }

    /// Assign identities to `current`, returning the skeletons in input order.
    pub fn update(&mut self, current: Vec<Skeleton>) -> Result<Vec<Skeleton>, Error> {
        self.drop_corrupted();
        let matches = self.match_tracks(&current)?;

        let history_len = self.config.history_len;
        let mut matched = bitvec![0; self.tracks.len()];
        let mut fresh = Vec::new();
        let mut output = Vec::with_capacity(current.len());

        for (mut skeleton, matched_track) in current.into_iter().zip(matches) {
            match matched_track {
                Some(ti) => {
                    let track = &mut self.tracks[ti];
                    let previous = &track.skeleton;
                    if self.config.smooth {
                        let smoothed = blend_keypoints(
                            skeleton.keypoints(),
                            previous.keypoints(),
                            self.config.smoothing_factor,
                        );
                        skeleton.set_keypoints(smoothed);
                    }
                    skeleton.id = previous.id;
                    skeleton.inherit_history(previous.history(), history_len);
                    track.skeleton = skeleton.clone();
                    track.missed = 0;
                    matched.set(ti, true);
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    skeleton.id = Some(id);
                    debug!(message = "new identity", id);
                    fresh.push(Track {
                        skeleton: skeleton.clone(),
                        missed: 0,
                    });
                }
            }
            output.push(skeleton);
        }

        let max_missed_frames = self.config.max_missed_frames;
        let mut index = 0;
        self.tracks.retain_mut(|track| {
            let was_matched = matched[index];
            index += 1;
            if !was_matched {
                track.missed += 1;
            }
            track.missed <= max_missed_frames
        });
        self.tracks.extend(fresh);
        trace!(tracks = self.tracks.len(), skeletons = output.len());
        Ok(output)
    }
}
