use crate::{
    decode::{Candidate, Decoder, NetworkOutput, PafDecoder, PoseEntry},
    error::Error,
    frame::FrameGeometry,
    pose::{Keypoints, Skeleton, NUM_KEYPOINTS},
    track::{Tracker, TrackerConfig},
};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default, PartialEq, structopt::StructOpt)]
pub struct EngineConfig {
    #[structopt(flatten)]
    pub decoder: PafDecoder,
    #[structopt(flatten)]
    pub tracker: TrackerConfig,
    /// Assign identities to skeletons across frames.
    #[structopt(long)]
    pub track: bool,
}

/// Cumulative time spent in each stage since the engine was built.
#[derive(Debug, Copy, Clone, Default)]
pub struct Timing {
    pub extraction: Duration,
    pub grouping: Duration,
    pub tracking: Duration,
}

pub struct Engine<D = PafDecoder> {
    decoder: D,
    tracker: Option<Tracker>,
    pub timing: Timing,
    frame_num: usize,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self, Error> {
        let decoder = PafDecoder::new(config.decoder.extractor, config.decoder.grouper)?;
        Self::with_decoder(decoder, config.track.then(|| config.tracker))
    }
}

/// Image-space keypoints of `entry`.
fn entry_keypoints(
    entry: &PoseEntry,
    candidates: &[Candidate],
    geometry: &FrameGeometry,
) -> Result<Keypoints, Error> {
    let mut keypoints: Keypoints = [None; NUM_KEYPOINTS];
    for (keypoint, slot) in keypoints.iter_mut().zip(entry.slots.iter()) {
        if let Some(id) = *slot {
            let candidate = candidates
                .get(id)
                .ok_or(Error::CandidateOutOfRange(id, candidates.len()))?;
            *keypoint = Some(geometry.to_image(candidate.point)?);
        }
    }
    Ok(keypoints)
}

impl<D> Engine<D>
where
    D: Decoder,
{
    /// Build an engine around `decoder`, tracking identities when `tracker` is given.
    pub fn with_decoder(decoder: D, tracker: Option<TrackerConfig>) -> Result<Self, Error> {
        Ok(Self {
            decoder,
            tracker: tracker.map(Tracker::new).transpose()?,
            timing: Default::default(),
            frame_num: 0,
        })
    }

    /// Number of frames processed so far.
    pub fn frame_num(&self) -> usize {
        self.frame_num
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// Decode the skeletons of one frame, in image coordinates.
    pub fn detect_poses(
        &mut self,
        output: &NetworkOutput,
        geometry: &FrameGeometry,
    ) -> Result<Vec<Skeleton>, Error> {
        self.decoder.validate_output_channels(output)?;

        let start_extraction = Instant::now();
        let candidates = self.decoder.extract(output)?;
        self.timing.extraction += start_extraction.elapsed();

        let start_grouping = Instant::now();
        let (entries, table) = self.decoder.group(&candidates, output)?;
        let mut skeletons = Vec::with_capacity(entries.len());
        for entry in &entries {
            let keypoints = entry_keypoints(entry, &table, geometry)?;
            if let Some(skeleton) = Skeleton::new(keypoints, entry.score) {
                skeletons.push(skeleton);
            }
        }
        self.timing.grouping += start_grouping.elapsed();

        if skeletons.is_empty() {
            debug!(
                message = "no poses in frame",
                frame = self.frame_num,
                candidates = table.len()
            );
        }

        let skeletons = match self.tracker.as_mut() {
            Some(tracker) => {
                let start_tracking = Instant::now();
                let tracked = tracker.update(skeletons)?;
                self.timing.tracking += start_tracking.elapsed();
                tracked
            }
            None => skeletons,
        };

        self.frame_num += 1;
        Ok(skeletons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        decode::group::Slots,
        frame::Padding,
        point::Point,
        pose::{KeypointKind, NUM_HEATMAP_CHANNELS, NUM_PAF_CHANNELS},
    };
    use assert_approx_eq::assert_approx_eq;
    use ndarray::Array3;

    /// Reports a fixed set of candidates and entries regardless of the network output.
    struct FixedDecoder {
        candidates: Vec<Candidate>,
        entries: Vec<PoseEntry>,
    }

    impl Decoder for FixedDecoder {
        fn extract(&self, _output: &NetworkOutput) -> Result<Vec<Vec<Candidate>>, Error> {
            Ok(vec![self.candidates.clone()])
        }

        fn group(
            &self,
            _candidates: &[Vec<Candidate>],
            _output: &NetworkOutput,
        ) -> Result<(Vec<PoseEntry>, Vec<Candidate>), Error> {
            Ok((self.entries.clone(), self.candidates.clone()))
        }
    }

    fn candidate(id: usize, kind: KeypointKind, x: f32, y: f32) -> Candidate {
        Candidate {
            point: Point::new(x, y).unwrap(),
            confidence: 1.0,
            id,
            kind,
        }
    }

    fn entry(ids: &[(KeypointKind, usize)], score: f32) -> PoseEntry {
        let mut slots: Slots = [None; NUM_KEYPOINTS];
        for &(kind, id) in ids {
            slots[kind.idx().unwrap()] = Some(id);
        }
        PoseEntry { slots, score }
    }

    fn blank_output() -> NetworkOutput {
        NetworkOutput::new(
            Array3::zeros((8, 8, NUM_HEATMAP_CHANNELS)),
            Array3::zeros((8, 8, NUM_PAF_CHANNELS)),
        )
        .unwrap()
    }

    fn fixed_decoder() -> FixedDecoder {
        use KeypointKind::*;
        FixedDecoder {
            candidates: vec![
                candidate(0, Neck, 10.0, 10.0),
                candidate(1, RightShoulder, 6.0, 12.0),
                candidate(2, RightElbow, 4.0, 20.0),
            ],
            entries: vec![entry(
                &[(Neck, 0), (RightShoulder, 1), (RightElbow, 2)],
                4.5,
            )],
        }
    }

    #[test]
    fn entries_are_rescaled_to_image_space() {
        let geometry = FrameGeometry::new(
            0.5,
            Padding {
                left: 2.0,
                top: 4.0,
                ..Default::default()
            },
            8,
            4,
        )
        .unwrap();
        let mut engine = Engine::with_decoder(fixed_decoder(), None).unwrap();
        let skeletons = engine.detect_poses(&blank_output(), &geometry).unwrap();
        assert_eq!(skeletons.len(), 1);

        let neck = skeletons[0].keypoint(KeypointKind::Neck).unwrap().unwrap();
        // (10 * 8 / 4 - 2) / 0.5, (10 * 8 / 4 - 4) / 0.5
        assert_approx_eq!(neck.x(), 36.0);
        assert_approx_eq!(neck.y(), 32.0);
        assert_approx_eq!(skeletons[0].confidence(), 4.5);
        assert_eq!(skeletons[0].num_present(), 3);
        assert_eq!(skeletons[0].id(), None);
        assert_eq!(engine.frame_num(), 1);
    }

    #[test]
    fn tracking_assigns_stable_ids() {
        let geometry = FrameGeometry::for_frame(64, 64, 64, 8, 4).unwrap();
        let mut engine =
            Engine::with_decoder(fixed_decoder(), Some(TrackerConfig::default())).unwrap();
        for _ in 0..3 {
            let skeletons = engine.detect_poses(&blank_output(), &geometry).unwrap();
            assert_eq!(skeletons.len(), 1);
            assert_eq!(skeletons[0].id(), Some(0));
        }
        assert_eq!(engine.frame_num(), 3);
    }

    #[test]
    fn wrong_channel_counts_fail_before_decoding() {
        let geometry = FrameGeometry::for_frame(64, 64, 64, 8, 4).unwrap();
        let output = NetworkOutput::new(
            Array3::zeros((8, 8, NUM_HEATMAP_CHANNELS)),
            Array3::zeros((8, 8, 2)),
        )
        .unwrap();
        let mut engine = Engine::with_decoder(fixed_decoder(), None).unwrap();
        assert!(matches!(
            engine.detect_poses(&output, &geometry),
            Err(Error::PafChannels(38, 2))
        ));
        assert_eq!(engine.frame_num(), 0);
    }

    #[test]
    fn blank_frames_are_empty_not_errors() {
        let geometry = FrameGeometry::for_frame(64, 64, 64, 8, 4).unwrap();
        let config = EngineConfig {
            track: true,
            ..Default::default()
        };
        let mut engine = Engine::new(config).unwrap();
        assert!(engine
            .detect_poses(&blank_output(), &geometry)
            .unwrap()
            .is_empty());
        assert_eq!(engine.frame_num(), 1);
    }

    #[test]
    fn invalid_configs_are_rejected() {
        let mut config = EngineConfig::default();
        config.decoder.grouper.min_keypoints = 1;
        assert!(matches!(
            Engine::new(config),
            Err(Error::InvalidMinKeypoints(1))
        ));

        let mut config = EngineConfig {
            track: true,
            ..Default::default()
        };
        config.tracker.smoothing_factor = 2.0;
        assert!(Engine::new(config).is_err());
    }
}
