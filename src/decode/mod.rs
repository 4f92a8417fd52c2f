use crate::{
    error::Error,
    pose::{KeypointKind, NUM_HEATMAP_CHANNELS, NUM_KEYPOINTS, NUM_PAF_CHANNELS},
};
use ndarray::{Array3, ArrayView3, Axis};
use num_traits::FromPrimitive;

pub mod candidate;
pub mod extract;
pub mod group;

pub use candidate::Candidate;
pub use extract::ExtractorConfig;
pub use group::{GrouperConfig, PoseEntry};

/// The two tensors a pose network produces for one frame, laid out `(height, width, channel)`.
#[derive(Debug, Clone)]
pub struct NetworkOutput {
    heatmaps: Array3<f32>,
    pafs: Array3<f32>,
}

impl NetworkOutput {
    /// Pair heatmaps with part affinity fields, checking that they share a non-empty grid.
    pub fn new(heatmaps: Array3<f32>, pafs: Array3<f32>) -> Result<Self, Error> {
        let (hm_height, hm_width, _) = heatmaps.dim();
        let (paf_height, paf_width, _) = pafs.dim();
        if (hm_height, hm_width) != (paf_height, paf_width) {
            return Err(Error::MismatchedDims(
                (hm_height, hm_width),
                (paf_height, paf_width),
            ));
        }
        if hm_height == 0 || hm_width == 0 {
            return Err(Error::EmptyField);
        }
        Ok(Self { heatmaps, pafs })
    }

    pub fn heatmaps(&self) -> ArrayView3<f32> {
        self.heatmaps.view()
    }

    pub fn pafs(&self) -> ArrayView3<f32> {
        self.pafs.view()
    }

    /// Height and width of the shared grid.
    pub fn dims(&self) -> (usize, usize) {
        let (height, width, _) = self.heatmaps.dim();
        (height, width)
    }
}

pub trait Decoder {
    /// Number of heatmap channels the decoder expects, background included.
    fn expected_heatmap_channels(&self) -> usize {
        NUM_HEATMAP_CHANNELS
    }

    /// Number of part affinity field channels the decoder expects.
    fn expected_paf_channels(&self) -> usize {
        NUM_PAF_CHANNELS
    }

    /// Find keypoint candidates, one list per joint type, numbered globally.
    fn extract(&self, output: &NetworkOutput) -> Result<Vec<Vec<Candidate>>, Error>;

    /// Assemble candidates into pose entries, returning them with the candidate table.
    fn group(
        &self,
        candidates: &[Vec<Candidate>],
        output: &NetworkOutput,
    ) -> Result<(Vec<PoseEntry>, Vec<Candidate>), Error>;

    /// Validate that the network output has the expected number of channels.
    fn validate_output_channels(&self, output: &NetworkOutput) -> Result<(), Error> {
        let (_, _, heatmap_channels) = output.heatmaps.dim();
        let expected_heatmap_channels = self.expected_heatmap_channels();
        if heatmap_channels != expected_heatmap_channels {
            return Err(Error::HeatmapChannels(
                expected_heatmap_channels,
                heatmap_channels,
            ));
        }
        let (_, _, paf_channels) = output.pafs.dim();
        let expected_paf_channels = self.expected_paf_channels();
        if paf_channels != expected_paf_channels {
            return Err(Error::PafChannels(expected_paf_channels, paf_channels));
        }
        Ok(())
    }
}

/// Peak extraction followed by part-affinity grouping.
#[derive(Debug, Clone, Copy, Default, PartialEq, structopt::StructOpt)]
pub struct PafDecoder {
    #[structopt(flatten)]
    pub extractor: ExtractorConfig,
    #[structopt(flatten)]
    pub grouper: GrouperConfig,
}

impl PafDecoder {
    pub fn new(extractor: ExtractorConfig, grouper: GrouperConfig) -> Result<Self, Error> {
        grouper.validate()?;
        Ok(Self { extractor, grouper })
    }
}

impl Decoder for PafDecoder {
    fn extract(&self, output: &NetworkOutput) -> Result<Vec<Vec<Candidate>>, Error> {
        self.validate_output_channels(output)?;
        let heatmaps = output.heatmaps();
        let find = |channel: usize| {
            extract::find_peaks(heatmaps.index_axis(Axis(2), channel), &self.extractor)
        };

        // peaks are found per channel, possibly in parallel, and numbered afterwards
        // so that ids never depend on scheduling
        #[cfg(feature = "parallel")]
        let peaks = {
            use rayon::prelude::*;
            (0..NUM_KEYPOINTS)
                .into_par_iter()
                .map(find)
                .collect::<Result<Vec<_>, _>>()?
        };
        #[cfg(not(feature = "parallel"))]
        let peaks = (0..NUM_KEYPOINTS)
            .map(find)
            .collect::<Result<Vec<_>, _>>()?;

        let mut total = 0;
        peaks
            .into_iter()
            .enumerate()
            .map(|(channel, peaks)| {
                let kind = KeypointKind::from_usize(channel)
                    .ok_or(Error::ConvertUSizeToKeypointKind(channel))?;
                extract::number_peaks(peaks, kind, &mut total)
            })
            .collect()
    }

    fn group(
        &self,
        candidates: &[Vec<Candidate>],
        output: &NetworkOutput,
    ) -> Result<(Vec<PoseEntry>, Vec<Candidate>), Error> {
        group::group_keypoints(candidates, output.pafs(), &self.grouper)
    }
}
