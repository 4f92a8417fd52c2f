use crate::{
    decode::candidate::Candidate,
    error::Error,
    pose::{Limb, NUM_PAF_CHANNELS},
};
use ndarray::ArrayView3;
use num_traits::ToPrimitive;
use ordered_float::NotNan;

/// A scored pairing of two candidates along one limb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    /// Global id of the candidate at the limb's `from` joint.
    pub from: usize,
    /// Global id of the candidate at the limb's `to` joint.
    pub to: usize,
    /// Part affinity of the pair.
    pub score: NotNan<f32>,
    /// Affinity plus both candidate confidences, used to break ties.
    pub combined: NotNan<f32>,
}

impl Connection {
    pub fn new(from: &Candidate, to: &Candidate, score: f32) -> Result<Self, Error> {
        let combined = score + from.confidence + to.confidence;
        Ok(Self {
            from: from.id,
            to: to.id,
            score: NotNan::new(score).map_err(|e| Error::ConstructNotNan(e, score))?,
            combined: NotNan::new(combined).map_err(|e| Error::ConstructNotNan(e, combined))?,
        })
    }
}

/// Scores a candidate pair for a limb.
pub trait LimbScorer {
    /// Affinity of `from` → `to`, or `None` when the pair cannot form `limb`.
    fn score(&self, limb: &Limb, from: &Candidate, to: &Candidate) -> Result<Option<f32>, Error>;
}

/// Scores pairs by integrating the part affinity field along the segment between them.
#[derive(Debug, Clone, Copy)]
pub struct PafScorer<'a> {
    pafs: ArrayView3<'a, f32>,
    samples: usize,
    min_paf_score: f32,
    min_coverage: f32,
    max_limb_length: f32,
}

impl<'a> PafScorer<'a> {
    pub fn new(
        pafs: ArrayView3<'a, f32>,
        samples: usize,
        min_paf_score: f32,
        min_coverage: f32,
        max_limb_fraction: f32,
    ) -> Result<Self, Error> {
        let (height, _, channels) = pafs.dim();
        if channels != NUM_PAF_CHANNELS {
            return Err(Error::PafChannels(NUM_PAF_CHANNELS, channels));
        }
        Ok(Self {
            pafs,
            samples: samples.max(2),
            min_paf_score,
            min_coverage,
            max_limb_length: height.to_f32().ok_or(Error::ConvertToF32)? * max_limb_fraction,
        })
    }

    #[inline]
    fn pixel(value: f32, len: usize) -> Result<usize, Error> {
        let max = len.to_f32().ok_or(Error::ConvertToF32)? - 1.0;
        value
            .round()
            .clamp(0.0, max)
            .to_usize()
            .ok_or(Error::ConvertToUSize)
    }
}

impl LimbScorer for PafScorer<'_> {
    fn score(&self, limb: &Limb, from: &Candidate, to: &Candidate) -> Result<Option<f32>, Error> {
        let (height, width, _) = self.pafs.dim();
        if height == 0 || width == 0 {
            return Ok(None);
        }

        let direction = to.point - from.point;
        let length = direction.norm();
        if length <= f32::EPSILON {
            return Ok(None);
        }
        let unit = direction * length.recip();

        let steps = (self.samples - 1).to_f32().ok_or(Error::ConvertToF32)?;
        let mut passed = 0_usize;
        let mut passed_score = 0.0_f32;
        for i in 0..self.samples {
            let t = i.to_f32().ok_or(Error::ConvertToF32)? / steps;
            let sample = from.point + direction * t;
            let x = Self::pixel(sample.x(), width)?;
            let y = Self::pixel(sample.y(), height)?;
            let dot =
                unit.x() * self.pafs[(y, x, limb.paf_x)] + unit.y() * self.pafs[(y, x, limb.paf_y)];
            if dot > self.min_paf_score {
                passed_score += dot;
                passed += 1;
            }
        }

        let samples = self.samples.to_f32().ok_or(Error::ConvertToF32)?;
        let coverage = passed.to_f32().ok_or(Error::ConvertToF32)? / samples;
        let mut affinity = if passed > 0 {
            passed_score / passed.to_f32().ok_or(Error::ConvertToF32)?
        } else {
            0.0
        };
        // segments longer than the reference length are penalized
        affinity += (self.max_limb_length / length - 1.0).min(0.0);

        Ok(if affinity > 0.0 && coverage > self.min_coverage {
            Some(affinity)
        } else {
            None
        })
    }
}
