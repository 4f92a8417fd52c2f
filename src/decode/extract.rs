use crate::{
    decode::candidate::{Candidate, Peak},
    error::Error,
    point::Point,
    pose::KeypointKind,
};
use ndarray::{Array2, ArrayView2};
use num_traits::ToPrimitive;
use ordered_float::NotNan;
use std::collections::BinaryHeap;

const DEFAULT_THRESHOLD: &str = "0.1";
const DEFAULT_NMS_RADIUS: &str = "6";
const DEFAULT_BLUR_SIGMA: &str = "1.0";

#[derive(Debug, Clone, Copy, PartialEq, structopt::StructOpt)]
pub struct ExtractorConfig {
    /// Minimum smoothed heatmap value of a keypoint peak.
    #[structopt(long = "heatmap-threshold", default_value = DEFAULT_THRESHOLD)]
    pub threshold: f32,
    /// Peaks closer than this many heatmap pixels to a stronger peak are dropped.
    #[structopt(long, default_value = DEFAULT_NMS_RADIUS)]
    pub nms_radius: f32,
    /// Gaussian blur sigma applied before peak finding, 0 disables the blur.
    #[structopt(long, default_value = DEFAULT_BLUR_SIGMA)]
    pub blur_sigma: f32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD.parse().unwrap(),
            nms_radius: DEFAULT_NMS_RADIUS.parse().unwrap(),
            blur_sigma: DEFAULT_BLUR_SIGMA.parse().unwrap(),
        }
    }
}

fn gaussian_kernel(sigma: f32) -> Result<Vec<f32>, Error> {
    let radius = (2.0 * sigma).ceil().to_usize().ok_or(Error::ConvertToUSize)?;
    let denominator = 2.0 * sigma * sigma;
    let mut kernel = (0..=2 * radius)
        .map(|i| {
            let offset = i.to_f32().ok_or(Error::ConvertToF32)?
                - radius.to_f32().ok_or(Error::ConvertToF32)?;
            Ok((-offset * offset / denominator).exp())
        })
        .collect::<Result<Vec<f32>, Error>>()?;
    let total = kernel.iter().sum::<f32>();
    kernel.iter_mut().for_each(|w| *w /= total);
    Ok(kernel)
}

/// Separable Gaussian blur with replicated borders.
fn gaussian_blur(heatmap: ArrayView2<f32>, sigma: f32) -> Result<Array2<f32>, Error> {
    if sigma <= 0.0 {
        return Ok(heatmap.to_owned());
    }
    let kernel = gaussian_kernel(sigma)?;
    let radius = kernel.len() / 2;
    let (height, width) = heatmap.dim();

    let mut horizontal = Array2::<f32>::zeros((height, width));
    for ((y, x), dst) in horizontal.indexed_iter_mut() {
        *dst = kernel
            .iter()
            .enumerate()
            .map(|(k, &w)| w * heatmap[(y, (x + k).saturating_sub(radius).min(width - 1))])
            .sum();
    }

    let mut blurred = Array2::<f32>::zeros((height, width));
    for ((y, x), dst) in blurred.indexed_iter_mut() {
        *dst = kernel
            .iter()
            .enumerate()
            .map(|(k, &w)| w * horizontal[((y + k).saturating_sub(radius).min(height - 1), x)])
            .sum();
    }
    Ok(blurred)
}

/// Whether `value` is strictly greater than its 4-connected neighbours; outside the field counts as zero.
fn is_local_maximum(field: &Array2<f32>, y: usize, x: usize, value: f32) -> bool {
    let (height, width) = field.dim();
    let left = if x > 0 { field[(y, x - 1)] } else { 0.0 };
    let right = if x + 1 < width { field[(y, x + 1)] } else { 0.0 };
    let up = if y > 0 { field[(y - 1, x)] } else { 0.0 };
    let down = if y + 1 < height { field[(y + 1, x)] } else { 0.0 };
    value > left && value > right && value > up && value > down
}

/// Queue of heatmap peaks, strongest first.
pub(crate) struct PeakQueue(BinaryHeap<Peak>);

impl PeakQueue {
    pub(crate) fn new() -> Self {
        Self(Default::default())
    }

    pub(crate) fn push(&mut self, peak: Peak) {
        self.0.push(peak);
    }

    pub(crate) fn pop(&mut self) -> Option<Peak> {
        self.0.pop()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.0.len()
    }

    /// Push every thresholded local maximum of `heatmap`.
    pub(crate) fn build_peaks(
        &mut self,
        heatmap: ArrayView2<f32>,
        config: &ExtractorConfig,
    ) -> Result<(), Error> {
        // non-finite activations never produce a peak
        let raw = heatmap.mapv(|v| if v.is_finite() { v } else { 0.0 });
        let blurred = gaussian_blur(raw.view(), config.blur_sigma)?;

        for ((y, x), &value) in blurred.indexed_iter() {
            if value > config.threshold && is_local_maximum(&blurred, y, x, value) {
                let score = raw[(y, x)];
                self.push(Peak {
                    x,
                    y,
                    score: NotNan::new(score).map_err(|e| Error::ConstructNotNan(e, score))?,
                });
            }
        }
        Ok(())
    }
}

fn peak_point(peak: &Peak) -> Result<Point, Error> {
    Point::new(
        peak.x.to_f32().ok_or(Error::ConvertToF32)?,
        peak.y.to_f32().ok_or(Error::ConvertToF32)?,
    )
}

/// Local maxima of one heatmap channel, strongest first, with nearby weaker peaks suppressed.
pub(crate) fn find_peaks(
    heatmap: ArrayView2<f32>,
    config: &ExtractorConfig,
) -> Result<Vec<Peak>, Error> {
    if heatmap.is_empty() {
        return Ok(Vec::new());
    }

    let mut queue = PeakQueue::new();
    queue.build_peaks(heatmap, config)?;

    let squared_nms_radius = config.nms_radius * config.nms_radius;
    let mut accepted: Vec<(Peak, Point)> = Vec::new();
    while let Some(peak) = queue.pop() {
        let point = peak_point(&peak)?;
        if accepted
            .iter()
            .all(|&(_, other)| point.squared_distance(other) >= squared_nms_radius)
        {
            accepted.push((peak, point));
        }
    }
    Ok(accepted.into_iter().map(|(peak, _)| peak).collect())
}

/// Give `peaks` consecutive global ids starting at `*total`, advancing `total`.
pub(crate) fn number_peaks(
    peaks: Vec<Peak>,
    kind: KeypointKind,
    total: &mut usize,
) -> Result<Vec<Candidate>, Error> {
    peaks
        .into_iter()
        .map(|peak| {
            let candidate = Candidate {
                point: peak_point(&peak)?,
                confidence: peak.score.into_inner(),
                id: *total,
                kind,
            };
            *total += 1;
            Ok(candidate)
        })
        .collect()
}

/// Candidates of one joint channel; `total` is the running global id counter.
pub fn extract_keypoints(
    heatmap: ArrayView2<f32>,
    kind: KeypointKind,
    config: &ExtractorConfig,
    total: &mut usize,
) -> Result<Vec<Candidate>, Error> {
    number_peaks(find_peaks(heatmap, config)?, kind, total)
}
