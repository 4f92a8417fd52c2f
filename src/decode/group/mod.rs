//! Limb grouping: turns per-joint candidates into whole-body pose entries.
//!
//! Limbs are processed in the fixed order of [`constants::LIMBS`]. For each
//! limb every candidate pair is scored, the pairs are committed best-first
//! without reusing a candidate, and each committed connection is merged into
//! the entries built so far.

use crate::{
    decode::candidate::Candidate,
    error::Error,
    pose::{constants, Limb},
};
use ndarray::ArrayView3;
use tracing::trace;

pub use assign::{ConnectionAssigner, GreedyAssigner};
pub use entries::{PoseEntry, Slots};
pub use score::{Connection, LimbScorer, PafScorer};

mod assign;
mod entries;
mod score;

use entries::{MergeOutcome, PoseEntries};

const DEFAULT_PAF_SAMPLES: &str = "10";
const DEFAULT_MIN_PAF_SCORE: &str = "0.05";
const DEFAULT_MIN_COVERAGE: &str = "0.8";
const DEFAULT_MAX_LIMB_FRACTION: &str = "0.5";
const DEFAULT_MIN_KEYPOINTS: &str = "3";
const DEFAULT_MIN_MEAN_SCORE: &str = "0.2";

#[derive(Debug, Clone, Copy, PartialEq, structopt::StructOpt)]
pub struct GrouperConfig {
    /// Points sampled along a candidate limb when integrating the affinity field.
    #[structopt(long, default_value = DEFAULT_PAF_SAMPLES)]
    pub paf_samples: usize,
    /// Minimum alignment of a sampled affinity vector with the limb direction.
    #[structopt(long, default_value = DEFAULT_MIN_PAF_SCORE)]
    pub min_paf_score: f32,
    /// Fraction of samples that must be aligned for a limb to be kept.
    #[structopt(long, default_value = DEFAULT_MIN_COVERAGE)]
    pub min_coverage: f32,
    /// Limbs longer than this fraction of the field height are penalized.
    #[structopt(long, default_value = DEFAULT_MAX_LIMB_FRACTION)]
    pub max_limb_fraction: f32,
    /// Minimum number of joints of a pose.
    #[structopt(long, default_value = DEFAULT_MIN_KEYPOINTS)]
    pub min_keypoints: usize,
    /// Minimum pose score per joint.
    #[structopt(long, default_value = DEFAULT_MIN_MEAN_SCORE)]
    pub min_mean_score: f32,
}

impl Default for GrouperConfig {
    fn default() -> Self {
        Self {
            paf_samples: DEFAULT_PAF_SAMPLES.parse().unwrap(),
            min_paf_score: DEFAULT_MIN_PAF_SCORE.parse().unwrap(),
            min_coverage: DEFAULT_MIN_COVERAGE.parse().unwrap(),
            max_limb_fraction: DEFAULT_MAX_LIMB_FRACTION.parse().unwrap(),
            min_keypoints: DEFAULT_MIN_KEYPOINTS.parse().unwrap(),
            min_mean_score: DEFAULT_MIN_MEAN_SCORE.parse().unwrap(),
        }
    }
}

impl GrouperConfig {
    /// Reject settings that would admit single-joint poses or degenerate sampling.
    pub fn validate(&self) -> Result<(), Error> {
        if self.min_keypoints < 2 {
            return Err(Error::InvalidMinKeypoints(self.min_keypoints));
        }
        if self.paf_samples < 2 {
            return Err(Error::InvalidPafSamples(self.paf_samples));
        }
        Ok(())
    }
}

/// Flatten per-joint candidate lists into a table indexed by global id.
fn candidate_table(candidates_by_kind: &[Vec<Candidate>]) -> Result<Vec<Candidate>, Error> {
    let mut table = candidates_by_kind.concat();
    table.sort_by_key(|candidate| candidate.id);
    let len = table.len();
    match table
        .iter()
        .enumerate()
        .find(|(i, candidate)| candidate.id != *i)
    {
        Some((_, candidate)) => Err(Error::CandidateOutOfRange(candidate.id, len)),
        None => Ok(table),
    }
}

fn score_limb<S>(
    scorer: &S,
    limb: &Limb,
    from: &[Candidate],
    to: &[Candidate],
) -> Result<Vec<Connection>, Error>
where
    S: LimbScorer,
{
    let mut connections = Vec::new();
    for a in from {
        for b in to {
            if let Some(score) = scorer.score(limb, a, b)? {
                connections.push(Connection::new(a, b, score)?);
            }
        }
    }
    Ok(connections)
}

/// Assemble pose entries with a custom scorer and assigner.
///
/// Returns the valid entries in creation order and the candidate table they
/// index into.
pub fn group_keypoints_with<S, A>(
    candidates_by_kind: &[Vec<Candidate>],
    scorer: &S,
    assigner: &A,
    config: &GrouperConfig,
) -> Result<(Vec<PoseEntry>, Vec<Candidate>), Error>
where
    S: LimbScorer,
    A: ConnectionAssigner,
{
    config.validate()?;
    let table = candidate_table(candidates_by_kind)?;
    let mut entries = PoseEntries::new(table.len());
    let empty = Vec::new();

    for (limb_i, limb) in constants::LIMBS.iter().enumerate() {
        let from_slot = limb.from.idx()?;
        let to_slot = limb.to.idx()?;
        let from = candidates_by_kind.get(from_slot).unwrap_or(&empty);
        let to = candidates_by_kind.get(to_slot).unwrap_or(&empty);
        if from.is_empty() || to.is_empty() {
            continue;
        }

        let scored = score_limb(scorer, limb, from, to)?;
        let num_scored = scored.len();
        let committed = assigner.assign(scored, table.len());

        let mut created = 0;
        let mut merged = 0;
        let mut conflicts = 0;
        for connection in &committed {
            match entries.merge(connection, from_slot, to_slot, limb.auxiliary)? {
                MergeOutcome::Created => created += 1,
                MergeOutcome::Merged => merged += 1,
                MergeOutcome::Conflict => conflicts += 1,
                MergeOutcome::Extended | MergeOutcome::Reinforced | MergeOutcome::Skipped => {}
            }
        }
        trace!(
            limb = limb_i,
            scored = num_scored,
            committed = committed.len(),
            created,
            merged,
            conflicts
        );
    }

    let entries = entries.finish(&table, config.min_keypoints, config.min_mean_score)?;
    Ok((entries, table))
}

/// Assemble pose entries by scoring limbs against `pafs` and committing them greedily.
pub fn group_keypoints(
    candidates_by_kind: &[Vec<Candidate>],
    pafs: ArrayView3<f32>,
    config: &GrouperConfig,
) -> Result<(Vec<PoseEntry>, Vec<Candidate>), Error> {
    let scorer = PafScorer::new(
        pafs,
        config.paf_samples,
        config.min_paf_score,
        config.min_coverage,
        config.max_limb_fraction,
    )?;
    group_keypoints_with(candidates_by_kind, &scorer, &GreedyAssigner, config)
}
