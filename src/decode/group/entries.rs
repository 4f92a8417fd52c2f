use crate::{
    decode::{candidate::Candidate, group::score::Connection},
    error::Error,
    pose::NUM_KEYPOINTS,
};
use bitvec::{bitvec, vec::BitVec};
use num_traits::ToPrimitive;

pub type Slots = [Option<usize>; NUM_KEYPOINTS];

/// One assembled person: candidate ids per joint type plus the aggregate score.
#[derive(Debug, Clone, PartialEq)]
pub struct PoseEntry {
    pub slots: Slots,
    /// Sum of committed limb scores and member candidate confidences.
    pub score: f32,
}

impl PoseEntry {
    /// Number of filled joint slots.
    pub fn count(&self) -> usize {
        self.slots.iter().flatten().count()
    }
}

/// What happened when a connection was merged into the entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MergeOutcome {
    Created,
    Extended,
    Merged,
    Reinforced,
    Conflict,
    Skipped,
}

#[derive(Debug, Clone)]
struct EntryState {
    slots: Slots,
    limb_score: f32,
    rank: usize,
}

/// Disjoint sets of candidates, one set per in-progress pose entry.
///
/// Each set is keyed by its root candidate id; entry data lives only at roots.
pub(crate) struct PoseEntries {
    parent: Vec<usize>,
    member: BitVec,
    states: Vec<Option<EntryState>>,
    next_rank: usize,
}

impl PoseEntries {
    pub(crate) fn new(num_candidates: usize) -> Self {
        Self {
            parent: (0..num_candidates).collect(),
            member: bitvec![0; num_candidates],
            states: vec![None; num_candidates],
            next_rank: 0,
        }
    }

    fn check(&self, id: usize) -> Result<(), Error> {
        if id < self.parent.len() {
            Ok(())
        } else {
            Err(Error::CandidateOutOfRange(id, self.parent.len()))
        }
    }

    fn find(&mut self, id: usize) -> usize {
        let mut root = id;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut node = id;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn entry_of(&mut self, id: usize) -> Option<usize> {
        if self.member[id] {
            Some(self.find(id))
        } else {
            None
        }
    }

    fn create(&mut self, connection: &Connection, from_slot: usize, to_slot: usize) {
        let mut slots = [None; NUM_KEYPOINTS];
        slots[from_slot] = Some(connection.from);
        slots[to_slot] = Some(connection.to);
        let root = connection.from;
        self.parent[connection.to] = root;
        self.member.set(connection.from, true);
        self.member.set(connection.to, true);
        self.states[root] = Some(EntryState {
            slots,
            limb_score: connection.score.into_inner(),
            rank: self.next_rank,
        });
        self.next_rank += 1;
    }

    fn attach(&mut self, root: usize, id: usize, slot: usize, score: f32) -> MergeOutcome {
        match self.states[root].as_mut() {
            Some(state) if state.slots[slot].is_none() => {
                state.slots[slot] = Some(id);
                state.limb_score += score;
                self.parent[id] = root;
                self.member.set(id, true);
                MergeOutcome::Extended
            }
            _ => MergeOutcome::Conflict,
        }
    }

    fn union(&mut self, a: usize, b: usize, score: f32) -> MergeOutcome {
        let conflict = match (&self.states[a], &self.states[b]) {
            (Some(sa), Some(sb)) => sa
                .slots
                .iter()
                .zip(sb.slots.iter())
                .any(|(x, y)| x.is_some() && y.is_some()),
            _ => true,
        };
        if conflict {
            return MergeOutcome::Conflict;
        }

        let (keep, drop) = match (&self.states[a], &self.states[b]) {
            (Some(sa), Some(sb)) if sb.rank < sa.rank => (b, a),
            _ => (a, b),
        };
        if let Some(dropped) = self.states[drop].take() {
            if let Some(kept) = self.states[keep].as_mut() {
                for (dst, src) in kept.slots.iter_mut().zip(dropped.slots) {
                    if dst.is_none() {
                        *dst = src;
                    }
                }
                kept.limb_score += dropped.limb_score + score;
            }
        }
        self.parent[drop] = keep;
        MergeOutcome::Merged
    }

    /// Fold one committed connection into the entries.
    ///
    /// Auxiliary limbs may only complete an entry that already holds one endpoint.
    pub(crate) fn merge(
        &mut self,
        connection: &Connection,
        from_slot: usize,
        to_slot: usize,
        auxiliary: bool,
    ) -> Result<MergeOutcome, Error> {
        self.check(connection.from)?;
        self.check(connection.to)?;
        let score = connection.score.into_inner();

        Ok(
            match (self.entry_of(connection.from), self.entry_of(connection.to)) {
                (None, None) if auxiliary => MergeOutcome::Skipped,
                (None, None) => {
                    self.create(connection, from_slot, to_slot);
                    MergeOutcome::Created
                }
                (Some(root), None) => self.attach(root, connection.to, to_slot, score),
                (None, Some(root)) => self.attach(root, connection.from, from_slot, score),
                (Some(a), Some(b)) if a == b => {
                    if let Some(state) = self.states[a].as_mut() {
                        state.limb_score += score;
                    }
                    MergeOutcome::Reinforced
                }
                (Some(_), Some(_)) if auxiliary => MergeOutcome::Skipped,
                (Some(a), Some(b)) => self.union(a, b, score),
            },
        )
    }

    /// Finalize entries in creation order, keeping those with at least
    /// `min_keypoints` joints and a per-joint score of at least `min_mean_score`.
    pub(crate) fn finish(
        self,
        candidates: &[Candidate],
        min_keypoints: usize,
        min_mean_score: f32,
    ) -> Result<Vec<PoseEntry>, Error> {
        let mut ranked = Vec::new();
        for state in self.states.into_iter().flatten() {
            let mut confidence = 0.0;
            let mut count = 0_usize;
            for &id in state.slots.iter().flatten() {
                let candidate = candidates
                    .get(id)
                    .ok_or(Error::CandidateOutOfRange(id, candidates.len()))?;
                confidence += candidate.confidence;
                count += 1;
            }
            let score = state.limb_score + confidence;
            let mean_floor = min_mean_score * count.to_f32().ok_or(Error::ConvertToF32)?;
            if count >= min_keypoints && score >= mean_floor {
                ranked.push((
                    state.rank,
                    PoseEntry {
                        slots: state.slots,
                        score,
                    },
                ));
            }
        }
        ranked.sort_by_key(|&(rank, _)| rank);
        Ok(ranked.into_iter().map(|(_, entry)| entry).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{point::Point, pose::KeypointKind};
    use assert_approx_eq::assert_approx_eq;
    use num_traits::FromPrimitive;
    use ordered_float::NotNan;

    fn connection(from: usize, to: usize, score: f32) -> Connection {
        Connection {
            from,
            to,
            score: NotNan::new(score).unwrap(),
            combined: NotNan::new(score).unwrap(),
        }
    }

    /// Candidate `id` sits at joint slot `slot` with confidence 0.5.
    fn table(slots: &[usize]) -> Vec<Candidate> {
        slots
            .iter()
            .enumerate()
            .map(|(id, &slot)| Candidate {
                point: Point::new(id as f32, 0.0).unwrap(),
                confidence: 0.5,
                id,
                kind: KeypointKind::from_usize(slot).unwrap(),
            })
            .collect()
    }

    #[test]
    fn shared_candidate_extends_one_entry() {
        // candidates 0, 1, 2 at joints 1, 2, 3: A-B then B-C
        let candidates = table(&[1, 2, 3]);
        let mut entries = PoseEntries::new(3);
        assert_eq!(
            entries.merge(&connection(0, 1, 1.0), 1, 2, false).unwrap(),
            MergeOutcome::Created
        );
        assert_eq!(
            entries.merge(&connection(1, 2, 1.0), 2, 3, false).unwrap(),
            MergeOutcome::Extended
        );
        let finished = entries.finish(&candidates, 3, 0.2).unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].count(), 3);
        assert_eq!(finished[0].slots[1], Some(0));
        assert_eq!(finished[0].slots[2], Some(1));
        assert_eq!(finished[0].slots[3], Some(2));
        assert_approx_eq!(finished[0].score, 2.0 + 1.5);
    }

    #[test]
    fn disjoint_entries_merge_without_conflict() {
        // 0-1 at joints (1, 2), 2-3 at joints (3, 4), then 1-2 joins them
        let candidates = table(&[1, 2, 3, 4]);
        let mut entries = PoseEntries::new(4);
        entries.merge(&connection(0, 1, 1.0), 1, 2, false).unwrap();
        entries.merge(&connection(2, 3, 1.0), 3, 4, false).unwrap();
        assert_eq!(
            entries.merge(&connection(1, 2, 0.5), 2, 3, false).unwrap(),
            MergeOutcome::Merged
        );
        let finished = entries.finish(&candidates, 2, 0.0).unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].count(), 4);
        assert_approx_eq!(finished[0].score, 2.5 + 2.0);
    }

    #[test]
    fn conflicting_entries_stay_apart() {
        // both entries already hold a joint-1 candidate
        let candidates = table(&[1, 2, 1, 3]);
        let mut entries = PoseEntries::new(4);
        entries.merge(&connection(0, 1, 1.0), 1, 2, false).unwrap();
        entries.merge(&connection(2, 3, 1.0), 1, 3, false).unwrap();
        assert_eq!(
            entries.merge(&connection(1, 3, 1.0), 2, 3, false).unwrap(),
            MergeOutcome::Conflict
        );
        let finished = entries.finish(&candidates, 2, 0.0).unwrap();
        assert_eq!(finished.len(), 2);
        assert!(finished.iter().all(|entry| entry.count() == 2));
    }

    #[test]
    fn filled_slot_rejects_attachment() {
        let candidates = table(&[1, 2, 2]);
        let mut entries = PoseEntries::new(3);
        entries.merge(&connection(0, 1, 1.0), 1, 2, false).unwrap();
        assert_eq!(
            entries.merge(&connection(0, 2, 1.0), 1, 2, false).unwrap(),
            MergeOutcome::Conflict
        );
        let finished = entries.finish(&candidates, 2, 0.0).unwrap();
        assert_eq!(finished[0].slots[2], Some(1));
    }

    #[test]
    fn auxiliary_limbs_only_complete_entries() {
        let candidates = table(&[2, 16, 5, 17]);
        let mut entries = PoseEntries::new(4);
        assert_eq!(
            entries.merge(&connection(2, 3, 1.0), 5, 17, true).unwrap(),
            MergeOutcome::Skipped
        );
        entries.merge(&connection(0, 2, 1.0), 2, 5, false).unwrap();
        assert_eq!(
            entries.merge(&connection(0, 1, 1.0), 2, 16, true).unwrap(),
            MergeOutcome::Extended
        );
        let finished = entries.finish(&candidates, 3, 0.0).unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].slots[16], Some(1));
        assert_eq!(finished[0].slots[17], None);
    }

    #[test]
    fn weak_or_small_entries_are_dropped() {
        let candidates = table(&[1, 2, 3]);
        let mut entries = PoseEntries::new(3);
        entries.merge(&connection(0, 1, 0.1), 1, 2, false).unwrap();
        let finished = entries.finish(&candidates, 3, 0.2).unwrap();
        assert!(finished.is_empty());

        let mut entries = PoseEntries::new(3);
        entries.merge(&connection(0, 1, 0.1), 1, 2, false).unwrap();
        entries.merge(&connection(1, 2, 0.1), 2, 3, false).unwrap();
        // score 0.2 + 1.5 over 3 joints passes 0.2, fails 0.6
        assert_eq!(entries.finish(&candidates, 3, 0.6).unwrap().len(), 0);
    }

    #[test]
    fn out_of_range_ids_are_errors() {
        let mut entries = PoseEntries::new(2);
        assert!(entries.merge(&connection(0, 5, 1.0), 1, 2, false).is_err());
    }

    #[test]
    fn output_follows_creation_order() {
        let candidates = table(&[1, 2, 1, 2, 3, 3]);
        let mut entries = PoseEntries::new(6);
        // created second but rooted at the lower id
        entries.merge(&connection(2, 3, 1.0), 1, 2, false).unwrap();
        entries.merge(&connection(0, 1, 1.0), 1, 2, false).unwrap();
        entries.merge(&connection(3, 4, 1.0), 2, 3, false).unwrap();
        entries.merge(&connection(1, 5, 1.0), 2, 3, false).unwrap();
        let finished = entries.finish(&candidates, 3, 0.0).unwrap();
        assert_eq!(finished.len(), 2);
        assert_eq!(finished[0].slots[1], Some(2));
        assert_eq!(finished[1].slots[1], Some(0));
    }
}
