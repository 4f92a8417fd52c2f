use crate::decode::group::score::Connection;
use bitvec::bitvec;
use std::cmp::Reverse;

/// Chooses which scored connections of one limb are committed.
pub trait ConnectionAssigner {
    /// Select connections so that no candidate is used twice.
    ///
    /// `num_candidates` bounds every candidate id in `connections`.
    fn assign(&self, connections: Vec<Connection>, num_candidates: usize) -> Vec<Connection>;
}

/// Commits connections best-first, skipping any that reuse a candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyAssigner;

impl ConnectionAssigner for GreedyAssigner {
    fn assign(&self, mut connections: Vec<Connection>, num_candidates: usize) -> Vec<Connection> {
        connections.sort_by_key(|c| (Reverse(c.score), Reverse(c.combined), c.from, c.to));

        let mut used = bitvec![0; num_candidates];
        connections
            .into_iter()
            .filter(|c| {
                if used[c.from] || used[c.to] {
                    false
                } else {
                    used.set(c.from, true);
                    used.set(c.to, true);
                    true
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ordered_float::NotNan;

    fn connection(from: usize, to: usize, score: f32, combined: f32) -> Connection {
        Connection {
            from,
            to,
            score: NotNan::new(score).unwrap(),
            combined: NotNan::new(combined).unwrap(),
        }
    }

    fn pairs(connections: &[Connection]) -> Vec<(usize, usize)> {
        connections.iter().map(|c| (c.from, c.to)).collect()
    }

    #[test]
    fn best_pairs_win() {
        let connections = vec![
            connection(0, 2, 0.4, 1.0),
            connection(0, 3, 0.9, 1.0),
            connection(1, 3, 0.8, 1.0),
            connection(1, 2, 0.7, 1.0),
        ];
        let committed = GreedyAssigner.assign(connections, 4);
        assert_eq!(pairs(&committed), vec![(0, 3), (1, 2)]);
    }

    #[test]
    fn greedy_is_not_optimal() {
        // optimal would be (0, 3) + (1, 2) with total 1.6
        let connections = vec![
            connection(0, 2, 0.9, 1.0),
            connection(0, 3, 0.8, 1.0),
            connection(1, 2, 0.8, 1.0),
        ];
        let committed = GreedyAssigner.assign(connections, 4);
        assert_eq!(pairs(&committed), vec![(0, 2)]);
    }

    #[test]
    fn ties_prefer_higher_combined_then_lower_ids() {
        let connections = vec![
            connection(1, 2, 0.5, 1.0),
            connection(0, 3, 0.5, 2.0),
            connection(0, 2, 0.5, 1.0),
        ];
        let committed = GreedyAssigner.assign(connections.clone(), 4);
        assert_eq!(pairs(&committed), vec![(0, 3), (1, 2)]);

        let mut reversed = connections;
        reversed.reverse();
        assert_eq!(pairs(&GreedyAssigner.assign(reversed, 4)), vec![(0, 3), (1, 2)]);
    }

    #[test]
    fn empty_input_commits_nothing() {
        assert!(GreedyAssigner.assign(Vec::new(), 0).is_empty());
    }
}
