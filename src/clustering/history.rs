#![warn(missing_docs)]
//! Run history: the assignment log, per-frame measurement records, the
//! transition matrix, and the sequence ring behind pattern prediction.
//!
//! Frames and clusters cross-reference each other by integer key only;
//! nothing here holds a reference into the registry.

use std::collections::{HashMap, VecDeque};

use super::registry::ClusterId;

/// A frame-to-anchor measurement taken during pruning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// Full accumulation; the exact distance.
    Exact(f64),
    /// Capped accumulation that exited early; a lower bound on the
    /// distance.
    AtLeast(f64),
}

impl Measurement {
    /// The exact distance, when one was computed.
    pub fn exact(&self) -> Option<f64> {
        match self {
            Measurement::Exact(d) => Some(*d),
            Measurement::AtLeast(_) => None,
        }
    }

    /// The tightest known lower bound on the distance.
    pub fn lower_bound(&self) -> f64 {
        match self {
            Measurement::Exact(d) | Measurement::AtLeast(d) => *d,
        }
    }
}

/// The measurements one frame accumulated against cluster anchors.
#[derive(Debug, Clone, Default)]
pub struct FrameRecord {
    /// `(cluster, measurement)` pairs in measurement order.
    pub measured: Vec<(ClusterId, Measurement)>,
}

impl FrameRecord {
    /// The exact distance this frame measured to `cluster`, if any.
    pub fn exact_to(&self, cluster: ClusterId) -> Option<f64> {
        self.measured
            .iter()
            .find(|(id, _)| *id == cluster)
            .and_then(|(_, m)| m.exact())
    }
}

#[derive(Debug, Default)]
struct TransitionRow {
    counts: HashMap<ClusterId, u64>,
    total: u64,
}

/// Counts of consecutive `prev -> curr` assignments.
#[derive(Debug, Default)]
pub struct TransitionMatrix {
    rows: HashMap<ClusterId, TransitionRow>,
}

impl TransitionMatrix {
    /// Record one `prev -> curr` transition.
    pub fn bump(&mut self, prev: ClusterId, curr: ClusterId) {
        let row = self.rows.entry(prev).or_default();
        *row.counts.entry(curr).or_insert(0) += 1;
        row.total += 1;
    }

    /// `T[prev][curr] / sum_j T[prev][j]`, or 0 when the row is empty.
    pub fn probability(&self, prev: ClusterId, curr: ClusterId) -> f64 {
        match self.rows.get(&prev) {
            Some(row) if row.total > 0 => {
                *row.counts.get(&curr).unwrap_or(&0) as f64 / row.total as f64
            }
            _ => 0.0,
        }
    }

    /// Non-zero entries as `(prev, curr, count)`, sorted for stable
    /// output.
    pub fn entries_sorted(&self) -> Vec<(ClusterId, ClusterId, u64)> {
        let mut entries: Vec<(ClusterId, ClusterId, u64)> = self
            .rows
            .iter()
            .flat_map(|(prev, row)| {
                row.counts
                    .iter()
                    .map(move |(curr, count)| (*prev, *curr, *count))
            })
            .collect();
        entries.sort_unstable();
        entries
    }
}

/// Ring of the most recent cluster assignments, scanned by the pattern
/// predictor.
#[derive(Debug)]
pub struct SequenceRing {
    cap: usize,
    items: VecDeque<ClusterId>,
}

impl SequenceRing {
    /// Ring holding up to `cap` recent assignments.
    pub fn new(cap: usize) -> SequenceRing {
        SequenceRing {
            cap,
            items: VecDeque::new(),
        }
    }

    /// Append an assignment, evicting the oldest entry when full.
    pub fn push(&mut self, id: ClusterId) {
        if self.cap == 0 {
            return;
        }
        self.items.push_back(id);
        while self.items.len() > self.cap {
            self.items.pop_front();
        }
    }

    /// Predict upcoming clusters: match the last `len` assignments
    /// against the preceding `horizon` entries and collect the ids that
    /// followed each occurrence, most recent occurrence first, up to `n`
    /// distinct ids accepted by `keep`.
    pub fn predict<F>(&self, len: usize, horizon: usize, n: usize, keep: F) -> Vec<ClusterId>
    where
        F: Fn(ClusterId) -> bool,
    {
        let v: Vec<ClusterId> = self.items.iter().copied().collect();
        if len == 0 || n == 0 || v.len() <= len {
            return Vec::new();
        }
        let pattern = &v[v.len() - len..];
        let window_end = v.len() - len;
        let window_start = window_end.saturating_sub(horizon);
        let mut predicted: Vec<ClusterId> = Vec::new();
        for p in (window_start..window_end).rev() {
            if &v[p..p + len] == pattern {
                let follower = v[p + len];
                if keep(follower) && !predicted.contains(&follower) {
                    predicted.push(follower);
                    if predicted.len() == n {
                        break;
                    }
                }
            }
        }
        predicted
    }
}

/// Everything the run accumulates about past frames.
#[derive(Debug)]
pub struct History {
    /// `assignments[frame] = cluster id`; append-only.
    pub assignments: Vec<i64>,
    /// The previous frame's cluster.
    pub prev: Option<ClusterId>,
    /// Consecutive-assignment counts.
    pub tmatrix: TransitionMatrix,
    /// Recent assignment ids for the pattern predictor.
    pub seq: SequenceRing,
    /// Per-frame measurement records, indexed by frame.
    pub records: Vec<FrameRecord>,
}

impl History {
    /// Empty history; `seq_cap` sizes the prediction ring.
    pub fn new(seq_cap: usize) -> History {
        History {
            assignments: Vec::new(),
            prev: None,
            tmatrix: TransitionMatrix::default(),
            seq: SequenceRing::new(seq_cap),
            records: Vec::new(),
        }
    }

    /// Record a completed assignment; strictly ordered after the
    /// decision, so the transition matrix and sequence ring never observe
    /// a frame out of order.
    pub fn record(&mut self, cluster: ClusterId, record: FrameRecord) {
        self.assignments.push(cluster as i64);
        if let Some(prev) = self.prev {
            self.tmatrix.bump(prev, cluster);
        }
        self.seq.push(cluster);
        self.prev = Some(cluster);
        self.records.push(record);
    }

    /// Number of assigned frames.
    pub fn frames(&self) -> u64 {
        self.assignments.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn transition_probability_normalizes_rows() {
        let mut tm = TransitionMatrix::default();
        tm.bump(0, 1);
        tm.bump(0, 1);
        tm.bump(0, 2);
        assert_eq!(tm.probability(0, 1), 2.0 / 3.0);
        assert_eq!(tm.probability(0, 2), 1.0 / 3.0);
        assert_eq!(tm.probability(1, 0), 0.0);
        assert_eq!(tm.entries_sorted(), vec![(0, 1, 2), (0, 2, 1)]);
    }

    #[test]
    fn predictor_finds_repeating_pattern() {
        // A B C A B C A B -> matching [A, B] predicts C.
        let mut seq = SequenceRing::new(32);
        for &id in &[0, 1, 2, 0, 1, 2, 0, 1] {
            seq.push(id);
        }
        assert_eq!(seq.predict(2, 32, 2, |_| true), vec![2]);
    }

    #[test]
    fn predictor_returns_most_recent_followers_first() {
        // Pattern [0] followed by 3 (recent) and 2 (older).
        let mut seq = SequenceRing::new(32);
        for &id in &[0, 2, 0, 3, 0] {
            seq.push(id);
        }
        assert_eq!(seq.predict(1, 32, 2, |_| true), vec![3, 2]);
    }

    #[test]
    fn predictor_skips_rejected_ids() {
        let mut seq = SequenceRing::new(32);
        for &id in &[0, 2, 0, 3, 0] {
            seq.push(id);
        }
        assert_eq!(seq.predict(1, 32, 2, |id| id != 3), vec![2]);
    }

    #[test]
    fn predictor_respects_horizon() {
        // The only [0] occurrence with a follower sits beyond a horizon
        // of 1.
        let mut seq = SequenceRing::new(32);
        for &id in &[0, 2, 1, 0] {
            seq.push(id);
        }
        assert_eq!(seq.predict(1, 1, 2, |_| true), Vec::<ClusterId>::new());
        assert_eq!(seq.predict(1, 3, 2, |_| true), vec![2]);
    }

    #[test]
    fn history_orders_assignment_side_effects() {
        let mut history = History::new(8);
        history.record(0, FrameRecord::default());
        history.record(1, FrameRecord::default());
        history.record(1, FrameRecord::default());
        assert_eq!(history.assignments, vec![0, 1, 1]);
        assert_eq!(history.tmatrix.probability(0, 1), 1.0);
        assert_eq!(history.tmatrix.probability(1, 1), 1.0);
        assert_eq!(history.prev, Some(1));
    }
}
