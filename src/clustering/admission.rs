#![warn(missing_docs)]
//! Admission control: applying the R rule, creating clusters, and the
//! capacity policy when the registry is full.

use serde::Deserialize;
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use super::errors::ClusterError;
use super::history::{FrameRecord, History};
use super::registry::{ClusterId, Registry};
use crate::source::Frame;
use crate::MatchEnumAsStr;

/// What to do when a new cluster would exceed `maxcl`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, EnumIter)]
pub enum CapacityStrategy {
    #[serde(alias = "stop")]
    /// Terminate cleanly; outputs for the frames processed so far are
    /// still written.
    Stop,
    #[serde(alias = "discard")]
    /// Evict the least-visited cluster among the oldest fraction.
    Discard,
    #[serde(alias = "merge")]
    /// Collapse the two closest anchors into one cluster.
    Merge,
}
impl MatchEnumAsStr for CapacityStrategy {}

impl CapacityStrategy {
    /// The option value naming this strategy.
    pub fn as_key(&self) -> &'static str {
        match self {
            CapacityStrategy::Stop => "stop",
            CapacityStrategy::Discard => "discard",
            CapacityStrategy::Merge => "merge",
        }
    }
}

impl FromStr for CapacityStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CapacityStrategy::iter()
            .find(|v| v.match_enum_as_str(s))
            .ok_or_else(|| {
                let valid: Vec<&str> = CapacityStrategy::iter()
                    .map(|v| v.as_key())
                    .collect();
                format!(
                    "\"{}\" is not a capacity strategy (expected one of: {})",
                    s,
                    valid.join(", ")
                )
            })
    }
}

/// Knobs consumed by the admission controller.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionParams {
    /// Probability bump for the chosen cluster.
    pub dprob: f64,
    /// Capacity policy at the `maxcl` ceiling.
    pub strategy: CapacityStrategy,
    /// Fraction of oldest clusters eligible for discard.
    pub discard_frac: f64,
}

/// What admission did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admitted {
    /// The cluster the frame now belongs to.
    pub cluster: ClusterId,
    /// True when the frame spawned a new cluster.
    pub created: bool,
    /// Cluster evicted to make room, if any.
    pub evicted: Option<ClusterId>,
    /// `(kept, absorbed)` pair merged to make room, if any.
    pub merged: Option<(ClusterId, ClusterId)>,
}

/// Apply the admission rule for one frame.
///
/// `chosen` is the pruning result: the first candidate measured within R,
/// or `None` when every live cluster was measured or pruned away. The
/// frame's measurement record is committed to history either way, so the
/// geometric booster can reuse it later.
pub fn admit(
    reg: &mut Registry,
    history: &mut History,
    frame: &Frame,
    chosen: Option<(ClusterId, f64)>,
    record: FrameRecord,
    params: &AdmissionParams,
) -> Result<Admitted, ClusterError> {
    if let Some((cluster, distance)) = chosen {
        reg.record_hit(cluster, frame.index, distance, params.dprob);
        history.record(cluster, record);
        return Ok(Admitted {
            cluster,
            created: false,
            evicted: None,
            merged: None,
        });
    }

    let mut evicted = None;
    let mut merged = None;
    if reg.live_count() >= reg.max_clusters() {
        match params.strategy {
            CapacityStrategy::Stop => {
                return Err(ClusterError::Capacity {
                    frame: frame.index,
                    maxcl: reg.max_clusters(),
                });
            }
            CapacityStrategy::Discard => {
                let victim = reg
                    .discard_candidate(params.discard_frac)
                    .expect("live clusters exist at capacity");
                reg.discard(victim);
                log::debug!("capacity: discarded cluster {}", victim);
                evicted = Some(victim);
            }
            CapacityStrategy::Merge => {
                let (keep, absorb, d) = reg
                    .closest_live_pair()
                    .expect("live pairs exist at capacity");
                reg.merge(absorb, keep);
                log::debug!(
                    "capacity: merged cluster {} into {} (anchor distance {:.6})",
                    absorb,
                    keep,
                    d
                );
                merged = Some((keep, absorb));
            }
        }
    }
    let cluster = reg.create(frame.data.clone(), frame.index);
    history.record(cluster, record);
    Ok(Admitted {
        cluster,
        created: true,
        evicted,
        merged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn params(strategy: CapacityStrategy) -> AdmissionParams {
        AdmissionParams {
            dprob: 0.01,
            strategy,
            discard_frac: 1.0,
        }
    }

    fn frame(index: u64, data: &[f64]) -> Frame {
        Frame {
            index,
            data: data.to_vec(),
        }
    }

    #[test]
    fn strategy_parses_case_insensitively() {
        assert_eq!("stop".parse(), Ok(CapacityStrategy::Stop));
        assert_eq!("MERGE".parse(), Ok(CapacityStrategy::Merge));
        assert!("evict".parse::<CapacityStrategy>().is_err());
    }

    #[test]
    fn match_assigns_and_bumps() {
        let mut reg = Registry::new(4, 8);
        reg.create(vec![0.0], 0);
        reg.create(vec![10.0], 1);
        let mut history = History::new(0);
        let admitted = admit(
            &mut reg,
            &mut history,
            &frame(2, &[0.1]),
            Some((0, 0.1)),
            FrameRecord::default(),
            &params(CapacityStrategy::Stop),
        )
        .unwrap();
        assert_eq!(admitted.cluster, 0);
        assert_eq!(admitted.created, false);
        assert_eq!(reg.cluster(0).hits, 2);
        assert_eq!(history.assignments, vec![0]);
    }

    #[test]
    fn capacity_stop_leaves_the_log_untouched() {
        let mut reg = Registry::new(1, 8);
        reg.create(vec![0.0], 0);
        let mut history = History::new(0);
        let result = admit(
            &mut reg,
            &mut history,
            &frame(1, &[100.0]),
            None,
            FrameRecord::default(),
            &params(CapacityStrategy::Stop),
        );
        assert!(matches!(
            result,
            Err(ClusterError::Capacity { frame: 1, maxcl: 1 })
        ));
        assert_eq!(history.assignments.len(), 0);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn capacity_discard_frees_a_slot_for_the_new_anchor() {
        let mut reg = Registry::new(2, 8);
        reg.create(vec![0.0], 0);
        reg.create(vec![10.0], 1);
        reg.record_hit(1, 2, 0.0, 0.01);
        let mut history = History::new(0);
        let admitted = admit(
            &mut reg,
            &mut history,
            &frame(3, &[100.0]),
            None,
            FrameRecord::default(),
            &params(CapacityStrategy::Discard),
        )
        .unwrap();
        // Cluster 0 has fewer hits and is evicted; the new cluster takes
        // a fresh id.
        assert_eq!(admitted.evicted, Some(0));
        assert_eq!(admitted.cluster, 2);
        assert_eq!(reg.live_count(), 2);
    }

    #[test]
    fn capacity_merge_collapses_the_closest_pair() {
        let mut reg = Registry::new(3, 8);
        reg.create(vec![0.0], 0);
        reg.create(vec![1.0], 1);
        reg.create(vec![50.0], 2);
        let mut history = History::new(0);
        let admitted = admit(
            &mut reg,
            &mut history,
            &frame(3, &[100.0]),
            None,
            FrameRecord::default(),
            &params(CapacityStrategy::Merge),
        )
        .unwrap();
        assert_eq!(admitted.merged, Some((0, 1)));
        assert_eq!(admitted.cluster, 3);
        assert_eq!(reg.live_count(), 3);
    }
}
