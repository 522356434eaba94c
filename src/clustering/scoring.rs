#![warn(missing_docs)]
//! Candidate ordering: recency probability, transition-matrix blending,
//! pattern prediction, and the geometric-evidence (gprob) boost.

use super::history::{FrameRecord, History};
use super::registry::{ClusterId, Registry};

/// Pattern-prediction parameters, the `pred[l,h,n]` option.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PredParams {
    /// Length of the recent sequence to match.
    pub len: usize,
    /// How far back to search for the pattern.
    pub horizon: usize,
    /// Number of predicted candidates to front-load.
    pub n: usize,
}

/// Knobs consumed by the scorer.
#[derive(Debug, Clone, Copy)]
pub struct ScoreParams {
    /// Transition-matrix mixing coefficient in `[0, 1]`.
    pub tm_coeff: f64,
    /// Whether the geometric boost is active.
    pub gprob: bool,
    /// Reward factor at a perfect geometric match.
    pub fmatch_a: f64,
    /// Reward factor at the 2R limit of the triangle inequality.
    pub fmatch_b: f64,
    /// The admission radius.
    pub rlim: f64,
    /// Pattern prediction, when enabled.
    pub pred: Option<PredParams>,
}

/// One entry of the ordered candidate list. Predicted candidates carry an
/// infinite score so re-sorting never demotes them below scored ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    /// Cluster id.
    pub id: ClusterId,
    /// Current mixed score.
    pub score: f64,
}

/// `(1-tau) * P(i) + tau * T[prev][i] / sum_j T[prev][j]`. The transition
/// term drops out on the first frame and for all-zero rows.
pub fn mixed_score(
    reg: &Registry,
    history: &History,
    params: &ScoreParams,
    id: ClusterId,
) -> f64 {
    let p = reg.probability(id);
    match history.prev {
        Some(prev) if params.tm_coeff > 0.0 => {
            (1.0 - params.tm_coeff) * p
                + params.tm_coeff * history.tmatrix.probability(prev, id)
        }
        _ => p,
    }
}

/// The ordered candidate list for one incoming frame: predicted ids
/// first, then every other live cluster by descending mixed score, ties
/// by lowest id.
pub fn order_candidates(
    reg: &Registry,
    history: &History,
    params: &ScoreParams,
) -> Vec<Candidate> {
    let predicted: Vec<ClusterId> = match params.pred {
        Some(p) => history
            .seq
            .predict(p.len, p.horizon, p.n, |id| reg.cluster(id).is_live()),
        None => Vec::new(),
    };
    let mut ordered: Vec<Candidate> = predicted
        .iter()
        .map(|&id| Candidate {
            id,
            score: f64::INFINITY,
        })
        .collect();
    let mut scored: Vec<Candidate> = reg
        .live_ids()
        .filter(|id| !predicted.contains(id))
        .map(|id| Candidate {
            id,
            score: mixed_score(reg, history, params, id),
        })
        .collect();
    sort_candidates(&mut scored);
    ordered.extend(scored);
    ordered
}

/// Stable descending sort by score, exact ties resolved by lowest id.
pub fn sort_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .expect("candidate scores are finite or +inf")
            .then(a.id.cmp(&b.id))
    });
}

/// Linear reward curve of the geometric boost: `a` at a perfect match,
/// `b` at `delta = 2R`, clamped so runaway deltas cannot flip a score's
/// sign.
pub fn gprob_factor(delta: f64, a: f64, b: f64, rlim: f64) -> f64 {
    if rlim <= 0.0 {
        return 1.0;
    }
    let f = a - (a - b) * delta / (2.0 * rlim);
    f.max(0.0).min(a.max(b).max(0.0))
}

/// Geometric boost for one candidate: the best evidence product over its
/// visitors. A visitor contributes one factor per cluster that both it
/// and the current frame measured exactly; visitors sharing no
/// measurement offer no evidence and are skipped.
pub fn gprob_boost(
    reg: &Registry,
    history: &History,
    current: &FrameRecord,
    params: &ScoreParams,
    id: ClusterId,
) -> f64 {
    let mut best: Option<f64> = None;
    for &(vframe, _) in reg.cluster(id).visitors.iter() {
        let Some(record) = history.records.get(vframe as usize) else {
            continue;
        };
        let mut product = 1.0;
        let mut shared = 0;
        for (j, measurement) in &record.measured {
            let Some(dv) = measurement.exact() else { continue };
            let Some(df) = current.exact_to(*j) else { continue };
            product *= gprob_factor((df - dv).abs(), params.fmatch_a, params.fmatch_b, params.rlim);
            shared += 1;
        }
        if shared > 0 && best.map(|b| product > b).unwrap_or(true) {
            best = Some(product);
        }
    }
    best.unwrap_or(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::history::Measurement;
    use pretty_assertions::assert_eq;

    fn params() -> ScoreParams {
        ScoreParams {
            tm_coeff: 0.0,
            gprob: false,
            fmatch_a: 2.0,
            fmatch_b: 0.5,
            rlim: 1.0,
            pred: None,
        }
    }

    fn registry_with(anchors: &[&[f64]]) -> Registry {
        let mut reg = Registry::new(16, 8);
        for (i, anchor) in anchors.iter().enumerate() {
            reg.create(anchor.to_vec(), i as u64);
        }
        reg
    }

    #[test]
    fn ordering_follows_probability() {
        let mut reg = registry_with(&[&[0.0], &[10.0], &[20.0]]);
        let mut history = History::new(0);
        history.record(1, FrameRecord::default());
        for frame in 3..13 {
            reg.record_hit(1, frame, 0.1, 0.05);
        }
        let ordered = order_candidates(&reg, &history, &params());
        assert_eq!(ordered[0].id, 1);
        // 0 and 2 tie on probability; lower id first.
        assert_eq!(ordered[1].id, 0);
        assert_eq!(ordered[2].id, 2);
    }

    #[test]
    fn transition_blend_reorders_equal_probabilities() {
        let reg = registry_with(&[&[0.0], &[10.0], &[20.0]]);
        let mut history = History::new(0);
        // 0 -> 2 happened; from prev = 0 the blend favors 2.
        history.record(0, FrameRecord::default());
        history.record(2, FrameRecord::default());
        history.record(0, FrameRecord::default());
        let mut p = params();
        p.tm_coeff = 0.5;
        let ordered = order_candidates(&reg, &history, &p);
        assert_eq!(ordered[0].id, 2);
    }

    #[test]
    fn predicted_candidates_lead_the_list() {
        let mut reg = registry_with(&[&[0.0], &[10.0], &[20.0]]);
        let mut history = History::new(32);
        for &id in &[0, 1, 2, 0, 1, 2, 0, 1] {
            history.record(id, FrameRecord::default());
        }
        // Give cluster 0 dominant probability; prediction still wins the
        // front slot.
        for frame in 10..30 {
            reg.record_hit(0, frame, 0.0, 0.05);
        }
        let mut p = params();
        p.pred = Some(PredParams {
            len: 2,
            horizon: 16,
            n: 1,
        });
        let ordered = order_candidates(&reg, &history, &p);
        assert_eq!(ordered[0].id, 2);
        assert_eq!(ordered[0].score, f64::INFINITY);
        assert_eq!(ordered[1].id, 0);
    }

    #[test]
    fn factor_endpoints_match_configuration() {
        assert_eq!(gprob_factor(0.0, 2.0, 0.5, 1.0), 2.0);
        assert_eq!(gprob_factor(2.0, 2.0, 0.5, 1.0), 0.5);
        // Far beyond the triangle limit the factor floors at zero.
        assert_eq!(gprob_factor(10.0, 2.0, 0.5, 1.0), 0.0);
    }

    #[test]
    fn geometric_evidence_boosts_the_matching_cluster() {
        let mut reg = registry_with(&[&[0.0], &[10.0]]);
        let mut history = History::new(0);
        // Past frame 2 visited cluster 0 and measured cluster 1 at 9.8.
        let mut past = FrameRecord::default();
        past.measured.push((1, Measurement::Exact(9.8)));
        history.record(0, FrameRecord::default());
        history.record(0, FrameRecord::default());
        history.record(0, past);
        reg.record_hit(0, 2, 0.2, 0.01);
        // The current frame measured cluster 1 at 9.8 as well: perfect
        // match, factor a.
        let mut current = FrameRecord::default();
        current.measured.push((1, Measurement::Exact(9.8)));
        let p = params();
        assert_eq!(gprob_boost(&reg, &history, &current, &p, 0), 2.0);
        // A frame with no shared measurement gets no boost.
        let unrelated = FrameRecord::default();
        assert_eq!(gprob_boost(&reg, &history, &unrelated, &p, 0), 1.0);
    }
}
