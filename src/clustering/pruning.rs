#![warn(missing_docs)]
//! Triangle-inequality pruning: deciding which anchors to measure.
//!
//! Candidates are visited in score order. Each carries a lower bound on
//! its anchor distance, tightened after every measurement; a candidate
//! whose bound exceeds R is rejected without touching its anchor vector.
//! The loop stops at the first candidate measured within R.

use super::history::{FrameRecord, History, Measurement};
use super::registry::{ClusterId, Registry};
use super::scoring::{self, Candidate, ScoreParams};
use crate::metric::algs::{self, Capped};
use rayon::prelude::*;

/// Relative slack applied to every bound comparison so float noise in the
/// planar embeddings can never reject a genuinely within-R candidate.
const PRUNE_EPS: f64 = 1e-9;

/// Baselines below which an embedding is considered degenerate.
const DEGENERATE_EPS: f64 = 1e-12;

/// Knobs consumed by the pruning loop.
#[derive(Debug, Clone, Copy)]
pub struct PruneParams {
    /// The admission radius.
    pub rlim: f64,
    /// 4-point (planar) bounds.
    pub te4: bool,
    /// 5-point (spatial) bounds.
    pub te5: bool,
    /// Measure exactly instead of capping the accumulator at R. Forced on
    /// whenever a consumer of exact over-R distances (gprob, te4, te5,
    /// the distance dump) is active.
    pub exact: bool,
}

/// What one frame's pruning pass produced.
#[derive(Debug)]
pub struct PruneOutcome {
    /// Winning cluster and its measured distance, if any candidate was
    /// within R.
    pub chosen: Option<(ClusterId, f64)>,
    /// Every measurement taken, in order.
    pub record: FrameRecord,
    /// Metric kernel invocations.
    pub dist_calls: u32,
    /// Candidates rejected by bounds alone.
    pub pruned: u32,
    /// Fraction of the candidate list already pruned when measurement
    /// `k` was issued.
    pub step_fractions: Vec<f64>,
}

#[derive(Debug, Clone, Copy)]
struct BoundedCandidate {
    cand: Candidate,
    bound: f64,
}

/// Planar embedding of the frame over two exactly measured anchors.
struct Embed2 {
    k: ClusterId,
    m: ClusterId,
    dkm: f64,
    xf: f64,
    yf: f64,
}

/// Spatial embedding of the frame over three exactly measured anchors.
struct Embed3 {
    k: ClusterId,
    m: ClusterId,
    n: ClusterId,
    dkm: f64,
    xn: f64,
    yn: f64,
    xf: f64,
    yf: f64,
    zf: f64,
}

/// The per-frame pruning pass over a read-only registry snapshot.
pub struct Pruner<'a> {
    reg: &'a Registry,
    history: &'a History,
    params: PruneParams,
    score_params: ScoreParams,
    pool: Option<&'a rayon::ThreadPool>,
}

impl<'a> Pruner<'a> {
    /// A pruner borrowing the engine's registry and history.
    pub fn new(
        reg: &'a Registry,
        history: &'a History,
        params: PruneParams,
        score_params: ScoreParams,
        pool: Option<&'a rayon::ThreadPool>,
    ) -> Pruner<'a> {
        Pruner {
            reg,
            history,
            params,
            score_params,
            pool,
        }
    }

    /// Run the pass for one frame over an ordered candidate list.
    pub fn run(&self, frame: &[f64], candidates: Vec<Candidate>) -> PruneOutcome {
        let total = candidates.len();
        let rlim = self.params.rlim;
        let reject_above = rlim * (1.0 + PRUNE_EPS);
        let mut states: Vec<BoundedCandidate> = candidates
            .into_iter()
            .map(|cand| BoundedCandidate { cand, bound: 0.0 })
            .collect();
        let mut record = FrameRecord::default();
        let mut exact_refs: Vec<(ClusterId, f64)> = Vec::new();
        let mut outcome = PruneOutcome {
            chosen: None,
            record: FrameRecord::default(),
            dist_calls: 0,
            pruned: 0,
            step_fractions: Vec::new(),
        };
        let mut cursor = 0;
        while cursor < states.len() {
            let current = states[cursor];
            cursor += 1;
            if current.bound > reject_above {
                outcome.pruned += 1;
                continue;
            }
            outcome
                .step_fractions
                .push(outcome.pruned as f64 / total as f64);
            outcome.dist_calls += 1;
            let anchor = &self.reg.cluster(current.cand.id).anchor;
            let measurement = if self.params.exact {
                Measurement::Exact(algs::dist(frame, anchor))
            } else {
                match algs::dist_sq_capped(frame, anchor, rlim * rlim) {
                    Capped::Within(d_sq) => Measurement::Exact(d_sq.sqrt()),
                    Capped::Beyond(partial_sq) => Measurement::AtLeast(partial_sq.sqrt()),
                }
            };
            record.measured.push((current.cand.id, measurement));
            if let Measurement::Exact(d) = measurement {
                if d <= rlim {
                    outcome.chosen = Some((current.cand.id, d));
                    break;
                }
                exact_refs.push((current.cand.id, d));
            }
            // A miss. Tighten the tail with what it taught us.
            self.refresh_bounds(
                &mut states[cursor..],
                current.cand.id,
                measurement,
                &exact_refs,
            );
            if self.score_params.gprob && measurement.exact().is_some() {
                self.rescore_tail(&mut states[cursor..], &record);
            }
        }
        outcome.record = record;
        outcome
    }

    /// Recompute lower bounds for the unvisited tail using the newest
    /// measurement and, when enabled, the planar/spatial constructions
    /// over the most recent exact references. Workers write disjoint
    /// elements; the merge order never changes.
    fn refresh_bounds(
        &self,
        tail: &mut [BoundedCandidate],
        measured_id: ClusterId,
        measurement: Measurement,
        exact_refs: &[(ClusterId, f64)],
    ) {
        let embed2 = if self.params.te4 && exact_refs.len() >= 2 {
            let (m, dm) = exact_refs[exact_refs.len() - 1];
            let (k, dk) = exact_refs[exact_refs.len() - 2];
            self.embed2(k, dk, m, dm)
        } else {
            None
        };
        let embed3 = if self.params.te5 && exact_refs.len() >= 3 {
            let (n, dn) = exact_refs[exact_refs.len() - 1];
            let (m, dm) = exact_refs[exact_refs.len() - 2];
            let (k, dk) = exact_refs[exact_refs.len() - 3];
            self.embed3(k, dk, m, dm, n, dn)
        } else {
            None
        };
        let update = |state: &mut BoundedCandidate| {
            let id = state.cand.id;
            let mut bound = state.bound;
            if let Some(dcc) = self.reg.dcc(measured_id, id) {
                let three_point = match measurement {
                    Measurement::Exact(d) => (d - dcc).abs(),
                    Measurement::AtLeast(lb) => lb - dcc,
                };
                bound = bound.max(three_point);
            }
            if let Some(embed) = &embed2 {
                if let Some(b) = self.bound4(embed, id) {
                    bound = bound.max(b);
                }
            }
            if let Some(embed) = &embed3 {
                if let Some(b) = self.bound5(embed, id) {
                    bound = bound.max(b);
                }
            }
            state.bound = bound;
        };
        match self.pool {
            Some(pool) => pool.install(|| tail.par_iter_mut().for_each(update)),
            None => tail.iter_mut().for_each(update),
        }
    }

    fn rescore_tail(&self, tail: &mut [BoundedCandidate], record: &FrameRecord) {
        for state in tail.iter_mut() {
            if state.cand.score.is_finite() {
                let base =
                    scoring::mixed_score(self.reg, self.history, &self.score_params, state.cand.id);
                state.cand.score = base
                    * scoring::gprob_boost(
                        self.reg,
                        self.history,
                        record,
                        &self.score_params,
                        state.cand.id,
                    );
            }
        }
        tail.sort_by(|a, b| {
            b.cand
                .score
                .partial_cmp(&a.cand.score)
                .expect("candidate scores are finite or +inf")
                .then(a.cand.id.cmp(&b.cand.id))
        });
    }

    /// Place the frame in the plane of anchors `k` and `m`: `k` at the
    /// origin, `m` on the positive x axis, the frame at `(xf, yf >= 0)`.
    fn embed2(&self, k: ClusterId, dk: f64, m: ClusterId, dm: f64) -> Option<Embed2> {
        let dkm = self.reg.dcc(k, m)?;
        if dkm <= DEGENERATE_EPS {
            return None;
        }
        let xf = (dk * dk + dkm * dkm - dm * dm) / (2.0 * dkm);
        let yf = (dk * dk - xf * xf).max(0.0).sqrt();
        Some(Embed2 { k, m, dkm, xf, yf })
    }

    /// Lower bound on the frame-to-candidate distance from the planar
    /// construction: the candidate's projection is pinned by its cached
    /// anchor distances and its out-of-axis mass is rotated toward the
    /// frame, the minimizing orientation.
    fn bound4(&self, e: &Embed2, id: ClusterId) -> Option<f64> {
        let dki = self.reg.dcc(e.k, id)?;
        let dmi = self.reg.dcc(e.m, id)?;
        let xi = (dki * dki + e.dkm * e.dkm - dmi * dmi) / (2.0 * e.dkm);
        let ri = (dki * dki - xi * xi).max(0.0).sqrt();
        let dx = e.xf - xi;
        let dy = e.yf - ri;
        Some((dx * dx + dy * dy).sqrt())
    }

    /// Extend the construction to three reference anchors, embedding the
    /// frame in R^3.
    fn embed3(
        &self,
        k: ClusterId,
        dk: f64,
        m: ClusterId,
        dm: f64,
        n: ClusterId,
        dn: f64,
    ) -> Option<Embed3> {
        let dkm = self.reg.dcc(k, m)?;
        let dkn = self.reg.dcc(k, n)?;
        let dmn = self.reg.dcc(m, n)?;
        if dkm <= DEGENERATE_EPS {
            return None;
        }
        let xn = (dkn * dkn + dkm * dkm - dmn * dmn) / (2.0 * dkm);
        let yn = (dkn * dkn - xn * xn).max(0.0).sqrt();
        if yn <= DEGENERATE_EPS {
            return None;
        }
        let xf = (dk * dk + dkm * dkm - dm * dm) / (2.0 * dkm);
        let yf = (dk * dk - dn * dn + xn * xn + yn * yn - 2.0 * xf * xn) / (2.0 * yn);
        let zf = (dk * dk - xf * xf - yf * yf).max(0.0).sqrt();
        Some(Embed3 {
            k,
            m,
            n,
            dkm,
            xn,
            yn,
            xf,
            yf,
            zf,
        })
    }

    fn bound5(&self, e: &Embed3, id: ClusterId) -> Option<f64> {
        let dki = self.reg.dcc(e.k, id)?;
        let dmi = self.reg.dcc(e.m, id)?;
        let dni = self.reg.dcc(e.n, id)?;
        let xi = (dki * dki + e.dkm * e.dkm - dmi * dmi) / (2.0 * e.dkm);
        let yi = (dki * dki - dni * dni + e.xn * e.xn + e.yn * e.yn - 2.0 * xi * e.xn)
            / (2.0 * e.yn);
        let ri = (dki * dki - xi * xi - yi * yi).max(0.0).sqrt();
        let dx = e.xf - xi;
        let dy = e.yf - yi;
        let dz = e.zf - ri;
        Some((dx * dx + dy * dy + dz * dz).sqrt())
    }
}
