#![warn(missing_docs)]
//! The streaming control loop: score, prune, admit, account.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::admission::{self, AdmissionParams, CapacityStrategy};
use super::errors::ClusterError;
use super::history::History;
use super::pruning::{PruneParams, Pruner};
use super::registry::Registry;
use super::scoring::{self, PredParams, ScoreParams};
use super::telemetry::RunStats;
use crate::source::{Frame, FrameSource};

/// Everything the engine needs to know, frozen at startup.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// The admission radius R.
    pub rlim: f64,
    /// Probability bump per assignment.
    pub dprob: f64,
    /// Live-cluster ceiling.
    pub maxcl: usize,
    /// Maximum frames to process.
    pub maxim: u64,
    /// Visitor-ring length per cluster.
    pub maxvis: usize,
    /// Worker count for the bound computations.
    pub ncpu: usize,
    /// Geometric-similarity boost.
    pub gprob: bool,
    /// gprob reward at a perfect match.
    pub fmatch_a: f64,
    /// gprob reward at the 2R limit.
    pub fmatch_b: f64,
    /// 4-point pruning.
    pub te4: bool,
    /// 5-point pruning.
    pub te5: bool,
    /// Transition-matrix mixing coefficient.
    pub tm_coeff: f64,
    /// Pattern prediction.
    pub pred: Option<PredParams>,
    /// Capacity policy.
    pub strategy: CapacityStrategy,
    /// Oldest fraction eligible for discard.
    pub discard_frac: f64,
    /// Periodic progress logging.
    pub progress: bool,
    /// Stream every measured distance to the distall sink.
    pub distall: bool,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            rlim: 1.0,
            dprob: 0.01,
            maxcl: 1000,
            maxim: 100_000,
            maxvis: 1000,
            ncpu: 1,
            gprob: false,
            fmatch_a: 2.0,
            fmatch_b: 0.5,
            te4: false,
            te5: false,
            tm_coeff: 0.0,
            pred: None,
            strategy: CapacityStrategy::Stop,
            discard_frac: 0.5,
            progress: false,
            distall: false,
        }
    }
}

const PROGRESS_EVERY: u64 = 1000;

/// The clustering engine: owns the registry, history, telemetry, and the
/// worker pool. One instance per run.
pub struct Engine {
    config: EngineConfig,
    registry: Registry,
    history: History,
    stats: RunStats,
    pool: Option<rayon::ThreadPool>,
    stop: Arc<AtomicBool>,
    distall_sink: Option<Box<dyn Write + Send>>,
}

impl Engine {
    /// Build an engine; spawns the worker pool when `ncpu > 1`.
    pub fn new(config: EngineConfig) -> Result<Engine, ClusterError> {
        let pool = if config.ncpu > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.ncpu)
                .build()
                .map_err(|e| ClusterError::Workers(e.to_string()))?;
            Some(pool)
        } else {
            None
        };
        let seq_cap = config
            .pred
            .map(|p| p.len + p.horizon)
            .unwrap_or(0);
        Ok(Engine {
            registry: Registry::new(config.maxcl, config.maxvis),
            history: History::new(seq_cap),
            stats: RunStats::default(),
            pool,
            stop: Arc::new(AtomicBool::new(false)),
            distall_sink: None,
            config,
        })
    }

    /// The flag an interrupt handler should set; the engine checks it
    /// between frames, never mid-frame.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Stream `<frame> <cluster> <distance>` lines for every measured
    /// distance into `sink`.
    pub fn set_distall_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.distall_sink = Some(sink);
    }

    /// The cluster registry.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// The assignment log, transition matrix, and frame records.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Run counters and histograms.
    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    /// Mutable counters, for the caller to stamp phase timings in.
    pub fn stats_mut(&mut self) -> &mut RunStats {
        &mut self.stats
    }

    fn score_params(&self) -> ScoreParams {
        ScoreParams {
            tm_coeff: self.config.tm_coeff,
            gprob: self.config.gprob,
            fmatch_a: self.config.fmatch_a,
            fmatch_b: self.config.fmatch_b,
            rlim: self.config.rlim,
            pred: self.config.pred,
        }
    }

    fn prune_params(&self) -> PruneParams {
        let needs_exact =
            self.config.gprob || self.config.te4 || self.config.te5 || self.config.distall;
        PruneParams {
            rlim: self.config.rlim,
            te4: self.config.te4,
            te5: self.config.te5,
            exact: needs_exact,
        }
    }

    /// Consume the source until EOF, `maxim`, an interrupt, or a fatal
    /// error. Partial state survives an `Err` so outputs can still be
    /// flushed.
    pub fn run(&mut self, source: &mut dyn FrameSource) -> Result<(), ClusterError> {
        loop {
            if self.stats.frames >= self.config.maxim {
                log::info!("frame limit {} reached", self.config.maxim);
                break;
            }
            if self.stop.load(Ordering::Relaxed) {
                log::info!("interrupt: stopping after {} frames", self.stats.frames);
                self.stats.interrupted = true;
                break;
            }
            let Some(frame) = source.next_frame()? else {
                break;
            };
            self.step(&frame)?;
        }
        Ok(())
    }

    /// One frame through the whole pipeline.
    pub fn step(&mut self, frame: &Frame) -> Result<(), ClusterError> {
        let score_params = self.score_params();
        let candidates = scoring::order_candidates(&self.registry, &self.history, &score_params);
        let pruner = Pruner::new(
            &self.registry,
            &self.history,
            self.prune_params(),
            score_params,
            self.pool.as_ref(),
        );
        let mut outcome = pruner.run(&frame.data, candidates);
        if let Some(sink) = self.distall_sink.as_mut() {
            let mut failed = false;
            for (cluster, measurement) in &outcome.record.measured {
                if let Some(d) = measurement.exact() {
                    if writeln!(sink, "{} {} {:.6}", frame.index, cluster, d).is_err() {
                        failed = true;
                        break;
                    }
                }
            }
            if failed {
                log::warn!("distall sink failed; disabling the distance dump");
                self.distall_sink = None;
            }
        }
        let record = std::mem::take(&mut outcome.record);
        let admitted = admission::admit(
            &mut self.registry,
            &mut self.history,
            frame,
            outcome.chosen,
            record,
            &AdmissionParams {
                dprob: self.config.dprob,
                strategy: self.config.strategy,
                discard_frac: self.config.discard_frac,
            },
        )?;
        self.stats.record_frame(&outcome, &admitted);
        if self.config.progress && self.stats.frames % PROGRESS_EVERY == 0 {
            log::info!(
                "{} frames, {} live clusters, {} distance calls, {} pruned",
                self.stats.frames,
                self.registry.live_count(),
                self.stats.dist_calls,
                self.stats.pruned
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::registry::ClusterState;
    use crate::metric::algs;
    use crate::source::errors::SourceError;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// In-memory source for scenario tests.
    struct VecSource {
        frames: Vec<Vec<f64>>,
        next: usize,
    }

    impl VecSource {
        fn new(frames: Vec<Vec<f64>>) -> VecSource {
            VecSource { frames, next: 0 }
        }
    }

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Result<Option<Frame>, SourceError> {
            let Some(data) = self.frames.get(self.next) else {
                return Ok(None);
            };
            let frame = Frame {
                index: self.next as u64,
                data: data.clone(),
            };
            self.next += 1;
            Ok(Some(frame))
        }

        fn frame_at(&mut self, index: u64) -> Result<Option<Frame>, SourceError> {
            Ok(self.frames.get(index as usize).map(|data| Frame {
                index,
                data: data.clone(),
            }))
        }

        fn dim(&self) -> Option<usize> {
            self.frames.first().map(|f| f.len())
        }

        fn shape(&self) -> Option<(u32, u32)> {
            self.dim().map(|d| (d as u32, 1))
        }

        fn reset(&mut self) -> Result<(), SourceError> {
            self.next = 0;
            Ok(())
        }
    }

    fn run_engine(config: EngineConfig, frames: Vec<Vec<f64>>) -> Engine {
        let mut engine = Engine::new(config).unwrap();
        let mut source = VecSource::new(frames);
        engine.run(&mut source).unwrap();
        engine
    }

    #[test]
    fn two_separated_points_make_two_clusters() {
        let engine = run_engine(
            EngineConfig::default(),
            vec![
                vec![0.0, 0.0, 0.0],
                vec![0.0, 0.0, 0.0],
                vec![10.0, 10.0, 10.0],
            ],
        );
        assert_eq!(engine.history().assignments, vec![0, 0, 1]);
        assert_eq!(engine.registry().len(), 2);
    }

    #[test]
    fn streak_on_a_line_splits_at_the_radius() {
        let frames = (0..6).map(|i| vec![i as f64 * 0.5, 0.0, 0.0]).collect();
        let engine = run_engine(EngineConfig::default(), frames);
        assert_eq!(engine.history().assignments, vec![0, 0, 0, 1, 1, 1]);
    }

    fn isolated_frames(n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![i as f64 * 100.0, 0.0]).collect()
    }

    #[test]
    fn capacity_stop_halts_at_the_eleventh_point() {
        let config = EngineConfig {
            maxcl: 10,
            ..EngineConfig::default()
        };
        let mut engine = Engine::new(config).unwrap();
        let mut source = VecSource::new(isolated_frames(100));
        let result = engine.run(&mut source);
        assert!(matches!(
            result,
            Err(ClusterError::Capacity {
                frame: 10,
                maxcl: 10
            })
        ));
        assert_eq!(engine.registry().len(), 10);
        assert_eq!(engine.history().assignments.len(), 10);
    }

    #[test]
    fn capacity_discard_keeps_processing_under_the_ceiling() {
        let config = EngineConfig {
            maxcl: 10,
            strategy: CapacityStrategy::Discard,
            discard_frac: 1.0,
            ..EngineConfig::default()
        };
        let engine = run_engine(config, isolated_frames(100));
        assert_eq!(engine.history().assignments.len(), 100);
        assert_eq!(engine.registry().live_count(), 10);
        assert_eq!(engine.stats().discards, 90);
        let discarded: Vec<u64> = engine
            .registry()
            .iter()
            .filter(|c| c.state == ClusterState::Discarded)
            .map(|c| c.birth_index)
            .collect();
        assert_eq!(discarded.len(), 90);
    }

    #[test]
    fn capacity_merge_collapses_the_closest_anchors() {
        let config = EngineConfig {
            maxcl: 3,
            strategy: CapacityStrategy::Merge,
            ..EngineConfig::default()
        };
        // Anchors at 0, 10, 12, then 50: 10 and 12 are closest.
        let engine = run_engine(
            config,
            vec![vec![0.0], vec![10.0], vec![12.0], vec![50.0]],
        );
        assert_eq!(engine.history().assignments, vec![0, 1, 2, 3]);
        assert_eq!(engine.stats().merges, 1);
        assert_eq!(engine.registry().cluster(2).state, ClusterState::Merged(1));
        assert_eq!(engine.registry().live_count(), 3);
    }

    #[test]
    fn recency_probability_pulls_the_busy_cluster_forward() {
        let mut frames = vec![vec![0.0, 0.0], vec![10.0, 0.0]];
        for i in 0..98 {
            frames.push(vec![(i % 5) as f64 * 0.01, 0.0]);
        }
        let config = EngineConfig {
            rlim: 0.5,
            dprob: 0.05,
            ..EngineConfig::default()
        };
        let engine = run_engine(config, frames);
        assert_eq!(engine.registry().len(), 2);
        assert!(engine.registry().probability(0) > 0.9);
        let ordered =
            scoring::order_candidates(engine.registry(), engine.history(), &engine.score_params());
        assert_eq!(ordered[0].id, 0);
    }

    #[test]
    fn pattern_prediction_reaches_one_call_per_frame() {
        let letters = [vec![0.0], vec![10.0], vec![20.0]];
        let frames: Vec<Vec<f64>> = (0..30).map(|i| letters[i % 3].clone()).collect();
        let config = EngineConfig {
            pred: Some(PredParams {
                len: 3,
                horizon: 50,
                n: 1,
            }),
            ..EngineConfig::default()
        };
        let engine = run_engine(config, frames);
        assert_eq!(engine.registry().len(), 3);
        for f in 6..30 {
            assert_eq!(
                engine.history().records[f].measured.len(),
                1,
                "frame {} took more than one distance call",
                f
            );
        }
    }

    fn drifting_frames(n: usize, dim: usize) -> Vec<Vec<f64>> {
        let mut rng = StdRng::seed_from_u64(42);
        let centers: Vec<Vec<f64>> = (0..5)
            .map(|_| (0..dim).map(|_| rng.gen_range(-50.0..50.0)).collect())
            .collect();
        (0..n)
            .map(|i| {
                let center = &centers[i % centers.len()];
                center
                    .iter()
                    .map(|c| c + rng.gen_range(-0.1..0.1))
                    .collect()
            })
            .collect()
    }

    #[test]
    fn within_r_contract_holds_for_every_assignment() {
        let frames = drifting_frames(80, 4);
        let config = EngineConfig {
            rlim: 0.5,
            ..EngineConfig::default()
        };
        let engine = run_engine(config, frames.clone());
        assert_eq!(engine.history().assignments.len(), frames.len());
        for (f, &c) in engine.history().assignments.iter().enumerate() {
            let anchor = &engine.registry().cluster(c as u32).anchor;
            assert!(algs::dist(&frames[f], anchor) <= 0.5);
        }
        assert!((engine.registry().probability_sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bound_variants_do_not_change_assignments() {
        let frames = drifting_frames(80, 6);
        let mut runs = Vec::new();
        for (te4, te5) in [(false, false), (true, false), (false, true), (true, true)] {
            let config = EngineConfig {
                rlim: 0.5,
                te4,
                te5,
                ..EngineConfig::default()
            };
            let engine = run_engine(config, frames.clone());
            runs.push(engine.history().assignments.clone());
        }
        assert_eq!(runs[0], runs[1]);
        assert_eq!(runs[0], runs[2]);
        assert_eq!(runs[0], runs[3]);
    }

    #[test]
    fn worker_count_does_not_change_assignments() {
        let frames = drifting_frames(60, 8);
        let serial = run_engine(
            EngineConfig {
                rlim: 0.5,
                te4: true,
                ..EngineConfig::default()
            },
            frames.clone(),
        );
        let parallel = run_engine(
            EngineConfig {
                rlim: 0.5,
                te4: true,
                ncpu: 4,
                ..EngineConfig::default()
            },
            frames,
        );
        assert_eq!(serial.history().assignments, parallel.history().assignments);
        assert_eq!(serial.stats().dist_calls, parallel.stats().dist_calls);
    }

    #[test]
    fn maxim_caps_the_run() {
        let config = EngineConfig {
            maxim: 3,
            ..EngineConfig::default()
        };
        let engine = run_engine(config, isolated_frames(10));
        assert_eq!(engine.history().assignments.len(), 3);
    }

    #[test]
    fn interrupt_finishes_the_current_frame_only() {
        let mut engine = Engine::new(EngineConfig::default()).unwrap();
        engine.stop_flag().store(true, Ordering::Relaxed);
        let mut source = VecSource::new(isolated_frames(5));
        engine.run(&mut source).unwrap();
        assert_eq!(engine.history().assignments.len(), 0);
        assert!(engine.stats().interrupted);
    }
}
