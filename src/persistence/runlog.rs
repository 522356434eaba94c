#![warn(missing_docs)]
//! The `cluster_run.log` summary: command line, timings, every
//! parameter, run statistics, and the distance-call histogram.

use chrono::{DateTime, Local};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
};

use super::options::{ClusterOptions, RlimSpec};
use super::outputs::clustered_file_path;
use crate::clustering::registry::Registry;
use crate::clustering::telemetry::{self, RunStats};

fn onoff(v: bool) -> u8 {
    v as u8
}

/// Write the run summary. Failures are logged like any other output
/// failure.
pub fn write_run_log(
    opts: &ClusterOptions,
    rlim: f64,
    reg: &Registry,
    stats: &RunStats,
    cmdline: &str,
    start: DateTime<Local>,
) {
    let out_dir = opts.output_dir();
    let path = out_dir.join("cluster_run.log");
    let result = File::create(&path).and_then(|file| {
        let mut f = BufWriter::new(file);
        writeln!(f, "CMD: {}", cmdline)?;
        writeln!(f, "START_TIME: {}", start.format("%Y-%m-%d %H:%M:%S%.9f"))?;
        writeln!(f, "TIME_CLUSTERING_MS: {:.3}", stats.clustering_ms)?;
        writeln!(f, "TIME_OUTPUT_MS: {:.3}", stats.output_ms)?;
        writeln!(f, "OUTPUT_DIR: {}", out_dir.display())?;
        writeln!(f, "PARAM_RLIM: {:.6}", rlim)?;
        if let Some(RlimSpec::Auto(k)) = opts.rlim {
            writeln!(f, "PARAM_RLIM_AUTO_FACTOR: {:.6}", k)?;
        }
        writeln!(f, "PARAM_DPROB: {:.6}", opts.dprob)?;
        writeln!(f, "PARAM_MAXCL: {}", opts.maxcl)?;
        writeln!(f, "PARAM_MAXIM: {}", opts.maxim)?;
        writeln!(f, "PARAM_NCPU: {}", opts.ncpu)?;
        writeln!(f, "PARAM_GPROB: {}", onoff(opts.gprob))?;
        writeln!(f, "PARAM_FMATCHA: {:.6}", opts.fmatch_a)?;
        writeln!(f, "PARAM_FMATCHB: {:.6}", opts.fmatch_b)?;
        writeln!(f, "PARAM_MAXVIS: {}", opts.maxvis)?;
        match opts.pred {
            Some(p) => writeln!(f, "PARAM_PRED: {},{},{}", p.len, p.horizon, p.n)?,
            None => writeln!(f, "PARAM_PRED: 0")?,
        }
        writeln!(f, "PARAM_TE4: {}", onoff(opts.te4))?;
        writeln!(f, "PARAM_TE5: {}", onoff(opts.te5))?;
        writeln!(f, "PARAM_TM: {:.6}", opts.tm_coeff)?;
        writeln!(f, "PARAM_MAXCL_STRATEGY: {}", opts.maxcl_strategy.as_key())?;
        writeln!(f, "PARAM_DISCARD_FRAC: {:.6}", opts.discard_frac)?;
        writeln!(f, "PARAM_SCANPAIRS: {}", opts.scan_pairs)?;
        writeln!(f, "PARAM_RANDPAIRS: {}", onoff(opts.rand_pairs))?;
        writeln!(f, "PARAM_SEED: {}", opts.seed)?;
        writeln!(f, "PARAM_PROGRESS: {}", onoff(opts.progress))?;
        writeln!(f, "PARAM_AVG: {}", onoff(opts.avg))?;
        writeln!(f, "PARAM_DISTALL: {}", onoff(opts.distall))?;
        writeln!(f, "PARAM_PNGOUT: {}", onoff(opts.pngout))?;
        writeln!(f, "PARAM_DCC: {}", onoff(opts.out_dcc))?;
        writeln!(f, "PARAM_TM_OUT: {}", onoff(opts.out_tm))?;
        writeln!(f, "PARAM_ANCHORS: {}", onoff(opts.out_anchors))?;
        writeln!(f, "PARAM_COUNTS: {}", onoff(opts.out_counts))?;
        writeln!(f, "PARAM_MEMBERSHIP: {}", onoff(opts.out_membership))?;
        writeln!(f, "PARAM_DISCARDED: {}", onoff(opts.out_discarded))?;
        writeln!(f, "PARAM_CLUSTERED: {}", onoff(opts.out_clustered))?;
        writeln!(f, "PARAM_CLUSTERS: {}", onoff(opts.out_clusters))?;
        if opts.out_dcc {
            writeln!(f, "OUTPUT_FILE: {}", out_dir.join("dcc.txt").display())?;
        }
        if opts.out_tm {
            writeln!(
                f,
                "OUTPUT_FILE: {}",
                out_dir.join("transition_matrix.txt").display()
            )?;
        }
        if opts.out_anchors && !opts.pngout {
            writeln!(f, "OUTPUT_FILE: {}", out_dir.join("anchors.txt").display())?;
        }
        if opts.out_counts {
            writeln!(
                f,
                "OUTPUT_FILE: {}",
                out_dir.join("cluster_counts.txt").display()
            )?;
        }
        if opts.out_membership {
            writeln!(
                f,
                "OUTPUT_FILE: {}",
                out_dir.join("frame_membership.txt").display()
            )?;
        }
        if opts.out_discarded {
            writeln!(
                f,
                "OUTPUT_FILE: {}",
                out_dir.join("discarded_frames.txt").display()
            )?;
        }
        if opts.distall {
            writeln!(f, "OUTPUT_FILE: {}", out_dir.join("distall.txt").display())?;
        }
        if opts.out_clustered {
            writeln!(
                f,
                "CLUSTERED_FILE: {}",
                clustered_file_path(opts, &out_dir).display()
            )?;
        }
        writeln!(f, "STATS_CLUSTERS: {}", reg.live_count())?;
        writeln!(f, "STATS_CREATED: {}", stats.created)?;
        writeln!(f, "STATS_DISCARDS: {}", stats.discards)?;
        writeln!(f, "STATS_MERGES: {}", stats.merges)?;
        writeln!(f, "STATS_FRAMES: {}", stats.frames)?;
        writeln!(f, "STATS_DISTS: {}", stats.dist_calls)?;
        writeln!(f, "STATS_PRUNED: {}", stats.pruned)?;
        writeln!(f, "STATS_INTERRUPTED: {}", onoff(stats.interrupted))?;
        writeln!(f, "STATS_MAX_RSS_KB: {}", telemetry::max_rss_kb())?;
        writeln!(f, "STATS_DIST_HIST_START")?;
        for (k, frames, pruned) in stats.dist_hist() {
            writeln!(f, "{} {} {}", k, frames, pruned)?;
        }
        writeln!(f, "STATS_DIST_HIST_END")?;
        f.flush()
    });
    match result {
        Ok(()) => log::info!("log written to {}", path.display()),
        Err(e) => log::warn!("failed to write {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::admission::Admitted;
    use crate::clustering::history::FrameRecord;
    use crate::clustering::pruning::PruneOutcome;
    use std::path::PathBuf;

    #[test]
    fn run_log_contains_the_required_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut opts = ClusterOptions::default();
        opts.input = Some(PathBuf::from("frames.txt"));
        opts.outdir = Some(dir.path().to_path_buf());
        opts.rlim = Some(RlimSpec::Fixed(1.0));
        let mut reg = Registry::new(4, 8);
        reg.create(vec![0.0], 0);
        let mut stats = RunStats::default();
        stats.record_frame(
            &PruneOutcome {
                chosen: None,
                record: FrameRecord::default(),
                dist_calls: 2,
                pruned: 1,
                step_fractions: vec![0.0, 0.5],
            },
            &Admitted {
                cluster: 0,
                created: true,
                evicted: None,
                merged: None,
            },
        );
        write_run_log(&opts, 1.0, &reg, &stats, "streamclust 1.0 frames.txt", Local::now());
        let log = fs::read_to_string(dir.path().join("cluster_run.log")).unwrap();
        for key in [
            "CMD:",
            "START_TIME:",
            "TIME_CLUSTERING_MS:",
            "TIME_OUTPUT_MS:",
            "OUTPUT_DIR:",
            "PARAM_RLIM:",
            "PARAM_DPROB:",
            "PARAM_MAXCL:",
            "PARAM_MAXCL_STRATEGY: stop",
            "STATS_CLUSTERS: 1",
            "STATS_FRAMES: 1",
            "STATS_DISTS: 2",
            "STATS_PRUNED: 1",
            "STATS_MAX_RSS_KB:",
            "STATS_DIST_HIST_START",
            "STATS_DIST_HIST_END",
        ] {
            assert!(log.contains(key), "missing {} in:\n{}", key, log);
        }
        assert!(log.contains("\n2 1 1\n"));
    }
}
