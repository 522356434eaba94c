#![warn(missing_docs)]
//! Result files. Every file is gated by its option; a failure to write
//! one file is logged and the rest are still attempted.

use std::{
    fs::{self, File},
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use super::options::ClusterOptions;
use crate::clustering::history::History;
use crate::clustering::registry::{ClusterState, Registry};
use crate::clustering::scandist::ScanSummary;
use crate::clustering::telemetry::RunStats;
use crate::source::FrameSource;

fn try_write<F>(path: &Path, write: F)
where
    F: FnOnce(&mut BufWriter<File>) -> io::Result<()>,
{
    let result = File::create(path).and_then(|file| {
        let mut out = BufWriter::new(file);
        write(&mut out)?;
        out.flush()
    });
    if let Err(e) = result {
        log::warn!("failed to write {}: {}", path.display(), e);
    }
}

fn save_gray_png(path: &Path, data: &[f64], width: u32, height: u32) {
    let pixels: Vec<u8> = data.iter().map(|v| v.clamp(0.0, 255.0) as u8).collect();
    match image::GrayImage::from_raw(width, height, pixels) {
        Some(buffer) => {
            if let Err(e) = buffer.save(path) {
                log::warn!("failed to write {}: {}", path.display(), e);
            }
        }
        None => log::warn!(
            "failed to write {}: data does not fill {}x{}",
            path.display(),
            width,
            height
        ),
    }
}

/// The `<input-stem>.clustered.txt` path inside the output directory.
pub fn clustered_file_path(opts: &ClusterOptions, out_dir: &Path) -> PathBuf {
    let input = opts.input.as_deref().unwrap_or(Path::new("stream"));
    let name = input
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("stream");
    let stem = name.strip_suffix(".txt").unwrap_or(name);
    out_dir.join(format!("{}.clustered.txt", stem))
}

/// Write the scan pre-pass percentiles to `scandist.txt`.
pub fn write_scan_summary(out_dir: &Path, summary: &ScanSummary) {
    try_write(&out_dir.join("scandist.txt"), |out| {
        writeln!(out, "pairs {}", summary.pairs)?;
        writeln!(out, "min {:.6}", summary.min)?;
        writeln!(out, "p20 {:.6}", summary.p20)?;
        writeln!(out, "median {:.6}", summary.median)?;
        writeln!(out, "p80 {:.6}", summary.p80)?;
        writeln!(out, "max {:.6}", summary.max)
    });
}

fn member_counts(reg: &Registry, history: &History) -> Vec<u64> {
    let mut counts = vec![0u64; reg.len()];
    for &c in &history.assignments {
        if c >= 0 && (c as usize) < counts.len() {
            counts[c as usize] += 1;
        }
    }
    counts
}

/// Write every enabled result file into the output directory.
pub fn write_results(
    opts: &ClusterOptions,
    rlim: f64,
    reg: &Registry,
    history: &History,
    stats: &RunStats,
    source: &mut dyn FrameSource,
) {
    let out_dir = opts.output_dir();
    let counts = member_counts(reg, history);

    if opts.out_membership {
        log::info!("writing frame_membership.txt");
        try_write(&out_dir.join("frame_membership.txt"), |out| {
            for (frame, c) in history.assignments.iter().enumerate() {
                writeln!(out, "{} {}", frame, c)?;
            }
            Ok(())
        });
    }

    if opts.out_dcc {
        log::info!("writing dcc.txt");
        try_write(&out_dir.join("dcc.txt"), |out| {
            let live: Vec<u32> = reg.live_ids().collect();
            for (n, &i) in live.iter().enumerate() {
                for &j in live.iter().skip(n) {
                    if let Some(d) = reg.dcc(i, j) {
                        writeln!(out, "{} {} {:.6}", i, j, d)?;
                    }
                }
            }
            Ok(())
        });
    }

    if opts.out_tm {
        log::info!("writing transition_matrix.txt");
        try_write(&out_dir.join("transition_matrix.txt"), |out| {
            for (prev, curr, count) in history.tmatrix.entries_sorted() {
                writeln!(out, "{} {} {}", prev, curr, count)?;
            }
            Ok(())
        });
    }

    if opts.out_counts {
        log::info!("writing cluster_counts.txt");
        try_write(&out_dir.join("cluster_counts.txt"), |out| {
            for (c, n) in counts.iter().enumerate() {
                writeln!(out, "Cluster {}: {} frames", c, n)?;
            }
            Ok(())
        });
    }

    if opts.out_anchors {
        log::info!("writing anchors");
        if opts.pngout {
            if let Some((width, height)) = source.shape() {
                for cluster in reg.iter() {
                    let path = out_dir.join(format!("anchor_{:04}.png", cluster.id));
                    save_gray_png(&path, &cluster.anchor, width, height);
                }
            } else {
                log::warn!("anchors: no frame shape known, skipping PNG output");
            }
        } else {
            try_write(&out_dir.join("anchors.txt"), |out| {
                for cluster in reg.iter() {
                    for v in &cluster.anchor {
                        write!(out, "{:.6} ", v)?;
                    }
                    writeln!(out)?;
                }
                Ok(())
            });
        }
    }

    if opts.out_discarded {
        log::info!("writing discarded_frames.txt");
        try_write(&out_dir.join("discarded_frames.txt"), |out| {
            for (frame, &c) in history.assignments.iter().enumerate() {
                if c >= 0 && reg.cluster(c as u32).state == ClusterState::Discarded {
                    writeln!(out, "{}", frame)?;
                }
            }
            Ok(())
        });
    }

    if opts.out_clusters {
        let active = counts.iter().filter(|&&n| n > 0).count();
        log::info!("writing cluster files ({} files)", active);
        write_cluster_dumps(opts, reg, history, &counts, source, &out_dir);
    }

    if opts.avg {
        log::info!("writing average cluster frames");
        write_averages(opts, reg, history, &counts, source, &out_dir);
    }

    if opts.out_clustered {
        log::info!("writing clustered output file");
        write_clustered(opts, rlim, reg, history, stats, source, &out_dir);
    }
}

fn write_cluster_dumps(
    opts: &ClusterOptions,
    reg: &Registry,
    history: &History,
    counts: &[u64],
    source: &mut dyn FrameSource,
    out_dir: &Path,
) {
    for cluster in reg.iter() {
        let c = cluster.id;
        if counts[c as usize] == 0 {
            continue;
        }
        let members = history
            .assignments
            .iter()
            .enumerate()
            .filter(|(_, &a)| a == c as i64);
        if opts.pngout {
            let Some((width, height)) = source.shape() else {
                log::warn!("cluster dumps: no frame shape known, skipping PNG output");
                return;
            };
            let dir = out_dir.join(format!("cluster_{:04}", c));
            if let Err(e) = fs::create_dir_all(&dir) {
                log::warn!("failed to create {}: {}", dir.display(), e);
                continue;
            }
            for (frame, _) in members {
                match source.frame_at(frame as u64) {
                    Ok(Some(f)) => {
                        let path = dir.join(format!("frame{:05}.png", frame));
                        save_gray_png(&path, &f.data, width, height);
                    }
                    _ => log::warn!("could not re-read frame {}", frame),
                }
            }
        } else {
            let path = out_dir.join(format!("cluster_{}.txt", c));
            try_write(&path, |out| {
                for (frame, _) in members {
                    if let Ok(Some(f)) = source.frame_at(frame as u64) {
                        for v in &f.data {
                            write!(out, "{:.6} ", v)?;
                        }
                        writeln!(out)?;
                    }
                }
                Ok(())
            });
        }
    }
}

fn write_averages(
    opts: &ClusterOptions,
    reg: &Registry,
    history: &History,
    counts: &[u64],
    source: &mut dyn FrameSource,
    out_dir: &Path,
) {
    let Some(dim) = source.dim() else {
        log::warn!("averages: no frame dimension known, skipping");
        return;
    };
    let mut averages: Vec<Option<Vec<f64>>> = Vec::with_capacity(reg.len());
    for cluster in reg.iter() {
        let c = cluster.id;
        if counts[c as usize] == 0 {
            averages.push(None);
            continue;
        }
        let mut acc = vec![0.0f64; dim];
        for (frame, &a) in history.assignments.iter().enumerate() {
            if a != c as i64 {
                continue;
            }
            if let Ok(Some(f)) = source.frame_at(frame as u64) {
                for (slot, v) in acc.iter_mut().zip(f.data.iter()) {
                    *slot += v;
                }
            }
        }
        let n = counts[c as usize] as f64;
        acc.iter_mut().for_each(|v| *v /= n);
        averages.push(Some(acc));
    }
    if opts.pngout {
        let Some((width, height)) = source.shape() else {
            log::warn!("averages: no frame shape known, skipping PNG output");
            return;
        };
        for (c, avg) in averages.iter().enumerate() {
            if let Some(avg) = avg {
                let path = out_dir.join(format!("average_{:04}.png", c));
                save_gray_png(&path, avg, width, height);
            }
        }
    } else {
        try_write(&out_dir.join("average.txt"), |out| {
            for avg in &averages {
                match avg {
                    Some(avg) => {
                        for v in avg {
                            write!(out, "{:.6} ", v)?;
                        }
                    }
                    None => {
                        for _ in 0..dim {
                            write!(out, "0.0 ")?;
                        }
                    }
                }
                writeln!(out)?;
            }
            Ok(())
        });
    }
}

fn write_clustered(
    opts: &ClusterOptions,
    rlim: f64,
    reg: &Registry,
    history: &History,
    stats: &RunStats,
    source: &mut dyn FrameSource,
    out_dir: &Path,
) {
    let path = clustered_file_path(opts, out_dir);
    try_write(&path, |out| {
        writeln!(out, "# Parameters:")?;
        writeln!(out, "# rlim {:.6}", rlim)?;
        writeln!(out, "# dprob {:.6}", opts.dprob)?;
        writeln!(out, "# maxcl {}", opts.maxcl)?;
        writeln!(out, "# maxim {}", opts.maxim)?;
        writeln!(out, "# gprob_mode {}", opts.gprob as u8)?;
        writeln!(out, "# fmatcha {:.2}", opts.fmatch_a)?;
        writeln!(out, "# fmatchb {:.2}", opts.fmatch_b)?;
        writeln!(out, "# Stats:")?;
        writeln!(out, "# Total Clusters {}", reg.len())?;
        writeln!(out, "# Total Distance Computations {}", stats.dist_calls)?;
        writeln!(out, "# Clusters Pruned {}", stats.pruned)?;
        let avg_dist = if stats.frames > 0 {
            stats.dist_calls as f64 / stats.frames as f64
        } else {
            0.0
        };
        writeln!(out, "# Avg Dist/Frame {:.2}", avg_dist)?;
        for s in 0..stats.max_steps() {
            if let Some(frac) = stats.step_fraction(s) {
                writeln!(out, "# Pruning Step {}: {:.4}", s, frac)?;
            }
        }
        let mut seen = vec![false; reg.len()];
        for (frame, &c) in history.assignments.iter().enumerate() {
            if c >= 0 && !seen[c as usize] {
                seen[c as usize] = true;
                write!(out, "# NEWCLUSTER {} {} ", c, frame)?;
                for v in &reg.cluster(c as u32).anchor {
                    write!(out, "{:.6} ", v)?;
                }
                writeln!(out)?;
            }
            if let Ok(Some(f)) = source.frame_at(frame as u64) {
                write!(out, "{} {} ", frame, c)?;
                for v in &f.data {
                    write!(out, "{:.6} ", v)?;
                }
                writeln!(out)?;
            }
        }
        Ok(())
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clustering::engine::{Engine, EngineConfig};
    use crate::source::text::TextSource;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    fn run_on(contents: &str, config: EngineConfig) -> (Engine, TextSource, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("frames.txt");
        let mut file = File::create(&input).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        drop(file);
        let mut source = TextSource::open(&input).unwrap();
        let mut engine = Engine::new(config).unwrap();
        engine.run(&mut source).unwrap();
        (engine, source, dir)
    }

    fn options_into(dir: &Path) -> ClusterOptions {
        let mut opts = ClusterOptions::default();
        opts.input = Some(PathBuf::from("frames.txt"));
        opts.outdir = Some(dir.to_path_buf());
        opts
    }

    #[test]
    fn membership_and_dcc_match_the_run() {
        let (engine, mut source, dir) = run_on("0 0\n0.1 0\n5 0\n", EngineConfig::default());
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let opts = options_into(&out);
        write_results(
            &opts,
            1.0,
            engine.registry(),
            engine.history(),
            engine.stats(),
            &mut source,
        );
        let membership = fs::read_to_string(out.join("frame_membership.txt")).unwrap();
        assert_eq!(membership, "0 0\n1 0\n2 1\n");
        let dcc = fs::read_to_string(out.join("dcc.txt")).unwrap();
        assert_eq!(dcc, "0 0 0.000000\n0 1 5.000000\n1 1 0.000000\n");
    }

    #[test]
    fn clustered_dump_marks_new_clusters() {
        let (engine, mut source, dir) = run_on("0 0\n5 0\n0.2 0\n", EngineConfig::default());
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let mut opts = options_into(&out);
        opts.out_clustered = true;
        write_results(
            &opts,
            1.0,
            engine.registry(),
            engine.history(),
            engine.stats(),
            &mut source,
        );
        let dump = fs::read_to_string(out.join("frames.clustered.txt")).unwrap();
        assert!(dump.contains("# NEWCLUSTER 0 0 0.000000 0.000000"));
        assert!(dump.contains("# NEWCLUSTER 1 1 5.000000 0.000000"));
        assert!(dump.contains("\n2 0 0.200000 0.000000"));
        assert!(dump.contains("# Total Clusters 2"));
    }

    #[test]
    fn deterministic_membership_bytes() {
        let contents = "0 0\n0.1 0\n5 0\n5.1 0\n0.2 0\n";
        let mut outputs = Vec::new();
        for _ in 0..2 {
            let (engine, mut source, dir) = run_on(contents, EngineConfig::default());
            let out = dir.path().join("out");
            fs::create_dir_all(&out).unwrap();
            let opts = options_into(&out);
            write_results(
                &opts,
                1.0,
                engine.registry(),
                engine.history(),
                engine.stats(),
                &mut source,
            );
            outputs.push(fs::read(out.join("frame_membership.txt")).unwrap());
        }
        assert_eq!(outputs[0], outputs[1]);
    }

    #[test]
    fn discarded_frames_follow_evicted_clusters() {
        use crate::clustering::admission::CapacityStrategy;
        let config = EngineConfig {
            maxcl: 2,
            strategy: CapacityStrategy::Discard,
            discard_frac: 1.0,
            ..EngineConfig::default()
        };
        let (engine, mut source, dir) = run_on("0 0\n10 0\n20 0\n", config);
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let mut opts = options_into(&out);
        opts.out_discarded = true;
        write_results(
            &opts,
            1.0,
            engine.registry(),
            engine.history(),
            engine.stats(),
            &mut source,
        );
        // Admitting the third anchor evicted cluster 0; its lone member
        // is frame 0.
        let discarded = fs::read_to_string(out.join("discarded_frames.txt")).unwrap();
        assert_eq!(discarded, "0\n");
        let membership = fs::read_to_string(out.join("frame_membership.txt")).unwrap();
        assert_eq!(membership, "0 0\n1 1\n2 2\n");
    }

    #[test]
    fn averages_and_cluster_dumps_reread_the_source() {
        let (engine, mut source, dir) = run_on("0 0\n0.2 0\n8 0\n", EngineConfig::default());
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        let mut opts = options_into(&out);
        opts.avg = true;
        opts.out_clusters = true;
        write_results(
            &opts,
            1.0,
            engine.registry(),
            engine.history(),
            engine.stats(),
            &mut source,
        );
        let avg = fs::read_to_string(out.join("average.txt")).unwrap();
        assert_eq!(avg, "0.100000 0.000000 \n8.000000 0.000000 \n");
        let members = fs::read_to_string(out.join("cluster_0.txt")).unwrap();
        assert_eq!(members, "0.000000 0.000000 \n0.200000 0.000000 \n");
    }
}
