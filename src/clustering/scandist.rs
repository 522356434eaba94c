#![warn(missing_docs)]
//! Scan-distance pre-pass: estimating a sensible R from the empirical
//! distribution of inter-frame distances before clustering.

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::fmt;

use super::errors::ClusterError;
use crate::metric::algs;
use crate::source::FrameSource;

/// Which frame pairs the scan measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairMode {
    /// Consecutive frames, in stream order.
    Consecutive,
    /// Seeded random pairs over the whole stream.
    Random {
        /// RNG seed; the same seed reproduces the same pairs.
        seed: u64,
    },
}

/// Percentiles of the sampled pair-distance distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanSummary {
    /// Number of pairs measured.
    pub pairs: usize,
    /// Smallest distance seen.
    pub min: f64,
    /// 20th percentile.
    pub p20: f64,
    /// Median; the auto-R candidate.
    pub median: f64,
    /// 80th percentile.
    pub p80: f64,
    /// Largest distance seen.
    pub max: f64,
}

impl fmt::Display for ScanSummary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "pairs {}  min {:.6}  20% {:.6}  median {:.6}  80% {:.6}  max {:.6}",
            self.pairs, self.min, self.p20, self.median, self.p80, self.max
        )
    }
}

fn percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx]
}

fn summarize(mut dists: Vec<f64>) -> Result<ScanSummary, ClusterError> {
    if dists.is_empty() {
        return Err(ClusterError::EmptyScan);
    }
    dists.sort_unstable_by(|a, b| a.partial_cmp(b).expect("distances are finite"));
    Ok(ScanSummary {
        pairs: dists.len(),
        min: dists[0],
        p20: percentile(&dists, 0.2),
        median: percentile(&dists, 0.5),
        p80: percentile(&dists, 0.8),
        max: dists[dists.len() - 1],
    })
}

/// Measure up to `max_pairs` pair distances and summarize their
/// distribution. The source is left wherever the scan stopped; callers
/// reset it before clustering.
pub fn scan_distances(
    source: &mut dyn FrameSource,
    max_pairs: usize,
    mode: PairMode,
) -> Result<ScanSummary, ClusterError> {
    match mode {
        PairMode::Consecutive => {
            let mut dists = Vec::new();
            let Some(mut prev) = source.next_frame()? else {
                return Err(ClusterError::EmptyScan);
            };
            while dists.len() < max_pairs {
                let Some(frame) = source.next_frame()? else {
                    break;
                };
                dists.push(algs::dist(&prev.data, &frame.data));
                prev = frame;
            }
            summarize(dists)
        }
        PairMode::Random { seed } => {
            // One streaming pass to learn the frame count, then seeded
            // random access.
            let mut count: u64 = 0;
            while source.next_frame()?.is_some() {
                count += 1;
            }
            if count < 2 {
                return Err(ClusterError::EmptyScan);
            }
            let mut rng = StdRng::seed_from_u64(seed);
            let mut dists = Vec::with_capacity(max_pairs);
            while dists.len() < max_pairs {
                let i = rng.gen_range(0..count);
                let j = rng.gen_range(0..count);
                if i == j {
                    continue;
                }
                let a = source.frame_at(i)?.ok_or(ClusterError::EmptyScan)?;
                let b = source.frame_at(j)?.ok_or(ClusterError::EmptyScan)?;
                dists.push(algs::dist(&a.data, &b.data));
            }
            summarize(dists)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::text::TextSource;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn source_of(contents: &str) -> TextSource {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        TextSource::open(file.path()).unwrap()
    }

    #[test]
    fn consecutive_pairs_on_a_line() {
        // Frames at 0, 1, 3, 6: consecutive gaps 1, 2, 3.
        let mut source = source_of("0\n1\n3\n6\n");
        let summary = scan_distances(&mut source, 100, PairMode::Consecutive).unwrap();
        assert_eq!(summary.pairs, 3);
        assert_eq!(summary.min, 1.0);
        assert_eq!(summary.median, 2.0);
        assert_eq!(summary.max, 3.0);
    }

    #[test]
    fn pair_budget_is_respected() {
        let mut source = source_of("0\n1\n2\n3\n4\n5\n");
        let summary = scan_distances(&mut source, 2, PairMode::Consecutive).unwrap();
        assert_eq!(summary.pairs, 2);
    }

    #[test]
    fn random_pairs_are_reproducible() {
        let summary_a = scan_distances(
            &mut source_of("0\n5\n20\n80\n"),
            16,
            PairMode::Random { seed: 7 },
        )
        .unwrap();
        let summary_b = scan_distances(
            &mut source_of("0\n5\n20\n80\n"),
            16,
            PairMode::Random { seed: 7 },
        )
        .unwrap();
        assert_eq!(summary_a, summary_b);
        assert_eq!(summary_a.pairs, 16);
    }

    #[test]
    fn single_frame_cannot_be_scanned() {
        let mut source = source_of("1 2 3\n");
        assert!(matches!(
            scan_distances(&mut source, 10, PairMode::Consecutive),
            Err(ClusterError::EmptyScan)
        ));
    }
}
