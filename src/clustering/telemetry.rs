#![warn(missing_docs)]
//! Run counters and the distance-call / pruning histograms.

use super::admission::Admitted;
use super::pruning::PruneOutcome;

/// Everything the run log reports about a finished (or interrupted) run.
#[derive(Debug, Default)]
pub struct RunStats {
    /// Frames processed (and assigned).
    pub frames: u64,
    /// Metric kernel invocations.
    pub dist_calls: u64,
    /// Candidates rejected by bounds alone.
    pub pruned: u64,
    /// Clusters created.
    pub created: u64,
    /// Discard-strategy evictions.
    pub discards: u64,
    /// Merge-strategy collapses.
    pub merges: u64,
    /// True when the run ended on an interrupt.
    pub interrupted: bool,
    /// Wall-clock time of the clustering phase.
    pub clustering_ms: f64,
    /// Wall-clock time of the output phase.
    pub output_ms: f64,
    /// `dist_counts[k]` = frames that made exactly `k` distance calls.
    dist_counts: Vec<u64>,
    /// `pruned_by_calls[k]` = candidates pruned across those frames.
    pruned_by_calls: Vec<u64>,
    /// Sum of pruned fractions observed at measurement step `s`.
    pruned_fraction_sum: Vec<f64>,
    /// Frames that reached measurement step `s`.
    step_counts: Vec<u64>,
}

fn grow_to<T: Default + Clone>(v: &mut Vec<T>, len: usize) {
    if v.len() < len {
        v.resize(len, T::default());
    }
}

impl RunStats {
    /// Fold one frame's pruning outcome and admission result in.
    pub fn record_frame(&mut self, outcome: &PruneOutcome, admitted: &Admitted) {
        self.frames += 1;
        self.dist_calls += outcome.dist_calls as u64;
        self.pruned += outcome.pruned as u64;
        if admitted.created {
            self.created += 1;
        }
        if admitted.evicted.is_some() {
            self.discards += 1;
        }
        if admitted.merged.is_some() {
            self.merges += 1;
        }
        let k = outcome.dist_calls as usize;
        grow_to(&mut self.dist_counts, k + 1);
        grow_to(&mut self.pruned_by_calls, k + 1);
        self.dist_counts[k] += 1;
        self.pruned_by_calls[k] += outcome.pruned as u64;
        for (s, frac) in outcome.step_fractions.iter().enumerate() {
            grow_to(&mut self.pruned_fraction_sum, s + 1);
            grow_to(&mut self.step_counts, s + 1);
            self.pruned_fraction_sum[s] += frac;
            self.step_counts[s] += 1;
        }
    }

    /// Non-empty bins of the distance-call histogram:
    /// `(calls, frames, pruned)`.
    pub fn dist_hist(&self) -> impl Iterator<Item = (usize, u64, u64)> + '_ {
        self.dist_counts
            .iter()
            .enumerate()
            .filter(|(_, n)| **n > 0)
            .map(|(k, n)| (k, *n, self.pruned_by_calls[k]))
    }

    /// Average pruned fraction observed at measurement step `s`.
    pub fn step_fraction(&self, s: usize) -> Option<f64> {
        match self.step_counts.get(s) {
            Some(&count) if count > 0 => Some(self.pruned_fraction_sum[s] / count as f64),
            _ => None,
        }
    }

    /// Number of measurement steps any frame reached.
    pub fn max_steps(&self) -> usize {
        self.step_counts.len()
    }
}

/// Peak resident set size in kB, read from the kernel's own accounting;
/// 0 where unavailable.
#[cfg(target_os = "linux")]
pub fn max_rss_kb() -> u64 {
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return 0;
    };
    status
        .lines()
        .find(|line| line.starts_with("VmHWM:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
        .unwrap_or(0)
}

/// Peak resident set size in kB; 0 where unavailable.
#[cfg(not(target_os = "linux"))]
pub fn max_rss_kb() -> u64 {
    0
}
