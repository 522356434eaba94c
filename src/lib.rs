//! Online, single-pass clustering for high-rate frame streams:
//! * Anchor-and-radius cluster model with a frozen anchor per cluster
//! * Probability-driven candidate ordering with transition-matrix
//!   blending, pattern prediction, and geometric visitor evidence
//! * Triangle-inequality pruning in 3-, 4-, and 5-point variants

#![warn(missing_docs)]

use std::fmt::Debug;

pub mod cli;
pub mod clustering;
pub mod metric;
pub mod persistence;
pub mod source;

pub use persistence::errors::PersistenceError;
pub use persistence::options::{ClusterOptions, RlimSpec};
pub use persistence::outputs::{write_results, write_scan_summary};
pub use persistence::runlog::write_run_log;

pub use source::errors::SourceError;
pub use source::{open_source, Frame, FrameSource};

pub use metric::algs::{dist, dist_sq, dist_sq_capped, Capped};

pub use clustering::admission::CapacityStrategy;
pub use clustering::engine::{Engine, EngineConfig};
pub use clustering::errors::ClusterError;
pub use clustering::scandist::{scan_distances, PairMode, ScanSummary};
pub use clustering::scoring::PredParams;

/// Values that implement [MatchEnumAsStr] can compare their enum values to a given `&str` (case-insensitive)
///
/// See function [MatchEnumAsStr::match_enum_as_str]
pub trait MatchEnumAsStr: Debug {
    /// Return `true` if the given enum value matches the given string (case-insensitive)
    ///
    /// # Examples
    ///
    /// Here, `Strategy::Stop` matches the given string:
    ///
    /// ```
    /// use streamclust::MatchEnumAsStr;
    /// #[derive(Debug)]
    /// enum Strategy {
    ///     Stop,
    ///     Discard,
    ///     Merge,
    /// }
    /// impl MatchEnumAsStr for Strategy {}
    /// assert_eq![Strategy::Stop.match_enum_as_str("stop"), true]
    /// ```
    ///
    /// Here, `Strategy::Merge` does not match the given string:
    ///
    /// ```
    /// use streamclust::MatchEnumAsStr;
    /// #[derive(Debug)]
    /// enum Strategy {
    ///     Stop,
    ///     Discard,
    ///     Merge,
    /// }
    /// impl MatchEnumAsStr for Strategy {}
    /// assert_eq![Strategy::Merge.match_enum_as_str("drop"), false]
    /// ```
    fn match_enum_as_str(&self, string: &str) -> bool {
        format!("{:?}", &self).to_lowercase() == string.to_lowercase()
    }
}
