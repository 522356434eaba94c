#![warn(missing_docs)]
//! The merged run configuration.
//!
//! Options accumulate in layers: built-in defaults, then the optional
//! TOML defaults file, then a `--conf` file, then the command line. The
//! `--confw` writer emits the merged result in the same `key value`
//! format the `--conf` reader accepts, so a written configuration
//! reproduces the run exactly.

use clap::parser::ValueSource;
use clap::ArgMatches;
use regex::Regex;
use serde::Deserialize;
use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use super::errors::PersistenceError;
use crate::clustering::admission::CapacityStrategy;
use crate::clustering::engine::EngineConfig;
use crate::clustering::scandist::PairMode;
use crate::clustering::scoring::PredParams;

const DEFAULTS_LOCAL_PATH: &str = "./config/streamclust.toml";
const DEFAULTS_HOME_PATH: &str = ".config/streamclust/config.toml";

const PRED_PATTERN: &str = r"^\[?\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*\]?$";

/// The admission radius as given: fixed, or a factor on the scan median.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RlimSpec {
    /// A literal radius.
    Fixed(f64),
    /// `aK`: R = K x the median of the scan pre-pass.
    Auto(f64),
}

fn parse_rlim(raw: &str) -> Result<RlimSpec, ()> {
    if let Some(rest) = raw.strip_prefix('a') {
        if let Ok(factor) = rest.parse::<f64>() {
            return Ok(RlimSpec::Auto(factor));
        }
    }
    raw.parse::<f64>().map(RlimSpec::Fixed).map_err(|_| ())
}

fn parse_pred(raw: &str) -> Option<PredParams> {
    let re = Regex::new(PRED_PATTERN).expect("pred pattern compiles");
    let caps = re.captures(raw.trim())?;
    Some(PredParams {
        len: caps[1].parse().ok()?,
        horizon: caps[2].parse().ok()?,
        n: caps[3].parse().ok()?,
    })
}

fn parse_value<T: FromStr>(key: &str, value: Option<&str>) -> Result<T, PersistenceError> {
    let v = value.ok_or_else(|| PersistenceError::MissingValueError(key.to_string()))?;
    v.parse().map_err(|_| PersistenceError::BadValueError {
        key: key.to_string(),
        value: v.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    progress: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct FileClustering {
    rlim: Option<f64>,
    dprob: Option<f64>,
    maxcl: Option<usize>,
    maxim: Option<u64>,
    ncpu: Option<usize>,
    gprob: Option<bool>,
    fmatcha: Option<f64>,
    fmatchb: Option<f64>,
    maxvis: Option<usize>,
    pred: Option<String>,
    te4: Option<bool>,
    te5: Option<bool>,
    tm: Option<f64>,
    maxcl_strategy: Option<CapacityStrategy>,
    discard_frac: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct FileOutput {
    outdir: Option<PathBuf>,
    dcc: Option<bool>,
    tm_out: Option<bool>,
    anchors: Option<bool>,
    counts: Option<bool>,
    membership: Option<bool>,
    discarded: Option<bool>,
    clustered: Option<bool>,
    clusters: Option<bool>,
    avg: Option<bool>,
    distall: Option<bool>,
    pngout: Option<bool>,
}

/// The TOML defaults file, all fields optional.
#[derive(Debug, Default, Deserialize)]
struct FileDefaults {
    #[serde(default)]
    settings: FileSettings,
    #[serde(default)]
    clustering: FileClustering,
    #[serde(default)]
    output: FileOutput,
}

/// The full merged configuration of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterOptions {
    /// Admission radius, fixed or auto.
    pub rlim: Option<RlimSpec>,
    /// Input file, image directory, or stream name.
    pub input: Option<PathBuf>,
    /// User-specified output directory.
    pub outdir: Option<PathBuf>,
    /// Probability bump per assignment.
    pub dprob: f64,
    /// Live-cluster ceiling.
    pub maxcl: usize,
    /// Frame limit.
    pub maxim: u64,
    /// Worker count.
    pub ncpu: usize,
    /// Geometric boost.
    pub gprob: bool,
    /// gprob reward at a perfect match.
    pub fmatch_a: f64,
    /// gprob reward at the 2R limit.
    pub fmatch_b: f64,
    /// Visitor-ring length.
    pub maxvis: usize,
    /// Pattern prediction.
    pub pred: Option<PredParams>,
    /// 4-point pruning.
    pub te4: bool,
    /// 5-point pruning.
    pub te5: bool,
    /// Transition-matrix mixing coefficient.
    pub tm_coeff: f64,
    /// Capacity policy.
    pub maxcl_strategy: CapacityStrategy,
    /// Oldest fraction eligible for discard.
    pub discard_frac: f64,
    /// Scan-only mode.
    pub scandist: bool,
    /// Pairs measured by the scan pass.
    pub scan_pairs: usize,
    /// Random pairs instead of consecutive.
    pub rand_pairs: bool,
    /// Seed for random-pair scanning.
    pub seed: u64,
    /// Progress logging.
    pub progress: bool,
    /// Average member frame per cluster.
    pub avg: bool,
    /// Stream every measured distance.
    pub distall: bool,
    /// Image outputs as PNG.
    pub pngout: bool,
    /// dcc.txt.
    pub out_dcc: bool,
    /// transition_matrix.txt.
    pub out_tm: bool,
    /// Anchor vectors.
    pub out_anchors: bool,
    /// cluster_counts.txt.
    pub out_counts: bool,
    /// frame_membership.txt.
    pub out_membership: bool,
    /// discarded_frames.txt.
    pub out_discarded: bool,
    /// The `<input>.clustered.txt` dump.
    pub out_clustered: bool,
    /// Per-cluster member dumps.
    pub out_clusters: bool,
    /// Where to write the merged configuration, if requested.
    pub confw: Option<PathBuf>,
}

impl Default for ClusterOptions {
    fn default() -> ClusterOptions {
        ClusterOptions {
            rlim: None,
            input: None,
            outdir: None,
            dprob: 0.01,
            maxcl: 1000,
            maxim: 100_000,
            ncpu: 1,
            gprob: false,
            fmatch_a: 2.0,
            fmatch_b: 0.5,
            maxvis: 1000,
            pred: None,
            te4: false,
            te5: false,
            tm_coeff: 0.0,
            maxcl_strategy: CapacityStrategy::Stop,
            discard_frac: 0.5,
            scandist: false,
            scan_pairs: 100_000,
            rand_pairs: false,
            seed: 1,
            progress: true,
            avg: false,
            distall: false,
            pngout: false,
            out_dcc: true,
            out_tm: false,
            out_anchors: false,
            out_counts: false,
            out_membership: true,
            out_discarded: false,
            out_clustered: false,
            out_clusters: false,
            confw: None,
        }
    }
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(DEFAULTS_LOCAL_PATH);
    if local.exists() {
        return Some(local);
    }
    let home = home::home_dir()?.join(DEFAULTS_HOME_PATH);
    if home.exists() {
        Some(home)
    } else {
        None
    }
}

impl ClusterOptions {
    /// Merge all configuration layers under the parsed command line.
    pub fn build(matches: &ArgMatches) -> Result<ClusterOptions, PersistenceError> {
        let mut opts = ClusterOptions::default();
        if let Some(path) = default_config_path() {
            opts.apply_defaults_file(&path)?;
        }
        if let Some(conf) = matches.get_one::<String>("conf") {
            opts.read_conf_file(Path::new(conf))?;
        }
        opts.overlay_cli(matches)?;
        opts.validate()?;
        Ok(opts)
    }

    /// Fold the TOML defaults file in.
    pub fn apply_defaults_file(&mut self, path: &Path) -> Result<(), PersistenceError> {
        let Ok(contents) = fs::read_to_string(path) else {
            return Err(PersistenceError::ReadFileError(path.to_path_buf()));
        };
        let defaults: FileDefaults = match toml::from_str(&contents) {
            Ok(toml) => toml,
            Err(toml_error) => {
                return Err(PersistenceError::DeserializeError(
                    toml_error.message().to_string(),
                ));
            }
        };
        let c = defaults.clustering;
        if let Some(v) = c.rlim {
            self.rlim = Some(RlimSpec::Fixed(v));
        }
        if let Some(v) = c.dprob {
            self.dprob = v;
        }
        if let Some(v) = c.maxcl {
            self.maxcl = v;
        }
        if let Some(v) = c.maxim {
            self.maxim = v;
        }
        if let Some(v) = c.ncpu {
            self.ncpu = v;
        }
        if let Some(v) = c.gprob {
            self.gprob = v;
        }
        if let Some(v) = c.fmatcha {
            self.fmatch_a = v;
        }
        if let Some(v) = c.fmatchb {
            self.fmatch_b = v;
        }
        if let Some(v) = c.maxvis {
            self.maxvis = v;
        }
        if let Some(raw) = c.pred {
            self.pred =
                Some(
                    parse_pred(&raw).ok_or_else(|| PersistenceError::BadValueError {
                        key: "pred".to_string(),
                        value: raw.clone(),
                    })?,
                );
        }
        if let Some(v) = c.te4 {
            self.te4 = v;
        }
        if let Some(v) = c.te5 {
            self.te5 = v;
        }
        if let Some(v) = c.tm {
            self.tm_coeff = v;
        }
        if let Some(v) = c.maxcl_strategy {
            self.maxcl_strategy = v;
        }
        if let Some(v) = c.discard_frac {
            self.discard_frac = v;
        }
        let o = defaults.output;
        if let Some(v) = o.outdir {
            self.outdir = Some(v);
        }
        if let Some(v) = o.dcc {
            self.out_dcc = v;
        }
        if let Some(v) = o.tm_out {
            self.out_tm = v;
        }
        if let Some(v) = o.anchors {
            self.out_anchors = v;
        }
        if let Some(v) = o.counts {
            self.out_counts = v;
        }
        if let Some(v) = o.membership {
            self.out_membership = v;
        }
        if let Some(v) = o.discarded {
            self.out_discarded = v;
        }
        if let Some(v) = o.clustered {
            self.out_clustered = v;
        }
        if let Some(v) = o.clusters {
            self.out_clusters = v;
        }
        if let Some(v) = o.avg {
            self.avg = v;
        }
        if let Some(v) = o.distall {
            self.distall = v;
        }
        if let Some(v) = o.pngout {
            self.pngout = v;
        }
        if let Some(v) = defaults.settings.progress {
            self.progress = v;
        }
        Ok(())
    }

    /// Apply one `key value` option; returns whether the value was
    /// consumed. Keys match with or without a leading dash.
    pub fn apply_option(
        &mut self,
        key: &str,
        value: Option<&str>,
    ) -> Result<bool, PersistenceError> {
        let key = key.trim_start_matches('-');
        if let Some(spec) = key.strip_prefix("pred") {
            // `pred[l,h,n]`, `pred l,h,n`, or bare `pred` for defaults.
            let inline = spec.trim();
            let (params, consumed) = if !inline.is_empty() {
                (parse_pred(inline), false)
            } else if let Some(v) = value {
                (parse_pred(v), true)
            } else {
                (
                    Some(PredParams {
                        len: 10,
                        horizon: 1000,
                        n: 2,
                    }),
                    false,
                )
            };
            let params = params.ok_or_else(|| PersistenceError::BadValueError {
                key: "pred".to_string(),
                value: value.unwrap_or(spec).to_string(),
            })?;
            self.pred = Some(params);
            return Ok(consumed);
        }
        match key {
            "rlim" => {
                let v = value
                    .ok_or_else(|| PersistenceError::MissingValueError(key.to_string()))?;
                self.rlim = Some(parse_rlim(v).map_err(|_| PersistenceError::BadValueError {
                    key: key.to_string(),
                    value: v.to_string(),
                })?);
                Ok(true)
            }
            "input" | "in" => {
                let v = value
                    .ok_or_else(|| PersistenceError::MissingValueError(key.to_string()))?;
                self.input = Some(PathBuf::from(v));
                Ok(true)
            }
            "outdir" => {
                let v = value
                    .ok_or_else(|| PersistenceError::MissingValueError(key.to_string()))?;
                self.outdir = Some(PathBuf::from(v));
                Ok(true)
            }
            "dprob" => {
                self.dprob = parse_value(key, value)?;
                Ok(true)
            }
            "maxcl" => {
                self.maxcl = parse_value(key, value)?;
                Ok(true)
            }
            "maxim" => {
                self.maxim = parse_value(key, value)?;
                Ok(true)
            }
            "ncpu" => {
                self.ncpu = parse_value(key, value)?;
                Ok(true)
            }
            "maxvis" => {
                self.maxvis = parse_value(key, value)?;
                Ok(true)
            }
            "fmatcha" => {
                self.fmatch_a = parse_value(key, value)?;
                Ok(true)
            }
            "fmatchb" => {
                self.fmatch_b = parse_value(key, value)?;
                Ok(true)
            }
            "tm" => {
                self.tm_coeff = parse_value(key, value)?;
                Ok(true)
            }
            "maxcl_strategy" => {
                let v = value
                    .ok_or_else(|| PersistenceError::MissingValueError(key.to_string()))?;
                self.maxcl_strategy =
                    v.parse().map_err(|_| PersistenceError::BadValueError {
                        key: key.to_string(),
                        value: v.to_string(),
                    })?;
                Ok(true)
            }
            "discard_frac" => {
                self.discard_frac = parse_value(key, value)?;
                Ok(true)
            }
            "scanpairs" => {
                self.scan_pairs = parse_value(key, value)?;
                Ok(true)
            }
            "seed" => {
                self.seed = parse_value(key, value)?;
                Ok(true)
            }
            "gprob" => {
                self.gprob = true;
                Ok(false)
            }
            "te4" => {
                self.te4 = true;
                Ok(false)
            }
            "te5" => {
                self.te5 = true;
                Ok(false)
            }
            "scandist" => {
                self.scandist = true;
                Ok(false)
            }
            "randpairs" => {
                self.rand_pairs = true;
                Ok(false)
            }
            "progress" => {
                self.progress = true;
                Ok(false)
            }
            "avg" => {
                self.avg = true;
                Ok(false)
            }
            "distall" => {
                self.distall = true;
                Ok(false)
            }
            "pngout" => {
                self.pngout = true;
                Ok(false)
            }
            "dcc" => {
                self.out_dcc = true;
                Ok(false)
            }
            "no_dcc" => {
                self.out_dcc = false;
                Ok(false)
            }
            "tm_out" => {
                self.out_tm = true;
                Ok(false)
            }
            "anchors" => {
                self.out_anchors = true;
                Ok(false)
            }
            "counts" => {
                self.out_counts = true;
                Ok(false)
            }
            "membership" => {
                self.out_membership = true;
                Ok(false)
            }
            "no_membership" => {
                self.out_membership = false;
                Ok(false)
            }
            "discarded" => {
                self.out_discarded = true;
                Ok(false)
            }
            "clustered" => {
                self.out_clustered = true;
                Ok(false)
            }
            "clusters" => {
                self.out_clusters = true;
                Ok(false)
            }
            _ => Err(PersistenceError::UnknownOptionError(key.to_string())),
        }
    }

    /// Read a `key value` configuration file.
    pub fn read_conf_file(&mut self, path: &Path) -> Result<(), PersistenceError> {
        let Ok(contents) = fs::read_to_string(path) else {
            return Err(PersistenceError::ReadFileError(path.to_path_buf()));
        };
        for line in contents.lines() {
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let (key, rest) = match trimmed.split_once(char::is_whitespace) {
                Some((key, rest)) => (key, rest.trim()),
                None => (trimmed, ""),
            };
            let value = if rest.is_empty() { None } else { Some(rest) };
            self.apply_option(key, value)?;
        }
        Ok(())
    }

    /// Write the merged configuration in the `key value` format; reading
    /// the result back reproduces this configuration.
    pub fn write_conf_file(&self, path: &Path) -> Result<(), PersistenceError> {
        let mut out = String::new();
        let _ = writeln!(out, "# streamclust configuration file");
        match self.rlim {
            Some(RlimSpec::Fixed(r)) => {
                let _ = writeln!(out, "rlim {:.6}", r);
            }
            Some(RlimSpec::Auto(k)) => {
                let _ = writeln!(out, "rlim a{:.6}", k);
            }
            None => {}
        }
        if let Some(input) = &self.input {
            let _ = writeln!(out, "input {}", input.display());
        }
        if let Some(outdir) = &self.outdir {
            let _ = writeln!(out, "outdir {}", outdir.display());
        }
        let _ = writeln!(out, "dprob {:.6}", self.dprob);
        let _ = writeln!(out, "maxcl {}", self.maxcl);
        let _ = writeln!(out, "maxim {}", self.maxim);
        let _ = writeln!(out, "ncpu {}", self.ncpu);
        if self.gprob {
            let _ = writeln!(out, "gprob");
        }
        let _ = writeln!(out, "fmatcha {:.6}", self.fmatch_a);
        let _ = writeln!(out, "fmatchb {:.6}", self.fmatch_b);
        let _ = writeln!(out, "maxvis {}", self.maxvis);
        if let Some(pred) = self.pred {
            let _ = writeln!(out, "pred[{},{},{}]", pred.len, pred.horizon, pred.n);
        }
        if self.te4 {
            let _ = writeln!(out, "te4");
        }
        if self.te5 {
            let _ = writeln!(out, "te5");
        }
        let _ = writeln!(out, "tm {:.6}", self.tm_coeff);
        let _ = writeln!(out, "maxcl_strategy {}", self.maxcl_strategy.as_key());
        let _ = writeln!(out, "discard_frac {:.6}", self.discard_frac);
        let _ = writeln!(out, "scanpairs {}", self.scan_pairs);
        let _ = writeln!(out, "seed {}", self.seed);
        if self.rand_pairs {
            let _ = writeln!(out, "randpairs");
        }
        if self.progress {
            let _ = writeln!(out, "progress");
        }
        if self.avg {
            let _ = writeln!(out, "avg");
        }
        if self.distall {
            let _ = writeln!(out, "distall");
        }
        if self.pngout {
            let _ = writeln!(out, "pngout");
        }
        let _ = writeln!(out, "{}", if self.out_dcc { "dcc" } else { "no_dcc" });
        if self.out_tm {
            let _ = writeln!(out, "tm_out");
        }
        if self.out_anchors {
            let _ = writeln!(out, "anchors");
        }
        if self.out_counts {
            let _ = writeln!(out, "counts");
        }
        let _ = writeln!(
            out,
            "{}",
            if self.out_membership {
                "membership"
            } else {
                "no_membership"
            }
        );
        if self.out_discarded {
            let _ = writeln!(out, "discarded");
        }
        if self.out_clustered {
            let _ = writeln!(out, "clustered");
        }
        if self.out_clusters {
            let _ = writeln!(out, "clusters");
        }
        if self.scandist {
            let _ = writeln!(out, "scandist");
        }
        fs::write(path, out).map_err(|_| PersistenceError::WriteFileError(path.to_path_buf()))
    }

    fn overlay_cli(&mut self, matches: &ArgMatches) -> Result<(), PersistenceError> {
        if let Some(raw) = matches.get_one::<String>("rlim") {
            match parse_rlim(raw) {
                Ok(spec) => self.rlim = Some(spec),
                Err(()) => {
                    // Not a radius. A lone positional is the input path
                    // (scan-only runs need no radius); two positionals
                    // that both fail to parse are an error.
                    if matches.get_one::<String>("input").is_some() {
                        return Err(PersistenceError::BadValueError {
                            key: "rlim".to_string(),
                            value: raw.to_string(),
                        });
                    }
                    self.input = Some(PathBuf::from(raw));
                }
            }
        }
        if let Some(input) = matches.get_one::<String>("input") {
            self.input = Some(PathBuf::from(input));
        }
        if let Some(input) = matches.get_one::<String>("in") {
            self.input = Some(PathBuf::from(input));
        }
        if let Some(outdir) = matches.get_one::<String>("outdir") {
            self.outdir = Some(PathBuf::from(outdir));
        }
        if let Some(confw) = matches.get_one::<String>("confw") {
            self.confw = Some(PathBuf::from(confw));
        }
        let explicit = |id: &str| matches.value_source(id) == Some(ValueSource::CommandLine);
        if explicit("dprob") {
            self.dprob = *matches.get_one::<f64>("dprob").expect("parsed by clap");
        }
        if explicit("maxcl") {
            self.maxcl = *matches.get_one::<u64>("maxcl").expect("parsed by clap") as usize;
        }
        if explicit("maxim") {
            self.maxim = *matches.get_one::<u64>("maxim").expect("parsed by clap");
        }
        if explicit("ncpu") {
            self.ncpu = *matches.get_one::<u64>("ncpu").expect("parsed by clap") as usize;
        }
        if explicit("maxvis") {
            self.maxvis = *matches.get_one::<u64>("maxvis").expect("parsed by clap") as usize;
        }
        if explicit("fmatcha") {
            self.fmatch_a = *matches.get_one::<f64>("fmatcha").expect("parsed by clap");
        }
        if explicit("fmatchb") {
            self.fmatch_b = *matches.get_one::<f64>("fmatchb").expect("parsed by clap");
        }
        if explicit("tm") {
            self.tm_coeff = *matches.get_one::<f64>("tm").expect("parsed by clap");
        }
        if explicit("discard_frac") {
            self.discard_frac = *matches
                .get_one::<f64>("discard_frac")
                .expect("parsed by clap");
        }
        if explicit("scanpairs") {
            self.scan_pairs =
                *matches.get_one::<u64>("scanpairs").expect("parsed by clap") as usize;
        }
        if explicit("seed") {
            self.seed = *matches.get_one::<u64>("seed").expect("parsed by clap");
        }
        if let Some(strategy) = matches.get_one::<String>("maxcl_strategy") {
            self.maxcl_strategy =
                strategy
                    .parse()
                    .map_err(|_| PersistenceError::BadValueError {
                        key: "maxcl_strategy".to_string(),
                        value: strategy.to_string(),
                    })?;
        }
        if let Some(raw) = matches.get_one::<String>("pred") {
            let value = if raw.is_empty() {
                None
            } else {
                Some(raw.as_str())
            };
            self.apply_option("pred", value)?;
        }
        for flag in [
            "gprob",
            "te4",
            "te5",
            "scandist",
            "randpairs",
            "progress",
            "avg",
            "distall",
            "pngout",
            "dcc",
            "no_dcc",
            "tm_out",
            "anchors",
            "counts",
            "membership",
            "no_membership",
            "discarded",
            "clustered",
            "clusters",
        ] {
            if matches.get_flag(flag) {
                self.apply_option(flag, None)?;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), PersistenceError> {
        if self.input.is_none() {
            return Err(PersistenceError::MissingInputError);
        }
        if self.rlim.is_none() && !self.scandist {
            return Err(PersistenceError::MissingRadiusError);
        }
        if self.maxcl == 0 {
            return Err(PersistenceError::BadValueError {
                key: "maxcl".to_string(),
                value: "0".to_string(),
            });
        }
        if !(self.discard_frac > 0.0 && self.discard_frac <= 1.0) {
            return Err(PersistenceError::BadValueError {
                key: "discard_frac".to_string(),
                value: format!("{}", self.discard_frac),
            });
        }
        if !(0.0..=1.0).contains(&self.tm_coeff) {
            return Err(PersistenceError::BadValueError {
                key: "tm".to_string(),
                value: format!("{}", self.tm_coeff),
            });
        }
        if let Some(pred) = self.pred {
            if pred.len == 0 || pred.horizon == 0 || pred.n == 0 {
                return Err(PersistenceError::BadValueError {
                    key: "pred".to_string(),
                    value: format!("{},{},{}", pred.len, pred.horizon, pred.n),
                });
            }
        }
        Ok(())
    }

    /// The directory all outputs land in.
    pub fn output_dir(&self) -> PathBuf {
        if let Some(outdir) = &self.outdir {
            return outdir.clone();
        }
        let input = self.input.as_deref().unwrap_or(Path::new("stream"));
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("stream");
        let stripped = match input.extension().and_then(|e| e.to_str()) {
            Some(ext)
                if [
                    "txt", "dat", "csv", "png", "jpg", "jpeg", "bmp", "gif", "tif", "tiff",
                    "webp",
                ]
                .contains(&ext.to_lowercase().as_str()) =>
            {
                &name[..name.len() - ext.len() - 1]
            }
            _ => name,
        };
        PathBuf::from(format!("{}.clusterdat", stripped))
    }

    /// The pair-sampling mode of the scan pass.
    pub fn scan_mode(&self) -> PairMode {
        if self.rand_pairs {
            PairMode::Random { seed: self.seed }
        } else {
            PairMode::Consecutive
        }
    }

    /// The engine view of these options; `rlim` is the resolved radius
    /// (auto-R already applied).
    pub fn engine_config(&self, rlim: f64) -> EngineConfig {
        EngineConfig {
            rlim,
            dprob: self.dprob,
            maxcl: self.maxcl,
            maxim: self.maxim,
            maxvis: self.maxvis,
            ncpu: self.ncpu,
            gprob: self.gprob,
            fmatch_a: self.fmatch_a,
            fmatch_b: self.fmatch_b,
            te4: self.te4,
            te5: self.te5,
            tm_coeff: self.tm_coeff,
            pred: self.pred,
            strategy: self.maxcl_strategy,
            discard_frac: self.discard_frac,
            progress: self.progress,
            distall: self.distall,
        }
    }
}
