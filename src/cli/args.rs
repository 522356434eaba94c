#![warn(missing_docs)]
//! Command-line definition. The matches produced here are consumed by
//! [crate::ClusterOptions], which merges them over the configuration
//! files.

use clap::{command, value_parser, Arg, ArgAction, Command};

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .action(ArgAction::SetTrue)
        .help(help)
}

/// The `streamclust` command line.
pub fn command() -> Command {
    command!()
        .about("Single-pass radius clustering for frame streams")
        .override_usage("streamclust [OPTIONS] <rlim> <input>")
        .after_help(
            "The positional <rlim> accepts a plain radius (e.g. 1.5) or aK \
             (e.g. a3) to set R to K times the median of a scan pre-pass.\n\
             Configuration files use the same option names without dashes, \
             one `key value` pair per line, # comments allowed.",
        )
        .arg(
            Arg::new("rlim")
                .index(1)
                .help("Admission radius R, or aK for auto-R"),
        )
        .arg(
            Arg::new("input")
                .index(2)
                .help("Input file (text or image) or directory of images"),
        )
        .arg(
            Arg::new("in")
                .long("in")
                .alias("input")
                .value_name("PATH")
                .help("Explicit input path (alternative to the positional)"),
        )
        .arg(
            Arg::new("conf")
                .long("conf")
                .value_name("FILE")
                .help("Read options from a configuration file"),
        )
        .arg(
            Arg::new("confw")
                .long("confw")
                .value_name("FILE")
                .help("Write the merged options to a configuration file"),
        )
        .arg(
            Arg::new("outdir")
                .long("outdir")
                .value_name("DIR")
                .help("Output directory (default: <input>.clusterdat)"),
        )
        .arg(
            Arg::new("dprob")
                .long("dprob")
                .value_name("VAL")
                .value_parser(value_parser!(f64))
                .help("Probability bump for the chosen cluster (default 0.01)"),
        )
        .arg(
            Arg::new("maxcl")
                .long("maxcl")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Max number of live clusters (default 1000)"),
        )
        .arg(
            Arg::new("maxim")
                .long("maxim")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Max number of frames to process (default 100000)"),
        )
        .arg(
            Arg::new("ncpu")
                .long("ncpu")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Worker count for the pruning bound computations (default 1)"),
        )
        .arg(
            Arg::new("maxvis")
                .long("maxvis")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Visitors tracked per cluster for gprob (default 1000)"),
        )
        .arg(flag("gprob", "Boost candidates by geometric visitor evidence"))
        .arg(
            Arg::new("fmatcha")
                .long("fmatcha")
                .value_name("VAL")
                .value_parser(value_parser!(f64))
                .help("gprob reward at a perfect match (default 2.0)"),
        )
        .arg(
            Arg::new("fmatchb")
                .long("fmatchb")
                .value_name("VAL")
                .value_parser(value_parser!(f64))
                .help("gprob reward at the 2R limit (default 0.5)"),
        )
        .arg(
            Arg::new("pred")
                .long("pred")
                .value_name("l,h,n")
                .num_args(0..=1)
                .require_equals(true)
                .default_missing_value("")
                .help("Pattern prediction: match the last l ids in the last h, test n candidates first (default 10,1000,2)"),
        )
        .arg(flag("te4", "4-point triangle-inequality pruning"))
        .arg(flag("te5", "5-point triangle-inequality pruning"))
        .arg(
            Arg::new("tm")
                .long("tm")
                .value_name("COEFF")
                .value_parser(value_parser!(f64))
                .help("Transition-matrix mixing coefficient in [0,1] (default 0)"),
        )
        .arg(
            Arg::new("maxcl_strategy")
                .long("maxcl_strategy")
                .value_name("STRAT")
                .help("Strategy at the cluster ceiling: stop|discard|merge (default stop)"),
        )
        .arg(
            Arg::new("discard_frac")
                .long("discard_frac")
                .value_name("FRAC")
                .value_parser(value_parser!(f64))
                .help("Fraction of oldest clusters eligible for discard (default 0.5)"),
        )
        .arg(flag("scandist", "Measure pair-distance statistics and exit"))
        .arg(
            Arg::new("scanpairs")
                .long("scanpairs")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("Pairs measured by the scan pass (default 100000)"),
        )
        .arg(flag("randpairs", "Scan random pairs instead of consecutive ones"))
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("N")
                .value_parser(value_parser!(u64))
                .help("RNG seed for random-pair scanning (default 1)"),
        )
        .arg(flag("progress", "Log progress during clustering"))
        .arg(flag("verbose", "Debug-level logging"))
        .arg(flag("avg", "Write the average member frame per cluster"))
        .arg(flag("distall", "Stream every measured distance to distall.txt"))
        .arg(flag("pngout", "Write image outputs as PNG"))
        .arg(flag("dcc", "Write dcc.txt (default: enabled)"))
        .arg(flag("no_dcc", "Disable dcc.txt"))
        .arg(flag("tm_out", "Write transition_matrix.txt"))
        .arg(flag("anchors", "Write anchor vectors"))
        .arg(flag("counts", "Write cluster_counts.txt"))
        .arg(flag("membership", "Write frame_membership.txt (default: enabled)"))
        .arg(flag("no_membership", "Disable frame_membership.txt"))
        .arg(flag("discarded", "Write discarded_frames.txt"))
        .arg(flag("clustered", "Write the <input>.clustered.txt dump"))
        .arg(flag("clusters", "Write per-cluster member dumps"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_is_consistent() {
        command().debug_assert();
    }

    #[test]
    fn positionals_and_flags_parse() {
        let m = command()
            .try_get_matches_from([
                "streamclust",
                "--te4",
                "--maxcl",
                "50",
                "--pred=3,50,1",
                "1.5",
                "frames.txt",
            ])
            .unwrap();
        assert_eq!(m.get_one::<String>("rlim").unwrap(), "1.5");
        assert_eq!(m.get_one::<String>("input").unwrap(), "frames.txt");
        assert_eq!(*m.get_one::<u64>("maxcl").unwrap(), 50);
        assert!(m.get_flag("te4"));
        assert_eq!(m.get_one::<String>("pred").unwrap(), "3,50,1");
    }

    #[test]
    fn bare_pred_uses_the_default_marker() {
        let m = command()
            .try_get_matches_from(["streamclust", "--pred", "1.0", "frames.txt"])
            .unwrap();
        assert_eq!(m.get_one::<String>("pred").unwrap(), "");
    }
}
