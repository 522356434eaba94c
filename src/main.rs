//! Launcher for the `streamclust` CLI.
use std::fs::File;
use std::io::BufWriter;
use std::process;
use std::sync::atomic::Ordering;
use std::time::Instant;

use chrono::Local;

use streamclust::{
    cli::args, scan_distances, write_results, write_run_log, write_scan_summary, ClusterError,
    ClusterOptions, Engine, RlimSpec,
};

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .init();
}

fn main() {
    let start = Local::now();
    let cmdline = std::env::args().collect::<Vec<String>>().join(" ");
    let matches = args::command().get_matches();
    init_logging(matches.get_flag("verbose"));

    let opts = match ClusterOptions::build(&matches) {
        Ok(opts) => opts,
        Err(error) => {
            eprintln!("Error: {}", error);
            process::exit(1);
        }
    };

    if let Some(path) = &opts.confw {
        if let Err(error) = opts.write_conf_file(path) {
            eprintln!("Error: {}", error);
            process::exit(1);
        }
        println!("Configuration written to {}", path.display());
    }

    let input = opts.input.clone().expect("validated by ClusterOptions");
    let mut source = match streamclust::open_source(&input) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Error: {}", error);
            process::exit(1);
        }
    };

    let out_dir = opts.output_dir();
    if let Err(error) = std::fs::create_dir_all(&out_dir) {
        eprintln!(
            "Error: Failed to create output directory {}: {}",
            out_dir.display(),
            error
        );
        process::exit(1);
    }

    // Scan pre-pass: standalone under -scandist, or to resolve an aK
    // radius before clustering.
    let mut rlim = match opts.rlim {
        Some(RlimSpec::Fixed(r)) => r,
        _ => 0.0,
    };
    if opts.scandist || matches!(opts.rlim, Some(RlimSpec::Auto(_))) {
        let summary = match scan_distances(source.as_mut(), opts.scan_pairs, opts.scan_mode()) {
            Ok(summary) => summary,
            Err(error) => {
                eprintln!("Error: {}", error);
                process::exit(1);
            }
        };
        println!("scan: {}", summary);
        write_scan_summary(&out_dir, &summary);
        if opts.scandist {
            process::exit(0);
        }
        if let Some(RlimSpec::Auto(factor)) = opts.rlim {
            rlim = factor * summary.median;
            log::info!(
                "auto rlim {:.6} ({} x scan median {:.6})",
                rlim,
                factor,
                summary.median
            );
        }
        if let Err(error) = source.as_mut().reset() {
            eprintln!("Error: {}", error);
            process::exit(1);
        }
    }

    let mut engine = match Engine::new(opts.engine_config(rlim)) {
        Ok(engine) => engine,
        Err(error) => {
            eprintln!("Error: {}", error);
            process::exit(1);
        }
    };

    let stop = engine.stop_flag();
    if let Err(error) = ctrlc::set_handler(move || {
        stop.store(true, Ordering::Relaxed);
    }) {
        log::warn!("could not install interrupt handler: {}", error);
    }
    println!("CTRL+C to stop clustering and write results");

    if opts.distall {
        let path = out_dir.join("distall.txt");
        match File::create(&path) {
            Ok(file) => engine.set_distall_sink(Box::new(BufWriter::new(file))),
            Err(error) => log::warn!("failed to open {}: {}", path.display(), error),
        }
    }

    let clustering_started = Instant::now();
    let run_result = engine.run(source.as_mut());
    engine.stats_mut().clustering_ms = clustering_started.elapsed().as_secs_f64() * 1000.0;

    if let Err(error) = &run_result {
        match error {
            ClusterError::Capacity { .. } => eprintln!("Error: {}", error),
            _ => eprintln!("Error: Clustering aborted: {}", error),
        }
    }

    // Even an aborted run flushes what it has; only the failing frame is
    // missing from the log.
    let output_started = Instant::now();
    write_results(
        &opts,
        rlim,
        engine.registry(),
        engine.history(),
        engine.stats(),
        source.as_mut(),
    );
    engine.stats_mut().output_ms = output_started.elapsed().as_secs_f64() * 1000.0;
    write_run_log(&opts, rlim, engine.registry(), engine.stats(), &cmdline, start);

    process::exit(if run_result.is_err() { 1 } else { 0 });
}
