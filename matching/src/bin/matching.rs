//! Command-line driver: loads an edge list, spawns workers, reports the
//! matching.
//!
//! The file format is one `u v` pair per line; `#` comments and blank
//! lines are skipped. Self-loops and duplicates are dropped defensively by
//! the engine.

use std::io::BufRead;
use std::process::exit;
use std::sync::Arc;

use matching::{gather_matching, run, Config, MatchedEdge};
use matching_communication::{initialize, Configuration, Fabric};

fn usage(opts: &getopts::Options) -> String {
    opts.usage("usage: matching --input FILE --nodes N [options]")
}

fn load_edges(path: &str) -> std::io::Result<Vec<(u64, u64)>> {
    let file = std::fs::File::open(path)?;
    let mut pairs = Vec::new();
    for line in std::io::BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let mut fields = trimmed.split_whitespace();
        let (Some(u), Some(v)) = (fields.next(), fields.next()) else {
            continue;
        };
        let parse = |text: &str| {
            text.parse::<u64>().map_err(|e| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    format!("bad vertex {:?}: {}", text, e),
                )
            })
        };
        pairs.push((parse(u)?, parse(v)?));
    }
    Ok(pairs)
}

fn main() {
    env_logger::init();

    let mut opts = Config::options();
    opts.optopt("w", "workers", "number of worker threads", "NUM");
    opts.optopt("i", "input", "edge list file", "FILE");
    opts.optopt("n", "nodes", "number of vertices", "NUM");
    opts.optflag("", "print-matching", "print matched pairs to stdout");
    opts.optflag("h", "help", "print this help");

    let matches = match opts.parse(std::env::args().skip(1)) {
        Ok(matches) => matches,
        Err(err) => {
            eprintln!("error: {}", err);
            eprintln!("{}", usage(&opts));
            exit(2);
        }
    };
    if matches.opt_present("help") {
        println!("{}", usage(&opts));
        return;
    }

    let config = match Config::from_matches(&matches) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            exit(2);
        }
    };
    let (Some(input), Some(nodes_text)) = (matches.opt_str("input"), matches.opt_str("nodes"))
    else {
        eprintln!("{}", usage(&opts));
        exit(2);
    };
    let nodes: u64 = match nodes_text.parse() {
        Ok(nodes) => nodes,
        Err(err) => {
            eprintln!("error: --nodes: {}", err);
            exit(2);
        }
    };
    let workers: usize = matches
        .opt_str("w")
        .map(|text| text.parse().unwrap_or(1))
        .unwrap_or(1);
    let print_matching = matches.opt_present("print-matching");

    let pairs = match load_edges(&input) {
        Ok(pairs) => Arc::new(pairs),
        Err(err) => {
            eprintln!("error: {}: {}", input, err);
            exit(2);
        }
    };

    let configuration = if workers > 1 {
        Configuration::Process(workers)
    } else {
        Configuration::Thread
    };

    type WorkerResult = Result<(bool, u64, usize, Vec<MatchedEdge>), String>;
    let guards = initialize(configuration, move |mut fabric| -> WorkerResult {
        // rank 0 feeds the whole list; ingestion routing spreads it out
        let mine = if fabric.index() == 0 {
            (*pairs).clone()
        } else {
            Vec::new()
        };
        let outcome = run(&mut fabric, &config, mine, nodes)
            .map_err(|err| format!("{} ({})", err, err.tag()))?;
        let full = gather_matching(&mut fabric, &outcome.matching)
            .map_err(|err| format!("{} ({})", err, err.tag()))?;
        Ok((
            outcome.complete,
            outcome.global_size,
            outcome.metrics.total_phases,
            full,
        ))
    });

    let results = match guards {
        Ok(guards) => guards.join(),
        Err(err) => {
            eprintln!("error: {}", err);
            exit(1);
        }
    };

    let mut failed = false;
    let mut report = None;
    for (index, result) in results.into_iter().enumerate() {
        match result {
            Ok(Ok(outcome)) => {
                if index == 0 {
                    report = Some(outcome);
                }
            }
            Ok(Err(err)) => {
                eprintln!("worker {}: {}", index, err);
                failed = true;
            }
            Err(err) => {
                eprintln!("worker {}: {}", index, err);
                failed = true;
            }
        }
    }
    if failed {
        exit(1);
    }
    let Some((complete, size, phases, matching)) = report else {
        exit(1);
    };

    println!("matching size: {} ({} phases)", size, phases);
    if print_matching {
        for edge in &matching {
            println!("{} {}", edge.u, edge.v);
        }
    }
    if !complete {
        eprintln!("error: progress-stall");
        exit(1);
    }
}
