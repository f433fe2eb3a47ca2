/// Preview — generation shell for trying out graph documents.
///
/// Usage: preview <document> [--seed <n>] [--config <file.ron>] [--count <n>] [--trace]
///
/// With `--count`, prints that many outputs and exits. Otherwise opens a
/// shell with these commands:
///   gen [n]    — generate the next n outputs (default: the config's runs)
///   seed <n>   — restart the seed sequence at n
///   trace      — toggle per-node traces
///   bulk <n>   — generate n outputs and print variety stats
///   help       — list commands
///   quit       — exit

use rustc_hash::{FxHashMap, FxHashSet};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::process;
use textgraph::core::config::GenerationConfig;
use textgraph::core::engine::{Generation, GenerationFailure, GenerationTrace, GraphEngine};
use textgraph::schema::document::GraphDocument;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        print_usage();
        return;
    }

    let document_path = args[1].clone();
    let mut config = GenerationConfig::default();
    let mut seed_override = None;
    let mut count = None;
    let mut show_trace = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                i += 1;
                match GenerationConfig::load_from_ron(Path::new(&args[i])) {
                    Ok(c) => config = c,
                    Err(e) => {
                        eprintln!("ERROR loading config {}: {}", args[i], e);
                        process::exit(1);
                    }
                }
            }
            "--seed" if i + 1 < args.len() => {
                i += 1;
                seed_override = args[i].parse::<u64>().ok();
            }
            "--count" if i + 1 < args.len() => {
                i += 1;
                count = args[i].parse::<usize>().ok();
            }
            "--trace" => show_trace = true,
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_usage();
                process::exit(1);
            }
        }
        i += 1;
    }
    if let Some(seed) = seed_override {
        config.seed = seed;
    }

    let document = match GraphDocument::load(Path::new(&document_path)) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("ERROR loading document {}: {}", document_path, e);
            process::exit(1);
        }
    };

    let mut engine = match GraphEngine::builder().config(&config).build(&document) {
        Ok(engine) => engine,
        Err(errors) => {
            eprintln!("ERROR: {}", errors);
            process::exit(1);
        }
    };

    if let Some(n) = count {
        let mut failed = false;
        for result in engine.generate_many(n) {
            failed |= result.is_err();
            print_result(&result, show_trace);
        }
        if failed {
            process::exit(1);
        }
        return;
    }

    println!(
        "Loaded '{}' ({} nodes, {} edges)",
        document.name,
        document.nodes.len(),
        document.edges.len()
    );
    println!("Seed: {}", config.seed);
    println!("Type 'help' for commands.\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("preview> ");
        stdout.flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).is_err() || line.is_empty() {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts[0].to_lowercase();

        match cmd.as_str() {
            "quit" | "exit" | "q" => {
                println!("Goodbye.");
                break;
            }
            "help" | "h" | "?" => print_help(),
            "gen" | "g" => {
                let n = match parts.get(1).map(|s| s.parse::<usize>()) {
                    None => config.runs.max(1),
                    Some(Ok(n)) if n > 0 => n,
                    Some(_) => {
                        println!("Invalid count: {}", parts[1]);
                        continue;
                    }
                };
                for result in engine.generate_many(n) {
                    print_result(&result, show_trace);
                }
            }
            "trace" => {
                show_trace = !show_trace;
                println!("Trace {}", if show_trace { "on" } else { "off" });
            }
            "seed" => {
                if parts.len() < 2 {
                    println!("Current seed: {}", engine.seed());
                    continue;
                }
                match parts[1].parse::<u64>() {
                    Ok(s) => {
                        engine.reseed(s);
                        println!("Seed set to {}", s);
                    }
                    Err(_) => println!("Invalid seed: {}", parts[1]),
                }
            }
            "bulk" => {
                let n: usize = match parts.get(1).map(|s| s.parse()) {
                    Some(Ok(n)) if n > 0 => n,
                    _ => {
                        println!("Usage: bulk <n>");
                        continue;
                    }
                };
                print_bulk_stats(&engine.generate_many(n));
            }
            _ => {
                println!("Unknown command: '{}'. Type 'help' for available commands.", cmd);
            }
        }
    }
}

fn print_result(result: &Result<Generation, GenerationFailure>, show_trace: bool) {
    match result {
        Ok(generation) => {
            println!("{}", generation.output);
            if show_trace {
                print_trace(&generation.trace);
            }
            println!("---");
        }
        Err(failure) => {
            println!("ERROR: {}", failure);
            print_trace(&failure.trace);
            println!("---");
        }
    }
}

fn print_trace(trace: &GenerationTrace) {
    for step in &trace.steps {
        let mut line = format!("[Trace] {}", step.node_id);
        if !step.included {
            line.push_str(" (skipped)");
        }
        if !step.produced.is_empty() {
            line.push_str(&format!(" -> {:?}", step.produced));
        }
        if let Some(choice) = &step.branch {
            line.push_str(&format!(
                " branch #{} '{}' via {}",
                choice.option, choice.value, choice.edge_id
            ));
        }
        println!("{}", line);
    }
}

fn print_bulk_stats(results: &[Result<Generation, GenerationFailure>]) {
    let outputs: Vec<&Generation> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let errors = results.len() - outputs.len();

    println!(
        "\n=== Bulk Generation: {} outputs ({} errors) ===\n",
        outputs.len(),
        errors
    );

    let unique: FxHashSet<&str> = outputs.iter().map(|g| g.output.as_str()).collect();
    println!("Unique outputs: {} / {}", unique.len(), outputs.len());

    let avg_len = if outputs.is_empty() {
        0.0
    } else {
        outputs.iter().map(|g| g.output.len() as f64).sum::<f64>() / outputs.len() as f64
    };
    println!("Average length: {:.0} chars", avg_len);

    // How often each node contributed, most frequent first
    let mut node_counts: FxHashMap<&str, usize> = FxHashMap::default();
    for generation in &outputs {
        for step in generation.trace.steps.iter().filter(|s| !s.produced.is_empty()) {
            *node_counts.entry(step.node_id.as_str()).or_insert(0) += 1;
        }
    }
    let mut node_freq: Vec<(&str, usize)> = node_counts.into_iter().collect();
    node_freq.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    println!("\nNode contributions:");
    for (node, count) in &node_freq {
        println!("  {}: {}", node, count);
    }

    if let Some(first) = outputs.first() {
        println!("\nSample output:");
        println!("  {}", first.output);
    }
    println!();
}

fn print_usage() {
    println!("Preview — generation shell for trying out graph documents.");
    println!();
    println!("Usage: preview <document> [--seed <n>] [--config <file.ron>] [--count <n>] [--trace]");
    println!();
    println!("  <document>          Graph document (.json or .ron)");
    println!("  --seed <n>          Base seed (overrides the config)");
    println!("  --config <file>     Generation config in RON");
    println!("  --count <n>         Print n outputs and exit");
    println!("  --trace             Print the visited nodes of each run");
}

fn print_help() {
    println!("Commands:");
    println!("  gen [n]     Generate the next n outputs (default: config runs)");
    println!("  seed <n>    Restart the seed sequence at n");
    println!("  trace       Toggle per-node traces");
    println!("  bulk <n>    Generate n outputs with variety statistics");
    println!("  help        Show this help");
    println!("  quit        Exit");
}
