/// Graph Linter — validates graph documents and reports every problem found.
///
/// Usage: graph_linter <file_or_dir> [--strict]
///
/// Loads every `.json` / `.ron` document under the given path. Errors make a
/// document unusable for generation; warnings flag nodes that can never
/// contribute output. With `--strict`, warnings also fail the run.

use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};
use std::process;
use textgraph::core::pool::ResolvedPool;
use textgraph::core::template::Template;
use textgraph::core::validate::validate;
use textgraph::schema::document::{GraphDocument, OutgoingEdges};
use textgraph::schema::node::{NodeId, NodeKind};
use textgraph::schema::value_spec::ValueSpec;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args[1] == "--help" || args[1] == "-h" {
        println!("Usage: graph_linter <file_or_dir> [--strict]");
        process::exit(0);
    }

    let target = Path::new(&args[1]);
    let mut strict = false;

    for arg in &args[2..] {
        match arg.as_str() {
            "--strict" => strict = true,
            other => {
                eprintln!("Unknown argument: {}", other);
                process::exit(1);
            }
        }
    }

    let mut files = Vec::new();
    if target.is_file() {
        files.push(target.to_path_buf());
    } else if target.is_dir() {
        collect_documents(target, &mut files);
        files.sort();
    } else {
        eprintln!("ERROR: Path '{}' does not exist", target.display());
        process::exit(1);
    }

    let mut total_errors = 0;
    let mut total_warnings = 0;

    for path in &files {
        println!("\n=== {} ===\n", path.display());

        let document = match GraphDocument::load(path) {
            Ok(doc) => doc,
            Err(e) => {
                println!("ERROR: Failed to load document: {}", e);
                total_errors += 1;
                continue;
            }
        };

        let warnings = lint_document(&document);
        for warning in &warnings {
            println!("WARNING: {}", warning);
        }
        total_warnings += warnings.len();

        match validate(&document) {
            Ok(()) if warnings.is_empty() => println!("All checks passed!"),
            Ok(()) => {}
            Err(errors) => {
                for error in errors.iter() {
                    println!("ERROR: {}", error);
                }
                total_errors += errors.len();
            }
        }
    }

    println!(
        "\nSummary: {} document(s), {} errors, {} warnings",
        files.len(),
        total_errors,
        total_warnings
    );

    if total_errors > 0 || (strict && total_warnings > 0) {
        process::exit(1);
    }
}

fn collect_documents(dir: &Path, files: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_documents(&path, files);
            } else if matches!(
                path.extension().and_then(|s| s.to_str()),
                Some("json") | Some("ron")
            ) {
                files.push(path);
            }
        }
    }
}

/// Checks that do not stop generation but usually point at editing mistakes.
fn lint_document(document: &GraphDocument) -> Vec<String> {
    let mut warnings = Vec::new();

    // Reachability from every start node
    let outgoing = OutgoingEdges::new(document);
    let mut reachable: FxHashSet<&NodeId> = FxHashSet::default();
    let mut stack: Vec<&NodeId> = document.start_nodes().map(|n| &n.id).collect();
    while let Some(id) = stack.pop() {
        if reachable.insert(id) {
            stack.extend(outgoing.of(id).iter().map(|&i| &document.edges[i].target));
        }
    }
    if !reachable.is_empty() {
        for node in &document.nodes {
            if !reachable.contains(&node.id) {
                warnings.push(format!(
                    "{} node '{}' is not reachable from the start node",
                    node.kind.type_name(),
                    node.id
                ));
            }
        }
    }

    for node in &document.nodes {
        match &node.kind {
            NodeKind::Simple { values } | NodeKind::Branch { values } => {
                if weighted_has_zero(values) {
                    warnings.push(format!(
                        "node '{}' has weighted entries with zero weight that can never be drawn",
                        node.id
                    ));
                }
            }
            NodeKind::Template { templates, keys } => {
                if weighted_has_zero(templates) {
                    warnings.push(format!(
                        "node '{}' has templates with zero weight that can never be drawn",
                        node.id
                    ));
                }
                let used: FxHashSet<String> = template_keys(templates);
                let mut unused: Vec<&String> =
                    keys.keys().filter(|k| !used.contains(k.as_str())).collect();
                unused.sort();
                for key in unused {
                    warnings.push(format!(
                        "template node '{}' defines key '{}' but no template uses it",
                        node.id, key
                    ));
                }
            }
            NodeKind::Start => {}
        }
        if node.optional.is_optional && node.optional.value == 0.0 {
            warnings.push(format!(
                "node '{}' is optional with chance 0 and is never included",
                node.id
            ));
        }
    }

    warnings
}

fn weighted_has_zero(spec: &ValueSpec) -> bool {
    ResolvedPool::resolve(spec)
        .map(|pool| pool.selectable_count() < pool.len())
        .unwrap_or(false)
}

fn template_keys(templates: &ValueSpec) -> FxHashSet<String> {
    match ResolvedPool::resolve(templates) {
        Ok(pool) => pool
            .entries()
            .iter()
            .flat_map(|t| {
                Template::parse(t)
                    .keys()
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .collect(),
        Err(_) => FxHashSet::default(),
    }
}
