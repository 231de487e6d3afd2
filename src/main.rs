use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{debug, info};

use spritecook::cli::Args;
use spritecook::graph::{Node, NodePath, persist, registry};
use spritecook::{ElementCollection, Engine, EngineConfig, HostServices, JobOutcome};

fn init_logging(args: &Args) -> Result<()> {
    // 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
    let log_level = match args.verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    if let Some(log_path) = &args.log_file {
        let log_path = log_path
            .clone()
            .unwrap_or_else(|| "spritecook.log".into());
        let file = std::fs::File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Respects RUST_LOG if set
        let default_level = match args.verbosity {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        };
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn print_nodes(root: &Node) {
    for path in root.descendants() {
        let Some(node) = root.find(&path) else {
            continue;
        };
        let state = node.state();
        let cache = state.cache.stats();
        println!(
            "  {:<32} {:<14} {:?} (cooks: {}, cache hits: {}/{})",
            path.to_string(),
            node.type_tag(),
            state.status,
            state.cook_count,
            cache.hits,
            cache.total()
        );
        for err in &state.errors {
            println!("      error: {}", err);
        }
        for upstream in &state.upstream_errors {
            println!("      upstream failed: {}", upstream);
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;
    debug!("Command-line args: {:?}", args);

    if args.list_types {
        for tag in registry::type_tags() {
            println!("{}", tag);
        }
        return Ok(());
    }
    let Some(graph_path) = &args.graph else {
        bail!("No graph file given");
    };

    let config = EngineConfig::from_env_and_cli(args.config.clone())?;
    info!("Engine config: {:?}", config);
    let root = persist::load_graph(graph_path)?;

    let engine = Engine::new(root, HostServices::new(config))?;
    engine.set_time(args.time);
    let target = NodePath::parse(&args.target);
    let report = engine.cook_blocking(target)?;

    println!("target:   {}", report.target);
    println!("time:     {} ms", report.time);
    println!("cooked:   {} node evaluations", report.cooked.len());
    println!(
        "cache:    {} hits, {} misses ({:.0}%)",
        report.cache.hits,
        report.cache.misses,
        report.cache.hit_rate() * 100.0
    );
    match &report.outcome {
        JobOutcome::Completed => {
            let empty = ElementCollection::new();
            let collection = report.collection.as_deref().unwrap_or(&empty);
            println!("elements: {}", collection.len());
            match collection.time_span() {
                Some((start, end)) => println!("span:     {} .. {} ms", start, end),
                None => println!("span:     (static)"),
            }
            let names: Vec<&str> = collection.attribute_names().collect();
            if !names.is_empty() {
                println!("attrs:    {}", names.join(", "));
            }
        }
        JobOutcome::Canceled => println!("outcome:  canceled"),
        JobOutcome::Circular(cycle) => {
            let cycle: Vec<String> = cycle.iter().map(|p| p.to_string()).collect();
            println!("outcome:  cycle {}", cycle.join(" -> "));
        }
        JobOutcome::Failed(err) => println!("outcome:  failed: {}", err),
    }

    if args.show_nodes {
        println!("nodes:");
        engine.with_root(print_nodes);
    }
    if let Some(save_path) = &args.save {
        engine.with_root(|root| persist::save_graph(root, save_path))?;
        info!("Saved graph to {}", save_path.display());
    }

    if report.outcome.is_completed() {
        Ok(())
    } else {
        std::process::exit(1)
    }
}
