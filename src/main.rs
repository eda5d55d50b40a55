use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use crisis_core::configuration::CoreConfiguration;
use crisis_core::graph::Topology;
use simplelog::{
    ColorChoice, CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, TermLogger,
    TerminalMode, WriteLogger,
};

mod replay;

/// Replays a recorded session against the client core and reports what the
/// client would have sent to the server.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// JSON lines: a snapshot first, then remote notifications and local ops
    #[arg(long)]
    script: PathBuf,
    /// Name of the player this client controls
    #[arg(long)]
    player: String,
    /// Board topology in TOML. The bundled cluster web is used otherwise.
    #[arg(long)]
    topology: Option<PathBuf>,
    /// Client-side game constants in TOML
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    setup_logging(&args)?;

    let topology = match &args.topology {
        Some(path) => Topology::load(path)
            .with_context(|| format!("loading topology {}", path.display()))?,
        None => Topology::cluster_web()?,
    };
    let config = match &args.config {
        Some(path) => CoreConfiguration::load(path)
            .with_context(|| format!("loading configuration {}", path.display()))?,
        None => CoreConfiguration::default(),
    };
    let script = std::fs::read_to_string(&args.script)
        .with_context(|| format!("reading script {}", args.script.display()))?;

    let summary = replay::run(&script, &args.player, topology, config)?;
    log::info!(
        "Replayed {} lines, {} requests sent, outcome {:?}",
        summary.lines,
        summary.sent.len(),
        summary.outcome
    );
    for request in summary.sent.iter() {
        println!("{}", serde_json::to_string(request)?);
    }
    Ok(())
}

fn setup_logging(args: &Args) -> anyhow::Result<()> {
    let level = match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let config = ConfigBuilder::new()
        .set_target_level(LevelFilter::Error)
        .build();
    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    loggers.push(TermLogger::new(
        level,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));
    if let Some(path) = &args.log_file {
        let file = File::create(path)
            .with_context(|| format!("creating log file {}", path.display()))?;
        loggers.push(WriteLogger::new(level.max(LevelFilter::Debug), config, file));
    }
    CombinedLogger::init(loggers)?;
    Ok(())
}
