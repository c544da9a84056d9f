//! strand - replay and inspect agent event logs

mod anonymize;
mod config;
mod replay;
mod store;

use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use strand_types::ConversationId;
use tracing_subscriber::EnvFilter;

/// strand - assemble agent event logs into conversations
#[derive(Parser, Debug)]
#[command(name = "strand")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Replay a JSONL event log and print the resulting conversations
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Print the replay as JSON
    #[arg(long, requires = "replay")]
    json: bool,

    /// Only print this conversation ("primary" for the main agent)
    #[arg(long, value_name = "ID", requires = "replay")]
    conversation: Option<String>,

    /// Replace UUIDs in a JSONL file with consistent placeholders
    #[arg(long, value_name = "FILE", conflicts_with = "replay")]
    anonymize: Option<PathBuf>,

    /// Output file for --anonymize (default: <input>.anonymized.jsonl)
    #[arg(short, long, requires = "anonymize", conflicts_with = "in_place")]
    output: Option<PathBuf>,

    /// Overwrite the input file when anonymizing
    #[arg(long, requires = "anonymize")]
    in_place: bool,

    /// Print the UUID mapping after anonymizing
    #[arg(long, requires = "anonymize")]
    show_mapping: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = config::Config::load();

    // Setup tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter(args.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Initialize config and exit
    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    if let Some(input) = args.anonymize {
        return run_anonymize(input, args.output, args.in_place, args.show_mapping);
    }

    if let Some(path) = args.replay {
        let events = replay::read_events(&path)?;
        let replayed = replay::replay(events, config.engine_config()).await;
        let only = args.conversation.map(ConversationId::new);
        let rendered = if args.json {
            replayed.to_json(only.as_ref())?
        } else {
            replayed.to_text(only.as_ref())?
        };
        println!("{}", rendered);
        return Ok(());
    }

    Args::command().print_help()?;
    Ok(())
}

fn run_anonymize(
    input: PathBuf,
    output: Option<PathBuf>,
    in_place: bool,
    show_mapping: bool,
) -> anyhow::Result<()> {
    if !input.exists() {
        anyhow::bail!("Input file '{}' does not exist", input.display());
    }

    let (written, mapping) = anonymize::anonymize_file(&input, output.as_deref(), in_place)?;
    println!("Anonymized {} unique UUIDs", mapping.len());
    if in_place {
        println!("Original file overwritten: {}", written.display());
    } else {
        println!("Output written to: {}", written.display());
    }

    if show_mapping {
        println!();
        for (original, anonymized) in &mapping {
            println!("{} -> {}", original, anonymized);
        }
    }
    Ok(())
}
