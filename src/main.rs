//! depslice CLI: extract one entity at one cycle from a simulation record document.

use std::path::PathBuf;

use clap::Parser;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use depslice::config::ExtractorConfig;
use depslice::export::ExtractionRequest;
use depslice::extractor::Extractor;

#[derive(Parser)]
#[command(
    name = "depslice",
    version,
    about = "Extract per-entity, per-cycle values from nested simulation records"
)]
struct Cli {
    /// Source document (JSON record format).
    #[arg(long, default_value = "subset.json")]
    source: PathBuf,

    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the serializer's maximum recursion depth.
    #[arg(long)]
    max_depth: Option<usize>,

    /// Also write the JSON document to this file.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Report variables, time axis and root structure without extracting.
    #[arg(long, conflicts_with_all = ["cycles", "entity_id", "cycle_number"])]
    summary: bool,

    /// List the valid cycle indices.
    #[arg(long, conflicts_with_all = ["entity_id", "cycle_number"])]
    cycles: bool,

    /// Entity index (axis 0 of each field).
    #[arg(required_unless_present_any = ["summary", "cycles"])]
    entity_id: Option<usize>,

    /// Cycle index into the time axis.
    #[arg(required_unless_present_any = ["summary", "cycles"])]
    cycle_number: Option<usize>,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // clap exits with 2 on usage errors; malformed arguments exit with 1 here.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { 1 } else { 0 };
            e.print().ok();
            std::process::exit(code);
        }
    };

    let mut config = match &cli.config {
        Some(path) => ExtractorConfig::load(path)?,
        None => ExtractorConfig::default(),
    };
    if let Some(depth) = cli.max_depth {
        config.serializer.max_depth = depth;
    }

    let extractor = Extractor::open(&cli.source, config)?;

    if cli.summary {
        emit(&extractor.summary(), cli.output.as_ref())
    } else if cli.cycles {
        emit(&extractor.available_cycles(), cli.output.as_ref())
    } else {
        let (Some(entity_id), Some(cycle_number)) = (cli.entity_id, cli.cycle_number) else {
            miette::bail!("both <ENTITY_ID> and <CYCLE_NUMBER> are required");
        };
        let result = extractor.extract(ExtractionRequest::new(entity_id, cycle_number));
        emit(&result, cli.output.as_ref())
    }
}

/// Print pretty JSON to stdout and optionally save it.
fn emit<T: Serialize>(document: &T, output: Option<&PathBuf>) -> Result<()> {
    let text = serde_json::to_string_pretty(document).into_diagnostic()?;
    println!("{text}");
    if let Some(path) = output {
        std::fs::write(path, &text).into_diagnostic()?;
        tracing::info!(path = %path.display(), "result written");
    }
    Ok(())
}
