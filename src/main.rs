use anyhow::{Context, Result};
use clap::Parser;
use juicy_qc::cli::RootArgs;
use juicy_qc::config::CheckRegistry;
use juicy_qc::session::BrowserViewer;
use juicy_qc::workflow::{run, Outcome};

fn main() -> Result<()> {
    let args = RootArgs::parse();
    init_tracing(args.quiet, args.verbose)?;

    let config = args.run_config()?;
    let registry = CheckRegistry::load(&args.config_path())?;
    let viewer = BrowserViewer::new(config.session.browser_cmd.clone())?;

    match run(&registry, &config, &viewer)? {
        Outcome::NothingDiscovered => {
            println!("No images matching config formats found. Exiting...");
        }
        Outcome::NothingToDo => {
            println!("No files available to check. Exiting...");
        }
        Outcome::Summary(summary) => {
            if config.json {
                let text = serde_json::to_string_pretty(&summary).context("serialize summary")?;
                println!("{text}");
            } else {
                println!("{summary}");
            }
        }
        Outcome::Unlocked(count) => {
            println!("All locks removed ({count}).");
        }
        Outcome::Reviewed(report) => {
            for path in &report.saved {
                println!("\t{} saved", path.display());
            }
            if report.unreviewed > 0 {
                println!("{} item(s) released without a verdict.", report.unreviewed);
            }
            println!("Batch completed!");
        }
    }
    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("JUICY_QC_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
