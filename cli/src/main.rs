use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};

use critpath::{analyze_files, init_logging, report, Session};
use critpath_core::{BlockingPolicy, Config};

#[derive(Parser)]
#[command(name = "critpath")]
#[command(about = "Critical path analysis for distributed traces", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "critpath.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the critical path of every trace in a JSON file
    Analyze {
        file: PathBuf,
        /// Output raw JSON
        #[arg(long)]
        json: bool,
        /// Override the blocking policy from config (auto, references, span_kinds, combined)
        #[arg(long)]
        policy: Option<BlockingPolicy>,
    },

    /// Analyze several trace files concurrently
    Batch {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Output raw JSON
        #[arg(long)]
        json: bool,
        /// Override the blocking policy from config
        #[arg(long)]
        policy: Option<BlockingPolicy>,
    },

    /// Print the default configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::from_file(&cli.config)?
    } else {
        Config::default()
    };
    config.validate()?;
    init_logging(&config.logging);

    if cli.config.exists() {
        tracing::debug!("Loaded configuration from {:?}", cli.config);
    }

    match cli.command {
        Commands::Analyze { file, json, policy } => {
            let session = Arc::new(Session::with_policy(&config, policy));
            run(session, vec![file], json).await
        }
        Commands::Batch {
            files,
            json,
            policy,
        } => {
            let session = Arc::new(Session::with_policy(&config, policy));
            run(session, files, json).await
        }
        Commands::Config => {
            print!("{}", Config::default_toml()?);
            Ok(())
        }
    }
}

async fn run(session: Arc<Session>, files: Vec<PathBuf>, json: bool) -> Result<()> {
    let reports = analyze_files(session, files).await;

    if json {
        println!("{}", report::reports_to_json(&reports)?);
    } else {
        print!("{}", report::render_reports(&reports));
    }

    let failed = reports.iter().filter(|r| !r.is_ok()).count();
    if failed > 0 {
        anyhow::bail!("{} of {} files could not be analyzed", failed, reports.len());
    }
    Ok(())
}
