//! `dynconf` command-line client.
//!
//! ```text
//! dynconf --sources sources.yaml [--settings settings.toml] namespaces
//! dynconf --sources sources.yaml get <namespace> <key>
//! dynconf --sources sources.yaml watch <namespace> <key>
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use dynconf::config::{load_settings, Settings};
use dynconf::engine::unquote;
use dynconf::lifecycle::signals::wait_for_shutdown_signal;
use dynconf::observability::logging::init_logging;
use dynconf::{DriverRegistry, Engine};

#[derive(Parser)]
#[command(name = "dynconf")]
#[command(about = "Read and watch dynamic configuration", long_about = None)]
struct Cli {
    /// Source Descriptor file (JSON, YAML or TOML)
    #[arg(short, long)]
    sources: PathBuf,

    /// Runtime settings file (TOML)
    #[arg(long)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List every configured namespace
    Namespaces,
    /// Print the value of a key
    Get { namespace: String, key: String },
    /// Print the value of a key, then every change until interrupted
    Watch { namespace: String, key: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => load_settings(path)?,
        None => Settings::default(),
    };
    init_logging(&settings.observability);

    let registry = DriverRegistry::with_defaults(&settings);
    let engine = Engine::from_file(&cli.sources, &registry).await?;

    match cli.command {
        Commands::Namespaces => {
            for ns in engine.namespaces() {
                println!("{ns}");
            }
        }
        Commands::Get { namespace, key } => {
            println!("{}", engine.string(&namespace, &key).await?);
        }
        Commands::Watch { namespace, key } => {
            match engine.string(&namespace, &key).await {
                Ok(value) => println!("{value}"),
                Err(e) if e.is_not_found() => eprintln!("{namespace} {key}: not set"),
                Err(e) => return Err(e.into()),
            }

            let watching = engine.on_key_change(&namespace, &key, |raw| {
                println!("{}", unquote(&String::from_utf8_lossy(raw)));
                Ok(())
            });
            if !watching {
                engine.close();
                return Err(format!("{namespace} {key} cannot be watched").into());
            }

            wait_for_shutdown_signal().await;
        }
    }

    engine.close();
    Ok(())
}
