use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "argus", version, about = "Argus compliance detection and remediation")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate every control in the manifest and publish the findings.
    Detect {
        /// Path to argus.yaml
        #[arg(long, short = 'c', env = "ARGUS_CONFIG", default_value = "argus.yaml")]
        config: PathBuf,

        /// Also write the run summary as JSON to this file
        #[arg(long)]
        summary: Option<PathBuf>,
    },

    /// Remediate a single finding read from a file ("-" for stdin).
    Remediate {
        /// Path to argus.yaml
        #[arg(long, short = 'c', env = "ARGUS_CONFIG", default_value = "argus.yaml")]
        config: PathBuf,

        /// Finding JSON document
        #[arg(long)]
        finding: PathBuf,
    },

    /// Validate the configuration, manifest, capability table and rule set.
    Check {
        /// Path to argus.yaml
        #[arg(long, short = 'c', env = "ARGUS_CONFIG", default_value = "argus.yaml")]
        config: PathBuf,
    },

    /// Run the remediation HTTP server.
    Serve {
        /// Path to the server configuration (TOML)
        #[arg(
            long,
            short = 'c',
            env = "ARGUS_SERVER_CONFIG",
            default_value = "argus-server.toml"
        )]
        config: PathBuf,

        /// Override the bind address, e.g. 127.0.0.1:8080
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Detect { config, summary } => {
            commands::detect::run(&config, summary.as_deref()).await?
        }

        Command::Remediate { config, finding } => {
            commands::remediate::run(&config, &finding).await?
        }

        Command::Check { config } => commands::check::run(&config).await?,

        Command::Serve { config, bind } => commands::serve::run(&config, bind).await?,
    }

    Ok(())
}
