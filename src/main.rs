use anyhow::Context;
use clap::{Parser, Subcommand};
use gita_rag::Result;
use gita_rag::commands::{init_config, run_ingest, run_query, show_config};
use gita_rag::config::{Config, get_config_dir};

#[derive(Parser)]
#[command(name = "gita-rag")]
#[command(about = "Ingest Gita verses, commentary and practices into a vector store and answer questions from them")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Embed and upsert every configured source file
    Ingest,
    /// Answer a question from the nearest stored records
    Query {
        /// The question to answer
        query: String,
        /// What the person is struggling with, e.g. "anger"
        concern: Option<String>,
        /// A narrower focus within the concern, e.g. "at work"
        subtopic: Option<String>,
    },
    /// Inspect or initialise the configuration file
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Write a default config.toml if none exists
        #[arg(long, conflicts_with = "show")]
        init: bool,
    },
}

fn load_config() -> anyhow::Result<Config> {
    let config_dir = get_config_dir().context("Failed to determine config directory")?;
    Config::load(&config_dir)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ingest => {
            let config = load_config()?;
            run_ingest(&config).await?;
        }
        Commands::Query {
            query,
            concern,
            subtopic,
        } => {
            let config = load_config()?;
            run_query(&config, &query, concern, subtopic).await?;
        }
        Commands::Config { show, init } => {
            let config = load_config()?;
            if init {
                init_config(&config)?;
            }
            if show || !init {
                show_config(&config)?;
            }
        }
    }

    Ok(())
}
