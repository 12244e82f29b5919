//! Heavy Metal Pollution Index CLI
//!
//! Computes pollution indices offline and talks to the HMPI service for
//! sample analysis, batch jobs and sample history.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{analyze, batch, indices, samples};

const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Heavy Metal Pollution Index CLI
#[derive(Parser)]
#[command(name = "hmpi")]
#[command(author, version, about = "CLI for the Heavy Metal Pollution Index service", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via HMPI_API_URL env var)
    #[arg(long, env = "HMPI_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute pollution indices locally without contacting the service
    Indices {
        /// Measurements as METAL=VALUE, e.g. lead=12.5
        #[arg(required = true)]
        measurements: Vec<String>,

        /// Concentration unit (mg/L or µg/L); detected when omitted
        #[arg(long, short)]
        unit: Option<String>,
    },

    /// Analyze a single sample and store it
    Analyze {
        /// Measurements as METAL=VALUE, e.g. arsenic=0.02
        #[arg(required = true)]
        measurements: Vec<String>,

        /// Sampling location name
        #[arg(long, short)]
        location: Option<String>,

        #[arg(long)]
        latitude: Option<f64>,

        #[arg(long)]
        longitude: Option<f64>,

        /// Concentration unit (mg/L or µg/L); detected when omitted
        #[arg(long, short)]
        unit: Option<String>,
    },

    /// Submit batches and track batch jobs
    #[command(subcommand)]
    Batch(BatchCommands),

    /// Browse and delete stored samples
    #[command(subcommand)]
    Samples(SamplesCommands),
}

#[derive(Subcommand)]
pub enum BatchCommands {
    /// Submit a JSON file containing an array of sample rows
    Submit {
        /// Path to the JSON file
        file: String,

        /// Metal columns to analyze (comma separated); all known columns when omitted
        #[arg(long, value_delimiter = ',')]
        metals: Option<Vec<String>>,
    },

    /// Show the status of a batch job
    Status {
        /// Job ID returned by `batch submit`
        job_id: String,
    },
}

#[derive(Subcommand)]
pub enum SamplesCommands {
    /// List stored samples, newest first
    List {
        /// Only samples from the last N days (0 disables the filter)
        #[arg(long, default_value = "30")]
        days: u32,

        /// Case-insensitive location name filter
        #[arg(long, short)]
        location: Option<String>,
    },

    /// Show a single stored sample
    Get {
        /// Sample ID
        id: String,
    },

    /// Delete stored samples
    Delete {
        /// Delete every stored sample
        #[arg(long, conflicts_with_all = ["ids", "from", "to"])]
        all: bool,

        /// Delete these sample IDs (comma separated)
        #[arg(long, value_delimiter = ',', conflicts_with_all = ["from", "to"])]
        ids: Option<Vec<String>>,

        /// Start of the date range (YYYY-MM-DD or RFC 3339)
        #[arg(long, requires = "to")]
        from: Option<String>,

        /// End of the date range, inclusive
        #[arg(long, requires = "from")]
        to: Option<String>,
    },
}

/// Resolve the API URL from flag, env, config file, then default
fn connect(cli_url: Option<String>, settings: &config::Config, verbose: bool) -> Result<client::ApiClient> {
    let api_url = cli_url
        .or_else(|| settings.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());
    if verbose {
        output::print_info(&format!("Using API at {}", api_url));
    }
    client::ApiClient::new(&api_url)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = config::Config::load()?;

    let format = cli
        .format
        .or_else(|| settings.output_format())
        .unwrap_or_default();

    match cli.command {
        Commands::Indices { measurements, unit } => {
            indices::compute(&measurements, unit.as_deref(), format)?;
        }
        Commands::Analyze {
            measurements,
            location,
            latitude,
            longitude,
            unit,
        } => {
            let client = connect(cli.api_url, &settings, cli.verbose)?;
            let args = analyze::AnalyzeArgs {
                measurements,
                location,
                latitude,
                longitude,
                unit,
            };
            analyze::analyze_sample(&client, args, format).await?;
        }
        Commands::Batch(batch_cmd) => {
            let client = connect(cli.api_url, &settings, cli.verbose)?;
            match batch_cmd {
                BatchCommands::Submit { file, metals } => {
                    batch::submit(&client, &file, metals, format).await?;
                }
                BatchCommands::Status { job_id } => {
                    batch::status(&client, &job_id, format).await?;
                }
            }
        }
        Commands::Samples(samples_cmd) => {
            let client = connect(cli.api_url, &settings, cli.verbose)?;
            match samples_cmd {
                SamplesCommands::List { days, location } => {
                    samples::list(&client, days, location, format).await?;
                }
                SamplesCommands::Get { id } => {
                    samples::get(&client, &id, format).await?;
                }
                SamplesCommands::Delete { all, ids, from, to } => {
                    let selection = samples::DeleteSelection::from_flags(all, ids, from, to)?;
                    samples::delete(&client, selection, format).await?;
                }
            }
        }
    }

    Ok(())
}
