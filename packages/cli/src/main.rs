#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line driver for the hazard map engine.
//!
//! ```text
//! hazard_map cluster --input reports.json --lat 34.05 --lng -118.25 [--radius-km 5] [--emergency] [--nearby]
//! hazard_map submit --input submissions.json
//! hazard_map partition --lat 34.05 --lng -118.25 [--neighbors 5]
//! hazard_map config
//! ```
//!
//! Every command accepts `--config <path>` to override the embedded
//! defaults. Set `RUST_LOG=debug` to see algorithm selection and cache
//! decisions.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use hazard_map_cache::TieredCache;
use hazard_map_cluster_models::{ClusterRequest, ClusterResponse};
use hazard_map_config::{DEFAULT_CONFIG_TOML, EngineConfig};
use hazard_map_geo::partition;
use hazard_map_report_models::{Location, NewReport, Report};
use hazard_map_service::{ClusteringService, InMemoryReportStore, ServiceError};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "hazard_map",
    about = "Cluster, deduplicate, and partition hazard reports"
)]
struct Cli {
    /// TOML file overriding the built-in configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster reports around a point and print the ranked result as JSON
    Cluster {
        /// JSON array of reports
        #[arg(long)]
        input: PathBuf,
        /// Center latitude
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Center longitude
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Only reports within this distance of the center are clustered
        #[arg(long, default_value = "5.0")]
        radius_km: f64,
        /// Restrict to high/critical reports and boost urgency in ranking
        #[arg(long)]
        emergency: bool,
        /// Load the input into a partitioned store and read it back through
        /// the partition fallback search instead of clustering it directly
        #[arg(long)]
        nearby: bool,
    },
    /// Submit new reports in order, rejecting duplicates
    Submit {
        /// JSON array of new reports
        #[arg(long)]
        input: PathBuf,
    },
    /// Print the partition key and fallback keys for a point
    Partition {
        /// Latitude
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        /// Longitude
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Maximum number of fallback keys
        #[arg(long, default_value_t = partition::DEFAULT_MAX_CANDIDATES)]
        neighbors: usize,
    },
    /// Print the built-in default configuration
    Config,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PartitionOutput {
    location: Location,
    partition_key: String,
    neighbor_keys: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitOutput {
    accepted: Vec<Report>,
    rejected: Vec<RejectedSubmission>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RejectedSubmission {
    index: usize,
    reason: String,
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn build_service(config: &EngineConfig, store: Arc<InMemoryReportStore>) -> ClusteringService {
    let cache = Arc::new(TieredCache::<ClusterResponse>::new(config.cache.clone()));
    ClusteringService::new(config, store, cache)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let config = EngineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Cluster {
            input,
            lat,
            lng,
            radius_km,
            emergency,
            nearby,
        } => {
            let reports: Vec<Report> = read_json(&input)?;
            log::info!("Loaded {} report(s) from {}", reports.len(), input.display());

            let center = Location::new(lat, lng)?;
            let store = Arc::new(if nearby {
                InMemoryReportStore::with_reports(reports.iter().cloned())
            } else {
                InMemoryReportStore::new()
            });
            let service = build_service(&config, store);

            let mut options = service.default_options();
            options.emergency_mode = emergency;
            let request = ClusterRequest {
                center,
                radius_km,
                options,
                force_refresh: false,
            };

            let response = if nearby {
                service.cluster_nearby(&request).await?
            } else {
                service.cluster_reports(&reports, &request)?
            };
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Commands::Submit { input } => {
            let submissions: Vec<NewReport> = read_json(&input)?;
            let store = Arc::new(InMemoryReportStore::new());
            let service = build_service(&config, store);

            let mut output = SubmitOutput {
                accepted: Vec::new(),
                rejected: Vec::new(),
            };
            for (index, submission) in submissions.into_iter().enumerate() {
                match service.submit_report(submission).await {
                    Ok(report) => output.accepted.push(report),
                    Err(
                        e @ (ServiceError::DuplicateReport { .. }
                        | ServiceError::InvalidInput { .. }),
                    ) => {
                        output.rejected.push(RejectedSubmission {
                            index,
                            reason: e.to_string(),
                        });
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            log::info!(
                "{} accepted, {} rejected",
                output.accepted.len(),
                output.rejected.len()
            );
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Partition {
            lat,
            lng,
            neighbors,
        } => {
            let location = Location::new(lat, lng)?;
            let output = PartitionOutput {
                location,
                partition_key: hazard_map_geo::key_for(location, partition::AUTO_REGION),
                neighbor_keys: hazard_map_geo::neighbor_keys(location, neighbors),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::Config => {
            print!("{DEFAULT_CONFIG_TOML}");
        }
    }

    Ok(())
}
