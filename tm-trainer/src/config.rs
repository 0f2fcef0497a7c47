//! Configuration resolution for tm-trainer
//!
//! Each setting resolves CLI flag → environment variable → TOML → default.
//! clap folds the first two together through its `env` attribute.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tm_common::config::{is_valid_value, TomlConfig};
use tm_common::{Error, Result};
use tracing::{info, warn};

use crate::services::training_orchestrator::{
    DEFAULT_DOMAIN_NAME, DEFAULT_JOB_RETENTION, DEFAULT_PUBLISH_NAME,
};
use crate::services::{
    EnhancementFailurePolicy, IngestionSettings, OrchestratorSettings, PollSettings,
    PROVIDER_MAX_BATCH,
};
use crate::utils::RetryPolicy;

/// Module name used for the default config file (`<config_dir>/tm/tm-trainer.toml`)
pub const MODULE_NAME: &str = "tm-trainer";

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Command-line arguments
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "tm-trainer", version, about = "Image classification training service")]
pub struct CliArgs {
    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Folder holding the database, uploads and enhanced images
    #[arg(long, value_name = "PATH")]
    pub root_folder: Option<PathBuf>,

    #[arg(long, env = "TM_PORT")]
    pub port: Option<u16>,

    #[arg(long, env = "TM_BIND_ADDRESS")]
    pub bind_address: Option<String>,

    /// Custom Vision resource endpoint (training and prediction)
    #[arg(long, env = "TM_TRAINING_ENDPOINT")]
    pub training_endpoint: Option<String>,

    #[arg(long, env = "TM_TRAINING_KEY", hide_env_values = true)]
    pub training_key: Option<String>,

    #[arg(long, env = "TM_PREDICTION_KEY", hide_env_values = true)]
    pub prediction_key: Option<String>,

    /// Resource id iterations are published to
    #[arg(long, env = "TM_PREDICTION_RESOURCE_ID")]
    pub prediction_resource_id: Option<String>,

    /// Computer Vision endpoint used for image enhancement
    #[arg(long, env = "TM_VISION_ENDPOINT")]
    pub vision_endpoint: Option<String>,

    #[arg(long, env = "TM_VISION_KEY", hide_env_values = true)]
    pub vision_key: Option<String>,

    /// "abort" or "fallback"
    #[arg(long, env = "TM_ENHANCEMENT_FAILURE_POLICY")]
    pub enhancement_failure_policy: Option<EnhancementFailurePolicy>,

    /// Images per upload batch (1-64)
    #[arg(long, env = "TM_BATCH_LIMIT")]
    pub batch_limit: Option<usize>,
}

/// Enhancement service connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionConfig {
    pub endpoint: String,
    pub key: String,
}

/// Fully resolved service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub root_folder: PathBuf,
    pub port: u16,
    pub bind_address: String,
    pub training_endpoint: String,
    pub training_key: String,
    pub prediction_key: String,
    /// `None` disables enhancement
    pub vision: Option<VisionConfig>,
    pub orchestrator: OrchestratorSettings,
}

impl ServiceConfig {
    /// Merge CLI/ENV arguments over the TOML file
    pub fn resolve(args: &CliArgs, toml: &TomlConfig) -> Result<Self> {
        let root_folder =
            tm_common::config::resolve_root_folder(args.root_folder.as_deref(), toml);

        let port = pick("port", args.port, toml.port).unwrap_or(DEFAULT_PORT);
        let bind_address = args
            .bind_address
            .clone()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let provider = &toml.provider;
        let training_endpoint = required(
            "training endpoint",
            "TM_TRAINING_ENDPOINT",
            pick_secret(
                "training endpoint",
                args.training_endpoint.clone(),
                provider.training_endpoint.clone(),
            ),
        )?;
        let training_key = required(
            "training key",
            "TM_TRAINING_KEY",
            pick_secret("training key", args.training_key.clone(), provider.training_key.clone()),
        )?;
        let prediction_key = required(
            "prediction key",
            "TM_PREDICTION_KEY",
            pick_secret(
                "prediction key",
                args.prediction_key.clone(),
                provider.prediction_key.clone(),
            ),
        )?;
        let prediction_resource_id = required(
            "prediction resource id",
            "TM_PREDICTION_RESOURCE_ID",
            pick_secret(
                "prediction resource id",
                args.prediction_resource_id.clone(),
                provider.prediction_resource_id.clone(),
            ),
        )?;

        let vision_endpoint = pick_secret(
            "vision endpoint",
            args.vision_endpoint.clone(),
            toml.enhancement.endpoint.clone(),
        );
        let vision_key = pick_secret("vision key", args.vision_key.clone(), toml.enhancement.key.clone());
        let vision = match (vision_endpoint, vision_key) {
            (Some(endpoint), Some(key)) => Some(VisionConfig { endpoint, key }),
            (None, None) => {
                info!("No vision endpoint configured, image enhancement disabled");
                None
            }
            _ => {
                return Err(Error::Config(
                    "Image enhancement needs both TM_VISION_ENDPOINT and TM_VISION_KEY".to_string(),
                ))
            }
        };

        let toml_policy = match toml.enhancement.failure_policy.as_deref() {
            Some(text) => Some(text.parse::<EnhancementFailurePolicy>().map_err(Error::Config)?),
            None => None,
        };
        let enhancement_policy = pick(
            "enhancement failure policy",
            args.enhancement_failure_policy,
            toml_policy,
        )
        .unwrap_or_default();

        let training = &toml.training;
        let batch_limit = pick("batch limit", args.batch_limit, training.batch_limit)
            .unwrap_or(PROVIDER_MAX_BATCH);
        if batch_limit == 0 || batch_limit > PROVIDER_MAX_BATCH {
            warn!(
                batch_limit,
                max = PROVIDER_MAX_BATCH,
                "Batch limit out of range, clamping"
            );
        }

        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: training
                .retry_max_attempts
                .unwrap_or(retry_defaults.max_attempts)
                .max(1),
            initial_backoff: training
                .retry_initial_backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.initial_backoff),
            max_backoff: retry_defaults.max_backoff,
        };

        let poll_defaults = PollSettings::default();
        let poll = PollSettings {
            base_interval: training
                .poll_base_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(poll_defaults.base_interval),
            backoff_factor: training
                .poll_backoff_factor
                .unwrap_or(poll_defaults.backoff_factor),
            max_interval: training
                .poll_max_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(poll_defaults.max_interval),
            max_wait: training
                .poll_max_wait_secs
                .map(Duration::from_secs)
                .unwrap_or(poll_defaults.max_wait),
            retry,
        };

        let orchestrator = OrchestratorSettings {
            domain_name: provider
                .domain_name
                .clone()
                .filter(|v| is_valid_value(v))
                .unwrap_or_else(|| DEFAULT_DOMAIN_NAME.to_string()),
            publish_name: provider
                .publish_name
                .clone()
                .filter(|v| is_valid_value(v))
                .unwrap_or_else(|| DEFAULT_PUBLISH_NAME.to_string()),
            prediction_resource_id,
            retry,
            ingestion: IngestionSettings {
                batch_limit,
                enhancement_policy,
                save_enhanced: toml.enhancement.save_enhanced.unwrap_or(true),
                retry,
            },
            poll,
            job_retention: training
                .job_retention_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_JOB_RETENTION),
        };

        Ok(Self {
            root_folder,
            port,
            bind_address,
            training_endpoint,
            training_key,
            prediction_key,
            vision,
            orchestrator,
        })
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("tm.db")
    }
}

/// CLI/ENV value if present, else TOML; warns when both are set and differ
fn pick<T: PartialEq + std::fmt::Debug>(name: &str, cli: Option<T>, toml: Option<T>) -> Option<T> {
    match (cli, toml) {
        (Some(cli), Some(toml)) => {
            if cli != toml {
                warn!(
                    "{} set in both command line/environment ({:?}) and TOML ({:?}). Using command line/environment.",
                    name, cli, toml
                );
            }
            Some(cli)
        }
        (Some(cli), None) => Some(cli),
        (None, toml) => toml,
    }
}

/// Like `pick`, for values that must not be logged; blank values count as unset
fn pick_secret(name: &str, cli: Option<String>, toml: Option<String>) -> Option<String> {
    let cli = cli.filter(|v| is_valid_value(v));
    let toml = toml.filter(|v| is_valid_value(v));

    match (cli, toml) {
        (Some(cli), Some(_)) => {
            warn!(
                "{} found in multiple sources: command line/environment, TOML. Using command line/environment.",
                name
            );
            Some(cli)
        }
        (Some(cli), None) => {
            info!("{} loaded from command line/environment", name);
            Some(cli)
        }
        (None, Some(toml)) => {
            info!("{} loaded from TOML config", name);
            Some(toml)
        }
        (None, None) => None,
    }
}

fn required(name: &str, env_var: &str, value: Option<String>) -> Result<String> {
    value.ok_or_else(|| {
        Error::Config(format!(
            "{} not configured. Please configure using one of:\n\
             1. Environment: {}=...\n\
             2. TOML config: ~/.config/tm/{}.toml ([provider] section)",
            name, env_var, MODULE_NAME
        ))
    })
}
