//! Application configuration
//!
//! Sources, lowest precedence first:
//! 1. built-in defaults
//! 2. the YAML file given by `--config` (optional)
//! 3. `NEWSLABEL__`-prefixed environment variables, `__` between path segments
//!    (e.g. `NEWSLABEL__CLASSIFIER__MODEL`)
//! 4. flat variables such as `OPENAI_API_KEY` and `MAX_RPM`
//! 5. command-line flags

use crate::cli::ProcessArgs;
use newslabel_batch::RunConfig;
use newslabel_classifiers::ClassifierSettings;
use newslabel_core::{CostModel, Error, ModelPricing, Result};
use newslabel_telemetry::CheckpointConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub type EnvMap = config::Map<String, String>;

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub classifier: ClassifierSettings,

    #[serde(default)]
    pub run: RunConfig,

    /// Dataset CSV path
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Checkpoint and result directory
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// fsync the checkpoint after every record
    #[serde(default = "default_true")]
    pub fsync: bool,

    /// Per-1K-token prices by model
    #[serde(default = "default_pricing")]
    pub pricing: CostModel,

    /// Plain-text log file, appended alongside console output
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl AppConfig {
    /// Load from the process environment and an optional YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let env: EnvMap = std::env::vars().collect();
        Self::load_from(path, &env)
    }

    /// Load from an explicit set of environment variables
    pub fn load_from(path: &Path, env: &EnvMap) -> Result<Self> {
        let defaults = config::Config::try_from(&Self::default()).map_err(config_error)?;
        let builder = config::Config::builder()
            .add_source(defaults)
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("NEWSLABEL")
                    .prefix_separator("__")
                    .separator("__")
                    .source(Some(env.clone())),
            );

        let mut config: Self = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(config_error)?;
        config.apply_legacy_env(env)?;
        Ok(config)
    }

    /// Apply the flat variables of earlier releases
    pub fn apply_legacy_env(&mut self, env: &EnvMap) -> Result<()> {
        let classifier = &mut self.classifier;
        if let Some(v) = env.get("OPENAI_API_KEY") {
            classifier.backend.api_key = v.clone();
        }
        if let Some(v) = env.get("OPENAI_BASE_URL") {
            classifier.backend.api_base_url = v.clone();
        }
        if let Some(v) = env.get("DEFAULT_MODEL") {
            classifier.model = v.clone();
        }
        if let Some(v) = env.get("FALLBACK_MODEL") {
            classifier.fallback_model = Some(v.clone());
        }
        if let Some(v) = parse_var(env, "MAX_TOKENS")? {
            classifier.max_tokens = v;
        }
        if let Some(v) = parse_var(env, "TEMPERATURE")? {
            classifier.temperature = v;
        }
        if let Some(v) = parse_var(env, "MAX_RPM")? {
            classifier.rate_limits.max_rpm = v;
        }
        if let Some(v) = parse_var(env, "MAX_TPM")? {
            classifier.rate_limits.max_tpm = v;
        }
        if let Some(v) = parse_var(env, "CONFIDENCE_THRESHOLD")? {
            classifier.confidence_threshold = v;
        }
        if let Some(v) = parse_var(env, "MAX_RETRIES")? {
            classifier.retry.max_retries = v;
        }
        // seconds
        if let Some(v) = parse_var::<u64>(env, "RETRY_DELAY")? {
            classifier.retry.retry_delay_ms = v * 1000;
            classifier.retry.max_retry_delay_ms = classifier.retry.max_retry_delay_ms.max(v * 1000);
        }
        if let Some(v) = parse_var(env, "BATCH_SIZE")? {
            self.run.batch_size = v;
        }
        if let Some(v) = env.get("DATA_PATH") {
            self.data_path = PathBuf::from(v);
        }
        if let Some(v) = env.get("OUTPUT_PATH") {
            self.output_dir = PathBuf::from(v);
        }
        if let Some(v) = env.get("LOG_FILE").filter(|v| !v.trim().is_empty()) {
            self.log_file = Some(PathBuf::from(v));
        }
        Ok(())
    }

    /// Apply `process` command-line overrides
    pub fn apply_args(&mut self, args: &ProcessArgs) {
        if let Some(data) = &args.data {
            self.data_path = data.clone();
        }
        if let Some(batch_size) = args.batch_size {
            self.run.batch_size = batch_size;
        }
        if let Some(start_from) = args.start_from {
            self.run.start_offset = start_from;
        }
        if args.max_records.is_some() {
            self.run.max_records = args.max_records;
        }
        if let Some(output_dir) = &args.output_dir {
            self.output_dir = output_dir.clone();
        }
    }

    /// Check everything a processing run depends on
    pub fn validate(&self) -> Result<()> {
        self.classifier.validate()?;
        self.run.validate()?;
        self.validate_pricing()
    }

    /// Every model that may be called must have pricing
    pub fn validate_pricing(&self) -> Result<()> {
        for model in self.classifier.models() {
            if !self.pricing.contains(model) {
                return Err(Error::config(format!(
                    "no pricing configured for model '{}'",
                    model
                )));
            }
        }
        Ok(())
    }

    pub fn checkpoint(&self) -> CheckpointConfig {
        CheckpointConfig {
            dir: self.output_dir.clone(),
            fsync: self.fsync,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierSettings::default(),
            run: RunConfig::default(),
            data_path: default_data_path(),
            output_dir: default_output_dir(),
            fsync: true,
            pricing: default_pricing(),
            log_file: None,
        }
    }
}

fn parse_var<T: FromStr>(env: &EnvMap, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    env.get(name)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| Error::config(format!("invalid {} '{}': {}", name, raw, e)))
        })
        .transpose()
}

fn config_error(e: config::ConfigError) -> Error {
    Error::config(e.to_string())
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/tnmt_subtopic_data.csv")
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_true() -> bool {
    true
}

/// $0.15 per 1M tokens for both default models
fn default_pricing() -> CostModel {
    let pricing = ModelPricing::new(0.00015, 0.00015);
    CostModel::new()
        .with_model("gpt-4o-mini-2024-07-18", pricing)
        .with_model("gpt-4o-mini", pricing)
}
