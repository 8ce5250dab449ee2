use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::strategy::{ExecutionStrategy, StrategyThresholds};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Knobs of the association engine. Invalid values are fatal at load time,
/// before any write happens.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub window_days: u32,
    pub min_support: i64,
    pub recency_weighting: bool,
    pub cross_category_boost: f64,
    pub same_brand_penalty: f64,
    pub per_product_cap: u32,
    pub max_pairs: u32,
    pub direct_max_line_items: i64,
    pub single_pass_max_line_items: i64,
    pub write_batch_size: u32,
    pub batch_retry_limit: u32,
    pub stale_max_age_days: u32,
    pub reapply_rules_after_batches: bool,
    pub force_strategy: Option<ExecutionStrategy>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub window_days: Option<u32>,
    pub min_support: Option<i64>,
    pub cross_category_boost: Option<f64>,
    pub same_brand_penalty: Option<f64>,
    pub per_product_cap: Option<u32>,
    pub recency_weighting: Option<bool>,
    pub force_strategy: Option<ExecutionStrategy>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://basketry.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            engine: EngineConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window_days: 365,
            min_support: 2,
            recency_weighting: true,
            cross_category_boost: 1.5,
            same_brand_penalty: 0.8,
            per_product_cap: 50,
            max_pairs: 100_000,
            direct_max_line_items: 50_000,
            single_pass_max_line_items: 200_000,
            write_batch_size: 500,
            batch_retry_limit: 3,
            stale_max_age_days: 180,
            reapply_rules_after_batches: false,
            force_strategy: None,
        }
    }
}

impl EngineConfig {
    pub fn thresholds(&self) -> StrategyThresholds {
        StrategyThresholds {
            direct_max: self.direct_max_line_items,
            single_pass_max: self.single_pass_max_line_items,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_days == 0 {
            return Err(ConfigError::Validation(
                "engine.window_days must be greater than zero".to_string(),
            ));
        }
        if self.min_support < 1 {
            return Err(ConfigError::Validation(
                "engine.min_support must be at least 1".to_string(),
            ));
        }
        if self.cross_category_boost <= 0.0 || !self.cross_category_boost.is_finite() {
            return Err(ConfigError::Validation(
                "engine.cross_category_boost must be a positive number".to_string(),
            ));
        }
        if self.same_brand_penalty <= 0.0 || !self.same_brand_penalty.is_finite() {
            return Err(ConfigError::Validation(
                "engine.same_brand_penalty must be a positive number".to_string(),
            ));
        }
        if self.per_product_cap == 0 {
            return Err(ConfigError::Validation(
                "engine.per_product_cap must be greater than zero".to_string(),
            ));
        }
        if self.max_pairs == 0 {
            return Err(ConfigError::Validation(
                "engine.max_pairs must be greater than zero".to_string(),
            ));
        }
        if self.direct_max_line_items <= 0
            || self.single_pass_max_line_items <= self.direct_max_line_items
        {
            return Err(ConfigError::Validation(
                "engine strategy thresholds must satisfy 0 < direct_max_line_items < single_pass_max_line_items"
                    .to_string(),
            ));
        }
        if self.write_batch_size == 0 || self.write_batch_size > 10_000 {
            return Err(ConfigError::Validation(
                "engine.write_batch_size must be in range 1..=10000".to_string(),
            ));
        }
        if self.batch_retry_limit > 10 {
            return Err(ConfigError::Validation(
                "engine.batch_retry_limit must be at most 10".to_string(),
            ));
        }
        if self.stale_max_age_days == 0 {
            return Err(ConfigError::Validation(
                "engine.stale_max_age_days must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("basketry.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(window_days) = engine.window_days {
                self.engine.window_days = window_days;
            }
            if let Some(min_support) = engine.min_support {
                self.engine.min_support = min_support;
            }
            if let Some(recency_weighting) = engine.recency_weighting {
                self.engine.recency_weighting = recency_weighting;
            }
            if let Some(cross_category_boost) = engine.cross_category_boost {
                self.engine.cross_category_boost = cross_category_boost;
            }
            if let Some(same_brand_penalty) = engine.same_brand_penalty {
                self.engine.same_brand_penalty = same_brand_penalty;
            }
            if let Some(per_product_cap) = engine.per_product_cap {
                self.engine.per_product_cap = per_product_cap;
            }
            if let Some(max_pairs) = engine.max_pairs {
                self.engine.max_pairs = max_pairs;
            }
            if let Some(direct_max_line_items) = engine.direct_max_line_items {
                self.engine.direct_max_line_items = direct_max_line_items;
            }
            if let Some(single_pass_max_line_items) = engine.single_pass_max_line_items {
                self.engine.single_pass_max_line_items = single_pass_max_line_items;
            }
            if let Some(write_batch_size) = engine.write_batch_size {
                self.engine.write_batch_size = write_batch_size;
            }
            if let Some(batch_retry_limit) = engine.batch_retry_limit {
                self.engine.batch_retry_limit = batch_retry_limit;
            }
            if let Some(stale_max_age_days) = engine.stale_max_age_days {
                self.engine.stale_max_age_days = stale_max_age_days;
            }
            if let Some(reapply_rules_after_batches) = engine.reapply_rules_after_batches {
                self.engine.reapply_rules_after_batches = reapply_rules_after_batches;
            }
            if let Some(force_strategy) = engine.force_strategy {
                self.engine.force_strategy = Some(force_strategy);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BASKETRY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BASKETRY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("BASKETRY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("BASKETRY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BASKETRY_ENGINE_WINDOW_DAYS") {
            self.engine.window_days = parse_u32("BASKETRY_ENGINE_WINDOW_DAYS", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_ENGINE_MIN_SUPPORT") {
            self.engine.min_support = parse_i64("BASKETRY_ENGINE_MIN_SUPPORT", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_ENGINE_RECENCY_WEIGHTING") {
            self.engine.recency_weighting = parse_bool("BASKETRY_ENGINE_RECENCY_WEIGHTING", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_ENGINE_CROSS_CATEGORY_BOOST") {
            self.engine.cross_category_boost =
                parse_f64("BASKETRY_ENGINE_CROSS_CATEGORY_BOOST", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_ENGINE_SAME_BRAND_PENALTY") {
            self.engine.same_brand_penalty =
                parse_f64("BASKETRY_ENGINE_SAME_BRAND_PENALTY", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_ENGINE_PER_PRODUCT_CAP") {
            self.engine.per_product_cap = parse_u32("BASKETRY_ENGINE_PER_PRODUCT_CAP", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_ENGINE_MAX_PAIRS") {
            self.engine.max_pairs = parse_u32("BASKETRY_ENGINE_MAX_PAIRS", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_ENGINE_WRITE_BATCH_SIZE") {
            self.engine.write_batch_size = parse_u32("BASKETRY_ENGINE_WRITE_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_ENGINE_BATCH_RETRY_LIMIT") {
            self.engine.batch_retry_limit = parse_u32("BASKETRY_ENGINE_BATCH_RETRY_LIMIT", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_ENGINE_STALE_MAX_AGE_DAYS") {
            self.engine.stale_max_age_days =
                parse_u32("BASKETRY_ENGINE_STALE_MAX_AGE_DAYS", &value)?;
        }
        if let Some(value) = read_env("BASKETRY_ENGINE_FORCE_STRATEGY") {
            self.engine.force_strategy =
                Some(ExecutionStrategy::parse(&value).ok_or(ConfigError::InvalidEnvOverride {
                    key: "BASKETRY_ENGINE_FORCE_STRATEGY".to_string(),
                    value,
                })?);
        }

        let log_level = read_env("BASKETRY_LOGGING_LEVEL").or_else(|| read_env("BASKETRY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BASKETRY_LOGGING_FORMAT").or_else(|| read_env("BASKETRY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(window_days) = overrides.window_days {
            self.engine.window_days = window_days;
        }
        if let Some(min_support) = overrides.min_support {
            self.engine.min_support = min_support;
        }
        if let Some(cross_category_boost) = overrides.cross_category_boost {
            self.engine.cross_category_boost = cross_category_boost;
        }
        if let Some(same_brand_penalty) = overrides.same_brand_penalty {
            self.engine.same_brand_penalty = same_brand_penalty;
        }
        if let Some(per_product_cap) = overrides.per_product_cap {
            self.engine.per_product_cap = per_product_cap;
        }
        if let Some(recency_weighting) = overrides.recency_weighting {
            self.engine.recency_weighting = recency_weighting;
        }
        if let Some(force_strategy) = overrides.force_strategy {
            self.engine.force_strategy = Some(force_strategy);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        self.engine.validate()?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("basketry.toml"), PathBuf::from("config/basketry.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    engine: Option<EnginePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    window_days: Option<u32>,
    min_support: Option<i64>,
    recency_weighting: Option<bool>,
    cross_category_boost: Option<f64>,
    same_brand_penalty: Option<f64>,
    per_product_cap: Option<u32>,
    max_pairs: Option<u32>,
    direct_max_line_items: Option<i64>,
    single_pass_max_line_items: Option<i64>,
    write_batch_size: Option<u32>,
    batch_retry_limit: Option<u32>,
    stale_max_age_days: Option<u32>,
    reapply_rules_after_batches: Option<bool>,
    force_strategy: Option<ExecutionStrategy>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
