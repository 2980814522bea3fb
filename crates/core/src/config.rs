use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub reconcile: ReconcileConfig,
    pub extractor: ExtractorConfig,
    pub logging: LoggingConfig,
}

/// Tolerance policy for the reconciliation engine. Threaded explicitly
/// through normalize/reconcile calls; never read from process-wide state.
#[derive(Clone, Debug)]
pub struct ReconcileConfig {
    pub reference_currency: String,
    /// Relative difference (in percent) up to which a pair still counts as
    /// a match.
    pub minor_threshold_pct: Decimal,
    /// Relative difference (in percent) above which a discrepancy is major.
    pub major_threshold_pct: Decimal,
    /// Tolerance (in percent) for line-amount and total-vs-line-sum
    /// rounding noise.
    pub line_tolerance_pct: Decimal,
    /// Candidates below this extraction confidence are not reconciled.
    pub confidence_floor: Decimal,
}

#[derive(Clone, Debug)]
pub struct ExtractorConfig {
    /// Concurrent extraction calls. Sized for the external API's rate
    /// limits, not for CPU count.
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub timeout_secs: u64,
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

impl FromStr for LogFormat {
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

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub reference_currency: Option<String>,
    pub minor_threshold_pct: Option<Decimal>,
    pub major_threshold_pct: Option<Decimal>,
    pub max_concurrency: Option<usize>,
    pub log_level: Option<String>,
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
    #[error("invalid value for `{key}`: `{value}`")]
    InvalidValue { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            reconcile: ReconcileConfig {
                reference_currency: "USD".to_string(),
                minor_threshold_pct: Decimal::ONE,
                major_threshold_pct: Decimal::new(5, 0),
                line_tolerance_pct: Decimal::new(5, 1),
                confidence_floor: Decimal::new(5, 1),
            },
            extractor: ExtractorConfig {
                max_concurrency: 6,
                max_retries: 3,
                retry_base_delay_ms: 1_000,
                timeout_secs: 60,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("aduana.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(reconcile) = patch.reconcile {
            if let Some(reference_currency) = reconcile.reference_currency {
                self.reconcile.reference_currency = reference_currency;
            }
            if let Some(value) = reconcile.minor_threshold_pct {
                self.reconcile.minor_threshold_pct =
                    decimal_value("reconcile.minor_threshold_pct", value)?;
            }
            if let Some(value) = reconcile.major_threshold_pct {
                self.reconcile.major_threshold_pct =
                    decimal_value("reconcile.major_threshold_pct", value)?;
            }
            if let Some(value) = reconcile.line_tolerance_pct {
                self.reconcile.line_tolerance_pct =
                    decimal_value("reconcile.line_tolerance_pct", value)?;
            }
            if let Some(value) = reconcile.confidence_floor {
                self.reconcile.confidence_floor =
                    decimal_value("reconcile.confidence_floor", value)?;
            }
        }

        if let Some(extractor) = patch.extractor {
            if let Some(max_concurrency) = extractor.max_concurrency {
                self.extractor.max_concurrency = max_concurrency;
            }
            if let Some(max_retries) = extractor.max_retries {
                self.extractor.max_retries = max_retries;
            }
            if let Some(retry_base_delay_ms) = extractor.retry_base_delay_ms {
                self.extractor.retry_base_delay_ms = retry_base_delay_ms;
            }
            if let Some(timeout_secs) = extractor.timeout_secs {
                self.extractor.timeout_secs = timeout_secs;
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

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("ADUANA_REFERENCE_CURRENCY") {
            self.reconcile.reference_currency = value;
        }
        if let Some(value) = read_env("ADUANA_MINOR_THRESHOLD_PCT") {
            self.reconcile.minor_threshold_pct =
                parse_decimal("ADUANA_MINOR_THRESHOLD_PCT", &value)?;
        }
        if let Some(value) = read_env("ADUANA_MAJOR_THRESHOLD_PCT") {
            self.reconcile.major_threshold_pct =
                parse_decimal("ADUANA_MAJOR_THRESHOLD_PCT", &value)?;
        }
        if let Some(value) = read_env("ADUANA_LINE_TOLERANCE_PCT") {
            self.reconcile.line_tolerance_pct =
                parse_decimal("ADUANA_LINE_TOLERANCE_PCT", &value)?;
        }
        if let Some(value) = read_env("ADUANA_CONFIDENCE_FLOOR") {
            self.reconcile.confidence_floor = parse_decimal("ADUANA_CONFIDENCE_FLOOR", &value)?;
        }

        if let Some(value) = read_env("ADUANA_MAX_CONCURRENCY") {
            self.extractor.max_concurrency = parse_usize("ADUANA_MAX_CONCURRENCY", &value)?;
        }
        if let Some(value) = read_env("ADUANA_MAX_RETRIES") {
            self.extractor.max_retries = parse_u32("ADUANA_MAX_RETRIES", &value)?;
        }
        if let Some(value) = read_env("ADUANA_RETRY_BASE_DELAY_MS") {
            self.extractor.retry_base_delay_ms =
                parse_u64("ADUANA_RETRY_BASE_DELAY_MS", &value)?;
        }
        if let Some(value) = read_env("ADUANA_EXTRACTOR_TIMEOUT_SECS") {
            self.extractor.timeout_secs = parse_u64("ADUANA_EXTRACTOR_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ADUANA_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = read_env("ADUANA_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(reference_currency) = overrides.reference_currency {
            self.reconcile.reference_currency = reference_currency;
        }
        if let Some(minor_threshold_pct) = overrides.minor_threshold_pct {
            self.reconcile.minor_threshold_pct = minor_threshold_pct;
        }
        if let Some(major_threshold_pct) = overrides.major_threshold_pct {
            self.reconcile.major_threshold_pct = major_threshold_pct;
        }
        if let Some(max_concurrency) = overrides.max_concurrency {
            self.extractor.max_concurrency = max_concurrency;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    /// Fatal checks. A run with an invalid tolerance policy could not
    /// produce a meaningful verdict, so it must never start.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_reconcile(&self.reconcile)?;
        validate_extractor(&self.extractor)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("aduana.toml"), PathBuf::from("config/aduana.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    toml::from_str::<ConfigPatch>(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn validate_reconcile(reconcile: &ReconcileConfig) -> Result<(), ConfigError> {
    if reconcile.reference_currency.trim().is_empty() {
        return Err(ConfigError::Validation(
            "reconcile.reference_currency is required".to_string(),
        ));
    }

    if reconcile.minor_threshold_pct <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "reconcile.minor_threshold_pct must be greater than zero".to_string(),
        ));
    }

    if reconcile.major_threshold_pct <= reconcile.minor_threshold_pct {
        return Err(ConfigError::Validation(
            "reconcile.major_threshold_pct must exceed minor_threshold_pct".to_string(),
        ));
    }

    if reconcile.line_tolerance_pct < Decimal::ZERO {
        return Err(ConfigError::Validation(
            "reconcile.line_tolerance_pct must not be negative".to_string(),
        ));
    }

    if reconcile.confidence_floor < Decimal::ZERO || reconcile.confidence_floor > Decimal::ONE {
        return Err(ConfigError::Validation(
            "reconcile.confidence_floor must be in range 0..=1".to_string(),
        ));
    }

    Ok(())
}

fn validate_extractor(extractor: &ExtractorConfig) -> Result<(), ConfigError> {
    if extractor.max_concurrency == 0 || extractor.max_concurrency > 64 {
        return Err(ConfigError::Validation(
            "extractor.max_concurrency must be in range 1..=64".to_string(),
        ));
    }

    if extractor.max_retries > 10 {
        return Err(ConfigError::Validation(
            "extractor.max_retries must be at most 10".to_string(),
        ));
    }

    if extractor.retry_base_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "extractor.retry_base_delay_ms must be greater than zero".to_string(),
        ));
    }

    if extractor.timeout_secs == 0 || extractor.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "extractor.timeout_secs must be in range 1..=600".to_string(),
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

fn decimal_value(key: &str, value: f64) -> Result<Decimal, ConfigError> {
    Decimal::try_from(value).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    Decimal::from_str(value.trim()).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    reconcile: Option<ReconcilePatch>,
    extractor: Option<ExtractorPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct ReconcilePatch {
    reference_currency: Option<String>,
    minor_threshold_pct: Option<f64>,
    major_threshold_pct: Option<f64>,
    line_tolerance_pct: Option<f64>,
    confidence_floor: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractorPatch {
    max_concurrency: Option<usize>,
    max_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    const ALL_VARS: &[&str] = &[
        "ADUANA_REFERENCE_CURRENCY",
        "ADUANA_MINOR_THRESHOLD_PCT",
        "ADUANA_MAJOR_THRESHOLD_PCT",
        "ADUANA_LINE_TOLERANCE_PCT",
        "ADUANA_CONFIDENCE_FLOOR",
        "ADUANA_MAX_CONCURRENCY",
        "ADUANA_MAX_RETRIES",
        "ADUANA_RETRY_BASE_DELAY_MS",
        "ADUANA_EXTRACTOR_TIMEOUT_SECS",
        "ADUANA_LOG_LEVEL",
        "ADUANA_LOG_FORMAT",
    ];

    fn clear_vars() {
        for var in ALL_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn defaults_validate() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars();

        let config = AppConfig::load(LoadOptions::default()).expect("default config loads");
        assert_eq!(config.reconcile.reference_currency, "USD");
        assert_eq!(config.reconcile.minor_threshold_pct, Decimal::ONE);
        assert_eq!(config.reconcile.major_threshold_pct, Decimal::new(5, 0));
        assert_eq!(config.extractor.max_concurrency, 6);
        assert_eq!(config.extractor.max_retries, 3);
        assert_eq!(config.logging.format, LogFormat::Compact);
    }

    #[test]
    fn precedence_defaults_file_env_overrides() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars();

        env::set_var("ADUANA_MAJOR_THRESHOLD_PCT", "7.5");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("aduana.toml");
            fs::write(
                &path,
                r#"
[reconcile]
minor_threshold_pct = 2.0
major_threshold_pct = 4.0

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            // file beats defaults
            if config.reconcile.minor_threshold_pct != Decimal::new(2, 0) {
                return Err("file minor threshold should win over default".to_string());
            }
            // env beats file
            if config.reconcile.major_threshold_pct != Decimal::new(75, 1) {
                return Err("env major threshold should win over file".to_string());
            }
            // explicit overrides beat everything
            if config.logging.level != "debug" {
                return Err("override log level should win".to_string());
            }
            Ok(())
        })();

        clear_vars();
        result.expect("precedence holds");
    }

    #[test]
    fn unordered_thresholds_fail_validation() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars();

        env::set_var("ADUANA_MINOR_THRESHOLD_PCT", "5");
        env::set_var("ADUANA_MAJOR_THRESHOLD_PCT", "5");

        let error = AppConfig::load(LoadOptions::default())
            .expect_err("equal thresholds must not validate");
        clear_vars();

        assert!(matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("major_threshold_pct")
        ));
    }

    #[test]
    fn confidence_floor_outside_unit_interval_is_rejected() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars();

        env::set_var("ADUANA_CONFIDENCE_FLOOR", "1.5");

        let error = AppConfig::load(LoadOptions::default())
            .expect_err("confidence floor above 1 must not validate");
        clear_vars();

        assert!(matches!(
            error,
            ConfigError::Validation(ref message) if message.contains("confidence_floor")
        ));
    }

    #[test]
    fn missing_required_file_is_reported() {
        let _guard = env_lock().lock().expect("env lock");
        clear_vars();

        let error = AppConfig::load(LoadOptions {
            config_path: Some("does/not/exist/aduana.toml".into()),
            require_file: true,
            ..LoadOptions::default()
        })
        .expect_err("missing required file must fail");

        assert!(matches!(error, ConfigError::MissingConfigFile(_)));
    }
}
