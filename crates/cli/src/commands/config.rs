use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use aduana_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let mut push = |key: &str, value: String, env_var: &str| {
        let source = field_source(
            key,
            env_var,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("{key} = {value}  ({source})"));
    };

    push(
        "reconcile.reference_currency",
        config.reconcile.reference_currency.clone(),
        "ADUANA_REFERENCE_CURRENCY",
    );
    push(
        "reconcile.minor_threshold_pct",
        config.reconcile.minor_threshold_pct.to_string(),
        "ADUANA_MINOR_THRESHOLD_PCT",
    );
    push(
        "reconcile.major_threshold_pct",
        config.reconcile.major_threshold_pct.to_string(),
        "ADUANA_MAJOR_THRESHOLD_PCT",
    );
    push(
        "reconcile.line_tolerance_pct",
        config.reconcile.line_tolerance_pct.to_string(),
        "ADUANA_LINE_TOLERANCE_PCT",
    );
    push(
        "reconcile.confidence_floor",
        config.reconcile.confidence_floor.to_string(),
        "ADUANA_CONFIDENCE_FLOOR",
    );
    push(
        "extractor.max_concurrency",
        config.extractor.max_concurrency.to_string(),
        "ADUANA_MAX_CONCURRENCY",
    );
    push(
        "extractor.max_retries",
        config.extractor.max_retries.to_string(),
        "ADUANA_MAX_RETRIES",
    );
    push(
        "extractor.retry_base_delay_ms",
        config.extractor.retry_base_delay_ms.to_string(),
        "ADUANA_RETRY_BASE_DELAY_MS",
    );
    push(
        "extractor.timeout_secs",
        config.extractor.timeout_secs.to_string(),
        "ADUANA_EXTRACTOR_TIMEOUT_SECS",
    );
    push("logging.level", config.logging.level.clone(), "ADUANA_LOG_LEVEL");
    push("logging.format", format!("{:?}", config.logging.format).to_lowercase(), "ADUANA_LOG_FORMAT");

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("aduana.toml"), PathBuf::from("config/aduana.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key: &str,
    env_var: &str,
    doc: Option<&Value>,
    path: Option<&Path>,
) -> String {
    if env::var(env_var).map(|value| !value.trim().is_empty()).unwrap_or(false) {
        return format!("env:{env_var}");
    }

    if let (Some(doc), Some(path)) = (doc, path) {
        let mut cursor = Some(doc);
        for part in key.split('.') {
            cursor = cursor.and_then(|value| value.get(part));
        }
        if cursor.is_some() {
            return format!("file:{}", path.display());
        }
    }

    "default".to_string()
}
