use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use serde_json::Value;
use tempfile::TempDir;

use aduana_cli::commands::run::{run as run_command, RunArgs};
use aduana_cli::commands::{config as config_command, doctor};

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

fn with_env<T>(vars: &[(&str, &str)], body: impl FnOnce() -> T) -> T {
    let _guard = ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env lock");

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
    for var in ALL_VARS {
        env::remove_var(var);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let result = body();

    for var in ALL_VARS {
        env::remove_var(var);
    }
    result
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output is JSON")
}

const DECLARED: &str = r#"[
  {"esn": "ESN-001", "total_value": "10000.00", "currency": "USD", "lines": [], "filed_on": "2025-02-03"},
  {"esn": "ESN-002", "total_value": "2500.00", "currency": "USD", "lines": [], "filed_on": "2025-02-03"}
]"#;

const SESSION: &str = r#"[
  {
    "source_ref": "a.pdf",
    "esn": "ESN-001",
    "invoice_number": "F-0001",
    "total": "10000.00",
    "currency": "USD",
    "issued_on": "2025-01-28",
    "lines": [],
    "confidence": "0.9",
    "status": "success",
    "notes": null
  }
]"#;

#[test]
fn run_reconciles_a_recorded_session() {
    let (payload, report) = with_env(&[], || {
        let dir = TempDir::new().expect("temp dir");
        let declared = dir.path().join("entries.json");
        let session = dir.path().join("session.json");
        let out = dir.path().join("report.json");
        fs::write(&declared, DECLARED).expect("write declared");
        fs::write(&session, SESSION).expect("write session");

        let args = RunArgs {
            declared,
            session,
            rates: None,
            out: Some(out.clone()),
            config_path: None,
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        let result = runtime.block_on(run_command(args));
        assert_eq!(result.exit_code, 0, "expected successful run: {}", result.output);

        let payload = parse_payload(&result.output);
        let report: Value =
            serde_json::from_str(&fs::read_to_string(&out).expect("report written"))
                .expect("report is JSON");
        (payload, report)
    });

    assert_eq!(payload["command"], "run");
    assert_eq!(payload["status"], "ok");
    let message = payload["message"].as_str().expect("message");
    assert!(message.contains("2 ESNs"), "unexpected message: {message}");
    assert!(message.contains("1 matched"), "unexpected message: {message}");

    let verdicts = report["verdicts"].as_array().expect("verdicts array");
    assert_eq!(verdicts.len(), 2);
    assert_eq!(verdicts[0]["esn"], "ESN-001");
    assert_eq!(verdicts[0]["category"], "MATCH");
    assert_eq!(verdicts[1]["esn"], "ESN-002");
    assert_eq!(verdicts[1]["category"], "UNMATCHED_INVOICE");

    // thresholds ride along so the report is reproducible
    assert_eq!(report["minor_threshold_pct"], "1");
    assert_eq!(report["major_threshold_pct"], "5");
    assert_eq!(report["summary"]["total_esns"], 2);
}

#[test]
fn run_rejects_an_invalid_tolerance_policy() {
    let result = with_env(
        &[("ADUANA_MINOR_THRESHOLD_PCT", "5"), ("ADUANA_MAJOR_THRESHOLD_PCT", "5")],
        || {
            let args = RunArgs {
                declared: "entries.json".into(),
                session: "session.json".into(),
                rates: None,
                out: None,
                config_path: None,
            };
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            runtime.block_on(run_command(args))
        },
    );

    assert_eq!(result.exit_code, 2, "config failures use the config exit code");
    let payload = parse_payload(&result.output);
    assert_eq!(payload["status"], "error");
    assert_eq!(payload["error_class"], "config_validation");
}

#[test]
fn doctor_reports_all_checks_passing_by_default() {
    let output = with_env(&[], || doctor::run(true));
    let report: Value = serde_json::from_str(&output).expect("doctor output is JSON");

    assert_eq!(report["overall_status"], "pass");
    let names: Vec<&str> = report["checks"]
        .as_array()
        .expect("checks array")
        .iter()
        .map(|check| check["name"].as_str().expect("check name"))
        .collect();
    assert_eq!(names, ["config_validation", "tolerance_policy", "extractor_budget"]);
}

#[test]
fn doctor_flags_a_broken_config() {
    let output = with_env(&[("ADUANA_CONFIDENCE_FLOOR", "2")], || doctor::run(true));
    let report: Value = serde_json::from_str(&output).expect("doctor output is JSON");

    assert_eq!(report["overall_status"], "fail");
    assert_eq!(report["checks"][0]["status"], "fail");
    assert_eq!(report["checks"][1]["status"], "skipped");
}

#[test]
fn config_command_attributes_sources() {
    let output = with_env(&[("ADUANA_MAX_RETRIES", "5")], config_command::run);

    assert!(output.contains("reconcile.minor_threshold_pct = 1  (default)"), "{output}");
    assert!(output.contains("extractor.max_retries = 5  (env:ADUANA_MAX_RETRIES)"), "{output}");
    assert!(output.contains("logging.format = compact"), "{output}");
}
