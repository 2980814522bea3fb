use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;

use aduana_core::config::{AppConfig, LoadOptions};
use aduana_pipeline::{BatchCoordinator, DeclaredEntrySource, ReportSink};

use crate::commands::CommandResult;
use crate::files::{
    load_session, JsonDeclaredSource, JsonRateProvider, JsonReportSink, SessionDocumentStore,
};
use crate::init_logging;

#[derive(Debug, Clone)]
pub struct RunArgs {
    pub declared: PathBuf,
    pub session: PathBuf,
    pub rates: Option<PathBuf>,
    pub out: Option<PathBuf>,
    pub config_path: Option<PathBuf>,
}

pub async fn run(args: RunArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions {
        config_path: args.config_path.clone(),
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("run", "config_validation", error.to_string(), 2)
        }
    };

    init_logging(&config);

    match execute(&args, config).await {
        Ok(message) => CommandResult::success("run", message),
        Err(error) => CommandResult::failure("run", "batch_run", format!("{error:#}"), 3),
    }
}

async fn execute(args: &RunArgs, config: AppConfig) -> Result<String> {
    let entries = JsonDeclaredSource::new(args.declared.clone()).load().await?;
    let (documents, extractor) = load_session(&args.session).await?;
    let rates =
        JsonRateProvider::new(args.rates.clone(), config.reconcile.reference_currency.clone());

    let coordinator = BatchCoordinator::new(
        config,
        Arc::new(SessionDocumentStore),
        Arc::new(extractor),
        Arc::new(rates),
    );

    let result = coordinator.run(entries, documents, cancel_on_ctrl_c()).await?;

    if let Some(out) = &args.out {
        JsonReportSink::new(out.clone()).publish(&result).await?;
    }

    let summary = &result.summary;
    let mut message = format!(
        "run {}: {} ESNs ({} matched, {} minor, {} major, {} unmatched, {} failed, {} cancelled)",
        result.run_id,
        summary.total_esns,
        summary.matched,
        summary.minor_discrepancies,
        summary.major_discrepancies,
        summary.unmatched_declarations + summary.unmatched_invoices,
        summary.failed_extractions,
        summary.cancelled,
    );
    if let Some(out) = &args.out {
        message.push_str(&format!("; report written to `{}`", out.display()));
    }
    Ok(message)
}

fn cancel_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing in-flight entries");
            let _ = tx.send(true);
        }
    });
    rx
}
