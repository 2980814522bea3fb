use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use aduana_core::rates::RateTable;
use aduana_core::report::BatchResult;
use aduana_core::{DeclaredEntry, DocumentRef, ExtractionCandidate};

/// Extraction failures, split by whether a retry can help. Timeouts and
/// rate limits are transient; a malformed document will fail the same way
/// every time.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractError {
    #[error("transient extraction failure: {reason}")]
    Transient { reason: String },
    #[error("permanent extraction failure: {reason}")]
    Permanent { reason: String },
}

impl ExtractError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Transient { reason } | Self::Permanent { reason } => reason,
        }
    }
}

/// Wherever declared entries come from (broker export, spreadsheet pull).
#[async_trait]
pub trait DeclaredEntrySource: Send + Sync {
    async fn load(&self) -> Result<Vec<DeclaredEntry>>;
}

/// The external document store holding the raw invoice files.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn fetch(&self, reference: &DocumentRef) -> Result<Vec<u8>>;
}

/// The external AI extraction capability. Best-effort and possibly wrong;
/// a call takes on the order of tens of seconds.
#[async_trait]
pub trait InvoiceExtractor: Send + Sync {
    async fn extract(
        &self,
        reference: &DocumentRef,
        bytes: &[u8],
    ) -> Result<ExtractionCandidate, ExtractError>;
}

/// Supplies the currency-rate snapshot for a run. Queried exactly once per
/// run, before any entry is processed.
#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn snapshot(&self) -> Result<RateTable>;
}

/// Wherever the finished batch goes (spreadsheet writer, file export).
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn publish(&self, result: &BatchResult) -> Result<()>;
}
