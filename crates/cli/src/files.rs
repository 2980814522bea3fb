//! JSON-file-backed implementations of the pipeline's collaborator traits.
//! These are the thin I/O adapters the operator CLI wires together; the
//! engine itself never touches a file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use aduana_core::rates::{RateQuote, RateTable};
use aduana_core::report::BatchResult;
use aduana_core::{DeclaredEntry, DocumentRef, ExtractionCandidate};
use aduana_pipeline::{
    DeclaredEntrySource, DocumentInput, DocumentStore, ExtractError, InvoiceExtractor,
    RateProvider, ReportSink,
};

/// Declared entries exported from the broker system as a JSON array.
pub struct JsonDeclaredSource {
    path: PathBuf,
}

impl JsonDeclaredSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl DeclaredEntrySource for JsonDeclaredSource {
    async fn load(&self) -> Result<Vec<DeclaredEntry>> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading declared entries from `{}`", self.path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("parsing declared entries in `{}`", self.path.display()))
    }
}

/// Serves the candidates of a recorded extraction session, so a compliance
/// review can be replayed without calling the extraction service again.
pub struct ReplayExtractor {
    candidates: HashMap<DocumentRef, ExtractionCandidate>,
}

/// Load a stored session file (a JSON array of extraction candidates) into
/// the document list and the extractor that will serve them back.
pub async fn load_session(path: &Path) -> Result<(Vec<DocumentInput>, ReplayExtractor)> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading extraction session from `{}`", path.display()))?;
    let candidates: Vec<ExtractionCandidate> = serde_json::from_str(&raw)
        .with_context(|| format!("parsing extraction session in `{}`", path.display()))?;

    let documents = candidates
        .iter()
        .map(|candidate| DocumentInput {
            esn: candidate.esn.clone(),
            reference: candidate.source_ref.clone(),
        })
        .collect();
    let candidates = candidates
        .into_iter()
        .map(|candidate| (candidate.source_ref.clone(), candidate))
        .collect();

    Ok((documents, ReplayExtractor { candidates }))
}

#[async_trait]
impl InvoiceExtractor for ReplayExtractor {
    async fn extract(
        &self,
        reference: &DocumentRef,
        _bytes: &[u8],
    ) -> Result<ExtractionCandidate, ExtractError> {
        self.candidates.get(reference).cloned().ok_or_else(|| ExtractError::Permanent {
            reason: format!("document `{reference}` is not part of the recorded session"),
        })
    }
}

/// The replayed candidates were extracted when the session was recorded;
/// there are no raw bytes left to fetch.
pub struct SessionDocumentStore;

#[async_trait]
impl DocumentStore for SessionDocumentStore {
    async fn fetch(&self, _reference: &DocumentRef) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// Rate quotes from a JSON file; without a file, only the reference
/// currency itself converts.
pub struct JsonRateProvider {
    path: Option<PathBuf>,
    reference: String,
}

impl JsonRateProvider {
    pub fn new(path: Option<PathBuf>, reference: String) -> Self {
        Self { path, reference }
    }
}

#[async_trait]
impl RateProvider for JsonRateProvider {
    async fn snapshot(&self) -> Result<RateTable> {
        let Some(path) = &self.path else {
            return Ok(RateTable::new(self.reference.clone()));
        };
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading rate quotes from `{}`", path.display()))?;
        let quotes: Vec<RateQuote> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing rate quotes in `{}`", path.display()))?;
        Ok(RateTable::from_quotes(self.reference.clone(), quotes))
    }
}

/// Writes the batch report as pretty-printed JSON.
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl ReportSink for JsonReportSink {
    async fn publish(&self, result: &BatchResult) -> Result<()> {
        let payload = serde_json::to_vec_pretty(result).context("serializing the batch report")?;
        tokio::fs::write(&self.path, payload)
            .await
            .with_context(|| format!("writing the batch report to `{}`", self.path.display()))
    }
}
