use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch, Semaphore};
use uuid::Uuid;

use aduana_core::config::{AppConfig, ReconcileConfig};
use aduana_core::errors::NormalizeError;
use aduana_core::matcher::{pair_entries, DeclaredSide, ExtractionOutcome, MatchedPair};
use aduana_core::normalize::{normalize_candidate, normalize_declared};
use aduana_core::rates::RateTable;
use aduana_core::reconcile::reconcile;
use aduana_core::report::{summarize, BatchResult};
use aduana_core::{
    ComplianceVerdict, DeclaredEntry, DocumentRef, Esn, Evidence, ExtractionCandidate,
    ExtractionStatus, VerdictCategory,
};

use crate::adapters::{DocumentStore, InvoiceExtractor, RateProvider};
use crate::extract::{RetryPolicy, RetryingExtractor};

/// A document reference plus the ESN it was filed under in the store. The
/// extractor may read a different ESN out of the document itself; matching
/// always follows what was extracted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentInput {
    pub esn: Esn,
    pub reference: DocumentRef,
}

/// Drives extraction, normalization, matching, and reconciliation for a
/// whole batch. One entry's failure never aborts the run; every ESN seen on
/// either side comes back with exactly one verdict.
pub struct BatchCoordinator {
    config: AppConfig,
    store: Arc<dyn DocumentStore>,
    extractor: Arc<dyn InvoiceExtractor>,
    rates: Arc<dyn RateProvider>,
}

enum EntryCompletion {
    Processed(Vec<ExtractionOutcome>),
    /// Cancellation arrived before any document of this entry was touched.
    Skipped,
}

impl BatchCoordinator {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        extractor: Arc<dyn InvoiceExtractor>,
        rates: Arc<dyn RateProvider>,
    ) -> Self {
        let extractor: Arc<dyn InvoiceExtractor> = Arc::new(RetryingExtractor::new(
            extractor,
            RetryPolicy::from(&config.extractor),
        ));
        Self { config, store, extractor, rates }
    }

    pub async fn run(
        &self,
        entries: Vec<DeclaredEntry>,
        documents: Vec<DocumentInput>,
        cancel: watch::Receiver<bool>,
    ) -> Result<BatchResult> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        let rates = Arc::new(
            self.rates.snapshot().await.context("loading the currency-rate snapshot")?,
        );

        tracing::info!(
            %run_id,
            declared = entries.len(),
            documents = documents.len(),
            workers = self.config.extractor.max_concurrency,
            "starting reconciliation batch"
        );

        // document input order decides the trailing (invoice-only) section
        let document_order: HashMap<DocumentRef, usize> = documents
            .iter()
            .enumerate()
            .map(|(index, document)| (document.reference.clone(), index))
            .collect();

        let mut group_order: Vec<Esn> = Vec::new();
        let mut groups: HashMap<Esn, Vec<DocumentRef>> = HashMap::new();
        for document in documents {
            let group = groups.entry(document.esn.clone()).or_default();
            if group.is_empty() {
                group_order.push(document.esn.clone());
            }
            group.push(document.reference);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.extractor.max_concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel::<(Esn, EntryCompletion)>();

        let mut started: Vec<(Esn, Vec<DocumentRef>)> = Vec::new();
        let mut skipped: Vec<Esn> = Vec::new();

        for esn in group_order {
            let refs = groups.remove(&esn).unwrap_or_default();
            if *cancel.borrow() {
                tracing::warn!(esn = %esn, "cancellation requested, entry not started");
                skipped.push(esn);
                continue;
            }

            started.push((esn.clone(), refs.clone()));
            let task = EntryTask {
                esn: esn.clone(),
                refs,
                store: Arc::clone(&self.store),
                extractor: Arc::clone(&self.extractor),
                rates: Arc::clone(&rates),
                policy: self.config.reconcile.clone(),
                semaphore: Arc::clone(&semaphore),
            };
            let tx = tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let completion = task.process(cancel).await;
                let _ = tx.send((esn, completion));
            });
        }
        drop(tx);

        let mut received: HashMap<Esn, EntryCompletion> = HashMap::new();
        while let Some((esn, completion)) = rx.recv().await {
            received.insert(esn, completion);
        }

        let mut outcomes: Vec<ExtractionOutcome> = Vec::new();
        for (esn, refs) in &started {
            match received.remove(esn) {
                Some(EntryCompletion::Processed(group)) => outcomes.extend(group),
                Some(EntryCompletion::Skipped) => skipped.push(esn.clone()),
                None => {
                    // the task faulted before reporting back
                    tracing::error!(esn = %esn, "entry task faulted before completing");
                    if let Some(reference) = refs.first() {
                        outcomes.push(failed_outcome(
                            esn,
                            reference,
                            rates.reference(),
                            "entry task failed unexpectedly".to_string(),
                        ));
                    }
                }
            }
        }

        outcomes.sort_by_key(|outcome| {
            document_order.get(&outcome.candidate.source_ref).copied().unwrap_or(usize::MAX)
        });

        let declared_sides: Vec<DeclaredSide> = entries
            .into_iter()
            .map(|entry| {
                let normalized = normalize_declared(&entry, &rates, &self.config.reconcile);
                DeclaredSide { entry, normalized }
            })
            .collect();

        let cancelled: HashSet<Esn> = skipped.iter().cloned().collect();
        let mut pairs = pair_entries(declared_sides, outcomes);

        // cancelled invoice-only ESNs produced no outcomes, so no pair yet;
        // they still owe the report a verdict
        let present: HashSet<Esn> = pairs.iter().map(|pair| pair.esn.clone()).collect();
        for esn in &skipped {
            if !present.contains(esn) {
                pairs.push(MatchedPair { esn: esn.clone(), declared: Vec::new(), invoices: Vec::new() });
            }
        }

        let policy = &self.config.reconcile;
        let verdicts: Vec<ComplianceVerdict> = pairs
            .iter()
            .map(|pair| {
                if cancelled.contains(&pair.esn) {
                    cancelled_verdict(pair, policy)
                } else {
                    reconcile(pair, policy)
                }
            })
            .collect();

        for verdict in &verdicts {
            tracing::debug!(esn = %verdict.esn, category = %verdict.category, "verdict decided");
        }

        let summary = summarize(&verdicts);
        let finished_at = Utc::now();
        tracing::info!(
            %run_id,
            total = summary.total_esns,
            matched = summary.matched,
            failed = summary.failed_extractions,
            cancelled = summary.cancelled,
            "reconciliation batch complete"
        );

        Ok(BatchResult {
            run_id,
            started_at,
            finished_at,
            reference_currency: policy.reference_currency.clone(),
            minor_threshold_pct: policy.minor_threshold_pct,
            major_threshold_pct: policy.major_threshold_pct,
            verdicts,
            summary,
        })
    }
}

struct EntryTask {
    esn: Esn,
    refs: Vec<DocumentRef>,
    store: Arc<dyn DocumentStore>,
    extractor: Arc<dyn InvoiceExtractor>,
    rates: Arc<RateTable>,
    policy: ReconcileConfig,
    semaphore: Arc<Semaphore>,
}

impl EntryTask {
    async fn process(self, cancel: watch::Receiver<bool>) -> EntryCompletion {
        let mut outcomes = Vec::with_capacity(self.refs.len());

        for (index, reference) in self.refs.iter().enumerate() {
            let permit = match Arc::clone(&self.semaphore).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };

            if *cancel.borrow() {
                if index == 0 {
                    return EntryCompletion::Skipped;
                }
                // entry already in flight: finish what was started, skip the rest
                drop(permit);
                break;
            }

            outcomes.push(self.process_document(reference).await);
            drop(permit);
        }

        EntryCompletion::Processed(outcomes)
    }

    async fn process_document(&self, reference: &DocumentRef) -> ExtractionOutcome {
        let bytes = match self.store.fetch(reference).await {
            Ok(bytes) => bytes,
            Err(error) => {
                tracing::warn!(reference = %reference, "document fetch failed: {error:#}");
                return failed_outcome(
                    &self.esn,
                    reference,
                    self.rates.reference(),
                    format!("document fetch failed: {error:#}"),
                );
            }
        };

        match self.extractor.extract(reference, &bytes).await {
            Ok(candidate) => {
                let normalized = normalize_candidate(&candidate, &self.rates, &self.policy);
                ExtractionOutcome { candidate, normalized }
            }
            Err(error) => failed_outcome(
                &self.esn,
                reference,
                self.rates.reference(),
                error.reason().to_string(),
            ),
        }
    }
}

/// Stand-in outcome for a document that never produced a candidate, so the
/// failure still reaches the verdict's evidence.
fn failed_outcome(
    esn: &Esn,
    reference: &DocumentRef,
    reference_currency: &str,
    reason: String,
) -> ExtractionOutcome {
    let candidate = ExtractionCandidate {
        source_ref: reference.clone(),
        esn: esn.clone(),
        invoice_number: None,
        total: Decimal::ZERO,
        currency: reference_currency.to_string(),
        issued_on: None,
        lines: Vec::new(),
        confidence: Decimal::ZERO,
        status: ExtractionStatus::Failed,
        notes: Some(reason.clone()),
    };
    ExtractionOutcome { candidate, normalized: Err(NormalizeError::ExtractionFailed { reason }) }
}

fn cancelled_verdict(pair: &MatchedPair, policy: &ReconcileConfig) -> ComplianceVerdict {
    let declared = pair
        .declared
        .first()
        .and_then(|side| side.normalized.as_ref().ok().cloned());
    ComplianceVerdict {
        esn: pair.esn.clone(),
        category: VerdictCategory::Cancelled,
        discrepancy: None,
        discrepancy_pct: None,
        line_deltas: Vec::new(),
        evidence: Evidence {
            declared_total: declared.as_ref().map(|record| record.total),
            declared,
            candidates: Vec::new(),
            invoices: Vec::new(),
            errors: vec!["batch cancelled before this entry started".to_string()],
            minor_threshold_pct: policy.minor_threshold_pct,
            major_threshold_pct: policy.major_threshold_pct,
        },
        decided_at: Utc::now(),
    }
}
