//! Core reconciliation logic for Aduana: normalize declared import entries
//! and AI-extracted supplier invoices into one comparable form, pair them by
//! entry summary number, and classify each pair against tolerance policy.
//!
//! Everything here is synchronous and deterministic. The async boundary
//! (extraction, document retrieval, batching) lives in `aduana-pipeline`.

pub mod config;
pub mod domain;
pub mod errors;
pub mod matcher;
pub mod normalize;
pub mod rates;
pub mod reconcile;
pub mod report;

pub use config::{
    AppConfig, ConfigError, ConfigOverrides, ExtractorConfig, LoadOptions, LogFormat,
    LoggingConfig, ReconcileConfig,
};
pub use domain::entry::{DeclaredEntry, DeclaredLine, Esn};
pub use domain::invoice::{DocumentRef, ExtractedLine, ExtractionCandidate, ExtractionStatus};
pub use domain::record::{LineFlag, NormalizedLine, NormalizedRecord, RecordOrigin};
pub use domain::verdict::{ComplianceVerdict, Evidence, LineDelta, VerdictCategory};
pub use errors::NormalizeError;
pub use matcher::{pair_entries, DeclaredSide, ExtractionOutcome, MatchedPair};
pub use normalize::{normalize_candidate, normalize_declared};
pub use rates::{RateQuote, RateTable};
pub use reconcile::reconcile;
pub use report::{summarize, BatchResult, RunSummary};
