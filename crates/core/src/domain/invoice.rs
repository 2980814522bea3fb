use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entry::Esn;

/// Opaque handle to an invoice document in the external store.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentRef(pub String);

impl std::fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    Success,
    Partial,
    Failed,
}

/// A line item as the extractor saw it. Any field may be missing on a
/// partial read.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedLine {
    pub description: String,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub amount: Option<Decimal>,
}

/// Unverified, AI-produced structured guess at one invoice's contents.
/// Never mutated after creation; a re-extraction yields a new candidate.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionCandidate {
    pub source_ref: DocumentRef,
    pub esn: Esn,
    pub invoice_number: Option<String>,
    pub total: Decimal,
    pub currency: String,
    pub issued_on: Option<NaiveDate>,
    pub lines: Vec<ExtractedLine>,
    /// Extractor self-reported confidence in [0, 1].
    pub confidence: Decimal,
    pub status: ExtractionStatus,
    pub notes: Option<String>,
}
