use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entry::Esn;
use crate::domain::invoice::ExtractionCandidate;
use crate::domain::record::NormalizedRecord;

/// Terminal classification of one entry summary number for a run. The set
/// is closed and exhaustively handled at reporting time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictCategory {
    Match,
    MinorDiscrepancy,
    MajorDiscrepancy,
    UnmatchedDeclaration,
    UnmatchedInvoice,
    DuplicateInvoice,
    DuplicateDeclaration,
    ZeroDeclaredTotal,
    ExtractionFailed,
    Cancelled,
}

impl std::fmt::Display for VerdictCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Match => "MATCH",
            Self::MinorDiscrepancy => "MINOR_DISCREPANCY",
            Self::MajorDiscrepancy => "MAJOR_DISCREPANCY",
            Self::UnmatchedDeclaration => "UNMATCHED_DECLARATION",
            Self::UnmatchedInvoice => "UNMATCHED_INVOICE",
            Self::DuplicateInvoice => "DUPLICATE_INVOICE",
            Self::DuplicateDeclaration => "DUPLICATE_DECLARATION",
            Self::ZeroDeclaredTotal => "ZERO_DECLARED_TOTAL",
            Self::ExtractionFailed => "EXTRACTION_FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Per-line attribution of a total-level discrepancy. One-sided lines keep
/// the absent side as `None`; they are additions or removals, never matched
/// to an unrelated line.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineDelta {
    pub description: String,
    pub declared_amount: Option<Decimal>,
    pub invoice_amount: Option<Decimal>,
    /// invoice − declared, treating an absent side as zero.
    pub delta: Decimal,
}

/// Everything a reviewer needs to reproduce the verdict: the contributing
/// records, the raw candidates, any normalization errors, and the
/// thresholds that were in force.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub declared: Option<NormalizedRecord>,
    pub declared_total: Option<Decimal>,
    pub candidates: Vec<ExtractionCandidate>,
    pub invoices: Vec<NormalizedRecord>,
    pub errors: Vec<String>,
    pub minor_threshold_pct: Decimal,
    pub major_threshold_pct: Decimal,
}

/// The final, immutable classification of one ESN's compliance status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceVerdict {
    pub esn: Esn,
    pub category: VerdictCategory,
    pub discrepancy: Option<Decimal>,
    pub discrepancy_pct: Option<Decimal>,
    pub line_deltas: Vec<LineDelta>,
    pub evidence: Evidence,
    pub decided_at: DateTime<Utc>,
}
