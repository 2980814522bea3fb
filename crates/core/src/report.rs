use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::verdict::{ComplianceVerdict, VerdictCategory};

/// Per-category counts and financial totals for one run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_esns: usize,
    pub matched: usize,
    pub minor_discrepancies: usize,
    pub major_discrepancies: usize,
    pub unmatched_declarations: usize,
    pub unmatched_invoices: usize,
    pub failed_extractions: usize,
    pub cancelled: usize,
    pub category_counts: BTreeMap<String, usize>,
    pub total_declared: Decimal,
    pub total_extracted: Decimal,
    pub total_discrepancy: Decimal,
}

/// Everything a reporting collaborator needs: the verdicts in declared-input
/// order, the thresholds that produced them, and the run metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reference_currency: String,
    pub minor_threshold_pct: Decimal,
    pub major_threshold_pct: Decimal,
    pub verdicts: Vec<ComplianceVerdict>,
    pub summary: RunSummary,
}

pub fn summarize(verdicts: &[ComplianceVerdict]) -> RunSummary {
    let mut summary = RunSummary { total_esns: verdicts.len(), ..RunSummary::default() };

    for verdict in verdicts {
        *summary.category_counts.entry(verdict.category.to_string()).or_insert(0) += 1;

        match verdict.category {
            VerdictCategory::Match => summary.matched += 1,
            VerdictCategory::MinorDiscrepancy => summary.minor_discrepancies += 1,
            VerdictCategory::MajorDiscrepancy => summary.major_discrepancies += 1,
            VerdictCategory::UnmatchedDeclaration => summary.unmatched_declarations += 1,
            VerdictCategory::UnmatchedInvoice => summary.unmatched_invoices += 1,
            VerdictCategory::ExtractionFailed => summary.failed_extractions += 1,
            VerdictCategory::Cancelled => summary.cancelled += 1,
            VerdictCategory::DuplicateInvoice
            | VerdictCategory::DuplicateDeclaration
            | VerdictCategory::ZeroDeclaredTotal => {}
        }

        if let Some(total) = verdict.evidence.declared_total {
            summary.total_declared += total;
        }
        for invoice in &verdict.evidence.invoices {
            summary.total_extracted += invoice.total;
        }
        if let Some(discrepancy) = verdict.discrepancy {
            summary.total_discrepancy += discrepancy;
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use crate::domain::entry::Esn;
    use crate::domain::verdict::{ComplianceVerdict, Evidence, VerdictCategory};

    use super::summarize;

    fn verdict(esn: &str, category: VerdictCategory, discrepancy: Option<&str>) -> ComplianceVerdict {
        ComplianceVerdict {
            esn: Esn(esn.to_string()),
            category,
            discrepancy: discrepancy.map(|value| value.parse().expect("decimal literal")),
            discrepancy_pct: None,
            line_deltas: Vec::new(),
            evidence: Evidence {
                declared: None,
                declared_total: None,
                candidates: Vec::new(),
                invoices: Vec::new(),
                errors: Vec::new(),
                minor_threshold_pct: Decimal::ONE,
                major_threshold_pct: Decimal::new(5, 0),
            },
            decided_at: Utc::now(),
        }
    }

    #[test]
    fn counts_cover_every_category_seen() {
        let verdicts = vec![
            verdict("ESN-001", VerdictCategory::Match, Some("0")),
            verdict("ESN-002", VerdictCategory::Match, Some("12.00")),
            verdict("ESN-003", VerdictCategory::MajorDiscrepancy, Some("600.00")),
            verdict("ESN-004", VerdictCategory::UnmatchedInvoice, None),
            verdict("ESN-005", VerdictCategory::Cancelled, None),
        ];

        let summary = summarize(&verdicts);
        assert_eq!(summary.total_esns, 5);
        assert_eq!(summary.matched, 2);
        assert_eq!(summary.major_discrepancies, 1);
        assert_eq!(summary.unmatched_invoices, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.category_counts["MATCH"], 2);
        assert_eq!(summary.category_counts["CANCELLED"], 1);
        assert_eq!(summary.total_discrepancy, "612.00".parse::<Decimal>().expect("decimal"));
    }
}
