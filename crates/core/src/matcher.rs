use std::collections::HashMap;

use crate::domain::entry::{DeclaredEntry, Esn};
use crate::domain::invoice::ExtractionCandidate;
use crate::domain::record::NormalizedRecord;
use crate::errors::NormalizeError;

/// A declared entry together with its normalization result.
#[derive(Clone, Debug, PartialEq)]
pub struct DeclaredSide {
    pub entry: DeclaredEntry,
    pub normalized: Result<NormalizedRecord, NormalizeError>,
}

/// An extraction candidate together with its normalization result. Failed
/// candidates ride along for verdict evidence.
#[derive(Clone, Debug, PartialEq)]
pub struct ExtractionOutcome {
    pub candidate: ExtractionCandidate,
    pub normalized: Result<NormalizedRecord, NormalizeError>,
}

/// All records sharing one entry summary number.
///
/// Cardinality is preserved, never repaired: zero or several declared
/// sides and zero or several invoices are all representable, and the
/// reconciliation engine decides what each combination means.
#[derive(Clone, Debug, PartialEq)]
pub struct MatchedPair {
    pub esn: Esn,
    pub declared: Vec<DeclaredSide>,
    pub invoices: Vec<ExtractionOutcome>,
}

/// Group declared entries and extraction outcomes by exact ESN.
///
/// Pairs come out in declared-entry input order; ESNs seen only on the
/// invoice side follow in first-seen document order, so reports are
/// reproducible run over run. No fuzzy identifier matching: a candidate
/// with a blank ESN lands in its own unmatched group.
pub fn pair_entries(
    declared: Vec<DeclaredSide>,
    extracted: Vec<ExtractionOutcome>,
) -> Vec<MatchedPair> {
    let mut declared_order: Vec<Esn> = Vec::new();
    let mut declared_by_esn: HashMap<Esn, Vec<DeclaredSide>> = HashMap::new();
    for side in declared {
        let esn = side.entry.esn.clone();
        let group = declared_by_esn.entry(esn.clone()).or_default();
        if group.is_empty() {
            declared_order.push(esn);
        }
        group.push(side);
    }

    let mut invoice_order: Vec<Esn> = Vec::new();
    let mut invoices_by_esn: HashMap<Esn, Vec<ExtractionOutcome>> = HashMap::new();
    for outcome in extracted {
        let esn = outcome.candidate.esn.clone();
        let group = invoices_by_esn.entry(esn.clone()).or_default();
        if group.is_empty() {
            invoice_order.push(esn);
        }
        group.push(outcome);
    }

    let mut pairs = Vec::with_capacity(declared_order.len() + invoice_order.len());

    for esn in declared_order {
        let declared = declared_by_esn.remove(&esn).unwrap_or_default();
        let invoices = invoices_by_esn.remove(&esn).unwrap_or_default();
        pairs.push(MatchedPair { esn, declared, invoices });
    }

    for esn in invoice_order {
        // anything left here had no declared counterpart
        if let Some(invoices) = invoices_by_esn.remove(&esn) {
            pairs.push(MatchedPair { esn, declared: Vec::new(), invoices });
        }
    }

    pairs
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use crate::config::AppConfig;
    use crate::domain::entry::{DeclaredEntry, Esn};
    use crate::domain::invoice::{DocumentRef, ExtractionCandidate, ExtractionStatus};
    use crate::normalize::{normalize_candidate, normalize_declared};
    use crate::rates::RateTable;

    use super::{pair_entries, DeclaredSide, ExtractionOutcome};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date literal")
    }

    fn declared_side(esn: &str, total: &str) -> DeclaredSide {
        let entry = DeclaredEntry {
            esn: Esn(esn.to_string()),
            total_value: total.parse::<Decimal>().expect("decimal literal"),
            currency: "USD".to_string(),
            lines: Vec::new(),
            filed_on: day("2025-02-03"),
        };
        let rates = RateTable::new("USD");
        let normalized = normalize_declared(&entry, &rates, &AppConfig::default().reconcile);
        DeclaredSide { entry, normalized }
    }

    fn outcome(esn: &str, doc: &str, total: &str) -> ExtractionOutcome {
        let candidate = ExtractionCandidate {
            source_ref: DocumentRef(doc.to_string()),
            esn: Esn(esn.to_string()),
            invoice_number: None,
            total: total.parse::<Decimal>().expect("decimal literal"),
            currency: "USD".to_string(),
            issued_on: Some(day("2025-01-28")),
            lines: Vec::new(),
            confidence: "0.9".parse().expect("decimal literal"),
            status: ExtractionStatus::Success,
            notes: None,
        };
        let rates = RateTable::new("USD");
        let normalized = normalize_candidate(&candidate, &rates, &AppConfig::default().reconcile);
        ExtractionOutcome { candidate, normalized }
    }

    #[test]
    fn pairs_follow_declared_input_order() {
        let pairs = pair_entries(
            vec![
                declared_side("ESN-003", "100"),
                declared_side("ESN-001", "200"),
                declared_side("ESN-002", "300"),
            ],
            vec![outcome("ESN-002", "b.pdf", "300"), outcome("ESN-003", "a.pdf", "100")],
        );

        let order: Vec<&str> = pairs.iter().map(|p| p.esn.0.as_str()).collect();
        assert_eq!(order, ["ESN-003", "ESN-001", "ESN-002"]);
        assert_eq!(pairs[1].invoices.len(), 0);
    }

    #[test]
    fn invoice_only_esns_trail_in_first_seen_order() {
        let pairs = pair_entries(
            vec![declared_side("ESN-001", "100")],
            vec![
                outcome("ESN-009", "z.pdf", "50"),
                outcome("ESN-001", "a.pdf", "100"),
                outcome("ESN-004", "k.pdf", "75"),
            ],
        );

        let order: Vec<&str> = pairs.iter().map(|p| p.esn.0.as_str()).collect();
        assert_eq!(order, ["ESN-001", "ESN-009", "ESN-004"]);
        assert!(pairs[1].declared.is_empty());
        assert!(pairs[2].declared.is_empty());
    }

    #[test]
    fn duplicate_candidates_stay_side_by_side() {
        let pairs = pair_entries(
            vec![declared_side("ESN-001", "100")],
            vec![outcome("ESN-001", "a.pdf", "100"), outcome("ESN-001", "a-copy.pdf", "100")],
        );

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].invoices.len(), 2, "duplicates are retained, never collapsed");
    }

    #[test]
    fn duplicate_declared_entries_stay_grouped() {
        let pairs = pair_entries(
            vec![declared_side("ESN-001", "100"), declared_side("ESN-001", "120")],
            Vec::new(),
        );

        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].declared.len(), 2);
    }

    #[test]
    fn blank_esn_candidates_form_their_own_group() {
        let pairs = pair_entries(
            vec![declared_side("ESN-001", "100")],
            vec![outcome("", "mystery.pdf", "42")],
        );

        assert_eq!(pairs.len(), 2);
        assert!(pairs[1].esn.is_blank());
        assert!(pairs[1].declared.is_empty());
    }
}
