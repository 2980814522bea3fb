use std::collections::HashMap;

use chrono::Utc;
use rust_decimal::Decimal;

use crate::config::ReconcileConfig;
use crate::domain::record::NormalizedRecord;
use crate::domain::verdict::{ComplianceVerdict, Evidence, LineDelta, VerdictCategory};
use crate::matcher::MatchedPair;

/// Classify one matched pair into its compliance verdict. One-shot: the
/// first matching rule wins and no pair is revisited.
pub fn reconcile(pair: &MatchedPair, policy: &ReconcileConfig) -> ComplianceVerdict {
    let mut evidence = Evidence {
        declared: None,
        declared_total: None,
        candidates: pair.invoices.iter().map(|outcome| outcome.candidate.clone()).collect(),
        invoices: pair
            .invoices
            .iter()
            .filter_map(|outcome| outcome.normalized.as_ref().ok().cloned())
            .collect(),
        errors: Vec::new(),
        minor_threshold_pct: policy.minor_threshold_pct,
        major_threshold_pct: policy.major_threshold_pct,
    };

    for side in &pair.declared {
        match &side.normalized {
            Ok(record) => {
                if !record.consistent {
                    evidence.errors.push(
                        "declared total disagrees with the sum of its lines".to_string(),
                    );
                }
                if evidence.declared.is_none() {
                    evidence.declared_total = Some(record.total);
                    evidence.declared = Some(record.clone());
                }
            }
            Err(error) => evidence.errors.push(format!("declared entry: {error}")),
        }
    }
    for outcome in &pair.invoices {
        match &outcome.normalized {
            Ok(record) if !record.consistent => evidence.errors.push(format!(
                "invoice {}: stated total disagrees with the sum of its lines",
                outcome.candidate.source_ref
            )),
            Ok(_) => {}
            Err(error) => {
                evidence.errors.push(format!("invoice {}: {error}", outcome.candidate.source_ref))
            }
        }
    }

    if pair.declared.len() > 1 {
        evidence.errors.push(format!(
            "entry summary number appears {} times in the declared input",
            pair.declared.len()
        ));
        return decided(pair, VerdictCategory::DuplicateDeclaration, evidence);
    }

    if pair.declared.is_empty() {
        return decided(pair, VerdictCategory::UnmatchedDeclaration, evidence);
    }

    if pair.invoices.is_empty() {
        return decided(pair, VerdictCategory::UnmatchedInvoice, evidence);
    }

    // More than one candidate for one ESN is a duplicate-invoice condition
    // even when some of them failed normalization: picking a "best" one
    // would be a silent collapse.
    if pair.invoices.len() > 1 {
        return decided(pair, VerdictCategory::DuplicateInvoice, evidence);
    }

    let declared = match &pair.declared[0].normalized {
        Ok(record) => record.clone(),
        Err(_) => return decided(pair, VerdictCategory::ExtractionFailed, evidence),
    };
    let invoice = match &pair.invoices[0].normalized {
        Ok(record) => record.clone(),
        Err(_) => return decided(pair, VerdictCategory::ExtractionFailed, evidence),
    };

    if declared.total.is_zero() {
        return decided(pair, VerdictCategory::ZeroDeclaredTotal, evidence);
    }

    let discrepancy = (declared.total - invoice.total).abs();
    let pct = discrepancy * Decimal::ONE_HUNDRED / declared.total.abs();

    let category = if pct <= policy.minor_threshold_pct {
        VerdictCategory::Match
    } else if pct <= policy.major_threshold_pct {
        VerdictCategory::MinorDiscrepancy
    } else {
        VerdictCategory::MajorDiscrepancy
    };

    let line_deltas = match category {
        VerdictCategory::Match => Vec::new(),
        _ => diff_lines(&declared, &invoice),
    };

    ComplianceVerdict {
        esn: pair.esn.clone(),
        category,
        discrepancy: Some(discrepancy),
        discrepancy_pct: Some(pct),
        line_deltas,
        evidence,
        decided_at: Utc::now(),
    }
}

fn decided(pair: &MatchedPair, category: VerdictCategory, evidence: Evidence) -> ComplianceVerdict {
    ComplianceVerdict {
        esn: pair.esn.clone(),
        category,
        discrepancy: None,
        discrepancy_pct: None,
        line_deltas: Vec::new(),
        evidence,
        decided_at: Utc::now(),
    }
}

/// Attribute a total-level discrepancy to line items. Lines are keyed by
/// normalized description; a line present on one side only is an addition
/// or removal, never matched to the nearest unrelated line. Largest
/// absolute delta first.
pub fn diff_lines(declared: &NormalizedRecord, invoice: &NormalizedRecord) -> Vec<LineDelta> {
    struct SideSums {
        display: String,
        declared: Option<Decimal>,
        invoice: Option<Decimal>,
    }

    let mut keys: Vec<String> = Vec::new();
    let mut sums: HashMap<String, SideSums> = HashMap::new();

    for line in &declared.lines {
        let key = line_key(&line.description);
        let entry = sums.entry(key.clone()).or_insert_with(|| {
            keys.push(key.clone());
            SideSums { display: line.description.clone(), declared: None, invoice: None }
        });
        *entry.declared.get_or_insert(Decimal::ZERO) += line.amount;
    }

    for line in &invoice.lines {
        let key = line_key(&line.description);
        let entry = sums.entry(key.clone()).or_insert_with(|| {
            keys.push(key.clone());
            SideSums { display: line.description.clone(), declared: None, invoice: None }
        });
        *entry.invoice.get_or_insert(Decimal::ZERO) += line.amount;
    }

    let mut deltas: Vec<LineDelta> = keys
        .into_iter()
        .filter_map(|key| {
            let side = sums.remove(&key)?;
            let delta = side.invoice.unwrap_or(Decimal::ZERO)
                - side.declared.unwrap_or(Decimal::ZERO);
            if delta.is_zero() {
                return None;
            }
            Some(LineDelta {
                description: side.display,
                declared_amount: side.declared,
                invoice_amount: side.invoice,
                delta,
            })
        })
        .collect();

    deltas.sort_by(|a, b| {
        b.delta
            .abs()
            .cmp(&a.delta.abs())
            .then_with(|| a.description.cmp(&b.description))
    });
    deltas
}

fn line_key(description: &str) -> String {
    description.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}
