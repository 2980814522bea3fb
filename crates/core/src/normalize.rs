use rust_decimal::Decimal;

use crate::config::ReconcileConfig;
use crate::domain::entry::DeclaredEntry;
use crate::domain::invoice::{ExtractionCandidate, ExtractionStatus};
use crate::domain::record::{LineFlag, NormalizedLine, NormalizedRecord, RecordOrigin};
use crate::errors::NormalizeError;
use crate::rates::RateTable;

/// Normalize a declared entry into the reference currency. Pure function of
/// its input, the rate snapshot, and the policy: identical inputs always
/// yield identical output.
pub fn normalize_declared(
    entry: &DeclaredEntry,
    rates: &RateTable,
    policy: &ReconcileConfig,
) -> Result<NormalizedRecord, NormalizeError> {
    let rate = rates.rate_for(&entry.currency, entry.filed_on).ok_or_else(|| {
        NormalizeError::RateUnavailable {
            currency: entry.currency.clone(),
            date: entry.filed_on,
        }
    })?;

    let mut lines = Vec::with_capacity(entry.lines.len());
    let mut line_flags = Vec::new();

    for (index, line) in entry.lines.iter().enumerate() {
        let computed = round_money(line.quantity * line.unit_price * rate);
        let stated = round_money(line.amount * rate);
        if !within_tolerance(computed, stated, policy.line_tolerance_pct) {
            line_flags.push(LineFlag::AmountMismatch { line: index, stated, computed });
        }
        lines.push(NormalizedLine {
            description: line.description.clone(),
            quantity: Some(line.quantity),
            unit_price: Some(line.unit_price * rate),
            amount: computed,
        });
    }

    let total = round_money(entry.total_value * rate);
    let consistent = totals_agree(&lines, total, policy);

    Ok(NormalizedRecord {
        esn: entry.esn.clone(),
        origin: RecordOrigin::Declaration,
        total,
        currency: rates.reference().to_string(),
        lines,
        line_flags,
        consistent,
    })
}

/// Normalize an extraction candidate. Degenerate candidates (failed
/// extraction, confidence below the floor) short-circuit to an error that
/// carries enough context for downstream evidence; they are never dropped.
pub fn normalize_candidate(
    candidate: &ExtractionCandidate,
    rates: &RateTable,
    policy: &ReconcileConfig,
) -> Result<NormalizedRecord, NormalizeError> {
    if candidate.status == ExtractionStatus::Failed {
        let reason = candidate
            .notes
            .clone()
            .unwrap_or_else(|| "extractor reported failure".to_string());
        return Err(NormalizeError::ExtractionFailed { reason });
    }

    if candidate.confidence < policy.confidence_floor {
        return Err(NormalizeError::LowConfidence {
            confidence: candidate.confidence,
            floor: policy.confidence_floor,
        });
    }

    let rate = if rates.is_reference(&candidate.currency) {
        Decimal::ONE
    } else {
        let date = candidate.issued_on.ok_or_else(|| NormalizeError::UndatedConversion {
            currency: candidate.currency.clone(),
        })?;
        rates.rate_for(&candidate.currency, date).ok_or_else(|| {
            NormalizeError::RateUnavailable { currency: candidate.currency.clone(), date }
        })?
    };

    let mut lines = Vec::with_capacity(candidate.lines.len());
    let mut line_flags = Vec::new();

    for (index, line) in candidate.lines.iter().enumerate() {
        match (line.quantity, line.unit_price, line.amount) {
            (Some(quantity), Some(unit_price), stated) => {
                let computed = round_money(quantity * unit_price * rate);
                if let Some(amount) = stated {
                    let stated = round_money(amount * rate);
                    if !within_tolerance(computed, stated, policy.line_tolerance_pct) {
                        line_flags.push(LineFlag::AmountMismatch {
                            line: index,
                            stated,
                            computed,
                        });
                    }
                }
                lines.push(NormalizedLine {
                    description: line.description.clone(),
                    quantity: Some(quantity),
                    unit_price: Some(unit_price * rate),
                    amount: computed,
                });
            }
            (quantity, unit_price, Some(amount)) => {
                lines.push(NormalizedLine {
                    description: line.description.clone(),
                    quantity,
                    unit_price: unit_price.map(|value| value * rate),
                    amount: round_money(amount * rate),
                });
            }
            (_, _, None) => {
                line_flags.push(LineFlag::Unusable {
                    line: index,
                    reason: "no stated amount and no quantity × unit price".to_string(),
                });
            }
        }
    }

    let total = round_money(candidate.total * rate);
    let consistent = totals_agree(&lines, total, policy);

    Ok(NormalizedRecord {
        esn: candidate.esn.clone(),
        origin: RecordOrigin::Invoice,
        total,
        currency: rates.reference().to_string(),
        lines,
        line_flags,
        consistent,
    })
}

fn totals_agree(lines: &[NormalizedLine], total: Decimal, policy: &ReconcileConfig) -> bool {
    if lines.is_empty() {
        return true;
    }
    let line_sum: Decimal = lines.iter().map(|line| line.amount).sum();
    within_tolerance(line_sum, total, policy.line_tolerance_pct)
}

fn within_tolerance(computed: Decimal, stated: Decimal, tolerance_pct: Decimal) -> bool {
    let reference = stated.abs();
    if reference.is_zero() {
        return computed.is_zero();
    }
    (computed - stated).abs() * Decimal::ONE_HUNDRED / reference <= tolerance_pct
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp(2)
}
