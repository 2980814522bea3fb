use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::entry::Esn;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordOrigin {
    Declaration,
    Invoice,
}

/// A line item after unit and currency unification. `amount` is the
/// recomputed quantity × unit price where both are known, otherwise the
/// stated amount converted to the reference currency.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedLine {
    pub description: String,
    pub quantity: Option<Decimal>,
    pub unit_price: Option<Decimal>,
    pub amount: Decimal,
}

/// Data-quality tags attached during normalization. Flagged lines stay in
/// the record; nothing is discarded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum LineFlag {
    /// Stated line amount disagrees with quantity × unit price beyond the
    /// line tolerance. Both values are in the reference currency.
    AmountMismatch {
        line: usize,
        stated: Decimal,
        computed: Decimal,
    },
    /// Line carries neither a stated amount nor enough fields to compute
    /// one; it contributes nothing to the line sum.
    Unusable { line: usize, reason: String },
}

/// Canonical comparable form of a declaration or an invoice candidate:
/// single reference currency, recomputed line amounts, quality tags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub esn: Esn,
    pub origin: RecordOrigin,
    pub total: Decimal,
    pub currency: String,
    pub lines: Vec<NormalizedLine>,
    pub line_flags: Vec<LineFlag>,
    /// False when the stated total and the sum of usable lines disagree
    /// beyond the line tolerance. Such records still flow into
    /// reconciliation as a data-quality signal.
    pub consistent: bool,
}

impl NormalizedRecord {
    pub fn line_sum(&self) -> Decimal {
        self.lines.iter().map(|line| line.amount).sum()
    }
}
