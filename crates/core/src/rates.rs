use std::collections::HashMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One conversion quote: the value of one unit of `currency` in the
/// reference currency on `date`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    pub currency: String,
    pub date: NaiveDate,
    pub rate: Decimal,
}

/// Read-only currency-rate snapshot for one run. Loaded once before any
/// entry is processed and never mutated mid-run; rate changes take effect
/// only on the next run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RateTable {
    reference: String,
    rates: HashMap<(String, NaiveDate), Decimal>,
}

impl RateTable {
    pub fn new(reference: impl Into<String>) -> Self {
        Self { reference: canonical(&reference.into()), rates: HashMap::new() }
    }

    pub fn from_quotes(
        reference: impl Into<String>,
        quotes: impl IntoIterator<Item = RateQuote>,
    ) -> Self {
        let mut table = Self::new(reference);
        for quote in quotes {
            table.insert(quote);
        }
        table
    }

    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn insert(&mut self, quote: RateQuote) {
        self.rates.insert((canonical(&quote.currency), quote.date), quote.rate);
    }

    /// Rate for converting `currency` into the reference currency on
    /// `date`. The reference currency always converts at 1.
    pub fn rate_for(&self, currency: &str, date: NaiveDate) -> Option<Decimal> {
        let currency = canonical(currency);
        if currency == self.reference {
            return Some(Decimal::ONE);
        }
        self.rates.get(&(currency, date)).copied()
    }

    pub fn is_reference(&self, currency: &str) -> bool {
        canonical(currency) == self.reference
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }
}

fn canonical(currency: &str) -> String {
    currency.trim().to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{RateQuote, RateTable};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").expect("valid date literal")
    }

    #[test]
    fn reference_currency_converts_at_one() {
        let table = RateTable::new("usd");
        assert_eq!(table.rate_for("USD", day("2025-03-14")), Some(Decimal::ONE));
        assert_eq!(table.rate_for(" usd ", day("2025-03-14")), Some(Decimal::ONE));
    }

    #[test]
    fn lookup_is_keyed_by_currency_and_date() {
        let table = RateTable::from_quotes(
            "USD",
            [RateQuote {
                currency: "MXN".to_string(),
                date: day("2025-03-14"),
                rate: Decimal::new(58, 3),
            }],
        );

        assert_eq!(table.rate_for("mxn", day("2025-03-14")), Some(Decimal::new(58, 3)));
        assert_eq!(table.rate_for("MXN", day("2025-03-15")), None);
        assert_eq!(table.rate_for("EUR", day("2025-03-14")), None);
    }
}
