use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

/// Per-record normalization failures. These are data-quality errors: they
/// are always demoted to an evidence-bearing verdict, never propagated up
/// the batch.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("no conversion rate for {currency} on {date}")]
    RateUnavailable { currency: String, date: NaiveDate },
    #[error("cannot convert undated invoice amounts from {currency}")]
    UndatedConversion { currency: String },
    #[error("extraction confidence {confidence} is below the floor {floor}")]
    LowConfidence { confidence: Decimal, floor: Decimal },
    #[error("extraction failed upstream: {reason}")]
    ExtractionFailed { reason: String },
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::NormalizeError;

    #[test]
    fn messages_name_the_failing_input() {
        let error = NormalizeError::LowConfidence {
            confidence: Decimal::new(32, 2),
            floor: Decimal::new(50, 2),
        };
        assert_eq!(
            error.to_string(),
            "extraction confidence 0.32 is below the floor 0.50"
        );

        let error = NormalizeError::UndatedConversion { currency: "MXN".to_string() };
        assert!(error.to_string().contains("MXN"));
    }
}
