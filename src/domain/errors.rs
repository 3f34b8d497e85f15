use rust_decimal::Decimal;
use thiserror::Error;

/// Error kinds surfaced by the core (§7). `RetryManager` classifies these as retryable or
/// non-retryable; see `application::retry_manager`.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("insufficient funds: need ${required}, available ${available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("exchange error: {0}")]
    Exchange(String),

    #[error("internal invariant violated: {0}")]
    InternalInvariant(String),
}

impl CoreError {
    /// Whether the message carries the timestamp/recvwindow hint `OrderExecutor`'s
    /// special-handler looks for in a generic `Exchange` error (§4.2, §4.13).
    pub fn is_time_sync_hint(&self) -> bool {
        match self {
            CoreError::Exchange(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("timestamp") || lower.contains("recvwindow")
            }
            _ => false,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "ValidationError",
            CoreError::InsufficientFunds { .. } => "InsufficientFundsError",
            CoreError::OrderNotFound(_) => "OrderNotFoundError",
            CoreError::Network(_) => "NetworkError",
            CoreError::Exchange(_) => "ExchangeError",
            CoreError::InternalInvariant(_) => "InternalInvariantError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn insufficient_funds_message_contains_amounts() {
        let err = CoreError::InsufficientFunds {
            required: dec!(100),
            available: dec!(50),
        };
        assert!(err.to_string().contains("100"));
        assert!(err.to_string().contains("50"));
    }

    #[test]
    fn time_sync_hint_detects_timestamp_and_recvwindow() {
        assert!(
            CoreError::Exchange("Timestamp for this request is outside recvWindow".into())
                .is_time_sync_hint()
        );
        assert!(CoreError::Exchange("invalid recvWindow".into()).is_time_sync_hint());
        assert!(!CoreError::Exchange("insufficient margin".into()).is_time_sync_hint());
        assert!(!CoreError::Network("timeout".into()).is_time_sync_hint());
    }

    #[test]
    fn kind_name_matches_variant() {
        assert_eq!(CoreError::Validation("bad".into()).kind_name(), "ValidationError");
        assert_eq!(CoreError::OrderNotFound("x".into()).kind_name(), "OrderNotFoundError");
    }
}
