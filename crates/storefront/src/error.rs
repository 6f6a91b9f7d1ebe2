//! Unified error handling for storefront operations.
//!
//! Three error classes exist (see the taxonomy below): validation errors are
//! reported before any gateway call is attempted, gateway errors wrap a
//! failed durable read/write, and [`StoreError::ConsistencyGap`] marks the
//! one known partial-failure state so it can be reconciled out-of-band. No
//! error is fatal - every failure leaves the calling service retryable.

use thiserror::Error;

use quince_core::OrderId;

use crate::auth::AuthError;
use crate::gateway::GatewayError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed or missing required input. The operation was not attempted.
    #[error("validation error: {0}")]
    Validation(String),

    /// A durable read or write failed at the remote data gateway.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// An order was created but its lines failed to persist. The order is
    /// left in place (no rollback); reconcile out-of-band.
    #[error("order {order_id} was created but its lines failed to persist")]
    ConsistencyGap {
        order_id: OrderId,
        #[source]
        source: GatewayError,
    },

    /// Authentication operation failed.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// No active session for an operation that requires one.
    #[error("not signed in")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl StoreError {
    /// A message safe to show to the customer.
    ///
    /// Gateway internals are never exposed; validation messages pass through
    /// since they describe the customer's own input.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Gateway(_) | Self::ConsistencyGap { .. } => {
                "Something went wrong. Please try again.".to_owned()
            }
            Self::Auth(err) => err.user_message(),
            Self::Unauthorized => "Please sign in to continue.".to_owned(),
            Self::NotFound(_) => "Not found.".to_owned(),
        }
    }
}

/// Result type alias for `StoreError`.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_passes_through() {
        let err = StoreError::Validation("Your cart is empty".to_string());
        assert_eq!(err.user_message(), "Your cart is empty");
    }

    #[test]
    fn gateway_details_are_not_exposed() {
        let err = StoreError::Gateway(GatewayError::Api {
            status: 500,
            message: "relation \"orders\" does not exist".to_string(),
        });
        assert!(!err.user_message().contains("orders"));
    }

    #[test]
    fn consistency_gap_names_the_order() {
        let order_id = OrderId::generate();
        let err = StoreError::ConsistencyGap {
            order_id,
            source: GatewayError::Api {
                status: 500,
                message: "insert failed".to_string(),
            },
        };
        assert!(err.to_string().contains(&order_id.to_string()));
    }
}
