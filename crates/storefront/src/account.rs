//! Signed-in account views: order history and saved addresses.

use std::sync::Arc;

use tracing::instrument;

use quince_core::UserId;

use crate::error::StoreError;
use crate::gateway::Gateway;
use crate::models::{Address, Order, OrderLine};

/// An order together with its line rows, for history display.
#[derive(Debug, Clone)]
pub struct OrderSummary {
    pub order: Order,
    pub lines: Vec<OrderLine>,
}

impl OrderSummary {
    /// Total item count across the order's lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }
}

/// Account data access over a gateway.
pub struct AccountService<G> {
    gateway: Arc<G>,
}

impl<G: Gateway> AccountService<G> {
    #[must_use]
    pub const fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// The user's orders, newest first, each with its lines and resolved
    /// products. An order with no lines still appears, with an empty line
    /// list.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Gateway` when any gateway read fails.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn order_history(&self, user: UserId) -> Result<Vec<OrderSummary>, StoreError> {
        let orders = self.gateway.orders(user).await?;
        let mut summaries = Vec::with_capacity(orders.len());
        for order in orders {
            let lines = self.gateway.order_lines(order.id).await?;
            summaries.push(OrderSummary { order, lines });
        }
        Ok(summaries)
    }

    /// The user's saved addresses, default first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Gateway` when the gateway read fails.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn addresses(&self, user: UserId) -> Result<Vec<Address>, StoreError> {
        Ok(self.gateway.addresses(user).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use quince_core::{Money, OrderStatus, PaymentMethod};

    use crate::gateway::MemoryGateway;
    use crate::models::{NewAddress, NewOrder, NewOrderLine};

    use super::*;

    #[tokio::test]
    async fn history_is_newest_first_with_lines() {
        let gateway = Arc::new(MemoryGateway::new());
        let user = gateway.seed_account("shopper@example.com", "hunter2hunter2");
        let address = gateway
            .insert_address(user, NewAddress::default(), true)
            .await
            .unwrap();

        let mut order_ids = Vec::new();
        for cents in [10_00, 25_00] {
            let order = gateway
                .insert_order(NewOrder {
                    user_id: user,
                    address_id: address.id,
                    total_amount: Money::from_cents(cents),
                    status: OrderStatus::Pending,
                    payment_method: PaymentMethod::Card,
                })
                .await
                .unwrap();
            gateway
                .insert_order_lines(vec![NewOrderLine {
                    order_id: order.id,
                    product_id: quince_core::ProductId::generate(),
                    quantity: 2,
                    price: Money::from_cents(cents / 2),
                }])
                .await
                .unwrap();
            order_ids.push(order.id);
        }

        let service = AccountService::new(Arc::clone(&gateway));
        let history = service.order_history(user).await.unwrap();

        assert_eq!(history.len(), 2);
        // Second order placed last, listed first
        assert_eq!(history[0].order.id, order_ids[1]);
        assert_eq!(history[0].item_count(), 2);
    }

    #[tokio::test]
    async fn default_address_listed_first() {
        let gateway = Arc::new(MemoryGateway::new());
        let user = gateway.seed_account("shopper@example.com", "hunter2hunter2");
        gateway
            .insert_address(
                user,
                NewAddress {
                    full_name: "Second".to_owned(),
                    ..NewAddress::default()
                },
                false,
            )
            .await
            .unwrap();
        gateway
            .insert_address(
                user,
                NewAddress {
                    full_name: "Default".to_owned(),
                    ..NewAddress::default()
                },
                true,
            )
            .await
            .unwrap();

        let service = AccountService::new(Arc::clone(&gateway));
        let addresses = service.addresses(user).await.unwrap();
        assert_eq!(addresses[0].full_name, "Default");
        assert!(addresses[0].is_default);
    }
}
