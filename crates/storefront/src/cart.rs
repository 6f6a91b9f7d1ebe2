//! Cart state store.
//!
//! Owns the in-memory view of the active user's cart and keeps it
//! reconciled with the remote data gateway, which is the durable source of
//! truth. Mutations are two-phase: the write goes to the gateway, then the
//! in-memory view is refreshed from the gateway's state (or reloaded
//! wholesale on error) so the two can never diverge permanently.
//!
//! Without an active session no durable write ever happens: mutations apply
//! to local guest lines only, and [`CartStore::attach_session`] merges those
//! into the user's durable cart on sign-in.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument, warn};

use quince_core::{CartLineId, ProductId, UserId};

use crate::error::StoreError;
use crate::gateway::Gateway;
use crate::models::{CartLine, Product};

/// In-memory cart for one user session (or a guest).
///
/// At most one line exists per product; quantities stay within
/// `[1, product.stock]`.
pub struct CartStore<G> {
    gateway: Arc<G>,
    user: Option<UserId>,
    lines: Vec<CartLine>,
}

impl<G: Gateway> CartStore<G> {
    /// Create an empty guest cart.
    #[must_use]
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            gateway,
            user: None,
            lines: Vec::new(),
        }
    }

    /// The active user session, if any.
    #[must_use]
    pub const fn user(&self) -> Option<UserId> {
        self.user
    }

    /// Current cart lines.
    #[must_use]
    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    /// Whether the cart holds no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Total item count across all lines.
    ///
    /// Recomputed on every call - this drives the visible badge and must
    /// never be stale.
    #[must_use]
    pub fn count(&self) -> u32 {
        self.lines.iter().map(|line| line.quantity).sum()
    }

    /// Attach a signed-in session and merge any guest lines into the user's
    /// durable cart (accumulating quantities, clamped to stock), then adopt
    /// the durable state.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Gateway` if the durable cart cannot be read or
    /// written; the store is left on the durable state loaded so far.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn attach_session(&mut self, user: UserId) -> Result<(), StoreError> {
        let guest_lines = std::mem::take(&mut self.lines);
        self.user = Some(user);
        self.lines = self.gateway.cart_lines(user).await?;

        for guest in guest_lines {
            let Some(product) = guest.product else {
                continue;
            };
            if product.stock == 0 {
                warn!(product_id = %product.id, "staged line sold out before sign-in, dropped");
                continue;
            }
            self.add_line(&product, guest.quantity).await?;
        }
        Ok(())
    }

    /// Drop the session and all in-memory lines. The durable cart is left
    /// untouched for the user's next sign-in.
    pub fn detach_session(&mut self) {
        self.user = None;
        self.lines.clear();
    }

    /// Reload the in-memory view from the durable store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Gateway` if the read fails; the previous
    /// in-memory view is kept so the operation can be retried.
    pub async fn reload(&mut self) -> Result<(), StoreError> {
        if let Some(user) = self.user {
            self.lines = self.gateway.cart_lines(user).await?;
        }
        Ok(())
    }

    /// Add `quantity` of a product to the cart.
    ///
    /// If a line for this product already exists its quantity accumulates;
    /// otherwise a new line is created. The resulting quantity is clamped to
    /// the product's stock. With no active session the durable store is not
    /// touched and the line is staged locally.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` if the product is out of stock, or
    /// `StoreError::Gateway` if the durable write fails.
    #[instrument(skip(self, product), fields(product_id = %product.id, quantity))]
    pub async fn add_line(&mut self, product: &Product, quantity: u32) -> Result<(), StoreError> {
        if product.stock == 0 {
            return Err(StoreError::Validation(format!(
                "{} is out of stock",
                product.name
            )));
        }

        let Some(user) = self.user else {
            debug!("no active session; staging guest cart line");
            self.stage_guest_line(product, quantity);
            return Ok(());
        };

        let existing = self
            .lines
            .iter()
            .find(|line| line.product_id == product.id)
            .map(|line| (line.id, line.quantity));

        let result = match existing {
            Some((line_id, current)) => {
                let target = clamp_to_stock(current.saturating_add(quantity), product.stock);
                self.gateway.update_cart_line(line_id, target).await
            }
            None => {
                let target = clamp_to_stock(quantity, product.stock);
                self.gateway.insert_cart_line(user, product.id, target).await
            }
        };

        self.confirm_or_revert(result.map(|_| ())).await
    }

    /// Set a line's quantity. Zero removes the line; anything else is
    /// clamped to `[1, stock]`. A line must never be left with quantity 0.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Gateway` if the durable write fails.
    #[instrument(skip(self), fields(line_id = %line, quantity))]
    pub async fn update_quantity(
        &mut self,
        line: CartLineId,
        quantity: u32,
    ) -> Result<(), StoreError> {
        if quantity == 0 {
            return self.remove_line(line).await;
        }

        let Some(entry) = self.lines.iter().find(|l| l.id == line) else {
            // Unknown line: nothing to update
            return Ok(());
        };
        let stock = entry.product.as_ref().map_or(u32::MAX, |p| p.stock);
        if stock == 0 {
            // Product sold out since the line was created
            return self.remove_line(line).await;
        }
        let target = clamp_to_stock(quantity, stock);

        if self.user.is_none() {
            if let Some(entry) = self.lines.iter_mut().find(|l| l.id == line) {
                entry.quantity = target;
                entry.updated_at = Utc::now();
            }
            return Ok(());
        }

        let result = self.gateway.update_cart_line(line, target).await;
        self.confirm_or_revert(result.map(|_| ())).await
    }

    /// Remove a line. Idempotent: removing a line that does not exist is a
    /// no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Gateway` if the durable delete fails.
    #[instrument(skip(self), fields(line_id = %line))]
    pub async fn remove_line(&mut self, line: CartLineId) -> Result<(), StoreError> {
        if self.user.is_none() {
            self.lines.retain(|l| l.id != line);
            return Ok(());
        }

        let result = self.gateway.delete_cart_line(line).await;
        self.confirm_or_revert(result).await
    }

    /// Delete every line for the current user. Used after a successful
    /// checkout.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Gateway` if the durable delete fails.
    #[instrument(skip(self))]
    pub async fn clear(&mut self) -> Result<(), StoreError> {
        let Some(user) = self.user else {
            self.lines.clear();
            return Ok(());
        };

        let result = self.gateway.clear_cart(user).await;
        self.confirm_or_revert(result).await
    }

    /// Second phase of a durable mutation: on success adopt the gateway's
    /// state, on failure reload it so the in-memory view cannot drift.
    async fn confirm_or_revert(
        &mut self,
        result: Result<(), crate::gateway::GatewayError>,
    ) -> Result<(), StoreError> {
        match result {
            Ok(()) => {
                self.reload().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(reload_err) = self.reload().await {
                    warn!(error = %reload_err, "failed to re-sync cart after gateway error");
                }
                Err(err.into())
            }
        }
    }

    /// Apply a guest mutation locally: accumulate per product, clamp to
    /// stock, synthesize a line id.
    fn stage_guest_line(&mut self, product: &Product, quantity: u32) {
        let now = Utc::now();
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|line| line.product_id == product.id)
        {
            line.quantity = clamp_to_stock(line.quantity.saturating_add(quantity), product.stock);
            line.updated_at = now;
            return;
        }

        self.lines.push(CartLine {
            id: CartLineId::generate(),
            // Placeholder owner until a session is attached
            user_id: UserId::new(uuid::Uuid::nil()),
            product_id: product.id,
            quantity: clamp_to_stock(quantity, product.stock),
            created_at: now,
            updated_at: now,
            product: Some(product.clone()),
        });
    }

    /// Look up a line id by product, for callers that track products only.
    #[must_use]
    pub fn line_for_product(&self, product: ProductId) -> Option<CartLineId> {
        self.lines
            .iter()
            .find(|line| line.product_id == product)
            .map(|line| line.id)
    }
}

/// Clamp a quantity into `[1, stock]`. Callers guarantee `stock >= 1`.
fn clamp_to_stock(quantity: u32, stock: u32) -> u32 {
    quantity.clamp(1, stock.max(1))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use quince_core::{CategoryId, Money};

    use crate::gateway::MemoryGateway;

    use super::*;

    fn product(name: &str, cents: i64, stock: u32) -> Product {
        Product {
            id: ProductId::generate(),
            category_id: CategoryId::generate(),
            name: name.to_owned(),
            description: String::new(),
            price: Money::from_cents(cents),
            original_price: None,
            image_url: String::new(),
            images: Vec::new(),
            stock,
            rating: 4.0,
            review_count: 0,
            brand: "Acme".to_owned(),
            features: Vec::new(),
            created_at: Utc::now(),
        }
    }

    async fn signed_in_cart() -> (Arc<MemoryGateway>, CartStore<MemoryGateway>) {
        let gateway = Arc::new(MemoryGateway::new());
        let user = gateway.seed_account("shopper@example.com", "hunter2hunter2");
        let mut cart = CartStore::new(Arc::clone(&gateway));
        cart.attach_session(user).await.unwrap();
        (gateway, cart)
    }

    #[tokio::test]
    async fn add_twice_accumulates_into_one_line() {
        let (gateway, mut cart) = signed_in_cart().await;
        let p = gateway.seed_product(product("Widget", 10_00, 10));

        cart.add_line(&p, 2).await.unwrap();
        cart.add_line(&p, 3).await.unwrap();

        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.count(), 5);
    }

    #[tokio::test]
    async fn accumulation_clamps_to_stock() {
        let (gateway, mut cart) = signed_in_cart().await;
        let p = gateway.seed_product(product("Widget", 10_00, 4));

        cart.add_line(&p, 3).await.unwrap();
        cart.add_line(&p, 3).await.unwrap();

        assert_eq!(cart.count(), 4);
    }

    #[tokio::test]
    async fn out_of_stock_product_is_refused() {
        let (gateway, mut cart) = signed_in_cart().await;
        let p = gateway.seed_product(product("Gone", 10_00, 0));

        let err = cart.add_line(&p, 1).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(cart.is_empty());
    }

    #[tokio::test]
    async fn update_to_zero_removes_the_line() {
        let (gateway, mut cart) = signed_in_cart().await;
        let p = gateway.seed_product(product("Widget", 10_00, 10));
        cart.add_line(&p, 2).await.unwrap();
        let line = cart.line_for_product(p.id).unwrap();

        cart.update_quantity(line, 0).await.unwrap();

        assert!(cart.is_empty());
        assert_eq!(cart.count(), 0);
    }

    #[tokio::test]
    async fn update_sets_quantity_exactly_within_stock() {
        let (gateway, mut cart) = signed_in_cart().await;
        let p = gateway.seed_product(product("Widget", 10_00, 10));
        cart.add_line(&p, 1).await.unwrap();
        let line = cart.line_for_product(p.id).unwrap();

        cart.update_quantity(line, 7).await.unwrap();
        assert_eq!(cart.count(), 7);

        // Above stock clamps down
        cart.update_quantity(line, 50).await.unwrap();
        assert_eq!(cart.count(), 10);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (gateway, mut cart) = signed_in_cart().await;
        let p = gateway.seed_product(product("Widget", 10_00, 10));
        cart.add_line(&p, 2).await.unwrap();
        let line = cart.line_for_product(p.id).unwrap();

        cart.remove_line(line).await.unwrap();
        let after_first = cart.lines().len();
        cart.remove_line(line).await.unwrap();

        assert_eq!(after_first, 0);
        assert_eq!(cart.lines().len(), 0);
    }

    #[tokio::test]
    async fn guest_mutations_never_touch_the_durable_store() {
        let gateway = Arc::new(MemoryGateway::new());
        let user = gateway.seed_account("shopper@example.com", "hunter2hunter2");
        let p = gateway.seed_product(product("Widget", 10_00, 10));
        let mut cart = CartStore::new(Arc::clone(&gateway));

        cart.add_line(&p, 2).await.unwrap();

        assert_eq!(cart.count(), 2);
        assert_eq!(gateway.cart_row_count(user), 0);
    }

    #[tokio::test]
    async fn guest_lines_merge_into_durable_cart_on_sign_in() {
        let gateway = Arc::new(MemoryGateway::new());
        let user = gateway.seed_account("shopper@example.com", "hunter2hunter2");
        let p = gateway.seed_product(product("Widget", 10_00, 10));

        // The user already has a durable line from a previous session
        gateway.insert_cart_line(user, p.id, 2).await.unwrap();

        let mut cart = CartStore::new(Arc::clone(&gateway));
        cart.add_line(&p, 3).await.unwrap();
        cart.attach_session(user).await.unwrap();

        // 2 durable + 3 guest accumulated into one row
        assert_eq!(cart.lines().len(), 1);
        assert_eq!(cart.count(), 5);
        assert_eq!(gateway.cart_row_count(user), 1);
    }

    #[tokio::test]
    async fn clear_empties_cart_and_durable_rows() {
        let (gateway, mut cart) = signed_in_cart().await;
        let p = gateway.seed_product(product("Widget", 10_00, 10));
        let q = gateway.seed_product(product("Gadget", 5_00, 10));
        cart.add_line(&p, 1).await.unwrap();
        cart.add_line(&q, 2).await.unwrap();
        let user = cart.user().unwrap();

        cart.clear().await.unwrap();

        assert!(cart.is_empty());
        assert_eq!(gateway.cart_row_count(user), 0);
    }

    #[tokio::test]
    async fn detach_session_keeps_durable_cart() {
        let (gateway, mut cart) = signed_in_cart().await;
        let p = gateway.seed_product(product("Widget", 10_00, 10));
        cart.add_line(&p, 2).await.unwrap();
        let user = cart.user().unwrap();

        cart.detach_session();

        assert!(cart.is_empty());
        assert_eq!(gateway.cart_row_count(user), 1);
    }
}
