//! Checkout flow state machine.
//!
//! One [`CheckoutFlow`] instance drives a single checkout attempt through
//! `AddressSelection -> PaymentEntry -> Submitting -> Success | Failed`.
//! `Success` and `Failed` are terminal; a new attempt means a new flow.
//!
//! Submission writes the order row first and the line rows second. A line
//! write failure after the order row exists leaves a durable order without
//! lines; the flow reports that as [`StoreError::ConsistencyGap`] with the
//! order id rather than attempting a rollback the gateway cannot express.

use std::sync::Arc;

use tracing::{error, instrument, warn};

use quince_core::{AddressId, OrderId, OrderStatus, PaymentMethod, UserId};

use crate::cart::CartStore;
use crate::error::StoreError;
use crate::gateway::Gateway;
use crate::models::{Address, NewAddress, NewOrder, NewOrderLine};
use crate::pricing::{self, CartTotals};

/// Where the flow currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    /// Choosing or creating a shipping address.
    AddressSelection,
    /// Entering card details.
    PaymentEntry,
    /// An order submission is in flight.
    Submitting,
    /// The order was placed.
    Success { order_id: OrderId },
    /// Submission failed; the cart is untouched.
    Failed,
}

/// Card details as entered. Validated for format only; authorization is out
/// of scope for the storefront.
#[derive(Debug, Clone, Default)]
pub struct PaymentForm {
    /// Card number, spaces allowed.
    pub card_number: String,
    pub card_holder: String,
    /// Expiry as `MM/YY`.
    pub expiry: String,
    pub cvv: String,
}

impl PaymentForm {
    /// Check the card fields for plausible formats.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` naming the first field that fails.
    pub fn validate(&self) -> Result<(), StoreError> {
        let digits: String = self
            .card_number
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if digits.len() != 16 || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(StoreError::Validation(
                "card number must be 16 digits".to_owned(),
            ));
        }
        if self.card_holder.trim().is_empty() {
            return Err(StoreError::Validation(
                "cardholder name is required".to_owned(),
            ));
        }
        validate_expiry(&self.expiry)?;
        if !(3..=4).contains(&self.cvv.len()) || !self.cvv.chars().all(|c| c.is_ascii_digit()) {
            return Err(StoreError::Validation("CVV must be 3 or 4 digits".to_owned()));
        }
        Ok(())
    }
}

fn validate_expiry(expiry: &str) -> Result<(), StoreError> {
    let valid = expiry.split_once('/').is_some_and(|(month, year)| {
        month.len() == 2
            && year.len() == 2
            && year.chars().all(|c| c.is_ascii_digit())
            && month.parse::<u8>().is_ok_and(|m| (1..=12).contains(&m))
    });
    if valid {
        Ok(())
    } else {
        Err(StoreError::Validation(
            "expiry must be MM/YY".to_owned(),
        ))
    }
}

/// One checkout attempt for a signed-in user.
pub struct CheckoutFlow<G> {
    gateway: Arc<G>,
    state: CheckoutState,
    addresses: Vec<Address>,
    selected: Option<AddressId>,
}

impl<G: Gateway> CheckoutFlow<G> {
    /// Start a checkout for the cart's signed-in user: load their saved
    /// addresses (default first) and pre-select the first one.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthorized` when the cart has no session,
    /// `StoreError::Validation` when it is empty, or `StoreError::Gateway`
    /// when addresses cannot be loaded.
    #[instrument(skip(gateway, cart))]
    pub async fn begin(gateway: Arc<G>, cart: &CartStore<G>) -> Result<Self, StoreError> {
        let Some(user) = cart.user() else {
            return Err(StoreError::Unauthorized);
        };
        if cart.is_empty() {
            return Err(StoreError::Validation("cart is empty".to_owned()));
        }

        let addresses = gateway.addresses(user).await?;
        let selected = addresses.first().map(|a| a.id);
        Ok(Self {
            gateway,
            state: CheckoutState::AddressSelection,
            addresses,
            selected,
        })
    }

    #[must_use]
    pub const fn state(&self) -> &CheckoutState {
        &self.state
    }

    #[must_use]
    pub fn addresses(&self) -> &[Address] {
        &self.addresses
    }

    /// The address the order will ship to, if one is selected.
    #[must_use]
    pub fn selected_address(&self) -> Option<&Address> {
        self.selected
            .and_then(|id| self.addresses.iter().find(|a| a.id == id))
    }

    /// Select one of the loaded addresses.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` when the id is not among the loaded
    /// addresses or the flow has moved past address selection.
    pub fn select_address(&mut self, id: AddressId) -> Result<(), StoreError> {
        if self.state != CheckoutState::AddressSelection {
            return Err(StoreError::Validation(
                "address can no longer be changed".to_owned(),
            ));
        }
        if !self.addresses.iter().any(|a| a.id == id) {
            return Err(StoreError::Validation("unknown address".to_owned()));
        }
        self.selected = Some(id);
        Ok(())
    }

    /// Save a new address for the cart's user and select it. The address is
    /// persisted immediately so it survives an abandoned checkout; a user's
    /// first address becomes their default.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` for missing required fields or a
    /// wrong state, `StoreError::Gateway` when the write fails.
    #[instrument(skip(self, address), fields(user_id = %user))]
    pub async fn add_address(
        &mut self,
        user: UserId,
        address: NewAddress,
    ) -> Result<AddressId, StoreError> {
        if self.state != CheckoutState::AddressSelection {
            return Err(StoreError::Validation(
                "address can no longer be changed".to_owned(),
            ));
        }
        validate_address(&address)?;

        let is_default = self.addresses.is_empty();
        let saved = self.gateway.insert_address(user, address, is_default).await?;
        let id = saved.id;
        self.addresses = self.gateway.addresses(user).await?;
        self.selected = Some(id);
        Ok(id)
    }

    /// Move to payment entry. Requires a selected address.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Validation` when no address is selected or the
    /// flow is not at address selection.
    pub fn continue_to_payment(&mut self) -> Result<(), StoreError> {
        if self.state != CheckoutState::AddressSelection {
            return Err(StoreError::Validation(
                "not at address selection".to_owned(),
            ));
        }
        if self.selected_address().is_none() {
            return Err(StoreError::Validation(
                "select a shipping address first".to_owned(),
            ));
        }
        self.state = CheckoutState::PaymentEntry;
        Ok(())
    }

    /// Return to address selection from payment entry.
    pub fn back_to_address(&mut self) {
        if self.state == CheckoutState::PaymentEntry {
            self.state = CheckoutState::AddressSelection;
        }
    }

    /// Totals for the given cart, as they will be charged.
    #[must_use]
    pub fn totals(&self, cart: &CartStore<G>) -> CartTotals {
        pricing::price(cart.lines())
    }

    /// Place the order: one order row, then one line row per cart line, then
    /// clear the cart.
    ///
    /// Totals are recomputed from the cart's current contents at this moment.
    /// Unit prices are snapshotted into the line rows so later catalog price
    /// changes do not rewrite history.
    ///
    /// # Errors
    ///
    /// - `StoreError::Validation` when the flow is not at payment entry, the
    ///   card fields are malformed, or the cart emptied since `begin`.
    /// - `StoreError::Gateway` when the order row write fails; nothing was
    ///   persisted and the flow ends `Failed`.
    /// - `StoreError::ConsistencyGap` when the order row exists but its line
    ///   rows could not be written. The order id is reported and logged; the
    ///   cart is left intact and the flow ends `Failed`.
    #[instrument(skip(self, form, cart))]
    pub async fn submit(
        &mut self,
        form: &PaymentForm,
        cart: &mut CartStore<G>,
    ) -> Result<OrderId, StoreError> {
        if self.state != CheckoutState::PaymentEntry {
            return Err(StoreError::Validation(
                "checkout is not ready to submit".to_owned(),
            ));
        }
        form.validate()?;

        let Some(user) = cart.user() else {
            return Err(StoreError::Unauthorized);
        };
        if cart.is_empty() {
            return Err(StoreError::Validation("cart is empty".to_owned()));
        }
        let Some(address) = self.selected_address() else {
            return Err(StoreError::Validation(
                "select a shipping address first".to_owned(),
            ));
        };
        let address_id = address.id;

        self.state = CheckoutState::Submitting;
        let totals = pricing::price(cart.lines()).rounded();

        let order = match self
            .gateway
            .insert_order(NewOrder {
                user_id: user,
                address_id,
                total_amount: totals.total,
                status: OrderStatus::Pending,
                payment_method: PaymentMethod::Card,
            })
            .await
        {
            Ok(order) => order,
            Err(err) => {
                self.state = CheckoutState::Failed;
                return Err(err.into());
            }
        };

        let lines: Vec<NewOrderLine> = cart
            .lines()
            .iter()
            .filter_map(|line| {
                let Some(product) = &line.product else {
                    warn!(line_id = %line.id, "cart line without resolved product skipped");
                    return None;
                };
                Some(NewOrderLine {
                    order_id: order.id,
                    product_id: line.product_id,
                    quantity: line.quantity,
                    price: product.price,
                })
            })
            .collect();

        if let Err(source) = self.gateway.insert_order_lines(lines).await {
            error!(
                order_id = %order.id,
                error = %source,
                "order row written but line rows failed; order has no lines"
            );
            self.state = CheckoutState::Failed;
            return Err(StoreError::ConsistencyGap {
                order_id: order.id,
                source,
            });
        }

        // The order is placed either way; a stale cart is recoverable.
        if let Err(err) = cart.clear().await {
            warn!(order_id = %order.id, error = %err, "cart clear failed after order placement");
        }

        self.state = CheckoutState::Success { order_id: order.id };
        Ok(order.id)
    }
}

fn validate_address(address: &NewAddress) -> Result<(), StoreError> {
    let required = [
        ("full name", &address.full_name),
        ("address line", &address.address_line1),
        ("city", &address.city),
        ("state", &address.state),
        ("postal code", &address.postal_code),
        ("phone", &address.phone),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(StoreError::Validation(format!("{field} is required")));
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;

    use quince_core::{CategoryId, Money, ProductId, UserId};

    use crate::gateway::MemoryGateway;
    use crate::models::Product;

    use super::*;

    fn product(cents: i64, stock: u32) -> Product {
        Product {
            id: ProductId::generate(),
            category_id: CategoryId::generate(),
            name: "Widget".to_owned(),
            description: String::new(),
            price: Money::from_cents(cents),
            original_price: None,
            image_url: String::new(),
            images: Vec::new(),
            stock,
            rating: 4.5,
            review_count: 0,
            brand: "Acme".to_owned(),
            features: Vec::new(),
            created_at: Utc::now(),
        }
    }

    fn address_form() -> NewAddress {
        NewAddress {
            full_name: "Jordan Doe".to_owned(),
            address_line1: "1 Main St".to_owned(),
            city: "Springfield".to_owned(),
            state: "IL".to_owned(),
            postal_code: "62701".to_owned(),
            phone: "555-0100".to_owned(),
            ..NewAddress::default()
        }
    }

    fn card() -> PaymentForm {
        PaymentForm {
            card_number: "4242 4242 4242 4242".to_owned(),
            card_holder: "Jordan Doe".to_owned(),
            expiry: "12/29".to_owned(),
            cvv: "123".to_owned(),
        }
    }

    async fn cart_with_items(
        gateway: &Arc<MemoryGateway>,
    ) -> (UserId, CartStore<MemoryGateway>) {
        let user = gateway.seed_account("shopper@example.com", "hunter2hunter2");
        let p = gateway.seed_product(product(20_00, 10));
        let mut cart = CartStore::new(Arc::clone(gateway));
        cart.attach_session(user).await.unwrap();
        cart.add_line(&p, 3).await.unwrap();
        (user, cart)
    }

    #[test]
    fn payment_form_formats() {
        assert!(card().validate().is_ok());

        let mut bad = card();
        bad.card_number = "4242".to_owned();
        assert!(bad.validate().is_err());

        let mut bad = card();
        bad.expiry = "13/29".to_owned();
        assert!(bad.validate().is_err());

        let mut bad = card();
        bad.expiry = "1/29".to_owned();
        assert!(bad.validate().is_err());

        let mut bad = card();
        bad.cvv = "12".to_owned();
        assert!(bad.validate().is_err());

        let mut bad = card();
        bad.card_holder = "  ".to_owned();
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn begin_refuses_guest_and_empty_carts() {
        let gateway = Arc::new(MemoryGateway::new());
        let guest = CartStore::new(Arc::clone(&gateway));
        assert!(matches!(
            CheckoutFlow::begin(Arc::clone(&gateway), &guest).await,
            Err(StoreError::Unauthorized)
        ));

        let user = gateway.seed_account("shopper@example.com", "hunter2hunter2");
        let mut empty = CartStore::new(Arc::clone(&gateway));
        empty.attach_session(user).await.unwrap();
        assert!(matches!(
            CheckoutFlow::begin(Arc::clone(&gateway), &empty).await,
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn first_address_becomes_default_and_selected() {
        let gateway = Arc::new(MemoryGateway::new());
        let (user, cart) = cart_with_items(&gateway).await;
        let mut flow = CheckoutFlow::begin(Arc::clone(&gateway), &cart).await.unwrap();

        assert!(flow.selected_address().is_none());
        flow.add_address(user, address_form()).await.unwrap();

        let selected = flow.selected_address().unwrap();
        assert!(selected.is_default);
    }

    #[tokio::test]
    async fn payment_requires_an_address() {
        let gateway = Arc::new(MemoryGateway::new());
        let (_, cart) = cart_with_items(&gateway).await;
        let mut flow = CheckoutFlow::begin(Arc::clone(&gateway), &cart).await.unwrap();

        assert!(matches!(
            flow.continue_to_payment(),
            Err(StoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn successful_submit_places_order_and_clears_cart() {
        let gateway = Arc::new(MemoryGateway::new());
        let (user, mut cart) = cart_with_items(&gateway).await;
        let mut flow = CheckoutFlow::begin(Arc::clone(&gateway), &cart).await.unwrap();
        flow.add_address(user, address_form()).await.unwrap();
        flow.continue_to_payment().unwrap();

        let order_id = flow.submit(&card(), &mut cart).await.unwrap();

        assert_eq!(*flow.state(), CheckoutState::Success { order_id });
        assert!(cart.is_empty());

        let order = gateway.orders(user).await.unwrap().remove(0);
        assert_eq!(order.id, order_id);
        assert_eq!(order.status, OrderStatus::Pending);
        // 60.00 subtotal, free shipping, 4.80 tax
        assert_eq!(order.total_amount, Money::from_cents(64_80));

        let lines = gateway.order_lines(order_id).await.unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].quantity, 3);
        assert_eq!(lines[0].price, Money::from_cents(20_00));
    }

    #[tokio::test]
    async fn order_write_failure_ends_failed_and_keeps_cart() {
        let gateway = Arc::new(MemoryGateway::new());
        let (user, mut cart) = cart_with_items(&gateway).await;
        let mut flow = CheckoutFlow::begin(Arc::clone(&gateway), &cart).await.unwrap();
        flow.add_address(user, address_form()).await.unwrap();
        flow.continue_to_payment().unwrap();

        gateway.fail_insert_order();
        let err = flow.submit(&card(), &mut cart).await.unwrap_err();

        assert!(matches!(err, StoreError::Gateway(_)));
        assert_eq!(*flow.state(), CheckoutState::Failed);
        assert_eq!(cart.count(), 3);
        assert_eq!(gateway.order_row_count(), 0);
    }

    #[tokio::test]
    async fn line_write_failure_reports_consistency_gap() {
        let gateway = Arc::new(MemoryGateway::new());
        let (user, mut cart) = cart_with_items(&gateway).await;
        let mut flow = CheckoutFlow::begin(Arc::clone(&gateway), &cart).await.unwrap();
        flow.add_address(user, address_form()).await.unwrap();
        flow.continue_to_payment().unwrap();

        gateway.fail_insert_order_lines();
        let err = flow.submit(&card(), &mut cart).await.unwrap_err();

        let StoreError::ConsistencyGap { order_id, .. } = err else {
            panic!("expected consistency gap, got {err}");
        };
        assert_eq!(*flow.state(), CheckoutState::Failed);
        // The order row exists but has no lines
        assert_eq!(gateway.order_row_count(), 1);
        assert!(gateway.order_lines(order_id).await.unwrap().is_empty());
        // The cart is untouched for a retry or support follow-up
        assert_eq!(cart.count(), 3);
    }

    #[tokio::test]
    async fn submit_is_guarded_by_state() {
        let gateway = Arc::new(MemoryGateway::new());
        let (_, mut cart) = cart_with_items(&gateway).await;
        let mut flow = CheckoutFlow::begin(Arc::clone(&gateway), &cart).await.unwrap();

        // Still at address selection
        assert!(matches!(
            flow.submit(&card(), &mut cart).await,
            Err(StoreError::Validation(_))
        ));
    }
}
