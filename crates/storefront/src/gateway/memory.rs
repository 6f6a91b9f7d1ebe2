//! In-process implementation of the remote data gateway.
//!
//! Backs the integration tests and local demos with the same row semantics
//! the hosted gateway provides: per-user cart rows, default-first address
//! ordering, newest-first orders. Supports fault injection so the checkout
//! flow's failure paths can be exercised.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;

use quince_core::{
    AddressId, CartLineId, CategoryId, Email, OrderId, OrderLineId, ProductId, UserId,
};

use crate::models::{
    Address, CartLine, Category, NewAddress, NewOrder, NewOrderLine, Order, OrderLine, Product,
    ProductQuery, ProductSort, Review, Session,
};

use super::{Gateway, GatewayError};

#[derive(Default)]
struct State {
    products: Vec<Product>,
    categories: Vec<Category>,
    reviews: Vec<Review>,
    cart: Vec<CartLine>,
    addresses: Vec<Address>,
    orders: Vec<Order>,
    order_lines: Vec<OrderLine>,
    accounts: HashMap<String, (String, UserId)>,
    session: Option<Session>,
    fail_insert_order: bool,
    fail_insert_order_lines: bool,
}

/// An in-memory [`Gateway`].
///
/// All state lives behind a single mutex; every operation locks, works, and
/// releases before returning, matching the one-round-trip-per-call contract.
#[derive(Default)]
pub struct MemoryGateway {
    state: Mutex<State>,
}

impl MemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, State>, GatewayError> {
        self.state.lock().map_err(|_| GatewayError::Api {
            status: 500,
            message: "gateway state poisoned".to_owned(),
        })
    }

    // =========================================================================
    // Seeding and fault injection
    // =========================================================================

    /// Seed a category and return its id.
    pub fn seed_category(&self, name: &str, slug: &str) -> CategoryId {
        let id = CategoryId::generate();
        if let Ok(mut state) = self.state.lock() {
            state.categories.push(Category {
                id,
                name: name.to_owned(),
                slug: slug.to_owned(),
                description: String::new(),
                created_at: Utc::now(),
            });
        }
        id
    }

    /// Seed a product and return it.
    pub fn seed_product(&self, product: Product) -> Product {
        if let Ok(mut state) = self.state.lock() {
            state.products.push(product.clone());
        }
        product
    }

    /// Seed a review.
    pub fn seed_review(&self, review: Review) {
        if let Ok(mut state) = self.state.lock() {
            state.reviews.push(review);
        }
    }

    /// Register an account without opening a session; returns its user id.
    pub fn seed_account(&self, email: &str, password: &str) -> UserId {
        let user_id = UserId::generate();
        if let Ok(mut state) = self.state.lock() {
            state
                .accounts
                .insert(email.to_owned(), (password.to_owned(), user_id));
        }
        user_id
    }

    /// Make the next `insert_order` call fail.
    pub fn fail_insert_order(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_insert_order = true;
        }
    }

    /// Make the next `insert_order_lines` call fail.
    pub fn fail_insert_order_lines(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.fail_insert_order_lines = true;
        }
    }

    /// Number of durable cart rows for a user (test inspection).
    #[must_use]
    pub fn cart_row_count(&self, user: UserId) -> usize {
        self.state
            .lock()
            .map(|s| s.cart.iter().filter(|l| l.user_id == user).count())
            .unwrap_or(0)
    }

    /// Number of durable order rows (test inspection).
    #[must_use]
    pub fn order_row_count(&self) -> usize {
        self.state.lock().map(|s| s.orders.len()).unwrap_or(0)
    }

    fn resolve_product(state: &State, line: &CartLine) -> CartLine {
        let mut line = line.clone();
        line.product = state
            .products
            .iter()
            .find(|p| p.id == line.product_id)
            .cloned();
        line
    }
}

impl Gateway for MemoryGateway {
    // =========================================================================
    // Session / identity
    // =========================================================================

    async fn sign_up(&self, email: &Email, password: &str) -> Result<Session, GatewayError> {
        let mut state = self.lock()?;
        if state.accounts.contains_key(email.as_str()) {
            return Err(GatewayError::Api {
                status: 422,
                message: "user already registered".to_owned(),
            });
        }
        let user_id = UserId::generate();
        state
            .accounts
            .insert(email.to_string(), (password.to_owned(), user_id));
        let session = Session {
            user_id,
            email: email.clone(),
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_in(&self, email: &Email, password: &str) -> Result<Session, GatewayError> {
        let mut state = self.lock()?;
        let user_id = match state.accounts.get(email.as_str()) {
            Some((stored, user_id)) if stored == password => *user_id,
            _ => return Err(GatewayError::Auth("invalid login credentials".to_owned())),
        };
        let session = Session {
            user_id,
            email: email.clone(),
        };
        state.session = Some(session.clone());
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        self.lock()?.session = None;
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, GatewayError> {
        Ok(self.lock()?.session.clone())
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    async fn products(&self, query: &ProductQuery) -> Result<Vec<Product>, GatewayError> {
        let state = self.lock()?;

        let category_id = match query.category.as_deref() {
            Some(slug) => Some(
                state
                    .categories
                    .iter()
                    .find(|c| c.slug == slug)
                    .map(|c| c.id)
                    .ok_or_else(|| GatewayError::NotFound(format!("category not found: {slug}")))?,
            ),
            None => None,
        };

        let mut products: Vec<Product> = state
            .products
            .iter()
            .filter(|p| category_id.is_none_or(|id| p.category_id == id))
            .filter(|p| {
                query.search.as_deref().is_none_or(|term| {
                    p.name.to_lowercase().contains(&term.to_lowercase())
                })
            })
            .cloned()
            .collect();

        match query.sort {
            ProductSort::Featured => products.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            ProductSort::PriceAsc => products.sort_by(|a, b| a.price.cmp(&b.price)),
            ProductSort::PriceDesc => products.sort_by(|a, b| b.price.cmp(&a.price)),
            ProductSort::Rating => {
                products.sort_by(|a, b| b.rating.total_cmp(&a.rating));
            }
        }

        Ok(products)
    }

    async fn product(&self, id: ProductId) -> Result<Product, GatewayError> {
        self.lock()?
            .products
            .iter()
            .find(|p| p.id == id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("product not found: {id}")))
    }

    async fn categories(&self) -> Result<Vec<Category>, GatewayError> {
        let mut categories = self.lock()?.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn reviews(&self, product_id: ProductId) -> Result<Vec<Review>, GatewayError> {
        let mut reviews: Vec<Review> = self
            .lock()?
            .reviews
            .iter()
            .filter(|r| r.product_id == product_id)
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reviews)
    }

    // =========================================================================
    // Cart rows
    // =========================================================================

    async fn cart_lines(&self, user: UserId) -> Result<Vec<CartLine>, GatewayError> {
        let state = self.lock()?;
        let mut lines: Vec<CartLine> = state
            .cart
            .iter()
            .filter(|l| l.user_id == user)
            .map(|l| Self::resolve_product(&state, l))
            .collect();
        lines.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(lines)
    }

    async fn insert_cart_line(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<CartLine, GatewayError> {
        let mut state = self.lock()?;
        // Unique per (user, product), enforced like the gateway's constraint
        if state
            .cart
            .iter()
            .any(|l| l.user_id == user && l.product_id == product)
        {
            return Err(GatewayError::Api {
                status: 409,
                message: "duplicate cart line for user and product".to_owned(),
            });
        }
        let now = Utc::now();
        let line = CartLine {
            id: CartLineId::generate(),
            user_id: user,
            product_id: product,
            quantity,
            created_at: now,
            updated_at: now,
            product: None,
        };
        state.cart.push(line.clone());
        Ok(Self::resolve_product(&state, &line))
    }

    async fn update_cart_line(
        &self,
        line: CartLineId,
        quantity: u32,
    ) -> Result<CartLine, GatewayError> {
        let mut state = self.lock()?;
        let Some(row) = state.cart.iter_mut().find(|l| l.id == line) else {
            return Err(GatewayError::NotFound(format!("cart line not found: {line}")));
        };
        row.quantity = quantity;
        row.updated_at = Utc::now();
        let row = row.clone();
        Ok(Self::resolve_product(&state, &row))
    }

    async fn delete_cart_line(&self, line: CartLineId) -> Result<(), GatewayError> {
        // Idempotent: deleting a missing row is a no-op
        self.lock()?.cart.retain(|l| l.id != line);
        Ok(())
    }

    async fn clear_cart(&self, user: UserId) -> Result<(), GatewayError> {
        self.lock()?.cart.retain(|l| l.user_id != user);
        Ok(())
    }

    // =========================================================================
    // Addresses
    // =========================================================================

    async fn addresses(&self, user: UserId) -> Result<Vec<Address>, GatewayError> {
        let mut addresses: Vec<Address> = self
            .lock()?
            .addresses
            .iter()
            .filter(|a| a.user_id == user)
            .cloned()
            .collect();
        addresses.sort_by_key(|a| !a.is_default);
        Ok(addresses)
    }

    async fn insert_address(
        &self,
        user: UserId,
        address: NewAddress,
        is_default: bool,
    ) -> Result<Address, GatewayError> {
        let row = Address {
            id: AddressId::generate(),
            user_id: user,
            full_name: address.full_name,
            address_line1: address.address_line1,
            address_line2: address.address_line2,
            city: address.city,
            state: address.state,
            postal_code: address.postal_code,
            country: address.country,
            phone: address.phone,
            is_default,
            created_at: Utc::now(),
        };
        self.lock()?.addresses.push(row.clone());
        Ok(row)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    async fn insert_order(&self, order: NewOrder) -> Result<Order, GatewayError> {
        let mut state = self.lock()?;
        if state.fail_insert_order {
            state.fail_insert_order = false;
            return Err(GatewayError::Api {
                status: 500,
                message: "order insert failed".to_owned(),
            });
        }
        let now = Utc::now();
        let row = Order {
            id: OrderId::generate(),
            user_id: order.user_id,
            address_id: order.address_id,
            total_amount: order.total_amount,
            status: order.status,
            payment_method: order.payment_method,
            created_at: now,
            updated_at: now,
        };
        state.orders.push(row.clone());
        Ok(row)
    }

    async fn insert_order_lines(&self, lines: Vec<NewOrderLine>) -> Result<(), GatewayError> {
        let mut state = self.lock()?;
        if state.fail_insert_order_lines {
            state.fail_insert_order_lines = false;
            return Err(GatewayError::Api {
                status: 500,
                message: "order line insert failed".to_owned(),
            });
        }
        let now = Utc::now();
        for line in lines {
            state.order_lines.push(OrderLine {
                id: OrderLineId::generate(),
                order_id: line.order_id,
                product_id: line.product_id,
                quantity: line.quantity,
                price: line.price,
                created_at: now,
                product: None,
            });
        }
        Ok(())
    }

    async fn orders(&self, user: UserId) -> Result<Vec<Order>, GatewayError> {
        let mut orders: Vec<Order> = self
            .lock()?
            .orders
            .iter()
            .filter(|o| o.user_id == user)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn order_lines(&self, order: OrderId) -> Result<Vec<OrderLine>, GatewayError> {
        let state = self.lock()?;
        Ok(state
            .order_lines
            .iter()
            .filter(|l| l.order_id == order)
            .map(|l| {
                let mut line = l.clone();
                line.product = state
                    .products
                    .iter()
                    .find(|p| p.id == line.product_id)
                    .cloned();
                line
            })
            .collect())
    }
}
