//! Remote data gateway boundary.
//!
//! The gateway is the durable source of truth for every table the storefront
//! touches (products, categories, reviews, cart lines, addresses, orders) and
//! for session identity. The storefront never owns durable state; it holds an
//! explicit [`Gateway`] capability and reconciles its in-memory view with the
//! gateway after every mutation.
//!
//! Two implementations ship with the crate:
//!
//! - [`RestGateway`] - reqwest client against the hosted row API
//! - [`MemoryGateway`] - in-process implementation for tests and demos
//!
//! All operations are plain request/response with per-call success/failure
//! reporting; there is no streaming and no retry layer.

pub mod memory;
pub mod rest;

pub use memory::MemoryGateway;
pub use rest::RestGateway;

use thiserror::Error;

use quince_core::{CartLineId, Email, OrderId, ProductId, UserId};

use crate::models::{
    Address, CartLine, Category, NewAddress, NewOrder, NewOrderLine, Order, OrderLine, Product,
    ProductQuery, Review, Session,
};

/// Errors that can occur when talking to the remote data gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed (network, DNS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The gateway answered with a non-success status.
    #[error("gateway returned {status}: {message}")]
    Api { status: u16, message: String },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Authentication or authorization failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Rate limited by the gateway.
    #[error("rate limited, retry after {0} seconds")]
    RateLimited(u64),
}

/// Capability trait for the remote data gateway.
///
/// Services are generic over `G: Gateway` so they can run against the hosted
/// gateway in production and [`MemoryGateway`] in tests. Every method is one
/// request/response round trip.
#[allow(async_fn_in_trait)]
pub trait Gateway: Send + Sync {
    // =========================================================================
    // Session / identity
    // =========================================================================

    /// Register a new account and open a session for it.
    async fn sign_up(&self, email: &Email, password: &str) -> Result<Session, GatewayError>;

    /// Open a session with existing credentials.
    async fn sign_in(&self, email: &Email, password: &str) -> Result<Session, GatewayError>;

    /// Close the current session. No-op when not signed in.
    async fn sign_out(&self) -> Result<(), GatewayError>;

    /// The currently authenticated session, if any.
    async fn current_session(&self) -> Result<Option<Session>, GatewayError>;

    // =========================================================================
    // Catalog (read-only)
    // =========================================================================

    /// Products matching the query's search, category, and sort. Price-range
    /// and rating bounds are applied by the catalog service, not here.
    async fn products(&self, query: &ProductQuery) -> Result<Vec<Product>, GatewayError>;

    /// A single product by id.
    async fn product(&self, id: ProductId) -> Result<Product, GatewayError>;

    /// All categories, ordered by name.
    async fn categories(&self) -> Result<Vec<Category>, GatewayError>;

    /// Reviews for a product, newest first.
    async fn reviews(&self, product_id: ProductId) -> Result<Vec<Review>, GatewayError>;

    // =========================================================================
    // Cart rows
    // =========================================================================

    /// All cart lines for a user, with products resolved, oldest first.
    async fn cart_lines(&self, user: UserId) -> Result<Vec<CartLine>, GatewayError>;

    /// Insert a new cart line row.
    async fn insert_cart_line(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<CartLine, GatewayError>;

    /// Set the quantity on an existing cart line row.
    async fn update_cart_line(
        &self,
        line: CartLineId,
        quantity: u32,
    ) -> Result<CartLine, GatewayError>;

    /// Delete a cart line row. Deleting a missing row is a no-op.
    async fn delete_cart_line(&self, line: CartLineId) -> Result<(), GatewayError>;

    /// Delete all cart line rows for a user.
    async fn clear_cart(&self, user: UserId) -> Result<(), GatewayError>;

    // =========================================================================
    // Addresses
    // =========================================================================

    /// All addresses for a user, default first.
    async fn addresses(&self, user: UserId) -> Result<Vec<Address>, GatewayError>;

    /// Insert a new address row.
    async fn insert_address(
        &self,
        user: UserId,
        address: NewAddress,
        is_default: bool,
    ) -> Result<Address, GatewayError>;

    // =========================================================================
    // Orders
    // =========================================================================

    /// Insert one order row.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, GatewayError>;

    /// Insert the line rows for an order.
    async fn insert_order_lines(&self, lines: Vec<NewOrderLine>) -> Result<(), GatewayError>;

    /// All orders for a user, newest first.
    async fn orders(&self, user: UserId) -> Result<Vec<Order>, GatewayError>;

    /// Line rows for an order, with products resolved.
    async fn order_lines(&self, order: OrderId) -> Result<Vec<OrderLine>, GatewayError>;
}
