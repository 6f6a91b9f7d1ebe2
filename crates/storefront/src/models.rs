//! Domain row types exchanged with the remote data gateway.
//!
//! Field names match the gateway's column names so the types serialize
//! directly to and from gateway rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quince_core::{
    AddressId, CartLineId, CategoryId, Email, Money, OrderId, OrderLineId, OrderStatus,
    PaymentMethod, ProductId, ReviewId, UserId,
};

/// A catalog product. Read-only from the storefront's perspective: stock
/// decrement on purchase is owned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub category_id: CategoryId,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub original_price: Option<Money>,
    pub image_url: String,
    #[serde(default)]
    pub images: Vec<String>,
    pub stock: u32,
    pub rating: f64,
    pub review_count: u32,
    pub brand: String,
    #[serde(default)]
    pub features: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// A product category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// A customer review on a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub order_id: Option<OrderId>,
    pub rating: u8,
    pub title: String,
    pub comment: String,
    pub verified_purchase: bool,
    pub helpful_count: u32,
    pub created_at: DateTime<Utc>,
}

/// One product-and-quantity entry in a user's active cart.
///
/// At most one line exists per (user, product) pair; quantity is always in
/// `[1, product.stock]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartLine {
    pub id: CartLineId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Resolved product reference; `None` when the join failed. An
    /// unresolved line contributes zero to pricing.
    #[serde(default)]
    pub product: Option<Product>,
}

/// A saved shipping address. Immutable once created; at most one per user is
/// flagged default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Address {
    pub id: AddressId,
    pub user_id: UserId,
    pub full_name: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating an [`Address`] during checkout or account management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAddress {
    pub full_name: String,
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub country: String,
    pub phone: String,
}

impl Default for NewAddress {
    fn default() -> Self {
        Self {
            full_name: String::new(),
            address_line1: String::new(),
            address_line2: String::new(),
            city: String::new(),
            state: String::new(),
            postal_code: String::new(),
            country: "United States".to_owned(),
            phone: String::new(),
        }
    }
}

/// A checkout transaction snapshot. Created exactly once per successful
/// checkout; status transitions afterwards are owned by fulfillment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub address_id: AddressId,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for creating an [`Order`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub user_id: UserId,
    pub address_id: AddressId,
    pub total_amount: Money,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
}

/// Immutable priced snapshot of a cart line at checkout time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLine {
    pub id: OrderLineId,
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    /// Unit price at time of purchase.
    pub price: Money,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub product: Option<Product>,
}

/// Input for creating an [`OrderLine`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub order_id: OrderId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub price: Money,
}

/// An authenticated gateway session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: Email,
}

/// Sort order for catalog queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductSort {
    /// Newest first.
    #[default]
    Featured,
    PriceAsc,
    PriceDesc,
    Rating,
}

/// Explicit query parameters for a catalog search.
///
/// Callers build one of these and ask the catalog for results; nothing
/// re-fetches implicitly when a field changes.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    /// Case-insensitive substring match on the product name.
    pub search: Option<String>,
    /// Category slug; `None` means all categories.
    pub category: Option<String>,
    pub sort: ProductSort,
    /// Inclusive price bounds, applied after the gateway query.
    pub price_range: Option<(Money, Money)>,
    /// Minimum rating, applied after the gateway query.
    pub min_rating: Option<f64>,
}
