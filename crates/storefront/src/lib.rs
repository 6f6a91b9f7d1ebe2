//! Quince Storefront - storefront core backed by a remote data gateway.
//!
//! This crate implements the in-process API of a storefront: product catalog
//! queries, the cart state store, the pricing calculator, the checkout flow,
//! order history, and session management. Persistence and identity are
//! delegated to a remote data gateway (see [`gateway::Gateway`]); this crate
//! owns the client-side state and invariants.
//!
//! # Architecture
//!
//! - Services are plain structs holding an explicit `Arc<G: Gateway>` - no
//!   ambient global state. Callers decide when to query and when to refresh.
//! - All gateway calls are awaited sequentially within one operation; there
//!   is no parallel execution of cart mutations.
//! - Cart mutations are two-phase: the durable write goes to the gateway,
//!   then the in-memory view is refreshed from the gateway (on success and
//!   on failure alike) so it never permanently diverges.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use quince_storefront::{CartStore, CheckoutFlow, gateway::RestGateway};
//!
//! let gateway = Arc::new(RestGateway::new(&config.gateway));
//! let mut cart = CartStore::new(Arc::clone(&gateway));
//! cart.attach_session(session.user_id).await?;
//! cart.add_line(&product, 2).await?;
//!
//! let mut flow = CheckoutFlow::begin(Arc::clone(&gateway), &cart).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod account;
pub mod auth;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod pricing;

pub use account::{AccountService, OrderSummary};
pub use auth::{AuthError, AuthService};
pub use cart::CartStore;
pub use catalog::CatalogService;
pub use checkout::{CheckoutFlow, CheckoutState, PaymentForm};
pub use error::StoreError;
pub use gateway::{Gateway, GatewayError};
pub use pricing::{CartTotals, price};
