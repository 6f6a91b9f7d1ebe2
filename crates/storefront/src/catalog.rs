//! Product catalog queries.
//!
//! Every call is explicit: the caller builds a [`ProductQuery`] and asks for
//! results. Nothing here re-fetches when a parameter changes; deciding when
//! to query again is the caller's job.

use std::sync::Arc;

use tracing::instrument;

use quince_core::ProductId;

use crate::error::StoreError;
use crate::gateway::{Gateway, GatewayError};
use crate::models::{Category, Product, ProductQuery, Review};

/// Read-only catalog access over a gateway.
pub struct CatalogService<G> {
    gateway: Arc<G>,
}

impl<G: Gateway> CatalogService<G> {
    #[must_use]
    pub const fn new(gateway: Arc<G>) -> Self {
        Self { gateway }
    }

    /// Products matching the query.
    ///
    /// Search, category, and sort are pushed down to the gateway; the price
    /// range and minimum rating are narrowing filters applied here, on the
    /// returned page.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Gateway` when the gateway query fails.
    #[instrument(skip(self, query), fields(search = ?query.search, category = ?query.category))]
    pub async fn search(&self, query: &ProductQuery) -> Result<Vec<Product>, StoreError> {
        let mut products = self.gateway.products(query).await?;

        if let Some((min, max)) = query.price_range {
            products.retain(|p| p.price >= min && p.price <= max);
        }
        if let Some(min_rating) = query.min_rating {
            products.retain(|p| p.rating >= min_rating);
        }
        Ok(products)
    }

    /// A single product, or `StoreError::NotFound` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` or `StoreError::Gateway`.
    #[instrument(skip(self), fields(product_id = %id))]
    pub async fn product(&self, id: ProductId) -> Result<Product, StoreError> {
        match self.gateway.product(id).await {
            Ok(product) => Ok(product),
            Err(GatewayError::NotFound(_)) => {
                Err(StoreError::NotFound(format!("product {id}")))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// All categories, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Gateway` when the gateway query fails.
    pub async fn categories(&self) -> Result<Vec<Category>, StoreError> {
        Ok(self.gateway.categories().await?)
    }

    /// Reviews for a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Gateway` when the gateway query fails.
    #[instrument(skip(self), fields(product_id = %product))]
    pub async fn reviews(&self, product: ProductId) -> Result<Vec<Review>, StoreError> {
        Ok(self.gateway.reviews(product).await?)
    }
}
