//! REST implementation of the remote data gateway.
//!
//! Talks to the hosted row API (`/rest/v1/<table>` with `eq.`/`ilike.`
//! filters, `order` and `limit` params) and its auth endpoints
//! (`/auth/v1/token`, `/auth/v1/logout`). Catalog reads are cached with
//! `moka` (5-minute TTL); cart, address, and order rows are never cached.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use moka::future::Cache;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use quince_core::{CartLineId, Email, OrderId, ProductId, UserId};

use crate::config::GatewayConfig;
use crate::models::{
    Address, CartLine, Category, NewAddress, NewOrder, NewOrderLine, Order, OrderLine, Product,
    ProductQuery, ProductSort, Review, Session,
};

use super::{Gateway, GatewayError};

/// Cache TTL for catalog reads.
const CATALOG_CACHE_TTL: Duration = Duration::from_secs(300);

/// Cached catalog values.
#[derive(Clone)]
enum CacheValue {
    Product(Box<Product>),
    Products(Vec<Product>),
    Categories(Vec<Category>),
}

/// Access token and identity for the signed-in user.
#[derive(Clone)]
struct SessionState {
    access_token: String,
    session: Session,
}

/// Client for the remote data gateway's REST API.
///
/// Cheaply cloneable via `Arc`.
#[derive(Clone)]
pub struct RestGateway {
    inner: Arc<RestGatewayInner>,
}

struct RestGatewayInner {
    http: reqwest::Client,
    rest_endpoint: String,
    auth_endpoint: String,
    api_key: String,
    cache: Cache<String, CacheValue>,
    session: Mutex<Option<SessionState>>,
}

/// Token response from the auth endpoint.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    user: AuthUser,
}

#[derive(Deserialize)]
struct AuthUser {
    id: UserId,
    email: String,
}

impl RestGateway {
    /// Create a new gateway client.
    #[must_use]
    pub fn new(config: &GatewayConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(CATALOG_CACHE_TTL)
            .build();

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            inner: Arc::new(RestGatewayInner {
                http,
                rest_endpoint: format!("{}/rest/v1", config.base_url),
                auth_endpoint: format!("{}/auth/v1", config.base_url),
                api_key: config.api_key.expose_secret().to_string(),
                cache,
                session: Mutex::new(None),
            }),
        }
    }

    /// Invalidate all cached catalog data.
    pub async fn invalidate_catalog_cache(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }

    // =========================================================================
    // Request plumbing
    // =========================================================================

    /// Bearer token for row requests: the session token when signed in,
    /// otherwise the API key itself.
    fn bearer(&self) -> String {
        self.inner
            .session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.access_token.clone()))
            .unwrap_or_else(|| self.inner.api_key.clone())
    }

    fn set_session(&self, state: Option<SessionState>) {
        if let Ok(mut guard) = self.inner.session.lock() {
            *guard = state;
        }
    }

    /// Map a non-success response to a `GatewayError`.
    async fn error_for(response: reqwest::Response) -> GatewayError {
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return GatewayError::RateLimited(retry_after);
        }

        let body = response.text().await.unwrap_or_default();
        let message: String = body.chars().take(500).collect();

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return GatewayError::Auth(message);
        }

        tracing::error!(
            status = %status,
            body = %message,
            "gateway returned non-success status"
        );
        GatewayError::Api {
            status: status.as_u16(),
            message,
        }
    }

    /// GET rows from a table.
    async fn get_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
    ) -> Result<Vec<T>, GatewayError> {
        let response = self
            .inner
            .http
            .get(format!("{}/{table}", self.inner.rest_endpoint))
            .query(params)
            .header("apikey", &self.inner.api_key)
            .bearer_auth(self.bearer())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// POST rows into a table, returning the inserted representation.
    async fn insert_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        body: &serde_json::Value,
    ) -> Result<Vec<T>, GatewayError> {
        let response = self
            .inner
            .http
            .post(format!("{}/{table}", self.inner.rest_endpoint))
            .header("apikey", &self.inner.api_key)
            .header("Prefer", "return=representation")
            .bearer_auth(self.bearer())
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// POST one row and return it.
    async fn insert_row<T: DeserializeOwned>(
        &self,
        table: &str,
        body: &serde_json::Value,
    ) -> Result<T, GatewayError> {
        self.insert_rows::<T>(table, body)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(format!("insert into {table} returned no row")))
    }

    /// PATCH rows matching the filter params.
    async fn patch_rows<T: DeserializeOwned>(
        &self,
        table: &str,
        params: &[(&str, String)],
        body: &serde_json::Value,
    ) -> Result<Vec<T>, GatewayError> {
        let response = self
            .inner
            .http
            .patch(format!("{}/{table}", self.inner.rest_endpoint))
            .query(params)
            .header("apikey", &self.inner.api_key)
            .header("Prefer", "return=representation")
            .bearer_auth(self.bearer())
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }

    /// DELETE rows matching the filter params.
    async fn delete_rows(&self, table: &str, params: &[(&str, String)]) -> Result<(), GatewayError> {
        let response = self
            .inner
            .http
            .delete(format!("{}/{table}", self.inner.rest_endpoint))
            .query(params)
            .header("apikey", &self.inner.api_key)
            .bearer_auth(self.bearer())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        Ok(())
    }

    /// Exchange credentials for a session at the auth endpoint.
    async fn token_request(
        &self,
        path: &str,
        email: &Email,
        password: &str,
    ) -> Result<Session, GatewayError> {
        let response = self
            .inner
            .http
            .post(format!("{}{path}", self.inner.auth_endpoint))
            .header("apikey", &self.inner.api_key)
            .json(&json!({ "email": email.as_str(), "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }

        let token: TokenResponse = {
            let text = response.text().await?;
            serde_json::from_str(&text)?
        };

        let email = Email::parse(&token.user.email)
            .map_err(|e| GatewayError::Auth(format!("gateway returned invalid email: {e}")))?;
        let session = Session {
            user_id: token.user.id,
            email,
        };
        self.set_session(Some(SessionState {
            access_token: token.access_token,
            session: session.clone(),
        }));

        Ok(session)
    }
}

/// Build the `order` param for a catalog sort.
const fn sort_param(sort: ProductSort) -> &'static str {
    match sort {
        ProductSort::Featured => "created_at.desc",
        ProductSort::PriceAsc => "price.asc",
        ProductSort::PriceDesc => "price.desc",
        ProductSort::Rating => "rating.desc",
    }
}

impl Gateway for RestGateway {
    // =========================================================================
    // Session / identity
    // =========================================================================

    #[instrument(skip(self, password))]
    async fn sign_up(&self, email: &Email, password: &str) -> Result<Session, GatewayError> {
        self.token_request("/signup", email, password).await
    }

    #[instrument(skip(self, password))]
    async fn sign_in(&self, email: &Email, password: &str) -> Result<Session, GatewayError> {
        self.token_request("/token?grant_type=password", email, password)
            .await
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), GatewayError> {
        let Some(state) = self
            .inner
            .session
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
        else {
            return Ok(());
        };

        let response = self
            .inner
            .http
            .post(format!("{}/logout", self.inner.auth_endpoint))
            .header("apikey", &self.inner.api_key)
            .bearer_auth(&state.access_token)
            .send()
            .await?;

        // Drop the local session even if the remote revoke fails
        self.set_session(None);

        if !response.status().is_success() {
            return Err(Self::error_for(response).await);
        }
        Ok(())
    }

    async fn current_session(&self) -> Result<Option<Session>, GatewayError> {
        Ok(self
            .inner
            .session
            .lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|s| s.session.clone())))
    }

    // =========================================================================
    // Catalog
    // =========================================================================

    #[instrument(skip(self))]
    async fn products(&self, query: &ProductQuery) -> Result<Vec<Product>, GatewayError> {
        let cache_key = format!(
            "products:{}:{:?}",
            query.category.as_deref().unwrap_or(""),
            query.sort
        );

        // Cache only browse queries, never searches
        if query.search.is_none()
            && let Some(CacheValue::Products(products)) = self.inner.cache.get(&cache_key).await
        {
            debug!("cache hit for products");
            return Ok(products);
        }

        let mut params: Vec<(&str, String)> = vec![
            ("select", "*".to_owned()),
            ("order", sort_param(query.sort).to_owned()),
        ];

        if let Some(slug) = query.category.as_deref() {
            let category = self
                .categories()
                .await?
                .into_iter()
                .find(|c| c.slug == slug)
                .ok_or_else(|| GatewayError::NotFound(format!("category not found: {slug}")))?;
            params.push(("category_id", format!("eq.{}", category.id)));
        }

        if let Some(term) = query.search.as_deref() {
            params.push(("name", format!("ilike.*{term}*")));
        }

        let products: Vec<Product> = self.get_rows("products", &params).await?;

        if query.search.is_none() {
            self.inner
                .cache
                .insert(cache_key, CacheValue::Products(products.clone()))
                .await;
        }

        Ok(products)
    }

    #[instrument(skip(self), fields(product_id = %id))]
    async fn product(&self, id: ProductId) -> Result<Product, GatewayError> {
        let cache_key = format!("product:{id}");

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("cache hit for product");
            return Ok(*product);
        }

        let params = [
            ("select", "*".to_owned()),
            ("id", format!("eq.{id}")),
            ("limit", "1".to_owned()),
        ];
        let product = self
            .get_rows::<Product>("products", &params)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(format!("product not found: {id}")))?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    #[instrument(skip(self))]
    async fn categories(&self) -> Result<Vec<Category>, GatewayError> {
        let cache_key = "categories".to_owned();

        if let Some(CacheValue::Categories(categories)) = self.inner.cache.get(&cache_key).await {
            debug!("cache hit for categories");
            return Ok(categories);
        }

        let params = [("select", "*".to_owned()), ("order", "name.asc".to_owned())];
        let categories: Vec<Category> = self.get_rows("categories", &params).await?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Categories(categories.clone()))
            .await;

        Ok(categories)
    }

    #[instrument(skip(self), fields(product_id = %product_id))]
    async fn reviews(&self, product_id: ProductId) -> Result<Vec<Review>, GatewayError> {
        let params = [
            ("select", "*".to_owned()),
            ("product_id", format!("eq.{product_id}")),
            ("order", "created_at.desc".to_owned()),
        ];
        self.get_rows("reviews", &params).await
    }

    // =========================================================================
    // Cart rows (never cached - mutable state)
    // =========================================================================

    #[instrument(skip(self), fields(user_id = %user))]
    async fn cart_lines(&self, user: UserId) -> Result<Vec<CartLine>, GatewayError> {
        let params = [
            ("select", "*,product:products(*)".to_owned()),
            ("user_id", format!("eq.{user}")),
            ("order", "created_at.asc".to_owned()),
        ];
        self.get_rows("cart_items", &params).await
    }

    #[instrument(skip(self), fields(user_id = %user, product_id = %product))]
    async fn insert_cart_line(
        &self,
        user: UserId,
        product: ProductId,
        quantity: u32,
    ) -> Result<CartLine, GatewayError> {
        self.insert_row(
            "cart_items",
            &json!({
                "user_id": user,
                "product_id": product,
                "quantity": quantity,
            }),
        )
        .await
    }

    #[instrument(skip(self), fields(line_id = %line))]
    async fn update_cart_line(
        &self,
        line: CartLineId,
        quantity: u32,
    ) -> Result<CartLine, GatewayError> {
        let params = [("id", format!("eq.{line}"))];
        self.patch_rows::<CartLine>("cart_items", &params, &json!({ "quantity": quantity }))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound(format!("cart line not found: {line}")))
    }

    #[instrument(skip(self), fields(line_id = %line))]
    async fn delete_cart_line(&self, line: CartLineId) -> Result<(), GatewayError> {
        let params = [("id", format!("eq.{line}"))];
        self.delete_rows("cart_items", &params).await
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn clear_cart(&self, user: UserId) -> Result<(), GatewayError> {
        let params = [("user_id", format!("eq.{user}"))];
        self.delete_rows("cart_items", &params).await
    }

    // =========================================================================
    // Addresses
    // =========================================================================

    #[instrument(skip(self), fields(user_id = %user))]
    async fn addresses(&self, user: UserId) -> Result<Vec<Address>, GatewayError> {
        let params = [
            ("select", "*".to_owned()),
            ("user_id", format!("eq.{user}")),
            ("order", "is_default.desc".to_owned()),
        ];
        self.get_rows("user_addresses", &params).await
    }

    #[instrument(skip(self, address), fields(user_id = %user))]
    async fn insert_address(
        &self,
        user: UserId,
        address: NewAddress,
        is_default: bool,
    ) -> Result<Address, GatewayError> {
        let mut body = serde_json::to_value(&address)?;
        if let Some(map) = body.as_object_mut() {
            map.insert("user_id".to_owned(), json!(user));
            map.insert("is_default".to_owned(), json!(is_default));
        }
        self.insert_row("user_addresses", &body).await
    }

    // =========================================================================
    // Orders
    // =========================================================================

    #[instrument(skip(self, order))]
    async fn insert_order(&self, order: NewOrder) -> Result<Order, GatewayError> {
        self.insert_row("orders", &serde_json::to_value(&order)?)
            .await
    }

    #[instrument(skip(self, lines))]
    async fn insert_order_lines(&self, lines: Vec<NewOrderLine>) -> Result<(), GatewayError> {
        let _: Vec<OrderLine> = self
            .insert_rows("order_items", &serde_json::to_value(&lines)?)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn orders(&self, user: UserId) -> Result<Vec<Order>, GatewayError> {
        let params = [
            ("select", "*".to_owned()),
            ("user_id", format!("eq.{user}")),
            ("order", "created_at.desc".to_owned()),
        ];
        self.get_rows("orders", &params).await
    }

    #[instrument(skip(self), fields(order_id = %order))]
    async fn order_lines(&self, order: OrderId) -> Result<Vec<OrderLine>, GatewayError> {
        let params = [
            ("select", "*,product:products(*)".to_owned()),
            ("order_id", format!("eq.{order}")),
        ];
        self.get_rows("order_items", &params).await
    }
}
