//! # Payment Gateway Boundary
//!
//! Checkout-session creation and the QR rendering of the checkout URL.
//!
//! ## Boundary Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Payment Gateway Boundary                            │
//! │                                                                         │
//! │  PaymentProcessor ──► create_checkout(order, description, amount)      │
//! │                            │                                            │
//! │                            ▼                                            │
//! │  CheckoutSession { session_id, url, qr_image }                         │
//! │                            │                                            │
//! │            customer scans the QR / opens the URL and pays              │
//! │                            │                                            │
//! │                            ▼                                            │
//! │  gateway webhook: completed(order, method, amount, url)                │
//! │                   expired(order)                                       │
//! │  (consumed by PaymentProcessor; signature checking belongs to the      │
//! │   HTTP transport, the processor receives authenticated events)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use chrono::Utc;
use qrcode::render::svg;
use qrcode::QrCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{DispatchError, DispatchResult};

// =============================================================================
// Boundary Types
// =============================================================================

/// A created checkout session.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    /// Provider's session id (kept for audit observations).
    pub session_id: String,
    /// Hosted checkout URL the customer pays at.
    pub url: String,
    /// The same URL rendered as a QR data URL for driver screens.
    pub qr_image: String,
}

/// Checkout-session seam.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a checkout session for the given amount (in cents).
    async fn create_checkout(
        &self,
        order_id: &str,
        description: &str,
        amount_cents: i64,
    ) -> DispatchResult<CheckoutSession>;
}

// =============================================================================
// QR Rendering
// =============================================================================

/// Renders a URL as an SVG QR code wrapped in a data URL.
///
/// SVG keeps the dependency surface small (no raster image stack) and
/// scales cleanly on driver phones.
pub fn qr_data_url(url: &str) -> DispatchResult<String> {
    let code = QrCode::new(url.as_bytes())
        .map_err(|e| DispatchError::PaymentProvider(format!("QR encoding failed: {e}")))?;

    let svg_xml = code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();

    Ok(format!(
        "data:image/svg+xml;base64,{}",
        BASE64_STANDARD.encode(svg_xml)
    ))
}

// =============================================================================
// Stripe Checkout Client
// =============================================================================

const CHECKOUT_SESSIONS_URL: &str = "https://api.stripe.com/v1/checkout/sessions";

/// Checkout sessions expire an hour after creation.
const SESSION_TTL_SECS: i64 = 3600;

/// Stripe-backed checkout client.
#[derive(Debug, Clone)]
pub struct StripeCheckout {
    http: reqwest::Client,
    secret_key: String,
    currency: String,
    success_url: String,
    cancel_url: String,
}

#[derive(Debug, Deserialize)]
struct CheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

impl StripeCheckout {
    /// Creates a checkout client.
    pub fn new(
        secret_key: impl Into<String>,
        currency: impl Into<String>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
        timeout: Duration,
    ) -> DispatchResult<Self> {
        let secret_key = secret_key.into();
        if secret_key.trim().is_empty() {
            return Err(DispatchError::Configuration(
                "gateway secret key is empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DispatchError::Configuration(format!("HTTP client: {e}")))?;

        Ok(StripeCheckout {
            http,
            secret_key,
            currency: currency.into(),
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeCheckout {
    async fn create_checkout(
        &self,
        order_id: &str,
        description: &str,
        amount_cents: i64,
    ) -> DispatchResult<CheckoutSession> {
        debug!(order_id, amount_cents, "Creating checkout session");

        let expires_at = (Utc::now().timestamp() + SESSION_TTL_SECS).to_string();
        let amount = amount_cents.to_string();
        let quantity = "1".to_string();

        let form: Vec<(String, String)> = vec![
            ("mode".to_string(), "payment".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                self.currency.clone(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                description.to_string(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                amount.clone(),
            ),
            ("line_items[0][quantity]".to_string(), quantity),
            ("metadata[order_id]".to_string(), order_id.to_string()),
            ("metadata[amount_cents]".to_string(), amount),
            (
                "success_url".to_string(),
                format!("{}?order={}&status=success", self.success_url, order_id),
            ),
            (
                "cancel_url".to_string(),
                format!("{}?order={}&status=cancelled", self.cancel_url, order_id),
            ),
            ("expires_at".to_string(), expires_at),
        ];

        let response = self
            .http
            .post(CHECKOUT_SESSIONS_URL)
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await
            .map_err(|e| DispatchError::PaymentProvider(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(DispatchError::PaymentProvider(format!(
                "checkout session failed ({status}): {detail}"
            )));
        }

        let session: CheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::PaymentProvider(format!("invalid response: {e}")))?;

        let url = session.url.ok_or_else(|| {
            DispatchError::PaymentProvider("response missing checkout URL".to_string())
        })?;

        info!(order_id, session_id = %session.id, "Checkout session created");

        let qr_image = qr_data_url(&url)?;
        Ok(CheckoutSession {
            session_id: session.id,
            url,
            qr_image,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
