//! Payment Creation Service client.
//!
//! Payments are created by `POST {base_url}{create_endpoint}` with a JSON
//! body `{amount, description, metadata?}`. The response is the created
//! [`Payment`]. On a non-success status the server's `message` field is
//! surfaced, falling back to a generic message.

use std::future::Future;

use reqwest::Client;
use serde::Deserialize;
use tracing::{info, instrument, warn};
use url::Url;

use crate::{
    config::SyncConfig,
    error::{Result, SyncError},
    payment::{CreatePaymentRequest, Payment},
    transport::http::build_client,
};

/// Message used when the service gives no reason for a rejection.
pub const DEFAULT_CREATION_ERROR: &str = "Failed to create payment";

/// Creates payments.
///
/// Implemented by [`HttpPaymentCreator`]; tests and embedders can supply
/// their own.
pub trait PaymentCreationService: Send + Sync {
    /// Creates a payment.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::CreationFailed`] if the service rejects the request
    /// and [`SyncError::HttpError`] if it cannot be reached.
    fn create_payment(
        &self,
        request: &CreatePaymentRequest,
    ) -> impl Future<Output = Result<Payment>> + Send;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// HTTP implementation of [`PaymentCreationService`].
#[derive(Debug, Clone)]
pub struct HttpPaymentCreator {
    client: Client,
    endpoint: Url,
}

impl HttpPaymentCreator {
    /// Creates a client for the configured creation endpoint.
    ///
    /// # Errors
    ///
    /// Returns error if the endpoint cannot be resolved or the HTTP client
    /// cannot be built.
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let endpoint = config.resolve(&config.create_endpoint)?;
        Ok(Self { client: build_client(&config.http)?, endpoint })
    }

    /// Endpoint payments are posted to.
    #[must_use]
    pub const fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

impl PaymentCreationService for HttpPaymentCreator {
    #[instrument(skip(self, request), fields(endpoint = %self.endpoint, amount = request.amount))]
    async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<Payment> {
        if request.amount == 0 {
            return Err(SyncError::CreationFailed("amount must be positive".to_owned()));
        }

        let response = self.client.post(self.endpoint.clone()).json(request).send().await?;
        let status = response.status();
        let body = response.bytes().await?;

        if !status.is_success() {
            let message = serde_json::from_slice::<ErrorBody>(&body)
                .ok()
                .and_then(|b| b.message)
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_CREATION_ERROR.to_owned());
            warn!(status = status.as_u16(), %message, "Payment creation rejected");
            return Err(SyncError::CreationFailed(message));
        }

        let payment: Payment = serde_json::from_slice(&body).map_err(|e| {
            SyncError::CreationFailed(format!("invalid payment in creation response: {e}"))
        })?;
        info!(payment_id = %payment.id, "Payment created");
        Ok(payment)
    }
}
