//! Create-then-track flow.
//!
//! [`Checkout`] ties the creation service to the engine: the payment is
//! created, the consumer is told, and tracking starts. A creation failure is
//! surfaced through the observer and the engine never starts.

use std::sync::Arc;

use tracing::{error, instrument};

use crate::{
    config::SyncConfig,
    creation::{HttpPaymentCreator, PaymentCreationService},
    engine::SyncEngine,
    error::{PaymentError, Result, SyncError},
    observer::PaymentObserver,
    payment::CreatePaymentRequest,
    transport::select_transport,
};

/// Entry points for creating and tracking a payment.
#[derive(Debug, Clone, Copy)]
pub struct Checkout;

impl Checkout {
    /// Creates a payment over HTTP and starts tracking it.
    ///
    /// # Errors
    ///
    /// Returns error if the configuration cannot produce a creator or a
    /// transport, or if creation fails. Creation failures are also reported
    /// through [`PaymentObserver::on_payment_error`].
    pub async fn begin(
        request: &CreatePaymentRequest,
        config: &SyncConfig,
        observer: Arc<dyn PaymentObserver>,
    ) -> Result<SyncEngine> {
        let creator = HttpPaymentCreator::new(config)?;
        Self::begin_with(&creator, request, config, observer).await
    }

    /// Like [`begin`](Self::begin) with a custom creation service.
    ///
    /// The transport is built before the payment is created, so a
    /// misconfigured transport never leaves an untracked payment behind.
    ///
    /// # Errors
    ///
    /// See [`begin`](Self::begin).
    #[instrument(skip_all, fields(amount = request.amount))]
    pub async fn begin_with<S>(
        service: &S,
        request: &CreatePaymentRequest,
        config: &SyncConfig,
        observer: Arc<dyn PaymentObserver>,
    ) -> Result<SyncEngine>
    where
        S: PaymentCreationService,
    {
        let transport = select_transport(config)?;

        let payment = match service.create_payment(request).await {
            Ok(payment) => payment,
            Err(err) => {
                let message = match &err {
                    SyncError::CreationFailed(message) => message.clone(),
                    other => other.to_string(),
                };
                error!(%message, "Payment creation failed");
                observer.on_payment_error(&PaymentError::Creation { message });
                return Err(err);
            }
        };

        observer.on_payment_created(&payment);
        SyncEngine::with_transport(payment, transport, config.countdown_budget_secs, observer)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::payment::{Payment, PaymentStatus};

    struct StaticCreator(std::result::Result<Payment, String>);

    impl PaymentCreationService for StaticCreator {
        async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<Payment> {
            match &self.0 {
                Ok(payment) => Ok(Payment { amount: request.amount, ..payment.clone() }),
                Err(message) => Err(SyncError::CreationFailed(message.clone())),
            }
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl PaymentObserver for Recorder {
        fn on_payment_created(&self, payment: &Payment) {
            self.0.lock().unwrap().push(format!("created:{}", payment.id));
        }

        fn on_payment_error(&self, error: &PaymentError) {
            self.0.lock().unwrap().push(format!("error:{error}"));
        }
    }

    fn config() -> SyncConfig {
        SyncConfig::from_toml(r#"base_url = "https://shop.example.com""#).unwrap()
    }

    #[tokio::test]
    async fn test_begin_reports_created_and_starts_engine() {
        let creator = StaticCreator(Ok(Payment {
            id: "p1".to_owned(),
            amount: 0,
            description: "Coffee".to_owned(),
            invoice: "lnbc1...".to_owned(),
            status: PaymentStatus::Pending,
            metadata: None,
        }));
        let recorder = Arc::new(Recorder::default());

        let request = CreatePaymentRequest::new(1000, "Coffee");
        let mut engine = Checkout::begin_with(&creator, &request, &config(), recorder.clone())
            .await
            .unwrap();

        assert_eq!(engine.payment().id, "p1");
        assert_eq!(engine.payment().amount, 1000);
        assert_eq!(engine.state(), PaymentStatus::Pending);
        assert_eq!(*recorder.0.lock().unwrap(), vec!["created:p1"]);
        engine.stop();
    }

    #[tokio::test]
    async fn test_begin_reports_creation_failure() {
        let creator = StaticCreator(Err("Invalid amount".to_owned()));
        let recorder = Arc::new(Recorder::default());

        let request = CreatePaymentRequest::new(1000, "Coffee");
        let result = Checkout::begin_with(&creator, &request, &config(), recorder.clone()).await;

        assert!(matches!(result, Err(SyncError::CreationFailed(_))));
        assert_eq!(*recorder.0.lock().unwrap(), vec!["error:Invalid amount"]);
    }

    #[tokio::test]
    async fn test_begin_fails_fast_on_unusable_config() {
        let creator = StaticCreator(Err("unreachable".to_owned()));
        let recorder = Arc::new(Recorder::default());

        let request = CreatePaymentRequest::new(1000, "Coffee");
        let result =
            Checkout::begin_with(&creator, &request, &SyncConfig::default(), recorder.clone()).await;

        assert!(matches!(result, Err(SyncError::InvalidUrl(_))));
        assert!(recorder.0.lock().unwrap().is_empty());
    }
}
