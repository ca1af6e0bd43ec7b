use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info};

use crate::{MessagingError, PaymentRequest};

/// Opens a payment for a freshly booked appointment.
#[async_trait]
pub trait PaymentInitiator: Send + Sync {
    async fn request_payment(&self, request: &PaymentRequest) -> Result<(), MessagingError>;
}

/// Posts payment requests to the payment service over HTTP.
pub struct HttpPaymentInitiator {
    client: Client,
    endpoint: String,
}

impl HttpPaymentInitiator {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
        }
    }

    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, MessagingError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl PaymentInitiator for HttpPaymentInitiator {
    async fn request_payment(&self, request: &PaymentRequest) -> Result<(), MessagingError> {
        debug!(
            "Requesting payment for appointment {} at {}",
            request.appointment_id, self.endpoint
        );

        let response = self.client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MessagingError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        info!("Payment requested for appointment {}", request.appointment_id);
        Ok(())
    }
}

/// Logs payment requests instead of sending them.
#[derive(Debug, Clone, Default)]
pub struct ConsolePaymentInitiator;

#[async_trait]
impl PaymentInitiator for ConsolePaymentInitiator {
    async fn request_payment(&self, request: &PaymentRequest) -> Result<(), MessagingError> {
        info!(
            appointment_id = %request.appointment_id,
            total = request.total,
            method = %request.payment_method,
            "Payment request (console) for {}", request.customer_email
        );
        Ok(())
    }
}
