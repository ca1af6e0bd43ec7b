//! Recording channel doubles for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::{MessagingError, NotificationChannel, NotificationMessage, PaymentInitiator, PaymentRequest};

/// Records every notification it is asked to send. When `failing` is set,
/// each attempt is recorded and then rejected.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotificationChannel {
    sent: Arc<Mutex<Vec<NotificationMessage>>>,
    attempts: Arc<Mutex<usize>>,
    failing: bool,
}

impl RecordingNotificationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<NotificationMessage> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.lock().map(|n| *n).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationChannel for RecordingNotificationChannel {
    async fn send(&self, message: &NotificationMessage) -> Result<(), MessagingError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            *attempts += 1;
        }
        if self.failing {
            return Err(MessagingError::Unavailable("broker down".to_string()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(message.clone());
        }
        Ok(())
    }
}

/// Records every payment request it receives.
#[derive(Debug, Clone, Default)]
pub struct RecordingPaymentInitiator {
    requests: Arc<Mutex<Vec<PaymentRequest>>>,
    failing: bool,
}

impl RecordingPaymentInitiator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn requests(&self) -> Vec<PaymentRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl PaymentInitiator for RecordingPaymentInitiator {
    async fn request_payment(&self, request: &PaymentRequest) -> Result<(), MessagingError> {
        if self.failing {
            return Err(MessagingError::Unavailable("payment service down".to_string()));
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        Ok(())
    }
}
