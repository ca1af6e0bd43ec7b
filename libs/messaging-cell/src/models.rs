use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message published to the notification queue and turned into an email by
/// the notification service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationMessage {
    pub email: String,
    pub subject: String,
    pub message: String,
}

impl NotificationMessage {
    pub fn new(email: impl Into<String>, subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            subject: subject.into(),
            message: message.into(),
        }
    }
}

/// Body posted to the payment service to open a charge for an appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRequest {
    pub appointment_id: Uuid,
    pub total: f64,
    pub payment_method: String,
    pub customer_email: String,
}
