// libs/appointment-cell/src/models.rs
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::store::StoreError;

/// Doctor identity, owned by the user service.
pub type DoctorId = i64;
/// Patient identity, owned by the user service.
pub type PatientId = i64;

// ==============================================================================
// CORE BOOKING MODELS
// ==============================================================================

/// One bookable time unit on a doctor's calendar. `(doctor_id, scheduled_at)`
/// is unique across all slots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: DoctorId,
    pub specialty: String,
    pub scheduled_at: NaiveDateTime,
    pub available: bool,
}

impl Slot {
    pub fn new(doctor_id: DoctorId, specialty: impl Into<String>, scheduled_at: NaiveDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            specialty: specialty.into(),
            scheduled_at,
            available: true,
        }
    }
}

/// A patient's claim on one slot. `slot_id` and `scheduled_at` never change
/// after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: PatientId,
    pub patient_email: String,
    pub doctor_id: DoctorId,
    pub doctor_email: Option<String>,
    pub specialty: String,
    pub slot_id: Uuid,
    pub scheduled_at: NaiveDateTime,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn for_slot(request: &BookAppointmentRequest, slot: &Slot, status: AppointmentStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            patient_email: request.patient_email.clone(),
            doctor_id: request.doctor_id,
            doctor_email: request.doctor_email.clone().filter(|email| !email.trim().is_empty()),
            specialty: request.specialty.clone(),
            slot_id: slot.id,
            scheduled_at: slot.scheduled_at,
            status,
            created_at: now,
            updated_at: now,
        }
    }

    /// Active appointments hold their slot and count for overlap checks.
    pub fn is_active(&self) -> bool {
        !self.status.is_cancelled()
    }

    pub fn with_status(mut self, status: AppointmentStatus) -> Self {
        self.status = status;
        self.updated_at = Utc::now();
        self
    }
}

/// Appointment status. Known values get their own variant; anything else is
/// carried through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AppointmentStatus {
    PendingPayment,
    Scheduled,
    Confirmed,
    Completed,
    Cancelled,
    Other(String),
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AppointmentStatus::PendingPayment => "PENDING_PAYMENT",
            AppointmentStatus::Scheduled => "SCHEDULED",
            AppointmentStatus::Confirmed => "CONFIRMED",
            AppointmentStatus::Completed => "COMPLETED",
            AppointmentStatus::Cancelled => "CANCELLED",
            AppointmentStatus::Other(raw) => raw,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppointmentStatus::Cancelled)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

impl FromStr for AppointmentStatus {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        // Legacy names still sent by the payment service
        let status = match trimmed.to_ascii_uppercase().as_str() {
            "PENDING_PAYMENT" | "PENDENTE_VALIDACAO" => AppointmentStatus::PendingPayment,
            "SCHEDULED" | "AGENDADA" => AppointmentStatus::Scheduled,
            "CONFIRMED" | "CONFIRMADA" => AppointmentStatus::Confirmed,
            "COMPLETED" | "REALIZADA" => AppointmentStatus::Completed,
            "CANCELLED" | "CANCELED" | "CANCELADA" => AppointmentStatus::Cancelled,
            _ => AppointmentStatus::Other(trimmed.to_string()),
        };
        Ok(status)
    }
}

impl From<String> for AppointmentStatus {
    fn from(raw: String) -> Self {
        match raw.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

impl From<AppointmentStatus> for String {
    fn from(status: AppointmentStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub patient_id: PatientId,
    pub patient_email: String,
    pub doctor_id: DoctorId,
    pub doctor_email: Option<String>,
    pub specialty: String,
    pub scheduled_at: NaiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishScheduleRequest {
    pub doctor_id: DoctorId,
    pub specialty: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailableSlotsQuery {
    pub doctor_id: DoctorId,
    pub specialty: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateStatusQuery {
    pub status: AppointmentStatus,
}

// ==============================================================================
// POLICY
// ==============================================================================

/// Booking rules the workflow runs with.
#[derive(Debug, Clone)]
pub struct BookingPolicy {
    pub appointment_duration_minutes: i64,
    pub payment_required: bool,
    pub payment_amount: f64,
    pub payment_method: String,
    pub strict_status_transitions: bool,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl BookingPolicy {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            appointment_duration_minutes: config.appointment_duration_minutes,
            payment_required: config.payment_required,
            payment_amount: config.payment_amount,
            payment_method: config.payment_method.clone(),
            strict_status_transitions: config.strict_status_transitions,
        }
    }

    /// Status a new appointment starts in.
    pub fn initial_status(&self) -> AppointmentStatus {
        if self.payment_required {
            AppointmentStatus::PendingPayment
        } else {
            AppointmentStatus::Scheduled
        }
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found: {0}")]
    NotFound(Uuid),

    #[error("{0}")]
    Conflict(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Cannot transition appointment from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}
