// libs/appointment-cell/src/store/mod.rs
//! Persistence seams for slots and appointments.
//!
//! Reads go through [`SlotStore`] and [`AppointmentStore`]. Every mutation the
//! workflow performs is bundled into a [`UnitOfWork`] and handed to
//! [`BookingStore::commit`], which re-checks the unit's guards and applies all
//! writes or none of them.

use std::fmt;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Appointment, DoctorId, Slot};

pub mod memory;
pub mod supabase;

pub use memory::InMemoryBookingStore;
pub use supabase::SupabaseBookingStore;

#[async_trait]
pub trait SlotStore: Send + Sync {
    async fn find_by_doctor_and_time(
        &self,
        doctor_id: DoctorId,
        scheduled_at: NaiveDateTime,
    ) -> Result<Option<Slot>, StoreError>;

    async fn find_slot_by_id(&self, slot_id: Uuid) -> Result<Option<Slot>, StoreError>;

    /// Insert a new slot. Fails with [`StoreError::DuplicateSlot`] when the
    /// `(doctor_id, scheduled_at)` key is already taken.
    async fn save_slot(&self, slot: &Slot) -> Result<Slot, StoreError>;

    async fn find_available(
        &self,
        doctor_id: DoctorId,
        specialty: &str,
    ) -> Result<Vec<Slot>, StoreError>;
}

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn save_appointment(&self, appointment: &Appointment) -> Result<Appointment, StoreError>;

    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// True when a non-cancelled appointment of this doctor sits strictly
    /// between `start` and `end`.
    async fn exists_overlapping(
        &self,
        doctor_id: DoctorId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<bool, StoreError>;

    async fn find_active_by_slot(&self, slot_id: Uuid) -> Result<Vec<Appointment>, StoreError>;
}

#[async_trait]
pub trait BookingStore: SlotStore + AppointmentStore {
    /// Apply the unit atomically. A failing guard aborts the whole unit with
    /// [`StoreError::GuardRejected`] and nothing is written.
    async fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError>;
}

// ==============================================================================
// UNIT OF WORK
// ==============================================================================

/// Condition that must still hold when a unit of work is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Guard {
    /// No slot exists for the key, or the existing one is available.
    SlotFree {
        doctor_id: DoctorId,
        scheduled_at: NaiveDateTime,
    },
    /// No active appointment of the doctor lies strictly inside `(start, end)`.
    NoOverlap {
        doctor_id: DoctorId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    },
    /// The appointment exists and is not cancelled.
    StillActive { appointment_id: Uuid },
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::SlotFree { doctor_id, scheduled_at } => {
                write!(f, "slot for doctor {} at {} is taken", doctor_id, scheduled_at)
            }
            Guard::NoOverlap { doctor_id, start, end } => write!(
                f,
                "doctor {} has an appointment between {} and {}",
                doctor_id, start, end
            ),
            Guard::StillActive { appointment_id } => {
                write!(f, "appointment {} is no longer active", appointment_id)
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UnitOfWork {
    pub guards: Vec<Guard>,
    pub slots: Vec<Slot>,
    pub appointments: Vec<Appointment>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(mut self, guard: Guard) -> Self {
        self.guards.push(guard);
        self
    }

    pub fn put_slot(mut self, slot: Slot) -> Self {
        self.slots.push(slot);
        self
    }

    pub fn put_appointment(mut self, appointment: Appointment) -> Self {
        self.appointments.push(appointment);
        self
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Guard rejected: {0}")]
    GuardRejected(Guard),

    #[error("Slot already exists for doctor {doctor_id} at {scheduled_at}")]
    DuplicateSlot {
        doctor_id: DoctorId,
        scheduled_at: NaiveDateTime,
    },

    #[error("Write rejected by store: {0}")]
    Rejected(String),

    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Errors caused by concurrent writers rather than by the backend.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            StoreError::GuardRejected(_) | StoreError::DuplicateSlot { .. } | StoreError::Rejected(_)
        )
    }
}
