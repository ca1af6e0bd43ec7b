// libs/appointment-cell/src/services/slots.rs
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::models::{AppointmentError, DoctorId, Slot};
use crate::store::{BookingStore, Guard, StoreError};

pub struct SlotAllocator {
    store: Arc<dyn BookingStore>,
}

impl SlotAllocator {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    /// Find the slot for `(doctor_id, at)` or prepare a fresh one. A fresh slot
    /// is only persisted when the caller's unit of work commits.
    pub async fn reserve_slot(
        &self,
        doctor_id: DoctorId,
        specialty: &str,
        at: NaiveDateTime,
    ) -> Result<Slot, AppointmentError> {
        match self.store.find_by_doctor_and_time(doctor_id, at).await? {
            Some(slot) if !slot.available => Err(AppointmentError::Conflict(format!(
                "Slot for doctor {} at {} is already booked",
                doctor_id, at
            ))),
            Some(slot) => {
                debug!("Reusing slot {} for doctor {} at {}", slot.id, doctor_id, at);
                Ok(slot)
            }
            None => {
                debug!("No slot for doctor {} at {}, creating one", doctor_id, at);
                Ok(Slot::new(doctor_id, specialty, at))
            }
        }
    }

    /// Mark the slot as taken. The returned guard makes the commit fail if
    /// someone else took it first.
    pub fn claim(&self, mut slot: Slot) -> (Slot, Guard) {
        let guard = Guard::SlotFree {
            doctor_id: slot.doctor_id,
            scheduled_at: slot.scheduled_at,
        };
        slot.available = false;
        (slot, guard)
    }

    pub fn release(&self, mut slot: Slot) -> Slot {
        slot.available = true;
        slot
    }

    /// Persist an available slot unless one already exists for the key.
    pub async fn open_slot(
        &self,
        doctor_id: DoctorId,
        specialty: &str,
        at: NaiveDateTime,
    ) -> Result<Slot, AppointmentError> {
        if let Some(existing) = self.store.find_by_doctor_and_time(doctor_id, at).await? {
            return Ok(existing);
        }

        match self.store.save_slot(&Slot::new(doctor_id, specialty, at)).await {
            Ok(slot) => Ok(slot),
            Err(StoreError::DuplicateSlot { .. }) => self
                .store
                .find_by_doctor_and_time(doctor_id, at)
                .await?
                .ok_or_else(|| {
                    AppointmentError::Conflict(format!(
                        "Slot for doctor {} at {} vanished after a duplicate insert",
                        doctor_id, at
                    ))
                }),
            Err(e) => Err(e.into()),
        }
    }
}
