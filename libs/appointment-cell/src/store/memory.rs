// libs/appointment-cell/src/store/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, DoctorId, Slot};
use crate::store::{AppointmentStore, BookingStore, Guard, SlotStore, StoreError, UnitOfWork};

#[derive(Default)]
struct State {
    slots: HashMap<Uuid, Slot>,
    slot_index: HashMap<(DoctorId, NaiveDateTime), Uuid>,
    appointments: HashMap<Uuid, Appointment>,
}

impl State {
    fn slot_at(&self, doctor_id: DoctorId, scheduled_at: NaiveDateTime) -> Option<&Slot> {
        self.slot_index
            .get(&(doctor_id, scheduled_at))
            .and_then(|id| self.slots.get(id))
    }

    fn has_overlap(&self, doctor_id: DoctorId, start: NaiveDateTime, end: NaiveDateTime) -> bool {
        self.appointments.values().any(|appointment| {
            appointment.doctor_id == doctor_id
                && appointment.is_active()
                && appointment.scheduled_at > start
                && appointment.scheduled_at < end
        })
    }

    fn holds(&self, guard: &Guard) -> bool {
        match guard {
            Guard::SlotFree { doctor_id, scheduled_at } => self
                .slot_at(*doctor_id, *scheduled_at)
                .map_or(true, |slot| slot.available),
            Guard::NoOverlap { doctor_id, start, end } => !self.has_overlap(*doctor_id, *start, *end),
            Guard::StillActive { appointment_id } => self
                .appointments
                .get(appointment_id)
                .is_some_and(Appointment::is_active),
        }
    }

    /// A slot write may update its own row but never take another slot's key.
    fn check_slot_key(&self, slot: &Slot) -> Result<(), StoreError> {
        match self.slot_index.get(&(slot.doctor_id, slot.scheduled_at)) {
            Some(existing) if *existing != slot.id => Err(StoreError::DuplicateSlot {
                doctor_id: slot.doctor_id,
                scheduled_at: slot.scheduled_at,
            }),
            _ => match self.slots.get(&slot.id) {
                Some(stored)
                    if stored.doctor_id != slot.doctor_id || stored.scheduled_at != slot.scheduled_at =>
                {
                    Err(StoreError::Rejected(format!("slot {} cannot change its key", slot.id)))
                }
                _ => Ok(()),
            },
        }
    }

    fn check_appointment(&self, appointment: &Appointment) -> Result<(), StoreError> {
        match self.appointments.get(&appointment.id) {
            Some(stored) if stored.slot_id != appointment.slot_id => Err(StoreError::Rejected(
                format!("appointment {} cannot change its slot", appointment.id),
            )),
            _ => Ok(()),
        }
    }

    fn put_slot(&mut self, slot: Slot) {
        self.slot_index.insert((slot.doctor_id, slot.scheduled_at), slot.id);
        self.slots.insert(slot.id, slot);
    }
}

/// Arena of slots keyed by id with a unique `(doctor, timestamp)` index.
/// A single lock makes every commit atomic.
#[derive(Default)]
pub struct InMemoryBookingStore {
    state: RwLock<State>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn slot_count(&self) -> usize {
        self.state.read().await.slots.len()
    }

    pub async fn appointment_count(&self) -> usize {
        self.state.read().await.appointments.len()
    }
}

#[async_trait]
impl SlotStore for InMemoryBookingStore {
    async fn find_by_doctor_and_time(
        &self,
        doctor_id: DoctorId,
        scheduled_at: NaiveDateTime,
    ) -> Result<Option<Slot>, StoreError> {
        Ok(self.state.read().await.slot_at(doctor_id, scheduled_at).cloned())
    }

    async fn find_slot_by_id(&self, slot_id: Uuid) -> Result<Option<Slot>, StoreError> {
        Ok(self.state.read().await.slots.get(&slot_id).cloned())
    }

    async fn save_slot(&self, slot: &Slot) -> Result<Slot, StoreError> {
        let mut state = self.state.write().await;
        if state.slot_index.contains_key(&(slot.doctor_id, slot.scheduled_at)) {
            return Err(StoreError::DuplicateSlot {
                doctor_id: slot.doctor_id,
                scheduled_at: slot.scheduled_at,
            });
        }
        state.put_slot(slot.clone());
        Ok(slot.clone())
    }

    async fn find_available(
        &self,
        doctor_id: DoctorId,
        specialty: &str,
    ) -> Result<Vec<Slot>, StoreError> {
        let state = self.state.read().await;
        let mut slots: Vec<Slot> = state
            .slots
            .values()
            .filter(|slot| slot.doctor_id == doctor_id && slot.specialty == specialty && slot.available)
            .cloned()
            .collect();
        slots.sort_by_key(|slot| slot.scheduled_at);
        Ok(slots)
    }
}

#[async_trait]
impl AppointmentStore for InMemoryBookingStore {
    async fn save_appointment(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        let mut state = self.state.write().await;
        state.check_appointment(appointment)?;
        state.appointments.insert(appointment.id, appointment.clone());
        Ok(appointment.clone())
    }

    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.state.read().await.appointments.get(&appointment_id).cloned())
    }

    async fn exists_overlapping(
        &self,
        doctor_id: DoctorId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<bool, StoreError> {
        Ok(self.state.read().await.has_overlap(doctor_id, start, end))
    }

    async fn find_active_by_slot(&self, slot_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .appointments
            .values()
            .filter(|appointment| appointment.slot_id == slot_id && appointment.is_active())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError> {
        let mut state = self.state.write().await;

        if let Some(rejected) = unit.guards.iter().find(|guard| !state.holds(guard)) {
            debug!("Unit of work rejected: {}", rejected);
            return Err(StoreError::GuardRejected(rejected.clone()));
        }

        for slot in &unit.slots {
            state.check_slot_key(slot)?;
        }
        for appointment in &unit.appointments {
            state.check_appointment(appointment)?;
        }

        debug!(
            "Committing {} slot(s) and {} appointment(s)",
            unit.slots.len(),
            unit.appointments.len()
        );
        for slot in unit.slots {
            state.put_slot(slot);
        }
        for appointment in unit.appointments {
            state.appointments.insert(appointment.id, appointment);
        }

        Ok(())
    }
}
