// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use messaging_cell::{NotificationMessage, PaymentRequest};

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest, BookingPolicy,
    DoctorId, PublishScheduleRequest, Slot,
};
use crate::services::conflict::OverlapGuard;
use crate::services::dispatcher::{SideEffectDispatcher, SideEffectEvent};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::DoctorLocks;
use crate::services::slots::SlotAllocator;
use crate::store::{BookingStore, Guard, StoreError, UnitOfWork};

pub struct BookingWorkflow {
    store: Arc<dyn BookingStore>,
    dispatcher: Arc<SideEffectDispatcher>,
    policy: BookingPolicy,
    overlap: OverlapGuard,
    slots: SlotAllocator,
    lifecycle: AppointmentLifecycleService,
    locks: DoctorLocks,
}

impl BookingWorkflow {
    pub fn new(
        store: Arc<dyn BookingStore>,
        dispatcher: Arc<SideEffectDispatcher>,
        mut policy: BookingPolicy,
    ) -> Self {
        policy.appointment_duration_minutes = policy.appointment_duration_minutes.max(1);

        Self {
            overlap: OverlapGuard::new(store.clone(), policy.appointment_duration_minutes),
            slots: SlotAllocator::new(store.clone()),
            lifecycle: AppointmentLifecycleService::new(),
            locks: DoctorLocks::new(),
            store,
            dispatcher,
            policy,
        }
    }

    pub async fn book(&self, request: BookAppointmentRequest) -> Result<Appointment, AppointmentError> {
        validate_booking(&request)?;

        info!(
            "Booking appointment for patient {} with doctor {} at {}",
            request.patient_id, request.doctor_id, request.scheduled_at
        );

        let _doctor = self.locks.lock(request.doctor_id).await;

        let window = self.overlap.window_for(request.scheduled_at);
        if self.overlap.has_overlap(request.doctor_id, window).await? {
            return Err(AppointmentError::Conflict(format!(
                "Doctor {} already has an appointment close to {}",
                request.doctor_id, request.scheduled_at
            )));
        }

        let slot = self
            .slots
            .reserve_slot(request.doctor_id, &request.specialty, request.scheduled_at)
            .await
            .inspect_err(|e| warn!("Slot reservation failed: {}", e))?;
        let (slot, slot_guard) = self.slots.claim(slot);

        let appointment = Appointment::for_slot(&request, &slot, self.policy.initial_status());

        let unit = UnitOfWork::new()
            .guard(slot_guard)
            .guard(self.overlap.guard_for(request.doctor_id, request.scheduled_at))
            .put_slot(slot)
            .put_appointment(appointment.clone());

        self.store.commit(unit).await.map_err(|e| {
            if e.is_contention() {
                warn!("Booking for doctor {} at {} lost a race: {}", request.doctor_id, request.scheduled_at, e);
                AppointmentError::Conflict(e.to_string())
            } else {
                error!("Failed to persist booking: {}", e);
                AppointmentError::Storage(e)
            }
        })?;

        info!(
            "Appointment {} booked in slot {} with status {}",
            appointment.id, appointment.slot_id, appointment.status
        );

        self.dispatcher.dispatch(self.booking_events(&appointment));
        Ok(appointment)
    }

    pub async fn cancel(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let (_doctor, appointment) = self.load_locked(appointment_id).await?;
        self.cancel_locked(appointment).await
    }

    pub async fn set_status(
        &self,
        appointment_id: Uuid,
        status: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let (_doctor, appointment) = self.load_locked(appointment_id).await?;

        if self.policy.strict_status_transitions {
            self.lifecycle.validate_status_transition(&appointment.status, &status)?;
            if status.is_cancelled() {
                return self.cancel_locked(appointment).await;
            }
        }

        let previous = appointment.status.clone();
        let updated = appointment.with_status(status);

        self.store
            .commit(UnitOfWork::new().put_appointment(updated.clone()))
            .await
            .map_err(|e| storage_error(e, "update appointment status"))?;

        info!("Appointment {} moved from {} to {}", updated.id, previous, updated.status);

        self.dispatcher.dispatch(vec![SideEffectEvent::Notify(NotificationMessage::new(
            &updated.patient_email,
            "Appointment updated",
            format!(
                "Your {} appointment on {} is now {}.",
                updated.specialty,
                format_time(&updated.scheduled_at),
                updated.status
            ),
        ))]);

        Ok(updated)
    }

    pub async fn get_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.store.find_by_id(appointment_id).await?)
    }

    pub async fn list_available(
        &self,
        doctor_id: DoctorId,
        specialty: &str,
    ) -> Result<Vec<Slot>, AppointmentError> {
        debug!("Listing available slots for doctor {} ({})", doctor_id, specialty);
        Ok(self.store.find_available(doctor_id, specialty).await?)
    }

    /// Open slots every appointment duration across `[start_time, end_time)`.
    pub async fn publish_schedule(
        &self,
        request: PublishScheduleRequest,
    ) -> Result<Vec<Slot>, AppointmentError> {
        if request.specialty.trim().is_empty() {
            return Err(AppointmentError::ValidationError("specialty is required".to_string()));
        }
        if request.start_time >= request.end_time {
            return Err(AppointmentError::ValidationError(format!(
                "start_time {} must be before end_time {}",
                request.start_time, request.end_time
            )));
        }

        let step = Duration::minutes(self.policy.appointment_duration_minutes);
        let end = request.date.and_time(request.end_time);
        let mut at = request.date.and_time(request.start_time);

        let _doctor = self.locks.lock(request.doctor_id).await;

        let mut slots = Vec::new();
        while at < end {
            slots.push(self.slots.open_slot(request.doctor_id, &request.specialty, at).await?);
            at += step;
        }

        info!(
            "Published {} slot(s) for doctor {} on {}",
            slots.len(),
            request.doctor_id,
            request.date
        );
        Ok(slots)
    }

    async fn load_locked(
        &self,
        appointment_id: Uuid,
    ) -> Result<(OwnedMutexGuard<()>, Appointment), AppointmentError> {
        let appointment = self
            .store
            .find_by_id(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))?;

        let lock = self.locks.lock(appointment.doctor_id).await;

        // re-read now that no other booking for this doctor can interleave
        let appointment = self
            .store
            .find_by_id(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound(appointment_id))?;

        Ok((lock, appointment))
    }

    async fn cancel_locked(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        if !appointment.is_active() {
            debug!("Appointment {} already cancelled", appointment.id);
            return Ok(appointment);
        }

        let appointment_id = appointment.id;
        let slot_id = appointment.slot_id;
        let cancelled = appointment.with_status(AppointmentStatus::Cancelled);

        let mut unit = UnitOfWork::new()
            .guard(Guard::StillActive { appointment_id })
            .put_appointment(cancelled.clone());

        let others = self.store.find_active_by_slot(slot_id).await?;
        if others.iter().all(|other| other.id == appointment_id) {
            match self.store.find_slot_by_id(slot_id).await? {
                Some(slot) => unit = unit.put_slot(self.slots.release(slot)),
                None => warn!("Slot {} of appointment {} is missing", slot_id, appointment_id),
            }
        } else {
            debug!("Slot {} is held by another appointment, leaving it unavailable", slot_id);
        }

        match self.store.commit(unit).await {
            Ok(()) => {}
            Err(e) if e.is_contention() => {
                // someone else cancelled first
                let current = self
                    .store
                    .find_by_id(appointment_id)
                    .await?
                    .ok_or(AppointmentError::NotFound(appointment_id))?;
                if !current.is_active() {
                    return Ok(current);
                }
                warn!("Cancellation of {} conflicted: {}", appointment_id, e);
                return Err(AppointmentError::Conflict(e.to_string()));
            }
            Err(e) => return Err(storage_error(e, "cancel appointment")),
        }

        info!("Appointment {} cancelled, slot {} released", appointment_id, slot_id);

        self.dispatcher.dispatch(vec![SideEffectEvent::Notify(NotificationMessage::new(
            &cancelled.patient_email,
            "Appointment cancelled",
            format!(
                "Your {} appointment on {} has been cancelled.",
                cancelled.specialty,
                format_time(&cancelled.scheduled_at)
            ),
        ))]);

        Ok(cancelled)
    }

    fn booking_events(&self, appointment: &Appointment) -> Vec<SideEffectEvent> {
        let when = format_time(&appointment.scheduled_at);
        let mut patient_message = format!(
            "Your {} appointment on {} has been created.",
            appointment.specialty, when
        );
        if self.policy.payment_required {
            patient_message.push_str(" Please complete the payment to confirm it.");
        }

        let mut events = vec![SideEffectEvent::Notify(NotificationMessage::new(
            &appointment.patient_email,
            "Appointment created",
            patient_message,
        ))];

        if let Some(doctor_email) = &appointment.doctor_email {
            events.push(SideEffectEvent::Notify(NotificationMessage::new(
                doctor_email,
                "New appointment request",
                format!(
                    "Patient {} requested a {} appointment on {}.",
                    appointment.patient_id, appointment.specialty, when
                ),
            )));
        }

        if self.policy.payment_required {
            events.push(SideEffectEvent::RequestPayment(PaymentRequest {
                appointment_id: appointment.id,
                total: self.policy.payment_amount,
                payment_method: self.policy.payment_method.clone(),
                customer_email: appointment.patient_email.clone(),
            }));
        }

        events
    }
}

fn validate_booking(request: &BookAppointmentRequest) -> Result<(), AppointmentError> {
    if request.specialty.trim().is_empty() {
        return Err(AppointmentError::ValidationError("specialty is required".to_string()));
    }
    if request.patient_email.trim().is_empty() {
        return Err(AppointmentError::ValidationError("patient_email is required".to_string()));
    }
    Ok(())
}

fn storage_error(err: StoreError, action: &str) -> AppointmentError {
    error!("Failed to {}: {}", action, err);
    AppointmentError::Storage(err)
}

fn format_time(at: &NaiveDateTime) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}
