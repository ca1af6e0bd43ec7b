// libs/appointment-cell/src/store/supabase.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::{ApiError, SupabaseClient};

use crate::models::{Appointment, DoctorId, Slot};
use crate::store::{AppointmentStore, BookingStore, Guard, SlotStore, StoreError, UnitOfWork};

const COMMIT_FUNCTION: &str = "commit_booking_unit";

/// Result document returned by `commit_booking_unit`.
#[derive(Debug, Deserialize)]
struct CommitOutcome {
    committed: bool,
    #[serde(default)]
    rejected: Option<Guard>,
}

/// PostgREST-backed store. Reads use table filters; writes go through one
/// Postgres function so each unit runs in a single transaction.
pub struct SupabaseBookingStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseBookingStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn select<T>(&self, path: String) -> Result<Vec<T>, StoreError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.supabase
            .request(Method::GET, &path, None)
            .await
            .map_err(backend_error)
    }
}

fn backend_error(err: anyhow::Error) -> StoreError {
    match err.downcast_ref::<ApiError>() {
        Some(api) if api.is_conflict() => StoreError::Rejected(api.body.clone()),
        _ => StoreError::Backend(err.to_string()),
    }
}

fn encode_time(value: &NaiveDateTime) -> String {
    urlencoding::encode(&value.format("%Y-%m-%dT%H:%M:%S").to_string()).into_owned()
}

#[async_trait]
impl SlotStore for SupabaseBookingStore {
    async fn find_by_doctor_and_time(
        &self,
        doctor_id: DoctorId,
        scheduled_at: NaiveDateTime,
    ) -> Result<Option<Slot>, StoreError> {
        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&scheduled_at=eq.{}&limit=1",
            doctor_id,
            encode_time(&scheduled_at)
        );
        let slots: Vec<Slot> = self.select(path).await?;
        Ok(slots.into_iter().next())
    }

    async fn find_slot_by_id(&self, slot_id: Uuid) -> Result<Option<Slot>, StoreError> {
        let slots: Vec<Slot> = self.select(format!("/rest/v1/slots?id=eq.{}", slot_id)).await?;
        Ok(slots.into_iter().next())
    }

    async fn save_slot(&self, slot: &Slot) -> Result<Slot, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("prefer"),
            HeaderValue::from_static("return=representation"),
        );

        let body = serde_json::to_value(slot)?;
        let result: Result<Vec<Slot>, _> = self
            .supabase
            .request_with_headers(Method::POST, "/rest/v1/slots", Some(body), Some(headers))
            .await;

        match result.map_err(backend_error) {
            Ok(rows) => rows
                .into_iter()
                .next()
                .ok_or_else(|| StoreError::Backend("Slot insert returned no rows".to_string())),
            // unique (doctor_id, scheduled_at) violation
            Err(StoreError::Rejected(body)) => {
                debug!("Slot insert refused: {}", body);
                Err(StoreError::DuplicateSlot {
                    doctor_id: slot.doctor_id,
                    scheduled_at: slot.scheduled_at,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn find_available(
        &self,
        doctor_id: DoctorId,
        specialty: &str,
    ) -> Result<Vec<Slot>, StoreError> {
        let path = format!(
            "/rest/v1/slots?doctor_id=eq.{}&specialty=eq.{}&available=is.true&order=scheduled_at.asc",
            doctor_id,
            urlencoding::encode(specialty)
        );
        self.select(path).await
    }
}

#[async_trait]
impl AppointmentStore for SupabaseBookingStore {
    async fn save_appointment(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        let rows: Vec<Appointment> = self
            .supabase
            .upsert("appointments", "id", serde_json::to_value(appointment)?)
            .await
            .map_err(backend_error)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| StoreError::Backend("Appointment upsert returned no rows".to_string()))
    }

    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let rows: Vec<Appointment> = self
            .select(format!("/rest/v1/appointments?id=eq.{}", appointment_id))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn exists_overlapping(
        &self,
        doctor_id: DoctorId,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<bool, StoreError> {
        let path = format!(
            "/rest/v1/appointments?select=id&doctor_id=eq.{}&status=neq.CANCELLED&scheduled_at=gt.{}&scheduled_at=lt.{}&limit=1",
            doctor_id,
            encode_time(&start),
            encode_time(&end)
        );
        let rows: Vec<serde_json::Value> = self.select(path).await?;
        Ok(!rows.is_empty())
    }

    async fn find_active_by_slot(&self, slot_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        self.select(format!(
            "/rest/v1/appointments?slot_id=eq.{}&status=neq.CANCELLED",
            slot_id
        ))
        .await
    }
}

#[async_trait]
impl BookingStore for SupabaseBookingStore {
    async fn commit(&self, unit: UnitOfWork) -> Result<(), StoreError> {
        let args = json!({ "unit": serde_json::to_value(&unit)? });

        let outcome: CommitOutcome = self
            .supabase
            .rpc(COMMIT_FUNCTION, args)
            .await
            .map_err(backend_error)?;

        if outcome.committed {
            return Ok(());
        }

        match outcome.rejected {
            Some(guard) => Err(StoreError::GuardRejected(guard)),
            None => {
                warn!("{} declined the unit without naming a guard", COMMIT_FUNCTION);
                Err(StoreError::Rejected("unit of work not committed".to_string()))
            }
        }
    }
}
