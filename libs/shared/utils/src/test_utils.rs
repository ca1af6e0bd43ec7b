use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub payment_service_url: String,
    pub payment_required: bool,
    pub strict_status_transitions: bool,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            payment_service_url: String::new(),
            payment_required: true,
            strict_status_transitions: false,
        }
    }
}

impl TestConfig {
    /// Config pointing the store at a mock PostgREST server.
    pub fn with_supabase(url: impl Into<String>) -> Self {
        Self {
            supabase_url: url.into(),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            payment_service_url: self.payment_service_url.clone(),
            payment_required: self.payment_required,
            strict_status_transitions: self.strict_status_transitions,
            side_effect_retry_delay_ms: 10,
            side_effect_timeout_seconds: 2,
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// `2025-01-01` at the given time.
pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 1)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .unwrap_or_default()
}

/// Poll `check` until it returns true or the timeout elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;

    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub struct MockSupabaseResponses;

impl MockSupabaseResponses {
    pub fn slot_row(id: Uuid, doctor_id: i64, specialty: &str, scheduled_at: &str, available: bool) -> Value {
        json!({
            "id": id,
            "doctor_id": doctor_id,
            "specialty": specialty,
            "scheduled_at": scheduled_at,
            "available": available
        })
    }

    pub fn appointment_row(id: Uuid, slot_id: Uuid, doctor_id: i64, status: &str) -> Value {
        json!({
            "id": id,
            "patient_id": 1,
            "patient_email": "patient@example.com",
            "doctor_id": doctor_id,
            "doctor_email": null,
            "specialty": "cardio",
            "slot_id": slot_id,
            "scheduled_at": "2025-01-01T10:00:00",
            "status": status,
            "created_at": "2025-01-01T08:00:00+00:00",
            "updated_at": "2025-01-01T08:00:00+00:00"
        })
    }

    pub fn commit_ok() -> Value {
        json!({ "committed": true })
    }

    pub fn commit_rejected(guard: Value) -> Value {
        json!({ "committed": false, "rejected": guard })
    }

    pub fn error_response(message: &str, code: &str) -> Value {
        json!({
            "message": message,
            "code": code,
            "details": null,
            "hint": null
        })
    }
}
