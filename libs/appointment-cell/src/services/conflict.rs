// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};
use tracing::{debug, warn};

use crate::models::{AppointmentError, DoctorId};
use crate::store::{BookingStore, Guard};

/// Proximity interval around a candidate time. Both bounds are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlapWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl OverlapWindow {
    /// Window of `(at - (d - 1), at + (d - 1))` minutes for duration `d`.
    pub fn around(at: NaiveDateTime, duration_minutes: i64) -> Self {
        let reach = Duration::minutes(duration_minutes - 1);
        Self {
            start: at - reach,
            end: at + reach,
        }
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        at > self.start && at < self.end
    }
}

/// Decides whether a doctor is already busy close to a candidate time.
pub struct OverlapGuard {
    store: Arc<dyn BookingStore>,
    duration_minutes: i64,
}

impl OverlapGuard {
    pub fn new(store: Arc<dyn BookingStore>, duration_minutes: i64) -> Self {
        Self {
            store,
            duration_minutes: duration_minutes.max(1),
        }
    }

    pub fn window_for(&self, at: NaiveDateTime) -> OverlapWindow {
        OverlapWindow::around(at, self.duration_minutes)
    }

    /// Commit-time form of the same check.
    pub fn guard_for(&self, doctor_id: DoctorId, at: NaiveDateTime) -> Guard {
        let window = self.window_for(at);
        Guard::NoOverlap {
            doctor_id,
            start: window.start,
            end: window.end,
        }
    }

    pub async fn has_overlap(
        &self,
        doctor_id: DoctorId,
        window: OverlapWindow,
    ) -> Result<bool, AppointmentError> {
        debug!(
            "Checking overlap for doctor {} between {} and {}",
            doctor_id, window.start, window.end
        );

        let overlapping = self
            .store
            .exists_overlapping(doctor_id, window.start, window.end)
            .await?;

        if overlapping {
            warn!(
                "Overlap detected for doctor {} between {} and {}",
                doctor_id, window.start, window.end
            );
        }

        Ok(overlapping)
    }
}
