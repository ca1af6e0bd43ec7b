mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use appointment_cell::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentStore, BookingPolicy,
    BookingStore, BookingWorkflow, DispatcherSettings, InMemoryBookingStore,
    PublishScheduleRequest, SideEffectDispatcher, Slot, SlotStore, StoreError, UnitOfWork,
};
use messaging_cell::mocks::{RecordingNotificationChannel, RecordingPaymentInitiator};
use shared_utils::test_utils::{at, TestConfig};

use common::{booking, Harness};

// ==============================================================================
// BOOKING
// ==============================================================================

#[tokio::test]
async fn test_book_cancel_rebook_scenario() {
    let harness = Harness::new();
    let workflow = &harness.workflow;

    let first = workflow.book(booking(1, 7, at(10, 0))).await.unwrap();
    assert_eq!(first.status, AppointmentStatus::PendingPayment);
    assert_eq!(first.scheduled_at, at(10, 0));

    let slot = harness.store.find_by_doctor_and_time(7, at(10, 0)).await.unwrap().unwrap();
    assert_eq!(slot.id, first.slot_id);
    assert!(!slot.available);

    let clash = workflow.book(booking(2, 7, at(10, 30))).await;
    assert_matches!(clash, Err(AppointmentError::Conflict(_)));

    let cancelled = workflow.cancel(first.id).await.unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    let slot = harness.store.find_slot_by_id(first.slot_id).await.unwrap().unwrap();
    assert!(slot.available);

    let second = workflow.book(booking(2, 7, at(10, 0))).await.unwrap();
    assert_eq!(second.slot_id, first.slot_id, "cancelled slot is reused");
    assert_eq!(harness.store.slot_count().await, 1);
}

#[tokio::test]
async fn test_booking_dispatches_notifications_and_payment() {
    let harness = Harness::new();

    let appointment = harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();
    harness.settle().await;

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].email, "patient1@example.com");
    assert_eq!(sent[0].subject, "Appointment created");
    assert!(sent[0].message.contains("complete the payment"));
    assert_eq!(sent[1].email, "doctor7@example.com");
    assert_eq!(sent[1].subject, "New appointment request");

    let payments = harness.payments.requests();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].appointment_id, appointment.id);
    assert_eq!(payments[0].total, 150.0);
    assert_eq!(payments[0].payment_method, "pix");
    assert_eq!(payments[0].customer_email, "patient1@example.com");
}

#[tokio::test]
async fn test_doctor_is_not_notified_without_contact() {
    let harness = Harness::new();
    let mut request = booking(1, 7, at(10, 0));
    request.doctor_email = None;

    harness.workflow.book(request).await.unwrap();
    harness.settle().await;

    let recipients: Vec<_> = harness.notifier.sent().into_iter().map(|m| m.email).collect();
    assert_eq!(recipients, vec!["patient1@example.com".to_string()]);
}

#[tokio::test]
async fn test_without_payment_gate_booking_is_scheduled() {
    let config = TestConfig {
        payment_required: false,
        ..TestConfig::default()
    }
    .to_app_config();
    let harness = Harness::with_config(&config);

    let appointment = harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();
    harness.settle().await;

    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert!(harness.payments.requests().is_empty());
    assert!(!harness.notifier.sent()[0].message.contains("payment"));
}

#[tokio::test]
async fn test_overlap_window_boundaries() {
    // existing booking at 10:00 with a 60 minute duration
    let cases = [
        (at(9, 0), true),
        (at(9, 1), true),
        (at(9, 2), false),
        (at(10, 0), false),
        (at(10, 30), false),
        (at(10, 58), false),
        (at(10, 59), true),
        (at(11, 0), true),
    ];

    for (candidate, accepted) in cases {
        let harness = Harness::new();
        harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();

        let result = harness.workflow.book(booking(2, 7, candidate)).await;
        if accepted {
            assert!(result.is_ok(), "{} should be accepted: {:?}", candidate, result);
        } else {
            assert_matches!(result, Err(AppointmentError::Conflict(_)), "{} should conflict", candidate);
        }
    }
}

#[tokio::test]
async fn test_other_doctors_are_independent() {
    let harness = Harness::new();

    harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();
    let other = harness.workflow.book(booking(2, 8, at(10, 0))).await;

    assert!(other.is_ok());
}

#[tokio::test]
async fn test_cancelled_appointment_does_not_block() {
    let harness = Harness::new();

    let first = harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();
    harness.workflow.cancel(first.id).await.unwrap();

    assert!(harness.workflow.book(booking(2, 7, at(10, 30))).await.is_ok());
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_any_write() {
    let harness = Harness::new();

    let mut no_specialty = booking(1, 7, at(10, 0));
    no_specialty.specialty = "  ".to_string();
    assert_matches!(
        harness.workflow.book(no_specialty).await,
        Err(AppointmentError::ValidationError(_))
    );

    let mut no_contact = booking(1, 7, at(10, 0));
    no_contact.patient_email = String::new();
    assert_matches!(
        harness.workflow.book(no_contact).await,
        Err(AppointmentError::ValidationError(_))
    );

    assert_eq!(harness.store.slot_count().await, 0);
    assert_eq!(harness.store.appointment_count().await, 0);
    assert_eq!(harness.dispatcher.stats().enqueued, 0);
}

// ==============================================================================
// CONCURRENCY
// ==============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_for_one_slot_admit_exactly_one() {
    let harness = Harness::new();

    let attempts: Vec<_> = (0..16)
        .map(|patient| {
            let workflow = harness.workflow.clone();
            tokio::spawn(async move { workflow.book(booking(patient, 7, at(10, 0))).await })
        })
        .collect();

    let mut winners = Vec::new();
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(appointment) => winners.push(appointment),
            Err(e) => assert_matches!(e, AppointmentError::Conflict(_)),
        }
    }

    assert_eq!(winners.len(), 1);
    assert_eq!(harness.store.appointment_count().await, 1);
    assert_eq!(harness.store.slot_count().await, 1);

    let slot = harness.store.find_by_doctor_and_time(7, at(10, 0)).await.unwrap().unwrap();
    assert!(!slot.available);
    assert_eq!(slot.id, winners[0].slot_id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_nearby_bookings_never_overlap() {
    let harness = Harness::new();

    let attempts: Vec<_> = (0..12)
        .map(|i| {
            let workflow = harness.workflow.clone();
            tokio::spawn(async move { workflow.book(booking(i, 7, at(10, (i * 5) as u32))).await })
        })
        .collect();

    let mut times: Vec<NaiveDateTime> = Vec::new();
    for attempt in attempts {
        if let Ok(appointment) = attempt.await.unwrap() {
            times.push(appointment.scheduled_at);
        }
    }

    // every 5 minute offset within 10:00..10:55 overlaps every other
    assert_eq!(times.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_bookings_for_different_doctors_all_succeed() {
    let harness = Harness::new();

    let attempts: Vec<_> = (0..8)
        .map(|doctor| {
            let workflow = harness.workflow.clone();
            tokio::spawn(async move { workflow.book(booking(1, doctor, at(10, 0))).await })
        })
        .collect();

    for attempt in attempts {
        assert!(attempt.await.unwrap().is_ok());
    }
    assert_eq!(harness.store.appointment_count().await, 8);
}

// ==============================================================================
// CANCELLATION AND STATUS
// ==============================================================================

#[tokio::test]
async fn test_cancel_is_idempotent() {
    let harness = Harness::new();
    let appointment = harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();

    let first = harness.workflow.cancel(appointment.id).await.unwrap();
    let second = harness.workflow.cancel(appointment.id).await.unwrap();
    harness.settle().await;

    assert_eq!(first, second);
    let cancellations = harness
        .notifier
        .sent()
        .into_iter()
        .filter(|m| m.subject == "Appointment cancelled")
        .count();
    assert_eq!(cancellations, 1);
}

#[tokio::test]
async fn test_unknown_appointment_is_not_found() {
    let harness = Harness::new();
    let missing = Uuid::new_v4();

    assert_matches!(harness.workflow.cancel(missing).await, Err(AppointmentError::NotFound(id)) if id == missing);
    assert_matches!(
        harness.workflow.set_status(missing, AppointmentStatus::Scheduled).await,
        Err(AppointmentError::NotFound(_))
    );
    assert_eq!(harness.workflow.get_by_id(missing).await.unwrap(), None);
}

#[tokio::test]
async fn test_set_status_overwrites_and_notifies() {
    let harness = Harness::new();
    let appointment = harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();

    let callback_status = "AGENDADA".parse().unwrap();
    let updated = harness.workflow.set_status(appointment.id, callback_status).await.unwrap();
    harness.settle().await;

    assert_eq!(updated.status, AppointmentStatus::Scheduled);
    assert_eq!(updated.slot_id, appointment.slot_id);
    assert_eq!(
        harness.workflow.get_by_id(appointment.id).await.unwrap().unwrap().status,
        AppointmentStatus::Scheduled
    );

    let last = harness.notifier.sent().pop().unwrap();
    assert_eq!(last.subject, "Appointment updated");
    assert!(last.message.contains("SCHEDULED"));
}

#[tokio::test]
async fn test_set_status_can_resurrect_without_touching_slot() {
    let harness = Harness::new();
    let appointment = harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();
    harness.workflow.cancel(appointment.id).await.unwrap();

    let revived = harness
        .workflow
        .set_status(appointment.id, AppointmentStatus::Scheduled)
        .await
        .unwrap();

    assert_eq!(revived.status, AppointmentStatus::Scheduled);
    let slot = harness.store.find_slot_by_id(appointment.slot_id).await.unwrap().unwrap();
    assert!(slot.available);
}

#[tokio::test]
async fn test_cancel_keeps_slot_held_by_newer_appointment() {
    let harness = Harness::new();
    let first = harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();
    harness.workflow.cancel(first.id).await.unwrap();
    let second = harness.workflow.book(booking(2, 7, at(10, 0))).await.unwrap();

    // the first appointment comes back and is cancelled again
    harness.workflow.set_status(first.id, AppointmentStatus::Scheduled).await.unwrap();
    harness.workflow.cancel(first.id).await.unwrap();

    let slot = harness.store.find_slot_by_id(second.slot_id).await.unwrap().unwrap();
    assert!(!slot.available, "slot still belongs to {}", second.id);
}

#[tokio::test]
async fn test_strict_transitions_reject_illegal_moves() {
    let config = TestConfig {
        strict_status_transitions: true,
        ..TestConfig::default()
    }
    .to_app_config();
    let harness = Harness::with_config(&config);

    let appointment = harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();
    let completed = harness.workflow.set_status(appointment.id, AppointmentStatus::Completed).await;
    assert_matches!(
        completed,
        Err(AppointmentError::InvalidStatusTransition {
            from: AppointmentStatus::PendingPayment,
            to: AppointmentStatus::Completed,
        })
    );

    harness.workflow.cancel(appointment.id).await.unwrap();
    let revived = harness.workflow.set_status(appointment.id, AppointmentStatus::Scheduled).await;
    assert_matches!(revived, Err(AppointmentError::InvalidStatusTransition { .. }));
}

#[tokio::test]
async fn test_strict_cancellation_through_status_frees_slot() {
    let config = TestConfig {
        strict_status_transitions: true,
        ..TestConfig::default()
    }
    .to_app_config();
    let harness = Harness::with_config(&config);

    let appointment = harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();
    let cancelled = harness
        .workflow
        .set_status(appointment.id, AppointmentStatus::Cancelled)
        .await
        .unwrap();

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    let slot = harness.store.find_slot_by_id(appointment.slot_id).await.unwrap().unwrap();
    assert!(slot.available);
}

// ==============================================================================
// SIDE EFFECT FAILURES
// ==============================================================================

#[tokio::test]
async fn test_failing_side_effects_do_not_affect_booking() {
    let config = TestConfig::default().to_app_config();
    let harness = Harness::with_channels(
        &config,
        RecordingNotificationChannel::failing(),
        RecordingPaymentInitiator::failing(),
    );

    let appointment = harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();
    let cancelled = harness.workflow.cancel(appointment.id).await.unwrap();
    harness.settle().await;

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    let stats = harness.dispatcher.stats();
    assert_eq!(stats.delivered, 0);
    assert_eq!(stats.failed, 4);
    assert!(harness.payments.requests().is_empty());
}

// ==============================================================================
// STORAGE FAILURES
// ==============================================================================

/// Delegates reads to an in-memory store but refuses every commit.
struct BrokenCommitStore {
    inner: InMemoryBookingStore,
}

#[async_trait]
impl SlotStore for BrokenCommitStore {
    async fn find_by_doctor_and_time(&self, doctor_id: i64, at: NaiveDateTime) -> Result<Option<Slot>, StoreError> {
        self.inner.find_by_doctor_and_time(doctor_id, at).await
    }

    async fn find_slot_by_id(&self, slot_id: Uuid) -> Result<Option<Slot>, StoreError> {
        self.inner.find_slot_by_id(slot_id).await
    }

    async fn save_slot(&self, slot: &Slot) -> Result<Slot, StoreError> {
        self.inner.save_slot(slot).await
    }

    async fn find_available(&self, doctor_id: i64, specialty: &str) -> Result<Vec<Slot>, StoreError> {
        self.inner.find_available(doctor_id, specialty).await
    }
}

#[async_trait]
impl AppointmentStore for BrokenCommitStore {
    async fn save_appointment(&self, appointment: &Appointment) -> Result<Appointment, StoreError> {
        self.inner.save_appointment(appointment).await
    }

    async fn find_by_id(&self, appointment_id: Uuid) -> Result<Option<Appointment>, StoreError> {
        self.inner.find_by_id(appointment_id).await
    }

    async fn exists_overlapping(
        &self,
        doctor_id: i64,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<bool, StoreError> {
        self.inner.exists_overlapping(doctor_id, start, end).await
    }

    async fn find_active_by_slot(&self, slot_id: Uuid) -> Result<Vec<Appointment>, StoreError> {
        self.inner.find_active_by_slot(slot_id).await
    }
}

#[async_trait]
impl BookingStore for BrokenCommitStore {
    async fn commit(&self, _unit: UnitOfWork) -> Result<(), StoreError> {
        Err(StoreError::Backend("connection reset".to_string()))
    }
}

#[tokio::test]
async fn test_storage_failure_surfaces_and_dispatches_nothing() {
    let store = Arc::new(BrokenCommitStore { inner: InMemoryBookingStore::new() });
    let notifier = RecordingNotificationChannel::new();
    let dispatcher = Arc::new(SideEffectDispatcher::spawn(
        Arc::new(notifier.clone()),
        Arc::new(RecordingPaymentInitiator::new()),
        DispatcherSettings::default(),
    ));
    let workflow = BookingWorkflow::new(store.clone(), dispatcher.clone(), BookingPolicy::default());

    let result = workflow.book(booking(1, 7, at(10, 0))).await;

    assert_matches!(result, Err(AppointmentError::Storage(StoreError::Backend(_))));
    assert_eq!(store.inner.slot_count().await, 0);
    assert_eq!(store.inner.appointment_count().await, 0);
    assert_eq!(dispatcher.stats().enqueued, 0);
}

// ==============================================================================
// SLOT LISTING AND SCHEDULES
// ==============================================================================

fn schedule(doctor_id: i64, start: (u32, u32), end: (u32, u32)) -> PublishScheduleRequest {
    PublishScheduleRequest {
        doctor_id,
        specialty: "cardio".to_string(),
        date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        start_time: NaiveTime::from_hms_opt(start.0, start.1, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(end.0, end.1, 0).unwrap(),
    }
}

#[tokio::test]
async fn test_publish_schedule_then_list_available() {
    let harness = Harness::new();

    let published = harness.workflow.publish_schedule(schedule(7, (9, 0), (12, 0))).await.unwrap();
    let times: Vec<_> = published.iter().map(|slot| slot.scheduled_at).collect();
    assert_eq!(times, vec![at(9, 0), at(10, 0), at(11, 0)]);

    let appointment = harness.workflow.book(booking(1, 7, at(10, 0))).await.unwrap();
    assert_eq!(appointment.slot_id, published[1].id);

    let available = harness.workflow.list_available(7, "cardio").await.unwrap();
    let times: Vec<_> = available.iter().map(|slot| slot.scheduled_at).collect();
    assert_eq!(times, vec![at(9, 0), at(11, 0)]);

    assert!(harness.workflow.list_available(7, "derma").await.unwrap().is_empty());
    assert!(harness.workflow.list_available(8, "cardio").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_publish_schedule_is_find_or_create() {
    let harness = Harness::new();

    let first = harness.workflow.publish_schedule(schedule(7, (9, 0), (11, 0))).await.unwrap();
    harness.workflow.book(booking(1, 7, at(9, 0))).await.unwrap();
    let second = harness.workflow.publish_schedule(schedule(7, (9, 0), (11, 0))).await.unwrap();

    assert_eq!(
        first.iter().map(|s| s.id).collect::<Vec<_>>(),
        second.iter().map(|s| s.id).collect::<Vec<_>>()
    );
    assert!(!second[0].available);
    assert_eq!(harness.store.slot_count().await, 2);
}

#[tokio::test]
async fn test_publish_schedule_rejects_empty_range() {
    let harness = Harness::new();

    let result = harness.workflow.publish_schedule(schedule(7, (12, 0), (9, 0))).await;

    assert_matches!(result, Err(AppointmentError::ValidationError(_)));
    assert_eq!(harness.store.slot_count().await, 0);
}

#[tokio::test]
async fn test_publish_schedule_with_zero_duration_still_terminates() {
    let store = Arc::new(InMemoryBookingStore::new());
    let dispatcher = Arc::new(SideEffectDispatcher::spawn(
        Arc::new(RecordingNotificationChannel::new()),
        Arc::new(RecordingPaymentInitiator::new()),
        DispatcherSettings::default(),
    ));
    let policy = BookingPolicy {
        appointment_duration_minutes: 0,
        ..BookingPolicy::default()
    };
    let workflow = BookingWorkflow::new(store.clone(), dispatcher, policy);

    let published = tokio::time::timeout(
        std::time::Duration::from_secs(2),
        workflow.publish_schedule(schedule(7, (9, 0), (9, 3))),
    )
    .await
    .expect("publish_schedule should finish")
    .unwrap();

    let times: Vec<_> = published.iter().map(|slot| slot.scheduled_at).collect();
    assert_eq!(times, vec![at(9, 0), at(9, 1), at(9, 2)]);

    // the doctor is not left locked
    workflow.book(booking(1, 7, at(9, 0))).await.unwrap();
}
