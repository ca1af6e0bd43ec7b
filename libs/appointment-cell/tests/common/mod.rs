#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;

use appointment_cell::{
    BookAppointmentRequest, BookingPolicy, BookingStore, BookingWorkflow, DispatcherSettings,
    InMemoryBookingStore, SideEffectDispatcher,
};
use messaging_cell::mocks::{RecordingNotificationChannel, RecordingPaymentInitiator};
use shared_config::AppConfig;
use shared_utils::test_utils::{wait_until, TestConfig};

pub struct Harness {
    pub workflow: Arc<BookingWorkflow>,
    pub store: Arc<InMemoryBookingStore>,
    pub dispatcher: Arc<SideEffectDispatcher>,
    pub notifier: RecordingNotificationChannel,
    pub payments: RecordingPaymentInitiator,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(&TestConfig::default().to_app_config())
    }

    pub fn with_config(config: &AppConfig) -> Self {
        Self::with_channels(
            config,
            RecordingNotificationChannel::new(),
            RecordingPaymentInitiator::new(),
        )
    }

    pub fn with_channels(
        config: &AppConfig,
        notifier: RecordingNotificationChannel,
        payments: RecordingPaymentInitiator,
    ) -> Self {
        let store = Arc::new(InMemoryBookingStore::new());
        let dispatcher = Arc::new(SideEffectDispatcher::spawn(
            Arc::new(notifier.clone()),
            Arc::new(payments.clone()),
            DispatcherSettings::from_config(config),
        ));
        let workflow = Arc::new(BookingWorkflow::new(
            store.clone() as Arc<dyn BookingStore>,
            dispatcher.clone(),
            BookingPolicy::from_config(config),
        ));

        Self {
            workflow,
            store,
            dispatcher,
            notifier,
            payments,
        }
    }

    /// Wait until every queued side effect has been delivered or dropped.
    pub async fn settle(&self) {
        let dispatcher = self.dispatcher.clone();
        let settled = wait_until(Duration::from_secs(5), move || {
            let dispatcher = dispatcher.clone();
            async move { dispatcher.stats().pending() == 0 }
        })
        .await;
        assert!(settled, "side effects did not settle: {:?}", self.dispatcher.stats());
    }
}

pub fn booking(patient_id: i64, doctor_id: i64, scheduled_at: NaiveDateTime) -> BookAppointmentRequest {
    BookAppointmentRequest {
        patient_id,
        patient_email: format!("patient{}@example.com", patient_id),
        doctor_id,
        doctor_email: Some(format!("doctor{}@example.com", doctor_id)),
        specialty: "cardio".to_string(),
        scheduled_at,
    }
}
