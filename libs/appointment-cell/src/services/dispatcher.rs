// libs/appointment-cell/src/services/dispatcher.rs
//! Best-effort delivery of booking side effects.
//!
//! Events are handed to a bounded queue and delivered by a single background
//! worker. Callers never wait on delivery and never see its failures: a full
//! or closed queue drops the event with a warning, and a delivery that keeps
//! failing is logged and discarded after the configured attempts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

use messaging_cell::{
    MessagingError, NotificationChannel, NotificationMessage, PaymentInitiator, PaymentRequest,
};
use shared_config::AppConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum SideEffectEvent {
    Notify(NotificationMessage),
    RequestPayment(PaymentRequest),
}

impl SideEffectEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            SideEffectEvent::Notify(_) => "notify",
            SideEffectEvent::RequestPayment(_) => "request_payment",
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            SideEffectEvent::Notify(message) => &message.email,
            SideEffectEvent::RequestPayment(request) => &request.customer_email,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DispatcherSettings {
    pub capacity: usize,
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub attempt_timeout: Duration,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl DispatcherSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            capacity: config.side_effect_queue_capacity.max(1),
            max_attempts: config.side_effect_max_attempts.max(1),
            retry_delay: Duration::from_millis(config.side_effect_retry_delay_ms),
            attempt_timeout: Duration::from_secs(config.side_effect_timeout_seconds.max(1)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub enqueued: u64,
    pub delivered: u64,
    pub failed: u64,
    pub rejected: u64,
}

impl DispatchStats {
    /// Events accepted but not yet delivered or given up on.
    pub fn pending(&self) -> u64 {
        self.enqueued.saturating_sub(self.delivered + self.failed)
    }
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchStats {
        DispatchStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

pub struct SideEffectDispatcher {
    sender: Mutex<Option<mpsc::Sender<SideEffectEvent>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl SideEffectDispatcher {
    /// Start the delivery worker. Must be called from within a tokio runtime.
    pub fn spawn(
        notifier: Arc<dyn NotificationChannel>,
        payments: Arc<dyn PaymentInitiator>,
        settings: DispatcherSettings,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(settings.capacity);
        let counters = Arc::new(Counters::default());

        let worker = DeliveryWorker {
            notifier,
            payments,
            settings,
            counters: counters.clone(),
        };
        let handle = tokio::spawn(worker.run(receiver));

        Self {
            sender: Mutex::new(Some(sender)),
            worker: tokio::sync::Mutex::new(Some(handle)),
            counters,
        }
    }

    /// Queue events for delivery. Never blocks and never fails the caller.
    pub fn dispatch(&self, events: Vec<SideEffectEvent>) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();

        let Some(sender) = sender else {
            for event in events {
                warn!("Dispatcher is shut down, dropping {} for {}", event.kind(), event.recipient());
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            }
            return;
        };

        for event in events {
            match sender.try_send(event) {
                Ok(()) => {
                    self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Full(event)) => {
                    warn!("Side-effect queue full, dropping {} for {}", event.kind(), event.recipient());
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Closed(event)) => {
                    warn!("Side-effect queue closed, dropping {} for {}", event.kind(), event.recipient());
                    self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        self.counters.snapshot()
    }

    /// Stop accepting events and wait until everything queued has been handled.
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(sender);

        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Side-effect worker ended abnormally: {}", e);
            }
            info!("Side-effect dispatcher stopped: {:?}", self.stats());
        }
    }
}

struct DeliveryWorker {
    notifier: Arc<dyn NotificationChannel>,
    payments: Arc<dyn PaymentInitiator>,
    settings: DispatcherSettings,
    counters: Arc<Counters>,
}

impl DeliveryWorker {
    async fn run(self, mut receiver: mpsc::Receiver<SideEffectEvent>) {
        debug!("Side-effect worker started");
        while let Some(event) = receiver.recv().await {
            self.deliver(&event).await;
        }
        debug!("Side-effect worker drained");
    }

    #[instrument(skip(self, event), fields(kind = event.kind(), recipient = %event.recipient()))]
    async fn deliver(&self, event: &SideEffectEvent) {
        let max_attempts = self.settings.max_attempts;

        for attempt in 1..=max_attempts {
            match timeout(self.settings.attempt_timeout, self.attempt(event)).await {
                Ok(Ok(())) => {
                    debug!("Delivered on attempt {}", attempt);
                    self.counters.delivered.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Ok(Err(e)) => warn!("Attempt {}/{} failed: {}", attempt, max_attempts, e),
                Err(_) => warn!(
                    "Attempt {}/{} timed out after {:?}",
                    attempt, max_attempts, self.settings.attempt_timeout
                ),
            }

            if attempt < max_attempts {
                tokio::time::sleep(self.settings.retry_delay).await;
            }
        }

        error!("Giving up after {} attempt(s)", max_attempts);
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
    }

    async fn attempt(&self, event: &SideEffectEvent) -> Result<(), MessagingError> {
        match event {
            SideEffectEvent::Notify(message) => self.notifier.send(message).await,
            SideEffectEvent::RequestPayment(request) => self.payments.request_payment(request).await,
        }
    }
}
