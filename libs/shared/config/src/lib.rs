use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub redis_url: Option<String>,
    pub notification_queue: String,
    pub payment_service_url: String,
    pub payment_required: bool,
    pub payment_amount: f64,
    pub payment_method: String,
    pub appointment_duration_minutes: i64,
    pub strict_status_transitions: bool,
    pub side_effect_queue_capacity: usize,
    pub side_effect_max_attempts: u32,
    pub side_effect_retry_delay_ms: u64,
    pub side_effect_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            redis_url: None,
            notification_queue: "booking:notifications".to_string(),
            payment_service_url: String::new(),
            payment_required: true,
            payment_amount: 150.0,
            payment_method: "pix".to_string(),
            appointment_duration_minutes: 60,
            strict_status_transitions: false,
            side_effect_queue_capacity: 1024,
            side_effect_max_attempts: 1,
            side_effect_retry_delay_ms: 500,
            side_effect_timeout_seconds: 10,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            port: parsed_or("PORT", defaults.port),
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, falling back to in-memory store");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            notification_queue: env::var("NOTIFICATION_QUEUE")
                .unwrap_or(defaults.notification_queue),
            payment_service_url: env::var("PAYMENT_SERVICE_URL")
                .unwrap_or_else(|_| {
                    warn!("PAYMENT_SERVICE_URL not set, payment requests will only be logged");
                    String::new()
                }),
            payment_required: parsed_or("PAYMENT_REQUIRED", defaults.payment_required),
            payment_amount: parsed_or("PAYMENT_AMOUNT", defaults.payment_amount),
            payment_method: env::var("PAYMENT_METHOD").unwrap_or(defaults.payment_method),
            appointment_duration_minutes: parsed_or(
                "APPOINTMENT_DURATION_MINUTES",
                defaults.appointment_duration_minutes,
            ),
            strict_status_transitions: parsed_or(
                "STRICT_STATUS_TRANSITIONS",
                defaults.strict_status_transitions,
            ),
            side_effect_queue_capacity: parsed_or(
                "SIDE_EFFECT_QUEUE_CAPACITY",
                defaults.side_effect_queue_capacity,
            ),
            side_effect_max_attempts: parsed_or(
                "SIDE_EFFECT_MAX_ATTEMPTS",
                defaults.side_effect_max_attempts,
            ),
            side_effect_retry_delay_ms: parsed_or(
                "SIDE_EFFECT_RETRY_DELAY_MS",
                defaults.side_effect_retry_delay_ms,
            ),
            side_effect_timeout_seconds: parsed_or(
                "SIDE_EFFECT_TIMEOUT_SECONDS",
                defaults.side_effect_timeout_seconds,
            ),
        };

        if config.appointment_duration_minutes < 1 {
            warn!(
                "APPOINTMENT_DURATION_MINUTES must be positive, got {}; using {}",
                config.appointment_duration_minutes, defaults.appointment_duration_minutes
            );
            return Self {
                appointment_duration_minutes: defaults.appointment_duration_minutes,
                ..config
            };
        }

        config
    }

    /// True when a PostgREST backend should be used instead of the in-memory store.
    pub fn is_database_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_payment_service_configured(&self) -> bool {
        !self.payment_service_url.is_empty()
    }
}

fn parsed_or<T>(name: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value {:?}, using default {:?}", name, raw, default);
            default
        }),
        Err(_) => default,
    }
}
