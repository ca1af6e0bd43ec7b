use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::{self, TraceLayer};
use tracing::{Level, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::{
    BookingPolicy, BookingStore, BookingWorkflow, DispatcherSettings, InMemoryBookingStore,
    SideEffectDispatcher, SupabaseBookingStore,
};
use messaging_cell::{
    ConsoleNotificationChannel, ConsolePaymentInitiator, HttpPaymentInitiator,
    NotificationChannel, PaymentInitiator, RedisNotificationChannel,
};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting booking API server");

    // Load configuration
    let config = AppConfig::from_env();

    let store = build_store(&config);
    let notifier = build_notifier(&config).await;
    let payments = build_payments(&config);

    let dispatcher = Arc::new(SideEffectDispatcher::spawn(
        notifier,
        payments,
        DispatcherSettings::from_config(&config),
    ));
    let workflow = Arc::new(BookingWorkflow::new(
        store,
        dispatcher.clone(),
        BookingPolicy::from_config(&config),
    ));

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build the application router
    let app = router::create_router(workflow)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    // Run the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, flushing pending side effects");
    dispatcher.shutdown().await;

    Ok(())
}

fn build_store(config: &AppConfig) -> Arc<dyn BookingStore> {
    if config.is_database_configured() {
        info!("Using PostgREST booking store at {}", config.supabase_url);
        Arc::new(SupabaseBookingStore::new(Arc::new(SupabaseClient::new(config))))
    } else {
        warn!("Database not configured, bookings are kept in memory only");
        Arc::new(InMemoryBookingStore::new())
    }
}

async fn build_notifier(config: &AppConfig) -> Arc<dyn NotificationChannel> {
    if config.redis_url.is_none() {
        warn!("REDIS_URL not set, notifications will only be logged");
        return Arc::new(ConsoleNotificationChannel);
    }

    match RedisNotificationChannel::connect(config).await {
        Ok(channel) => Arc::new(channel),
        Err(e) => {
            warn!("Redis unavailable ({}), notifications will only be logged", e);
            Arc::new(ConsoleNotificationChannel)
        }
    }
}

fn build_payments(config: &AppConfig) -> Arc<dyn PaymentInitiator> {
    if !config.is_payment_service_configured() {
        return Arc::new(ConsolePaymentInitiator);
    }

    let timeout = Duration::from_secs(config.side_effect_timeout_seconds.max(1));
    match HttpPaymentInitiator::with_timeout(config.payment_service_url.clone(), timeout) {
        Ok(initiator) => Arc::new(initiator),
        Err(e) => {
            warn!("Payment client could not be built ({}), payment requests will only be logged", e);
            Arc::new(ConsolePaymentInitiator)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
