use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use appointment_cell::{appointment_routes, BookingWorkflow};

pub fn create_router(workflow: Arc<BookingWorkflow>) -> Router {
    Router::new()
        .route("/", get(|| async { "Booking API is running!" }))
        .nest("/appointments", appointment_routes(workflow))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::{Request, StatusCode}};
    use tower::ServiceExt;

    use appointment_cell::{
        BookingPolicy, DispatcherSettings, InMemoryBookingStore, SideEffectDispatcher,
    };
    use messaging_cell::{ConsoleNotificationChannel, ConsolePaymentInitiator};

    #[tokio::test]
    async fn test_liveness_and_nested_routes() {
        let dispatcher = Arc::new(SideEffectDispatcher::spawn(
            Arc::new(ConsoleNotificationChannel),
            Arc::new(ConsolePaymentInitiator),
            DispatcherSettings::default(),
        ));
        let workflow = Arc::new(BookingWorkflow::new(
            Arc::new(InMemoryBookingStore::new()),
            dispatcher,
            BookingPolicy::default(),
        ));
        let app = create_router(workflow);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/appointments/slots?doctor_id=1&specialty=cardio")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
