// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};

use crate::handlers;
use crate::services::booking::BookingWorkflow;

pub fn appointment_routes(workflow: Arc<BookingWorkflow>) -> Router {
    Router::new()
        .route("/", post(handlers::book_appointment))
        .route(
            "/slots",
            get(handlers::list_available_slots).post(handlers::publish_schedule),
        )
        .route(
            "/{appointment_id}",
            get(handlers::get_appointment).delete(handlers::cancel_appointment),
        )
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/status", put(handlers::update_appointment_status))
        .with_state(workflow)
}
