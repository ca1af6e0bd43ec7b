// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AvailableSlotsQuery, BookAppointmentRequest, PublishScheduleRequest,
    UpdateStatusQuery,
};
use crate::services::booking::BookingWorkflow;

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::NotFound(_) => AppError::NotFound("Appointment not found".to_string()),
            AppointmentError::Conflict(msg) => AppError::Conflict(msg),
            AppointmentError::ValidationError(msg) => AppError::ValidationError(msg),
            AppointmentError::InvalidStatusTransition { from, to } => {
                AppError::BadRequest(format!("Cannot move appointment from {} to {}", from, to))
            }
            AppointmentError::Storage(err) => AppError::Database(err.to_string()),
        }
    }
}

// ==============================================================================
// APPOINTMENT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(workflow): State<Arc<BookingWorkflow>>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let appointment = workflow.book(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": appointment,
            "message": "Appointment booked successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(workflow): State<Arc<BookingWorkflow>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = workflow
        .get_by_id(appointment_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Appointment not found".to_string()))?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(workflow): State<Arc<BookingWorkflow>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = workflow.cancel(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled successfully"
    })))
}

/// Status callback, also used by the payment service once a charge clears.
#[axum::debug_handler]
pub async fn update_appointment_status(
    State(workflow): State<Arc<BookingWorkflow>>,
    Path(appointment_id): Path<Uuid>,
    Query(query): Query<UpdateStatusQuery>,
) -> Result<Json<Value>, AppError> {
    let appointment = workflow.set_status(appointment_id, query.status).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment status updated successfully"
    })))
}

// ==============================================================================
// SLOT HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_available_slots(
    State(workflow): State<Arc<BookingWorkflow>>,
    Query(query): Query<AvailableSlotsQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = workflow.list_available(query.doctor_id, &query.specialty).await?;

    Ok(Json(json!({
        "slots": slots,
        "total": slots.len()
    })))
}

#[axum::debug_handler]
pub async fn publish_schedule(
    State(workflow): State<Arc<BookingWorkflow>>,
    Json(request): Json<PublishScheduleRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let slots = workflow.publish_schedule(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "slots": slots,
            "message": format!("{} slot(s) published", slots.len())
        })),
    ))
}
