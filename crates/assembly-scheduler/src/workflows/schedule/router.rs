use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use serde_json::json;

use super::grid::ScheduleStore;
use super::notices::Notifier;
use super::service::{BookingService, BookingSubmission, BookingView, ServiceError, SubmissionOutcome};

/// Router exposing booking intake and the reconciliation trigger.
///
/// The service does blocking store and notifier I/O, so handlers run it on
/// the blocking pool.
pub fn booking_router<S, N>(service: Arc<BookingService<S, N>>) -> Router
where
    S: ScheduleStore + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/bookings", post(submit_handler::<S, N>))
        .route("/api/v1/reconcile", post(reconcile_handler::<S, N>))
        .with_state(service)
}

/// Optional body for `POST /api/v1/reconcile`.
#[derive(Debug, Default, Deserialize)]
pub struct ReconcileRequest {
    #[serde(default)]
    pub today: Option<NaiveDate>,
}

pub(crate) async fn submit_handler<S, N>(
    State(service): State<Arc<BookingService<S, N>>>,
    Json(submission): Json<BookingSubmission>,
) -> Response
where
    S: ScheduleStore + 'static,
    N: Notifier + 'static,
{
    let today = Local::now().date_naive();
    let outcome =
        match tokio::task::spawn_blocking(move || service.submit(submission, today)).await {
            Ok(outcome) => outcome,
            Err(err) => return internal_error(err.to_string()),
        };

    match outcome {
        Ok(SubmissionOutcome::Scheduled {
            booking,
            confirmation,
        }) => {
            let payload = json!({
                "status": "scheduled",
                "booking": BookingView::from(&booking),
                "confirmation": confirmation,
            });
            (StatusCode::CREATED, Json(payload)).into_response()
        }
        Ok(SubmissionOutcome::Unscheduled {
            blocks_needed,
            notified,
        }) => {
            let payload = json!({
                "status": "unscheduled",
                "blocks_needed": blocks_needed,
                "notified": notified,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error @ ServiceError::Validation(_)) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response()
        }
        Err(other) => internal_error(other.to_string()),
    }
}

pub(crate) async fn reconcile_handler<S, N>(
    State(service): State<Arc<BookingService<S, N>>>,
    body: Option<Json<ReconcileRequest>>,
) -> Response
where
    S: ScheduleStore + 'static,
    N: Notifier + 'static,
{
    let today = body
        .and_then(|Json(request)| request.today)
        .unwrap_or_else(|| Local::now().date_naive());

    let result = match tokio::task::spawn_blocking(move || service.reconcile(today)).await {
        Ok(result) => result,
        Err(err) => return internal_error(err.to_string()),
    };

    match result {
        Ok(report) => {
            let payload = json!({
                "today": today,
                "rebooked": report.rebooked(),
                "cancelled": report.cancelled(),
                "operator_only": report.operator_only(),
                "report": report,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(err) => internal_error(err.to_string()),
    }
}

fn internal_error(message: String) -> Response {
    let payload = json!({ "error": message });
    (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
}
