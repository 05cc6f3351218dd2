//! Controller for the internal event publish endpoint.
//!
//! Marketplace producers (listing CRUD, messaging, checkout) POST the domain
//! events they emit here; the event pipeline fans them out to the connected
//! streams. The endpoint sits under `/internal` because it is reached only
//! from inside the deployment, never from browsers.

use crate::controller::ApiResponse;
use crate::{AppState, Error};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use events::DomainEvent;
use log::*;

/// POST publish a domain event into the realtime fan-out pipeline
#[utoipa::path(
    post,
    path = "/internal/events",
    request_body = DomainEvent,
    responses(
        (status = 202, description = "Event accepted and handed to every registered handler"),
        (status = 400, description = "Body is not parseable JSON"),
        (status = 422, description = "Body does not describe a known domain event"),
        (status = 405, description = "Method not allowed")
    )
)]
pub async fn publish(
    State(app_state): State<AppState>,
    payload: Result<Json<DomainEvent>, JsonRejection>,
) -> Result<impl IntoResponse, Error> {
    let Json(event) = payload?;

    debug!("POST Publish a DomainEvent: {event:?}");

    // Handlers run to completion before the producer gets its 202, so a
    // producer that awaits the response knows fan-out already happened.
    app_state.event_publisher.publish(event).await;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::<()>::no_content(StatusCode::ACCEPTED.into())),
    ))
}
