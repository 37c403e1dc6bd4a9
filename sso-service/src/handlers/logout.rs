use service_core::{
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
    },
    error::AppError,
};

use crate::{AppState, dtos::FrontChannelResponse, services::FrontChannelStep};

/// Advance a front-channel logout session by one redirect
#[utoipa::path(
    get,
    path = "/v1/logout/{session_id}/next",
    params(("session_id" = String, Path, description = "Front-channel logout session id")),
    responses(
        (status = 200, description = "Next redirect, or finished", body = FrontChannelResponse)
    ),
    tag = "Logout"
)]
pub async fn next_front_channel(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let response = match state.coordinator.next_front_channel(&session_id) {
        FrontChannelStep::Redirect { url, message } => FrontChannelResponse {
            finished: false,
            url: Some(url),
            message: Some(message),
        },
        FrontChannelStep::Finished => FrontChannelResponse {
            finished: true,
            url: None,
            message: None,
        },
    };
    Ok((StatusCode::OK, Json(response)))
}
