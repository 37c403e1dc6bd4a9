use service_core::{
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
    },
    error::AppError,
};

use crate::{
    AppState,
    dtos::{GrantRequest, GrantResponse, LoginRequest, LoginResponse, LogoutRequestView, LogoutResponse},
    models::Service,
    services::Credential,
    utils::ValidatedJson,
};

/// Authenticate and open an SSO session
#[utoipa::path(
    post,
    path = "/v1/tickets",
    request_body = LoginRequest,
    responses(
        (status = 201, description = "Ticket-granting ticket created", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tickets"
)]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let credential = Credential::new(req.username, req.password);
    let tgt = state
        .authority
        .create_ticket_granting_ticket(&credential)
        .await?;
    Ok((StatusCode::CREATED, Json(LoginResponse { tgt_id: tgt.id })))
}

/// Grant a service ticket under an existing SSO session
#[utoipa::path(
    post,
    path = "/v1/tickets/{tgt_id}",
    params(("tgt_id" = String, Path, description = "Ticket-granting ticket id")),
    request_body = GrantRequest,
    responses(
        (status = 201, description = "Service ticket granted", body = GrantResponse),
        (status = 400, description = "Grant refused by policy", body = ErrorResponse),
        (status = 403, description = "Service not authorized", body = ErrorResponse),
        (status = 404, description = "Unknown or expired ticket", body = ErrorResponse),
        (status = 503, description = "No services registered", body = ErrorResponse)
    ),
    tag = "Tickets"
)]
pub async fn grant(
    State(state): State<AppState>,
    Path(tgt_id): Path<String>,
    ValidatedJson(req): ValidatedJson<GrantRequest>,
) -> Result<impl IntoResponse, AppError> {
    let credential = match (req.username, req.password) {
        (Some(username), Some(password)) => Some(Credential::new(username, password)),
        _ => None,
    };
    let st = state
        .authority
        .grant_service_ticket(
            &tgt_id,
            Service::new(req.service),
            req.renew,
            credential.as_ref(),
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(GrantResponse {
            st_id: st.id,
            service: st.service.url,
        }),
    ))
}

/// Destroy an SSO session and run single logout
#[utoipa::path(
    delete,
    path = "/v1/tickets/{tgt_id}",
    params(("tgt_id" = String, Path, description = "Ticket-granting ticket id")),
    responses(
        (status = 200, description = "Session destroyed; logout statuses returned", body = LogoutResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Tickets"
)]
pub async fn destroy(
    State(state): State<AppState>,
    Path(tgt_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // Destruction commits before any logout delivery is attempted; delivery
    // failures are reported in the statuses, never as a request failure.
    let plan = state
        .authority
        .destroy_ticket_granting_ticket(&tgt_id)
        .await?;
    let outcome = state.coordinator.handle(plan).await;

    let requests = outcome
        .requests
        .into_iter()
        .map(|request| LogoutRequestView {
            service: request.service.url,
            status: request.status,
        })
        .collect();
    Ok((
        StatusCode::OK,
        Json(LogoutResponse {
            requests,
            front_channel_session: outcome.front_channel_session,
        }),
    ))
}
