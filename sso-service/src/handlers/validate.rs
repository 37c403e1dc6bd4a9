use service_core::{
    axum::{Json, extract::Query, extract::State, http::StatusCode, response::IntoResponse},
    error::AppError,
};
use validator::Validate;

use crate::{
    AppState,
    dtos::{ValidateParams, ValidateResponse},
    models::Service,
};

/// Validate and consume a service ticket
#[utoipa::path(
    get,
    path = "/v1/serviceValidate",
    params(ValidateParams),
    responses(
        (status = 200, description = "Ticket valid; principal returned", body = ValidateResponse),
        (status = 404, description = "Ticket invalid, expired, or already consumed", body = ErrorResponse),
        (status = 422, description = "Validation error", body = ErrorResponse)
    ),
    tag = "Tickets"
)]
pub async fn service_validate(
    State(state): State<AppState>,
    Query(params): Query<ValidateParams>,
) -> Result<impl IntoResponse, AppError> {
    params.validate()?;
    let principal = state
        .authority
        .validate_service_ticket(&params.ticket, &Service::new(params.service), params.renew)
        .await?;
    Ok((
        StatusCode::OK,
        Json(ValidateResponse {
            user: principal.id,
            attributes: principal.attributes,
        }),
    ))
}
