use service_core::{
    axum::{
        Json,
        extract::{Path, State},
        http::StatusCode,
        response::IntoResponse,
    },
    error::AppError,
};

use crate::{AppState, dtos::SaveServiceRequest, models::RegisteredService, utils::ValidatedJson};

/// List every registered service in evaluation order
#[utoipa::path(
    get,
    path = "/v1/services",
    responses(
        (status = 200, description = "Registered services", body = [RegisteredService])
    ),
    tag = "Services"
)]
pub async fn list(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let services = state.catalog.get_all_services().await;
    Ok((StatusCode::OK, Json(services)))
}

/// Create or replace a registered service
#[utoipa::path(
    post,
    path = "/v1/services",
    request_body = SaveServiceRequest,
    responses(
        (status = 201, description = "Service saved", body = RegisteredService),
        (status = 422, description = "Validation error", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "Services"
)]
pub async fn save(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<SaveServiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let saved = state.catalog.save(req.into_service()).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

/// Fetch one registered service by id
#[utoipa::path(
    get,
    path = "/v1/services/{id}",
    params(("id" = u64, Path, description = "Service id")),
    responses(
        (status = 200, description = "Registered service", body = RegisteredService),
        (status = 404, description = "No such service", body = ErrorResponse)
    ),
    tag = "Services"
)]
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, AppError> {
    let service = state
        .catalog
        .get_service(id)
        .await
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("service {id} is not registered")))?;
    Ok((StatusCode::OK, Json(service)))
}

/// Delete a registered service
#[utoipa::path(
    delete,
    path = "/v1/services/{id}",
    params(("id" = u64, Path, description = "Service id")),
    responses(
        (status = 200, description = "Deleted service", body = RegisteredService),
        (status = 404, description = "No such service", body = ErrorResponse)
    ),
    tag = "Services"
)]
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = state
        .catalog
        .delete(id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("service {id} is not registered")))?;
    Ok((StatusCode::OK, Json(deleted)))
}
