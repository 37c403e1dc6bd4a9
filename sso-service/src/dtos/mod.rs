use crate::models::{LogoutStatus, RegisteredService};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    #[schema(example = "service ticket is invalid or expired")]
    pub error: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    #[schema(example = "casuser")]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "Mellon")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    #[schema(example = "TGT-1-k3J9x2mQ7fLp0aYbWc4d")]
    pub tgt_id: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct GrantRequest {
    #[validate(length(min = 1, message = "Service URL is required"))]
    #[schema(example = "https://app.example.org/login")]
    pub service: String,

    /// Demand fresh credentials even though an SSO session exists
    #[serde(default)]
    pub renew: bool,

    #[schema(example = "casuser")]
    pub username: Option<String>,

    #[schema(example = "Mellon")]
    pub password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GrantResponse {
    #[schema(example = "ST-7-p2Qw9xKd5mRv1cTj8bHn")]
    pub st_id: String,
    #[schema(example = "https://app.example.org/login")]
    pub service: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema, IntoParams)]
pub struct ValidateParams {
    #[validate(length(min = 1, message = "Ticket is required"))]
    #[param(example = "ST-7-p2Qw9xKd5mRv1cTj8bHn")]
    pub ticket: String,

    #[validate(length(min = 1, message = "Service URL is required"))]
    #[param(example = "https://app.example.org/login")]
    pub service: String,

    /// Accept only tickets minted from fresh credentials
    #[serde(default)]
    pub renew: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidateResponse {
    #[schema(example = "casuser")]
    pub user: String,
    pub attributes: HashMap<String, Vec<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutRequestView {
    #[schema(example = "https://app.example.org/login")]
    pub service: String,
    pub status: LogoutStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub requests: Vec<LogoutRequestView>,
    /// Present when front-channel logout steps remain to be driven
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "0e7f9c3a-5b1d-4f7e-9a2c-8d6b4e1f0a3c")]
    pub front_channel_session: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FrontChannelResponse {
    pub finished: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "https://app.example.org/logout")]
    pub url: Option<String>,
    /// Base64-encoded logout message to attach to the redirect
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SaveServiceRequest {
    /// Existing id for replace, omitted for create
    #[serde(default)]
    pub id: Option<u64>,

    #[validate(length(min = 1, message = "Name is required"))]
    #[schema(example = "Example App")]
    pub name: String,

    #[validate(length(min = 1, message = "Service id expression is required"))]
    #[schema(example = "^https://app\\.example\\.org/.*")]
    pub service_id: String,

    #[serde(default)]
    pub evaluation_order: i32,

    #[serde(default)]
    pub access_strategy: crate::models::AccessStrategy,

    #[serde(default)]
    pub expiration_policy: crate::models::ServiceExpirationPolicy,

    #[serde(default)]
    pub logout_type: crate::models::LogoutType,

    #[schema(example = "https://app.example.org/logout")]
    pub logout_url: Option<String>,

    pub description: Option<String>,
}

impl SaveServiceRequest {
    pub fn into_service(self) -> RegisteredService {
        let mut service = RegisteredService::new(self.name, self.service_id);
        service.id = self.id.unwrap_or(0);
        service.evaluation_order = self.evaluation_order;
        service.access_strategy = self.access_strategy;
        service.expiration_policy = self.expiration_policy;
        service.logout_type = self.logout_type;
        service.logout_url = self.logout_url;
        service.description = self.description;
        service
    }
}
