use service_core::error::AppError;
use thiserror::Error;

/// Domain failures of the SSO core. The HTTP layer decides user-visible
/// behavior through the `AppError` conversion.
#[derive(Error, Debug)]
pub enum SsoError {
    /// No services are registered at all. Distinct from a candidate simply
    /// not matching; usually a misconfigured deployment.
    #[error("Service registry is empty")]
    EmptyCatalog,

    #[error("No registered service matched '{0}'")]
    ServiceNotMatched(String),

    #[error("Access to service '{0}' is denied")]
    ServiceAccessDenied(String),

    #[error("Authentication failed")]
    AuthenticationFailure,

    #[error("Invalid ticket '{0}'")]
    InvalidTicket(String),

    #[error("Ticket creation denied: {0}")]
    TicketCreation(String),

    #[error("Service '{0}' is not authorized to participate in single sign-on")]
    UnauthorizedSsoService(String),

    #[error("Logout delivery to '{0}' failed: {1}")]
    LogoutDelivery(String, String),

    #[error("Registry error: {0}")]
    Registry(#[source] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<SsoError> for AppError {
    fn from(err: SsoError) -> Self {
        match err {
            SsoError::EmptyCatalog => {
                AppError::ServiceUnavailable("no services are registered".to_string())
            }
            SsoError::ServiceNotMatched(s) => {
                AppError::Forbidden(anyhow::anyhow!("Service '{}' is not recognized", s))
            }
            SsoError::ServiceAccessDenied(s) => {
                AppError::Forbidden(anyhow::anyhow!("Access to service '{}' is denied", s))
            }
            SsoError::AuthenticationFailure => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            SsoError::InvalidTicket(id) => {
                AppError::NotFound(anyhow::anyhow!("Ticket '{}' is not recognized", id))
            }
            SsoError::TicketCreation(reason) => {
                AppError::BadRequest(anyhow::anyhow!("Ticket creation denied: {}", reason))
            }
            SsoError::UnauthorizedSsoService(s) => AppError::Forbidden(anyhow::anyhow!(
                "Service '{}' does not participate in single sign-on",
                s
            )),
            SsoError::LogoutDelivery(service, reason) => AppError::InternalError(anyhow::anyhow!(
                "Logout delivery to '{}' failed: {}",
                service,
                reason
            )),
            SsoError::Registry(e) => AppError::InternalError(e),
            SsoError::Internal(e) => AppError::InternalError(e),
        }
    }
}
