use axum::http::HeaderValue;
use axum::{extract::Request, middleware::Next, response::Response};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Ensure every request carries a usable id and echo it on the response, so a
/// ticket flow can be followed across services by one header value.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = incoming_id(&req).unwrap_or_else(|| Uuid::new_v4().to_string());

    match HeaderValue::from_str(&request_id) {
        Ok(value) => {
            req.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
            let mut response = next.run(req).await;
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
            response
        }
        Err(_) => next.run(req).await,
    }
}

/// Accept a caller-supplied id only when it is non-empty and of sane length;
/// anything else is replaced rather than propagated.
fn incoming_id(req: &Request) -> Option<String> {
    let id = req.headers().get(REQUEST_ID_HEADER)?.to_str().ok()?.trim();
    if id.is_empty() || id.len() > 128 {
        return None;
    }
    Some(id.to_string())
}
