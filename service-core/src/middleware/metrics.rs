use axum::extract::MatchedPath;
use axum::{extract::Request, middleware::Next, response::Response};
use metrics::{counter, histogram};
use std::time::Instant;

/// Record request count and latency per method, route, and status.
///
/// The route label uses the matched route template (`/v1/tickets/:tgt_id`)
/// rather than the raw path, keeping label cardinality bounded regardless of
/// how many distinct ticket ids pass through.
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let route = route_label(&req);

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    let labels = [("method", method), ("route", route), ("status", status)];

    counter!("http_requests_total", &labels).increment(1);
    histogram!("http_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());

    response
}

fn route_label(req: &Request) -> String {
    match req.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => req.uri().path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_route_label_uses_template_not_raw_path() {
        let captured = std::sync::Arc::new(std::sync::Mutex::new(String::new()));
        let seen = captured.clone();
        let app = Router::new().route(
            "/v1/tickets/:tgt_id",
            get(move |req: Request| {
                *seen.lock().unwrap() = route_label(&req);
                async { "ok" }
            }),
        );

        app.oneshot(
            Request::builder()
                .uri("/v1/tickets/TGT-1-abc")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

        assert_eq!(*captured.lock().unwrap(), "/v1/tickets/:tgt_id");
    }

    #[test]
    fn test_route_label_falls_back_to_path() {
        let req = Request::builder()
            .uri("/unrouted/thing")
            .body(Body::empty())
            .unwrap();
        assert_eq!(route_label(&req), "/unrouted/thing");
    }
}
