use axum::{extract::Request, middleware::Next, response::Response};
use std::net::SocketAddr;
use std::time::Instant;
use tracing::info;

/// Request/response logging middleware with latency tracking
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = get_client_ip(&request);
    let started = Instant::now();

    info!(
        target: "docgate::http",
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let response = next.run(request).await;

    let status = response.status();
    info!(
        target: "docgate::http",
        method = %method,
        uri = %uri,
        status = %status,
        latency_ms = started.elapsed().as_millis() as u64,
        "Request completed"
    );

    response
}

/// Proxy headers first, then connection info.
fn get_client_ip(request: &Request) -> String {
    let headers = request.headers();
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        })
        .or_else(|| {
            request
                .extensions()
                .get::<SocketAddr>()
                .map(|addr| addr.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_header_wins_and_takes_first_hop() {
        let mut request = Request::new(axum::body::Body::empty());
        request.headers_mut().insert(
            "x-forwarded-for",
            HeaderValue::from_static("192.168.1.1, 10.0.0.1"),
        );

        let ip = get_client_ip(&request);
        assert_eq!(ip, "192.168.1.1");
    }

    #[test]
    fn real_ip_header_is_used_without_forwarded_for() {
        let mut request = Request::new(axum::body::Body::empty());
        request
            .headers_mut()
            .insert("x-real-ip", HeaderValue::from_static("203.0.113.1"));

        let ip = get_client_ip(&request);
        assert_eq!(ip, "203.0.113.1");
    }

    #[test]
    fn unknown_without_headers_or_connection_info() {
        let request = Request::new(axum::body::Body::empty());
        let ip = get_client_ip(&request);
        assert_eq!(ip, "unknown");
    }
}
