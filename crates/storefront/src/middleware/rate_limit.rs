//! Rate limiting middleware using governor and `tower_governor`.
//!
//! - `auth_rate_limiter`: strict limits for login and registration (~10/min)
//! - `api_rate_limiter`: relaxed limits for the rest of the API (~100/min)
//!
//! The payment notification endpoint is not rate limited; Midtrans retries
//! on any non-2xx response.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::extract::ConnectInfo;
use axum::http::Request;
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

/// Proxy headers that carry the real client IP, most trusted first.
const CLIENT_IP_HEADERS: [&str; 2] = ["cf-connecting-ip", "x-real-ip"];

/// Key extractor that reads the client IP from reverse-proxy headers.
///
/// Checks `CF-Connecting-IP`, then `X-Real-IP`, then the first address in
/// `X-Forwarded-For`, then the peer address when the server was started with
/// connect info.
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();

        for name in CLIENT_IP_HEADERS {
            if let Some(ip) = headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
            {
                return Ok(ip);
            }
        }

        headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| s.trim().parse::<IpAddr>().ok())
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|info| info.0.ip())
            })
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Create rate limiter for auth endpoints: ~10 requests per minute per IP.
///
/// 1 request every 6 seconds, burst of 5.
///
/// # Panics
///
/// Does not panic: `per_second(6)` and `burst_size(5)` are always accepted
/// by `GovernorConfigBuilder`.
#[must_use]
pub fn auth_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(6)
        .burst_size(5)
        .finish()
        .expect("rate limiter config with per_second(6) and burst_size(5) is valid");
    GovernorLayer::new(Arc::new(config))
}

/// Create rate limiter for the general API: ~100 requests per minute per IP.
///
/// # Panics
///
/// Does not panic: `per_second(1)` and `burst_size(50)` are always accepted
/// by `GovernorConfigBuilder`.
#[must_use]
pub fn api_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(1)
        .burst_size(50)
        .finish()
        .expect("rate limiter config with per_second(1) and burst_size(50) is valid");
    GovernorLayer::new(Arc::new(config))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tower_governor::key_extractor::KeyExtractor;

    use super::*;

    fn extract(headers: &[(&str, &str)]) -> Option<IpAddr> {
        let mut builder = Request::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        ClientIpKeyExtractor
            .extract(&builder.body(()).unwrap())
            .ok()
    }

    #[test]
    fn test_cloudflare_header_wins() {
        let ip = extract(&[
            ("x-forwarded-for", "10.0.0.1, 10.0.0.2"),
            ("cf-connecting-ip", "203.0.113.9"),
        ]);
        assert_eq!(ip, Some("203.0.113.9".parse().unwrap()));
    }

    #[test]
    fn test_forwarded_for_first_hop() {
        let ip = extract(&[("x-forwarded-for", "198.51.100.4, 10.0.0.2")]);
        assert_eq!(ip, Some("198.51.100.4".parse().unwrap()));
    }

    #[test]
    fn test_peer_address_fallback() {
        let mut request = Request::builder().body(()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo("192.0.2.7:51000".parse::<SocketAddr>().unwrap()));
        assert_eq!(
            ClientIpKeyExtractor.extract(&request).ok(),
            Some("192.0.2.7".parse().unwrap())
        );
    }

    #[test]
    fn test_no_headers() {
        assert_eq!(extract(&[]), None);
        assert_eq!(extract(&[("x-real-ip", "not-an-ip")]), None);
    }
}
