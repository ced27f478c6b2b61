use reqwest::Client;
use std::time::Duration;

/// Shared HTTP client. The request timeout bounds a whole oracle round trip;
/// the connect timeout comes from `HTTP_CONNECT_TIMEOUT_SECS`.
pub fn build_client(request_timeout: Duration) -> Client {
    let connect = std::env::var("HTTP_CONNECT_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(5);
    Client::builder()
        .timeout(request_timeout)
        .connect_timeout(Duration::from_secs(connect))
        .build()
        .unwrap_or_else(|_| Client::new())
}
