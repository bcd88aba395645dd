//! Backend request counters
//!
//! - `api_requests_total` (counter): label `status` (HTTP status code, or
//!   `error` when no response arrived)
//!
//! The auth library emits `auth_logins_total` and
//! `auth_token_refreshes_total` itself. Nothing here installs a recorder;
//! without one every call is a no-op.

/// Record a completed backend call.
pub fn record_api_request(status: u16) {
    metrics::counter!("api_requests_total", "status" => status.to_string()).increment(1);
}

/// Record a backend call that failed before a response arrived.
pub fn record_api_error() {
    metrics::counter!("api_requests_total", "status" => "error").increment(1);
}
