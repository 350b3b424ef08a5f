use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::body::Bytes;
use hyper::Response;
use hyper::StatusCode;
use serde_json::json;

use crate::error::{Result, UnderdogError};
use crate::tracker::TrackerStats;

pub(crate) type RespBody = BoxBody<Bytes, hyper::Error>;

fn json_response(status: StatusCode, body: serde_json::Value) -> Result<Response<RespBody>> {
    let body_bytes = serde_json::to_vec(&body)
        .map_err(|e| UnderdogError::Telemetry(format!("Failed to serialize response: {e}")))?;

    let body = Full::new(Bytes::from(body_bytes))
        .map_err(|never| match never {})
        .boxed();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(body)
        .map_err(|e| UnderdogError::Telemetry(format!("Failed to build response: {e}")))
}

/// Health check - reports the shard's port and tracker occupancy
pub fn health_check_response(port: u16, tracker: TrackerStats) -> Result<Response<RespBody>> {
    json_response(
        StatusCode::OK,
        json!({
            "status": "healthy",
            "port": port,
            "logSize": tracker.active,
            "freeSlots": tracker.free,
        }),
    )
}

/// Liveness check - always returns 200 if process is running
pub fn live_check_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::OK, json!({"status": "alive"}))
}

pub fn not_found_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::NOT_FOUND, json!({"status": "not_found"}))
}

/// Returned when the tracker lock is poisoned
pub fn unavailable_response() -> Result<Response<RespBody>> {
    json_response(StatusCode::SERVICE_UNAVAILABLE, json!({"status": "unavailable"}))
}
