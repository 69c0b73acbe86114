use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

/// True when the client asked for JSON via `Accept`
fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"))
}

/// Error body as `{"msg": ..}` or plain text
pub fn error_response(status: StatusCode, msg: &str, json: bool) -> Response {
    if json {
        let body = serde_json::json!({ "msg": msg });
        (status, Json(body)).into_response()
    } else {
        (
            status,
            [(header::CONTENT_TYPE, "text/plain")],
            msg.to_string(),
        )
            .into_response()
    }
}

pub async fn not_found_handler(headers: HeaderMap) -> Response {
    error_response(StatusCode::NOT_FOUND, "not found", wants_json(&headers))
}
