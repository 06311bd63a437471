use axum::{
    body::{Body, Bytes},
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};

/// Wraps every `/api` response in the `{success, data | error}` envelope.
pub async fn wrap_response_middleware(req: Request, next: Next) -> Result<Response, StatusCode> {
    let path = req.uri().path().to_string();
    let res = next.run(req).await;

    if !path.starts_with("/api") {
        return Ok(res);
    }

    let status = res.status();
    let is_json = res
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|h| h.to_str().ok())
        .map_or(false, |ct| ct.contains("application/json"));

    let (mut parts, body) = res.into_parts();

    let bytes = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) => {
            tracing::error!("Failed to read response body for {}: {}", path, e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let wrapped = envelope(status, is_json, &bytes);
    let new_bytes = serde_json::to_vec(&wrapped).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    parts.headers.insert(header::CONTENT_LENGTH, HeaderValue::from(new_bytes.len()));

    Ok(Response::from_parts(parts, Body::from(new_bytes)))
}

pub(crate) fn envelope(status: StatusCode, is_json: bool, bytes: &Bytes) -> Value {
    if !is_json {
        let msg = String::from_utf8_lossy(bytes).to_string();
        return if status.is_success() {
            if msg.is_empty() {
                json!({ "success": true, "data": null })
            } else {
                json!({ "success": true, "data": msg })
            }
        } else {
            json!({
                "success": false,
                "error": if msg.is_empty() { status.to_string() } else { msg }
            })
        };
    }

    let data: Value = serde_json::from_slice(bytes).unwrap_or(Value::Null);

    // Error bodies from ZafesysError already carry the envelope
    if data.get("success").map_or(false, Value::is_boolean) {
        return data;
    }

    if status.is_success() {
        json!({ "success": true, "data": data })
    } else {
        let error = data
            .as_str()
            .or_else(|| data.get("error").and_then(|v| v.as_str()))
            .map(str::to_string)
            .unwrap_or_else(|| status.to_string());
        json!({ "success": false, "error": error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_json_is_wrapped() {
        let body = Bytes::from_static(br#"{"id":7,"status":"pending"}"#);
        let wrapped = envelope(StatusCode::OK, true, &body);
        assert_eq!(wrapped["success"], true);
        assert_eq!(wrapped["data"]["id"], 7);
    }

    #[test]
    fn test_existing_envelope_passes_through() {
        let body = Bytes::from_static(br#"{"success":false,"error":"Lead not found"}"#);
        let wrapped = envelope(StatusCode::NOT_FOUND, true, &body);
        assert_eq!(wrapped, json!({ "success": false, "error": "Lead not found" }));
    }

    #[test]
    fn test_plain_text_rejection_becomes_error() {
        // axum's own extractor rejections are text/plain
        let body = Bytes::from_static(b"Failed to parse the request body as JSON");
        let wrapped = envelope(StatusCode::BAD_REQUEST, false, &body);
        assert_eq!(wrapped["success"], false);
        assert_eq!(wrapped["error"], "Failed to parse the request body as JSON");
    }

    #[test]
    fn test_empty_success_has_null_data() {
        let wrapped = envelope(StatusCode::NO_CONTENT, false, &Bytes::new());
        assert_eq!(wrapped, json!({ "success": true, "data": null }));
    }
}
