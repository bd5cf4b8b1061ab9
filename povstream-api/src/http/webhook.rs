// Identity provider webhook
//
// Mirrors user lifecycle events into the local users table. Payloads are
// HMAC-signed over `{id}.{timestamp}.{body}` with a base64 secret; events
// this service does not care about are acknowledged without action so the
// provider stops retrying them.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use povstream_core::models::User;

use super::{AppError, AppResult, AppState};

const SIGNATURE_ID_HEADER: &str = "webhook-id";
const SIGNATURE_TIMESTAMP_HEADER: &str = "webhook-timestamp";
const SIGNATURE_HEADER: &str = "webhook-signature";

/// Accepted clock skew for the signed timestamp, in seconds.
const TIMESTAMP_TOLERANCE: i64 = 300;

#[derive(Debug, Deserialize)]
struct WebhookEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: WebhookUserData,
}

#[derive(Debug, Deserialize)]
struct WebhookUserData {
    id: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<StatusCode> {
    verify_signature(&state.webhook_secret, &headers, &body)?;

    let envelope: WebhookEnvelope = serde_json::from_str(&body)
        .map_err(|e| AppError::bad_request(format!("Malformed webhook payload: {e}")))?;

    let data = envelope.data;
    let username = data.username.unwrap_or_else(|| "anonymous".to_string());
    let avatar_url = data.image_url.unwrap_or_default();

    match envelope.event_type.as_str() {
        "user.created" => {
            let user = User::new(username, avatar_url, data.id.clone());
            state.users.create(&user).await?;
            tracing::info!(external_id = %data.id, "User mirrored from identity provider");
        }
        "user.updated" => {
            state
                .users
                .update_by_external_id(&data.id, &username, &avatar_url)
                .await?;
            tracing::info!(external_id = %data.id, "User mirror updated");
        }
        "user.deleted" => {
            state.users.delete_by_external_id(&data.id).await?;
            tracing::info!(external_id = %data.id, "User mirror deleted");
        }
        other => {
            tracing::debug!(event_type = other, "Ignoring unhandled webhook event");
        }
    }

    Ok(StatusCode::OK)
}

fn verify_signature(secret: &str, headers: &HeaderMap, body: &str) -> AppResult<()> {
    let id = required_header(headers, SIGNATURE_ID_HEADER)?;
    let timestamp = required_header(headers, SIGNATURE_TIMESTAMP_HEADER)?;
    let signatures = required_header(headers, SIGNATURE_HEADER)?;

    let ts: i64 = timestamp
        .parse()
        .map_err(|_| AppError::unauthorized("Invalid webhook timestamp"))?;
    let now = chrono::Utc::now().timestamp();
    if (now - ts).abs() > TIMESTAMP_TOLERANCE {
        return Err(AppError::unauthorized("Webhook timestamp out of tolerance"));
    }

    let key = secret.strip_prefix("whsec_").unwrap_or(secret);
    let key = base64::engine::general_purpose::STANDARD
        .decode(key)
        .map_err(|_| {
            tracing::error!("Webhook secret is not valid base64");
            AppError::internal_server_error("Webhook misconfigured")
        })?;

    let mut mac = Hmac::<Sha256>::new_from_slice(&key)
        .map_err(|_| AppError::internal_server_error("Webhook misconfigured"))?;
    mac.update(format!("{id}.{timestamp}.{body}").as_bytes());
    let expected = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    // Header carries space-separated `v1,<base64>` entries; any match passes.
    let valid = signatures
        .split_whitespace()
        .filter_map(|entry| entry.strip_prefix("v1,"))
        .any(|sig| sig == expected);

    if valid {
        Ok(())
    } else {
        Err(AppError::unauthorized("Invalid webhook signature"))
    }
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> AppResult<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::unauthorized(format!("Missing {name} header")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret_b64: &str, id: &str, ts: &str, body: &str) -> String {
        let key = base64::engine::general_purpose::STANDARD
            .decode(secret_b64)
            .expect("valid base64");
        let mut mac = Hmac::<Sha256>::new_from_slice(&key).expect("key");
        mac.update(format!("{id}.{ts}.{body}").as_bytes());
        base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
    }

    fn signed_headers(secret_b64: &str, body: &str) -> HeaderMap {
        let ts = chrono::Utc::now().timestamp().to_string();
        let sig = sign(secret_b64, "msg_1", &ts, body);
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_ID_HEADER, "msg_1".parse().expect("value"));
        headers.insert(SIGNATURE_TIMESTAMP_HEADER, ts.parse().expect("value"));
        headers.insert(
            SIGNATURE_HEADER,
            format!("v1,{sig}").parse().expect("value"),
        );
        headers
    }

    #[test]
    fn test_valid_signature_passes() {
        let secret = base64::engine::general_purpose::STANDARD.encode(b"topsecret");
        let body = r#"{"type":"user.created","data":{"id":"u1"}}"#;
        let headers = signed_headers(&secret, body);
        verify_signature(&format!("whsec_{secret}"), &headers, body).expect("valid");
    }

    #[test]
    fn test_tampered_body_fails() {
        let secret = base64::engine::general_purpose::STANDARD.encode(b"topsecret");
        let headers = signed_headers(&secret, "original");
        let err = verify_signature(&format!("whsec_{secret}"), &headers, "tampered")
            .expect_err("tampered");
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_stale_timestamp_fails() {
        let secret = base64::engine::general_purpose::STANDARD.encode(b"topsecret");
        let body = "{}";
        let ts = (chrono::Utc::now().timestamp() - 3600).to_string();
        let sig = sign(&secret, "msg_1", &ts, body);
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_ID_HEADER, "msg_1".parse().expect("value"));
        headers.insert(SIGNATURE_TIMESTAMP_HEADER, ts.parse().expect("value"));
        headers.insert(
            SIGNATURE_HEADER,
            format!("v1,{sig}").parse().expect("value"),
        );

        let err = verify_signature(&format!("whsec_{secret}"), &headers, body)
            .expect_err("stale");
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_missing_headers_fail() {
        let err = verify_signature("whsec_c2VjcmV0", &HeaderMap::new(), "{}")
            .expect_err("missing headers");
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
    }
}
