//! HTTP delivery for the Webhook Pipeline (C9): payload canonicalization,
//! HMAC-SHA256 signing, and the POST itself. Retry bookkeeping (attempt
//! counts, `next_retry_at`) is state that belongs to the `WebhookDelivery`
//! row and lives in the repository layer; this module only knows how to
//! take one attempt and report what happened.

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// `{event, timestamp, data}`, serialized with sorted keys so the same
/// logical payload always signs to the same bytes.
#[derive(Debug, Serialize)]
struct SignedPayload<'a, T: Serialize> {
    event: &'a str,
    timestamp: String,
    data: &'a T,
}

/// Canonicalize a webhook payload to the exact bytes that get signed and
/// sent. Keys are sorted (`serde_json::to_value` + `BTreeMap` round-trip)
/// so formatting never drifts between what was signed and what was sent.
pub fn canonicalize_payload<T: Serialize>(
    event_type: &str,
    timestamp: chrono::DateTime<chrono::Utc>,
    data: &T,
) -> Result<String, serde_json::Error> {
    let payload = SignedPayload { event: event_type, timestamp: timestamp.to_rfc3339(), data };
    let value = serde_json::to_value(&payload)?;
    let sorted: std::collections::BTreeMap<String, serde_json::Value> =
        serde_json::from_value(value)?;
    serde_json::to_string(&sorted)
}

/// `hex(hmac_sha256(secret, payload))`, unprefixed. Callers send it as
/// `X-Webhook-Signature: sha256=<signature>`.
pub fn sign(payload: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time verification, for consumers that want to validate their
/// own inbound webhooks in tests or examples.
pub fn verify(payload: &str, secret: &str, signature: &str) -> bool {
    let expected = sign(payload, secret);
    let (a, b) = (expected.as_bytes(), signature.as_bytes());
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[derive(Debug, Clone)]
pub struct DeliveryAttempt {
    pub status_code: Option<u16>,
    pub response_snippet: String,
    pub succeeded: bool,
}

/// Thin `reqwest` wrapper, mirroring the single-purpose connection-wrapper
/// shape: one client, one method that does the whole round trip.
#[derive(Clone)]
pub struct WebhookSender {
    client: reqwest::Client,
}

impl WebhookSender {
    pub fn new(request_timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .expect("reqwest client builds with a fixed timeout");
        Self { client }
    }

    /// POST a signed payload to `url`. Never returns `Err` for an HTTP-level
    /// failure (4xx/5xx/timeout/connection refused) — those are reported as
    /// `succeeded: false` in the returned [`DeliveryAttempt`] so the caller
    /// can schedule a retry. `Err` is reserved for payload construction bugs.
    pub async fn deliver(
        &self,
        url: &str,
        payload: &str,
        signature: &str,
        event_type: &str,
        delivery_id: uuid::Uuid,
    ) -> DeliveryAttempt {
        let result = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("User-Agent", "IdentityControlPlane-Webhook/1.0")
            .header("X-Webhook-Signature", format!("sha256={signature}"))
            .header("X-Webhook-Event", event_type)
            .header("X-Webhook-Delivery", delivery_id.to_string())
            .body(payload.to_string())
            .send()
            .await;

        match result {
            Ok(response) => {
                let status_code = response.status().as_u16();
                let succeeded = response.status().is_success();
                let body = response.text().await.unwrap_or_default();
                let response_snippet = body.chars().take(1000).collect();
                DeliveryAttempt { status_code: Some(status_code), response_snippet, succeeded }
            }
            Err(e) => DeliveryAttempt {
                status_code: None,
                response_snippet: e.to_string().chars().take(1000).collect(),
                succeeded: false,
            },
        }
    }
}

/// `RETRY_DELAYS[min(attempt - 1, RETRY_DELAYS.len() - 1)]`, attempt being
/// the 1-indexed attempt number that just failed.
pub fn next_retry_delay(attempt: u32, retry_delays_seconds: &[u64]) -> Duration {
    let idx = (attempt.saturating_sub(1) as usize).min(retry_delays_seconds.len().saturating_sub(1));
    Duration::from_secs(retry_delays_seconds.get(idx).copied().unwrap_or(7200))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify_round_trips() {
        let payload = r#"{"data":{},"event":"memory.created","timestamp":"2026-01-01T00:00:00Z"}"#;
        let sig = sign(payload, "s3cr3t");
        assert!(verify(payload, "s3cr3t", &sig));
        assert!(!verify(payload, "wrong", &sig));
    }

    #[test]
    fn retry_delay_clamps_to_last_entry_beyond_table_length() {
        let delays = [60, 300, 900, 3600, 7200];
        assert_eq!(next_retry_delay(1, &delays), Duration::from_secs(60));
        assert_eq!(next_retry_delay(5, &delays), Duration::from_secs(7200));
        assert_eq!(next_retry_delay(99, &delays), Duration::from_secs(7200));
    }

    #[test]
    fn canonicalize_sorts_top_level_keys() {
        let json = canonicalize_payload("memory.created", chrono::Utc::now(), &serde_json::json!({"b": 1, "a": 2}))
            .unwrap();
        let data_pos = json.find("\"data\"").unwrap();
        let event_pos = json.find("\"event\"").unwrap();
        assert!(data_pos < event_pos);
    }
}
