//! Shared-secret and HMAC checks for inbound webhooks and admin calls.
//!
//! All comparisons go through `hmac`'s constant-time `verify_slice`.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const SECRET_HEADERS: [&str; 3] = [
    "authorization",
    "x-webhook-secret",
    "x-openpix-authorization",
];

const SIGNATURE_HEADERS: [&str; 3] = [
    "x-openpix-signature",
    "x-signature",
    "x-hub-signature-256",
];

/// Returns `true` if the request carries the configured webhook secret or a
/// valid HMAC-SHA256 signature of `raw_body`.
///
/// Without a configured secret every request is refused.
#[must_use]
pub fn validate_webhook(headers: &HeaderMap, raw_body: &[u8], secret: Option<&str>) -> bool {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return false;
    };

    let secret_valid = first_header(headers, &SECRET_HEADERS)
        .is_some_and(|value| secrets_match(strip_bearer(value), secret));

    let signature_valid = first_header(headers, &SIGNATURE_HEADERS).is_some_and(|value| {
        let candidate = strip_prefix_ignore_case(value.trim(), "sha256=").trim();
        signature_matches(candidate, raw_body, secret)
    });

    secret_valid || signature_valid
}

/// Returns `true` if the `Authorization` header carries `Bearer <expected>`.
///
/// Without a configured token every request is refused.
#[must_use]
pub fn bearer_matches(headers: &HeaderMap, expected: Option<&str>) -> bool {
    let Some(expected) = expected.filter(|s| !s.is_empty()) else {
        return false;
    };
    first_header(headers, &["authorization"])
        .is_some_and(|value| secrets_match(strip_bearer(value), expected))
}

/// Hex-encoded HMAC-SHA256 of `body` keyed by `secret`.
#[must_use]
pub fn sign_body(body: &[u8], secret: &str) -> String {
    hex::encode(mac_for(secret, body).finalize().into_bytes())
}

fn mac_for(secret: &str, data: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length, so this never falls back.
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| HmacSha256::new(&Default::default()));
    mac.update(data);
    mac
}

fn first_header<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|value| value.to_str().ok())
        .find(|value| !value.trim().is_empty())
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> &'a str {
    match value.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => value.get(prefix.len()..).unwrap_or(""),
        _ => value,
    }
}

fn strip_bearer(value: &str) -> &str {
    let trimmed = value.trim();
    match trimmed.get(..7) {
        Some(head) if head.eq_ignore_ascii_case("bearer ") => {
            trimmed.get(7..).unwrap_or("").trim()
        }
        _ => trimmed,
    }
}

/// Constant-time equality: both sides are MACed with the secret and the
/// tags compared with `verify_slice`.
fn secrets_match(candidate: &str, secret: &str) -> bool {
    let expected = mac_for(secret, secret.as_bytes()).finalize().into_bytes();
    mac_for(secret, candidate.as_bytes())
        .verify_slice(&expected)
        .is_ok()
}

fn signature_matches(candidate_hex: &str, body: &[u8], secret: &str) -> bool {
    let Ok(candidate) = hex::decode(candidate_hex) else {
        return false;
    };
    mac_for(secret, body).verify_slice(&candidate).is_ok()
}
