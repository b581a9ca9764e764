//! Slack `v0` request signing.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const SLACK_SIGNATURE_HEADER: &str = "x-slack-signature";
pub const SLACK_TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const DEFAULT_SIGNATURE_TOLERANCE_SECONDS: u64 = 300;

const SIGNATURE_VERSION_PREFIX: &str = "v0=";

/// Inputs needed to verify one inbound Slack request.
#[derive(Debug, Clone, Copy)]
pub struct SlackSignatureCheck<'a> {
    pub signing_secret: &'a str,
    pub raw_body: &'a [u8],
    pub signature: Option<&'a str>,
    pub timestamp: Option<&'a str>,
    pub now_unix_seconds: u64,
    pub tolerance_seconds: u64,
}

/// Returns true only when the request is fresh and carries the expected `v0=<hex>` digest.
///
/// Every malformed input (missing header, unparsable timestamp, non-hex digest) yields false.
pub fn verify_slack_signature(check: &SlackSignatureCheck<'_>) -> bool {
    let (Some(signature), Some(timestamp)) = (check.signature, check.timestamp) else {
        return false;
    };
    let Ok(timestamp_seconds) = timestamp.parse::<i64>() else {
        return false;
    };
    let now = i64::try_from(check.now_unix_seconds).unwrap_or(i64::MAX);
    if now.abs_diff(timestamp_seconds) > check.tolerance_seconds {
        return false;
    }

    let Some(digest_hex) = signature.strip_prefix(SIGNATURE_VERSION_PREFIX) else {
        return false;
    };
    let Some(digest) = decode_lower_hex(digest_hex) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(check.signing_secret.as_bytes()) else {
        return false;
    };
    update_base_string(&mut mac, timestamp, check.raw_body);
    mac.verify_slice(&digest).is_ok()
}

/// Produces the `v0=<hex>` header value Slack would send for `raw_body` at `timestamp`.
pub fn sign_slack_request(signing_secret: &str, timestamp: &str, raw_body: &[u8]) -> String {
    let mut mac = match Hmac::<Sha256>::new_from_slice(signing_secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return SIGNATURE_VERSION_PREFIX.to_string(),
    };
    update_base_string(&mut mac, timestamp, raw_body);
    let digest = mac.finalize().into_bytes();
    let mut header = String::with_capacity(SIGNATURE_VERSION_PREFIX.len() + digest.len() * 2);
    header.push_str(SIGNATURE_VERSION_PREFIX);
    for byte in digest {
        header.push_str(&format!("{byte:02x}"));
    }
    header
}

fn update_base_string(mac: &mut Hmac<Sha256>, timestamp: &str, raw_body: &[u8]) {
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(raw_body);
}

// Slack only emits lowercase digests, so uppercase input is rejected rather than normalized.
fn decode_lower_hex(value: &str) -> Option<Vec<u8>> {
    let raw = value.as_bytes();
    if raw.is_empty() || raw.len() % 2 != 0 {
        return None;
    }
    raw.chunks(2)
        .map(|pair| Some(lower_hex_value(pair[0])? << 4 | lower_hex_value(pair[1])?))
        .collect()
}

fn lower_hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
    }
}
