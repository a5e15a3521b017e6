//! HMAC-SHA256 webhook signatures.
//!
//! The signed message is `"{unix_timestamp}.{raw_body}"` and the header value
//! is `t=<timestamp>,v1=<hex digest>`.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::types::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature on outbound deliveries.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";

fn mac_for(payload: &[u8], secret: &str, timestamp: i64) -> Result<HmacSha256, WebhookError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| WebhookError::InvalidKey)?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Sign `payload` at `timestamp`, returning the header value.
pub fn sign(payload: &[u8], secret: &str, timestamp: i64) -> Result<String, WebhookError> {
    let digest = mac_for(payload, secret, timestamp)?.finalize().into_bytes();
    Ok(format!("t={},v1={}", timestamp, hex::encode(digest)))
}

fn parse_header(header: &str) -> Result<(i64, Vec<u8>), WebhookError> {
    let mut timestamp = None;
    let mut digest = None;

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = Some(value.parse::<i64>().map_err(|_| WebhookError::MalformedHeader)?)
            }
            Some(("v1", value)) => {
                digest = Some(hex::decode(value).map_err(|_| WebhookError::MalformedHeader)?)
            }
            _ => {}
        }
    }

    match (timestamp, digest) {
        (Some(t), Some(d)) => Ok((t, d)),
        _ => Err(WebhookError::MalformedHeader),
    }
}

/// Verify a signature header against `payload` as of `now`.
///
/// Rejects timestamps more than `max_age_secs` away from `now` in either
/// direction. The digest comparison is constant-time.
pub fn verify(
    payload: &[u8],
    header: &str,
    secret: &str,
    max_age_secs: i64,
    now: i64,
) -> Result<(), WebhookError> {
    let (timestamp, digest) = parse_header(header)?;

    // `t` is caller-controlled, so the distance must not overflow.
    if now.abs_diff(timestamp) > max_age_secs.unsigned_abs() {
        return Err(WebhookError::Expired {
            age_secs: now.saturating_sub(timestamp),
        });
    }

    mac_for(payload, secret, timestamp)?
        .verify_slice(&digest)
        .map_err(|_| WebhookError::Mismatch)
}

/// [`verify`] against the current wall clock.
pub fn verify_now(
    payload: &[u8],
    header: &str,
    secret: &str,
    max_age_secs: i64,
) -> Result<(), WebhookError> {
    verify(payload, header, secret, max_age_secs, Utc::now().timestamp())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_704_067_200;
    const BODY: &[u8] = br#"{"event":"job.completed","job_id":"job_0123456789ab"}"#;

    #[test]
    fn test_sign_format() {
        let header = sign(BODY, SECRET, NOW).unwrap();
        let (t, v1) = header.split_once(',').unwrap();
        assert_eq!(t, format!("t={}", NOW));
        assert!(v1.starts_with("v1="));
        assert_eq!(v1.len(), 3 + 64);
    }

    #[test]
    fn test_sign_is_deterministic() {
        assert_eq!(sign(BODY, SECRET, NOW).unwrap(), sign(BODY, SECRET, NOW).unwrap());
        assert_ne!(
            sign(BODY, SECRET, NOW).unwrap(),
            sign(BODY, SECRET, NOW + 1).unwrap()
        );
    }

    #[test]
    fn test_verify_roundtrip() {
        let header = sign(BODY, SECRET, NOW).unwrap();
        assert_eq!(verify(BODY, &header, SECRET, 300, NOW), Ok(()));
        assert_eq!(verify(BODY, &header, SECRET, 300, NOW + 300), Ok(()));
    }

    #[test]
    fn test_verify_rejects_stale_signature() {
        let header = sign(BODY, SECRET, NOW - 301).unwrap();
        assert_eq!(
            verify(BODY, &header, SECRET, 300, NOW),
            Err(WebhookError::Expired { age_secs: 301 })
        );
    }

    #[test]
    fn test_verify_rejects_future_signature() {
        let header = sign(BODY, SECRET, NOW + 301).unwrap();
        assert!(matches!(
            verify(BODY, &header, SECRET, 300, NOW),
            Err(WebhookError::Expired { .. })
        ));
    }

    #[test]
    fn test_verify_rejects_extreme_timestamps() {
        for t in [i64::MIN, i64::MAX, -1] {
            let header = format!("t={},v1=00", t);
            assert!(
                matches!(
                    verify(BODY, &header, SECRET, 300, NOW),
                    Err(WebhookError::Expired { .. })
                ),
                "t = {}",
                t
            );
        }

        let header = format!("t={},v1=00", i64::MIN);
        assert_eq!(
            verify(BODY, &header, SECRET, 300, NOW),
            Err(WebhookError::Expired { age_secs: i64::MAX })
        );
    }

    #[test]
    fn test_verify_rejects_mutated_payload() {
        let header = sign(BODY, SECRET, NOW).unwrap();
        let mut mutated = BODY.to_vec();
        mutated[10] ^= 0x01;
        assert_eq!(
            verify(&mutated, &header, SECRET, 300, NOW),
            Err(WebhookError::Mismatch)
        );
    }

    #[test]
    fn test_verify_rejects_wrong_secret() {
        let header = sign(BODY, SECRET, NOW).unwrap();
        assert_eq!(
            verify(BODY, &header, "other", 300, NOW),
            Err(WebhookError::Mismatch)
        );
    }

    #[test]
    fn test_verify_rejects_malformed_header() {
        for header in ["", "t=abc,v1=00", "t=1", "v1=zz,t=1", "garbage"] {
            assert_eq!(
                verify(BODY, header, SECRET, 300, NOW),
                Err(WebhookError::MalformedHeader),
                "header {:?}",
                header
            );
        }
    }

    #[test]
    fn test_verify_now_accepts_fresh_signature() {
        let header = sign(BODY, SECRET, Utc::now().timestamp()).unwrap();
        assert!(verify_now(BODY, &header, SECRET, 300).is_ok());
    }
}
