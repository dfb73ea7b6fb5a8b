/// Access-token claim decoding and expiry evaluation
use crate::store::TokenStorage;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Claims decoded from the access token's payload segment.
///
/// Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedClaims {
    pub subject_id: String,
    pub email: Option<String>,
    pub issued_at: u64,
    pub expires_at: u64,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ClaimsError {
    #[error("token has no payload segment")]
    MissingPayload,

    #[error("payload segment is not valid base64")]
    InvalidBase64,

    #[error("payload is not a valid claims object: {0}")]
    InvalidJson(String),
}

/// Session state derived from the stored pair plus the wall clock.
///
/// Re-evaluated on every check; there is no cached logged-in flag that
/// could drift from token presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticated,
    Expired,
}

#[derive(Deserialize)]
struct RawClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    iat: u64,
    exp: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

/// Decode the claims of a bearer token.
///
/// Splits on the structural delimiter, base64-decodes the payload
/// segment, and parses it as JSON. Malformed input of any kind yields
/// a typed error; this function never panics.
pub fn decode(token: &str) -> Result<DecodedClaims, ClaimsError> {
    let payload = token.split('.').nth(1).ok_or(ClaimsError::MissingPayload)?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| ClaimsError::InvalidBase64)?;

    let raw: RawClaims =
        serde_json::from_slice(&bytes).map_err(|e| ClaimsError::InvalidJson(e.to_string()))?;

    Ok(DecodedClaims {
        subject_id: raw.sub,
        email: raw.email,
        issued_at: raw.iat,
        expires_at: raw.exp,
    })
}

/// Whether the token is expired.
///
/// An undecodable token counts as expired. `skew_secs` extends the
/// accepted lifetime to tolerate clock drift; the default configuration
/// uses zero, a deliberate simplification callers may harden.
pub fn is_expired(token: &str, skew_secs: u64) -> bool {
    match decode(token) {
        Ok(claims) => claims.expires_at.saturating_add(skew_secs) <= now_secs(),
        Err(_) => true,
    }
}

/// Whether the token's remaining lifetime is below `threshold_secs`.
///
/// Used by the proactive timer to refresh before hard expiry. Already
/// expired or undecodable tokens also report true.
pub fn is_expiring_soon(token: &str, threshold_secs: u64) -> bool {
    match decode(token) {
        Ok(claims) => claims.expires_at <= now_secs().saturating_add(threshold_secs),
        Err(_) => true,
    }
}

/// Derive the current session state from storage.
pub fn session_state<S: TokenStorage + ?Sized>(storage: &S, skew_secs: u64) -> SessionState {
    match storage.current_pair() {
        None => SessionState::Anonymous,
        Some(pair) => {
            if is_expired(&pair.access_token, skew_secs) {
                SessionState::Expired
            } else {
                SessionState::Authenticated
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_tokens::{token_with_claims, token_with_exp};
    use super::*;
    use crate::store::{MemoryStorage, TokenPair};

    #[test]
    fn test_decode_valid_token() {
        let token = token_with_exp(1_900_000_000);
        let claims = decode(&token).unwrap();

        assert_eq!(claims.subject_id, "user-1");
        assert_eq!(claims.email, Some("ada@example.com".to_string()));
        assert_eq!(claims.expires_at, 1_900_000_000);
    }

    #[test]
    fn test_decode_failures_are_typed() {
        assert_eq!(decode("no-delimiter"), Err(ClaimsError::MissingPayload));
        assert_eq!(decode("a.$$$.c"), Err(ClaimsError::InvalidBase64));

        let not_json = format!("h.{}.s", URL_SAFE_NO_PAD.encode("not json"));
        assert!(matches!(decode(&not_json), Err(ClaimsError::InvalidJson(_))));

        // Valid JSON but missing the exp claim
        let no_exp = token_with_claims(r#"{"sub":"user-1"}"#);
        assert!(matches!(decode(&no_exp), Err(ClaimsError::InvalidJson(_))));
    }

    #[test]
    fn test_is_expired_truth_table() {
        let now = now_secs();

        assert!(is_expired(&token_with_exp(now - 10), 0));
        assert!(is_expired(&token_with_exp(now), 0));
        assert!(!is_expired(&token_with_exp(now + 3600), 0));

        // Undecodable tokens count as expired
        assert!(is_expired("garbage", 0));
    }

    #[test]
    fn test_skew_tolerance_extends_lifetime() {
        let now = now_secs();
        let token = token_with_exp(now - 10);

        assert!(is_expired(&token, 0));
        assert!(!is_expired(&token, 60));
    }

    #[test]
    fn test_extreme_claim_values_do_not_overflow() {
        let far = token_with_exp(u64::MAX);

        assert!(!is_expired(&far, 60));
        assert!(is_expiring_soon(&far, u64::MAX));
        assert!(is_expiring_soon(&token_with_exp(60), u64::MAX));
    }

    #[test]
    fn test_is_expiring_soon() {
        let now = now_secs();

        assert!(is_expiring_soon(&token_with_exp(now + 60), 300));
        assert!(!is_expiring_soon(&token_with_exp(now + 3600), 300));
        assert!(is_expiring_soon(&token_with_exp(now - 10), 300));
        assert!(is_expiring_soon("garbage", 300));
    }

    #[test]
    fn test_session_state_derivation() {
        let storage = MemoryStorage::new();
        assert_eq!(session_state(&storage, 0), SessionState::Anonymous);

        let now = now_secs();
        storage
            .save_pair(&TokenPair::new(token_with_exp(now + 3600), "r1"))
            .unwrap();
        assert_eq!(session_state(&storage, 0), SessionState::Authenticated);

        storage
            .save_pair(&TokenPair::new(token_with_exp(now - 10), "r1"))
            .unwrap();
        assert_eq!(session_state(&storage, 0), SessionState::Expired);
    }
}
