//! PKCE (Proof Key for Code Exchange) primitives per RFC 7636
//!
//! Random `state`/`code_verifier` generation, the S256 challenge transform,
//! the authorization URL builder and the constant-time comparison used to
//! check the `state` round-tripped through the browser redirect.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngExt;
use sha2::{Digest, Sha256};

/// Length of the `state` parameter.
pub const STATE_LENGTH: usize = 32;

/// Length of the PKCE code verifier (RFC 7636 allows 43-128).
pub const CODE_VERIFIER_LENGTH: usize = 64;

/// Generate a URL-safe base64 string of exactly `length` characters.
///
/// Draws `ceil(length * 3 / 4)` bytes from the thread-local CSPRNG (seeded
/// from the operating system) and truncates the unpadded base64url encoding.
/// There is no non-cryptographic fallback: rand panics if the OS source
/// cannot seed the generator.
pub fn generate_random_string(length: usize) -> String {
    let byte_len = (length * 3).div_ceil(4).max(1);
    let mut bytes = vec![0u8; byte_len];
    rand::rng().fill(bytes.as_mut_slice());
    let mut encoded = URL_SAFE_NO_PAD.encode(&bytes);
    encoded.truncate(length);
    encoded
}

/// Compute the S256 code challenge from a verifier.
///
/// `challenge = BASE64URL(SHA256(verifier))`, padding stripped.
pub fn compute_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Compare two strings without short-circuiting on the first differing byte.
///
/// Length mismatch returns early; the length of `state` is public.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Parameters of the browser authorization redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest<'a> {
    pub authorize_url: &'a str,
    pub client_id: &'a str,
    pub redirect_uri: &'a str,
    pub scope: &'a str,
    pub state: &'a str,
    pub code_challenge: &'a str,
}

/// Build the authorization URL with all required OAuth parameters,
/// form-urlencoded. Appends with `&` when the base already has a query.
pub fn build_authorization_url(request: &AuthorizationRequest<'_>) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("response_type", "code")
        .append_pair("client_id", request.client_id)
        .append_pair("redirect_uri", request.redirect_uri)
        .append_pair("scope", request.scope)
        .append_pair("state", request.state)
        .append_pair("code_challenge", request.code_challenge)
        .append_pair("code_challenge_method", "S256")
        .finish();
    let separator = if request.authorize_url.contains('?') {
        '&'
    } else {
        '?'
    };
    format!("{}{separator}{query}", request.authorize_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_url_safe(s: &str) -> bool {
        s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    }

    #[test]
    fn random_string_has_exact_length_and_alphabet() {
        for length in [1, 2, 3, 4, 5, 31, 32, 43, 64, 128] {
            let s = generate_random_string(length);
            assert_eq!(s.len(), length, "length {length}");
            assert!(is_url_safe(&s), "not URL-safe base64: {s}");
        }
    }

    #[test]
    fn random_string_zero_length_is_empty() {
        assert_eq!(generate_random_string(0), "");
    }

    #[test]
    fn random_strings_do_not_collide() {
        let seen: HashSet<String> = (0..1000)
            .map(|_| generate_random_string(STATE_LENGTH))
            .collect();
        assert_eq!(seen.len(), 1000);
    }

    #[test]
    fn challenge_is_deterministic() {
        let verifier = "test-verifier-value";
        assert_eq!(
            compute_code_challenge(verifier),
            compute_code_challenge(verifier)
        );
        assert_ne!(
            compute_code_challenge(verifier),
            compute_code_challenge("other-verifier")
        );
    }

    #[test]
    fn challenge_matches_known_value() {
        // SHA256("hello") = 2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824
        assert_eq!(
            compute_code_challenge("hello"),
            "LPJNul-wow4m6DsqxbninhsWHlwfp0JecwQzYpOLmCQ"
        );
    }

    #[test]
    fn challenge_matches_rfc7636_appendix_b() {
        assert_eq!(
            compute_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn challenge_decodes_to_sha256_digest() {
        let verifier = generate_random_string(CODE_VERIFIER_LENGTH);
        let challenge = compute_code_challenge(&verifier);
        assert_eq!(challenge.len(), 43);
        assert!(!challenge.contains('='));
        let decoded = URL_SAFE_NO_PAD.decode(&challenge).expect("valid base64url");
        assert_eq!(decoded, Sha256::digest(verifier.as_bytes()).to_vec());
    }

    #[test]
    fn constant_time_eq_matches_equality() {
        assert!(constant_time_eq("state-xyz", "state-xyz"));
        assert!(!constant_time_eq("state-xyz", "state-xyA"));
        assert!(!constant_time_eq("state-xyz", "state-xy"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn authorization_url_contains_encoded_params() {
        let url = build_authorization_url(&AuthorizationRequest {
            authorize_url: "https://stage-account.inpost-group.com/oauth2/authorize",
            client_id: "client-123",
            redirect_uri: "https://example.com/callback",
            scope: "api:offers:read api:orders:read",
            state: "state-1",
            code_challenge: "challenge-1",
        });
        assert!(url.starts_with("https://stage-account.inpost-group.com/oauth2/authorize?response_type=code&"));
        assert!(url.contains("client_id=client-123"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fexample.com%2Fcallback"));
        assert!(url.contains("scope=api%3Aoffers%3Aread+api%3Aorders%3Aread"));
        assert!(url.contains("state=state-1"));
        assert!(url.contains("code_challenge=challenge-1"));
        assert!(url.ends_with("code_challenge_method=S256"));
    }

    #[test]
    fn authorization_url_appends_to_existing_query() {
        let url = build_authorization_url(&AuthorizationRequest {
            authorize_url: "https://auth.example/authorize?tenant=pl",
            client_id: "cid",
            redirect_uri: "https://example.com/cb",
            scope: "api:offers:read",
            state: "s",
            code_challenge: "c",
        });
        assert!(url.starts_with("https://auth.example/authorize?tenant=pl&response_type=code"));
    }
}
