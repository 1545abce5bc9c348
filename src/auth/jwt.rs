//! JWT expiry extraction
//!
//! Access tokens issued by the backend are JWTs. The client never verifies
//! them (it does not hold the signing key); it only reads the `exp` claim so
//! a credential can carry an expiry instant for proactive refresh.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::Deserialize;

/// The only claim the client reads.
#[derive(Debug, Clone, Deserialize)]
struct ExpiryClaims {
    exp: Option<i64>,
}

/// Decodes the `exp` claim of a JWT without verifying its signature.
///
/// Returns `None` for opaque tokens, malformed JWTs, or tokens without `exp`.
/// Already-expired tokens still yield their expiry.
#[must_use]
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    if token.split('.').count() != 3 {
        return None;
    }

    // The key and algorithm are placeholders; signature checking is disabled.
    let key = DecodingKey::from_secret(&[]);
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<ExpiryClaims>(token, &key, &validation).ok()?;
    data.claims
        .exp
        .and_then(|exp| DateTime::<Utc>::from_timestamp(exp, 0))
}
