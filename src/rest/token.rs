// Bearer token claims
// This file reads caller identity out of the claims segment of a bearer
// token. Signatures are not verified; the token is trusted to have been
// validated upstream.
//
// Numan Thabit 2025 Nov

use crate::errors::MetricsError;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as B64, Engine as _};
use serde::Deserialize;
use serde_json::Value;

pub const AUTHORIZATION: &str = "authorization";
pub const BEARER_PREFIX: &str = "Bearer ";

/// Identity fields carried by the token; each is optional in the claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerClaims {
    pub user_id: Option<String>,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    internal_user_id: Option<Value>,
    #[serde(default)]
    internal_account_id: Option<Value>,
    #[serde(default)]
    internal_account_name: Option<String>,
}

/// Decodes the identity claims from an `Authorization` header value.
pub fn decode_bearer(header: Option<&str>) -> Result<CallerClaims, MetricsError> {
    let header = header.ok_or_else(|| invalid("token is empty/missing"))?;
    let token = header
        .strip_prefix(BEARER_PREFIX)
        .ok_or_else(|| invalid("authorization scheme is not Bearer"))?
        .trim();
    if token.is_empty() {
        return Err(invalid("token is empty/missing"));
    }

    let mut segments = token.split('.');
    let claims_segment = match (segments.next(), segments.next()) {
        (Some(_header), Some(claims)) if !claims.is_empty() => claims,
        _ => return Err(invalid("token has no claims segment")),
    };

    let bytes = B64
        .decode(claims_segment.trim_end_matches('='))
        .map_err(|e| invalid(format!("claims segment is not base64url: {e}")))?;
    let raw: RawClaims = serde_json::from_slice(&bytes)
        .map_err(|e| invalid(format!("claims segment is not a JSON object: {e}")))?;

    Ok(CallerClaims {
        user_id: raw.internal_user_id.as_ref().and_then(id_text),
        account_id: raw.internal_account_id.as_ref().and_then(id_text),
        account_name: raw.internal_account_name,
    })
}

fn invalid(reason: impl Into<String>) -> MetricsError {
    MetricsError::InvalidToken(reason.into())
}

// ids are issued as integers; some issuers quote them
fn id_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}
