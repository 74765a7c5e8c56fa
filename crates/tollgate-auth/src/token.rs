//! Structural parsing of compact-serialized tokens.
//!
//! Nothing here checks a signature. [`parse_unverified`] only establishes that
//! the input is `header.payload.signature` with three non-empty base64url
//! segments whose first two decode to JSON objects, which is enough to read the
//! `kid` that drives secret resolution.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::Deserialize;
use thiserror::Error;

use crate::Claims;

/// Why a token failed structural parsing
#[derive(Debug, Error)]
pub enum TokenFormatError {
    /// Not exactly three dot-separated segments
    #[error("expected 3 segments separated by '.', found {0}")]
    SegmentCount(usize),

    /// One of the segments is empty
    #[error("{0} segment is empty")]
    EmptySegment(Segment),

    /// A segment is not valid unpadded base64url
    #[error("{segment} segment is not base64url: {source}")]
    Base64 {
        /// Offending segment
        segment: Segment,
        /// Decoder error
        #[source]
        source: base64::DecodeError,
    },

    /// A segment does not contain valid JSON
    #[error("{segment} segment is not valid JSON: {source}")]
    Json {
        /// Offending segment
        segment: Segment,
        /// Parser error
        #[source]
        source: serde_json::Error,
    },

    /// A segment decodes to JSON that is not an object
    #[error("{0} segment is not a JSON object")]
    NotAnObject(Segment),

    /// Header fields have the wrong type
    #[error("invalid header: {0}")]
    InvalidHeader(String),
}

/// Segment of a compact token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// First segment
    Header,
    /// Second segment
    Payload,
    /// Third segment
    Signature,
}

impl std::fmt::Display for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Header => "header",
            Self::Payload => "payload",
            Self::Signature => "signature",
        })
    }
}

/// Header fields read before verification
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenHeader {
    /// Algorithm tag as written in the token
    pub alg: String,
    /// Key identifier
    #[serde(default)]
    pub kid: Option<String>,
    /// Media type, usually `JWT`
    #[serde(default)]
    pub typ: Option<String>,
}

/// Token split into its unverified parts
#[derive(Debug, Clone)]
pub struct ParsedToken {
    /// Decoded header
    pub header: TokenHeader,
    /// Decoded, unverified claims
    pub claims: Claims,
}

impl ParsedToken {
    /// Key identifier from the header
    pub fn kid(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }
}

/// Parse `token` without verifying its signature.
///
/// # Errors
///
/// Returns [`TokenFormatError`] when the token is not three non-empty
/// base64url segments, when header or payload is not a JSON object, or when
/// the header lacks a string `alg` or has a non-string `kid`.
pub fn parse_unverified(token: &str) -> Result<ParsedToken, TokenFormatError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [header, payload, signature] = parts.as_slice() else {
        return Err(TokenFormatError::SegmentCount(parts.len()));
    };

    let header_json = decode_object(header, Segment::Header)?;
    let claims = decode_object(payload, Segment::Payload)?;
    decode_segment(signature, Segment::Signature)?;

    let header: TokenHeader = serde_json::from_value(serde_json::Value::Object(header_json))
        .map_err(|e| TokenFormatError::InvalidHeader(e.to_string()))?;

    Ok(ParsedToken { header, claims })
}

fn decode_segment(segment: &str, which: Segment) -> Result<Vec<u8>, TokenFormatError> {
    if segment.is_empty() {
        return Err(TokenFormatError::EmptySegment(which));
    }
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|source| TokenFormatError::Base64 {
            segment: which,
            source,
        })
}

fn decode_object(segment: &str, which: Segment) -> Result<Claims, TokenFormatError> {
    let bytes = decode_segment(segment, which)?;
    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|source| TokenFormatError::Json {
            segment: which,
            source,
        })?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(TokenFormatError::NotAnObject(which)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segment(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(value).unwrap())
    }

    fn token(header: serde_json::Value, payload: serde_json::Value) -> String {
        format!("{}.{}.c2ln", segment(&header), segment(&payload))
    }

    #[test]
    fn test_parses_header_and_claims() {
        let parsed = parse_unverified(&token(
            json!({"alg": "HS256", "kid": "k1", "typ": "JWT"}),
            json!({"sub": "alice"}),
        ))
        .unwrap();
        assert_eq!(parsed.kid(), Some("k1"));
        assert_eq!(parsed.header.alg, "HS256");
        assert_eq!(parsed.claims["sub"], "alice");
    }

    #[test]
    fn test_kid_is_optional() {
        let parsed = parse_unverified(&token(json!({"alg": "RS256"}), json!({}))).unwrap();
        assert_eq!(parsed.kid(), None);
    }

    #[test]
    fn test_wrong_segment_count() {
        assert!(matches!(
            parse_unverified("only.two"),
            Err(TokenFormatError::SegmentCount(2))
        ));
        assert!(matches!(
            parse_unverified("a.b.c.d"),
            Err(TokenFormatError::SegmentCount(4))
        ));
        assert!(matches!(
            parse_unverified(""),
            Err(TokenFormatError::SegmentCount(1))
        ));
    }

    #[test]
    fn test_empty_signature_segment() {
        let unsigned = format!("{}.{}.", segment(&json!({"alg": "HS256"})), segment(&json!({})));
        assert!(matches!(
            parse_unverified(&unsigned),
            Err(TokenFormatError::EmptySegment(Segment::Signature))
        ));
    }

    #[test]
    fn test_invalid_base64() {
        assert!(matches!(
            parse_unverified("!!!.e30.c2ln"),
            Err(TokenFormatError::Base64 {
                segment: Segment::Header,
                ..
            })
        ));
    }

    #[test]
    fn test_payload_must_be_object() {
        let bad = format!("{}.{}.c2ln", segment(&json!({"alg": "HS256"})), segment(&json!([1, 2])));
        assert!(matches!(
            parse_unverified(&bad),
            Err(TokenFormatError::NotAnObject(Segment::Payload))
        ));
    }

    #[test]
    fn test_header_array_is_rejected() {
        let bad = format!("{}.{}.c2ln", segment(&json!(["HS256"])), segment(&json!({})));
        assert!(matches!(
            parse_unverified(&bad),
            Err(TokenFormatError::NotAnObject(Segment::Header))
        ));
    }

    #[test]
    fn test_non_string_kid_is_rejected() {
        let bad = token(json!({"alg": "HS256", "kid": 7}), json!({}));
        assert!(matches!(
            parse_unverified(&bad),
            Err(TokenFormatError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_missing_alg_is_rejected() {
        let bad = token(json!({"kid": "k1"}), json!({}));
        assert!(matches!(
            parse_unverified(&bad),
            Err(TokenFormatError::InvalidHeader(_))
        ));
    }
}
