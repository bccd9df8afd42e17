//! HTTP message signature verification (RFC 9421).
//!
//! The CI server signs every callback with an Ed25519 key under the fixed
//! key id `woodpecker-ci-extensions`, covering exactly the request target
//! and the body digest. Anything else on the request is unprotected and
//! deliberately ignored here.

use axum::http::HeaderMap;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use sha2::{Digest, Sha256, Sha512};
use tracing::warn;

/// Key id the CI server signs webhooks with.
pub const WEBHOOK_KEY_ID: &str = "woodpecker-ci-extensions";

/// Covered components every webhook signature must bind.
const REQUIRED_COMPONENTS: [&str; 2] = ["@request-target", "content-digest"];

/// Verifies inbound request signatures against the startup-loaded trust key.
pub struct RequestVerifier {
    public_key: VerifyingKey,
}

impl RequestVerifier {
    pub fn new(public_key: VerifyingKey) -> Self {
        Self { public_key }
    }

    /// Verify the message signature binding `request_target` and the body
    /// digest. Every failure mode rejects the request with a log line and
    /// nothing else.
    pub fn verify(&self, request_target: &str, headers: &HeaderMap, body: &[u8]) -> bool {
        let Some(signature_input) = header_str(headers, "signature-input") else {
            warn!("Missing Signature-Input header");
            return false;
        };
        let Some(signature_header) = header_str(headers, "signature") else {
            warn!("Missing Signature header");
            return false;
        };
        let Some(content_digest) = header_str(headers, "content-digest") else {
            warn!("Missing Content-Digest header");
            return false;
        };

        if !digest_matches(content_digest, body) {
            warn!("Content-Digest header does not match request body");
            return false;
        }

        let inputs = parse_signature_input(signature_input);
        let Some(input) = inputs
            .iter()
            .find(|i| param_value(i.params, "keyid") == Some(WEBHOOK_KEY_ID))
        else {
            warn!("No signature input bound to key id '{}'", WEBHOOK_KEY_ID);
            return false;
        };

        if !covers_required_components(&input.components) {
            warn!(
                "Covered components {:?} do not match the required set",
                input.components
            );
            return false;
        }

        let Some(raw_signature) = split_dict(signature_header)
            .into_iter()
            .find(|(label, _)| *label == input.label)
            .map(|(_, value)| value)
        else {
            warn!("No signature found for label '{}'", input.label);
            return false;
        };
        let Some(signature_bytes) = parse_byte_sequence(raw_signature) else {
            warn!("Malformed signature byte sequence");
            return false;
        };
        let Ok(signature) = Signature::from_slice(&signature_bytes) else {
            warn!("Signature has invalid length");
            return false;
        };

        let base = signature_base(&input.components, request_target, content_digest, input.raw);
        match self.public_key.verify(base.as_bytes(), &signature) {
            Ok(()) => true,
            Err(e) => {
                warn!("Invalid signature: '{}'", e);
                false
            }
        }
    }
}

/// One member of the `Signature-Input` dictionary.
struct SignatureInput<'a> {
    label: &'a str,
    components: Vec<String>,
    /// Parameters trailing the component list, e.g. `;created=...;keyid="..."`.
    params: &'a str,
    /// The member value exactly as serialized; reused verbatim as the
    /// `@signature-params` line of the signature base.
    raw: &'a str,
}

fn parse_signature_input(header: &str) -> Vec<SignatureInput<'_>> {
    split_dict(header)
        .into_iter()
        .filter_map(|(label, raw)| {
            let components = parse_inner_list(raw)?;
            let params = &raw[raw.find(')')? + 1..];
            Some(SignatureInput {
                label,
                components,
                params,
                raw,
            })
        })
        .collect()
}

/// Split a structured-field dictionary on top-level commas, respecting
/// quoted strings and inner lists.
fn split_dict(value: &str) -> Vec<(&str, &str)> {
    let mut members = Vec::new();
    let bytes = value.as_bytes();
    let mut in_quotes = false;
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quotes = !in_quotes,
            b'\\' if in_quotes => i += 1,
            b'(' if !in_quotes => depth += 1,
            b')' if !in_quotes && depth > 0 => depth -= 1,
            b',' if !in_quotes && depth == 0 => {
                members.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    members.push(&value[start..]);

    members
        .into_iter()
        .filter_map(|member| {
            let member = member.trim();
            let eq = member.find('=')?;
            Some((member[..eq].trim(), member[eq + 1..].trim()))
        })
        .collect()
}

/// Component identifiers of an inner list such as
/// `("@request-target" "content-digest");created=...`.
fn parse_inner_list(raw: &str) -> Option<Vec<String>> {
    let rest = raw.strip_prefix('(')?;
    let close = rest.find(')')?;
    Some(
        rest[..close]
            .split_whitespace()
            .map(|token| token.trim_matches('"').to_ascii_lowercase())
            .collect(),
    )
}

fn param_value<'a>(params: &'a str, name: &str) -> Option<&'a str> {
    for part in params.split(';') {
        let part = part.trim();
        if let Some(rest) = part.strip_prefix(name) {
            if let Some(value) = rest.strip_prefix('=') {
                return Some(value.trim_matches('"'));
            }
        }
    }
    None
}

/// Byte sequence in structured-field form, `:base64:`.
fn parse_byte_sequence(raw: &str) -> Option<Vec<u8>> {
    let inner = raw.trim().strip_prefix(':')?.strip_suffix(':')?;
    BASE64.decode(inner).ok()
}

fn covers_required_components(components: &[String]) -> bool {
    components.len() == REQUIRED_COMPONENTS.len()
        && REQUIRED_COMPONENTS
            .iter()
            .all(|required| components.iter().any(|c| c == required))
}

/// Check the `Content-Digest` dictionary against the body. Every entry with
/// a recognized algorithm must match, and at least one must be present.
fn digest_matches(header: &str, body: &[u8]) -> bool {
    let mut recognized = false;
    for (algorithm, raw) in split_dict(header) {
        let Some(claimed) = parse_byte_sequence(raw) else {
            return false;
        };
        let computed: Vec<u8> = match algorithm {
            "sha-256" => Sha256::digest(body).to_vec(),
            "sha-512" => Sha512::digest(body).to_vec(),
            _ => continue,
        };
        if claimed != computed {
            return false;
        }
        recognized = true;
    }
    recognized
}

/// Reassemble the signature base the signer produced (RFC 9421 section 2.5).
fn signature_base(
    components: &[String],
    request_target: &str,
    content_digest: &str,
    raw_params: &str,
) -> String {
    let mut base = String::new();
    for name in components {
        let value = match name.as_str() {
            "@request-target" => request_target,
            "content-digest" => content_digest,
            _ => continue,
        };
        base.push_str(&format!("\"{}\": {}\n", name, value));
    }
    base.push_str(&format!("\"@signature-params\": {}", raw_params));
    base
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    const TARGET: &str = "/templateconfig";

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    fn verifier() -> RequestVerifier {
        RequestVerifier::new(signing_key().verifying_key())
    }

    fn digest_for(body: &[u8]) -> String {
        format!("sha-256=:{}:", BASE64.encode(Sha256::digest(body)))
    }

    fn params_for(key_id: &str) -> String {
        format!(
            "(\"@request-target\" \"content-digest\");created=1700000000;keyid=\"{}\"",
            key_id
        )
    }

    fn signed_headers_with(key: &SigningKey, params: &str, body: &[u8]) -> HeaderMap {
        let digest = digest_for(body);
        let base = format!(
            "\"@request-target\": {}\n\"content-digest\": {}\n\"@signature-params\": {}",
            TARGET, digest, params
        );
        let signature = key.sign(base.as_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("content-digest", digest.parse().unwrap());
        headers.insert("signature-input", format!("wp={}", params).parse().unwrap());
        headers.insert(
            "signature",
            format!("wp=:{}:", BASE64.encode(signature.to_bytes()))
                .parse()
                .unwrap(),
        );
        headers
    }

    fn signed_headers(body: &[u8]) -> HeaderMap {
        signed_headers_with(&signing_key(), &params_for(WEBHOOK_KEY_ID), body)
    }

    #[test]
    fn accepts_correctly_signed_request() {
        let body = br#"{"repo":{}}"#;
        assert!(verifier().verify(TARGET, &signed_headers(body), body));
    }

    #[test]
    fn rejects_tampered_body() {
        let headers = signed_headers(b"original");
        assert!(!verifier().verify(TARGET, &headers, b"tampered"));
    }

    #[test]
    fn rejects_different_request_target() {
        let body = b"payload";
        assert!(!verifier().verify("/elsewhere", &signed_headers(body), body));
    }

    #[test]
    fn rejects_signature_from_wrong_key() {
        let body = b"payload";
        let other = SigningKey::from_bytes(&[8u8; 32]);
        let headers = signed_headers_with(&other, &params_for(WEBHOOK_KEY_ID), body);
        assert!(!verifier().verify(TARGET, &headers, body));
    }

    #[test]
    fn rejects_unknown_key_id() {
        let body = b"payload";
        let headers = signed_headers_with(&signing_key(), &params_for("someone-else"), body);
        assert!(!verifier().verify(TARGET, &headers, body));
    }

    #[test]
    fn rejects_wrong_covered_components() {
        let body = b"payload";
        let params = format!(
            "(\"@request-target\");created=1700000000;keyid=\"{}\"",
            WEBHOOK_KEY_ID
        );
        let digest = digest_for(body);
        let base = format!(
            "\"@request-target\": {}\n\"@signature-params\": {}",
            TARGET, params
        );
        let signature = signing_key().sign(base.as_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("content-digest", digest.parse().unwrap());
        headers.insert("signature-input", format!("wp={}", params).parse().unwrap());
        headers.insert(
            "signature",
            format!("wp=:{}:", BASE64.encode(signature.to_bytes()))
                .parse()
                .unwrap(),
        );

        assert!(!verifier().verify(TARGET, &headers, body));
    }

    #[test]
    fn rejects_missing_headers() {
        let body = b"payload";
        for name in ["signature", "signature-input", "content-digest"] {
            let mut headers = signed_headers(body);
            headers.remove(name);
            assert!(
                !verifier().verify(TARGET, &headers, body),
                "request without '{}' must be rejected",
                name
            );
        }
    }

    #[test]
    fn rejects_garbage_signature_bytes() {
        let body = b"payload";
        let mut headers = signed_headers(body);
        headers.insert("signature", "wp=:!!!not-base64!!!:".parse().unwrap());
        assert!(!verifier().verify(TARGET, &headers, body));
    }

    #[test]
    fn rejects_unrecognized_digest_algorithm() {
        let body = b"payload";
        let mut headers = signed_headers(body);
        headers.insert("content-digest", "md5=:AAAA:".parse().unwrap());
        assert!(!verifier().verify(TARGET, &headers, body));
    }

    #[test]
    fn accepts_sha512_digest() {
        let body = b"payload";
        let digest = format!("sha-512=:{}:", BASE64.encode(Sha512::digest(body)));
        let params = params_for(WEBHOOK_KEY_ID);
        let base = format!(
            "\"@request-target\": {}\n\"content-digest\": {}\n\"@signature-params\": {}",
            TARGET, digest, params
        );
        let signature = signing_key().sign(base.as_bytes());

        let mut headers = HeaderMap::new();
        headers.insert("content-digest", digest.parse().unwrap());
        headers.insert("signature-input", format!("wp={}", params).parse().unwrap());
        headers.insert(
            "signature",
            format!("wp=:{}:", BASE64.encode(signature.to_bytes()))
                .parse()
                .unwrap(),
        );

        assert!(verifier().verify(TARGET, &headers, body));
    }
}
