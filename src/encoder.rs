//! Base64 data-URI encoding.
//!
//! A [`MarkupEncoder`] picks its backend once, when it is resolved, and
//! keeps it for every call:
//!
//! - [`NativeBase64`]: the `base64` crate (cargo feature `native-base64`,
//!   on by default).
//! - [`SoftwareBase64`]: a built-in fallback with no dependencies.

use std::fmt;

use tracing::debug;

use crate::config::EncoderPreference;
use crate::error::{ExportError, ExportResult};
use crate::markup::SvgMarkup;

// ============================================================================
// Backends
// ============================================================================

/// A standard-alphabet, padded base64 implementation.
pub trait Base64Backend: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn encode(&self, bytes: &[u8]) -> String;

    fn decode(&self, text: &str) -> ExportResult<Vec<u8>>;
}

/// Backend over the `base64` crate.
#[cfg(feature = "native-base64")]
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBase64;

#[cfg(feature = "native-base64")]
impl Base64Backend for NativeBase64 {
    fn name(&self) -> &'static str {
        "native"
    }

    fn encode(&self, bytes: &[u8]) -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(bytes)
    }

    fn decode(&self, text: &str) -> ExportResult<Vec<u8>> {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(text.trim())
            .map_err(|e| ExportError::InvalidDataUri(e.to_string()))
    }
}

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

/// Dependency-free fallback backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareBase64;

impl Base64Backend for SoftwareBase64 {
    fn name(&self) -> &'static str {
        "software"
    }

    fn encode(&self, bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len().div_ceil(3) * 4);
        for chunk in bytes.chunks(3) {
            let b = [
                chunk[0],
                chunk.get(1).copied().unwrap_or(0),
                chunk.get(2).copied().unwrap_or(0),
            ];
            let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
            let sextets = [n >> 18, n >> 12, n >> 6, n];
            for (i, sextet) in sextets.iter().enumerate() {
                if i <= chunk.len() {
                    out.push(ALPHABET[(sextet & 0x3f) as usize] as char);
                } else {
                    out.push('=');
                }
            }
        }
        out
    }

    fn decode(&self, text: &str) -> ExportResult<Vec<u8>> {
        let text = text.trim().trim_end_matches('=');
        let mut out = Vec::with_capacity(text.len() * 3 / 4);
        let mut acc = 0u32;
        let mut bits = 0u32;

        for ch in text.bytes() {
            let value = match ch {
                b'A'..=b'Z' => ch - b'A',
                b'a'..=b'z' => ch - b'a' + 26,
                b'0'..=b'9' => ch - b'0' + 52,
                b'+' => 62,
                b'/' => 63,
                _ => {
                    return Err(ExportError::InvalidDataUri(format!(
                        "invalid base64 byte {:?}",
                        ch as char
                    )));
                }
            };
            acc = (acc << 6) | u32::from(value);
            bits += 6;
            if bits >= 8 {
                bits -= 8;
                out.push((acc >> bits) as u8);
                acc &= (1 << bits) - 1;
            }
        }

        if bits >= 6 {
            return Err(ExportError::InvalidDataUri("truncated base64 payload".into()));
        }
        Ok(out)
    }
}

// ============================================================================
// MarkupEncoder
// ============================================================================

/// Encodes markup as a base64 data URI with a fixed prefix.
#[derive(Debug)]
pub struct MarkupEncoder {
    backend: Box<dyn Base64Backend>,
    prefix: String,
}

impl MarkupEncoder {
    /// Resolves the backend for `preference`.
    ///
    /// Fails with [`ExportError::EncoderUnavailable`] when the native
    /// backend is requested but not compiled in.
    pub fn resolve(preference: EncoderPreference, prefix: impl Into<String>) -> ExportResult<Self> {
        let backend: Box<dyn Base64Backend> = match preference {
            EncoderPreference::Software => Box::new(SoftwareBase64),
            EncoderPreference::Native => native_backend().ok_or_else(|| {
                ExportError::EncoderUnavailable(
                    "built without the `native-base64` feature".into(),
                )
            })?,
            EncoderPreference::Auto => native_backend().unwrap_or_else(|| Box::new(SoftwareBase64)),
        };
        debug!(backend = backend.name(), "resolved base64 encoder");
        Ok(Self::with_backend(backend, prefix))
    }

    pub fn with_backend(backend: Box<dyn Base64Backend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `prefix + base64(markup)`. The markup is not validated.
    pub fn encode(&self, markup: &SvgMarkup) -> String {
        format!("{}{}", self.prefix, self.backend.encode(markup.as_str().as_bytes()))
    }

    /// Base64 of arbitrary bytes with the resolved backend.
    pub fn encode_bytes(&self, bytes: &[u8]) -> String {
        self.backend.encode(bytes)
    }

    /// Splits a base64 `data:` URI into its MIME type and decoded payload.
    pub fn decode_data_uri(&self, uri: &str) -> ExportResult<(String, Vec<u8>)> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| ExportError::InvalidDataUri("missing `data:` scheme".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ExportError::InvalidDataUri("missing `,` separator".into()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| ExportError::InvalidDataUri("payload is not base64".into()))?;
        Ok((mime.to_string(), self.backend.decode(payload)?))
    }
}

#[cfg(feature = "native-base64")]
fn native_backend() -> Option<Box<dyn Base64Backend>> {
    Some(Box::new(NativeBase64))
}

#[cfg(not(feature = "native-base64"))]
fn native_backend() -> Option<Box<dyn Base64Backend>> {
    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const PREFIX: &str = "data:image/svg+xml;base64,";
    const CHART: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" version="1.1"><text>Umsatz €</text></svg>"#;

    #[test]
    fn software_matches_known_vectors() {
        let b64 = SoftwareBase64;
        for (plain, encoded) in [
            ("", ""),
            ("f", "Zg=="),
            ("fo", "Zm8="),
            ("foo", "Zm9v"),
            ("foob", "Zm9vYg=="),
            ("fooba", "Zm9vYmE="),
            ("foobar", "Zm9vYmFy"),
        ] {
            assert_eq!(b64.encode(plain.as_bytes()), encoded);
            assert_eq!(b64.decode(encoded).unwrap(), plain.as_bytes());
        }
    }

    #[test]
    fn software_rejects_garbage() {
        assert!(SoftwareBase64.decode("Zm9v*").is_err());
        assert!(SoftwareBase64.decode("Z").is_err());
    }

    #[test]
    fn decoding_encoded_markup_is_identity() {
        for preference in [EncoderPreference::Auto, EncoderPreference::Software] {
            let encoder = MarkupEncoder::resolve(preference, PREFIX).unwrap();
            let uri = encoder.encode(&SvgMarkup::new(CHART));
            assert!(uri.starts_with(PREFIX));

            let (mime, bytes) = encoder.decode_data_uri(&uri).unwrap();
            assert_eq!(mime, "image/svg+xml");
            assert_eq!(String::from_utf8(bytes).unwrap(), CHART);
        }
    }

    #[cfg(feature = "native-base64")]
    #[test]
    fn auto_prefers_native_and_backends_agree() {
        let encoder = MarkupEncoder::resolve(EncoderPreference::Auto, PREFIX).unwrap();
        assert_eq!(encoder.backend_name(), "native");
        assert_eq!(
            NativeBase64.encode(CHART.as_bytes()),
            SoftwareBase64.encode(CHART.as_bytes())
        );
    }

    #[cfg(not(feature = "native-base64"))]
    #[test]
    fn native_request_without_feature_fails() {
        let err = MarkupEncoder::resolve(EncoderPreference::Native, PREFIX).unwrap_err();
        assert!(matches!(err, ExportError::EncoderUnavailable(_)));
    }

    #[test]
    fn malformed_data_uris_are_rejected() {
        let encoder = MarkupEncoder::resolve(EncoderPreference::Software, PREFIX).unwrap();
        assert!(encoder.decode_data_uri("image/png;base64,AAAA").is_err());
        assert!(encoder.decode_data_uri("data:image/png;base64").is_err());
        assert!(encoder.decode_data_uri("data:image/png,AAAA").is_err());
    }
}
