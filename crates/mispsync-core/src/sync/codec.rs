//! Payload encoding for the wire
//!
//! Outbound: JSON-encode, optionally sign the uncompressed bytes, then
//! compress bodies above [`COMPRESSION_THRESHOLD`] with the best algorithm
//! the peer accepts. Inbound: undo the response `Content-Encoding` and
//! JSON-decode.
//!
//! ```text
//! payload ──encode_json──► bytes ──sign_payload──► x-pgp-signature
//!                            │
//!                            └──select_compression/compress──► body
//!
//! body ──decompress (br | gzip | identity)──► bytes ──decode_json──► T
//! ```

use std::fmt;
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use brotli::enc::backward_references::{BrotliEncoderMode, BrotliEncoderParams};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::COMPRESSION_THRESHOLD;
use crate::error::{SyncError, SyncResult};
use crate::signer::Signer;
use crate::types::Capability;

const BROTLI_QUALITY: i32 = 1;
const BROTLI_WINDOW: i32 = 22;

/// Content coding of a request or response body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentEncoding {
    Identity,
    Brotli,
    Gzip,
}

impl ContentEncoding {
    /// Value for the `Content-Encoding` header, `None` for identity
    pub fn header_value(&self) -> Option<&'static str> {
        match self {
            ContentEncoding::Identity => None,
            ContentEncoding::Brotli => Some("br"),
            ContentEncoding::Gzip => Some("gzip"),
        }
    }

    /// Parse a `Content-Encoding` header value
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Decode` for codings other than `br`, `gzip`
    /// and `identity`.
    pub fn from_header(value: Option<&str>) -> SyncResult<Self> {
        let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return Ok(ContentEncoding::Identity);
        };
        match value.to_ascii_lowercase().as_str() {
            "identity" => Ok(ContentEncoding::Identity),
            "br" => Ok(ContentEncoding::Brotli),
            "gzip" | "x-gzip" => Ok(ContentEncoding::Gzip),
            other => Err(SyncError::Decode(format!(
                "Unsupported content encoding `{}`",
                other
            ))),
        }
    }
}

impl fmt::Display for ContentEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header_value().unwrap_or("identity"))
    }
}

/// Request encodings the peer accepts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompressionSupport {
    pub brotli: bool,
    pub gzip: bool,
}

impl CompressionSupport {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Canonical compact JSON bytes
pub fn encode_json<T>(payload: &T) -> SyncResult<Vec<u8>>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(payload).map_err(|e| SyncError::Encode(e.to_string()))
}

/// Pick the request coding for a body of `len` bytes
///
/// Bodies at or below the threshold are never compressed. Brotli wins
/// over gzip when the peer takes both.
pub fn select_compression(len: usize, support: CompressionSupport) -> ContentEncoding {
    if len <= COMPRESSION_THRESHOLD {
        ContentEncoding::Identity
    } else if support.brotli {
        ContentEncoding::Brotli
    } else if support.gzip {
        ContentEncoding::Gzip
    } else {
        ContentEncoding::Identity
    }
}

pub fn compress(bytes: &[u8], encoding: ContentEncoding) -> SyncResult<Vec<u8>> {
    match encoding {
        ContentEncoding::Identity => Ok(bytes.to_vec()),
        ContentEncoding::Brotli => {
            let params = BrotliEncoderParams {
                quality: BROTLI_QUALITY,
                lgwin: BROTLI_WINDOW,
                mode: BrotliEncoderMode::BROTLI_MODE_TEXT,
                ..Default::default()
            };
            let mut out = Vec::with_capacity(bytes.len() / 2);
            let mut input = bytes;
            brotli::BrotliCompress(&mut input, &mut out, &params)
                .map_err(|e| SyncError::Encode(format!("brotli: {}", e)))?;
            Ok(out)
        }
        ContentEncoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder
                .write_all(bytes)
                .map_err(|e| SyncError::Encode(format!("gzip: {}", e)))?;
            encoder
                .finish()
                .map_err(|e| SyncError::Encode(format!("gzip: {}", e)))
        }
    }
}

pub fn decompress(bytes: &[u8], encoding: ContentEncoding) -> SyncResult<Vec<u8>> {
    match encoding {
        ContentEncoding::Identity => Ok(bytes.to_vec()),
        ContentEncoding::Brotli => {
            let mut out = Vec::new();
            let mut input = bytes;
            brotli::BrotliDecompress(&mut input, &mut out)
                .map_err(|e| SyncError::Decode(format!("brotli: {}", e)))?;
            Ok(out)
        }
        ContentEncoding::Gzip => {
            let mut out = Vec::new();
            GzDecoder::new(bytes)
                .read_to_end(&mut out)
                .map_err(|e| SyncError::Decode(format!("gzip: {}", e)))?;
            Ok(out)
        }
    }
}

/// Signature header value for a protected payload
///
/// `bytes` must be the uncompressed body.
///
/// # Errors
///
/// - `CapabilityUnavailable(protected-event-signing)` if the peer cannot
///   verify signatures
/// - `Signing` if no signer is configured or it returns an empty signature
pub fn sign_payload(
    bytes: &[u8],
    signing_supported: bool,
    signer: Option<&dyn Signer>,
) -> SyncResult<String> {
    if !signing_supported {
        return Err(SyncError::CapabilityUnavailable(
            Capability::ProtectedEventSigning,
        ));
    }
    let signer = signer.ok_or_else(|| {
        SyncError::Signing("Protected payload requires a signer, none configured".to_string())
    })?;
    let signature = signer.sign(bytes)?;
    if signature.is_empty() {
        return Err(SyncError::Signing("Signer returned an empty signature".to_string()));
    }
    Ok(BASE64.encode(signature))
}

/// Value to send as `If-None-Match` for a stored validator
///
/// Intermediaries that compress on the fly append `-br` / `-gzip` to the
/// validator; the peer compares the bare one. Quoting is kept as given.
pub fn conditional_token(token: &str) -> String {
    let quoted = token.len() >= 2 && token.starts_with('"') && token.ends_with('"');
    let bare = token.trim_matches('"');

    let stripped = match bare.rfind('-') {
        Some(pos) if pos > 0 && matches!(&bare[pos + 1..], "br" | "gzip") => &bare[..pos],
        _ => return token.to_string(),
    };

    if quoted {
        format!("\"{}\"", stripped)
    } else {
        stripped.to_string()
    }
}

/// Decompress per `content_encoding`, then JSON-decode
pub fn decode_json<T>(body: &[u8], content_encoding: Option<&str>) -> SyncResult<T>
where
    T: DeserializeOwned,
{
    let encoding = ContentEncoding::from_header(content_encoding)?;
    let bytes = decompress(body, encoding)?;
    serde_json::from_slice(&bytes).map_err(|e| SyncError::Decode(format!("invalid JSON: {}", e)))
}
