//! Image payload normalization.
//!
//! Every image reaching the upload proxy ends up as one standard base64
//! body, whatever shape it arrived in: raw bytes are encoded, `data:` URLs
//! lose their header, bare base64 is forwarded untouched. Text bodies are
//! decoded once to validate them and to enforce the size cap.

use crate::types::ImagePayload;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use image::ImageFormat;
use thiserror::Error;

const DATA_URL_SCHEME: &str = "data:";
const BASE64_MARKER: &str = ";base64";
const OCTET_STREAM: &str = "application/octet-stream";

/// Browsers and hand-written clients disagree on trailing `=`; accept both.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("No image provided")]
    Empty,
    #[error("Malformed data URL: {0}")]
    MalformedDataUrl(&'static str),
    #[error("Image is not valid base64: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("Image exceeds size limit ({size} > {limit} bytes)")]
    TooLarge { size: usize, limit: usize },
}

/// An image ready to be forwarded to the host.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    base64: String,
    bytes: Vec<u8>,
    format: Option<ImageFormat>,
}

impl NormalizedImage {
    /// Standard base64 body, never carrying a `data:` header.
    pub fn base64(&self) -> &str {
        &self.base64
    }

    /// Decoded image content.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size of the decoded image in bytes.
    pub fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    /// Format sniffed from the magic bytes, if recognised.
    pub fn format(&self) -> Option<ImageFormat> {
        self.format
    }

    pub fn mime_type(&self) -> &'static str {
        self.format.map(|f| f.to_mime_type()).unwrap_or(OCTET_STREAM)
    }

    /// File name used when the host wants a multipart file part.
    pub fn file_name(&self) -> String {
        let ext = self
            .format
            .and_then(|f| f.extensions_str().first().copied())
            .unwrap_or("bin");
        format!("image.{ext}")
    }
}

/// Fold an incoming payload into the body forwarded to the image host.
pub fn normalize(payload: ImagePayload, max_bytes: usize) -> Result<NormalizedImage, PayloadError> {
    match payload {
        ImagePayload::Bytes(bytes) => {
            if bytes.is_empty() {
                return Err(PayloadError::Empty);
            }
            check_size(bytes.len(), max_bytes)?;
            Ok(NormalizedImage {
                base64: STANDARD.encode(&bytes),
                format: image::guess_format(&bytes).ok(),
                bytes,
            })
        }
        ImagePayload::Text(text) => {
            let body = match text.trim().strip_prefix(DATA_URL_SCHEME) {
                Some(rest) => strip_data_url_header(rest)?,
                None => text.trim(),
            };
            let body: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
            if body.is_empty() {
                return Err(PayloadError::Empty);
            }
            // Reject oversized text before paying for the decode.
            check_size(decoded_len(&body), max_bytes)?;

            let decoded = LENIENT_BASE64.decode(body.as_bytes())?;
            check_size(decoded.len(), max_bytes)?;

            tracing::trace!(encoded_len = body.len(), decoded_len = decoded.len(), "decoded text payload");

            Ok(NormalizedImage {
                format: image::guess_format(&decoded).ok(),
                bytes: decoded,
                base64: body,
            })
        }
    }
}

/// `rest` is everything after `data:`. Returns the body after the first comma.
fn strip_data_url_header(rest: &str) -> Result<&str, PayloadError> {
    let (header, body) = rest
        .split_once(',')
        .ok_or(PayloadError::MalformedDataUrl("missing ',' separator"))?;
    if !header.ends_with(BASE64_MARKER) {
        return Err(PayloadError::MalformedDataUrl("only base64 data URLs are supported"));
    }
    Ok(body)
}

/// Decoded size of a base64 body, exact for well-formed input.
fn decoded_len(body: &str) -> usize {
    let data = body.trim_end_matches('=').len();
    data / 4 * 3 + data % 4 * 3 / 4
}

fn check_size(size: usize, limit: usize) -> Result<(), PayloadError> {
    if size > limit {
        Err(PayloadError::TooLarge { size, limit })
    } else {
        Ok(())
    }
}
