//! Text recognition adapter.
//!
//! Wraps the external OCR capability: document bytes in, raw text plus a
//! 0-100 confidence out. The pipeline skips this adapter entirely when the
//! upload already carried client-produced OCR; the source tag records which
//! path was taken.

mod remote;

pub use remote::{OcrConfig, RemoteOcrClient};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the recognition capability.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("recognition service unreachable: {0}")]
    Connection(String),

    #[error("recognition service error: {0}")]
    Api(String),

    #[error("unreadable recognition response: {0}")]
    Parse(String),
}

/// Where the recognized text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OcrSource {
    /// Supplied by the uploading client; no server-side OCR ran.
    ClientSide,
    /// Produced by the recognition service.
    ServerSide,
}

impl OcrSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ClientSide => "client-side",
            Self::ServerSide => "server-side",
        }
    }
}

/// Raw text recognized from a document.
#[derive(Debug, Clone)]
pub struct RecognizedText {
    pub text: String,
    /// Recognition confidence, 0-100.
    pub confidence: u8,
}

/// Opaque recognition capability.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    async fn recognize(&self, document: &[u8]) -> Result<RecognizedText, OcrError>;
}

/// Detect the document MIME type, rejecting anything that is not an image
/// or a PDF.
pub fn sniff_format(document: &[u8]) -> Result<&'static str, OcrError> {
    let kind = infer::get(document)
        .ok_or_else(|| OcrError::UnsupportedFormat("unrecognized content".to_string()))?;
    let mime = kind.mime_type();
    if mime.starts_with("image/") || mime == "application/pdf" {
        Ok(mime)
    } else {
        Err(OcrError::UnsupportedFormat(mime.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_accepts_png_and_pdf() {
        let png = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
        assert_eq!(sniff_format(png).unwrap(), "image/png");

        let pdf = b"%PDF-1.7 some content";
        assert_eq!(sniff_format(pdf).unwrap(), "application/pdf");
    }

    #[test]
    fn test_sniff_rejects_other_formats() {
        let zip = b"PK\x03\x04rest of archive";
        assert!(matches!(
            sniff_format(zip),
            Err(OcrError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            sniff_format(b"plain text"),
            Err(OcrError::UnsupportedFormat(_))
        ));
    }
}
