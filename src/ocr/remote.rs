//! HTTP client for the server-side recognition service.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{sniff_format, OcrError, RecognizedText, TextRecognizer};

/// Configuration for the recognition service client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Recognition endpoint, e.g. "http://localhost:8089/recognize".
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Request timeout; enforced here, not assumed from the service.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:8089/recognize".to_string()
}

fn default_timeout_secs() -> u64 {
    60
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Recognition service client.
pub struct RemoteOcrClient {
    config: OcrConfig,
    client: Client,
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    content: String,
    mime_type: &'a str,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    text: String,
    confidence: u8,
}

impl RemoteOcrClient {
    pub fn new(config: OcrConfig) -> Result<Self, OcrError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| OcrError::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl TextRecognizer for RemoteOcrClient {
    async fn recognize(&self, document: &[u8]) -> Result<RecognizedText, OcrError> {
        let mime_type = sniff_format(document)?;
        debug!(mime_type, bytes = document.len(), "sending document for recognition");

        let request = RecognizeRequest {
            content: BASE64.encode(document),
            mime_type,
        };
        let resp = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| OcrError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(OcrError::Api(format!("HTTP {}", resp.status())));
        }

        let body: RecognizeResponse = resp
            .json()
            .await
            .map_err(|e| OcrError::Parse(e.to_string()))?;

        Ok(RecognizedText {
            text: body.text,
            confidence: body.confidence.min(100),
        })
    }
}
