//! OpenAI-compatible chat-completions client for invoice extraction.
//!
//! Works against any endpoint speaking the chat-completions protocol
//! (Ollama, OpenAI, Groq, vLLM). The response is forced into JSON mode and
//! validated against the invoice schema before anything leaves this module.

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prompts::{EXTRACTION_SYSTEM_PROMPT, EXTRACTION_USER_PROMPT};
use super::{ExtractionClient, ExtractionError, ExtractionOutcome};
use crate::models::{ConfidenceScores, ExtractedData, Party, TokenUsage};

/// Configuration for the extraction client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the chat-completions API, e.g. "http://localhost:11434/v1".
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// API key for hosted providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Model to use for extraction.
    #[serde(default = "default_model")]
    pub model: String,
    /// Request timeout; enforced here, not assumed from the provider.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_model() -> String {
    "qwen2.5:14b".to_string()
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            model: default_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Extraction client speaking the chat-completions protocol.
pub struct LlmExtractionClient {
    config: LlmConfig,
    client: Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    usage: Option<UsageBody>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: MessageBody,
}

#[derive(Deserialize)]
struct MessageBody {
    content: Option<String>,
}

#[derive(Deserialize)]
struct UsageBody {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl LlmExtractionClient {
    pub fn new(config: LlmConfig) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ExtractionError::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ExtractionClient for LlmExtractionClient {
    async fn extract(&self, raw_text: &str) -> Result<ExtractionOutcome, ExtractionError> {
        let url = format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'));
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: EXTRACTION_SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: EXTRACTION_USER_PROMPT.replace("{text}", raw_text),
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat { kind: "json_object" },
        };

        debug!(model = %self.config.model, chars = raw_text.len(), "requesting extraction");
        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let resp = builder
            .send()
            .await
            .map_err(|e| ExtractionError::Connection(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ExtractionError::Api(format!("HTTP {}", resp.status())));
        }

        let body: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ExtractionError::Parse(e.to_string()))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(ExtractionError::NoContent)?;

        let (fields, confidence) = parse_payload(&content)?;
        let usage = body
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        Ok(ExtractionOutcome {
            fields,
            confidence,
            usage,
        })
    }
}

/// Raw payload shape accepted from the model, before validation.
#[derive(Deserialize)]
struct ExtractionPayload {
    #[serde(default)]
    invoice_number: Option<String>,
    #[serde(default)]
    issue_date: Option<String>,
    #[serde(default)]
    due_date: Option<String>,
    #[serde(default)]
    net_amount: Option<f64>,
    #[serde(default)]
    vat_amount: Option<f64>,
    #[serde(default)]
    gross_amount: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    seller: PartyPayload,
    #[serde(default)]
    buyer: PartyPayload,
    confidence: Option<ConfidencePayload>,
}

#[derive(Default, Deserialize)]
struct PartyPayload {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    nip: Option<String>,
}

#[derive(Default, Deserialize)]
struct ConfidencePayload {
    #[serde(default)]
    invoice_number: Option<i64>,
    #[serde(default)]
    issue_date: Option<i64>,
    #[serde(default)]
    due_date: Option<i64>,
    #[serde(default)]
    net_amount: Option<i64>,
    #[serde(default)]
    vat_amount: Option<i64>,
    #[serde(default)]
    gross_amount: Option<i64>,
    #[serde(default)]
    currency: Option<i64>,
    #[serde(default)]
    seller_name: Option<i64>,
    #[serde(default)]
    seller_nip: Option<i64>,
    #[serde(default)]
    buyer_name: Option<i64>,
    #[serde(default)]
    buyer_nip: Option<i64>,
}

/// Parse and schema-validate the model's JSON content.
fn parse_payload(content: &str) -> Result<(ExtractedData, ConfidenceScores), ExtractionError> {
    let cleaned = strip_code_fences(content);
    let payload: ExtractionPayload =
        serde_json::from_str(cleaned).map_err(|e| ExtractionError::Parse(e.to_string()))?;

    let confidence_payload = payload
        .confidence
        .ok_or_else(|| ExtractionError::Schema("missing confidence object".to_string()))?;

    let fields = ExtractedData {
        invoice_number: payload.invoice_number.filter(|s| !s.trim().is_empty()),
        issue_date: parse_date("issue_date", payload.issue_date)?,
        due_date: parse_date("due_date", payload.due_date)?,
        net_amount: parse_amount("net_amount", payload.net_amount)?,
        vat_amount: parse_amount("vat_amount", payload.vat_amount)?,
        gross_amount: parse_amount("gross_amount", payload.gross_amount)?,
        currency: payload.currency.filter(|s| !s.trim().is_empty()),
        seller: Party {
            name: payload.seller.name,
            nip: payload.seller.nip,
        },
        buyer: Party {
            name: payload.buyer.name,
            nip: payload.buyer.nip,
        },
    };

    let confidence = ConfidenceScores {
        invoice_number: parse_score("invoice_number", confidence_payload.invoice_number)?,
        issue_date: parse_score("issue_date", confidence_payload.issue_date)?,
        due_date: parse_score("due_date", confidence_payload.due_date)?,
        net_amount: parse_score("net_amount", confidence_payload.net_amount)?,
        vat_amount: parse_score("vat_amount", confidence_payload.vat_amount)?,
        gross_amount: parse_score("gross_amount", confidence_payload.gross_amount)?,
        currency: parse_score("currency", confidence_payload.currency)?,
        seller_name: parse_score("seller_name", confidence_payload.seller_name)?,
        seller_nip: parse_score("seller_nip", confidence_payload.seller_nip)?,
        buyer_name: parse_score("buyer_name", confidence_payload.buyer_name)?,
        buyer_nip: parse_score("buyer_nip", confidence_payload.buyer_nip)?,
    };

    Ok((fields, confidence))
}

/// Models occasionally wrap JSON in markdown fences despite instructions.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

fn parse_date(field: &str, value: Option<String>) -> Result<Option<NaiveDate>, ExtractionError> {
    match value {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ExtractionError::Schema(format!("{field}: bad date {s:?}"))),
    }
}

fn parse_amount(field: &str, value: Option<f64>) -> Result<Option<Decimal>, ExtractionError> {
    match value {
        None => Ok(None),
        Some(v) => Decimal::try_from(v)
            .map(Some)
            .map_err(|_| ExtractionError::Schema(format!("{field}: bad amount {v}"))),
    }
}

fn parse_score(field: &str, value: Option<i64>) -> Result<Option<u8>, ExtractionError> {
    match value {
        None => Ok(None),
        Some(v) if (0..=100).contains(&v) => Ok(Some(v as u8)),
        Some(v) => Err(ExtractionError::Schema(format!(
            "{field}: confidence {v} outside 0-100"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_RESPONSE: &str = r#"{
        "invoice_number": "FV/123/2026",
        "issue_date": "2026-01-15",
        "due_date": "2026-02-14",
        "net_amount": 1000.00,
        "vat_amount": 230.00,
        "gross_amount": 1230.00,
        "currency": "PLN",
        "seller": {"name": "ACME Sp. z o.o.", "nip": "1234567890"},
        "buyer": {"name": "Widget SA", "nip": "0987654321"},
        "confidence": {
            "invoice_number": 95, "issue_date": 90, "due_date": 85,
            "net_amount": 92, "vat_amount": 91, "gross_amount": 93,
            "currency": 99, "seller_name": 88, "seller_nip": 97,
            "buyer_name": 87, "buyer_nip": 96
        }
    }"#;

    #[test]
    fn test_parse_full_payload() {
        let (fields, confidence) = parse_payload(FULL_RESPONSE).unwrap();
        assert_eq!(fields.invoice_number.as_deref(), Some("FV/123/2026"));
        assert_eq!(
            fields.issue_date,
            Some(NaiveDate::from_ymd_opt(2026, 1, 15).unwrap())
        );
        assert_eq!(fields.net_amount, Some(Decimal::new(100000, 2)));
        assert_eq!(fields.seller.nip.as_deref(), Some("1234567890"));
        assert_eq!(confidence.invoice_number, Some(95));
        assert_eq!(confidence.buyer_nip, Some(96));
    }

    #[test]
    fn test_parse_strips_markdown_fences() {
        let fenced = format!("```json\n{FULL_RESPONSE}\n```");
        let (fields, _) = parse_payload(&fenced).unwrap();
        assert_eq!(fields.invoice_number.as_deref(), Some("FV/123/2026"));
    }

    #[test]
    fn test_missing_confidence_is_schema_error() {
        let err = parse_payload(r#"{"invoice_number": "X"}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::Schema(_)));
    }

    #[test]
    fn test_confidence_out_of_range_is_schema_error() {
        let err = parse_payload(
            r#"{"invoice_number": "X", "confidence": {"invoice_number": 150}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ExtractionError::Schema(_)));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let err = parse_payload("the invoice number is FV/1").unwrap_err();
        assert!(matches!(err, ExtractionError::Parse(_)));
    }

    #[test]
    fn test_null_fields_pass_through() {
        let (fields, confidence) = parse_payload(
            r#"{"invoice_number": null, "gross_amount": 10.5, "confidence": {"gross_amount": 70}}"#,
        )
        .unwrap();
        assert!(fields.invoice_number.is_none());
        assert_eq!(fields.gross_amount, Some(Decimal::new(105, 1)));
        assert!(confidence.invoice_number.is_none());
        assert_eq!(confidence.gross_amount, Some(70));
    }
}
