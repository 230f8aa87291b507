//! Structured invoice data produced by the extraction capability.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One party on an invoice (seller or buyer).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Party {
    /// Registered name.
    pub name: Option<String>,
    /// Polish tax identification number (10 digits).
    pub nip: Option<String>,
}

/// Structured fields extracted from an invoice document.
///
/// Every field is optional: the extraction capability returns `null` for
/// anything it could not read, and the validation engine reports what is
/// missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedData {
    pub invoice_number: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub net_amount: Option<Decimal>,
    pub vat_amount: Option<Decimal>,
    pub gross_amount: Option<Decimal>,
    /// ISO 4217 code, e.g. "PLN".
    pub currency: Option<String>,
    #[serde(default)]
    pub seller: Party,
    #[serde(default)]
    pub buyer: Party,
}

/// Per-field confidence scores (0-100) reported by the extraction capability.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceScores {
    pub invoice_number: Option<u8>,
    pub issue_date: Option<u8>,
    pub due_date: Option<u8>,
    pub net_amount: Option<u8>,
    pub vat_amount: Option<u8>,
    pub gross_amount: Option<u8>,
    pub currency: Option<u8>,
    pub seller_name: Option<u8>,
    pub seller_nip: Option<u8>,
    pub buyer_name: Option<u8>,
    pub buyer_nip: Option<u8>,
}

impl ConfidenceScores {
    /// All scores that are present, in declaration order.
    pub fn present(&self) -> Vec<u8> {
        [
            self.invoice_number,
            self.issue_date,
            self.due_date,
            self.net_amount,
            self.vat_amount,
            self.gross_amount,
            self.currency,
            self.seller_name,
            self.seller_nip,
            self.buyer_name,
            self.buyer_nip,
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Look up a score by its snake_case key.
    pub fn get(&self, key: &str) -> Option<u8> {
        match key {
            "invoice_number" => self.invoice_number,
            "issue_date" => self.issue_date,
            "due_date" => self.due_date,
            "net_amount" => self.net_amount,
            "vat_amount" => self.vat_amount,
            "gross_amount" => self.gross_amount,
            "currency" => self.currency,
            "seller_name" => self.seller_name,
            "seller_nip" => self.seller_nip,
            "buyer_name" => self.buyer_name,
            "buyer_nip" => self.buyer_nip,
            _ => None,
        }
    }
}

/// Token accounting for one extraction call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}
