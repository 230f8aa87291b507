//! Validation engine for extracted invoice data.
//!
//! Pure functions; every violated rule is collected so the caller sees the
//! complete list, never just the first failure.

use rust_decimal::Decimal;

use crate::models::ExtractedData;

/// Allowed difference between gross and net + vat, in currency units.
/// Absorbs rounding differences between line items and totals.
const AMOUNT_TOLERANCE: Decimal = Decimal::ONE;

/// Outcome of validating one extracted invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

/// Check extracted fields for required values, tax-id format, and
/// cross-field arithmetic consistency.
pub fn validate(fields: &ExtractedData) -> ValidationReport {
    let mut errors = Vec::new();

    if fields
        .invoice_number
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .is_empty()
    {
        errors.push("invoice number is missing".to_string());
    }

    if fields.issue_date.is_none() {
        errors.push("issue date is missing".to_string());
    }

    if !is_valid_nip(fields.seller.nip.as_deref()) {
        errors.push("seller tax id must be exactly 10 digits".to_string());
    }
    if !is_valid_nip(fields.buyer.nip.as_deref()) {
        errors.push("buyer tax id must be exactly 10 digits".to_string());
    }

    match (fields.net_amount, fields.vat_amount, fields.gross_amount) {
        (Some(net), Some(vat), Some(gross)) => {
            let difference = (gross - (net + vat)).abs();
            if difference > AMOUNT_TOLERANCE {
                errors.push(format!(
                    "gross amount {gross} does not match net {net} + vat {vat} (difference {difference})"
                ));
            }
        }
        _ => {
            errors.push("net, vat and gross amounts are all required".to_string());
        }
    }

    for (name, amount) in [
        ("net", fields.net_amount),
        ("vat", fields.vat_amount),
        ("gross", fields.gross_amount),
    ] {
        if let Some(value) = amount {
            if value < Decimal::ZERO {
                errors.push(format!("{name} amount must not be negative ({value})"));
            }
        }
    }

    ValidationReport {
        valid: errors.is_empty(),
        errors,
    }
}

/// NIP format check: exactly 10 ASCII digits. Checksum verification lives
/// in the e-invoice integration, not here.
fn is_valid_nip(nip: Option<&str>) -> bool {
    match nip {
        Some(s) => s.len() == 10 && s.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Party;

    fn correct_invoice() -> ExtractedData {
        ExtractedData {
            invoice_number: Some("FV/123/2026".into()),
            issue_date: Some(chrono::NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()),
            due_date: None,
            net_amount: Some(Decimal::new(100000, 2)),
            vat_amount: Some(Decimal::new(23000, 2)),
            gross_amount: Some(Decimal::new(123000, 2)),
            currency: Some("PLN".into()),
            seller: Party {
                name: Some("ACME".into()),
                nip: Some("1234567890".into()),
            },
            buyer: Party {
                name: Some("Widget".into()),
                nip: Some("0987654321".into()),
            },
        }
    }

    #[test]
    fn test_correct_invoice_passes() {
        let report = validate(&correct_invoice());
        assert!(report.valid);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn test_gross_mismatch_reports_difference() {
        let mut fields = correct_invoice();
        // 1000 + 230 != 1300: more than one unit of tolerance off.
        fields.gross_amount = Some(Decimal::new(130000, 2));
        let report = validate(&fields);
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("does not match"));
    }

    #[test]
    fn test_rounding_tolerance_of_one_unit() {
        let mut fields = correct_invoice();
        fields.gross_amount = Some(Decimal::new(123100, 2)); // off by 1.00
        assert!(validate(&fields).valid);

        fields.gross_amount = Some(Decimal::new(123101, 2)); // off by 1.01
        assert!(!validate(&fields).valid);
    }

    #[test]
    fn test_all_violations_are_collected() {
        let fields = ExtractedData {
            invoice_number: Some("   ".into()),
            seller: Party {
                name: None,
                nip: Some("12345".into()),
            },
            ..Default::default()
        };
        let report = validate(&fields);
        assert!(!report.valid);
        // number, issue date, both NIPs, missing amounts.
        assert_eq!(report.errors.len(), 5);
    }

    #[test]
    fn test_nip_with_letters_rejected() {
        let mut fields = correct_invoice();
        fields.buyer.nip = Some("12345678AB".into());
        let report = validate(&fields);
        assert_eq!(report.errors, vec!["buyer tax id must be exactly 10 digits"]);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let mut fields = correct_invoice();
        fields.net_amount = Some(Decimal::new(-100, 2));
        fields.gross_amount = Some(Decimal::new(22900, 2));
        let report = validate(&fields);
        assert!(report.errors.iter().any(|e| e.contains("must not be negative")));
    }
}
