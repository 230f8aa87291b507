//! Confidence scoring and the review gate.

use crate::models::ConfidenceScores;

/// Default overall-confidence threshold below which review is required.
pub const DEFAULT_REVIEW_THRESHOLD: u8 = 80;

/// Fixed floor for the financially critical fields. An invoice with a high
/// average can still hide one unreliable amount; the floor catches that.
pub const CRITICAL_FIELD_FLOOR: u8 = 70;

/// Rounded arithmetic mean of all present per-field scores; 0 when the
/// extraction produced no scores at all.
pub fn overall_confidence(scores: &ConfidenceScores) -> u8 {
    let present = scores.present();
    if present.is_empty() {
        return 0;
    }
    let sum: u32 = present.iter().map(|&v| v as u32).sum();
    ((sum as f64) / (present.len() as f64)).round() as u8
}

/// Whether a human must look at the extraction before it is trusted.
///
/// Two-tier check: the overall score must clear `threshold`, and each of the
/// four critical fields (invoice number, net, vat, gross) must clear the
/// fixed floor. A critical field with no score at all counts as failing.
pub fn requires_review(overall: u8, scores: &ConfidenceScores, threshold: u8) -> bool {
    if overall < threshold {
        return true;
    }
    [
        scores.invoice_number,
        scores.net_amount,
        scores.vat_amount,
        scores.gross_amount,
    ]
    .into_iter()
    .any(|score| score.unwrap_or(0) < CRITICAL_FIELD_FLOOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(invoice_number: u8, net: u8, vat: u8, gross: u8) -> ConfidenceScores {
        ConfidenceScores {
            invoice_number: Some(invoice_number),
            net_amount: Some(net),
            vat_amount: Some(vat),
            gross_amount: Some(gross),
            ..Default::default()
        }
    }

    #[test]
    fn test_overall_is_rounded_mean() {
        // 90 + 80 + 70 + 100 = 340, / 4 = 85.
        assert_eq!(overall_confidence(&scores(90, 80, 70, 100)), 85);
    }

    #[test]
    fn test_overall_rounds_to_nearest() {
        // 90 + 91 = 181, / 2 = 90.5 -> 91.
        let s = ConfidenceScores {
            invoice_number: Some(90),
            net_amount: Some(91),
            ..Default::default()
        };
        assert_eq!(overall_confidence(&s), 91);
    }

    #[test]
    fn test_overall_empty_is_zero() {
        assert_eq!(overall_confidence(&ConfidenceScores::default()), 0);
    }

    #[test]
    fn test_critical_floor_triggers_despite_high_overall() {
        // Overall 85 is above the threshold, but gross at 60 is below the floor.
        assert!(requires_review(
            85,
            &scores(90, 90, 90, 60),
            DEFAULT_REVIEW_THRESHOLD
        ));
    }

    #[test]
    fn test_high_scores_pass() {
        assert!(!requires_review(
            90,
            &scores(90, 90, 90, 90),
            DEFAULT_REVIEW_THRESHOLD
        ));
    }

    #[test]
    fn test_low_overall_triggers() {
        assert!(requires_review(
            79,
            &scores(90, 90, 90, 90),
            DEFAULT_REVIEW_THRESHOLD
        ));
        assert!(!requires_review(
            80,
            &scores(90, 90, 90, 90),
            DEFAULT_REVIEW_THRESHOLD
        ));
    }

    #[test]
    fn test_missing_critical_score_triggers() {
        let s = ConfidenceScores {
            invoice_number: Some(95),
            net_amount: Some(95),
            vat_amount: Some(95),
            gross_amount: None,
            ..Default::default()
        };
        assert!(requires_review(95, &s, DEFAULT_REVIEW_THRESHOLD));
    }
}
