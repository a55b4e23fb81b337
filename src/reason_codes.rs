// =============================================================================
// Reason Codes — raw gate codes to plain English for the UI surface
// =============================================================================
//
// Additive mapping: raw codes stay in diagnostics, the UI gets humanized
// text. `rejected_due_to_delta=N` is a rejection COUNT and must never be
// shown as a delta value.

/// Fixed code -> message vocabulary.
const CODE_MESSAGES: &[(&str, &str)] = &[
    ("FAIL_NO_CANDLES", "Insufficient daily history"),
    ("FAIL_REGIME_CSP", "Daily regime not UP"),
    ("FAIL_REGIME_CC", "Daily regime not DOWN"),
    ("FAIL_RSI_CSP", "RSI outside preferred range"),
    ("FAIL_RSI_CC", "RSI outside preferred range"),
    ("FAIL_ATR_TOO_HIGH", "Volatility too high (ATR cap)"),
    ("FAIL_NOT_NEAR_SUPPORT", "Not near support"),
    ("FAIL_NOT_NEAR_RESISTANCE", "Not near resistance"),
    ("FAIL_NO_HOLDINGS", "No shares held; covered calls disabled"),
    ("FAIL_NOT_HELD_FOR_CC", "No shares held; covered calls disabled"),
    ("FAIL_INTRADAY_REGIME_CONFLICT", "Intraday regime conflicts with daily setup"),
    ("FAIL_INTRADAY_DATA_MISSING", "Intraday confirmation data missing"),
    ("DATA_INCOMPLETE", "Required data missing"),
    ("DATA_STALE", "Required data stale"),
    ("ERROR_MODE_MIXED_CSP", "Mixed option types in CSP request"),
    ("ERROR_MODE_MIXED_CC", "Mixed option types in CC request"),
];

/// Extract N from a `rejected_due_to_delta=N` marker, if present.
fn delta_rejection_count(raw: &str) -> Option<&str> {
    let idx = raw.find("rejected_due_to_delta")?;
    let rest = raw[idx + "rejected_due_to_delta".len()..].trim_start();
    let rest = rest.strip_prefix('=')?.trim_start();
    let end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    if end == 0 {
        return None;
    }
    Some(&rest[..end])
}

/// Convert a raw gate/reason string to display English. Unknown strings pass
/// through (truncated) — the mapping is additive, never lossy for debugging.
pub fn format_reason_for_display(raw: Option<&str>) -> String {
    let Some(raw) = raw else {
        return String::new();
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }

    if let Some(count) = delta_rejection_count(raw) {
        return format!("Rejected due to delta band (rejected_count={count}).");
    }

    for (code, message) in CODE_MESSAGES {
        if raw.contains(code) {
            return (*message).to_string();
        }
    }

    if raw.contains("No contracts passed") {
        return "No contracts passed option liquidity and delta filters.".to_string();
    }

    if raw.len() < 80 {
        raw.to_string()
    } else {
        format!("{}...", &raw[..77])
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_count_is_humanized_never_shown_as_delta() {
        let out = format_reason_for_display(Some("rejected_due_to_delta=32"));
        assert_eq!(out, "Rejected due to delta band (rejected_count=32).");
        assert!(!out.contains("delta=32"));
    }

    #[test]
    fn delta_count_with_spaces() {
        let out = format_reason_for_display(Some("rejected_due_to_delta = 7 contracts"));
        assert_eq!(out, "Rejected due to delta band (rejected_count=7).");
    }

    #[test]
    fn known_codes_map() {
        assert_eq!(
            format_reason_for_display(Some("FAIL_NOT_NEAR_SUPPORT")),
            "Not near support"
        );
        assert_eq!(
            format_reason_for_display(Some("FAIL_NO_HOLDINGS")),
            "No shares held; covered calls disabled"
        );
        assert_eq!(
            format_reason_for_display(Some("DATA_INCOMPLETE - bid not provided by source")),
            "Required data missing"
        );
    }

    #[test]
    fn contract_failure_phrase_maps() {
        let out = format_reason_for_display(Some("No contracts passed filters (74 evaluated)"));
        assert!(out.contains("liquidity and delta filters"));
    }

    #[test]
    fn unknown_short_string_passes_through() {
        assert_eq!(format_reason_for_display(Some("odd reason")), "odd reason");
    }

    #[test]
    fn unknown_long_string_truncates() {
        let long = "x".repeat(120);
        let out = format_reason_for_display(Some(&long));
        assert_eq!(out.len(), 80);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn empty_and_none_are_empty() {
        assert_eq!(format_reason_for_display(None), "");
        assert_eq!(format_reason_for_display(Some("  ")), "");
    }
}
