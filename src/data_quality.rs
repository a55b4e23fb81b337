// =============================================================================
// Data Quality Model — field-level VALID / MISSING / ERROR tracking
// =============================================================================
//
// Every market-data field that flows through the engine is wrapped as a
// `FieldValue` so that downstream gates branch on *quality*, never on numeric
// defaults. A missing field is MISSING, not 0; a field that failed coercion
// is ERROR, not "UNKNOWN". Sentinel zeros and "UNKNOWN" strings are forbidden
// for required fields everywhere in the pipeline.

use serde::{Deserialize, Serialize};

/// Quality status for a single field.
///
/// VALID:   fetched and holds a usable value (including 0 when zero is legal).
/// MISSING: not provided by the data source. Never treated as 0.
/// ERROR:   the fetch or coercion failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataQuality {
    Valid,
    Missing,
    Error,
}

impl std::fmt::Display for DataQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "VALID"),
            Self::Missing => write!(f, "MISSING"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// A value paired with its quality metadata.
///
/// Invariant: `quality == Valid` ⇔ `value.is_some()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue<T> {
    pub value: Option<T>,
    pub quality: DataQuality,
    pub reason: String,
    pub field_name: String,
}

impl<T> FieldValue<T> {
    /// Construct a VALID field.
    pub fn valid(field_name: impl Into<String>, value: T) -> Self {
        Self {
            value: Some(value),
            quality: DataQuality::Valid,
            reason: String::new(),
            field_name: field_name.into(),
        }
    }

    /// Construct a MISSING field with the standard not-provided reason.
    pub fn missing(field_name: impl Into<String>) -> Self {
        let name = field_name.into();
        Self {
            value: None,
            quality: DataQuality::Missing,
            reason: format!("{name} not provided by source"),
            field_name: name,
        }
    }

    /// Construct a MISSING field for a zero that the policy forbids.
    pub fn missing_zero(field_name: impl Into<String>) -> Self {
        let name = field_name.into();
        Self {
            value: None,
            quality: DataQuality::Missing,
            reason: format!("{name} is zero (treated as missing)"),
            field_name: name,
        }
    }

    /// Construct an ERROR field with a coercion-failure reason.
    pub fn error(field_name: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        let name = field_name.into();
        Self {
            value: None,
            quality: DataQuality::Error,
            reason: format!("{name} coercion failed: {detail}"),
            field_name: name,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.quality == DataQuality::Valid
    }

    pub fn is_missing(&self) -> bool {
        self.quality == DataQuality::Missing
    }
}

impl<T: Copy> FieldValue<T> {
    /// Copy out the value when VALID.
    pub fn value_copied(&self) -> Option<T> {
        if self.is_valid() {
            self.value
        } else {
            None
        }
    }

    /// Value when VALID, otherwise `default`.
    pub fn value_or(&self, default: T) -> T {
        self.value_copied().unwrap_or(default)
    }
}

/// Wrap a raw float. `None` is MISSING; a non-finite value is ERROR; zero is
/// VALID unless `allow_zero` is false.
pub fn wrap_f64(raw: Option<f64>, field_name: &str, allow_zero: bool) -> FieldValue<f64> {
    match raw {
        None => FieldValue::missing(field_name),
        Some(v) if !v.is_finite() => FieldValue::error(field_name, format!("non-finite value {v}")),
        Some(v) if !allow_zero && v == 0.0 => FieldValue::missing_zero(field_name),
        Some(v) => FieldValue::valid(field_name, v),
    }
}

/// Wrap a raw integer. `None` is MISSING; zero is VALID unless `allow_zero`
/// is false.
pub fn wrap_i64(raw: Option<i64>, field_name: &str, allow_zero: bool) -> FieldValue<i64> {
    match raw {
        None => FieldValue::missing(field_name),
        Some(0) if !allow_zero => FieldValue::missing_zero(field_name),
        Some(v) => FieldValue::valid(field_name, v),
    }
}

/// Completeness over a set of (name, quality) pairs: fraction VALID plus the
/// names of every non-VALID field. An empty set is fully complete.
pub fn compute_completeness(fields: &[(&str, DataQuality)]) -> (f64, Vec<String>) {
    if fields.is_empty() {
        return (1.0, Vec::new());
    }
    let valid = fields.iter().filter(|(_, q)| *q == DataQuality::Valid).count();
    let missing: Vec<String> = fields
        .iter()
        .filter(|(_, q)| *q != DataQuality::Valid)
        .map(|(name, _)| (*name).to_string())
        .collect();
    (valid as f64 / fields.len() as f64, missing)
}

/// Human-readable summary of incomplete data for verdict reasons.
pub fn build_data_incomplete_reason(missing_fields: &[String]) -> String {
    match missing_fields.len() {
        0 => String::new(),
        1 => format!("DATA_INCOMPLETE - {} not provided by source", missing_fields[0]),
        2 | 3 => format!("DATA_INCOMPLETE - missing: {}", missing_fields.join(", ")),
        n => format!(
            "DATA_INCOMPLETE - {} fields missing ({}, ...)",
            n,
            missing_fields[..3].join(", ")
        ),
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_is_missing() {
        let f = wrap_f64(None, "bid", true);
        assert_eq!(f.quality, DataQuality::Missing);
        assert!(f.value.is_none());
        assert_eq!(f.reason, "bid not provided by source");
    }

    #[test]
    fn valid_iff_value_present() {
        let f = wrap_f64(Some(150.25), "price", true);
        assert!(f.is_valid());
        assert_eq!(f.value, Some(150.25));
        assert!(f.reason.is_empty());
    }

    #[test]
    fn zero_valid_by_default() {
        let f = wrap_f64(Some(0.0), "volume", true);
        assert!(f.is_valid());
        assert_eq!(f.value, Some(0.0));
    }

    #[test]
    fn zero_missing_when_disallowed() {
        let f = wrap_f64(Some(0.0), "volume", false);
        assert_eq!(f.quality, DataQuality::Missing);
        assert!(f.value.is_none());
        assert_eq!(f.reason, "volume is zero (treated as missing)");
    }

    #[test]
    fn non_finite_is_error() {
        let f = wrap_f64(Some(f64::NAN), "delta", true);
        assert_eq!(f.quality, DataQuality::Error);
        assert!(f.value.is_none());
        assert!(f.reason.contains("coercion failed"));
    }

    #[test]
    fn int_zero_policy() {
        assert!(wrap_i64(Some(0), "open_interest", true).is_valid());
        assert_eq!(
            wrap_i64(Some(0), "open_interest", false).quality,
            DataQuality::Missing
        );
    }

    #[test]
    fn completeness_half() {
        let fields = [
            ("price", DataQuality::Valid),
            ("bid", DataQuality::Missing),
        ];
        let (pct, missing) = compute_completeness(&fields);
        assert!((pct - 0.5).abs() < 1e-12);
        assert_eq!(missing, vec!["bid".to_string()]);
    }

    #[test]
    fn completeness_empty_is_full() {
        let (pct, missing) = compute_completeness(&[]);
        assert!((pct - 1.0).abs() < 1e-12);
        assert!(missing.is_empty());
    }

    #[test]
    fn completeness_counts_error_as_incomplete() {
        let fields = [
            ("price", DataQuality::Valid),
            ("iv_rank", DataQuality::Error),
            ("volume", DataQuality::Valid),
        ];
        let (pct, missing) = compute_completeness(&fields);
        assert!((pct - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(missing, vec!["iv_rank".to_string()]);
    }

    #[test]
    fn incomplete_reason_vocabulary() {
        assert_eq!(
            build_data_incomplete_reason(&["bid".into()]),
            "DATA_INCOMPLETE - bid not provided by source"
        );
        assert_eq!(
            build_data_incomplete_reason(&["bid".into(), "ask".into()]),
            "DATA_INCOMPLETE - missing: bid, ask"
        );
        let many: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            build_data_incomplete_reason(&many),
            "DATA_INCOMPLETE - 5 fields missing (a, b, c, ...)"
        );
    }

    #[test]
    fn field_value_serde_roundtrip() {
        let f = wrap_f64(Some(42.0), "price", true);
        let json = serde_json::to_string(&f).unwrap();
        let back: FieldValue<f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, f);
    }
}
