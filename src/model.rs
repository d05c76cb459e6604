//! Typed records for extracted metrics and per-document results.
//!
//! A single [`MetricRecord`] type covers every stage: fields a stage has not
//! produced yet stay `None` and are left out of the serialised form, so stage
//! 1 output round-trips as `{code, item}` only.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

/// One energy-consumption data point extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub code: String,
    pub item: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(
        default,
        deserialize_with = "integral",
        skip_serializing_if = "Option::is_none"
    )]
    pub page_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    #[serde(
        default,
        deserialize_with = "integral",
        skip_serializing_if = "Option::is_none"
    )]
    pub year: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flag_reasoning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumption_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevant_information: Option<String>,
}

impl MetricRecord {
    /// A bare stage-1 record.
    pub fn identified(code: impl Into<String>, item: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            item: item.into(),
            value: None,
            unit: None,
            page_number: None,
            snippet: None,
            year: None,
            scope: None,
            flag: None,
            flag_reasoning: None,
            consumption_type: None,
            relevant_information: None,
        }
    }
}

/// Report-level facts produced by the single-shot extractor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub data_sources: String,
    pub data_collector: String,
    /// MM/DD/YYYY
    pub fiscal_year_end: String,
    pub geographical_scope: String,
    pub country: String,
    pub organization_name: String,
}

/// The full structured output for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    #[serde(deserialize_with = "integral_required")]
    pub year: u16,
    pub metrics: Vec<MetricRecord>,
    pub metadata: DocumentMetadata,
}

/// Parse a stage output value into records.
pub fn records_from_value(value: &serde_json::Value) -> Result<Vec<MetricRecord>, serde_json::Error> {
    Vec::<MetricRecord>::deserialize(value)
}

/// Accept `12` and `12.0`, reject `12.5`.
fn integral<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    match Option::<f64>::deserialize(deserializer)? {
        None => Ok(None),
        Some(v) => to_integral(v).map(Some).map_err(D::Error::custom),
    }
}

fn integral_required<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<i64>,
{
    let v = f64::deserialize(deserializer)?;
    to_integral(v).map_err(D::Error::custom)
}

fn to_integral<T: TryFrom<i64>>(v: f64) -> Result<T, String> {
    if !v.is_finite() || v.fract() != 0.0 {
        return Err(format!("expected an integer, got {v}"));
    }
    T::try_from(v as i64).map_err(|_| format!("integer {v} out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stage_one_record_serialises_code_and_item_only() {
        let r = MetricRecord::identified("E1", "Total energy");
        let v = serde_json::to_value(&r).unwrap();
        assert_eq!(v, json!({"code": "E1", "item": "Total energy"}));
    }

    #[test]
    fn integral_floats_accepted() {
        let r: MetricRecord = serde_json::from_value(json!({
            "code": "E1", "item": "x", "page_number": 12.0, "year": 2023
        }))
        .unwrap();
        assert_eq!(r.page_number, Some(12));
        assert_eq!(r.year, Some(2023));
    }

    #[test]
    fn fractional_page_rejected() {
        let r = serde_json::from_value::<MetricRecord>(json!({
            "code": "E1", "item": "x", "page_number": 3.5
        }));
        assert!(r.is_err());
    }

    #[test]
    fn nulls_deserialise_as_none() {
        let r: MetricRecord = serde_json::from_value(json!({
            "code": "E1", "item": "x", "value": null, "unit": null,
            "page_number": null, "snippet": null
        }))
        .unwrap();
        assert_eq!(r, MetricRecord::identified("E1", "x"));
    }

    #[test]
    fn extraction_result_parses() {
        let v = json!({
            "year": 2022.0,
            "metrics": [{"code": "772", "item": "Solar", "value": 12.5, "unit": "GWh"}],
            "metadata": {
                "data_sources": "Annual report",
                "data_collector": "ACME",
                "fiscal_year_end": "12/31/2022",
                "geographical_scope": "Global",
                "country": "France",
                "organization_name": "ACME SA"
            }
        });
        let r: ExtractionResult = serde_json::from_value(v).unwrap();
        assert_eq!(r.year, 2022);
        assert_eq!(r.metrics[0].value, Some(12.5));
    }
}
