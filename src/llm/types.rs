use crate::schema::{ConvertedStatement, LineItems};
use crate::utils::round_to;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Reply to a single statement conversion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConversionResult {
    #[schemars(
        description = "Converted IFRS line items keyed by line item name. Values may be numbers, text, or objects holding 'IFRS Value', 'GAAP Value', 'Difference', 'Explanation' and 'Impact'."
    )]
    #[serde(default)]
    pub ifrs_data: LineItems,

    #[schemars(description = "Explanations of every adjustment made during conversion")]
    #[serde(default)]
    pub explanations: Vec<String>,

    #[schemars(description = "Recommendations for achieving IFRS compliance")]
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Disclosure {
    #[schemars(description = "Standard heading, e.g. 'IFRS 16 - Leases'")]
    pub standard: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HealthAnalysis {
    #[schemars(description = "Narrative analysis of the company's financial health")]
    pub analysis: String,

    #[schemars(description = "Key ratios such as 'Current Ratio', 'Quick Ratio', 'Debt to Equity', 'Return on Assets', 'Return on Equity'")]
    pub ratios: BTreeMap<String, f64>,

    pub strengths: Vec<String>,
    pub concerns: Vec<String>,
    pub recommendations: Vec<String>,
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

impl HealthAnalysis {
    /// Lenient conversion of a model reply: missing fields become empty,
    /// non-numeric ratios become 0, numeric ratios are rounded to 2 places.
    pub fn from_value(value: &Value) -> Self {
        let analysis = match value.get("analysis") {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        let ratios = value
            .get("ratios")
            .and_then(Value::as_object)
            .map(|map| {
                map.iter()
                    .map(|(k, v)| {
                        let n = v.as_f64().filter(|n| n.is_finite()).unwrap_or(0.0);
                        (k.clone(), round_to(n, 2))
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            analysis,
            ratios,
            strengths: string_list(value.get("strengths")),
            concerns: string_list(value.get("concerns")),
            recommendations: string_list(value.get("recommendations")),
        }
    }
}

/// Everything the final report is written from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInput {
    pub statements: Vec<ConvertedStatement>,
    pub disclosures: Vec<Disclosure>,
    pub explanations: Vec<String>,
    pub recommendations: Vec<String>,
    pub financial_health_analysis: Option<HealthAnalysis>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_health_analysis_sanitized() {
        let raw = json!({
            "analysis": "Solid",
            "ratios": {"Current Ratio": 1.23456, "Quick Ratio": "n/a"},
            "strengths": ["Cash rich", 42],
            "concerns": "not a list"
        });
        let parsed = HealthAnalysis::from_value(&raw);
        assert_eq!(parsed.analysis, "Solid");
        assert_eq!(parsed.ratios["Current Ratio"], 1.23);
        assert_eq!(parsed.ratios["Quick Ratio"], 0.0);
        assert_eq!(parsed.strengths, vec!["Cash rich".to_string(), "42".to_string()]);
        assert!(parsed.concerns.is_empty());
        assert!(parsed.recommendations.is_empty());
    }

    #[test]
    fn test_conversion_result_defaults_missing_lists() {
        let parsed: ConversionResult =
            serde_json::from_value(json!({"ifrsData": {"Revenue": 100.0}})).unwrap();
        assert_eq!(parsed.ifrs_data.len(), 1);
        assert!(parsed.explanations.is_empty());
    }

    #[test]
    fn test_conversion_schema_mentions_fields() {
        let schema = serde_json::to_string(&schemars::schema_for!(ConversionResult)).unwrap();
        assert!(schema.contains("ifrsData"));
        assert!(schema.contains("explanations"));
    }
}
