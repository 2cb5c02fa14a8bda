//! Prompt builders for each external stage. Callers can replace the
//! disclosures prompt through configuration.

use crate::error::Result;
use crate::llm::types::{ConversionResult, ReportInput};
use crate::schema::LineItems;

fn schema_json<T: schemars::JsonSchema>() -> Result<String> {
    let schema = schemars::schema_for!(T);
    Ok(serde_json::to_string_pretty(&schema)?)
}

pub fn conversion_prompt(gaap_data: &LineItems, language: &str) -> Result<String> {
    Ok(format!(
        "Convert the following GAAP financial data to IFRS:\n\n{}\n\n\
         Provide the converted IFRS data, explanations for any changes, and recommendations \
         for compliance. String values must be written in the \"{}\" language.\n\
         Return ONLY a JSON object matching this schema, with no other text:\n{}",
        serde_json::to_string_pretty(gaap_data)?,
        language,
        schema_json::<ConversionResult>()?
    ))
}

pub const DISCLOSURE_TEMPLATE: &str = "Analyze the financial statements\n\n{data}\n\n\
and generate disclosures for each applicable IFRS/IAS standard in the \"{language}\" language.\n\
Start every standard with a heading of the form:\n\
### IFRS <number> - <Standard Name>\n\
or\n\
### IAS <number> - <Standard Name>\n\
followed by: 1. Policy, 2. Judgments & Estimates, 3. Quantitative Disclosures, 4. Changes & Impacts.";

/// Fills `{data}` and `{language}` in a disclosures template. Templates that
/// lack a `{data}` slot get the data appended.
pub fn disclosures_prompt(
    ifrs_data: &LineItems,
    language: &str,
    template: Option<&str>,
) -> Result<String> {
    let template = template.unwrap_or(DISCLOSURE_TEMPLATE);
    let data = serde_json::to_string_pretty(ifrs_data)?;

    let mut prompt = template.replace("{language}", language);
    if prompt.contains("{data}") {
        prompt = prompt.replace("{data}", &data);
    } else {
        prompt.push_str("\n\n");
        prompt.push_str(&data);
    }
    Ok(prompt)
}

pub fn analysis_prompt(ifrs_data: &LineItems, language: &str) -> Result<String> {
    Ok(format!(
        "Analyze the financial health based on the following IFRS financial data:\n\n{}\n\n\
         Respond in the {} language with valid JSON only, in this shape:\n\
         {{\"analysis\": \"...\", \"ratios\": {{\"Current Ratio\": 0.0, \"Quick Ratio\": 0.0, \
         \"Debt to Equity\": 0.0, \"Return on Assets\": 0.0, \"Return on Equity\": 0.0}}, \
         \"strengths\": [], \"concerns\": [], \"recommendations\": []}}",
        serde_json::to_string_pretty(ifrs_data)?,
        language
    ))
}

pub fn report_prompt(input: &ReportInput, language: &str) -> Result<String> {
    Ok(format!(
        "Generate a comprehensive IFRS-compliant financial report based on the following data:\n\n{}\n\n\
         The report should be in the {} language and include:\n\
         1. Executive Summary\n\
         2. Financial Statements (Balance Sheet, Income Statement, Cash Flow Statement)\n\
         3. Notes to Financial Statements\n\
         4. Disclosures (section heading <h2>Disclosures</h2>)\n\
         5. Financial Health Analysis (section heading <h2>Financial Health Analysis</h2>)\n\
         6. Recommendations\n\
         Format the report as an HTML fragment.",
        serde_json::to_string_pretty(input)?,
        language
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::LineValue;

    fn items() -> LineItems {
        let mut items = LineItems::new();
        items.insert("Revenue".into(), LineValue::Number(1200.0));
        items
    }

    #[test]
    fn test_conversion_prompt_embeds_data_and_schema() {
        let prompt = conversion_prompt(&items(), "ru").unwrap();
        assert!(prompt.contains("\"Revenue\": 1200.0"));
        assert!(prompt.contains("\"ru\""));
        assert!(prompt.contains("ifrsData"));
    }

    #[test]
    fn test_custom_disclosure_template_without_slot() {
        let prompt = disclosures_prompt(&items(), "uz", Some("Only IAS 16 please")).unwrap();
        assert!(prompt.starts_with("Only IAS 16 please"));
        assert!(prompt.contains("Revenue"));
    }

    #[test]
    fn test_default_disclosure_template_fills_slots() {
        let prompt = disclosures_prompt(&items(), "en", None).unwrap();
        assert!(!prompt.contains("{data}"));
        assert!(!prompt.contains("{language}"));
        assert!(prompt.contains("\"en\""));
    }
}

pub fn question_prompt(question: &str, context: &str) -> String {
    format!(
        "Given the following context:\n\n{}\n\nAnswer the following question:\n\n{}\n\n\
         Provide a concise and relevant answer based on the given context.",
        context, question
    )
}
