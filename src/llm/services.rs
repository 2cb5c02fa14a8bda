use crate::config::ConverterConfig;
use crate::error::{ConverterError, Result};
use crate::llm::gateway::LlmGateway;
use crate::llm::prompts;
use crate::llm::types::{ConversionResult, Disclosure, HealthAnalysis, ReportInput};
use crate::llm::utils::{html_escape, parse_json_response, strip_code_fences};
use crate::schema::LineItems;
use log::{debug, error, info};
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, OnceLock};

/// The structured calls the pipeline makes against the gateway, plus
/// free-form questions about the finished report.
#[derive(Clone)]
pub struct IfrsAssistant {
    gateway: Arc<dyn LlmGateway>,
    config: Arc<ConverterConfig>,
}

impl IfrsAssistant {
    pub fn new(gateway: Arc<dyn LlmGateway>, config: Arc<ConverterConfig>) -> Self {
        Self { gateway, config }
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    pub async fn convert_statement(&self, gaap_data: &LineItems) -> Result<ConversionResult> {
        let prompt = prompts::conversion_prompt(gaap_data, &self.config.language)?;
        debug!("Converting GAAP to IFRS ({} line items)", gaap_data.len());

        let raw = self.gateway.complete(&prompt, &self.config.conversion).await?;
        let result: ConversionResult = parse_json_response(&raw)?;

        info!(
            "GAAP to IFRS conversion completed with {} line items",
            result.ifrs_data.len()
        );
        Ok(result)
    }

    pub async fn generate_disclosures(&self, ifrs_data: &LineItems) -> Result<Vec<Disclosure>> {
        let prompt = prompts::disclosures_prompt(
            ifrs_data,
            &self.config.language,
            self.config.custom_disclosures_prompt.as_deref(),
        )?;

        let raw = self
            .gateway
            .complete(&prompt, &self.config.disclosures)
            .await?;
        let disclosures = parse_disclosure_reply(&raw)?;

        info!(
            "IFRS disclosure generation completed with {} standards",
            disclosures.len()
        );
        Ok(disclosures)
    }

    pub async fn analyze_health(&self, ifrs_data: &LineItems) -> Result<HealthAnalysis> {
        let prompt = prompts::analysis_prompt(ifrs_data, &self.config.language)?;
        let raw = self.gateway.complete(&prompt, &self.config.analysis).await?;

        let value: serde_json::Value = parse_json_response(&raw)?;
        if !value.is_object() {
            error!("Health analysis reply is not a JSON object");
            return Err(ConverterError::InvalidResponse(
                "health analysis must be a JSON object".to_string(),
            ));
        }

        Ok(HealthAnalysis::from_value(&value))
    }

    pub async fn generate_report(&self, input: &ReportInput) -> Result<String> {
        let prompt = prompts::report_prompt(input, &self.config.language)?;
        let raw = self.gateway.complete(&prompt, &self.config.report).await?;

        let content = strip_code_fences(&raw);
        if content.trim().is_empty() {
            return Err(ConverterError::InvalidResponse(
                "report reply is empty".to_string(),
            ));
        }

        info!("Final report generation completed successfully");
        Ok(post_process_report(&content, input))
    }

    /// Answers a question using `context` (usually the report) as grounding.
    pub async fn answer_question(&self, question: &str, context: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(ConverterError::EmptyQuestion);
        }
        debug!("Answering report question ({} chars of context)", context.len());

        let prompt = prompts::question_prompt(question, context);
        let answer = self.gateway.complete(&prompt, &self.config.chatbot).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(ConverterError::InvalidResponse(
                "answer is empty".to_string(),
            ));
        }

        info!("Report question answered");
        Ok(answer.to_string())
    }
}

fn disclosure_heading() -> &'static Regex {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    HEADING.get_or_init(|| {
        Regex::new(r"^#{2,4}\s*(IFRS|IAS)\s+\d+\s*[-–:]").expect("valid disclosure heading pattern")
    })
}

/// Splits a markdown reply into one disclosure per `### IFRS n - …` /
/// `### IAS n - …` heading. Text before the first heading is dropped.
pub fn parse_disclosures(content: &str) -> Vec<Disclosure> {
    let heading = disclosure_heading();
    let mut disclosures = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in content.lines() {
        if heading.is_match(line.trim_start()) {
            if let Some((standard, body)) = current.take() {
                push_disclosure(&mut disclosures, standard, body);
            }
            let standard = line.trim().trim_start_matches('#').trim().to_string();
            current = Some((standard, String::new()));
        } else if let Some((_, body)) = current.as_mut() {
            body.push_str(line);
            body.push('\n');
        }
    }

    if let Some((standard, body)) = current {
        push_disclosure(&mut disclosures, standard, body);
    }

    disclosures
}

fn push_disclosure(out: &mut Vec<Disclosure>, standard: String, body: String) {
    let content = body.trim().to_string();
    if !content.is_empty() {
        out.push(Disclosure { standard, content });
    }
}

#[derive(Deserialize)]
struct DisclosureEnvelope {
    disclosures: Vec<Disclosure>,
}

/// Accepts either `{"disclosures": [...]}` JSON or the markdown heading layout.
pub fn parse_disclosure_reply(raw: &str) -> Result<Vec<Disclosure>> {
    let stripped = strip_code_fences(raw);

    if let Ok(envelope) = serde_json::from_str::<DisclosureEnvelope>(stripped.trim()) {
        return Ok(envelope.disclosures);
    }

    let disclosures = parse_disclosures(&stripped);
    if disclosures.is_empty() {
        error!("No IFRS/IAS headings found in disclosure reply");
        return Err(ConverterError::InvalidResponse(
            "no IFRS/IAS disclosure sections found".to_string(),
        ));
    }
    Ok(disclosures)
}

/// Expands the disclosures and health analysis placeholders in the report
/// with the structured data the pipeline already holds.
pub fn post_process_report(content: &str, input: &ReportInput) -> String {
    let mut report = content.to_string();

    if !input.disclosures.is_empty() {
        let mut html = String::from("<h2>Disclosures</h2>");
        for d in &input.disclosures {
            html.push_str(&format!(
                "\n<h3>{}</h3>\n<p>{}</p>",
                html_escape(&d.standard),
                html_escape(&d.content)
            ));
        }
        report = report.replacen("<h2>Disclosures</h2>", &html, 1);
    }

    if let Some(analysis) = &input.financial_health_analysis {
        let list = |items: &[String]| -> String {
            items
                .iter()
                .map(|i| format!("<li>{}</li>", html_escape(i)))
                .collect::<String>()
        };
        let ratios: String = analysis
            .ratios
            .iter()
            .map(|(k, v)| format!("<li>{}: {}</li>", html_escape(k), v))
            .collect();

        let html = format!(
            "<h2>Financial Health Analysis</h2>\n<p>{}</p>\n\
             <h3>Key Financial Ratios</h3>\n<ul>{}</ul>\n\
             <h3>Strengths</h3>\n<ul>{}</ul>\n\
             <h3>Concerns</h3>\n<ul>{}</ul>\n\
             <h3>Recommendations</h3>\n<ul>{}</ul>",
            html_escape(&analysis.analysis),
            ratios,
            list(&analysis.strengths),
            list(&analysis.concerns),
            list(&analysis.recommendations)
        );
        report = report.replacen("<h2>Financial Health Analysis</h2>", &html, 1);
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::gateway::CompletionOptions;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct CannedGateway {
        reply: String,
        prompts: Mutex<Vec<(String, CompletionOptions)>>,
    }

    impl CannedGateway {
        fn new(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmGateway for CannedGateway {
        async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
            self.prompts
                .lock()
                .unwrap()
                .push((prompt.to_string(), options.clone()));
            Ok(self.reply.clone())
        }
    }

    fn assistant(gateway: Arc<CannedGateway>) -> IfrsAssistant {
        IfrsAssistant::new(gateway, Arc::new(ConverterConfig::default()))
    }

    #[test]
    fn test_parse_markdown_disclosures() {
        let content = "Intro text\n\
                       ### IFRS 16 - Leases\n1. Policy: straight line\n\n\
                       ### IAS 2 - Inventories\nFIFO used\n\
                       ### IAS 7 - Statement of Cash Flows\n";
        let disclosures = parse_disclosures(content);
        assert_eq!(disclosures.len(), 2);
        assert_eq!(disclosures[0].standard, "IFRS 16 - Leases");
        assert_eq!(disclosures[0].content, "1. Policy: straight line");
        assert_eq!(disclosures[1].standard, "IAS 2 - Inventories");
    }

    #[test]
    fn test_disclosure_reply_accepts_json_envelope() {
        let raw = "```json\n{\"disclosures\": [{\"standard\": \"IFRS 15 - Revenue\", \"content\": \"Five step model\"}]}\n```";
        let disclosures = parse_disclosure_reply(raw).unwrap();
        assert_eq!(disclosures[0].standard, "IFRS 15 - Revenue");
    }

    #[test]
    fn test_disclosure_reply_without_sections_is_error() {
        let err = parse_disclosure_reply("I cannot help with that.").unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_convert_uses_conversion_options() {
        let gateway = CannedGateway::new(
            "```json\n{\"ifrsData\": {\"Revenue\": 95.0}, \"explanations\": [\"IFRS 15\"], \"recommendations\": []}\n```",
        );
        let assistant = assistant(gateway.clone());

        let mut gaap = LineItems::new();
        gaap.insert("Revenue".into(), 100.0.into());
        let result = assistant.convert_statement(&gaap).await.unwrap();

        assert_eq!(result.ifrs_data["Revenue"].as_number(), Some(95.0));
        assert_eq!(result.explanations, vec!["IFRS 15".to_string()]);

        let calls = gateway.prompts.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.temperature, 0.0);
        assert_eq!(calls[0].1.max_tokens, 5000);
    }

    #[tokio::test]
    async fn test_answer_question_uses_chatbot_options() {
        let gateway = CannedGateway::new("  Leases are capitalised under IFRS 16.\n");
        let assistant = assistant(gateway.clone());

        let answer = assistant
            .answer_question(" How are leases treated? ", "<h2>Notes</h2><p>IFRS 16 applied</p>")
            .await
            .unwrap();
        assert_eq!(answer, "Leases are capitalised under IFRS 16.");

        let calls = gateway.prompts.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (prompt, options) = &calls[0];
        assert!(prompt.contains("<h2>Notes</h2><p>IFRS 16 applied</p>"));
        assert!(prompt.contains("How are leases treated?"));
        assert!(prompt.find("IFRS 16 applied") < prompt.find("How are leases treated?"));
        assert_eq!(options.temperature, 0.7);
        assert_eq!(options.max_tokens, 2000);
        assert_eq!(
            options.system.as_deref(),
            Some("You are a helpful assistant specializing in IFRS and financial reporting.")
        );
    }

    #[tokio::test]
    async fn test_blank_question_skips_gateway() {
        let gateway = CannedGateway::new("unused");
        let assistant = assistant(gateway.clone());

        let err = assistant.answer_question("   ", "context").await.unwrap_err();
        assert!(matches!(err, ConverterError::EmptyQuestion));
        assert!(gateway.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_analysis_rejects_non_object() {
        let assistant = assistant(CannedGateway::new("[1, 2, 3]"));
        let err = assistant.analyze_health(&LineItems::new()).await.unwrap_err();
        assert!(matches!(err, ConverterError::InvalidResponse(_)));
    }

    #[test]
    fn test_post_process_expands_sections() {
        let input = ReportInput {
            disclosures: vec![Disclosure {
                standard: "IAS 2 - Inventories".into(),
                content: "Cost < NRV".into(),
            }],
            financial_health_analysis: Some(HealthAnalysis {
                analysis: "Stable".into(),
                strengths: vec!["Liquidity".into()],
                ..HealthAnalysis::default()
            }),
            ..ReportInput::default()
        };
        let html = post_process_report(
            "<h1>Report</h1><h2>Disclosures</h2><h2>Financial Health Analysis</h2>",
            &input,
        );
        assert!(html.contains("<h3>IAS 2 - Inventories</h3>"));
        assert!(html.contains("Cost &lt; NRV"));
        assert!(html.contains("<li>Liquidity</li>"));
    }
}
