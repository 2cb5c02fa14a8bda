//! The seven-step conversion session.
//!
//! A [`ConversionSession`] owns one [`PipelineState`] and moves it through
//! parse → edit → convert → reconcile → disclose → analyze → report. Every
//! step has exactly one trigger that advances it; calling a trigger in any
//! other step is an [`ConverterError::InvalidTransition`]. External calls run
//! one at a time, report progress on a watch channel and can be cancelled.

mod progress;
mod reconcile;

pub use progress::{until_cancelled, ProgressTracker};
pub use reconcile::{apply_overrides, Overrides, IFRS_VALUE_KEY};

use crate::config::{ConverterConfig, RetryPolicy};
use crate::diagnostics::{DiagnosticSink, LogSink};
use crate::error::{ConverterError, Result};
use crate::ingestion::parse_statement_file;
use crate::llm::{Disclosure, HealthAnalysis, IfrsAssistant, LlmGateway, ReportInput};
use crate::ratios::{assess_health, FinancialRatios, HealthAssessment};
use crate::repository::{ConversionRecord, ProjectRepository, ProjectStatus};
use crate::schema::{ConvertedStatement, GeneratedStatements, LineItems, StatementFile};
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PipelineStep {
    ParsingFiles = 1,
    EditingData = 2,
    ConvertingToIfrs = 3,
    Reconciling = 4,
    GeneratingDisclosures = 5,
    AnalyzingHealth = 6,
    GeneratingReport = 7,
    Done = 8,
}

impl PipelineStep {
    /// Number of working steps; `Done` is not counted.
    pub const TOTAL: u8 = 7;

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn previous(self) -> Option<Self> {
        use PipelineStep::*;
        match self {
            ParsingFiles => None,
            EditingData => Some(ParsingFiles),
            ConvertingToIfrs => Some(EditingData),
            Reconciling => Some(ConvertingToIfrs),
            GeneratingDisclosures => Some(Reconciling),
            AnalyzingHealth => Some(GeneratingDisclosures),
            GeneratingReport => Some(AnalyzingHealth),
            Done => Some(GeneratingReport),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PipelineEvent {
    StepChanged {
        from: PipelineStep,
        to: PipelineStep,
    },
    Progress(u8),
    StatementConverted {
        index: usize,
        name: String,
    },
    StepFailed {
        step: PipelineStep,
        message: String,
    },
    Cancelled {
        step: PipelineStep,
    },
    Completed,
}

/// Result of parsing one uploaded file.
#[derive(Debug)]
pub struct FileParseOutcome {
    pub name: String,
    pub result: Result<StatementFile>,
}

impl FileParseOutcome {
    pub fn parsed(file: StatementFile) -> Self {
        Self {
            name: file.name.clone(),
            result: Ok(file),
        }
    }

    pub fn failed(name: impl Into<String>, error: ConverterError) -> Self {
        Self {
            name: name.into(),
            result: Err(error),
        }
    }

    pub fn from_path(path: &Path, sink: &dyn DiagnosticSink) -> Self {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        Self {
            name,
            result: parse_statement_file(path, sink),
        }
    }
}

/// Deterministic ratios computed from the ledger, shown next to the LLM analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioOverlay {
    pub ratios: FinancialRatios,
    pub assessment: HealthAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineState {
    pub step: PipelineStep,
    pub statements: Vec<StatementFile>,
    pub converted: Vec<ConvertedStatement>,
    pub explanations: Vec<String>,
    pub recommendations: Vec<String>,
    pub disclosures: Vec<Disclosure>,
    pub health_analysis: Option<HealthAnalysis>,
    pub ratio_overlay: Option<RatioOverlay>,
    pub report: Option<String>,
    /// Index of the next statement to convert.
    pub cursor: usize,
    pub errors: BTreeMap<PipelineStep, String>,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            step: PipelineStep::ParsingFiles,
            statements: Vec::new(),
            converted: Vec::new(),
            explanations: Vec::new(),
            recommendations: Vec::new(),
            disclosures: Vec::new(),
            health_analysis: None,
            ratio_overlay: None,
            report: None,
            cursor: 0,
            errors: BTreeMap::new(),
        }
    }
}

impl PipelineState {
    pub fn step_error(&self, step: PipelineStep) -> Option<&str> {
        self.errors.get(&step).map(String::as_str)
    }

    /// IFRS line items of every converted statement merged into one map;
    /// later statements win on duplicate keys.
    pub fn merged_ifrs_data(&self) -> LineItems {
        let mut merged = LineItems::new();
        for statement in &self.converted {
            merged.extend(
                statement
                    .ifrs_data
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone())),
            );
        }
        merged
    }
}

pub struct ConversionSession {
    assistant: IfrsAssistant,
    config: Arc<ConverterConfig>,
    state: PipelineState,
    tracker: ProgressTracker,
    events: Option<mpsc::Sender<PipelineEvent>>,
    cancel: CancellationToken,
    repository: Option<(Arc<dyn ProjectRepository>, String)>,
    sink: Arc<dyn DiagnosticSink>,
    ledger: Option<GeneratedStatements>,
}

impl ConversionSession {
    pub fn new(gateway: Arc<dyn LlmGateway>, config: ConverterConfig) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        Ok(Self {
            assistant: IfrsAssistant::new(gateway, config.clone()),
            tracker: ProgressTracker::new(config.progress.clone()),
            config,
            state: PipelineState::default(),
            events: None,
            cancel: CancellationToken::new(),
            repository: None,
            sink: Arc::new(LogSink),
            ledger: None,
        })
    }

    #[must_use]
    pub fn with_events(mut self, events: mpsc::Sender<PipelineEvent>) -> Self {
        self.tracker.set_events(Some(events.clone()));
        self.events = Some(events);
        self
    }

    /// Saves a [`ConversionRecord`] to `project_id` once the report is generated.
    #[must_use]
    pub fn with_repository(
        mut self,
        repository: Arc<dyn ProjectRepository>,
        project_id: impl Into<String>,
    ) -> Self {
        self.repository = Some((repository, project_id.into()));
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Ledger statements used for the deterministic ratio overlay in step 6.
    #[must_use]
    pub fn with_ledger_statements(mut self, statements: GeneratedStatements) -> Self {
        self.ledger = Some(statements);
        self
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn step(&self) -> PipelineStep {
        self.state.step
    }

    pub fn step_error(&self, step: PipelineStep) -> Option<&str> {
        self.state.step_error(step)
    }

    pub fn progress(&self) -> u8 {
        self.tracker.get()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<u8> {
        self.tracker.subscribe()
    }

    /// Handle that cancels the call currently in flight. A cancelled session
    /// switches to a fresh token, so fetch a new handle after each cancellation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn ensure_step(&self, expected: PipelineStep, action: &'static str) -> Result<()> {
        if self.state.step == expected {
            Ok(())
        } else {
            Err(ConverterError::InvalidTransition {
                step: self.state.step,
                action,
            })
        }
    }

    async fn send_event(&self, event: PipelineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }

    async fn advance(&mut self, to: PipelineStep) {
        let from = self.state.step;
        self.state.step = to;
        info!("Pipeline step {:?} -> {:?}", from, to);
        self.send_event(PipelineEvent::StepChanged { from, to }).await;
    }

    async fn fail(&mut self, step: PipelineStep, err: &ConverterError) {
        error!("Pipeline step {:?} failed: {}", step, err);
        self.state.errors.insert(step, err.to_string());
        self.send_event(PipelineEvent::StepFailed {
            step,
            message: err.to_string(),
        })
        .await;
    }

    async fn cancelled(&mut self, step: PipelineStep) {
        warn!("Pipeline step {:?} cancelled", step);
        self.cancel = CancellationToken::new();
        self.send_event(PipelineEvent::Cancelled { step }).await;
    }

    /// Steps back one step, keeping every payload.
    pub async fn go_back(&mut self) -> Result<PipelineStep> {
        let previous = self
            .state
            .step
            .previous()
            .ok_or(ConverterError::InvalidTransition {
                step: self.state.step,
                action: "go_back",
            })?;
        self.advance(previous).await;
        Ok(previous)
    }

    /// Step 1. Successfully parsed files are appended to the statements
    /// already collected; any failure keeps the session at step 1.
    pub async fn complete_parsing(&mut self, outcomes: Vec<FileParseOutcome>) -> Result<()> {
        self.ensure_step(PipelineStep::ParsingFiles, "complete_parsing")?;

        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome.result {
                Ok(file) => {
                    debug!("Parsed {} ({} line items)", file.name, file.gaap_data.len());
                    self.state.statements.push(file);
                }
                Err(err) => failures.push((outcome.name, err)),
            }
        }

        if failures.is_empty() {
            self.state.errors.remove(&PipelineStep::ParsingFiles);
            self.advance(PipelineStep::EditingData).await;
            return Ok(());
        }

        let message = failures
            .iter()
            .map(|(name, err)| format!("{}: {}", name, err))
            .collect::<Vec<_>>()
            .join("\n");
        error!("Error parsing files: {}", message);
        self.state
            .errors
            .insert(PipelineStep::ParsingFiles, message.clone());
        self.send_event(PipelineEvent::StepFailed {
            step: PipelineStep::ParsingFiles,
            message,
        })
        .await;

        let (_, first) = failures.remove(0);
        Err(first)
    }

    /// Step 2. Replaces the GAAP data of one statement.
    pub fn edit_statement(&mut self, index: usize, gaap_data: LineItems) -> Result<()> {
        self.ensure_step(PipelineStep::EditingData, "edit_statement")?;
        let len = self.state.statements.len();
        let statement = self
            .state
            .statements
            .get_mut(index)
            .ok_or(ConverterError::IndexOutOfRange { index, len })?;

        info!("Data edited for statement {} ({})", index, statement.name);
        statement.gaap_data = gaap_data;
        Ok(())
    }

    pub async fn finish_editing(&mut self) -> Result<()> {
        self.ensure_step(PipelineStep::EditingData, "finish_editing")?;
        self.advance(PipelineStep::ConvertingToIfrs).await;
        Ok(())
    }

    /// Step 3. Converts every statement, one gateway call at a time. After a
    /// failure this behaves like [`retry_conversion`](Self::retry_conversion).
    pub async fn run_conversion(&mut self) -> Result<()> {
        self.ensure_step(PipelineStep::ConvertingToIfrs, "run_conversion")?;
        if self.state.step_error(PipelineStep::ConvertingToIfrs).is_some() {
            return self.retry_conversion().await;
        }

        self.reset_conversion();
        self.mark_project_in_progress().await;
        self.convert_pending().await
    }

    /// Re-runs conversion after a failure according to the configured
    /// [`RetryPolicy`].
    pub async fn retry_conversion(&mut self) -> Result<()> {
        self.ensure_step(PipelineStep::ConvertingToIfrs, "retry_conversion")?;
        self.state.errors.remove(&PipelineStep::ConvertingToIfrs);

        match self.config.retry_policy {
            RetryPolicy::RestartAll => {
                info!("Retrying conversion from the first statement");
                self.reset_conversion();
            }
            RetryPolicy::PerItem => {
                info!("Retrying conversion from statement {}", self.state.cursor);
                self.state.converted.truncate(self.state.cursor);
            }
        }
        self.convert_pending().await
    }

    fn reset_conversion(&mut self) {
        self.state.cursor = 0;
        self.state.converted.clear();
        self.state.explanations.clear();
        self.state.recommendations.clear();
        self.tracker.set(0);
    }

    async fn convert_pending(&mut self) -> Result<()> {
        let total = self.state.statements.len();
        let start = self.state.cursor;
        let token = self.cancel.clone();
        let assistant = self.assistant.clone();

        let pending: Vec<(usize, StatementFile)> = self
            .state
            .statements
            .iter()
            .cloned()
            .enumerate()
            .skip(start)
            .collect();

        let mut results = Box::pin(stream::iter(pending).then(move |(index, file)| {
            let assistant = assistant.clone();
            async move {
                let result = assistant.convert_statement(&file.gaap_data).await;
                (index, file, result)
            }
        }));

        loop {
            let next = match until_cancelled(async { Ok(results.next().await) }, &token).await {
                Ok(next) => next,
                Err(err) => {
                    self.cancelled(PipelineStep::ConvertingToIfrs).await;
                    return Err(err);
                }
            };
            let Some((index, file, result)) = next else {
                break;
            };

            match result {
                Ok(conversion) => {
                    self.state.converted.push(ConvertedStatement {
                        name: file.name.clone(),
                        gaap_data: file.gaap_data,
                        ifrs_data: conversion.ifrs_data,
                    });
                    self.state.explanations.extend(conversion.explanations);
                    self.state.recommendations.extend(conversion.recommendations);
                    self.state.cursor = index + 1;
                    self.tracker.set(((index + 1) * 100 / total) as u8);
                    self.send_event(PipelineEvent::StatementConverted {
                        index,
                        name: file.name,
                    })
                    .await;
                }
                Err(err) => {
                    self.state.cursor = index;
                    self.tracker.set((index * 100 / total) as u8);
                    self.fail(PipelineStep::ConvertingToIfrs, &err).await;
                    return Err(err);
                }
            }
        }

        info!("Conversion complete ({} statements)", self.state.converted.len());
        self.tracker.set(100);
        self.advance(PipelineStep::Reconciling).await;
        Ok(())
    }

    /// Step 4. Applies manual overrides to the converted IFRS data.
    pub async fn reconcile(&mut self, overrides: Overrides) -> Result<()> {
        self.ensure_step(PipelineStep::Reconciling, "reconcile")?;
        self.state.converted = apply_overrides(&self.state.converted, &overrides, &*self.sink);
        self.tracker.set(100);
        self.advance(PipelineStep::GeneratingDisclosures).await;
        Ok(())
    }

    /// Step 5. Calling it again after a failure reruns only this step.
    pub async fn generate_disclosures(&mut self) -> Result<()> {
        self.ensure_step(PipelineStep::GeneratingDisclosures, "generate_disclosures")?;
        let merged = self.state.merged_ifrs_data();

        self.tracker.set(0);
        let result = self
            .tracker
            .run(self.assistant.generate_disclosures(&merged), &self.cancel)
            .await;

        match result {
            Ok(disclosures) => {
                self.state.disclosures = disclosures;
                self.finish_step(PipelineStep::GeneratingDisclosures, PipelineStep::AnalyzingHealth)
                    .await;
                Ok(())
            }
            Err(err) => {
                self.abort_step(PipelineStep::GeneratingDisclosures, &err).await;
                Err(err)
            }
        }
    }

    /// Step 6. LLM analysis of the merged IFRS data, plus the ratio overlay
    /// when ledger statements were supplied.
    pub async fn analyze_health(&mut self) -> Result<()> {
        self.ensure_step(PipelineStep::AnalyzingHealth, "analyze_health")?;
        let merged = self.state.merged_ifrs_data();

        self.tracker.set(0);
        let result = self
            .tracker
            .run(self.assistant.analyze_health(&merged), &self.cancel)
            .await;

        match result {
            Ok(analysis) => {
                self.state.health_analysis = Some(analysis);
                self.state.ratio_overlay = self.ledger.as_ref().map(|statements| {
                    let ratios = FinancialRatios::from_statements(statements);
                    let assessment = assess_health(&ratios, &self.config.thresholds);
                    RatioOverlay { ratios, assessment }
                });
                self.finish_step(PipelineStep::AnalyzingHealth, PipelineStep::GeneratingReport)
                    .await;
                Ok(())
            }
            Err(err) => {
                self.abort_step(PipelineStep::AnalyzingHealth, &err).await;
                Err(err)
            }
        }
    }

    /// Step 7. Generates the report, enters `Done` and records the run.
    pub async fn generate_report(&mut self) -> Result<()> {
        self.ensure_step(PipelineStep::GeneratingReport, "generate_report")?;
        let input = ReportInput {
            statements: self.state.converted.clone(),
            disclosures: self.state.disclosures.clone(),
            explanations: self.state.explanations.clone(),
            recommendations: self.state.recommendations.clone(),
            financial_health_analysis: self.state.health_analysis.clone(),
        };

        self.tracker.set(0);
        let result = self
            .tracker
            .run(self.assistant.generate_report(&input), &self.cancel)
            .await;

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                self.abort_step(PipelineStep::GeneratingReport, &err).await;
                return Err(err);
            }
        };
        self.state.report = Some(report);

        if let Err(err) = self.save_record().await {
            self.fail(PipelineStep::GeneratingReport, &err).await;
            return Err(err);
        }

        self.finish_step(PipelineStep::GeneratingReport, PipelineStep::Done)
            .await;
        self.send_event(PipelineEvent::Completed).await;
        Ok(())
    }

    /// Asks a follow-up question about the finished report. Extra documents
    /// are listed after the report in the context. Does not change the step.
    pub async fn ask_about_report(&self, question: &str, documents: &[String]) -> Result<String> {
        let report = match (&self.state.step, &self.state.report) {
            (PipelineStep::Done, Some(report)) => report,
            _ => {
                return Err(ConverterError::InvalidTransition {
                    step: self.state.step,
                    action: "ask_about_report",
                })
            }
        };

        let context = format!(
            "Report content: {}\nAdditional documents: {}",
            report,
            documents.join(", ")
        );
        until_cancelled(self.assistant.answer_question(question, &context), &self.cancel).await
    }

    async fn finish_step(&mut self, step: PipelineStep, next: PipelineStep) {
        self.state.errors.remove(&step);
        self.tracker.set(100);
        self.advance(next).await;
    }

    async fn abort_step(&mut self, step: PipelineStep, err: &ConverterError) {
        self.tracker.set(0);
        if matches!(err, ConverterError::Cancelled) {
            self.cancelled(step).await;
        } else {
            self.fail(step, err).await;
        }
    }

    async fn save_record(&self) -> Result<()> {
        let Some((repository, project_id)) = &self.repository else {
            return Ok(());
        };

        let gaap_data = self
            .state
            .statements
            .first()
            .map(|s| s.gaap_data.clone())
            .unwrap_or_default();
        let ifrs_data = self
            .state
            .converted
            .first()
            .map(|s| s.ifrs_data.clone())
            .unwrap_or_default();

        let mut record = ConversionRecord::new(gaap_data, ifrs_data);
        record.explanations = self.state.explanations.clone();
        record.recommendations = self.state.recommendations.clone();
        record.report = self.state.report.clone();

        repository.save_conversion(project_id, record).await
    }

    async fn mark_project_in_progress(&self) {
        let Some((repository, project_id)) = &self.repository else {
            return;
        };

        let updated = match repository.load_project(project_id).await {
            Ok(Some(mut project)) => {
                project.status = ProjectStatus::InProgress;
                repository.save_project(project).await
            }
            Ok(None) => Ok(()),
            Err(err) => Err(err),
        };
        if let Err(err) = updated {
            warn!("Could not mark project {} in progress: {}", project_id, err);
        }
    }
}

impl Drop for ConversionSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
