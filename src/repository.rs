//! Project and conversion-history persistence.
//!
//! The core never talks to a database itself. A session gets an
//! `Arc<dyn ProjectRepository>` and, once a report has been generated, hands it
//! a [`ConversionRecord`].

use crate::error::{ConverterError, Result};
use crate::schema::LineItems;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProjectStatus {
    #[default]
    Idle,
    InProgress,
    Completed,
}

/// One finished run of the conversion pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionRecord {
    pub id: String,
    pub date: DateTime<Utc>,
    /// GAAP data of the first statement of the run.
    pub gaap_data: LineItems,
    /// IFRS data of the first converted statement of the run.
    pub ifrs_data: LineItems,
    pub explanations: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub report: Option<String>,
}

impl ConversionRecord {
    pub fn new(gaap_data: LineItems, ifrs_data: LineItems) -> Self {
        let date = Utc::now();
        Self {
            id: date.timestamp_millis().to_string(),
            date,
            gaap_data,
            ifrs_data,
            explanations: Vec::new(),
            recommendations: Vec::new(),
            report: None,
        }
    }

    /// Name under which the record's report is listed on the project.
    pub fn report_name(&self) -> String {
        format!("Report_{}.html", self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub conversion_history: Vec<ConversionRecord>,
    #[serde(default)]
    pub generated_reports: Vec<String>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            created_at: Utc::now(),
            last_updated: None,
            status: ProjectStatus::Idle,
            conversion_history: Vec::new(),
            generated_reports: Vec::new(),
        }
    }

    /// Appends a finished conversion and marks the project completed.
    pub fn record_conversion(&mut self, record: ConversionRecord) {
        if record.report.is_some() {
            self.generated_reports.push(record.report_name());
        }
        self.last_updated = Some(record.date);
        self.status = ProjectStatus::Completed;
        self.conversion_history.push(record);
    }
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn load_project(&self, id: &str) -> Result<Option<Project>>;

    async fn save_project(&self, project: Project) -> Result<()>;

    /// Appends `record` to the project's history. Fails when the project is unknown.
    async fn save_conversion(&self, project_id: &str, record: ConversionRecord) -> Result<()>;

    async fn list_conversions(&self, project_id: &str) -> Result<Vec<ConversionRecord>>;
}

#[derive(Debug, Default)]
pub struct InMemoryProjectRepository {
    projects: RwLock<HashMap<String, Project>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(project: Project) -> Self {
        let repo = Self::new();
        if let Ok(mut projects) = repo.projects.write() {
            projects.insert(project.id.clone(), project);
        }
        repo
    }
}

fn poisoned<T>(_: T) -> ConverterError {
    ConverterError::Store("project store lock poisoned".to_string())
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn load_project(&self, id: &str) -> Result<Option<Project>> {
        let projects = self.projects.read().map_err(poisoned)?;
        Ok(projects.get(id).cloned())
    }

    async fn save_project(&self, project: Project) -> Result<()> {
        debug!("Saving project {}", project.id);
        let mut projects = self.projects.write().map_err(poisoned)?;
        projects.insert(project.id.clone(), project);
        Ok(())
    }

    async fn save_conversion(&self, project_id: &str, record: ConversionRecord) -> Result<()> {
        let mut projects = self.projects.write().map_err(poisoned)?;
        let project = projects
            .get_mut(project_id)
            .ok_or_else(|| ConverterError::Store(format!("project '{}' not found", project_id)))?;

        info!(
            "Saving conversion {} to project {}",
            record.id, project_id
        );
        project.record_conversion(record);
        Ok(())
    }

    async fn list_conversions(&self, project_id: &str) -> Result<Vec<ConversionRecord>> {
        let projects = self.projects.read().map_err(poisoned)?;
        Ok(projects
            .get(project_id)
            .map(|p| p.conversion_history.clone())
            .unwrap_or_default())
    }
}
