use crate::error::{ConverterError, Result};
use crate::llm::CompletionOptions;
use crate::ratios::HealthThresholds;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

pub const CONFIG_KEY: &str = "converter_config";

/// What `retry_conversion` does after a failed GAAP→IFRS run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Reset the cursor to the first statement and convert everything again.
    #[default]
    RestartAll,
    /// Resume from the statement that failed, keeping earlier results.
    PerItem,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    /// Interval between progress ticks while an external call is in flight.
    #[serde(with = "duration_millis")]
    pub tick: Duration,
    pub step: u8,
    /// Highest value ticks may reach; only completion reports 100.
    pub cap: u8,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(500),
            step: 10,
            cap: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConverterConfig {
    /// Language the LLM is asked to answer in.
    pub language: String,
    pub conversion: CompletionOptions,
    pub disclosures: CompletionOptions,
    pub analysis: CompletionOptions,
    pub report: CompletionOptions,
    /// Follow-up questions about a finished report.
    pub chatbot: CompletionOptions,
    pub progress: ProgressSettings,
    pub retry_policy: RetryPolicy,
    pub thresholds: HealthThresholds,
    /// Replaces the built-in disclosures prompt when set.
    pub custom_disclosures_prompt: Option<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            conversion: CompletionOptions::new("gpt-4o", 0.0, 5000).with_system(
                "You are a financial expert specializing in GAAP to IFRS conversions.",
            ),
            disclosures: CompletionOptions::new("gpt-4o", 0.7, 4000)
                .with_system("You are a financial expert specializing in IFRS disclosures."),
            analysis: CompletionOptions::new("gpt-4o", 0.5, 3000).with_system(
                "You are a financial analyst specializing in IFRS-based financial health assessment. Always respond with valid JSON.",
            ),
            report: CompletionOptions::new("gpt-4o", 0.5, 4000).with_system(
                "You are a financial reporting expert specializing in IFRS-compliant reports.",
            ),
            chatbot: CompletionOptions::new("gpt-4o", 0.7, 2000).with_system(
                "You are a helpful assistant specializing in IFRS and financial reporting.",
            ),
            progress: ProgressSettings::default(),
            retry_policy: RetryPolicy::default(),
            thresholds: HealthThresholds::default(),
            custom_disclosures_prompt: None,
        }
    }
}

impl ConverterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.progress.cap >= 100 {
            return Err(ConverterError::Config(format!(
                "progress cap must stay below 100, got {}",
                self.progress.cap
            )));
        }
        if self.progress.tick.is_zero() {
            return Err(ConverterError::Config(
                "progress tick must be a positive duration".to_string(),
            ));
        }
        if self.progress.step == 0 {
            return Err(ConverterError::Config(
                "progress step must be positive".to_string(),
            ));
        }
        for (name, options) in [
            ("conversion", &self.conversion),
            ("disclosures", &self.disclosures),
            ("analysis", &self.analysis),
            ("report", &self.report),
            ("chatbot", &self.chatbot),
        ] {
            if !(0.0..=2.0).contains(&options.temperature) {
                return Err(ConverterError::Config(format!(
                    "{} temperature {} outside 0.0..=2.0",
                    name, options.temperature
                )));
            }
            if options.model.trim().is_empty() {
                return Err(ConverterError::Config(format!("{} model is empty", name)));
            }
        }
        Ok(())
    }

    /// Loads the config from a store, falling back to defaults when absent.
    pub fn load(store: &dyn KeyValueStore) -> Result<Self> {
        let config = match store.get(CONFIG_KEY)? {
            Some(raw) => {
                debug!("Loading converter config from store");
                serde_json::from_str::<Self>(&raw)?
            }
            None => {
                debug!("No stored converter config, using defaults");
                Self::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, store: &dyn KeyValueStore) -> Result<()> {
        self.validate()?;
        store.set(CONFIG_KEY, &serde_json::to_string(self)?)
    }
}

/// Minimal string key-value persistence for settings and session data.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_error<E: std::fmt::Display>(err: E) -> ConverterError {
    ConverterError::Store(err.to_string())
}

impl KeyValueStore for InMemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().map_err(lock_error)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(lock_error)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().map_err(lock_error)?;
        entries.remove(key);
        Ok(())
    }
}

/// Stores every key in a single JSON object on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(HashMap::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_all(&self, entries: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.read().map_err(lock_error)?;
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.write().map_err(lock_error)?;
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());
        self.write_all(&entries)?;
        info!("Persisted '{}' to {}", key, self.path.display());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.lock.write().map_err(lock_error)?;
        let mut entries = self.read_all()?;
        if entries.remove(key).is_some() {
            self.write_all(&entries)?;
        }
        Ok(())
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
