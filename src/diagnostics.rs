//! Warning channel for lossy-but-recoverable input problems.
//!
//! Classification of unknown account prefixes, balances that had to be coerced
//! to zero and rejected reconciliation overrides are never hard failures, but
//! they must not vanish either. Every component that can hit one of these takes
//! a `&dyn DiagnosticSink`.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    UnclassifiedAccount {
        account_code: String,
        account_name: String,
    },
    NumericCoercion {
        row: usize,
        field: String,
        raw: String,
        value: f64,
    },
    IncompleteRow {
        row: usize,
        reason: String,
    },
    OverrideRejected {
        statement: String,
        line_item: String,
        raw: String,
    },
    /// Override aimed at a statement or line item the conversion did not produce.
    OverrideUnmatched {
        statement: String,
        line_item: String,
        raw: String,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::UnclassifiedAccount {
                account_code,
                account_name,
            } => write!(
                f,
                "Unknown account type for code: {} ({})",
                account_code, account_name
            ),
            Diagnostic::NumericCoercion {
                row,
                field,
                raw,
                value,
            } => write!(
                f,
                "Row {}: {} value '{}' is not numeric, using {}",
                row, field, raw, value
            ),
            Diagnostic::IncompleteRow { row, reason } => {
                write!(f, "Row {} skipped: {}", row, reason)
            }
            Diagnostic::OverrideRejected {
                statement,
                line_item,
                raw,
            } => write!(
                f,
                "Override '{}' for {} / {} is not a number, keeping computed value",
                raw, statement, line_item
            ),
            Diagnostic::OverrideUnmatched {
                statement,
                line_item,
                raw,
            } => write!(
                f,
                "Override '{}' for {} / {} matches no converted line item, not applied",
                raw, statement, line_item
            ),
        }
    }
}

pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Forwards every diagnostic to the `log` facade at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl DiagnosticSink for LogSink {
    fn emit(&self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
    }
}

static DEFAULT_SINK: LogSink = LogSink;

/// Process-wide default sink.
pub fn default_sink() -> &'static dyn DiagnosticSink {
    &DEFAULT_SINK
}

/// Collects diagnostics in memory. Also logs them, so nothing is lost when a
/// capturing sink is used outside tests.
#[derive(Debug, Default)]
pub struct CapturingSink {
    captured: Mutex<Vec<Diagnostic>>,
}

impl CapturingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self.captured.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.diagnostics().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn take(&self) -> Vec<Diagnostic> {
        match self.captured.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl DiagnosticSink for CapturingSink {
    fn emit(&self, diagnostic: Diagnostic) {
        warn!("{}", diagnostic);
        match self.captured.lock() {
            Ok(mut guard) => guard.push(diagnostic),
            Err(poisoned) => poisoned.into_inner().push(diagnostic),
        }
    }
}
