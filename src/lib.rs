//! # GAAP to IFRS Converter
//!
//! A library for turning trial-balance uploads into financial statements and
//! walking converted statements through a GAAP→IFRS review pipeline.
//!
//! ## Core Concepts
//!
//! - **Ledger rows**: account code, name, debit and credit balances read from CSV or Excel
//! - **Classification**: the first digit of the account code picks the category
//!   (1–4 asset, 5 equity, 6 liability, 7 revenue, 8 expense)
//! - **Generated statements**: balance sheet, income statement and cash flow buckets with
//!   net income injected into equity and operating cash flow
//! - **Ratios**: profitability, liquidity, efficiency and leverage with a threshold-based
//!   health overlay
//! - **Conversion pipeline**: a seven-step session that calls an [`LlmGateway`] to convert,
//!   disclose, analyze and report, with progress, cancellation and per-step errors
//!
//! ## Example
//!
//! ```rust,ignore
//! use gaap_ifrs_converter::*;
//!
//! let rows = vec![
//!     LedgerRow::new("1000", "Cash", 10_000.0, 0.0),
//!     LedgerRow::new("6000", "Accounts Payable", 0.0, 5_000.0),
//!     LedgerRow::new("7000", "Sales Revenue", 0.0, 20_000.0),
//!     LedgerRow::new("8000", "Rent Expense", 3_000.0, 0.0),
//! ];
//!
//! let book = StatementBuilder::process(&rows, default_sink()).unwrap();
//! assert_eq!(book.statements.net_income(), 17_000.0);
//! ```

pub mod chart_of_accounts;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod generator;
pub mod ingestion;
pub mod llm;
pub mod pipeline;
pub mod ratios;
pub mod repository;
pub mod schema;
pub mod utils;

pub use chart_of_accounts::{classify_row, classify_rows, ChartOfAccounts};
pub use config::*;
pub use diagnostics::*;
pub use error::{ConverterError, Result};
pub use export::*;
pub use generator::{generate_financial_statements, StatementGenerator};
pub use ingestion::*;
pub use llm::{
    CompletionOptions, ConversionResult, Disclosure, HealthAnalysis, IfrsAssistant, LlmGateway,
    ReportInput,
};
pub use pipeline::*;
pub use ratios::*;
pub use repository::*;
pub use schema::*;
pub use utils::*;

#[cfg(feature = "openai")]
pub use llm::OpenAiClient;

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Everything the statement builder derives from one trial balance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementBook {
    pub accounts: Vec<ClassifiedAccount>,
    pub chart: ChartOfAccounts,
    pub statements: GeneratedStatements,
    pub ratios: FinancialRatios,
    pub health: HealthAssessment,
}

pub struct StatementBuilder;

impl StatementBuilder {
    /// Classify → generate → ratios → health, with the default thresholds.
    pub fn process(rows: &[LedgerRow], sink: &dyn DiagnosticSink) -> Result<StatementBook> {
        Self::process_with_thresholds(rows, &DEFAULT_THRESHOLDS, sink)
    }

    pub fn process_with_thresholds(
        rows: &[LedgerRow],
        thresholds: &HealthThresholds,
        sink: &dyn DiagnosticSink,
    ) -> Result<StatementBook> {
        info!("Building statements from {} ledger rows", rows.len());

        let accounts = classify_rows(rows, sink);
        let statements = StatementGenerator::new().generate(&accounts)?;
        let chart = ChartOfAccounts::from_classified(&accounts);

        let ratios = FinancialRatios::from_accounts(&accounts);
        let health = assess_health(&ratios, thresholds);
        debug!(
            "Health overlay: {} strengths, {} weaknesses",
            health.strengths.len(),
            health.weaknesses.len()
        );

        Ok(StatementBook {
            accounts,
            chart,
            statements,
            ratios,
            health,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_rows() -> Vec<LedgerRow> {
        vec![
            LedgerRow::new("1000", "Cash", 10_000.0, 0.0),
            LedgerRow::new("6000", "Accounts Payable", 0.0, 5_000.0),
            LedgerRow::new("7000", "Sales Revenue", 0.0, 20_000.0),
            LedgerRow::new("8000", "Rent Expense", 3_000.0, 0.0),
        ]
    }

    #[test]
    fn test_end_to_end_processing() {
        let sink = CapturingSink::new();
        let book = StatementBuilder::process(&scenario_rows(), &sink).unwrap();

        assert_eq!(book.statements.balance_sheet.assets["Cash"], 10_000.0);
        assert_eq!(
            book.statements.balance_sheet.liabilities["Accounts Payable"],
            5_000.0
        );
        assert_eq!(
            book.statements.income_statement.revenue["Sales Revenue"],
            20_000.0
        );
        assert_eq!(
            book.statements.income_statement.expenses["Rent Expense"],
            3_000.0
        );
        assert_eq!(book.statements.balance_sheet.equity[NET_INCOME_LABEL], 17_000.0);
        assert_eq!(book.chart.total_accounts(), 4);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_invalid_row_produces_no_book() {
        let mut rows = scenario_rows();
        rows.push(LedgerRow::new("", "Orphan", 1.0, 0.0));

        let err = StatementBuilder::process(&rows, &CapturingSink::new()).unwrap_err();
        assert!(matches!(err, ConverterError::InvalidLedgerRow { .. }));
    }
}
