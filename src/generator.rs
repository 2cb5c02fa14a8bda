use crate::chart_of_accounts::classify_rows;
use crate::diagnostics::DiagnosticSink;
use crate::error::{ConverterError, Result};
use crate::schema::{
    AccountCategory, ClassifiedAccount, GeneratedStatements, LedgerRow, NET_INCOME_LABEL,
};
use crate::utils::is_total_row;
use log::{debug, info};

/// Builds balance sheet, income statement and cash flow buckets from
/// classified trial-balance accounts.
///
/// Generation is a pure function of its input: the same accounts always yield
/// deep-equal statements, which is what makes "re-generate" safe.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatementGenerator;

impl StatementGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, accounts: &[ClassifiedAccount]) -> Result<GeneratedStatements> {
        validate_accounts(accounts)?;
        info!(
            "Starting financial statement generation for {} accounts",
            accounts.len()
        );

        let mut statements = GeneratedStatements::default();

        for account in accounts {
            let balance = account.balance();
            if balance == 0.0 {
                continue;
            }

            let name = account.name().to_string();
            if is_total_row(&name) {
                debug!("Skipping subtotal row '{}'", name);
                continue;
            }

            match account.category {
                AccountCategory::Asset => {
                    statements
                        .balance_sheet
                        .assets
                        .insert(name.clone(), balance.abs());
                    if matches!(account.prefix(), Some('1' | '2')) {
                        statements.cash_flow.operating.insert(name, balance);
                    }
                }
                AccountCategory::Liability => {
                    statements
                        .balance_sheet
                        .liabilities
                        .insert(name.clone(), balance.abs());
                    statements.cash_flow.financing.insert(name, balance);
                }
                AccountCategory::Equity => {
                    statements
                        .balance_sheet
                        .equity
                        .insert(name.clone(), balance.abs());
                    statements.cash_flow.financing.insert(name, balance);
                }
                AccountCategory::Revenue => {
                    statements
                        .income_statement
                        .revenue
                        .insert(name.clone(), balance.abs());
                    statements.cash_flow.operating.insert(name, balance);
                }
                AccountCategory::Expense => {
                    statements
                        .income_statement
                        .expenses
                        .insert(name.clone(), balance.abs());
                    statements.cash_flow.operating.insert(name, -balance);
                }
                // already reported by the classifier
                AccountCategory::Unclassified => {}
            }
        }

        let net_income = statements.net_income();
        if net_income != 0.0 {
            statements
                .balance_sheet
                .equity
                .insert(NET_INCOME_LABEL.to_string(), net_income);
            statements
                .cash_flow
                .operating
                .insert(NET_INCOME_LABEL.to_string(), net_income);
        }

        info!(
            "Financial statements generated successfully (net income {:.2})",
            net_income
        );
        Ok(statements)
    }

    /// Classifies and generates in one step.
    pub fn generate_from_rows(
        &self,
        rows: &[LedgerRow],
        sink: &dyn DiagnosticSink,
    ) -> Result<GeneratedStatements> {
        validate_rows(rows)?;
        let accounts = classify_rows(rows, sink);
        self.generate(&accounts)
    }

    /// Generates from an untyped JSON array of ledger rows.
    pub fn generate_from_json(
        &self,
        value: &serde_json::Value,
        sink: &dyn DiagnosticSink,
    ) -> Result<GeneratedStatements> {
        let items = value.as_array().ok_or_else(|| ConverterError::InvalidLedgerRow {
            row: 0,
            reason: "expected an array of ledger rows".to_string(),
        })?;

        let mut rows = Vec::with_capacity(items.len());
        for (idx, item) in items.iter().enumerate() {
            let row: LedgerRow =
                serde_json::from_value(item.clone()).map_err(|e| ConverterError::InvalidLedgerRow {
                    row: idx,
                    reason: e.to_string(),
                })?;
            rows.push(row);
        }

        self.generate_from_rows(&rows, sink)
    }
}

fn validate_row(idx: usize, row: &LedgerRow) -> Result<()> {
    if row.account_code.trim().is_empty() {
        return Err(ConverterError::InvalidLedgerRow {
            row: idx,
            reason: "account_code is empty".to_string(),
        });
    }
    if row.account_name.trim().is_empty() {
        return Err(ConverterError::InvalidLedgerRow {
            row: idx,
            reason: format!("account_name is empty for code {}", row.account_code),
        });
    }
    if !row.debit_balance.is_finite() || !row.credit_balance.is_finite() {
        return Err(ConverterError::InvalidLedgerRow {
            row: idx,
            reason: format!("non-finite balance for account {}", row.account_code),
        });
    }
    Ok(())
}

fn validate_rows(rows: &[LedgerRow]) -> Result<()> {
    rows.iter()
        .enumerate()
        .try_for_each(|(idx, row)| validate_row(idx, row))
}

fn validate_accounts(accounts: &[ClassifiedAccount]) -> Result<()> {
    accounts
        .iter()
        .enumerate()
        .try_for_each(|(idx, account)| validate_row(idx, &account.row))
}

pub fn generate_financial_statements(
    rows: &[LedgerRow],
    sink: &dyn DiagnosticSink,
) -> Result<GeneratedStatements> {
    StatementGenerator::new().generate_from_rows(rows, sink)
}
