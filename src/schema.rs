use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single spreadsheet cell as it comes off the parser, before any coercion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) => false,
        }
    }

    /// Text form of the cell, trimmed. Whole numbers print without a fraction
    /// so that a numeric account code `1010` stays `"1010"`.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) if n.fract() == 0.0 && n.is_finite() => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::Empty => String::new(),
        }
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        if value.trim().is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(value.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

/// One trial-balance line after parsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct LedgerRow {
    #[schemars(description = "Chart-of-accounts code. The first digit selects the statement category.")]
    pub account_code: String,

    #[schemars(description = "Human readable account name as it appears in the ledger")]
    pub account_name: String,

    #[serde(default)]
    pub debit_balance: f64,

    #[serde(default)]
    pub credit_balance: f64,
}

impl LedgerRow {
    pub fn new(
        account_code: impl Into<String>,
        account_name: impl Into<String>,
        debit_balance: f64,
        credit_balance: f64,
    ) -> Self {
        Self {
            account_code: account_code.into(),
            account_name: account_name.into(),
            debit_balance,
            credit_balance,
        }
    }

    /// Signed net amount, debit minus credit.
    pub fn balance(&self) -> f64 {
        self.debit_balance - self.credit_balance
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AccountCategory {
    Asset,
    Liability,
    Equity,
    Revenue,
    Expense,
    Unclassified,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClassifiedAccount {
    #[serde(flatten)]
    pub row: LedgerRow,
    pub category: AccountCategory,
}

impl ClassifiedAccount {
    pub fn code(&self) -> &str {
        &self.row.account_code
    }

    pub fn name(&self) -> &str {
        &self.row.account_name
    }

    pub fn balance(&self) -> f64 {
        self.row.balance()
    }

    /// Leading character of the account code, if any.
    pub fn prefix(&self) -> Option<char> {
        self.row.account_code.trim().chars().next()
    }
}

pub type Section = BTreeMap<String, f64>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BalanceSheet {
    pub assets: Section,
    pub liabilities: Section,
    pub equity: Section,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IncomeStatement {
    pub revenue: Section,
    pub expenses: Section,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CashFlow {
    pub operating: Section,
    pub investing: Section,
    pub financing: Section,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedStatements {
    pub balance_sheet: BalanceSheet,
    pub income_statement: IncomeStatement,
    pub cash_flow: CashFlow,
}

pub const NET_INCOME_LABEL: &str = "Net Income";

pub fn section_total(section: &Section) -> f64 {
    section.values().sum()
}

impl GeneratedStatements {
    pub fn total_revenue(&self) -> f64 {
        section_total(&self.income_statement.revenue)
    }

    pub fn total_expenses(&self) -> f64 {
        section_total(&self.income_statement.expenses)
    }

    pub fn net_income(&self) -> f64 {
        self.total_revenue() - self.total_expenses()
    }

    pub fn is_empty(&self) -> bool {
        self.balance_sheet.assets.is_empty()
            && self.balance_sheet.liabilities.is_empty()
            && self.balance_sheet.equity.is_empty()
            && self.income_statement.revenue.is_empty()
            && self.income_statement.expenses.is_empty()
            && self.cash_flow.operating.is_empty()
            && self.cash_flow.investing.is_empty()
            && self.cash_flow.financing.is_empty()
    }

    /// Flattens the generated statements into one pipeline input per statement,
    /// keyed `"<Section> / <Account>"`.
    pub fn to_statement_files(&self) -> Vec<StatementFile> {
        fn collect(sections: &[(&str, &Section)]) -> LineItems {
            let mut items = LineItems::new();
            for (label, section) in sections {
                for (name, value) in section.iter() {
                    items.insert(format!("{} / {}", label, name), LineValue::Number(*value));
                }
            }
            items
        }

        vec![
            StatementFile::new(
                "Balance Sheet",
                collect(&[
                    ("Assets", &self.balance_sheet.assets),
                    ("Liabilities", &self.balance_sheet.liabilities),
                    ("Equity", &self.balance_sheet.equity),
                ]),
            ),
            StatementFile::new(
                "Income Statement",
                collect(&[
                    ("Revenue", &self.income_statement.revenue),
                    ("Expenses", &self.income_statement.expenses),
                ]),
            ),
            StatementFile::new(
                "Cash Flow",
                collect(&[
                    ("Operating", &self.cash_flow.operating),
                    ("Investing", &self.cash_flow.investing),
                    ("Financing", &self.cash_flow.financing),
                ]),
            ),
        ]
    }
}

/// A statement line value. LLM responses may carry nested objects, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum LineValue {
    Number(f64),
    Text(String),
    Structured(serde_json::Value),
}

impl LineValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            LineValue::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<f64> for LineValue {
    fn from(value: f64) -> Self {
        LineValue::Number(value)
    }
}

impl From<&str> for LineValue {
    fn from(value: &str) -> Self {
        LineValue::Text(value.to_string())
    }
}

pub type LineItems = BTreeMap<String, LineValue>;

/// A parsed upload ready for conversion: file name plus its GAAP line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatementFile {
    pub name: String,
    pub gaap_data: LineItems,
}

impl StatementFile {
    pub fn new(name: impl Into<String>, gaap_data: LineItems) -> Self {
        Self {
            name: name.into(),
            gaap_data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ConvertedStatement {
    pub name: String,
    pub gaap_data: LineItems,
    pub ifrs_data: LineItems,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text_for_numeric_code() {
        assert_eq!(CellValue::Number(1010.0).as_text(), "1010");
        assert_eq!(CellValue::Number(12.5).as_text(), "12.5");
        assert_eq!(CellValue::Text("  Cash ".into()).as_text(), "Cash");
        assert!(CellValue::from("   ").is_empty());
    }

    #[test]
    fn test_statements_serialize_camel_case() {
        let mut statements = GeneratedStatements::default();
        statements
            .balance_sheet
            .assets
            .insert("Cash".to_string(), 100.0);

        let json = serde_json::to_string(&statements).unwrap();
        assert!(json.contains("balanceSheet"));
        assert!(json.contains("incomeStatement"));
        assert!(json.contains("cashFlow"));

        let back: GeneratedStatements = serde_json::from_str(&json).unwrap();
        assert_eq!(back, statements);
    }

    #[test]
    fn test_line_value_untagged() {
        let items: LineItems =
            serde_json::from_str(r#"{"Cash": 10.5, "Impact": "High", "Detail": {"a": 1}}"#)
                .unwrap();
        assert_eq!(items["Cash"], LineValue::Number(10.5));
        assert_eq!(items["Impact"], LineValue::Text("High".into()));
        assert!(matches!(items["Detail"], LineValue::Structured(_)));
    }

    #[test]
    fn test_statement_files_flatten_sections() {
        let mut statements = GeneratedStatements::default();
        statements
            .income_statement
            .revenue
            .insert("Sales".to_string(), 500.0);

        let files = statements.to_statement_files();
        assert_eq!(files.len(), 3);
        assert_eq!(files[1].name, "Income Statement");
        assert_eq!(
            files[1].gaap_data.get("Revenue / Sales"),
            Some(&LineValue::Number(500.0))
        );
        assert!(files[0].gaap_data.is_empty());
    }
}
