use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::schema::{AccountCategory, ClassifiedAccount, LedgerRow};
use log::debug;
use serde::{Deserialize, Serialize};

impl AccountCategory {
    /// Category for an account code, keyed on its first character.
    ///
    /// 1–4 asset, 5 equity, 6 liability, 7 revenue, 8 expense.
    pub fn from_code(code: &str) -> Self {
        match code.trim().chars().next() {
            Some('1' | '2' | '3' | '4') => AccountCategory::Asset,
            Some('5') => AccountCategory::Equity,
            Some('6') => AccountCategory::Liability,
            Some('7') => AccountCategory::Revenue,
            Some('8') => AccountCategory::Expense,
            _ => AccountCategory::Unclassified,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccountCategory::Asset => "Assets",
            AccountCategory::Liability => "Liabilities",
            AccountCategory::Equity => "Equity",
            AccountCategory::Revenue => "Revenue",
            AccountCategory::Expense => "Expenses",
            AccountCategory::Unclassified => "Unclassified",
        }
    }
}

pub fn classify_row(row: &LedgerRow, sink: &dyn DiagnosticSink) -> ClassifiedAccount {
    let category = AccountCategory::from_code(&row.account_code);
    if category == AccountCategory::Unclassified {
        sink.emit(Diagnostic::UnclassifiedAccount {
            account_code: row.account_code.clone(),
            account_name: row.account_name.clone(),
        });
    }
    ClassifiedAccount {
        row: row.clone(),
        category,
    }
}

/// Classifies every row. Pure apart from diagnostics for unknown prefixes.
pub fn classify_rows(rows: &[LedgerRow], sink: &dyn DiagnosticSink) -> Vec<ClassifiedAccount> {
    let classified: Vec<ClassifiedAccount> = rows.iter().map(|r| classify_row(r, sink)).collect();
    debug!(
        "Classified {} rows ({} unclassified)",
        classified.len(),
        classified
            .iter()
            .filter(|a| a.category == AccountCategory::Unclassified)
            .count()
    );
    classified
}

/// Classified accounts grouped by category, each group sorted by code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChartOfAccounts {
    pub assets: Vec<ClassifiedAccount>,
    pub liabilities: Vec<ClassifiedAccount>,
    pub equity: Vec<ClassifiedAccount>,
    pub revenue: Vec<ClassifiedAccount>,
    pub expenses: Vec<ClassifiedAccount>,
    pub unclassified: Vec<ClassifiedAccount>,
}

impl ChartOfAccounts {
    pub fn from_classified(accounts: &[ClassifiedAccount]) -> Self {
        let mut chart = Self::default();

        for account in accounts {
            let bucket = match account.category {
                AccountCategory::Asset => &mut chart.assets,
                AccountCategory::Liability => &mut chart.liabilities,
                AccountCategory::Equity => &mut chart.equity,
                AccountCategory::Revenue => &mut chart.revenue,
                AccountCategory::Expense => &mut chart.expenses,
                AccountCategory::Unclassified => &mut chart.unclassified,
            };
            bucket.push(account.clone());
        }

        for bucket in chart.groups_mut() {
            bucket.sort_by(|a, b| a.code().cmp(b.code()));
        }

        chart
    }

    fn groups_mut(&mut self) -> [&mut Vec<ClassifiedAccount>; 6] {
        [
            &mut self.assets,
            &mut self.liabilities,
            &mut self.equity,
            &mut self.revenue,
            &mut self.expenses,
            &mut self.unclassified,
        ]
    }

    fn groups(&self) -> [(AccountCategory, &Vec<ClassifiedAccount>); 6] {
        [
            (AccountCategory::Asset, &self.assets),
            (AccountCategory::Liability, &self.liabilities),
            (AccountCategory::Equity, &self.equity),
            (AccountCategory::Revenue, &self.revenue),
            (AccountCategory::Expense, &self.expenses),
            (AccountCategory::Unclassified, &self.unclassified),
        ]
    }

    pub fn total_accounts(&self) -> usize {
        self.groups().iter().map(|(_, g)| g.len()).sum()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_csv(&self) -> String {
        let mut output = String::new();
        output.push_str("Section,Account Code,Account Name,Debit,Credit\n");

        for (category, group) in self.groups() {
            for account in group {
                output.push_str(&format!(
                    "{},{},{},{:.2},{:.2}\n",
                    category.label(),
                    account.code(),
                    account.name(),
                    account.row.debit_balance,
                    account.row.credit_balance
                ));
            }
        }

        output
    }

    pub fn to_markdown(&self) -> String {
        let mut output = String::from("# Chart of Accounts\n\n");

        for (category, group) in self.groups() {
            if group.is_empty() {
                continue;
            }
            output.push_str(&format!("## {}\n\n", category.label()));
            for account in group {
                let marker = if category == AccountCategory::Unclassified {
                    " **[UNCLASSIFIED]**"
                } else {
                    ""
                };
                output.push_str(&format!(
                    "- `{}` {}{}\n",
                    account.code(),
                    account.name(),
                    marker
                ));
            }
            output.push('\n');
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CapturingSink;

    #[test]
    fn test_category_from_code_prefix() {
        assert_eq!(AccountCategory::from_code("1000"), AccountCategory::Asset);
        assert_eq!(AccountCategory::from_code("2100"), AccountCategory::Asset);
        assert_eq!(AccountCategory::from_code("4010"), AccountCategory::Asset);
        assert_eq!(AccountCategory::from_code("5000"), AccountCategory::Equity);
        assert_eq!(AccountCategory::from_code("6000"), AccountCategory::Liability);
        assert_eq!(AccountCategory::from_code("7000"), AccountCategory::Revenue);
        assert_eq!(AccountCategory::from_code("8000"), AccountCategory::Expense);
        assert_eq!(AccountCategory::from_code("9000"), AccountCategory::Unclassified);
        assert_eq!(AccountCategory::from_code("A100"), AccountCategory::Unclassified);
        assert_eq!(AccountCategory::from_code(""), AccountCategory::Unclassified);
    }

    #[test]
    fn test_unclassified_emits_warning() {
        let sink = CapturingSink::new();
        let rows = vec![
            LedgerRow::new("1000", "Cash", 10.0, 0.0),
            LedgerRow::new("0900", "Suspense", 5.0, 0.0),
        ];
        let classified = classify_rows(&rows, &sink);

        assert_eq!(classified.len(), 2);
        assert_eq!(classified[1].category, AccountCategory::Unclassified);
        assert_eq!(
            sink.diagnostics(),
            vec![Diagnostic::UnclassifiedAccount {
                account_code: "0900".into(),
                account_name: "Suspense".into(),
            }]
        );
    }

    #[test]
    fn test_chart_groups_and_renders() {
        let sink = CapturingSink::new();
        let rows = vec![
            LedgerRow::new("1200", "Bank", 10.0, 0.0),
            LedgerRow::new("1000", "Cash", 10.0, 0.0),
            LedgerRow::new("7000", "Sales", 0.0, 30.0),
            LedgerRow::new("X1", "Mystery", 1.0, 0.0),
        ];
        let chart = ChartOfAccounts::from_classified(&classify_rows(&rows, &sink));

        assert_eq!(chart.total_accounts(), 4);
        assert_eq!(chart.assets[0].name(), "Cash");
        assert_eq!(chart.revenue.len(), 1);

        let csv = chart.to_csv();
        assert!(csv.starts_with("Section,Account Code"));
        assert!(csv.contains("Revenue,7000,Sales,0.00,30.00"));

        let md = chart.to_markdown();
        assert!(md.contains("## Assets"));
        assert!(md.contains("[UNCLASSIFIED]"));
        assert!(!md.contains("## Liabilities"));
    }
}
