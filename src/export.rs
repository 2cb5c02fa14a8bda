use crate::error::Result;
use crate::schema::{section_total, GeneratedStatements, Section, NET_INCOME_LABEL};
use log::info;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const NUMBER_FORMAT: &str = "#,##0.00";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    BalanceSheet,
    IncomeStatement,
    CashFlow,
}

impl StatementKind {
    pub const ALL: [StatementKind; 3] = [
        StatementKind::BalanceSheet,
        StatementKind::IncomeStatement,
        StatementKind::CashFlow,
    ];

    pub fn sheet_name(&self) -> &'static str {
        match self {
            StatementKind::BalanceSheet => "Balance Sheet",
            StatementKind::IncomeStatement => "Income Statement",
            StatementKind::CashFlow => "Cash Flow",
        }
    }
}

/// One line of a two-column statement export.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportRow {
    Header(String),
    Line(String, f64),
    Blank,
}

fn push_section(rows: &mut Vec<ExportRow>, title: &str, section: &Section) {
    rows.push(ExportRow::Header(title.to_string()));
    for (name, value) in section {
        rows.push(ExportRow::Line(name.clone(), *value));
    }
}

/// Lays a statement out as section headers followed by `(name, value)` lines.
pub fn statement_rows(statements: &GeneratedStatements, kind: StatementKind) -> Vec<ExportRow> {
    let mut rows = Vec::new();

    match kind {
        StatementKind::BalanceSheet => {
            let bs = &statements.balance_sheet;
            push_section(&mut rows, "Assets", &bs.assets);
            rows.push(ExportRow::Blank);
            push_section(&mut rows, "Liabilities", &bs.liabilities);
            rows.push(ExportRow::Blank);
            push_section(&mut rows, "Equity", &bs.equity);
        }
        StatementKind::IncomeStatement => {
            let is = &statements.income_statement;
            push_section(&mut rows, "Revenue", &is.revenue);
            rows.push(ExportRow::Blank);
            push_section(&mut rows, "Expenses", &is.expenses);
            rows.push(ExportRow::Blank);
            rows.push(ExportRow::Line(
                NET_INCOME_LABEL.to_string(),
                section_total(&is.revenue) - section_total(&is.expenses),
            ));
        }
        StatementKind::CashFlow => {
            let cf = &statements.cash_flow;
            push_section(&mut rows, "Operating Activities", &cf.operating);
            rows.push(ExportRow::Blank);
            push_section(&mut rows, "Investing Activities", &cf.investing);
            rows.push(ExportRow::Blank);
            push_section(&mut rows, "Financing Activities", &cf.financing);
        }
    }

    rows
}

fn write_rows(
    sheet: &mut Worksheet,
    rows: &[ExportRow],
    header: &Format,
    number: &Format,
) -> Result<()> {
    sheet.set_column_width(0, 40)?;
    sheet.set_column_width(1, 18)?;

    for (idx, row) in rows.iter().enumerate() {
        let r = idx as u32;
        match row {
            ExportRow::Header(title) => {
                sheet.write_string_with_format(r, 0, title.as_str(), header)?;
            }
            ExportRow::Line(name, value) => {
                sheet.write_string(r, 0, name.as_str())?;
                sheet.write_number_with_format(r, 1, *value, number)?;
            }
            ExportRow::Blank => {}
        }
    }
    Ok(())
}

/// Builds a workbook with one worksheet per requested statement.
pub fn build_workbook(statements: &GeneratedStatements, kinds: &[StatementKind]) -> Result<Workbook> {
    let mut workbook = Workbook::new();
    let header = Format::new().set_bold();
    let number = Format::new().set_num_format(NUMBER_FORMAT);

    for kind in kinds {
        let rows = statement_rows(statements, *kind);
        let sheet = workbook.add_worksheet();
        sheet.set_name(kind.sheet_name())?;
        write_rows(sheet, &rows, &header, &number)?;
    }

    Ok(workbook)
}

pub fn write_statements_xlsx(statements: &GeneratedStatements, path: &Path) -> Result<()> {
    let mut workbook = build_workbook(statements, &StatementKind::ALL)?;
    workbook.save(path)?;
    info!("Excel file generated successfully at {}", path.display());
    Ok(())
}

pub fn write_statement_xlsx(
    statements: &GeneratedStatements,
    kind: StatementKind,
    path: &Path,
) -> Result<()> {
    let mut workbook = build_workbook(statements, &[kind])?;
    workbook.save(path)?;
    info!("Excel file generated successfully for {}", kind.sheet_name());
    Ok(())
}

pub fn statements_to_xlsx_bytes(statements: &GeneratedStatements) -> Result<Vec<u8>> {
    let mut workbook = build_workbook(statements, &StatementKind::ALL)?;
    Ok(workbook.save_to_buffer()?)
}

pub fn statement_to_csv(statements: &GeneratedStatements, kind: StatementKind) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in statement_rows(statements, kind) {
        match row {
            ExportRow::Header(title) => writer.write_record([title.as_str(), ""])?,
            ExportRow::Line(name, value) => {
                writer.write_record([name.as_str(), format!("{:.2}", value).as_str()])?
            }
            ExportRow::Blank => writer.write_record(["", ""])?,
        }
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| crate::error::ConverterError::Export(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| crate::error::ConverterError::Export(e.to_string()))
}

pub fn statements_to_markdown(statements: &GeneratedStatements) -> String {
    let mut output = String::new();

    for kind in StatementKind::ALL {
        output.push_str(&format!("# {}\n\n", kind.sheet_name()));
        for row in statement_rows(statements, kind) {
            match row {
                ExportRow::Header(title) => {
                    output.push_str(&format!("## {}\n\n| Account | Amount |\n|---|---:|\n", title))
                }
                ExportRow::Line(name, value) => {
                    output.push_str(&format!("| {} | {:.2} |\n", name, value))
                }
                ExportRow::Blank => output.push('\n'),
            }
        }
        output.push('\n');
    }

    output
}
