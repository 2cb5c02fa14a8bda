//! Spreadsheet ingestion for trial balances.
//!
//! Both CSV and Excel uploads are first read into a [`SheetData`] of tagged
//! [`CellValue`]s, then mapped onto [`LedgerRow`]s through tri-lingual header
//! aliases (English / Russian / Uzbek).

use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::error::{ConverterError, Result};
use crate::schema::{CellValue, LedgerRow, LineItems, LineValue, StatementFile};
use crate::utils::{coerce_number, header_matches};
use calamine::{Data, Reader};
use log::{debug, info};
use std::io::{Cursor, Read};
use std::path::Path;

pub const CODE_ALIASES: &[&str] = &["code", "счет", "raqam", "account", "код"];
pub const NAME_ALIASES: &[&str] = &["name", "наим", "nom", "description"];
pub const DEBIT_ALIASES: &[&str] = &["debit", "дебет", "debet", "dt"];
pub const CREDIT_ALIASES: &[&str] = &["credit", "кредит", "kredit", "cr"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Excel,
}

impl FileFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        Self::from_extension(&ext)
    }

    pub fn from_extension(ext: &str) -> Result<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "csv" | "txt" => Ok(FileFormat::Csv),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(FileFormat::Excel),
            other => Err(ConverterError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// The first sheet of an upload: a header row and the data rows beneath it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SheetData {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetData {
    fn cell(&self, row: &[CellValue], column: usize) -> CellValue {
        row.get(column).cloned().unwrap_or(CellValue::Empty)
    }
}

/// Column indexes of the four ledger fields in a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnMap {
    pub code: usize,
    pub name: usize,
    pub debit: usize,
    pub credit: usize,
}

impl ColumnMap {
    /// Matches headers against the alias sets.
    ///
    /// Each column is claimed at most once, in the order name, debit, credit,
    /// code: the code aliases (`account`, `счет`) also occur inside typical
    /// name headers ("Account Name", "Наименование счета"), and `cr` occurs
    /// inside "Description".
    pub fn detect(headers: &[String]) -> Result<Self> {
        let mut claimed = vec![false; headers.len()];

        let mut claim = |aliases: &[&str], field: &str| -> Result<usize> {
            let exact = headers.iter().enumerate().position(|(i, h)| {
                !claimed[i] && aliases.iter().any(|a| h.trim().eq_ignore_ascii_case(a))
            });
            let found = exact.or_else(|| {
                headers
                    .iter()
                    .enumerate()
                    .position(|(i, h)| !claimed[i] && header_matches(h, aliases))
            });
            match found {
                Some(idx) => {
                    claimed[idx] = true;
                    Ok(idx)
                }
                None => Err(ConverterError::MissingColumn(field.to_string())),
            }
        };

        let name = claim(NAME_ALIASES, "account_name")?;
        let debit = claim(DEBIT_ALIASES, "debit_balance")?;
        let credit = claim(CREDIT_ALIASES, "credit_balance")?;
        let code = claim(CODE_ALIASES, "account_code")?;

        Ok(Self {
            code,
            name,
            debit,
            credit,
        })
    }
}

fn cell_to_amount(cell: &CellValue, row: usize, field: &str, sink: &dyn DiagnosticSink) -> f64 {
    match cell {
        CellValue::Number(n) if n.is_finite() => *n,
        CellValue::Number(n) => {
            sink.emit(Diagnostic::NumericCoercion {
                row,
                field: field.to_string(),
                raw: n.to_string(),
                value: 0.0,
            });
            0.0
        }
        CellValue::Empty => 0.0,
        CellValue::Text(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                return 0.0;
            }
            if let Ok(v) = trimmed.parse::<f64>() {
                if v.is_finite() {
                    return v;
                }
            }
            let value = coerce_number(trimmed).unwrap_or(0.0);
            sink.emit(Diagnostic::NumericCoercion {
                row,
                field: field.to_string(),
                raw: raw.clone(),
                value,
            });
            value
        }
    }
}

/// Maps a sheet onto ledger rows. Fails only when a required column is absent.
pub fn rows_from_sheet(sheet: &SheetData, sink: &dyn DiagnosticSink) -> Result<Vec<LedgerRow>> {
    let columns = ColumnMap::detect(&sheet.headers)?;
    debug!("Detected ledger columns: {:?}", columns);

    let mut rows = Vec::with_capacity(sheet.rows.len());

    for (idx, raw) in sheet.rows.iter().enumerate() {
        // spreadsheet numbering: header is row 1
        let row_number = idx + 2;
        let code = sheet.cell(raw, columns.code).as_text();
        let name = sheet.cell(raw, columns.name).as_text();

        if code.is_empty() && name.is_empty() {
            continue;
        }
        if code.is_empty() || name.is_empty() {
            let missing = if code.is_empty() {
                "account code"
            } else {
                "account name"
            };
            sink.emit(Diagnostic::IncompleteRow {
                row: row_number,
                reason: format!("missing {}", missing),
            });
            continue;
        }

        let debit = cell_to_amount(&sheet.cell(raw, columns.debit), row_number, "debit", sink);
        let credit = cell_to_amount(&sheet.cell(raw, columns.credit), row_number, "credit", sink);

        rows.push(LedgerRow {
            account_code: code,
            account_name: name,
            debit_balance: debit,
            credit_balance: credit,
        });
    }

    info!("Successfully processed {} ledger rows", rows.len());
    Ok(rows)
}

pub fn read_csv_sheet<R: Read>(reader: R) -> Result<SheetData> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        // CSV cells stay textual so codes like "0100" keep their leading digit
        let cells: Vec<CellValue> = record.iter().map(CellValue::from).collect();
        if cells.iter().all(CellValue::is_empty) {
            continue;
        }
        rows.push(cells);
    }

    Ok(SheetData { headers, rows })
}

fn data_to_cell(data: &Data) -> CellValue {
    match data {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::from(s.as_str()),
        Data::Bool(b) => CellValue::Text(b.to_string()),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::from(s.as_str()),
        _ => CellValue::Empty,
    }
}

fn sheet_from_range(range: &calamine::Range<Data>) -> SheetData {
    let mut iter = range.rows();
    let headers = iter
        .next()
        .map(|r| r.iter().map(|c| data_to_cell(c).as_text()).collect())
        .unwrap_or_default();

    let rows = iter
        .map(|r| r.iter().map(data_to_cell).collect::<Vec<_>>())
        .filter(|cells: &Vec<CellValue>| !cells.iter().all(CellValue::is_empty))
        .collect();

    SheetData { headers, rows }
}

pub fn read_excel_sheet(path: &Path) -> Result<SheetData> {
    let file = path.display().to_string();
    let mut workbook =
        calamine::open_workbook_auto(path).map_err(|e| ConverterError::FileParse {
            file: file.clone(),
            details: e.to_string(),
        })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ConverterError::FileParse {
            file: file.clone(),
            details: "Excel file contains no sheets".to_string(),
        })?
        .map_err(|e| ConverterError::FileParse {
            file,
            details: e.to_string(),
        })?;

    Ok(sheet_from_range(&range))
}

pub fn read_excel_bytes(bytes: Vec<u8>) -> Result<SheetData> {
    let mut workbook = calamine::open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| {
        ConverterError::FileParse {
            file: "<upload>".to_string(),
            details: e.to_string(),
        }
    })?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| ConverterError::FileParse {
            file: "<upload>".to_string(),
            details: "Excel file contains no sheets".to_string(),
        })?
        .map_err(|e| ConverterError::FileParse {
            file: "<upload>".to_string(),
            details: e.to_string(),
        })?;

    Ok(sheet_from_range(&range))
}

pub fn read_sheet(path: &Path) -> Result<SheetData> {
    match FileFormat::from_path(path)? {
        FileFormat::Csv => {
            let file = std::fs::File::open(path)?;
            read_csv_sheet(file).map_err(|e| with_file_name(e, path))
        }
        FileFormat::Excel => read_excel_sheet(path),
    }
}

fn with_file_name(err: ConverterError, path: &Path) -> ConverterError {
    match err {
        ConverterError::FileParse { details, .. } => ConverterError::FileParse {
            file: path.display().to_string(),
            details,
        },
        other => other,
    }
}

pub fn parse_ledger_csv<R: Read>(reader: R, sink: &dyn DiagnosticSink) -> Result<Vec<LedgerRow>> {
    let sheet = read_csv_sheet(reader)?;
    rows_from_sheet(&sheet, sink)
}

pub fn parse_ledger_file(path: &Path, sink: &dyn DiagnosticSink) -> Result<Vec<LedgerRow>> {
    info!("Starting ledger parsing for {}", path.display());
    let sheet = read_sheet(path)?;
    rows_from_sheet(&sheet, sink)
}

/// Turns any sheet into generic statement line items.
///
/// Ledger-shaped sheets become `"<code> <name>" → debit − credit`; anything
/// else is flattened cell by cell as `"<header>_<row index>"`.
pub fn statement_from_sheet(
    name: impl Into<String>,
    sheet: &SheetData,
    sink: &dyn DiagnosticSink,
) -> StatementFile {
    let name = name.into();
    let mut items = LineItems::new();

    if ColumnMap::detect(&sheet.headers).is_ok() {
        if let Ok(rows) = rows_from_sheet(sheet, sink) {
            for row in rows {
                items.insert(
                    format!("{} {}", row.account_code, row.account_name),
                    LineValue::Number(row.balance()),
                );
            }
            return StatementFile::new(name, items);
        }
    }

    for (row_idx, row) in sheet.rows.iter().enumerate() {
        for (col, header) in sheet.headers.iter().enumerate() {
            if header.trim().is_empty() {
                continue;
            }
            let value = match sheet.cell(row, col) {
                CellValue::Number(n) => LineValue::Number(n),
                CellValue::Text(t) => match t.trim().parse::<f64>() {
                    Ok(n) if n.is_finite() => LineValue::Number(n),
                    _ => LineValue::Text(t),
                },
                CellValue::Empty => continue,
            };
            items.insert(format!("{}_{}", header.trim(), row_idx), value);
        }
    }

    StatementFile::new(name, items)
}

pub fn parse_statement_file(path: &Path, sink: &dyn DiagnosticSink) -> Result<StatementFile> {
    let sheet = read_sheet(path)?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("statement")
        .to_string();
    let statement = statement_from_sheet(name, &sheet, sink);
    info!(
        "Parsed statement '{}' with {} line items",
        statement.name,
        statement.gaap_data.len()
    );
    Ok(statement)
}
