use crate::diagnostics::{Diagnostic, DiagnosticSink};
use crate::schema::{ConvertedStatement, LineValue};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key holding the IFRS figure inside a structured line item.
pub const IFRS_VALUE_KEY: &str = "IFRS Value";

/// Manual adjustments entered during reconciliation, keyed by statement name
/// and then by line item. Values are raw user text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Overrides {
    entries: BTreeMap<String, BTreeMap<String, String>>,
}

impl Overrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(
        &mut self,
        statement: impl Into<String>,
        line_item: impl Into<String>,
        raw: impl Into<String>,
    ) -> &mut Self {
        self.entries
            .entry(statement.into())
            .or_default()
            .insert(line_item.into(), raw.into());
        self
    }

    pub fn get(&self, statement: &str, line_item: &str) -> Option<&str> {
        self.entries
            .get(statement)
            .and_then(|items| items.get(line_item))
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|items| items.is_empty())
    }
}

fn parse_override(raw: &str) -> Option<f64> {
    raw.trim()
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Writes `value` as the line item's IFRS figure. Structured items keep their
/// other fields and get the figure under [`IFRS_VALUE_KEY`].
fn replace_ifrs_value(current: &mut LineValue, value: f64) {
    match current {
        LineValue::Structured(Value::Object(fields)) => {
            fields.insert(IFRS_VALUE_KEY.to_string(), Value::from(value));
        }
        other => *other = LineValue::Number(value),
    }
}

/// Returns the reconciled statements; the input is left untouched.
///
/// Blank overrides are ignored. Overrides that do not parse as a number keep
/// the computed value and emit [`Diagnostic::OverrideRejected`]; overrides
/// naming a statement or line item that is not present emit
/// [`Diagnostic::OverrideUnmatched`].
pub fn apply_overrides(
    statements: &[ConvertedStatement],
    overrides: &Overrides,
    sink: &dyn DiagnosticSink,
) -> Vec<ConvertedStatement> {
    let mut reconciled = statements.to_vec();
    let mut applied = 0usize;

    for (name, items) in &overrides.entries {
        if reconciled.iter().any(|s| &s.name == name) {
            continue;
        }
        for (line_item, raw) in items.iter().filter(|(_, raw)| !raw.trim().is_empty()) {
            sink.emit(Diagnostic::OverrideUnmatched {
                statement: name.clone(),
                line_item: line_item.clone(),
                raw: raw.clone(),
            });
        }
    }

    for statement in &mut reconciled {
        let Some(items) = overrides.entries.get(&statement.name) else {
            continue;
        };

        for (line_item, raw) in items {
            if raw.trim().is_empty() {
                continue;
            }
            let Some(current) = statement.ifrs_data.get_mut(line_item) else {
                sink.emit(Diagnostic::OverrideUnmatched {
                    statement: statement.name.clone(),
                    line_item: line_item.clone(),
                    raw: raw.clone(),
                });
                continue;
            };

            match parse_override(raw) {
                Some(value) => {
                    replace_ifrs_value(current, value);
                    applied += 1;
                }
                None => sink.emit(Diagnostic::OverrideRejected {
                    statement: statement.name.clone(),
                    line_item: line_item.clone(),
                    raw: raw.clone(),
                }),
            }
        }
    }

    info!("Reconciliation completed with {} overrides applied", applied);
    reconciled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::CapturingSink;
    use crate::schema::LineItems;
    use serde_json::json;

    fn statement() -> ConvertedStatement {
        let mut ifrs = LineItems::new();
        ifrs.insert("Revenue".into(), LineValue::Number(100.0));
        ifrs.insert("Leases".into(), LineValue::Number(50.0));
        ifrs.insert(
            "Inventory".into(),
            LineValue::Structured(json!({"IFRS Value": 80.0, "GAAP Value": 90.0})),
        );
        ConvertedStatement {
            name: "bs.csv".into(),
            gaap_data: LineItems::new(),
            ifrs_data: ifrs,
        }
    }

    #[test]
    fn test_numeric_override_replaces_value() {
        let sink = CapturingSink::new();
        let mut overrides = Overrides::new();
        overrides.set("bs.csv", "Revenue", " 1,250.5 ");

        let result = apply_overrides(&[statement()], &overrides, &sink);
        assert_eq!(result[0].ifrs_data["Revenue"].as_number(), Some(1250.5));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_non_numeric_override_is_rejected() {
        let sink = CapturingSink::new();
        let mut overrides = Overrides::new();
        overrides
            .set("bs.csv", "Leases", "about sixty")
            .set("bs.csv", "Revenue", "   ");

        let original = statement();
        let result = apply_overrides(std::slice::from_ref(&original), &overrides, &sink);
        assert_eq!(result[0], original);

        let diagnostics = sink.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            &diagnostics[0],
            Diagnostic::OverrideRejected { line_item, .. } if line_item == "Leases"
        ));
    }

    #[test]
    fn test_unmatched_overrides_are_reported() {
        let sink = CapturingSink::new();
        let mut overrides = Overrides::new();
        overrides
            .set("bs.csv", "Revnue", "150")
            .set("other.csv", "Revenue", "1")
            .set("other.csv", "Leases", "");

        let original = statement();
        let result = apply_overrides(std::slice::from_ref(&original), &overrides, &sink);
        assert_eq!(result[0], original);

        let diagnostics = sink.diagnostics();
        assert_eq!(diagnostics.len(), 2);
        assert!(diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::OverrideUnmatched { statement, line_item, .. }
                if statement == "bs.csv" && line_item == "Revnue"
        )));
        assert!(diagnostics.iter().any(|d| matches!(
            d,
            Diagnostic::OverrideUnmatched { statement, line_item, .. }
                if statement == "other.csv" && line_item == "Revenue"
        )));
    }

    #[test]
    fn test_structured_item_keeps_other_fields() {
        let sink = CapturingSink::new();
        let mut overrides = Overrides::new();
        overrides.set("bs.csv", "Inventory", "75");

        let result = apply_overrides(&[statement()], &overrides, &sink);
        match &result[0].ifrs_data["Inventory"] {
            LineValue::Structured(value) => {
                assert_eq!(value["IFRS Value"], json!(75.0));
                assert_eq!(value["GAAP Value"], json!(90.0));
            }
            other => panic!("unexpected value {:?}", other),
        }
    }
}
