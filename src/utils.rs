/// Substrings that mark a subtotal row, matched anywhere in the lowercased name.
pub const TOTAL_MARKERS: &[&str] = &["total", "итого", "jami"];

/// Prefixes that mark a summation row.
pub const SUM_PREFIXES: &[&str] = &["sum of", "сумма", "yigindi"];

/// True when an account name looks like a spreadsheet subtotal line
/// (English, Russian or Uzbek).
pub fn is_total_row(name: &str) -> bool {
    let lowered = name.trim().to_lowercase();
    TOTAL_MARKERS.iter().any(|m| lowered.contains(m))
        || SUM_PREFIXES.iter().any(|p| lowered.starts_with(p))
}

/// Best-effort numeric parse: keep digits, `.` and `-`, then parse.
///
/// Returns `None` when nothing parsable remains. `"1,234.50"` becomes `1234.5`,
/// `"(500)"` becomes `500`, `"n/a"` yields `None`.
pub fn coerce_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if let Ok(v) = trimmed.parse::<f64>() {
        if v.is_finite() {
            return Some(v);
        }
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    parse_leading_float(&cleaned)
}

/// Parses the longest valid float prefix, the way a lenient parser would treat
/// leftovers such as `"12.5.3"` (→ 12.5) or `"10-2"` (→ 10).
fn parse_leading_float(s: &str) -> Option<f64> {
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_digit = false;

    for (i, c) in s.char_indices() {
        match c {
            '-' if i == 0 => {}
            '.' if !seen_dot => seen_dot = true,
            d if d.is_ascii_digit() => seen_digit = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }

    if !seen_digit {
        return None;
    }

    s[..end].trim_end_matches('.').parse::<f64>().ok()
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Case-insensitive substring match of a header against an alias list.
pub fn header_matches(header: &str, aliases: &[&str]) -> bool {
    let lowered = header.to_lowercase();
    aliases.iter().any(|a| lowered.contains(&a.to_lowercase()))
}
