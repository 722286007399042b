//! Amount parsing and formatting for figures that may be written with either
//! a comma or a dot as the decimal separator.

const PRECISION: f64 = 100.0;

/// Parses an amount written in any of the separator styles found in the
/// certificates and reports.
///
/// Spaces (including non-breaking ones) are ignored. When both `,` and `.`
/// appear, whichever comes last is the decimal separator and the other one
/// groups thousands. A lone `,` is treated as the decimal separator, as is a
/// lone `.`. Returns `None` for empty or unparseable input.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{00A0}')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = match (cleaned.rfind(','), cleaned.rfind('.')) {
        (Some(comma), Some(dot)) if comma > dot => cleaned.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => cleaned.replace(',', ""),
        (Some(_), None) => cleaned.replace(',', "."),
        _ => cleaned,
    };

    normalized
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}

/// Rounds to hundredths and renders with a comma as decimal separator.
pub fn format_amount(value: f64) -> String {
    round(value).to_string().replace('.', ",")
}

/// Renders a raw figure with its decimal point replaced by a comma.
pub fn comma_decimal(value: f64) -> String {
    value.to_string().replace('.', ",")
}

pub fn round(value: f64) -> f64 {
    (value * PRECISION).round() / PRECISION
}
