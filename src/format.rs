//! Italian number formatting shared by exports and share texts.

/// `1234567.891` with 2 decimals → `1.234.567,89`.
pub fn format_number(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }
    let fixed = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match fixed.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (fixed.clone(), None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }
    let negative = value < 0.0 && fixed.chars().any(|c| c.is_ascii_digit() && c != '0');
    let mut out = String::new();
    if negative {
        out.push('-');
    }
    out.push_str(&grouped);
    if let Some(frac) = frac_part {
        out.push(',');
        out.push_str(&frac);
    }
    out
}

pub fn format_currency(value: f64) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }
    format!("{} €", format_number(value, 2))
}

pub fn format_percentage(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return "N/A".to_string();
    }
    format!("{:.*}%", decimals, value)
}

/// Quotes a CSV field when it carries a separator, quote or newline.
pub fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_thousands_italian_style() {
        assert_eq!(format_number(1_234_567.891, 2), "1.234.567,89");
        assert_eq!(format_number(999.0, 0), "999");
        assert_eq!(format_number(-1000.5, 1), "-1.000,5");
        assert_eq!(format_number(-0.001, 2), "0,00");
    }

    #[test]
    fn currency_and_percentage() {
        assert_eq!(format_currency(10_000.0), "10.000,00 €");
        assert_eq!(format_currency(f64::NAN), "N/A");
        assert_eq!(format_percentage(7.256, 2), "7.26%");
    }

    #[test]
    fn csv_quoting() {
        assert_eq!(csv_field("VWCE"), "VWCE");
        assert_eq!(csv_field("10.000,00 €"), "\"10.000,00 €\"");
        assert_eq!(csv_field("a\"b"), "\"a\"\"b\"");
    }
}
