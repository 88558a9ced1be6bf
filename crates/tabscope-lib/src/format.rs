//! Cell value formatting for data and profile replies.

use crate::comm::{ColumnValue, FormatOptions, SpecialValue};
use crate::scalar::Scalar;

pub fn format_value(cell: &Scalar, opts: &FormatOptions) -> ColumnValue {
    match cell {
        Scalar::Null => SpecialValue::Null.into(),
        Scalar::Float(f) if f.is_nan() => SpecialValue::NaN.into(),
        Scalar::Float(f) if f.is_infinite() => {
            if *f > 0.0 {
                SpecialValue::Inf.into()
            } else {
                SpecialValue::NegInf.into()
            }
        }
        Scalar::Float(f) => ColumnValue::Formatted(format_float(*f, opts)),
        Scalar::Int(i) => ColumnValue::Formatted(format_int(*i, opts)),
        Scalar::Str(s) | Scalar::Other(s) => ColumnValue::Formatted(truncate(s, opts.max_value_length)),
        other => ColumnValue::Formatted(other.to_raw_string()),
    }
}

pub fn format_values(cells: &[Scalar], opts: &FormatOptions) -> Vec<ColumnValue> {
    cells.iter().map(|c| format_value(c, opts)).collect()
}

/// Plain-string rendering of a formatted value, for places that cannot carry
/// special-value codes (summary statistics, histogram edges).
pub fn format_scalar_text(cell: &Scalar, opts: &FormatOptions) -> String {
    match cell {
        Scalar::Null => "NULL".to_string(),
        Scalar::Float(f) if f.is_nan() => "NaN".to_string(),
        Scalar::Float(f) if f.is_infinite() => {
            let text = if *f > 0.0 { "inf" } else { "-inf" };
            text.to_string()
        }
        _ => match format_value(cell, opts) {
            ColumnValue::Formatted(s) => s,
            ColumnValue::Special(code) => code.to_string(),
        },
    }
}

pub fn truncate(s: &str, max_len: usize) -> String {
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

pub fn format_int(value: i64, opts: &FormatOptions) -> String {
    let text = value.to_string();
    match &opts.thousands_sep {
        Some(sep) => group_thousands(&text, sep),
        None => text,
    }
}

pub fn format_float(value: f64, opts: &FormatOptions) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return format!("{:.*}", opts.large_num_digits, 0.0);
    }
    let magnitude = value.abs();
    let upper = 10f64.powi(opts.max_integral_digits as i32);
    let lower = 10f64.powi(-(opts.small_num_digits as i32));
    if magnitude >= upper || magnitude < lower {
        return format_scientific(value, opts.large_num_digits);
    }
    if magnitude < 1.0 {
        return format!("{:.*}", opts.small_num_digits, value);
    }
    let text = format!("{:.*}", opts.large_num_digits, value);
    match &opts.thousands_sep {
        Some(sep) => {
            let (int_part, frac) = match text.split_once('.') {
                Some((i, f)) => (i, Some(f)),
                None => (text.as_str(), None),
            };
            let grouped = group_thousands(int_part, sep);
            match frac {
                Some(f) => format!("{}.{}", grouped, f),
                None => grouped,
            }
        }
        None => text,
    }
}

/// `1.23E+08` style: signed exponent of at least two digits.
fn format_scientific(value: f64, digits: usize) -> String {
    let text = format!("{:.*e}", digits, value);
    let Some((mantissa, exp)) = text.split_once('e') else {
        return text;
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}E{}{:02}", mantissa, sign, exp.abs())
}

fn group_thousands(digits: &str, sep: &str) -> String {
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", digits),
    };
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 * sep.len());
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push_str(sep);
        }
        out.push(ch);
    }
    format!("{}{}", sign, out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_sep() -> FormatOptions {
        FormatOptions {
            thousands_sep: Some(",".to_string()),
            ..FormatOptions::default()
        }
    }

    #[test]
    fn float_ranges() {
        let opts = FormatOptions::default();
        assert_eq!(format_float(0.0, &opts), "0.00");
        assert_eq!(format_float(1.5, &opts), "1.50");
        assert_eq!(format_float(0.25, &opts), "0.2500");
        assert_eq!(format_float(123_456_789.0, &opts), "1.23E+08");
        assert_eq!(format_float(0.00001234, &opts), "1.23E-05");
        assert_eq!(format_float(-2.0, &opts), "-2.00");
    }

    #[test]
    fn thousands_separator() {
        let opts = with_sep();
        assert_eq!(format_float(1_234_567.891, &opts), "1,234,567.89");
        assert_eq!(format_int(-1_234_567, &opts), "-1,234,567");
        assert_eq!(format_int(999, &opts), "999");
        assert_eq!(format_int(1000, &FormatOptions::default()), "1000");
    }

    #[test]
    fn special_values() {
        let opts = FormatOptions::default();
        assert_eq!(format_value(&Scalar::Null, &opts), ColumnValue::Special(0));
        assert_eq!(format_value(&Scalar::Float(f64::NAN), &opts), ColumnValue::Special(2));
        assert_eq!(format_value(&Scalar::Float(f64::INFINITY), &opts), ColumnValue::Special(10));
        assert_eq!(
            format_value(&Scalar::Float(f64::NEG_INFINITY), &opts),
            ColumnValue::Special(11)
        );
    }

    #[test]
    fn strings_truncate_on_char_boundaries() {
        let opts = FormatOptions {
            max_value_length: 3,
            ..FormatOptions::default()
        };
        assert_eq!(
            format_value(&Scalar::Str("héllo".into()), &opts),
            ColumnValue::Formatted("hél".to_string())
        );
        assert_eq!(truncate("ab", 3), "ab");
    }
}
