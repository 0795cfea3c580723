//! Display strings for item values.

const MAX_FRACTION_DIGITS: usize = 3;

/// Renders a sum. Integral values drop the fractional part; with
/// `separator` the integer digits are grouped by thousands and at most
/// three fractional digits are kept.
pub fn amount(value: f64, separator: bool) -> String {
    if !value.is_finite() {
        return value.to_string();
    }

    if !separator {
        if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
            return (value as i64).to_string();
        }
        return value.to_string();
    }

    let rounded = format!("{:.*}", MAX_FRACTION_DIGITS, value);
    let (integer, fraction) = rounded.split_once('.').unwrap_or((rounded.as_str(), ""));
    let fraction = fraction.trim_end_matches('0');
    let (negative, digits) = match integer.strip_prefix('-') {
        Some(digits) => (true, digits),
        None => (false, integer),
    };

    let mut out = String::new();
    if negative && !(fraction.is_empty() && digits.bytes().all(|digit| digit == b'0')) {
        out.push('-');
    }
    out.push_str(&group_thousands(digits));
    if !fraction.is_empty() {
        out.push('.');
        out.push_str(fraction);
    }
    out
}

pub fn count(value: u64, separator: bool) -> String {
    if separator {
        group_thousands(&value.to_string())
    } else {
        value.to_string()
    }
}

/// Journal items show how many entries they hold.
pub fn entries(count: usize) -> String {
    match count {
        0 => "No entries".to_string(),
        1 => "1 entry".to_string(),
        n => format!("{} entries", n),
    }
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_amounts_drop_integral_fraction() {
        assert_eq!(amount(5.0, false), "5");
        assert_eq!(amount(-22.0, false), "-22");
        assert_eq!(amount(2.2, false), "2.2");
        assert_eq!(amount(5.5, false), "5.5");
    }

    #[test]
    fn separated_amounts_group_and_round() {
        assert_eq!(amount(12345.6789, true), "12,345.679");
        assert_eq!(amount(225631.99, true), "225,631.99");
        assert_eq!(amount(2.2, true), "2.2");
        assert_eq!(amount(-22.0, true), "-22");
        assert_eq!(amount(1024.0, true), "1,024");
        assert_eq!(amount(-1234567.5, true), "-1,234,567.5");
        assert_eq!(amount(-0.0001, true), "0");
    }

    #[test]
    fn counts_group_digits() {
        assert_eq!(count(1024, true), "1,024");
        assert_eq!(count(1024, false), "1024");
        assert_eq!(count(999, true), "999");
        assert_eq!(count(1_000_000, true), "1,000,000");
    }

    #[test]
    fn entry_counts_read_naturally() {
        assert_eq!(entries(0), "No entries");
        assert_eq!(entries(1), "1 entry");
        assert_eq!(entries(4), "4 entries");
    }
}
