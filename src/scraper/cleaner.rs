use chrono::NaiveDate;
use tracing::warn;

// ── Text ──────────────────────────────────────────────────────────────────────

/// Punctuation and currency symbols that survive cleaning.
const KEPT_SYMBOLS: &[char] = &['$', '€', '£', '¥', '.', ',', ':', '-', '/', '(', ')', '%'];

/// Clean raw cell text: drop stray symbols, collapse whitespace runs, trim.
/// "  Rp\u{a0}1,000 *\n" → "Rp 1,000"
pub fn normalize_text(s: &str) -> String {
    let kept = s
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace() || KEPT_SYMBOLS.contains(c));

    let mut out = String::with_capacity(s.len());
    let mut prev_space = true;
    for ch in kept {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.truncate(out.trim_end().len());
    out
}

// ── Dates ─────────────────────────────────────────────────────────────────────

/// Formats tried in order; the first that parses wins. Month-first is the
/// primary convention, so "03/04/2024" is March 4th.
const DATE_FORMATS: [&str; 6] = [
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%Y-%m-%d",
    "%Y/%m/%d",
];

/// Date substituted for anything unparseable (1900-01-01).
pub fn sentinel_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

/// Parse a payment date, falling back to [`sentinel_date`].
pub fn parse_payment_date(s: &str) -> NaiveDate {
    let s = s.trim();
    if !s.chars().any(|c| c.is_ascii_digit()) {
        return sentinel_date();
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d;
        }
    }

    warn!("Could not parse date {:?}, sorting it first", s);
    sentinel_date()
}

// ── Amounts ───────────────────────────────────────────────────────────────────

/// Parse a money amount: strip everything except digits, dot, minus.
/// "Rp 1,234.50" → 1234.5 | "(none)" → None
pub fn parse_amount(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || s == "-" || s == "—" {
        return None;
    }
    let cleaned: String = s
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    cleaned.parse().ok()
}

/// Whole numbers print without decimals, everything else with two.
pub fn format_amount(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.2}", v)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Receipt\n\t No  "), "Receipt No");
        assert_eq!(normalize_text("Total: $1,000.00 (50%)"), "Total: $1,000.00 (50%)");
        assert_eq!(normalize_text("a # b * c"), "a b c");
        assert_eq!(normalize_text("€5 £6 ¥7"), "€5 £6 ¥7");
        assert_eq!(normalize_text("Pokok™"), "Pokok");
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text(" \n "), "");
    }

    #[test]
    fn month_first_wins_for_ambiguous_dates() {
        // Known heuristic limitation: day <= 12 is always read month-first.
        assert_eq!(parse_payment_date("03/04/2024"), ymd(2024, 3, 4));
        assert_eq!(parse_payment_date("04/15/2024"), ymd(2024, 4, 15));
    }

    #[test]
    fn falls_through_to_later_formats() {
        assert_eq!(parse_payment_date("15/04/2024"), ymd(2024, 4, 15));
        assert_eq!(parse_payment_date("15-04-2024"), ymd(2024, 4, 15));
        assert_eq!(parse_payment_date("04-15-2024"), ymd(2024, 4, 15));
        assert_eq!(parse_payment_date("2024-04-15"), ymd(2024, 4, 15));
        assert_eq!(parse_payment_date("2024/04/15"), ymd(2024, 4, 15));
    }

    #[test]
    fn unparseable_dates_use_sentinel() {
        assert_eq!(parse_payment_date(""), sentinel_date());
        assert_eq!(parse_payment_date("April"), sentinel_date());
        assert_eq!(parse_payment_date("15 April 2024"), sentinel_date());
        assert_eq!(parse_payment_date("99/99/2024"), sentinel_date());
        assert_eq!(sentinel_date(), ymd(1900, 1, 1));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,234.50"), Some(1234.5));
        assert_eq!(parse_amount("$ 50"), Some(50.0));
        assert_eq!(parse_amount("-"), None);
        assert_eq!(parse_amount("n/a"), None);
        assert_eq!(format_amount(200.0), "200");
        assert_eq!(format_amount(-12.5), "-12.50");
    }
}
