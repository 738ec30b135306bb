//! Heuristics that decide what a table means.
//!
//! Header and row rules are plain ordered lists evaluated top to bottom,
//! first match wins, so each rule can be tested on its own.

use crate::models::{CanonicalColumn, PaymentFields};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

// ── Table classification ──────────────────────────────────────────────────────

const PAYMENT_KEYWORDS: [&str; 8] = [
    "receipt",
    "date",
    "principal",
    "collector",
    "pen",
    "cbu",
    "payment",
    "amount paid",
];

/// Distinct keywords a table must mention to be considered payment data.
pub const MIN_PAYMENT_KEYWORDS: usize = 4;

/// Number of distinct payment keywords found in `text` (case-insensitive).
pub fn payment_keyword_count(text: &str) -> usize {
    let text = text.to_lowercase();
    PAYMENT_KEYWORDS.iter().filter(|k| text.contains(*k)).count()
}

pub fn is_payment_table(table_text: &str) -> bool {
    payment_keyword_count(table_text) >= MIN_PAYMENT_KEYWORDS
}

// ── Header mapping ────────────────────────────────────────────────────────────

/// Column index → canonical column. Unmapped indices are absent.
pub type HeaderMapping = BTreeMap<usize, CanonicalColumn>;

/// Mapped columns a table needs before its rows are read.
pub const MIN_MAPPED_COLUMNS: usize = 3;

const EXACT_HEADERS: &[(&str, CanonicalColumn)] = &[
    ("date", CanonicalColumn::Date),
    ("receipt no", CanonicalColumn::ReceiptNo),
    ("receipt", CanonicalColumn::ReceiptNo),
    ("receipt number", CanonicalColumn::ReceiptNo),
    ("ref no", CanonicalColumn::ReceiptNo),
    ("reference", CanonicalColumn::ReceiptNo),
    ("transaction id", CanonicalColumn::ReceiptNo),
    ("principal", CanonicalColumn::Principal),
    ("pen", CanonicalColumn::Pen),
    ("cbu", CanonicalColumn::Cbu),
    ("cbu withdraw", CanonicalColumn::CbuWithdraw),
    ("collector", CanonicalColumn::Collector),
];

/// One step of header interpretation. Input is lower-cased and trimmed.
pub struct HeaderRule {
    pub name: &'static str,
    pub apply: fn(&str) -> Option<CanonicalColumn>,
}

fn when(hit: bool, column: CanonicalColumn) -> Option<CanonicalColumn> {
    hit.then_some(column)
}

pub static HEADER_RULES: &[HeaderRule] = &[
    HeaderRule {
        name: "exact",
        apply: |h| EXACT_HEADERS.iter().find(|(k, _)| *k == h).map(|(_, c)| *c),
    },
    HeaderRule {
        name: "short date",
        apply: |h| when(h.contains("date") && h.chars().count() <= 10, CanonicalColumn::Date),
    },
    HeaderRule {
        name: "penalty",
        apply: |h| when(matches!(h, "penalty" | "pen" | "denda"), CanonicalColumn::Pen),
    },
    HeaderRule {
        name: "principal",
        apply: |h| {
            when(
                h.contains("principal") || h.contains("pokok"),
                CanonicalColumn::Principal,
            )
        },
    },
    HeaderRule {
        name: "cbu withdraw",
        apply: |h| {
            when(
                h.starts_with("cbu") && (h.contains("withdraw") || h.contains("tarik")),
                CanonicalColumn::CbuWithdraw,
            )
        },
    },
    HeaderRule {
        name: "cbu",
        apply: |h| when(h.starts_with("cbu"), CanonicalColumn::Cbu),
    },
    HeaderRule {
        name: "collector",
        apply: |h| {
            when(
                h.contains("collector") || h.contains("kolektor"),
                CanonicalColumn::Collector,
            )
        },
    },
];

/// First rule that recognises `header`, with the column it picked.
pub fn header_rule_for(header: &str) -> Option<(&'static HeaderRule, CanonicalColumn)> {
    let h = header.trim().to_lowercase();
    HEADER_RULES
        .iter()
        .find_map(|rule| (rule.apply)(&h).map(|column| (rule, column)))
}

/// Interpret one header cell.
pub fn map_header(header: &str) -> Option<CanonicalColumn> {
    let (rule, column) = header_rule_for(header)?;
    debug!("Header {:?} → {} ({} rule)", header, column.name(), rule.name);
    Some(column)
}

pub fn map_headers<S: AsRef<str>>(headers: &[S]) -> HeaderMapping {
    headers
        .iter()
        .enumerate()
        .filter_map(|(i, h)| map_header(h.as_ref()).map(|c| (i, c)))
        .collect()
}

pub fn distinct_columns(mapping: &HeaderMapping) -> usize {
    mapping.values().collect::<BTreeSet<_>>().len()
}

/// Whether a row of plain cells reads like a header row.
pub fn contains_header_keywords<S: AsRef<str>>(cells: &[S]) -> bool {
    let joined = cells
        .iter()
        .map(|c| c.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    CanonicalColumn::ALL
        .iter()
        .any(|c| joined.contains(c.label()))
}

// ── Row validation ────────────────────────────────────────────────────────────

const SUMMARY_KEYWORDS: [&str; 6] = ["total", "subtotal", "grand total", "sum", "summary", "balance"];

const MONTH_NAMES: [&str; 24] = [
    "january", "february", "march", "april", "may", "june", "july", "august",
    "september", "october", "november", "december", "jan", "feb", "mar", "apr",
    "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// Rows mentioning a month need at least this many fields to be kept.
const MONTH_ROW_MIN_FIELDS: usize = 4;

static DATE_SHAPES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\d+[/\-.]\d+[/\-.]\d+",
        r"\d{4}[/\-.]\d{1,2}[/\-.]\d{1,2}",
        r"\d{1,2}\s+\w{3,9}\s+\d{4}",
        r"\w{3,9}\s+\d{1,2},?\s+\d{4}",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("hardcoded date shape regex is valid"))
    .collect()
});

/// A reason to drop a mapped row.
pub struct RowRule {
    pub name: &'static str,
    pub rejects: fn(&PaymentFields) -> bool,
}

fn joined_lower(fields: &PaymentFields) -> String {
    fields
        .populated()
        .map(|(_, v)| v)
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn looks_like_date(value: &str) -> bool {
    DATE_SHAPES.iter().any(|re| re.is_match(value))
}

pub static ROW_RULES: &[RowRule] = &[
    RowRule {
        name: "summary row",
        rejects: |f| {
            let text = joined_lower(f);
            SUMMARY_KEYWORDS.iter().any(|k| text.contains(k))
        },
    },
    RowRule {
        name: "month label",
        rejects: |f| {
            let text = joined_lower(f);
            MONTH_NAMES.iter().any(|m| text.contains(m))
                && f.populated_count() < MONTH_ROW_MIN_FIELDS
        },
    },
    RowRule {
        name: "malformed date",
        rejects: |f| {
            f.get(CanonicalColumn::Date)
                .map(str::trim)
                .is_some_and(|d| !d.is_empty() && !looks_like_date(d))
        },
    },
];

/// Name of the first rule that rejects the row, if any.
pub fn rejection(fields: &PaymentFields) -> Option<&'static str> {
    ROW_RULES
        .iter()
        .find(|rule| (rule.rejects)(fields))
        .map(|rule| rule.name)
}

pub fn is_valid_row(fields: &PaymentFields) -> bool {
    rejection(fields).is_none()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(CanonicalColumn, &str)]) -> PaymentFields {
        let mut f = PaymentFields::default();
        for (c, v) in pairs {
            f.set(*c, *v);
        }
        f
    }

    #[test]
    fn classifier_counts_each_keyword_once() {
        assert!(!is_payment_table("Date date DATE principal principal"));
        assert!(is_payment_table("Receipt | Date | Principal | Collector"));
        assert!(is_payment_table("AMOUNT PAID on date by collector, cbu"));
        assert!(!is_payment_table("Home About Contact Date"));
    }

    #[test]
    fn exact_headers_map_first() {
        let m = map_headers(&["Receipt No", " DATE ", "Principal", "Pen", "CBU", "CBU Withdraw", "Collector"]);
        assert_eq!(m.len(), 7);
        assert_eq!(m[&0], CanonicalColumn::ReceiptNo);
        assert_eq!(m[&1], CanonicalColumn::Date);
        assert_eq!(m[&5], CanonicalColumn::CbuWithdraw);
        assert_eq!(map_header("Transaction ID"), Some(CanonicalColumn::ReceiptNo));
    }

    #[test]
    fn fuzzy_headers_cover_indonesian_variants() {
        let m = map_headers(&["Tgl Date", "Pokok", "Denda", "CBU Tarik", "CBU Setor", "Kolektor"]);
        assert_eq!(
            m.values().copied().collect::<Vec<_>>(),
            vec![
                CanonicalColumn::Date,
                CanonicalColumn::Principal,
                CanonicalColumn::Pen,
                CanonicalColumn::CbuWithdraw,
                CanonicalColumn::Cbu,
                CanonicalColumn::Collector,
            ]
        );
        assert!(distinct_columns(&m) >= MIN_MAPPED_COLUMNS);
    }

    #[test]
    fn unrecognised_headers_stay_unmapped() {
        assert_eq!(map_header("Payment date and time"), None);
        assert_eq!(map_header("Penalty fee"), None);
        assert_eq!(map_header("Notes"), None);
        let m = map_headers(&["Notes", "Date", "Notes"]);
        assert_eq!(m.keys().copied().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn reports_which_rule_matched() {
        let name = |h| header_rule_for(h).map(|(rule, _)| rule.name);
        assert_eq!(name("Receipt No"), Some("exact"));
        assert_eq!(name("CBU Tarik"), Some("cbu withdraw"));
        assert_eq!(name("CBU Setor"), Some("cbu"));
        assert_eq!(name("Remarks"), None);
    }

    #[test]
    fn header_keyword_detection() {
        assert!(contains_header_keywords(&["No", "Tanggal", "Collector"]));
        assert!(!contains_header_keywords(&["01/05/2024", "1000"]));
    }

    #[test]
    fn keeps_plain_payment_rows() {
        let row = fields(&[
            (CanonicalColumn::Date, "01/05/2024"),
            (CanonicalColumn::Principal, "1000"),
            (CanonicalColumn::Collector, "John"),
        ]);
        assert!(is_valid_row(&row));
    }

    #[test]
    fn rejects_summary_rows() {
        let mut row = fields(&[
            (CanonicalColumn::Date, "01/05/2024"),
            (CanonicalColumn::Principal, "1000"),
            (CanonicalColumn::Collector, "John"),
        ]);
        row.set(CanonicalColumn::Pen, "Total: 500");
        assert_eq!(rejection(&row), Some("summary row"));

        let row = fields(&[(CanonicalColumn::Collector, "GRAND TOTAL")]);
        assert!(!is_valid_row(&row));
    }

    #[test]
    fn month_labels_only_rejected_on_sparse_rows() {
        let sparse = fields(&[
            (CanonicalColumn::Date, "05/01/2024"),
            (CanonicalColumn::Principal, "100"),
            (CanonicalColumn::Collector, "April"),
        ]);
        assert_eq!(rejection(&sparse), Some("month label"));

        let mut full = sparse.clone();
        full.set(CanonicalColumn::Pen, "5");
        assert!(is_valid_row(&full));
    }

    #[test]
    fn date_shapes() {
        assert!(looks_like_date("04/15/2024"));
        assert!(looks_like_date("15-04-2024"));
        assert!(looks_like_date("2024.4.15"));
        assert!(looks_like_date("15 April 2024"));
        assert!(looks_like_date("April 15, 2024"));
        assert!(!looks_like_date("15/04"));

        let bad = fields(&[
            (CanonicalColumn::Date, "pending"),
            (CanonicalColumn::Principal, "100"),
            (CanonicalColumn::Pen, "0"),
        ]);
        assert_eq!(rejection(&bad), Some("malformed date"));

        let undated = fields(&[
            (CanonicalColumn::ReceiptNo, "R-1"),
            (CanonicalColumn::Principal, "100"),
            (CanonicalColumn::Pen, "0"),
        ]);
        assert!(is_valid_row(&undated));
    }
}
