use super::cleaner::normalize_text;
use super::dom::{children_tagged, find_all, is_bold, DomNode};
use super::rules::{
    contains_header_keywords, distinct_columns, is_payment_table, map_headers, rejection,
    MIN_MAPPED_COLUMNS,
};
use crate::models::{CanonicalColumn, ExtractedRecord, PaymentFields};
use std::collections::BTreeMap;
use tracing::debug;

/// Populated canonical fields a table row needs to be kept.
pub const MIN_ROW_FIELDS: usize = 3;

/// Fields the key/value fallback collects before emitting a record.
const FALLBACK_RECORD_FIELDS: usize = 2;

// ── Tables ────────────────────────────────────────────────────────────────────

/// A table reduced to cleaned header cells and the rows below the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    /// Locate the header row and collect everything after it.
    ///
    /// The header is the first row, top to bottom, that has `<th>` cells, or
    /// whose `<td>` cells are mostly bold, or whose text names a canonical
    /// column. `None` when no row qualifies.
    pub fn from_node<N: DomNode>(table: &N) -> Option<Self> {
        let rows = find_all(table, &["tr"]);

        let (header_idx, headers) = rows.iter().enumerate().find_map(|(i, row)| {
            header_cells(row).map(|cells| (i, cells))
        })?;

        let rows = rows[header_idx + 1..]
            .iter()
            .map(|row| cell_texts(&children_tagged(row, &["td", "th"])))
            .collect();

        Some(Self { headers, rows })
    }
}

fn cell_texts<N: DomNode>(cells: &[N]) -> Vec<String> {
    cells.iter().map(|c| normalize_text(&c.text_content())).collect()
}

fn header_cells<N: DomNode>(row: &N) -> Option<Vec<String>> {
    let th = children_tagged(row, &["th"]);
    if !th.is_empty() {
        return Some(cell_texts(&th));
    }

    let td = children_tagged(row, &["td"]);
    if td.is_empty() {
        return None;
    }
    let texts = cell_texts(&td);
    let bold = td.iter().filter(|c| is_bold(*c)).count();
    (bold * 2 > td.len() || contains_header_keywords(&texts)).then_some(texts)
}

/// Turn one HTML table into payment records, or nothing if it does not look
/// like a payment table.
pub fn extract_table<N: DomNode>(table: &N) -> Vec<ExtractedRecord> {
    if !is_payment_table(&table.text_content()) {
        debug!("Skipping table: too few payment keywords");
        return vec![];
    }

    let Some(raw) = RawTable::from_node(table) else {
        debug!("Skipping table: no header row");
        return vec![];
    };

    extract_rows(&raw)
}

/// Map and validate the rows of an already located table.
pub fn extract_rows(raw: &RawTable) -> Vec<ExtractedRecord> {
    let mapping = map_headers(&raw.headers);
    if distinct_columns(&mapping) < MIN_MAPPED_COLUMNS {
        debug!(
            "Skipping table: only {} recognised columns in {:?}",
            distinct_columns(&mapping),
            raw.headers
        );
        return vec![];
    }

    let mut records = Vec::new();

    for (n, cells) in raw.rows.iter().enumerate() {
        if cells.len() != raw.headers.len() {
            debug!("Row {}: {} cells, expected {}", n, cells.len(), raw.headers.len());
            continue;
        }

        let mut fields = PaymentFields::default();
        for (i, text) in cells.iter().enumerate() {
            if let Some(column) = mapping.get(&i) {
                if !text.is_empty() {
                    fields.set(*column, text.as_str());
                }
            }
        }

        if fields.populated_count() < MIN_ROW_FIELDS {
            continue;
        }
        if let Some(reason) = rejection(&fields) {
            debug!("Row {}: dropped ({})", n, reason);
            continue;
        }

        let mut record = ExtractedRecord {
            fields,
            reconciliation: BTreeMap::new(),
        };
        record.default_reconciliation("");
        records.push(record);
    }

    records
}

/// Records from every table under `root`, in document order.
pub fn extract_tables<N: DomNode>(root: &N) -> Vec<ExtractedRecord> {
    find_all(root, &["table"])
        .iter()
        .flat_map(extract_table)
        .collect()
}

// ── Key/value fallback ────────────────────────────────────────────────────────

/// Match order for keys; "cbu withdraw" is tried before its prefix "cbu".
const FALLBACK_COLUMNS: [CanonicalColumn; 7] = [
    CanonicalColumn::ReceiptNo,
    CanonicalColumn::Date,
    CanonicalColumn::Principal,
    CanonicalColumn::Pen,
    CanonicalColumn::CbuWithdraw,
    CanonicalColumn::Cbu,
    CanonicalColumn::Collector,
];

/// Best-effort scan of `Key: value` text in block and inline elements.
///
/// No validation is applied; used only when no table produced anything.
pub fn extract_from_non_tabular<N: DomNode>(root: &N) -> Vec<ExtractedRecord> {
    let mut records = Vec::new();
    let mut current = PaymentFields::default();

    for element in find_all(root, &["div", "span", "p"]) {
        let text = normalize_text(&element.text_content());

        if let Some((key, value)) = text.split_once(':') {
            let key = key.trim().to_lowercase();
            let value = value.trim();
            let column = FALLBACK_COLUMNS.iter().find(|c| key.contains(c.label()));
            // A bare "Date:" label carries nothing and does not count toward a record.
            if let Some(column) = column.filter(|_| !value.is_empty()) {
                current.set(*column, value);
            }
        }

        if current.populated_count() >= FALLBACK_RECORD_FIELDS {
            records.push(ExtractedRecord {
                fields: std::mem::take(&mut current),
                reconciliation: BTreeMap::new(),
            });
        }
    }

    if current.populated_count() > 0 {
        records.push(ExtractedRecord {
            fields: current,
            reconciliation: BTreeMap::new(),
        });
    }

    records
}

// ── Tests ─────────────────────────────────────────────────────────────────────
