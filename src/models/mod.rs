use crate::scraper::cleaner::{format_amount, parse_amount, parse_payment_date};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ── Canonical columns ─────────────────────────────────────────────────────────

/// The fixed set of fields a payment row is normalised to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CanonicalColumn {
    ReceiptNo,
    Date,
    Principal,
    Pen,
    #[serde(rename = "CBU")]
    Cbu,
    #[serde(rename = "CBUWithdraw")]
    CbuWithdraw,
    Collector,
}

impl CanonicalColumn {
    pub const ALL: [CanonicalColumn; 7] = [
        Self::ReceiptNo,
        Self::Date,
        Self::Principal,
        Self::Pen,
        Self::Cbu,
        Self::CbuWithdraw,
        Self::Collector,
    ];

    /// Identifier used in exports and on the command line.
    pub fn name(self) -> &'static str {
        match self {
            Self::ReceiptNo => "ReceiptNo",
            Self::Date => "Date",
            Self::Principal => "Principal",
            Self::Pen => "Pen",
            Self::Cbu => "CBU",
            Self::CbuWithdraw => "CBUWithdraw",
            Self::Collector => "Collector",
        }
    }

    /// Lower-case wording as it shows up in page text ("receipt no", "cbu withdraw").
    pub fn label(self) -> &'static str {
        match self {
            Self::ReceiptNo => "receipt no",
            Self::Date => "date",
            Self::Principal => "principal",
            Self::Pen => "pen",
            Self::Cbu => "cbu",
            Self::CbuWithdraw => "cbu withdraw",
            Self::Collector => "collector",
        }
    }
}

impl fmt::Display for CanonicalColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CanonicalColumn {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = squash(s);
        Self::ALL
            .into_iter()
            .find(|c| squash(c.name()) == key)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

// ── Reconciliation fields ─────────────────────────────────────────────────────

/// Monetary columns that carry a passbook comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Ledger {
    Principal,
    Cbu,
    CbuWithdraw,
}

impl Ledger {
    pub const ALL: [Ledger; 3] = [Self::Principal, Self::Cbu, Self::CbuWithdraw];

    /// The extracted column the passbook value is compared against.
    pub fn column(self) -> CanonicalColumn {
        match self {
            Self::Principal => CanonicalColumn::Principal,
            Self::Cbu => CanonicalColumn::Cbu,
            Self::CbuWithdraw => CanonicalColumn::CbuWithdraw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReconKind {
    PassBook,
    Variance,
    Remarks,
}

/// A user-editable field attached to one ledger, e.g. `CBU_PassBook`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ReconField {
    pub ledger: Ledger,
    pub kind: ReconKind,
}

impl ReconField {
    pub const fn new(ledger: Ledger, kind: ReconKind) -> Self {
        Self { ledger, kind }
    }

    /// Fields every extracted row starts out with.
    pub const DEFAULTED: [ReconField; 6] = [
        Self::new(Ledger::Principal, ReconKind::PassBook),
        Self::new(Ledger::Principal, ReconKind::Variance),
        Self::new(Ledger::Cbu, ReconKind::PassBook),
        Self::new(Ledger::Cbu, ReconKind::Variance),
        Self::new(Ledger::CbuWithdraw, ReconKind::PassBook),
        Self::new(Ledger::CbuWithdraw, ReconKind::Variance),
    ];

    pub fn name(self) -> &'static str {
        use Ledger::*;
        use ReconKind::*;
        match (self.ledger, self.kind) {
            (Principal, PassBook) => "Principal_PassBook",
            (Principal, Variance) => "Principal_Variance",
            (Principal, Remarks) => "Principal_Remarks",
            (Cbu, PassBook) => "CBU_PassBook",
            (Cbu, Variance) => "CBU_Variance",
            (Cbu, Remarks) => "CBU_Remarks",
            (CbuWithdraw, PassBook) => "CBUWithdraw_PassBook",
            (CbuWithdraw, Variance) => "CBUWithdraw_Variance",
            (CbuWithdraw, Remarks) => "CBUWithdraw_Remarks",
        }
    }

    fn all() -> impl Iterator<Item = ReconField> {
        Ledger::ALL.into_iter().flat_map(|ledger| {
            [ReconKind::PassBook, ReconKind::Variance, ReconKind::Remarks]
                .into_iter()
                .map(move |kind| ReconField::new(ledger, kind))
        })
    }
}

impl fmt::Display for ReconField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accepts `CBUWithdraw_PassBook` as well as the older `CBU_withdraw_PassBook`.
impl FromStr for ReconField {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = squash(s);
        Self::all()
            .find(|f| squash(f.name()) == key)
            .ok_or_else(|| UnknownField(s.to_string()))
    }
}

impl From<ReconField> for String {
    fn from(field: ReconField) -> Self {
        field.name().to_string()
    }
}

impl TryFrom<String> for ReconField {
    type Error = UnknownField;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown field name `{0}`")]
pub struct UnknownField(pub String);

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}

// ── Export columns ────────────────────────────────────────────────────────────

/// A column of the exported sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Canonical(CanonicalColumn),
    Recon(ReconField),
}

impl Column {
    pub fn header(self) -> &'static str {
        match self {
            Self::Canonical(c) => c.name(),
            Self::Recon(f) => f.name(),
        }
    }
}

const fn recon(ledger: Ledger, kind: ReconKind) -> Column {
    Column::Recon(ReconField::new(ledger, kind))
}

/// Preferred column order of the exported sheet.
pub const EXPORT_COLUMNS: [Column; 16] = [
    Column::Canonical(CanonicalColumn::ReceiptNo),
    Column::Canonical(CanonicalColumn::Date),
    Column::Canonical(CanonicalColumn::Principal),
    Column::Canonical(CanonicalColumn::Pen),
    recon(Ledger::Principal, ReconKind::PassBook),
    recon(Ledger::Principal, ReconKind::Variance),
    recon(Ledger::Principal, ReconKind::Remarks),
    Column::Canonical(CanonicalColumn::Cbu),
    recon(Ledger::Cbu, ReconKind::PassBook),
    recon(Ledger::Cbu, ReconKind::Variance),
    recon(Ledger::Cbu, ReconKind::Remarks),
    Column::Canonical(CanonicalColumn::CbuWithdraw),
    recon(Ledger::CbuWithdraw, ReconKind::PassBook),
    recon(Ledger::CbuWithdraw, ReconKind::Variance),
    recon(Ledger::CbuWithdraw, ReconKind::Remarks),
    Column::Canonical(CanonicalColumn::Collector),
];

// ── Payment fields ────────────────────────────────────────────────────────────

/// Canonical values of one payment row. `None` means the source had no value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pen: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cbu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cbu_withdraw: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collector: Option<String>,
}

impl PaymentFields {
    fn slot(&mut self, column: CanonicalColumn) -> &mut Option<String> {
        match column {
            CanonicalColumn::ReceiptNo => &mut self.receipt_no,
            CanonicalColumn::Date => &mut self.date,
            CanonicalColumn::Principal => &mut self.principal,
            CanonicalColumn::Pen => &mut self.pen,
            CanonicalColumn::Cbu => &mut self.cbu,
            CanonicalColumn::CbuWithdraw => &mut self.cbu_withdraw,
            CanonicalColumn::Collector => &mut self.collector,
        }
    }

    pub fn get(&self, column: CanonicalColumn) -> Option<&str> {
        let value = match column {
            CanonicalColumn::ReceiptNo => &self.receipt_no,
            CanonicalColumn::Date => &self.date,
            CanonicalColumn::Principal => &self.principal,
            CanonicalColumn::Pen => &self.pen,
            CanonicalColumn::Cbu => &self.cbu,
            CanonicalColumn::CbuWithdraw => &self.cbu_withdraw,
            CanonicalColumn::Collector => &self.collector,
        };
        value.as_deref()
    }

    /// Last write wins.
    pub fn set(&mut self, column: CanonicalColumn, value: impl Into<String>) {
        *self.slot(column) = Some(value.into());
    }

    /// Populated fields in canonical order.
    pub fn populated(&self) -> impl Iterator<Item = (CanonicalColumn, &str)> {
        CanonicalColumn::ALL
            .into_iter()
            .filter_map(|c| self.get(c).filter(|v| !v.is_empty()).map(|v| (c, v)))
    }

    pub fn populated_count(&self) -> usize {
        self.populated().count()
    }
}

// ── Records ───────────────────────────────────────────────────────────────────

/// A row as produced by extraction, before it is given an identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    pub fields: PaymentFields,
    #[serde(default)]
    pub reconciliation: BTreeMap<ReconField, String>,
}

impl ExtractedRecord {
    /// Fill any of the six default reconciliation fields that are still unset.
    pub fn default_reconciliation(&mut self, value: &str) {
        for field in ReconField::DEFAULTED {
            self.reconciliation
                .entry(field)
                .or_insert_with(|| value.to_string());
        }
    }
}

/// Opaque row identifier, unique within a record set and never reassigned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    /// Identifier for the `index`-th row of a scrape started at `stamp_ms`.
    pub fn scraped(stamp_ms: i64, index: usize) -> Self {
        Self(format!("scraped_{}_{}", stamp_ms, index))
    }

    /// Identifier for a row added by hand.
    pub fn manual(stamp_ms: i64, seq: usize) -> Self {
        Self(format!("row_{}_{}", stamp_ms, seq))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub row_id: RowId,
    pub fields: PaymentFields,
    #[serde(default)]
    pub reconciliation: BTreeMap<ReconField, String>,
}

impl Record {
    pub fn new(row_id: RowId, extracted: ExtractedRecord) -> Self {
        Self {
            row_id,
            fields: extracted.fields,
            reconciliation: extracted.reconciliation,
        }
    }

    /// Cell value for an export column; missing values are empty.
    pub fn value(&self, column: Column) -> &str {
        match column {
            Column::Canonical(c) => self.fields.get(c).unwrap_or(""),
            Column::Recon(f) => self.reconciliation.get(&f).map(String::as_str).unwrap_or(""),
        }
    }
}

// ── Record set ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("row `{0}` not found")]
    RowNotFound(RowId),
}

/// Ordered working data of one session. Duplicates are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordSet {
    records: Vec<Record>,
}

impl RecordSet {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.records.iter()
    }

    pub fn get(&self, row_id: &RowId) -> Option<&Record> {
        self.records.iter().find(|r| &r.row_id == row_id)
    }

    /// Apply reconciliation edits to one row.
    ///
    /// Setting a PassBook value recomputes the ledger's Variance as
    /// `passbook - extracted` when both are numeric, unless the same edit
    /// sets the Variance itself.
    pub fn update(
        &mut self,
        row_id: &RowId,
        edits: &[(ReconField, String)],
    ) -> Result<(), EditError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| &r.row_id == row_id)
            .ok_or_else(|| EditError::RowNotFound(row_id.clone()))?;

        for (field, value) in edits {
            record.reconciliation.insert(*field, value.clone());
        }

        for ledger in Ledger::ALL {
            let touched = |kind| edits.iter().any(|(f, _)| *f == ReconField::new(ledger, kind));
            if !touched(ReconKind::PassBook) || touched(ReconKind::Variance) {
                continue;
            }
            let passbook = record
                .reconciliation
                .get(&ReconField::new(ledger, ReconKind::PassBook))
                .and_then(|v| parse_amount(v));
            let extracted = record.fields.get(ledger.column()).and_then(parse_amount);
            if let (Some(passbook), Some(extracted)) = (passbook, extracted) {
                record.reconciliation.insert(
                    ReconField::new(ledger, ReconKind::Variance),
                    format_amount(passbook - extracted),
                );
            }
        }
        Ok(())
    }

    /// Append a hand-entered row and re-sort by date. Returns its new id.
    pub fn add(&mut self, stamp_ms: i64, mut record: ExtractedRecord) -> RowId {
        record.default_reconciliation("0");

        let mut seq = self.records.len();
        let mut row_id = RowId::manual(stamp_ms, seq);
        while self.get(&row_id).is_some() {
            seq += 1;
            row_id = RowId::manual(stamp_ms, seq);
        }

        self.records.push(Record::new(row_id.clone(), record));
        self.sort_by_date();
        row_id
    }

    /// Remove a row; `false` when no row has this id.
    pub fn remove(&mut self, row_id: &RowId) -> bool {
        let before = self.records.len();
        self.records.retain(|r| &r.row_id != row_id);
        self.records.len() != before
    }

    /// Stable sort; rows with unparseable dates sort first.
    pub fn sort_by_date(&mut self) {
        self.records
            .sort_by_cached_key(|r| parse_payment_date(r.fields.date.as_deref().unwrap_or("")));
    }
}

impl IntoIterator for RecordSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}

impl<'a> IntoIterator for &'a RecordSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn row(date: &str, principal: &str) -> ExtractedRecord {
        let mut fields = PaymentFields::default();
        fields.set(CanonicalColumn::Date, date);
        fields.set(CanonicalColumn::Principal, principal);
        ExtractedRecord {
            fields,
            reconciliation: BTreeMap::new(),
        }
    }

    fn set_of(rows: Vec<ExtractedRecord>) -> RecordSet {
        RecordSet::new(
            rows.into_iter()
                .enumerate()
                .map(|(i, r)| Record::new(RowId::scraped(1, i), r))
                .collect(),
        )
    }

    #[test]
    fn recon_field_names_accept_both_spellings() {
        let expected = ReconField::new(Ledger::CbuWithdraw, ReconKind::PassBook);
        assert_eq!("CBUWithdraw_PassBook".parse::<ReconField>(), Ok(expected));
        assert_eq!("CBU_withdraw_PassBook".parse::<ReconField>(), Ok(expected));
        assert_eq!("principal_remarks".parse::<ReconField>().unwrap().name(), "Principal_Remarks");
        assert!("Principal".parse::<ReconField>().is_err());
    }

    #[test]
    fn canonical_column_parses_names() {
        assert_eq!("receipt no".parse::<CanonicalColumn>(), Ok(CanonicalColumn::ReceiptNo));
        assert_eq!("CBUWithdraw".parse::<CanonicalColumn>(), Ok(CanonicalColumn::CbuWithdraw));
        assert!("amount".parse::<CanonicalColumn>().is_err());
    }

    #[test]
    fn export_order_is_fixed() {
        let headers: Vec<&str> = EXPORT_COLUMNS.iter().map(|c| c.header()).collect();
        assert_eq!(headers[0], "ReceiptNo");
        assert_eq!(headers[6], "Principal_Remarks");
        assert_eq!(headers[11], "CBUWithdraw");
        assert_eq!(headers[15], "Collector");
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut extracted = row("01/05/2024", "1000");
        extracted.default_reconciliation("");
        let set = set_of(vec![extracted]);

        let json = serde_json::to_string(&set).unwrap();
        assert!(json.contains("\"CBUWithdraw_Variance\":\"\""));
        let back: RecordSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn update_recomputes_variance_from_passbook() {
        let mut set = set_of(vec![row("01/05/2024", "1,000")]);
        let id = RowId::scraped(1, 0);
        let passbook = ReconField::new(Ledger::Principal, ReconKind::PassBook);
        let variance = ReconField::new(Ledger::Principal, ReconKind::Variance);

        set.update(&id, &[(passbook, "1200".to_string())]).unwrap();
        assert_eq!(set.get(&id).unwrap().value(Column::Recon(variance)), "200");

        set.update(&id, &[(passbook, "900".into()), (variance, "manual".into())])
            .unwrap();
        assert_eq!(set.get(&id).unwrap().value(Column::Recon(variance)), "manual");
    }

    #[test]
    fn update_unknown_row_is_an_error() {
        let mut set = set_of(vec![row("01/05/2024", "10")]);
        let missing = RowId::from("nope");
        assert_eq!(
            set.update(&missing, &[]),
            Err(EditError::RowNotFound(missing.clone()))
        );
    }

    #[test]
    fn add_sorts_stably_with_unparseable_dates_first() {
        let mut set = set_of(vec![
            row("03/01/2024", "a"),
            row("01/01/2024", "b"),
            row("01/01/2024", "c"),
        ]);
        let id = set.add(42, row("April", "d"));

        let order: Vec<&str> = set.iter().map(|r| r.fields.principal.as_deref().unwrap()).collect();
        assert_eq!(order, vec!["d", "b", "c", "a"]);
        assert_eq!(id.as_str(), "row_42_3");
        assert_eq!(set.get(&id).unwrap().reconciliation.len(), 6);
    }

    #[test]
    fn remove_by_id() {
        let mut set = set_of(vec![row("01/01/2024", "a"), row("01/01/2024", "a")]);
        assert!(set.remove(&RowId::scraped(1, 0)));
        assert!(!set.remove(&RowId::scraped(1, 0)));
        assert_eq!(set.len(), 1);
    }
}
