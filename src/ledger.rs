use crate::amount::parse_amount;
use crate::errors::LedgerError;
use chrono::NaiveDate;
use csv::Trim;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::{info, warn};

pub const DATE_FORMAT: &str = "%d.%m.%Y";

/// The ledger header, in file order.
pub const COLUMNS: [&str; 9] = [
    "Source File",
    "Certificate Number",
    "Certificate Date",
    "Total Amount",
    "Advance Rate",
    "Total Rate",
    "Total Amount Din",
    "Invoice",
    "Certificate",
];

/// One processed progress certificate.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LedgerRecord {
    /// Name of the inbox document this record was built from. Unique across
    /// the ledger; its presence means the file has been processed.
    #[serde(rename = "Source File")]
    pub source_file: String,

    #[serde(rename = "Certificate Number")]
    pub certificate_number: String,

    /// `DD.MM.YYYY`, as written in the source filename.
    #[serde(rename = "Certificate Date")]
    pub certificate_date: String,

    /// Certificate total in the contract (foreign) currency.
    #[serde(rename = "Total Amount")]
    pub total_amount: f64,

    #[serde(rename = "Advance Rate", default, deserialize_with = "lenient_amount")]
    pub advance_rate: Option<f64>,

    #[serde(rename = "Total Rate", default, deserialize_with = "lenient_amount")]
    pub total_rate: Option<f64>,

    /// Confirmed local-currency total, backfilled from the invoice report.
    #[serde(rename = "Total Amount Din", default, deserialize_with = "lenient_amount")]
    pub total_amount_din: Option<f64>,

    /// Filename of the situacija (invoice) report.
    #[serde(rename = "Invoice")]
    pub invoice: String,

    /// Filename of the izvedeno (execution) report.
    #[serde(rename = "Certificate")]
    pub certificate: String,
}

impl LedgerRecord {
    pub fn date(&self) -> Result<NaiveDate, LedgerError> {
        NaiveDate::parse_from_str(&self.certificate_date, DATE_FORMAT).map_err(|_| {
            LedgerError::MalformedDate {
                date: self.certificate_date.clone(),
                source_file: self.source_file.clone(),
            }
        })
    }
}

/// Fields filled in by later stages rather than at ingest.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DerivedFields {
    pub advance_rate: Option<f64>,
    pub total_rate: Option<f64>,
    pub total_amount_din: Option<f64>,
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_amount))
}

/// The journal of processed certificates. It is the only state shared
/// between stages; a run has a single writer at a time.
#[derive(Debug, Default)]
pub struct Ledger {
    records: Vec<LedgerRecord>,
    sources: HashSet<String>,
}

impl Ledger {
    /// Loads the ledger at `path`, or an empty ledger when the file does not
    /// exist yet.
    pub fn load_or_default(path: &Path) -> Result<Self, LedgerError> {
        if !path.exists() {
            info!("no ledger at {}, starting a new one", path.display());
            return Ok(Ledger::default());
        }
        Self::load(path)
    }

    pub fn load(path: &Path) -> Result<Self, LedgerError> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }

    /// Reads a ledger from CSV. A header lacking any required column means
    /// the file no longer matches the schema; it is discarded and an empty
    /// ledger is returned in its place. Repeated source files keep their
    /// first row.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, LedgerError> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(true)
            .trim(Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let missing: Vec<&str> = COLUMNS
            .iter()
            .copied()
            .filter(|column| !headers.iter().any(|header| header == *column))
            .collect();
        if !missing.is_empty() {
            warn!(
                "ledger is missing columns {:?}, reinitializing an empty ledger",
                missing
            );
            return Ok(Ledger::default());
        }

        let mut ledger = Ledger::default();
        for record in rdr.deserialize() {
            let record: LedgerRecord = record?;
            if ledger.contains(&record.source_file) {
                warn!("duplicate ledger row for {}, keeping the first one", record.source_file);
                continue;
            }
            ledger.append(record)?;
        }

        Ok(ledger)
    }

    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        let file = File::create(path)?;
        self.write_to(file)
    }

    /// Writes the ledger as CSV. The header is always written, so an empty
    /// ledger still carries the full schema.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), LedgerError> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);

        wtr.write_record(COLUMNS)?;
        for record in &self.records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;

        Ok(())
    }

    pub fn contains(&self, source_file: &str) -> bool {
        self.sources.contains(source_file)
    }

    /// Appends a record for a source file not seen before.
    pub fn append(&mut self, record: LedgerRecord) -> Result<(), LedgerError> {
        if !self.sources.insert(record.source_file.clone()) {
            return Err(LedgerError::DuplicateSource(record.source_file));
        }
        self.records.push(record);

        Ok(())
    }

    /// Overwrites the derived fields of the record for `source_file`.
    pub fn upsert_derived_fields(
        &mut self,
        source_file: &str,
        fields: DerivedFields,
    ) -> Result<(), LedgerError> {
        let record = self
            .records
            .iter_mut()
            .find(|record| record.source_file == source_file)
            .ok_or_else(|| LedgerError::UnknownSource(source_file.to_string()))?;

        record.advance_rate = fields.advance_rate;
        record.total_rate = fields.total_rate;
        record.total_amount_din = fields.total_amount_din;

        Ok(())
    }

    pub fn records(&self) -> &[LedgerRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    pub fn record(index: u32, number: &str, date: &str, total: f64) -> LedgerRecord {
        LedgerRecord {
            source_file: format!("X_Progress_certificate_{}_{}.xlsx", number, date),
            certificate_number: number.to_string(),
            certificate_date: date.to_string(),
            total_amount: total,
            advance_rate: None,
            total_rate: None,
            total_amount_din: None,
            invoice: format!("situacija_{}_{}.xlsx", index, date),
            certificate: format!("izvedeno_{}_{}.xlsx", index, date),
        }
    }

    fn to_csv(ledger: &Ledger) -> String {
        let mut buf = Vec::new();
        ledger.write_to(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn should_write_header_for_empty_ledger() {
        let ledger = Ledger::default();
        assert_eq!(
            to_csv(&ledger),
            "Source File,Certificate Number,Certificate Date,Total Amount,Advance Rate,\
             Total Rate,Total Amount Din,Invoice,Certificate\n"
        );
    }

    #[test]
    fn should_round_trip_records_through_csv() {
        // Create a ledger with one plain record and one with backfilled
        // local-currency total.
        let mut ledger = Ledger::default();
        ledger.append(record(1, "007", "01.03.2024", 1500.0)).unwrap();
        let mut second = record(2, "008", "01.04.2024", 250.5);
        second.total_amount_din = Some(29_350.25);
        ledger.append(second.clone()).unwrap();

        // Reading the written CSV back yields the same records, leading
        // zeroes of certificate numbers included.
        let reloaded = Ledger::from_reader(Cursor::new(to_csv(&ledger))).unwrap();
        assert_eq!(reloaded.records(), ledger.records());
        assert_eq!(reloaded.records()[0].certificate_number, "007");
        assert_eq!(reloaded.records()[1], second);
    }

    #[test]
    fn should_reinitialize_when_a_column_is_missing() {
        // A ledger written before the Invoice column existed.
        let input = "Source File,Certificate Number,Certificate Date,Total Amount,Advance Rate,\
                     Total Rate,Total Amount Din,Certificate\n\
                     a.xlsx,1,01.01.2024,10,,,,izvedeno_1_01.01.2024.xlsx\n";

        let ledger = Ledger::from_reader(Cursor::new(input)).unwrap();
        assert!(ledger.is_empty());

        // Saving it again restores the full schema.
        assert!(to_csv(&ledger).starts_with("Source File,Certificate Number"));
        assert!(to_csv(&ledger).trim_end().ends_with("Invoice,Certificate"));
    }

    #[test]
    fn should_parse_din_totals_leniently() {
        let input = "Source File,Certificate Number,Certificate Date,Total Amount,Advance Rate,\
                     Total Rate,Total Amount Din,Invoice,Certificate,Notes\n\
                     a.xlsx,1,01.01.2024,10,,,\"1.234,56\",s_1.xlsx,i_1.xlsx,extra\n\
                     b.xlsx,2,01.02.2024,20,,,not a number,s_2.xlsx,i_2.xlsx,\n";

        let ledger = Ledger::from_reader(Cursor::new(input)).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.records()[0].total_amount_din, Some(1234.56));
        assert_eq!(ledger.records()[1].total_amount_din, None);
    }

    #[test]
    fn should_skip_repeated_rows_when_loading() {
        // A hand-edited ledger that lists the same certificate twice.
        let input = "Source File,Certificate Number,Certificate Date,Total Amount,Advance Rate,\
                     Total Rate,Total Amount Din,Invoice,Certificate\n\
                     a.xlsx,1,01.01.2024,10,,,,s_1.xlsx,i_1.xlsx\n\
                     b.xlsx,2,01.02.2024,20,,,,s_2.xlsx,i_2.xlsx\n\
                     a.xlsx,1,01.01.2024,99,,,,s_3.xlsx,i_3.xlsx\n";

        let ledger = Ledger::from_reader(Cursor::new(input)).unwrap();
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.records()[0].total_amount, 10.0);
        assert_eq!(ledger.records()[0].invoice, "s_1.xlsx");
        assert_eq!(ledger.records()[1].source_file, "b.xlsx");
    }

    #[test]
    fn should_reject_duplicate_source_files() {
        let mut ledger = Ledger::default();
        ledger.append(record(1, "1", "01.01.2024", 1.0)).unwrap();

        let err = ledger.append(record(2, "1", "01.01.2024", 2.0)).unwrap_err();
        assert_eq!(
            err.to_string(),
            LedgerError::DuplicateSource(String::from("X_Progress_certificate_1_01.01.2024.xlsx"))
                .to_string()
        );
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn should_overwrite_derived_fields() {
        let mut ledger = Ledger::default();
        let rec = record(1, "1", "01.01.2024", 1.0);
        ledger.append(rec.clone()).unwrap();

        // Upserting twice keeps only the last value.
        for din in [100.0, 117.5] {
            let fields = DerivedFields {
                total_amount_din: Some(din),
                ..DerivedFields::default()
            };
            ledger.upsert_derived_fields(&rec.source_file, fields).unwrap();
        }
        assert_eq!(ledger.records()[0].total_amount_din, Some(117.5));

        assert!(ledger
            .upsert_derived_fields("unknown.xlsx", DerivedFields::default())
            .is_err());
    }

    #[test]
    fn should_parse_certificate_dates() {
        let rec = record(1, "1", "01.03.2024", 1.0);
        assert_eq!(rec.date().unwrap(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());

        let bad = record(1, "1", "2024-03-01", 1.0);
        assert!(bad.date().is_err());
    }

    #[test]
    fn should_persist_to_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.csv");

        // A missing file loads as an empty ledger.
        let mut ledger = Ledger::load_or_default(&path).unwrap();
        assert!(ledger.is_empty());

        ledger.append(record(1, "1", "01.01.2024", 1.0)).unwrap();
        ledger.save(&path).unwrap();

        let reloaded = Ledger::load(&path).unwrap();
        assert_eq!(reloaded.records(), ledger.records());
        assert!(reloaded.contains("X_Progress_certificate_1_01.01.2024.xlsx"));
    }
}
