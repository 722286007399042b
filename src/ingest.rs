//! Inbox scan: turns newly arrived progress certificates into ledger records.

use crate::config::AppConfig;
use crate::document::{CellRef, CellValue, DocumentEditor, Workbook};
use crate::errors::{IngestError, StageError};
use crate::ledger::{Ledger, LedgerRecord, DATE_FORMAT};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Separates the free-form prefix from `<number>_<date>` in inbox filenames.
pub const CERTIFICATE_MARKER: &str = "_Progress_certificate_";
pub const CERTIFICATE_SHEET: &str = "Completion certificate";
pub const LABEL_COLUMN: &str = "Name";
pub const AMOUNT_COLUMN: &str = "Amount in certificate with VAT";
/// Row labels whose amounts make up the certificate total.
pub const ACCEPTED_LABELS: [&str; 2] = ["Radovi", "RADOVI PO PONUDI"];

const INVOICE_PREFIX: &str = "situacija";
const EXECUTION_PREFIX: &str = "izvedeno";

#[derive(Debug, PartialEq)]
pub struct CertificateName {
    pub number: String,
    pub date: String,
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub found: usize,
    pub appended: Vec<String>,
    pub failed: Vec<(String, IngestError)>,
}

/// Splits `<prefix>_Progress_certificate_<number>_<DD.MM.YYYY>.<ext>`.
pub fn parse_filename(name: &str) -> Result<CertificateName, IngestError> {
    let malformed = || IngestError::MalformedFilename(name.to_string());
    let stem = Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(malformed)?;

    let (_, rest) = stem.split_once(CERTIFICATE_MARKER).ok_or_else(malformed)?;
    let (number, date) = rest.split_once('_').ok_or_else(malformed)?;
    if number.is_empty() || NaiveDate::parse_from_str(date, DATE_FORMAT).is_err() {
        return Err(malformed());
    }

    Ok(CertificateName {
        number: number.to_string(),
        date: date.to_string(),
    })
}

fn normalize_label(label: &str) -> String {
    label.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Sums the amount column over the rows labelled with one of
/// [`ACCEPTED_LABELS`] on the certificate worksheet.
pub fn extract_total<W: Workbook>(document: &W, file: &str) -> Result<f64, IngestError> {
    let cells: HashMap<CellRef, CellValue> = document.cells(CERTIFICATE_SHEET)?.into_iter().collect();
    let mut ordered: Vec<CellRef> = cells.keys().copied().collect();
    ordered.sort();

    // The header row is the first one naming both the label and the amount
    // column.
    let column_of = |row: u32, title: &str| {
        ordered
            .iter()
            .filter(|at| at.row == row)
            .find(|at| cells[*at].as_text().map(str::trim) == Some(title))
            .map(|at| at.col)
    };
    let header = ordered.iter().map(|at| at.row).find_map(|row| {
        Some((row, column_of(row, LABEL_COLUMN)?, column_of(row, AMOUNT_COLUMN)?))
    });
    let (header_row, label_col, amount_col) = header.ok_or_else(|| IngestError::MissingColumn {
        column: format!("{} / {}", LABEL_COLUMN, AMOUNT_COLUMN),
        file: file.to_string(),
    })?;

    let accepted: Vec<String> = ACCEPTED_LABELS.iter().map(|label| normalize_label(label)).collect();
    let mut total = 0.0;
    let mut matched = 0;
    for at in ordered.iter().filter(|at| at.row > header_row && at.col == label_col) {
        let label = match &cells[at] {
            CellValue::Text(text) => normalize_label(text),
            CellValue::Number(_) => continue,
        };
        if !accepted.contains(&label) {
            continue;
        }
        matched += 1;

        match cells.get(&at.with_col(amount_col)) {
            Some(value) => match value.amount() {
                Some(amount) => total += amount,
                None => warn!("{}: unreadable amount '{}' in row {}, counted as 0", file, value, at.row),
            },
            None => warn!("{}: empty amount in row {}, counted as 0", file, at.row),
        }
    }

    if matched == 0 {
        return Err(IngestError::NoMatchingRows(file.to_string()));
    }

    Ok(total)
}

fn document_index(name: &str) -> Option<u32> {
    let stem = Path::new(name).file_stem()?.to_str()?;
    let mut parts = stem.split('_');
    if parts.next()? != INVOICE_PREFIX {
        return None;
    }
    let index = parts.next()?;
    if index.is_empty() || !index.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    index.parse().ok()
}

/// One past the highest index among the situacija documents on disk and the
/// invoice names already handed out in the ledger.
pub fn next_index<E: DocumentEditor>(
    editor: &E,
    situacija_dir: &Path,
    ledger: &Ledger,
) -> Result<u32, StageError> {
    let on_disk = editor.list(situacija_dir)?;
    let max = on_disk
        .iter()
        .filter_map(|path| path.file_name()?.to_str())
        .chain(ledger.records().iter().map(|record| record.invoice.as_str()))
        .filter_map(document_index)
        .max();

    Ok(max.map_or(1, |max| max + 1))
}

fn read_certificate<E: DocumentEditor>(
    editor: &mut E,
    path: &Path,
    name: &str,
) -> Result<(CertificateName, f64), IngestError> {
    let certificate = parse_filename(name)?;
    let document = editor.open(path)?;
    let total = extract_total(&document, name);
    editor.close(document);

    Ok((certificate, total?))
}

/// Appends one record per inbox file that the ledger has not seen yet.
/// Files that cannot be read are reported and left for the next run.
pub fn ingest_inbox<E: DocumentEditor>(
    ledger: &mut Ledger,
    editor: &mut E,
    config: &AppConfig,
) -> Result<IngestReport, StageError> {
    let mut report = IngestReport::default();
    let inbox = editor.list(&config.input_dir)?;
    report.found = inbox.len();

    let new_files: Vec<(&Path, String)> = inbox
        .iter()
        .filter_map(|path| Some((path.as_path(), path.file_name()?.to_str()?.to_string())))
        .filter(|(_, name)| !ledger.contains(name))
        .collect();
    info!("Already processed: {} files in journal", ledger.len());
    info!("Found {} files, {} new", report.found, new_files.len());

    let mut next = next_index(editor, &config.situacija_dir, ledger)?;
    for (path, name) in new_files {
        match read_certificate(editor, path, &name) {
            Ok((certificate, total)) => {
                let record = LedgerRecord {
                    source_file: name.clone(),
                    certificate_number: certificate.number,
                    invoice: format!("{}_{}_{}.xlsx", INVOICE_PREFIX, next, certificate.date),
                    certificate: format!("{}_{}_{}.xlsx", EXECUTION_PREFIX, next, certificate.date),
                    certificate_date: certificate.date,
                    total_amount: total,
                    advance_rate: None,
                    total_rate: None,
                    total_amount_din: None,
                };
                ledger.append(record)?;
                next += 1;
                info!("Processed {}: total {}", name, total);
                report.appended.push(name);
            }
            Err(err) => {
                warn!("Skipping {}: {}", name, err);
                report.failed.push((name, err));
            }
        }
    }

    Ok(report)
}

pub fn run<E: DocumentEditor>(config: &AppConfig, editor: &mut E) -> Result<IngestReport, StageError> {
    for dir in [
        &config.input_dir,
        &config.situacija_dir,
        &config.izvedeno_dir,
        &config.templates_dir,
    ] {
        fs::create_dir_all(dir)?;
    }
    info!("Working root:      {}", config.root.display());
    info!("Input folder:      {}", config.input_dir.display());
    info!("Situacija output:  {}", config.situacija_dir.display());
    info!("Izvedeno output:   {}", config.izvedeno_dir.display());
    info!("Templates folder:  {}", config.templates_dir.display());

    let journal = config.journal_path();
    let mut ledger = Ledger::load_or_default(&journal)?;
    let report = ingest_inbox(&mut ledger, editor, config)?;
    ledger.save(&journal)?;
    info!("Journal saved to {}", journal.display());

    Ok(report)
}
