//! Situacija (invoice) reports: cumulative billing figures stamped into a
//! copy of the invoice template.

use crate::amount::{format_amount, round};
use crate::config::AppConfig;
use crate::document::{DocumentEditor, Replacement, Workbook};
use crate::errors::{LedgerError, StageError};
use crate::ledger::{Ledger, LedgerRecord};
use tracing::{debug, info};

pub const TAG_DATE: &str = "[date]";
pub const TAG_NUMBER: &str = "[number]";
pub const TAG_CURRENT_TOTAL: &str = "[current_total]";
pub const TAG_PREVIOUS_TOTAL: &str = "[previous_total]";
pub const TAG_ALL_TOTAL: &str = "[all_total_on date]";
pub const TAG_TOTAL_DIN: &str = "[total_amount_din]";

/// A ledger record with the figures derived from all records before it.
#[derive(Clone, Debug, PartialEq)]
pub struct CumulativeRow<'a> {
    pub record: &'a LedgerRecord,
    /// Sum of `total_amount` over strictly earlier certificates.
    pub previous_total: f64,
    /// `previous_total` plus this certificate's amount.
    pub running_total: f64,
    /// Sum of the local-currency totals of strictly earlier certificates,
    /// missing values counting as zero.
    pub previous_total_din: f64,
}

#[derive(Debug, Default, PartialEq)]
pub struct InvoiceReport {
    pub created: usize,
    pub filled: usize,
}

/// Orders records by certificate date (ties keep ledger order) and derives
/// the cumulative figures for each.
pub fn cumulative_totals(records: &[LedgerRecord]) -> Result<Vec<CumulativeRow<'_>>, LedgerError> {
    let mut dated = records
        .iter()
        .map(|record| record.date().map(|date| (date, record)))
        .collect::<Result<Vec<_>, LedgerError>>()?;
    dated.sort_by_key(|(date, _)| *date);

    let mut running = 0.0;
    let mut running_din = 0.0;
    Ok(dated
        .into_iter()
        .map(|(_, record)| {
            let previous_total = running;
            let previous_total_din = running_din;
            running += record.total_amount;
            running_din += record.total_amount_din.unwrap_or(0.0);
            CumulativeRow {
                record,
                previous_total,
                running_total: running,
                previous_total_din,
            }
        })
        .collect())
}

fn numeric(value: f64) -> Replacement {
    if value.is_finite() {
        Replacement::number(format_amount(value), round(value))
    } else {
        Replacement::text("")
    }
}

/// The tag substitutions for one invoice report.
pub fn tag_values(row: &CumulativeRow<'_>) -> Vec<(&'static str, Replacement)> {
    vec![
        (TAG_DATE, Replacement::text(row.record.certificate_date.as_str())),
        (TAG_NUMBER, Replacement::text(row.record.certificate_number.as_str())),
        (TAG_CURRENT_TOTAL, numeric(row.record.total_amount)),
        (TAG_PREVIOUS_TOTAL, numeric(row.previous_total)),
        (TAG_ALL_TOTAL, numeric(row.running_total)),
        (TAG_TOTAL_DIN, numeric(row.previous_total_din)),
    ]
}

/// Creates missing invoice reports from the template and replaces their tags.
/// Tags already replaced by an earlier run are simply no longer found.
pub fn fill_invoices<E: DocumentEditor>(
    ledger: &Ledger,
    editor: &mut E,
    config: &AppConfig,
) -> Result<InvoiceReport, StageError> {
    let template = config.situacija_template();
    if !editor.exists(&template) {
        return Err(StageError::MissingFile(template));
    }

    let mut report = InvoiceReport::default();
    for row in cumulative_totals(ledger.records())? {
        let target = config.situacija_dir.join(&row.record.invoice);
        if !editor.exists(&target) {
            editor.copy(&template, &target)?;
            info!("[CREATED] {}", row.record.invoice);
            report.created += 1;
        }

        let mut document = editor.open(&target)?;
        for (tag, replacement) in tag_values(&row) {
            let changed = document.replace_tag(tag, &replacement)?;
            debug!("{}: {} -> '{}' in {} cells", row.record.invoice, tag, replacement.text, changed);
        }
        editor.save(&document)?;
        editor.close(document);
        report.filled += 1;
    }

    Ok(report)
}

pub fn run<E: DocumentEditor>(config: &AppConfig, editor: &mut E) -> Result<InvoiceReport, StageError> {
    let journal = config.journal_path();
    if !journal.exists() {
        return Err(StageError::MissingFile(journal));
    }
    std::fs::create_dir_all(&config.situacija_dir)?;

    let ledger = Ledger::load(&journal)?;
    let report = fill_invoices(&ledger, editor, config)?;
    info!("All situacija reports updated in {}", config.situacija_dir.display());

    Ok(report)
}
