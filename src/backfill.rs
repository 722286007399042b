//! Copies each invoice report's grand total back into the ledger.

use crate::config::AppConfig;
use crate::document::{CellRef, DocumentEditor, Workbook};
use crate::errors::StageError;
use crate::ledger::{DerivedFields, Ledger};
use tracing::{debug, info, warn};

/// Grand total in local currency on the first worksheet of a situacija report.
pub const DIN_TOTAL_CELL: CellRef = CellRef { row: 32, col: 4 };

#[derive(Debug, Default, PartialEq)]
pub struct BackfillReport {
    pub updated: usize,
    pub missing: Vec<String>,
}

/// Re-reads the local-currency total of every record whose invoice report
/// exists. The freshly read value always replaces the stored one.
pub fn backfill_totals<E: DocumentEditor>(
    ledger: &mut Ledger,
    editor: &mut E,
    config: &AppConfig,
) -> Result<BackfillReport, StageError> {
    let mut report = BackfillReport::default();
    let targets: Vec<(String, String, DerivedFields)> = ledger
        .records()
        .iter()
        .map(|record| {
            let fields = DerivedFields {
                advance_rate: record.advance_rate,
                total_rate: record.total_rate,
                total_amount_din: record.total_amount_din,
            };
            (record.source_file.clone(), record.invoice.clone(), fields)
        })
        .collect();

    for (source_file, invoice, mut fields) in targets {
        let path = config.situacija_dir.join(&invoice);
        if !editor.exists(&path) {
            warn!("Report not found: {}", path.display());
            report.missing.push(invoice);
            continue;
        }

        let document = editor.open(&path)?;
        let first_sheet = document.sheet_names().into_iter().next();
        let value = match first_sheet {
            Some(sheet) => document.cell(&sheet, DIN_TOTAL_CELL)?,
            None => None,
        };
        editor.close(document);

        fields.total_amount_din = value.as_ref().and_then(|value| value.amount());
        debug!("{}: {} = {:?}", invoice, DIN_TOTAL_CELL, fields.total_amount_din);
        ledger.upsert_derived_fields(&source_file, fields)?;
        report.updated += 1;
    }

    Ok(report)
}

pub fn run<E: DocumentEditor>(config: &AppConfig, editor: &mut E) -> Result<BackfillReport, StageError> {
    let journal = config.journal_path();
    if !journal.exists() {
        return Err(StageError::MissingFile(journal));
    }

    let mut ledger = Ledger::load(&journal)?;
    let report = backfill_totals(&mut ledger, editor, config)?;
    ledger.save(&journal)?;
    info!("Journal updated: {}", journal.display());

    Ok(report)
}
