//! Izvedeno (execution) reports: quantities looked up in the source
//! certificate by row label.

use crate::amount::comma_decimal;
use crate::config::AppConfig;
use crate::document::{CellRef, CellValue, DocumentEditor, Workbook};
use crate::errors::{DocumentError, StageError};
use crate::ledger::Ledger;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DATA_TAG: &str = "[data]";
pub const EXTRA_HOURS_TAG: &str = "[extra_hours]";
/// Worksheets whose `[data]` placeholders are resolved by label.
pub const DATA_SHEETS: [&str; 2] = ["K_03_AB radovi", "K_04_Armiracki"];
pub const REKAP_SHEET: &str = "K_00_REKAP";
/// Source row label of the extra-hours figure, matched exactly.
pub const EXTRA_HOURS_LABEL: &str = "Izvođenje radova po zahtevu Naručioca";

/// Column holding the label next to a placeholder (B).
const LABEL_COL: u32 = 2;
/// Column holding the figure on a matched source row (E).
const VALUE_COL: u32 = 5;

struct IndexEntry {
    text: String,
    value: CellValue,
}

/// Every labelled row of a source certificate that carries a figure, in
/// sheet order then row-major order. Built once per certificate.
#[derive(Default)]
pub struct SourceIndex {
    entries: Vec<IndexEntry>,
    exact: HashMap<String, usize>,
}

impl SourceIndex {
    pub fn build<W: Workbook>(document: &W) -> Result<Self, DocumentError> {
        let mut index = SourceIndex::default();
        for sheet in document.sheet_names() {
            let cells = document.cells(&sheet)?;
            let by_ref: HashMap<CellRef, &CellValue> = cells.iter().map(|(at, value)| (*at, value)).collect();

            for (at, value) in &cells {
                // Rows without a figure never satisfy a lookup; the search
                // moves on to the next matching row.
                let figure = match by_ref.get(&at.with_col(VALUE_COL)) {
                    Some(figure) => (*figure).clone(),
                    None => continue,
                };
                if let CellValue::Text(text) = value {
                    index.exact.entry(text.clone()).or_insert(index.entries.len());
                }
                index.entries.push(IndexEntry {
                    text: value.to_string(),
                    value: figure,
                });
            }
        }

        Ok(index)
    }

    /// The figure of the first row with a cell containing `label`.
    pub fn find_containing(&self, label: &str) -> Option<&CellValue> {
        if label.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find(|entry| entry.text.contains(label))
            .map(|entry| &entry.value)
    }

    /// The figure of the first row with a text cell equal to `label`.
    pub fn find_exact(&self, label: &str) -> Option<&CellValue> {
        self.exact.get(label).map(|&i| &self.entries[i].value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Resolved(String),
    /// No source row matched the label.
    Unresolved,
    /// The matched figure already filled an earlier placeholder.
    AlreadyUsed,
}

impl Resolution {
    pub fn replacement(&self) -> &str {
        match self {
            Resolution::Resolved(text) => text,
            Resolution::Unresolved | Resolution::AlreadyUsed => "0",
        }
    }
}

/// Figures already placed in the current document. A source figure may
/// satisfy only one placeholder; figures are compared by their raw text.
#[derive(Debug, Default)]
pub struct ConsumedValues(HashSet<String>);

impl ConsumedValues {
    /// Text and numeric figures alike are rendered with a decimal comma.
    pub fn resolve(&mut self, candidate: Option<&CellValue>) -> Resolution {
        let candidate = match candidate {
            Some(candidate) => candidate,
            None => return Resolution::Unresolved,
        };
        if !self.0.insert(candidate.to_string()) {
            return Resolution::AlreadyUsed;
        }

        Resolution::Resolved(match candidate {
            CellValue::Number(value) => comma_decimal(*value),
            CellValue::Text(text) => text.replace('.', ","),
        })
    }
}

#[derive(Debug, Default, PartialEq)]
pub struct FillOutcome {
    pub resolved: usize,
    pub unresolved: usize,
}

impl FillOutcome {
    fn count(&mut self, resolution: &Resolution) {
        match resolution {
            Resolution::Resolved(_) => self.resolved += 1,
            _ => self.unresolved += 1,
        }
    }
}

/// Resolves the `[data]` placeholders of the data sheets and the single
/// `[extra_hours]` placeholder of the recap sheet against `source`.
pub fn fill_execution_report<W: Workbook>(
    document: &mut W,
    source: &SourceIndex,
) -> Result<FillOutcome, DocumentError> {
    let mut outcome = FillOutcome::default();
    // Shared by both lookups: an extra-hours figure equal to one already
    // placed on a data sheet resolves to 0.
    let mut consumed = ConsumedValues::default();

    for sheet in DATA_SHEETS {
        if !document.has_sheet(sheet) {
            warn!("Sheet '{}' not found in {}", sheet, document.path().display());
            continue;
        }
        info!("Processing sheet '{}'", sheet);

        let placeholders: Vec<(CellRef, String)> = document
            .cells(sheet)?
            .into_iter()
            .filter_map(|(at, value)| match value {
                CellValue::Text(text) if text.contains(DATA_TAG) => Some((at, text)),
                _ => None,
            })
            .collect();

        for (at, original) in placeholders {
            let key = document
                .cell(sheet, at.with_col(LABEL_COL))?
                .map(|label| label.to_string())
                .unwrap_or_default();
            let resolution = consumed.resolve(source.find_containing(&key));
            let replacement = resolution.replacement();

            let new_text = if original.trim() == DATA_TAG {
                replacement.to_string()
            } else {
                original.replace(DATA_TAG, replacement)
            };
            document.set_cell(sheet, at, CellValue::Text(new_text))?;
            debug!("    Row {}: key='{}' -> '{}' ({:?})", at.row, key, replacement, resolution);
            outcome.count(&resolution);
        }
    }

    if !document.has_sheet(REKAP_SHEET) {
        warn!("Sheet '{}' not found in {}", REKAP_SHEET, document.path().display());
        return Ok(outcome);
    }
    let target = document
        .cells(REKAP_SHEET)?
        .into_iter()
        .find(|(_, value)| value.as_text() == Some(EXTRA_HOURS_TAG))
        .map(|(at, _)| at);
    match target {
        Some(at) => {
            let resolution = consumed.resolve(source.find_exact(EXTRA_HOURS_LABEL));
            document.set_cell(REKAP_SHEET, at, CellValue::Text(resolution.replacement().to_string()))?;
            debug!("    {} -> '{}' ({:?})", EXTRA_HOURS_TAG, resolution.replacement(), resolution);
            outcome.count(&resolution);
        }
        None => warn!("Tag '{}' not found in {}", EXTRA_HOURS_TAG, document.path().display()),
    }

    Ok(outcome)
}

#[derive(Debug, Default, PartialEq)]
pub struct ExecutionReport {
    pub created: usize,
    pub filled: usize,
    pub missing_sources: Vec<String>,
    pub resolved: usize,
    pub unresolved: usize,
}

/// The stored document name, with `.xlsx` appended only when it carries no
/// spreadsheet extension in any case.
fn spreadsheet_name(name: &str) -> String {
    let name = name.trim();
    let has_extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("xlsx"));
    if has_extension {
        name.to_string()
    } else {
        format!("{}.xlsx", name)
    }
}

/// Pairs each execution document with the certificate it was derived from.
pub fn document_sources(ledger: &Ledger, config: &AppConfig) -> Vec<(PathBuf, PathBuf)> {
    ledger
        .records()
        .iter()
        .filter(|record| !record.certificate.trim().is_empty())
        .map(|record| {
            (
                config.izvedeno_dir.join(spreadsheet_name(&record.certificate)),
                config.input_dir.join(spreadsheet_name(&record.source_file)),
            )
        })
        .collect()
}

pub fn generate_execution_reports<E: DocumentEditor>(
    ledger: &Ledger,
    editor: &mut E,
    config: &AppConfig,
) -> Result<ExecutionReport, StageError> {
    let template = config.izvedeno_template();
    if !editor.exists(&template) {
        return Err(StageError::MissingFile(template));
    }

    let mut report = ExecutionReport::default();
    for (target, source) in document_sources(ledger, config) {
        let name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        if editor.exists(&target) {
            info!("[EXISTS]  {}", name);
        } else {
            editor.copy(&template, &target)?;
            info!("[CREATED] {}", name);
            report.created += 1;
        }

        let index = if editor.exists(&source) {
            let document = editor.open(&source)?;
            let index = SourceIndex::build(&document)?;
            editor.close(document);
            debug!("Indexed {} labelled rows of {}", index.len(), source.display());
            index
        } else {
            warn!("Source not found: {}", source.display());
            report.missing_sources.push(source.display().to_string());
            SourceIndex::default()
        };

        let mut document = editor.open(&target)?;
        let outcome = fill_execution_report(&mut document, &index)?;
        editor.save(&document)?;
        editor.close(document);
        info!("[SAVED]   {}", name);

        report.filled += 1;
        report.resolved += outcome.resolved;
        report.unresolved += outcome.unresolved;
    }

    Ok(report)
}

pub fn run<E: DocumentEditor>(config: &AppConfig, editor: &mut E) -> Result<ExecutionReport, StageError> {
    let journal = config.journal_path();
    for required in [&journal, &config.input_dir] {
        if !required.exists() {
            return Err(StageError::MissingFile(required.to_path_buf()));
        }
    }
    std::fs::create_dir_all(&config.izvedeno_dir)?;

    let ledger = Ledger::load(&journal)?;
    let report = generate_execution_reports(&ledger, editor, config)?;
    if report.unresolved > 0 {
        warn!("{} placeholders resolved to 0", report.unresolved);
    }

    Ok(report)
}
