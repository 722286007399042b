//! Cumulative summary (kumulativni izveštaj) over all execution reports.

use crate::config::AppConfig;
use crate::document::{CellRef, CellValue, DocumentEditor, Workbook};
use crate::errors::StageError;
use crate::execution::REKAP_SHEET;
use crate::ledger::DATE_FORMAT;
use chrono::{Local, NaiveDate};
use std::ffi::OsStr;
use std::path::PathBuf;
use tracing::{info, warn};

pub const SUMMARY_PREFIX: &str = "kumulativni izveštaj";

const REKAP_CELLS: &[&str] = &[
    "F5", "F6", "F7", "F8", "F9", "F11", "F12", "F13", "D17", "F17", "F18", "F20",
];

const AB_RADOVI_CELLS: &[&str] = &[
    "D13", "D14", "D15", "D22", "D30", "D31", "D32", "D40", "D41", "D42", "D43", "D50", "D58",
    "D66", "D67", "D68", "D76", "D83", "D90", "D98", "D106", "D107", "D108", "D116", "D117",
    "D118", "D125", "D132", "D139", "D147", "D148", "D154", "D161", "D169", "D170",
];

const ARMIRACKI_CELLS: &[&str] = &["D13", "D20", "D27"];

/// The cells summed across execution reports, per worksheet.
pub const SUMMED_CELLS: [(&str, &[&str]); 3] = [
    (REKAP_SHEET, REKAP_CELLS),
    ("K_03_AB radovi", AB_RADOVI_CELLS),
    ("K_04_Armiracki", ARMIRACKI_CELLS),
];

/// Per-sheet running sums, in the order of [`SUMMED_CELLS`].
#[derive(Debug, PartialEq)]
pub struct Totals(pub Vec<(&'static str, Vec<(CellRef, f64)>)>);

impl Totals {
    pub fn zeroed() -> Result<Self, StageError> {
        let mut sheets = Vec::with_capacity(SUMMED_CELLS.len());
        for (sheet, cells) in SUMMED_CELLS {
            let cells = cells
                .iter()
                .map(|raw| raw.parse::<CellRef>().map(|at| (at, 0.0)))
                .collect::<Result<Vec<_>, _>>()?;
            sheets.push((sheet, cells));
        }

        Ok(Totals(sheets))
    }

    pub fn get(&self, sheet: &str, at: &str) -> Option<f64> {
        let at: CellRef = at.parse().ok()?;
        self.0
            .iter()
            .find(|(name, _)| *name == sheet)?
            .1
            .iter()
            .find(|(cell, _)| *cell == at)
            .map(|(_, total)| *total)
    }

    /// Adds the numeric reading of each summed cell of `document`. Empty or
    /// unreadable cells count as 0.
    pub fn add<W: Workbook>(&mut self, document: &W) -> Result<(), StageError> {
        for (sheet, cells) in self.0.iter_mut() {
            if !document.has_sheet(sheet) {
                warn!("No sheet {} in {}", sheet, document.path().display());
                continue;
            }
            for (at, total) in cells.iter_mut() {
                *total += document
                    .cell(sheet, *at)?
                    .and_then(|value| value.amount())
                    .unwrap_or(0.0);
            }
        }

        Ok(())
    }
}

pub fn summary_name(date: NaiveDate) -> String {
    format!("{}_{}.xlsx", SUMMARY_PREFIX, date.format(DATE_FORMAT))
}

#[derive(Debug, PartialEq)]
pub struct SummaryReport {
    pub path: PathBuf,
    pub scanned: usize,
}

/// Sums the fixed cells over every execution report in the izvedeno folder
/// into a new summary dated `today`, then moves it into the summary folder.
/// A summary from the same day is replaced.
pub fn create_summary<E: DocumentEditor>(
    editor: &mut E,
    config: &AppConfig,
    today: NaiveDate,
) -> Result<SummaryReport, StageError> {
    let template = config.izvedeno_template();
    if !editor.exists(&template) {
        return Err(StageError::MissingFile(template));
    }

    let name = summary_name(today);
    let staged = config.izvedeno_dir.join(&name);
    editor.copy(&template, &staged)?;

    let reports: Vec<PathBuf> = editor
        .list(&config.izvedeno_dir)?
        .into_iter()
        .filter(|path| path.file_name() != Some(OsStr::new(&name)))
        .collect();

    let mut totals = Totals::zeroed()?;
    for path in &reports {
        let document = editor.open(path)?;
        totals.add(&document)?;
        editor.close(document);
    }

    let mut summary = editor.open(&staged)?;
    for (sheet, cells) in &totals.0 {
        if !summary.has_sheet(sheet) {
            warn!("No sheet {} in summary template", sheet);
            continue;
        }
        for (at, total) in cells {
            summary.set_cell(sheet, *at, CellValue::Number(*total))?;
        }
    }
    editor.save(&summary)?;
    editor.close(summary);

    let path = config.summary_dir.join(&name);
    editor.rename(&staged, &path)?;
    info!("Cumulative report created: {}", path.display());

    Ok(SummaryReport {
        path,
        scanned: reports.len(),
    })
}

pub fn run<E: DocumentEditor>(config: &AppConfig, editor: &mut E) -> Result<SummaryReport, StageError> {
    std::fs::create_dir_all(&config.summary_dir)?;
    create_summary(editor, config, Local::now().date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::memory::{MemoryEditor, MemoryWorkbook};

    fn template() -> MemoryWorkbook {
        MemoryWorkbook::new()
            .with_sheet(REKAP_SHEET)
            .with_sheet("K_03_AB radovi")
            .with_sheet("K_04_Armiracki")
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 20).unwrap()
    }

    #[test]
    fn should_name_summaries_by_date() {
        assert_eq!(summary_name(today()), "kumulativni izveštaj_20.05.2024.xlsx");
    }

    #[test]
    fn should_start_from_zero_for_every_cell() {
        let totals = Totals::zeroed().unwrap();
        assert_eq!(totals.0.len(), 3);
        assert_eq!(totals.0[0].1.len(), 12);
        assert_eq!(totals.0[1].1.len(), 35);
        assert_eq!(totals.0[2].1.len(), 3);
        assert_eq!(totals.get(REKAP_SHEET, "F5"), Some(0.0));
        assert_eq!(totals.get(REKAP_SHEET, "A1"), None);
    }

    #[test]
    fn should_sum_cells_across_execution_reports() {
        // Two execution reports with comma and plain figures, plus one lacking
        // the reinforcement sheet.
        let config = AppConfig::with_root("/project");
        let mut editor = MemoryEditor::new();
        editor.insert(config.izvedeno_template(), template());
        editor.insert(
            config.izvedeno_dir.join("izvedeno_1_01.02.2024.xlsx"),
            MemoryWorkbook::new()
                .with_sheet(REKAP_SHEET)
                .text("F5", "10,5")
                .text("F6", "n/a")
                .with_sheet("K_03_AB radovi")
                .with_sheet("K_04_Armiracki"),
        );
        editor.insert(
            config.izvedeno_dir.join("izvedeno_2_01.03.2024.xlsx"),
            MemoryWorkbook::new()
                .with_sheet(REKAP_SHEET)
                .text("F5", "5")
                .with_sheet("K_03_AB radovi")
                .number("D170", 2.25),
        );
        // An earlier summary lives in the summary folder and is not scanned.
        editor.insert(
            config.summary_dir.join("kumulativni izveštaj_19.05.2024.xlsx"),
            MemoryWorkbook::new().with_sheet(REKAP_SHEET).number("F5", 1000.0),
        );

        let report = create_summary(&mut editor, &config, today()).unwrap();

        let expected_path = config.summary_dir.join("kumulativni izveštaj_20.05.2024.xlsx");
        assert_eq!(report, SummaryReport { path: expected_path.clone(), scanned: 2 });
        assert!(!editor.exists(&config.izvedeno_dir.join("kumulativni izveštaj_20.05.2024.xlsx")));

        let summary = editor.get(&expected_path);
        assert_eq!(summary.get(REKAP_SHEET, "F5"), Some(CellValue::Number(15.5)));
        assert_eq!(summary.get(REKAP_SHEET, "F6"), Some(CellValue::Number(0.0)));
        assert_eq!(summary.get("K_03_AB radovi", "D170"), Some(CellValue::Number(2.25)));
        assert_eq!(summary.get("K_04_Armiracki", "D27"), Some(CellValue::Number(0.0)));
    }

    #[test]
    fn should_replace_a_summary_from_the_same_day() {
        let config = AppConfig::with_root("/project");
        let mut editor = MemoryEditor::new();
        editor.insert(config.izvedeno_template(), template());
        editor.insert(
            config.izvedeno_dir.join("izvedeno_1_01.02.2024.xlsx"),
            MemoryWorkbook::new().with_sheet(REKAP_SHEET).number("F5", 3.0),
        );

        create_summary(&mut editor, &config, today()).unwrap();
        let report = create_summary(&mut editor, &config, today()).unwrap();

        assert_eq!(report.scanned, 1);
        assert_eq!(editor.get(&report.path).get(REKAP_SHEET, "F5"), Some(CellValue::Number(3.0)));
    }
}
