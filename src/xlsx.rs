//! `DocumentEditor` backed by `.xlsx` files on disk.

use crate::document::{is_spreadsheet, CellRef, CellValue, DocumentEditor, Workbook};
use crate::errors::DocumentError;
use std::fs;
use std::path::{Path, PathBuf};
use umya_spreadsheet::{Cell, Spreadsheet, Worksheet};

/// The OOXML `t` attribute of a numeric cell.
const NUMERIC_TYPE: &str = "n";

pub struct XlsxDocument {
    path: PathBuf,
    book: Spreadsheet,
}

impl XlsxDocument {
    fn sheet(&self, name: &str) -> Result<&Worksheet, DocumentError> {
        self.book
            .get_sheet_collection()
            .iter()
            .find(|sheet| sheet.get_name() == name)
            .ok_or_else(|| self.missing_sheet(name))
    }

    fn missing_sheet(&self, name: &str) -> DocumentError {
        DocumentError::MissingWorksheet {
            sheet: name.to_string(),
            path: self.path.clone(),
        }
    }
}

/// Reads a cell by its stored data type: numeric cells become numbers,
/// everything else keeps its text even when it looks numeric (`"1.10"`,
/// `"007"`).
fn classify(cell: &Cell) -> Option<CellValue> {
    let raw = cell.get_value().to_string();
    if raw.is_empty() {
        return None;
    }
    if cell.get_data_type() == NUMERIC_TYPE {
        if let Ok(number) = raw.parse::<f64>() {
            return Some(CellValue::Number(number));
        }
    }

    Some(CellValue::Text(raw))
}

impl Workbook for XlsxDocument {
    fn path(&self) -> &Path {
        &self.path
    }

    fn sheet_names(&self) -> Vec<String> {
        self.book
            .get_sheet_collection()
            .iter()
            .map(|sheet| sheet.get_name().to_string())
            .collect()
    }

    fn cells(&self, sheet: &str) -> Result<Vec<(CellRef, CellValue)>, DocumentError> {
        let mut cells: Vec<(CellRef, CellValue)> = self
            .sheet(sheet)?
            .get_cell_collection()
            .into_iter()
            .filter_map(|cell| {
                let coordinate = cell.get_coordinate();
                let at = CellRef::new(
                    coordinate.get_col_num().to_owned(),
                    coordinate.get_row_num().to_owned(),
                );
                classify(cell).map(|value| (at, value))
            })
            .collect();
        cells.sort_by_key(|(at, _)| *at);

        Ok(cells)
    }

    fn cell(&self, sheet: &str, at: CellRef) -> Result<Option<CellValue>, DocumentError> {
        let address = at.to_string();
        Ok(self
            .sheet(sheet)?
            .get_cell(address.as_str())
            .and_then(classify))
    }

    fn set_cell(&mut self, sheet: &str, at: CellRef, value: CellValue) -> Result<(), DocumentError> {
        let missing = self.missing_sheet(sheet);
        let worksheet = self.book.get_sheet_by_name_mut(sheet).ok_or(missing)?;
        let cell = worksheet.get_cell_mut(at.to_string().as_str());
        match value {
            CellValue::Text(text) => {
                cell.set_value_string(text);
            }
            CellValue::Number(number) => {
                cell.set_value_number(number);
            }
        }

        Ok(())
    }
}

/// Edits workbooks in place on the local filesystem.
#[derive(Debug, Default)]
pub struct XlsxEditor;

impl XlsxEditor {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentEditor for XlsxEditor {
    type Document = XlsxDocument;

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, DocumentError> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_spreadsheet(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        Ok(paths)
    }

    fn copy(&mut self, from: &Path, to: &Path) -> Result<(), DocumentError> {
        fs::copy(from, to)?;
        Ok(())
    }

    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), DocumentError> {
        // Same-day summaries are replaced.
        if to.exists() {
            fs::remove_file(to)?;
        }
        fs::rename(from, to)?;
        Ok(())
    }

    fn open(&mut self, path: &Path) -> Result<XlsxDocument, DocumentError> {
        let book = umya_spreadsheet::reader::xlsx::read(path).map_err(|err| DocumentError::Open {
            path: path.to_path_buf(),
            reason: format!("{:?}", err),
        })?;

        Ok(XlsxDocument {
            path: path.to_path_buf(),
            book,
        })
    }

    fn save(&mut self, document: &XlsxDocument) -> Result<(), DocumentError> {
        umya_spreadsheet::writer::xlsx::write(&document.book, &document.path).map_err(|err| {
            DocumentError::Save {
                path: document.path.clone(),
                reason: format!("{:?}", err),
            }
        })
    }
}
