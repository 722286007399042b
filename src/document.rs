use crate::amount::parse_amount;
use crate::errors::DocumentError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// A 1-based cell address.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CellRef {
    // Row first so that the derived ordering is row-major.
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    pub fn new(col: u32, row: u32) -> Self {
        Self { row, col }
    }

    /// The cell on the same row in another column.
    pub fn with_col(self, col: u32) -> Self {
        Self { row: self.row, col }
    }
}

impl FromStr for CellRef {
    type Err = DocumentError;

    /// Parses A1 notation, e.g. `D32` or `AB7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DocumentError::InvalidCellRef(s.to_string());
        let split = s.find(|c: char| c.is_ascii_digit()).ok_or_else(invalid)?;
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid());
        }

        let col = letters
            .chars()
            .fold(0u32, |acc, c| acc * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1));
        let row: u32 = digits.parse().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid());
        }

        Ok(Self::new(col, row))
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = Vec::new();
        let mut col = self.col;
        while col > 0 {
            let rem = (col - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            col = (col - 1) / 26;
        }
        let letters: String = letters.into_iter().rev().collect();
        write!(f, "{}{}", letters, self.row)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(text) => Some(text),
            CellValue::Number(_) => None,
        }
    }

    /// The numeric reading of the cell: numbers as-is, text through the
    /// dual-separator amount parser.
    pub fn amount(&self) -> Option<f64> {
        match self {
            CellValue::Text(text) => parse_amount(text),
            CellValue::Number(value) => Some(*value),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(text) => write!(f, "{}", text),
            CellValue::Number(value) => write!(f, "{}", value),
        }
    }
}

/// What a tag is substituted with. A cell holding nothing but the tag gets
/// `number` when one is given, otherwise `text` is spliced in.
#[derive(Clone, Debug, PartialEq)]
pub struct Replacement {
    pub text: String,
    pub number: Option<f64>,
}

impl Replacement {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            number: None,
        }
    }

    pub fn number(text: impl Into<String>, number: f64) -> Self {
        Self {
            text: text.into(),
            number: Some(number),
        }
    }
}

/// An open spreadsheet document.
pub trait Workbook {
    fn path(&self) -> &Path;

    fn sheet_names(&self) -> Vec<String>;

    /// All non-empty cells of a worksheet in row-major order.
    fn cells(&self, sheet: &str) -> Result<Vec<(CellRef, CellValue)>, DocumentError>;

    fn cell(&self, sheet: &str, at: CellRef) -> Result<Option<CellValue>, DocumentError>;

    fn set_cell(&mut self, sheet: &str, at: CellRef, value: CellValue) -> Result<(), DocumentError>;

    fn has_sheet(&self, sheet: &str) -> bool {
        self.sheet_names().iter().any(|name| name == sheet)
    }

    /// Replaces every case-insensitive occurrence of `tag` in every text
    /// cell of every worksheet. Returns the number of cells changed.
    fn replace_tag(&mut self, tag: &str, replacement: &Replacement) -> Result<usize, DocumentError> {
        let mut changed = 0;
        for sheet in self.sheet_names() {
            for (at, value) in self.cells(&sheet)? {
                let text = match value {
                    CellValue::Text(text) => text,
                    CellValue::Number(_) => continue,
                };
                let new_value = match (replace_ignore_case(&text, tag, &replacement.text), replacement.number) {
                    (None, _) => continue,
                    (Some(_), Some(number)) if text.trim().eq_ignore_ascii_case(tag) => {
                        CellValue::Number(number)
                    }
                    (Some(spliced), _) => CellValue::Text(spliced),
                };
                self.set_cell(&sheet, at, new_value)?;
                changed += 1;
            }
        }

        Ok(changed)
    }
}

/// A session on a family of spreadsheet documents. Opening hands out a
/// workbook; nothing reaches the disk until `save`.
pub trait DocumentEditor {
    type Document: Workbook;

    fn exists(&self, path: &Path) -> bool;

    /// Spreadsheet documents directly inside `dir`, sorted by path. Office
    /// lock files (`~$...`) are skipped.
    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, DocumentError>;

    fn copy(&mut self, from: &Path, to: &Path) -> Result<(), DocumentError>;

    fn rename(&mut self, from: &Path, to: &Path) -> Result<(), DocumentError>;

    fn open(&mut self, path: &Path) -> Result<Self::Document, DocumentError>;

    fn save(&mut self, document: &Self::Document) -> Result<(), DocumentError>;

    fn close(&mut self, document: Self::Document) {
        drop(document);
    }
}

/// Case-insensitive substring replacement. Returns `None` when `needle`
/// does not occur.
pub fn replace_ignore_case(haystack: &str, needle: &str, with: &str) -> Option<String> {
    if needle.is_empty() {
        return None;
    }
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    // Lowercasing can change byte lengths outside ASCII; fall back to an
    // exact match rather than slicing at misaligned offsets.
    if lower_haystack.len() != haystack.len() || lower_needle.len() != needle.len() {
        return haystack.contains(needle).then(|| haystack.replace(needle, with));
    }

    let mut out = String::with_capacity(haystack.len());
    let mut rest = 0;
    let mut found = false;
    for (start, _) in lower_haystack.match_indices(&lower_needle) {
        out.push_str(&haystack[rest..start]);
        out.push_str(with);
        rest = start + needle.len();
        found = true;
    }
    if !found {
        return None;
    }
    out.push_str(&haystack[rest..]);

    Some(out)
}

pub(crate) fn is_lock_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with("~$"))
        .unwrap_or(false)
}

pub(crate) fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("xlsx"))
        .unwrap_or(false)
        && !is_lock_file(path)
}


#[cfg(test)]
mod tests {
    use super::memory::MemoryWorkbook;
    use super::*;

    #[test]
    fn should_parse_and_render_a1_references() {
        let at: CellRef = "D32".parse().unwrap();
        assert_eq!(at, CellRef::new(4, 32));
        assert_eq!(at.to_string(), "D32");

        let wide: CellRef = "ab7".parse().unwrap();
        assert_eq!(wide, CellRef::new(28, 7));
        assert_eq!(wide.to_string(), "AB7");
    }

    #[test]
    fn should_reject_malformed_references() {
        for raw in ["", "32", "D", "D0", "4D", "D-1"] {
            assert!(raw.parse::<CellRef>().is_err(), "{} should be rejected", raw);
        }
    }

    #[test]
    fn should_order_references_row_major() {
        let mut refs: Vec<CellRef> = ["B2", "A3", "C1", "A2"]
            .iter()
            .map(|raw| raw.parse().unwrap())
            .collect();
        refs.sort();

        let rendered: Vec<String> = refs.iter().map(|at| at.to_string()).collect();
        assert_eq!(rendered, ["C1", "A2", "B2", "A3"]);
    }

    #[test]
    fn should_replace_ignoring_case() {
        assert_eq!(
            replace_ignore_case("Total: [Current_Total] EUR", "[current_total]", "1,5"),
            Some(String::from("Total: 1,5 EUR"))
        );
        assert_eq!(replace_ignore_case("no tags here", "[date]", "x"), None);
        assert_eq!(
            replace_ignore_case("[date] / [DATE]", "[date]", "01.03.2024"),
            Some(String::from("01.03.2024 / 01.03.2024"))
        );
    }

    #[test]
    fn should_replace_tags_across_all_sheets() {
        // Create a workbook where the same tag appears on two sheets, once as
        // the whole cell and once embedded in a sentence.
        let mut workbook = MemoryWorkbook::new()
            .with_sheet("First")
            .text("A1", "[current_total]")
            .text("A2", "untouched")
            .with_sheet("Second")
            .text("B4", "Iznos: [CURRENT_TOTAL] EUR");

        let replacement = Replacement::number("1500", 1500.0);
        let changed = workbook.replace_tag("[current_total]", &replacement).unwrap();

        // The sole-tag cell becomes numeric; the embedded one gets the text.
        assert_eq!(changed, 2);
        assert_eq!(workbook.get("First", "A1"), Some(CellValue::Number(1500.0)));
        assert_eq!(
            workbook.get("First", "A2"),
            Some(CellValue::Text(String::from("untouched")))
        );
        assert_eq!(
            workbook.get("Second", "B4"),
            Some(CellValue::Text(String::from("Iznos: 1500 EUR")))
        );
    }

    #[test]
    fn should_splice_text_replacements_even_for_sole_tags() {
        let mut workbook = MemoryWorkbook::new().with_sheet("S").text("A1", "[date]");

        workbook
            .replace_tag("[date]", &Replacement::text("01.03.2024"))
            .unwrap();
        assert_eq!(
            workbook.get("S", "A1"),
            Some(CellValue::Text(String::from("01.03.2024")))
        );
    }

    #[test]
    fn should_recognize_spreadsheets_and_lock_files() {
        assert!(is_spreadsheet(Path::new("Input/a.xlsx")));
        assert!(is_spreadsheet(Path::new("Input/a.XLSX")));
        assert!(!is_spreadsheet(Path::new("Input/~$a.xlsx")));
        assert!(!is_spreadsheet(Path::new("Input/a.csv")));
    }
}
