//! Raw spreadsheet grid model.
//!
//! These types are the interchange format between row extractors (the things
//! that actually talk to a spreadsheet backend) and the cell interpreter.
//! A `SheetGrid` round-trips through serde losslessly, so a JSON file on disk
//! is a perfectly good extractor.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A single raw cell value as fetched from the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Empty,
}

impl CellValue {
    /// Text content of the cell, if any. Numbers are rendered as text so
    /// room numbers typed as numeric cells still decode.
    pub fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            CellValue::Number(n) => {
                if n.fract() == 0.0 {
                    Some(format!("{}", *n as i64))
                } else {
                    Some(format!("{n}"))
                }
            }
            CellValue::Empty => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_text().is_none()
    }
}

impl Default for CellValue {
    fn default() -> Self {
        CellValue::Empty
    }
}

/// Sheet metadata carried alongside the cell grid.
///
/// `last_modified` is an opaque token from the backend (an etag, an export
/// timestamp); when it matches the token recorded at the previous commit the
/// whole source can be skipped without interpreting anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SheetMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

/// An inclusive rectangular region of visually merged cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedRange {
    pub min_row: usize,
    pub min_col: usize,
    pub max_row: usize,
    pub max_col: usize,
}

impl MergedRange {
    pub fn contains(&self, row: usize, col: usize) -> bool {
        row >= self.min_row && row <= self.max_row && col >= self.min_col && col <= self.max_col
    }
}

/// A rectangular grid of raw cells plus sheet metadata and merged regions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SheetGrid {
    pub meta: SheetMeta,
    pub cells: Vec<Vec<CellValue>>,
    #[serde(default)]
    pub merged: Vec<MergedRange>,
}

impl SheetGrid {
    pub fn new(meta: SheetMeta, cells: Vec<Vec<CellValue>>) -> Self {
        SheetGrid {
            meta,
            cells,
            merged: Vec::new(),
        }
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn cols(&self) -> usize {
        self.cells.iter().map(|r| r.len()).max().unwrap_or(0)
    }

    /// Cell at (row, col), `Empty` for ragged or out-of-range positions.
    pub fn cell(&self, row: usize, col: usize) -> CellValue {
        self.cells
            .get(row)
            .and_then(|r| r.get(col))
            .cloned()
            .unwrap_or(CellValue::Empty)
    }

    /// Reference to the given cell's position, for diagnostics.
    pub fn cell_ref(&self, row: usize, col: usize) -> CellRef {
        CellRef {
            sheet: self.meta.name.clone(),
            row,
            col,
        }
    }

    /// Copy each merged region's anchor value into every spanned cell.
    ///
    /// A cell visually spanning several rows or columns then reads the same
    /// in each spanned position, so the interpreter emits one fragment per
    /// spanned occurrence.
    pub fn expand_merged(&mut self) {
        let ranges = std::mem::take(&mut self.merged);
        for range in &ranges {
            let anchor = self.cell(range.min_row, range.min_col);
            for row in range.min_row..=range.max_row {
                if self.cells.len() <= row {
                    self.cells.resize(row + 1, Vec::new());
                }
                let cells_row = &mut self.cells[row];
                if cells_row.len() <= range.max_col {
                    cells_row.resize(range.max_col + 1, CellValue::Empty);
                }
                for col in range.min_col..=range.max_col {
                    cells_row[col] = anchor.clone();
                }
            }
        }
        self.merged = ranges;
    }
}

/// Position of a cell within a named sheet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellRef {
    pub sheet: String,
    pub row: usize,
    pub col: usize,
}

impl CellRef {
    /// A1-style coordinates ("B3") for operator-facing output.
    pub fn a1(&self) -> String {
        let mut col = self.col + 1;
        let mut letters = String::new();
        while col > 0 {
            let rem = (col - 1) % 26;
            letters.insert(0, (b'A' + rem as u8) as char);
            col = (col - 1) / 26;
        }
        format!("{}{}", letters, self.row + 1)
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}!{}", self.sheet, self.a1())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    #[test]
    fn test_expand_merged_fills_spanned_cells() {
        let mut grid = SheetGrid::new(
            SheetMeta {
                name: "core".to_string(),
                last_modified: None,
            },
            vec![
                vec![text("Algorithms"), CellValue::Empty],
                vec![CellValue::Empty, CellValue::Empty],
            ],
        );
        grid.merged.push(MergedRange {
            min_row: 0,
            min_col: 0,
            max_row: 1,
            max_col: 1,
        });

        grid.expand_merged();

        for row in 0..2 {
            for col in 0..2 {
                assert_eq!(grid.cell(row, col), text("Algorithms"));
            }
        }
    }

    #[test]
    fn test_a1_notation() {
        let grid = SheetGrid::new(SheetMeta::default(), vec![]);
        assert_eq!(grid.cell_ref(0, 0).a1(), "A1");
        assert_eq!(grid.cell_ref(2, 1).a1(), "B3");
        assert_eq!(grid.cell_ref(0, 26).a1(), "AA1");
    }

    #[test]
    fn test_numeric_cell_reads_as_text() {
        assert_eq!(CellValue::Number(301.0).as_text().as_deref(), Some("301"));
        assert_eq!(CellValue::Text("  ".to_string()).as_text(), None);
    }

    #[test]
    fn test_grid_roundtrips_through_json() {
        let mut grid = SheetGrid::new(
            SheetMeta {
                name: "electives".to_string(),
                last_modified: Some("etag-42".to_string()),
            },
            vec![vec![text("MONDAY"), CellValue::Number(301.0), CellValue::Empty]],
        );
        grid.merged.push(MergedRange {
            min_row: 0,
            min_col: 0,
            max_row: 0,
            max_col: 1,
        });

        let json = serde_json::to_string(&grid).unwrap();
        let back: SheetGrid = serde_json::from_str(&json).unwrap();
        assert_eq!(back.meta, grid.meta);
        assert_eq!(back.cells, grid.cells);
        assert_eq!(back.merged, grid.merged);
    }
}
