//! File-backed row sources.
//!
//! The extractor boundary is a `SheetGrid`; anything that can produce one is
//! a source. Two file formats are supported: the JSON interchange format
//! (one grid or an array of grids, merged ranges included) and plain CSV
//! (one sheet, no merged regions). The file's mtime doubles as the
//! last-modified token for change-detection short-circuiting.

use std::path::PathBuf;

use gridcal_core::error::{GridCalError, GridCalResult};
use gridcal_core::grid::{CellValue, SheetGrid, SheetMeta};

/// A schedule source read from a local grid file.
pub struct FileSource {
    name: String,
    path: PathBuf,
}

impl FileSource {
    pub fn new(name: &str, path: PathBuf) -> Self {
        FileSource {
            name: name.to_string(),
            path,
        }
    }

    fn load(&self) -> GridCalResult<Vec<SheetGrid>> {
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            GridCalError::Fetch(format!("failed to read {}: {e}", self.path.display()))
        })?;

        let extension = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let mut grids = match extension.as_str() {
            "json" => parse_json(&contents)?,
            "csv" => vec![self.parse_csv(&contents)?],
            other => {
                return Err(GridCalError::Fetch(format!(
                    "unsupported grid format '{other}' for {}",
                    self.path.display()
                )));
            }
        };

        // mtime as the source token when the file itself doesn't carry one
        let token = file_token(&self.path);
        for grid in &mut grids {
            if grid.meta.last_modified.is_none() {
                grid.meta.last_modified = token.clone();
            }
        }

        Ok(grids)
    }

    fn parse_csv(&self, contents: &str) -> GridCalResult<SheetGrid> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(contents.as_bytes());

        let mut cells = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| {
                GridCalError::Fetch(format!("invalid CSV in {}: {e}", self.path.display()))
            })?;
            cells.push(
                record
                    .iter()
                    .map(|field| {
                        if field.trim().is_empty() {
                            CellValue::Empty
                        } else {
                            CellValue::Text(field.to_string())
                        }
                    })
                    .collect(),
            );
        }

        Ok(SheetGrid::new(
            SheetMeta {
                name: self.name.clone(),
                last_modified: None,
            },
            cells,
        ))
    }
}

impl gridcal_core::dispatch::RowSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self) -> GridCalResult<Vec<SheetGrid>> {
        self.load()
    }
}

/// One grid object or an array of grids.
fn parse_json(contents: &str) -> GridCalResult<Vec<SheetGrid>> {
    if let Ok(grids) = serde_json::from_str::<Vec<SheetGrid>>(contents) {
        return Ok(grids);
    }
    serde_json::from_str::<SheetGrid>(contents)
        .map(|grid| vec![grid])
        .map_err(|e| GridCalError::Fetch(format!("invalid grid JSON: {e}")))
}

fn file_token(path: &std::path::Path) -> Option<String> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    let since_epoch = modified.duration_since(std::time::UNIX_EPOCH).ok()?;
    Some(format!("mtime:{}", since_epoch.as_secs()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridcal_core::dispatch::RowSource;
    use std::io::Write;

    #[tokio::test]
    async fn test_csv_source_produces_one_sheet() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("core.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, ",,B23-AI-01 (25)").unwrap();
        writeln!(file, "MONDAY,10:00-11:30,\"Algorithms (lec)\nIvan Petrov\nRoom 301\"").unwrap();

        let source = FileSource::new("core-courses", path);
        let grids = source.fetch().await.unwrap();

        assert_eq!(grids.len(), 1);
        assert_eq!(grids[0].meta.name, "core-courses");
        assert!(grids[0].meta.last_modified.is_some());
        assert_eq!(grids[0].cells.len(), 2);
        assert_eq!(
            grids[0].cell(1, 2),
            CellValue::Text("Algorithms (lec)\nIvan Petrov\nRoom 301".to_string())
        );
    }

    #[test]
    fn test_json_accepts_single_grid_or_array() {
        let single = r#"{"meta":{"name":"core"},"cells":[["MONDAY",null]]}"#;
        assert_eq!(parse_json(single).unwrap().len(), 1);

        let array = r#"[{"meta":{"name":"a"},"cells":[]},{"meta":{"name":"b"},"cells":[]}]"#;
        assert_eq!(parse_json(array).unwrap().len(), 2);
    }
}
