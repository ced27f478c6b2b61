use crate::models::ResolutionRecord;
use crate::taxonomy::LEVEL_SEPARATOR;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const MAPPED_COLUMN: &str = "Mapped Category";
pub const CHECK_COLUMN: &str = "Check";

#[derive(Debug, Error)]
pub enum TableError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Header plus rows, kept as plain strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// First column of every row, in order; missing cells read as empty.
    pub fn labels(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| row.first().cloned().unwrap_or_default())
            .collect()
    }

    /// Input table with `Mapped Category` and `Check` appended. Rows without a
    /// result yet are left blank.
    pub fn with_results(&self, results: &[Option<ResolutionRecord>]) -> Table {
        let mut headers = self.headers.clone();
        headers.push(MAPPED_COLUMN.to_string());
        headers.push(CHECK_COLUMN.to_string());

        let rows = self
            .rows
            .iter()
            .enumerate()
            .map(|(position, row)| {
                let mut row = row.clone();
                match results.get(position).and_then(Option::as_ref) {
                    Some(record) => {
                        row.push(record.mapped_category.clone());
                        row.push(record.review_flag.as_str().to_string());
                    }
                    None => {
                        row.push(String::new());
                        row.push(String::new());
                    }
                }
                row
            })
            .collect();

        Table { headers, rows }
    }
}

pub fn read_table(path: &Path) -> Result<Table, TableError> {
    let read_err = |source| TableError::Read {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(read_err)?;

    let headers = reader
        .headers()
        .map_err(read_err)?
        .iter()
        .map(str::to_string)
        .collect();
    let rows = reader
        .records()
        .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
        .collect::<Result<Vec<Vec<String>>, _>>()
        .map_err(read_err)?;

    Ok(Table { headers, rows })
}

/// One category per row: the non-empty level cells joined with `" > "`.
/// Blank rows are dropped.
pub fn read_taxonomy(path: &Path) -> Result<Vec<String>, TableError> {
    let table = read_table(path)?;
    Ok(table
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| cell.trim())
                .filter(|cell| !cell.is_empty())
                .collect::<Vec<_>>()
                .join(LEVEL_SEPARATOR)
        })
        .filter(|category| !category.is_empty())
        .collect())
}

/// Destination for checkpoint snapshots and the final result table.
pub trait TableSink {
    fn describe(&self) -> String;

    fn write_table(&mut self, table: &Table) -> Result<(), TableError>;
}

/// Rewrites a CSV file in full on every write.
pub struct CsvSink {
    path: PathBuf,
}

impl CsvSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn write_csv(path: &Path, table: &Table) -> Result<(), TableError> {
    let write_err = |source| TableError::Write {
        path: path.to_path_buf(),
        source,
    };
    let io_err = |source| TableError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(write_err)?;
    writer.write_record(&table.headers).map_err(write_err)?;
    for row in &table.rows {
        writer.write_record(row).map_err(write_err)?;
    }
    let file = writer
        .into_inner()
        .map_err(|err| io_err(std::io::Error::other(err.to_string())))?;
    file.sync_all().map_err(io_err)
}

impl TableSink for CsvSink {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    /// Writes a sibling temp file and renames it over the target, so readers
    /// and crashes only ever see a complete table.
    fn write_table(&mut self, table: &Table) -> Result<(), TableError> {
        let tmp_path = self.tmp_path();
        let result = write_csv(&tmp_path, table).and_then(|()| {
            fs::rename(&tmp_path, &self.path).map_err(|source| TableError::Io {
                path: self.path.clone(),
                source,
            })
        });
        if result.is_err() && tmp_path.is_file() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReviewFlag;

    #[test]
    fn taxonomy_rows_join_non_empty_levels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.csv");
        fs::write(
            &path,
            "L1,L2,L3\nElectronics,Phones,Cases\nHome,Kitchen,\n,,\nGarden, ,Tools\n",
        )
        .unwrap();

        let categories = read_taxonomy(&path).unwrap();
        assert_eq!(
            categories,
            vec![
                "Electronics > Phones > Cases",
                "Home > Kitchen",
                "Garden > Tools",
            ]
        );
    }

    #[test]
    fn input_labels_come_from_first_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.csv");
        fs::write(&path, "Internal,Owner\nshoes,ann\n,bob\nbag\n").unwrap();

        let table = read_table(&path).unwrap();
        assert_eq!(table.headers, vec!["Internal", "Owner"]);
        assert_eq!(table.labels(), vec!["shoes", "", "bag"]);
    }

    #[test]
    fn results_are_appended_and_written() {
        let table = Table {
            headers: vec!["Internal".into()],
            rows: vec![vec!["shoes".into()], vec!["bag".into()]],
        };
        let results = vec![
            Some(ResolutionRecord {
                mapped_category: "Clothing > Shoes".into(),
                review_flag: ReviewFlag::Check,
            }),
            None,
        ];
        let out = table.with_results(&results);
        assert_eq!(out.headers, vec!["Internal", MAPPED_COLUMN, CHECK_COLUMN]);
        assert_eq!(out.rows[0], vec!["shoes", "Clothing > Shoes", "Check"]);
        assert_eq!(out.rows[1], vec!["bag", "", ""]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        CsvSink::new(&path).write_table(&out).unwrap();
        assert_eq!(read_table(&path).unwrap(), out);
    }

    #[test]
    fn rewrite_replaces_file_without_leaving_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autosave.csv");
        let mut sink = CsvSink::new(&path);
        let first = Table {
            headers: vec!["Internal".into()],
            rows: vec![vec!["shoes".into()], vec!["bag".into()]],
        };
        sink.write_table(&first).unwrap();
        let second = Table {
            headers: vec!["Internal".into()],
            rows: vec![vec!["hats".into()]],
        };
        sink.write_table(&second).unwrap();

        assert_eq!(read_table(&path).unwrap(), second);
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names, vec!["autosave.csv"]);
    }

    #[test]
    fn failed_write_keeps_previous_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("autosave.csv");
        let mut sink = CsvSink::new(&path);
        let good = Table {
            headers: vec!["Internal".into()],
            rows: vec![vec!["shoes".into()]],
        };
        sink.write_table(&good).unwrap();

        // Occupy the temp slot so the next write cannot even start.
        fs::create_dir(dir.path().join("autosave.csv.tmp")).unwrap();
        let err = sink.write_table(&Table::default()).expect_err("temp slot taken");
        assert!(matches!(err, TableError::Write { .. }));
        assert_eq!(read_table(&path).unwrap(), good);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = read_table(Path::new("/definitely/not/here.csv")).expect_err("missing");
        assert!(matches!(err, TableError::Read { .. }));
    }
}
