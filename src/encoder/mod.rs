//! Tabular encoding of heterogeneous documents
//!
//! Column derivation uses first-seen order: documents are walked in the order
//! they were fetched and each document's keys in stored order, and a key is
//! appended the first time it appears. The same snapshot therefore always
//! produces the same header, which keeps exports diffable.
//!
//! A collection without documents produces an empty file: no header, no rows.

pub mod cell;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use mongodb::bson::Document;
use tracing::debug;

use crate::error::EncodingError;
use crate::scanner::CollectionResult;

pub use cell::{Cell, MISSING_SENTINEL};

/// Extension of every export file
pub const EXPORT_EXTENSION: &str = "csv";

/// Ordered, duplicate-free set of column names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnSet {
    columns: Vec<String>,
}

impl ColumnSet {
    /// Union of the keys of `documents`, in first-seen order
    pub fn from_documents(documents: &[Document]) -> Self {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for document in documents {
            for key in document.keys() {
                if seen.insert(key.as_str()) {
                    columns.push(key.clone());
                }
            }
        }
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.columns
    }
}

/// Derive the header for a document set
pub fn build_column_set(documents: &[Document]) -> ColumnSet {
    ColumnSet::from_documents(documents)
}

/// Cells of one row, one per column
pub fn row_cells(columns: &ColumnSet, document: &Document) -> Vec<Cell> {
    columns
        .iter()
        .map(|column| Cell::from_field(document.get(column)))
        .collect()
}

/// Serialize `documents` as CSV under `columns`
///
/// # Arguments
/// * `collection` - Qualified collection name, used in errors
/// * `columns` - Header, usually from [`build_column_set`]
/// * `documents` - Rows in output order
///
/// # Returns
/// * `Result<Vec<u8>, EncodingError>` - CSV bytes, empty when there are no documents
pub fn encode(
    collection: &str,
    columns: &ColumnSet,
    documents: &[Document],
) -> Result<Vec<u8>, EncodingError> {
    if documents.is_empty() {
        return Ok(Vec::new());
    }

    if let Some(bad) = columns.iter().find(|c| c.contains('\0')) {
        return Err(EncodingError::new(
            collection,
            format!("column name {bad:?} contains a NUL character"),
        ));
    }

    let mut writer = csv::WriterBuilder::new()
        .flexible(false)
        .from_writer(Vec::new());
    writer
        .write_record(columns.as_slice())
        .map_err(|e| EncodingError::new(collection, format!("failed to write header: {e}")))?;

    for (index, document) in documents.iter().enumerate() {
        let cells = row_cells(columns, document);
        for (cell, column) in cells.iter().zip(columns.iter()) {
            if let Some(problem) = cell.representation_problem() {
                return Err(EncodingError::new(
                    collection,
                    format!("row {}, column '{column}': {problem}", index + 1),
                ));
            }
        }
        writer
            .write_record(cells.iter().map(Cell::as_str))
            .map_err(|e| {
                EncodingError::new(collection, format!("failed to write row {}: {e}", index + 1))
            })?;
    }

    writer
        .into_inner()
        .map_err(|e| EncodingError::new(collection, format!("failed to flush: {}", e.error())))
}

/// An export written to the staging area
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    /// File name, `<database>.<collection>.csv`
    pub name: String,
    pub path: PathBuf,
    pub columns: ColumnSet,
    /// Data rows, excluding the header
    pub row_count: usize,
}

/// File name for a qualified collection name
pub fn export_file_name(qualified_name: &str) -> String {
    format!("{qualified_name}.{EXPORT_EXTENSION}")
}

/// Encode a fetched collection and write it under `directory`
///
/// Blocking; callers on the async runtime run it on the blocking pool.
pub fn write_export(
    result: &CollectionResult,
    directory: &Path,
) -> Result<ExportFile, EncodingError> {
    let columns = build_column_set(&result.documents);
    let bytes = encode(&result.qualified_name, &columns, &result.documents)?;

    let name = export_file_name(&result.qualified_name);
    let path = directory.join(&name);
    std::fs::write(&path, &bytes).map_err(|e| {
        EncodingError::new(
            &result.qualified_name,
            format!("failed to write {}: {e}", path.display()),
        )
    })?;

    debug!(
        file = %path.display(),
        columns = columns.len(),
        rows = result.documents.len(),
        bytes = bytes.len(),
        "Wrote export file"
    );

    Ok(ExportFile {
        name,
        path,
        columns,
        row_count: result.documents.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{Bson, doc};

    fn users() -> Vec<Document> {
        vec![
            doc! { "id": 1, "name": "A" },
            doc! { "id": 2, "name": "A", "age": 30 },
        ]
    }

    #[test]
    fn test_first_seen_column_order() {
        let columns = build_column_set(&users());
        assert_eq!(columns.as_slice(), ["id", "name", "age"]);
    }

    #[test]
    fn test_column_set_is_deterministic() {
        let docs = vec![
            doc! { "z": 1, "a": 2 },
            doc! { "m": 1, "a": 3, "b": 4 },
            doc! { "b": 1, "q": 0 },
        ];
        let first = build_column_set(&docs);
        for _ in 0..10 {
            assert_eq!(build_column_set(&docs.clone()), first);
        }
        assert_eq!(first.as_slice(), ["z", "a", "m", "b", "q"]);
    }

    #[test]
    fn test_encode_users_scenario() {
        let docs = users();
        let columns = build_column_set(&docs);
        let bytes = encode("shop.users", &columns, &docs).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, "id,name,age\n1,A,NULL\n2,A,30\n");
    }

    #[test]
    fn test_sentinel_iff_field_absent() {
        let docs = vec![
            doc! { "a": 1, "b": Bson::Null },
            doc! { "b": "", "c": "NULLISH" },
            doc! { "c": 3 },
        ];
        let columns = build_column_set(&docs);
        for document in &docs {
            for (column, cell) in columns.iter().zip(row_cells(&columns, document)) {
                assert_eq!(
                    cell == Cell::Missing,
                    !document.contains_key(column),
                    "column {column} of {document}"
                );
            }
        }
    }

    #[test]
    fn test_empty_collection_has_no_header() {
        let bytes = encode("shop.orders", &ColumnSet::default(), &[]).unwrap();
        assert!(bytes.is_empty());
    }

    #[test]
    fn test_values_with_delimiters_are_quoted() {
        let docs = vec![doc! { "text": "Hello, world!", "quote": "say \"hi\"" }];
        let columns = build_column_set(&docs);
        let text = String::from_utf8(encode("c", &columns, &docs).unwrap()).unwrap();
        assert_eq!(
            text,
            "text,quote\n\"Hello, world!\",\"say \"\"hi\"\"\"\n"
        );
    }

    #[test]
    fn test_unrepresentable_value_is_encoding_error() {
        let docs = vec![doc! { "ok": 1 }, doc! { "ok": 2, "bad": "a\0b" }];
        let columns = build_column_set(&docs);
        let err = encode("shop.blobs", &columns, &docs).unwrap_err();
        assert_eq!(err.collection, "shop.blobs");
        assert!(err.reason.contains("row 2"));
        assert!(err.reason.contains("'bad'"));
    }

    #[test]
    fn test_write_export_row_count_matches_documents() {
        let dir = tempfile::tempdir().unwrap();
        let result = CollectionResult {
            qualified_name: "shop.users".into(),
            documents: users(),
        };
        let export = write_export(&result, dir.path()).unwrap();

        assert_eq!(export.name, "shop.users.csv");
        assert_eq!(export.path, dir.path().join("shop.users.csv"));
        assert_eq!(export.row_count, 2);

        let content = std::fs::read_to_string(&export.path).unwrap();
        // header plus one line per document
        assert_eq!(content.lines().count(), 1 + export.row_count);
    }

    #[test]
    fn test_write_export_empty_collection() {
        let dir = tempfile::tempdir().unwrap();
        let result = CollectionResult {
            qualified_name: "shop.orders".into(),
            documents: vec![],
        };
        let export = write_export(&result, dir.path()).unwrap();
        assert_eq!(export.row_count, 0);
        assert!(export.columns.is_empty());
        assert_eq!(std::fs::metadata(&export.path).unwrap().len(), 0);
    }

    #[test]
    fn test_write_export_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = CollectionResult {
            qualified_name: "shop.users".into(),
            documents: users(),
        };
        let err = write_export(&result, &dir.path().join("absent")).unwrap_err();
        assert_eq!(err.collection, "shop.users");
    }
}
