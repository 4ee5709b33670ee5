// In-memory dataset store - one SQLite table, replaced wholesale on import

use rusqlite::types::ValueRef;
use rusqlite::{params_from_iter, Connection};

use crate::error::{ImportError, ParseError, QueryError, StoreError};
use crate::query::QueryResult;

/// Name of the dataset table. This is the name user queries reference
/// (`SELECT * FROM data`).
pub const TABLE_NAME: &str = "data";

/// A fully materialized dataset (used for persistence, not for queries).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Embedded relational store holding the document's single table.
///
/// All columns are TEXT: source data is untyped strings; SQLite's affinity
/// rules still let numeric-looking text compare and aggregate usefully.
pub struct DatasetStore {
    conn: Connection,
}

impl DatasetStore {
    pub fn new() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }

    /// Drop any existing dataset and load a new one from `rows`, all inside
    /// one transaction. On any failure the transaction rolls back and the
    /// prior dataset is untouched; the store is never left half-populated.
    ///
    /// Empty `headers` clears the dataset. Returns the number of rows
    /// inserted.
    pub fn replace_dataset<I>(&mut self, headers: &[String], rows: I) -> Result<usize, ImportError>
    where
        I: IntoIterator<Item = Result<Vec<String>, ParseError>>,
    {
        let tx = self
            .conn
            .transaction()
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", quote_ident(TABLE_NAME)))
            .map_err(|e| StoreError::Schema(e.to_string()))?;

        if headers.is_empty() {
            tx.commit().map_err(|e| StoreError::Connection(e.to_string()))?;
            log::info!("dataset cleared (empty import)");
            return Ok(0);
        }

        let columns: Vec<String> = headers
            .iter()
            .map(|h| format!("{} TEXT", quote_ident(h)))
            .collect();
        tx.execute_batch(&format!(
            "CREATE TABLE {} ({})",
            quote_ident(TABLE_NAME),
            columns.join(", ")
        ))
        .map_err(|e| StoreError::Schema(e.to_string()))?;

        let placeholders = vec!["?"; headers.len()].join(", ");
        let mut inserted = 0usize;
        {
            let mut stmt = tx
                .prepare(&format!(
                    "INSERT INTO {} VALUES ({})",
                    quote_ident(TABLE_NAME),
                    placeholders
                ))
                .map_err(|e| StoreError::Schema(e.to_string()))?;

            for (idx, row) in rows.into_iter().enumerate() {
                // A parse error mid-stream (Reject policy) aborts the whole
                // import; dropping the transaction rolls everything back.
                let row = row?;
                stmt.execute(params_from_iter(row.iter()))
                    .map_err(|e| StoreError::Insert { row: idx, message: e.to_string() })?;
                inserted += 1;
            }
        }

        tx.commit().map_err(|e| StoreError::Connection(e.to_string()))?;
        log::info!("dataset replaced: {} columns, {} rows", headers.len(), inserted);
        Ok(inserted)
    }

    /// Execute a read query and materialize up to `max_rows` rows.
    ///
    /// Column names come out in the query's projection order. Values are
    /// stringified: NULL becomes the empty string, REALs with no fractional
    /// part print as integers. Non-read statements (INSERT, DROP, ...) are
    /// rejected.
    pub fn query(&self, sql: &str, max_rows: Option<usize>) -> Result<QueryResult, QueryError> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| QueryError::new(e.to_string()))?;

        if !stmt.readonly() {
            return Err(QueryError::new("only read queries are allowed"));
        }

        let headers: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let ncols = headers.len();

        let mut out_rows: Vec<Vec<String>> = Vec::new();
        let mut truncated = false;
        let mut rows = stmt.query([]).map_err(|e| QueryError::new(e.to_string()))?;
        loop {
            // Semantic errors (unknown column in a subquery, bad cast) can
            // surface during stepping, not just at prepare time.
            let row = match rows.next() {
                Ok(Some(row)) => row,
                Ok(None) => break,
                Err(e) => return Err(QueryError::new(e.to_string())),
            };
            if let Some(cap) = max_rows {
                if out_rows.len() >= cap {
                    truncated = true;
                    break;
                }
            }
            let mut out = Vec::with_capacity(ncols);
            for i in 0..ncols {
                let value = row
                    .get_ref(i)
                    .map_err(|e| QueryError::new(e.to_string()))?;
                out.push(value_to_string(value));
            }
            out_rows.push(out);
        }

        Ok(QueryResult { headers, rows: out_rows, truncated })
    }

    /// Whether a dataset has been imported.
    pub fn has_dataset(&self) -> bool {
        self.table_exists().unwrap_or(false)
    }

    /// Materialize the full current dataset for persistence.
    pub fn dump(&self) -> Result<Option<Dataset>, StoreError> {
        if !self.table_exists()? {
            return Ok(None);
        }
        let result = self
            .query(&format!("SELECT * FROM {}", quote_ident(TABLE_NAME)), None)
            .map_err(|e| StoreError::Connection(e.message))?;
        Ok(Some(Dataset { headers: result.headers, rows: result.rows }))
    }

    fn table_exists(&self) -> Result<bool, StoreError> {
        self.conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [TABLE_NAME],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n > 0)
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

/// Quote an identifier for SQLite. Doubled double-quotes make reserved
/// words and synthesized numeric headers ("1", "2", ...) safe.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn value_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", n as i64)
            } else {
                format!("{}", n)
            }
        }
        ValueRef::Text(t) => String::from_utf8_lossy(t).into_owned(),
        ValueRef::Blob(b) => String::from_utf8_lossy(b).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(fields: &[&str]) -> Vec<String> {
        fields.iter().map(|s| s.to_string()).collect()
    }

    fn ok_rows(rows: &[&[&str]]) -> Vec<Result<Vec<String>, ParseError>> {
        rows.iter().map(|r| Ok(strings(r))).collect()
    }

    #[test]
    fn test_roundtrip() {
        let mut store = DatasetStore::new().unwrap();
        store
            .replace_dataset(&strings(&["a", "b"]), ok_rows(&[&["1", "2"], &["3", ""]]))
            .unwrap();

        let result = store.query("SELECT * FROM data", None).unwrap();
        assert_eq!(result.headers, strings(&["a", "b"]));
        assert_eq!(result.rows, vec![strings(&["1", "2"]), strings(&["3", ""])]);
        assert!(!result.truncated);
    }

    #[test]
    fn test_projection_filter() {
        let mut store = DatasetStore::new().unwrap();
        store
            .replace_dataset(&strings(&["a", "b"]), ok_rows(&[&["1", "2"], &["3", ""]]))
            .unwrap();

        let result = store
            .query("SELECT a, b FROM data WHERE a = '1'", None)
            .unwrap();
        assert_eq!(result.headers, strings(&["a", "b"]));
        assert_eq!(result.rows, vec![strings(&["1", "2"])]);
    }

    #[test]
    fn test_reserved_word_and_numeric_headers() {
        let mut store = DatasetStore::new().unwrap();
        store
            .replace_dataset(&strings(&["select", "1"]), ok_rows(&[&["x", "y"]]))
            .unwrap();

        let result = store
            .query("SELECT \"select\", \"1\" FROM data", None)
            .unwrap();
        assert_eq!(result.rows, vec![strings(&["x", "y"])]);
    }

    #[test]
    fn test_syntax_error_is_captured() {
        let mut store = DatasetStore::new().unwrap();
        store
            .replace_dataset(&strings(&["a"]), ok_rows(&[&["1"]]))
            .unwrap();

        let err = store.query("SELEC * FROM data", None).unwrap_err();
        assert!(err.message.contains("syntax error"), "got: {}", err.message);
    }

    #[test]
    fn test_unknown_column_is_captured() {
        let mut store = DatasetStore::new().unwrap();
        store
            .replace_dataset(&strings(&["a"]), ok_rows(&[&["1"]]))
            .unwrap();

        assert!(store.query("SELECT nope FROM data", None).is_err());
    }

    #[test]
    fn test_write_statement_rejected() {
        let mut store = DatasetStore::new().unwrap();
        store
            .replace_dataset(&strings(&["a"]), ok_rows(&[&["1"]]))
            .unwrap();

        let err = store.query("DELETE FROM data", None).unwrap_err();
        assert!(err.message.contains("read"), "got: {}", err.message);
        // Dataset untouched
        let result = store.query("SELECT * FROM data", None).unwrap();
        assert_eq!(result.rows.len(), 1);
    }

    #[test]
    fn test_failed_import_rolls_back() {
        let mut store = DatasetStore::new().unwrap();
        store
            .replace_dataset(&strings(&["a"]), ok_rows(&[&["old"]]))
            .unwrap();

        // A mid-stream parse error (Reject policy) must abort atomically
        let bad = vec![
            Ok(strings(&["new"])),
            Err(ParseError::TooManyFields { line: 3, expected: 1, found: 2 }),
        ];
        let err = store.replace_dataset(&strings(&["a"]), bad).unwrap_err();
        assert!(matches!(err, ImportError::Parse(_)));

        // Prior dataset survives, not half of the new one
        let result = store.query("SELECT * FROM data", None).unwrap();
        assert_eq!(result.rows, vec![strings(&["old"])]);
    }

    #[test]
    fn test_row_cap() {
        let mut store = DatasetStore::new().unwrap();
        let rows: Vec<_> = (0..5).map(|i| Ok(vec![i.to_string()])).collect();
        store.replace_dataset(&strings(&["n"]), rows).unwrap();

        let result = store.query("SELECT n FROM data", Some(3)).unwrap();
        assert_eq!(result.rows.len(), 3);
        assert!(result.truncated);

        let result = store.query("SELECT n FROM data", Some(5)).unwrap();
        assert!(!result.truncated);
    }

    #[test]
    fn test_null_and_numeric_stringification() {
        let store = DatasetStore::new().unwrap();
        let result = store
            .query("SELECT NULL, 42, 1.5, 2.0, 'txt'", None)
            .unwrap();
        assert_eq!(result.rows, vec![strings(&["", "42", "1.5", "2", "txt"])]);
    }

    #[test]
    fn test_dump() {
        let mut store = DatasetStore::new().unwrap();
        assert!(store.dump().unwrap().is_none());
        assert!(!store.has_dataset());

        store
            .replace_dataset(&strings(&["a", "b"]), ok_rows(&[&["1", "2"]]))
            .unwrap();
        let dataset = store.dump().unwrap().unwrap();
        assert_eq!(dataset.headers, strings(&["a", "b"]));
        assert_eq!(dataset.rows, vec![strings(&["1", "2"])]);
    }

    #[test]
    fn test_empty_headers_clears_dataset() {
        let mut store = DatasetStore::new().unwrap();
        store
            .replace_dataset(&strings(&["a"]), ok_rows(&[&["1"]]))
            .unwrap();
        store
            .replace_dataset(&[], Vec::<Result<Vec<String>, ParseError>>::new())
            .unwrap();
        assert!(!store.has_dataset());
    }
}
