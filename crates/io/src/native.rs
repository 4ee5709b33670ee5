// Native .chart format using SQLite

use std::path::Path;

use base64::Engine as _;
use rusqlite::{params, params_from_iter, Connection};

use chartdoc_engine::dataset::{quote_ident, Dataset, TABLE_NAME};
use chartdoc_engine::document::{DocumentState, ResultSnapshot};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

// Meta keys
const KEY_FORMAT_VERSION: &str = "format_version";
const KEY_CSS: &str = "css";
const KEY_JS: &str = "js";
const KEY_QUERY: &str = "query";
const KEY_WINDOW_FRAME: &str = "window_frame";
const KEY_WINDOW_LAYOUT: &str = "window_layout";
const KEY_ARCHIVED_COLUMN: &str = "archived_column";
const KEY_RESULT_SNAPSHOT: &str = "result_snapshot";
const KEY_HEADERS: &str = "headers";

/// Write the document as a fresh SQLite file: the `meta` key/value table
/// for the serialized fields, plus the dataset table itself when one
/// exists. Whole write happens in one transaction.
pub fn save(path: &Path, state: &DocumentState, dataset: Option<&Dataset>) -> Result<(), String> {
    // Delete existing file if present (SQLite will create fresh)
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| e.to_string())?;
    }

    let conn = Connection::open(path).map_err(|e| e.to_string())?;
    conn.execute_batch(SCHEMA).map_err(|e| e.to_string())?;

    conn.execute("BEGIN TRANSACTION", []).map_err(|e| e.to_string())?;

    let snapshot_json = match &state.last_result_snapshot {
        Some(snapshot) => serde_json::to_string(snapshot).map_err(|e| e.to_string())?,
        None => String::new(),
    };
    let layout_json = serde_json::to_string(&state.window_layout).map_err(|e| e.to_string())?;
    let archived = base64::engine::general_purpose::STANDARD.encode(&state.archived_column_descriptor);

    let meta: &[(&str, String)] = &[
        (KEY_FORMAT_VERSION, crate::NATIVE_FORMAT_VERSION.to_string()),
        (KEY_CSS, state.stylesheet_text.clone()),
        (KEY_JS, state.script_text.clone()),
        (KEY_QUERY, state.query_text.clone()),
        (KEY_WINDOW_FRAME, state.window_frame.clone()),
        (KEY_WINDOW_LAYOUT, layout_json),
        (KEY_ARCHIVED_COLUMN, archived),
        (KEY_RESULT_SNAPSHOT, snapshot_json),
    ];
    {
        let mut stmt = conn
            .prepare("INSERT INTO meta (key, value) VALUES (?1, ?2)")
            .map_err(|e| e.to_string())?;
        for (key, value) in meta {
            stmt.execute(params![key, value]).map_err(|e| e.to_string())?;
        }
        if let Some(dataset) = dataset {
            // Header order (and synthesized names) must survive exactly
            let headers_json = serde_json::to_string(&dataset.headers).map_err(|e| e.to_string())?;
            stmt.execute(params![KEY_HEADERS, headers_json]).map_err(|e| e.to_string())?;
        }
    }

    if let Some(dataset) = dataset {
        if !dataset.headers.is_empty() {
            write_dataset(&conn, dataset)?;
        }
    }

    conn.execute("COMMIT", []).map_err(|e| e.to_string())?;
    log::info!(
        "saved {}: {} dataset rows",
        path.display(),
        dataset.map(|d| d.rows.len()).unwrap_or(0)
    );
    Ok(())
}

fn write_dataset(conn: &Connection, dataset: &Dataset) -> Result<(), String> {
    let columns: Vec<String> = dataset
        .headers
        .iter()
        .map(|h| format!("{} TEXT", quote_ident(h)))
        .collect();
    conn.execute_batch(&format!(
        "CREATE TABLE {} ({})",
        quote_ident(TABLE_NAME),
        columns.join(", ")
    ))
    .map_err(|e| e.to_string())?;

    let placeholders = vec!["?"; dataset.headers.len()].join(", ");
    let mut stmt = conn
        .prepare(&format!(
            "INSERT INTO {} VALUES ({})",
            quote_ident(TABLE_NAME),
            placeholders
        ))
        .map_err(|e| e.to_string())?;
    for row in &dataset.rows {
        stmt.execute(params_from_iter(row.iter())).map_err(|e| e.to_string())?;
    }
    Ok(())
}

/// Load a document. Files with no dataset (never imported) load with
/// `None`; missing meta keys fall back to defaults so older files open.
pub fn load(path: &Path) -> Result<(DocumentState, Option<Dataset>), String> {
    // Connection::open would create a fresh database for a missing path
    if !path.exists() {
        return Err(format!("no such file: {}", path.display()));
    }
    let conn = Connection::open(path).map_err(|e| e.to_string())?;

    let state = DocumentState {
        stylesheet_text: meta_get(&conn, KEY_CSS).unwrap_or_default(),
        script_text: meta_get(&conn, KEY_JS).unwrap_or_default(),
        query_text: meta_get(&conn, KEY_QUERY).unwrap_or_default(),
        last_result_snapshot: meta_get(&conn, KEY_RESULT_SNAPSHOT)
            .filter(|s| !s.is_empty())
            .and_then(|s| serde_json::from_str::<ResultSnapshot>(&s).ok()),
        window_frame: meta_get(&conn, KEY_WINDOW_FRAME).unwrap_or_default(),
        window_layout: meta_get(&conn, KEY_WINDOW_LAYOUT)
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or(serde_json::Value::Null),
        archived_column_descriptor: meta_get(&conn, KEY_ARCHIVED_COLUMN)
            .and_then(|s| base64::engine::general_purpose::STANDARD.decode(s).ok())
            .unwrap_or_default(),
    };

    let dataset = read_dataset(&conn)?;
    Ok((state, dataset))
}

fn meta_get(conn: &Connection, key: &str) -> Option<String> {
    conn.query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
        .ok()
}

fn read_dataset(conn: &Connection) -> Result<Option<Dataset>, String> {
    let table_exists: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [TABLE_NAME],
            |row| row.get(0),
        )
        .map_err(|e| e.to_string())?;
    if table_exists == 0 {
        return Ok(None);
    }

    let mut stmt = conn
        .prepare(&format!("SELECT * FROM {}", quote_ident(TABLE_NAME)))
        .map_err(|e| e.to_string())?;

    // Prefer the stored header list; fall back to the table's own column
    // names for files written by other tools
    let headers: Vec<String> = match meta_get(conn, KEY_HEADERS)
        .and_then(|s| serde_json::from_str::<Vec<String>>(&s).ok())
    {
        Some(headers) => headers,
        None => stmt.column_names().iter().map(|s| s.to_string()).collect(),
    };
    let ncols = stmt.column_count();

    let rows_iter = stmt
        .query_map([], |row| {
            let mut out = Vec::with_capacity(ncols);
            for i in 0..ncols {
                let value: Option<String> = row.get(i)?;
                out.push(value.unwrap_or_default());
            }
            Ok(out)
        })
        .map_err(|e| e.to_string())?;

    let mut rows = Vec::new();
    for row in rows_iter {
        rows.push(row.map_err(|e| e.to_string())?);
    }

    Ok(Some(Dataset { headers, rows }))
}
