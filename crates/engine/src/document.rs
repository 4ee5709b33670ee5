//! Document state and the controller that owns the pipeline.
//!
//! `DocumentState` is the persisted aggregate: the four user-owned source
//! text fields, the snapshot of the last successful query result (for fast
//! reopen), and opaque window geometry/layout blobs the core never
//! interprets. All mutation goes through controller setters that mark the
//! scheduler dirty; the scheduler's `tick` consumes the flags and runs the
//! pipeline.

use serde::{Deserialize, Serialize};

use crate::compose::compose;
use crate::dataset::{Dataset, DatasetStore};
use crate::error::{ImportError, QueryError, StoreError};
use crate::query::{QueryResult, QueryRunner, RunState, DEFAULT_ROW_CAP};
use crate::schedule::{EditKind, RenderScheduler, RenderSink};
use crate::table::{parse, OverflowPolicy, ParseOptions, ParseReport};

/// Query seeded into new documents.
pub const DEFAULT_QUERY: &str = "SELECT * FROM data";

/// Stylesheet seeded into new documents.
pub const DEFAULT_STYLESHEET: &str = "\
/* Style the chart here */

body {
  margin: 0;
  font-family: sans-serif;
}

.query-error {
  color: #b00020;
  padding: 8px;
  font-family: monospace;
}
";

/// Script seeded into new documents. Reads the global `data` array the
/// composer embeds; one object per result row, keyed by column name.
pub const DEFAULT_SCRIPT: &str = "\
// Chart the query result here. `data` is an array of row objects,
// e.g. data[0][\"some_column\"].

var pre = document.createElement(\"pre\");
pre.textContent = JSON.stringify(data, null, 2);
document.body.appendChild(pre);
";

/// Persisted snapshot of the last successful query result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResultSnapshot {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl From<&QueryResult> for ResultSnapshot {
    fn from(result: &QueryResult) -> Self {
        Self { headers: result.headers.clone(), rows: result.rows.clone() }
    }
}

impl From<ResultSnapshot> for QueryResult {
    fn from(snapshot: ResultSnapshot) -> Self {
        Self { headers: snapshot.headers, rows: snapshot.rows, truncated: false }
    }
}

/// The persisted document fields, serialized/deserialized as a unit.
/// The dataset itself is persisted separately (it lives in the store).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentState {
    pub stylesheet_text: String,
    pub script_text: String,
    pub query_text: String,
    pub last_result_snapshot: Option<ResultSnapshot>,
    /// Opaque window geometry string, persisted and restored verbatim.
    pub window_frame: String,
    /// Opaque pane sizes/visibility blob; not interpreted by the core.
    pub window_layout: serde_json::Value,
    /// Opaque table column configuration from the display collaborator.
    pub archived_column_descriptor: Vec<u8>,
}

impl DocumentState {
    /// State for a brand-new document: default query/style/script scaffold.
    pub fn with_defaults() -> Self {
        Self {
            stylesheet_text: DEFAULT_STYLESHEET.to_string(),
            script_text: DEFAULT_SCRIPT.to_string(),
            query_text: DEFAULT_QUERY.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerOptions {
    pub row_cap: usize,
    pub overflow: OverflowPolicy,
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self { row_cap: DEFAULT_ROW_CAP, overflow: OverflowPolicy::default() }
    }
}

/// Owns the whole pipeline: store, runner, scheduler, persisted state, and
/// the external renderer sink. Single-threaded and tick-driven; nothing
/// here blocks.
pub struct DocumentController {
    state: DocumentState,
    store: DatasetStore,
    runner: QueryRunner,
    scheduler: RenderScheduler,
    sink: Box<dyn RenderSink>,
    overflow: OverflowPolicy,
    last_parse_report: Option<ParseReport>,
}

impl DocumentController {
    /// Open a document: restore the dataset (if persisted), prime the
    /// runner with the last result snapshot so the table view has content
    /// before the first query run, and mark everything dirty so the first
    /// tick renders.
    pub fn open(
        state: DocumentState,
        dataset: Option<Dataset>,
        sink: Box<dyn RenderSink>,
        options: ControllerOptions,
    ) -> Result<Self, StoreError> {
        let mut store = DatasetStore::new()?;
        if let Some(dataset) = dataset {
            store
                .replace_dataset(&dataset.headers, dataset.rows.into_iter().map(Ok))
                .map_err(|e| match e {
                    ImportError::Store(e) => e,
                    // Rows restored from disk carry no parse errors
                    ImportError::Parse(e) => StoreError::Schema(e.to_string()),
                })?;
        }

        let mut runner = QueryRunner::new(options.row_cap);
        if let Some(snapshot) = state.last_result_snapshot.clone() {
            runner.restore(snapshot.into());
        }

        let mut scheduler = RenderScheduler::new();
        scheduler.mark(EditKind::Query);
        scheduler.mark(EditKind::Data);
        scheduler.mark(EditKind::Style);
        scheduler.mark(EditKind::Script);

        Ok(Self {
            state,
            store,
            runner,
            scheduler,
            sink,
            overflow: options.overflow,
            last_parse_report: None,
        })
    }

    // ---- Inbound edit notifications ------------------------------------

    pub fn on_query_text_changed(&mut self, text: &str) {
        if text != self.state.query_text {
            self.state.query_text = text.to_string();
            self.scheduler.mark(EditKind::Query);
        }
    }

    pub fn on_style_text_changed(&mut self, text: &str) {
        if text != self.state.stylesheet_text {
            self.state.stylesheet_text = text.to_string();
            self.scheduler.mark(EditKind::Style);
        }
    }

    pub fn on_script_text_changed(&mut self, text: &str) {
        if text != self.state.script_text {
            self.state.script_text = text.to_string();
            self.scheduler.mark(EditKind::Script);
        }
    }

    /// Import raw tabular text, replacing the dataset wholesale.
    ///
    /// On failure (parse reject or store error) the prior dataset is
    /// retained (the transaction rolled back) and nothing is marked
    /// dirty. Returns the recovery report on success.
    pub fn on_data_imported(
        &mut self,
        raw_text: &str,
        delimiter: u8,
        has_headers: bool,
    ) -> Result<ParseReport, ImportError> {
        let options = ParseOptions { delimiter, has_headers, overflow: self.overflow };
        let mut table = parse(raw_text, &options)?;
        let headers = table.headers().to_vec();
        self.store.replace_dataset(&headers, table.by_ref())?;

        let report = table.report();
        if report.padded_rows > 0 || report.truncated_rows > 0 {
            log::warn!(
                "import recovered malformed rows: {} padded, {} truncated",
                report.padded_rows,
                report.truncated_rows
            );
        }
        self.last_parse_report = Some(report);
        self.scheduler.mark(EditKind::Data);
        Ok(report)
    }

    // ---- Outbound views ------------------------------------------------

    /// Last successful result, for the table-display collaborator.
    /// Unaffected by failed queries.
    pub fn current_query_result(&self) -> Option<&QueryResult> {
        self.runner.last_result()
    }

    pub fn last_query_error(&self) -> Option<&QueryError> {
        self.runner.last_error()
    }

    pub fn last_parse_report(&self) -> Option<ParseReport> {
        self.last_parse_report
    }

    pub fn state(&self) -> &DocumentState {
        &self.state
    }

    /// Materialize the dataset for persistence.
    pub fn dump_dataset(&self) -> Result<Option<Dataset>, StoreError> {
        self.store.dump()
    }

    // ---- Window chrome passthrough (persisted, never interpreted) ------

    pub fn set_window_frame(&mut self, frame: &str) {
        self.state.window_frame = frame.to_string();
    }

    pub fn set_window_layout(&mut self, layout: serde_json::Value) {
        self.state.window_layout = layout;
    }

    pub fn set_archived_column_descriptor(&mut self, blob: Vec<u8>) {
        self.state.archived_column_descriptor = blob;
    }

    // ---- Pipeline ------------------------------------------------------

    /// One scheduler tick: re-query if the query or dataset changed,
    /// recompose if anything changed, dispatch to the sink. No-op when
    /// clean, closed, or a render is already in flight.
    pub fn tick(&mut self) {
        let Some(flags) = self.scheduler.tick() else {
            return;
        };

        if flags.needs_requery() {
            let run = self.runner.run(&self.store, &self.state.query_text);
            if run == RunState::Succeeded {
                if let Some(result) = self.runner.last_result() {
                    self.state.last_result_snapshot = Some(ResultSnapshot::from(result));
                }
            }
        }

        let empty = QueryResult::default();
        let outcome = match (self.runner.state(), self.runner.last_error()) {
            (RunState::Failed, Some(err)) => Err(err),
            _ => Ok(self.runner.last_result().unwrap_or(&empty)),
        };

        match compose(outcome, &self.state.stylesheet_text, &self.state.script_text) {
            Ok(payload) => self.sink.render(&payload),
            // Composition is pure; reaching this is an invariant violation
            Err(e) => log::error!("render composition failed: {}", e),
        }
        self.scheduler.finish();
    }

    /// Document close: stop dispatching renders. Already-dispatched
    /// payloads are the sink's to keep.
    pub fn close(&mut self) {
        self.scheduler.close();
    }

    pub fn is_closed(&self) -> bool {
        self.scheduler.is_closed()
    }
}
