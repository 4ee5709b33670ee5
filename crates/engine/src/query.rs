//! Query execution orchestration.
//!
//! `QueryRunner` wraps `DatasetStore::query` with a row cap, a cache of the
//! last successful result (a failing query never blanks the table view or
//! the chart's data), and an explicit run state machine. Completions are
//! tagged with a request generation so that, should execution ever move to
//! a background worker, late results for a superseded request are discarded
//! rather than applied out of order.

use crate::dataset::DatasetStore;
use crate::error::QueryError;

/// Materialized result of the last query execution.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult {
    /// Result column names, in the query's projection order.
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// True when the row cap cut off further rows.
    pub truncated: bool,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }
}

/// Lifecycle of the runner with respect to its most recent request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

/// Default cap on materialized rows (bounds memory for `SELECT *` over a
/// huge import). Overridable from settings.
pub const DEFAULT_ROW_CAP: usize = 10_000;

pub struct QueryRunner {
    row_cap: usize,
    state: RunState,
    generation: u64,
    last_ok: Option<QueryResult>,
    last_error: Option<QueryError>,
}

impl Default for QueryRunner {
    fn default() -> Self {
        Self::new(DEFAULT_ROW_CAP)
    }
}

impl QueryRunner {
    pub fn new(row_cap: usize) -> Self {
        Self {
            row_cap,
            state: RunState::Idle,
            generation: 0,
            last_ok: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Last successful result. Survives failed queries.
    pub fn last_result(&self) -> Option<&QueryResult> {
        self.last_ok.as_ref()
    }

    /// Error from the most recent run, if it failed. Cleared on success.
    pub fn last_error(&self) -> Option<&QueryError> {
        self.last_error.as_ref()
    }

    /// Seed the cache from a persisted snapshot (fast reopen). Leaves the
    /// runner `Idle`; the first real run supersedes this.
    pub fn restore(&mut self, result: QueryResult) {
        self.last_ok = Some(result);
    }

    /// Execute synchronously against the store. Read the outcome through
    /// `last_result` / `last_error`.
    pub fn run(&mut self, store: &DatasetStore, sql: &str) -> RunState {
        let token = self.begin();
        let outcome = store.query(sql, Some(self.row_cap));
        self.finish(token, outcome);
        self.state
    }

    /// Start a request; returns the token `finish` must present.
    /// A newer `begin` supersedes any outstanding request.
    pub fn begin(&mut self) -> u64 {
        self.generation += 1;
        self.state = RunState::Running;
        self.generation
    }

    /// Deliver a completion. Returns false (and changes nothing) if the
    /// request was superseded by a newer `begin`; last writer wins.
    pub fn finish(&mut self, token: u64, outcome: Result<QueryResult, QueryError>) -> bool {
        if token != self.generation {
            log::debug!("discarding stale query completion (token {} < {})", token, self.generation);
            return false;
        }
        match outcome {
            Ok(result) => {
                if result.truncated {
                    log::warn!("query result truncated at {} rows", result.rows.len());
                }
                self.last_ok = Some(result);
                self.last_error = None;
                self.state = RunState::Succeeded;
            }
            Err(err) => {
                self.last_error = Some(err);
                self.state = RunState::Failed;
            }
        }
        true
    }
}
