pub mod compose;
pub mod dataset;
pub mod document;
pub mod error;
pub mod query;
pub mod schedule;
pub mod table;
