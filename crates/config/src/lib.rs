pub mod settings;

pub use settings::{OverlongRows, Settings};
