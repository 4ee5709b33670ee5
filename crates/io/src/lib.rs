// File I/O operations

pub mod import;
pub mod native;

/// Version tag written into every saved .chart file, for forward
/// compatibility checks when the schema changes.
pub const NATIVE_FORMAT_VERSION: u32 = 1;
