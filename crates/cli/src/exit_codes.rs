// Exit code registry (single source of truth)

pub const EXIT_SUCCESS: u8 = 0;
/// Generic operation failure (store errors, save/load failures)
pub const EXIT_ERROR: u8 = 1;
/// Bad arguments (clap reserves 2 for usage errors as well)
pub const EXIT_USAGE: u8 = 2;
/// Input file could not be read
pub const EXIT_IO: u8 = 3;
/// Imported text was rejected by the parser
pub const EXIT_PARSE: u8 = 4;
/// The SQL query failed
pub const EXIT_QUERY: u8 = 5;
