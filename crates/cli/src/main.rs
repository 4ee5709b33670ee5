// chartdoc CLI - headless chart-document operations

mod exit_codes;

use std::cell::RefCell;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;

use clap::{Parser, Subcommand, ValueEnum};

use chartdoc_config::{OverlongRows, Settings};
use chartdoc_engine::compose::RenderPayload;
use chartdoc_engine::document::{ControllerOptions, DocumentController, DocumentState};
use chartdoc_engine::error::ImportError;
use chartdoc_engine::query::QueryResult;
use chartdoc_engine::schedule::RenderSink;
use chartdoc_engine::table::OverflowPolicy;
use chartdoc_io::{import, native};

use exit_codes::{EXIT_ERROR, EXIT_IO, EXIT_PARSE, EXIT_QUERY, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "chartdoc")]
#[command(about = "Query tabular data with SQL and chart it (headless document operations)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a document from a delimited text file
    #[command(after_help = "\
Examples:
  chartdoc import sales.csv -o sales.chart
  chartdoc import dump.txt -o dump.chart --delimiter ';'
  chartdoc import matrix.tsv -o matrix.chart --no-headers")]
    Import {
        /// Input file (CSV/TSV/other delimited text)
        input: PathBuf,

        /// Document to create
        #[arg(short = 'o', long)]
        output: PathBuf,

        /// Field delimiter (sniffed from the input when omitted)
        #[arg(long)]
        delimiter: Option<char>,

        /// First line is headers
        #[arg(long, overrides_with = "no_headers")]
        headers: bool,

        /// First line is data; headers are synthesized as 1, 2, ...
        #[arg(long, overrides_with = "headers")]
        no_headers: bool,
    },

    /// Update the document's query, stylesheet, or script text
    #[command(after_help = "\
Examples:
  chartdoc set sales.chart --query 'SELECT region, SUM(amount) AS total FROM data GROUP BY region'
  chartdoc set sales.chart --js-file chart.js --css-file chart.css")]
    Set {
        doc: PathBuf,

        /// New SQL query text
        #[arg(long, conflicts_with = "query_file")]
        query: Option<String>,

        /// Read the query from a file
        #[arg(long)]
        query_file: Option<PathBuf>,

        /// New stylesheet text
        #[arg(long, conflicts_with = "css_file")]
        css: Option<String>,

        /// Read the stylesheet from a file
        #[arg(long)]
        css_file: Option<PathBuf>,

        /// New script text
        #[arg(long, conflicts_with = "js_file")]
        js: Option<String>,

        /// Read the script from a file
        #[arg(long)]
        js_file: Option<PathBuf>,
    },

    /// Run the stored query (or a one-off query) and print the result
    #[command(after_help = "\
Examples:
  chartdoc query sales.chart
  chartdoc query sales.chart 'SELECT COUNT(*) AS n FROM data' -f json")]
    Query {
        doc: PathBuf,

        /// One-off SQL (the stored query text is not changed)
        sql: Option<String>,

        /// Output format
        #[arg(short = 'f', long, default_value = "csv")]
        format: OutputFormat,
    },

    /// Compose the renderable HTML document
    #[command(after_help = "\
Examples:
  chartdoc render sales.chart -o sales.html
  chartdoc render sales.chart | wkhtmltoimage - chart.png")]
    Render {
        doc: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Show document summary (columns, rows, text-field sizes)
    Info { doc: PathBuf },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

/// Sink that keeps only the newest payload, shared with the caller.
#[derive(Default)]
struct CaptureSink {
    last: Rc<RefCell<Option<RenderPayload>>>,
}

impl RenderSink for CaptureSink {
    fn render(&mut self, payload: &RenderPayload) {
        *self.last.borrow_mut() = Some(payload.clone());
    }
}

/// Sink for commands that don't need the rendered output.
struct DiscardSink;

impl RenderSink for DiscardSink {
    fn render(&mut self, _payload: &RenderPayload) {}
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let settings = Settings::load();
    let code = match cli.command {
        Commands::Import { input, output, delimiter, headers, no_headers } => {
            cmd_import(&settings, &input, &output, delimiter, headers, no_headers)
        }
        Commands::Set { doc, query, query_file, css, css_file, js, js_file } => {
            cmd_set(&settings, &doc, query, query_file, css, css_file, js, js_file)
        }
        Commands::Query { doc, sql, format } => cmd_query(&settings, &doc, sql.as_deref(), format),
        Commands::Render { doc, output } => cmd_render(&settings, &doc, output.as_deref()),
        Commands::Info { doc } => cmd_info(&settings, &doc),
    };
    ExitCode::from(code)
}

fn controller_options(settings: &Settings) -> ControllerOptions {
    ControllerOptions {
        row_cap: settings.row_cap,
        overflow: match settings.overlong_rows {
            OverlongRows::Truncate => OverflowPolicy::Truncate,
            OverlongRows::Reject => OverflowPolicy::Reject,
        },
    }
}

fn open_document(
    settings: &Settings,
    path: &Path,
    sink: Box<dyn RenderSink>,
) -> Result<DocumentController, String> {
    let (state, dataset) = native::load(path)?;
    log::debug!(
        "opened {}: dataset={}",
        path.display(),
        dataset.as_ref().map(|d| d.rows.len()).unwrap_or(0)
    );
    DocumentController::open(state, dataset, sink, controller_options(settings))
        .map_err(|e| e.to_string())
}

fn save_document(controller: &DocumentController, path: &Path) -> Result<(), String> {
    let dataset = controller.dump_dataset().map_err(|e| e.to_string())?;
    native::save(path, controller.state(), dataset.as_ref())
}

fn cmd_import(
    settings: &Settings,
    input: &Path,
    output: &Path,
    delimiter: Option<char>,
    headers: bool,
    no_headers: bool,
) -> u8 {
    let raw = match import::read_file_as_utf8(input) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", input.display(), e);
            return EXIT_IO;
        }
    };

    let delimiter = match delimiter {
        Some(c) if c.is_ascii() => c as u8,
        Some(c) => {
            eprintln!("Error: delimiter must be a single ASCII character, got '{}'", c);
            return EXIT_USAGE;
        }
        None => import::sniff_delimiter(&raw),
    };
    let has_headers = if no_headers {
        false
    } else if headers {
        true
    } else {
        settings.default_has_headers
    };

    let mut controller = match DocumentController::open(
        DocumentState::with_defaults(),
        None,
        Box::new(DiscardSink),
        controller_options(settings),
    ) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };

    let report = match controller.on_data_imported(&raw, delimiter, has_headers) {
        Ok(report) => report,
        Err(ImportError::Parse(e)) => {
            eprintln!("Error: import rejected: {}", e);
            return EXIT_PARSE;
        }
        Err(ImportError::Store(e)) => {
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    };

    // Run the default query once so the document opens with a snapshot
    controller.tick();

    if let Err(e) = save_document(&controller, output) {
        eprintln!("Error: cannot write {}: {}", output.display(), e);
        return EXIT_ERROR;
    }

    match controller.dump_dataset() {
        Ok(Some(dataset)) => {
            println!(
                "Imported {} rows x {} columns into {}",
                dataset.rows.len(),
                dataset.headers.len(),
                output.display()
            );
        }
        _ => println!("Created empty document {}", output.display()),
    }
    if report.padded_rows > 0 {
        println!("  {} short rows padded with empty values", report.padded_rows);
    }
    if report.truncated_rows > 0 {
        println!("  {} long rows truncated to the header width", report.truncated_rows);
    }
    EXIT_SUCCESS
}

#[allow(clippy::too_many_arguments)]
fn cmd_set(
    settings: &Settings,
    doc: &Path,
    query: Option<String>,
    query_file: Option<PathBuf>,
    css: Option<String>,
    css_file: Option<PathBuf>,
    js: Option<String>,
    js_file: Option<PathBuf>,
) -> u8 {
    let query = match text_arg(query, query_file) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_IO;
        }
    };
    let css = match text_arg(css, css_file) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_IO;
        }
    };
    let js = match text_arg(js, js_file) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_IO;
        }
    };
    if query.is_none() && css.is_none() && js.is_none() {
        eprintln!("Error: nothing to set (use --query, --css, or --js)");
        return EXIT_USAGE;
    }

    let mut controller = match open_document(settings, doc, Box::new(DiscardSink)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: cannot open {}: {}", doc.display(), e);
            return EXIT_ERROR;
        }
    };

    if let Some(text) = query.as_deref() {
        controller.on_query_text_changed(text);
    }
    if let Some(text) = css.as_deref() {
        controller.on_style_text_changed(text);
    }
    if let Some(text) = js.as_deref() {
        controller.on_script_text_changed(text);
    }
    controller.tick();

    if let Err(e) = save_document(&controller, doc) {
        eprintln!("Error: cannot write {}: {}", doc.display(), e);
        return EXIT_ERROR;
    }

    // The text is saved either way (it's the user's), but a failing query
    // is worth a non-zero exit
    if let Some(err) = controller.last_query_error() {
        eprintln!("Warning: query failed: {}", err);
        return EXIT_QUERY;
    }
    EXIT_SUCCESS
}

fn cmd_query(settings: &Settings, doc: &Path, sql: Option<&str>, format: OutputFormat) -> u8 {
    let mut controller = match open_document(settings, doc, Box::new(DiscardSink)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: cannot open {}: {}", doc.display(), e);
            return EXIT_ERROR;
        }
    };

    // One-off SQL runs through the same pipeline but is not persisted
    if let Some(sql) = sql {
        controller.on_query_text_changed(sql);
    }
    controller.tick();

    if let Some(err) = controller.last_query_error() {
        eprintln!("Error: {}", err);
        return EXIT_QUERY;
    }
    let Some(result) = controller.current_query_result() else {
        eprintln!("Error: document has no dataset to query");
        return EXIT_ERROR;
    };

    let rendered = match format {
        OutputFormat::Csv => format_result_csv(result),
        OutputFormat::Json => format_result_json(result),
    };
    match rendered {
        Ok(text) => {
            print!("{}", text);
            if result.truncated {
                eprintln!("(result truncated at {} rows)", result.rows.len());
            }
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            EXIT_ERROR
        }
    }
}

fn cmd_render(settings: &Settings, doc: &Path, output: Option<&Path>) -> u8 {
    let sink = CaptureSink::default();
    let captured = sink.last.clone();
    let mut controller = match open_document(settings, doc, Box::new(sink)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: cannot open {}: {}", doc.display(), e);
            return EXIT_ERROR;
        }
    };
    controller.tick();

    // A fresh document is fully dirty, so the tick always dispatched; a
    // failing query still renders (as an error document)
    let payload = match captured.borrow_mut().take() {
        Some(payload) => payload,
        None => {
            eprintln!("Error: nothing was rendered");
            return EXIT_ERROR;
        }
    };

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, payload.html()) {
                eprintln!("Error: cannot write {}: {}", path.display(), e);
                return EXIT_ERROR;
            }
        }
        None => {
            let mut stdout = std::io::stdout();
            if stdout.write_all(payload.html().as_bytes()).is_err() {
                return EXIT_ERROR;
            }
        }
    }
    EXIT_SUCCESS
}

fn cmd_info(settings: &Settings, doc: &Path) -> u8 {
    let controller = match open_document(settings, doc, Box::new(DiscardSink)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: cannot open {}: {}", doc.display(), e);
            return EXIT_ERROR;
        }
    };

    let state = controller.state();
    match controller.dump_dataset() {
        Ok(Some(dataset)) => {
            println!("Dataset: {} rows x {} columns", dataset.rows.len(), dataset.headers.len());
            println!("Columns: {}", dataset.headers.join(", "));
        }
        Ok(None) => println!("Dataset: none"),
        Err(e) => {
            eprintln!("Error: {}", e);
            return EXIT_ERROR;
        }
    }
    println!("Query:   {}", state.query_text);
    println!("Style:   {} bytes", state.stylesheet_text.len());
    println!("Script:  {} bytes", state.script_text.len());
    match &state.last_result_snapshot {
        Some(snapshot) => println!("Snapshot: {} rows", snapshot.rows.len()),
        None => println!("Snapshot: none"),
    }
    if !state.window_frame.is_empty() {
        println!("Window:  {}", state.window_frame);
    }
    EXIT_SUCCESS
}

fn text_arg(inline: Option<String>, file: Option<PathBuf>) -> Result<Option<String>, String> {
    match (inline, file) {
        (Some(text), _) => Ok(Some(text)),
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| format!("cannot read {}: {}", path.display(), e)),
        (None, None) => Ok(None),
    }
}

fn format_result_csv(result: &QueryResult) -> Result<String, String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&result.headers).map_err(|e| e.to_string())?;
    for row in &result.rows {
        writer.write_record(row).map_err(|e| e.to_string())?;
    }
    let bytes = writer.into_inner().map_err(|e| e.to_string())?;
    String::from_utf8(bytes).map_err(|e| e.to_string())
}

fn format_result_json(result: &QueryResult) -> Result<String, String> {
    let mut array: Vec<serde_json::Value> = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        let mut object = serde_json::Map::new();
        for (header, value) in result.headers.iter().zip(row) {
            object.insert(header.clone(), serde_json::Value::String(value.clone()));
        }
        array.push(serde_json::Value::Object(object));
    }
    let mut text = serde_json::to_string_pretty(&array).map_err(|e| e.to_string())?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(headers: &[&str], rows: &[&[&str]]) -> QueryResult {
        QueryResult {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|s| s.to_string()).collect())
                .collect(),
            truncated: false,
        }
    }

    #[test]
    fn test_format_csv() {
        let r = result(&["a", "b"], &[&["1", "2"], &["3", ","]]);
        let text = format_result_csv(&r).unwrap();
        assert_eq!(text, "a,b\n1,2\n3,\",\"\n");
    }

    #[test]
    fn test_format_json_preserves_column_order() {
        let r = result(&["z", "a"], &[&["1", "2"]]);
        let text = format_result_json(&r).unwrap();
        let z = text.find("\"z\"").unwrap();
        let a = text.find("\"a\"").unwrap();
        assert!(z < a);
    }

    #[test]
    fn test_text_arg_prefers_inline() {
        let value = text_arg(Some("x".to_string()), None).unwrap();
        assert_eq!(value.as_deref(), Some("x"));
        assert!(text_arg(None, None).unwrap().is_none());
    }
}
