// Delimited text parsing - raw pasted/imported text to headers + rows

use crate::error::ParseError;

/// What to do with rows that carry more fields than the header row.
///
/// Short rows are always padded with empty values; over-long rows are a
/// policy choice surfaced in settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Drop the extra trailing fields (counted in the `ParseReport`).
    #[default]
    Truncate,
    /// Fail the import with `ParseError::TooManyFields`.
    Reject,
}

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Field delimiter byte (`,`, `\t`, `;`, `|`, ...).
    pub delimiter: u8,
    /// First non-empty line is the header row. When false, headers are
    /// synthesized as positional names "1", "2", ...
    pub has_headers: bool,
    pub overflow: OverflowPolicy,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_headers: true,
            overflow: OverflowPolicy::Truncate,
        }
    }
}

/// Count of malformations recovered during parsing.
///
/// Recovery is deterministic and never fatal; this exists so the front-end
/// can tell the user "3 rows were padded" after a messy paste.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseReport {
    pub padded_rows: usize,
    pub truncated_rows: usize,
}

/// Headers plus a lazy, single-pass sequence of normalized rows.
///
/// Every row handed out has exactly `headers().len()` values. Not
/// restartable: the input is consumed as rows are pulled.
pub struct ParsedTable<'t> {
    headers: Vec<String>,
    reader: csv::Reader<&'t [u8]>,
    /// First data record, buffered while deciding headers.
    pending: Option<Vec<String>>,
    line: usize,
    report: ParseReport,
    overflow: OverflowPolicy,
}

/// Parse raw delimited text. Pure: no I/O, no side effects.
///
/// Quoted fields follow RFC 4180 double-quote rules. Empty input yields a
/// table with no headers and no rows.
pub fn parse<'t>(text: &'t str, options: &ParseOptions) -> Result<ParsedTable<'t>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(options.delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    // The first non-empty record drives the column count either way:
    // it is the header row, or it fixes the width for synthesized headers.
    let mut line = 0usize;
    let first = next_record(&mut reader, &mut line)?;

    let (headers, pending) = match first {
        None => (Vec::new(), None),
        Some(fields) => {
            if options.has_headers {
                (normalize_headers(fields), None)
            } else {
                let headers = (1..=fields.len()).map(|i| i.to_string()).collect();
                (headers, Some(fields))
            }
        }
    };

    Ok(ParsedTable {
        headers,
        reader,
        pending,
        line,
        report: ParseReport::default(),
        overflow: options.overflow,
    })
}

impl ParsedTable<'_> {
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Malformations recovered so far. Complete once all rows are consumed.
    pub fn report(&self) -> ParseReport {
        self.report
    }

    /// Pad short rows, truncate or reject long ones. Deterministic.
    fn normalize(&mut self, mut fields: Vec<String>, line: usize) -> Result<Vec<String>, ParseError> {
        let expected = self.headers.len();
        if fields.len() < expected {
            self.report.padded_rows += 1;
            fields.resize(expected, String::new());
        } else if fields.len() > expected {
            match self.overflow {
                OverflowPolicy::Truncate => {
                    self.report.truncated_rows += 1;
                    fields.truncate(expected);
                }
                OverflowPolicy::Reject => {
                    return Err(ParseError::TooManyFields {
                        line,
                        expected,
                        found: fields.len(),
                    });
                }
            }
        }
        Ok(fields)
    }
}

impl Iterator for ParsedTable<'_> {
    type Item = Result<Vec<String>, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(fields) = self.pending.take() {
            let line = self.line;
            return Some(self.normalize(fields, line));
        }
        let record = match next_record(&mut self.reader, &mut self.line) {
            Ok(r) => r,
            Err(e) => return Some(Err(e)),
        };
        let line = self.line;
        record.map(|fields| self.normalize(fields, line))
    }
}

fn next_record(
    reader: &mut csv::Reader<&[u8]>,
    line: &mut usize,
) -> Result<Option<Vec<String>>, ParseError> {
    // The csv reader already skips blank lines.
    match reader.records().next() {
        None => Ok(None),
        Some(Ok(record)) => {
            *line = record.position().map(|p| p.line() as usize).unwrap_or(*line + 1);
            Ok(Some(record.iter().map(|s| s.to_string()).collect()))
        }
        Some(Err(e)) => {
            let at = e.position().map(|p| p.line() as usize).unwrap_or(*line + 1);
            Err(ParseError::Malformed { line: at, message: e.to_string() })
        }
    }
}

/// Make header names usable as distinct SQL column names.
///
/// Empty names become positional ("3" for the third column); duplicates
/// (case-insensitive, as SQLite treats column names) get a numeric suffix.
fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::with_capacity(raw.len());
    let mut out: Vec<String> = Vec::with_capacity(raw.len());

    for (idx, name) in raw.into_iter().enumerate() {
        let base = if name.trim().is_empty() {
            (idx + 1).to_string()
        } else {
            name
        };
        let mut candidate = base.clone();
        let mut suffix = 2usize;
        while seen.iter().any(|s| s.eq_ignore_ascii_case(&candidate)) {
            candidate = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        seen.push(candidate.clone());
        out.push(candidate);
    }
    out
}
