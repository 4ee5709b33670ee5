// Raw import helpers - byte decoding and delimiter detection

use std::path::Path;

/// Read a file and convert to UTF-8 if needed (handles Windows-1252,
/// Latin-1, etc., common for spreadsheet-exported CSVs).
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    match String::from_utf8(bytes) {
        Ok(text) => Ok(text),
        // Not UTF-8: recover the buffer from the error and re-decode
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

const SNIFF_CANDIDATES: [u8; 4] = [b'\t', b';', b',', b'|'];
const SNIFF_SAMPLE_LINES: usize = 10;

/// Detect the most likely field delimiter by checking consistency across
/// the first few lines.
///
/// A candidate (tab, semicolon, comma, pipe) is scored by how many sample
/// lines agree with the first line's field count, weighted by that count;
/// candidates yielding a single field are discarded. Comma is the fallback
/// for empty or undecidable input.
pub fn sniff_delimiter(content: &str) -> u8 {
    let sample: Vec<&str> = content.lines().take(SNIFF_SAMPLE_LINES).collect();
    // Reversed so that on a score tie max_by_key lands on the earlier
    // candidate (tab over semicolon over comma over pipe)
    SNIFF_CANDIDATES
        .iter()
        .rev()
        .filter_map(|&delim| delimiter_score(delim, &sample).map(|score| (score, delim)))
        .max_by_key(|&(score, _)| score)
        .map(|(_, delim)| delim)
        .unwrap_or(b',')
}

/// Consistency score for one candidate, or `None` when the first sample
/// line does not split into multiple fields under it.
fn delimiter_score(delim: u8, sample: &[&str]) -> Option<u64> {
    let counts: Vec<usize> = sample.iter().map(|line| field_count(delim, line)).collect();
    let target = *counts.first()?;
    if target <= 1 {
        return None;
    }
    let agreeing = counts.iter().filter(|&&c| c == target).count() as u64;
    // Weighting by width prefers the delimiter that explains more columns
    // when two candidates are equally consistent
    Some(agreeing * target as u64)
}

fn field_count(delim: u8, line: &str) -> usize {
    csv::ReaderBuilder::new()
        .delimiter(delim)
        .has_headers(false)
        .flexible(true)
        .from_reader(line.as_bytes())
        .records()
        .next()
        .and_then(|r| r.ok())
        .map(|r| r.len())
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_sniff_comma() {
        let content = "name,age,city\nAlice,30,Paris\nBob,25,London\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_semicolon() {
        let content = "name;age;city\nAlice;30;Paris\nBob;25;London\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_tab() {
        let content = "name\tage\tcity\nAlice\t30\tParis\n";
        assert_eq!(sniff_delimiter(content), b'\t');
    }

    #[test]
    fn test_sniff_pipe() {
        let content = "name|age|city\nAlice|30|Paris\n";
        assert_eq!(sniff_delimiter(content), b'|');
    }

    #[test]
    fn test_sniff_semicolon_with_quoted_commas() {
        let content = "name;address\n\"Doe, Jane\";\"123 Main St, Apt 4\"\nBob;\"456 Elm\"\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_empty_defaults_to_comma() {
        assert_eq!(sniff_delimiter(""), b',');
    }

    #[test]
    fn test_read_utf8_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "a,b\n1,2\n").unwrap();
        assert_eq!(read_file_as_utf8(&path).unwrap(), "a,b\n1,2\n");
    }

    #[test]
    fn test_read_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        // 0xE9 is 'é' in Windows-1252, invalid as standalone UTF-8
        fs::write(&path, [b'c', b'a', b'f', 0xE9]).unwrap();
        assert_eq!(read_file_as_utf8(&path).unwrap(), "café");
    }
}
