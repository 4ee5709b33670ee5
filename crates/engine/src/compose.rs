//! Render composition.
//!
//! Pure function of (query result | captured error, stylesheet, script) to
//! a self-contained HTML document. No I/O, deterministic: identical inputs
//! produce byte-identical payloads.
//!
//! The result set is embedded as a JSON array of objects keyed by result
//! header (projection order preserved), bound to the global `data`
//! identifier, the contract user scripts are written against. A second
//! global, `dataTruncated`, tells the script when the row cap cut the
//! result short. User script runs from a `load` listener so the data is
//! always in place first.
//!
//! Executing the user's script is the renderer sink's concern, along with
//! whatever sandboxing it applies; composition only builds the document.

use crate::error::{ComposeError, QueryError};
use crate::query::QueryResult;

/// Global identifier the serialized result set is bound to.
pub const DATA_IDENT: &str = "data";
/// Global flag set when the row cap truncated the result.
pub const TRUNCATED_IDENT: &str = "dataTruncated";

/// A composed, renderable document. Immutable; superseded by the next
/// composition, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderPayload {
    html: String,
}

impl RenderPayload {
    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn into_html(self) -> String {
        self.html
    }
}

/// Build the renderable document.
///
/// A captured `QueryError` composes an error document instead: the message
/// is shown in a `div.query-error` and the user script is *not* included,
/// so the chart surface never executes against absent data.
pub fn compose(
    result: Result<&QueryResult, &QueryError>,
    css: &str,
    js: &str,
) -> Result<RenderPayload, ComposeError> {
    match result {
        Ok(result) => compose_chart(result, css, js),
        Err(err) => Ok(compose_error(err, css)),
    }
}

fn compose_chart(result: &QueryResult, css: &str, js: &str) -> Result<RenderPayload, ComposeError> {
    let data = data_literal(result)?;
    let html = format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <style>\n{css}\n</style>\n\
         <script>\nvar {data_ident} = {data};\nvar {truncated_ident} = {truncated};\n</script>\n\
         </head>\n\
         <body>\n\
         <script>\nwindow.addEventListener(\"load\", function() {{\n{js}\n}});\n</script>\n\
         </body>\n\
         </html>\n",
        css = css,
        data_ident = DATA_IDENT,
        data = data,
        truncated_ident = TRUNCATED_IDENT,
        truncated = result.truncated,
        js = js,
    );
    Ok(RenderPayload { html })
}

fn compose_error(err: &QueryError, css: &str) -> RenderPayload {
    let html = format!(
        "<!DOCTYPE html>\n\
         <html>\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <style>\n{css}\n</style>\n\
         </head>\n\
         <body>\n\
         <div class=\"query-error\">{message}</div>\n\
         </body>\n\
         </html>\n",
        css = css,
        message = escape_html(&err.to_string()),
    );
    RenderPayload { html }
}

/// Serialize rows as `[{header: value, ...}, ...]` in projection order.
///
/// Duplicate projection names (`SELECT a, a`) collapse to one key, matching
/// object semantics. `</` is escaped so data can never close the script
/// element.
fn data_literal(result: &QueryResult) -> Result<String, ComposeError> {
    let mut array: Vec<serde_json::Value> = Vec::with_capacity(result.rows.len());
    for row in &result.rows {
        let mut object = serde_json::Map::new();
        for (header, value) in result.headers.iter().zip(row) {
            object.insert(header.clone(), serde_json::Value::String(value.clone()));
        }
        array.push(serde_json::Value::Object(object));
    }
    let json = serde_json::to_string(&serde_json::Value::Array(array))
        .map_err(|e| ComposeError::Serialization(e.to_string()))?;
    Ok(json.replace("</", "<\\/"))
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
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
    fn test_deterministic() {
        let r = result(&["a", "b"], &[&["1", "2"]]);
        let first = compose(Ok(&r), "body {}", "chart(data);").unwrap();
        let second = compose(Ok(&r), "body {}", "chart(data);").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_data_embedded_in_projection_order() {
        let r = result(&["b", "a"], &[&["2", "1"]]);
        let payload = compose(Ok(&r), "", "").unwrap();
        assert!(payload.html().contains(r#"var data = [{"b":"2","a":"1"}];"#));
        assert!(payload.html().contains("var dataTruncated = false;"));
    }

    #[test]
    fn test_css_and_js_included() {
        let r = result(&["a"], &[]);
        let payload = compose(Ok(&r), ".circle { fill: red; }", "draw(data);").unwrap();
        assert!(payload.html().contains(".circle { fill: red; }"));
        assert!(payload.html().contains("draw(data);"));
        // Script runs only once the document (and data) is ready
        assert!(payload.html().contains("window.addEventListener(\"load\""));
    }

    #[test]
    fn test_script_close_in_data_is_escaped() {
        let r = result(&["a"], &[&["</script><script>alert(1)"]]);
        let payload = compose(Ok(&r), "", "").unwrap();
        assert!(!payload.html().contains("</script><script>alert"));
        assert!(payload.html().contains("<\\/script>"));
    }

    #[test]
    fn test_error_payload_skips_user_script() {
        let err = QueryError::new("near \"SELEC\": syntax error");
        let payload = compose(Err(&err), "body {}", "evil(data);").unwrap();
        assert!(!payload.html().contains("evil(data);"));
        assert!(!payload.html().contains("var data"));
        assert!(payload.html().contains("query-error"));
        // Message is HTML-escaped
        assert!(payload.html().contains("near &quot;SELEC&quot;: syntax error"));
        // User stylesheet still applies so the error can be styled
        assert!(payload.html().contains("body {}"));
    }

    #[test]
    fn test_truncated_flag_surfaces() {
        let mut r = result(&["a"], &[&["1"]]);
        r.truncated = true;
        let payload = compose(Ok(&r), "", "").unwrap();
        assert!(payload.html().contains("var dataTruncated = true;"));
    }

    #[test]
    fn test_empty_result() {
        let r = QueryResult::default();
        let payload = compose(Ok(&r), "", "").unwrap();
        assert!(payload.html().contains("var data = [];"));
    }
}
