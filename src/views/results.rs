use std::fmt::Write as _;

use serde_json::Value;

use crate::models::query::QueryResult;
use crate::models::results::{RenderedResults, ResultsTable};
use crate::views::escape::escape_html;

pub const NO_RESULTS: &str = "No results found";

/// Plain text coercion of a single cell, with no type-aware formatting.
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                match n.as_f64() {
                    // 120.0 reads as 120
                    Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e21 => {
                        format!("{f:.0}")
                    }
                    Some(f) => f.to_string(),
                    None => n.to_string(),
                }
            }
        }
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Build the table for a successful query. Column order comes from the
/// key order of the first row; rows lacking a column get an empty cell.
pub fn render_results(result: &QueryResult) -> RenderedResults {
    let table = match result.results.first() {
        None => ResultsTable::Empty,
        Some(first) => {
            let headers: Vec<String> = first.keys().cloned().collect();
            let rows = result
                .results
                .iter()
                .map(|row| {
                    headers
                        .iter()
                        .map(|h| row.get(h).map(cell_text).unwrap_or_default())
                        .collect()
                })
                .collect();
            ResultsTable::Rows { headers, rows }
        }
    };

    RenderedResults {
        sql: result.sql_query.clone(),
        table,
    }
}

impl RenderedResults {
    pub fn to_html(&self) -> String {
        let mut html = String::new();
        let _ = write!(
            html,
            "<div class=\"sql\"><h3>SQL Query</h3><pre><code>{}</code></pre></div>",
            escape_html(&self.sql)
        );

        html.push_str("<table class=\"results\">");
        match &self.table {
            ResultsTable::Empty => {
                let _ = write!(
                    html,
                    "<tbody><tr><td class=\"empty\">{}</td></tr></tbody>",
                    NO_RESULTS
                );
            }
            ResultsTable::Rows { headers, rows } => {
                html.push_str("<thead><tr>");
                for h in headers {
                    let _ = write!(html, "<th>{}</th>", escape_html(h));
                }
                html.push_str("</tr></thead><tbody>");
                for row in rows {
                    html.push_str("<tr>");
                    for cell in row {
                        let _ = write!(html, "<td>{}</td>", escape_html(cell));
                    }
                    html.push_str("</tr>");
                }
                html.push_str("</tbody>");
            }
        }
        html.push_str("</table>");
        html
    }
}
