use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body of `POST /api/query`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryRequest {
    pub question: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub provider: String,
    pub model: String,
}

/// A result row. Key order is the order the backend sent.
pub type Row = Map<String, Value>;

/// Body returned by `POST /api/query`, in either its success or error shape.
///
/// Missing `results` is treated the same as an empty list.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub sql_query: String,
    #[serde(default, deserialize_with = "rows_or_empty")]
    pub results: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Accept `null`, a missing field, or anything that is not a list of objects
/// as "no results"; keep only object entries otherwise.
fn rows_or_empty<'de, D>(deserializer: D) -> Result<Vec<Row>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    })
}
