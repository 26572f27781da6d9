use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::schema::SchemaSnapshot;
use crate::sql::DialectTag;

/// Prefix marking a [`GenerationResult`] that carries a failure, not a query.
pub const ERROR_SENTINEL: &str = "ERROR";

// Input for one generation call
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub question: String,
    pub schema: Arc<SchemaSnapshot>,
    pub dialect: DialectTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ChartType {
    #[default]
    Table,
    Bar,
    Line,
    Pie,
}

impl ChartType {
    /// Unknown chart names fall back to `Table`.
    pub fn parse_lenient(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "bar" => ChartType::Bar,
            "line" => ChartType::Line,
            "pie" => ChartType::Pie,
            _ => ChartType::Table,
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChartType::Table => "Table",
            ChartType::Bar => "Bar",
            ChartType::Line => "Line",
            ChartType::Pie => "Pie",
        };
        f.write_str(name)
    }
}

impl<'de> Deserialize<'de> for ChartType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().map(ChartType::parse_lenient).unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visualization {
    #[serde(default, alias = "chart_type", alias = "ChartType")]
    pub chart_type: ChartType,
    #[serde(default, alias = "x_axis_column", alias = "XAxisColumn")]
    pub x_axis_column: String,
    #[serde(
        default,
        rename = "yAxisColumns",
        alias = "yAxisColumn",
        alias = "y_axis_column",
        alias = "YAxisColumn",
        deserialize_with = "one_or_many"
    )]
    pub y_axis_columns: Vec<String>,
    #[serde(default, alias = "Title")]
    pub title: String,
}

/// Structured answer of the generation pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationResult {
    #[serde(alias = "sql_query", alias = "SqlQuery", alias = "sql")]
    pub sql_query: String,
    #[serde(default, alias = "Explanation", deserialize_with = "string_or_null")]
    pub explanation: String,
    #[serde(default, alias = "Visualization", deserialize_with = "visualization_or_null")]
    pub visualization: Visualization,
}

impl GenerationResult {
    pub fn failure(sql_query: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            sql_query: sql_query.into(),
            explanation: explanation.into(),
            visualization: Visualization::default(),
        }
    }

    /// True when `sql_query` carries the `ERROR` sentinel.
    pub fn is_failure(&self) -> bool {
        self.sql_query.starts_with(ERROR_SENTINEL)
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Other(serde_json::Value),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(column) if column.is_empty() => Vec::new(),
        OneOrMany::One(column) => vec![column],
        OneOrMany::Many(columns) => columns,
        OneOrMany::Other(_) => Vec::new(),
    })
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn visualization_or_null<'de, D>(deserializer: D) -> Result<Visualization, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Visualization>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_camel_and_pascal_case_fields() {
        let camel: GenerationResult = serde_json::from_str(
            r#"{"sqlQuery": "SELECT 1", "explanation": "one",
                "visualization": {"chartType": "bar", "xAxisColumn": "a", "yAxisColumn": "b", "title": "t"}}"#,
        )
        .unwrap();
        assert_eq!(camel.sql_query, "SELECT 1");
        assert_eq!(camel.visualization.chart_type, ChartType::Bar);
        assert_eq!(camel.visualization.y_axis_columns, vec!["b"]);

        let pascal: GenerationResult = serde_json::from_str(
            r#"{"SqlQuery": "SELECT 2", "Explanation": null,
                "Visualization": {"ChartType": "Pie", "YAxisColumn": ["x", "y"]}}"#,
        )
        .unwrap();
        assert_eq!(pascal.sql_query, "SELECT 2");
        assert_eq!(pascal.explanation, "");
        assert_eq!(pascal.visualization.chart_type, ChartType::Pie);
        assert_eq!(pascal.visualization.y_axis_columns, vec!["x", "y"]);
    }

    #[test]
    fn unknown_chart_type_defaults_to_table() {
        let result: GenerationResult =
            serde_json::from_str(r#"{"sqlQuery": "SELECT 1", "visualization": {"chartType": "Scatter"}}"#)
                .unwrap();
        assert_eq!(result.visualization.chart_type, ChartType::Table);
    }

    #[test]
    fn missing_sql_is_a_parse_error() {
        assert!(serde_json::from_str::<GenerationResult>(r#"{"explanation": "no sql"}"#).is_err());
    }

    #[test]
    fn error_sentinel_marks_failure() {
        assert!(GenerationResult::failure("ERROR", "boom").is_failure());
        assert!(GenerationResult::failure("ERROR: Validation failed.", "blocked").is_failure());
        assert!(!GenerationResult::failure("SELECT 1", "").is_failure());
    }
}
