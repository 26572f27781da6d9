pub mod dialect;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL dialect spoken by a configured target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DialectTag {
    #[serde(alias = "sqlserver", alias = "mssql")]
    SqlServer,
    #[serde(alias = "postgresql", alias = "postgres")]
    PostgreSql,
    #[serde(alias = "mysql")]
    MySql,
    #[serde(alias = "duckdb")]
    DuckDb,
}

impl DialectTag {
    /// Human-readable engine name embedded in prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            DialectTag::SqlServer => "SQL Server",
            DialectTag::PostgreSql => "PostgreSQL",
            DialectTag::MySql => "MySQL",
            DialectTag::DuckDb => "DuckDB",
        }
    }

    /// Syntax reminders handed to the model for this dialect.
    pub fn syntax_hints(&self) -> &'static [&'static str] {
        match self {
            DialectTag::SqlServer => &[
                "Use TOP N instead of LIMIT N",
                "Use GETDATE() instead of NOW()",
                "Use DATEADD() for date arithmetic",
                "Use DATEDIFF() for date differences",
                "Quote identifiers with square brackets, never backticks",
            ],
            DialectTag::PostgreSql => &[
                "Use LIMIT N (and OFFSET M) for row limits",
                "Use NOW() or CURRENT_DATE for the current time",
                "Use INTERVAL '1 year' style literals for date arithmetic",
                "Quote identifiers with double quotes when they contain upper case letters",
            ],
            DialectTag::MySql => &[
                "Use LIMIT N (and OFFSET M) for row limits",
                "Use NOW() for the current time",
                "Use DATE_SUB() and DATE_ADD() for date arithmetic",
                "Quote identifiers with backticks",
            ],
            DialectTag::DuckDb => &[
                "Use LIMIT N (and OFFSET M) for row limits",
                "Use current_date or now() for the current time",
                "Use date_trunc() and INTERVAL literals for date arithmetic",
                "Quote identifiers with double quotes",
            ],
        }
    }
}

impl fmt::Display for DialectTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            DialectTag::SqlServer => "SqlServer",
            DialectTag::PostgreSql => "PostgreSql",
            DialectTag::MySql => "MySql",
            DialectTag::DuckDb => "DuckDb",
        };
        f.write_str(tag)
    }
}

impl FromStr for DialectTag {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlserver" | "mssql" => Ok(DialectTag::SqlServer),
            "postgresql" | "postgres" => Ok(DialectTag::PostgreSql),
            "mysql" => Ok(DialectTag::MySql),
            "duckdb" => Ok(DialectTag::DuckDb),
            other => Err(format!("Unsupported dialect: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dialect_names_case_insensitively() {
        assert_eq!("SqlServer".parse::<DialectTag>().unwrap(), DialectTag::SqlServer);
        assert_eq!("postgres".parse::<DialectTag>().unwrap(), DialectTag::PostgreSql);
        assert_eq!("DUCKDB".parse::<DialectTag>().unwrap(), DialectTag::DuckDb);
        assert!("oracle".parse::<DialectTag>().is_err());
    }

    #[test]
    fn deserializes_aliases() {
        let tag: DialectTag = serde_json::from_str("\"mssql\"").unwrap();
        assert_eq!(tag, DialectTag::SqlServer);
        let tag: DialectTag = serde_json::from_str("\"PostgreSql\"").unwrap();
        assert_eq!(tag, DialectTag::PostgreSql);
    }
}
