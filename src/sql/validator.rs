use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::{debug, warn};

use super::DialectTag;

/// Statements that mutate data, schema or permissions.
pub const FORBIDDEN_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE", "CREATE", "GRANT", "REVOKE",
    "EXEC", "EXECUTE", "MERGE",
];

// File read/write, dynamic SQL, linked-server and external row access primitives.
const DANGEROUS_PATTERNS: &[&str] = &[
    r"\bINTO\s+OUTFILE\b",
    r"\bINTO\s+DUMPFILE\b",
    r"\bLOAD_FILE\b",
    r"\bxp_cmdshell\b",
    r"\bsp_executesql\b",
    r"\bOPENROWSET\b",
    r"\bOPENQUERY\b",
    r"\bOPENDATASOURCE\b",
    r"\bpg_read_file\b",
    r"\bpg_read_binary_file\b",
    r"\bpg_ls_dir\b",
    r"\blo_import\b",
    r"\blo_export\b",
    r"\bdblink\w*\s*\(",
    r"\bread_(csv|csv_auto|parquet|json|json_auto|ndjson|ndjson_auto|text|blob)\s*\(",
    r"\b(glob|parquet_scan|sniff_csv)\s*\(",
    // DuckDB scans a quoted path used as a table source
    r"\b(FROM|JOIN)\s+'",
    r#"\b(FROM|JOIN)\s+"[^"]*[./\\][^"]*""#,
];

// Checked with string literal contents masked out.
const CODE_PATTERNS: &[&str] = &[
    // SELECT ... INTO creates a table on SQL Server and PostgreSQL
    r"\bINTO\s+(TEMP\s+|TEMPORARY\s+|UNLOGGED\s+)?[#@\[\x22\w]",
];

static SELECT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^SELECT\s").expect("valid SELECT prefix pattern"));

static KEYWORD_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    FORBIDDEN_KEYWORDS
        .iter()
        .map(|kw| {
            let re = Regex::new(&format!(r"(?i)\b{}\b", kw)).expect("valid keyword pattern");
            (*kw, re)
        })
        .collect()
});

static DANGEROUS_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DANGEROUS_PATTERNS
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).expect("valid dangerous-construct pattern"))
        .collect()
});

static CODE_REGEXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    CODE_PATTERNS
        .iter()
        .map(|p| Regex::new(&format!("(?i){}", p)).expect("valid code pattern"))
        .collect()
});

/// Blanks the contents of single-quoted literals, keeping the quotes.
/// A doubled `''` escape closes and reopens the literal, which masks the same way.
fn mask_string_literals(sql: &str) -> String {
    let mut in_literal = false;
    sql.chars()
        .map(|c| match (c, in_literal) {
            ('\'', _) => {
                in_literal = !in_literal;
                c
            }
            (_, true) => ' ',
            _ => c,
        })
        .collect()
}

/// Result of running a query through the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub reason: Option<String>,
}

impl ValidationOutcome {
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// One entry of the validator's rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    NonEmpty,
    /// Whole-word, case-insensitive ban on mutating keywords.
    KeywordBan,
    /// Trimmed text must open with `SELECT` followed by whitespace.
    PrefixRequirement,
    /// Case-insensitive ban on known dangerous constructs.
    PatternBan,
    /// Only a trailing run of `;` is tolerated.
    SingleStatement,
    NoComments,
}

impl Rule {
    /// Returns the rejection reason when `sql` breaks this rule.
    pub fn check(&self, sql: &str) -> Option<String> {
        match self {
            Rule::NonEmpty => sql
                .trim()
                .is_empty()
                .then(|| "query cannot be empty".to_string()),
            Rule::KeywordBan => KEYWORD_PATTERNS
                .iter()
                .find(|(_, re)| re.is_match(sql))
                .map(|(kw, _)| format!("query contains forbidden keyword: {}", kw)),
            Rule::PrefixRequirement => (!SELECT_PREFIX.is_match(sql.trim()))
                .then(|| "query must start with SELECT".to_string()),
            Rule::PatternBan => {
                let code = mask_string_literals(sql);
                (DANGEROUS_REGEXES.iter().any(|re| re.is_match(sql))
                    || CODE_REGEXES.iter().any(|re| re.is_match(&code)))
                .then(|| "query contains potentially dangerous operations".to_string())
            }
            Rule::SingleStatement => {
                let body = sql.trim_end().trim_end_matches(|c: char| c == ';' || c.is_whitespace());
                body.contains(';')
                    .then(|| "query contains multiple statements".to_string())
            }
            Rule::NoComments => (sql.contains("--") || sql.contains("/*"))
                .then(|| "query contains SQL comments".to_string()),
        }
    }
}

/// Allow-by-default, deny-by-rule gate in front of every live connection.
#[derive(Debug, Clone)]
pub struct SqlValidator {
    rules: Vec<Rule>,
}

impl SqlValidator {
    /// Empty check, keyword ban, SELECT prefix and dangerous patterns.
    pub fn standard() -> Self {
        Self {
            rules: vec![
                Rule::NonEmpty,
                Rule::KeywordBan,
                Rule::PrefixRequirement,
                Rule::PatternBan,
            ],
        }
    }

    /// The standard table plus stacked-statement and comment rejection.
    pub fn strict() -> Self {
        Self::standard()
            .with_rule(Rule::SingleStatement)
            .with_rule(Rule::NoComments)
    }

    pub fn from_config(strict: bool) -> Self {
        if strict {
            Self::strict()
        } else {
            Self::standard()
        }
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    // The rule table is dialect-independent today; the tag is kept so
    // per-dialect rules can be added without touching callers.
    pub fn validate(&self, sql: &str, dialect: DialectTag) -> ValidationOutcome {
        for rule in &self.rules {
            if let Some(reason) = rule.check(sql) {
                warn!("Rejected {} query ({:?}): {}", dialect, rule, reason);
                return ValidationOutcome::rejected(reason);
            }
        }

        debug!("Query passed {} validation rules", self.rules.len());
        ValidationOutcome::valid()
    }
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::strict()
    }
}
