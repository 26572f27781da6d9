use regex::{Captures, NoExpand, Regex};
use std::sync::LazyLock;
use tracing::debug;

use super::DialectTag;

static LIMIT_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bLIMIT\s+(\d+)\s+OFFSET\s+(\d+)").expect("valid LIMIT/OFFSET pattern")
});
static LIMIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*\bLIMIT\s+(\d+)").expect("valid LIMIT pattern"));
static TOP: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bTOP\b").expect("valid TOP pattern"));
static LEADING_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^SELECT\b").expect("valid SELECT pattern"));
static NOW_FN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bNOW\(\)").expect("valid NOW pattern"));
static IFNULL_FN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bIFNULL\(").expect("valid IFNULL pattern"));
static SUBSTR_FN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bSUBSTR\(").expect("valid SUBSTR pattern"));
static EXTRACT_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bEXTRACT\(\s*(YEAR|MONTH|DAY)\s+FROM\s+([^)]+)\)").expect("valid EXTRACT pattern")
});
static CONCAT_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bCONCAT\(([^)]+)\)").expect("valid CONCAT pattern"));

/// Function whose name differs between the generic dialect and SQL Server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionRename {
    CurrentTime,
    NullCoalesce,
    Substring,
}

impl FunctionRename {
    fn pattern(&self) -> &'static Regex {
        match self {
            FunctionRename::CurrentTime => &*NOW_FN,
            FunctionRename::NullCoalesce => &*IFNULL_FN,
            FunctionRename::Substring => &*SUBSTR_FN,
        }
    }

    fn replacement(&self) -> &'static str {
        match self {
            FunctionRename::CurrentTime => "GETDATE()",
            FunctionRename::NullCoalesce => "ISNULL(",
            FunctionRename::Substring => "SUBSTRING(",
        }
    }
}

/// A single textual rewrite. Rules are independent and order-sensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteRule {
    /// `LIMIT n OFFSET m` to `OFFSET .. FETCH NEXT`, otherwise bare `LIMIT n` to `TOP n`.
    Pagination,
    RenameFunction(FunctionRename),
    /// `EXTRACT(YEAR FROM x)` to `YEAR(x)` for YEAR, MONTH and DAY.
    ExtractDatePart,
    /// Rewrites the first `CONCAT(a, b)` only.
    ConcatToPlus,
    BacktickToBracket,
}

const SQL_SERVER_RULES: &[RewriteRule] = &[
    RewriteRule::Pagination,
    RewriteRule::RenameFunction(FunctionRename::CurrentTime),
    RewriteRule::RenameFunction(FunctionRename::NullCoalesce),
    RewriteRule::RenameFunction(FunctionRename::Substring),
    RewriteRule::ExtractDatePart,
    RewriteRule::ConcatToPlus,
    RewriteRule::BacktickToBracket,
];

impl RewriteRule {
    pub fn apply(&self, sql: &str) -> String {
        match self {
            RewriteRule::Pagination => rewrite_pagination(sql),
            RewriteRule::RenameFunction(function) => function
                .pattern()
                .replace_all(sql, NoExpand(function.replacement()))
                .into_owned(),
            RewriteRule::ExtractDatePart => EXTRACT_PART.replace_all(sql, "${1}(${2})").into_owned(),
            RewriteRule::ConcatToPlus => CONCAT_CALL
                .replacen(sql, 1, |caps: &Captures| {
                    let args: Vec<&str> = caps[1].split(',').map(str::trim).collect();
                    format!("({})", args.join(" + "))
                })
                .into_owned(),
            RewriteRule::BacktickToBracket => backticks_to_brackets(sql),
        }
    }
}

fn rewrite_pagination(sql: &str) -> String {
    if LIMIT_OFFSET.is_match(sql) {
        return LIMIT_OFFSET
            .replace_all(sql, "OFFSET ${2} ROWS FETCH NEXT ${1} ROWS ONLY")
            .into_owned();
    }

    let Some(caps) = LIMIT.captures(sql) else {
        return sql.to_string();
    };
    if TOP.is_match(sql) || !LEADING_SELECT.is_match(sql.trim_start()) {
        return sql.to_string();
    }

    let limit = caps[1].to_string();
    let stripped = LIMIT.replace_all(sql, "");
    LEADING_SELECT
        .replace(stripped.trim(), NoExpand(&format!("SELECT TOP {}", limit)))
        .into_owned()
}

// Odd occurrences open a bracket, even occurrences close it.
fn backticks_to_brackets(sql: &str) -> String {
    let mut seen = 0usize;
    sql.chars()
        .map(|c| {
            if c != '`' {
                return c;
            }
            seen += 1;
            if seen % 2 == 1 { '[' } else { ']' }
        })
        .collect()
}

/// Rewrite rules that bring generic SQL into `dialect`.
pub fn rules_for(dialect: DialectTag) -> &'static [RewriteRule] {
    match dialect {
        DialectTag::SqlServer => SQL_SERVER_RULES,
        DialectTag::PostgreSql | DialectTag::MySql | DialectTag::DuckDb => &[],
    }
}

/// Best-effort textual rewrite of `sql` into `dialect`. Not a parser: the
/// output is only as correct as the input's resemblance to the rule shapes.
pub fn translate(sql: &str, dialect: DialectTag) -> String {
    let rules = rules_for(dialect);
    if rules.is_empty() {
        return sql.to_string();
    }

    let translated = rules
        .iter()
        .fold(sql.to_string(), |acc, rule| rule.apply(&acc));

    if translated != sql {
        debug!("Translated SQL for {}: {} -> {}", dialect, sql, translated);
    }
    translated
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mssql(sql: &str) -> String {
        translate(sql, DialectTag::SqlServer)
    }

    #[test]
    fn bare_limit_becomes_top() {
        assert_eq!(mssql("SELECT * FROM t LIMIT 10"), "SELECT TOP 10 * FROM t");
        assert_eq!(
            mssql("select name from users order by name limit 5;"),
            "SELECT TOP 5 name from users order by name;"
        );
    }

    #[test]
    fn limit_with_offset_becomes_fetch_next() {
        let out = mssql("SELECT * FROM t LIMIT 10 OFFSET 5");
        assert!(out.contains("OFFSET 5 ROWS FETCH NEXT 10 ROWS ONLY"), "{}", out);
        assert!(!out.to_uppercase().contains("LIMIT"));
    }

    #[test]
    fn existing_top_is_left_alone() {
        let sql = "SELECT TOP 3 * FROM t LIMIT 10";
        assert_eq!(mssql(sql), sql);
    }

    #[test]
    fn identifiers_containing_limit_or_top_are_untouched() {
        let sql = "SELECT credit_limit, stop_id FROM accounts";
        assert_eq!(mssql(sql), sql);
    }

    #[test]
    fn renames_functions() {
        assert_eq!(
            mssql("SELECT NOW(), IFNULL(a, 0), SUBSTR(name, 1, 3) FROM t"),
            "SELECT GETDATE(), ISNULL(a, 0), SUBSTRING(name, 1, 3) FROM t"
        );
        assert_eq!(mssql("SELECT now() FROM t"), "SELECT GETDATE() FROM t");
    }

    #[test]
    fn extract_becomes_date_part_function() {
        assert_eq!(
            mssql("SELECT EXTRACT(YEAR FROM o.created_at), EXTRACT(month FROM o.created_at) FROM o"),
            "SELECT YEAR(o.created_at), month(o.created_at) FROM o"
        );
        let hour = "SELECT EXTRACT(HOUR FROM ts) FROM t";
        assert_eq!(mssql(hour), hour);
    }

    #[test]
    fn only_first_concat_is_rewritten() {
        assert_eq!(
            mssql("SELECT CONCAT(first, ' ', last), CONCAT(city, country) FROM p"),
            "SELECT (first + ' ' + last), CONCAT(city, country) FROM p"
        );
    }

    #[test]
    fn backticks_alternate_into_brackets() {
        assert_eq!(
            mssql("SELECT `order id`, `total` FROM `orders`"),
            "SELECT [order id], [total] FROM [orders]"
        );
    }

    #[test]
    fn rules_apply_in_sequence() {
        assert_eq!(
            mssql("SELECT `name`, IFNULL(`spend`, 0) FROM `customers` WHERE created < NOW() LIMIT 5"),
            "SELECT TOP 5 [name], ISNULL([spend], 0) FROM [customers] WHERE created < GETDATE()"
        );
    }

    #[test]
    fn other_dialects_are_identity() {
        let sql = "SELECT `a`, CONCAT(b, c), NOW() FROM t LIMIT 10 OFFSET 2";
        for dialect in [DialectTag::PostgreSql, DialectTag::MySql, DialectTag::DuckDb] {
            assert_eq!(translate(sql, dialect), sql);
        }
    }

    #[test]
    fn translation_is_idempotent_on_target_dialect_text() {
        for sql in [
            "SELECT * FROM t LIMIT 10",
            "SELECT * FROM t ORDER BY id LIMIT 10 OFFSET 5",
            "SELECT TOP 5 [a] FROM [t] WHERE d < GETDATE()",
        ] {
            let once = mssql(sql);
            assert_eq!(mssql(&once), once);
        }
    }
}
