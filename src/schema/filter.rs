use super::{SchemaSnapshot, TableDescriptor};
use tracing::debug;

/// Tables sent when nothing in the question matches.
pub const FALLBACK_TABLE_COUNT: usize = 20;
/// Upper bound on matched tables sent to the model.
pub const MAX_RELEVANT_TABLES: usize = 40;

const DELIMITERS: &[char] = &[',', '.', '?', '!', '(', ')', '[', ']', '{', '}'];

/// Uppercased question words longer than two characters.
pub fn keywords(question: &str) -> Vec<String> {
    question
        .split(|c: char| c.is_whitespace() || DELIMITERS.contains(&c))
        .filter(|token| token.chars().count() > 2)
        .map(str::to_uppercase)
        .collect()
}

fn overlaps(name: &str, keywords: &[String]) -> bool {
    let name = name.to_uppercase();
    keywords
        .iter()
        .any(|kw| name.contains(kw.as_str()) || kw.contains(name.as_str()))
}

fn is_relevant(table: &TableDescriptor, keywords: &[String]) -> bool {
    overlaps(&table.name, keywords) || table.columns.iter().any(|c| overlaps(&c.name, keywords))
}

/// Narrows `schema` to the tables whose name or columns share a word with
/// `question`. Never returns an empty schema when the input has tables.
pub fn filter_relevant(schema: &SchemaSnapshot, question: &str) -> SchemaSnapshot {
    let keywords = keywords(question);

    let mut tables: Vec<TableDescriptor> = schema
        .tables
        .iter()
        .filter(|table| is_relevant(table, &keywords))
        .cloned()
        .collect();

    if tables.is_empty() {
        debug!("No table matched {:?}, falling back to the first {}", keywords, FALLBACK_TABLE_COUNT);
        tables = schema.tables.iter().take(FALLBACK_TABLE_COUNT).cloned().collect();
    } else if tables.len() > MAX_RELEVANT_TABLES {
        debug!("{} tables matched, keeping the first {}", tables.len(), MAX_RELEVANT_TABLES);
        tables.truncate(MAX_RELEVANT_TABLES);
    }

    SchemaSnapshot::new(tables)
}
