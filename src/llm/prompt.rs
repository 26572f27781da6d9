use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::json;

use crate::llm::LlmError;
use crate::schema::SchemaSnapshot;
use crate::sql::DialectTag;

const GENERATE_TEMPLATE: &str = r#"You are an expert SQL assistant. Your goal is to convert natural language questions into accurate SQL queries for {{ dialect }}.

Schema:
{{ schema }}
Examples:
{% for example in examples %}
User: "{{ example.question }}"
Assistant: {{ example.answer }}
{% endfor %}
Rules:
1. Generate a valid SQL query for {{ dialect }}.
2. The query must be a single SELECT statement only. No INSERT, UPDATE, DELETE, DROP, etc.
3. CRITICAL: USE ONLY THE EXACT TABLE AND COLUMN NAMES PROVIDED IN THE SCHEMA ABOVE.
4. Always use the format TABLE_NAME.COLUMN_NAME when referencing columns to avoid ambiguity.
5. If a column name is not listed under a specific table in the schema, DO NOT USE IT for that table.
6. Double-check that every column you use exists in the table you're querying.
7. Do not add SQL comments.
8. Use {{ dialect }} syntax:
{% for hint in hints %}   - {{ hint }}
{% endfor %}9. Provide a brief explanation of the query.
10. Recommend the best visualization for the result (Table, Bar, Line, Pie).
   - If the result is time-series, suggest 'Line'.
   - If comparing categories, suggest 'Bar'.
   - If parts of a whole, suggest 'Pie'.
   - Otherwise, default to 'Table'.
   - Identify the X-axis (category/time) and Y-axis (value) columns.

Output Format:
Return ONLY a JSON object with the following structure:
{
    "sqlQuery": "SELECT ...",
    "explanation": "...",
    "visualization": {
        "chartType": "Bar",
        "xAxisColumn": "ColumnName",
        "yAxisColumn": "ColumnName",
        "title": "Chart Title"
    }
}
"#;

const SUGGEST_TEMPLATE: &str = r#"You are a data analyst. Based on the {{ dialect }} database schema below, suggest {{ count }} interesting questions that a user might ask to explore the data.

Schema:
{{ schema }}
Output Format:
Return ONLY a JSON array of strings:
["Question 1?", "Question 2?", "Question 3?"]
"#;

/// Number of questions requested by the suggestion prompt.
pub const SUGGESTION_COUNT: usize = 3;

#[derive(Debug, Serialize)]
struct FewShotExample {
    question: &'static str,
    answer: String,
}

fn few_shot_examples() -> Vec<FewShotExample> {
    vec![
        FewShotExample {
            question: "Show me the top 5 customers by total order amount in the last year",
            answer: json!({
                "sqlQuery": "SELECT CUSTOMER.FIRST_NAME, CUSTOMER.LAST_NAME, SUM(ORDERS.TOTAL_AMOUNT) AS TotalSpent FROM CUSTOMER JOIN ORDERS ON CUSTOMER.ID = ORDERS.CUSTOMER_ID WHERE EXTRACT(YEAR FROM ORDERS.ORDER_DATE) >= EXTRACT(YEAR FROM NOW()) - 1 GROUP BY CUSTOMER.FIRST_NAME, CUSTOMER.LAST_NAME ORDER BY TotalSpent DESC LIMIT 5",
                "explanation": "Joins customers with their orders, keeps orders from the last year, sums the amount per customer and returns the five biggest spenders.",
                "visualization": {
                    "chartType": "Bar",
                    "xAxisColumn": "FIRST_NAME",
                    "yAxisColumn": "TotalSpent",
                    "title": "Top 5 Customers by Spending (Last Year)"
                }
            })
            .to_string(),
        },
        FewShotExample {
            question: "How many orders were completed each month this year?",
            answer: json!({
                "sqlQuery": "SELECT EXTRACT(MONTH FROM ORDERS.FINISHED_DATE) AS Month, COUNT(*) AS OrderCount FROM ORDERS WHERE ORDERS.IS_FINISHED = 1 AND EXTRACT(YEAR FROM ORDERS.FINISHED_DATE) = EXTRACT(YEAR FROM NOW()) GROUP BY EXTRACT(MONTH FROM ORDERS.FINISHED_DATE) ORDER BY Month",
                "explanation": "Counts finished orders per month of the current year.",
                "visualization": {
                    "chartType": "Line",
                    "xAxisColumn": "Month",
                    "yAxisColumn": "OrderCount",
                    "title": "Monthly Completed Orders (Current Year)"
                }
            })
            .to_string(),
        },
    ]
}

/// Renders the system prompts sent to the completion provider.
pub struct PromptBuilder {
    env: Environment<'static>,
}

impl PromptBuilder {
    pub fn new() -> Result<Self, LlmError> {
        let mut env = Environment::new();
        env.add_template("generate_sql.txt", GENERATE_TEMPLATE)?;
        env.add_template("suggest_questions.txt", SUGGEST_TEMPLATE)?;
        Ok(Self { env })
    }

    pub fn generation_prompt(
        &self,
        schema: &SchemaSnapshot,
        dialect: DialectTag,
    ) -> Result<String, LlmError> {
        let template = self.env.get_template("generate_sql.txt")?;
        let rendered = template.render(context! {
            dialect => dialect.display_name(),
            schema => schema.to_prompt_text(),
            examples => few_shot_examples(),
            hints => dialect.syntax_hints(),
        })?;
        Ok(rendered)
    }

    pub fn suggestion_prompt(
        &self,
        schema: &SchemaSnapshot,
        dialect: DialectTag,
    ) -> Result<String, LlmError> {
        let template = self.env.get_template("suggest_questions.txt")?;
        let rendered = template.render(context! {
            dialect => dialect.display_name(),
            schema => schema.to_prompt_text(),
            count => SUGGESTION_COUNT,
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDescriptor, TableDescriptor};

    fn schema() -> SchemaSnapshot {
        SchemaSnapshot::new(vec![
            TableDescriptor::new("dbo", "CUSTOMER")
                .with_column(ColumnDescriptor::new("ID", "int", false).primary_key())
                .with_column(ColumnDescriptor::new("FIRST_NAME", "nvarchar", true)),
        ])
    }

    #[test]
    fn generation_prompt_embeds_dialect_schema_and_rules() {
        let prompt = PromptBuilder::new()
            .unwrap()
            .generation_prompt(&schema(), DialectTag::SqlServer)
            .unwrap();

        assert!(prompt.contains("accurate SQL queries for SQL Server."));
        assert!(prompt.contains("TABLE: dbo.CUSTOMER"));
        assert!(prompt.contains("  - FIRST_NAME (nvarchar, NULL)"));
        assert!(prompt.contains("   - Use TOP N instead of LIMIT N"));
        assert!(prompt.contains("single SELECT statement only"));
        assert!(prompt.contains("\"sqlQuery\":\"SELECT CUSTOMER.FIRST_NAME"));
        assert!(prompt.contains("Return ONLY a JSON object"));
    }

    #[test]
    fn hints_follow_the_dialect() {
        let builder = PromptBuilder::new().unwrap();
        let prompt = builder.generation_prompt(&schema(), DialectTag::PostgreSql).unwrap();
        assert!(prompt.contains("for PostgreSQL."));
        assert!(prompt.contains("INTERVAL '1 year'"));
        assert!(!prompt.contains("Use TOP N"));
    }

    #[test]
    fn suggestion_prompt_asks_for_a_json_array() {
        let prompt = PromptBuilder::new()
            .unwrap()
            .suggestion_prompt(&schema(), DialectTag::DuckDb)
            .unwrap();
        assert!(prompt.contains("suggest 3 interesting questions"));
        assert!(prompt.contains("TABLE: dbo.CUSTOMER"));
        assert!(prompt.contains("JSON array of strings"));
    }
}
