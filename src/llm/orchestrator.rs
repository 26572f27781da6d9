use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::models::{ERROR_SENTINEL, GenerationRequest, GenerationResult};
use super::prompt::PromptBuilder;
use super::{CompletionProvider, LlmError};
use crate::schema::SchemaSnapshot;
use crate::schema::filter::filter_relevant;
use crate::sql::DialectTag;
use crate::sql::dialect::translate;
use crate::sql::validator::SqlValidator;

const SUGGESTION_REQUEST: &str = "Suggest 3 questions.";
const BLOCKED_EXPLANATION: &str = "The generated query was blocked by security policies.";

/// Outcome of one generation call, including the validation verdict that
/// the caller records in history.
#[derive(Debug, Clone)]
pub struct GenerationReport {
    pub result: GenerationResult,
    pub validation_error: Option<String>,
}

impl GenerationReport {
    pub fn is_successful(&self) -> bool {
        !self.result.is_failure() && self.validation_error.is_none()
    }
}

/// Drives prompt construction, the provider call, response recovery,
/// translation and the propose-time validation pass.
pub struct Orchestrator {
    provider: Arc<dyn CompletionProvider>,
    prompts: PromptBuilder,
    validator: Arc<SqlValidator>,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        validator: Arc<SqlValidator>,
    ) -> Result<Self, LlmError> {
        Ok(Self {
            provider,
            prompts: PromptBuilder::new()?,
            validator,
        })
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationReport, LlmError> {
        let relevant = filter_relevant(&request.schema, &request.question);
        info!(
            "Generating {} SQL with {} of {} tables via {}",
            request.dialect,
            relevant.tables.len(),
            request.schema.tables.len(),
            self.provider.name()
        );

        let system_prompt = self.prompts.generation_prompt(&relevant, request.dialect)?;
        debug!("System prompt:\n{}", system_prompt);

        let raw = self.provider.send(&system_prompt, &request.question).await?;
        let mut result = parse_generation(&raw);

        if result.is_failure() {
            warn!("Could not parse model response into a query");
            return Ok(GenerationReport {
                result,
                validation_error: None,
            });
        }

        result.sql_query = translate(&result.sql_query, request.dialect);

        let outcome = self.validator.validate(&result.sql_query, request.dialect);
        if !outcome.is_valid {
            let reason = outcome.reason.unwrap_or_default();
            result.sql_query = format!("{}: Validation failed. {}", ERROR_SENTINEL, reason);
            result.explanation = BLOCKED_EXPLANATION.to_string();
            return Ok(GenerationReport {
                result,
                validation_error: Some(reason),
            });
        }

        Ok(GenerationReport {
            result,
            validation_error: None,
        })
    }

    pub async fn suggest_questions(
        &self,
        schema: &SchemaSnapshot,
        dialect: DialectTag,
    ) -> Result<Vec<String>, LlmError> {
        let system_prompt = self.prompts.suggestion_prompt(schema, dialect)?;
        let raw = self.provider.send(&system_prompt, SUGGESTION_REQUEST).await?;
        Ok(parse_suggestions(&raw))
    }
}

fn strip_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

/// Slice from the first `open` to the last `close`, or the whole text when
/// no such pair exists.
fn outermost(text: &str, open: char, close: char) -> &str {
    match (text.find(open), text.rfind(close)) {
        (Some(start), Some(end)) if end > start => &text[start..=end],
        _ => text,
    }
}

/// Recovers a [`GenerationResult`] from free-form model output. Never fails:
/// unparsable text becomes an `ERROR` result carrying the diagnosis.
pub fn parse_generation(raw: &str) -> GenerationResult {
    let cleaned = strip_fences(raw);
    let candidate = outermost(&cleaned, '{', '}')
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ");

    match serde_json::from_str::<GenerationResult>(&candidate) {
        Ok(result) => result,
        Err(e) => {
            error!("Failed to parse model response JSON: {}", e);
            GenerationResult::failure(
                ERROR_SENTINEL,
                format!("Failed to parse AI response JSON. Raw: {}. Error: {}", candidate, e),
            )
        }
    }
}

/// Recovers a list of questions. Failures are reported as a single
/// diagnostic entry.
pub fn parse_suggestions(raw: &str) -> Vec<String> {
    let cleaned = strip_fences(raw);
    let candidate = outermost(&cleaned, '[', ']');

    match serde_json::from_str::<Vec<String>>(candidate) {
        Ok(questions) => questions,
        Err(e) => {
            error!("Failed to parse suggestion JSON: {}", e);
            vec![format!(
                "Failed to generate suggestions. Raw: {}. Error: {}",
                candidate, e
            )]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::models::ChartType;
    use crate::schema::{ColumnDescriptor, TableDescriptor};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Replays a canned answer and remembers the prompts it was given.
    struct ScriptedProvider {
        reply: Result<String, (u16, String)>,
        seen: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedProvider {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(status: u16, body: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Err((status, body.to_string())),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionProvider for ScriptedProvider {
        async fn send(&self, system_prompt: &str, user_message: &str) -> Result<String, LlmError> {
            self.seen
                .lock()
                .unwrap()
                .push((system_prompt.to_string(), user_message.to_string()));
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err((status, body)) => Err(LlmError::Upstream {
                    status: *status,
                    body: body.clone(),
                }),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn shop_schema() -> Arc<SchemaSnapshot> {
        Arc::new(SchemaSnapshot::new(vec![
            TableDescriptor::new("dbo", "CUSTOMER")
                .with_column(ColumnDescriptor::new("ID", "int", false).primary_key())
                .with_column(ColumnDescriptor::new("NAME", "nvarchar", true)),
            TableDescriptor::new("dbo", "ORDER")
                .with_column(ColumnDescriptor::new("ID", "int", false).primary_key())
                .with_column(ColumnDescriptor::new("TOTAL_SPEND", "decimal", true)),
            TableDescriptor::new("dbo", "WAREHOUSE")
                .with_column(ColumnDescriptor::new("CITY", "nvarchar", true)),
        ]))
    }

    fn request(question: &str, dialect: DialectTag) -> GenerationRequest {
        GenerationRequest {
            question: question.to_string(),
            schema: shop_schema(),
            dialect,
        }
    }

    fn orchestrator(provider: Arc<ScriptedProvider>) -> Orchestrator {
        Orchestrator::new(provider, Arc::new(SqlValidator::strict())).unwrap()
    }

    #[test]
    fn parses_fenced_json_with_surrounding_prose() {
        let raw = "Sure! Here is the query:\n```json\n{\n  \"sqlQuery\": \"SELECT NAME\nFROM CUSTOMER\",\n  \"explanation\": \"Lists names\",\n  \"visualization\": {\"chartType\": \"Table\"}\n}\n```\nLet me know if you need more.";
        let result = parse_generation(raw);
        assert!(!result.is_failure());
        assert_eq!(result.sql_query, "SELECT NAME FROM CUSTOMER");
        assert_eq!(result.explanation, "Lists names");
    }

    #[test]
    fn unparsable_response_becomes_error_result() {
        let result = parse_generation("I cannot help with that.");
        assert!(result.is_failure());
        assert!(result.explanation.contains("Raw: I cannot help with that."));
        assert!(result.explanation.contains("Error:"));

        let truncated = parse_generation("{\"sqlQuery\": \"SELECT");
        assert!(truncated.is_failure());
    }

    #[test]
    fn suggestions_are_recovered_or_reported() {
        let questions = parse_suggestions("```json\n[\"How many customers?\", \"Top cities?\"]\n```");
        assert_eq!(questions, vec!["How many customers?", "Top cities?"]);

        let failed = parse_suggestions("no idea");
        assert_eq!(failed.len(), 1);
        assert!(failed[0].starts_with("Failed to generate suggestions. Raw: no idea."));
    }

    #[tokio::test]
    async fn generate_translates_and_keeps_visualization() {
        let provider = ScriptedProvider::replying(
            r#"{"sqlQuery": "SELECT NAME, TOTAL_SPEND FROM CUSTOMER JOIN `ORDER` ON CUSTOMER.ID = `ORDER`.ID ORDER BY TOTAL_SPEND DESC LIMIT 5",
                "explanation": "Top spenders",
                "visualization": {"chartType": "Bar", "xAxisColumn": "NAME", "yAxisColumn": "TOTAL_SPEND", "title": "Top 5"}}"#,
        );
        let report = orchestrator(provider.clone())
            .generate(&request("top 5 customers by spend", DialectTag::SqlServer))
            .await
            .unwrap();

        assert!(report.is_successful());
        assert_eq!(
            report.result.sql_query,
            "SELECT TOP 5 NAME, TOTAL_SPEND FROM CUSTOMER JOIN [ORDER] ON CUSTOMER.ID = [ORDER].ID ORDER BY TOTAL_SPEND DESC"
        );
        assert_eq!(report.result.visualization.chart_type, ChartType::Bar);
        assert_eq!(report.result.visualization.y_axis_columns, vec!["TOTAL_SPEND"]);

        let seen = provider.seen.lock().unwrap();
        let (system_prompt, user_message) = &seen[0];
        assert_eq!(user_message, "top 5 customers by spend");
        assert!(system_prompt.contains("TABLE: dbo.CUSTOMER"));
        assert!(system_prompt.contains("TABLE: dbo.ORDER"));
        assert!(!system_prompt.contains("WAREHOUSE"));
    }

    #[tokio::test]
    async fn unsafe_sql_is_replaced_by_sentinel() {
        let provider =
            ScriptedProvider::replying(r#"{"sqlQuery": "SELECT * FROM t; DROP TABLE t;", "explanation": "oops"}"#);
        let report = orchestrator(provider)
            .generate(&request("anything", DialectTag::PostgreSql))
            .await
            .unwrap();

        assert!(!report.is_successful());
        assert!(report.result.is_failure());
        assert!(!report.result.sql_query.contains("DROP TABLE"));
        assert_eq!(
            report.result.sql_query,
            "ERROR: Validation failed. query contains forbidden keyword: DROP"
        );
        assert_eq!(report.result.explanation, BLOCKED_EXPLANATION);
        assert_eq!(
            report.validation_error.as_deref(),
            Some("query contains forbidden keyword: DROP")
        );
    }

    #[tokio::test]
    async fn parse_failure_is_not_an_error() {
        let provider = ScriptedProvider::replying("```sql\nSELECT 1\n```");
        let report = orchestrator(provider)
            .generate(&request("one", DialectTag::DuckDb))
            .await
            .unwrap();
        assert!(report.result.is_failure());
        assert!(report.validation_error.is_none());
        assert!(!report.is_successful());
    }

    #[tokio::test]
    async fn upstream_failure_propagates() {
        let provider = ScriptedProvider::failing(529, "overloaded");
        let err = orchestrator(provider)
            .generate(&request("one", DialectTag::DuckDb))
            .await
            .unwrap_err();
        match err {
            LlmError::Upstream { status, body } => {
                assert_eq!(status, 529);
                assert_eq!(body, "overloaded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn suggest_questions_uses_full_schema() {
        let provider = ScriptedProvider::replying("[\"Which city has the most warehouses?\"]");
        let questions = orchestrator(provider.clone())
            .suggest_questions(&shop_schema(), DialectTag::DuckDb)
            .await
            .unwrap();
        assert_eq!(questions, vec!["Which city has the most warehouses?"]);

        let seen = provider.seen.lock().unwrap();
        assert!(seen[0].0.contains("WAREHOUSE"));
        assert_eq!(seen[0].1, SUGGESTION_REQUEST);
    }
}
