//! Tools the agent can call. Every tool returns text; failures are rendered
//! as text too so the model can explain them to the user.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::core::config::{AgentSettings, LlmSettings};
use crate::core::errors::ApiError;
use crate::db::Database;
use crate::llm::{Embedder, LlmProvider, ToolDefinition};
use crate::rag::VectorStore;

pub mod catalog;
pub mod documents;
pub mod fuzzy;
pub mod sql_assistant;

pub const GET_AVAILABLE_LENDERS: &str = "get_available_lenders";
pub const GET_LOAN_PROGRAMS_BY_LENDER: &str = "get_loan_programs_by_lender";
pub const GET_PROGRAM_GUIDELINES: &str = "get_program_guidelines";
pub const FIND_ELIGIBILITY_RULES: &str = "find_eligibility_rules";
pub const QUERY_DATABASE_ASSISTANT: &str = "query_database_assistant";
pub const QUERY_DOCUMENT_VECTOR_STORE: &str = "query_document_vector_store";

/// Document search backend; absent when the vector store could not be opened.
#[derive(Clone)]
pub struct DocumentSearch {
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub collection: String,
}

#[derive(Clone)]
pub struct Toolbox {
    db: Database,
    llm: Arc<dyn LlmProvider>,
    llm_settings: LlmSettings,
    documents: Option<DocumentSearch>,
    fuzzy_threshold: u8,
    document_k: usize,
}

impl Toolbox {
    pub fn new(
        db: Database,
        llm: Arc<dyn LlmProvider>,
        llm_settings: LlmSettings,
        agent_settings: &AgentSettings,
        documents: Option<DocumentSearch>,
    ) -> Self {
        Self {
            db,
            llm,
            llm_settings,
            documents,
            fuzzy_threshold: agent_settings.fuzzy_threshold,
            document_k: agent_settings.document_k,
        }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        definitions()
    }

    /// Runs a tool call. Unknown tools, bad arguments and tool errors all
    /// come back as text for the model.
    pub async fn execute(&self, name: &str, arguments: &str) -> String {
        let args: Value = if arguments.trim().is_empty() {
            json!({})
        } else {
            match serde_json::from_str(arguments) {
                Ok(v) => v,
                Err(e) => return format!("Error: invalid arguments for {}: {}", name, e),
            }
        };

        tracing::info!("Executing tool {} with {}", name, args);
        match self.dispatch(name, args).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", name, e);
                format!("{}: {}", error_prefix(name), e.detail())
            }
        }
    }

    async fn dispatch(&self, name: &str, args: Value) -> Result<String, ApiError> {
        let catalog_store = self.db.catalog();
        match name {
            GET_AVAILABLE_LENDERS => catalog::available_lenders(&catalog_store).await,
            GET_LOAN_PROGRAMS_BY_LENDER => {
                let args: catalog::LenderArgs = parse_args(name, args)?;
                catalog::programs_by_lender(&catalog_store, &args).await
            }
            GET_PROGRAM_GUIDELINES => {
                let args: catalog::GuidelineArgs = parse_args(name, args)?;
                catalog::program_guidelines(&catalog_store, &args, self.fuzzy_threshold).await
            }
            FIND_ELIGIBILITY_RULES => {
                let args: catalog::EligibilityArgs = parse_args(name, args)?;
                catalog::eligibility_rules(&catalog_store, &args, self.fuzzy_threshold).await
            }
            QUERY_DATABASE_ASSISTANT => {
                let question = args
                    .get("question")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .trim()
                    .to_string();
                if question.is_empty() {
                    return Err(ApiError::BadRequest("question missing".to_string()));
                }
                Ok(sql_assistant::query_database(
                    self.db.pool(),
                    self.llm.as_ref(),
                    &self.llm_settings,
                    &question,
                )
                .await)
            }
            QUERY_DOCUMENT_VECTOR_STORE => {
                let args: documents::DocumentArgs = parse_args(name, args)?;
                let Some(docs) = &self.documents else {
                    return Ok(documents::STORE_UNAVAILABLE.to_string());
                };
                documents::search_documents(
                    docs.store.as_ref(),
                    docs.embedder.as_ref(),
                    &docs.collection,
                    &args,
                    self.document_k,
                )
                .await
            }
            other => Err(ApiError::BadRequest(format!("Unknown tool: {}", other))),
        }
    }
}

fn parse_args<T: DeserializeOwned>(name: &str, args: Value) -> Result<T, ApiError> {
    serde_json::from_value(args)
        .map_err(|e| ApiError::BadRequest(format!("invalid arguments for {}: {}", name, e)))
}

fn error_prefix(name: &str) -> &'static str {
    match name {
        GET_AVAILABLE_LENDERS => "Error retrieving lenders",
        GET_LOAN_PROGRAMS_BY_LENDER => "Error retrieving loan programs",
        GET_PROGRAM_GUIDELINES => "Error retrieving guidelines",
        FIND_ELIGIBILITY_RULES => "Error finding eligibility rules",
        QUERY_DATABASE_ASSISTANT => "Error querying database",
        QUERY_DOCUMENT_VECTOR_STORE => "Error querying vector store",
        _ => "Error",
    }
}

fn tool(name: &str, description: &str, parameters: Value) -> ToolDefinition {
    ToolDefinition {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

/// JSON-schema definitions advertised to the model.
pub fn definitions() -> Vec<ToolDefinition> {
    use crate::db::models::{GuidelineCategory, LoanPurposeType, OccupancyType};

    let categories: Vec<&str> = GuidelineCategory::ALL.iter().map(|c| c.as_str()).collect();
    let occupancies: Vec<&str> = OccupancyType::ALL.iter().map(|c| c.as_str()).collect();
    let purposes: Vec<&str> = LoanPurposeType::ALL.iter().map(|c| c.as_str()).collect();

    vec![
        tool(
            GET_AVAILABLE_LENDERS,
            "Retrieves a list of all available lender names from the database. \
             Use this when the user asks \"who are your lenders?\" or \"list all lenders\".",
            json!({"type": "object", "properties": {}}),
        ),
        tool(
            GET_LOAN_PROGRAMS_BY_LENDER,
            "Retrieves all loan programs offered by a specific lender. \
             Use this when the user asks \"what programs does [Lender Name] have?\"",
            json!({
                "type": "object",
                "properties": {
                    "lender_name": {"type": "string", "description": "The name of the lender to search for."}
                },
                "required": ["lender_name"]
            }),
        ),
        tool(
            GET_PROGRAM_GUIDELINES,
            "Retrieves specific guidelines for a given loan program, optionally filtered by category. \
             This tool uses fuzzy matching, so the program_name does not need to be exact.",
            json!({
                "type": "object",
                "properties": {
                    "program_name": {"type": "string", "description": "The name of the loan program (e.g., \"DSCR Plus\")."},
                    "category": {"type": "string", "enum": categories, "description": "Optional guideline category."}
                },
                "required": ["program_name"]
            }),
        ),
        tool(
            FIND_ELIGIBILITY_RULES,
            "Finds matching eligibility matrix rules (e.g., max LTV, reserves) for a loan program \
             based on a set of criteria. This tool uses fuzzy matching, so the program_name does not need to be exact.",
            json!({
                "type": "object",
                "properties": {
                    "program_name": {"type": "string", "description": "The name of the loan program (e.g., \"Non-QM Select\")."},
                    "fico_score": {"type": "integer", "description": "The borrower's FICO score."},
                    "loan_amount": {"type": "number", "description": "The loan amount."},
                    "occupancy": {"type": "string", "enum": occupancies},
                    "loan_purpose": {"type": "string", "enum": purposes}
                },
                "required": ["program_name"]
            }),
        ),
        tool(
            QUERY_DATABASE_ASSISTANT,
            "Use this tool ONLY as a last resort for complex analytical questions that the other tools cannot answer, \
             e.g. \"What is the average max LTV for all programs from 'Lender X'?\" or \
             \"Count all programs that allow 'INVESTMENT' occupancy.\" \
             The input must be a complete, natural language question; the tool generates and executes a read-only SQL query.",
            json!({
                "type": "object",
                "properties": {
                    "question": {"type": "string", "description": "The full natural language question from the user."}
                },
                "required": ["question"]
            }),
        ),
        tool(
            QUERY_DOCUMENT_VECTOR_STORE,
            "Searches the full-text guideline documents for detailed context, definitions and specific guidelines. \
             Use it after other tools to fetch the original detailed text, or for open-ended policy questions \
             (e.g., \"What is the policy on gift funds?\").",
            json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The specific question or search term to find in the documents."},
                    "k": {"type": "integer", "description": "The number of document chunks to return. Defaults to 5."}
                },
                "required": ["query"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::import::{fixtures::sample_catalog, import_records};
    use crate::db::testing::temp_database;
    use crate::llm::provider::scripted::ScriptedProvider;

    async fn toolbox(documents: Option<DocumentSearch>) -> (Toolbox, tempfile::TempDir) {
        let (db, dir) = temp_database().await;
        import_records(&db, &sample_catalog()).await.unwrap();
        let toolbox = Toolbox::new(
            db,
            Arc::new(ScriptedProvider::default()),
            LlmSettings::default(),
            &AgentSettings::default(),
            documents,
        );
        (toolbox, dir)
    }

    #[test]
    fn every_tool_is_advertised_once() {
        let names: Vec<String> = definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                GET_AVAILABLE_LENDERS,
                GET_LOAN_PROGRAMS_BY_LENDER,
                GET_PROGRAM_GUIDELINES,
                FIND_ELIGIBILITY_RULES,
                QUERY_DATABASE_ASSISTANT,
                QUERY_DOCUMENT_VECTOR_STORE,
            ]
        );
    }

    #[tokio::test]
    async fn dispatches_by_name() {
        let (toolbox, _dir) = toolbox(None).await;
        let out = toolbox.execute(GET_AVAILABLE_LENDERS, "").await;
        assert!(out.starts_with("Available Lenders:"));

        let out = toolbox
            .execute(
                FIND_ELIGIBILITY_RULES,
                r#"{"program_name": "DSCR Plus", "fico_score": 710}"#,
            )
            .await;
        assert!(out.starts_with("Found 1 matching eligibility rule(s)"));
    }

    #[tokio::test]
    async fn bad_calls_become_error_text() {
        let (toolbox, _dir) = toolbox(None).await;

        let unknown = toolbox.execute("launch_rocket", "{}").await;
        assert_eq!(unknown, "Error: Unknown tool: launch_rocket");

        let malformed = toolbox.execute(GET_PROGRAM_GUIDELINES, "{not json").await;
        assert!(malformed.starts_with("Error: invalid arguments for get_program_guidelines"));

        let missing = toolbox.execute(GET_LOAN_PROGRAMS_BY_LENDER, "{}").await;
        assert!(missing.starts_with("Error retrieving loan programs: invalid arguments"));
    }

    #[tokio::test]
    async fn document_search_without_store_reports_unavailable() {
        let (toolbox, _dir) = toolbox(None).await;
        let out = toolbox
            .execute(QUERY_DOCUMENT_VECTOR_STORE, r#"{"query": "gift funds"}"#)
            .await;
        assert_eq!(out, documents::STORE_UNAVAILABLE);
    }
}
