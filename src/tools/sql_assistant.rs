//! Last-resort analytical tool: the SQL model writes one read-only query
//! against a fixed schema description, which is then guarded and executed.

use std::fmt::Write as _;

use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, ValueRef};

use super::catalog::format_number;
use crate::core::config::LlmSettings;
use crate::db::models::{GuidelineCategory, LoanPurposeType, OccupancyType};
use crate::llm::{ChatMessage, ChatRequest, LlmProvider};

const MAX_ROWS: usize = 100;

pub const SELECT_ONLY_MESSAGE: &str =
    "Error: For security reasons, only SELECT queries are allowed.";
pub const SINGLE_STATEMENT_MESSAGE: &str =
    "Error: For security reasons, only a single SELECT statement is allowed.";

fn schema_description() -> String {
    format!(
        r#"
Here are the available tables and their most important columns:

1.  **lender**
    * `id` (text, Primary Key)
    * `name` (text, Unique): The name of the lending institution.

2.  **loan_program**
    * `id` (text, Primary Key)
    * `lender_id` (text, Foreign Key to lender.id): Which lender offers this program.
    * `name` (text): The name of the loan program (e.g., "DSCR Plus", "Non-QM Select").
    * `program_code` (text, Unique): The lender's code for this program.
    * `description` (text): A brief description of the program.
    * `min_loan_amount` (real): The minimum loan amount.
    * `max_loan_amount` (real): The maximum loan amount.

3.  **guideline**
    * `id` (text, Primary Key)
    * `loan_program_id` (text, Foreign Key to loan_program.id): Which program this guideline belongs to.
    * `category` (text): The category of the guideline.
    * `content` (text): The text of the guideline rule.

4.  **eligibility_matrix_rule**
    * `id` (text, Primary Key)
    * `loan_program_id` (text, Foreign Key to loan_program.id): Which program this rule belongs to.
    * `min_loan_amount` (real): Minimum loan amount for this rule.
    * `max_loan_amount` (real): Maximum loan amount for this rule.
    * `min_fico_score` (integer): Minimum FICO score for this rule.
    * `max_fico_score` (integer, nullable): Maximum FICO score for this rule; NULL means no upper bound.
    * `occupancy_type` (text): e.g., 'PRIMARY', 'INVESTMENT'.
    * `loan_purpose` (text): e.g., 'PURCHASE', 'CASH_OUT'.
    * `dscr_value` (text): DSCR value, if applicable.
    * `max_ltv` (real): The **output** max Loan-to-Value (LTV) for this rule.
    * `reserves_months` (integer): The **output** required reserve months.
    * `notes` (text): Specific notes for this rule.

---
**Available Enums:**

* **GuidelineCategory**: [{}]
* **OccupancyType**: [{}]
* **LoanPurposeType**: [{}]
"#,
        GuidelineCategory::valid_names(),
        OccupancyType::valid_names(),
        LoanPurposeType::valid_names(),
    )
}

fn build_prompt(question: &str) -> String {
    format!(
        r#"You are an expert SQLite query writer. Given a database schema and a user's question,
generate a single, valid SQLite query to answer the question.

**Database Schema:**
{schema}

**User Question:**
{question}

**Instructions:**
- **Only output the raw SQL query.**
- Do not include any explanations, markdown, or any text other than the SQL query itself.
- Ensure the query is syntactically correct for SQLite.
- Use table and column names exactly as they appear in the schema.
- When comparing strings (like names), use `LIKE` (case-insensitive in SQLite) or `LOWER(...)`.
- Pay close attention to joins. `loan_program.lender_id` joins to `lender.id`.
`guideline.loan_program_id` joins to `loan_program.id`.
`eligibility_matrix_rule.loan_program_id` joins to `loan_program.id`.

**SQL Query:**"#,
        schema = schema_description(),
        question = question.trim(),
    )
}

/// Removes markdown fences and trailing semicolons.
pub fn clean_sql(raw: &str) -> String {
    let mut sql = raw.trim();
    for fence in ["```sqlite", "```sql", "```SQL", "```"] {
        if let Some(rest) = sql.strip_prefix(fence) {
            sql = rest;
            break;
        }
    }
    if let Some(rest) = sql.trim_end().strip_suffix("```") {
        sql = rest;
    }
    sql.trim().trim_end_matches(';').trim().to_string()
}

const WRITE_KEYWORDS: [&str; 12] = [
    "INSERT", "UPDATE", "DELETE", "REPLACE", "DROP", "ALTER", "CREATE", "ATTACH", "DETACH",
    "PRAGMA", "VACUUM", "REINDEX",
];

fn has_write_keyword(sql: &str) -> bool {
    sql.split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|word| WRITE_KEYWORDS.iter().any(|kw| word.eq_ignore_ascii_case(kw)))
}

/// Text with string literals and quoted identifiers blanked out.
fn strip_quoted(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    for c in sql.chars() {
        match quote {
            Some(q) if c == q => {
                quote = None;
                out.push(' ');
            }
            Some(_) => out.push(' '),
            None if c == '\'' || c == '"' || c == '`' => {
                quote = Some(c);
                out.push(' ');
            }
            None => out.push(c),
        }
    }
    out
}

/// Accepts a single `SELECT` (or `WITH ... SELECT`) statement.
pub fn check_read_only(sql: &str) -> Result<(), &'static str> {
    let bare = strip_quoted(sql);
    let upper = bare.trim_start().to_uppercase();
    let is_select = upper.starts_with("SELECT");
    let is_cte = upper.starts_with("WITH");
    if !is_select && !is_cte {
        return Err(SELECT_ONLY_MESSAGE);
    }
    if bare.contains(';') {
        return Err(SINGLE_STATEMENT_MESSAGE);
    }
    if is_cte && (!upper.contains("SELECT") || has_write_keyword(&bare)) {
        return Err(SELECT_ONLY_MESSAGE);
    }
    Ok(())
}

fn render_value(row: &SqliteRow, idx: usize) -> String {
    if let Ok(raw) = row.try_get_raw(idx) {
        if raw.is_null() {
            return "NULL".to_string();
        }
    }
    if let Ok(v) = row.try_get::<i64, _>(idx) {
        return v.to_string();
    }
    if let Ok(v) = row.try_get::<f64, _>(idx) {
        return format_number(v);
    }
    if let Ok(v) = row.try_get::<String, _>(idx) {
        return v;
    }
    if let Ok(v) = row.try_get::<Vec<u8>, _>(idx) {
        return format!("<{} bytes>", v.len());
    }
    "?".to_string()
}

fn render_rows(rows: &[SqliteRow]) -> String {
    let Some(first) = rows.first() else {
        return "The query executed successfully, but returned no results.".to_string();
    };

    let header = first
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let mut out = String::from("**Query Result:**\n");
    let _ = writeln!(out, "{}", header);
    let _ = writeln!(out, "{}", "-".repeat(header.chars().count().max(3)));
    for row in rows.iter().take(MAX_ROWS) {
        let values: Vec<String> = (0..row.columns().len())
            .map(|idx| render_value(row, idx))
            .collect();
        let _ = writeln!(out, "{}", values.join(", "));
    }
    if rows.len() > MAX_ROWS {
        let _ = writeln!(out, "... ({} more rows)", rows.len() - MAX_ROWS);
    }
    out
}

/// Runs `sql` inside a transaction that is always rolled back.
pub async fn run_read_only(pool: &SqlitePool, sql: &str) -> Result<String, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query(sql).fetch_all(&mut *tx).await;
    tx.rollback().await?;
    Ok(render_rows(&result?))
}

pub async fn query_database(
    pool: &SqlitePool,
    llm: &dyn LlmProvider,
    settings: &LlmSettings,
    question: &str,
) -> String {
    let request = ChatRequest::new(vec![ChatMessage::user(build_prompt(question))])
        .with_settings(settings);
    let raw = match llm.chat(request, &settings.sql_model).await {
        Ok(completion) => completion.content_or_empty().to_string(),
        Err(e) => return format!("Error generating SQL query: {}", e.detail()),
    };

    let sql = clean_sql(&raw);
    if let Err(message) = check_read_only(&sql) {
        tracing::warn!("Rejected generated SQL: {}", sql);
        return message.to_string();
    }
    tracing::debug!("Executing generated SQL: {}", sql);

    match run_read_only(pool, &sql).await {
        Ok(rendered) => rendered,
        Err(e) => format!("Database error: {}. The generated query was: {}", e, sql),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::import::{fixtures::sample_catalog, import_records};
    use crate::db::testing::temp_database;
    use crate::llm::provider::scripted::ScriptedProvider;
    use crate::llm::ChatCompletion;

    #[test]
    fn fences_and_semicolons_are_stripped() {
        assert_eq!(
            clean_sql("```sql\nSELECT name FROM lender;\n```"),
            "SELECT name FROM lender"
        );
        assert_eq!(clean_sql("  SELECT 1;;  "), "SELECT 1");
        assert_eq!(clean_sql("```\nSELECT 2\n```"), "SELECT 2");
    }

    #[test]
    fn guard_accepts_only_single_reads() {
        assert!(check_read_only("SELECT name FROM lender").is_ok());
        assert!(check_read_only("  select count(*) from loan_program").is_ok());
        assert!(check_read_only(
            "WITH p AS (SELECT lender_id FROM loan_program) SELECT COUNT(*) FROM p"
        )
        .is_ok());
        assert!(check_read_only("SELECT * FROM guideline WHERE content LIKE '%; DROP%'").is_ok());

        assert_eq!(
            check_read_only("DELETE FROM lender"),
            Err(SELECT_ONLY_MESSAGE)
        );
        assert_eq!(
            check_read_only("SELECT 1; DROP TABLE lender"),
            Err(SINGLE_STATEMENT_MESSAGE)
        );
        assert_eq!(
            check_read_only("WITH x AS (SELECT 1) DELETE FROM lender"),
            Err(SELECT_ONLY_MESSAGE)
        );
        assert_eq!(check_read_only(""), Err(SELECT_ONLY_MESSAGE));
    }

    #[test]
    fn prompt_lists_schema_and_enums() {
        let prompt = build_prompt("How many lenders?");
        assert!(prompt.contains("eligibility_matrix_rule"));
        assert!(prompt.contains("SECOND_LIEN"));
        assert!(prompt.contains("How many lenders?"));
    }

    #[tokio::test]
    async fn generated_query_is_executed_and_rendered() {
        let (db, _dir) = temp_database().await;
        import_records(&db, &sample_catalog()).await.unwrap();
        let llm = ScriptedProvider::new(vec![Ok(ChatCompletion::text(
            "```sql\nSELECT l.name, COUNT(p.id) AS programs, AVG(p.max_loan_amount) AS avg_max \
             FROM lender l LEFT JOIN loan_program p ON p.lender_id = l.id \
             GROUP BY l.name ORDER BY l.name;\n```",
        ))]);

        let out = query_database(
            db.pool(),
            &llm,
            &LlmSettings::default(),
            "Programs per lender?",
        )
        .await;

        assert!(out.starts_with("**Query Result:**\nname, programs, avg_max\n"));
        assert!(out.contains("ARC Home, 2, 2000000"));
        assert!(out.contains("NQM Funding, 1, NULL"));
        assert_eq!(llm.request_count(), 1);
    }

    #[tokio::test]
    async fn writes_are_refused_and_errors_reported() {
        let (db, _dir) = temp_database().await;
        import_records(&db, &sample_catalog()).await.unwrap();
        let llm = ScriptedProvider::new(vec![
            Ok(ChatCompletion::text("DELETE FROM lender")),
            Ok(ChatCompletion::text("SELECT nope FROM lender")),
            Ok(ChatCompletion::text("SELECT id FROM lender WHERE name = 'Missing'")),
        ]);
        let settings = LlmSettings::default();

        let refused = query_database(db.pool(), &llm, &settings, "delete all").await;
        assert_eq!(refused, SELECT_ONLY_MESSAGE);
        assert_eq!(db.catalog().lender_names().await.unwrap().len(), 2);

        let broken = query_database(db.pool(), &llm, &settings, "broken").await;
        assert!(broken.starts_with("Database error: "));
        assert!(broken.ends_with("The generated query was: SELECT nope FROM lender"));

        let empty = query_database(db.pool(), &llm, &settings, "missing").await;
        assert_eq!(
            empty,
            "The query executed successfully, but returned no results."
        );
    }
}
