use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::models::{
    EligibilityRule, Guideline, GuidelineCategory, LoanProgram, LoanPurposeType, OccupancyType,
};
use crate::core::errors::ApiError;

/// A loan program together with the lender offering it.
#[derive(Debug, Clone)]
pub struct ProgramSummary {
    pub lender_name: String,
    pub name: String,
    pub program_code: Option<String>,
    pub description: Option<String>,
}

/// Optional scenario inputs narrowing the eligibility matrix.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    pub fico_score: Option<i64>,
    pub loan_amount: Option<f64>,
    pub occupancy: Option<OccupancyType>,
    pub loan_purpose: Option<LoanPurposeType>,
}

/// Read-only queries over lenders, programs, rules and guidelines.
#[derive(Clone)]
pub struct CatalogStore {
    pool: SqlitePool,
}

impl CatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn lender_names(&self) -> Result<Vec<String>, ApiError> {
        let names = sqlx::query_scalar("SELECT name FROM lender ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        Ok(names)
    }

    /// Programs whose lender name contains `lender_name`, case-insensitively.
    pub async fn programs_by_lender(
        &self,
        lender_name: &str,
    ) -> Result<Vec<ProgramSummary>, ApiError> {
        let pattern = format!("%{}%", escape_like(lender_name.trim()));
        let rows = sqlx::query(
            "SELECT l.name AS lender_name, p.name, p.program_code, p.description \
             FROM loan_program p JOIN lender l ON l.id = p.lender_id \
             WHERE l.name LIKE ? ESCAPE '\\' \
             ORDER BY p.name",
        )
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<ProgramSummary, ApiError> {
                Ok(ProgramSummary {
                    lender_name: row.try_get("lender_name")?,
                    name: row.try_get("name")?,
                    program_code: row.try_get("program_code")?,
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }

    /// `(id, name)` for every program, used for fuzzy name resolution.
    pub async fn program_names(&self) -> Result<Vec<(String, String)>, ApiError> {
        let rows = sqlx::query("SELECT id, name FROM loan_program")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| -> Result<(String, String), ApiError> {
                Ok((row.try_get("id")?, row.try_get("name")?))
            })
            .collect()
    }

    pub async fn program(&self, program_id: &str) -> Result<Option<LoanProgram>, ApiError> {
        let row = sqlx::query(
            "SELECT id, lender_id, name, program_code, description, source_document, \
                    min_loan_amount, max_loan_amount \
             FROM loan_program WHERE id = ?",
        )
        .bind(program_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_program).transpose()
    }

    /// Guidelines of a program grouped by category (declaration order).
    pub async fn guidelines(
        &self,
        program_id: &str,
        category: Option<GuidelineCategory>,
    ) -> Result<Vec<Guideline>, ApiError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, loan_program_id, category, content, source_reference \
             FROM guideline WHERE loan_program_id = ",
        );
        builder.push_bind(program_id);
        if let Some(category) = category {
            builder.push(" AND category = ").push_bind(category.as_str());
        }
        builder.push(" ORDER BY rowid");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let mut guidelines = rows
            .iter()
            .map(row_to_guideline)
            .collect::<Result<Vec<_>, _>>()?;
        guidelines.sort_by_key(|g| g.category);
        Ok(guidelines)
    }

    /// Matrix rules of a program matching every filter that is set.
    ///
    /// A rule without a maximum FICO score is open-ended upwards.
    pub async fn eligibility_rules(
        &self,
        program_id: &str,
        filter: &RuleFilter,
    ) -> Result<Vec<EligibilityRule>, ApiError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, loan_program_id, min_loan_amount, max_loan_amount, min_fico_score, \
                    max_fico_score, occupancy_type, loan_purpose, dscr_value, max_ltv, \
                    reserves_months, notes, source_reference \
             FROM eligibility_matrix_rule WHERE loan_program_id = ",
        );
        builder.push_bind(program_id);

        if let Some(fico) = filter.fico_score {
            builder
                .push(" AND min_fico_score <= ")
                .push_bind(fico)
                .push(" AND (max_fico_score IS NULL OR max_fico_score >= ")
                .push_bind(fico)
                .push(")");
        }
        if let Some(amount) = filter.loan_amount {
            builder
                .push(" AND min_loan_amount <= ")
                .push_bind(amount)
                .push(" AND max_loan_amount >= ")
                .push_bind(amount);
        }
        if let Some(occupancy) = filter.occupancy {
            builder
                .push(" AND occupancy_type = ")
                .push_bind(occupancy.as_str());
        }
        if let Some(purpose) = filter.loan_purpose {
            builder
                .push(" AND loan_purpose = ")
                .push_bind(purpose.as_str());
        }
        builder.push(" ORDER BY min_fico_score DESC, min_loan_amount ASC, rowid ASC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(row_to_rule).collect()
    }
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn row_to_program(row: &SqliteRow) -> Result<LoanProgram, ApiError> {
    Ok(LoanProgram {
        id: row.try_get("id")?,
        lender_id: row.try_get("lender_id")?,
        name: row.try_get("name")?,
        program_code: row.try_get("program_code")?,
        description: row.try_get("description")?,
        source_document: row.try_get("source_document")?,
        min_loan_amount: row.try_get("min_loan_amount")?,
        max_loan_amount: row.try_get("max_loan_amount")?,
    })
}

fn row_to_guideline(row: &SqliteRow) -> Result<Guideline, ApiError> {
    let category: String = row.try_get("category")?;
    Ok(Guideline {
        id: row.try_get("id")?,
        loan_program_id: row.try_get("loan_program_id")?,
        category: category.parse().map_err(ApiError::internal)?,
        content: row.try_get("content")?,
        source_reference: row.try_get("source_reference")?,
    })
}

fn row_to_rule(row: &SqliteRow) -> Result<EligibilityRule, ApiError> {
    let occupancy: String = row.try_get("occupancy_type")?;
    let purpose: String = row.try_get("loan_purpose")?;
    Ok(EligibilityRule {
        id: row.try_get("id")?,
        loan_program_id: row.try_get("loan_program_id")?,
        min_loan_amount: row.try_get("min_loan_amount")?,
        max_loan_amount: row.try_get("max_loan_amount")?,
        min_fico_score: row.try_get("min_fico_score")?,
        max_fico_score: row.try_get("max_fico_score")?,
        occupancy_type: occupancy.parse().map_err(ApiError::internal)?,
        loan_purpose: purpose.parse().map_err(ApiError::internal)?,
        dscr_value: row.try_get("dscr_value")?,
        max_ltv: row.try_get("max_ltv")?,
        reserves_months: row.try_get("reserves_months")?,
        notes: row.try_get("notes")?,
        source_reference: row.try_get("source_reference")?,
    })
}
