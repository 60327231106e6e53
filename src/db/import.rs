//! Loads the structured lender catalog from a JSON export.
//!
//! Rows whose id already exists are skipped, so importing the same file twice
//! is a no-op. Everything runs in one transaction.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use sqlx::{Sqlite, Transaction};

use super::models::{GuidelineCategory, LoanPurposeType, OccupancyType};
use super::Database;
use crate::core::errors::ApiError;

#[derive(Debug, Default, Deserialize)]
pub struct ImportFile {
    #[serde(default, rename = "lender")]
    pub lenders: Vec<LenderRecord>,
    #[serde(default)]
    pub loan_programs: Vec<ProgramRecord>,
}

#[derive(Debug, Deserialize)]
pub struct LenderRecord {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramRecord {
    pub id: String,
    pub lender_id: String,
    pub name: String,
    pub program_code: Option<String>,
    pub description: Option<String>,
    pub source_document: Option<String>,
    pub min_loan_amount: Option<f64>,
    pub max_loan_amount: Option<f64>,
    #[serde(default, rename = "eligibility_matrix_rules")]
    pub rules: Vec<RuleRecord>,
    #[serde(default)]
    pub guidelines: Vec<GuidelineRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    pub id: String,
    pub loan_program_id: Option<String>,
    pub min_loan_amount: f64,
    pub max_loan_amount: f64,
    pub min_fico_score: i64,
    pub max_fico_score: Option<i64>,
    pub occupancy_type: String,
    pub loan_purpose: String,
    pub dscr_value: Option<String>,
    pub max_ltv: f64,
    pub reserves_months: Option<i64>,
    pub notes: Option<String>,
    pub source_reference: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuidelineRecord {
    pub id: String,
    pub loan_program_id: Option<String>,
    pub category: String,
    pub content: String,
    pub source_reference: Option<String>,
}

/// Inserted and skipped row counts per table.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub lenders: usize,
    pub programs: usize,
    pub rules: usize,
    pub guidelines: usize,
    pub skipped: usize,
}

impl fmt::Display for ImportReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} lenders, {} programs, {} eligibility rules, {} guidelines imported ({} already present)",
            self.lenders, self.programs, self.rules, self.guidelines, self.skipped
        )
    }
}

pub async fn import_data(db: &Database, json_path: &Path) -> Result<ImportReport, ApiError> {
    let contents = tokio::fs::read_to_string(json_path).await.map_err(|e| {
        ApiError::BadRequest(format!("Failed to read {}: {}", json_path.display(), e))
    })?;
    let data: ImportFile = serde_json::from_str(&contents).map_err(|e| {
        ApiError::BadRequest(format!("Invalid import file {}: {}", json_path.display(), e))
    })?;

    import_records(db, &data).await
}

pub async fn import_records(db: &Database, data: &ImportFile) -> Result<ImportReport, ApiError> {
    let mut tx = db.pool().begin().await?;
    let mut report = ImportReport::default();

    // Any error drops `tx` before commit, which rolls the whole import back.
    for lender in &data.lenders {
        if exists(&mut tx, "lender", &lender.id).await? {
            report.skipped += 1;
            continue;
        }
        sqlx::query("INSERT INTO lender (id, name) VALUES (?, ?)")
            .bind(&lender.id)
            .bind(&lender.name)
            .execute(&mut *tx)
            .await
            .map_err(|e| insert_error("lender", &lender.id, e))?;
        report.lenders += 1;
    }

    for program in &data.loan_programs {
        if exists(&mut tx, "loan_program", &program.id).await? {
            report.skipped += 1;
            continue;
        }
        sqlx::query(
            "INSERT INTO loan_program (id, lender_id, name, program_code, description, \
             source_document, min_loan_amount, max_loan_amount) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&program.id)
        .bind(&program.lender_id)
        .bind(&program.name)
        .bind(&program.program_code)
        .bind(&program.description)
        .bind(&program.source_document)
        .bind(program.min_loan_amount)
        .bind(program.max_loan_amount)
        .execute(&mut *tx)
        .await
        .map_err(|e| insert_error("loan_program", &program.id, e))?;
        report.programs += 1;
    }

    for program in &data.loan_programs {
        for rule in &program.rules {
            if exists(&mut tx, "eligibility_matrix_rule", &rule.id).await? {
                report.skipped += 1;
                continue;
            }
            let occupancy: OccupancyType = rule
                .occupancy_type
                .parse()
                .map_err(|e| record_error("eligibility rule", &rule.id, e))?;
            let purpose: LoanPurposeType = rule
                .loan_purpose
                .parse()
                .map_err(|e| record_error("eligibility rule", &rule.id, e))?;
            let program_id = rule.loan_program_id.as_deref().unwrap_or(&program.id);

            sqlx::query(
                "INSERT INTO eligibility_matrix_rule (id, loan_program_id, min_loan_amount, \
                 max_loan_amount, min_fico_score, max_fico_score, occupancy_type, loan_purpose, \
                 dscr_value, max_ltv, reserves_months, notes, source_reference) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&rule.id)
            .bind(program_id)
            .bind(rule.min_loan_amount)
            .bind(rule.max_loan_amount)
            .bind(rule.min_fico_score)
            .bind(rule.max_fico_score)
            .bind(occupancy.as_str())
            .bind(purpose.as_str())
            .bind(&rule.dscr_value)
            .bind(rule.max_ltv)
            .bind(rule.reserves_months)
            .bind(&rule.notes)
            .bind(&rule.source_reference)
            .execute(&mut *tx)
            .await
            .map_err(|e| insert_error("eligibility_matrix_rule", &rule.id, e))?;
            report.rules += 1;
        }
    }

    for program in &data.loan_programs {
        for guideline in &program.guidelines {
            if exists(&mut tx, "guideline", &guideline.id).await? {
                report.skipped += 1;
                continue;
            }
            let category: GuidelineCategory = guideline
                .category
                .parse()
                .map_err(|e| record_error("guideline", &guideline.id, e))?;
            let program_id = guideline
                .loan_program_id
                .as_deref()
                .unwrap_or(&program.id);

            sqlx::query(
                "INSERT INTO guideline (id, loan_program_id, category, content, source_reference) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&guideline.id)
            .bind(program_id)
            .bind(category.as_str())
            .bind(&guideline.content)
            .bind(&guideline.source_reference)
            .execute(&mut *tx)
            .await
            .map_err(|e| insert_error("guideline", &guideline.id, e))?;
            report.guidelines += 1;
        }
    }

    tx.commit().await?;
    tracing::info!("Import finished: {}", report);
    Ok(report)
}

async fn exists(
    tx: &mut Transaction<'_, Sqlite>,
    table: &'static str,
    id: &str,
) -> Result<bool, ApiError> {
    // `table` only ever comes from the fixed names above.
    let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)", table);
    let found: bool = sqlx::query_scalar(&sql)
        .bind(id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(found)
}

fn insert_error(table: &str, id: &str, err: sqlx::Error) -> ApiError {
    ApiError::BadRequest(format!("Failed to insert {} '{}': {}", table, id, err))
}

fn record_error<E: fmt::Display>(kind: &str, id: &str, err: E) -> ApiError {
    ApiError::BadRequest(format!("Invalid {} '{}': {}", kind, id, err))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::ImportFile;

    /// Two lenders, three programs, a handful of matrix rules and guidelines.
    pub fn sample_catalog() -> ImportFile {
        serde_json::from_value(serde_json::json!({
            "lender": [
                { "id": "l-arc", "name": "ARC Home" },
                { "id": "l-nqm", "name": "NQM Funding" }
            ],
            "loan_programs": [
                {
                    "id": "p-dscr",
                    "lenderId": "l-arc",
                    "name": "DSCR Plus",
                    "programCode": "ARC-DSCR",
                    "description": "Investor cash flow program",
                    "minLoanAmount": 100000,
                    "maxLoanAmount": 2000000,
                    "eligibility_matrix_rules": [
                        {
                            "id": "r1", "loanProgramId": "p-dscr",
                            "minLoanAmount": 100000, "maxLoanAmount": 1000000,
                            "minFicoScore": 700, "maxFicoScore": 850,
                            "occupancyType": "INVESTMENT", "loanPurpose": "PURCHASE",
                            "dscrValue": ">=1.00", "maxLtv": 80, "reservesMonths": 6,
                            "notes": "Short-term rentals allowed"
                        },
                        {
                            "id": "r2", "loanProgramId": "p-dscr",
                            "minLoanAmount": 100000, "maxLoanAmount": 1000000,
                            "minFicoScore": 660, "maxFicoScore": 699,
                            "occupancyType": "INVESTMENT", "loanPurpose": "PURCHASE",
                            "maxLtv": 70, "reservesMonths": 6
                        },
                        {
                            "id": "r3", "loanProgramId": "p-dscr",
                            "minLoanAmount": 100000, "maxLoanAmount": 1500000,
                            "minFicoScore": 720,
                            "occupancyType": "INVESTMENT", "loanPurpose": "CASH_OUT",
                            "maxLtv": 75
                        }
                    ],
                    "guidelines": [
                        { "id": "g1", "loanProgramId": "p-dscr", "category": "RESERVES",
                          "content": "6 months PITIA required." },
                        { "id": "g2", "loanProgramId": "p-dscr", "category": "LOAN_PURPOSE",
                          "content": "Purchase, rate/term and cash-out allowed." },
                        { "id": "g3", "loanProgramId": "p-dscr", "category": "GIFT_FUNDS",
                          "content": "Gift funds not allowed." }
                    ]
                },
                {
                    "id": "p-flex",
                    "lenderId": "l-nqm",
                    "name": "Flex Select",
                    "programCode": "NQM-FLEX",
                    "description": "Full doc and alt doc non-QM",
                    "guidelines": [
                        { "id": "g4", "category": "DTI", "content": "Max DTI 50%." }
                    ]
                },
                {
                    "id": "p-arc-prime",
                    "lenderId": "l-arc",
                    "name": "Prime Jumbo",
                    "programCode": "ARC-JUMBO",
                    "description": "Jumbo loans to 3MM"
                }
            ]
        }))
        .unwrap()
    }
}
