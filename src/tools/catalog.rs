//! Structured lookups over the lender catalog, rendered as markdown-ish text
//! for the model.

use std::fmt::Write as _;

use serde::Deserialize;

use super::fuzzy;
use crate::core::errors::ApiError;
use crate::db::models::{GuidelineCategory, LoanProgram, LoanPurposeType, OccupancyType};
use crate::db::{CatalogStore, RuleFilter};

#[derive(Debug, Deserialize)]
pub struct LenderArgs {
    pub lender_name: String,
}

#[derive(Debug, Deserialize)]
pub struct GuidelineArgs {
    pub program_name: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct EligibilityArgs {
    pub program_name: String,
    #[serde(default)]
    pub fico_score: Option<i64>,
    #[serde(default)]
    pub loan_amount: Option<f64>,
    #[serde(default)]
    pub occupancy: Option<String>,
    #[serde(default)]
    pub loan_purpose: Option<String>,
}

pub async fn available_lenders(catalog: &CatalogStore) -> Result<String, ApiError> {
    let lenders = catalog.lender_names().await?;
    if lenders.is_empty() {
        return Ok("No lenders found in the database.".to_string());
    }
    Ok(format!("Available Lenders:\n- {}", lenders.join("\n- ")))
}

pub async fn programs_by_lender(
    catalog: &CatalogStore,
    args: &LenderArgs,
) -> Result<String, ApiError> {
    let lender_name = args.lender_name.trim();
    let programs = catalog.programs_by_lender(lender_name).await?;
    if programs.is_empty() {
        return Ok(format!(
            "No loan programs found for a lender matching '{}'.",
            lender_name
        ));
    }

    let mut out = format!("Loan Programs for lender '{}':\n", lender_name);
    for program in &programs {
        let _ = write!(
            out,
            "\n- **{}** (Code: {})\n  Lender: {}\n  Description: {}\n",
            program.name,
            program.program_code.as_deref().unwrap_or("N/A"),
            program.lender_name,
            program.description.as_deref().unwrap_or("N/A"),
        );
    }
    Ok(out)
}

/// Resolves a possibly misspelled program name to the stored program.
pub async fn resolve_program(
    catalog: &CatalogStore,
    program_name: &str,
    threshold: u8,
) -> Result<Option<LoanProgram>, ApiError> {
    let programs = catalog.program_names().await?;
    let Some((program_id, matched, score)) = fuzzy::best_match(program_name, &programs, threshold)
    else {
        return Ok(None);
    };
    tracing::debug!(
        "Matched program '{}' to '{}' (score {})",
        program_name,
        matched,
        score
    );
    catalog.program(program_id).await
}

pub async fn program_guidelines(
    catalog: &CatalogStore,
    args: &GuidelineArgs,
    threshold: u8,
) -> Result<String, ApiError> {
    let Some(program) = resolve_program(catalog, &args.program_name, threshold).await? else {
        return Ok(format!(
            "Could not find a loan program matching '{}'.",
            args.program_name
        ));
    };

    let category_filter = non_empty(&args.category);
    let category = match category_filter {
        Some(raw) => match raw.parse::<GuidelineCategory>() {
            Ok(category) => Some(category),
            Err(_) => {
                return Ok(format!(
                    "Invalid category '{}'. Valid categories are: {}",
                    raw,
                    GuidelineCategory::valid_names()
                ))
            }
        },
        None => None,
    };

    let guidelines = catalog.guidelines(&program.id, category).await?;
    if guidelines.is_empty() {
        let filter_msg = category_filter
            .map(|c| format!(" in category '{}'", c))
            .unwrap_or_default();
        return Ok(format!(
            "No guidelines found for program '{}'{}.",
            program.name, filter_msg
        ));
    }

    let mut out = format!("Guidelines for Program: {}\n", program.name);
    let mut current = None;
    for guideline in &guidelines {
        if current != Some(guideline.category) {
            current = Some(guideline.category);
            let _ = write!(out, "\n**--- {} ---**\n", guideline.category);
        }
        let _ = writeln!(out, "- {}", guideline.content);
    }
    Ok(out)
}

pub async fn eligibility_rules(
    catalog: &CatalogStore,
    args: &EligibilityArgs,
    threshold: u8,
) -> Result<String, ApiError> {
    let Some(program) = resolve_program(catalog, &args.program_name, threshold).await? else {
        return Ok(format!(
            "Could not find a loan program matching '{}'.",
            args.program_name
        ));
    };

    let mut filters_applied = vec![format!("Program: {}", program.name)];
    let mut filter = RuleFilter::default();

    if let Some(fico) = args.fico_score {
        filter.fico_score = Some(fico);
        filters_applied.push(format!("FICO >= {}", fico));
    }
    if let Some(amount) = args.loan_amount {
        filter.loan_amount = Some(amount);
        filters_applied.push(format!("Loan Amount: {}", format_number(amount)));
    }
    if let Some(raw) = non_empty(&args.occupancy) {
        match raw.parse::<OccupancyType>() {
            Ok(occupancy) => {
                filter.occupancy = Some(occupancy);
                filters_applied.push(format!("Occupancy: {}", occupancy));
            }
            Err(_) => {
                return Ok(format!(
                    "Invalid occupancy '{}'. Valid types are: {}",
                    raw,
                    OccupancyType::valid_names()
                ))
            }
        }
    }
    if let Some(raw) = non_empty(&args.loan_purpose) {
        match raw.parse::<LoanPurposeType>() {
            Ok(purpose) => {
                filter.loan_purpose = Some(purpose);
                filters_applied.push(format!("Loan Purpose: {}", purpose));
            }
            Err(_) => {
                return Ok(format!(
                    "Invalid loan purpose '{}'. Valid types are: {}",
                    raw,
                    LoanPurposeType::valid_names()
                ))
            }
        }
    }

    let rules = catalog.eligibility_rules(&program.id, &filter).await?;
    if rules.is_empty() {
        return Ok(format!(
            "No eligibility rules found matching the criteria:\n{}",
            filters_applied.join("\n")
        ));
    }

    let mut out = format!(
        "Found {} matching eligibility rule(s) for:\n{}\n",
        rules.len(),
        filters_applied.join("\n")
    );
    for (i, rule) in rules.iter().enumerate() {
        let _ = write!(out, "\n**--- Match {} ---**\n", i + 1);
        let _ = writeln!(out, "- **Max LTV**: {}%", format_number(rule.max_ltv));
        match rule.reserves_months {
            Some(months) => {
                let _ = writeln!(out, "- **Reserves**: {} months", months);
            }
            None => {
                let _ = writeln!(out, "- **Reserves**: N/A");
            }
        }
        if let Some(notes) = rule.notes.as_deref().filter(|n| !n.is_empty()) {
            let _ = writeln!(out, "- **Notes**: {}", notes);
        }

        let mut context = Vec::new();
        let fico = match rule.max_fico_score {
            Some(max) => format!("FICO: {}-{}", rule.min_fico_score, max),
            None => format!("FICO: {}+", rule.min_fico_score),
        };
        context.push(fico);
        context.push(format!(
            "Loan Amount: {}-{}",
            format_number(rule.min_loan_amount),
            format_number(rule.max_loan_amount)
        ));
        context.push(format!("Occupancy: {}", rule.occupancy_type));
        context.push(format!("Purpose: {}", rule.loan_purpose));
        if let Some(dscr) = rule.dscr_value.as_deref().filter(|d| !d.is_empty()) {
            context.push(format!("DSCR: {}", dscr));
        }
        let _ = writeln!(out, "- *Rule Context*: {}", context.join("; "));
    }
    Ok(out)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Whole numbers without a fractional part, everything else as-is.
pub(crate) fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}
