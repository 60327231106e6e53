use super::settings::{EmbeddingBackend, Settings};
use crate::core::errors::ApiError;

pub fn validate_settings(settings: &Settings) -> Result<(), ApiError> {
    if settings.database_url.trim().is_empty() {
        return Err(config_error("database_url", "DATABASE_URL must be set"));
    }

    if settings.server.port == 0 {
        return Err(config_error("server.port", "must be between 1 and 65535"));
    }
    if settings.server.host.trim().is_empty() {
        return Err(config_error("server.host", "must not be empty"));
    }

    validate_range("llm.temperature", settings.llm.temperature, 0.0, 2.0)?;
    validate_u64("llm.request_timeout_secs", settings.llm.request_timeout_secs, 1, 3_600)?;
    if settings.llm.chat_model.trim().is_empty() {
        return Err(config_error("llm.chat_model", "must not be empty"));
    }

    if settings.embeddings.backend == EmbeddingBackend::Openai
        && settings.embeddings.api_url.trim().is_empty()
    {
        return Err(config_error(
            "embeddings.api_url",
            "required when embeddings.backend is 'openai'",
        ));
    }
    validate_u64(
        "embeddings.dimensions",
        settings.embeddings.dimensions as u64,
        8,
        65_536,
    )?;
    validate_u64(
        "embeddings.batch_size",
        settings.embeddings.batch_size as u64,
        1,
        4_096,
    )?;

    if settings.vector_store.collection_name.trim().is_empty() {
        return Err(config_error("vector_store.collection_name", "must not be empty"));
    }

    validate_u64(
        "agent.max_iterations",
        settings.agent.max_iterations as u64,
        1,
        100,
    )?;
    if settings.agent.history_limit < 0 {
        return Err(config_error("agent.history_limit", "must not be negative"));
    }
    if settings.agent.summary_window < 1 {
        return Err(config_error("agent.summary_window", "must be at least 1"));
    }
    if settings.agent.fuzzy_threshold > 100 {
        return Err(config_error("agent.fuzzy_threshold", "must be between 0 and 100"));
    }
    validate_u64("agent.document_k", settings.agent.document_k as u64, 1, 100)?;

    validate_u64(
        "ingest.chunk_size",
        settings.ingest.chunk_size as u64,
        50,
        1_000_000,
    )?;
    if settings.ingest.chunk_overlap >= settings.ingest.chunk_size {
        return Err(config_error(
            "ingest.chunk_overlap",
            "must be smaller than ingest.chunk_size",
        ));
    }

    Ok(())
}

fn validate_u64(path: &str, value: u64, min: u64, max: u64) -> Result<(), ApiError> {
    if value < min || value > max {
        return Err(config_error(
            path,
            &format!("must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

fn validate_range(path: &str, value: f64, min: f64, max: f64) -> Result<(), ApiError> {
    if !value.is_finite() || value < min || value > max {
        return Err(config_error(
            path,
            &format!("must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

fn config_error(path: &str, message: &str) -> ApiError {
    ApiError::BadRequest(format!("Invalid config at {}: {}", path, message))
}
