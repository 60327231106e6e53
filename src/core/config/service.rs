use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::{json, Map, Value};

use super::settings::Settings;
use super::validation::validate_settings;
use crate::core::errors::ApiError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 8] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 2] = ["max_tokens", "tokens"];

/// Environment variable -> (settings path, numeric?)
const ENV_BINDINGS: [(&str, &[&str], bool); 20] = [
    ("DATABASE_URL", &["database_url"], false),
    ("HOST", &["server", "host"], false),
    ("PORT", &["server", "port"], true),
    ("GROQ_API_KEY", &["llm", "groq_api_key"], false),
    ("GROQ_BASE_URL", &["llm", "base_url"], false),
    ("CHAT_MODEL", &["llm", "chat_model"], false),
    ("SQL_MODEL", &["llm", "sql_model"], false),
    ("LLM_TEMPERATURE", &["llm", "temperature"], true),
    ("EMBEDDING_BACKEND", &["embeddings", "backend"], false),
    ("EMBEDDING_MODEL", &["embeddings", "model"], false),
    ("EMBEDDING_API_URL", &["embeddings", "api_url"], false),
    ("EMBEDDING_API_KEY", &["embeddings", "api_key"], false),
    ("VSTORE_DIR", &["vector_store", "dir"], false),
    ("COLLECTION_NAME", &["vector_store", "collection_name"], false),
    ("PDF_DIR", &["ingest", "pdf_dir"], false),
    ("DATA_FILE", &["ingest", "data_file"], false),
    ("CHUNK_SIZE", &["ingest", "chunk_size"], true),
    ("CHUNK_OVERLAP", &["ingest", "chunk_overlap"], true),
    ("LOG_LEVEL", &["logging", "level"], false),
    ("LOG_DIR", &["logging", "log_dir"], false),
];

/// Resolves [`Settings`] from defaults, an optional YAML file and the environment.
#[derive(Debug, Clone)]
pub struct ConfigService {
    config_path: PathBuf,
}

impl ConfigService {
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// `MORTGAGE_CONFIG_PATH` if set, else `./config.yml`.
    pub fn from_env() -> Self {
        let path = env::var("MORTGAGE_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.yml"));
        Self::new(path)
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Loads `.env`, then merges file and process environment over the defaults.
    pub fn load(&self) -> Result<Settings, ApiError> {
        dotenv::dotenv().ok();
        let vars: HashMap<String, String> = env::vars().collect();
        self.load_with_env(&vars)
    }

    pub fn load_with_env(&self, vars: &HashMap<String, String>) -> Result<Settings, ApiError> {
        let defaults = serde_json::to_value(Settings::default()).map_err(ApiError::internal)?;
        let file_config = load_yaml_file(&self.config_path)?;
        let env_config = env_overlay(vars);

        let merged = deep_merge(&deep_merge(&defaults, &file_config), &env_config);
        let settings: Settings = serde_json::from_value(merged)
            .map_err(|e| ApiError::BadRequest(format!("Invalid configuration: {}", e)))?;

        validate_settings(&settings)?;
        Ok(settings)
    }

    pub fn redacted(settings: &Settings) -> Value {
        let value = serde_json::to_value(settings).unwrap_or(Value::Null);
        redact_sensitive_values(&value)
    }
}

fn load_yaml_file(path: &Path) -> Result<Value, ApiError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ApiError::internal(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let value = serde_yaml::from_str::<Value>(&contents).map_err(|e| {
        ApiError::BadRequest(format!("Invalid YAML in {}: {}", path.display(), e))
    })?;

    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(ApiError::BadRequest(format!(
            "{} must contain a mapping at the top level",
            path.display()
        ))),
    }
}

fn env_overlay(vars: &HashMap<String, String>) -> Value {
    let mut overlay = Value::Object(Map::new());
    for (key, path, numeric) in ENV_BINDINGS {
        let Some(raw) = vars.get(key) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let value = if numeric {
            raw.parse::<u64>()
                .map(|n| json!(n))
                .or_else(|_| raw.parse::<f64>().map(|n| json!(n)))
                .unwrap_or_else(|_| json!(raw))
        } else {
            json!(raw)
        };
        ensure_object_path(&mut overlay, path, value);
    }
    overlay
}

fn ensure_object_path(config: &mut Value, path: &[&str], value: Value) {
    if path.is_empty() {
        return;
    }

    let mut current = config;
    for (index, key) in path.iter().enumerate() {
        if index == path.len() - 1 {
            if let Some(map) = current.as_object_mut() {
                map.insert(key.to_string(), value);
            }
            return;
        }

        if !current.get(*key).map(|v| v.is_object()).unwrap_or(false) {
            let Some(map) = current.as_object_mut() else {
                return;
            };
            map.insert((*key).to_string(), Value::Object(Map::new()));
        }

        let Some(next) = current.get_mut(*key) else {
            return;
        };
        current = next;
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::EmbeddingBackend;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn missing_file() -> ConfigService {
        ConfigService::new(PathBuf::from("/nonexistent/mortgage-chat/config.yml"))
    }

    #[test]
    fn deep_merge_merges_objects_and_overrides_scalars() {
        let base = json!({
            "a": 1,
            "b": { "c": 2, "d": 3 },
            "arr": [1, 2]
        });
        let override_value = json!({
            "b": { "c": 99 },
            "arr": [3],
            "e": "x"
        });

        let merged = deep_merge(&base, &override_value);

        assert_eq!(
            merged,
            json!({
                "a": 1,
                "b": { "c": 99, "d": 3 },
                "arr": [3],
                "e": "x"
            })
        );
    }

    #[test]
    fn env_only_configuration_uses_defaults() {
        let settings = missing_file()
            .load_with_env(&vars(&[
                ("DATABASE_URL", "sqlite://mortgage.db"),
                ("GROQ_API_KEY", "gsk_test"),
            ]))
            .unwrap();

        assert_eq!(settings.database_url, "sqlite://mortgage.db");
        assert_eq!(settings.llm.groq_api_key.as_deref(), Some("gsk_test"));
        assert_eq!(settings.server.port, 8085);
        assert_eq!(settings.ingest.chunk_size, 1500);
        assert_eq!(settings.ingest.chunk_overlap, 150);
        assert_eq!(settings.agent.fuzzy_threshold, 85);
    }

    #[test]
    fn environment_overrides_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yml");
        fs::write(
            &path,
            "database_url: sqlite://from-file.db\nserver:\n  port: 9000\n  host: 0.0.0.0\nembeddings:\n  backend: hashed\n",
        )
        .unwrap();

        let settings = ConfigService::new(path)
            .load_with_env(&vars(&[("PORT", "8100")]))
            .unwrap();

        assert_eq!(settings.database_url, "sqlite://from-file.db");
        assert_eq!(settings.server.port, 8100);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.embeddings.backend, EmbeddingBackend::Hashed);
    }

    #[test]
    fn non_numeric_port_is_rejected() {
        let err = missing_file()
            .load_with_env(&vars(&[
                ("DATABASE_URL", "sqlite://mortgage.db"),
                ("PORT", "eighty"),
            ]))
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn redaction_hides_api_keys_only() {
        let mut settings = Settings::default();
        settings.database_url = "sqlite://x.db".to_string();
        settings.llm.groq_api_key = Some("gsk_secret".to_string());
        settings.llm.max_tokens = Some(512);

        let redacted = ConfigService::redacted(&settings);

        assert_eq!(redacted["llm"]["groq_api_key"], json!("****"));
        assert_eq!(redacted["llm"]["max_tokens"], json!(512));
        assert_eq!(redacted["embeddings"]["api_key"], Value::Null);
        assert_eq!(redacted["database_url"], json!("sqlite://x.db"));
    }
}
