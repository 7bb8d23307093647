use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use tendero_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    let fields: Vec<(&str, String, &str)> = vec![
        ("database.url", config.database.url.clone(), "TENDERO_DATABASE_URL"),
        (
            "database.max_connections",
            config.database.max_connections.to_string(),
            "TENDERO_DATABASE_MAX_CONNECTIONS",
        ),
        ("database.timeout_secs", config.database.timeout_secs.to_string(), "TENDERO_DATABASE_TIMEOUT_SECS"),
        ("llm.provider", config.llm.provider.as_str().to_string(), "TENDERO_LLM_PROVIDER"),
        ("llm.model", config.llm.model.clone(), "TENDERO_LLM_MODEL"),
        (
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            "TENDERO_LLM_BASE_URL",
        ),
        ("llm.api_key", llm_api_key.to_string(), "TENDERO_LLM_API_KEY"),
        (
            "llm.classify_timeout_secs",
            config.llm.classify_timeout_secs.to_string(),
            "TENDERO_LLM_CLASSIFY_TIMEOUT_SECS",
        ),
        (
            "llm.generate_timeout_secs",
            config.llm.generate_timeout_secs.to_string(),
            "TENDERO_LLM_GENERATE_TIMEOUT_SECS",
        ),
        (
            "retrieval.vector_enabled",
            config.retrieval.vector_enabled.to_string(),
            "TENDERO_RETRIEVAL_VECTOR_ENABLED",
        ),
        ("retrieval.top_k", config.retrieval.top_k.to_string(), "TENDERO_RETRIEVAL_TOP_K"),
        ("retrieval.min_results", config.retrieval.min_results.to_string(), "TENDERO_RETRIEVAL_MIN_RESULTS"),
        (
            "assistant.default_tone",
            config.assistant.default_tone.clone(),
            "TENDERO_ASSISTANT_DEFAULT_TONE",
        ),
        (
            "assistant.history_window",
            config.assistant.history_window.to_string(),
            "TENDERO_ASSISTANT_HISTORY_WINDOW",
        ),
        ("server.bind_address", config.server.bind_address.clone(), "TENDERO_SERVER_BIND_ADDRESS"),
        ("server.port", config.server.port.to_string(), "TENDERO_SERVER_PORT"),
        ("logging.level", config.logging.level.clone(), "TENDERO_LOGGING_LEVEL"),
        ("logging.format", format!("{:?}", config.logging.format), "TENDERO_LOGGING_FORMAT"),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_key) in fields {
        lines.push(render_line(
            key,
            &value,
            field_source(key, Some(env_key), config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    }
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("tendero.toml"), PathBuf::from("config/tendero.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, field_source};

    #[test]
    fn file_source_is_reported_for_keys_present_in_the_document() {
        let doc = "[llm]\nmodel = \"llama3.1\"\n".parse::<Value>().expect("toml");
        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.provider"));
        assert_eq!(
            field_source("llm.model", None, Some(&doc), Some(std::path::Path::new("tendero.toml"))),
            "file (tendero.toml)"
        );
        assert_eq!(field_source("llm.provider", None, Some(&doc), None), "default");
    }
}
