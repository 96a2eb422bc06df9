use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub openai_api_base: Option<String>,
    pub chat_model: String,
    pub transcription_model: String,
    pub transcription_language: String,
    /// Vocabulary hint passed along with every recording.
    pub transcription_prompt: Option<String>,
    pub tts_model: String,
    pub tts_voice: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub max_tool_iterations: usize,
    pub github_token: Option<String>,
    pub tavily_api_key: Option<String>,
    pub searxng_url: Option<String>,
    pub search_max_results: usize,
    pub log_level: Level,
    /// Directory that may contain a `system_prompt.md` override.
    pub prompts_path: Option<PathBuf>,
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn string_var(name: &str, default: &str) -> String {
    optional_var(name).unwrap_or_else(|| default.to_string())
}

fn parsed_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), format!("'{}': {}", raw, e))),
        None => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str = string_var("BIND_ADDRESS", "0.0.0.0:8000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = optional_var("OPENAI_API_KEY")
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;

        let temperature: f32 = parsed_var("TEMPERATURE", 0.7)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue(
                "TEMPERATURE".to_string(),
                format!("{} is outside 0.0..=2.0", temperature),
            ));
        }

        let max_tool_iterations: usize = parsed_var("MAX_TOOL_ITERATIONS", 3)?;
        if max_tool_iterations == 0 {
            return Err(ConfigError::InvalidValue(
                "MAX_TOOL_ITERATIONS".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let log_level_str = string_var("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            openai_api_key,
            openai_api_base: optional_var("OPENAI_API_BASE"),
            chat_model: string_var("GPT_MODEL", "gpt-4"),
            transcription_model: string_var("TRANSCRIPTION_MODEL", "whisper-1"),
            transcription_language: string_var("TRANSCRIPTION_LANGUAGE", "en"),
            transcription_prompt: optional_var("TRANSCRIPTION_PROMPT"),
            tts_model: string_var("TTS_MODEL", "tts-1-hd"),
            tts_voice: string_var("TTS_VOICE", "shimmer"),
            max_tokens: parsed_var("MAX_TOKENS", 300)?,
            temperature,
            max_tool_iterations,
            github_token: optional_var("GITHUB_TOKEN"),
            tavily_api_key: optional_var("TAVILY_API_KEY"),
            searxng_url: optional_var("SEARXNG_URL"),
            search_max_results: parsed_var("SEARCH_MAX_RESULTS", 3)?,
            log_level,
            prompts_path: optional_var("PROMPTS_PATH").map(PathBuf::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tracing::Level;

    const ALL_VARS: &[&str] = &[
        "BIND_ADDRESS",
        "OPENAI_API_KEY",
        "OPENAI_API_BASE",
        "GPT_MODEL",
        "TRANSCRIPTION_MODEL",
        "TRANSCRIPTION_LANGUAGE",
        "TRANSCRIPTION_PROMPT",
        "TTS_MODEL",
        "TTS_VOICE",
        "MAX_TOKENS",
        "TEMPERATURE",
        "MAX_TOOL_ITERATIONS",
        "GITHUB_TOKEN",
        "TAVILY_API_KEY",
        "SEARXNG_URL",
        "SEARCH_MAX_RESULTS",
        "RUST_LOG",
        "PROMPTS_PATH",
    ];

    fn clear_env_vars() {
        unsafe {
            for var in ALL_VARS {
                env::remove_var(var);
            }
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("OPENAI_API_KEY", "test-openai-key");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8000");
        assert_eq!(config.openai_api_key, "test-openai-key");
        assert_eq!(config.openai_api_base, None);
        assert_eq!(config.chat_model, "gpt-4");
        assert_eq!(config.transcription_model, "whisper-1");
        assert_eq!(config.transcription_language, "en");
        assert_eq!(config.transcription_prompt, None);
        assert_eq!(config.tts_model, "tts-1-hd");
        assert_eq!(config.tts_voice, "shimmer");
        assert_eq!(config.max_tokens, 300);
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.max_tool_iterations, 3);
        assert_eq!(config.github_token, None);
        assert_eq!(config.search_max_results, 3);
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.prompts_path, None);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:8080");
            env::set_var("OPENAI_API_KEY", "custom-openai-key");
            env::set_var("OPENAI_API_BASE", "http://localhost:11434/v1");
            env::set_var("GPT_MODEL", "gpt-4o-mini");
            env::set_var("TRANSCRIPTION_PROMPT", "Jarvis, GitHub, Rust");
            env::set_var("TTS_VOICE", "nova");
            env::set_var("MAX_TOKENS", "512");
            env::set_var("TEMPERATURE", "0.2");
            env::set_var("MAX_TOOL_ITERATIONS", "5");
            env::set_var("GITHUB_TOKEN", "ghp_test");
            env::set_var("TAVILY_API_KEY", "tvly-test");
            env::set_var("SEARXNG_URL", "http://localhost:8888");
            env::set_var("SEARCH_MAX_RESULTS", "5");
            env::set_var("RUST_LOG", "debug");
            env::set_var("PROMPTS_PATH", "/custom/prompts");
        }

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "127.0.0.1:8080");
        assert_eq!(
            config.openai_api_base.as_deref(),
            Some("http://localhost:11434/v1")
        );
        assert_eq!(config.chat_model, "gpt-4o-mini");
        assert_eq!(
            config.transcription_prompt.as_deref(),
            Some("Jarvis, GitHub, Rust")
        );
        assert_eq!(config.tts_voice, "nova");
        assert_eq!(config.max_tokens, 512);
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.max_tool_iterations, 5);
        assert_eq!(config.github_token.as_deref(), Some("ghp_test"));
        assert_eq!(config.tavily_api_key.as_deref(), Some("tvly-test"));
        assert_eq!(config.searxng_url.as_deref(), Some("http://localhost:8888"));
        assert_eq!(config.search_max_results, 5);
        assert_eq!(config.log_level, Level::DEBUG);
        assert_eq!(config.prompts_path, Some(PathBuf::from("/custom/prompts")));
    }

    #[test]
    #[serial]
    fn test_config_invalid_bind_address() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "not-a-valid-address");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "BIND_ADDRESS"),
            _ => panic!("Expected InvalidValue for BIND_ADDRESS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_log_level() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("RUST_LOG", "not-a-level");
        }

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "RUST_LOG"),
            _ => panic!("Expected InvalidValue for RUST_LOG"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_numbers() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("MAX_TOKENS", "lots");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "MAX_TOKENS"),
            _ => panic!("Expected InvalidValue for MAX_TOKENS"),
        }

        unsafe {
            env::remove_var("MAX_TOKENS");
            env::set_var("MAX_TOOL_ITERATIONS", "0");
        }
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "MAX_TOOL_ITERATIONS"),
            _ => panic!("Expected InvalidValue for MAX_TOOL_ITERATIONS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_missing_openai_key() {
        clear_env_vars();

        let err = Config::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "OPENAI_API_KEY"),
            _ => panic!("Expected MissingVar for OPENAI_API_KEY"),
        }
    }
}
