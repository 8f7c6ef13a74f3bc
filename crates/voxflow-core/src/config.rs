//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level Voxflow configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<ServicesConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<ServerConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// External speech/language service clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stt: Option<ServiceConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm: Option<ServiceConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts: Option<ServiceConfig>,
}

/// Configuration for a single external service endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Provider id: "groq", "openai", "elevenlabs", "ollama".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl ServiceConfig {
    /// Resolve the API key: check `api_key` first, then `api_key_env`.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// VAD and turn-taking thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// RMS energy threshold for speech detection.
    #[serde(default = "default_vad_threshold")]
    pub vad_threshold: f64,

    /// Consecutive voiced frames required to open a turn.
    #[serde(default = "default_min_voiced_frames")]
    pub min_voiced_frames: usize,

    /// Milliseconds of silence required to close a turn.
    #[serde(default = "default_close_silence_ms")]
    pub close_silence_ms: u64,

    /// Maximum turn length in milliseconds.
    #[serde(default = "default_max_turn_ms")]
    pub max_turn_ms: u64,

    /// Audio retained from before speech onset, in milliseconds.
    #[serde(default = "default_pre_roll_ms")]
    pub pre_roll_ms: u64,

    /// Turns shorter than this skip transcription entirely.
    #[serde(default = "default_min_turn_ms")]
    pub min_turn_ms: u64,
}

fn default_vad_threshold() -> f64 {
    300.0
}
fn default_min_voiced_frames() -> usize {
    6 // 120ms of speech to open
}
fn default_close_silence_ms() -> u64 {
    400
}
fn default_max_turn_ms() -> u64 {
    30_000
}
fn default_pre_roll_ms() -> u64 {
    300
}
fn default_min_turn_ms() -> u64 {
    200
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vad_threshold: default_vad_threshold(),
            min_voiced_frames: default_min_voiced_frames(),
            close_silence_ms: default_close_silence_ms(),
            max_turn_ms: default_max_turn_ms(),
            pre_roll_ms: default_pre_roll_ms(),
            min_turn_ms: default_min_turn_ms(),
        }
    }
}

/// Session behavior — instructions, greeting, generation limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Server bind configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
}

fn default_port() -> u16 {
    8080
}

/// Structured logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// "plain" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Extra per-target filter directives (e.g. "voxflow_session=debug").
    #[serde(default)]
    pub filters: Vec<String>,
}

fn default_log_format() -> String {
    "plain".to_string()
}

/// Resolve a secret: prefer the direct value, fall back to the named env var.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();
    re.replace_all(input, |caps: &regex::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_default()
    })
    .into_owned()
}

impl Config {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    ///
    /// A missing file yields the default config.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::VoxflowError::Io)?;
        let substituted = substitute_env_vars(&raw);

        let config: Config = json5::from_str(&substituted)
            .map_err(|e| crate::error::VoxflowError::Config(e.to_string()))?;

        Ok(config)
    }

    /// Default config file path: `~/.voxflow/config.json`.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Server port: config value, then the `PORT` env var, then 8080.
    pub fn server_port(&self) -> u16 {
        if let Some(server) = &self.server {
            return server.port;
        }
        std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(default_port)
    }

    pub fn server_bind(&self) -> String {
        self.server
            .as_ref()
            .and_then(|s| s.bind.clone())
            .unwrap_or_else(|| "0.0.0.0".to_string())
    }

    pub fn pipeline(&self) -> PipelineConfig {
        self.pipeline.clone().unwrap_or_default()
    }

    pub fn stt_model(&self) -> String {
        self.services
            .as_ref()
            .and_then(|s| s.stt.as_ref())
            .and_then(|s| s.model.clone())
            .unwrap_or_else(|| "whisper-large-v3-turbo".to_string())
    }

    pub fn llm_model(&self) -> String {
        self.services
            .as_ref()
            .and_then(|s| s.llm.as_ref())
            .and_then(|s| s.model.clone())
            .unwrap_or_else(|| "llama-3.3-70b-versatile".to_string())
    }

    pub fn language(&self) -> String {
        self.services
            .as_ref()
            .and_then(|s| s.stt.as_ref())
            .and_then(|s| s.language.clone())
            .unwrap_or_else(|| "en".to_string())
    }

    pub fn instructions(&self) -> String {
        self.session
            .as_ref()
            .and_then(|s| s.instructions.clone())
            .unwrap_or_else(|| {
                "You are a friendly, concise voice assistant. \
                 Answer in short, clear sentences."
                    .to_string()
            })
    }

    pub fn greeting(&self) -> String {
        self.session
            .as_ref()
            .and_then(|s| s.greeting.clone())
            .unwrap_or_else(|| "Talk in english.Greet the user casually.".to_string())
    }

    pub fn max_tokens(&self) -> u32 {
        self.session
            .as_ref()
            .and_then(|s| s.max_tokens)
            .unwrap_or(1024)
    }

    pub fn temperature(&self) -> Option<f64> {
        self.session.as_ref().and_then(|s| s.temperature)
    }

    pub fn stt(&self) -> Option<&ServiceConfig> {
        self.services.as_ref().and_then(|s| s.stt.as_ref())
    }

    pub fn llm(&self) -> Option<&ServiceConfig> {
        self.services.as_ref().and_then(|s| s.llm.as_ref())
    }

    pub fn tts(&self) -> Option<&ServiceConfig> {
        self.services.as_ref().and_then(|s| s.tts.as_ref())
    }

    /// Validate config, returning (warnings, errors).
    pub fn validate(&self) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if let Some(services) = &self.services {
            for (name, svc) in [
                ("stt", services.stt.as_ref()),
                ("llm", services.llm.as_ref()),
                ("tts", services.tts.as_ref()),
            ] {
                if let Some(svc) = svc {
                    let is_local = svc.provider.as_deref() == Some("ollama");
                    if !is_local && svc.resolve_api_key().is_none() {
                        warnings.push(format!("Service '{name}' has no API key configured"));
                    }
                }
            }
        }

        if let Some(server) = &self.server {
            if server.port == 0 {
                errors.push("Server port cannot be 0".to_string());
            }
        }

        let pipeline = self.pipeline();
        if pipeline.close_silence_ms == 0 {
            errors.push("close_silence_ms cannot be 0".to_string());
        }
        if pipeline.max_turn_ms <= pipeline.close_silence_ms {
            errors.push("max_turn_ms must exceed close_silence_ms".to_string());
        }

        (warnings, errors)
    }

    /// Save config to a file.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Base directory for Voxflow data: `~/.voxflow/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".voxflow")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.stt_model(), "whisper-large-v3-turbo");
        assert_eq!(config.llm_model(), "llama-3.3-70b-versatile");
        assert_eq!(config.language(), "en");
        assert_eq!(config.greeting(), "Talk in english.Greet the user casually.");
        assert_eq!(config.max_tokens(), 1024);
    }

    #[test]
    fn test_env_var_substitution() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_VF_KEY", "gsk-test-123") };
        let input = r#"{"key": "${TEST_VF_KEY}", "other": "plain"}"#;
        let result = substitute_env_vars(input);
        assert!(result.contains("gsk-test-123"));
        assert!(result.contains("plain"));
        unsafe { std::env::remove_var("TEST_VF_KEY") };
    }

    #[test]
    fn test_service_resolve_api_key() {
        // SAFETY: test-only, single-threaded test runner
        unsafe { std::env::set_var("TEST_VF_API_KEY", "from-env") };
        let svc = ServiceConfig {
            api_key_env: Some("TEST_VF_API_KEY".into()),
            ..ServiceConfig::default()
        };
        assert_eq!(svc.resolve_api_key(), Some("from-env".into()));

        let svc2 = ServiceConfig {
            api_key: Some("direct-key".into()),
            api_key_env: Some("TEST_VF_API_KEY".into()),
            ..ServiceConfig::default()
        };
        // Direct key takes priority
        assert_eq!(svc2.resolve_api_key(), Some("direct-key".into()));
        unsafe { std::env::remove_var("TEST_VF_API_KEY") };
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let config = Config::load(Path::new("/nonexistent/voxflow.json")).unwrap();
        assert!(config.services.is_none());
    }

    #[test]
    fn test_load_json5_with_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                // pipeline tuning
                pipeline: { close_silence_ms: 600 },
            }"#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.pipeline().close_silence_ms, 600);
        // untouched fields keep serde defaults
        assert_eq!(config.pipeline().max_turn_ms, 30_000);
    }

    #[test]
    fn test_validate_missing_api_key_warns() {
        let config = Config {
            services: Some(ServicesConfig {
                llm: Some(ServiceConfig {
                    provider: Some("groq".into()),
                    ..ServiceConfig::default()
                }),
                ..ServicesConfig::default()
            }),
            ..Config::default()
        };
        let (warnings, _errors) = config.validate();
        assert!(
            warnings.iter().any(|w| w.contains("llm")),
            "Expected a warning about missing API key for llm, got: {warnings:?}"
        );
    }

    #[test]
    fn test_validate_bad_pipeline_errors() {
        let config = Config {
            pipeline: Some(PipelineConfig {
                close_silence_ms: 5000,
                max_turn_ms: 1000,
                ..PipelineConfig::default()
            }),
            ..Config::default()
        };
        let (_warnings, errors) = config.validate();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_logging_config_defaults() {
        let json_str = r#"{ "logging": {} }"#;
        let config: Config = json5::from_str(json_str).unwrap();
        let logging = config.logging.expect("logging should be present");
        assert_eq!(logging.format, "plain");
        assert!(logging.level.is_none());
        assert!(logging.filters.is_empty());
    }
}
