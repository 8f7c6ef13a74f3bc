//! Service client wiring from config.

use std::sync::Arc;

use voxflow_core::config::{Config, ServiceConfig};
use voxflow_llm::{LlmProvider, OpenAiCompatProvider};
use voxflow_stt::{HttpSttClient, SttClient};
use voxflow_tts::{engine_from_config, TtsEngine};

/// The conventional API-key environment variable for a provider.
pub fn default_key_env(provider: Option<&str>) -> Option<&'static str> {
    match provider {
        Some("openai") => Some("OPENAI_API_KEY"),
        Some("elevenlabs") => Some("ELEVENLABS_API_KEY"),
        Some("ollama") => None,
        _ => Some("GROQ_API_KEY"),
    }
}

/// Fill in `api_key_env` with the provider's conventional variable when the
/// config names no key at all.
fn with_default_key_env(cfg: Option<&ServiceConfig>, default_provider: &str) -> ServiceConfig {
    let mut cfg = cfg.cloned().unwrap_or_default();
    if cfg.provider.is_none() {
        cfg.provider = Some(default_provider.to_string());
    }
    if cfg.api_key.is_none() && cfg.api_key_env.is_none() {
        cfg.api_key_env = default_key_env(cfg.provider.as_deref()).map(String::from);
    }
    cfg
}

/// Build the three pipeline service clients from config.
pub fn build_services(
    config: &Config,
) -> (Arc<dyn SttClient>, Arc<dyn LlmProvider>, Arc<dyn TtsEngine>) {
    let stt_cfg = with_default_key_env(config.stt(), "groq");
    let llm_cfg = with_default_key_env(config.llm(), "groq");
    let tts_cfg = with_default_key_env(config.tts(), "elevenlabs");

    let stt: Arc<dyn SttClient> = Arc::new(HttpSttClient::from_config(&stt_cfg));
    let llm: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatProvider::from_config(&llm_cfg));
    let tts: Arc<dyn TtsEngine> = Arc::from(engine_from_config(&tts_cfg));

    (stt, llm, tts)
}
