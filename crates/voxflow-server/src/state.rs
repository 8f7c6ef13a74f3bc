//! Server shared state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::sync::RwLock;

use voxflow_core::config::Config;
use voxflow_llm::LlmProvider;
use voxflow_stt::SttClient;
use voxflow_tts::TtsEngine;

use crate::services::build_services;

/// Shared state accessible from all connections and handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub stt: Arc<dyn SttClient>,
    pub llm: Arc<dyn LlmProvider>,
    pub tts: Arc<dyn TtsEngine>,
    pub connections: RwLock<HashMap<String, ConnectionInfo>>,
    pub prometheus: PrometheusHandle,
}

/// Per-connection bookkeeping.
pub struct ConnectionInfo {
    pub conn_id: String,
    pub session_id: String,
    pub connected_at: DateTime<Utc>,
}

impl AppState {
    /// Build the state from config: service clients plus the metrics recorder.
    pub fn from_config(config: Arc<Config>, prometheus: PrometheusHandle) -> Self {
        let (stt, llm, tts) = build_services(&config);
        Self {
            config,
            stt,
            llm,
            tts,
            connections: RwLock::new(HashMap::new()),
            prometheus,
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
