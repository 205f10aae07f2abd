//! Application state for the API server.

use devbot_chat::ChatService;

use crate::auth::ApiKey;
use crate::sessions::SessionRegistry;

/// Shared application state for the API server.
pub struct AppState {
    /// Retrieval, model and history for each turn
    pub chat: ChatService,

    /// Active document collections per session
    pub sessions: SessionRegistry,

    /// Bearer key; requests are unauthenticated when `None`
    pub api_key: Option<ApiKey>,

    /// Allowed CORS origins; empty allows any
    pub cors_origins: Vec<String>,

    /// Server start time (for health checks)
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(chat: ChatService) -> Self {
        Self {
            chat,
            sessions: SessionRegistry::new(),
            api_key: None,
            cors_origins: Vec::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(ApiKey::new(key));
        self
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    /// Get the uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
