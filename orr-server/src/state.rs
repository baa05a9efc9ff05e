//! Application state management

use crate::config::ServerConfig;
use crate::session::ReplaySession;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Session keys and artifact names: ASCII letters, digits, `_` and `-`
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Process-wide cache of loaded sessions.
///
/// A session is loaded on first lookup and kept for the process lifetime.
/// Nothing is ever evicted or refreshed; rebuilding a session on disk needs a
/// server restart to be picked up.
#[derive(Clone)]
pub struct SessionRegistry {
    data_root: PathBuf,
    step_ms: i64,
    sessions: Arc<RwLock<HashMap<String, Arc<ReplaySession>>>>,
}

impl SessionRegistry {
    pub fn new(data_root: impl Into<PathBuf>, step_ms: i64) -> Self {
        Self {
            data_root: data_root.into(),
            step_ms,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Directory of a built session
    pub fn session_dir(&self, key: &str) -> PathBuf {
        self.data_root.join(format!("race_data_{}", key))
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Look up a session, loading it on first access.
    ///
    /// `None` when the key is malformed, the session directory does not exist
    /// or loading fails. Misses are not cached.
    pub async fn get(&self, key: &str) -> Option<Arc<ReplaySession>> {
        if !is_valid_name(key) {
            return None;
        }
        if let Some(session) = self.sessions.read().await.get(key) {
            return Some(session.clone());
        }

        let dir = self.session_dir(key);
        if !dir.is_dir() {
            return None;
        }

        let step_ms = self.step_ms;
        let owned_key = key.to_string();
        let loaded =
            tokio::task::spawn_blocking(move || ReplaySession::load(&owned_key, &dir, step_ms))
                .await;
        let session = match loaded {
            Ok(Ok(session)) => Arc::new(session),
            Ok(Err(e)) => {
                tracing::warn!("Failed to load session {}: {:#}", key, e);
                return None;
            }
            Err(e) => {
                tracing::error!("Session loader for {} panicked: {}", key, e);
                return None;
            }
        };

        // A concurrent lookup may have loaded it first; keep that one
        let mut sessions = self.sessions.write().await;
        Some(sessions.entry(key.to_string()).or_insert(session).clone())
    }

    /// Sessions currently in memory
    pub async fn loaded(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,

    pub sessions: SessionRegistry,

    /// Cancelled on shutdown; every live stream watches a child token
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let sessions = SessionRegistry::new(config.data_root.clone(), config.frame_step_ms);
        Self {
            config: Arc::new(config),
            sessions,
            shutdown: CancellationToken::new(),
        }
    }
}
