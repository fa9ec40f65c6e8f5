use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use attention_core::{FaceTracker, TrackerConfig};
use tokio::sync::{Mutex, RwLock};

/// 一个会话的跟踪状态；同一会话的帧经由外层互斥锁串行处理
pub struct SessionState {
    pub tracker: FaceTracker,
    pub frames: u64,
    last_seen: Instant,
}

impl SessionState {
    fn new(config: TrackerConfig) -> Self {
        Self {
            tracker: FaceTracker::new(config),
            frames: 0,
            last_seen: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.frames += 1;
        self.last_seen = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.elapsed()
    }
}

pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<SessionState>>>>,
    tracker_config: TrackerConfig,
}

impl SessionRegistry {
    pub fn new(tracker_config: TrackerConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            tracker_config,
        }
    }

    pub fn tracker_config(&self) -> &TrackerConfig {
        &self.tracker_config
    }

    pub async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<SessionState>> {
        if let Some(existing) = self.sessions.read().await.get(session_id) {
            return existing.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id, "session created");
                Arc::new(Mutex::new(SessionState::new(self.tracker_config.clone())))
            })
            .clone()
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<Mutex<SessionState>>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 空闲超过 `max_idle` 的会话；正在处理帧的会话跳过
    pub async fn idle_sessions(&self, max_idle: Duration) -> Vec<String> {
        let sessions = self.sessions.read().await;
        sessions
            .iter()
            .filter(|(_, state)| {
                state
                    .try_lock()
                    .map(|s| s.idle_for() >= max_idle)
                    .unwrap_or(false)
            })
            .map(|(id, _)| id.clone())
            .collect()
    }
}
