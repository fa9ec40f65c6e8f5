//! 按会话的实时发布通道
//!
//! 发布是即发即弃的：没有订阅者时直接丢弃，也不做历史回放。

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};

pub type Payload = Arc<str>;

pub fn channel_name(session_id: &str) -> String {
    format!("meeting:{session_id}:attention")
}

pub struct RealtimeHub {
    channels: RwLock<HashMap<String, broadcast::Sender<Payload>>>,
    capacity: usize,
    sse_connections: Arc<AtomicUsize>,
}

/// 持有期间占用一个 SSE 连接名额
pub struct SseGuard(Arc<AtomicUsize>);

impl Drop for SseGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            sse_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 返回收到消息的订阅者数量
    pub async fn publish<T>(&self, session_id: &str, payload: &T) -> usize
    where
        T: Serialize + ?Sized,
    {
        let channels = self.channels.read().await;
        let Some(sender) = channels.get(session_id) else {
            return 0;
        };
        if sender.receiver_count() == 0 {
            return 0;
        }
        let json = match serde_json::to_string(payload) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(channel = %channel_name(session_id), error = %e, "failed to serialize frame payload");
                return 0;
            }
        };
        sender.send(Payload::from(json)).unwrap_or(0)
    }

    pub async fn subscribe(&self, session_id: &str) -> broadcast::Receiver<Payload> {
        let mut channels = self.channels.write().await;
        channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// 关闭会话通道，已连接的订阅流随之结束
    pub async fn close(&self, session_id: &str) -> bool {
        self.channels.write().await.remove(session_id).is_some()
    }

    /// 移除已无订阅者的通道
    pub async fn prune_idle(&self) -> usize {
        let mut channels = self.channels.write().await;
        let before = channels.len();
        channels.retain(|_, sender| sender.receiver_count() > 0);
        before - channels.len()
    }

    pub async fn channel_count(&self) -> usize {
        self.channels.read().await.len()
    }

    pub fn try_acquire_sse(&self, max: usize) -> Option<SseGuard> {
        let current = self.sse_connections.fetch_add(1, Ordering::SeqCst);
        if current >= max {
            self.sse_connections.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(SseGuard(self.sse_connections.clone()))
    }

    pub fn sse_connections(&self) -> usize {
        self.sse_connections.load(Ordering::SeqCst)
    }
}
