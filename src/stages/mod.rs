//! 本服务自身提供的有状态阶段：视线、眨眼、评分
//!
//! 状态按会话分表、表内再按轨迹号区分；长时间无请求的会话由清理 worker 回收。

pub mod attention;
pub mod blink;
pub mod gaze;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use attention_core::VisionConfig;
use tokio::sync::Mutex;

pub use attention::AttentionStage;
pub use blink::BlinkStage;
pub use gaze::GazeStage;

/// 请求未携带会话号时使用的会话
pub const DEFAULT_SESSION: &str = "default";

pub fn session_key(session_id: Option<&str>) -> &str {
    session_id.filter(|s| !s.is_empty()).unwrap_or(DEFAULT_SESSION)
}

struct Slot<T> {
    value: T,
    last_seen: Instant,
}

/// 按会话保存的阶段状态，首次使用时创建
pub struct SessionTable<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
}

impl<T> Default for SessionTable<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> SessionTable<T> {
    pub async fn with<R>(&self, session: &str, init: impl FnOnce() -> T, f: impl FnOnce(&mut T) -> R) -> R {
        let mut slots = self.slots.lock().await;
        let slot = slots.entry(session.to_string()).or_insert_with(|| Slot {
            value: init(),
            last_seen: Instant::now(),
        });
        slot.last_seen = Instant::now();
        f(&mut slot.value)
    }

    /// 只作用于已存在的会话
    pub async fn with_existing<R>(&self, session: &str, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut slots = self.slots.lock().await;
        slots.get_mut(session).map(|slot| f(&mut slot.value))
    }

    pub async fn remove(&self, session: &str) -> bool {
        self.slots.lock().await.remove(session).is_some()
    }

    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut slots = self.slots.lock().await;
        let before = slots.len();
        slots.retain(|_, slot| slot.last_seen.elapsed() < max_idle);
        before - slots.len()
    }

    pub async fn len(&self) -> usize {
        self.slots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

pub struct StageEngines {
    pub gaze: GazeStage,
    pub blink: BlinkStage,
    pub attention: AttentionStage,
}

impl StageEngines {
    pub fn new(vision: &VisionConfig, score_window: usize) -> Self {
        Self {
            gaze: GazeStage::new(vision.gaze.clone()),
            blink: BlinkStage::new(vision.blink.clone()),
            attention: AttentionStage::new(vision.attention.clone(), score_window),
        }
    }

    /// 回收空闲会话，返回被移除的会话表项总数
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        self.gaze.evict_idle(max_idle).await
            + self.blink.evict_idle(max_idle).await
            + self.attention.evict_idle(max_idle).await
    }
}
