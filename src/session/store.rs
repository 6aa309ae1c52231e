//! 会话存储抽象层
//!
//! user_id -> Session，按需懒创建。每个会话包在独立的 Mutex 中：
//! 同一用户的轮次串行执行，不同用户互不阻塞。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{Mutex, RwLock};

use super::Session;

/// 会话句柄：持锁期间完成一整轮
pub type SessionHandle = Arc<Mutex<Session>>;

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 获取或创建用户的会话
    async fn get_or_create(&self, user_id: &str) -> SessionHandle;

    /// 获取已存在的会话
    async fn get(&self, user_id: &str) -> Option<SessionHandle>;

    /// 移除用户会话
    async fn remove(&self, user_id: &str) -> bool;

    /// 回收空闲超过 timeout 的会话（正在处理中的会话跳过）
    async fn cleanup_idle(&self, timeout: Duration, now: DateTime<Utc>) -> usize;

    /// 获取会话数
    async fn active_count(&self) -> usize;
}

/// 内存会话存储
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionHandle>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_or_create(&self, user_id: &str) -> SessionHandle {
        if let Some(handle) = self.sessions.read().await.get(user_id) {
            return Arc::clone(handle);
        }

        let mut sessions = self.sessions.write().await;
        let handle = sessions.entry(user_id.to_string()).or_insert_with(|| {
            tracing::debug!("Creating session for user {}", user_id);
            Arc::new(Mutex::new(Session::new(user_id, Utc::now())))
        });
        Arc::clone(handle)
    }

    async fn get(&self, user_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(user_id).cloned()
    }

    async fn remove(&self, user_id: &str) -> bool {
        self.sessions.write().await.remove(user_id).is_some()
    }

    async fn cleanup_idle(&self, timeout: Duration, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.write().await;

        let expired: Vec<String> = sessions
            .iter()
            .filter(|(_, handle)| match handle.try_lock() {
                Ok(session) => now - session.last_active > timeout,
                Err(_) => false,
            })
            .map(|(user_id, _)| user_id.clone())
            .collect();

        for user_id in &expired {
            sessions.remove(user_id);
        }
        if !expired.is_empty() {
            tracing::info!("Reaped {} idle sessions", expired.len());
        }
        expired.len()
    }

    async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
